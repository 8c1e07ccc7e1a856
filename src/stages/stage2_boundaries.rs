use regex::Regex;
use tracing::{debug, warn};

use crate::grammar::{BoundaryGrammar, CHAIR_CUE, DASH_CLASS};
use crate::models::{ExtractedSpeech, SpeechSummary};
use crate::stages::stage0_normalize::collapse_whitespace;
use crate::text::{DEFAULT_PREFIX_LEN, make_flexible_pattern, name_prefix};

/// Result of Stage 2 for one session
#[derive(Debug, Clone, Default)]
pub struct BoundaryExtraction {
    pub speeches: Vec<ExtractedSpeech>,
    /// Speech numbers whose body could not be located
    pub missing: Vec<u32>,
    /// Whether the header occurred a second time, opening the transcript
    pub transcript_found: bool,
}

/// Transcript text after the second occurrence of the section header.
///
/// The first occurrence heads the index; the second heads the transcript.
pub fn transcript_section<'a>(text: &'a str, grammar: &dyn BoundaryGrammar) -> Option<&'a str> {
    grammar
        .section_header()
        .find_iter(text)
        .nth(1)
        .map(|m| &text[m.end()..])
}

/// Build the regex that finds where a speaker starts talking: a name
/// beginning with the speaker's (diacritic-tolerant) prefix, the rest of an
/// uppercase name, a parenthesised aside such as the province, then a dash.
fn speaker_start_regex(speaker: &str) -> Option<Regex> {
    let prefix = name_prefix(speaker.trim(), DEFAULT_PREFIX_LEN);
    if prefix.is_empty() {
        return None;
    }

    let source = format!(
        r"(?is)\b{prefix}[A-ZÇĞİÖŞÜÂÎÛ'\s.-]*\s*\([^()]*\)\s*{dash}",
        prefix = make_flexible_pattern(prefix),
        dash = DASH_CLASS
    );
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Could not build speaker anchor for {:?}: {}", speaker, e);
            None
        }
    }
}

fn terminator_regex(next_number: u32, grammar: &dyn BoundaryGrammar) -> Option<Regex> {
    let mut source = format!(
        r"\b{next}\.\s*{dash}|{chair}",
        next = next_number,
        dash = DASH_CLASS,
        chair = CHAIR_CUE
    );
    if let Some(extra) = grammar.extra_terminator() {
        source.push('|');
        source.push_str(extra);
    }

    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Could not build speech terminator: {}", e);
            None
        }
    }
}

/// Locate the full text of one summarized speech inside the transcript.
///
/// The speech runs from the speaker anchor to the earliest of: the next
/// entry number, the chair's cue, or the grammar's own terminator. With no
/// terminator it runs to the end of the document. Whitespace is collapsed.
pub fn extract_full_speech(
    transcript: &str,
    summary: &SpeechSummary,
    grammar: &dyn BoundaryGrammar,
) -> Option<String> {
    let start = speaker_start_regex(&summary.speech_giver)?.find(transcript)?;
    let after = &transcript[start.end()..];

    let end = terminator_regex(summary.speech_no + 1, grammar)
        .and_then(|re| re.find(after))
        .map_or(transcript.len(), |m| start.end() + m.start());

    let content = collapse_whitespace(&transcript[start.start()..end]);
    (!content.is_empty()).then_some(content)
}

/// Perform Stage 2: speech boundary extraction
///
/// This stage:
/// 1. Finds the transcript section (second header occurrence)
/// 2. Anchors each summary's speech on its speaker's name prefix
/// 3. Cuts the body at the next terminator
///
/// Summaries that cannot be located are reported in `missing`; when the
/// transcript section itself is absent every summary is missing.
pub fn extract_full_speeches(
    text: &str,
    summaries: &[SpeechSummary],
    grammar: &dyn BoundaryGrammar,
) -> BoundaryExtraction {
    let Some(transcript) = transcript_section(text, grammar) else {
        return BoundaryExtraction {
            speeches: Vec::new(),
            missing: summaries.iter().map(|s| s.speech_no).collect(),
            transcript_found: false,
        };
    };

    let mut result = BoundaryExtraction {
        transcript_found: true,
        ..Default::default()
    };

    for summary in summaries {
        match extract_full_speech(transcript, summary, grammar) {
            Some(content) => result.speeches.push(ExtractedSpeech {
                summary: summary.clone(),
                content,
            }),
            None => {
                debug!(
                    "No speech body found for #{} ({})",
                    summary.speech_no, summary.speech_giver
                );
                result.missing.push(summary.speech_no);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::boundary_grammar;
    use crate::models::Dialect;

    fn summary(no: u32, speaker: &str) -> SpeechSummary {
        SpeechSummary {
            speech_no: no,
            province: "İstanbul".to_string(),
            speech_giver: speaker.to_string(),
            speech_title: "başlık".to_string(),
            page_ref: None,
        }
    }

    const OFF_AGENDA_DOC: &str = "A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem konusunda gündem dışı konuşması
2. — Ankara Milletvekili Ayşe Demir'in, tarım konusunda gündem dışı konuşması
B) TEZKERELER

A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem konusunda gündem dışı konuşması
BAŞKAN — Gündem dışı ilk söz, Sayın Ahmet Yılmaz'a aittir. (ANAP sıralarından alkışlar)
AHMET YILMAZ (İstanbul) — Sayın Başkan, değerli milletvekilleri;
deprem bölgesinde durum ağırdır.
BAŞKAN — Teşekkür ederim Sayın Yılmaz.
2. — Ankara Milletvekili Ayşe Demir'in, tarım konusunda gündem dışı konuşması
AYŞE DEMİR (Ankara) — Sayın Başkan, çiftçimiz zor durumdadır.";

    #[test]
    fn test_speech_ends_at_chair_cue() {
        let grammar = boundary_grammar(Dialect::OffAgenda);
        let transcript = transcript_section(OFF_AGENDA_DOC, grammar).unwrap();
        let content = extract_full_speech(transcript, &summary(1, "Ahmet Yılmaz"), grammar).unwrap();

        assert!(content.starts_with("AHMET YILMAZ (İstanbul) —"));
        assert!(content.ends_with("deprem bölgesinde durum ağırdır."));
        assert!(!content.contains("BAŞKAN"));
        assert!(!content.contains('\n'));
    }

    #[test]
    fn test_last_speech_runs_to_end_of_document() {
        let grammar = boundary_grammar(Dialect::OffAgenda);
        let transcript = transcript_section(OFF_AGENDA_DOC, grammar).unwrap();
        let content = extract_full_speech(transcript, &summary(2, "Ayşe Demir"), grammar).unwrap();

        assert_eq!(
            content,
            "AYŞE DEMİR (Ankara) — Sayın Başkan, çiftçimiz zor durumdadır."
        );
    }

    #[test]
    fn test_single_header_yields_nothing() {
        let grammar = boundary_grammar(Dialect::OffAgenda);
        let doc = "A) GÜNDEM DIŞI KONUŞMALAR\n1. — Ankara Milletvekili Ali Kaya'nın, konu\nALİ KAYA (Ankara) — Metin.";
        let summaries = vec![summary(1, "Ali Kaya")];
        let result = extract_full_speeches(doc, &summaries, grammar);

        assert!(!result.transcript_found);
        assert!(result.speeches.is_empty());
        assert_eq!(result.missing, vec![1]);
    }

    #[test]
    fn test_unknown_speaker_is_missing() {
        let grammar = boundary_grammar(Dialect::OffAgenda);
        let summaries = vec![summary(1, "Ahmet Yılmaz"), summary(2, "Zeki Zorlu")];
        let result = extract_full_speeches(OFF_AGENDA_DOC, &summaries, grammar);

        assert!(result.transcript_found);
        assert_eq!(result.speeches.len(), 1);
        assert_eq!(result.speeches[0].summary.speech_no, 1);
        assert_eq!(result.missing, vec![2]);
    }

    #[test]
    fn test_diacritic_tolerant_anchor() {
        let grammar = boundary_grammar(Dialect::OffAgenda);
        let doc = "A) GÜNDEM DIŞI KONUŞMALAR\nx\nA) GÜNDEM DIŞI KONUŞMALAR\nOZAL (Malatya) — Konuşma metni.";
        let transcript = transcript_section(doc, grammar).unwrap();
        let content = extract_full_speech(transcript, &summary(1, "Özal"), grammar).unwrap();
        assert_eq!(content, "OZAL (Malatya) — Konuşma metni.");
    }

    #[test]
    fn test_statements_stop_at_next_roman_section() {
        let grammar = boundary_grammar(Dialect::Statements);
        let doc = "V.- AÇIKLAMALAR
1.- İstanbul Milletvekili Ali Kaya’nın, asgari ücrete ilişkin açıklaması 12:34
VI.- ÖNERİLER
V.- AÇIKLAMALAR
1.- İstanbul Milletvekili Ali Kaya’nın, asgari ücrete ilişkin açıklaması
ALİ KAYA (İstanbul) - Teşekkürler Sayın Başkan.
Asgari ücret yetersizdir.
VI.- ÖNERİLER
A) Siyasi Parti Grubu Önerileri";

        let transcript = transcript_section(doc, grammar).unwrap();
        let content = extract_full_speech(transcript, &summary(1, "Ali Kaya"), grammar).unwrap();
        assert_eq!(
            content,
            "ALİ KAYA (İstanbul) - Teşekkürler Sayın Başkan. Asgari ücret yetersizdir."
        );
    }
}
