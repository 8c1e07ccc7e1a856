use tracing::debug;

use crate::grammar::{SummaryEntry, SummaryGrammar};
use crate::models::SpeechSummary;
use crate::stages::stage0_normalize::{clean_name_capture, collapse_whitespace};

/// Where the index numbering stopped being contiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBreak {
    pub expected: u32,
    pub found: u32,
}

/// Result of Stage 1 summary extraction
#[derive(Debug, Clone, Default)]
pub struct SummaryExtraction {
    /// Accepted summaries, numbered 1..=n without gaps
    pub summaries: Vec<SpeechSummary>,
    /// Whether the session has an index section at all
    pub index_found: bool,
    /// Set when extraction halted at a numbering gap
    pub sequence_break: Option<SequenceBreak>,
}

/// Perform Stage 1: summary block extraction
///
/// This stage:
/// 1. Locates the index section for the session's dialect
/// 2. Parses its numbered entries
/// 3. Cleans province and speaker captures (whitespace, and a genitive the
///    grammar could not separate from the name)
/// 4. Accepts entries only while they are numbered 1, 2, 3, ...; the first
///    gap ends extraction for the session and later entries are dropped
///
/// A missing index section or an empty index is an empty result, not an error.
pub fn extract_speech_summaries(text: &str, grammar: &dyn SummaryGrammar) -> SummaryExtraction {
    let Some(block) = grammar.index_block(text) else {
        return SummaryExtraction::default();
    };

    let entries = grammar.parse_entries(block);
    let (accepted, sequence_break) = validate_sequence(entries);

    if let Some(brk) = sequence_break {
        debug!(
            "Index numbering broke: found {} but expected {}",
            brk.found, brk.expected
        );
    }

    SummaryExtraction {
        summaries: accepted.into_iter().map(clean_entry).collect(),
        index_found: true,
        sequence_break,
    }
}

/// Keep the leading run of entries numbered 1, 2, 3, ...
pub fn validate_sequence(entries: Vec<SummaryEntry>) -> (Vec<SummaryEntry>, Option<SequenceBreak>) {
    let mut accepted = Vec::with_capacity(entries.len());
    let mut expected = 1u32;

    for entry in entries {
        if entry.number != expected {
            return (
                accepted,
                Some(SequenceBreak {
                    expected,
                    found: entry.number,
                }),
            );
        }
        accepted.push(entry);
        expected += 1;
    }

    (accepted, None)
}

/// Provinces never carry a genitive; a speaker capture is stripped only when
/// the grammar left an unmarked suffix attached (`Ali Kayanın,`)
fn clean_entry(entry: SummaryEntry) -> SpeechSummary {
    let speech_giver = if entry.suffix_consumed {
        collapse_whitespace(&entry.speaker)
    } else {
        clean_name_capture(&entry.speaker)
    };

    SpeechSummary {
        speech_no: entry.number,
        province: collapse_whitespace(&entry.province),
        speech_giver,
        speech_title: collapse_whitespace(&entry.title),
        page_ref: entry
            .page_ref
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::summary_grammar;
    use crate::models::Dialect;

    fn entry(number: u32) -> SummaryEntry {
        SummaryEntry {
            number,
            province: "Ankara".to_string(),
            speaker: format!("Konuşmacı {}", number),
            title: "başlık".to_string(),
            page_ref: None,
            suffix_consumed: true,
        }
    }

    #[test]
    fn test_sequence_stops_at_first_gap() {
        let entries = [1, 2, 3, 5, 6].into_iter().map(entry).collect();
        let (accepted, brk) = validate_sequence(entries);

        let numbers: Vec<u32> = accepted.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(brk, Some(SequenceBreak { expected: 4, found: 5 }));
    }

    #[test]
    fn test_sequence_must_start_at_one() {
        let entries = [2, 3].into_iter().map(entry).collect();
        let (accepted, brk) = validate_sequence(entries);
        assert!(accepted.is_empty());
        assert_eq!(brk, Some(SequenceBreak { expected: 1, found: 2 }));
    }

    #[test]
    fn test_sequence_contiguous() {
        let entries = [1, 2, 3].into_iter().map(entry).collect();
        let (accepted, brk) = validate_sequence(entries);
        assert_eq!(accepted.len(), 3);
        assert!(brk.is_none());
    }

    #[test]
    fn test_extract_off_agenda_summaries() {
        let text = "A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet   Yılmaz'ın, deprem
bölgesine ilişkin gündem dışı konuşması
2. — Ankara Milletvekili Ayşe Demir'in, tarım politikasına ilişkin gündem dışı konuşması
4. — İzmir Milletvekili Can Öz'ün, turizme ilişkin gündem dışı konuşması
B) TEZKERELER";

        let result = extract_speech_summaries(text, summary_grammar(Dialect::OffAgenda));

        assert!(result.index_found);
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.summaries[0].speech_giver, "Ahmet Yılmaz");
        assert_eq!(result.summaries[0].province, "İstanbul");
        assert_eq!(result.summaries[0].speech_title, "deprem bölgesine ilişkin gündem dışı");
        assert_eq!(result.summaries[1].speech_giver, "Ayşe Demir");
        assert_eq!(result.sequence_break, Some(SequenceBreak { expected: 3, found: 4 }));
    }

    #[test]
    fn test_extract_statements_summaries() {
        let text = "V.- AÇIKLAMALAR
1.- İstanbul Milletvekili Ali Kaya’nın, asgari ücrete ilişkin açıklaması 12:34
VI.- ÖNERİLER";

        let result = extract_speech_summaries(text, summary_grammar(Dialect::Statements));

        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].speech_no, 1);
        assert_eq!(result.summaries[0].speech_giver, "Ali Kaya");
        assert_eq!(result.summaries[0].speech_title, "asgari ücrete ilişkin");
        assert_eq!(result.summaries[0].page_ref.as_deref(), Some("12:34"));
    }

    #[test]
    fn test_off_agenda_names_ending_in_suffix_letters_survive() {
        let text = "A) GÜNDEM DIŞI KONUŞMALAR
1. — Aydın Milletvekili Ali Şahin'in, zeytin üreticilerine ilişkin gündem dışı konuşması
2. — Artvin Milletvekili Ali Kayanın, çay fiyatlarına ilişkin gündem dışı konuşması
B) TEZKERELER";

        let result = extract_speech_summaries(text, summary_grammar(Dialect::OffAgenda));

        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.summaries[0].province, "Aydın");
        assert_eq!(result.summaries[0].speech_giver, "Ali Şahin");
        assert_eq!(result.summaries[1].province, "Artvin");
        assert_eq!(result.summaries[1].speech_giver, "Ali Kaya");
    }

    #[test]
    fn test_statements_names_ending_in_suffix_letters_survive() {
        let text = "V.- AÇIKLAMALAR
1.- Aydın Milletvekili Hüseyin Yıldız'ın, incir ihracatına ilişkin açıklaması 12:34
2.- Artvin Milletvekili Uğur Bayraktutan'ın, baraj projelerine ilişkin açıklaması 12:40
3.- Ankara Milletvekili Ali Şahin'in, bütçe görüşmelerine ilişkin açıklaması 12:45
VI.- ÖNERİLER";

        let result = extract_speech_summaries(text, summary_grammar(Dialect::Statements));

        let provinces: Vec<&str> = result.summaries.iter().map(|s| s.province.as_str()).collect();
        let speakers: Vec<&str> = result.summaries.iter().map(|s| s.speech_giver.as_str()).collect();
        assert_eq!(provinces, vec!["Aydın", "Artvin", "Ankara"]);
        assert_eq!(speakers, vec!["Hüseyin Yıldız", "Uğur Bayraktutan", "Ali Şahin"]);
    }

    #[test]
    fn test_unmarked_suffix_is_stripped_from_speaker_only() {
        let raw = SummaryEntry {
            number: 1,
            province: "Aydın".to_string(),
            speaker: "Ali  Kayanın".to_string(),
            title: "başlık".to_string(),
            page_ref: None,
            suffix_consumed: false,
        };

        let summary = clean_entry(raw);
        assert_eq!(summary.province, "Aydın");
        assert_eq!(summary.speech_giver, "Ali Kaya");
    }

    #[test]
    fn test_no_index_section_is_empty() {
        let result = extract_speech_summaries("BAŞKAN — Birleşimi açıyorum.", summary_grammar(Dialect::OffAgenda));
        assert!(!result.index_found);
        assert!(result.summaries.is_empty());
        assert!(result.sequence_break.is_none());
    }
}
