use regex::Regex;
use tracing::debug;

use super::{BoundaryGrammar, DASH_CLASS, SummaryEntry, SummaryGrammar};
use crate::stages::stage0_normalize::LETTER_CLASS;

const HEADER: &str = r"GÜNDEM\s*D[Iİ]Ş[Iİ]\s*KONUŞMALAR";

/// Grammar of the older terms, whose index lists entries such as
/// `1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem konusunda gündem dışı konuşması`
#[derive(Debug)]
pub struct OffAgendaGrammar {
    header: Regex,
    index_section: Regex,
    entry_start: Regex,
    entry: Regex,
    title_end: Regex,
}

impl OffAgendaGrammar {
    pub fn new() -> Self {
        let index_section = format!(
            r"(?s)A\)\s*{header}[^\n]*\n(.*?)(?:\n\s*(?:[B-Z]\)|[IVXL]+\.)|\z)",
            header = HEADER
        );
        let entry_start = format!(r"\b\d+\.\s*{dash}", dash = DASH_CLASS);
        let entry = format!(
            r"(?i)^(\d+)\.\s*{dash}\s*([{letters}\s-]+?)\s+(?:Milletvekili|Bakanı)\s+([{letters}.\s-]+)\s*(['’]\s*(?:nın|nin|nun|nün|ın|in|un|ün))?,?\s*",
            dash = DASH_CLASS,
            letters = LETTER_CLASS
        );

        Self {
            header: Regex::new(HEADER).expect("valid off-agenda header regex"),
            index_section: Regex::new(&index_section).expect("valid off-agenda index regex"),
            entry_start: Regex::new(&entry_start).expect("valid entry start regex"),
            entry: Regex::new(&entry).expect("valid off-agenda entry regex"),
            title_end: Regex::new(r"(?i)konuşması|cevabı").expect("valid title end regex"),
        }
    }
}

impl Default for OffAgendaGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryGrammar for OffAgendaGrammar {
    fn index_block<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.index_section
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Each entry runs until the next numbered entry; its title ends at
    /// "konuşması"/"cevabı" when present.
    fn parse_entries(&self, block: &str) -> Vec<SummaryEntry> {
        let starts: Vec<usize> = self.entry_start.find_iter(block).map(|m| m.start()).collect();
        let mut entries = Vec::with_capacity(starts.len());

        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(block.len());
            let chunk = &block[start..end];

            let Some(caps) = self.entry.captures(chunk) else {
                debug!("Unparseable index entry: {:?}", chunk.trim());
                continue;
            };
            let Ok(number) = caps[1].parse::<u32>() else {
                continue;
            };

            let head_end = caps.get(0).map_or(0, |m| m.end());
            let rest = &chunk[head_end..];
            let title = match self.title_end.find(rest) {
                Some(m) => &rest[..m.start()],
                None => rest,
            };

            entries.push(SummaryEntry {
                number,
                province: caps[2].to_string(),
                speaker: caps[3].to_string(),
                title: title.to_string(),
                page_ref: None,
                suffix_consumed: caps.get(4).is_some(),
            });
        }

        entries
    }
}

impl BoundaryGrammar for OffAgendaGrammar {
    fn section_header(&self) -> &Regex {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "IV. — BAŞKANLIĞIN GENEL KURULA SUNUŞLARI
A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem bölgesindeki
konutlara ilişkin gündem dışı konuşması
2. — Devlet Bakanı Ali Kaya'nın, enflasyon rakamlarına ilişkin cevabı
B) TEZKERELER VE ÖNERGELER
1. — Başbakanlık tezkeresi";

    #[test]
    fn test_index_block_stops_at_next_section() {
        let grammar = OffAgendaGrammar::new();
        let block = grammar.index_block(INDEX).unwrap();
        assert!(block.contains("Ahmet Yılmaz"));
        assert!(block.contains("Ali Kaya"));
        assert!(!block.contains("TEZKERELER"));
    }

    #[test]
    fn test_parse_entries() {
        let grammar = OffAgendaGrammar::new();
        let block = grammar.index_block(INDEX).unwrap();
        let entries = grammar.parse_entries(block);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].number, 1);
        assert_eq!(entries[0].province.trim(), "İstanbul");
        assert_eq!(entries[0].speaker.trim(), "Ahmet Yılmaz");
        assert!(entries[0].title.contains("deprem bölgesindeki"));
        assert!(!entries[0].title.contains("konuşması"));

        assert_eq!(entries[1].number, 2);
        assert_eq!(entries[1].province.trim(), "Devlet");
        assert_eq!(entries[1].speaker.trim(), "Ali Kaya");
        assert_eq!(entries[1].title.trim(), "enflasyon rakamlarına ilişkin");
    }

    #[test]
    fn test_missing_index_section() {
        let grammar = OffAgendaGrammar::new();
        assert!(grammar.index_block("Birleşim açıldı. BAŞKAN — Oturumu açıyorum.").is_none());
    }
}
