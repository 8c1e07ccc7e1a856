use regex::Regex;

use super::{BoundaryGrammar, DASH_CLASS, SummaryEntry, SummaryGrammar};

/// Grammar of the newer terms, whose index lists entries such as
/// `1.- İstanbul Milletvekili Ali Kaya’nın, asgari ücrete ilişkin açıklaması 12:34`
#[derive(Debug)]
pub struct StatementsGrammar {
    header: Regex,
    index_section: Regex,
    entry: Regex,
    terminator: String,
}

impl StatementsGrammar {
    pub fn new() -> Self {
        let header = format!(r"\b[IVXLCDM]+\.\s*{dash}\s*AÇIKLAMALAR", dash = DASH_CLASS);
        let index_section = format!(
            r"(?s){header}(.*?)(?:\b[IVXLCDM]+\.\s*{dash}|\z)",
            header = header,
            dash = DASH_CLASS
        );
        let entry = format!(
            r"(?is)(\d+)\.\s*{dash}\s*(.*?)\s+(?:Milletvekili|Bakanı)\s+(.*?)['’]?(?:nın|nin|nun|nün|ın|in|un|ün),\s*(.*?)açıklaması\s+(\d+(?::\d+)?)",
            dash = DASH_CLASS
        );

        Self {
            header: Regex::new(&header).expect("valid statements header regex"),
            index_section: Regex::new(&index_section).expect("valid statements index regex"),
            entry: Regex::new(&entry).expect("valid statements entry regex"),
            terminator: format!(r"(?m:^\s*[IVXLCDM]+\.\s*{dash})", dash = DASH_CLASS),
        }
    }
}

impl Default for StatementsGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryGrammar for StatementsGrammar {
    fn index_block<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.index_section
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn parse_entries(&self, block: &str) -> Vec<SummaryEntry> {
        self.entry
            .captures_iter(block)
            .filter_map(|caps| {
                let number = caps[1].parse::<u32>().ok()?;
                Some(SummaryEntry {
                    number,
                    province: caps[2].to_string(),
                    speaker: caps[3].to_string(),
                    title: caps[4].to_string(),
                    page_ref: Some(caps[5].to_string()),
                    suffix_consumed: true,
                })
            })
            .collect()
    }
}

impl BoundaryGrammar for StatementsGrammar {
    fn section_header(&self) -> &Regex {
        &self.header
    }

    /// The next Roman-numbered section closes the last statement
    fn extra_terminator(&self) -> Option<&str> {
        Some(&self.terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "IV.- BAŞKANLIĞIN GENEL KURULA SUNUŞLARI
V.- AÇIKLAMALAR
1.- İstanbul Milletvekili Ali Kaya’nın, asgari ücrete
ilişkin açıklaması 12:34
2.- Ankara Milletvekili Ayşe Demir'in, öğretmen atamalarına ilişkin açıklaması 13
VI.- ÖNERİLER
1.- HDP Grubu önerisi";

    #[test]
    fn test_index_block_bounded_by_roman_sections() {
        let grammar = StatementsGrammar::new();
        let block = grammar.index_block(INDEX).unwrap();
        assert!(block.contains("Ali Kaya"));
        assert!(block.contains("Ayşe Demir"));
        assert!(!block.contains("ÖNERİLER"));
    }

    #[test]
    fn test_parse_entries_with_page_refs() {
        let grammar = StatementsGrammar::new();
        let entries = grammar.parse_entries(grammar.index_block(INDEX).unwrap());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].number, 1);
        assert_eq!(entries[0].province, "İstanbul");
        assert_eq!(entries[0].speaker, "Ali Kaya");
        assert_eq!(entries[0].page_ref.as_deref(), Some("12:34"));
        assert!(entries[0].title.contains("asgari ücrete"));

        assert_eq!(entries[1].speaker, "Ayşe Demir");
        assert_eq!(entries[1].page_ref.as_deref(), Some("13"));
    }

    #[test]
    fn test_header_is_structural() {
        let grammar = StatementsGrammar::new();
        assert!(grammar.section_header().is_match("V.- AÇIKLAMALAR"));
        assert!(!grammar.section_header().is_match("bu açıklamalar yeterli değil"));
    }
}
