use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// First term whose transcripts index speeches under "AÇIKLAMALAR".
pub const STATEMENTS_DIALECT_FIRST_TERM: u32 = 23;

/// Transcript layout era, selected by term number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Older terms: "GÜNDEM DIŞI KONUŞMALAR", entries numbered `1. —`
    OffAgenda,
    /// Newer terms: "AÇIKLAMALAR", entries numbered `1.-` with a page reference
    Statements,
}

impl Dialect {
    pub fn for_term(term: u32) -> Self {
        if term >= STATEMENTS_DIALECT_FIRST_TERM {
            Dialect::Statements
        } else {
            Dialect::OffAgenda
        }
    }

    /// Render the session sequence number the way each era's keys were
    /// originally written (`session001` vs `session2`).
    pub fn format_session_number(&self, digits: &str) -> String {
        match self {
            Dialect::OffAgenda => digits.to_string(),
            Dialect::Statements => digits
                .parse::<u32>()
                .map(|n| n.to_string())
                .unwrap_or_else(|_| digits.to_string()),
        }
    }
}

/// One recorded sitting, immutable once read
#[derive(Debug, Clone)]
pub struct Session {
    /// Parliamentary term (dönem)
    pub term: u32,
    /// Legislative year within the term (yasama yılı)
    pub year: u32,
    /// Source file identifier as emitted on every record
    pub file: String,
    /// Path the text was read from
    pub path: PathBuf,
    /// `term{T}-year{Y}-session{N}`
    pub session_id: String,
    /// Raw transcript text
    pub text: String,
}

impl Session {
    pub fn dialect(&self) -> Dialect {
        Dialect::for_term(self.term)
    }
}

/// Build the session id from the trailing three digits of a session name
/// (folder name for the older era, file stem for the newer one).
pub fn derive_session_id(session_name: &str, term: u32, year: u32) -> Option<String> {
    let digits: String = {
        let tail: Vec<char> = session_name.chars().rev().take(3).collect();
        if tail.len() < 3 || !tail.iter().all(|c| c.is_ascii_digit()) {
            return None;
        }
        tail.into_iter().rev().collect()
    };

    let number = Dialect::for_term(term).format_session_number(&digits);
    Some(format!("term{}-year{}-session{}", term, year, number))
}
