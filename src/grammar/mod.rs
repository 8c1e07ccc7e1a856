pub mod off_agenda;
pub mod statements;

pub use off_agenda::OffAgendaGrammar;
pub use statements::StatementsGrammar;

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Dialect;

/// Dash variants OCR produces after an entry number or speaker cue
pub const DASH_CLASS: &str = "[—–-]";

/// The chair's speaking cue, which closes an MP's speech
pub const CHAIR_CUE: &str = r"\bBA[SŞ]KAN\s*[—–-]";

/// One raw index entry as captured by a dialect grammar, before cleaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub number: u32,
    pub province: String,
    pub speaker: String,
    pub title: String,
    pub page_ref: Option<String>,
    /// The grammar already matched an apostrophe-marked genitive after the
    /// speaker, so the capture is a bare name
    pub suffix_consumed: bool,
}

/// How a transcript era lists its speeches in the index section
pub trait SummaryGrammar: Send + Sync {
    /// Body of the index section, if the session has one
    fn index_block<'a>(&self, text: &'a str) -> Option<&'a str>;

    /// Entries in document order; numbering is validated by the caller
    fn parse_entries(&self, block: &str) -> Vec<SummaryEntry>;
}

/// How a transcript era delimits the speeches themselves
pub trait BoundaryGrammar: Send + Sync {
    /// Heading that opens the index and, on its second occurrence, the
    /// transcript section
    fn section_header(&self) -> &Regex;

    /// Regex source of an era-specific terminator, tried alongside the next
    /// entry number and the chair's cue
    fn extra_terminator(&self) -> Option<&str> {
        None
    }
}

static OFF_AGENDA: LazyLock<OffAgendaGrammar> = LazyLock::new(OffAgendaGrammar::new);
static STATEMENTS: LazyLock<StatementsGrammar> = LazyLock::new(StatementsGrammar::new);

pub fn summary_grammar(dialect: Dialect) -> &'static dyn SummaryGrammar {
    match dialect {
        Dialect::OffAgenda => &*OFF_AGENDA,
        Dialect::Statements => &*STATEMENTS,
    }
}

pub fn boundary_grammar(dialect: Dialect) -> &'static dyn BoundaryGrammar {
    match dialect {
        Dialect::OffAgenda => &*OFF_AGENDA,
        Dialect::Statements => &*STATEMENTS,
    }
}
