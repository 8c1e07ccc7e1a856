use serde::{Deserialize, Serialize};

use super::{MpIdentity, Session};

/// One entry of a session's index section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSummary {
    /// 1-based, contiguous within a session
    pub speech_no: u32,
    pub province: String,
    /// Speaker name as printed in the index, possessive suffix removed
    pub speech_giver: String,
    pub speech_title: String,
    /// Page or time reference (newer transcripts only)
    pub page_ref: Option<String>,
}

/// A summary whose transcript span was located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSpeech {
    pub summary: SpeechSummary,
    /// Whitespace-collapsed speech body, including the speaker's opening line
    pub content: String,
}

/// Final record handed to the indexing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speech {
    pub session_id: String,
    pub term: u32,
    pub year: u32,
    pub file: String,
    pub speech_no: u32,
    pub province: String,
    pub speech_giver: String,
    pub political_party: Option<String>,
    pub terms_served: Vec<u32>,
    pub speech_title: String,
    pub page_ref: Option<String>,
    pub content: String,
}

impl Speech {
    /// Idempotency key: `{session_id}-{speech_no}`
    pub fn key(&self) -> String {
        speech_key(&self.session_id, self.speech_no)
    }

    pub fn from_parts(session: &Session, extracted: ExtractedSpeech, identity: &MpIdentity) -> Self {
        let ExtractedSpeech { summary, content } = extracted;
        Self {
            session_id: session.session_id.clone(),
            term: session.term,
            year: session.year,
            file: session.file.clone(),
            speech_no: summary.speech_no,
            province: summary.province,
            speech_giver: summary.speech_giver,
            political_party: identity.party.clone(),
            terms_served: identity.terms.clone(),
            speech_title: summary.speech_title,
            page_ref: summary.page_ref,
            content,
        }
    }
}

pub fn speech_key(session_id: &str, speech_no: u32) -> String {
    format!("{}-{}", session_id, speech_no)
}
