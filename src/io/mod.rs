pub mod input;
pub mod output;

pub use input::{DiscoveryFilter, SessionFile, discover_sessions, read_session, session_file_for_path};
pub use output::{
    BatchOutcome, ElasticsearchConfig, ElasticsearchSink, FailedRecord, JsonLinesSink, MemorySink,
    SpeechSink, write_failed_records,
};
