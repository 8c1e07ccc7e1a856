pub mod error;
pub mod grammar;
pub mod identity;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod text;

pub use error::{CacheError, EmitError, LookupError};
pub use identity::{
    DedupConfig, DedupPaths, IdentityCache, IdentityLookup, IdentityResolver, NoLookup,
    ResolverConfig, WikipediaConfig, WikipediaLookup, deduplicate_file,
};
pub use io::{
    DiscoveryFilter, ElasticsearchConfig, ElasticsearchSink, JsonLinesSink, MemorySink, SpeechSink,
    read_session, session_file_for_path, write_failed_records,
};
pub use models::{Dialect, MpIdentity, Session, Speech, SpeechSummary};
pub use pipeline::{PipelineConfig, RunOutcome, RunStats, parse_session, run_pipeline, run_with_shutdown};
pub use stages::{EmitterConfig, assemble_session};
