use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::grammar::{boundary_grammar, summary_grammar};
use crate::identity::{IdentityLookup, IdentityResolver, ResolverStats};
use crate::io::{DiscoveryFilter, FailedRecord, SessionFile, SpeechSink, discover_sessions, read_session};
use crate::models::Session;
use crate::stages::{
    BoundaryExtraction, EmitStats, Emitter, EmitterConfig, SummaryExtraction, assemble_session,
    extract_full_speeches, extract_speech_summaries, normalize_raw_text,
};

/// Configuration for a full pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the `d{T}-y{Y}_txts` folders
    pub root: PathBuf,
    pub filter: DiscoveryFilter,
    pub emitter: EmitterConfig,
    /// Parsed sessions buffered between the parser pool and the writer
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            filter: DiscoveryFilter::default(),
            emitter: EmitterConfig::default(),
            channel_capacity: 32,
        }
    }
}

/// Counters reported at the end of a run, complete or interrupted
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub run_id: String,
    pub sessions_discovered: usize,
    pub sessions_processed: usize,
    /// No session number could be derived
    pub sessions_skipped: usize,
    pub sessions_unreadable: usize,
    pub sessions_without_index: usize,
    pub sessions_without_transcript: usize,
    pub sequence_breaks: usize,
    pub summaries_found: usize,
    pub speeches_extracted: usize,
    pub summaries_without_speech: usize,
    pub identity: ResolverStats,
    pub emit: EmitStats,
    #[serde(skip)]
    pub failures: Vec<FailedRecord>,
}

impl RunStats {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    fn record_session(&mut self, parsed: &ParsedSession) {
        let session_id = &parsed.session.session_id;
        self.sessions_processed += 1;

        if !parsed.summaries.index_found {
            info!("{}: no speech index found", session_id);
            self.sessions_without_index += 1;
        } else if parsed.summaries.summaries.is_empty() {
            info!("{}: index has no speech summaries", session_id);
        }

        if let Some(brk) = parsed.summaries.sequence_break {
            warn!(
                "{}: index numbering jumps from {} to {}, later entries dropped",
                session_id,
                brk.expected - 1,
                brk.found
            );
            self.sequence_breaks += 1;
        }

        if !parsed.summaries.summaries.is_empty() && !parsed.boundaries.transcript_found {
            info!("{}: transcript section not found", session_id);
            self.sessions_without_transcript += 1;
        }

        if parsed.boundaries.transcript_found && !parsed.boundaries.missing.is_empty() {
            info!(
                "{}: no speech body for speech_no {:?}",
                session_id, parsed.boundaries.missing
            );
        }

        self.summaries_found += parsed.summaries.summaries.len();
        self.speeches_extracted += parsed.boundaries.speeches.len();
        self.summaries_without_speech += parsed.boundaries.missing.len();

        debug!(
            "{}: {} summaries, {} speeches",
            session_id,
            parsed.summaries.summaries.len(),
            parsed.boundaries.speeches.len()
        );
    }
}

/// Stages 0-2 applied to one session. The raw text is dropped once parsed.
#[derive(Debug, Clone)]
pub struct ParsedSession {
    pub session: Session,
    pub summaries: SummaryExtraction,
    pub boundaries: BoundaryExtraction,
}

/// Normalize, extract summaries, then locate each speech
pub fn parse_session(session: Session) -> ParsedSession {
    let text = normalize_raw_text(&session.text);
    let dialect = session.dialect();

    let summaries = extract_speech_summaries(&text, summary_grammar(dialect));
    let boundaries = extract_full_speeches(&text, &summaries.summaries, boundary_grammar(dialect));

    ParsedSession {
        session: Session {
            text: String::new(),
            ..session
        },
        summaries,
        boundaries,
    }
}

enum SessionOutcome {
    Parsed(Box<ParsedSession>),
    Skipped(SessionFile),
    Unreadable(SessionFile, String),
}

/// Parse sessions on the rayon pool, handing each result to the writer.
/// Stops early once the receiving side has gone away.
fn parse_all(files: Vec<SessionFile>, tx: mpsc::Sender<SessionOutcome>) {
    let result = files.into_par_iter().try_for_each_with(tx, |tx, file| {
        let outcome = match read_session(&file) {
            Ok(Some(session)) => SessionOutcome::Parsed(Box::new(parse_session(session))),
            Ok(None) => SessionOutcome::Skipped(file),
            Err(e) => SessionOutcome::Unreadable(file, format!("{:#}", e)),
        };
        tx.blocking_send(outcome).map_err(|_| ())
    });

    if result.is_err() {
        debug!("Writer stopped, abandoning remaining sessions");
    }
}

/// Run the whole pipeline over `config.root`.
///
/// Sessions are parsed in parallel; identity resolution and emission run on
/// this task only, so the identity table has a single writer. `stats` is
/// updated as sessions complete, which keeps it meaningful if this future
/// is dropped part way.
pub async fn run_pipeline<L, S>(
    config: &PipelineConfig,
    resolver: &mut IdentityResolver<L>,
    sink: &S,
    stats: &mut RunStats,
) -> Result<()>
where
    L: IdentityLookup,
    S: SpeechSink,
{
    let files = discover_sessions(&config.root, &config.filter)?;
    stats.sessions_discovered = files.len();

    let (tx, mut rx) = mpsc::channel(config.channel_capacity.max(1));
    let producer = tokio::task::spawn_blocking(move || parse_all(files, tx));

    let mut emitter = Emitter::new(sink, config.emitter.clone());

    while let Some(outcome) = rx.recv().await {
        match outcome {
            SessionOutcome::Parsed(parsed) => {
                stats.record_session(&parsed);
                let ParsedSession {
                    session, boundaries, ..
                } = *parsed;

                let records = assemble_session(&session, boundaries.speeches, resolver).await;
                for record in records {
                    emitter.push(record).await;
                }
            }
            SessionOutcome::Skipped(file) => {
                warn!("Skipping {:?}: no session number in {:?}", file.path, file.session_name);
                stats.sessions_skipped += 1;
            }
            SessionOutcome::Unreadable(file, error) => {
                warn!("Skipping {:?}: {}", file.path, error);
                stats.sessions_unreadable += 1;
            }
        }

        stats.identity = resolver.stats().clone();
        stats.emit = emitter.stats().clone();
        if emitter.failures().len() != stats.failures.len() {
            stats.failures = emitter.failures().to_vec();
        }
    }

    emitter.flush().await;
    stats.identity = resolver.stats().clone();
    stats.emit = emitter.stats().clone();
    stats.failures = emitter.failures().to_vec();

    producer.await.context("Session parser task failed")?;

    info!(
        "Run complete: {} sessions, {} summaries, {} speeches, {} emitted",
        stats.sessions_processed, stats.summaries_found, stats.speeches_extracted, stats.emit.emitted
    );
    Ok(())
}

/// How a run guarded by a shutdown future ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

/// Run the pipeline until it finishes or `shutdown` resolves, then save the
/// identity table either way. Names resolved before an interruption are on
/// disk when this returns; records still buffered in the emitter are not
/// written, and a rerun upserts them under the same keys.
pub async fn run_with_shutdown<L, S, F>(
    config: &PipelineConfig,
    resolver: &mut IdentityResolver<L>,
    sink: &S,
    stats: &mut RunStats,
    shutdown: F,
) -> Result<RunOutcome>
where
    L: IdentityLookup,
    S: SpeechSink,
    F: Future<Output = ()>,
{
    let finished = tokio::select! {
        result = run_pipeline(config, &mut *resolver, sink, &mut *stats) => Some(result),
        _ = shutdown => None,
    };

    let saved = resolver.save();
    match &saved {
        Ok(()) => info!("Identity table saved ({} entries)", resolver.cache().len()),
        Err(e) => error!("Failed to save identity table: {}", e),
    }

    let outcome = match finished {
        Some(result) => {
            result?;
            RunOutcome::Completed
        }
        None => {
            warn!("Run interrupted; records already written are kept");
            RunOutcome::Interrupted
        }
    };
    saved.context("Failed to save identity table")?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::error::LookupError;
    use crate::identity::{IdentityCache, NoLookup, ResolverConfig};
    use crate::io::MemorySink;
    use crate::models::MpIdentity;
    use tempfile::TempDir;

    const SESSION_TEXT: &str = "A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem konusunda gündem dışı konuşması
2. — Ankara Milletvekili Ayşe Demir'in, tarım konusunda gündem dışı konuşması
B) TEZKERELER

A) GÜNDEM DIŞI KONUŞMALAR
1. — İstanbul Milletvekili Ahmet Yılmaz'ın, deprem konusunda gündem dışı konuşması
BAŞKAN — Gündem dışı ilk söz, Sayın Ahmet Yılmaz'a aittir.
AHMET YILMAZ (İstanbul) — Sayın Başkan, değerli milletvekilleri;
deprem bölge-
sinde durum ağırdır.
BAŞKAN — Teşekkür ederim Sayın Yılmaz.
2. — Ankara Milletvekili Ayşe Demir'in, tarım konusunda gündem dışı konuşması
AYŞE DEMİR (Ankara) — Sayın Başkan, çiftçimiz zor durumdadır.";

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "d17-y1_txts/tbmm17001001/result.mmd", SESSION_TEXT);
        write(dir.path(), "d17-y1_txts/tbmm17001002/result.mmd", "BAŞKAN — Birleşimi açıyorum.");
        write(dir.path(), "d17-y1_txts/ekler/result.mmd", SESSION_TEXT);
        dir
    }

    fn resolver() -> IdentityResolver<NoLookup> {
        let mut cache = IdentityCache::new();
        cache.insert_new("Ahmet Yılmaz", MpIdentity::new(Some("ANAP".to_string()), [17]));
        IdentityResolver::new(cache, NoLookup, ResolverConfig::default())
    }

    #[test]
    fn test_parse_session_joins_hyphenated_words() {
        let session = Session {
            term: 17,
            year: 1,
            file: "tbmm17001001/result.mmd".to_string(),
            path: PathBuf::from("tbmm17001001/result.mmd"),
            session_id: "term17-year1-session001".to_string(),
            text: SESSION_TEXT.to_string(),
        };

        let parsed = parse_session(session);
        assert_eq!(parsed.summaries.summaries.len(), 2);
        assert_eq!(parsed.boundaries.speeches.len(), 2);
        assert!(parsed.boundaries.speeches[0].content.contains("deprem bölgesinde"));
        assert!(parsed.session.text.is_empty());
    }

    #[tokio::test]
    async fn test_run_pipeline_counts_and_emits() {
        let dir = fixture();
        let config = PipelineConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let sink = MemorySink::new();
        let mut resolver = resolver();
        let mut stats = RunStats::new("test");

        run_pipeline(&config, &mut resolver, &sink, &mut stats).await.unwrap();

        assert_eq!(stats.sessions_discovered, 3);
        assert_eq!(stats.sessions_processed, 2);
        assert_eq!(stats.sessions_skipped, 1);
        assert_eq!(stats.sessions_without_index, 1);
        assert_eq!(stats.summaries_found, 2);
        assert_eq!(stats.speeches_extracted, 2);
        assert_eq!(stats.summaries_without_speech, 0);
        assert_eq!(stats.emit.emitted, 2);
        assert!(stats.emit.emitted <= stats.summaries_found);

        let records = sink.records();
        assert_eq!(records[0].session_id, "term17-year1-session001");
        assert_eq!(records[0].political_party.as_deref(), Some("ANAP"));
        assert_eq!(records[1].political_party, None);
        assert_eq!(stats.identity.exact_hits, 1);
        assert_eq!(stats.identity.negative_results, 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = fixture();
        let config = PipelineConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let sink = MemorySink::new();
        let mut resolver = resolver();

        let mut first = RunStats::default();
        run_pipeline(&config, &mut resolver, &sink, &mut first).await.unwrap();
        let after_first = sink.records();

        let mut second = RunStats::default();
        run_pipeline(&config, &mut resolver, &sink, &mut second).await.unwrap();

        assert_eq!(sink.records(), after_first);
        assert_eq!(second.identity.negative_results, 1);
        assert_eq!(second.identity.exact_hits, 3);
    }

    #[tokio::test]
    async fn test_skip_existing_on_rerun() {
        let dir = fixture();
        let mut config = PipelineConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let sink = MemorySink::new();
        let mut resolver = resolver();

        run_pipeline(&config, &mut resolver, &sink, &mut RunStats::default())
            .await
            .unwrap();

        config.emitter.skip_existing = true;
        let mut stats = RunStats::default();
        run_pipeline(&config, &mut resolver, &sink, &mut stats).await.unwrap();

        assert_eq!(stats.emit.skipped_existing, 2);
        assert_eq!(stats.emit.emitted, 0);
    }

    #[tokio::test]
    async fn test_term_filter() {
        let dir = fixture();
        let config = PipelineConfig {
            root: dir.path().to_path_buf(),
            filter: DiscoveryFilter {
                term: Some(20),
                year: None,
            },
            ..Default::default()
        };
        let sink = MemorySink::new();
        let mut stats = RunStats::default();

        run_pipeline(&config, &mut resolver(), &sink, &mut stats).await.unwrap();
        assert_eq!(stats.sessions_discovered, 0);
        assert!(sink.is_empty());
    }

    /// Answers for Ahmet Yılmaz; any other name blocks forever after
    /// signalling that the run is stuck in a lookup
    struct StallingLookup {
        stalled: Arc<Notify>,
    }

    impl IdentityLookup for StallingLookup {
        async fn lookup(&self, name: &str) -> Result<Option<MpIdentity>, LookupError> {
            if name == "Ahmet Yılmaz" {
                return Ok(Some(MpIdentity::new(Some("ANAP".to_string()), [17, 18])));
            }
            self.stalled.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_interrupted_run_saves_resolved_names() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "d17-y1_txts/tbmm17001001/result.mmd", SESSION_TEXT);
        let cache_path = dir.path().join("mp_lookup.csv");

        let config = PipelineConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let stalled = Arc::new(Notify::new());
        let lookup = StallingLookup {
            stalled: stalled.clone(),
        };
        let mut resolver = IdentityResolver::new(
            IdentityCache::load(&cache_path).unwrap(),
            lookup,
            ResolverConfig::default(),
        );
        let sink = MemorySink::new();
        let mut stats = RunStats::new("interrupted");

        let outcome = run_with_shutdown(&config, &mut resolver, &sink, &mut stats, async move {
            stalled.notified().await
        })
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted);
        assert_eq!(resolver.stats().external_hits, 1);

        let saved = IdentityCache::load(&cache_path).unwrap();
        let ahmet = saved.get("Ahmet Yılmaz").unwrap();
        assert_eq!(ahmet.party.as_deref(), Some("ANAP"));
        assert_eq!(ahmet.terms, vec![17, 18]);
        assert!(!saved.contains("Ayşe Demir"));
    }

    #[tokio::test]
    async fn test_completed_run_saves_table() {
        let dir = fixture();
        let cache_path = dir.path().join("mp_lookup.csv");
        let config = PipelineConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut resolver = IdentityResolver::new(
            IdentityCache::load(&cache_path).unwrap(),
            NoLookup,
            ResolverConfig::default(),
        );
        let sink = MemorySink::new();
        let mut stats = RunStats::default();

        let outcome = run_with_shutdown(&config, &mut resolver, &sink, &mut stats, std::future::pending())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(sink.len(), 2);
        let saved = IdentityCache::load(&cache_path).unwrap();
        assert!(saved.contains("Ahmet Yılmaz"));
        assert!(saved.contains("Ayşe Demir"));
    }
}
