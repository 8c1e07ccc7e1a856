use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::identity::{IdentityLookup, IdentityResolver};
use crate::io::{FailedRecord, SpeechSink};
use crate::models::{ExtractedSpeech, MpIdentity, Session, Speech};

/// Combine a located speech with its session and resolved identity
pub fn assemble_speech(session: &Session, extracted: ExtractedSpeech, identity: &MpIdentity) -> Speech {
    Speech::from_parts(session, extracted, identity)
}

/// Perform Stage 3: record assembly
///
/// Resolves each speaker through the identity resolver and builds the
/// final records in speech order.
pub async fn assemble_session<L: IdentityLookup>(
    session: &Session,
    speeches: Vec<ExtractedSpeech>,
    resolver: &mut IdentityResolver<L>,
) -> Vec<Speech> {
    let mut records = Vec::with_capacity(speeches.len());
    for extracted in speeches {
        let identity = resolver.resolve(&extracted.summary.speech_giver).await;
        records.push(assemble_speech(session, extracted, &identity));
    }
    records
}

/// Configuration for batched emission
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Records per upsert request
    pub batch_size: usize,
    /// Retries of failed records after the first attempt
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Check the store first and leave records it already holds alone
    pub skip_existing: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            skip_existing: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitStats {
    pub emitted: usize,
    pub failed: usize,
    pub skipped_existing: usize,
    pub batches: usize,
}

/// Buffers records and writes them to a sink in batches. Records the sink
/// rejects are retried individually; those still failing are collected
/// for the failure report instead of aborting the run.
pub struct Emitter<'a, S> {
    sink: &'a S,
    config: EmitterConfig,
    pending: Vec<Speech>,
    stats: EmitStats,
    failures: Vec<FailedRecord>,
}

impl<'a, S: SpeechSink> Emitter<'a, S> {
    pub fn new(sink: &'a S, config: EmitterConfig) -> Self {
        Self {
            sink,
            pending: Vec::with_capacity(config.batch_size),
            config,
            stats: EmitStats::default(),
            failures: Vec::new(),
        }
    }

    pub async fn push(&mut self, speech: Speech) {
        self.pending.push(speech);
        if self.pending.len() >= self.config.batch_size.max(1) {
            self.flush().await;
        }
    }

    /// Write everything buffered so far
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut batch = std::mem::take(&mut self.pending);

        if self.config.skip_existing {
            let keys: Vec<String> = batch.iter().map(Speech::key).collect();
            match self.sink.existing_keys(&keys).await {
                Ok(existing) => {
                    let before = batch.len();
                    batch.retain(|s| !existing.contains(&s.key()));
                    self.stats.skipped_existing += before - batch.len();
                }
                Err(e) => warn!("Could not check for existing records, writing all: {}", e),
            }
        }

        if batch.is_empty() {
            return;
        }

        self.stats.batches += 1;
        self.write_with_retry(batch).await;
    }

    async fn write_with_retry(&mut self, mut batch: Vec<Speech>) {
        let mut last_failures = Vec::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                info!(
                    "Retrying {} records: retry {} of {}",
                    batch.len(),
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }

            match self.sink.upsert_batch(&batch).await {
                Ok(outcome) => {
                    self.stats.emitted += outcome.written;
                    if outcome.failed.is_empty() {
                        return;
                    }

                    let failed_ids: HashSet<&str> = outcome.failed.iter().map(|f| f.id.as_str()).collect();
                    batch.retain(|s| failed_ids.contains(s.key().as_str()));
                    last_failures = outcome.failed;
                    if batch.is_empty() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Batch of {} records failed: {}", batch.len(), e);
                    last_failures = batch
                        .iter()
                        .map(|s| FailedRecord {
                            id: s.key(),
                            error: e.to_string(),
                        })
                        .collect();
                }
            }
        }

        for failure in &last_failures {
            debug!("Giving up on {}: {}", failure.id, failure.error);
        }
        warn!("{} records could not be stored", last_failures.len());
        self.stats.failed += last_failures.len();
        self.failures.extend(last_failures);
    }

    pub fn stats(&self) -> &EmitStats {
        &self.stats
    }

    pub fn failures(&self) -> &[FailedRecord] {
        &self.failures
    }
}
