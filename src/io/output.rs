use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::EmitError;
use crate::models::Speech;

/// Keys per `_mget` request when checking for existing records
const MGET_CHUNK: usize = 1000;

/// A record the store rejected, with the store's reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: String,
    pub error: String,
}

/// Result of upserting one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub written: usize,
    pub failed: Vec<FailedRecord>,
}

/// Destination for assembled speech records. Upserts are keyed by
/// `Speech::key`, so writing the same record twice leaves one copy.
pub trait SpeechSink: Send + Sync {
    fn upsert_batch(&self, speeches: &[Speech]) -> impl Future<Output = Result<BatchOutcome, EmitError>> + Send;

    /// Which of `keys` the store already holds
    fn existing_keys(&self, keys: &[String]) -> impl Future<Output = Result<HashSet<String>, EmitError>> + Send;
}

/// Configuration for the Elasticsearch sink
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "parliament_speeches".to_string(),
        }
    }
}

impl ElasticsearchConfig {
    /// Create config from ELASTICSEARCH_HOST / ELASTICSEARCH_INDEX, falling
    /// back to a local node
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("ELASTICSEARCH_HOST").unwrap_or(defaults.url),
            index: std::env::var("ELASTICSEARCH_INDEX").unwrap_or(defaults.index),
        }
    }
}

/// Bulk-indexes speeches into an Elasticsearch index
pub struct ElasticsearchSink {
    client: Client,
    config: ElasticsearchConfig,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MgetResponse {
    #[serde(default)]
    docs: Vec<MgetDoc>,
}

#[derive(Debug, Deserialize)]
struct MgetDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
}

impl ElasticsearchSink {
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn post(&self, url: String, content_type: &str, body: String) -> Result<String, EmitError> {
        let response = self
            .client
            .post(url)
            .header("content-type", content_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmitError::Status { status, body });
        }

        Ok(response.text().await?)
    }
}

impl SpeechSink for ElasticsearchSink {
    async fn upsert_batch(&self, speeches: &[Speech]) -> Result<BatchOutcome, EmitError> {
        if speeches.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut body = String::new();
        for speech in speeches {
            let action = json!({ "index": { "_index": self.config.index, "_id": speech.key() } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(speech)?);
            body.push('\n');
        }

        let text = self
            .post(self.endpoint("_bulk"), "application/x-ndjson", body)
            .await?;
        let response: BulkResponse =
            serde_json::from_str(&text).map_err(|e| EmitError::Response(e.to_string()))?;

        let outcome = bulk_outcome(speeches.len(), response);
        debug!("Bulk indexed {} speeches, {} rejected", outcome.written, outcome.failed.len());
        Ok(outcome)
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, EmitError> {
        let mut existing = HashSet::new();

        for chunk in keys.chunks(MGET_CHUNK) {
            let body = json!({ "ids": chunk }).to_string();
            let url = format!("{}?_source=false", self.endpoint(&format!("{}/_mget", self.config.index)));
            let text = match self.post(url, "application/json", body).await {
                Ok(text) => text,
                Err(EmitError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
                    // index not created yet
                    return Ok(existing);
                }
                Err(e) => return Err(e),
            };

            let response: MgetResponse =
                serde_json::from_str(&text).map_err(|e| EmitError::Response(e.to_string()))?;
            existing.extend(response.docs.into_iter().filter(|d| d.found).map(|d| d.id));
        }

        Ok(existing)
    }
}

/// Per-item errors are only read when the response's `errors` flag is set
fn bulk_outcome(total: usize, response: BulkResponse) -> BatchOutcome {
    let failed: Vec<FailedRecord> = if response.errors {
        response
            .items
            .into_iter()
            .flat_map(|item| item.into_values())
            .filter_map(|item| {
                item.error.map(|error| FailedRecord {
                    id: item.id,
                    error: error.to_string(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    BatchOutcome {
        written: total.saturating_sub(failed.len()),
        failed,
    }
}

/// Keeps records in memory; used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<BTreeMap<String, Speech>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<Speech> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl SpeechSink for MemorySink {
    async fn upsert_batch(&self, speeches: &[Speech]) -> Result<BatchOutcome, EmitError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for speech in speeches {
            records.insert(speech.key(), speech.clone());
        }
        Ok(BatchOutcome {
            written: speeches.len(),
            failed: Vec::new(),
        })
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, EmitError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.iter().filter(|k| records.contains_key(*k)).cloned().collect())
    }
}

/// JSON Lines file keyed by record id. Batches are appended; a record
/// written again supersedes its earlier line, and superseded lines are
/// dropped the next time the file is opened.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    state: tokio::sync::Mutex<JsonLinesState>,
}

#[derive(Debug)]
struct JsonLinesState {
    keys: HashSet<String>,
    file: tokio::fs::File,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self, EmitError> {
        let io_err = |source| EmitError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut keys = HashSet::new();

        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(io_err)?;
            let mut records = BTreeMap::new();
            let mut lines = 0;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                let speech: Speech = serde_json::from_str(line)?;
                records.insert(speech.key(), speech);
                lines += 1;
            }

            if lines > records.len() {
                debug!("Compacting {:?}: {} lines, {} records", path, lines, records.len());
                compact_json_lines(path, &records)?;
            }
            info!("Loaded {} existing records from {:?}", records.len(), path);
            keys = records.into_keys().collect();
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            state: tokio::sync::Mutex::new(JsonLinesState {
                keys,
                file: tokio::fs::File::from_std(file),
            }),
        })
    }
}

/// Rewrite the file with one line per record, via a temporary file
fn compact_json_lines(path: &Path, records: &BTreeMap<String, Speech>) -> Result<(), EmitError> {
    let tmp = path.with_extension("jsonl.tmp");

    let mut out = String::new();
    for speech in records.values() {
        out.push_str(&serde_json::to_string(speech)?);
        out.push('\n');
    }

    std::fs::write(&tmp, out).map_err(|source| EmitError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

impl SpeechSink for JsonLinesSink {
    async fn upsert_batch(&self, speeches: &[Speech]) -> Result<BatchOutcome, EmitError> {
        let mut out = String::new();
        for speech in speeches {
            out.push_str(&serde_json::to_string(speech)?);
            out.push('\n');
        }

        let io_err = |source| EmitError::Io {
            path: self.path.clone(),
            source,
        };
        let mut state = self.state.lock().await;
        state.file.write_all(out.as_bytes()).await.map_err(io_err)?;
        state.file.flush().await.map_err(io_err)?;
        state.keys.extend(speeches.iter().map(Speech::key));

        Ok(BatchOutcome {
            written: speeches.len(),
            failed: Vec::new(),
        })
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, EmitError> {
        let state = self.state.lock().await;
        Ok(keys.iter().filter(|k| state.keys.contains(*k)).cloned().collect())
    }
}

/// Write records that could not be stored as a JSON array of `{id, error}`
pub fn write_failed_records(path: &Path, failed: &[FailedRecord]) -> Result<(), EmitError> {
    let file = std::fs::File::create(path).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(file, failed)?;
    Ok(())
}
