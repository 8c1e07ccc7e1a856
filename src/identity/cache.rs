use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::models::MpIdentity;

/// Row layout of the persisted identity table
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    speech_giver: String,
    #[serde(default)]
    political_party: Option<String>,
    /// List literal such as `[17, 18]`
    #[serde(default)]
    terms: String,
}

/// Persistent name -> identity table.
///
/// Entries are only ever added; replacing an existing entry goes through
/// deduplication, which logs every merge.
#[derive(Debug, Clone, Default)]
pub struct IdentityCache {
    entries: BTreeMap<String, MpIdentity>,
    path: Option<PathBuf>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from `path`. A missing file is an empty table that
    /// will be created on the first save.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            info!("No identity table at {:?}, starting empty", path);
            return Ok(Self {
                entries: BTreeMap::new(),
                path: Some(path.to_path_buf()),
            });
        }

        let mut reader = csv::Reader::from_path(path).map_err(|source| CacheError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        for row in reader.deserialize::<CacheRow>() {
            let row = row.map_err(|source| CacheError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let name = row.speech_giver.trim().to_string();
            if name.is_empty() {
                continue;
            }

            let identity = MpIdentity::new(row.political_party, parse_terms(&row.terms));
            if entries.insert(name.clone(), identity).is_some() {
                warn!("Duplicate identity row for {:?}, keeping the later one", name);
            }
        }

        info!("Loaded {} identities from {:?}", entries.len(), path);

        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    /// Save to the path the table was loaded from; a table without one is
    /// kept in memory only.
    pub fn save(&self) -> Result<(), CacheError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => {
                debug!("Identity table has no backing file, not saving");
                Ok(())
            }
        }
    }

    /// Rewrite the whole table at `path` via a temporary sibling file.
    pub fn save_to(&self, path: &Path) -> Result<(), CacheError> {
        let tmp = path.with_extension("csv.tmp");
        let csv_err = |source| CacheError::Csv {
            path: tmp.clone(),
            source,
        };

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .map_err(csv_err)?;
            writer
                .write_record(["speech_giver", "political_party", "terms"])
                .map_err(csv_err)?;
            for (name, identity) in &self.entries {
                writer
                    .serialize(CacheRow {
                        speech_giver: name.clone(),
                        political_party: identity.party.clone(),
                        terms: format_terms(&identity.terms),
                    })
                    .map_err(csv_err)?;
            }
            writer.flush().map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        }

        fs::rename(&tmp, path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Saved {} identities to {:?}", self.entries.len(), path);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MpIdentity> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add an entry for a name not yet in the table. Returns false and
    /// leaves the table untouched when the name is already present.
    pub fn insert_new(&mut self, name: &str, identity: MpIdentity) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), identity);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MpIdentity)> {
        self.entries.iter().map(|(name, identity)| (name.as_str(), identity))
    }

    pub fn entries(&self) -> &BTreeMap<String, MpIdentity> {
        &self.entries
    }

    /// Replace the whole table, keeping the backing path
    pub fn replace_entries(&mut self, entries: BTreeMap<String, MpIdentity>) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render terms as a list literal: `[17, 18]`
pub fn format_terms(terms: &[u32]) -> String {
    let inner: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
    format!("[{}]", inner.join(", "))
}

/// Parse a terms list literal. Anything that is not a list of integers
/// yields an empty list.
pub fn parse_terms(raw: &str) -> Vec<u32> {
    let raw = raw.trim();
    let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
        return Vec::new();
    };
    if inner.trim().is_empty() {
        return Vec::new();
    }

    inner
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_default()
}
