use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{IdentityCache, format_terms};
use crate::error::CacheError;
use crate::models::{DeduplicationRecord, MergeReason, MpIdentity};
use crate::text::{contains_conjunction_words, first_n_words, name_similarity, normalize_mp_name};

/// Configuration for identity table deduplication
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Minimum similarity of the leading words for two names to merge
    pub similarity_threshold: f64,
    /// Names longer than this (in characters) are flagged for review
    pub max_name_length: usize,
    /// How many leading words are compared
    pub compare_words: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            max_name_length: 45,
            compare_words: 3,
        }
    }
}

/// A name that is probably an extraction artefact rather than a person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblematicName {
    pub name: String,
    pub reasons: Vec<String>,
}

/// Outcome of deduplicating an identity table
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    /// Deduplicated table, one entry per canonical name
    pub table: BTreeMap<String, MpIdentity>,
    /// One record per variant folded into a canonical entry
    pub records: Vec<DeduplicationRecord>,
    /// Flagged for review only; still grouped and kept
    pub problematic: Vec<ProblematicName>,
    pub original_count: usize,
    pub normalized_count: usize,
}

impl DedupReport {
    pub fn count(&self, reason: MergeReason) -> usize {
        self.records.iter().filter(|r| r.reason == reason).count()
    }
}

/// Reasons a name looks like a capture error: excessive length, or a
/// standalone conjunction suggesting two names or a description were
/// captured together.
pub fn problematic_reasons(name: &str, max_len: usize) -> Vec<String> {
    let mut reasons = Vec::new();

    let length = name.chars().count();
    if length > max_len {
        reasons.push(format!("Too long ({} chars)", length));
    }
    if contains_conjunction_words(name) {
        reasons.push("Contains 've' or 'ile'".to_string());
    }

    reasons
}

/// Merge entries whose names normalize identically. Every original name
/// that changed under normalization gets a `direct_normalization` record.
fn merge_by_normalization(
    entries: &BTreeMap<String, MpIdentity>,
) -> (BTreeMap<String, MpIdentity>, Vec<DeduplicationRecord>) {
    let mut table: BTreeMap<String, MpIdentity> = BTreeMap::new();
    let mut originals: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (original, identity) in entries {
        let normalized = normalize_mp_name(original);
        let key = if normalized.is_empty() {
            original.clone()
        } else {
            normalized
        };

        table
            .entry(key.clone())
            .and_modify(|existing| existing.absorb(identity))
            .or_insert_with(|| identity.clone());
        originals.entry(key).or_default().push(original.clone());
    }

    let mut records = Vec::new();
    for (canonical, names) in &originals {
        let Some(merged) = table.get(canonical) else {
            continue;
        };
        for original in names.iter().filter(|n| *n != canonical) {
            let Some(identity) = entries.get(original) else {
                continue;
            };
            records.push(DeduplicationRecord {
                original_name: original.clone(),
                canonical_name: canonical.clone(),
                reason: MergeReason::DirectNormalization,
                original: identity.clone(),
                merged: merged.clone(),
            });
        }
    }

    (table, records)
}

/// Pick the canonical name of a group: a party beats no party, then more
/// distinct terms, then the shorter name. The earliest name wins a tie.
pub fn select_canonical<'a>(names: &[&'a str], table: &BTreeMap<String, MpIdentity>) -> Option<&'a str> {
    let score = |name: &str| {
        let identity = table.get(name);
        (
            identity.is_some_and(MpIdentity::has_party),
            identity.map_or(0, |i| i.terms.len()),
            std::cmp::Reverse(name.chars().count()),
        )
    };

    let mut best: Option<(&'a str, _)> = None;
    for &name in names {
        let candidate = score(name);
        if best.as_ref().is_none_or(|(_, s)| candidate > *s) {
            best = Some((name, candidate));
        }
    }
    best.map(|(name, _)| name)
}

/// Group names whose leading words are similar. Each name is visited once;
/// names absorbed into an earlier group are not considered again.
fn group_similar_names(
    table: &BTreeMap<String, MpIdentity>,
    config: &DedupConfig,
) -> Vec<(String, Vec<String>)> {
    let names: Vec<&str> = table.keys().map(String::as_str).collect();
    let heads: Vec<String> = names
        .iter()
        .map(|n| first_n_words(n, config.compare_words))
        .collect();

    let mut processed: HashSet<usize> = HashSet::new();
    let mut groups = Vec::new();

    for i in 0..names.len() {
        if processed.contains(&i) {
            continue;
        }

        let mut candidates: Vec<(usize, f64)> = (0..names.len())
            .filter(|&j| j != i && !processed.contains(&j))
            .map(|j| (j, name_similarity(&heads[i], &heads[j])))
            .filter(|&(_, score)| score >= config.similarity_threshold)
            .collect();

        processed.insert(i);
        if candidates.is_empty() {
            groups.push((names[i].to_string(), Vec::new()));
            continue;
        }

        // Names with party data first, then the closest
        candidates.sort_by(|a, b| {
            let party_a = table.get(names[a.0]).is_some_and(MpIdentity::has_party);
            let party_b = table.get(names[b.0]).is_some_and(MpIdentity::has_party);
            party_b
                .cmp(&party_a)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut members: Vec<&str> = vec![names[i]];
        for (j, _) in candidates {
            processed.insert(j);
            members.push(names[j]);
        }

        let canonical = select_canonical(&members, table).unwrap_or(names[i]);
        let variants = members
            .into_iter()
            .filter(|m| *m != canonical)
            .map(str::to_string)
            .collect();
        groups.push((canonical.to_string(), variants));
    }

    groups
}

/// Deduplicate an identity table.
///
/// 1. Merge names that normalize to the same string
/// 2. Flag problematic names (reported, not removed)
/// 3. Group names whose first words are similar
/// 4. Merge each group into its canonical entry: the first non-empty party
///    (canonical first) and the union of all terms
pub fn deduplicate(entries: &BTreeMap<String, MpIdentity>, config: &DedupConfig) -> DedupReport {
    let (normalized, mut records) = merge_by_normalization(entries);

    let problematic: Vec<ProblematicName> = normalized
        .keys()
        .filter_map(|name| {
            let reasons = problematic_reasons(name, config.max_name_length);
            (!reasons.is_empty()).then(|| ProblematicName {
                name: name.clone(),
                reasons,
            })
        })
        .collect();

    let mut table = BTreeMap::new();
    for (canonical, variants) in group_similar_names(&normalized, config) {
        let mut merged = normalized.get(&canonical).cloned().unwrap_or_default();
        for variant in &variants {
            if let Some(identity) = normalized.get(variant) {
                merged.absorb(identity);
            }
        }

        for variant in variants {
            debug!("Merging {:?} into {:?}", variant, canonical);
            records.push(DeduplicationRecord {
                original: normalized.get(&variant).cloned().unwrap_or_default(),
                original_name: variant,
                canonical_name: canonical.clone(),
                reason: MergeReason::FuzzyMatch,
                merged: merged.clone(),
            });
        }

        table.insert(canonical, merged);
    }

    DedupReport {
        original_count: entries.len(),
        normalized_count: normalized.len(),
        table,
        records,
        problematic,
    }
}

/// Copy the table next to itself before it is rewritten:
/// `<stem>_backup.csv`, or a timestamped name if that already exists.
pub fn backup_table(path: &Path) -> Result<PathBuf, CacheError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp_lookup".to_string());

    let mut backup = path.with_file_name(format!("{}_backup.csv", stem));
    if backup.exists() {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        backup = path.with_file_name(format!("{}_backup_{}.csv", stem, stamp));
    }

    fs::copy(path, &backup).map_err(|source| CacheError::Io {
        path: backup.clone(),
        source,
    })?;
    Ok(backup)
}

#[derive(Debug, Serialize)]
struct LogRow<'a> {
    original_name: &'a str,
    canonical_name: &'a str,
    reason: String,
    original_party: &'a str,
    original_terms: String,
    merged_party: &'a str,
    merged_terms: String,
}

const LOG_HEADER: [&str; 7] = [
    "original_name",
    "canonical_name",
    "reason",
    "original_party",
    "original_terms",
    "merged_party",
    "merged_terms",
];

/// Write the merge audit log as CSV. The header is written even when
/// nothing was merged.
pub fn write_dedup_log(path: &Path, records: &[DeduplicationRecord]) -> Result<(), CacheError> {
    let csv_err = |source| CacheError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(LOG_HEADER).map_err(csv_err)?;
    for record in records {
        writer
            .serialize(LogRow {
                original_name: &record.original_name,
                canonical_name: &record.canonical_name,
                reason: record.reason.to_string(),
                original_party: record.original.party.as_deref().unwrap_or_default(),
                original_terms: format_terms(&record.original.terms),
                merged_party: record.merged.party.as_deref().unwrap_or_default(),
                merged_terms: format_terms(&record.merged.terms),
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Paths used by a deduplication run
#[derive(Debug, Clone)]
pub struct DedupPaths {
    pub input: PathBuf,
    /// Defaults to overwriting the input after backing it up
    pub output: PathBuf,
    pub log: PathBuf,
}

impl DedupPaths {
    pub fn for_input(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            output: input.to_path_buf(),
            log: input.with_file_name("mp_deduplication_log.csv"),
        }
    }
}

/// Back up, deduplicate and rewrite an identity table file
pub fn deduplicate_file(paths: &DedupPaths, config: &DedupConfig) -> Result<DedupReport, CacheError> {
    let backup = backup_table(&paths.input)?;
    info!("Backed up identity table to {:?}", backup);

    let mut cache = IdentityCache::load(&paths.input)?;
    let report = deduplicate(cache.entries(), config);

    for entry in &report.problematic {
        warn!("Problematic name {:?}: {}", entry.name, entry.reasons.join("; "));
    }

    cache.replace_entries(report.table.clone());
    cache.save_to(&paths.output)?;
    write_dedup_log(&paths.log, &report.records)?;

    info!(
        "Deduplicated {} -> {} identities ({} normalization, {} fuzzy merges)",
        report.original_count,
        report.table.len(),
        report.count(MergeReason::DirectNormalization),
        report.count(MergeReason::FuzzyMatch)
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(party: Option<&str>, terms: &[u32]) -> MpIdentity {
        MpIdentity::new(party.map(str::to_string), terms.iter().copied())
    }

    fn table(rows: &[(&str, Option<&str>, &[u32])]) -> BTreeMap<String, MpIdentity> {
        rows.iter()
            .map(|(name, party, terms)| (name.to_string(), identity(*party, terms)))
            .collect()
    }

    #[test]
    fn test_normalization_merge_keeps_party_and_unions_terms() {
        let entries = table(&[("John Doe", Some("A"), &[17]), ("John Doe'", None, &[18])]);
        let report = deduplicate(&entries, &DedupConfig::default());

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table.get("John Doe"), Some(&identity(Some("A"), &[17, 18])));

        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.original_name, "John Doe'");
        assert_eq!(record.canonical_name, "John Doe");
        assert_eq!(record.reason, MergeReason::DirectNormalization);
        assert_eq!(record.merged, identity(Some("A"), &[17, 18]));
    }

    #[test]
    fn test_fuzzy_merge_prefers_name_with_party() {
        let entries = table(&[
            ("Mehmet Yilmaz", None, &[20]),
            ("Mehmet Yılmaz", Some("ANAP"), &[19]),
            ("Zeynep Kaya", Some("CHP"), &[22]),
        ]);
        let report = deduplicate(&entries, &DedupConfig::default());

        assert_eq!(report.table.len(), 2);
        assert_eq!(
            report.table.get("Mehmet Yılmaz"),
            Some(&identity(Some("ANAP"), &[19, 20]))
        );
        assert!(report.table.contains_key("Zeynep Kaya"));
        assert_eq!(report.count(MergeReason::FuzzyMatch), 1);
        assert_eq!(report.records[0].original_name, "Mehmet Yilmaz");
    }

    #[test]
    fn test_distinct_names_are_kept() {
        let entries = table(&[("Ali Kaya", Some("A"), &[20]), ("Veli Demir", Some("B"), &[21])]);
        let report = deduplicate(&entries, &DedupConfig::default());
        assert_eq!(report.table, entries);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_problematic_reasons() {
        let long_name = "a".repeat(46);
        assert_eq!(problematic_reasons(&long_name, 45), vec!["Too long (46 chars)".to_string()]);
        assert_eq!(
            problematic_reasons("Ali Kaya ve Veli Demir", 45),
            vec!["Contains 've' or 'ile'".to_string()]
        );
        assert!(problematic_reasons("Vedat Ilgaz", 45).is_empty());
    }

    #[test]
    fn test_problematic_names_are_still_kept() {
        let entries = table(&[("Ali Kaya ve Veli Demir", None, &[])]);
        let report = deduplicate(&entries, &DedupConfig::default());
        assert_eq!(report.problematic.len(), 1);
        assert!(report.table.contains_key("Ali Kaya ve Veli Demir"));
    }

    #[test]
    fn test_select_canonical_ordering() {
        let entries = table(&[
            ("Ahmet Yılmaz Uzun", Some("A"), &[17, 18]),
            ("Ahmet Yılmaz", Some("A"), &[17, 18]),
            ("Ahmet Yilmaz", None, &[17, 18, 19]),
        ]);
        let names = ["Ahmet Yılmaz Uzun", "Ahmet Yılmaz", "Ahmet Yilmaz"];
        assert_eq!(select_canonical(&names, &entries), Some("Ahmet Yılmaz"));
    }

    #[test]
    fn test_deduplicate_file_backs_up_and_logs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("mp_lookup.csv");
        std::fs::write(
            &input,
            "speech_giver,political_party,terms\nJohn Doe,A,[17]\nJohn Doe',,[18]\n",
        )
        .unwrap();

        let paths = DedupPaths::for_input(&input);
        let report = deduplicate_file(&paths, &DedupConfig::default()).unwrap();
        assert_eq!(report.table.len(), 1);

        let backup = std::fs::read_to_string(dir.path().join("mp_lookup_backup.csv")).unwrap();
        assert!(backup.contains("John Doe'"));

        let rewritten = IdentityCache::load(&input).unwrap();
        assert_eq!(rewritten.len(), 1);
        assert_eq!(rewritten.get("John Doe").unwrap().terms, vec![17, 18]);

        let log = std::fs::read_to_string(&paths.log).unwrap();
        assert!(log.starts_with("original_name,canonical_name,reason"));
        assert!(log.contains("direct_normalization"));
    }

    #[test]
    fn test_dedup_log_has_header_without_merges() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("mp_lookup.csv");
        std::fs::write(
            &input,
            "speech_giver,political_party,terms\nAli Kaya,ANAP,[17]\nVeli Demir,DYP,[18]\n",
        )
        .unwrap();

        let paths = DedupPaths::for_input(&input);
        let report = deduplicate_file(&paths, &DedupConfig::default()).unwrap();
        assert!(report.records.is_empty());

        let log = std::fs::read_to_string(&paths.log).unwrap();
        assert_eq!(
            log.trim_end(),
            "original_name,canonical_name,reason,original_party,original_terms,merged_party,merged_terms"
        );
    }
}
