use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::{Dialect, Session, derive_session_id};

static TERM_YEAR_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^d(\d+)-y(\d+)_txts$").expect("valid term/year dir regex"));

/// File name of the OCR output inside each older-era session folder
pub const LEGACY_TRANSCRIPT_NAME: &str = "result.mmd";

/// Table-of-contents and agenda files that sit beside newer transcripts
const SKIPPED_SUFFIXES: &[&str] = &["fih.txt", "gnd.txt"];

/// Restricts discovery to one term and, optionally, one year of it
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryFilter {
    pub term: Option<u32>,
    pub year: Option<u32>,
}

impl DiscoveryFilter {
    pub fn accepts(&self, term: u32, year: u32) -> bool {
        self.term.is_none_or(|t| t == term) && self.year.is_none_or(|y| y == year)
    }
}

/// A transcript found on disk, not yet read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub term: u32,
    pub year: u32,
    pub path: PathBuf,
    /// Emitted as the record's `file` field
    pub file: String,
    /// Folder name (older era) or file stem (newer era) carrying the
    /// session number
    pub session_name: String,
}

/// Parse a `d{term}-y{year}_txts` directory name
pub fn parse_term_year_dir(name: &str) -> Option<(u32, u32)> {
    let caps = TERM_YEAR_DIR.captures(name)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn dir_name(path: Option<&Path>) -> Option<&str> {
    path?.file_name()?.to_str()
}

/// Classify one file under the root; `None` for anything that is not a
/// session transcript.
fn classify(path: &Path) -> Option<SessionFile> {
    let file_name = path.file_name()?.to_str()?;
    let parent = path.parent();

    if file_name == LEGACY_TRANSCRIPT_NAME {
        let folder = dir_name(parent)?;
        let (term, year) = parse_term_year_dir(dir_name(parent.and_then(Path::parent))?)?;
        return Some(SessionFile {
            term,
            year,
            path: path.to_path_buf(),
            file: format!("{}/{}", folder, LEGACY_TRANSCRIPT_NAME),
            session_name: folder.to_string(),
        });
    }

    let lower = file_name.to_lowercase();
    if !lower.ends_with(".txt") || SKIPPED_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return None;
    }
    let (term, year) = parse_term_year_dir(dir_name(parent)?)?;
    let stem = path.file_stem()?.to_str()?;

    Some(SessionFile {
        term,
        year,
        path: path.to_path_buf(),
        file: file_name.to_string(),
        session_name: stem.to_string(),
    })
}

/// Find every session transcript under `root`, sorted by path.
///
/// Layout: `<root>/d{T}-y{Y}_txts/<session folder>/result.mmd` for the older
/// era and `<root>/d{T}-y{Y}_txts/<session>.txt` for the newer one.
pub fn discover_sessions(root: &Path, filter: &DiscoveryFilter) -> Result<Vec<SessionFile>> {
    if !root.is_dir() {
        anyhow::bail!("Transcript root {:?} is not a directory", root);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(3) {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file) = classify(entry.path()) else {
            continue;
        };
        if filter.accepts(file.term, file.year) {
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Discovered {} session files under {:?}", files.len(), root);
    Ok(files)
}

/// Read a transcript, replacing undecodable bytes. `None` when the session
/// number cannot be derived from its name.
pub fn read_session(file: &SessionFile) -> Result<Option<Session>> {
    let Some(session_id) = derive_session_id(&file.session_name, file.term, file.year) else {
        debug!("No session number in {:?}", file.session_name);
        return Ok(None);
    };

    let bytes = std::fs::read(&file.path).with_context(|| format!("Failed to read file: {:?}", file.path))?;

    Ok(Some(Session {
        term: file.term,
        year: file.year,
        file: file.file.clone(),
        path: file.path.clone(),
        session_id,
        text: String::from_utf8_lossy(&bytes).into_owned(),
    }))
}

/// Build a `SessionFile` for a single transcript outside the usual walk.
/// Term and year come from the arguments or, failing that, from the
/// enclosing `d{T}-y{Y}_txts` directory.
pub fn session_file_for_path(path: &Path, term: Option<u32>, year: Option<u32>) -> Result<SessionFile> {
    if let Some(mut file) = classify(path) {
        file.term = term.unwrap_or(file.term);
        file.year = year.unwrap_or(file.year);
        return Ok(file);
    }

    let term = term.context("Term is required for a file outside a d{T}-y{Y}_txts directory")?;
    let year = year.unwrap_or(0);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Transcript path has no file name")?;

    let session_name = match Dialect::for_term(term) {
        Dialect::OffAgenda if file_name == LEGACY_TRANSCRIPT_NAME => dir_name(path.parent()).unwrap_or(file_name),
        _ => path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name),
    };

    Ok(SessionFile {
        term,
        year,
        path: path.to_path_buf(),
        file: file_name.to_string(),
        session_name: session_name.to_string(),
    })
}
