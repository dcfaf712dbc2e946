//! Finding the existing override lines for a package.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// An override line that may apply to a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideLine {
    /// File the line was found in.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// First token, the atom the line applies to.
    pub criterion: String,
    /// Remaining tokens up to the first `#` comment.
    pub tokens: Vec<String>,
}

impl OverrideLine {
    fn parse(file: &Path, line: usize, text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let criterion = words.next()?.to_string();
        let tokens = words
            .take_while(|w| !w.starts_with('#'))
            .map(str::to_string)
            .collect();
        Some(OverrideLine {
            file: file.to_path_buf(),
            line,
            criterion,
            tokens,
        })
    }
}

/// Collect every line under `path` whose atom names `cp`.
///
/// `path` may be a single file or a directory searched recursively, files
/// in name order. A missing path has no lines. The match is textual; the
/// caller decides whether a criterion really selects a given version.
pub fn scan(path: &Path, cp: &str) -> Result<Vec<OverrideLine>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let pattern = Regex::new(&format!(
        r"^[<>!=~]{{0,2}}{}(?:-[0-9]\S*|[:\[]\S*)?(?:\s.*)?$",
        regex::escape(cp)
    ))?;

    let mut found = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::io(path, io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let bytes = fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
        let content = String::from_utf8_lossy(&bytes);
        for (idx, text) in content.lines().enumerate() {
            if pattern.is_match(text) {
                found.extend(OverrideLine::parse(entry.path(), idx + 1, text));
            }
        }
    }

    debug!(path = %path.display(), cp, lines = found.len(), "scanned override location");
    Ok(found)
}

/// Scan results kept per location and package version until cleared.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScanCache {
    lines: HashMap<(PathBuf, String), Vec<OverrideLine>>,
}

impl ScanCache {
    pub(crate) fn lines(&mut self, path: &Path, cpv: &str, cp: &str) -> Result<Vec<OverrideLine>> {
        let key = (path.to_path_buf(), cpv.to_string());
        if let Some(lines) = self.lines.get(&key) {
            return Ok(lines.clone());
        }
        let lines = scan(path, cp)?;
        self.lines.insert(key, lines.clone());
        Ok(lines)
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
