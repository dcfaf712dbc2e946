//! Write-back of pending edits into override files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::map::Entry;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::package::PackageDatabase;

/// Marks lines appended by a commit.
pub const UPDATE_BANNER: &str = "#portato update#";

/// Appended to USE lines that lost their last flag.
pub const USE_REMOVED_MARKER: &str = "#removed by portato#";

/// Appended to commented-out mask, unmask and keyword lines.
pub const LINE_REMOVED_MARKER: &str = "# removed by portato";

/// Override files loaded during one commit.
///
/// Each file is read at most once; all edits are applied to the buffered
/// lines and [`flush`](Self::flush) writes every touched file back.
#[derive(Debug, Default)]
pub(crate) struct FileCache {
    files: IndexMap<PathBuf, Vec<String>>,
}

impl FileCache {
    fn load(&mut self, path: &Path) -> Result<&mut Vec<String>> {
        match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let lines = match fs::read_to_string(path) {
                    Ok(content) => content.split_inclusive('\n').map(str::to_string).collect(),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(Error::io(path, e)),
                };
                Ok(entry.insert(lines))
            }
        }
    }

    /// Mutable access to 1-based line `line` of `path`.
    pub(crate) fn line_mut(&mut self, path: &Path, line: usize) -> Result<&mut String> {
        let lines = self.load(path)?;
        match line.checked_sub(1).and_then(|idx| lines.get_mut(idx)) {
            Some(text) => Ok(text),
            None => Err(Error::LineOutOfRange {
                path: path.to_path_buf(),
                line,
            }),
        }
    }

    /// Add raw text after the current end of `path`.
    pub(crate) fn append(&mut self, path: &Path, text: &str) -> Result<()> {
        self.load(path)?.push(text.to_string());
        Ok(())
    }

    /// Write every touched file, creating missing parent directories.
    pub(crate) fn flush(self) -> Result<()> {
        for (path, lines) in self.files {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
            }
            fs::write(&path, lines.concat()).map_err(|e| Error::io(&path, e))?;
            debug!(file = %path.display(), "rewrote override file");
        }
        Ok(())
    }
}

/// The block appended for a new override entry.
pub(crate) fn update_block(entry: &str) -> String {
    format!("\n{UPDATE_BANNER}\n{entry}\n")
}

/// The atom a new line is addressed to: `=cat/pkg-1.0` per version, or
/// `cat/pkg` for every version.
pub(crate) fn criterion<D: PackageDatabase>(db: &D, cpv: &str, per_version: bool) -> Result<String> {
    if per_version {
        Ok(format!("={cpv}"))
    } else {
        Ok(db.split_cpv(cpv)?.cp())
    }
}

/// Comment out a whole line, keeping its terminator.
pub(crate) fn comment_out(line: &str) -> String {
    let body = line.strip_suffix('\n').unwrap_or(line);
    format!("#{body} {LINE_REMOVED_MARKER}\n")
}

/// Put `flag` right after the atom of a USE line.
pub(crate) fn insert_flag(line: &str, flag: &str) -> String {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    tokens.insert(tokens.len().min(1), flag);
    combine(&tokens)
}

/// Take `flag` off a USE line, commenting the line out when no flag is
/// left before a trailing comment.
pub(crate) fn remove_flag(line: &str, flag: &str) -> String {
    let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let Some(pos) = tokens
        .iter()
        .skip(1)
        .take_while(|t| !t.starts_with('#'))
        .position(|t| t == flag)
    else {
        warn!(flag, line = line.trim_end(), "flag to remove is not on the line");
        return line.to_string();
    };
    tokens.remove(pos + 1);

    if tokens.get(1).map_or(true, |t| t.starts_with('#')) {
        tokens[0] = format!("#{}", tokens[0]);
        tokens.push(USE_REMOVED_MARKER.to_string());
    }
    combine(&tokens)
}

fn combine<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut line = tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ");
    line.push('\n');
    line
}
