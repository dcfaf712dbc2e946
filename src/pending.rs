//! In-memory tables of override edits waiting to be written.

use std::fmt;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};

/// Which line of an override file an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinePos {
    /// An existing 1-based line.
    Line(usize),
    /// A new entry appended at the end of the file.
    Append,
}

impl LinePos {
    /// Whether this is the append position.
    pub fn is_append(self) -> bool {
        matches!(self, LinePos::Append)
    }
}

impl fmt::Display for LinePos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinePos::Line(n) => write!(f, "{n}"),
            LinePos::Append => write!(f, "-1"),
        }
    }
}

/// A pending token edit on a USE flag line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverrideEntry {
    /// File to edit.
    pub file: PathBuf,
    /// Line to edit.
    pub line: LinePos,
    /// Flag token, e.g. `ssl` or `-gtk`.
    pub token: String,
    /// `true` to take the token off the line, `false` to put it on.
    pub remove: bool,
}

impl OverrideEntry {
    pub(crate) fn insert(file: &Path, line: LinePos, token: &str) -> Self {
        OverrideEntry {
            file: file.to_path_buf(),
            line,
            token: token.to_string(),
            remove: false,
        }
    }

    pub(crate) fn remove(file: &Path, line: LinePos, token: &str) -> Self {
        OverrideEntry {
            remove: true,
            ..OverrideEntry::insert(file, line, token)
        }
    }
}

/// A pending whole-line edit: append a new line, or comment out an
/// existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineEntry {
    /// File to edit.
    pub file: PathBuf,
    /// Line to comment out, or [`LinePos::Append`].
    pub line: LinePos,
}

impl LineEntry {
    pub(crate) fn new(file: &Path, line: LinePos) -> Self {
        LineEntry {
            file: file.to_path_buf(),
            line,
        }
    }
}

/// Package version to ordered, duplicate-free pending entries.
///
/// Versions whose last entry goes away are dropped from the table.
#[derive(Debug, Clone)]
pub struct PendingTable<E> {
    entries: IndexMap<String, IndexSet<E>>,
}

impl<E> Default for PendingTable<E> {
    fn default() -> Self {
        PendingTable {
            entries: IndexMap::new(),
        }
    }
}

impl<E: Clone + Eq + Hash> PendingTable<E> {
    /// Entries for `cpv`, if any.
    pub fn get(&self, cpv: &str) -> Option<&IndexSet<E>> {
        self.entries.get(cpv)
    }

    /// Whether `cpv` has `entry` pending.
    pub fn contains(&self, cpv: &str, entry: &E) -> bool {
        self.entries.get(cpv).is_some_and(|set| set.contains(entry))
    }

    /// Whether `cpv` has anything pending.
    pub fn has(&self, cpv: &str) -> bool {
        self.entries.contains_key(cpv)
    }

    /// Add an entry; returns `false` if it was already there.
    pub(crate) fn insert(&mut self, cpv: &str, entry: E) -> bool {
        self.entries.entry(cpv.to_string()).or_default().insert(entry)
    }

    /// Drop an entry; returns whether it was there.
    pub(crate) fn remove(&mut self, cpv: &str, entry: &E) -> bool {
        let Some(set) = self.entries.get_mut(cpv) else {
            return false;
        };
        let removed = set.shift_remove(entry);
        if set.is_empty() {
            self.entries.shift_remove(cpv);
        }
        removed
    }

    /// Keep only the entries of `cpv` for which `keep` holds.
    pub(crate) fn retain(&mut self, cpv: &str, keep: impl Fn(&E) -> bool) {
        let Some(set) = self.entries.get(cpv) else {
            return;
        };
        let kept: IndexSet<E> = set.iter().filter(|e| keep(e)).cloned().collect();
        if kept.is_empty() {
            self.entries.shift_remove(cpv);
        } else {
            self.entries.insert(cpv.to_string(), kept);
        }
    }

    /// Forget everything pending for `cpv`.
    pub(crate) fn discard(&mut self, cpv: &str) {
        self.entries.shift_remove(cpv);
    }

    /// Forget everything.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether nothing is pending at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Package versions and their entries, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<E>)> {
        self.entries.iter().map(|(cpv, set)| (cpv.as_str(), set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: LinePos, token: &str) -> OverrideEntry {
        OverrideEntry::insert(Path::new("/etc/portage/package.use"), line, token)
    }

    #[test]
    fn insert_deduplicates() {
        let mut table = PendingTable::default();
        assert!(table.insert("a/b-1", entry(LinePos::Line(3), "ssl")));
        assert!(!table.insert("a/b-1", entry(LinePos::Line(3), "ssl")));
        assert_eq!(table.get("a/b-1").unwrap().len(), 1);
    }

    #[test]
    fn remove_drops_empty_versions() {
        let mut table = PendingTable::default();
        table.insert("a/b-1", entry(LinePos::Append, "ssl"));
        assert!(table.remove("a/b-1", &entry(LinePos::Append, "ssl")));
        assert!(!table.remove("a/b-1", &entry(LinePos::Append, "ssl")));
        assert!(!table.has("a/b-1"));
        assert!(table.is_empty());
    }

    #[test]
    fn retain_keeps_order() {
        let mut table = PendingTable::default();
        for (n, token) in [(1, "a"), (2, "b"), (3, "c")] {
            table.insert("a/b-1", entry(LinePos::Line(n), token));
        }
        table.insert("a/b-1", entry(LinePos::Append, "d"));
        table.retain("a/b-1", |e| e.token != "b");
        let tokens: Vec<_> = table.get("a/b-1").unwrap().iter().map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, vec!["a", "c", "d"]);

        table.retain("a/b-1", |_| false);
        assert!(table.is_empty());
    }

    #[test]
    fn remove_entry_direction_matters() {
        let file = Path::new("/x");
        let mut table = PendingTable::default();
        table.insert("a/b-1", OverrideEntry::insert(file, LinePos::Line(1), "ssl"));
        assert!(!table.contains("a/b-1", &OverrideEntry::remove(file, LinePos::Line(1), "ssl")));
        assert!(table.contains("a/b-1", &OverrideEntry::insert(file, LinePos::Line(1), "ssl")));
    }

    #[test]
    fn append_displays_as_sentinel() {
        assert_eq!(LinePos::Append.to_string(), "-1");
        assert_eq!(LinePos::Line(12).to_string(), "12");
        assert!(LinePos::Append.is_append());
        assert!(!LinePos::Line(1).is_append());
    }
}
