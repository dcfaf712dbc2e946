//! Pending testing keyword overrides (`package.keywords`).

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{Location, OverrideConfig, OverridePaths};
use crate::error::Result;
use crate::package::{Package, PackageDatabase, PackageKey, PackageRef};
use crate::pending::{LineEntry, LinePos, PendingTable};
use crate::rewrite::{comment_out, criterion, update_block, FileCache};
use crate::scan::ScanCache;

/// Pending `~arch` keyword edits.
///
/// An append entry accepts the testing keyword for a version; a line entry
/// comments out an existing keyword line.
#[derive(Debug)]
pub struct TestingLedger {
    location: Location,
    per_version: bool,
    arch: String,
    scans: ScanCache,
    pending: PendingTable<LineEntry>,
}

impl TestingLedger {
    /// A ledger over the file or directory at `path`.
    pub fn new(path: impl Into<PathBuf>, template: impl Into<String>, per_version: bool) -> Self {
        TestingLedger {
            location: Location::new(path, template),
            per_version,
            arch: String::new(),
            scans: ScanCache::default(),
            pending: PendingTable::default(),
        }
    }

    /// A ledger over `package.keywords` as configured.
    pub fn from_config(paths: &OverridePaths, config: &OverrideConfig) -> Self {
        TestingLedger::new(
            &paths.testing_path,
            &config.testing_file,
            config.testing_per_version,
        )
    }

    /// Accept (`true`) or stop accepting the testing keyword of the
    /// database's architecture for a package version.
    ///
    /// Stopping comments out every existing line selecting the version
    /// whose first keyword is `~arch`. A line without any keyword is
    /// treated as selecting it.
    pub fn set_testing<'a, D>(
        &mut self,
        db: &D,
        pkg: impl Into<PackageRef<'a, D::Package>>,
        enable: bool,
    ) -> Result<()>
    where
        D: PackageDatabase,
        D::Package: 'a,
    {
        let pkg = pkg.into().resolve(db)?;
        let cpv = pkg.cpv().to_string();
        self.arch = db.arch();

        self.pending
            .retain(&cpv, |e| if enable { e.line.is_append() } else { !e.line.is_append() });

        if enable != pkg.is_testing() {
            debug!(cpv, enable, "testing keyword already in requested state");
            return Ok(());
        }

        if enable {
            let file = self.location.target_file(pkg.cpv());
            debug!(cpv, file = %file.display(), "queued new keyword line");
            self.pending.insert(&cpv, LineEntry::new(&file, LinePos::Append));
            return Ok(());
        }

        let keyword = format!("~{}", self.arch);
        let lines = self
            .scans
            .lines(&self.location.path, &cpv, &pkg.cpv().cp())?;
        for line in lines.iter().filter(|l| pkg.matches(&l.criterion)) {
            let selected = match line.tokens.first() {
                Some(first) => *first == keyword,
                None => {
                    warn!(
                        file = %line.file.display(),
                        line = line.line,
                        "keyword line has no keyword (e.g. '~{}'), assuming it matches",
                        self.arch
                    );
                    true
                }
            };
            if selected {
                self.pending
                    .insert(&cpv, LineEntry::new(&line.file, LinePos::Line(line.line)));
            }
        }
        debug!(cpv, keyword, "queued removal of keyword lines");
        Ok(())
    }

    /// Whether the version will still need its testing keyword accepted
    /// after the commit: `Some(false)` once accepted, `Some(true)` once the
    /// acceptance is dropped, `None` when nothing is pending.
    pub fn new_testing_status(&self, pkg: &(impl PackageKey + ?Sized)) -> Option<bool> {
        let entries = self.pending.get(&pkg.package_key())?;
        entries.first().map(|e| !e.line.is_append())
    }

    /// Drop everything pending for a package version.
    pub fn discard(&mut self, pkg: &(impl PackageKey + ?Sized)) {
        self.pending.discard(&pkg.package_key());
    }

    /// Whether a package version has pending changes.
    pub fn is_pending(&self, pkg: &(impl PackageKey + ?Sized)) -> bool {
        self.pending.has(&pkg.package_key())
    }

    /// The whole pending table.
    pub fn pending(&self) -> &PendingTable<LineEntry> {
        &self.pending
    }

    /// Forget pending changes and cached scans.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.scans.clear();
    }

    #[cfg(test)]
    fn has_scans(&self) -> bool {
        !self.scans.is_empty()
    }

    /// Write all pending changes, clear the ledger and reload the database.
    pub fn write_testing<D: PackageDatabase>(&mut self, db: &D) -> Result<()> {
        self.flush(db)?;
        self.clear();
        db.reload_settings()
    }

    pub(crate) fn flush<D: PackageDatabase>(&self, db: &D) -> Result<()> {
        let mut files = FileCache::default();
        for (cpv, entries) in self.pending.iter() {
            for entry in entries {
                match entry.line {
                    LinePos::Append => {
                        let atom = criterion(db, cpv, self.per_version)?;
                        files.append(&entry.file, &update_block(&format!("{atom} ~{}", self.arch)))?;
                    }
                    LinePos::Line(n) => {
                        let line = files.line_mut(&entry.file, n)?;
                        *line = comment_out(line);
                    }
                }
            }
        }
        files.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDatabase, MockPackage};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const CPV: &str = "app-misc/foo-1.0";

    fn keywords(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("package.keywords");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn accept_testing_keyword() {
        let dir = TempDir::new().unwrap();
        let path = keywords(&dir, "other/pkg ~amd64\n");
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV).testing(true);
        let mut ledger = TestingLedger::new(&path, "portato", true);

        ledger.set_testing(&db, &pkg, true).unwrap();
        ledger.set_testing(&db, &pkg, true).unwrap();
        assert_eq!(ledger.pending().get(CPV).unwrap().len(), 1);
        assert_eq!(ledger.new_testing_status(CPV), Some(false));

        ledger.write_testing(&db).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "other/pkg ~amd64\n\n#portato update#\n=app-misc/foo-1.0 ~amd64\n"
        );
        assert!(ledger.pending().is_empty());
        assert_eq!(db.reloads(), 1);
    }

    #[test]
    fn accept_then_drop_cancels() {
        let dir = TempDir::new().unwrap();
        let path = keywords(&dir, "");
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV).testing(true);
        let mut ledger = TestingLedger::new(&path, "portato", true);

        ledger.set_testing(&db, &pkg, true).unwrap();
        ledger.set_testing(&db, &pkg, false).unwrap();
        assert!(!ledger.is_pending(CPV));
        assert_eq!(ledger.new_testing_status(CPV), None);
    }

    #[test]
    fn drop_comments_out_matching_keyword_lines() {
        let dir = TempDir::new().unwrap();
        let path = keywords(
            &dir,
            "app-misc/foo ~amd64\n=app-misc/foo-1.0 ~x86\n=app-misc/foo-2.0 ~amd64\n",
        );
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = TestingLedger::new(&path, "portato", false);

        ledger.set_testing(&db, &pkg, false).unwrap();
        assert_eq!(ledger.new_testing_status(&pkg.cpv().to_string()), Some(true));

        ledger.write_testing(&db).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "#app-misc/foo ~amd64 # removed by portato\n=app-misc/foo-1.0 ~x86\n=app-misc/foo-2.0 ~amd64\n"
        );
        assert!(ledger.pending().is_empty());
        assert!(!ledger.has_scans());
        assert_eq!(db.reloads(), 1);
    }

    #[test]
    fn line_without_keyword_matches() {
        let dir = TempDir::new().unwrap();
        let path = keywords(&dir, "app-misc/foo\n");
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = TestingLedger::new(&path, "portato", true);

        ledger.set_testing(&db, &pkg, false).unwrap();
        let entries: Vec<_> = ledger.pending().get(CPV).unwrap().iter().cloned().collect();
        assert_eq!(entries, vec![LineEntry::new(&path, LinePos::Line(1))]);
    }

    #[test]
    fn already_in_requested_state() {
        let dir = TempDir::new().unwrap();
        let path = keywords(&dir, "app-misc/foo ~amd64\n");
        let db = MockDatabase::new();
        let mut ledger = TestingLedger::new(&path, "portato", true);

        ledger
            .set_testing(&db, &MockPackage::new(CPV), true)
            .unwrap();
        ledger
            .set_testing(&db, &MockPackage::new(CPV).testing(true), false)
            .unwrap();
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn per_package_in_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("package.keywords");
        fs::create_dir(&root).unwrap();
        let db = MockDatabase::new();
        let mut ledger = TestingLedger::new(&root, "$(cat-1)/$(pkg)", false);

        ledger
            .set_testing(&db, &MockPackage::new(CPV).testing(true), true)
            .unwrap();
        ledger.write_testing(&db).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("app").join("foo")).unwrap(),
            "\n#portato update#\napp-misc/foo ~amd64\n"
        );
    }
}
