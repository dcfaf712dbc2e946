//! Pending mask and unmask overrides (`package.mask`, `package.unmask`).

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error};

use crate::config::{Location, OverrideConfig, OverridePaths};
use crate::error::{Error, Result};
use crate::package::{Package, PackageDatabase, PackageKey, PackageRef};
use crate::pending::{LineEntry, LinePos, PendingTable};
use crate::rewrite::{comment_out, criterion, update_block, FileCache};
use crate::scan::ScanCache;

/// Masking state a package version will have once pending edits are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskingStatus {
    /// The version will be masked.
    Masked,
    /// The version will be unmasked.
    Unmasked,
}

impl fmt::Display for MaskingStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MaskingStatus::Masked => write!(f, "masked"),
            MaskingStatus::Unmasked => write!(f, "unmasked"),
        }
    }
}

/// Pending mask/unmask edits.
///
/// Two tables are kept. An append entry in the masked table adds a mask
/// line, a line entry there comments out an existing mask line; the
/// unmasked table works the same way for `package.unmask`. Requesting one
/// direction purges the appends of the other, so a package version never
/// has appends in both.
#[derive(Debug)]
pub struct MaskLedger {
    mask: Location,
    unmask: Location,
    per_version: bool,
    scans: ScanCache,
    masked: PendingTable<LineEntry>,
    unmasked: PendingTable<LineEntry>,
}

impl MaskLedger {
    /// A ledger over the given mask and unmask locations.
    pub fn new(
        mask_path: impl Into<PathBuf>,
        unmask_path: impl Into<PathBuf>,
        template: impl Into<String>,
        per_version: bool,
    ) -> Self {
        let template = template.into();
        MaskLedger {
            mask: Location::new(mask_path, template.clone()),
            unmask: Location::new(unmask_path, template),
            per_version,
            scans: ScanCache::default(),
            masked: PendingTable::default(),
            unmasked: PendingTable::default(),
        }
    }

    /// A ledger over `package.mask` and `package.unmask` as configured.
    pub fn from_config(paths: &OverridePaths, config: &OverrideConfig) -> Self {
        MaskLedger::new(
            &paths.mask_path,
            &paths.unmask_path,
            &config.mask_file,
            config.mask_per_version,
        )
    }

    fn tables_mut(
        &mut self,
        masked: bool,
    ) -> (&mut PendingTable<LineEntry>, &mut PendingTable<LineEntry>) {
        if masked {
            (&mut self.masked, &mut self.unmasked)
        } else {
            (&mut self.unmasked, &mut self.masked)
        }
    }

    /// Request the package version to be masked (`true`) or unmasked.
    ///
    /// The request is compared against a pending new line, or the
    /// database's view when none is queued; pending removals of existing
    /// lines are undone by the opposite request. Existing lines in the
    /// opposite location that select the package are commented out; only
    /// when there are none is a new line queued in this direction's
    /// location.
    pub fn set_masked<'a, D>(
        &mut self,
        db: &D,
        pkg: impl Into<PackageRef<'a, D::Package>>,
        masked: bool,
    ) -> Result<()>
    where
        D: PackageDatabase,
        D::Package: 'a,
    {
        let pkg = pkg.into().resolve(db)?;
        let cpv = pkg.cpv().to_string();
        let current = self.appended(&cpv).unwrap_or_else(|| pkg.is_masked());

        let (this, other) = self.tables_mut(masked);
        other.retain(&cpv, |e| !e.line.is_append());
        this.retain(&cpv, |e| e.line.is_append());

        if masked == current {
            debug!(cpv, masked, "masking already in requested state");
            return Ok(());
        }

        let (opposite, target) = if masked {
            (&self.unmask, &self.mask)
        } else {
            (&self.mask, &self.unmask)
        };
        let file = target.target_file(pkg.cpv());
        let lines = self.scans.lines(&opposite.path, &cpv, &pkg.cpv().cp())?;
        let existing: Vec<LineEntry> = lines
            .iter()
            .filter(|l| pkg.matches(&l.criterion))
            .map(|l| LineEntry::new(&l.file, LinePos::Line(l.line)))
            .collect();

        let (this, other) = self.tables_mut(masked);
        if existing.is_empty() {
            debug!(cpv, masked, file = %file.display(), "queued new masking line");
            this.insert(&cpv, LineEntry::new(&file, LinePos::Append));
        } else {
            debug!(cpv, masked, lines = existing.len(), "queued removal of opposite lines");
            for entry in existing {
                other.insert(&cpv, entry);
            }
        }
        Ok(())
    }

    /// Direction of a queued new line, if any.
    fn appended(&self, cpv: &str) -> Option<bool> {
        let has_append = |table: &PendingTable<LineEntry>| {
            table
                .get(cpv)
                .is_some_and(|set| set.iter().any(|e| e.line.is_append()))
        };
        if has_append(&self.masked) {
            Some(true)
        } else if has_append(&self.unmasked) {
            Some(false)
        } else {
            None
        }
    }

    /// Combined pending status of a package version, `None` when nothing
    /// is pending.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_overrides::MaskLedger;
    ///
    /// let ledger = MaskLedger::new("/etc/portage/package.mask", "/etc/portage/package.unmask", "portato", true);
    /// assert_eq!(ledger.new_masking_status("app-misc/foo-1.0"), None);
    /// ```
    pub fn new_masking_status(&self, pkg: &(impl PackageKey + ?Sized)) -> Option<MaskingStatus> {
        self.status(&pkg.package_key())
    }

    fn status(&self, cpv: &str) -> Option<MaskingStatus> {
        let masked = match table_state(&self.masked, cpv) {
            Some(masked) => masked,
            None => !table_state(&self.unmasked, cpv)?,
        };
        Some(if masked {
            MaskingStatus::Masked
        } else {
            MaskingStatus::Unmasked
        })
    }

    /// Whether a local mask line selects the package version.
    ///
    /// With `with_changes`, pending edits take precedence over what is on
    /// disk.
    pub fn is_locally_masked<'a, D>(
        &mut self,
        db: &D,
        pkg: impl Into<PackageRef<'a, D::Package>>,
        with_changes: bool,
    ) -> Result<bool>
    where
        D: PackageDatabase,
        D::Package: 'a,
    {
        let pkg = pkg.into().resolve(db)?;
        let cpv = pkg.cpv().to_string();

        if with_changes {
            match self.status(&cpv) {
                Some(MaskingStatus::Masked) => return Ok(!self.unmasked.has(&cpv)),
                Some(MaskingStatus::Unmasked) => return Ok(false),
                None => {}
            }
        }

        let lines = self.scans.lines(&self.mask.path, &cpv, &pkg.cpv().cp())?;
        Ok(lines.iter().any(|l| pkg.matches(&l.criterion)))
    }

    /// Drop everything pending for a package version.
    pub fn discard(&mut self, pkg: &(impl PackageKey + ?Sized)) {
        let cpv = pkg.package_key();
        self.masked.discard(&cpv);
        self.unmasked.discard(&cpv);
    }

    /// Whether a package version has pending changes.
    pub fn is_pending(&self, pkg: &(impl PackageKey + ?Sized)) -> bool {
        let cpv = pkg.package_key();
        self.masked.has(&cpv) || self.unmasked.has(&cpv)
    }

    /// Pending edits of `package.mask`.
    pub fn masked(&self) -> &PendingTable<LineEntry> {
        &self.masked
    }

    /// Pending edits of `package.unmask`.
    pub fn unmasked(&self) -> &PendingTable<LineEntry> {
        &self.unmasked
    }

    /// Forget pending changes and cached scans.
    pub fn clear(&mut self) {
        self.masked.clear();
        self.unmasked.clear();
        self.scans.clear();
    }

    #[cfg(test)]
    fn has_scans(&self) -> bool {
        !self.scans.is_empty()
    }

    /// Write all pending changes, clear the ledger and reload the database.
    pub fn write_masked<D: PackageDatabase>(&mut self, db: &D) -> Result<()> {
        self.flush(db)?;
        self.clear();
        db.reload_settings()
    }

    pub(crate) fn flush<D: PackageDatabase>(&self, db: &D) -> Result<()> {
        let mut files = FileCache::default();
        for table in [&self.masked, &self.unmasked] {
            for (cpv, entries) in table.iter() {
                for entry in entries {
                    match entry.line {
                        LinePos::Append => {
                            let atom = criterion(db, cpv, self.per_version)?;
                            files.append(&entry.file, &update_block(&atom))?;
                        }
                        LinePos::Line(n) => {
                            let line = files.line_mut(&entry.file, n)?;
                            *line = comment_out(line);
                        }
                    }
                }
            }
        }
        files.flush()
    }
}

/// `Some(true)` for appends, `Some(false)` for removals of existing lines.
///
/// Mixed entries are reported and the first one wins.
fn table_state(table: &PendingTable<LineEntry>, cpv: &str) -> Option<bool> {
    let mut state = None;
    for entry in table.get(cpv)? {
        let append = entry.line.is_append();
        match state {
            None => state = Some(append),
            Some(first) if first != append => {
                let err = Error::ConflictingOverrideState(cpv.to_string());
                error!(file = %entry.file.display(), line = %entry.line, "{err}");
            }
            Some(_) => {}
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDatabase, MockPackage};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CPV: &str = "app-misc/foo-1.0";

    fn ledger(dir: &Path, per_version: bool) -> MaskLedger {
        MaskLedger::new(
            dir.join("package.mask"),
            dir.join("package.unmask"),
            "portato",
            per_version,
        )
    }

    #[test]
    fn mask_then_unmask() {
        let dir = TempDir::new().unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, true).unwrap();
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Masked));
        assert!(ledger.masked().has(CPV));
        assert!(!ledger.unmasked().has(CPV));

        ledger.set_masked(&db, &pkg, false).unwrap();
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Unmasked));
        assert!(!ledger.masked().has(CPV));
        assert!(ledger.unmasked().has(CPV));
    }

    #[test]
    fn mask_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, true).unwrap();
        ledger.set_masked(&db, &pkg, true).unwrap();
        let entries: Vec<_> = ledger.masked().get(CPV).unwrap().iter().cloned().collect();
        assert_eq!(
            entries,
            vec![LineEntry::new(&dir.path().join("package.mask"), LinePos::Append)]
        );
    }

    #[test]
    fn already_masked_is_noop() {
        let dir = TempDir::new().unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV).masked(true);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, true).unwrap();
        assert!(!ledger.is_pending(CPV));
        assert_eq!(ledger.new_masking_status(CPV), None);
    }

    #[test]
    fn unmask_comments_out_mask_lines() {
        let dir = TempDir::new().unwrap();
        let mask = dir.path().join("package.mask");
        fs::write(&mask, "# local masks\n=app-misc/foo-1.0\n>=app-misc/foo-2\n").unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV).masked(true);
        let mut ledger = ledger(dir.path(), true);

        assert!(ledger.is_locally_masked(&db, &pkg, true).unwrap());
        ledger.set_masked(&db, &pkg, false).unwrap();
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Unmasked));
        assert!(!ledger.is_locally_masked(&db, &pkg, true).unwrap());
        assert!(ledger.is_locally_masked(&db, &pkg, false).unwrap());

        ledger.write_masked(&db).unwrap();
        assert_eq!(
            fs::read_to_string(&mask).unwrap(),
            "# local masks\n#=app-misc/foo-1.0 # removed by portato\n>=app-misc/foo-2\n"
        );
        assert!(!dir.path().join("package.unmask").exists());
        assert!(!ledger.is_pending(CPV));
        assert!(!ledger.has_scans());
        assert_eq!(db.reloads(), 1);
    }

    #[test]
    fn unmask_then_mask_restores_mask_line() {
        let dir = TempDir::new().unwrap();
        let mask = dir.path().join("package.mask");
        fs::write(&mask, "=app-misc/foo-1.0\n").unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV).masked(true);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, false).unwrap();
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Unmasked));
        ledger.set_masked(&db, &pkg, true).unwrap();
        assert!(!ledger.is_pending(CPV));
        assert_eq!(ledger.new_masking_status(CPV), None);

        ledger.write_masked(&db).unwrap();
        assert_eq!(fs::read_to_string(&mask).unwrap(), "=app-misc/foo-1.0\n");
        assert!(!dir.path().join("package.unmask").exists());
    }

    #[test]
    fn mask_then_unmask_restores_unmask_line() {
        let dir = TempDir::new().unwrap();
        let unmask = dir.path().join("package.unmask");
        fs::write(&unmask, "app-misc/foo\n").unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, true).unwrap();
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Masked));
        ledger.set_masked(&db, &pkg, false).unwrap();
        assert!(!ledger.is_pending(CPV));

        ledger.write_masked(&db).unwrap();
        assert_eq!(fs::read_to_string(&unmask).unwrap(), "app-misc/foo\n");
        assert!(!dir.path().join("package.mask").exists());
        assert!(!ledger.has_scans());
    }

    #[test]
    fn mask_comments_out_unmask_lines() {
        let dir = TempDir::new().unwrap();
        let unmask = dir.path().join("package.unmask");
        fs::write(&unmask, "app-misc/foo\n").unwrap();
        let db = MockDatabase::new();
        let pkg = MockPackage::new(CPV);
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, &pkg, true).unwrap();
        assert!(!ledger.masked().has(CPV));
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Masked));

        ledger.write_masked(&db).unwrap();
        assert_eq!(
            fs::read_to_string(&unmask).unwrap(),
            "#app-misc/foo # removed by portato\n"
        );
    }

    #[test]
    fn write_new_mask_lines() {
        let dir = TempDir::new().unwrap();
        let mask = dir.path().join("package.mask");
        fs::write(&mask, "x11-libs/gtk+\n").unwrap();
        let db = MockDatabase::new();

        let mut ledger = ledger(dir.path(), false);
        ledger.set_masked(&db, &MockPackage::new(CPV), true).unwrap();
        ledger.write_masked(&db).unwrap();
        assert_eq!(
            fs::read_to_string(&mask).unwrap(),
            "x11-libs/gtk+\n\n#portato update#\napp-misc/foo\n"
        );

        let other = TempDir::new().unwrap();
        let mut ledger = self::ledger(other.path(), true);
        ledger
            .set_masked(&db, &MockPackage::new(CPV).masked(true), false)
            .unwrap();
        ledger.write_masked(&db).unwrap();
        assert_eq!(
            fs::read_to_string(other.path().join("package.unmask")).unwrap(),
            "\n#portato update#\n=app-misc/foo-1.0\n"
        );
    }

    #[test]
    fn directory_mode_uses_template() {
        let dir = TempDir::new().unwrap();
        let mask = dir.path().join("package.mask");
        fs::create_dir(&mask).unwrap();
        let db = MockDatabase::new();
        let mut ledger = MaskLedger::new(&mask, dir.path().join("package.unmask"), "$(cat)", true);

        ledger.set_masked(&db, &MockPackage::new(CPV), true).unwrap();
        ledger.write_masked(&db).unwrap();
        assert_eq!(
            fs::read_to_string(mask.join("app-misc")).unwrap(),
            "\n#portato update#\n=app-misc/foo-1.0\n"
        );
    }

    #[test]
    fn conflicting_entries_keep_first() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(dir.path(), true);
        let file = dir.path().join("package.mask");
        ledger.masked.insert(CPV, LineEntry::new(&file, LinePos::Append));
        ledger.masked.insert(CPV, LineEntry::new(&file, LinePos::Line(3)));
        assert_eq!(ledger.new_masking_status(CPV), Some(MaskingStatus::Masked));
    }

    #[test]
    fn discard_both_tables() {
        let dir = TempDir::new().unwrap();
        let unmask = dir.path().join("package.unmask");
        fs::write(&unmask, "app-misc/foo\n").unwrap();
        let db = MockDatabase::new().with_package(MockPackage::new(CPV));
        let mut ledger = ledger(dir.path(), true);

        ledger.set_masked(&db, CPV, true).unwrap();
        assert!(ledger.is_pending(CPV));
        ledger.discard(CPV);
        assert!(!ledger.is_pending(CPV));
        assert_eq!(ledger.new_masking_status(CPV), None);
    }
}
