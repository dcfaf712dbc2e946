//! Pending USE flag overrides (`package.use`).

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::config::{Location, OverrideConfig, OverridePaths};
use crate::error::Result;
use crate::package::{Package, PackageDatabase, PackageKey, PackageRef};
use crate::pending::{LinePos, OverrideEntry, PendingTable};
use crate::rewrite::{criterion, insert_flag, remove_flag, update_block, FileCache};
use crate::scan::ScanCache;

/// `flag` for `-flag` and `-flag` for `flag`.
///
/// # Examples
///
/// ```
/// use portage_overrides::invert_use_flag;
///
/// assert_eq!(invert_use_flag("ssl"), "-ssl");
/// assert_eq!(invert_use_flag("-ssl"), "ssl");
/// ```
pub fn invert_use_flag(flag: &str) -> String {
    match flag.strip_prefix('-') {
        Some(plain) => plain.to_string(),
        None => format!("-{flag}"),
    }
}

/// A pending USE change as the front end shows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UseFlagChange {
    /// The flag as it will read after the commit, e.g. `ssl` or `-gtk`.
    pub flag: String,
    /// `true` when the change drops an existing directive (the opposite of
    /// `flag`) rather than adding `flag`.
    pub removed: bool,
}

impl fmt::Display for UseFlagChange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.removed {
            write!(f, "~{}", self.flag)
        } else {
            write!(f, "{}", self.flag)
        }
    }
}

/// Pending USE flag edits, keyed by package version.
///
/// [`set_use_flag`](Self::set_use_flag) records edits against the lines
/// already on disk; nothing is written before
/// [`write_use_flags`](Self::write_use_flags).
#[derive(Debug)]
pub struct UseFlagLedger {
    location: Location,
    per_version: bool,
    scans: ScanCache,
    pending: PendingTable<OverrideEntry>,
}

impl UseFlagLedger {
    /// A ledger over the file or directory at `path`.
    ///
    /// `template` names new files in directory mode; `per_version` selects
    /// `=cat/pkg-1.0` over `cat/pkg` for appended lines.
    pub fn new(path: impl Into<PathBuf>, template: impl Into<String>, per_version: bool) -> Self {
        UseFlagLedger {
            location: Location::new(path, template),
            per_version,
            scans: ScanCache::default(),
            pending: PendingTable::default(),
        }
    }

    /// A ledger over `package.use` as configured.
    pub fn from_config(paths: &OverridePaths, config: &OverrideConfig) -> Self {
        UseFlagLedger::new(&paths.use_path, &config.use_file, config.use_per_version)
    }

    /// Request `flag` (`ssl` to enable, `-ssl` to disable) for a package
    /// version.
    ///
    /// The first existing line selecting the package decides: if it already
    /// carries `flag` nothing changes, if it carries the opposite (or a
    /// pending edit already points that way) the edit is toggled, otherwise
    /// `flag` is added to that line. Without any such line a new line is
    /// queued for the end of the target file.
    pub fn set_use_flag<'a, D>(
        &mut self,
        db: &D,
        pkg: impl Into<PackageRef<'a, D::Package>>,
        flag: &str,
    ) -> Result<()>
    where
        D: PackageDatabase,
        D::Package: 'a,
    {
        let pkg = pkg.into().resolve(db)?;
        let cpv = pkg.cpv().to_string();
        let inverted = invert_use_flag(flag);

        let lines = self
            .scans
            .lines(&self.location.path, &cpv, &pkg.cpv().cp())?;

        if let Some(line) = lines.iter().find(|l| pkg.matches(&l.criterion)) {
            let at = LinePos::Line(line.line);
            let reassert = OverrideEntry::insert(&line.file, at, &inverted);
            let unset = OverrideEntry::remove(&line.file, at, flag);

            if line.tokens.contains(&inverted)
                || self.pending.contains(&cpv, &reassert)
                || self.pending.contains(&cpv, &unset)
            {
                let cancelled = self.pending.remove(&cpv, &reassert) | self.pending.remove(&cpv, &unset);
                if !cancelled {
                    self.pending
                        .insert(&cpv, OverrideEntry::remove(&line.file, at, &inverted));
                    let actual = self.apply_changes(&cpv, pkg.use_flags(), &db.global_use());
                    if actual.contains(&inverted) {
                        self.pending
                            .insert(&cpv, OverrideEntry::insert(&line.file, at, flag));
                    }
                }
            } else if !line.tokens.iter().any(|t| t == flag) {
                self.pending
                    .insert(&cpv, OverrideEntry::insert(&line.file, at, flag));
            }

            debug!(cpv, flag, file = %line.file.display(), line = line.line, "use flag on existing line");
            return Ok(());
        }

        let file = self.location.target_file(pkg.cpv());
        let round_trip = OverrideEntry::insert(&file, LinePos::Append, &inverted);
        if !self.pending.remove(&cpv, &round_trip) {
            self.pending
                .insert(&cpv, OverrideEntry::insert(&file, LinePos::Append, flag));
        }
        debug!(cpv, flag, file = %file.display(), "use flag on new line");
        Ok(())
    }

    /// Pending changes for a package version, without duplicates.
    pub fn new_use_flags(&self, pkg: &(impl PackageKey + ?Sized)) -> Vec<UseFlagChange> {
        self.changes(&pkg.package_key())
    }

    fn changes(&self, cpv: &str) -> Vec<UseFlagChange> {
        let Some(entries) = self.pending.get(cpv) else {
            return Vec::new();
        };
        let changes: IndexSet<UseFlagChange> = entries
            .iter()
            .map(|entry| {
                if entry.remove {
                    UseFlagChange {
                        flag: invert_use_flag(&entry.token),
                        removed: true,
                    }
                } else {
                    UseFlagChange {
                        flag: entry.token.clone(),
                        removed: false,
                    }
                }
            })
            .collect();
        changes.into_iter().collect()
    }

    /// The package's configured USE flags with the pending changes applied.
    ///
    /// Dropping a directive does not disable a flag the global `USE`
    /// setting still enables.
    pub fn actual_use_flags<'a, D>(
        &self,
        db: &D,
        pkg: impl Into<PackageRef<'a, D::Package>>,
    ) -> Result<Vec<String>>
    where
        D: PackageDatabase,
        D::Package: 'a,
    {
        let pkg = pkg.into().resolve(db)?;
        Ok(self.apply_changes(&pkg.cpv().to_string(), pkg.use_flags(), &db.global_use()))
    }

    fn apply_changes(&self, cpv: &str, mut flags: Vec<String>, global: &[String]) -> Vec<String> {
        for change in self.changes(cpv) {
            let inverted = invert_use_flag(&change.flag);
            let kept_globally = change.removed && global.contains(&inverted);
            if change.flag.starts_with('-') {
                if !kept_globally {
                    flags.retain(|f| *f != inverted);
                }
            } else if !kept_globally && !flags.contains(&change.flag) {
                flags.push(change.flag);
            }
        }
        flags
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
    pub fn pending(&self) -> &PendingTable<OverrideEntry> {
        &self.pending
    }

    /// Forget pending changes and cached scans.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.scans.clear();
    }

    /// Write all pending changes, clear the ledger and reload the database.
    ///
    /// Insertions on a line are applied before removals. New lines for the
    /// same file are merged into one `#portato update#` block per package
    /// version.
    pub fn write_use_flags<D: PackageDatabase>(&mut self, db: &D) -> Result<()> {
        self.flush(db)?;
        self.clear();
        db.reload_settings()
    }

    pub(crate) fn flush<D: PackageDatabase>(&self, db: &D) -> Result<()> {
        let mut files = FileCache::default();

        for (cpv, entries) in self.pending.iter() {
            let mut appends: IndexMap<&Path, Vec<&str>> = IndexMap::new();
            let ordered = entries
                .iter()
                .filter(|e| !e.remove)
                .chain(entries.iter().filter(|e| e.remove));

            for entry in ordered {
                match entry.line {
                    LinePos::Append => appends
                        .entry(entry.file.as_path())
                        .or_default()
                        .push(entry.token.as_str()),
                    LinePos::Line(n) => {
                        let line = files.line_mut(&entry.file, n)?;
                        *line = if entry.remove {
                            remove_flag(line, &entry.token)
                        } else {
                            insert_flag(line, &entry.token)
                        };
                    }
                }
            }

            if appends.is_empty() {
                continue;
            }
            let atom = criterion(db, cpv, self.per_version)?;
            for (file, flags) in appends {
                files.append(file, &update_block(&format!("{atom} {}", flags.join(" "))))?;
            }
        }

        files.flush()
    }

    #[cfg(test)]
    fn has_scans(&self) -> bool {
        !self.scans.is_empty()
    }
}
