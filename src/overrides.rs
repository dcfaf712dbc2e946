//! Bundle of the three override ledgers with a single commit.

use tracing::warn;

use crate::config::{OverrideConfig, OverridePaths};
use crate::error::Result;
use crate::masking::MaskLedger;
use crate::package::PackageDatabase;
use crate::testing::TestingLedger;
use crate::use_flags::UseFlagLedger;

/// The three override ledgers of one configuration root.
///
/// # Examples
///
/// ```
/// use portage_overrides::{OverrideConfig, OverridePaths, Overrides};
///
/// let overrides = Overrides::new(&OverridePaths::default(), &OverrideConfig::default());
/// assert!(!overrides.use_flags.is_pending("app-misc/foo-1.0"));
/// ```
#[derive(Debug)]
pub struct Overrides {
    /// `package.use`
    pub use_flags: UseFlagLedger,
    /// `package.mask` and `package.unmask`
    pub masks: MaskLedger,
    /// `package.keywords`
    pub testing: TestingLedger,
}

impl Overrides {
    /// Ledgers for the given locations and settings.
    pub fn new(paths: &OverridePaths, config: &OverrideConfig) -> Self {
        Overrides {
            use_flags: UseFlagLedger::from_config(paths, config),
            masks: MaskLedger::from_config(paths, config),
            testing: TestingLedger::from_config(paths, config),
        }
    }

    /// Commit USE flags, masking and testing keywords, in that order, then
    /// reload the database once.
    ///
    /// A ledger is cleared only after its own files were written; when a
    /// later ledger fails the earlier ones stay committed and the database
    /// is still reloaded before the error is returned.
    pub fn write_all<D: PackageDatabase>(&mut self, db: &D) -> Result<()> {
        self.use_flags.flush(db)?;
        self.use_flags.clear();
        if let Err(e) = self.write_rest(db) {
            if let Err(reload) = db.reload_settings() {
                warn!(error = %reload, "reload after partial commit failed");
            }
            return Err(e);
        }
        db.reload_settings()
    }

    fn write_rest<D: PackageDatabase>(&mut self, db: &D) -> Result<()> {
        self.masks.flush(db)?;
        self.masks.clear();
        self.testing.flush(db)?;
        self.testing.clear();
        Ok(())
    }

    /// Forget every pending change.
    pub fn clear(&mut self) {
        self.use_flags.clear();
        self.masks.clear();
        self.testing.clear();
    }
}
