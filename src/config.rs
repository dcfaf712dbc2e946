//! Where override files live and how new entries are written to them.

use std::path::{Path, PathBuf};

use crate::config_store::ConfigStore;
use crate::cpv::Cpv;
use crate::error::{Error, Result};

/// Portage's configuration root.
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/portage";

/// File name used for new entries in directory mode.
pub const DEFAULT_FILE_TEMPLATE: &str = "portato";

/// Locations of the override files, each either a file or a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePaths {
    /// `package.use`
    pub use_path: PathBuf,
    /// `package.mask`
    pub mask_path: PathBuf,
    /// `package.unmask`
    pub unmask_path: PathBuf,
    /// `package.keywords`
    pub testing_path: PathBuf,
}

impl OverridePaths {
    /// The standard locations below `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        OverridePaths {
            use_path: root.join("package.use"),
            mask_path: root.join("package.mask"),
            unmask_path: root.join("package.unmask"),
            testing_path: root.join("package.keywords"),
        }
    }
}

impl Default for OverridePaths {
    fn default() -> Self {
        OverridePaths::new(DEFAULT_CONFIG_ROOT)
    }
}

/// How new override entries are named and addressed.
///
/// The `*_file` templates only apply when the override location is a
/// directory; see [`generate_path`]. The `*_per_version` switches select
/// `=cat/pkg-1.0` over `cat/pkg` for new lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConfig {
    /// File template below a `package.use` directory.
    pub use_file: String,
    /// File template below `package.mask`/`package.unmask` directories.
    pub mask_file: String,
    /// File template below a `package.keywords` directory.
    pub testing_file: String,
    /// Address new USE lines to the exact version.
    pub use_per_version: bool,
    /// Address new mask/unmask lines to the exact version.
    pub mask_per_version: bool,
    /// Address new keyword lines to the exact version.
    pub testing_per_version: bool,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        OverrideConfig {
            use_file: DEFAULT_FILE_TEMPLATE.to_string(),
            mask_file: DEFAULT_FILE_TEMPLATE.to_string(),
            testing_file: DEFAULT_FILE_TEMPLATE.to_string(),
            use_per_version: true,
            mask_per_version: true,
            testing_per_version: true,
        }
    }
}

impl OverrideConfig {
    /// Read the settings from `section` of a front-end configuration file.
    ///
    /// Recognized keys are `usefile`, `maskfile`, `testingfile`,
    /// `useperversion`, `maskperversion` and `testingperversion`. Missing
    /// keys keep their default; a missing section is an error.
    pub fn from_store(store: &ConfigStore, section: &str) -> Result<Self> {
        if !store.has_section(section) {
            return Err(Error::SectionNotFound {
                section: section.to_uppercase(),
                file: store.path().to_path_buf(),
            });
        }

        let mut config = OverrideConfig::default();

        for (key, target) in [
            ("usefile", &mut config.use_file),
            ("maskfile", &mut config.mask_file),
            ("testingfile", &mut config.testing_file),
        ] {
            if let Some(text) = optional(store.get(section, key))? {
                *target = text.to_string();
            }
        }

        for (key, target) in [
            ("useperversion", &mut config.use_per_version),
            ("maskperversion", &mut config.mask_per_version),
            ("testingperversion", &mut config.testing_per_version),
        ] {
            if let Some(flag) = optional(store.get_boolean(section, key))? {
                *target = flag;
            }
        }

        Ok(config)
    }
}

fn optional<T>(lookup: Result<T>) -> Result<Option<T>> {
    match lookup {
        Ok(value) => Ok(Some(value)),
        Err(Error::KeyNotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expand a file-name template for a package version.
///
/// Placeholders: `$(cat)`, `$(pkg)`, `$(version)` (with `-rN` unless the
/// revision is `r0`), `$(cat-1)` and `$(cat-2)` (the parts of the category
/// around its first hyphen). `$(cat-2)` is left as is when the category has
/// no second part.
///
/// # Examples
///
/// ```
/// use portage_overrides::{generate_path, Cpv};
///
/// let cpv = Cpv::parse("dev-python/requests-2.31.0-r1").unwrap();
/// assert_eq!(
///     generate_path(&cpv, "$(cat-1)/$(cat-2)/$(pkg)-$(version)"),
///     "dev/python/requests-2.31.0-r1"
/// );
/// ```
pub fn generate_path(cpv: &Cpv, template: &str) -> String {
    if !template.contains("$(") {
        return template.to_string();
    }

    let mut parts = cpv.category.splitn(2, '-');
    let first = parts.next().unwrap_or_default();
    let second = parts.next().and_then(|rest| rest.split('-').next());

    let path = template
        .replace("$(cat)", &cpv.category)
        .replace("$(pkg)", &cpv.name)
        .replace("$(cat-1)", first)
        .replace("$(version)", &cpv.version_with_revision());

    match second {
        Some(second) => path.replace("$(cat-2)", second),
        None => path,
    }
}

/// One override location and the template for new files inside it.
#[derive(Debug, Clone)]
pub(crate) struct Location {
    pub(crate) path: PathBuf,
    template: String,
}

impl Location {
    pub(crate) fn new(path: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Location {
            path: path.into(),
            template: template.into(),
        }
    }

    /// File that receives new entries for `cpv`.
    pub(crate) fn target_file(&self, cpv: &Cpv) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(generate_path(cpv, &self.template))
        } else {
            self.path.clone()
        }
    }
}
