//! Pending per-package overrides for Gentoo's Portage configuration.
//!
//! Portage reads user overrides from line-oriented files below
//! `/etc/portage`: `package.use`, `package.mask`, `package.unmask` and
//! `package.keywords`. This crate records requested changes to those files
//! in memory, lets a front end query what will change, and writes the
//! changes back by editing only the affected lines.
//!
//! # Overview
//!
//! - [`UseFlagLedger`], [`MaskLedger`] and [`TestingLedger`] hold the
//!   pending edits of one override domain each; [`Overrides`] bundles them.
//! - [`ConfigStore`] is a section/key-value parser that remembers where
//!   every value came from so it can be rewritten in place.
//! - [`DependencyTree`] turns a parenthesized dependency string into a
//!   tree of atoms, `||` groups and USE-conditional groups.
//!
//! Package metadata comes from the caller through the [`Package`] and
//! [`PackageDatabase`] traits.
//!
//! # Examples
//!
//! Parse a dependency string:
//!
//! ```
//! use portage_overrides::DependencyTree;
//!
//! let tree = DependencyTree::parse_str("dev-libs/a ssl? ( dev-libs/openssl ) || ( a/b c/d )").unwrap();
//! assert_eq!(tree.atoms().count(), 1);
//! assert!(tree.flag("ssl").is_some());
//! assert_eq!(tree.ors().count(), 1);
//! ```
//!
//! Split a package identifier:
//!
//! ```
//! use portage_overrides::Cpv;
//!
//! let cpv: Cpv = "sys-devel/gcc-13.2.1_p20240210-r3".parse().unwrap();
//! assert_eq!(cpv.cp(), "sys-devel/gcc");
//! assert_eq!(cpv.version_with_revision(), "13.2.1_p20240210-r3");
//! ```

mod config;
mod config_store;
mod cpv;
mod dependency;
mod error;
mod masking;
#[cfg(test)]
mod mock;
mod overrides;
mod package;
mod pending;
mod rewrite;
mod scan;
mod testing;
mod use_flags;

// Re-export public types
pub use config::{
    generate_path, OverrideConfig, OverridePaths, DEFAULT_CONFIG_ROOT, DEFAULT_FILE_TEMPLATE,
};
pub use config_store::{ConfigStore, Section, Value, DEFAULT_SECTION};
pub use cpv::Cpv;
pub use dependency::{DepToken, Dependency, DependencyTree};
pub use error::{Error, Result};
pub use masking::{MaskLedger, MaskingStatus};
pub use overrides::Overrides;
pub use package::{Package, PackageDatabase, PackageKey, PackageRef};
pub use pending::{LineEntry, LinePos, OverrideEntry, PendingTable};
pub use rewrite::{LINE_REMOVED_MARKER, UPDATE_BANNER, USE_REMOVED_MARKER};
pub use scan::{scan, OverrideLine};
pub use testing::TestingLedger;
pub use use_flags::{invert_use_flag, UseFlagChange, UseFlagLedger};
