use std::borrow::Cow;

use crate::cpv::Cpv;
use crate::error::Result;

/// A package version as seen by the package database.
///
/// The ledgers only read from this; every override they compute is filed
/// under [`Package::cpv`].
pub trait Package {
    /// Identifier of this package version.
    fn cpv(&self) -> &Cpv;

    /// Whether an override line criterion (`cat/pkg`, `>=cat/pkg-1.0`,
    /// `=cat/pkg-1.0*`, ...) selects this version.
    fn matches(&self, criterion: &str) -> bool;

    /// Whether the version is currently masked.
    fn is_masked(&self) -> bool;

    /// Whether the version is only keyworded testing (`~arch`) and no
    /// override currently accepts it.
    fn is_testing(&self) -> bool;

    /// USE flags as currently configured for this version, without any
    /// pending overrides applied.
    fn use_flags(&self) -> Vec<String>;
}

/// The package database the ledgers consult and reload after a commit.
pub trait PackageDatabase {
    /// Handle type returned by lookups.
    type Package: Package + Clone;

    /// Locate a package version by its identifier.
    fn find_package(&self, id: &str) -> Result<Self::Package>;

    /// Split an identifier into category, name, version and revision.
    fn split_cpv(&self, id: &str) -> Result<Cpv> {
        Cpv::parse(id)
    }

    /// The global `USE` setting.
    fn global_use(&self) -> Vec<String>;

    /// The global `ARCH` setting, e.g. `amd64`.
    fn arch(&self) -> String;

    /// Whether some installed package satisfies the dependency atom.
    fn is_installed(&self, atom: &str) -> bool;

    /// Re-read the configuration after override files changed on disk.
    fn reload_settings(&self) -> Result<()>;
}

/// Either a raw identifier or an already resolved package handle.
///
/// Every public ledger operation accepts this and resolves it exactly once.
#[derive(Debug)]
pub enum PackageRef<'a, P> {
    /// `category/name-version` string.
    Id(&'a str),
    /// Handle obtained from the package database.
    Handle(&'a P),
}

impl<P> Clone for PackageRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PackageRef<'_, P> {}

impl<'a, P> From<&'a str> for PackageRef<'a, P> {
    fn from(id: &'a str) -> Self {
        PackageRef::Id(id)
    }
}

impl<'a, P: Package> From<&'a P> for PackageRef<'a, P> {
    fn from(pkg: &'a P) -> Self {
        PackageRef::Handle(pkg)
    }
}

impl<'a, P: Package + Clone> PackageRef<'a, P> {
    /// Resolve to a package handle, looking the identifier up if needed.
    pub fn resolve<D>(self, db: &D) -> Result<Cow<'a, P>>
    where
        D: PackageDatabase<Package = P>,
    {
        match self {
            PackageRef::Id(id) => db.find_package(id).map(Cow::Owned),
            PackageRef::Handle(pkg) => Ok(Cow::Borrowed(pkg)),
        }
    }
}

/// Anything that names the package version pending changes are filed under.
///
/// Query methods take this so they work without a database at hand; pass a
/// raw identifier or [`Package::cpv`] of a handle.
pub trait PackageKey {
    /// Normalized `category/name-version` key.
    fn package_key(&self) -> String;
}

/// Identifiers are normalized through [`Cpv::parse`] so that
/// `cat/pkg-1.0-r0` and `cat/pkg-1.0` share one key.
impl PackageKey for str {
    fn package_key(&self) -> String {
        Cpv::parse(self)
            .map(|cpv| cpv.to_string())
            .unwrap_or_else(|_| self.to_string())
    }
}

impl PackageKey for String {
    fn package_key(&self) -> String {
        self.as_str().package_key()
    }
}

impl PackageKey for Cpv {
    fn package_key(&self) -> String {
        self.to_string()
    }
}

impl<P: Package> PackageKey for PackageRef<'_, P> {
    fn package_key(&self) -> String {
        match self {
            PackageRef::Id(id) => id.package_key(),
            PackageRef::Handle(pkg) => pkg.cpv().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::{MockDatabase, MockPackage};

    #[test]
    fn keys_are_normalized() {
        assert_eq!("app-misc/foo-1.0-r0".package_key(), "app-misc/foo-1.0");
        assert_eq!("not a cpv".package_key(), "not a cpv");
        let pkg = MockPackage::new("app-misc/foo-1.0-r2");
        assert_eq!(PackageRef::from(&pkg).package_key(), "app-misc/foo-1.0-r2");
        assert_eq!(pkg.cpv().package_key(), "app-misc/foo-1.0-r2");
    }

    #[test]
    fn resolve_id_and_handle() {
        let pkg = MockPackage::new("app-misc/foo-1.0");
        let db = MockDatabase::new().with_package(pkg.clone());

        let found = PackageRef::Id("app-misc/foo-1.0-r0").resolve(&db).unwrap();
        assert_eq!(found.cpv(), pkg.cpv());
        assert!(matches!(PackageRef::from(&pkg).resolve(&db).unwrap(), Cow::Borrowed(_)));
        assert!(matches!(
            PackageRef::<MockPackage>::Id("app-misc/bar-1").resolve(&db),
            Err(Error::UnknownPackage(_))
        ));
    }
}
