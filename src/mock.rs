//! In-memory package database for tests.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use crate::cpv::Cpv;
use crate::error::{Error, Result};
use crate::package::{Package, PackageDatabase};

#[derive(Debug, Clone)]
pub(crate) struct MockPackage {
    cpv: Cpv,
    masked: bool,
    testing: bool,
    use_flags: Vec<String>,
}

impl MockPackage {
    pub(crate) fn new(id: &str) -> Self {
        MockPackage {
            cpv: Cpv::parse(id).unwrap(),
            masked: false,
            testing: false,
            use_flags: Vec::new(),
        }
    }

    pub(crate) fn masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub(crate) fn testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    pub(crate) fn use_flags(mut self, flags: &[&str]) -> Self {
        self.use_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }
}

impl Package for MockPackage {
    fn cpv(&self) -> &Cpv {
        &self.cpv
    }

    fn matches(&self, criterion: &str) -> bool {
        let criterion = criterion.split(':').next().unwrap_or(criterion);
        let version = self.cpv.to_string();
        if let Some(exact) = criterion.strip_prefix('=') {
            return match exact.strip_suffix('*') {
                Some(prefix) => version.starts_with(prefix),
                None => exact == version,
            };
        }
        if let Some(any_rev) = criterion.strip_prefix('~') {
            return Cpv::parse(any_rev).is_ok_and(|c| {
                c.cp() == self.cpv.cp() && c.version == self.cpv.version
            });
        }
        if criterion.starts_with(['<', '>', '!']) {
            return false;
        }
        criterion == self.cpv.cp()
    }

    fn is_masked(&self) -> bool {
        self.masked
    }

    fn is_testing(&self) -> bool {
        self.testing
    }

    fn use_flags(&self) -> Vec<String> {
        self.use_flags.clone()
    }
}

#[derive(Debug)]
pub(crate) struct MockDatabase {
    packages: HashMap<String, MockPackage>,
    installed: HashSet<String>,
    global_use: Vec<String>,
    arch: String,
    reloads: Cell<usize>,
}

impl MockDatabase {
    pub(crate) fn new() -> Self {
        MockDatabase {
            packages: HashMap::new(),
            installed: HashSet::new(),
            global_use: Vec::new(),
            arch: "amd64".to_string(),
            reloads: Cell::new(0),
        }
    }

    pub(crate) fn with_package(mut self, pkg: MockPackage) -> Self {
        self.packages.insert(pkg.cpv.to_string(), pkg);
        self
    }

    pub(crate) fn with_global_use(mut self, flags: &[&str]) -> Self {
        self.global_use = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub(crate) fn with_installed(mut self, atom: &str) -> Self {
        self.installed.insert(atom.to_string());
        self
    }

    /// How often [`PackageDatabase::reload_settings`] ran.
    pub(crate) fn reloads(&self) -> usize {
        self.reloads.get()
    }
}

impl PackageDatabase for MockDatabase {
    type Package = MockPackage;

    fn find_package(&self, id: &str) -> Result<MockPackage> {
        let key = Cpv::parse(id)?.to_string();
        self.packages
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UnknownPackage(id.to_string()))
    }

    fn global_use(&self) -> Vec<String> {
        self.global_use.clone()
    }

    fn arch(&self) -> String {
        self.arch.clone()
    }

    fn is_installed(&self, atom: &str) -> bool {
        self.installed.contains(atom)
    }

    fn reload_settings(&self) -> Result<()> {
        self.reloads.set(self.reloads.get() + 1);
        Ok(())
    }
}
