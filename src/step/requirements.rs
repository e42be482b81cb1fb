//! Package requirements gathered from the other pipeline stages.

use std::collections::BTreeSet;

/// A stage able to report the packages its tests need.
pub trait RequirementSource {
    /// Packages that must be installed.
    fn requires(&self) -> Vec<String>;

    /// Packages worth installing when available.
    fn recommends(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Plain list of package names.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageList {
    /// Required packages.
    pub requires: Vec<String>,
    /// Recommended packages.
    pub recommends: Vec<String>,
}

impl PackageList {
    /// A list with nothing in it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a list from required packages only.
    #[must_use]
    pub fn requiring<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requires: packages.into_iter().map(Into::into).collect(),
            recommends: Vec::new(),
        }
    }

    /// Adds recommended packages.
    #[must_use]
    pub fn recommending<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommends.extend(packages.into_iter().map(Into::into));
        self
    }
}

impl RequirementSource for PackageList {
    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn recommends(&self) -> Vec<String> {
        self.recommends.clone()
    }
}

/// The three stages preparation collects packages from.
#[derive(Clone, Copy)]
pub struct Requirements<'a> {
    /// Discovery: required and recommended packages.
    pub discover: &'a dyn RequirementSource,
    /// Provisioning: required packages.
    pub provision: &'a dyn RequirementSource,
    /// Execution: required packages.
    pub execute: &'a dyn RequirementSource,
}

impl<'a> Requirements<'a> {
    /// Groups the three sources.
    #[must_use]
    pub fn new(
        discover: &'a dyn RequirementSource,
        provision: &'a dyn RequirementSource,
        execute: &'a dyn RequirementSource,
    ) -> Self {
        Self {
            discover,
            provision,
            execute,
        }
    }

    /// Sorted, deduplicated union of every required package.
    #[must_use]
    pub fn requires(&self) -> Vec<String> {
        let union: BTreeSet<String> = self
            .discover
            .requires()
            .into_iter()
            .chain(self.provision.requires())
            .chain(self.execute.requires())
            .filter(|package| !package.trim().is_empty())
            .collect();
        union.into_iter().collect()
    }

    /// Recommended packages reported by discovery, deduplicated in order.
    #[must_use]
    pub fn recommends(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.discover
            .recommends()
            .into_iter()
            .filter(|package| !package.trim().is_empty() && seen.insert(package.clone()))
            .collect()
    }
}
