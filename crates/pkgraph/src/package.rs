//! Package descriptors and the builder that composes them.
//!
//! A [`PackageDescriptor`] bundles one package's artifacts with the
//! packages it depends on. [`PackageBuilder`] wires the dependency lists:
//!
//! - the main library links every non test-only sub-package's main
//!   library, direct ones first in declaration order, then their own
//!   flattened libraries
//! - the unit-test executable links the package's own libraries, every
//!   sub-package's main library, and the test library of each
//!   sub-package declared as a test provider

use crate::artifact::{
    setup_library, setup_test_library, setup_unittest, ArtifactSet, DependencyList, ProjectRef,
};
use crate::build::{BuildError, BuildRun};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a sub-package participates in a package's projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyRole {
    /// Linked into the main library and the unit tests.
    #[default]
    Library,
    /// Like [`DependencyRole::Library`], and its test library is linked
    /// into the unit tests.
    TestProvider,
    /// Linked into the unit tests only (test frameworks, test entry points).
    TestOnly,
}

impl DependencyRole {
    fn rank(self) -> u8 {
        match self {
            Self::TestOnly => 0,
            Self::Library => 1,
            Self::TestProvider => 2,
        }
    }

    /// Combine two declarations of the same dependency.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Returns true if the dependency is linked into the main library.
    #[must_use]
    pub fn links_main_library(self) -> bool {
        !matches!(self, Self::TestOnly)
    }
}

impl std::fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::TestProvider => write!(f, "test-provider"),
            Self::TestOnly => write!(f, "test-only"),
        }
    }
}

/// A sub-package together with the role it was declared with.
#[derive(Debug, Clone)]
pub struct SubPackage {
    pub package: Arc<PackageDescriptor>,
    pub role: DependencyRole,
}

/// A fully wired package, ready for the generator.
#[derive(Debug)]
pub struct PackageDescriptor {
    name: String,
    path: String,
    artifacts: ArtifactSet,
    sub_packages: Vec<SubPackage>,
    unittest: ProjectRef,
}

impl PackageDescriptor {
    /// Assemble a descriptor from hand-wired parts.
    ///
    /// Nothing is checked here; [`crate::graph::validate`] rejects links to
    /// libraries of packages that were never declared as sub-packages.
    #[must_use]
    pub fn from_parts(
        name: impl Into<String>,
        path: impl Into<String>,
        artifacts: ArtifactSet,
        sub_packages: Vec<SubPackage>,
        unittest: ProjectRef,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            artifacts,
            sub_packages,
            unittest,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    #[must_use]
    pub fn main_library(&self) -> &ProjectRef {
        &self.artifacts.main_library
    }

    #[must_use]
    pub fn test_library(&self) -> Option<&ProjectRef> {
        self.artifacts.test_library.as_ref()
    }

    /// The unit-test executable.
    #[must_use]
    pub fn unittest(&self) -> &ProjectRef {
        &self.unittest
    }

    /// Sub-packages in declaration order.
    #[must_use]
    pub fn sub_packages(&self) -> &[SubPackage] {
        &self.sub_packages
    }

    /// Find a direct sub-package by name.
    #[must_use]
    pub fn sub_package(&self, name: &str) -> Option<&Arc<PackageDescriptor>> {
        self.sub_packages
            .iter()
            .map(|sub| &sub.package)
            .find(|pkg| pkg.name == name)
    }

    /// Every project this package owns: libraries, then the unit tests.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectRef> {
        self.artifacts
            .libraries()
            .chain(std::iter::once(&self.unittest))
    }
}

/// Composes a [`PackageDescriptor`] from already built dependencies.
#[derive(Debug)]
pub struct PackageBuilder {
    name: String,
    path: String,
    library_name: Option<String>,
    test_library: bool,
    sub_packages: Vec<SubPackage>,
}

impl PackageBuilder {
    /// Start a package with the given name and platform path.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            library_name: None,
            test_library: false,
            sub_packages: Vec::new(),
        }
    }

    /// Declare a test-support library for this package.
    #[must_use]
    pub fn with_test_library(mut self) -> Self {
        self.test_library = true;
        self
    }

    /// Name the main library differently from the package.
    #[must_use]
    pub fn library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn dependency(self, package: Arc<PackageDescriptor>) -> Self {
        self.dependency_with_role(package, DependencyRole::Library)
    }

    #[must_use]
    pub fn test_provider(self, package: Arc<PackageDescriptor>) -> Self {
        self.dependency_with_role(package, DependencyRole::TestProvider)
    }

    #[must_use]
    pub fn test_only(self, package: Arc<PackageDescriptor>) -> Self {
        self.dependency_with_role(package, DependencyRole::TestOnly)
    }

    /// Declare a sub-package.
    ///
    /// Declaring the same package again keeps its first position and
    /// merges the roles.
    #[must_use]
    pub fn dependency_with_role(
        mut self,
        package: Arc<PackageDescriptor>,
        role: DependencyRole,
    ) -> Self {
        if let Some(existing) = self
            .sub_packages
            .iter_mut()
            .find(|sub| Arc::ptr_eq(&sub.package, &package))
        {
            existing.role = existing.role.merge(role);
        } else {
            self.sub_packages.push(SubPackage { package, role });
        }
        self
    }

    /// Obtain a dependency through the run cache and declare it.
    ///
    /// # Errors
    ///
    /// Propagates any error from building the dependency.
    pub fn require(
        self,
        run: &mut BuildRun<'_>,
        name: &str,
        role: DependencyRole,
    ) -> Result<Self, BuildError> {
        let package = run.require(name)?;
        Ok(self.dependency_with_role(package, role))
    }

    /// Construct the artifacts and wire every dependency list.
    ///
    /// # Errors
    ///
    /// Returns an error if the main library has no name or a sub-package
    /// is a different package carrying this package's own name. Errors are
    /// recorded on the run.
    pub fn build(self, run: &mut BuildRun<'_>) -> Result<PackageDescriptor, BuildError> {
        if self.sub_packages.iter().any(|s| s.package.name == self.name) {
            return Err(run.fail(BuildError::DuplicatePackage {
                name: self.name.clone(),
            }));
        }

        let library_name = self.library_name.as_deref().unwrap_or(&self.name);
        if library_name.is_empty() {
            return Err(run.fail(BuildError::MissingArtifact {
                package: self.name.clone(),
                artifact: "main library".to_string(),
            }));
        }

        let mut main = setup_library(library_name, &self.path);
        main.depend_on_all(&self.flattened_libraries());
        let main_library = main.freeze(run.next_artifact_id());

        let test_library = if self.test_library {
            let name = run.naming().test_library_name(library_name);
            let mut test = setup_test_library(name, &self.path);
            test.depend_on(&main_library);
            test.depend_on_all(main_library.dependencies());
            Some(test.freeze(run.next_artifact_id()))
        } else {
            None
        };

        let mut unittest = setup_unittest(run.naming().unittest_name(&self.name), &self.path);
        unittest.depend_on(&main_library);
        if let Some(test) = &test_library {
            unittest.depend_on(test);
        }
        for sub in &self.sub_packages {
            unittest.depend_on(sub.package.main_library());
            if sub.role == DependencyRole::TestProvider {
                match sub.package.test_library() {
                    Some(test) => {
                        unittest.depend_on(test);
                    }
                    None => log::debug!(
                        "test provider '{}' of '{}' has no test library, skipping",
                        sub.package.name,
                        self.name
                    ),
                }
            }
        }
        for sub in &self.sub_packages {
            unittest.depend_on_all(sub.package.main_library().dependencies());
        }
        let unittest = unittest.freeze(run.next_artifact_id());

        Ok(PackageDescriptor {
            name: self.name,
            path: self.path,
            artifacts: ArtifactSet {
                main_library,
                test_library,
            },
            sub_packages: self.sub_packages,
            unittest,
        })
    }

    /// Direct main libraries in declaration order, then transitive ones.
    fn flattened_libraries(&self) -> DependencyList {
        let linked = || {
            self.sub_packages
                .iter()
                .filter(|sub| sub.role.links_main_library())
        };

        let mut list = DependencyList::new();
        for sub in linked() {
            list.push(sub.package.main_library().clone());
        }
        for sub in linked() {
            list.extend(sub.package.main_library().dependencies());
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Registry;

    fn leaf(run: &mut BuildRun<'_>, name: &str) -> Arc<PackageDescriptor> {
        Arc::new(PackageBuilder::new(name, name).build(run).unwrap())
    }

    #[test]
    fn role_merge_prefers_stronger_role() {
        use DependencyRole::{Library, TestOnly, TestProvider};
        assert_eq!(TestOnly.merge(Library), Library);
        assert_eq!(Library.merge(TestProvider), TestProvider);
        assert_eq!(TestProvider.merge(TestOnly), TestProvider);
        assert_eq!(Library.merge(TestOnly), Library);
    }

    #[test]
    fn lone_package_tests_only_its_library() {
        let registry = Registry::new();
        let mut run = registry.run();
        let pkg = leaf(&mut run, "base");

        assert!(pkg.main_library().dependencies().is_empty());
        assert!(pkg.test_library().is_none());
        assert_eq!(pkg.unittest().dependencies().names(), vec!["base"]);
        assert_eq!(pkg.unittest().name(), "base_unittest");
    }

    #[test]
    fn main_library_flattens_in_declaration_order() {
        let registry = Registry::new();
        let mut run = registry.run();
        let base = leaf(&mut run, "base");
        let core = Arc::new(
            PackageBuilder::new("core", "core")
                .dependency(base.clone())
                .build(&mut run)
                .unwrap(),
        );
        let app = PackageBuilder::new("app", "app")
            .with_test_library()
            .dependency(core)
            .dependency(base)
            .build(&mut run)
            .unwrap();

        assert_eq!(app.main_library().dependencies().names(), vec!["core", "base"]);
        assert_eq!(
            app.unittest().dependencies().names(),
            vec!["app", "app_test", "core", "base"]
        );
    }

    #[test]
    fn transitive_libraries_follow_all_direct_ones() {
        let registry = Registry::new();
        let mut run = registry.run();
        let util = leaf(&mut run, "util");
        let net = Arc::new(
            PackageBuilder::new("net", "net")
                .dependency(util)
                .build(&mut run)
                .unwrap(),
        );
        let log = leaf(&mut run, "log");
        let app = PackageBuilder::new("app", "app")
            .dependency(net)
            .dependency(log)
            .build(&mut run)
            .unwrap();

        assert_eq!(
            app.main_library().dependencies().names(),
            vec!["net", "log", "util"]
        );
    }

    #[test]
    fn test_provider_contributes_its_test_library() {
        let registry = Registry::new();
        let mut run = registry.run();
        let harness = Arc::new(
            PackageBuilder::new("harness", "harness")
                .with_test_library()
                .build(&mut run)
                .unwrap(),
        );
        let plain = leaf(&mut run, "plain");
        let app = PackageBuilder::new("app", "app")
            .test_provider(harness)
            .test_provider(plain)
            .build(&mut run)
            .unwrap();

        assert_eq!(
            app.unittest().dependencies().names(),
            vec!["app", "harness", "harness_test", "plain"]
        );
        assert_eq!(
            app.main_library().dependencies().names(),
            vec!["harness", "plain"]
        );
    }

    #[test]
    fn test_only_dependency_stays_out_of_main_library() {
        let registry = Registry::new();
        let mut run = registry.run();
        let unittest = leaf(&mut run, "cunittest");
        let base = leaf(&mut run, "cbase");
        let pkg = PackageBuilder::new("cvmem", "github.com\\jurgen-kluft\\cvmem")
            .test_only(unittest)
            .dependency(base)
            .build(&mut run)
            .unwrap();

        assert_eq!(pkg.main_library().dependencies().names(), vec!["cbase"]);
        assert_eq!(
            pkg.unittest().dependencies().names(),
            vec!["cvmem", "cunittest", "cbase"]
        );
        assert_eq!(pkg.sub_packages().len(), 2);
    }

    #[test]
    fn repeated_dependency_is_declared_once() {
        let registry = Registry::new();
        let mut run = registry.run();
        let base = leaf(&mut run, "base");
        let pkg = PackageBuilder::new("core", "core")
            .test_only(base.clone())
            .dependency(base)
            .build(&mut run)
            .unwrap();

        assert_eq!(pkg.sub_packages().len(), 1);
        assert_eq!(pkg.sub_packages()[0].role, DependencyRole::Library);
        assert_eq!(pkg.main_library().dependencies().names(), vec!["base"]);
    }

    #[test]
    fn test_library_links_main_library() {
        let registry = Registry::new();
        let mut run = registry.run();
        let base = leaf(&mut run, "base");
        let pkg = PackageBuilder::new("core", "core")
            .with_test_library()
            .dependency(base)
            .build(&mut run)
            .unwrap();

        let test = pkg.test_library().unwrap();
        assert_eq!(test.dependencies().names(), vec!["core", "base"]);
    }

    #[test]
    fn empty_library_name_is_missing_artifact() {
        let registry = Registry::new();
        let mut run = registry.run();
        let err = PackageBuilder::new("core", "core")
            .library_name("")
            .build(&mut run)
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingArtifact { ref package, .. } if package == "core"));
    }

    #[test]
    fn sub_package_sharing_own_name_is_duplicate() {
        let registry = Registry::new();
        let mut run = registry.run();
        let other = leaf(&mut run, "core");
        let err = PackageBuilder::new("core", "y")
            .dependency(other)
            .build(&mut run)
            .unwrap_err();

        assert_eq!(
            err,
            BuildError::DuplicatePackage {
                name: "core".into()
            }
        );
        assert_eq!(run.fatal(), Some(&err));
    }
}
