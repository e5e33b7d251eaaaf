//! Whole-graph operations: traversal, validation and generator hand-off.

use crate::artifact::{ArtifactId, ProjectKind, ProjectRef};
use crate::build::BuildError;
use crate::package::{DependencyRole, PackageDescriptor};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Consumer of an assembled package graph.
///
/// The generator only reads the graph; it is responsible for turning it
/// into build or IDE project files.
pub trait Generator {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Emit output for `root` and everything reachable from it.
    ///
    /// # Errors
    ///
    /// Returns the generator's own error.
    fn generate(&mut self, root: &Arc<PackageDescriptor>) -> Result<(), Self::Error>;
}

/// Errors from [`crate::Registry::generate`].
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("generator failed: {0}")]
    Generator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Every package reachable from `root`, each once, dependencies before
/// dependents. Siblings keep their declaration order.
#[must_use]
pub fn packages(root: &Arc<PackageDescriptor>) -> Vec<Arc<PackageDescriptor>> {
    fn visit(
        package: &Arc<PackageDescriptor>,
        seen: &mut HashSet<*const PackageDescriptor>,
        out: &mut Vec<Arc<PackageDescriptor>>,
    ) {
        if !seen.insert(Arc::as_ptr(package)) {
            return;
        }
        for sub in package.sub_packages() {
            visit(&sub.package, seen, out);
        }
        out.push(Arc::clone(package));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(root, &mut seen, &mut out);
    out
}

/// Check that the graph under `root` is self-contained.
///
/// # Errors
///
/// Returns [`BuildError::MissingArtifact`] if a project links an artifact
/// that no reachable package owns, and [`BuildError::DuplicatePackage`] if
/// two distinct packages share a name.
pub fn validate(root: &Arc<PackageDescriptor>) -> Result<(), BuildError> {
    let all = packages(root);

    let mut names: HashMap<&str, &Arc<PackageDescriptor>> = HashMap::new();
    for package in &all {
        if let Some(other) = names.insert(package.name(), package) {
            if !Arc::ptr_eq(other, package) {
                return Err(BuildError::DuplicatePackage {
                    name: package.name().to_string(),
                });
            }
        }
    }

    let owned: HashSet<&ProjectRef> = all.iter().flat_map(|p| p.projects()).collect();
    for package in &all {
        for project in package.projects() {
            if let Some(missing) = project.dependencies().iter().find(|d| !owned.contains(d)) {
                return Err(BuildError::MissingArtifact {
                    package: package.name().to_string(),
                    artifact: format!("{} '{}'", missing.kind(), missing.name()),
                });
            }
        }
    }

    Ok(())
}

/// Flat, serializable view of a package graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// Name of the root package.
    pub root: String,

    /// Packages, dependencies first.
    pub packages: Vec<PackageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSnapshot {
    pub name: String,
    pub path: String,
    pub sub_packages: Vec<SubPackageSnapshot>,
    pub main_library: ProjectSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_library: Option<ProjectSnapshot>,
    pub unittest: ProjectSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubPackageSnapshot {
    pub name: String,
    pub role: DependencyRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSnapshot {
    pub id: ArtifactId,
    pub name: String,
    pub kind: ProjectKind,
    /// Ids of linked projects, in link order.
    pub dependencies: Vec<ArtifactId>,
}

impl From<&ProjectRef> for ProjectSnapshot {
    fn from(project: &ProjectRef) -> Self {
        Self {
            id: project.id(),
            name: project.name().to_string(),
            kind: project.kind(),
            dependencies: project.dependencies().iter().map(|d| d.id()).collect(),
        }
    }
}

impl GraphSnapshot {
    /// Capture the graph under `root`.
    #[must_use]
    pub fn capture(root: &Arc<PackageDescriptor>) -> Self {
        let packages = packages(root)
            .iter()
            .map(|package| PackageSnapshot {
                name: package.name().to_string(),
                path: package.path().to_string(),
                sub_packages: package
                    .sub_packages()
                    .iter()
                    .map(|sub| SubPackageSnapshot {
                        name: sub.package.name().to_string(),
                        role: sub.role,
                    })
                    .collect(),
                main_library: package.main_library().into(),
                test_library: package.test_library().map(Into::into),
                unittest: package.unittest().into(),
            })
            .collect();

        Self {
            root: root.name().to_string(),
            packages,
        }
    }

    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{setup_library, setup_unittest, ArtifactSet};
    use crate::build::{BuildRun, Registry};
    use crate::package::{PackageBuilder, SubPackage};

    fn diamond() -> Registry {
        let mut registry = Registry::new();
        registry
            .register("base", |run: &mut BuildRun<'_>| {
                PackageBuilder::new("base", "base").build(run)
            })
            .unwrap();
        for name in ["left", "right"] {
            registry
                .register(name, move |run: &mut BuildRun<'_>| {
                    PackageBuilder::new(name, name)
                        .require(run, "base", DependencyRole::Library)?
                        .build(run)
                })
                .unwrap();
        }
        registry
            .register("top", |run: &mut BuildRun<'_>| {
                PackageBuilder::new("top", "top")
                    .with_test_library()
                    .require(run, "left", DependencyRole::Library)?
                    .require(run, "right", DependencyRole::TestProvider)?
                    .build(run)
            })
            .unwrap();
        registry
    }

    #[test]
    fn packages_are_leaf_first_and_unique() {
        let top = diamond().assemble("top").unwrap();
        let names: Vec<_> = packages(&top).iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn undeclared_library_is_missing() {
        let mut registry = Registry::new();
        registry
            .register("base", |run: &mut BuildRun<'_>| {
                PackageBuilder::new("base", "base").build(run)
            })
            .unwrap();
        registry
            .register("app", |run: &mut BuildRun<'_>| -> Result<PackageDescriptor, BuildError> {
                // links base without declaring it as a sub-package
                let base = run.require("base")?;
                let mut main = setup_library("app", "app");
                main.depend_on(base.main_library());
                let main_library = main.freeze(run.next_artifact_id());

                let mut tests = setup_unittest("app_unittest", "app");
                tests.depend_on(&main_library);
                let unittest = tests.freeze(run.next_artifact_id());

                let artifacts = ArtifactSet {
                    main_library,
                    test_library: None,
                };
                Ok(PackageDescriptor::from_parts("app", "app", artifacts, Vec::new(), unittest))
            })
            .unwrap();

        let err = registry.assemble("app").unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingArtifact {
                package: "app".into(),
                artifact: "library 'base'".into()
            }
        );
    }

    #[test]
    fn hand_wired_package_with_declared_library_is_valid() {
        let registry = Registry::new();
        let mut run = registry.run();
        let base = Arc::new(PackageBuilder::new("base", "base").build(&mut run).unwrap());

        let mut main = setup_library("app", "app");
        main.depend_on(base.main_library());
        let main_library = main.freeze(run.next_artifact_id());
        let unittest = setup_unittest("app_unittest", "app").freeze(run.next_artifact_id());
        let app = PackageDescriptor::from_parts(
            "app",
            "app",
            ArtifactSet {
                main_library,
                test_library: None,
            },
            vec![SubPackage {
                package: base,
                role: DependencyRole::Library,
            }],
            unittest,
        );

        assert!(validate(&Arc::new(app)).is_ok());
    }

    #[test]
    fn same_name_in_two_packages_is_duplicate() {
        let registry = Registry::new();
        let mut run = registry.run();
        let first = Arc::new(PackageBuilder::new("base", "a").build(&mut run).unwrap());
        let second = Arc::new(PackageBuilder::new("base", "b").build(&mut run).unwrap());
        let core = Arc::new(
            PackageBuilder::new("core", "core")
                .dependency(first)
                .build(&mut run)
                .unwrap(),
        );
        let app = Arc::new(
            PackageBuilder::new("app", "app")
                .dependency(core)
                .dependency(second)
                .build(&mut run)
                .unwrap(),
        );

        assert_eq!(
            validate(&app).unwrap_err(),
            BuildError::DuplicatePackage {
                name: "base".into()
            }
        );
    }

    #[test]
    fn snapshot_lists_projects_by_id() {
        let top = diamond().assemble("top").unwrap();
        let snapshot = GraphSnapshot::capture(&top);

        assert_eq!(snapshot.root, "top");
        assert_eq!(snapshot.packages.len(), 4);

        let top_snap = snapshot.packages.last().unwrap();
        let right = top.sub_package("right").unwrap();
        assert_eq!(top_snap.sub_packages[1].role, DependencyRole::TestProvider);
        assert!(top_snap.test_library.is_some());
        assert_eq!(
            top_snap.unittest.dependencies,
            top.unittest()
                .dependencies()
                .iter()
                .map(|p| p.id())
                .collect::<Vec<_>>()
        );
        assert!(top_snap
            .unittest
            .dependencies
            .contains(&right.main_library().id()));

        let json = snapshot.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["packages"][0]["name"], "base");
        assert_eq!(value["packages"][0]["main_library"]["kind"], "library");
        assert!(value["packages"][0].get("test_library").is_none());
    }
}
