//! Package composition graphs for C/C++ project generators.
//!
//! This crate provides:
//! - Artifact handles (main library, test library, unit tests) with
//!   identity-based equality and deduplicated link lists
//! - A package builder that flattens dependency libraries into each
//!   project in declaration order
//! - Run-scoped assembly with at-most-once construction and cycle detection
//! - Graph validation and a serializable snapshot for generators
//! - Declarative `packages.toml` manifests
//!
//! The crate only builds the graph. Emitting build or IDE project files is
//! left to a [`Generator`].

mod artifact;
mod build;
mod graph;
mod manifest;
mod package;

pub use artifact::{
    setup_library, setup_test_library, setup_unittest, ArtifactId, ArtifactSet, DependencyList,
    Project, ProjectKind, ProjectRef, ProjectSetup,
};
pub use build::{BuildError, BuildRun, BuildState, PackageSource, Registry};
pub use graph::{
    packages, validate, GenerateError, Generator, GraphSnapshot, PackageSnapshot,
    ProjectSnapshot, SubPackageSnapshot,
};
pub use manifest::{
    DependencyDecl, Manifest, ManifestError, NamingConfig, PackageSpec, MANIFEST_FILE,
};
pub use package::{DependencyRole, PackageBuilder, PackageDescriptor, SubPackage};
