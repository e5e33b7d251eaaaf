//! Declarative package manifests (`packages.toml`).
//!
//! ```toml
//! [settings]
//! test-library-suffix = "_test"
//! unittest-suffix = "_unittest"
//!
//! [[package]]
//! name = "cvmem"
//! path = "github.com\\jurgen-kluft\\cvmem"
//! test-library = false
//! dependencies = [
//!     "cbase",
//!     { name = "cunittest", role = "test-only" },
//!     { name = "centry", role = "test-only" },
//! ]
//! ```

use crate::build::{BuildError, BuildRun, PackageSource, Registry};
use crate::package::{DependencyRole, PackageBuilder, PackageDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// The conventional manifest filename.
pub const MANIFEST_FILE: &str = "packages.toml";

const DEFAULT_TEST_LIBRARY_SUFFIX: &str = "_test";
const DEFAULT_UNITTEST_SUFFIX: &str = "_unittest";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("package '{0}' is declared more than once")]
    DuplicatePackage(String),
}

/// How derived projects are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NamingConfig {
    /// Appended to the main library name to name the test library.
    #[serde(default = "default_test_library_suffix")]
    pub test_library_suffix: String,

    /// Appended to the package name to name the unit-test executable.
    #[serde(default = "default_unittest_suffix")]
    pub unittest_suffix: String,
}

fn default_test_library_suffix() -> String {
    DEFAULT_TEST_LIBRARY_SUFFIX.to_string()
}

fn default_unittest_suffix() -> String {
    DEFAULT_UNITTEST_SUFFIX.to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            test_library_suffix: default_test_library_suffix(),
            unittest_suffix: default_unittest_suffix(),
        }
    }
}

impl NamingConfig {
    #[must_use]
    pub fn test_library_name(&self, library: &str) -> String {
        format!("{library}{}", self.test_library_suffix)
    }

    #[must_use]
    pub fn unittest_name(&self, package: &str) -> String {
        format!("{package}{}", self.unittest_suffix)
    }
}

/// A dependency entry: either a bare name or a name with a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyDecl {
    /// `"cbase"`: a plain library dependency.
    Simple(String),

    /// `{ name = "cunittest", role = "test-only" }`.
    Detailed {
        name: String,
        #[serde(default)]
        role: DependencyRole,
    },
}

impl DependencyDecl {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Simple(name) | Self::Detailed { name, .. } => name,
        }
    }

    #[must_use]
    pub fn role(&self) -> DependencyRole {
        match self {
            Self::Simple(_) => DependencyRole::Library,
            Self::Detailed { role, .. } => *role,
        }
    }
}

/// One `[[package]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PackageSpec {
    /// Package name, unique within the manifest.
    pub name: String,

    /// Platform path handed through to every project.
    pub path: String,

    /// Main library name, if it differs from the package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,

    /// Whether the package ships a test-support library.
    #[serde(default)]
    pub test_library: bool,

    /// Dependencies in link order.
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
}

impl PackageSource for PackageSpec {
    fn build(&self, run: &mut BuildRun<'_>) -> Result<PackageDescriptor, BuildError> {
        let mut builder = PackageBuilder::new(&self.name, &self.path);
        if let Some(library) = &self.library {
            builder = builder.library_name(library);
        }
        if self.test_library {
            builder = builder.with_test_library();
        }
        for dep in &self.dependencies {
            builder = builder.require(run, dep.name(), dep.role())?;
        }
        builder.build(run)
    }
}

/// A complete package manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Naming scheme for derived projects.
    #[serde(default)]
    pub settings: NamingConfig,

    /// Declared packages.
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        log::debug!("loading manifest from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, a name is malformed, or a
    /// package is declared twice.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate package names and their uniqueness.
    fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for spec in &self.packages {
            validate_name(&spec.name)?;
            if let Some(library) = &spec.library {
                validate_name(library)?;
            }
            for dep in &spec.dependencies {
                validate_name(dep.name())?;
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ManifestError::DuplicatePackage(spec.name.clone()));
            }
        }
        Ok(())
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Get a package entry by name.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&PackageSpec> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Register every declared package.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicatePackage`] if two entries share a name.
    pub fn into_registry(self) -> Result<Registry, BuildError> {
        let mut registry = Registry::new().with_naming(self.settings);
        for spec in self.packages {
            registry.register(spec.name.clone(), spec)?;
        }
        Ok(registry)
    }
}

/// Validate a package name.
fn validate_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }

    if name.len() > 64 {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot exceed 64 characters",
        ));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name must start with a letter",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}
