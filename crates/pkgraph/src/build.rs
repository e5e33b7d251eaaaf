//! Run-scoped package construction.
//!
//! A [`Registry`] maps package names to [`PackageSource`]s. Every call to
//! [`Registry::assemble`] opens a fresh [`BuildRun`] which builds each
//! package at most once, leaf-first, and shares the finished descriptor
//! with every dependent. Re-entering a package that is still being built
//! is reported as a cycle.

use crate::artifact::ArtifactId;
use crate::graph::{self, GenerateError, Generator};
use crate::manifest::NamingConfig;
use crate::package::PackageDescriptor;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The same package name was registered twice.
    #[error("package '{name}' is registered more than once")]
    DuplicatePackage { name: String },

    /// A package (transitively) depends on itself.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A required artifact was never constructed.
    #[error("package '{package}' references a {artifact} that was never constructed")]
    MissingArtifact { package: String, artifact: String },

    /// No source is registered under the requested name.
    #[error("unknown package '{name}'")]
    UnknownPackage { name: String },

    /// A source built a package under a different name than requested.
    #[error("source for '{requested}' built package '{built}'")]
    NameMismatch { requested: String, built: String },

    /// The package failed earlier in this run.
    #[error("package '{name}' failed to build earlier in this run")]
    BuildFailed { name: String },
}

/// Something that can produce one package's descriptor.
///
/// Sources obtain their dependencies through [`BuildRun::require`], which
/// guarantees each dependency is built once per run.
pub trait PackageSource {
    /// Build the package.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency cannot be built or the package
    /// cannot be composed.
    fn build(&self, run: &mut BuildRun<'_>) -> Result<PackageDescriptor, BuildError>;
}

impl<F> PackageSource for F
where
    F: Fn(&mut BuildRun<'_>) -> Result<PackageDescriptor, BuildError>,
{
    fn build(&self, run: &mut BuildRun<'_>) -> Result<PackageDescriptor, BuildError> {
        self(run)
    }
}

/// Construction state of one package within a run.
#[derive(Debug, Clone)]
pub enum BuildState {
    /// The package's source is on the build stack.
    Building,
    /// Finished; shared by every dependent for the rest of the run.
    Built(Arc<PackageDescriptor>),
    /// The source returned an error.
    Failed,
}

/// Package sources known to a generation run.
#[derive(Default)]
pub struct Registry {
    sources: BTreeMap<String, Box<dyn PackageSource>>,
    naming: NamingConfig,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("packages", &self.sources.keys().collect::<Vec<_>>())
            .field("naming", &self.naming)
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given naming scheme for derived projects.
    #[must_use]
    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    #[must_use]
    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    /// Register a package source.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicatePackage`] if the name is taken; the
    /// first registration is kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: impl PackageSource + 'static,
    ) -> Result<(), BuildError> {
        let name = name.into();
        if self.sources.contains_key(&name) {
            return Err(BuildError::DuplicatePackage { name });
        }
        self.sources.insert(name, Box::new(source));
        Ok(())
    }

    /// Returns true if a source is registered under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered package names, sorted.
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Open a new, empty run over this registry.
    #[must_use]
    pub fn run(&self) -> BuildRun<'_> {
        BuildRun {
            registry: self,
            states: HashMap::new(),
            stack: Vec::new(),
            completed: Vec::new(),
            next_id: 0,
            fatal: None,
        }
    }

    /// Build `root` and everything it depends on, then validate the graph.
    ///
    /// # Errors
    ///
    /// Returns the first error met anywhere in the run, even one a source
    /// discarded; no partial graph is returned.
    pub fn assemble(&self, root: &str) -> Result<Arc<PackageDescriptor>, BuildError> {
        let mut run = self.run();
        let result = run.require(root);
        if let Some(err) = run.fatal.take() {
            return Err(err);
        }
        let package = result?;
        graph::validate(&package)?;
        log::info!(
            "assembled '{}' from {} package(s)",
            root,
            run.completed().len()
        );
        Ok(package)
    }

    /// Assemble `root` and hand it to the generator.
    ///
    /// # Errors
    ///
    /// Returns an error if assembly fails, in which case the generator is
    /// never called, or if the generator fails.
    pub fn generate<G: Generator>(
        &self,
        root: &str,
        generator: &mut G,
    ) -> Result<(), GenerateError> {
        let package = self.assemble(root)?;
        generator
            .generate(&package)
            .map_err(|e| GenerateError::Generator(Box::new(e)))
    }
}

/// State of a single generation run.
pub struct BuildRun<'r> {
    registry: &'r Registry,
    states: HashMap<String, BuildState>,
    stack: Vec<String>,
    completed: Vec<String>,
    next_id: u64,
    fatal: Option<BuildError>,
}

impl std::fmt::Debug for BuildRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRun")
            .field("stack", &self.stack)
            .field("completed", &self.completed)
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl BuildRun<'_> {
    /// Get a package's descriptor, building it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`] if the package is already on
    /// the build stack, [`BuildError::UnknownPackage`] if no source is
    /// registered, and any error raised while building.
    pub fn require(&mut self, name: &str) -> Result<Arc<PackageDescriptor>, BuildError> {
        match self.states.get(name) {
            Some(BuildState::Built(package)) => return Ok(Arc::clone(package)),
            Some(BuildState::Building) => {
                let err = self.cycle_error(name);
                return Err(self.fail(err));
            }
            Some(BuildState::Failed) => {
                return Err(BuildError::BuildFailed {
                    name: name.to_string(),
                })
            }
            None => {}
        }

        let registry = self.registry;
        let Some(source) = registry.sources.get(name) else {
            return Err(self.fail(BuildError::UnknownPackage {
                name: name.to_string(),
            }));
        };

        log::debug!("building package '{name}'");
        self.states.insert(name.to_string(), BuildState::Building);
        self.stack.push(name.to_string());
        let result = source.build(self);
        self.stack.pop();

        match result.and_then(|package| self.register(name, package)) {
            Ok(package) => {
                log::debug!("built package '{name}'");
                Ok(package)
            }
            Err(err) => {
                self.states.insert(name.to_string(), BuildState::Failed);
                Err(self.fail(err))
            }
        }
    }

    /// Record a fatal error for this run and hand it back.
    ///
    /// Only the first error is kept; [`Registry::assemble`] reports it even
    /// when a source went on after discarding it.
    pub fn fail(&mut self, err: BuildError) -> BuildError {
        if self.fatal.is_none() {
            log::debug!("run failed: {err}");
            self.fatal = Some(err.clone());
        }
        err
    }

    /// The first fatal error of this run, if any.
    #[must_use]
    pub fn fatal(&self) -> Option<&BuildError> {
        self.fatal.as_ref()
    }

    /// Promote a finished descriptor to `Built`.
    fn register(
        &mut self,
        requested: &str,
        package: PackageDescriptor,
    ) -> Result<Arc<PackageDescriptor>, BuildError> {
        if package.name() != requested {
            if let Some(BuildState::Built(_)) = self.states.get(package.name()) {
                return Err(BuildError::DuplicatePackage {
                    name: package.name().to_string(),
                });
            }
            return Err(BuildError::NameMismatch {
                requested: requested.to_string(),
                built: package.name().to_string(),
            });
        }

        let package = Arc::new(package);
        self.states
            .insert(requested.to_string(), BuildState::Built(Arc::clone(&package)));
        self.completed.push(requested.to_string());
        Ok(package)
    }

    fn cycle_error(&self, name: &str) -> BuildError {
        let start = self.stack.iter().position(|n| n == name).unwrap_or(0);
        let mut cycle = self.stack[start..].to_vec();
        cycle.push(name.to_string());
        BuildError::CyclicDependency { cycle }
    }

    /// The naming scheme for derived projects.
    #[must_use]
    pub fn naming(&self) -> &NamingConfig {
        &self.registry.naming
    }

    /// Current state of a package, if it was reached in this run.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&BuildState> {
        self.states.get(name)
    }

    /// Names of finished packages, leaf-first.
    #[must_use]
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    /// Allocate the next project id of this run.
    pub fn next_artifact_id(&mut self) -> ArtifactId {
        let id = ArtifactId(self.next_id);
        self.next_id += 1;
        id
    }
}
