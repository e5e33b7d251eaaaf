//! Build artifacts exposed by packages.
//!
//! Every package owns a main library, optionally a test-support library,
//! and a unit-test executable. Each of these is a [`Project`], shared
//! through a [`ProjectRef`] handle. Handles compare by identity: two
//! projects that happen to carry the same name are still different
//! artifacts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Run-scoped sequence number of a project.
///
/// Used for diagnostics and serialized graphs only, never for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub u64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a project builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    /// The package's primary library.
    Library,
    /// Test-support code linked only into unit-test executables.
    TestLibrary,
    /// The package's unit-test executable.
    UnitTest,
}

impl ProjectKind {
    /// Returns the kind as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::TestLibrary => "test library",
            Self::UnitTest => "unit test",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single build project handed to the generator.
#[derive(Debug)]
pub struct Project {
    id: ArtifactId,
    name: String,
    path: String,
    kind: ProjectKind,
    dependencies: DependencyList,
}

impl Project {
    #[must_use]
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The platform path the project was set up with, passed through untouched.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    /// Libraries this project links against, in link order.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyList {
        &self.dependencies
    }
}

/// Shared handle to a frozen [`Project`].
///
/// Equality and hashing use pointer identity.
#[derive(Clone)]
pub struct ProjectRef(Arc<Project>);

impl ProjectRef {
    /// Returns true if both handles point at the same project.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for ProjectRef {
    type Target = Project;

    fn deref(&self) -> &Project {
        &self.0
    }
}

impl PartialEq for ProjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ProjectRef {}

impl Hash for ProjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Ordered, identity-deduplicated list of project handles.
///
/// The first occurrence of a project fixes its position; later pushes of
/// the same handle are ignored.
#[derive(Debug, Clone, Default)]
pub struct DependencyList {
    items: Vec<ProjectRef>,
    seen: HashSet<ProjectRef>,
}

impl DependencyList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a project unless it is already present.
    ///
    /// Returns true if the project was added.
    pub fn push(&mut self, project: ProjectRef) -> bool {
        if self.seen.insert(project.clone()) {
            self.items.push(project);
            true
        } else {
            false
        }
    }

    /// Append every project in order, skipping ones already present.
    pub fn extend<'a>(&mut self, projects: impl IntoIterator<Item = &'a ProjectRef>) {
        for project in projects {
            self.push(project.clone());
        }
    }

    #[must_use]
    pub fn contains(&self, project: &ProjectRef) -> bool {
        self.seen.contains(project)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectRef> {
        self.items.iter()
    }

    /// Project names in list order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a DependencyList {
    type Item = &'a ProjectRef;
    type IntoIter = std::slice::Iter<'a, ProjectRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A project under construction. Frozen into a [`ProjectRef`] once its
/// dependency list is complete.
#[derive(Debug)]
pub struct ProjectSetup {
    name: String,
    path: String,
    kind: ProjectKind,
    dependencies: DependencyList,
}

impl ProjectSetup {
    #[must_use]
    pub fn new(kind: ProjectKind, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            dependencies: DependencyList::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    /// Dependencies collected so far.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyList {
        &self.dependencies
    }

    /// Add a dependency. Returns false if it was already present.
    pub fn depend_on(&mut self, project: &ProjectRef) -> bool {
        self.dependencies.push(project.clone())
    }

    /// Add several dependencies in order.
    pub fn depend_on_all<'a>(&mut self, projects: impl IntoIterator<Item = &'a ProjectRef>) {
        self.dependencies.extend(projects);
    }

    /// Freeze the project under the given id.
    #[must_use]
    pub fn freeze(self, id: ArtifactId) -> ProjectRef {
        ProjectRef(Arc::new(Project {
            id,
            name: self.name,
            path: self.path,
            kind: self.kind,
            dependencies: self.dependencies,
        }))
    }
}

/// Set up a main library project.
#[must_use]
pub fn setup_library(name: impl Into<String>, path: impl Into<String>) -> ProjectSetup {
    ProjectSetup::new(ProjectKind::Library, name, path)
}

/// Set up a test-support library project.
#[must_use]
pub fn setup_test_library(name: impl Into<String>, path: impl Into<String>) -> ProjectSetup {
    ProjectSetup::new(ProjectKind::TestLibrary, name, path)
}

/// Set up a unit-test executable project.
#[must_use]
pub fn setup_unittest(name: impl Into<String>, path: impl Into<String>) -> ProjectSetup {
    ProjectSetup::new(ProjectKind::UnitTest, name, path)
}

/// The artifacts a package exposes to its dependents.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    /// The package's primary library. Always present.
    pub main_library: ProjectRef,

    /// Test-support library, if the package declares one.
    pub test_library: Option<ProjectRef>,
}

impl ArtifactSet {
    /// Iterate over the libraries in this set, main library first.
    pub fn libraries(&self) -> impl Iterator<Item = &ProjectRef> {
        std::iter::once(&self.main_library).chain(self.test_library.as_ref())
    }

    /// Returns true if the project is one of this set's libraries.
    #[must_use]
    pub fn owns(&self, project: &ProjectRef) -> bool {
        self.libraries().any(|lib| lib == project)
    }
}
