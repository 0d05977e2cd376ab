//! Dependency resolution for live declarations.
//!
//! The resolver locates the files a declaration reads and hands the
//! declaration to the producer registered for its kind. Declarations that
//! are not live are never resolved or produced.

mod paths;

pub use paths::SearchPaths;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::condition::MacroEnvironment;
use crate::error::{BufferError, Result};
use crate::producer::{Produced, ProducerContext, ProducerRegistry};
use crate::scan::Declaration;

/// Files a set of declarations depends on, deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    paths: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path unless it is already present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.seen.contains(&path) {
            return false;
        }
        self.seen.insert(path.clone());
        self.paths.push(path);
        true
    }

    pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            self.insert(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Maps declarations to their files and raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    registry: &'a ProducerRegistry,
    search: &'a SearchPaths,
    env: &'a MacroEnvironment,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        registry: &'a ProducerRegistry,
        search: &'a SearchPaths,
        env: &'a MacroEnvironment,
    ) -> Self {
        Self {
            registry,
            search,
            env,
        }
    }

    fn context(&self) -> ProducerContext<'a> {
        ProducerContext::new(self.search, self.env)
    }

    /// Files `decl` reads, without running its producer's conversion.
    ///
    /// Declarations that are not live have no dependencies.
    pub fn dependencies(&self, decl: &Declaration) -> Result<Vec<PathBuf>> {
        if !decl.live {
            return Ok(Vec::new());
        }
        let producer = self.registry.require(decl).map_err(|e| locate(e, decl))?;
        (producer.dependencies)(decl, &self.context()).map_err(|e| locate(e, decl))
    }

    /// Run the producer for `decl`.
    pub fn materialize(&self, decl: &Declaration) -> Result<Produced> {
        if !decl.live {
            return Err(locate(
                BufferError::producer(
                    decl.qualified_name(),
                    "declaration is not live under the active definitions",
                ),
                decl,
            ));
        }
        let producer = self.registry.require(decl).map_err(|e| locate(e, decl))?;
        let produced = (producer.produce)(decl, &self.context()).map_err(|e| locate(e, decl))?;
        log::debug!(
            "{} produced {} bytes from {} files",
            decl.qualified_name(),
            produced.bytes.len(),
            produced.dependencies.len()
        );
        Ok(produced)
    }

    /// Combined dependencies of every live declaration in `decls`.
    pub fn dependency_set(&self, decls: &[Declaration]) -> Result<DependencySet> {
        let mut set = DependencySet::new();
        for decl in decls.iter().filter(|d| d.live) {
            set.extend(self.dependencies(decl)?);
        }
        Ok(set)
    }
}

fn locate(err: BufferError, decl: &Declaration) -> BufferError {
    err.located(&decl.path, decl.line())
}
