//! Project configuration: the manifest, command-line overrides, and the
//! effective settings they combine into.

mod manifest;
mod walk;

pub use manifest::{Manifest, MANIFEST_NAME};
pub use walk::{collect_sources, DEFAULT_EXTENSIONS};

use std::path::{Path, PathBuf};

use crate::condition::MacroEnvironment;
use crate::emit::{EmitSettings, DEFAULT_MAX_VALUES};
use crate::error::Result;
use crate::pool::default_threads;
use crate::resolve::SearchPaths;

/// Values given on the command line; they win over the manifest.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `-D`/`-U` flags, applied in order after manifest defines.
    pub defines: Vec<String>,
    /// Search directories placed before manifest ones.
    pub search: Vec<PathBuf>,
    pub max_values: Option<usize>,
    pub threads: Option<usize>,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: MacroEnvironment,
    pub search: SearchPaths,
    pub emit: EmitSettings,
    pub threads: usize,
    pub manifest: Manifest,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: MacroEnvironment::new(),
            search: SearchPaths::default(),
            emit: EmitSettings::default(),
            threads: default_threads(),
            manifest: Manifest::default(),
        }
    }
}

impl Settings {
    /// Combine the manifest (explicit path, or discovered in `cwd`) with overrides.
    pub fn load(config: Option<&Path>, cwd: &Path, overrides: &Overrides) -> Result<Self> {
        let manifest = match config {
            Some(path) => Manifest::load(path)?,
            None => Manifest::discover(cwd)?.unwrap_or_default(),
        };
        Self::resolve(manifest, overrides)
    }

    pub fn resolve(manifest: Manifest, overrides: &Overrides) -> Result<Self> {
        let mut env = manifest.environment()?;
        for flag in &overrides.defines {
            env.apply_flag(flag)?;
        }

        let mut search = SearchPaths::default();
        for dir in &overrides.search {
            search.push(PathBuf::from(env.substitute(&dir.to_string_lossy())?));
        }
        for dir in manifest.search_dirs(&env)? {
            search.push(dir);
        }

        let max_values = overrides
            .max_values
            .or(manifest.max_values)
            .unwrap_or(DEFAULT_MAX_VALUES)
            .max(1);
        let threads = overrides
            .threads
            .or(manifest.threads)
            .unwrap_or_else(default_threads)
            .max(1);

        Ok(Self {
            env,
            search,
            emit: EmitSettings { max_values },
            threads,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let manifest = Manifest::parse(
            "search_paths: [/data]\nmax_values: 8\nthreads: 2\ndefines:\n  LEVEL: 1\n  DEBUG:\n",
        )
        .unwrap();
        let overrides = Overrides {
            defines: vec!["-DLEVEL=3".to_string(), "-UDEBUG".to_string()],
            search: vec![PathBuf::from("/first")],
            max_values: Some(4),
            threads: None,
        };
        let settings = Settings::resolve(manifest, &overrides).unwrap();
        assert_eq!(settings.env.get("LEVEL").map(|v| v.as_text()), Some("3"));
        assert!(!settings.env.is_defined("DEBUG"));
        assert_eq!(
            settings.search.dirs(),
            &[PathBuf::from("/first"), PathBuf::from("/data")]
        );
        assert_eq!(settings.emit.max_values, 4);
        assert_eq!(settings.threads, 2);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Manifest::default(), &Overrides::default()).unwrap();
        assert!(settings.env.is_empty());
        assert!(settings.search.dirs().is_empty());
        assert_eq!(settings.emit.max_values, DEFAULT_MAX_VALUES);
        assert!(settings.threads >= 1);
    }
}
