//! Project manifest (bufproc.yaml) parsing.
//!
//! The manifest holds settings shared by every invocation in a project:
//! search directories, default definitions, emitter and worker settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::condition::MacroEnvironment;
use crate::error::{BufferError, Result};

/// File name looked up in the working directory.
pub const MANIFEST_NAME: &str = "bufproc.yaml";

/// Project manifest loaded from bufproc.yaml.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Manifest {
    /// Data search directories, relative to the manifest.
    pub search_paths: Vec<String>,

    /// Values per emitted line.
    pub max_values: Option<usize>,

    /// Worker threads.
    pub threads: Option<usize>,

    /// Definitions applied before command-line `-D` flags.
    /// A null value means defined without a value.
    pub defines: BTreeMap<String, Option<serde_yaml::Value>>,

    /// Patterns to skip when walking directories.
    pub excludes: Vec<String>,

    /// Source extensions considered when walking directories.
    pub extensions: Vec<String>,

    #[serde(skip)]
    pub(crate) base: PathBuf,
}

impl Manifest {
    /// Load manifest from a bufproc.yaml file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BufferError::Io {
            path: path.to_path_buf(),
            message: format!("Failed to read manifest: {}", e),
        })?;

        let mut manifest = Self::parse(&content)?;
        manifest.base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest)
    }

    /// Parse manifest from YAML string.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let manifest: Self = serde_yaml::from_str(content).map_err(|e| BufferError::Config {
            message: format!("Invalid manifest: {}", e),
            help: Some(format!("Check {} syntax", MANIFEST_NAME)),
        })?;
        if manifest.max_values == Some(0) {
            return Err(BufferError::Config {
                message: "max_values must be at least 1".to_string(),
                help: None,
            });
        }
        Ok(manifest)
    }

    /// The manifest in `dir`, if there is one.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_NAME);
        if path.is_file() {
            Self::load(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Definitions as a macro environment.
    pub fn environment(&self) -> Result<MacroEnvironment> {
        let mut env = MacroEnvironment::new();
        for (name, value) in &self.defines {
            match value {
                None => env.define_flag(name.as_str()),
                Some(value) => env.define(name.as_str(), define_text(name, value)?),
            }
        }
        Ok(env)
    }

    /// Search directories resolved against the manifest location,
    /// with `${NAME}` placeholders substituted from `env`.
    pub fn search_dirs(&self, env: &MacroEnvironment) -> Result<Vec<PathBuf>> {
        self.search_paths
            .iter()
            .map(|raw| {
                let expanded = env.substitute(raw)?;
                let path = PathBuf::from(expanded);
                Ok(if path.is_absolute() {
                    path
                } else {
                    self.base.join(path)
                })
            })
            .collect()
    }

    /// Check if a path should be excluded based on exclude patterns.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");
        self.excludes
            .iter()
            .any(|pattern| matches_pattern(&path_str, pattern))
    }
}

fn define_text(name: &str, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(text) => Ok(text.clone()),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        serde_yaml::Value::Bool(flag) => Ok(if *flag { "1" } else { "0" }.to_string()),
        _ => Err(BufferError::Config {
            message: format!("define '{}' must be a string, number, boolean or null", name),
            help: None,
        }),
    }
}

/// Simple glob matching: `**/dir/*`, `*suffix`, `dir/*`, or a substring.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("**/") {
        if let Some(dir) = suffix.strip_suffix("/*") {
            return path.starts_with(&format!("{}/", dir)) || path.contains(&format!("/{}/", dir));
        }
        return path.ends_with(suffix) || path.contains(suffix);
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        if !pattern.contains('/') {
            return path.ends_with(suffix);
        }
    }

    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.starts_with(&format!("{}/", prefix)) || path.contains(&format!("/{}/", prefix));
    }

    path.contains(pattern)
}
