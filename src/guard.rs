//! Incremental regeneration checks and crash-safe header writes.
//!
//! An output is fresh when it exists, carries no incomplete marker, records
//! the current fingerprint, and is strictly newer than all of its inputs.
//! Inputs are the source file, its dependency set and the tool's own
//! executable. An input sharing the output's timestamp may have been edited
//! after generation on coarse-grained filesystems, so it counts as newer.
//!
//! Generation first replaces the output with a marker-only file, then writes
//! the finished header through a temporary file and an atomic rename. A run
//! killed in between leaves the marker behind and the next run regenerates.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::condition::MacroEnvironment;
use crate::emit::{recorded_fingerprint, EmitSettings};
use crate::error::{BufferError, Result};
use crate::scan::Declaration;

/// Sentinel comment present only in outputs whose generation did not finish.
pub const INCOMPLETE_MARKER: &str = "// bufproc: INCOMPLETE OUTPUT, regenerate";

/// Why an output does or does not need regenerating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Missing,
    Incomplete,
    FingerprintChanged,
    Outdated { newer: PathBuf },
    MissingInput { path: PathBuf },
}

impl Staleness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Staleness::Fresh)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::Fresh => write!(f, "up to date"),
            Staleness::Missing => write!(f, "output does not exist"),
            Staleness::Incomplete => write!(f, "previous generation was interrupted"),
            Staleness::FingerprintChanged => write!(f, "definitions or settings changed"),
            Staleness::Outdated { newer } => write!(f, "{} is newer", newer.display()),
            Staleness::MissingInput { path } => write!(f, "{} is missing", path.display()),
        }
    }
}

/// Decides whether an output must be regenerated and writes it safely.
#[derive(Debug, Clone, Default)]
pub struct IncrementalBuildGuard {
    tool_files: Vec<PathBuf>,
}

impl IncrementalBuildGuard {
    /// Guard that also treats the running executable as an input.
    pub fn new() -> Self {
        Self {
            tool_files: std::env::current_exe().ok().into_iter().collect(),
        }
    }

    /// Replace the files standing in for the tool's implementation.
    pub fn with_tool_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.tool_files = files.into_iter().collect();
        self
    }

    pub fn check(
        &self,
        output: &Path,
        source: &Path,
        dependencies: &[PathBuf],
        fingerprint: u64,
    ) -> Result<Staleness> {
        let output_time = match fs::metadata(output) {
            Ok(meta) => modified(output, &meta)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Staleness::Missing),
            Err(e) => return Err(io_error(output, "cannot inspect", e)),
        };

        let text = fs::read_to_string(output).map_err(|e| io_error(output, "cannot read", e))?;
        if text.lines().any(|line| line.trim() == INCOMPLETE_MARKER) {
            return Ok(Staleness::Incomplete);
        }
        if recorded_fingerprint(&text) != Some(fingerprint) {
            return Ok(Staleness::FingerprintChanged);
        }

        let inputs = std::iter::once(source).chain(dependencies.iter().map(PathBuf::as_path));
        for input in inputs {
            let meta = match fs::metadata(input) {
                Ok(meta) => meta,
                Err(_) => {
                    return Ok(Staleness::MissingInput {
                        path: input.to_path_buf(),
                    })
                }
            };
            if modified(input, &meta)? >= output_time {
                return Ok(Staleness::Outdated {
                    newer: input.to_path_buf(),
                });
            }
        }

        // A missing tool file only means the executable moved; it is not an input error.
        for tool in &self.tool_files {
            if let Ok(meta) = fs::metadata(tool) {
                if modified(tool, &meta)? >= output_time {
                    return Ok(Staleness::Outdated { newer: tool.clone() });
                }
            }
        }

        Ok(Staleness::Fresh)
    }

    /// Replace `output` with a marker-only file before production starts.
    pub fn mark_incomplete(&self, output: &Path) -> Result<()> {
        self.write_atomic(output, &format!("{}\n", INCOMPLETE_MARKER))
    }

    /// Write the finished header, replacing the marker.
    pub fn write(&self, output: &Path, contents: &str) -> Result<()> {
        self.write_atomic(output, contents)
    }

    fn write_atomic(&self, output: &Path, contents: &str) -> Result<()> {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, "cannot create directory", e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| io_error(&dir, "cannot create temporary file in", e))?;
        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| io_error(temp.path(), "cannot write", e))?;
        temp.persist(output)
            .map_err(|e| io_error(output, "cannot replace", e.error))?;
        Ok(())
    }
}

/// Hash of everything besides timestamps that determines the generated text.
pub fn fingerprint(
    env: &MacroEnvironment,
    decls: &[Declaration],
    dependencies: &[PathBuf],
    settings: &EmitSettings,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    env.hash(&mut hasher);
    for decl in decls.iter().filter(|d| d.live) {
        decl.kind.hash(&mut hasher);
        decl.type_name.hash(&mut hasher);
        decl.namespace.hash(&mut hasher);
        decl.name.hash(&mut hasher);
        decl.params.hash(&mut hasher);
    }
    dependencies.hash(&mut hasher);
    settings.hash(&mut hasher);
    env!("CARGO_PKG_VERSION").hash(&mut hasher);
    hasher.finish()
}

fn modified(path: &Path, meta: &fs::Metadata) -> Result<SystemTime> {
    meta.modified()
        .map_err(|e| io_error(path, "cannot read modification time of", e))
}

fn io_error(path: &Path, action: &str, err: std::io::Error) -> BufferError {
    BufferError::Io {
        path: path.to_path_buf(),
        message: format!("{} {}: {}", action, path.display(), err),
    }
}
