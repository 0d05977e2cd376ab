//! Ordered search directories for data files.

use std::path::{Path, PathBuf};

use crate::error::{BufferError, Origin, Result};

/// Directories searched, in order, for relative data paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchPaths {
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut paths = Self::default();
        for dir in dirs {
            paths.push(dir);
        }
        paths
    }

    /// Append a directory unless it is already present.
    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Resolve `requested`; absolute paths are taken as-is, relative paths
    /// against each directory in order. First existing file wins.
    ///
    /// The working directory is not searched implicitly. Add `.` to the
    /// search paths to get that behaviour.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let path = Path::new(requested);

        if path.is_absolute() {
            if path.is_file() {
                return canonical(path);
            }
        } else {
            for dir in &self.dirs {
                let candidate = dir.join(path);
                if candidate.is_file() {
                    return canonical(&candidate);
                }
            }
        }

        let searched = if path.is_absolute() || self.dirs.is_empty() {
            None
        } else {
            Some(format!(
                "Searched: {}",
                self.dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        };

        Err(BufferError::FileNotFound {
            origin: Origin::default(),
            path: requested.to_string(),
            help: searched.or_else(|| Some("Add a search directory with -I".to_string())),
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| BufferError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_first_match_wins() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("x.bin"), b"a").unwrap();
        fs::write(b.path().join("x.bin"), b"b").unwrap();
        fs::write(b.path().join("y.bin"), b"b").unwrap();

        let paths = SearchPaths::new([a.path().to_path_buf(), b.path().to_path_buf()]);
        let x = paths.resolve("x.bin").unwrap();
        assert_eq!(x, a.path().join("x.bin").canonicalize().unwrap());
        let y = paths.resolve("y.bin").unwrap();
        assert_eq!(y, b.path().join("y.bin").canonicalize().unwrap());
    }

    #[test]
    fn test_absolute_path() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("abs.bin");
        fs::write(&file, b"x").unwrap();

        let paths = SearchPaths::default();
        let resolved = paths.resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved, file.canonicalize().unwrap());
    }

    #[test]
    fn test_not_found_lists_search_dirs() {
        let dir = tempdir().unwrap();
        let paths = SearchPaths::new([dir.path().to_path_buf()]);
        let err = paths.resolve("missing.bin").unwrap_err();
        match err {
            BufferError::FileNotFound { path, help, .. } => {
                assert_eq!(path, "missing.bin");
                assert!(help.unwrap().contains(&dir.path().display().to_string()));
            }
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_directories_are_not_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let paths = SearchPaths::new([dir.path().to_path_buf()]);
        assert!(paths.resolve("sub").is_err());
    }

    #[test]
    fn test_working_directory_is_not_searched() {
        // Tests run from the package root, where Cargo.toml exists.
        assert!(Path::new("Cargo.toml").is_file());
        let dir = tempdir().unwrap();
        let paths = SearchPaths::new([dir.path().to_path_buf()]);
        assert!(paths.resolve("Cargo.toml").is_err());
        assert!(SearchPaths::new([PathBuf::from(".")]).resolve("Cargo.toml").is_ok());
    }

    #[test]
    fn test_push_deduplicates() {
        let mut paths = SearchPaths::new([PathBuf::from("a"), PathBuf::from("b")]);
        paths.push("a");
        assert_eq!(paths.dirs().len(), 2);
    }
}
