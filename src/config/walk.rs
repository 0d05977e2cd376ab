//! Expansion of command-line paths into source files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::manifest::Manifest;

/// Extensions walked when the manifest names none.
pub const DEFAULT_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl", "c", "cc", "cpp", "cxx"];

/// Expand `paths` into source files.
///
/// Files are kept as given, in order. Directories are walked recursively
/// and contribute their source files sorted by path.
pub fn collect_sources(paths: &[PathBuf], manifest: &Manifest) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(walk_directory(path, manifest));
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn walk_directory(root: &Path, manifest: &Manifest) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| !manifest.is_excluded(path))
        .filter(|path| has_source_extension(path, manifest))
        .collect()
}

fn has_source_extension(path: &Path, manifest: &Manifest) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if manifest.extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
    } else {
        manifest
            .extensions
            .iter()
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}
