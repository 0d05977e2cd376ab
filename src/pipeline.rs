//! The three build operations: `filter`, `deps` and `generate`.
//!
//! Files are scanned and declarations materialised on the scoped worker
//! pool; results are collected in input order so output never depends on
//! scheduling.

use std::path::{Path, PathBuf};

use crate::codec::{CodecEngine, CompressionSpec, RawPayload, SchemeParams};
use crate::config::Settings;
use crate::emit::{BufferEmitter, BufferEntry, Payload};
use crate::error::Result;
use crate::guard::{fingerprint, IncrementalBuildGuard, Staleness};
use crate::pool::parallel_map;
use crate::producer::{compression_of, ProducerRegistry};
use crate::resolve::{DependencyResolver, DependencySet, SearchPaths};
use crate::scan::{has_live_declaration, live_declarations, read_source, Declaration};

/// What one emitted buffer ended up as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSummary {
    pub name: String,
    pub raw_len: usize,
    pub emitted_len: usize,
    /// Scheme of compressed buffers.
    pub scheme: Option<SchemeParams>,
}

/// Result of [`Pipeline::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The existing output was kept.
    UpToDate,
    Generated {
        /// Why the output was regenerated; `None` when forced.
        reason: Option<Staleness>,
        buffers: Vec<BufferSummary>,
    },
}

/// Scanner, resolver, codec, emitter and guard wired together.
#[derive(Debug, Clone)]
pub struct Pipeline {
    settings: Settings,
    registry: ProducerRegistry,
    guard: IncrementalBuildGuard,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            registry: ProducerRegistry::builtin(),
            guard: IncrementalBuildGuard::new(),
        }
    }

    pub fn with_guard(mut self, guard: IncrementalBuildGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Files that contain at least one live declaration, in input order.
    pub fn filter(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let env = &self.settings.env;
        let results = parallel_map(files, self.settings.threads, |path| {
            let source = read_source(path)?;
            has_live_declaration(&source, path, env)
        });

        let mut live = Vec::new();
        for (path, result) in files.iter().zip(results) {
            if result? {
                live.push(path.clone());
            } else {
                log::debug!("{}: no live declarations", path.display());
            }
        }
        Ok(live)
    }

    /// Dependencies of the live declarations in `file`.
    pub fn deps(&self, file: &Path) -> Result<DependencySet> {
        let decls = live_declarations(file, &self.settings.env)?;
        let search = self.search_for(file);
        DependencyResolver::new(&self.registry, &search, &self.settings.env).dependency_set(&decls)
    }

    /// Generate the header for `input` at `output` unless it is up to date.
    pub fn generate(&self, input: &Path, output: &Path, force: bool) -> Result<Outcome> {
        let env = &self.settings.env;
        let decls = live_declarations(input, env)?;
        let search = self.search_for(input);
        let resolver = DependencyResolver::new(&self.registry, &search, env);
        let deps = resolver.dependency_set(&decls)?;
        let print = fingerprint(env, &decls, deps.paths(), &self.settings.emit);

        let reason = if force {
            None
        } else {
            let state = self.guard.check(output, input, deps.paths(), print)?;
            if state.is_fresh() {
                log::info!("{} is up to date", output.display());
                return Ok(Outcome::UpToDate);
            }
            log::info!("regenerating {}: {}", output.display(), state);
            Some(state)
        };

        self.guard.mark_incomplete(output)?;

        let threads = self.settings.threads;
        let codec_threads = (threads / decls.len().max(1)).max(1);
        let payloads = parallel_map(&decls, threads, |decl| {
            build_payload(&resolver, decl, codec_threads)
        });

        let mut entries = Vec::with_capacity(decls.len());
        let mut buffers = Vec::with_capacity(decls.len());
        for (decl, payload) in decls.iter().zip(payloads) {
            let (payload, raw_len) = payload?;
            buffers.push(BufferSummary {
                name: decl.qualified_name(),
                raw_len,
                emitted_len: payload.bytes().len(),
                scheme: match &payload {
                    Payload::Compressed(compressed) => Some(compressed.params),
                    Payload::Raw(_) => None,
                },
            });
            entries.push(BufferEntry { decl, payload });
        }

        let source_name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        let text = BufferEmitter::new(self.settings.emit).render(&source_name, print, &entries)?;
        self.guard.write(output, &text)?;

        Ok(Outcome::Generated { reason, buffers })
    }

    /// Configured search paths followed by the directory of `file`.
    fn search_for(&self, file: &Path) -> SearchPaths {
        let mut search = self.settings.search.clone();
        match file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => search.push(dir),
            _ => search.push("."),
        }
        search
    }
}

/// Materialise `decl` and compress it as requested; also returns the raw length.
fn build_payload(
    resolver: &DependencyResolver<'_>,
    decl: &Declaration,
    codec_threads: usize,
) -> Result<(Payload, usize)> {
    let produced = resolver.materialize(decl)?;
    let raw_len = produced.bytes.len();
    let spec = compression_of(decl).map_err(|e| e.located(&decl.path, decl.line()))?;
    if let CompressionSpec::None = spec {
        return Ok((Payload::Raw(produced.bytes), raw_len));
    }

    let raw = RawPayload::new(produced.bytes, decl.element_type.width());
    let compressed = CodecEngine::new(codec_threads).encode(&decl.qualified_name(), &raw, &spec)?;
    log::debug!(
        "{}: {} -> {} bytes with {}",
        decl.qualified_name(),
        raw_len,
        compressed.bytes.len(),
        compressed.params
    );
    Ok((Payload::Compressed(compressed), raw_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Manifest, Overrides};
    use std::fs;
    use tempfile::tempdir;

    fn pipeline(defines: &[&str]) -> Pipeline {
        let overrides = Overrides {
            defines: defines.iter().map(|d| d.to_string()).collect(),
            threads: Some(2),
            ..Overrides::default()
        };
        let settings = Settings::resolve(Manifest::default(), &overrides).unwrap();
        Pipeline::new(settings).with_guard(IncrementalBuildGuard::default())
    }

    #[test]
    fn test_generate_compressed_inline_values() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tables.h");
        fs::write(
            &input,
            "namespace tables {\nBPCompressedBuffer(uint8_t, Ramp, rle, {1, 1, 1, 1, 1, 1, 2});\n}\n",
        )
        .unwrap();
        let output = dir.path().join("tables_buffers.h");

        let outcome = pipeline(&[]).generate(&input, &output, false).unwrap();
        match outcome {
            Outcome::Generated { reason, buffers } => {
                assert_eq!(reason, Some(Staleness::Missing));
                assert_eq!(buffers.len(), 1);
                assert_eq!(buffers[0].name, "tables::Ramp");
                assert_eq!(buffers[0].raw_len, 7);
                assert!(matches!(buffers[0].scheme, Some(SchemeParams::Rle(_))));
            }
            other => panic!("Expected Generated, got {:?}", other),
        }

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("namespace tables\n{\n"));
        assert!(text.contains("constexpr uint8_t Ramp_Compressed[Ramp_CompressedSize] = {"));
    }

    #[test]
    fn test_failed_generation_leaves_marker() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("broken.h");
        fs::write(&input, "BPDataBuffer(uint8_t, Empty, \"empty.bin\");\n").unwrap();
        fs::write(dir.path().join("empty.bin"), b"").unwrap();
        let output = dir.path().join("broken_buffers.h");

        assert!(pipeline(&[]).generate(&input, &output, false).is_err());
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains(crate::guard::INCOMPLETE_MARKER));
    }

    #[test]
    fn test_deps_uses_input_directory() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("assets.h");
        fs::write(&input, "BPDataBuffer(uint8_t, Logo, \"logo.bin\");\n").unwrap();
        fs::write(dir.path().join("logo.bin"), [1u8]).unwrap();

        let set = pipeline(&[]).deps(&input).unwrap();
        assert_eq!(
            set.paths(),
            &[dir.path().join("logo.bin").canonicalize().unwrap()]
        );
    }

    #[test]
    fn test_filter_reports_unreadable_files() {
        let err = pipeline(&[])
            .filter(&[PathBuf::from("/definitely/not/here.h")])
            .unwrap_err();
        assert!(matches!(err, crate::error::BufferError::Io { .. }));
    }
}
