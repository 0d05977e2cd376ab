//! Data producers: turn a declaration's parameters into raw bytes.
//!
//! Each declaration kind maps to a [`DataProducer`], a pair of plain
//! functions. `dependencies` resolves the files a declaration reads without
//! decoding them; `produce` does the actual conversion. The registry ships a
//! built-in producer per kind and lets callers replace any of them.
//!
//! # Example
//!
//! ```ignore
//! use bufproc::producer::{ProducerContext, ProducerRegistry};
//!
//! let registry = ProducerRegistry::builtin();
//! let producer = registry.get(decl.kind).unwrap();
//! let produced = (producer.produce)(&decl, &ctx)?;
//! ```

mod data;
mod font;
mod image;
mod jtag;
mod mpff;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::codec::CompressionSpec;
use crate::condition::MacroEnvironment;
use crate::error::{BufferError, Result};
use crate::resolve::SearchPaths;
use crate::scan::{Declaration, DeclarationKind, Param};

pub use font::{character_columns, FontColor};
pub use image::PixelFormat;
pub use mpff::{MPFF_DEFAULT_SIZE, MPFF_MAGIC, MPFF_VERSION};

/// Raw bytes for one declaration plus every file they were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Produced {
    pub bytes: Vec<u8>,
    pub dependencies: Vec<PathBuf>,
}

/// What a producer may consult besides the declaration itself.
#[derive(Debug, Clone, Copy)]
pub struct ProducerContext<'a> {
    pub search: &'a SearchPaths,
    pub env: &'a MacroEnvironment,
}

impl<'a> ProducerContext<'a> {
    pub fn new(search: &'a SearchPaths, env: &'a MacroEnvironment) -> Self {
        Self { search, env }
    }

    /// Resolve the path held in parameter `index`, expanding `${NAME}` first.
    pub fn resolve_param(&self, decl: &Declaration, index: usize) -> Result<PathBuf> {
        let raw = decl.text_param(index, "a data file path")?;
        let path = self.env.substitute(raw)?;
        self.search.resolve(&path)
    }

    /// Read the file held in parameter `index`.
    pub fn read_param(&self, decl: &Declaration, index: usize) -> Result<(PathBuf, Vec<u8>)> {
        let path = self.resolve_param(decl, index)?;
        let bytes = std::fs::read(&path).map_err(|e| BufferError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok((path, bytes))
    }
}

pub type DependencyFn = fn(&Declaration, &ProducerContext<'_>) -> Result<Vec<PathBuf>>;
pub type ProduceFn = fn(&Declaration, &ProducerContext<'_>) -> Result<Produced>;

/// The two operations every producer provides.
#[derive(Clone, Copy)]
pub struct DataProducer {
    pub dependencies: DependencyFn,
    pub produce: ProduceFn,
}

impl std::fmt::Debug for DataProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProducer").finish_non_exhaustive()
    }
}

/// Producers keyed by declaration kind.
#[derive(Debug, Clone)]
pub struct ProducerRegistry {
    producers: HashMap<DeclarationKind, DataProducer>,
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProducerRegistry {
    /// A registry without any producers.
    pub fn empty() -> Self {
        Self {
            producers: HashMap::new(),
        }
    }

    /// The built-in producer for every kind.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            DeclarationKind::Data,
            DataProducer {
                dependencies: data::file_dependencies,
                produce: data::produce_file,
            },
        );
        registry.register(
            DeclarationKind::Compressed,
            DataProducer {
                dependencies: data::compressed_dependencies,
                produce: data::produce_compressed,
            },
        );
        registry.register(
            DeclarationKind::Image,
            DataProducer {
                dependencies: image::dependencies,
                produce: image::produce,
            },
        );
        registry.register(
            DeclarationKind::FixedFont,
            DataProducer {
                dependencies: font::fixed_dependencies,
                produce: font::produce_fixed,
            },
        );
        registry.register(
            DeclarationKind::VariableFont,
            DataProducer {
                dependencies: font::variable_dependencies,
                produce: font::produce_variable,
            },
        );
        registry.register(
            DeclarationKind::Mpff,
            DataProducer {
                dependencies: mpff::dependencies,
                produce: mpff::produce,
            },
        );
        registry.register(
            DeclarationKind::Jtag,
            DataProducer {
                dependencies: jtag::dependencies,
                produce: jtag::produce,
            },
        );
        registry
    }

    /// Install `producer` for `kind`, returning the one it replaces.
    pub fn register(&mut self, kind: DeclarationKind, producer: DataProducer) -> Option<DataProducer> {
        self.producers.insert(kind, producer)
    }

    pub fn get(&self, kind: DeclarationKind) -> Option<&DataProducer> {
        self.producers.get(&kind)
    }

    /// The producer for `kind`, or an error when none is registered.
    pub fn require(&self, decl: &Declaration) -> Result<&DataProducer> {
        self.get(decl.kind).ok_or_else(|| {
            BufferError::producer(
                decl.qualified_name(),
                format!("no producer registered for {}", decl.kind),
            )
        })
    }
}

/// The compression a declaration asks for; `None` for kinds that are never compressed.
pub fn compression_of(decl: &Declaration) -> Result<CompressionSpec> {
    let index = match decl.kind {
        DeclarationKind::Compressed => 0,
        DeclarationKind::Jtag => 1,
        _ => return Ok(CompressionSpec::None),
    };
    let text = decl.text_param(index, "a compression scheme")?;
    CompressionSpec::parse(text)
}

/// Wrap a message about `decl` as a producer error.
pub(crate) fn failure(decl: &Declaration, message: impl Into<String>) -> BufferError {
    BufferError::producer(decl.qualified_name(), message)
}

/// A string or bare-word option argument, normalised for matching.
pub(crate) fn option_param(decl: &Declaration, index: usize, what: &str) -> Result<String> {
    let text = decl.text_param(index, what)?;
    Ok(text.trim().trim_matches('"').trim().to_ascii_lowercase())
}

/// True when `param` reads as a path rather than an inline value.
pub(crate) fn is_path_param(param: &Param) -> bool {
    match param {
        Param::Str(_) => true,
        Param::Text(text) => {
            let text = text.trim();
            !text.is_empty()
                && crate::condition::parse_integer(text).is_none()
                && text.parse::<f64>().is_err()
                && !text.starts_with('\'')
                && !matches!(text, "true" | "false")
        }
        Param::List(_) => false,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use crate::condition::MacroEnvironment;
    use crate::scan::{Declaration, Scanner};

    /// Parse a single declaration from `src`, which lives in `dir`.
    pub fn declaration(dir: &Path, src: &str) -> Declaration {
        let env = MacroEnvironment::new();
        let path = dir.join("buffers.h");
        let decls: Vec<Declaration> = Scanner::new(src, path, &env)
            .collect::<crate::error::Result<_>>()
            .unwrap();
        decls.into_iter().next().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;

    fn decl(src: &str) -> Declaration {
        let env = MacroEnvironment::new();
        Scanner::new(src, "t.h", &env).next().unwrap().unwrap()
    }

    #[test]
    fn test_builtin_covers_every_kind() {
        let registry = ProducerRegistry::builtin();
        for kind in DeclarationKind::ALL {
            assert!(registry.get(kind).is_some(), "{} has no producer", kind);
        }
    }

    #[test]
    fn test_register_replaces_builtin() {
        fn nothing(_: &Declaration, _: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        fn fixed(_: &Declaration, _: &ProducerContext<'_>) -> Result<Produced> {
            Ok(Produced {
                bytes: vec![42],
                dependencies: Vec::new(),
            })
        }

        let mut registry = ProducerRegistry::builtin();
        let replaced = registry.register(
            DeclarationKind::Image,
            DataProducer {
                dependencies: nothing,
                produce: fixed,
            },
        );
        assert!(replaced.is_some());

        let d = decl("BPImageBuffer(uint8_t, Logo, bitmap, \"logo.png\");");
        let search = SearchPaths::default();
        let env = MacroEnvironment::new();
        let ctx = ProducerContext::new(&search, &env);
        let produced = (registry.require(&d).unwrap().produce)(&d, &ctx).unwrap();
        assert_eq!(produced.bytes, vec![42]);
    }

    #[test]
    fn test_empty_registry_reports_missing_producer() {
        let registry = ProducerRegistry::empty();
        let d = decl("BPDataBuffer(uint8_t, Blob, \"blob.bin\");");
        assert!(matches!(
            registry.require(&d),
            Err(BufferError::Producer { .. })
        ));
    }

    #[test]
    fn test_compression_of() {
        let d = decl("BPCompressedBuffer(uint8_t, Packed, lzss_10_4, \"a.bin\");");
        assert_eq!(
            compression_of(&d).unwrap(),
            CompressionSpec::Lzss {
                window_bits: 10,
                length_bits: 4
            }
        );
        let d = decl("BPJtagBuffer(uint8_t, Fpga, svf, none, \"a.svf\");");
        assert_eq!(compression_of(&d).unwrap(), CompressionSpec::None);
        let d = decl("BPDataBuffer(uint8_t, Blob, \"blob.bin\");");
        assert_eq!(compression_of(&d).unwrap(), CompressionSpec::None);
    }

    #[test]
    fn test_is_path_param() {
        assert!(is_path_param(&Param::Str("a.bin".to_string())));
        assert!(is_path_param(&Param::Text("assets/a.bin".to_string())));
        assert!(!is_path_param(&Param::Text("0x10".to_string())));
        assert!(!is_path_param(&Param::Text("-3".to_string())));
        assert!(!is_path_param(&Param::Text("1.5".to_string())));
        assert!(!is_path_param(&Param::List(vec![])));
    }
}
