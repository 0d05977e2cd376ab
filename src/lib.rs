//! bufproc - build-time buffer compiler
//!
//! Finds `BP<Kind>Buffer(...)` declarations in C/C++ sources, decides which
//! are live under a set of macro definitions, produces their bytes from data
//! files, optionally compresses them, and writes them out as `constexpr`
//! arrays in a generated header.

pub mod cli;
pub mod codec;
pub mod condition;
pub mod config;
pub mod emit;
pub mod error;
pub mod guard;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod producer;
pub mod resolve;
pub mod scan;

pub use codec::{CodecEngine, CompressedPayload, CompressionSpec, RawPayload, SchemeParams};
pub use condition::{ConditionEvaluator, MacroEnvironment};
pub use config::{Manifest, Overrides, Settings};
pub use emit::{BufferEmitter, BufferEntry, EmitSettings, Payload};
pub use error::{BufferError, Result};
pub use guard::{IncrementalBuildGuard, Staleness, INCOMPLETE_MARKER};
pub use pipeline::{Outcome, Pipeline};
pub use producer::{DataProducer, ProducerRegistry};
pub use resolve::{DependencyResolver, DependencySet, SearchPaths};
pub use scan::{Declaration, DeclarationKind, ElementType, Scanner};
