//! Source scanning: finds `BP<Kind>Buffer(...)` declarations and decides,
//! per declaration, whether it is live under the active macro definitions.

mod args;
mod declaration;
mod scanner;
mod span;

pub use args::parse_arguments;
pub use declaration::{Declaration, DeclarationKind, ElementType, Param};
pub use scanner::Scanner;
pub use span::{LineIndex, Location, Span};

use std::path::Path;

use crate::condition::MacroEnvironment;
use crate::error::{BufferError, Result};

/// Read a source file as text.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| BufferError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Scan a file and return its live declarations in source order.
pub fn live_declarations(path: &Path, env: &MacroEnvironment) -> Result<Vec<Declaration>> {
    let source = read_source(path)?;
    Scanner::new(&source, path, env)
        .filter(|item| item.as_ref().map_or(true, |d| d.live))
        .collect()
}

/// Whether `source` contains at least one live declaration.
///
/// Stops at the first live declaration, so errors later in the file are
/// not reported.
pub fn has_live_declaration(source: &str, path: &Path, env: &MacroEnvironment) -> Result<bool> {
    for item in Scanner::new(source, path, env) {
        if item?.live {
            return Ok(true);
        }
    }
    Ok(false)
}
