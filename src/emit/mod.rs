//! C++ header emission.
//!
//! Each buffer becomes a size constant and a `constexpr` array named after
//! its declaration. Bytes are packed big-endian into elements of the
//! declared type; a trailing partial element is zero-padded.
//!
//! Output depends only on the entries, their order and the settings, so
//! identical inputs always give byte-identical text.

mod values;

pub use values::render_values;

use std::fmt::Write as _;

use crate::codec::CompressedPayload;
use crate::error::{BufferError, Result};
use crate::scan::Declaration;

/// Comment prefix of the line recording the staleness fingerprint.
pub const FINGERPRINT_PREFIX: &str = "// bufproc-fingerprint: ";

/// Values per line when nothing else is configured.
pub const DEFAULT_MAX_VALUES: usize = 16;

const INDENT: &str = "    ";

/// Formatting options that affect the generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitSettings {
    /// Values per line; arrays with more values are wrapped.
    pub max_values: usize,
}

impl Default for EmitSettings {
    fn default() -> Self {
        Self {
            max_values: DEFAULT_MAX_VALUES,
        }
    }
}

/// The bytes emitted for one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Raw(Vec<u8>),
    Compressed(CompressedPayload),
}

impl Payload {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Raw(bytes) => bytes,
            Payload::Compressed(payload) => &payload.bytes,
        }
    }
}

/// One buffer to emit.
#[derive(Debug, Clone)]
pub struct BufferEntry<'a> {
    pub decl: &'a Declaration,
    pub payload: Payload,
}

/// Renders buffers as a C++ header.
#[derive(Debug, Clone, Default)]
pub struct BufferEmitter {
    settings: EmitSettings,
}

impl BufferEmitter {
    pub fn new(settings: EmitSettings) -> Self {
        Self {
            settings: EmitSettings {
                max_values: settings.max_values.max(1),
            },
        }
    }

    pub fn settings(&self) -> &EmitSettings {
        &self.settings
    }

    /// Render the complete header for buffers declared in `source_name`.
    pub fn render(&self, source_name: &str, fingerprint: u64, entries: &[BufferEntry<'_>]) -> Result<String> {
        let mut rendered = Vec::with_capacity(entries.len());
        let mut needs_limits = false;
        for entry in entries {
            let (text, limits) = self.render_buffer(entry)?;
            needs_limits |= limits;
            rendered.push((&entry.decl.namespace, text));
        }

        let mut out = String::new();
        let _ = writeln!(out, "// auto-generated by bufproc from {}, do not edit", source_name);
        let _ = writeln!(out, "{}{:016x}", FINGERPRINT_PREFIX, fingerprint);
        out.push_str("#pragma once\n\n#include <cstddef>\n#include <cstdint>\n");
        if needs_limits {
            out.push_str("#include <limits>\n");
        }

        // Group by namespace in order of first appearance.
        let mut groups: Vec<(&[String], Vec<&str>)> = Vec::new();
        for (namespace, text) in &rendered {
            let namespace: &[String] = namespace;
            match groups.iter_mut().find(|(ns, _)| *ns == namespace) {
                Some((_, texts)) => texts.push(text.as_str()),
                None => groups.push((namespace, vec![text.as_str()])),
            }
        }

        for (namespace, texts) in groups {
            out.push('\n');
            for part in namespace.iter() {
                let _ = writeln!(out, "namespace {}\n{{", part);
            }
            let indent = if namespace.is_empty() { "" } else { INDENT };
            for text in texts {
                for line in text.lines() {
                    if line.is_empty() {
                        out.push('\n');
                    } else {
                        let _ = writeln!(out, "{}{}", indent, line);
                    }
                }
            }
            for _ in namespace.iter() {
                out.push_str("}\n");
            }
        }
        Ok(out)
    }

    /// One buffer without namespace indentation; also reports whether `<limits>` is needed.
    fn render_buffer(&self, entry: &BufferEntry<'_>) -> Result<(String, bool)> {
        let decl = entry.decl;
        let bytes = entry.payload.bytes();
        if bytes.is_empty() {
            return Err(BufferError::producer(
                decl.qualified_name(),
                "produced no data, and zero-length arrays cannot be declared",
            )
            .located(&decl.path, decl.line()));
        }

        let rendered = render_values(bytes, decl.element_type);
        let size_symbol = decl.size_symbol();
        let mut out = String::new();

        if let Payload::Compressed(payload) = &entry.payload {
            let _ = writeln!(
                out,
                "// {}: {} -> {} bytes",
                payload.params,
                payload.raw_len,
                payload.bytes.len()
            );
        }
        let _ = writeln!(
            out,
            "constexpr std::size_t {} = {};",
            size_symbol,
            rendered.values.len()
        );

        let head = format!(
            "constexpr {} {}[{}] =",
            decl.type_name,
            decl.symbol(),
            size_symbol
        );
        if rendered.values.len() <= self.settings.max_values {
            let _ = writeln!(out, "{} {{{}}};", head, rendered.values.join(", "));
        } else {
            let _ = writeln!(out, "{}\n{{", head);
            let lines: Vec<String> = rendered
                .values
                .chunks(self.settings.max_values)
                .map(|chunk| chunk.join(", "))
                .collect();
            let _ = writeln!(out, "{}{}", INDENT, lines.join(&format!(",\n{}", INDENT)));
            out.push_str("};\n");
        }

        Ok((out, rendered.needs_limits))
    }
}

/// Read the fingerprint recorded in a generated header.
pub fn recorded_fingerprint(header: &str) -> Option<u64> {
    header
        .lines()
        .take(4)
        .find_map(|line| line.strip_prefix(FINGERPRINT_PREFIX))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
}
