//! Raw file and inline value producers.

use std::path::PathBuf;

use crate::condition::parse_integer;
use crate::error::Result;
use crate::scan::{Declaration, ElementType, Param};

use super::{failure, is_path_param, Produced, ProducerContext};

pub fn file_dependencies(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, 0)?])
}

pub fn produce_file(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let (path, bytes) = ctx.read_param(decl, 0)?;
    Ok(Produced {
        bytes,
        dependencies: vec![path],
    })
}

/// Source of a compressed buffer: a file or values written in the declaration.
enum Source<'a> {
    File,
    Inline(Vec<&'a Param>),
}

fn source(decl: &Declaration) -> Result<Source<'_>> {
    let values = decl.params.get(1..).unwrap_or_default();
    match values {
        [] => Err(failure(decl, "expects a data file path or inline values after the scheme")),
        [single] if is_path_param(single) => Ok(Source::File),
        _ => {
            let mut flat = Vec::new();
            flatten(values, &mut flat);
            Ok(Source::Inline(flat))
        }
    }
}

fn flatten<'a>(params: &'a [Param], out: &mut Vec<&'a Param>) {
    for param in params {
        match param {
            Param::List(items) => flatten(items, out),
            other => out.push(other),
        }
    }
}

pub fn compressed_dependencies(
    decl: &Declaration,
    ctx: &ProducerContext<'_>,
) -> Result<Vec<PathBuf>> {
    match source(decl)? {
        Source::File => Ok(vec![ctx.resolve_param(decl, 1)?]),
        Source::Inline(_) => Ok(Vec::new()),
    }
}

pub fn produce_compressed(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    match source(decl)? {
        Source::File => {
            let (path, bytes) = ctx.read_param(decl, 1)?;
            Ok(Produced {
                bytes,
                dependencies: vec![path],
            })
        }
        Source::Inline(values) => {
            let mut bytes = Vec::with_capacity(values.len() * decl.element_type.width());
            for value in values {
                pack_value(decl, value, &mut bytes)?;
            }
            Ok(Produced {
                bytes,
                dependencies: Vec::new(),
            })
        }
    }
}

/// Append one inline value, big-endian at the element width.
fn pack_value(decl: &Declaration, param: &Param, out: &mut Vec<u8>) -> Result<()> {
    let text = match param {
        Param::Text(text) => text.trim(),
        other => {
            return Err(failure(
                decl,
                format!("inline value {} is not a number", other),
            ))
        }
    };
    let ty = decl.element_type;

    match ty {
        ElementType::Float => {
            let value = parse_float(text).ok_or_else(|| not_a_number(decl, text))?;
            out.extend_from_slice(&(value as f32).to_be_bytes());
        }
        ElementType::Double => {
            let value = parse_float(text).ok_or_else(|| not_a_number(decl, text))?;
            out.extend_from_slice(&value.to_be_bytes());
        }
        _ => {
            let value = parse_scalar(text).ok_or_else(|| not_a_number(decl, text))?;
            let width = ty.width();
            let bits = width as u32 * 8;
            let (low, high) = if bits == 64 {
                (i64::MIN as i128, u64::MAX as i128)
            } else {
                (-(1i128 << (bits - 1)), (1i128 << bits) - 1)
            };
            let wide = value as i128;
            if wide < low || wide > high || (ty == ElementType::Bool && !(0..=1).contains(&wide)) {
                return Err(failure(
                    decl,
                    format!("value {} does not fit in {}", text, decl.type_name),
                ));
            }
            out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
        }
    }
    Ok(())
}

fn not_a_number(decl: &Declaration, text: &str) -> crate::error::BufferError {
    failure(decl, format!("inline value '{}' is not a number", text))
}

/// Integer, character or boolean literal.
fn parse_scalar(text: &str) -> Option<i64> {
    match text {
        "true" => return Some(1),
        "false" => return Some(0),
        _ => {}
    }
    if text.starts_with('\'') {
        return parse_char(text);
    }
    parse_integer(text)
}

/// `'A'`, `'\n'`, `'\x7f'`
fn parse_char(text: &str) -> Option<i64> {
    let body = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = body.chars();
    let value = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n' as i64,
            't' => '\t' as i64,
            'r' => '\r' as i64,
            '0' if chars.as_str().is_empty() => 0,
            '\\' => '\\' as i64,
            '\'' => '\'' as i64,
            '"' => '"' as i64,
            'x' => {
                let hex = chars.as_str();
                let value = i64::from_str_radix(hex, 16).ok()?;
                return Some(value);
            }
            _ => return None,
        },
        c if c.is_ascii() => c as i64,
        _ => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

/// C floating literal, with an optional `f`/`F` suffix.
fn parse_float(text: &str) -> Option<f64> {
    if let Some(int) = parse_integer(text) {
        return Some(int as f64);
    }
    let trimmed = text.trim_end_matches(['f', 'F']);
    trimmed.parse::<f64>().ok()
}
