//! Macro argument splitting and literal handling.

use crate::error::{BufferError, Result};

use super::declaration::Param;

const RAW_PREFIXES: [&str; 5] = ["u8R", "LR", "uR", "UR", "R"];
const PLAIN_PREFIXES: [&str; 4] = ["u8", "L", "u", "U"];

/// If a string or character literal starts at `at`, return the offset just past it.
///
/// Handles encoding prefixes and raw strings. Unterminated plain literals end
/// at the line break, unterminated raw strings at end of input.
pub(crate) fn literal_end(src: &str, at: usize) -> Option<usize> {
    let rest = &src[at..];

    for prefix in RAW_PREFIXES {
        if let Some(body) = rest.strip_prefix(prefix) {
            if body.starts_with('"') {
                return Some(at + prefix.len() + raw_string_len(body));
            }
        }
    }

    let mut quote_at = at;
    for prefix in PLAIN_PREFIXES {
        if rest.starts_with(prefix)
            && matches!(rest.as_bytes().get(prefix.len()), Some(b'"' | b'\''))
        {
            quote_at = at + prefix.len();
            break;
        }
    }

    let quote = *src.as_bytes().get(quote_at)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let bytes = src.as_bytes();
    let mut i = quote_at + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return Some(i),
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    Some(bytes.len())
}

/// Length of a raw string body starting at its opening quote: `"delim( ... )delim"`.
fn raw_string_len(body: &str) -> usize {
    let Some(open) = body.find('(') else {
        return body.len();
    };
    let delimiter = &body[1..open];
    let terminator = format!("){}\"", delimiter);
    match body[open + 1..].find(&terminator) {
        Some(close) => open + 1 + close + terminator.len(),
        None => body.len(),
    }
}

/// Split macro call arguments on top-level commas.
pub fn parse_arguments(inner: &str) -> Result<Vec<Param>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner)?
        .into_iter()
        .map(parse_param)
        .collect()
}

fn split_top_level(text: &str) -> Result<Vec<&str>> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth: Vec<u8> = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let word_start = i == 0 || !is_ident_byte(bytes[i - 1]);
        if word_start {
            if let Some(end) = literal_end(text, i) {
                i = end;
                continue;
            }
        }

        match b {
            b'(' | b'{' | b'[' => depth.push(b),
            b')' | b'}' | b']' => {
                let open = depth.pop();
                let expected = match b {
                    b')' => b'(',
                    b'}' => b'{',
                    _ => b'[',
                };
                if open != Some(expected) {
                    return Err(BufferError::declaration(format!(
                        "unbalanced '{}' in arguments",
                        b as char
                    )));
                }
            }
            b',' if depth.is_empty() => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if let Some(open) = depth.last() {
        return Err(BufferError::declaration(format!(
            "unclosed '{}' in arguments",
            *open as char
        )));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn parse_param(raw: &str) -> Result<Param> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(BufferError::declaration("empty argument"));
    }

    if let Some(inner) = text.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| BufferError::declaration(format!("unexpected text after list in '{}'", text)))?;
        return parse_list(inner);
    }

    if literal_end(text, 0).is_some() && !text.starts_with('\'') {
        return parse_strings(text);
    }

    Ok(Param::Text(text.split_whitespace().collect::<Vec<_>>().join(" ")))
}

fn parse_list(inner: &str) -> Result<Param> {
    if inner.trim().is_empty() {
        return Ok(Param::List(Vec::new()));
    }
    let mut parts = split_top_level(inner)?;
    // `{1, 2, 3,}` is allowed
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }
    let items = parts
        .into_iter()
        .map(parse_param)
        .collect::<Result<Vec<_>>>()?;
    Ok(Param::List(items))
}

/// Parse one or more adjacent string literals, concatenating their contents.
fn parse_strings(text: &str) -> Result<Param> {
    let mut value = String::new();
    let mut i = 0;

    while i < text.len() {
        if text.as_bytes()[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let end = literal_end(text, i).ok_or_else(|| {
            BufferError::declaration(format!("unexpected text after string literal in '{}'", text))
        })?;
        value.push_str(&literal_contents(&text[i..end])?);
        i = end;
    }

    Ok(Param::Str(value))
}

fn literal_contents(literal: &str) -> Result<String> {
    let unterminated = || BufferError::declaration(format!("unterminated string literal {}", literal));

    let quote = literal.find('"').ok_or_else(unterminated)?;
    let prefix = &literal[..quote];
    let body = &literal[quote..];

    if prefix.ends_with('R') {
        let open = body.find('(').ok_or_else(unterminated)?;
        let delimiter = &body[1..open];
        let terminator = format!("){}\"", delimiter);
        let content = body[open + 1..]
            .strip_suffix(terminator.as_str())
            .ok_or_else(unterminated)?;
        return Ok(content.to_string());
    }

    let content = body
        .strip_prefix('"')
        .and_then(|b| b.strip_suffix('"'))
        .filter(|_| body.len() >= 2)
        .ok_or_else(unterminated)?;
    unescape(content)
}

fn unescape(content: &str) -> Result<String> {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let value = u8::from_str_radix(&hex, 16).map_err(|_| {
                    BufferError::declaration(format!("invalid escape '\\x{}'", hex))
                })?;
                out.push(value as char);
            }
            Some(other) => {
                return Err(BufferError::declaration(format!(
                    "unsupported escape '\\{}'",
                    other
                )))
            }
            None => return Err(BufferError::declaration("dangling '\\' in string literal")),
        }
    }

    Ok(out)
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
