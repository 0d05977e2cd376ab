//! Conditional-aware declaration scanner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::condition::{ConditionEvaluator, MacroEnvironment};
use crate::error::{BufferError, Origin, Result};

use super::args::{is_ident_byte, literal_end, parse_arguments};
use super::declaration::{Declaration, DeclarationKind, ElementType, Param};
use super::span::{LineIndex, Span};

/// One open `#if`/`#ifdef`/`#ifndef` group.
#[derive(Debug, Clone)]
struct ConditionalFrame {
    /// Whether text in the current branch is live.
    live: bool,
    /// Whether the enclosing text is live.
    parent_live: bool,
    /// Whether some branch of this group has been taken.
    taken: bool,
    seen_else: bool,
    /// Line of the opening directive.
    line: u32,
    directive: &'static str,
}

/// Streams the buffer declarations of one source file.
///
/// Yields every declaration found, live or not. Iteration stops after the
/// first error.
pub struct Scanner<'a> {
    src: &'a str,
    path: PathBuf,
    env: &'a MacroEnvironment,
    lines: LineIndex,
    pos: usize,
    line_start: bool,
    frames: Vec<ConditionalFrame>,
    /// Namespace components pushed by each open live brace.
    braces: Vec<usize>,
    namespace: Vec<String>,
    seen: HashMap<(Vec<String>, String), u32>,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str, path: impl Into<PathBuf>, env: &'a MacroEnvironment) -> Self {
        Self {
            src,
            path: path.into(),
            env,
            lines: LineIndex::new(src),
            pos: 0,
            line_start: true,
            frames: Vec::new(),
            braces: Vec::new(),
            namespace: Vec::new(),
            seen: HashMap::new(),
            done: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn live(&self) -> bool {
        self.frames.last().map_or(true, |frame| frame.live)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn origin(&self, line: u32) -> Origin {
        Origin::new(&self.path, line)
    }

    fn advance(&mut self) -> Result<Option<Declaration>> {
        let bytes = self.src.as_bytes();

        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            match b {
                b'\n' => {
                    self.line_start = true;
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'#' if self.line_start => self.directive()?,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'{' => {
                    self.line_start = false;
                    if self.live() {
                        self.braces.push(0);
                    }
                    self.pos += 1;
                }
                b'}' => {
                    self.line_start = false;
                    if self.live() {
                        if let Some(count) = self.braces.pop() {
                            let keep = self.namespace.len().saturating_sub(count);
                            self.namespace.truncate(keep);
                        }
                    }
                    self.pos += 1;
                }
                b'"' | b'\'' => {
                    self.line_start = false;
                    self.pos = literal_end(self.src, self.pos).unwrap_or(self.pos + 1);
                }
                b if is_ident_byte(b) => {
                    self.line_start = false;
                    if let Some(declaration) = self.word()? {
                        return Ok(Some(declaration));
                    }
                }
                _ => {
                    self.line_start = false;
                    self.pos += 1;
                }
            }
        }

        if let Some(frame) = self.frames.last() {
            return Err(BufferError::UnterminatedConditional {
                origin: self.origin(frame.line),
                message: format!("#{} is never closed by #endif", frame.directive),
            });
        }
        Ok(None)
    }

    fn skip_line_comment(&mut self) {
        self.pos = self.src[self.pos..]
            .find('\n')
            .map_or(self.src.len(), |i| self.pos + i);
    }

    fn skip_block_comment(&mut self) {
        self.pos = self.src[self.pos + 2..]
            .find("*/")
            .map_or(self.src.len(), |i| self.pos + 2 + i + 2);
    }

    /// Handle an identifier, number or prefixed literal at the cursor.
    fn word(&mut self) -> Result<Option<Declaration>> {
        let bytes = self.src.as_bytes();
        let start = self.pos;

        if !bytes[start].is_ascii_digit() {
            if let Some(end) = literal_end(self.src, start) {
                self.pos = end;
                return Ok(None);
            }
        }

        let numeric = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() {
            let b = bytes[end];
            let separator = numeric
                && b == b'\''
                && bytes.get(end + 1).is_some_and(|&n| n.is_ascii_alphanumeric());
            if is_ident_byte(b) || separator || (numeric && b == b'.') {
                end += 1;
            } else {
                break;
            }
        }
        self.pos = end;
        let word = &self.src[start..end];

        if word == "namespace" {
            if self.live() {
                self.namespace_header();
            }
            return Ok(None);
        }

        match macro_suffix(word) {
            Some(suffix) => self.declaration(start, suffix),
            None => Ok(None),
        }
    }

    /// Parse what follows `namespace` up to its `{`, or skip an alias/using.
    fn namespace_header(&mut self) {
        let bytes = self.src.as_bytes();
        let mut header = String::new();

        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'{' => {
                    self.pos += 1;
                    let names: Vec<String> = header
                        .split("::")
                        .filter_map(|part| {
                            part.split_whitespace()
                                .filter(|token| *token != "inline")
                                .last()
                        })
                        .map(str::to_string)
                        .collect();
                    self.braces.push(names.len());
                    self.namespace.extend(names);
                    return;
                }
                b';' | b'=' => {
                    self.skip_statement();
                    return;
                }
                b => {
                    header.push(b as char);
                    self.pos += 1;
                }
            }
        }
    }

    fn skip_statement(&mut self) {
        self.pos = self.src[self.pos..]
            .find(';')
            .map_or(self.src.len(), |i| self.pos + i + 1);
    }

    fn declaration(&mut self, start: usize, suffix: &str) -> Result<Option<Declaration>> {
        let live = self.live();
        let bytes = self.src.as_bytes();

        let mut open = self.pos;
        while open < bytes.len() && bytes[open].is_ascii_whitespace() {
            open += 1;
        }
        if bytes.get(open) != Some(&b'(') {
            // A mention of the macro name that is not a call
            return Ok(None);
        }

        let line = self.lines.line(start);
        let Some((inner, close)) = capture_call(self.src, open) else {
            if live {
                return Err(BufferError::InvalidDeclaration {
                    origin: self.origin(line),
                    message: format!("BP{}Buffer( is never closed", suffix),
                    help: Some("Check for a missing ')'".to_string()),
                });
            }
            return Ok(None);
        };

        let mut end = close;
        while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
            end += 1;
        }
        if bytes.get(end) == Some(&b';') {
            end += 1;
        }
        self.pos = end;

        let span = self.lines.span(self.src, start, end);
        let declaration = match self.build(suffix, &inner, span, live) {
            Ok(declaration) => declaration,
            Err(err) if live => return Err(err.located(&self.path, line)),
            Err(err) => {
                log::debug!("{}:{}: skipping inactive declaration: {}", self.path.display(), line, err);
                return Ok(None);
            }
        };

        if live {
            let key = (declaration.namespace.clone(), declaration.name.clone());
            if let Some(&first_line) = self.seen.get(&key) {
                return Err(BufferError::DuplicateDeclaration {
                    origin: self.origin(line),
                    name: declaration.qualified_name(),
                    first_line,
                });
            }
            self.seen.insert(key, line);
        }

        Ok(Some(declaration))
    }

    fn build(&self, suffix: &str, inner: &str, span: Span, live: bool) -> Result<Declaration> {
        let kind = DeclarationKind::from_suffix(suffix).ok_or_else(|| {
            let known: Vec<String> = DeclarationKind::ALL.iter().map(|k| k.to_string()).collect();
            BufferError::InvalidDeclaration {
                origin: Origin::default(),
                message: format!("unknown buffer kind 'BP{}Buffer'", suffix),
                help: Some(format!("Known kinds: {}", known.join(", "))),
            }
        })?;

        let mut params = parse_arguments(inner)?;
        if params.len() < 2 {
            return Err(BufferError::declaration(format!(
                "{} needs at least an element type and a name",
                kind
            )));
        }
        let rest = params.split_off(2);
        let (type_param, name_param) = (&params[0], &params[1]);

        let type_name = match type_param {
            Param::Text(text) => text.clone(),
            other => {
                return Err(BufferError::declaration(format!(
                    "{}: expected an element type, found {}",
                    kind, other
                )))
            }
        };
        let element_type = ElementType::parse(&type_name)?;

        let name = match name_param {
            Param::Text(text) if is_identifier(text) => text.clone(),
            other => {
                return Err(BufferError::declaration(format!(
                    "{}: '{}' is not a valid buffer name",
                    kind, other
                )))
            }
        };

        if rest.len() < kind.required_params() {
            return Err(BufferError::InvalidDeclaration {
                origin: Origin::default(),
                message: format!(
                    "{} '{}' expects {} arguments after the name, found {}",
                    kind,
                    name,
                    kind.required_params(),
                    rest.len()
                ),
                help: Some(usage(kind).to_string()),
            });
        }

        Ok(Declaration {
            kind,
            element_type,
            type_name,
            name,
            params: rest,
            namespace: self.namespace.clone(),
            path: self.path.clone(),
            span,
            live,
        })
    }

    fn directive(&mut self) -> Result<()> {
        let line = self.lines.line(self.pos);
        let (text, end) = directive_text(self.src, self.pos + 1);
        self.pos = end;

        let text = text.trim();
        let name_len = text.bytes().take_while(|&b| is_ident_byte(b)).count();
        let (name, rest) = text.split_at(name_len);
        let rest = rest.trim();

        match name {
            "if" | "ifdef" | "ifndef" => {
                let directive = match name {
                    "if" => "if",
                    "ifdef" => "ifdef",
                    _ => "ifndef",
                };
                let parent_live = self.live();
                let result = parent_live && self.test(name, rest, line)?;
                self.frames.push(ConditionalFrame {
                    live: result,
                    parent_live,
                    taken: result,
                    seen_else: false,
                    line,
                    directive,
                });
            }
            "elif" | "elifdef" | "elifndef" => {
                let frame = self.open_frame(name, line)?;
                let evaluate = frame.parent_live && !frame.taken;
                let result = evaluate && self.test(name, rest, line)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.live = result;
                    frame.taken |= result;
                }
            }
            "else" => {
                self.open_frame(name, line)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.live = frame.parent_live && !frame.taken;
                    frame.taken = true;
                    frame.seen_else = true;
                }
            }
            "endif" => {
                if self.frames.pop().is_none() {
                    return Err(BufferError::UnterminatedConditional {
                        origin: self.origin(line),
                        message: "#endif without a matching #if".to_string(),
                    });
                }
            }
            // #include, #define, #pragma and friends do not affect liveness
            _ => {}
        }
        Ok(())
    }

    fn open_frame(&self, directive: &str, line: u32) -> Result<&ConditionalFrame> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| BufferError::UnterminatedConditional {
                origin: self.origin(line),
                message: format!("#{} without a matching #if", directive),
            })?;
        if frame.seen_else {
            return Err(BufferError::UnterminatedConditional {
                origin: self.origin(line),
                message: format!("#{} after #else", directive),
            });
        }
        Ok(frame)
    }

    fn test(&self, directive: &str, rest: &str, line: u32) -> Result<bool> {
        let evaluator = ConditionEvaluator::new(self.env);
        match directive {
            "if" | "elif" => evaluator
                .eval_str(rest)
                .map_err(|err| err.located(&self.path, line)),
            _ => {
                let name = rest.split_whitespace().next().unwrap_or("");
                if !is_identifier(name) {
                    return Err(BufferError::Syntax {
                        origin: self.origin(line),
                        message: format!("#{} requires a macro name", directive),
                        help: None,
                    });
                }
                let defined = evaluator.is_defined(name);
                Ok(if directive.ends_with("ndef") {
                    !defined
                } else {
                    defined
                })
            }
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Declaration>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(declaration)) => Some(Ok(declaration)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// `BPImageBuffer` → `Image`
fn macro_suffix(word: &str) -> Option<&str> {
    let suffix = word.strip_prefix("BP")?.strip_suffix("Buffer")?;
    if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(suffix)
    } else {
        None
    }
}

fn is_identifier(text: &str) -> bool {
    let mut bytes = text.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(is_ident_byte)
}

fn usage(kind: DeclarationKind) -> &'static str {
    match kind {
        DeclarationKind::Data => "BPDataBuffer(type, Name, \"path\")",
        DeclarationKind::Compressed => "BPCompressedBuffer(type, Name, scheme, \"path\" | {values...})",
        DeclarationKind::Image => "BPImageBuffer(type, Name, format, \"path\")",
        DeclarationKind::FixedFont => {
            "BPFixedFontBuffer(type, Name, first, count, width, height, bits, rgb|a, \"path\")"
        }
        DeclarationKind::VariableFont => {
            "BPVariableFontBuffer(type, Name, first, count, height, bits, rgb|a, \"path\")"
        }
        DeclarationKind::Mpff => "BPMpffBuffer(type, Name, \"path\"[, pixel size])",
        DeclarationKind::Jtag => "BPJtagBuffer(type, Name, svf, scheme, \"path\")",
    }
}

/// Capture the text between `(` at `open` and its matching `)`.
///
/// Comments are replaced by a space. Returns the inner text and the offset
/// just past the closing parenthesis.
fn capture_call(src: &str, open: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let mut inner = String::new();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        let at_word_start = i == 0 || !is_ident_byte(bytes[i - 1]);
        if at_word_start && (b == b'"' || b == b'\'' || b.is_ascii_alphabetic()) {
            if let Some(end) = literal_end(src, i) {
                inner.push_str(&src[i..end]);
                i = end;
                continue;
            }
        }

        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = src[i..].find('\n').map_or(bytes.len(), |n| i + n);
                inner.push(' ');
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = src[i + 2..].find("*/").map(|n| i + 2 + n + 2)?;
                inner.push(' ');
                continue;
            }
            b'(' => {
                depth += 1;
                if depth == 1 {
                    i += 1;
                    continue;
                }
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((inner, i + 1));
                }
            }
            _ => {}
        }

        let ch = src[i..].chars().next()?;
        inner.push(ch);
        i += ch.len_utf8();
    }

    None
}

/// Text of a directive starting after `#`, with continuations joined and
/// comments removed. Returns the text and the offset of the terminating newline.
fn directive_text(src: &str, start: usize) -> (String, usize) {
    let bytes = src.as_bytes();
    let mut text = String::new();
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => break,
            b'\\' if bytes.get(i + 1) == Some(&b'\n') => {
                text.push(' ');
                i += 2;
            }
            b'\\' if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') => {
                text.push(' ');
                i += 3;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = src[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = src[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                text.push(' ');
            }
            b'"' | b'\'' => {
                let end = literal_end(src, i).unwrap_or(i + 1);
                text.push_str(&src[i..end]);
                i = end;
            }
            _ => {
                let Some(ch) = src[i..].chars().next() else {
                    break;
                };
                text.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    (text, i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(flags: &[&str]) -> MacroEnvironment {
        MacroEnvironment::from_flags(flags.iter().copied()).unwrap()
    }

    fn scan(src: &str, flags: &[&str]) -> Result<Vec<Declaration>> {
        let env = env(flags);
        Scanner::new(src, "test.cpp", &env).collect()
    }

    fn live_names(src: &str, flags: &[&str]) -> Vec<String> {
        scan(src, flags)
            .unwrap()
            .into_iter()
            .filter(|d| d.live)
            .map(|d| d.qualified_name())
            .collect()
    }

    #[test]
    fn test_ifdef_controls_liveness() {
        let src = "#ifdef FEATURE\nBPDataBuffer(uint8_t, Foo, \"foo.bin\");\n#endif\n";

        let with = scan(src, &["-DFEATURE"]).unwrap();
        assert_eq!(with.len(), 1);
        assert!(with[0].live);
        assert_eq!(with[0].params, vec![Param::Str("foo.bin".to_string())]);
        assert_eq!(with[0].line(), 2);

        let without = scan(src, &[]).unwrap();
        assert_eq!(without.len(), 1);
        assert!(!without[0].live);
    }

    #[test]
    fn test_else_chain() {
        let src = r#"
#if LEVEL == 1
BPDataBuffer(uint8_t, One, "1.bin");
#elif LEVEL == 2
BPDataBuffer(uint8_t, Two, "2.bin");
#elifdef OTHER
BPDataBuffer(uint8_t, Other, "o.bin");
#else
BPDataBuffer(uint8_t, Fallback, "f.bin");
#endif
"#;
        assert_eq!(live_names(src, &["LEVEL=1"]), vec!["One"]);
        assert_eq!(live_names(src, &["LEVEL=2", "-DOTHER"]), vec!["Two"]);
        assert_eq!(live_names(src, &["-DOTHER"]), vec!["Other"]);
        assert_eq!(live_names(src, &[]), vec!["Fallback"]);
    }

    #[test]
    fn test_nested_conditions() {
        let src = r#"
#ifdef A
#ifndef B
BPDataBuffer(uint8_t, OnlyA, "a.bin");
#endif
#endif
"#;
        assert_eq!(live_names(src, &["-DA"]), vec!["OnlyA"]);
        assert!(live_names(src, &["-DA", "-DB"]).is_empty());
        assert!(live_names(src, &["-DB"]).is_empty());
    }

    #[test]
    fn test_unreachable_conditions_are_not_evaluated() {
        let src = r#"
#if 0
#if A + B > 3
#endif
#endif
#if 1
#elif A ? B : C
#endif
"#;
        assert!(scan(src, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_condition_is_error_with_line() {
        let err = scan("\n\n#if A * 2\n#endif\n", &[]).unwrap_err();
        assert!(matches!(err, BufferError::Syntax { .. }));
        assert!(err.to_string().starts_with("test.cpp:3"), "{}", err);
    }

    #[test]
    fn test_define_in_source_is_ignored() {
        let src = "#define FEATURE\n#ifdef FEATURE\nBPDataBuffer(uint8_t, Foo, \"f\");\n#endif\n";
        assert!(live_names(src, &[]).is_empty());
    }

    #[test]
    fn test_directive_continuation_and_comments() {
        let src = "#if defined(A) && \\\n    defined(B) // both\nBPDataBuffer(uint8_t, Foo, \"f\");\n#endif /* done */\n";
        assert_eq!(live_names(src, &["-DA", "-DB"]), vec!["Foo"]);
        assert!(live_names(src, &["-DA"]).is_empty());
    }

    #[test]
    fn test_namespaces() {
        let src = r#"
namespace assets {
namespace ui::icons {
BPImageBuffer(uint16_t, Logo, bitmap_rgb565, "logo.png");
}
namespace alias = ui::icons;
inline namespace v1 {
BPDataBuffer(uint8_t, Blob, "blob.bin");
}
namespace {
BPDataBuffer(uint8_t, Hidden, "h.bin");
}
}
BPDataBuffer(uint8_t, Global, "g.bin");
"#;
        assert_eq!(
            live_names(src, &[]),
            vec![
                "assets::ui::icons::Logo",
                "assets::v1::Blob",
                "assets::Hidden",
                "Global"
            ]
        );
    }

    #[test]
    fn test_conditional_namespace_only_tracked_when_live() {
        let src = r#"
#ifdef A
namespace a {
#else
namespace b {
#endif
BPDataBuffer(uint8_t, Foo, "f");
}
"#;
        assert_eq!(live_names(src, &["-DA"]), vec!["a::Foo"]);
        assert_eq!(live_names(src, &[]), vec!["b::Foo"]);
    }

    #[test]
    fn test_multiline_call_with_comments() {
        let src = r#"
BPCompressedBuffer(
    uint8_t,            // element
    Table,              /* name */
    lzss_auto,
    {1, 2, 3, 4}
);
"#;
        let decls = scan(src, &[]).unwrap();
        assert_eq!(decls.len(), 1);
        let decl = &decls[0];
        assert_eq!(decl.kind, DeclarationKind::Compressed);
        assert_eq!(decl.span.start.line, 2);
        assert_eq!(decl.span.end.line, 7);
        assert!(decl.params[1].is_list());
    }

    #[test]
    fn test_comments_and_strings_are_not_scanned() {
        let src = r#"
// BPDataBuffer(uint8_t, A, "a");
/* BPDataBuffer(uint8_t, B, "b"); */
const char* s = "BPDataBuffer(uint8_t, C, \"c\");";
"#;
        assert!(scan(src, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_live_declaration() {
        let src = "BPDataBuffer(uint8_t, Foo, \"a\");\nBPImageBuffer(uint8_t, Foo, bitmap, \"b\");\n";
        let err = scan(src, &[]).unwrap_err();
        match err {
            BufferError::DuplicateDeclaration {
                origin, first_line, ..
            } => {
                assert_eq!(origin.line, Some(2));
                assert_eq!(first_line, 1);
            }
            other => panic!("Expected DuplicateDeclaration, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_name_in_exclusive_branches_is_allowed() {
        let src = r#"
#ifdef BIG
BPDataBuffer(uint8_t, Font, "big.bin");
#else
BPDataBuffer(uint8_t, Font, "small.bin");
#endif
"#;
        let decls = scan(src, &["-DBIG"]).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls.iter().filter(|d| d.live).count(), 1);
    }

    #[test]
    fn test_same_name_in_different_namespaces() {
        let src = "namespace a { BPDataBuffer(uint8_t, Foo, \"a\"); }\nnamespace b { BPDataBuffer(uint8_t, Foo, \"b\"); }\n";
        assert_eq!(live_names(src, &[]), vec!["a::Foo", "b::Foo"]);
    }

    #[test]
    fn test_unterminated_conditional() {
        let err = scan("#ifdef A\n#if 1\n#endif\n", &[]).unwrap_err();
        match err {
            BufferError::UnterminatedConditional { origin, message } => {
                assert_eq!(origin.line, Some(1));
                assert!(message.contains("#ifdef"));
            }
            other => panic!("Expected UnterminatedConditional, got {:?}", other),
        }
    }

    #[test]
    fn test_stray_directives() {
        for src in ["#endif\n", "#else\n", "#elif 1\n", "#if 1\n#else\n#else\n#endif\n"] {
            let err = scan(src, &[]).unwrap_err();
            assert!(
                matches!(err, BufferError::UnterminatedConditional { .. }),
                "{:?} for {:?}",
                err,
                src
            );
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = scan("BPSoundBuffer(uint8_t, Beep, \"beep.wav\");\n", &[]).unwrap_err();
        assert!(matches!(err, BufferError::InvalidDeclaration { .. }));

        let dead = "#if 0\nBPSoundBuffer(uint8_t, Beep, \"beep.wav\");\n#endif\n";
        assert!(scan(dead, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_inactive_declaration_is_skipped() {
        let src = "#ifdef NOPE\nBPDataBuffer(Widget, 3);\n#endif\nBPDataBuffer(uint8_t, Ok, \"ok\");\n";
        assert_eq!(live_names(src, &[]), vec!["Ok"]);
    }

    #[test]
    fn test_missing_arguments() {
        let err = scan("BPImageBuffer(uint8_t, Logo);\n", &[]).unwrap_err();
        assert!(err.to_string().contains("expects 2 arguments"), "{}", err);
    }

    #[test]
    fn test_macro_definition_and_mentions_are_not_declarations() {
        let src = "#define BPDataBuffer(t, n, p) extern const t n##_Data[]\nauto x = &BPDataBuffer;\n";
        assert!(scan(src, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_digit_separator_does_not_open_char_literal() {
        let src = "int big = 1'000'000;\nBPDataBuffer(uint8_t, Foo, \"f\");\n";
        assert_eq!(live_names(src, &[]), vec!["Foo"]);
    }

    #[test]
    fn test_stops_after_error() {
        let env = env(&[]);
        let src = "#endif\nBPDataBuffer(uint8_t, Foo, \"f\");\n";
        let mut scanner = Scanner::new(src, "test.cpp", &env);
        assert!(scanner.next().unwrap().is_err());
        assert!(scanner.next().is_none());
    }
}
