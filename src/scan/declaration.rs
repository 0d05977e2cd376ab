//! Parsed buffer declarations.

use std::fmt;
use std::path::PathBuf;

use crate::error::{BufferError, Result};

use super::span::Span;

/// The kind of buffer a declaration asks for.
///
/// Written in source as `BP<Kind>Buffer(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclarationKind {
    Data,
    Compressed,
    Image,
    FixedFont,
    VariableFont,
    Mpff,
    Jtag,
}

impl DeclarationKind {
    pub const ALL: [DeclarationKind; 7] = [
        DeclarationKind::Data,
        DeclarationKind::Compressed,
        DeclarationKind::Image,
        DeclarationKind::FixedFont,
        DeclarationKind::VariableFont,
        DeclarationKind::Mpff,
        DeclarationKind::Jtag,
    ];

    /// The `<Kind>` part of the macro name, also used as the emitted symbol suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            DeclarationKind::Data => "Data",
            DeclarationKind::Compressed => "Compressed",
            DeclarationKind::Image => "Image",
            DeclarationKind::FixedFont => "FixedFont",
            DeclarationKind::VariableFont => "VariableFont",
            DeclarationKind::Mpff => "Mpff",
            DeclarationKind::Jtag => "Jtag",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }

    /// Number of arguments after element type and name.
    pub fn required_params(&self) -> usize {
        match self {
            DeclarationKind::Data => 1,
            DeclarationKind::Compressed => 2,
            DeclarationKind::Image => 2,
            DeclarationKind::FixedFont => 7,
            DeclarationKind::VariableFont => 6,
            DeclarationKind::Mpff => 1,
            DeclarationKind::Jtag => 3,
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BP{}Buffer", self.suffix())
    }
}

/// Element type of the emitted array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Double,
    Bool,
    Char,
}

impl ElementType {
    /// Parse a C/C++ type name such as `uint16_t` or `std::int8_t`.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let bare = normalized.strip_prefix("std::").unwrap_or(&normalized);

        let ty = match bare {
            "uint8_t" | "unsigned char" | "byte" => ElementType::U8,
            "uint16_t" | "unsigned short" => ElementType::U16,
            "uint32_t" | "unsigned int" | "unsigned" => ElementType::U32,
            "uint64_t" | "unsigned long long" => ElementType::U64,
            "int8_t" | "signed char" => ElementType::I8,
            "int16_t" | "short" => ElementType::I16,
            "int32_t" | "int" => ElementType::I32,
            "int64_t" | "long long" => ElementType::I64,
            "float" => ElementType::Float,
            "double" => ElementType::Double,
            "bool" => ElementType::Bool,
            "char" => ElementType::Char,
            _ => {
                return Err(BufferError::InvalidDeclaration {
                    origin: Default::default(),
                    message: format!("unsupported element type '{}'", name.trim()),
                    help: Some(
                        "Use a fixed-width integer type (uint8_t ... int64_t), float, double, bool or char"
                            .to_string(),
                    ),
                })
            }
        };
        Ok(ty)
    }

    /// Size of one element in bytes.
    pub fn width(&self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 | ElementType::Bool | ElementType::Char => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::Float => 4,
            ElementType::U64 | ElementType::I64 | ElementType::Double => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ElementType::I8 | ElementType::I16 | ElementType::I32 | ElementType::I64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::Float | ElementType::Double)
    }
}

/// One macro argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// Bare tokens: `uint8_t`, `lzss_auto`, `0x10`
    Text(String),
    /// A string literal with escapes resolved.
    Str(String),
    /// A brace-enclosed list: `{1, 2, 3}`
    List(Vec<Param>),
}

impl Param {
    /// The argument as plain text; string literals yield their contents.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Param::Text(text) | Param::Str(text) => Some(text),
            Param::List(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Param::List(_))
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Text(text) => write!(f, "{}", text),
            Param::Str(text) => write!(f, "{:?}", text),
            Param::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A buffer declaration found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub element_type: ElementType,
    /// The element type as written, reused verbatim in the emitted header.
    pub type_name: String,
    pub name: String,
    /// Arguments after element type and name.
    pub params: Vec<Param>,
    /// Enclosing namespaces, outermost first.
    pub namespace: Vec<String>,
    pub path: PathBuf,
    pub span: Span,
    pub live: bool,
}

impl Declaration {
    /// Emitted array symbol, e.g. `Logo_Image`.
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.name, self.kind.suffix())
    }

    /// Emitted element-count symbol, e.g. `Logo_ImageSize`.
    pub fn size_symbol(&self) -> String {
        format!("{}Size", self.symbol())
    }

    /// `a::b::Logo`
    pub fn qualified_name(&self) -> String {
        let mut parts = self.namespace.clone();
        parts.push(self.name.clone());
        parts.join("::")
    }

    pub fn line(&self) -> u32 {
        self.span.start.line
    }

    /// Parameter `index` as text, or an InvalidDeclaration error naming `what`.
    pub fn text_param(&self, index: usize, what: &str) -> Result<&str> {
        self.params
            .get(index)
            .and_then(Param::as_text)
            .ok_or_else(|| {
                BufferError::declaration(format!(
                    "{} '{}' expects {} as argument {}",
                    self.kind,
                    self.name,
                    what,
                    index + 3
                ))
            })
    }

    /// Parameter `index` parsed as an unsigned integer.
    pub fn uint_param(&self, index: usize, what: &str) -> Result<u32> {
        let text = self.text_param(index, what)?;
        crate::condition::parse_integer(text)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                BufferError::declaration(format!(
                    "{} '{}': {} must be a non-negative integer, got '{}'",
                    self.kind, self.name, what, text
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_suffix_roundtrip() {
        for kind in DeclarationKind::ALL {
            assert_eq!(DeclarationKind::from_suffix(kind.suffix()), Some(kind));
        }
        assert_eq!(DeclarationKind::from_suffix("Bogus"), None);
        assert_eq!(DeclarationKind::FixedFont.to_string(), "BPFixedFontBuffer");
    }

    #[test]
    fn test_element_type_parse() {
        assert_eq!(ElementType::parse("uint8_t").unwrap(), ElementType::U8);
        assert_eq!(ElementType::parse("std::uint16_t").unwrap(), ElementType::U16);
        assert_eq!(ElementType::parse("unsigned   char").unwrap(), ElementType::U8);
        assert_eq!(ElementType::parse("int64_t").unwrap(), ElementType::I64);
        assert_eq!(ElementType::parse("double").unwrap(), ElementType::Double);
        assert!(ElementType::parse("Widget").is_err());
    }

    #[test]
    fn test_element_type_properties() {
        assert_eq!(ElementType::U32.width(), 4);
        assert_eq!(ElementType::Double.width(), 8);
        assert!(ElementType::I16.is_signed());
        assert!(!ElementType::Char.is_signed());
        assert!(ElementType::Float.is_float());
    }

    #[test]
    fn test_param_display() {
        let param = Param::List(vec![
            Param::Text("1".to_string()),
            Param::Str("a".to_string()),
        ]);
        assert_eq!(param.to_string(), "{1, \"a\"}");
    }
}
