use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Where in the input an error was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub path: Option<PathBuf>,
    pub line: Option<u32>,
}

impl Origin {
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            path: Some(path.into()),
            line: Some(line),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            line: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.path.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, "{}:{}", path.display(), line),
            (Some(path), None) => write!(f, "{}", path.display()),
            (None, Some(line)) => write!(f, "line {}", line),
            (None, None) => write!(f, "<input>"),
        }
    }
}

/// Main error type for bufproc operations
#[derive(Error, Diagnostic, Debug)]
pub enum BufferError {
    #[error("IO error: {0}")]
    #[diagnostic(code(bufproc::io))]
    IoError(#[from] std::io::Error),

    #[error("IO error with {path}: {message}")]
    #[diagnostic(code(bufproc::io))]
    Io { path: PathBuf, message: String },

    #[error("{origin}: unsupported conditional expression: {message}")]
    #[diagnostic(code(bufproc::syntax))]
    Syntax {
        origin: Origin,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{origin}: {message}")]
    #[diagnostic(
        code(bufproc::unterminated_conditional),
        help("every #if/#ifdef/#ifndef needs a matching #endif")
    )]
    UnterminatedConditional { origin: Origin, message: String },

    #[error("{origin}: buffer '{name}' is already declared at line {first_line}")]
    #[diagnostic(
        code(bufproc::duplicate_declaration),
        help("buffer names must be unique within a namespace for the active defines")
    )]
    DuplicateDeclaration {
        origin: Origin,
        name: String,
        first_line: u32,
    },

    #[error("{origin}: invalid buffer declaration: {message}")]
    #[diagnostic(code(bufproc::declaration))]
    InvalidDeclaration {
        origin: Origin,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{origin}: data file '{path}' not found")]
    #[diagnostic(code(bufproc::file_not_found))]
    FileNotFound {
        origin: Origin,
        path: String,
        #[help]
        help: Option<String>,
    },

    #[error("{origin}: failed to produce buffer '{name}': {message}")]
    #[diagnostic(code(bufproc::producer))]
    Producer {
        origin: Origin,
        name: String,
        message: String,
    },

    #[error("compressed buffer '{name}' does not decode to its source: {message}")]
    #[diagnostic(code(bufproc::codec_verification))]
    CodecVerification {
        name: String,
        message: String,
        #[help]
        parameters: Option<String>,
    },

    #[error("codec error: {message}")]
    #[diagnostic(code(bufproc::codec))]
    Codec {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(bufproc::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl BufferError {
    /// Fill in the origin of errors raised without file context.
    ///
    /// Errors that already know where they happened keep their origin.
    pub fn located(mut self, path: &Path, line: u32) -> Self {
        let slot = match &mut self {
            BufferError::Syntax { origin, .. }
            | BufferError::UnterminatedConditional { origin, .. }
            | BufferError::DuplicateDeclaration { origin, .. }
            | BufferError::InvalidDeclaration { origin, .. }
            | BufferError::FileNotFound { origin, .. }
            | BufferError::Producer { origin, .. } => Some(origin),
            _ => None,
        };
        if let Some(origin) = slot {
            if origin.is_unknown() {
                *origin = Origin::new(path, line);
            }
        }
        self
    }

    /// Shorthand for a declaration error without a location yet.
    pub fn declaration(message: impl Into<String>) -> Self {
        BufferError::InvalidDeclaration {
            origin: Origin::default(),
            message: message.into(),
            help: None,
        }
    }

    /// Shorthand for a producer failure without a location yet.
    pub fn producer(name: impl Into<String>, message: impl Into<String>) -> Self {
        BufferError::Producer {
            origin: Origin::default(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        BufferError::Codec {
            message: message.into(),
            help: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BufferError>;
