use std::path::PathBuf;

use thiserror::Error;

use crate::bytecode::compile_error::{CompileDiagnostic, CompileError};
use crate::frontend::lexer::LexerError;
use crate::frontend::parser_error::ParserError;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ConfigParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot error: {0}")]
    Snapshot(#[from] postcard::Error),
}

impl Error {
    /// The runtime failure class, when this is a runtime error.
    pub fn runtime_kind(&self) -> Option<&RuntimeErrorKind> {
        match self {
            Error::Runtime(e) => Some(&e.kind),
            _ => None,
        }
    }
}

/// Bad config source: the load that produced it left the machine unchanged.
#[derive(Debug, Clone, Error)]
#[error("{file}:{line}:{col}: {kind}")]
pub struct ConfigParseError {
    pub file: String,
    pub line: usize,
    pub col: usize,
    pub kind: ConfigParseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum ConfigParseErrorKind {
    #[error("lex error: {0}")]
    Lex(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0}")]
    Compile(CompileError),
}

impl ConfigParseError {
    pub fn lex(file: &str, error: LexerError) -> Self {
        Self {
            file: file.to_string(),
            line: error.line,
            col: error.col,
            kind: ConfigParseErrorKind::Lex(error.message),
        }
    }

    pub fn syntax(file: &str, error: ParserError) -> Self {
        Self {
            file: file.to_string(),
            line: error.line,
            col: error.col,
            kind: ConfigParseErrorKind::Syntax(error.message),
        }
    }

    pub fn compile(file: &str, diagnostic: CompileDiagnostic) -> Self {
        Self {
            file: file.to_string(),
            line: diagnostic.span.line,
            col: diagnostic.span.col,
            kind: ConfigParseErrorKind::Compile(diagnostic.error),
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}
