//! Error types for memlower

use std::path::PathBuf;
use thiserror::Error;

/// memlower errors
///
/// These cover failures of the environment around the pass (reading a
/// compilation unit, launching the assembler, bad configuration). Problems
/// found in the program being rewritten are reported as
/// [`Diagnostic`](crate::compiler::Diagnostic)s instead and never abort the pass.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on a file the pass reads or writes
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON input or unserializable output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid compile options
    ///
    /// **Triggered by:** a `-D` flag without `=`, a bad glob in the struct path map
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external assembler could not be run
    #[error("Assembler error: {message}")]
    Assembler {
        /// Error description
        message: String,
    },

    /// Compilation unit references ids that the type table does not define
    #[error("Invalid compilation unit: {0}")]
    InvalidUnit(String),

    /// Compiler error
    #[error("Compiler error: {0}")]
    CompilerError(String),
}

impl Error {
    /// Create a compiler error with a message
    pub fn compiler(msg: impl Into<String>) -> Self {
        Error::CompilerError(msg.into())
    }

    /// Create a configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for memlower operations
pub type Result<T> = std::result::Result<T, Error>;
