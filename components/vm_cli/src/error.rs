//! Error types for the CLI

use std::fmt::Write as _;

use bytecode_system::{AssembleError, ChunkFormatError};
use core_types::{ConfigError, SymbolError, VmError};
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// File I/O error
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// The source did not assemble
    #[error("assembly error: {0}")]
    Assemble(#[from] AssembleError),

    /// The VM stopped with an error
    #[error(transparent)]
    Vm(#[from] VmError),

    /// The configuration file or flags are unusable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A compiled image could not be parsed
    #[error("invalid image: {0}")]
    Image(#[from] serde_json::Error),

    /// The image was written by an incompatible build
    #[error("unsupported image version {0}")]
    ImageVersion(u32),

    /// The chunk inside an image is malformed
    #[error("invalid chunk: {0}")]
    Chunk(#[from] ChunkFormatError),

    /// Interning a name failed
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    /// An image symbol landed at a different index than when it was compiled
    #[error("image symbol '{name}' resolved to {found}, expected {expected}")]
    SymbolMismatch {
        /// The symbol name
        name: String,
        /// Index recorded in the image
        expected: usize,
        /// Index assigned by this VM
        found: usize,
    },
}

impl CliError {
    /// Message for the terminal, with the stack trace of runtime errors
    pub fn report(&self) -> String {
        let mut out = match self {
            CliError::Vm(VmError::Runtime(error)) => format!("Runtime error: {}", error),
            CliError::Vm(error) if error.is_fatal() => format!("Fatal error: {}", error),
            other => format!("Error: {}", other),
        };
        if let CliError::Vm(VmError::Runtime(error)) = self {
            for frame in &error.stack {
                let _ = write!(out, "\n    {}", frame);
            }
        }
        out
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
