//! Command-line runner for the VM
//!
//! Provides the Runtime struct and supporting modules for the `corten-vm`
//! binary: argument parsing, compiled images, and error reporting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod image;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use image::Image;
pub use runtime::Runtime;
