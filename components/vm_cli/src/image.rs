//! Compiled program images
//!
//! A serialized chunk refers to methods and globals by symbol index, so it is
//! only meaningful together with the symbol tables it was assembled against.
//! An image stores both: the tables as name lists and the chunk in its binary
//! form. Installing an image interns the names in order on a fresh VM and
//! checks that every name lands on its recorded index.

use bytecode_system::{BytecodeChunk, SymbolResolver};
use interpreter::Vm;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Image layout version written by this build
pub const IMAGE_VERSION: u32 = 1;

/// A chunk together with the symbol tables its operands index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Layout version
    pub version: u32,
    /// Method symbol names, by index
    pub method_symbols: Vec<String>,
    /// Global symbol names, by index
    pub global_symbols: Vec<String>,
    /// The top-level chunk, serialized
    pub chunk: Vec<u8>,
}

impl Image {
    /// Snapshot `vm`'s symbol tables alongside `chunk`
    pub fn capture(vm: &Vm, chunk: &BytecodeChunk) -> Self {
        Self {
            version: IMAGE_VERSION,
            method_symbols: vm.method_symbols().iter().map(str::to_string).collect(),
            global_symbols: vm.global_symbols().iter().map(str::to_string).collect(),
            chunk: chunk.to_bytes(),
        }
    }

    /// Whether `text` looks like an image rather than assembly source
    pub fn is_image(text: &str) -> bool {
        text.trim_start().starts_with('{')
    }

    /// Serialize as JSON
    pub fn to_json(&self) -> CliResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an image from JSON
    pub fn from_json(text: &str) -> CliResult<Self> {
        let image: Image = serde_json::from_str(text)?;
        if image.version != IMAGE_VERSION {
            return Err(CliError::ImageVersion(image.version));
        }
        Ok(image)
    }

    /// Intern the image's symbols into `vm` and decode its chunk
    pub fn install(&self, vm: &mut Vm) -> CliResult<BytecodeChunk> {
        for (expected, name) in self.method_symbols.iter().enumerate() {
            let found = usize::from(vm.method_symbol(name)?);
            check_slot(name, expected, found)?;
        }
        for (expected, name) in self.global_symbols.iter().enumerate() {
            let found = usize::from(vm.global_symbol(name)?);
            check_slot(name, expected, found)?;
        }
        log::debug!(
            "installed image: {} method symbols, {} globals",
            self.method_symbols.len(),
            self.global_symbols.len()
        );
        Ok(BytecodeChunk::from_bytes(&self.chunk)?)
    }
}

fn check_slot(name: &str, expected: usize, found: usize) -> CliResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(CliError::SymbolMismatch {
            name: name.to_string(),
            expected,
            found,
        })
    }
}
