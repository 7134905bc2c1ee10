//! Integration test suite for the Corten VM
//!
//! This crate holds tests that verify components work together across
//! component boundaries: assembled bytecode through the interpreter, the
//! interpreter against the collector, and whole programs through the CLI
//! runtime.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use memory_manager;
    pub use vm_cli;
}
