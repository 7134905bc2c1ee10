//! Core value types, error taxonomy and configuration for the VM.
//!
//! This crate provides the foundational types shared by every other
//! component: the tagged [`Value`] representation, object handles, the
//! error types each layer reports, and the runtime configuration surface.
//!
//! # Overview
//!
//! - [`Value`] - Immediate or heap-referencing VM value
//! - [`ObjId`] - Generation-checked handle to a heap object
//! - [`VmError`] - Top-level error returned by the VM
//! - [`RuntimeError`] - Language-level error observed by running programs
//! - [`VmConfig`] - Capacity limits and collector tuning
//! - [`StackFrame`] - Call stack frame information for error traces
//!
//! # Examples
//!
//! ```
//! use core_types::{RuntimeError, RuntimeErrorKind, Value};
//!
//! let num = Value::Num(42.0);
//! assert!(num.is_truthy());
//! assert_eq!(num.type_name(), "num");
//!
//! let error = RuntimeError::new(
//!     RuntimeErrorKind::DoesNotUnderstand,
//!     "Num does not implement 'frob'",
//! );
//! assert!(error.stack.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod error;
mod trace;
mod value;

pub use config::{ConfigError, VmConfig};
pub use error::{
    BytecodeError, GcError, OverflowKind, RuntimeError, RuntimeErrorKind, SymbolError, VmError,
    VmResult,
};
pub use trace::StackFrame;
pub use value::{ObjId, Value};
