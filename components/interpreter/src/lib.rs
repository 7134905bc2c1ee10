//! Bytecode interpreter for the VM
//!
//! This crate provides the execution core:
//! - Method and global symbol tables with dense, stable indices
//! - A single fiber with bounded value and call-frame stacks
//! - The interpreter loop over the stack instruction set
//! - The core classes and their primitive methods
//!
//! # Example
//!
//! ```
//! use bytecode_system::assemble;
//! use core_types::{Value, VmConfig};
//! use interpreter::Vm;
//!
//! let mut vm = Vm::new(VmConfig::default()).unwrap();
//! let chunk = assemble(
//!     ".fn main 0\n CONSTANT 3\n CONSTANT 4\n CALL_1 +\n END\n.end\n",
//!     &mut vm,
//! )
//! .unwrap();
//!
//! assert_eq!(vm.run(&chunk).unwrap(), Value::Num(7.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod core_lib;
pub mod dispatch;
pub mod fiber;
pub mod symbol_table;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::CallFrame;
pub use core_lib::{Args, CoreClasses, Primitive, PrimitiveOutcome};
pub use fiber::Fiber;
pub use symbol_table::SymbolTable;
pub use vm::Vm;
