//! Bytecode system for the VM
//!
//! This crate defines the instruction set the interpreter executes and the
//! tools that produce and inspect it.
//!
//! # Features
//!
//! - Byte-oriented stack instruction set with fixed per-opcode operand widths
//! - Compiled function chunks with constant pools and nested functions
//! - Binary serialization of chunks
//! - A text assembler and a disassembler that round-trip through each other
//!
//! # Example
//!
//! ```
//! use bytecode_system::{BytecodeChunk, Instruction};
//!
//! let mut chunk = BytecodeChunk::new("main", 0);
//!
//! // Add constants
//! let three = chunk.add_constant(3.0).unwrap();
//! let four = chunk.add_constant(4.0).unwrap();
//!
//! // Emit instructions; symbol 0 stands for the `+` method
//! chunk.emit(Instruction::Constant(three));
//! chunk.emit(Instruction::Constant(four));
//! chunk.emit(Instruction::call(1, 0).unwrap());
//! chunk.emit(Instruction::End);
//!
//! assert!(chunk.validate().is_ok());
//! assert_eq!(chunk.instruction_count(), Ok(4));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod chunk;
pub mod constant;
pub mod disassembler;
pub mod instruction;
pub mod opcode;

// Re-export main types at crate root
pub use assembler::{assemble, AssembleError, SymbolResolver, ENTRY_POINT};
pub use chunk::{BytecodeChunk, ChunkFormatError, MAX_CONSTANTS};
pub use constant::Constant;
pub use disassembler::{disassemble, disassemble_with_options, DisasmOptions, SymbolKind};
pub use instruction::{CallArity, Instruction, Instructions, MethodKind};
pub use opcode::{Code, OperandWidth, MAX_CALL_ARITY};
