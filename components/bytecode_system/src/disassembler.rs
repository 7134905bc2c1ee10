//! Disassembler
//!
//! Renders a chunk in the assembler's text format. Branch targets get
//! generated labels and every instruction carries its byte offset as a
//! comment. With a symbol name resolver the output assembles back to the
//! same code.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use core_types::BytecodeError;

use crate::chunk::BytecodeChunk;
use crate::constant::Constant;
use crate::instruction::Instruction;

/// Which table a symbol operand indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Method symbol table
    Method,
    /// Global symbol table
    Global,
}

/// Disassembly options
#[derive(Default)]
pub struct DisasmOptions<'a> {
    /// Maps a symbol index back to its name
    pub symbol_resolver: Option<&'a dyn Fn(SymbolKind, u16) -> Option<String>>,
}

/// Disassemble `chunk` and its nested functions with numeric symbols
pub fn disassemble(chunk: &BytecodeChunk) -> Result<String, BytecodeError> {
    disassemble_with_options(chunk, &DisasmOptions::default())
}

/// Disassemble `chunk` and its nested functions
pub fn disassemble_with_options(
    chunk: &BytecodeChunk,
    options: &DisasmOptions<'_>,
) -> Result<String, BytecodeError> {
    let mut out = String::new();
    let mut pending = vec![chunk];
    let mut seen = 0usize;
    while let Some(function) = pending.pop() {
        if seen > 0 {
            out.push('\n');
        }
        seen += 1;
        disassemble_function(function, options, &mut out)?;
        // Push in reverse so nested functions print in pool order.
        for constant in function.constants.iter().rev() {
            if let Constant::Fn(nested) = constant {
                pending.push(nested);
            }
        }
    }
    Ok(out)
}

fn label(offset: usize) -> String {
    format!("L{:04}", offset)
}

fn symbol_name(options: &DisasmOptions<'_>, kind: SymbolKind, symbol: u16) -> String {
    options
        .symbol_resolver
        .and_then(|resolve| resolve(kind, symbol))
        .unwrap_or_else(|| format!("#{}", symbol))
}

fn constant_at(chunk: &BytecodeChunk, index: u16) -> Result<&Constant, BytecodeError> {
    chunk
        .constants
        .get(usize::from(index))
        .ok_or(BytecodeError::ConstantOutOfRange {
            index: usize::from(index),
            len: chunk.constants.len(),
        })
}

fn disassemble_function(
    chunk: &BytecodeChunk,
    options: &DisasmOptions<'_>,
    out: &mut String,
) -> Result<(), BytecodeError> {
    let mut decoded = Vec::new();
    let mut targets = BTreeSet::new();
    for item in chunk.instructions() {
        let (offset, instruction) = item?;
        if let Some(target) = instruction.branch_target(offset) {
            let target =
                usize::try_from(target).map_err(|_| BytecodeError::JumpOutOfRange { offset })?;
            targets.insert(target);
        }
        decoded.push((offset, instruction));
    }

    let _ = writeln!(out, ".fn {} {}", chunk.name, chunk.arity);
    for (offset, instruction) in decoded {
        if targets.contains(&offset) {
            let _ = writeln!(out, "{}:", label(offset));
        }

        let code = instruction.code();
        let operands = match instruction {
            Instruction::Constant(index) => constant_at(chunk, index)?.to_string(),
            Instruction::Class { num_fields } | Instruction::Subclass { num_fields } => {
                num_fields.to_string()
            }
            Instruction::Method {
                symbol, constant, ..
            } => format!(
                "{} {}",
                symbol_name(options, SymbolKind::Method, symbol),
                constant_at(chunk, constant)?
            ),
            Instruction::List(n)
            | Instruction::LoadLocal(n)
            | Instruction::StoreLocal(n)
            | Instruction::LoadField(n)
            | Instruction::StoreField(n) => n.to_string(),
            Instruction::LoadGlobal(slot) | Instruction::StoreGlobal(slot) => {
                symbol_name(options, SymbolKind::Global, slot)
            }
            Instruction::Call { symbol, .. } => symbol_name(options, SymbolKind::Method, symbol),
            Instruction::Jump(_)
            | Instruction::Loop(_)
            | Instruction::JumpIf(_)
            | Instruction::And(_)
            | Instruction::Or(_) => match instruction.branch_target(offset) {
                Some(target) => label(target as usize),
                None => String::new(),
            },
            Instruction::Null
            | Instruction::False
            | Instruction::True
            | Instruction::Dup
            | Instruction::Pop
            | Instruction::Is
            | Instruction::End => String::new(),
        };

        let text = if operands.is_empty() {
            code.mnemonic().to_string()
        } else {
            format!("{} {}", code.mnemonic(), operands)
        };
        let _ = writeln!(out, "    {:<32} ; {:04}", text, offset);
    }
    let _ = writeln!(out, ".end");
    Ok(())
}
