//! Bytecode chunk - a compiled function
//!
//! Contains the encoded instruction stream, the constant pool and the
//! function's declared arity. Chunks are what the front-end hands to the VM;
//! nested functions live in the constant pool as [`Constant::Fn`].

use core_types::BytecodeError;
use thiserror::Error;

use crate::constant::Constant;
use crate::instruction::{Instruction, Instructions};

/// Largest constant pool a `CONSTANT` operand can address
pub const MAX_CONSTANTS: usize = u16::MAX as usize + 1;

const MAGIC: &[u8; 4] = b"BCNK";
const FORMAT_VERSION: u8 = 2;
const MAX_NESTING: usize = 64;

/// Failures reading a serialized chunk
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkFormatError {
    /// The input does not start with the chunk magic number
    #[error("invalid magic number")]
    BadMagic,
    /// The format version is not one this build reads
    #[error("unsupported chunk format version {0}")]
    UnsupportedVersion(u8),
    /// The input ended in the middle of a field
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),
    /// A name or string constant is not UTF-8
    #[error("invalid UTF-8 in string at byte {0}")]
    InvalidUtf8(usize),
    /// A constant has an unrecognized tag
    #[error("unknown constant tag {tag} at byte {offset}")]
    UnknownConstantTag {
        /// The tag byte
        tag: u8,
        /// Where it was read
        offset: usize,
    },
    /// Functions are nested deeper than the reader accepts
    #[error("functions nested more than {0} deep")]
    TooDeep(usize),
    /// Bytes remain after the top-level chunk
    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),
}

/// A compiled function
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeChunk {
    /// Function name, used in stack traces and disassembly
    pub name: String,
    /// Number of declared parameters, excluding the receiver
    pub arity: u8,
    /// Encoded instruction stream
    pub code: Vec<u8>,
    /// Constant pool
    pub constants: Vec<Constant>,
}

impl BytecodeChunk {
    /// Create an empty function
    pub fn new(name: impl Into<String>, arity: u8) -> Self {
        Self {
            name: name.into(),
            arity,
            code: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Append an instruction and return its offset
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let offset = self.code.len();
        instruction.encode(&mut self.code);
        offset
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, constant: impl Into<Constant>) -> Result<u16, BytecodeError> {
        let index = self.constants.len();
        if index >= MAX_CONSTANTS {
            return Err(BytecodeError::TooManyConstants {
                limit: MAX_CONSTANTS,
            });
        }
        self.constants.push(constant.into());
        Ok(index as u16)
    }

    /// Emit a forward branch with a placeholder distance.
    ///
    /// `jump` is one of `Instruction::Jump`, `JumpIf`, `And` or `Or`.
    /// Returns the operand offset to hand to [`patch_jump`](Self::patch_jump).
    pub fn emit_jump(&mut self, jump: fn(u16) -> Instruction) -> usize {
        self.emit(jump(u16::MAX)) + 1
    }

    /// Point a branch emitted by [`emit_jump`](Self::emit_jump) at the
    /// current end of the code.
    pub fn patch_jump(&mut self, operand: usize) -> Result<(), BytecodeError> {
        if operand + 2 > self.code.len() {
            return Err(BytecodeError::JumpOutOfRange { offset: operand });
        }
        let distance = self.code.len() - (operand + 2);
        let encoded = u16::try_from(distance).map_err(|_| BytecodeError::JumpTooFar {
            offset: operand,
            distance,
        })?;
        self.code[operand..operand + 2].copy_from_slice(&encoded.to_be_bytes());
        Ok(())
    }

    /// Emit a `LOOP` back to `loop_start` and return its offset
    pub fn emit_loop(&mut self, loop_start: usize) -> Result<usize, BytecodeError> {
        let offset = self.code.len();
        let after = offset + Instruction::Loop(0).encoded_len();
        let distance = after
            .checked_sub(loop_start)
            .ok_or(BytecodeError::JumpOutOfRange { offset })?;
        let encoded = u16::try_from(distance)
            .map_err(|_| BytecodeError::JumpTooFar { offset, distance })?;
        Ok(self.emit(Instruction::Loop(encoded)))
    }

    /// Iterate the decoded instructions with their offsets
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.code)
    }

    /// Get the number of instructions, or the first decode error
    pub fn instruction_count(&self) -> Result<usize, BytecodeError> {
        self.instructions().try_fold(0, |n, item| item.map(|_| n + 1))
    }

    /// Get the number of constants
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Clear all instructions and constants
    pub fn clear(&mut self) {
        self.code.clear();
        self.constants.clear();
    }

    /// Check the function and every nested function for malformed code.
    ///
    /// Verifies that every instruction decodes, constant operands are in
    /// range, method bodies are functions, branch targets land on
    /// instruction boundaries inside the function, and the code is not
    /// empty. Stack depth is checked while running.
    pub fn validate(&self) -> Result<(), BytecodeError> {
        if self.code.is_empty() {
            return Err(BytecodeError::MissingEnd {
                function: self.name.clone(),
                offset: 0,
            });
        }

        let mut boundaries = Vec::new();
        let mut branches = Vec::new();
        for item in self.instructions() {
            let (offset, instruction) = item?;
            boundaries.push(offset);
            match instruction {
                Instruction::Constant(index) => self.check_constant(index)?,
                Instruction::Method { constant, .. } => {
                    self.check_constant(constant)?;
                    if self.constants[usize::from(constant)].as_fn().is_none() {
                        return Err(BytecodeError::WrongConstant {
                            index: usize::from(constant),
                            expected: "function",
                        });
                    }
                }
                _ => {}
            }
            if let Some(target) = instruction.branch_target(offset) {
                branches.push((offset, target));
            }
        }

        for (offset, target) in branches {
            let in_bounds = usize::try_from(target)
                .ok()
                .filter(|t| boundaries.binary_search(t).is_ok());
            if in_bounds.is_none() {
                return Err(BytecodeError::JumpOutOfRange { offset });
            }
        }

        for constant in &self.constants {
            if let Constant::Fn(nested) = constant {
                nested.validate()?;
            }
        }
        Ok(())
    }

    fn check_constant(&self, index: u16) -> Result<(), BytecodeError> {
        if usize::from(index) >= self.constants.len() {
            return Err(BytecodeError::ConstantOutOfRange {
                index: usize::from(index),
                len: self.constants.len(),
            });
        }
        Ok(())
    }

    /// Serialize chunk to binary format
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::{BytecodeChunk, Instruction};
    ///
    /// let mut chunk = BytecodeChunk::new("main", 0);
    /// let idx = chunk.add_constant(42.0).unwrap();
    /// chunk.emit(Instruction::Constant(idx));
    /// chunk.emit(Instruction::End);
    ///
    /// let bytes = chunk.to_bytes();
    /// let restored = BytecodeChunk::from_bytes(&bytes).unwrap();
    /// assert_eq!(restored, chunk);
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        self.write_body(&mut bytes);
        bytes
    }

    fn write_body(&self, bytes: &mut Vec<u8>) {
        write_str(bytes, &self.name);
        bytes.push(self.arity);
        bytes.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.code);
        bytes.extend_from_slice(&(self.constants.len() as u32).to_be_bytes());
        for constant in &self.constants {
            match constant {
                Constant::Null => bytes.push(0),
                Constant::Bool(b) => {
                    bytes.push(1);
                    bytes.push(u8::from(*b));
                }
                Constant::Num(n) => {
                    bytes.push(2);
                    bytes.extend_from_slice(&n.to_be_bytes());
                }
                Constant::Str(s) => {
                    bytes.push(3);
                    write_str(bytes, s);
                }
                Constant::Fn(chunk) => {
                    bytes.push(4);
                    chunk.write_body(bytes);
                }
            }
        }
    }

    /// Deserialize chunk from binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkFormatError> {
        if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ChunkFormatError::BadMagic);
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(ChunkFormatError::UnsupportedVersion(version));
        }

        let mut reader = Reader {
            bytes,
            pos: MAGIC.len() + 1,
        };
        let chunk = reader.chunk(0)?;
        let trailing = bytes.len() - reader.pos;
        if trailing != 0 {
            return Err(ChunkFormatError::TrailingBytes(trailing));
        }
        Ok(chunk)
    }

    /// Whether `bytes` starts like a serialized chunk
    pub fn is_serialized(bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC)
    }
}

fn write_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u32).to_be_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ChunkFormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ChunkFormatError::UnexpectedEnd(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ChunkFormatError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<usize, ChunkFormatError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn string(&mut self) -> Result<String, ChunkFormatError> {
        let len = self.u32()?;
        let at = self.pos;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ChunkFormatError::InvalidUtf8(at))
    }

    fn chunk(&mut self, depth: usize) -> Result<BytecodeChunk, ChunkFormatError> {
        if depth > MAX_NESTING {
            return Err(ChunkFormatError::TooDeep(MAX_NESTING));
        }
        let name = self.string()?;
        let arity = self.u8()?;
        let code_len = self.u32()?;
        let code = self.take(code_len)?.to_vec();
        let count = self.u32()?;

        let mut constants = Vec::new();
        for _ in 0..count {
            let at = self.pos;
            let constant = match self.u8()? {
                0 => Constant::Null,
                1 => Constant::Bool(self.u8()? != 0),
                2 => {
                    let b = self.take(8)?;
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    Constant::Num(f64::from_be_bytes(raw))
                }
                3 => Constant::Str(self.string()?),
                4 => Constant::Fn(Box::new(self.chunk(depth + 1)?)),
                tag => return Err(ChunkFormatError::UnknownConstantTag { tag, offset: at }),
            };
            constants.push(constant);
        }

        Ok(BytecodeChunk {
            name,
            arity,
            code,
            constants,
        })
    }
}
