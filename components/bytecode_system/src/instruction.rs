//! Decoded instructions
//!
//! [`Instruction`] is the structured form of one opcode plus its operands.
//! [`Instruction::decode`] reads one from a byte stream and
//! [`Instruction::encode`] writes it back.

use core_types::BytecodeError;

use crate::opcode::{Code, OperandWidth, MAX_CALL_ARITY};

/// Argument count of a call, excluding the receiver.
///
/// Only values up to [`MAX_CALL_ARITY`] can be constructed, so every
/// `Instruction::Call` has an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallArity(u8);

impl CallArity {
    /// Create an arity, or `None` if no call opcode encodes it
    pub fn new(arity: u8) -> Option<Self> {
        (arity <= MAX_CALL_ARITY).then_some(Self(arity))
    }

    /// Number of arguments
    pub fn get(self) -> u8 {
        self.0
    }

    fn code(self) -> Code {
        Code::ALL[usize::from(Code::Call0 as u8 + self.0)]
    }
}

/// Where a `METHOD_*` instruction binds its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Instance method on the class
    Instance,
    /// Method on the metaclass
    Static,
    /// Constructor on the metaclass
    Constructor,
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Push constant `index`
    Constant(u16),
    /// Push null
    Null,
    /// Push false
    False,
    /// Push true
    True,
    /// Push a new class with `num_fields` fields
    Class {
        /// Fields declared by the class itself
        num_fields: u8,
    },
    /// Pop a superclass and push a class extending it
    Subclass {
        /// Fields declared by the subclass, added to the superclass's
        num_fields: u8,
    },
    /// Bind function constant `constant` as method `symbol`
    Method {
        /// Instance, static or constructor
        kind: MethodKind,
        /// Method symbol
        symbol: u16,
        /// Constant holding the method body
        constant: u16,
    },
    /// Pop `count` values into a new list
    List(u8),
    /// Push local slot
    LoadLocal(u8),
    /// Store into local slot
    StoreLocal(u8),
    /// Push global slot
    LoadGlobal(u16),
    /// Store into global slot
    StoreGlobal(u16),
    /// Push receiver field
    LoadField(u8),
    /// Store into receiver field
    StoreField(u8),
    /// Duplicate the top
    Dup,
    /// Discard the top
    Pop,
    /// Invoke method `symbol` with `arity` arguments
    Call {
        /// Arguments after the receiver
        arity: CallArity,
        /// Method symbol
        symbol: u16,
    },
    /// Skip forward
    Jump(u16),
    /// Branch backward
    Loop(u16),
    /// Conditional forward branch
    JumpIf(u16),
    /// Short-circuit and
    And(u16),
    /// Short-circuit or
    Or(u16),
    /// Instance-of test
    Is,
    /// Return from the frame
    End,
}

impl Instruction {
    /// Build a call, or `None` if the arity is not encodable
    pub fn call(arity: u8, symbol: u16) -> Option<Self> {
        CallArity::new(arity).map(|arity| Instruction::Call { arity, symbol })
    }

    /// The opcode this instruction encodes to
    pub fn code(&self) -> Code {
        match self {
            Instruction::Constant(_) => Code::Constant,
            Instruction::Null => Code::Null,
            Instruction::False => Code::False,
            Instruction::True => Code::True,
            Instruction::Class { .. } => Code::Class,
            Instruction::Subclass { .. } => Code::Subclass,
            Instruction::Method { kind, .. } => match kind {
                MethodKind::Instance => Code::MethodInstance,
                MethodKind::Static => Code::MethodStatic,
                MethodKind::Constructor => Code::MethodCtor,
            },
            Instruction::List(_) => Code::List,
            Instruction::LoadLocal(_) => Code::LoadLocal,
            Instruction::StoreLocal(_) => Code::StoreLocal,
            Instruction::LoadGlobal(_) => Code::LoadGlobal,
            Instruction::StoreGlobal(_) => Code::StoreGlobal,
            Instruction::LoadField(_) => Code::LoadField,
            Instruction::StoreField(_) => Code::StoreField,
            Instruction::Dup => Code::Dup,
            Instruction::Pop => Code::Pop,
            Instruction::Call { arity, .. } => arity.code(),
            Instruction::Jump(_) => Code::Jump,
            Instruction::Loop(_) => Code::Loop,
            Instruction::JumpIf(_) => Code::JumpIf,
            Instruction::And(_) => Code::And,
            Instruction::Or(_) => Code::Or,
            Instruction::Is => Code::Is,
            Instruction::End => Code::End,
        }
    }

    /// Size of the encoded instruction in bytes
    pub fn encoded_len(&self) -> usize {
        self.code().encoded_len()
    }

    /// Append the encoded instruction to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.code() as u8);
        match *self {
            Instruction::Class { num_fields: b }
            | Instruction::Subclass { num_fields: b }
            | Instruction::List(b)
            | Instruction::LoadLocal(b)
            | Instruction::StoreLocal(b)
            | Instruction::LoadField(b)
            | Instruction::StoreField(b) => out.push(b),
            Instruction::Constant(s)
            | Instruction::LoadGlobal(s)
            | Instruction::StoreGlobal(s)
            | Instruction::Call { symbol: s, .. }
            | Instruction::Jump(s)
            | Instruction::Loop(s)
            | Instruction::JumpIf(s)
            | Instruction::And(s)
            | Instruction::Or(s) => out.extend_from_slice(&s.to_be_bytes()),
            Instruction::Method {
                symbol, constant, ..
            } => {
                out.extend_from_slice(&symbol.to_be_bytes());
                out.extend_from_slice(&constant.to_be_bytes());
            }
            Instruction::Null
            | Instruction::False
            | Instruction::True
            | Instruction::Dup
            | Instruction::Pop
            | Instruction::Is
            | Instruction::End => {}
        }
    }

    /// Decode the instruction starting at `offset`.
    ///
    /// Returns the instruction and the offset of the next one.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::Instruction;
    ///
    /// let mut code = Vec::new();
    /// Instruction::Constant(258).encode(&mut code);
    /// assert_eq!(code, vec![0, 1, 2]);
    ///
    /// let (decoded, next) = Instruction::decode(&code, 0).unwrap();
    /// assert_eq!(decoded, Instruction::Constant(258));
    /// assert_eq!(next, 3);
    /// ```
    pub fn decode(code: &[u8], offset: usize) -> Result<(Instruction, usize), BytecodeError> {
        let byte = *code
            .get(offset)
            .ok_or(BytecodeError::Truncated {
                offset,
                opcode: "instruction",
            })?;
        let op = Code::from_byte(byte).ok_or(BytecodeError::UnknownOpcode {
            offset,
            opcode: byte,
        })?;

        let next = offset + op.encoded_len();
        if next > code.len() {
            return Err(BytecodeError::Truncated {
                offset,
                opcode: op.mnemonic(),
            });
        }

        let mut operands = [0u16; 2];
        let mut at = offset + 1;
        for (slot, width) in operands.iter_mut().zip(op.operands()) {
            *slot = match width {
                OperandWidth::Byte => u16::from(code[at]),
                OperandWidth::Short => u16::from_be_bytes([code[at], code[at + 1]]),
            };
            at += width.bytes();
        }
        let [a, b] = operands;
        // Byte operands were widened from a u8, so narrowing them back is lossless.
        let byte_operand = a as u8;

        let instruction = match op {
            Code::Constant => Instruction::Constant(a),
            Code::Null => Instruction::Null,
            Code::False => Instruction::False,
            Code::True => Instruction::True,
            Code::Class => Instruction::Class {
                num_fields: byte_operand,
            },
            Code::Subclass => Instruction::Subclass {
                num_fields: byte_operand,
            },
            Code::MethodInstance => Instruction::Method {
                kind: MethodKind::Instance,
                symbol: a,
                constant: b,
            },
            Code::MethodStatic => Instruction::Method {
                kind: MethodKind::Static,
                symbol: a,
                constant: b,
            },
            Code::MethodCtor => Instruction::Method {
                kind: MethodKind::Constructor,
                symbol: a,
                constant: b,
            },
            Code::List => Instruction::List(byte_operand),
            Code::LoadLocal => Instruction::LoadLocal(byte_operand),
            Code::StoreLocal => Instruction::StoreLocal(byte_operand),
            Code::LoadGlobal => Instruction::LoadGlobal(a),
            Code::StoreGlobal => Instruction::StoreGlobal(a),
            Code::LoadField => Instruction::LoadField(byte_operand),
            Code::StoreField => Instruction::StoreField(byte_operand),
            Code::Dup => Instruction::Dup,
            Code::Pop => Instruction::Pop,
            Code::Jump => Instruction::Jump(a),
            Code::Loop => Instruction::Loop(a),
            Code::JumpIf => Instruction::JumpIf(a),
            Code::And => Instruction::And(a),
            Code::Or => Instruction::Or(a),
            Code::Is => Instruction::Is,
            Code::End => Instruction::End,
            call => Instruction::Call {
                arity: CallArity(call.call_arity().unwrap_or_default()),
                symbol: a,
            },
        };
        Ok((instruction, next))
    }

    /// Absolute branch target for jump instructions located at `offset`
    pub fn branch_target(&self, offset: usize) -> Option<isize> {
        let after = (offset + self.encoded_len()) as isize;
        match *self {
            Instruction::Jump(d)
            | Instruction::JumpIf(d)
            | Instruction::And(d)
            | Instruction::Or(d) => Some(after + d as isize),
            Instruction::Loop(d) => Some(after - d as isize),
            _ => None,
        }
    }
}

/// Iterator over the instructions of a code slice, yielding `(offset, instruction)`
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    /// Iterate `code` from the start
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, Instruction), BytecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let at = self.offset;
        match Instruction::decode(self.code, at) {
            Ok((instruction, next)) => {
                self.offset = next;
                Some(Ok((at, instruction)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
