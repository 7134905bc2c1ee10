//! Opcode bytes and their operand layout
//!
//! Every instruction is one opcode byte followed by a fixed number of operand
//! bytes determined by the opcode. Multi-byte operands are big-endian.

/// Highest argument count a single call instruction can encode
pub const MAX_CALL_ARITY: u8 = 10;

/// Width of one operand in the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    /// One byte
    Byte,
    /// Two bytes, big-endian
    Short,
}

impl OperandWidth {
    /// Number of bytes the operand occupies
    pub fn bytes(self) -> usize {
        match self {
            OperandWidth::Byte => 1,
            OperandWidth::Short => 2,
        }
    }
}

const NONE: &[OperandWidth] = &[];
const BYTE: &[OperandWidth] = &[OperandWidth::Byte];
const SHORT: &[OperandWidth] = &[OperandWidth::Short];
const SHORT_SHORT: &[OperandWidth] = &[OperandWidth::Short, OperandWidth::Short];

/// Opcode byte values.
///
/// The discriminants are the wire encoding. The call family is numbered by
/// argument count so that `CALL_n` is `Call0 + n`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Push constant pool entry
    Constant = 0,
    /// Push null
    Null,
    /// Push false
    False,
    /// Push true
    True,
    /// Push a new class deriving from Object
    Class,
    /// Pop a superclass and push a new class inheriting from it
    Subclass,
    /// Bind an instance method on the class at the top of the stack
    MethodInstance,
    /// Bind a method on the metaclass of the class at the top of the stack
    MethodStatic,
    /// Bind a constructor on the metaclass of the class at the top of the stack
    MethodCtor,
    /// Pop values into a new list
    List,
    /// Push a local slot
    LoadLocal,
    /// Store the top into a local slot without popping
    StoreLocal,
    /// Push a global slot
    LoadGlobal,
    /// Store the top into a global slot without popping
    StoreGlobal,
    /// Push a field of the frame's receiver
    LoadField,
    /// Store the top into a field of the frame's receiver without popping
    StoreField,
    /// Duplicate the top
    Dup,
    /// Discard the top
    Pop,
    /// Invoke a method with no arguments
    Call0,
    /// Invoke a method with 1 argument
    Call1,
    /// Invoke a method with 2 arguments
    Call2,
    /// Invoke a method with 3 arguments
    Call3,
    /// Invoke a method with 4 arguments
    Call4,
    /// Invoke a method with 5 arguments
    Call5,
    /// Invoke a method with 6 arguments
    Call6,
    /// Invoke a method with 7 arguments
    Call7,
    /// Invoke a method with 8 arguments
    Call8,
    /// Invoke a method with 9 arguments
    Call9,
    /// Invoke a method with 10 arguments
    Call10,
    /// Jump forward
    Jump,
    /// Jump backward, discarding the top
    Loop,
    /// Pop, and jump forward if the value was falsy
    JumpIf,
    /// Jump forward if the top is falsy, otherwise pop
    And,
    /// Jump forward if the top is truthy, otherwise pop
    Or,
    /// Pop a class and a value, push whether the value is an instance of it
    Is,
    /// Return from the current frame
    End,
}

impl Code {
    /// Every opcode in discriminant order
    pub const ALL: [Code; 36] = [
        Code::Constant,
        Code::Null,
        Code::False,
        Code::True,
        Code::Class,
        Code::Subclass,
        Code::MethodInstance,
        Code::MethodStatic,
        Code::MethodCtor,
        Code::List,
        Code::LoadLocal,
        Code::StoreLocal,
        Code::LoadGlobal,
        Code::StoreGlobal,
        Code::LoadField,
        Code::StoreField,
        Code::Dup,
        Code::Pop,
        Code::Call0,
        Code::Call1,
        Code::Call2,
        Code::Call3,
        Code::Call4,
        Code::Call5,
        Code::Call6,
        Code::Call7,
        Code::Call8,
        Code::Call9,
        Code::Call10,
        Code::Jump,
        Code::Loop,
        Code::JumpIf,
        Code::And,
        Code::Or,
        Code::Is,
        Code::End,
    ];

    /// Decode an opcode byte
    pub fn from_byte(byte: u8) -> Option<Code> {
        Code::ALL.get(usize::from(byte)).copied()
    }

    /// The call opcode for `arity` arguments, if it is encodable
    pub fn call(arity: u8) -> Option<Code> {
        if arity > MAX_CALL_ARITY {
            return None;
        }
        Code::from_byte(Code::Call0 as u8 + arity)
    }

    /// Argument count for call opcodes
    pub fn call_arity(self) -> Option<u8> {
        let byte = self as u8;
        if (Code::Call0 as u8..=Code::Call10 as u8).contains(&byte) {
            Some(byte - Code::Call0 as u8)
        } else {
            None
        }
    }

    /// Whether the operand is a forward or backward branch distance
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Code::Jump | Code::Loop | Code::JumpIf | Code::And | Code::Or
        )
    }

    /// Operand layout following the opcode byte
    pub fn operands(self) -> &'static [OperandWidth] {
        match self {
            Code::Null
            | Code::False
            | Code::True
            | Code::Dup
            | Code::Pop
            | Code::Is
            | Code::End => NONE,
            Code::Class
            | Code::Subclass
            | Code::List
            | Code::LoadLocal
            | Code::StoreLocal
            | Code::LoadField
            | Code::StoreField => BYTE,
            Code::MethodInstance | Code::MethodStatic | Code::MethodCtor => SHORT_SHORT,
            _ => SHORT,
        }
    }

    /// Total encoded size of an instruction with this opcode
    pub fn encoded_len(self) -> usize {
        1 + self.operands().iter().map(|w| w.bytes()).sum::<usize>()
    }

    /// Assembly mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Code::Constant => "CONSTANT",
            Code::Null => "NULL",
            Code::False => "FALSE",
            Code::True => "TRUE",
            Code::Class => "CLASS",
            Code::Subclass => "SUBCLASS",
            Code::MethodInstance => "METHOD_INSTANCE",
            Code::MethodStatic => "METHOD_STATIC",
            Code::MethodCtor => "METHOD_CTOR",
            Code::List => "LIST",
            Code::LoadLocal => "LOAD_LOCAL",
            Code::StoreLocal => "STORE_LOCAL",
            Code::LoadGlobal => "LOAD_GLOBAL",
            Code::StoreGlobal => "STORE_GLOBAL",
            Code::LoadField => "LOAD_FIELD",
            Code::StoreField => "STORE_FIELD",
            Code::Dup => "DUP",
            Code::Pop => "POP",
            Code::Call0 => "CALL_0",
            Code::Call1 => "CALL_1",
            Code::Call2 => "CALL_2",
            Code::Call3 => "CALL_3",
            Code::Call4 => "CALL_4",
            Code::Call5 => "CALL_5",
            Code::Call6 => "CALL_6",
            Code::Call7 => "CALL_7",
            Code::Call8 => "CALL_8",
            Code::Call9 => "CALL_9",
            Code::Call10 => "CALL_10",
            Code::Jump => "JUMP",
            Code::Loop => "LOOP",
            Code::JumpIf => "JUMP_IF",
            Code::And => "AND",
            Code::Or => "OR",
            Code::Is => "IS",
            Code::End => "END",
        }
    }

    /// Look up an opcode by mnemonic, ignoring ASCII case
    pub fn from_mnemonic(name: &str) -> Option<Code> {
        Code::ALL
            .iter()
            .copied()
            .find(|code| code.mnemonic().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
