//! Constant pool entries
//!
//! A compiled function's constant pool holds plain data. Strings and nested
//! functions become heap objects only when the VM loads the chunk.

use std::fmt;

use core_types::Value;

use crate::chunk::BytecodeChunk;

/// A constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// The null singleton
    Null,
    /// A boolean
    Bool(bool),
    /// A number
    Num(f64),
    /// A string literal
    Str(String),
    /// A nested function, used as a method body or a first-class function
    Fn(Box<BytecodeChunk>),
}

impl Constant {
    /// Short name of the constant's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Null => "null",
            Constant::Bool(_) => "bool",
            Constant::Num(_) => "num",
            Constant::Str(_) => "string",
            Constant::Fn(_) => "function",
        }
    }

    /// The nested function, if this is one
    pub fn as_fn(&self) -> Option<&BytecodeChunk> {
        match self {
            Constant::Fn(chunk) => Some(chunk),
            _ => None,
        }
    }

    /// The immediate value for constants that need no heap object
    pub fn as_immediate(&self) -> Option<Value> {
        match self {
            Constant::Null => Some(Value::Null),
            Constant::Bool(b) => Some(Value::Bool(*b)),
            Constant::Num(n) => Some(Value::Num(*n)),
            Constant::Str(_) | Constant::Fn(_) => None,
        }
    }
}

impl From<f64> for Constant {
    fn from(n: f64) -> Self {
        Constant::Num(n)
    }
}

impl From<bool> for Constant {
    fn from(b: bool) -> Self {
        Constant::Bool(b)
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::Str(s.to_string())
    }
}

impl From<BytecodeChunk> for Constant {
    fn from(chunk: BytecodeChunk) -> Self {
        Constant::Fn(Box::new(chunk))
    }
}

/// Quote a string literal the way the assembler reads it back
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Num(n) => write!(f, "{}", Value::Num(*n)),
            Constant::Str(s) => write!(f, "{}", quote(s)),
            Constant::Fn(chunk) => write!(f, "@{}", chunk.name),
        }
    }
}
