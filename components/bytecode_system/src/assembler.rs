//! Text assembler
//!
//! Turns a line-oriented listing into a [`BytecodeChunk`]. This is the only
//! bytecode producer in the workspace; it stands in for a compiler.
//!
//! ```text
//! ; comments run to end of line
//! .fn main 0
//!     CONSTANT 3
//!     CONSTANT 4
//!     CALL_1 +
//!     END
//! .end
//! ```
//!
//! Each `.fn name arity` ... `.end` block is one function. The function
//! named `main` is the entry point; other functions are reachable through
//! `@name` operands, which place the function in the referencing function's
//! constant pool. A line ending in `:` defines a label for branch operands.
//!
//! Operands by opcode:
//! - `CONSTANT`: a number, a quoted string, `null`, `true`, `false` or `@fn`
//! - `CLASS`, `SUBCLASS`, `LIST`, `*_LOCAL`, `*_FIELD`: an integer 0-255
//! - `*_GLOBAL`: a global variable name
//! - `CALL_n`: a method name
//! - `METHOD_*`: a method name then `@fn`
//! - `JUMP`, `LOOP`, `JUMP_IF`, `AND`, `OR`: a label

use std::collections::HashMap;

use core_types::{BytecodeError, SymbolError};
use thiserror::Error;

use crate::chunk::BytecodeChunk;
use crate::constant::Constant;
use crate::instruction::{Instruction, MethodKind};
use crate::opcode::Code;

/// Name of the entry-point function
pub const ENTRY_POINT: &str = "main";

/// Resolves names in assembly to symbol indices.
///
/// The VM implements this so assembled code uses the same method and global
/// slots the running program sees.
pub trait SymbolResolver {
    /// Index for a method name, interning it if new
    fn method_symbol(&mut self, name: &str) -> Result<u16, SymbolError>;

    /// Index for a global variable name, interning it if new
    fn global_symbol(&mut self, name: &str) -> Result<u16, SymbolError>;
}

/// Assembly failures, with 1-based source line numbers where known
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssembleError {
    /// Malformed line
    #[error("line {line}: {message}")]
    Syntax {
        /// Source line
        line: usize,
        /// What is wrong
        message: String,
    },
    /// The mnemonic does not name an opcode
    #[error("line {line}: unknown instruction '{name}'")]
    UnknownInstruction {
        /// Source line
        line: usize,
        /// The unrecognized mnemonic
        name: String,
    },
    /// A branch names a label that is not defined in its function
    #[error("line {line}: undefined label '{label}'")]
    UndefinedLabel {
        /// Source line
        line: usize,
        /// Label name
        label: String,
    },
    /// An `@name` operand names no function
    #[error("line {line}: undefined function '{name}'")]
    UndefinedFunction {
        /// Source line
        line: usize,
        /// Function name
        name: String,
    },
    /// A function is defined twice
    #[error("line {line}: function '{name}' is already defined")]
    DuplicateFunction {
        /// Source line
        line: usize,
        /// Function name
        name: String,
    },
    /// A function refers to itself through its own constant pool
    #[error("function '{0}' refers to itself; pass functions through globals instead")]
    RecursiveFunction(String),
    /// No `main` function
    #[error("no 'main' function defined")]
    MissingEntryPoint,
    /// The resolver rejected a name
    #[error("line {line}: {source}")]
    Symbol {
        /// Source line
        line: usize,
        /// Resolver failure
        source: SymbolError,
    },
    /// The instruction could not be encoded
    #[error("line {line}: {source}")]
    Bytecode {
        /// Source line
        line: usize,
        /// Encoding failure
        source: BytecodeError,
    },
}

/// Assemble `source` and return the `main` function.
///
/// # Examples
///
/// ```
/// use bytecode_system::{assemble, SymbolResolver};
/// use core_types::SymbolError;
///
/// struct Names(Vec<String>);
///
/// impl SymbolResolver for Names {
///     fn method_symbol(&mut self, name: &str) -> Result<u16, SymbolError> {
///         self.global_symbol(name)
///     }
///     fn global_symbol(&mut self, name: &str) -> Result<u16, SymbolError> {
///         let index = self.0.iter().position(|n| n == name).unwrap_or_else(|| {
///             self.0.push(name.to_string());
///             self.0.len() - 1
///         });
///         Ok(index as u16)
///     }
/// }
///
/// let chunk = assemble(".fn main 0\n NULL\n END\n.end\n", &mut Names(Vec::new())).unwrap();
/// assert_eq!(chunk.name, "main");
/// assert_eq!(chunk.code.len(), 2);
/// ```
pub fn assemble(
    source: &str,
    symbols: &mut dyn SymbolResolver,
) -> Result<BytecodeChunk, AssembleError> {
    let functions = split_functions(source)?;
    let mut assembler = Assembler {
        functions: &functions,
        symbols,
        building: Vec::new(),
    };
    let main = functions
        .get(ENTRY_POINT)
        .ok_or(AssembleError::MissingEntryPoint)?;
    assembler.build(main)
}

/// One source line, tokenized
struct Line {
    number: usize,
    tokens: Vec<String>,
}

struct FunctionSource {
    name: String,
    arity: u8,
    body: Vec<Line>,
}

fn syntax(line: usize, message: impl Into<String>) -> AssembleError {
    AssembleError::Syntax {
        line,
        message: message.into(),
    }
}

fn split_functions(source: &str) -> Result<HashMap<String, FunctionSource>, AssembleError> {
    let mut functions = HashMap::new();
    let mut current: Option<FunctionSource> = None;

    for (index, text) in source.lines().enumerate() {
        let number = index + 1;
        let tokens = tokenize(text, number)?;
        let Some(first) = tokens.first() else {
            continue;
        };

        match first.as_str() {
            ".fn" => {
                if let Some(open) = &current {
                    return Err(syntax(
                        number,
                        format!("'.fn' inside function '{}'", open.name),
                    ));
                }
                let [_, name, arity] = tokens.as_slice() else {
                    return Err(syntax(number, "expected '.fn <name> <arity>'"));
                };
                let arity = arity
                    .parse::<u8>()
                    .map_err(|_| syntax(number, format!("invalid arity '{}'", arity)))?;
                if functions.contains_key(name) {
                    return Err(AssembleError::DuplicateFunction {
                        line: number,
                        name: name.clone(),
                    });
                }
                current = Some(FunctionSource {
                    name: name.clone(),
                    arity,
                    body: Vec::new(),
                });
            }
            ".end" => {
                if tokens.len() != 1 {
                    return Err(syntax(number, "'.end' takes no operands"));
                }
                let function = current
                    .take()
                    .ok_or_else(|| syntax(number, "'.end' outside a function"))?;
                functions.insert(function.name.clone(), function);
            }
            _ => match current.as_mut() {
                Some(function) => function.body.push(Line { number, tokens }),
                None => return Err(syntax(number, "instruction outside a function")),
            },
        }
    }

    if let Some(open) = current {
        return Err(syntax(
            source.lines().count(),
            format!("function '{}' is missing '.end'", open.name),
        ));
    }
    Ok(functions)
}

/// Split a line into tokens, honouring quoted strings and `;` comments.
///
/// String tokens keep their surrounding quotes so operands can tell
/// `"null"` from `null`; escapes are already resolved.
fn tokenize(text: &str, line: usize) -> Result<Vec<String>, AssembleError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == ';' {
            break;
        } else if c == '"' {
            chars.next();
            let mut token = String::from("\"");
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => token.push('\n'),
                        Some('t') => token.push('\t'),
                        Some('r') => token.push('\r'),
                        Some('"') => token.push('"'),
                        Some('\\') => token.push('\\'),
                        Some(other) => {
                            return Err(syntax(line, format!("unknown escape '\\{}'", other)))
                        }
                        None => return Err(syntax(line, "unterminated string")),
                    },
                    Some(other) => token.push(other),
                    None => return Err(syntax(line, "unterminated string")),
                }
            }
            token.push('"');
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == ';' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

struct Assembler<'a> {
    functions: &'a HashMap<String, FunctionSource>,
    symbols: &'a mut dyn SymbolResolver,
    /// Functions currently being assembled, for cycle detection
    building: Vec<String>,
}

impl Assembler<'_> {
    fn build(&mut self, function: &FunctionSource) -> Result<BytecodeChunk, AssembleError> {
        if self.building.contains(&function.name) {
            return Err(AssembleError::RecursiveFunction(function.name.clone()));
        }
        self.building.push(function.name.clone());

        let labels = collect_labels(function)?;
        let mut chunk = BytecodeChunk::new(function.name.clone(), function.arity);
        let mut function_constants: HashMap<String, u16> = HashMap::new();

        for line in &function.body {
            if is_label(&line.tokens) {
                continue;
            }
            let mnemonic = &line.tokens[0];
            let operands = &line.tokens[1..];
            let code = Code::from_mnemonic(mnemonic).ok_or_else(|| {
                AssembleError::UnknownInstruction {
                    line: line.number,
                    name: mnemonic.clone(),
                }
            })?;
            let expected = match code {
                _ if code.operands().is_empty() => 0,
                Code::MethodInstance | Code::MethodStatic | Code::MethodCtor => 2,
                _ => 1,
            };
            if operands.len() != expected {
                return Err(syntax(
                    line.number,
                    format!("{} takes {} operand(s), got {}", code, expected, operands.len()),
                ));
            }

            let offset = chunk.code.len();
            let instruction = match code {
                Code::Constant => {
                    let index = match operands[0].strip_prefix('@') {
                        Some(name) => {
                            self.function_constant(&mut chunk, &mut function_constants, name, line)?
                        }
                        None => {
                            let constant = parse_literal(&operands[0], line.number)?;
                            add_constant(&mut chunk, constant, line.number)?
                        }
                    };
                    Instruction::Constant(index)
                }
                Code::Null => Instruction::Null,
                Code::False => Instruction::False,
                Code::True => Instruction::True,
                Code::Class => Instruction::Class {
                    num_fields: parse_byte(&operands[0], line.number)?,
                },
                Code::Subclass => Instruction::Subclass {
                    num_fields: parse_byte(&operands[0], line.number)?,
                },
                Code::MethodInstance | Code::MethodStatic | Code::MethodCtor => {
                    let kind = match code {
                        Code::MethodInstance => MethodKind::Instance,
                        Code::MethodStatic => MethodKind::Static,
                        _ => MethodKind::Constructor,
                    };
                    let symbol = self.method(&operands[0], line.number)?;
                    let name = operands[1].strip_prefix('@').ok_or_else(|| {
                        syntax(line.number, format!("{} needs an @function body", code))
                    })?;
                    let constant =
                        self.function_constant(&mut chunk, &mut function_constants, name, line)?;
                    Instruction::Method {
                        kind,
                        symbol,
                        constant,
                    }
                }
                Code::List => Instruction::List(parse_byte(&operands[0], line.number)?),
                Code::LoadLocal => Instruction::LoadLocal(parse_byte(&operands[0], line.number)?),
                Code::StoreLocal => {
                    Instruction::StoreLocal(parse_byte(&operands[0], line.number)?)
                }
                Code::LoadGlobal => Instruction::LoadGlobal(self.global(&operands[0], line.number)?),
                Code::StoreGlobal => {
                    Instruction::StoreGlobal(self.global(&operands[0], line.number)?)
                }
                Code::LoadField => Instruction::LoadField(parse_byte(&operands[0], line.number)?),
                Code::StoreField => {
                    Instruction::StoreField(parse_byte(&operands[0], line.number)?)
                }
                Code::Dup => Instruction::Dup,
                Code::Pop => Instruction::Pop,
                Code::Is => Instruction::Is,
                Code::End => Instruction::End,
                Code::Jump | Code::JumpIf | Code::And | Code::Or | Code::Loop => {
                    let target = *labels.get(operands[0].as_str()).ok_or_else(|| {
                        AssembleError::UndefinedLabel {
                            line: line.number,
                            label: operands[0].clone(),
                        }
                    })?;
                    let after = offset + code.encoded_len();
                    let (distance, backward) = if code == Code::Loop {
                        (after.checked_sub(target), true)
                    } else {
                        (target.checked_sub(after), false)
                    };
                    let distance = distance.ok_or_else(|| {
                        let direction = if backward { "backward" } else { "forward" };
                        syntax(
                            line.number,
                            format!("{} must branch {} to '{}'", code, direction, operands[0]),
                        )
                    })?;
                    let distance = u16::try_from(distance).map_err(|_| {
                        AssembleError::Bytecode {
                            line: line.number,
                            source: BytecodeError::JumpTooFar { offset, distance },
                        }
                    })?;
                    match code {
                        Code::Jump => Instruction::Jump(distance),
                        Code::JumpIf => Instruction::JumpIf(distance),
                        Code::And => Instruction::And(distance),
                        Code::Or => Instruction::Or(distance),
                        _ => Instruction::Loop(distance),
                    }
                }
                call => {
                    let symbol = self.method(&operands[0], line.number)?;
                    let arity = call.call_arity().unwrap_or_default();
                    Instruction::call(arity, symbol).ok_or_else(|| {
                        syntax(line.number, format!("unsupported call arity {}", arity))
                    })?
                }
            };
            chunk.emit(instruction);
        }

        self.building.pop();
        Ok(chunk)
    }

    /// Add (or reuse) a constant holding the named function
    fn function_constant(
        &mut self,
        chunk: &mut BytecodeChunk,
        cache: &mut HashMap<String, u16>,
        name: &str,
        line: &Line,
    ) -> Result<u16, AssembleError> {
        if let Some(index) = cache.get(name) {
            return Ok(*index);
        }
        let functions = self.functions;
        let source = functions
            .get(name)
            .ok_or_else(|| AssembleError::UndefinedFunction {
                line: line.number,
                name: name.to_string(),
            })?;
        let nested = self.build(source)?;
        let index = add_constant(chunk, Constant::from(nested), line.number)?;
        cache.insert(name.to_string(), index);
        Ok(index)
    }

    fn method(&mut self, name: &str, line: usize) -> Result<u16, AssembleError> {
        self.symbols
            .method_symbol(name)
            .map_err(|source| AssembleError::Symbol { line, source })
    }

    fn global(&mut self, name: &str, line: usize) -> Result<u16, AssembleError> {
        self.symbols
            .global_symbol(name)
            .map_err(|source| AssembleError::Symbol { line, source })
    }
}

fn is_label(tokens: &[String]) -> bool {
    matches!(tokens, [label] if label.len() > 1 && label.ends_with(':') && !label.starts_with('"'))
}

/// First pass: label name to code offset
fn collect_labels(function: &FunctionSource) -> Result<HashMap<&str, usize>, AssembleError> {
    let mut labels = HashMap::new();
    let mut offset = 0;
    for line in &function.body {
        if is_label(&line.tokens) {
            let name = line.tokens[0].trim_end_matches(':');
            if labels.insert(name, offset).is_some() {
                return Err(syntax(line.number, format!("duplicate label '{}'", name)));
            }
            continue;
        }
        let code = Code::from_mnemonic(&line.tokens[0]).ok_or_else(|| {
            AssembleError::UnknownInstruction {
                line: line.number,
                name: line.tokens[0].clone(),
            }
        })?;
        offset += code.encoded_len();
    }
    Ok(labels)
}

fn add_constant(
    chunk: &mut BytecodeChunk,
    constant: Constant,
    line: usize,
) -> Result<u16, AssembleError> {
    chunk
        .add_constant(constant)
        .map_err(|source| AssembleError::Bytecode { line, source })
}

fn parse_literal(token: &str, line: usize) -> Result<Constant, AssembleError> {
    if let Some(text) = token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Ok(Constant::Str(text.to_string()));
    }
    match token {
        "null" => Ok(Constant::Null),
        "true" => Ok(Constant::Bool(true)),
        "false" => Ok(Constant::Bool(false)),
        "nan" => Ok(Constant::Num(f64::NAN)),
        "infinity" => Ok(Constant::Num(f64::INFINITY)),
        "-infinity" => Ok(Constant::Num(f64::NEG_INFINITY)),
        _ => token
            .parse::<f64>()
            .map(Constant::Num)
            .map_err(|_| syntax(line, format!("invalid constant '{}'", token))),
    }
}

fn parse_byte(token: &str, line: usize) -> Result<u8, AssembleError> {
    token
        .parse::<u8>()
        .map_err(|_| syntax(line, format!("expected an integer 0-255, got '{}'", token)))
}
