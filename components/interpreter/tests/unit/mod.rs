//! Unit tests for interpreter components

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use bytecode_system::assemble;
use core_types::{RuntimeErrorKind, SymbolError, Value, VmConfig, VmError, VmResult};
use interpreter::{Fiber, SymbolTable, Vm};

fn vm() -> Vm {
    Vm::new(VmConfig::default()).unwrap()
}

fn run(vm: &mut Vm, source: &str) -> VmResult<Value> {
    let chunk = assemble(source, vm).unwrap();
    vm.run(&chunk)
}

/// Run `body` as the `main` function of a fresh VM
fn eval(body: &str) -> (Vm, VmResult<Value>) {
    let mut vm = vm();
    let source = format!(".fn main 0\n{}\n.end\n", body);
    let result = run(&mut vm, &source);
    (vm, result)
}

fn eval_num(body: &str) -> f64 {
    let (_, result) = eval(body);
    match result {
        Ok(Value::Num(n)) => n,
        other => panic!("expected a num, got {:?}", other),
    }
}

fn eval_string(body: &str) -> String {
    let (vm, result) = eval(body);
    let value = result.unwrap();
    vm.as_str(value)
        .unwrap_or_else(|| panic!("expected a string, got {:?}", value))
        .to_string()
}

fn error_kind(result: VmResult<Value>) -> Option<RuntimeErrorKind> {
    result.err().and_then(|e| e.as_runtime().map(|r| r.kind))
}

/// Shared buffer standing in for stdout
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Symbol Table Tests
// ============================================================================

#[test]
fn test_symbol_indices_match_insertion_order() {
    let mut table = SymbolTable::new(256);
    let names = ["first", "second", "third", "fourth"];
    let indices: Vec<usize> = names.iter().map(|n| table.add(n).unwrap()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    for (index, name) in names.iter().enumerate() {
        assert_eq!(table.find(name), Some(index));
        assert_eq!(table.name_of(index), Some(*name));
    }
}

#[test]
fn test_symbol_truncate_then_find() {
    let mut table = SymbolTable::new(256);
    for name in ["a", "b", "c", "d", "e"] {
        table.ensure(name).unwrap();
    }
    table.truncate(3);
    assert_eq!(table.len(), 3);
    for name in ["a", "b", "c"] {
        assert!(table.find(name).is_some());
    }
    for name in ["d", "e"] {
        assert_eq!(table.find(name), None);
    }
}

#[test]
fn test_symbol_duplicate_add_fails() {
    let mut table = SymbolTable::new(256);
    table.add("x").unwrap();
    assert_eq!(table.add("x"), Err(SymbolError::Duplicate("x".to_string())));
    assert_eq!(table.len(), 1);
    assert_eq!(table.ensure("x"), Ok(0));
}

#[test]
fn test_symbol_table_bound_from_config() {
    let mut vm = Vm::new(VmConfig::default().with_max_symbols(64)).unwrap();
    let before = vm.method_symbols().len();
    let mut last = Ok(0);
    for n in 0..64 {
        last = vm.method_symbol_index(&format!("m{}", n));
        if last.is_err() {
            break;
        }
    }
    assert_eq!(last, Err(SymbolError::Overflow { limit: 64 }));
    assert_eq!(vm.method_symbols().len(), 64);
    assert!(before < 64);
}

// ============================================================================
// Fiber Tests
// ============================================================================

#[test]
fn test_fiber_starts_empty() {
    let fiber = Fiber::new(&VmConfig::default());
    assert_eq!(fiber.stack_len(), 0);
    assert_eq!(fiber.depth(), 0);
    assert!(fiber.frame().is_none());
}

#[test]
fn test_fiber_reset_after_run() {
    let (vm, result) = eval("CONSTANT 1\nCONSTANT 2\nEND");
    assert_eq!(result, Ok(Value::Num(2.0)));
    assert_eq!(vm.fiber().stack_len(), 0);
    assert_eq!(vm.fiber().depth(), 0);
}

// ============================================================================
// Num Tests
// ============================================================================

#[test]
fn test_num_arithmetic() {
    assert_eq!(eval_num("CONSTANT 3\nCONSTANT 4\nCALL_1 +\nEND"), 7.0);
    assert_eq!(eval_num("CONSTANT 10\nCONSTANT 4\nCALL_1 -\nEND"), 6.0);
    assert_eq!(eval_num("CONSTANT 6\nCONSTANT 7\nCALL_1 *\nEND"), 42.0);
    assert_eq!(eval_num("CONSTANT 1\nCONSTANT 4\nCALL_1 /\nEND"), 0.25);
    assert_eq!(eval_num("CONSTANT 7\nCONSTANT 3\nCALL_1 %\nEND"), 1.0);
    assert_eq!(eval_num("CONSTANT 5\nCALL_0 neg\nEND"), -5.0);
    assert_eq!(eval_num("CONSTANT -2.5\nCALL_0 abs\nEND"), 2.5);
}

#[test]
fn test_num_comparisons() {
    for (op, expected) in [("<", true), (">", false), ("<=", true), (">=", false)] {
        let (_, result) = eval(&format!("CONSTANT 1\nCONSTANT 2\nCALL_1 {}\nEND", op));
        assert_eq!(result, Ok(Value::Bool(expected)), "1 {} 2", op);
    }
    let (_, result) = eval("CONSTANT 2\nCONSTANT 2\nCALL_1 ==\nEND");
    assert_eq!(result, Ok(Value::Bool(true)));
    let (_, result) = eval("CONSTANT 2\nCONSTANT 3\nCALL_1 !=\nEND");
    assert_eq!(result, Ok(Value::Bool(true)));
}

#[test]
fn test_num_type_error() {
    let (vm, result) = eval("CONSTANT 1\nCONSTANT \"one\"\nCALL_1 +\nEND");
    assert_eq!(error_kind(result), Some(RuntimeErrorKind::TypeError));
    assert_eq!(vm.fiber().stack_len(), 0);
}

#[test]
fn test_division_by_zero_is_infinite() {
    assert_eq!(eval_num("CONSTANT 1\nCONSTANT 0\nCALL_1 /\nEND"), f64::INFINITY);
}

// ============================================================================
// String, Bool and Null Tests
// ============================================================================

#[test]
fn test_string_concat_and_count() {
    assert_eq!(
        eval_string("CONSTANT \"foo\"\nCONSTANT \"bar\"\nCALL_1 +\nEND"),
        "foobar"
    );
    assert_eq!(eval_num("CONSTANT \"héllo\"\nCALL_0 count\nEND"), 5.0);
}

#[test]
fn test_string_equality_compares_contents() {
    let (_, result) = eval("CONSTANT \"a\"\nCONSTANT \"b\"\nCALL_1 +\nCONSTANT \"ab\"\nCALL_1 ==\nEND");
    assert_eq!(result, Ok(Value::Bool(true)));
    let (_, result) = eval("CONSTANT \"a\"\nCONSTANT 1\nCALL_1 !=\nEND");
    assert_eq!(result, Ok(Value::Bool(true)));
}

#[test]
fn test_to_string() {
    assert_eq!(eval_string("CONSTANT 12\nCALL_0 toString\nEND"), "12");
    assert_eq!(eval_string("TRUE\nCALL_0 toString\nEND"), "true");
    assert_eq!(eval_string("NULL\nCALL_0 toString\nEND"), "null");
    assert_eq!(
        eval_string("CONSTANT 1\nCONSTANT \"x\"\nLIST 2\nCALL_0 toString\nEND"),
        "[1, x]"
    );
}

#[test]
fn test_bool_not() {
    let (_, result) = eval("FALSE\nCALL_0 !\nEND");
    assert_eq!(result, Ok(Value::Bool(true)));
    let (_, result) = eval("TRUE\nCALL_0 !\nEND");
    assert_eq!(result, Ok(Value::Bool(false)));
}

#[test]
fn test_type_returns_class() {
    let (vm, result) = eval("CONSTANT 1\nCALL_0 type\nEND");
    assert_eq!(result, Ok(Value::Obj(vm.classes().num)));
    let (vm, result) = eval("LOAD_GLOBAL Num\nCALL_0 type\nEND");
    assert_eq!(result, Ok(Value::Obj(vm.classes().class)));
}

#[test]
fn test_class_name() {
    assert_eq!(eval_string("LOAD_GLOBAL List\nCALL_0 name\nEND"), "List");
}

// ============================================================================
// List Tests
// ============================================================================

#[test]
fn test_list_literal_preserves_push_order() {
    let (vm, result) = eval("CONSTANT 1\nCONSTANT 2\nCONSTANT 3\nLIST 3\nEND");
    let list = result.unwrap().as_obj().unwrap();
    let elements = vm.heap().get(list).unwrap().as_list().unwrap().clone();
    assert_eq!(
        elements,
        vec![Value::Num(1.0), Value::Num(2.0), Value::Num(3.0)]
    );
}

#[test]
fn test_list_add_get_set_count() {
    let body = "LIST 0
STORE_GLOBAL items
CONSTANT 10
CALL_1 add
POP
LOAD_GLOBAL items
CONSTANT 20
CALL_1 add
POP
LOAD_GLOBAL items
CONSTANT 0
CONSTANT 99
CALL_2 []=
POP
LOAD_GLOBAL items
CONSTANT -1
CALL_1 []
LOAD_GLOBAL items
CONSTANT 0
CALL_1 []
CALL_1 +
LOAD_GLOBAL items
CALL_0 count
CALL_1 +
END";
    assert_eq!(eval_num(body), 20.0 + 99.0 + 2.0);
}

#[test]
fn test_list_index_out_of_range() {
    let (_, result) = eval("LIST 0\nCONSTANT 0\nCALL_1 []\nEND");
    assert_eq!(error_kind(result), Some(RuntimeErrorKind::IndexOutOfRange));
}

// ============================================================================
// IO Tests
// ============================================================================

#[test]
fn test_io_write_prints_and_returns_argument() {
    let capture = Capture::default();
    let mut vm = vm().with_output(Box::new(capture.clone()));
    let result = run(
        &mut vm,
        ".fn main 0\nLOAD_GLOBAL IO\nCONSTANT \"hello\"\nCALL_1 write\nPOP\nLOAD_GLOBAL IO\nCONSTANT 42\nCALL_1 write\nEND\n.end\n",
    );
    assert_eq!(result, Ok(Value::Num(42.0)));
    let printed = String::from_utf8(capture.0.borrow().clone()).unwrap();
    assert_eq!(printed, "hello\n42\n");
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_does_not_understand_message() {
    let (_, result) = eval("CONSTANT 1\nCALL_0 frobnicate\nEND");
    let err = result.unwrap_err();
    let runtime = err.as_runtime().unwrap();
    assert_eq!(runtime.kind, RuntimeErrorKind::DoesNotUnderstand);
    assert_eq!(runtime.message, "Num does not implement 'frobnicate'");
    assert_eq!(runtime.stack[0].function_name, "main");
}

#[test]
fn test_undeclared_global_slot_is_bytecode_error() {
    let mut vm = vm();
    let mut chunk = bytecode_system::BytecodeChunk::new("main", 0);
    chunk.emit(bytecode_system::Instruction::LoadGlobal(999));
    chunk.emit(bytecode_system::Instruction::End);
    let err = vm.run(&chunk).unwrap_err();
    assert!(matches!(
        err,
        VmError::Bytecode(core_types::BytecodeError::GlobalOutOfRange { slot: 999 })
    ));
}

#[test]
fn test_stack_underflow_is_detected() {
    let (_, result) = eval("POP\nEND");
    assert_eq!(
        result,
        Err(VmError::Bytecode(core_types::BytecodeError::StackUnderflow))
    );
}

#[test]
fn test_value_stack_overflow() {
    let mut vm = Vm::new(VmConfig::default().with_max_stack_slots(3)).unwrap();
    let result = run(&mut vm, ".fn main 0\nNULL\nNULL\nNULL\nNULL\nEND\n.end\n");
    assert!(matches!(result, Err(VmError::Overflow { limit: 3, .. })));
}

#[test]
fn test_primitive_rejects_extra_arguments() {
    let (_, result) = eval(
        " CONSTANT 3\n CONSTANT 4\n CONSTANT 100\n CONSTANT 200\n CALL_3 +\n END",
    );
    match result {
        Err(VmError::Runtime(error)) => {
            assert_eq!(error.kind, RuntimeErrorKind::ArityMismatch);
            assert_eq!(error.message, "Num.+ expects 1 arguments, got 3");
        }
        other => panic!("expected an arity error, got {:?}", other),
    }
}

#[test]
fn test_primitive_rejects_missing_argument() {
    let (_, result) = eval(" CONSTANT 3\n CALL_0 +\n END");
    assert_eq!(error_kind(result), Some(RuntimeErrorKind::ArityMismatch));

    let (_, result) = eval(" LIST 0\n CONSTANT 0\n CALL_1 []=\n END");
    assert_eq!(error_kind(result), Some(RuntimeErrorKind::ArityMismatch));
}

#[test]
fn test_fn_call_accepts_any_call_arity() {
    let source = "
.fn main 0
    CONSTANT @pair
    CONSTANT 1
    CONSTANT 2
    CALL_2 call
    END
.end
.fn pair 2
    LOAD_LOCAL 1
    LOAD_LOCAL 2
    LIST 2
    END
.end
";
    let mut vm = vm();
    let result = run(&mut vm, source).unwrap();
    assert_eq!(vm.display(result).unwrap(), "[1, 2]");
}

#[test]
fn test_core_method_symbols_survive_truncate() {
    let mut vm = vm();
    let core = vm.method_symbols().len();
    vm.method_symbols_mut().ensure("userMethod").unwrap();

    vm.method_symbols_mut().truncate(0);
    assert_eq!(vm.method_symbols().len(), core);
    assert_eq!(vm.method_symbols().find("userMethod"), None);

    let result = run(&mut vm, ".fn main 0\n CONSTANT 1\n CONSTANT 2\n CALL_1 +\n END\n.end\n");
    assert_eq!(result, Ok(Value::Num(3.0)));
}

#[test]
fn test_core_globals_survive_truncate() {
    let mut vm = vm();
    vm.define_global("scratch", Value::Num(1.0)).unwrap();
    vm.truncate_globals(0);
    assert_eq!(vm.find_global("scratch"), None);
    assert_eq!(
        vm.find_global("Object"),
        Some(Value::Obj(vm.classes().object))
    );
}
