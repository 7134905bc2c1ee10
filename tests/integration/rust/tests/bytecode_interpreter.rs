//! Bytecode to Interpreter Integration Tests
//!
//! Tests the integration between bytecode_system and interpreter components.
//! Verifies that chunks built, serialized, assembled, and disassembled by the
//! bytecode tools execute the same way on the VM.

use bytecode_system::{assemble, BytecodeChunk, Instruction};
use core_types::{BytecodeError, Value, VmConfig, VmError};
use interpreter::Vm;
use vm_cli::Runtime;

fn vm() -> Vm {
    Vm::new(VmConfig::default()).unwrap()
}

/// Counts `n` down to zero with builder-emitted jumps, returning the steps taken
fn countdown(vm: &mut Vm, n: f64) -> BytecodeChunk {
    let minus = vm.method_symbol_index("-").unwrap();
    let plus = vm.method_symbol_index("+").unwrap();
    let greater = vm.method_symbol_index(">").unwrap();

    let mut chunk = BytecodeChunk::new("main", 0);
    let start = chunk.add_constant(n).unwrap();
    let zero = chunk.add_constant(0.0).unwrap();
    let one = chunk.add_constant(1.0).unwrap();

    chunk.emit(Instruction::Constant(start)); // slot 0: remaining
    chunk.emit(Instruction::Constant(zero)); // slot 1: steps
    let loop_start = chunk.code.len();
    chunk.emit(Instruction::LoadLocal(0));
    chunk.emit(Instruction::Constant(zero));
    chunk.emit(Instruction::call(1, greater).unwrap());
    let exit = chunk.emit_jump(Instruction::JumpIf);
    chunk.emit(Instruction::LoadLocal(0));
    chunk.emit(Instruction::Constant(one));
    chunk.emit(Instruction::call(1, minus).unwrap());
    chunk.emit(Instruction::StoreLocal(0));
    chunk.emit(Instruction::Pop);
    chunk.emit(Instruction::LoadLocal(1));
    chunk.emit(Instruction::Constant(one));
    chunk.emit(Instruction::call(1, plus).unwrap());
    chunk.emit(Instruction::StoreLocal(1));
    chunk.emit_loop(loop_start).unwrap();
    chunk.patch_jump(exit).unwrap();
    chunk.emit(Instruction::LoadLocal(1));
    chunk.emit(Instruction::End);
    chunk
}

/// Test: Builder-emitted jumps and loops execute
#[test]
fn test_builder_loop_executes() {
    let mut vm = vm();
    let chunk = countdown(&mut vm, 5.0);
    assert!(chunk.validate().is_ok());
    assert_eq!(vm.run(&chunk), Ok(Value::Num(5.0)));

    let chunk = countdown(&mut vm, 0.0);
    assert_eq!(vm.run(&chunk), Ok(Value::Num(0.0)));
}

/// Test: A serialized chunk runs the same after decoding
#[test]
fn test_serialized_chunk_executes() {
    let mut vm = vm();
    let chunk = countdown(&mut vm, 4.0);
    let restored = BytecodeChunk::from_bytes(&chunk.to_bytes()).unwrap();
    assert_eq!(restored, chunk);
    assert_eq!(vm.run(&restored), Ok(Value::Num(4.0)));
}

/// Test: Disassembly with symbol names assembles back into the same program
#[test]
fn test_disassembly_reassembles() {
    let source = r#"
.fn main 0
    CLASS 0
    METHOD_STATIC twice @twice
    STORE_GLOBAL Doubler
    CONSTANT 21
    CALL_1 twice
    CONSTANT "!"
    LIST 2
    CALL_0 toString
    END
.end
.fn twice 1
    LOAD_LOCAL 1
    LOAD_LOCAL 1
    CALL_1 +
    END
.end
"#;
    let mut runtime = Runtime::new(VmConfig::default()).unwrap();
    let chunk = assemble(source, runtime.vm()).unwrap();
    let listing = runtime.disassemble(&chunk).unwrap();
    assert!(listing.contains("METHOD_STATIC twice @twice"));
    assert!(listing.contains("STORE_GLOBAL Doubler"));

    let first = runtime.execute_chunk(&chunk).unwrap();
    let first = runtime.display(first).unwrap();
    let second = runtime.execute_string(&listing).unwrap();
    let second = runtime.display(second).unwrap();
    assert_eq!(first, "[42, !]");
    assert_eq!(second, first);
}

/// Test: Assembled and hand-built chunks agree
#[test]
fn test_assembler_matches_builder() {
    let mut vm = vm();
    let built = countdown(&mut vm, 3.0);
    let listing = bytecode_system::disassemble(&built).unwrap();
    assert!(listing.contains("LOOP L"));
    assert!(listing.contains("JUMP_IF L"));

    let source = "
.fn main 0
    CONSTANT 3
    CONSTANT 0
top:
    LOAD_LOCAL 0
    CONSTANT 0
    CALL_1 >
    JUMP_IF done
    LOAD_LOCAL 0
    CONSTANT 1
    CALL_1 -
    STORE_LOCAL 0
    POP
    LOAD_LOCAL 1
    CONSTANT 1
    CALL_1 +
    STORE_LOCAL 1
    LOOP top
done:
    LOAD_LOCAL 1
    END
.end
";
    let assembled = assemble(source, &mut vm).unwrap();
    assert_eq!(assembled.code.len(), built.code.len());
    assert_eq!(assembled.instruction_count(), built.instruction_count());
    assert_eq!(vm.run(&assembled), Ok(Value::Num(3.0)));
}

/// Test: Malformed code is a fatal error, not a panic
#[test]
fn test_malformed_code_is_fatal() {
    let mut vm = vm();
    let empty = BytecodeChunk::new("main", 0);
    let err = vm.run(&empty).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        VmError::Bytecode(BytecodeError::MissingEnd { .. })
    ));

    let mut chunk = BytecodeChunk::new("main", 0);
    chunk.code.push(0xee);
    let err = vm.run(&chunk).unwrap_err();
    assert!(matches!(
        err,
        VmError::Bytecode(BytecodeError::UnknownOpcode { opcode: 0xee, .. })
    ));

    let mut chunk = BytecodeChunk::new("main", 0);
    chunk.emit(Instruction::Constant(3));
    chunk.emit(Instruction::End);
    let err = vm.run(&chunk).unwrap_err();
    assert!(matches!(
        err,
        VmError::Bytecode(BytecodeError::ConstantOutOfRange { index: 3, len: 0 })
    ));

    // The VM is still usable.
    let chunk = countdown(&mut vm, 2.0);
    assert_eq!(vm.run(&chunk), Ok(Value::Num(2.0)));
}
