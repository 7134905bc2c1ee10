//! Contract tests for interpreter API
//!
//! These tests pin down the observable guarantees of the execution core:
//! symbol indices, pin ordering, collection, frame windows, and how errors
//! leave the VM.

use bytecode_system::{assemble, BytecodeChunk, Instruction};
use core_types::{GcError, RuntimeErrorKind, SymbolError, Value, VmConfig, VmError};
use interpreter::Vm;
use memory_manager::{Heap, Obj};

fn vm() -> Vm {
    Vm::new(VmConfig::default()).unwrap()
}

fn stress_config() -> VmConfig {
    VmConfig::default()
        .with_initial_next_gc(0)
        .with_min_next_gc(0)
        .with_heap_growth_percent(100)
}

/// Symbols get dense indices in insertion order and keep them
#[test]
fn test_symbol_stability_contract() {
    let mut vm = vm();
    let base = vm.global_symbols().len();
    let names = ["alpha", "beta", "gamma"];
    for (offset, name) in names.iter().enumerate() {
        assert_eq!(vm.define_global(name, Value::Null).unwrap(), base + offset);
    }
    for (offset, name) in names.iter().enumerate() {
        assert_eq!(vm.global_symbols().find(name), Some(base + offset));
        assert_eq!(vm.global_symbols().name_of(base + offset), Some(*name));
    }
}

/// Truncating keeps exactly the names below the count
#[test]
fn test_truncate_contract() {
    let mut vm = vm();
    let base = vm.global_symbols().len();
    for name in ["a", "b", "c", "d"] {
        vm.define_global(name, Value::Num(1.0)).unwrap();
    }
    vm.truncate_globals(base + 2);
    assert!(vm.find_global("a").is_some());
    assert!(vm.find_global("b").is_some());
    assert_eq!(vm.find_global("c"), None);
    assert_eq!(vm.find_global("d"), None);
    assert_eq!(vm.global_symbols().len(), base + 2);
}

/// Adding an existing name fails without changing the table
#[test]
fn test_duplicate_symbol_contract() {
    let mut vm = vm();
    let table = vm.method_symbols_mut();
    let index = table.add("frobnicate").unwrap();
    let len = table.len();
    assert_eq!(
        table.add("frobnicate"),
        Err(SymbolError::Duplicate("frobnicate".to_string()))
    );
    assert_eq!(table.len(), len);
    assert_eq!(table.find("frobnicate"), Some(index));
}

/// Pins release in LIFO order; anything else is reported
#[test]
fn test_pin_lifo_contract() {
    let mut heap = Heap::new(&VmConfig::default());
    let a = heap.allocate(Obj::Str("a".into()), &()).unwrap();
    let b = heap.allocate(Obj::Str("b".into()), &()).unwrap();
    let token_a = heap.pin(a);
    let token_b = heap.pin(b);

    heap.collect(&());
    assert!(heap.contains(a));
    assert!(heap.contains(b));

    heap.unpin(token_b).unwrap();
    heap.unpin(token_a).unwrap();
    assert_eq!(heap.pinned_count(), 0);

    // Nothing else roots them, so both go once unpinned.
    heap.collect(&());
    assert!(!heap.contains(a));
    assert!(!heap.contains(b));

    let c = heap.allocate(Obj::Str("c".into()), &()).unwrap();
    let d = heap.allocate(Obj::Str("d".into()), &()).unwrap();
    let token_c = heap.pin(c);
    let token_d = heap.pin(d);
    assert!(matches!(heap.unpin(token_c), Err(GcError::PinOrder { .. })));
    heap.unpin(token_d).unwrap();
}

/// Collection keeps what the roots reach and frees the rest
#[test]
fn test_collection_contract() {
    let mut vm = vm();
    vm.collect_garbage();
    let kept = vm.new_string("kept").unwrap();
    vm.define_global("kept", kept).unwrap();
    let garbage = vm.new_string("garbage").unwrap();
    let garbage_id = garbage.as_obj().unwrap();
    let garbage_bytes = vm.heap().get(garbage_id).unwrap().size_bytes();

    let before = vm.heap().total_allocated();
    let report = vm.collect_garbage();

    assert!(vm.heap().contains(kept.as_obj().unwrap()));
    assert_eq!(vm.as_str(vm.find_global("kept").unwrap()), Some("kept"));
    assert!(!vm.heap().contains(garbage_id));
    assert_eq!(report.objects_freed, 1);
    assert_eq!(vm.heap().total_allocated(), before - garbage_bytes);
    for (_, class) in vm.classes().named() {
        assert!(vm.heap().contains(class));
    }
}

/// Slot 0 of a method window is the receiver, then the arguments
#[test]
fn test_stack_slot_contract() {
    for slot in 0..3 {
        let mut vm = vm();
        let source = format!(
            "
.fn main 0
    CLASS 0
    METHOD_STATIC probe @probe
    STORE_GLOBAL Probe
    CONSTANT 10
    CONSTANT 20
    CALL_2 probe
    END
.end
.fn probe 2
    LOAD_LOCAL {slot}
    END
.end
"
        );
        let chunk = assemble(&source, &mut vm).unwrap();
        let result = vm.run(&chunk).unwrap();
        let expected = match slot {
            0 => vm.find_global("Probe").unwrap(),
            1 => Value::Num(10.0),
            _ => Value::Num(20.0),
        };
        assert_eq!(result, expected, "slot {slot}");
    }
}

/// `[CONSTANT 0, CONSTANT 1, CALL_1 +, END]` over `[3, 4]` yields 7
#[test]
fn test_end_to_end_contract() {
    let mut vm = vm();
    let plus = vm.method_symbol_index("+").unwrap();
    let mut chunk = BytecodeChunk::new("main", 0);
    assert_eq!(chunk.add_constant(3.0), Ok(0));
    assert_eq!(chunk.add_constant(4.0), Ok(1));
    chunk.emit(Instruction::Constant(0));
    chunk.emit(Instruction::Constant(1));
    chunk.emit(Instruction::call(1, plus).unwrap());
    chunk.emit(Instruction::End);
    assert_eq!(vm.run(&chunk), Ok(Value::Num(7.0)));
}

/// AND with a false left operand skips the right and leaves false
#[test]
fn test_short_circuit_and_contract() {
    let mut vm = vm();
    let source = "
.fn main 0
    FALSE
    AND done
    NULL
    CALL_0 explode
done:
    END
.end
";
    let chunk = assemble(source, &mut vm).unwrap();
    assert_eq!(vm.run(&chunk), Ok(Value::Bool(false)));

    let source = "
.fn main 0
    TRUE
    AND done
    CONSTANT 5
done:
    END
.end
";
    let chunk = assemble(source, &mut vm).unwrap();
    assert_eq!(vm.run(&chunk), Ok(Value::Num(5.0)));
}

/// A missing method unwinds the fiber and leaves globals alone
#[test]
fn test_does_not_understand_contract() {
    let mut vm = vm();
    vm.define_global("answer", Value::Num(42.0)).unwrap();
    let globals_before = vm.global_symbols().len();

    let source = "
.fn main 0
    CONSTANT 1
    STORE_GLOBAL touched
    POP
    CONSTANT 1
    CALL_0 missing
    END
.end
";
    let chunk = assemble(source, &mut vm).unwrap();
    let err = vm.run(&chunk).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(
        err.as_runtime().map(|e| e.kind),
        Some(RuntimeErrorKind::DoesNotUnderstand)
    );
    assert_eq!(vm.fiber().depth(), 0);
    assert_eq!(vm.fiber().stack_len(), 0);
    assert_eq!(vm.find_global("answer"), Some(Value::Num(42.0)));
    assert_eq!(vm.find_global("touched"), Some(Value::Num(1.0)));
    assert_eq!(vm.global_symbols().len(), globals_before + 1);

    // The VM keeps working afterwards.
    let chunk = assemble(".fn main 0\n LOAD_GLOBAL answer\n END\n.end\n", &mut vm).unwrap();
    assert_eq!(vm.run(&chunk), Ok(Value::Num(42.0)));
}

/// Frame overflow is fatal and reported with the configured limit
#[test]
fn test_overflow_contract() {
    let mut vm = Vm::new(VmConfig::default().with_max_call_frames(8)).unwrap();
    let source = "
.fn main 0
    CLASS 0
    METHOD_STATIC spin @spin
    STORE_GLOBAL Spinner
    CALL_0 spin
    END
.end
.fn spin 0
    LOAD_GLOBAL Spinner
    CALL_0 spin
    END
.end
";
    let chunk = assemble(source, &mut vm).unwrap();
    let err = vm.run(&chunk).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, VmError::Overflow { limit: 8, .. }));
}

/// Allocation under constant collection pressure never frees live objects
#[test]
fn test_stress_collection_contract() {
    let mut vm = Vm::new(stress_config()).unwrap();
    let source = r#"
.fn main 0
    CONSTANT "a"
    CONSTANT "b"
    CALL_1 +
    CONSTANT "c"
    CALL_1 +
    CONSTANT 1
    CONSTANT 2
    LIST 2
    LIST 2
    CALL_0 toString
    END
.end
"#;
    let chunk = assemble(source, &mut vm).unwrap();
    let result = vm.run(&chunk).unwrap();
    assert_eq!(vm.as_str(result), Some("[abc, [1, 2]]"));
    assert!(vm.gc_stats().collections > 0);
}
