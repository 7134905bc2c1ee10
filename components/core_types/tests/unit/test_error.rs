//! Unit tests for the error taxonomy

use core_types::{
    BytecodeError, GcError, ObjId, OverflowKind, RuntimeError, RuntimeErrorKind, StackFrame,
    SymbolError, VmError,
};

#[test]
fn test_runtime_error_carries_stack() {
    let mut error = RuntimeError::new(RuntimeErrorKind::DoesNotUnderstand, "Num does not implement 'x'");
    error.stack.push(StackFrame {
        function_name: "main".to_string(),
        ip: 4,
    });

    assert_eq!(error.stack.len(), 1);
    assert_eq!(error.to_string(), "DoesNotUnderstand: Num does not implement 'x'");
}

#[test]
fn test_fatality_classes() {
    assert!(!VmError::from(RuntimeError::type_error("x")).is_fatal());
    assert!(!VmError::from(SymbolError::Duplicate("a".into())).is_fatal());
    assert!(VmError::from(SymbolError::Overflow { limit: 4 }).is_fatal());
    assert!(VmError::from(GcError::PinStackEmpty).is_fatal());
    assert!(VmError::from(BytecodeError::StackUnderflow).is_fatal());
    assert!(VmError::Overflow {
        kind: OverflowKind::ValueStack,
        limit: 8
    }
    .is_fatal());
}

#[test]
fn test_bytecode_error_messages() {
    let error = BytecodeError::UnknownOpcode {
        offset: 7,
        opcode: 0xff,
    };
    assert_eq!(error.to_string(), "unknown opcode 0xff at offset 7");

    let error = BytecodeError::LocalOutOfRange { slot: 3, window: 2 };
    assert!(error.to_string().contains("slot 3"));
}

#[test]
fn test_dangling_handle_message() {
    let error = GcError::DanglingHandle(ObjId::new(5, 2));
    assert_eq!(error.to_string(), "dangling object handle #5.2");
}

#[test]
fn test_as_runtime() {
    let error = VmError::from(GcError::PinStackEmpty);
    assert!(error.as_runtime().is_none());
}
