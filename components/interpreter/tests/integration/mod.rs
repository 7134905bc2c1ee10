//! Integration tests for interpreter
//!
//! Whole programs assembled from text and run through the VM: classes,
//! constructors, inheritance, control flow, function objects, and
//! collection pressure.

use bytecode_system::assemble;
use core_types::{RuntimeErrorKind, Value, VmConfig, VmError, VmResult};
use interpreter::Vm;

fn run_with(config: VmConfig, source: &str) -> (Vm, VmResult<Value>) {
    let mut vm = Vm::new(config).unwrap();
    let chunk = assemble(source, &mut vm).unwrap();
    let result = vm.run(&chunk);
    (vm, result)
}

fn run(source: &str) -> (Vm, VmResult<Value>) {
    run_with(VmConfig::default(), source)
}

fn stress() -> VmConfig {
    VmConfig::default()
        .with_initial_next_gc(0)
        .with_min_next_gc(0)
        .with_heap_growth_percent(100)
}

fn runtime_kind(result: &VmResult<Value>) -> Option<RuntimeErrorKind> {
    match result {
        Err(VmError::Runtime(error)) => Some(error.kind),
        _ => None,
    }
}

const POINT: &str = "
.fn main 0
    CLASS 2
    METHOD_CTOR create @init
    METHOD_INSTANCE sum @sum
    STORE_GLOBAL Point
    CONSTANT 3
    CONSTANT 4
    CALL_2 create
    STORE_GLOBAL origin
    CALL_0 sum
    END
.end
.fn init 2
    LOAD_LOCAL 1
    STORE_FIELD 0
    POP
    LOAD_LOCAL 2
    STORE_FIELD 1
    POP
    LOAD_LOCAL 0
    END
.end
.fn sum 0
    LOAD_FIELD 0
    LOAD_FIELD 1
    CALL_1 +
    END
.end
";

// ============================================================================
// Classes and instances
// ============================================================================

#[test]
fn test_constructor_and_fields() {
    let (vm, result) = run(POINT);
    assert_eq!(result, Ok(Value::Num(7.0)));

    let point = vm.find_global("Point").unwrap();
    let origin = vm.find_global("origin").unwrap();
    assert!(vm.is_instance(origin, point.as_obj().unwrap()).unwrap());
    assert_eq!(vm.display(origin).unwrap(), "instance of Point");
}

#[test]
fn test_constructor_under_stress_collection() {
    let (_, result) = run_with(stress(), POINT);
    assert_eq!(result, Ok(Value::Num(7.0)));
}

#[test]
fn test_class_new_allocates_null_fields() {
    let source = "
.fn main 0
    CLASS 1
    METHOD_INSTANCE first @first
    CALL_0 new
    CALL_0 first
    END
.end
.fn first 0
    LOAD_FIELD 0
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(result, Ok(Value::Null));
}

#[test]
fn test_subclass_inherits_methods_and_fields() {
    let source = r#"
.fn main 0
    CLASS 1
    METHOD_INSTANCE greet @greet
    STORE_GLOBAL Base
    SUBCLASS 1
    METHOD_INSTANCE second @second
    STORE_GLOBAL Derived
    CALL_0 new
    STORE_GLOBAL thing
    CALL_0 second
    POP
    LOAD_GLOBAL thing
    CALL_0 greet
    END
.end
.fn greet 0
    CONSTANT "hello"
    END
.end
.fn second 0
    CONSTANT 2
    STORE_FIELD 1
    END
.end
"#;
    let (vm, result) = run(source);
    assert_eq!(vm.as_str(result.unwrap()), Some("hello"));

    let thing = vm.find_global("thing").unwrap();
    let base = vm.find_global("Base").unwrap().as_obj().unwrap();
    let derived = vm.find_global("Derived").unwrap().as_obj().unwrap();
    assert!(vm.is_instance(thing, derived).unwrap());
    assert!(vm.is_instance(thing, base).unwrap());
    assert!(vm.is_instance(thing, vm.classes().object).unwrap());
    assert_eq!(vm.display(thing).unwrap(), "instance of Derived");
}

#[test]
fn test_methods_bound_after_subclassing_are_not_inherited() {
    let source = "
.fn main 0
    CLASS 0
    STORE_GLOBAL Base
    SUBCLASS 0
    STORE_GLOBAL Derived
    POP
    LOAD_GLOBAL Base
    METHOD_INSTANCE late @late
    POP
    LOAD_GLOBAL Derived
    CALL_0 new
    CALL_0 late
    END
.end
.fn late 0
    NULL
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::DoesNotUnderstand));
}

#[test]
fn test_classes_named_by_first_global() {
    let source = "
.fn main 0
    CLASS 0
    STORE_GLOBAL Widget
    STORE_GLOBAL Alias
    CALL_0 name
    END
.end
";
    let (vm, result) = run(source);
    assert_eq!(vm.as_str(result.unwrap()), Some("Widget"));
}

#[test]
fn test_is_follows_superclass_chain() {
    let source = "
.fn main 0
    CONSTANT 1
    LOAD_GLOBAL Num
    IS
    CONSTANT 1
    LOAD_GLOBAL Object
    IS
    CONSTANT 1
    LOAD_GLOBAL String
    IS
    LIST 3
    END
.end
";
    let (vm, result) = run(source);
    assert_eq!(vm.display(result.unwrap()).unwrap(), "[true, true, false]");
}

#[test]
fn test_is_with_non_class_is_type_error() {
    let source = "
.fn main 0
    CONSTANT 1
    CONSTANT 2
    IS
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::TypeError));
}

#[test]
fn test_field_errors() {
    let source = "
.fn main 0
    CLASS 1
    METHOD_INSTANCE peek @peek
    CALL_0 new
    CALL_0 peek
    END
.end
.fn peek 0
    LOAD_FIELD 5
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::FieldOutOfRange));

    let source = "
.fn main 0
    CONSTANT 1
    LOAD_FIELD 0
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::TypeError));
}

// ============================================================================
// Control flow and calls
// ============================================================================

#[test]
fn test_loop_sums_list() {
    let source = "
.fn main 0
    CONSTANT 1
    CONSTANT 2
    CONSTANT 3
    CONSTANT 4
    LIST 4
    CONSTANT 0
    CONSTANT 0
top:
    LOAD_LOCAL 1
    LOAD_LOCAL 0
    CALL_0 count
    CALL_1 <
    JUMP_IF done
    LOAD_LOCAL 2
    LOAD_LOCAL 0
    LOAD_LOCAL 1
    CALL_1 []
    CALL_1 +
    STORE_LOCAL 2
    POP
    LOAD_LOCAL 1
    CONSTANT 1
    CALL_1 +
    STORE_LOCAL 1
    LOOP top
done:
    LOAD_LOCAL 2
    END
.end
";
    let (vm, result) = run(source);
    assert_eq!(result, Ok(Value::Num(10.0)));
    assert_eq!(vm.fiber().stack_len(), 0);
}

#[test]
fn test_recursive_static_method() {
    let source = "
.fn main 0
    CLASS 0
    METHOD_STATIC fib @fib
    STORE_GLOBAL Math
    CONSTANT 10
    CALL_1 fib
    END
.end
.fn fib 1
    LOAD_LOCAL 1
    CONSTANT 2
    CALL_1 <
    JUMP_IF recurse
    LOAD_LOCAL 1
    END
recurse:
    LOAD_GLOBAL Math
    LOAD_LOCAL 1
    CONSTANT 1
    CALL_1 -
    CALL_1 fib
    LOAD_GLOBAL Math
    LOAD_LOCAL 1
    CONSTANT 2
    CALL_1 -
    CALL_1 fib
    CALL_1 +
    END
.end
";
    let (vm, result) = run(source);
    assert_eq!(result, Ok(Value::Num(55.0)));
    assert_eq!(vm.fiber().depth(), 0);
}

#[test]
fn test_or_short_circuits() {
    let source = "
.fn main 0
    CONSTANT 7
    OR done
    NULL
    CALL_0 explode
done:
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(result, Ok(Value::Num(7.0)));

    let source = "
.fn main 0
    NULL
    OR done
    CONSTANT 8
done:
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(result, Ok(Value::Num(8.0)));
}

#[test]
fn test_function_call() {
    let source = "
.fn main 0
    CONSTANT @add
    CONSTANT 2
    CONSTANT 5
    CALL_2 call
    END
.end
.fn add 2
    LOAD_LOCAL 1
    LOAD_LOCAL 2
    CALL_1 +
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(result, Ok(Value::Num(7.0)));
}

#[test]
fn test_function_call_checks_arity() {
    let source = "
.fn main 0
    CONSTANT @add
    CONSTANT 2
    CALL_1 call
    END
.end
.fn add 2
    NULL
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::ArityMismatch));
}

#[test]
fn test_block_method_checks_arity() {
    let source = "
.fn main 0
    CLASS 0
    METHOD_STATIC pair @pair
    CONSTANT 1
    CALL_1 pair
    END
.end
.fn pair 2
    NULL
    END
.end
";
    let (_, result) = run(source);
    assert_eq!(runtime_kind(&result), Some(RuntimeErrorKind::ArityMismatch));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_runtime_error_carries_stack_trace() {
    let source = "
.fn main 0
    CLASS 0
    METHOD_STATIC boom @boom
    STORE_GLOBAL Thrower
    CALL_0 boom
    END
.end
.fn boom 0
    NULL
    CALL_0 missing
    END
.end
";
    let (vm, result) = run(source);
    let error = match result {
        Err(VmError::Runtime(error)) => error,
        other => panic!("expected a runtime error, got {:?}", other),
    };
    let names: Vec<&str> = error
        .stack
        .iter()
        .map(|frame| frame.function_name.as_str())
        .collect();
    assert_eq!(names, ["boom", "main"]);
    assert!(error.message.contains("missing"));
    assert!(vm.find_global("Thrower").is_some());
    assert_eq!(vm.fiber().depth(), 0);
}

#[test]
fn test_stack_overflow_is_fatal() {
    let config = VmConfig::default().with_max_stack_slots(16);
    let source = "
.fn main 0
top:
    NULL
    NULL
    LOOP top
    END
.end
";
    let (_, result) = run_with(config, source);
    let error = result.unwrap_err();
    assert!(error.is_fatal());
    assert!(matches!(error, VmError::Overflow { limit: 16, .. }));
}

// ============================================================================
// Collection pressure
// ============================================================================

#[test]
fn test_list_building_under_stress_collection() {
    let source = r#"
.fn main 0
    LIST 0
    CONSTANT 0
top:
    LOAD_LOCAL 1
    CONSTANT 50
    CALL_1 <
    JUMP_IF done
    LOAD_LOCAL 0
    LOAD_LOCAL 1
    CALL_0 toString
    CONSTANT "!"
    CALL_1 +
    CALL_1 add
    POP
    LOAD_LOCAL 1
    CONSTANT 1
    CALL_1 +
    STORE_LOCAL 1
    LOOP top
done:
    LOAD_LOCAL 0
    STORE_GLOBAL result
    END
.end
"#;
    let (mut vm, result) = run_with(stress(), source);
    result.unwrap();
    assert!(vm.gc_stats().collections > 0);

    vm.collect_garbage();
    let list = vm.find_global("result").unwrap().as_obj().unwrap();
    let elements = vm.heap().get(list).unwrap().as_list().unwrap().clone();
    assert_eq!(elements.len(), 50);
    assert_eq!(vm.as_str(elements[0]), Some("0!"));
    assert_eq!(vm.as_str(elements[49]), Some("49!"));
}

#[test]
fn test_unreachable_program_objects_are_freed() {
    let source = r#"
.fn main 0
    CONSTANT "one"
    CONSTANT "two"
    CALL_1 +
    POP
    NULL
    END
.end
"#;
    let (mut vm, result) = run(source);
    assert_eq!(result, Ok(Value::Null));
    let live = vm.heap().live_objects();
    let report = vm.collect_garbage();
    assert!(report.objects_freed >= 4);
    assert_eq!(vm.heap().live_objects(), live - report.objects_freed);
}
