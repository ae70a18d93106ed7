mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jvm_builtins::class::{Class, Method};
use jvm_builtins::exception::{ExceptionKind, Throwable};
use jvm_builtins::heap::Mirror;
use jvm_builtins::natives::reflect::invoke;
use jvm_builtins::value::Value;
use jvm_builtins::vm::Vm;
use support::*;

fn calc(vm: &Vm) -> Arc<Class> {
    define(
        vm,
        ClassBuilder::new("test/Calc")
            .method(ACC_PUBLIC | ACC_STATIC, "add", "(IJ)J")
            .method(ACC_PUBLIC, "scale", "(I)J")
            .method(ACC_PUBLIC | ACC_STATIC, "fail", "()V")
            .method(ACC_PUBLIC | ACC_STATIC, "touch", "(Ljava/lang/Object;)V")
            .method(ACC_PUBLIC | ACC_STATIC, "flag", "(Z)Z"),
    )
}

fn method(class: &Class, name: &str) -> Arc<Method> {
    class.methods.iter().find(|m| m.name == name).cloned().unwrap()
}

fn script_calc(engine: &ScriptedEngine) {
    engine.on("test/Calc", "add", |_, receiver, args| {
        assert!(receiver.is_none());
        match args {
            [Value::Int(a), Value::Long(b)] => Ok(Value::Long(i64::from(*a) + b)),
            other => panic!("unexpected arguments {other:?}"),
        }
    });
    engine.on("test/Calc", "scale", |_, receiver, args| {
        assert!(receiver.is_some());
        match args {
            [Value::Int(a)] => Ok(Value::Long(i64::from(*a) * 2)),
            other => panic!("unexpected arguments {other:?}"),
        }
    });
    engine.on("test/Calc", "fail", |_, _, _| {
        Err(Throwable::thrown("java/lang/IllegalStateException").with_message("boom"))
    });
}

#[test]
fn static_call_unboxes_widens_and_boxes() {
    let (vm, engine) = vm();
    script_calc(&engine);
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);

    let args = object_array(&vm, &[Value::Short(40), Value::Int(2)]);
    let result = invoke(&mut thread, &method(&class, "add"), None, Some(args)).unwrap();
    assert_eq!(unboxed(&vm, result), Value::Long(42));
    assert_ne!(result, Value::Long(42));
    assert_eq!(engine.calls(), vec!["test/Calc.add"]);
}

#[test]
fn instance_call_passes_the_receiver() {
    let (vm, engine) = vm();
    script_calc(&engine);
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);
    let receiver = vm.new_instance(&class).unwrap();

    let args = object_array(&vm, &[Value::Char(21)]);
    let result = invoke(&mut thread, &method(&class, "scale"), Some(receiver), Some(args)).unwrap();
    assert_eq!(unboxed(&vm, result), Value::Long(42));
}

#[test]
fn argument_problems_never_reach_the_engine() {
    let (vm, engine) = vm();
    script_calc(&engine);
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);
    let add = method(&class, "add");
    let scale = method(&class, "scale");

    let err = invoke(&mut thread, &add, None, None).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::NullPointer);

    let one = object_array(&vm, &[Value::Int(1)]);
    let err = invoke(&mut thread, &add, None, Some(one)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::WrongArgumentCount);
    assert_eq!(err.kind().class_name(), "java/lang/IllegalArgumentException");

    let err = invoke(&mut thread, &scale, None, Some(one)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::NullPointer);

    let stranger = vm.new_string("not a Calc");
    let err = invoke(&mut thread, &scale, Some(stranger), Some(one)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);

    let with_null = object_array(&vm, &[Value::NULL, Value::Int(2)]);
    let err = invoke(&mut thread, &add, None, Some(with_null)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);

    let narrowing = object_array(&vm, &[Value::Long(1), Value::Long(2)]);
    let err = invoke(&mut thread, &add, None, Some(narrowing)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);

    let not_boolean = object_array(&vm, &[Value::Int(1)]);
    let err = invoke(&mut thread, &method(&class, "flag"), None, Some(not_boolean)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);

    assert!(engine.calls().is_empty());
}

#[test]
fn null_reference_arguments_are_passed_through() {
    let (vm, engine) = vm();
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);

    let args = object_array(&vm, &[Value::NULL]);
    let result = invoke(&mut thread, &method(&class, "touch"), None, Some(args)).unwrap();
    assert_eq!(result, Value::NULL);
    assert_eq!(engine.calls(), vec!["test/Calc.touch"]);
}

#[test]
fn target_failures_are_wrapped() {
    let (vm, engine) = vm();
    script_calc(&engine);
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);

    let args = object_array(&vm, &[]);
    let err = invoke(&mut thread, &method(&class, "fail"), None, Some(args)).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::InvocationTarget);
    let cause = err.cause().unwrap();
    assert_eq!(cause.kind().class_name(), "java/lang/IllegalStateException");
    assert_eq!(cause.message(), Some("boom"));
    assert!(thread.frames().is_empty());
}

#[test]
fn static_targets_initialize_their_class_once() {
    let (vm, engine) = vm();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    engine.on("test/Init", "<clinit>", move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::NULL)
    });
    let class = define(
        &vm,
        ClassBuilder::new("test/Init")
            .method(ACC_STATIC, "<clinit>", "()V")
            .method(ACC_PUBLIC | ACC_STATIC, "get", "()I"),
    );
    let mut thread = vm.attach_current_thread(None);

    for _ in 0..2 {
        let args = object_array(&vm, &[]);
        let result = invoke(&mut thread, &method(&class, "get"), None, Some(args)).unwrap();
        assert_eq!(unboxed(&vm, result), Value::Int(0));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(engine.calls(), vec!["test/Init.<clinit>", "test/Init.get", "test/Init.get"]);
}

#[test]
fn failing_initializer_is_not_wrapped() {
    let (vm, engine) = vm();
    engine.on("test/Broken", "<clinit>", |_, _, _| {
        Err(Throwable::thrown("java/lang/ExceptionInInitializerError"))
    });
    let class = define(
        &vm,
        ClassBuilder::new("test/Broken")
            .method(ACC_STATIC, "<clinit>", "()V")
            .method(ACC_PUBLIC | ACC_STATIC, "get", "()I"),
    );
    let mut thread = vm.attach_current_thread(None);

    let args = object_array(&vm, &[]);
    let err = invoke(&mut thread, &method(&class, "get"), None, Some(args)).unwrap_err();
    assert_eq!(err.kind().class_name(), "java/lang/ExceptionInInitializerError");
    assert_eq!(engine.calls(), vec!["test/Broken.<clinit>"]);
}

#[test]
fn method_invoke_native() {
    let (vm, engine) = vm();
    script_calc(&engine);
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);
    let mirror = Value::Reference(Some(vm.method_mirror(&method(&class, "add"))));

    let args = Value::Reference(Some(object_array(&vm, &[Value::Int(1), Value::Long(2)])));
    let result = call(&mut thread, "Java_java_lang_reflect_Method_invoke", &[mirror, Value::NULL, args]).unwrap();
    assert_eq!(unboxed(&vm, result), Value::Long(3));

    let not_a_method = string(&vm, "add");
    let err = call(&mut thread, "Java_java_lang_reflect_Method_invoke", &[not_a_method, Value::NULL, args])
        .unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);
}

#[test]
fn get_caller_looks_two_frames_down() {
    let (vm, _) = vm();
    let class = calc(&vm);
    let mut thread = vm.attach_current_thread(None);
    let outer = method(&class, "add");

    thread.push_frame(method(&class, "scale"));
    thread.push_frame(method(&class, "fail"));
    let none = call(&mut thread, "Java_java_lang_reflect_Method_getCaller", &[]).unwrap();
    assert_eq!(none, Value::NULL);

    thread.pop_frame();
    thread.pop_frame();
    thread.push_frame(outer.clone());
    thread.push_frame(method(&class, "scale"));
    thread.push_frame(method(&class, "fail"));
    let caller = call(&mut thread, "Java_java_lang_reflect_Method_getCaller", &[]).unwrap();
    let heap = vm.heap().read();
    match heap.object(reference(caller)).as_mirror() {
        Some(Mirror::Method(m)) => assert!(Arc::ptr_eq(m, &outer)),
        other => panic!("not a method mirror: {other:?}"),
    }
}

#[test]
fn constructor_make_allocates_zeroed_instances() {
    let (vm, engine) = vm();
    let class = define(&vm, ClassBuilder::new("test/Point").field("x", "I").field("label", "Ljava/lang/String;"));
    let mut thread = vm.attach_current_thread(None);
    let mirror = Value::Reference(Some(vm.class_mirror(class.id)));

    for symbol in ["Java_java_lang_reflect_Constructor_make", "Java_java_io_ObjectInputStream_makeInstance"] {
        let made = reference(call(&mut thread, symbol, &[mirror]).unwrap());
        assert_eq!(vm.heap().read().class_of(made), class.id);
    }
    assert!(engine.calls().is_empty());

    let int_class = Value::Reference(Some(vm.class_mirror(primitive_class(&vm, jvm_builtins::Tag::Int))));
    let err = call(&mut thread, "Java_java_lang_reflect_Constructor_make", &[int_class]).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::IllegalArgument);
}
