mod support;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use jvm_builtins::class::Method;
use jvm_builtins::exception::ExceptionKind;
use jvm_builtins::heap::{ArrayBody, Mirror, ObjectBody, StackTraceElement};
use jvm_builtins::value::{Tag, Value};
use jvm_builtins::vm::{Host, Vm};
use support::*;

fn class_mirror_name(vm: &Vm, value: Value) -> String {
    let heap = vm.heap().read();
    match heap.object(reference(value)).as_mirror() {
        Some(Mirror::Class(id)) => vm.classes().class(*id).name.to_string(),
        other => panic!("not a class mirror: {other:?}"),
    }
}

#[test]
fn primitive_classes_by_descriptor() {
    let (vm, _) = vm();
    let mut thread = vm.attach_current_thread(None);
    let cases = [
        ('V', "void"),
        ('B', "byte"),
        ('Z', "boolean"),
        ('C', "char"),
        ('S', "short"),
        ('F', "float"),
        ('D', "double"),
        ('I', "int"),
        ('J', "long"),
    ];
    for (descriptor, name) in cases {
        let mirror = call(
            &mut thread,
            "Java_java_lang_Class_primitiveClass",
            &[Value::Char(descriptor as u16)],
        )
        .unwrap();
        assert_eq!(class_mirror_name(&vm, mirror), name);
    }

    let again = call(&mut thread, "Java_java_lang_Class_primitiveClass", &[Value::Char('I' as u16)]).unwrap();
    let int_mirror = vm.class_mirror(primitive_class(&vm, Tag::Int));
    assert_eq!(again, Value::Reference(Some(int_mirror)));

    for bad in ['L', 'X', '[', '\u{263A}'] {
        let err = call(&mut thread, "Java_java_lang_Class_primitiveClass", &[Value::Char(bad as u16)])
            .unwrap_err();
        assert_eq!(*err.kind(), ExceptionKind::IllegalArgument, "{bad}");
    }
}

#[test]
fn is_assignable_from() {
    let (vm, _) = vm();
    define(&vm, ClassBuilder::new("test/Shape").flags(ACC_PUBLIC | 0x0200 | 0x0400));
    let base = define(&vm, ClassBuilder::new("test/Base").implements("test/Shape"));
    let derived = define(&vm, ClassBuilder::new("test/Derived").extends("test/Base"));
    let mut thread = vm.attach_current_thread(None);

    let mirror = |name: &str| Value::Reference(Some(vm.class_mirror(vm.classes().find(name).unwrap().id)));
    let object = mirror("java/lang/Object");
    let shape = mirror("test/Shape");
    let base_m = Value::Reference(Some(vm.class_mirror(base.id)));
    let derived_m = Value::Reference(Some(vm.class_mirror(derived.id)));
    let int_m = Value::Reference(Some(vm.class_mirror(primitive_class(&vm, Tag::Int))));

    let mut check = |target: Value, source: Value| {
        call(&mut thread, "Java_java_lang_Class_isAssignableFrom", &[target, source]).unwrap()
    };
    assert_eq!(check(base_m, derived_m), Value::Boolean(true));
    assert_eq!(check(derived_m, base_m), Value::Boolean(false));
    assert_eq!(check(object, derived_m), Value::Boolean(true));
    assert_eq!(check(shape, derived_m), Value::Boolean(true));
    assert_eq!(check(int_m, int_m), Value::Boolean(true));
    assert_eq!(check(object, int_m), Value::Boolean(false));

    let err = call(&mut thread, "Java_java_lang_Class_isAssignableFrom", &[base_m, Value::NULL]).unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::NullPointer);
}

#[test]
fn class_initialize_runs_superclass_first() {
    let (vm, engine) = vm();
    let parent = ClassBuilder::new("test/Parent").method(ACC_STATIC, "<clinit>", "()V");
    define(&vm, parent);
    let child = define(
        &vm,
        ClassBuilder::new("test/Kid").extends("test/Parent").method(ACC_STATIC, "<clinit>", "()V"),
    );
    let mut thread = vm.attach_current_thread(None);
    let mirror = Value::Reference(Some(vm.class_mirror(child.id)));

    call(&mut thread, "Java_java_lang_Class_initialize", &[mirror]).unwrap();
    call(&mut thread, "Java_java_lang_Class_initialize", &[mirror]).unwrap();
    assert_eq!(engine.calls(), vec!["test/Parent.<clinit>", "test/Kid.<clinit>"]);
}

#[test]
fn object_identity_natives() {
    let (vm, _) = vm();
    let class = define(&vm, ClassBuilder::new("test/Thing"));
    let mut thread = vm.attach_current_thread(None);
    let thing = Value::Reference(Some(vm.new_instance(&class).unwrap()));

    let hash = call(&mut thread, "Java_java_lang_Object_hashCode", &[thing]).unwrap();
    let identity = call(&mut thread, "Java_java_lang_System_identityHashCode", &[thing]).unwrap();
    assert_eq!(hash, identity);
    let Value::Int(hash) = hash else { panic!("hashCode is not an int") };
    assert!(hash >= 0);

    let text = call(&mut thread, "Java_java_lang_Object_toString", &[thing]).unwrap();
    assert_eq!(vm.string_value(reference(text)).unwrap(), format!("test.Thing@{hash:x}"));

    let class_mirror = call(&mut thread, "Java_java_lang_Object_getClass", &[thing]).unwrap();
    assert_eq!(class_mirror, Value::Reference(Some(vm.class_mirror(class.id))));

    for symbol in ["Java_java_lang_Object_hashCode", "Java_java_lang_Object_toString"] {
        let err = call(&mut thread, symbol, &[Value::NULL]).unwrap_err();
        assert_eq!(*err.kind(), ExceptionKind::NullPointer);
    }
}

#[test]
fn intern_returns_the_canonical_string() {
    let (vm, _) = vm();
    let mut thread = vm.attach_current_thread(None);
    let a = string(&vm, "same");
    let b = string(&vm, "same");
    assert_ne!(a, b);

    let ia = call(&mut thread, "Java_java_lang_String_intern", &[a]).unwrap();
    let ib = call(&mut thread, "Java_java_lang_String_intern", &[b]).unwrap();
    assert_eq!(ia, ib);
    assert_eq!(ia, Value::Reference(Some(vm.intern("same"))));
}

#[test]
fn load_library_reports_missing_libraries() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new();
    let vm = builder(&engine).library_path(dir.path()).build().unwrap();
    let mut thread = vm.attach_current_thread(None);

    let err = call(
        &mut thread,
        "Java_java_lang_Runtime_loadLibrary",
        &[Value::NULL, string(&vm, "nosuchlib")],
    )
    .unwrap_err();
    assert_eq!(*err.kind(), ExceptionKind::Runtime);
    assert_eq!(err.message(), Some("library not found: nosuchlib"));
    assert!(!vm.libraries().is_loaded("nosuchlib"));
}

#[test]
fn free_memory_shrinks_with_allocation() {
    let engine = ScriptedEngine::new();
    let vm = builder(&engine).max_heap_bytes(1 << 20).build().unwrap();
    let mut thread = vm.attach_current_thread(None);

    let Value::Long(before) = call(&mut thread, "Java_java_lang_Runtime_freeMemory", &[Value::NULL]).unwrap()
    else {
        panic!("freeMemory is not a long")
    };
    assert!(before > 0 && before <= 1 << 20);
    byte_array(&vm, &[0; 4096]);
    let Value::Long(after) = call(&mut thread, "Java_java_lang_Runtime_freeMemory", &[Value::NULL]).unwrap()
    else {
        panic!("freeMemory is not a long")
    };
    assert!(after <= before - 4096);
}

struct ExitRecorder(Arc<AtomicI32>);

impl Host for ExitRecorder {
    fn start(&self, _name: &str, _stack: Option<usize>, _body: Box<dyn FnOnce() + Send>) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "no threads here"))
    }

    fn exit(&self, code: i32) -> ! {
        self.0.store(code, Ordering::SeqCst);
        panic!("exit({code})")
    }
}

#[test]
fn exit_goes_through_the_host() {
    let code = Arc::new(AtomicI32::new(-1));
    let engine = ScriptedEngine::new();
    let vm = builder(&engine).host(ExitRecorder(code.clone())).build().unwrap();
    let mut thread = vm.attach_current_thread(None);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        call(&mut thread, "Java_java_lang_Runtime_exit", &[Value::NULL, Value::Int(3)])
    }));
    assert!(outcome.is_err());
    assert_eq!(code.load(Ordering::SeqCst), 3);
}

#[test]
fn stack_traces_skip_throwable_constructors() {
    let (vm, _) = vm();
    let class = define(
        &vm,
        ClassBuilder::new("test/Trace")
            .source_file("Trace.java")
            .method_with_lines(ACC_PUBLIC | ACC_STATIC, "main", "()V", 8, &[(0, 10), (4, 12)])
            .method_with_lines(ACC_PUBLIC | ACC_STATIC, "helper", "()V", 4, &[(0, 20)])
            .method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "poke", "()V"),
    );
    let find = |name: &str| class.methods.iter().find(|m| m.name == name).cloned().unwrap();
    let throwable = vm.classes().well_known().throwable;
    let init = Arc::new(Method::new(throwable, "<init>", "()V", ACC_PUBLIC).unwrap());

    let mut thread = vm.attach_current_thread(None);
    thread.push_frame(find("main"));
    thread.set_ip(5);
    thread.push_frame(find("helper"));
    thread.set_ip(2);
    thread.push_frame(init.clone());
    thread.push_frame(init);

    let trace = call(&mut thread, "Java_java_lang_Throwable_trace", &[Value::Int(0)]).unwrap();
    let resolved = call(&mut thread, "Java_java_lang_Throwable_resolveTrace", &[trace]).unwrap();

    let heap = vm.heap().read();
    let elements: Vec<StackTraceElement> = match heap.object(reference(resolved)).as_array() {
        Some(ArrayBody::References(slots)) => slots
            .iter()
            .map(|slot| match &heap.object(slot.unwrap()).body {
                ObjectBody::StackTraceElement(e) => e.clone(),
                other => panic!("not a StackTraceElement: {other:?}"),
            })
            .collect(),
        other => panic!("not a reference array: {other:?}"),
    };
    let element = |method: &str, line| StackTraceElement {
        declaring_class: "test.Trace".into(),
        method_name: method.into(),
        file_name: Some("Trace.java".into()),
        line_number: line,
    };
    assert_eq!(elements, vec![element("helper", 20), element("main", 12)]);
}

#[test]
fn stack_trace_skip_count_and_native_frames() {
    let (vm, _) = vm();
    let class = define(
        &vm,
        ClassBuilder::new("test/Deep")
            .method(ACC_PUBLIC | ACC_STATIC, "a", "()V")
            .method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "b", "()V")
            .method(ACC_PUBLIC | ACC_STATIC, "c", "()V"),
    );
    let mut thread = vm.attach_current_thread(None);
    for m in &class.methods {
        thread.push_frame(m.clone());
    }

    let trace = jvm_builtins::natives::trace::capture(&thread, 1);
    let names: Vec<&str> = trace.iter().map(|e| e.method.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
    let resolved = jvm_builtins::natives::trace::resolve(&vm, &trace);
    assert_eq!(resolved[0].line_number, -2);
    assert_eq!(resolved[1].line_number, -1);
    assert_eq!(resolved[1].file_name, None);

    assert!(jvm_builtins::natives::trace::capture(&thread, 3).is_empty());
    assert!(jvm_builtins::natives::trace::capture(&thread, 10).is_empty());
}
