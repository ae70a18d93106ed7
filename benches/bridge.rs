use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jvm_builtins::classfile::ClassFile;
use jvm_builtins::natives::array::arraycopy;
use jvm_builtins::natives::field::{get_field, set_field};
use jvm_builtins::natives::BuiltinRegistry;
use jvm_builtins::value::{Tag, Value};

#[path = "../tests/support/mod.rs"]
mod support;

use support::{ClassBuilder, ScriptedEngine};

fn sample_class() -> ClassBuilder {
    ClassBuilder::new("bench/Point")
        .field("x", "I")
        .field("y", "J")
        .field("label", "Ljava/lang/String;")
        .static_field("count", "I")
        .method_with_lines(support::ACC_PUBLIC, "move", "(IJ)V", 16, &[(0, 3), (8, 4)])
}

fn bench_classfile_parse(c: &mut Criterion) {
    let bytes = sample_class().build();
    c.bench_function("classfile_parse", |b| b.iter(|| ClassFile::parse(black_box(&bytes)).unwrap()));
}

fn bench_fields(c: &mut Criterion) {
    let engine = ScriptedEngine::new();
    let vm = support::builder(&engine).build().unwrap();
    let class = support::define(&vm, sample_class());
    let point = vm.new_instance(&class).unwrap();
    let x = class.find_field("x").unwrap();
    let y = class.find_field("y").unwrap();

    c.bench_function("field_set_int", |b| {
        b.iter(|| set_field(&vm, x, Some(point), black_box(Value::Int(7))).unwrap())
    });
    c.bench_function("field_set_widened", |b| {
        b.iter(|| set_field(&vm, y, Some(point), black_box(Value::Short(7))).unwrap())
    });
    c.bench_function("field_get_long", |b| b.iter(|| get_field(&vm, y, black_box(Some(point))).unwrap()));
}

fn bench_arraycopy(c: &mut Criterion) {
    let engine = ScriptedEngine::new();
    let vm = support::builder(&engine).build().unwrap();
    let ints = support::primitive_class(&vm, Tag::Int);
    let src = vm.new_array(ints, 4096).unwrap();
    let dst = vm.new_array(ints, 4096).unwrap();
    let strings = vm.new_array(vm.classes().well_known().string, 1024).unwrap();

    c.bench_function("arraycopy_int_4k", |b| {
        b.iter(|| arraycopy(&vm, Some(src), 0, Some(dst), 0, black_box(4096)).unwrap())
    });
    c.bench_function("arraycopy_int_overlap", |b| {
        b.iter(|| arraycopy(&vm, Some(src), 0, Some(src), 1, black_box(4095)).unwrap())
    });
    c.bench_function("arraycopy_refs_1k", |b| {
        b.iter(|| arraycopy(&vm, Some(strings), 0, Some(strings), 0, black_box(1024)).unwrap())
    });
}

fn bench_registry(c: &mut Criterion) {
    let registry = BuiltinRegistry::bootstrap();
    c.bench_function("registry_lookup_hit", |b| {
        b.iter(|| registry.lookup(black_box("Java_java_lang_reflect_Field_get")).unwrap())
    });
    c.bench_function("registry_lookup_miss", |b| {
        b.iter(|| registry.lookup(black_box("Java_java_lang_Object_clone")))
    });
}

criterion_group!(benches, bench_classfile_parse, bench_fields, bench_arraycopy, bench_registry);
criterion_main!(benches);
