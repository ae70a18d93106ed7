#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jvm_builtins::class::{Class, Method};
use jvm_builtins::exception::{JavaResult, Throwable};
use jvm_builtins::heap::ObjectRef;
use jvm_builtins::natives::NativeFn;
use jvm_builtins::thread::Thread;
use jvm_builtins::value::{self, Tag, Value};
use jvm_builtins::vm::{Engine, Vm, VmBuilder};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_NATIVE: u16 = 0x0100;

// =============================================================================
// Class-file bytes
// =============================================================================

struct CpBuilder {
    entries: Vec<Vec<u8>>,
    count: u16,
}

impl CpBuilder {
    fn new() -> Self {
        Self { entries: Vec::new(), count: 0 }
    }

    fn push(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        self.entries.push(entry);
        self.count += slots;
        self.count - slots + 1
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.push(entry, 1)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry, 1)
    }

    fn constant(&mut self, constant: &Constant) -> u16 {
        match constant {
            Constant::Int(v) => self.push(tagged(3, &v.to_be_bytes()), 1),
            Constant::Float(v) => self.push(tagged(4, &v.to_bits().to_be_bytes()), 1),
            Constant::Long(v) => self.push(tagged(5, &v.to_be_bytes()), 2),
            Constant::Double(v) => self.push(tagged(6, &v.to_bits().to_be_bytes()), 2),
            Constant::String(s) => {
                let string_index = self.utf8(s);
                self.push(tagged(8, &string_index.to_be_bytes()), 1)
            }
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        u2(out, self.count + 1);
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

fn tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut entry = vec![tag];
    entry.extend_from_slice(payload);
    entry
}

fn u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_attr(out: &mut Vec<u8>, name_index: u16, info: &[u8]) {
    u2(out, name_index);
    u4(out, info.len() as u32);
    out.extend_from_slice(info);
}

#[derive(Debug, Clone)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
}

struct FieldSpec {
    flags: u16,
    name: String,
    descriptor: String,
    constant: Option<Constant>,
}

struct MethodSpec {
    flags: u16,
    name: String,
    descriptor: String,
    code: Option<(Vec<u8>, Vec<(u16, u16)>)>,
}

/// Builds minimal but valid class files.
pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    flags: u16,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    source_file: Option<String>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            super_name: Some("java/lang/Object".to_owned()),
            interfaces: Vec::new(),
            flags: ACC_PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_owned());
        self
    }

    /// No superclass, like `java/lang/Object`.
    pub fn root(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_owned());
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldSpec {
            flags: ACC_PUBLIC,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            constant: None,
        });
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldSpec {
            flags: ACC_PUBLIC | ACC_STATIC,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            constant: None,
        });
        self
    }

    pub fn constant(mut self, name: &str, descriptor: &str, value: Constant) -> Self {
        self.fields.push(FieldSpec {
            flags: ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            constant: Some(value),
        });
        self
    }

    pub fn method(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        let code = (flags & ACC_NATIVE == 0).then(|| (vec![0xb1], Vec::new()));
        self.methods.push(MethodSpec {
            flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            code,
        });
        self
    }

    /// A method with `code_len` bytes of code and a line-number table.
    pub fn method_with_lines(
        mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        code_len: usize,
        lines: &[(u16, u16)],
    ) -> Self {
        self.methods.push(MethodSpec {
            flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            code: Some((vec![0; code_len], lines.to_vec())),
        });
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(name.to_owned());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut cp = CpBuilder::new();
        let this_class = cp.class(&self.name);
        let super_class = self.super_name.as_deref().map_or(0, |s| cp.class(s));
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| cp.class(i)).collect();
        let utf_code = cp.utf8("Code");
        let utf_lines = cp.utf8("LineNumberTable");
        let utf_constant = cp.utf8("ConstantValue");
        let utf_source = cp.utf8("SourceFile");

        let mut body = Vec::new();
        u2(&mut body, self.flags);
        u2(&mut body, this_class);
        u2(&mut body, super_class);
        u2(&mut body, interfaces.len() as u16);
        for i in &interfaces {
            u2(&mut body, *i);
        }

        u2(&mut body, self.fields.len() as u16);
        for f in &self.fields {
            u2(&mut body, f.flags);
            u2(&mut body, cp.utf8(&f.name));
            u2(&mut body, cp.utf8(&f.descriptor));
            match &f.constant {
                Some(c) => {
                    u2(&mut body, 1);
                    let index = cp.constant(c);
                    push_attr(&mut body, utf_constant, &index.to_be_bytes());
                }
                None => u2(&mut body, 0),
            }
        }

        u2(&mut body, self.methods.len() as u16);
        for m in &self.methods {
            u2(&mut body, m.flags);
            u2(&mut body, cp.utf8(&m.name));
            u2(&mut body, cp.utf8(&m.descriptor));
            match &m.code {
                Some((code, lines)) => {
                    u2(&mut body, 1);
                    let mut info = Vec::new();
                    u2(&mut info, 4);
                    u2(&mut info, 4);
                    u4(&mut info, code.len() as u32);
                    info.extend_from_slice(code);
                    u2(&mut info, 0);
                    if lines.is_empty() {
                        u2(&mut info, 0);
                    } else {
                        u2(&mut info, 1);
                        let mut table = Vec::new();
                        u2(&mut table, lines.len() as u16);
                        for (pc, line) in lines {
                            u2(&mut table, *pc);
                            u2(&mut table, *line);
                        }
                        push_attr(&mut info, utf_lines, &table);
                    }
                    push_attr(&mut body, utf_code, &info);
                }
                None => u2(&mut body, 0),
            }
        }

        match &self.source_file {
            Some(file) => {
                u2(&mut body, 1);
                let index = cp.utf8(file);
                push_attr(&mut body, utf_source, &index.to_be_bytes());
            }
            None => u2(&mut body, 0),
        }

        let mut out = Vec::new();
        u4(&mut out, 0xCAFE_BABE);
        u2(&mut out, 0);
        u2(&mut out, 52);
        cp.write(&mut out);
        out.extend_from_slice(&body);
        out
    }
}

// =============================================================================
// Scripted engine
// =============================================================================

type Script = Arc<dyn Fn(&mut Thread, Option<ObjectRef>, &[Value]) -> JavaResult<Value> + Send + Sync>;

/// Engine that runs closures registered per `class.method` and records
/// every call. Methods without a script return their kind's zero.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        class: &str,
        method: &str,
        script: impl Fn(&mut Thread, Option<ObjectRef>, &[Value]) -> JavaResult<Value> + Send + Sync + 'static,
    ) {
        self.scripts.lock().unwrap().insert(format!("{class}.{method}"), Arc::new(script));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Engine for ScriptedEngine {
    fn invoke(
        &self,
        thread: &mut Thread,
        method: &Arc<Method>,
        receiver: Option<ObjectRef>,
        args: &[Value],
    ) -> JavaResult<Value> {
        let class = thread.vm().classes().class(method.class);
        let key = format!("{}.{}", class.name, method.name);
        self.calls.lock().unwrap().push(key.clone());
        let script = self.scripts.lock().unwrap().get(&key).cloned();
        let Some(script) = script else {
            return Ok(zero(method.return_tag));
        };
        thread.push_frame(method.clone());
        let result = script(thread, receiver, args);
        thread.pop_frame();
        result
    }
}

pub fn zero(tag: Option<Tag>) -> Value {
    match tag {
        Some(tag) if tag.is_primitive() => value::load(tag, &[0; 8]).unwrap(),
        _ => Value::NULL,
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn vm() -> (Arc<Vm>, ScriptedEngine) {
    let engine = ScriptedEngine::new();
    (builder(&engine).build().unwrap(), engine)
}

pub fn builder(engine: &ScriptedEngine) -> VmBuilder {
    Vm::builder().engine(engine.clone())
}

pub fn define(vm: &Vm, class: ClassBuilder) -> Arc<Class> {
    vm.define_class(&class.build()).unwrap()
}

pub fn builtin(vm: &Vm, symbol: &str) -> NativeFn {
    vm.registry().lookup(symbol).unwrap_or_else(|| panic!("no builtin {symbol}"))
}

/// Runs a builtin through the native-call adapter and turns the pending
/// exception back into an error.
pub fn call(thread: &mut Thread, symbol: &str, args: &[Value]) -> Result<Value, Throwable> {
    let native = builtin(thread.vm(), symbol);
    let value = thread.call_native(native, args);
    match thread.take_pending_exception() {
        Some(exception) => Err(exception),
        None => Ok(value),
    }
}

pub fn reference(value: Value) -> ObjectRef {
    value.as_reference().flatten().expect("non-null reference")
}

pub fn string(vm: &Vm, s: &str) -> Value {
    Value::Reference(Some(vm.new_string(s)))
}

pub fn unboxed(vm: &Vm, value: Value) -> Value {
    vm.heap().read().unbox(value)
}

pub fn boxed(vm: &Vm, value: Value) -> Value {
    vm.box_value(value)
}

pub fn primitive_class(vm: &Vm, tag: Tag) -> jvm_builtins::class::ClassId {
    vm.classes().well_known().primitive_class(Some(tag))
}

/// A `byte[]` holding `bytes`.
pub fn byte_array(vm: &Vm, bytes: &[u8]) -> ObjectRef {
    let array = vm.new_array(primitive_class(vm, Tag::Byte), bytes.len() as i32).unwrap();
    for (i, b) in bytes.iter().enumerate() {
        jvm_builtins::natives::array::array_store(vm, Some(array), i as i32, Value::Byte(*b as i8))
            .unwrap();
    }
    array
}

/// An `Object[]` holding `values` (boxed as needed).
pub fn object_array(vm: &Vm, values: &[Value]) -> ObjectRef {
    let object = vm.classes().well_known().object;
    let array = vm.new_array(object, values.len() as i32).unwrap();
    for (i, v) in values.iter().enumerate() {
        let v = vm.box_value(*v);
        jvm_builtins::natives::array::array_store(vm, Some(array), i as i32, v).unwrap();
    }
    array
}

pub fn sample(tag: Tag) -> Value {
    match tag {
        Tag::Byte => Value::Byte(-7),
        Tag::Boolean => Value::Boolean(true),
        Tag::Char => Value::Char(0x263A),
        Tag::Short => Value::Short(-300),
        Tag::Float => Value::Float(1.5),
        Tag::Double => Value::Double(-2.25),
        Tag::Int => Value::Int(123_456),
        Tag::Long => Value::Long(-9_000_000_000),
        Tag::Object => Value::NULL,
    }
}
