//! Native methods and their registry.
//!
//! Every builtin is a [`NativeFn`]: it receives the calling thread and the
//! call's arguments (receiver first for instance methods; static methods
//! get no class argument) and returns a value or the exception to leave
//! pending. [`BuiltinRegistry`] maps JNI-style symbols to builtins and is
//! built once from [`BUILTINS`]; [`NativeResolver`] links a declared native
//! method to a builtin or to a symbol exported by a loaded library.

pub mod array;
pub mod class_loader;
pub mod field;
pub mod lang;
pub mod mangle;
pub mod reflect;
pub mod resource;
pub mod thread;
pub mod trace;

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::class::{Class, ClassId, Method};
use crate::exception::{JavaResult, Throwable};
use crate::heap::{Heap, Mirror, ObjectRef};
use crate::library::NativeLibraries;
use crate::thread::Thread;
use crate::value::Value;

/// Entry point of a builtin native method.
pub type NativeFn = fn(&mut Thread, &Arguments<'_>) -> JavaResult<Value>;

/// What a native method is linked to.
#[derive(Clone, Copy)]
pub enum NativeLink {
    Builtin(NativeFn),
    /// Address of a symbol exported by a loaded library. Calling it is the
    /// execution engine's business.
    External(usize),
}

impl fmt::Debug for NativeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeLink::Builtin(native) => write!(f, "Builtin({:#x})", *native as usize),
            NativeLink::External(address) => write!(f, "External({address:#x})"),
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Typed view over the argument values of a native call.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &'a [Value] {
        self.values
    }

    pub fn get(&self, index: usize) -> JavaResult<Value> {
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| Throwable::illegal_argument(format!("missing argument {index}")))
    }

    /// A nullable reference argument.
    pub fn reference(&self, index: usize) -> JavaResult<Option<ObjectRef>> {
        self.get(index)?.as_reference().ok_or_else(|| mismatch(index, "reference"))
    }

    /// A reference argument that must not be null.
    pub fn object(&self, index: usize) -> JavaResult<ObjectRef> {
        self.reference(index)?.ok_or_else(Throwable::null_pointer)
    }

    pub fn int(&self, index: usize) -> JavaResult<i32> {
        match self.get(index)? {
            Value::Int(v) => Ok(v),
            Value::Short(v) => Ok(v.into()),
            Value::Byte(v) => Ok(v.into()),
            Value::Char(v) => Ok(v.into()),
            _ => Err(mismatch(index, "int")),
        }
    }

    pub fn long(&self, index: usize) -> JavaResult<i64> {
        match self.get(index)? {
            Value::Long(v) => Ok(v),
            Value::Int(v) => Ok(v.into()),
            _ => Err(mismatch(index, "long")),
        }
    }

    pub fn char(&self, index: usize) -> JavaResult<u16> {
        match self.get(index)? {
            Value::Char(v) => Ok(v),
            _ => Err(mismatch(index, "char")),
        }
    }
}

fn mismatch(index: usize, expected: &str) -> Throwable {
    Throwable::illegal_argument(format!("argument {index} is not a {expected}"))
}

// =============================================================================
// Mirror helpers
// =============================================================================

pub(crate) fn class_of_mirror(heap: &Heap, mirror: ObjectRef) -> JavaResult<ClassId> {
    match heap.object(mirror).as_mirror() {
        Some(Mirror::Class(id)) => Ok(*id),
        _ => Err(Throwable::illegal_argument("not a java.lang.Class")),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// The compiled-in builtin table.
pub static BUILTINS: &[(&str, NativeFn)] = &[
    ("Java_java_lang_Class_isAssignableFrom", lang::class_is_assignable_from),
    ("Java_java_lang_Class_primitiveClass", lang::class_primitive_class),
    ("Java_java_lang_Class_initialize", lang::class_initialize),
    ("Java_java_lang_ClassLoader_defineClass", class_loader::define_class),
    ("Java_java_lang_System_arraycopy", array::system_arraycopy),
    ("Java_java_lang_System_identityHashCode", lang::system_identity_hash_code),
    ("Java_java_lang_SystemClassLoader_findClass", class_loader::find_class),
    ("Java_java_lang_SystemClassLoader_findLoadedClass", class_loader::find_loaded_class),
    ("Java_java_lang_SystemClassLoader_resourceExists", class_loader::resource_exists),
    ("Java_java_lang_Runtime_loadLibrary", lang::runtime_load_library),
    ("Java_java_lang_Runtime_gc", lang::runtime_gc),
    ("Java_java_lang_Runtime_exit", lang::runtime_exit),
    ("Java_java_lang_Runtime_freeMemory", lang::runtime_free_memory),
    ("Java_java_lang_String_intern", lang::string_intern),
    ("Java_java_lang_Thread_doStart", thread::thread_do_start),
    ("Java_java_lang_Thread_interrupt", thread::thread_interrupt),
    ("Java_java_lang_Thread_currentThread", thread::thread_current_thread),
    ("Java_java_lang_Throwable_resolveTrace", trace::throwable_resolve_trace),
    ("Java_java_lang_Throwable_trace", trace::throwable_trace),
    ("Java_java_lang_Object_getClass", lang::object_get_class),
    ("Java_java_lang_Object_notify", thread::object_notify),
    ("Java_java_lang_Object_notifyAll", thread::object_notify_all),
    ("Java_java_lang_Object_toString", lang::object_to_string),
    ("Java_java_lang_Object_wait", thread::object_wait),
    ("Java_java_lang_Object_hashCode", lang::object_hash_code),
    ("Java_java_lang_reflect_Array_get", array::array_get),
    ("Java_java_lang_reflect_Array_set", array::array_set),
    ("Java_java_lang_reflect_Array_getLength", array::array_get_length),
    ("Java_java_lang_reflect_Array_makeObjectArray", array::array_make_object_array),
    ("Java_java_lang_reflect_Constructor_make", reflect::constructor_make),
    ("Java_java_lang_reflect_Field_get", field::field_get),
    ("Java_java_lang_reflect_Field_set", field::field_set),
    ("Java_java_lang_reflect_Method_getCaller", reflect::method_get_caller),
    ("Java_java_lang_reflect_Method_invoke", reflect::method_invoke),
    ("Java_java_net_URL_00024ResourceInputStream_open", resource::open),
    ("Java_java_net_URL_00024ResourceInputStream_read_JI", resource::read),
    ("Java_java_net_URL_00024ResourceInputStream_read_JI_3BII", resource::read_into),
    ("Java_java_net_URL_00024ResourceInputStream_close", resource::close),
    ("Java_java_io_ObjectInputStream_makeInstance", reflect::object_input_stream_make_instance),
];

/// Immutable symbol to builtin map.
pub struct BuiltinRegistry {
    entries: FxHashMap<&'static str, NativeFn>,
}

impl BuiltinRegistry {
    /// Builds the registry from [`BUILTINS`].
    pub fn bootstrap() -> Self {
        Self::from_table(BUILTINS)
    }

    /// Builds a registry from an arbitrary table. Later duplicates win.
    pub fn from_table(table: &[(&'static str, NativeFn)]) -> Self {
        let entries: FxHashMap<_, _> = table.iter().copied().collect();
        debug!(builtins = entries.len(), "builtin registry ready");
        Self { entries }
    }

    pub fn lookup(&self, symbol: &str) -> Option<NativeFn> {
        self.entries.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry").field("len", &self.entries.len()).finish()
    }
}

/// Links declared native methods, caching the result on the method.
pub struct NativeResolver<'r> {
    registry: &'r BuiltinRegistry,
    libraries: &'r NativeLibraries,
}

impl<'r> NativeResolver<'r> {
    pub fn new(registry: &'r BuiltinRegistry, libraries: &'r NativeLibraries) -> Self {
        Self { registry, libraries }
    }

    /// Tries the short symbol, then the long one, in the registry and then
    /// in loaded libraries.
    pub fn resolve(&self, class: &Class, method: &Method) -> JavaResult<NativeLink> {
        if let Some(link) = method.native.get() {
            return Ok(*link);
        }
        let short = mangle::short_symbol(&class.name, &method.name);
        let long = mangle::long_symbol(&class.name, &method.name, &method.descriptor);
        let candidates = [Some(short), long];
        let symbols = || candidates.iter().flatten();

        let link = symbols()
            .find_map(|s| self.registry.lookup(s).map(|f| (s, NativeLink::Builtin(f))))
            .or_else(|| {
                symbols().find_map(|s| self.libraries.symbol_address(s).map(|a| (s, NativeLink::External(a))))
            });
        match link {
            Some((symbol, link)) => {
                trace!(symbol = %symbol, "linked native method");
                Ok(*method.native.get_or_init(|| link))
            }
            None => Err(Throwable::thrown("java/lang/UnsatisfiedLinkError").with_message(format!(
                "{}.{}{}",
                class.dotted_name(),
                method.name,
                method.descriptor
            ))),
        }
    }
}
