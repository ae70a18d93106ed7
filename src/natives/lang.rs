//! `java.lang` natives: Object, Class, String, System and Runtime.

use tracing::warn;

use crate::exception::{JavaResult, Throwable};
use crate::library::LoadOutcome;
use crate::thread::Thread;
use crate::value::{Tag, Value};

use super::{class_of_mirror, Arguments};

// =============================================================================
// Object
// =============================================================================

/// `String Object.toString()`: `<dotted class name>@<hex identity hash>`.
pub fn object_to_string(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let this = args.object(0)?;
    let (class, hash) = {
        let heap = vm.heap().read();
        (heap.class_of(this), heap.identity_hash(this))
    };
    let text = format!("{}@{:x}", vm.classes().class(class).dotted_name(), hash);
    Ok(Value::Reference(Some(vm.new_string(&text))))
}

/// `Class Object.getClass()`
pub fn object_get_class(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let class = vm.heap().read().class_of(args.object(0)?);
    Ok(Value::Reference(Some(vm.class_mirror(class))))
}

/// `int Object.hashCode()`
pub fn object_hash_code(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let this = args.object(0)?;
    Ok(Value::Int(thread.vm().heap().read().identity_hash(this)))
}

// =============================================================================
// Class
// =============================================================================

/// `static Class Class.primitiveClass(char descriptor)`
pub fn class_primitive_class(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let descriptor = args.char(0)?;
    let tag = match u8::try_from(descriptor) {
        Ok(b'V') => None,
        Ok(c) => Some(Tag::from_descriptor(c).filter(|t| t.is_primitive()).ok_or_else(|| {
            Throwable::illegal_argument(format!("not a primitive descriptor: {}", char::from(c)))
        })?),
        Err(_) => return Err(Throwable::illegal_argument("not a primitive descriptor")),
    };
    let id = vm.classes().well_known().primitive_class(tag);
    Ok(Value::Reference(Some(vm.class_mirror(id))))
}

/// `void Class.initialize()`
pub fn class_initialize(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm().clone();
    let id = class_of_mirror(&vm.heap().read(), args.object(0)?)?;
    let class = vm.classes().class(id);
    vm.initialize_class(thread, &class)?;
    Ok(Value::NULL)
}

/// `boolean Class.isAssignableFrom(Class other)`
pub fn class_is_assignable_from(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let this = args.object(0)?;
    let other = args.object(1)?;
    let (target, source) = {
        let heap = vm.heap().read();
        (class_of_mirror(&heap, this)?, class_of_mirror(&heap, other)?)
    };
    Ok(Value::Boolean(vm.classes().is_assignable_from(target, source)))
}

// =============================================================================
// String and System
// =============================================================================

/// `String String.intern()`
pub fn string_intern(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let text = vm.string_value(args.object(0)?)?;
    Ok(Value::Reference(Some(vm.intern(&text))))
}

/// `static int System.identityHashCode(Object o)`
pub fn system_identity_hash_code(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let object = args.object(0)?;
    Ok(Value::Int(thread.vm().heap().read().identity_hash(object)))
}

// =============================================================================
// Runtime
// =============================================================================

/// `void Runtime.loadLibrary(String name)`. Loading a library twice is a
/// no-op.
pub fn runtime_load_library(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let name = vm.string_value(args.object(1)?)?;
    match vm.libraries().load(&name, &vm.config().library_path) {
        Ok(LoadOutcome::AlreadyLoaded | LoadOutcome::Loaded(_)) => Ok(Value::NULL),
        Ok(LoadOutcome::NotFound) => {
            warn!(library = %name, "native library not found");
            Err(Throwable::library_not_found(&name))
        }
        Err(e) => {
            warn!(library = %name, error = %e, "native library failed to load");
            Err(Throwable::library_not_found(&name))
        }
    }
}

/// `void Runtime.gc()`
pub fn runtime_gc(thread: &mut Thread, _args: &Arguments<'_>) -> JavaResult<Value> {
    thread.vm().collect(thread);
    Ok(Value::NULL)
}

/// `void Runtime.exit(int code)`
pub fn runtime_exit(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let code = args.int(1)?;
    thread.vm().host().exit(code)
}

/// `long Runtime.freeMemory()`
pub fn runtime_free_memory(thread: &mut Thread, _args: &Arguments<'_>) -> JavaResult<Value> {
    let free = thread.vm().free_memory();
    Ok(Value::Long(i64::try_from(free).unwrap_or(i64::MAX)))
}
