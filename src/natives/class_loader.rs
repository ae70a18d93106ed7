//! Class definition and lookup natives.
//!
//! Names arrive as Java strings in dotted form and are normalized to the
//! internal slash-separated form before the class table is consulted.

use std::sync::Arc;

use crate::class::Class;
use crate::exception::{JavaResult, Throwable};
use crate::heap::{ArrayBody, ObjectRef};
use crate::thread::Thread;
use crate::value::{Tag, Value};
use crate::vm::Vm;

use super::Arguments;

/// Defines a class from `length` bytes of the `byte[]` `bytes` starting at
/// `offset`.
///
/// The range is copied into a VM scratch buffer first; the buffer is
/// released on every path, parse failures included.
pub fn define_from_array(vm: &Vm, bytes: Option<ObjectRef>, offset: i32, length: i32) -> JavaResult<Arc<Class>> {
    let bytes = bytes.ok_or_else(Throwable::null_pointer)?;
    let scratch = {
        let heap = vm.heap().read();
        let data = match heap.object(bytes).as_array() {
            Some(ArrayBody::Primitive { tag: Tag::Byte, data }) => data,
            _ => return Err(Throwable::illegal_argument("class bytes are not a byte[]")),
        };
        let range = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(length).ok())
            .and_then(|(start, len)| Some(start..start.checked_add(len)?))
            .filter(|range| range.end <= data.len())
            .ok_or_else(|| {
                Throwable::array_index_out_of_bounds(i64::from(offset) + i64::from(length), data.len())
            })?;
        vm.scratch(&data[range])
    };
    vm.define_class(&scratch)
}

/// Internal form of a dotted class name.
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

fn name_argument(vm: &Vm, name: Option<ObjectRef>) -> JavaResult<String> {
    let name = name.ok_or_else(Throwable::null_pointer)?;
    vm.string_value(name).map(|s| internal_name(&s))
}

/// `static Class ClassLoader.defineClass(byte[] b, int offset, int length)`
pub fn define_class(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let class = define_from_array(vm, args.reference(0)?, args.int(1)?, args.int(2)?)?;
    Ok(Value::Reference(Some(vm.class_mirror(class.id))))
}

/// `static Class SystemClassLoader.findLoadedClass(String name)`: null when
/// the class is not loaded.
pub fn find_loaded_class(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let name = name_argument(vm, args.reference(0)?)?;
    Ok(Value::Reference(vm.classes().find(&name).map(|c| vm.class_mirror(c.id))))
}

/// `static Class SystemClassLoader.findClass(String name)`: loads through
/// the classpath.
pub fn find_class(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let name = name_argument(vm, args.reference(0)?)?;
    let class = vm.resolve_class(&name)?;
    Ok(Value::Reference(Some(vm.class_mirror(class.id))))
}

/// `static boolean SystemClassLoader.resourceExists(String name)`
pub fn resource_exists(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let name = args.object(0)?;
    let name = vm.string_value(name)?;
    Ok(Value::Boolean(vm.finder().exists(&name)))
}
