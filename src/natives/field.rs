//! Typed field access and the `java.lang.reflect.Field` natives.
//!
//! Statics live in the owning class's normalized slot table and ignore the
//! instance argument. Instance primitives are read and written at their
//! exact width inside the object's byte area; instance references go
//! through the reference slots and the write barrier.
//!
//! Every precondition is checked before the heap is written. A field whose
//! offset falls outside its class's layout is corrupt metadata and aborts.

use std::sync::Arc;

use crate::class::Field;
use crate::exception::{JavaResult, Throwable};
use crate::heap::{Heap, Mirror, ObjectBody, ObjectRef};
use crate::thread::Thread;
use crate::value::{self, StaticSlot, Tag, Value};
use crate::vm::{fatal, Vm};

use super::Arguments;

fn corrupt(field: &Field) -> ! {
    fatal(format!(
        "field {} ({}) has offset {} outside its layout",
        field.name, field.descriptor, field.offset
    ))
}

/// Checks that `instance` is non-null and an instance of the declaring class.
fn receiver(vm: &Vm, heap: &Heap, field: &Field, instance: Option<ObjectRef>) -> JavaResult<ObjectRef> {
    let object = instance.ok_or_else(Throwable::null_pointer)?;
    let class = heap.class_of(object);
    if !vm.classes().is_assignable_from(field.class, class) {
        return Err(Throwable::illegal_argument(format!(
            "field {} does not belong to {}",
            field.name,
            vm.classes().class(class).dotted_name()
        )));
    }
    Ok(object)
}

/// Reads `field`. The result is unboxed; `Field.get` boxes it.
pub fn get_field(vm: &Vm, field: &Field, instance: Option<ObjectRef>) -> JavaResult<Value> {
    if field.is_static() {
        let class = vm.classes().class(field.class);
        return match class.static_slot(field.offset).and_then(|slot| slot.load(field.tag)) {
            Some(value) => Ok(value),
            None => corrupt(field),
        };
    }

    let heap = vm.heap().read();
    let object = receiver(vm, &heap, field, instance)?;
    let ObjectBody::Instance { bytes, refs } = &heap.object(object).body else {
        corrupt(field)
    };
    let value = match field.tag {
        Tag::Object => refs.get(field.offset).map(|r| Value::Reference(*r)),
        tag => bytes.get(field.offset..).and_then(|b| value::load(tag, b)),
    };
    Ok(value.unwrap_or_else(|| corrupt(field)))
}

/// Writes `value` to `field`, unboxing and widening primitives as needed.
pub fn set_field(vm: &Vm, field: &Field, instance: Option<ObjectRef>, value: Value) -> JavaResult<()> {
    if field.is_static() {
        let value = coerce_for(&vm.heap().read(), field.tag, value)?;
        let class = vm.classes().class(field.class);
        if !class.set_static_slot(field.offset, StaticSlot::from_value(value)) {
            corrupt(field);
        }
        return Ok(());
    }

    let mut heap = vm.heap().write();
    let object = receiver(vm, &heap, field, instance)?;
    let value = coerce_for(&heap, field.tag, value)?;
    let ObjectBody::Instance { bytes, refs } = &mut heap.object_mut(object).body else {
        corrupt(field)
    };
    match value {
        Value::Reference(r) => {
            let Some(slot) = refs.get_mut(field.offset) else { corrupt(field) };
            *slot = r;
            heap.write_barrier(object);
        }
        primitive => {
            let stored = bytes
                .get_mut(field.offset..)
                .is_some_and(|dst| value::store(primitive, dst));
            if !stored {
                corrupt(field);
            }
        }
    }
    Ok(())
}

/// Brings `value` to the storage kind `tag`. Primitive destinations accept
/// boxed values; a null one is a NullPointerException.
pub(crate) fn coerce_for(heap: &Heap, tag: Tag, value: Value) -> JavaResult<Value> {
    if tag == Tag::Object {
        value.coerce(Tag::Object)
    } else {
        heap.unbox(value).coerce(tag)
    }
}

fn field_of_mirror(vm: &Vm, mirror: ObjectRef) -> JavaResult<Arc<Field>> {
    match vm.heap().read().object(mirror).as_mirror() {
        Some(Mirror::Field(field)) => Ok(field.clone()),
        _ => Err(Throwable::illegal_argument("not a java.lang.reflect.Field")),
    }
}

/// `Object Field.get(Object instance)`
pub fn field_get(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let field = field_of_mirror(vm, args.object(0)?)?;
    let value = get_field(vm, &field, args.reference(1)?)?;
    Ok(vm.box_value(value))
}

/// `void Field.set(Object instance, Object value)`
pub fn field_set(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let field = field_of_mirror(vm, args.object(0)?)?;
    set_field(vm, &field, args.reference(1)?, args.get(2)?)?;
    Ok(Value::NULL)
}
