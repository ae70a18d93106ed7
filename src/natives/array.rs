//! Typed array access, `System.arraycopy` and the `java.lang.reflect.Array`
//! natives.

use std::sync::Arc;

use crate::class::Class;
use crate::exception::{JavaResult, Throwable};
use crate::heap::{ArrayBody, Heap, ObjectRef};
use crate::thread::Thread;
use crate::value::{self, Tag, Value};
use crate::vm::{fatal, Vm};

use super::field::coerce_for;
use super::{class_of_mirror, Arguments};

/// The class of `array`, which must be an array class with a non-zero
/// element size.
fn array_class(vm: &Vm, heap: &Heap, array: ObjectRef) -> JavaResult<Arc<Class>> {
    let class = vm.classes().class(heap.class_of(array));
    if class.array_element_size() == 0 {
        return Err(Throwable::illegal_argument(format!("{} is not an array", class.dotted_name())));
    }
    Ok(class)
}

fn body(heap: &Heap, array: ObjectRef) -> &ArrayBody {
    heap.object(array)
        .as_array()
        .unwrap_or_else(|| fatal(format!("array class without array body: {array:?}")))
}

fn checked_index(index: i32, length: usize) -> JavaResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < length)
        .ok_or_else(|| Throwable::array_index_out_of_bounds(index.into(), length))
}

/// Element count of `array`.
pub fn array_length(vm: &Vm, array: Option<ObjectRef>) -> JavaResult<usize> {
    let array = array.ok_or_else(Throwable::null_pointer)?;
    let heap = vm.heap().read();
    array_class(vm, &heap, array)?;
    Ok(body(&heap, array).len())
}

/// Reads element `index`. Primitive elements come back unboxed.
pub fn array_load(vm: &Vm, array: Option<ObjectRef>, index: i32) -> JavaResult<Value> {
    let array = array.ok_or_else(Throwable::null_pointer)?;
    let heap = vm.heap().read();
    array_class(vm, &heap, array)?;
    let body = body(&heap, array);
    let index = checked_index(index, body.len())?;
    let value = match body {
        ArrayBody::References(slots) => Some(Value::Reference(slots[index])),
        ArrayBody::Primitive { tag, data } => value::load(*tag, &data[index * tag.size()..]),
    };
    Ok(value.unwrap_or_else(|| fatal("array element out of its body")))
}

/// Writes element `index`. References must be assignable to the component
/// class; primitives are unboxed and widened to the element kind.
pub fn array_store(vm: &Vm, array: Option<ObjectRef>, index: i32, value: Value) -> JavaResult<()> {
    let array = array.ok_or_else(Throwable::null_pointer)?;
    let mut heap = vm.heap().write();
    let class = array_class(vm, &heap, array)?;
    let element = class.array_element().unwrap_or(Tag::Object);
    let index = checked_index(index, body(&heap, array).len())?;
    let value = coerce_for(&heap, element, value)?;
    if let (Value::Reference(Some(r)), Some(component)) = (value, class.component()) {
        let source = heap.class_of(r);
        if !vm.classes().is_assignable_from(component, source) {
            return Err(Throwable::illegal_argument(format!(
                "array element type mismatch: {} into {}",
                vm.classes().class(source).dotted_name(),
                class.dotted_name()
            )));
        }
    }

    let Some(body) = heap.object_mut(array).as_array_mut() else {
        fatal(format!("array class without array body: {array:?}"))
    };
    match (body, value) {
        (ArrayBody::References(slots), Value::Reference(r)) => {
            slots[index] = r;
            heap.write_barrier(array);
        }
        (ArrayBody::Primitive { tag, data }, primitive) => {
            if !value::store(primitive, &mut data[index * tag.size()..]) {
                fatal("array element out of its body");
            }
        }
        (ArrayBody::References(_), _) => fatal("primitive stored into a reference array"),
    }
    Ok(())
}

/// `System.arraycopy`. Both arrays must share a dynamic class; any range
/// or class problem is an ArrayStoreException. Copying within one array
/// behaves as if through a temporary.
pub fn arraycopy(
    vm: &Vm,
    src: Option<ObjectRef>,
    src_offset: i32,
    dst: Option<ObjectRef>,
    dst_offset: i32,
    length: i32,
) -> JavaResult<()> {
    let (src, dst) = match (src, dst) {
        (Some(src), Some(dst)) => (src, dst),
        _ => return Err(Throwable::null_pointer()),
    };
    let mut heap = vm.heap().write();
    let (src_class, dst_class) = (heap.class_of(src), heap.class_of(dst));
    if src_class != dst_class {
        return Err(Throwable::array_store(format!(
            "{} to {}",
            vm.classes().class(src_class).dotted_name(),
            vm.classes().class(dst_class).dotted_name()
        )));
    }
    let element_size = vm.classes().class(src_class).array_element_size();
    if element_size == 0 {
        return Err(Throwable::array_store("not an array"));
    }

    let in_bounds = |offset: i32, len: usize| {
        let offset = usize::try_from(offset).ok()?;
        let length = usize::try_from(length).ok()?;
        (offset.checked_add(length)? <= len).then_some((offset, length))
    };
    let src_len = body(&heap, src).len();
    let dst_len = body(&heap, dst).len();
    let (Some((from, count)), Some((to, _))) = (in_bounds(src_offset, src_len), in_bounds(dst_offset, dst_len))
    else {
        return Err(Throwable::array_store(format!(
            "copy of {length} from {src_offset} (length {src_len}) to {dst_offset} (length {dst_len})"
        )));
    };
    if count == 0 {
        return Ok(());
    }

    if src == dst {
        match heap.object_mut(src).as_array_mut() {
            Some(ArrayBody::References(slots)) => slots.copy_within(from..from + count, to),
            Some(ArrayBody::Primitive { tag, data }) => {
                let size = tag.size();
                data.copy_within(from * size..(from + count) * size, to * size);
            }
            None => fatal("array class without array body"),
        }
    } else {
        let chunk = match body(&heap, src) {
            ArrayBody::References(slots) => ArrayBody::References(slots[from..from + count].to_vec()),
            ArrayBody::Primitive { tag, data } => ArrayBody::Primitive {
                tag: *tag,
                data: data[from * tag.size()..(from + count) * tag.size()].to_vec(),
            },
        };
        match (heap.object_mut(dst).as_array_mut(), chunk) {
            (Some(ArrayBody::References(slots)), ArrayBody::References(chunk)) => {
                slots[to..to + count].copy_from_slice(&chunk)
            }
            (Some(ArrayBody::Primitive { tag, data }), ArrayBody::Primitive { data: chunk, .. }) => {
                let start = to * tag.size();
                data[start..start + chunk.len()].copy_from_slice(&chunk);
            }
            _ => fatal("array bodies disagree with their shared class"),
        }
    }
    heap.write_barrier(dst);
    Ok(())
}

/// `static void System.arraycopy(Object, int, Object, int, int)`
pub fn system_arraycopy(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    arraycopy(
        thread.vm(),
        args.reference(0)?,
        args.int(1)?,
        args.reference(2)?,
        args.int(3)?,
        args.int(4)?,
    )?;
    Ok(Value::NULL)
}

/// `static Object Array.get(Object array, int index)`
pub fn array_get(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let value = array_load(vm, args.reference(0)?, args.int(1)?)?;
    Ok(vm.box_value(value))
}

/// `static void Array.set(Object array, int index, Object value)`
pub fn array_set(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    array_store(thread.vm(), args.reference(0)?, args.int(1)?, args.get(2)?)?;
    Ok(Value::NULL)
}

/// `static int Array.getLength(Object array)`
pub fn array_get_length(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let length = array_length(thread.vm(), args.reference(0)?)?;
    Ok(Value::Int(length as i32))
}

/// `static Object Array.makeObjectArray(Class elementType, int length)`
pub fn array_make_object_array(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let element = class_of_mirror(&vm.heap().read(), args.object(0)?)?;
    let length = args.int(1)?;
    Ok(Value::Reference(Some(vm.new_array(element, length)?)))
}
