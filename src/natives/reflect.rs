//! Reflective invocation and instantiation.

use std::sync::Arc;

use tracing::trace;

use crate::class::Method;
use crate::exception::{JavaResult, Throwable};
use crate::heap::{ArrayBody, Mirror, ObjectRef};
use crate::thread::Thread;
use crate::value::Value;

use super::field::coerce_for;
use super::{class_of_mirror, Arguments};

/// Invokes `method` the way `Method.invoke` does.
///
/// `arguments` is an `Object[]` of boxed arguments. Arguments are checked,
/// unboxed and widened to the parameter kinds before the engine runs
/// anything; a failure raised by the target comes back wrapped in an
/// InvocationTargetException. The result is boxed, `void` yields null.
pub fn invoke(
    thread: &mut Thread,
    method: &Arc<Method>,
    instance: Option<ObjectRef>,
    arguments: Option<ObjectRef>,
) -> JavaResult<Value> {
    let vm = thread.vm().clone();
    let arguments = arguments.ok_or_else(Throwable::null_pointer)?;

    let (receiver, expected) = if method.is_static() {
        (None, method.parameter_count)
    } else {
        let receiver = instance.ok_or_else(Throwable::null_pointer)?;
        let class = vm.heap().read().class_of(receiver);
        if !vm.classes().is_assignable_from(method.class, class) {
            return Err(Throwable::illegal_argument(format!(
                "object of class {} is not an instance of {}",
                vm.classes().class(class).dotted_name(),
                vm.classes().class(method.class).dotted_name()
            )));
        }
        (Some(receiver), method.parameter_count - 1)
    };

    let values = {
        let heap = vm.heap().read();
        let boxed = match heap.object(arguments).as_array() {
            Some(ArrayBody::References(slots)) => slots,
            _ => return Err(Throwable::illegal_argument("arguments are not an Object[]")),
        };
        if boxed.len() != expected {
            return Err(Throwable::wrong_argument_count(expected, boxed.len()));
        }
        boxed
            .iter()
            .zip(&method.parameter_tags)
            .map(|(arg, &tag)| match arg {
                None if tag.is_primitive() => {
                    Err(Throwable::illegal_argument(format!("null for {} parameter", tag.java_name())))
                }
                _ => coerce_for(&heap, tag, Value::Reference(*arg)),
            })
            .collect::<JavaResult<Vec<_>>>()?
    };

    if method.is_static() {
        let class = vm.classes().class(method.class);
        vm.initialize_class(thread, &class)?;
    }

    trace!(method = %method.name, args = values.len(), "reflective call");
    let engine = vm.engine().clone();
    let result = engine
        .invoke(thread, method, receiver, &values)
        .map_err(Throwable::invocation_target)?;
    Ok(match method.return_tag {
        Some(_) => vm.box_value(result),
        None => Value::NULL,
    })
}

/// `Object Method.invoke(Object instance, Object[] arguments)`
pub fn method_invoke(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let mirror = args.object(0)?;
    let method = match thread.vm().heap().read().object(mirror).as_mirror() {
        Some(Mirror::Method(method)) => method.clone(),
        _ => return Err(Throwable::illegal_argument("not a java.lang.reflect.Method")),
    };
    invoke(thread, &method, args.reference(1)?, args.reference(2)?)
}

/// `static Method Method.getCaller()`: the method two frames below the
/// native's caller, or null.
pub fn method_get_caller(thread: &mut Thread, _args: &Arguments<'_>) -> JavaResult<Value> {
    let frames = thread.frames();
    let caller = frames.len().checked_sub(3).map(|i| frames[i].method.clone());
    Ok(Value::Reference(caller.map(|m| thread.vm().method_mirror(&m))))
}

fn instantiate(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let id = class_of_mirror(&vm.heap().read(), args.object(0)?)?;
    let class = vm.classes().class(id);
    Ok(Value::Reference(Some(vm.new_instance(&class)?)))
}

/// `static Object Constructor.make(Class c)`
pub fn constructor_make(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    instantiate(thread, args)
}

/// `static Object ObjectInputStream.makeInstance(Class c)`
pub fn object_input_stream_make_instance(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    instantiate(thread, args)
}
