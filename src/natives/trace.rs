//! Stack trace capture and resolution.

use crate::exception::{JavaResult, Throwable};
use crate::heap::{ArrayBody, ObjectBody, ObjectRef, StackTraceElement, TraceElement};
use crate::thread::Thread;
use crate::value::Value;
use crate::vm::{fatal, Vm};

use super::Arguments;

/// Captures the thread's frames, innermost first, after skipping
/// `skip_count` frames. When the first remaining frame belongs to
/// `java.lang.Throwable`, constructor frames are skipped as well so a trace
/// starts where the exception was created.
pub fn capture(thread: &Thread, skip_count: usize) -> Vec<TraceElement> {
    let frames = thread.frames();
    let Some(mut top) = frames.len().checked_sub(skip_count + 1) else {
        return Vec::new();
    };
    let throwable = thread.vm().classes().well_known().throwable;
    if frames[top].method.class == throwable {
        while frames[top].method.name == "<init>" {
            match top.checked_sub(1) {
                Some(next) => top = next,
                None => return Vec::new(),
            }
        }
    }
    frames[..=top]
        .iter()
        .rev()
        .map(|f| TraceElement { method: f.method.clone(), ip: f.ip })
        .collect()
}

/// Turns captured elements into `StackTraceElement` values.
pub fn resolve(vm: &Vm, trace: &[TraceElement]) -> Vec<StackTraceElement> {
    trace
        .iter()
        .map(|e| {
            let class = vm.classes().class(e.method.class);
            StackTraceElement {
                declaring_class: class.dotted_name(),
                method_name: e.method.name.clone(),
                file_name: class.source_file.clone(),
                line_number: e.method.line_number(e.ip),
            }
        })
        .collect()
}

/// `static Object Throwable.trace(int skipCount)`
pub fn throwable_trace(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let skip = usize::try_from(args.int(0)?).unwrap_or(0);
    let trace = capture(thread, skip);
    let vm = thread.vm();
    let object = vm.classes().well_known().object;
    Ok(Value::Reference(Some(vm.heap().write().allocate(object, ObjectBody::Trace(trace)))))
}

/// `static StackTraceElement[] Throwable.resolveTrace(Object trace)`
pub fn throwable_resolve_trace(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let trace = args.object(0)?;
    let elements = match &vm.heap().read().object(trace).body {
        ObjectBody::Trace(trace) => resolve(vm, trace),
        _ => return Err(Throwable::illegal_argument("not a captured trace")),
    };

    let element_class = vm.classes().well_known().stack_trace_element;
    let array = vm.new_array(element_class, elements.len() as i32)?;
    let mut heap = vm.heap().write();
    let refs: Vec<Option<ObjectRef>> = elements
        .into_iter()
        .map(|e| Some(heap.allocate(element_class, ObjectBody::StackTraceElement(e))))
        .collect();
    match heap.object_mut(array).as_array_mut() {
        Some(ArrayBody::References(slots)) => slots.copy_from_slice(&refs),
        _ => fatal("StackTraceElement[] without reference slots"),
    }
    heap.write_barrier(array);
    Ok(Value::Reference(Some(array)))
}
