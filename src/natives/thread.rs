//! Thread lifecycle and monitor natives.

use std::time::Duration;

use tracing::trace;

use crate::exception::{JavaResult, Throwable};
use crate::heap::ObjectRef;
use crate::monitor::WaitOutcome;
use crate::thread::{Thread, ThreadId, ThreadState};
use crate::value::Value;

use super::Arguments;

/// Waits on `object`'s monitor. `millis == 0` waits until notified or
/// interrupted; a negative timeout is an IllegalArgumentException.
///
/// The thread is `Idle` for the duration of the wait. An interrupt ends the
/// wait with the interrupt flag still set.
pub fn wait(thread: &Thread, object: ObjectRef, millis: i64) -> JavaResult<WaitOutcome> {
    let millis = u64::try_from(millis)
        .map_err(|_| Throwable::illegal_argument(format!("timeout value is negative: {millis}")))?;
    let timeout = (millis != 0).then(|| Duration::from_millis(millis));
    let monitor = thread.vm().monitors().monitor_for(object);
    let shared = thread.shared();
    let previous = shared.set_state(ThreadState::Idle);
    let outcome = monitor.wait(shared, timeout);
    shared.set_state(previous);
    trace!(thread = thread.id().get(), ?outcome, "wait finished");
    Ok(outcome)
}

/// `long Thread.doStart()`: a handle for the started thread, 0 if the host
/// could not start it.
pub fn thread_do_start(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let peer = args.object(0)?;
    let handle = thread.vm().spawn_thread(peer).map_or(0, ThreadId::handle);
    Ok(Value::Long(handle))
}

/// `static void Thread.interrupt(long handle)`. Unknown handles are ignored.
pub fn thread_interrupt(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let target = ThreadId::from_handle(args.long(0)?).and_then(|id| thread.vm().thread(id));
    if let Some(target) = target {
        target.interrupt();
    }
    Ok(Value::NULL)
}

/// `static Thread Thread.currentThread()`
pub fn thread_current_thread(thread: &mut Thread, _args: &Arguments<'_>) -> JavaResult<Value> {
    Ok(Value::Reference(thread.peer()))
}

/// `void Object.wait(long millis)`
pub fn object_wait(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    wait(thread, args.object(0)?, args.long(1)?)?;
    Ok(Value::NULL)
}

/// `void Object.notify()`
pub fn object_notify(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    thread.vm().monitors().monitor_for(args.object(0)?).notify();
    Ok(Value::NULL)
}

/// `void Object.notifyAll()`
pub fn object_notify_all(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    thread.vm().monitors().monitor_for(args.object(0)?).notify_all();
    Ok(Value::NULL)
}
