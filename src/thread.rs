//! Execution contexts.
//!
//! A [`Thread`] is owned by the OS thread running it. The parts other
//! threads need (interrupt flag, lifecycle state, the monitor it sleeps on)
//! live in a shared [`ThreadShared`] registered with the VM under the
//! thread's id, which is also the handle `Thread.doStart` returns.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::class::Method;
use crate::exception::Throwable;
use crate::heap::ObjectRef;
use crate::monitor::Monitor;
use crate::natives::{Arguments, NativeFn, NativeLink};
use crate::value::Value;
use crate::vm::{fatal, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    /// `raw` 0 is mapped to 1; handle 0 means "no thread".
    pub fn from_raw(raw: u64) -> Self {
        ThreadId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Decodes a `Thread.doStart` handle.
    pub fn from_handle(handle: i64) -> Option<Self> {
        u64::try_from(handle).ok().and_then(NonZeroU64::new).map(ThreadId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    pub fn handle(self) -> i64 {
        self.0.get() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Running Java code or natives.
    Active,
    /// Blocked in `wait`.
    Idle,
    /// Holding the VM exclusively (collection).
    Exclusive,
    Exit,
}

/// State of a thread visible to other threads.
#[derive(Debug)]
pub struct ThreadShared {
    id: ThreadId,
    state: Mutex<ThreadState>,
    interrupted: AtomicBool,
    pub(crate) waiting_on: Mutex<Option<Arc<Monitor>>>,
}

impl ThreadShared {
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            state: Mutex::new(ThreadState::Active),
            interrupted: AtomicBool::new(false),
            waiting_on: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Returns the previous state.
    pub fn set_state(&self, state: ThreadState) -> ThreadState {
        std::mem::replace(&mut *self.state.lock(), state)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Clears the interrupt flag, returning its previous value.
    pub fn clear_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Sets the interrupt flag and wakes the thread if it is waiting.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let monitor = self.waiting_on.lock().clone();
        if let Some(monitor) = monitor {
            monitor.wake_all();
        }
    }
}

/// An activation record as far as the bridge cares: which method, where.
#[derive(Debug, Clone)]
pub struct Frame {
    pub method: Arc<Method>,
    pub ip: usize,
}

/// Per-thread execution context.
pub struct Thread {
    vm: Arc<Vm>,
    shared: Arc<ThreadShared>,
    peer: Option<ObjectRef>,
    frames: Vec<Frame>,
    pending: Option<Throwable>,
}

impl Thread {
    pub(crate) fn new(vm: Arc<Vm>, shared: Arc<ThreadShared>, peer: Option<ObjectRef>) -> Self {
        Self { vm, shared, peer, frames: Vec::new(), pending: None }
    }

    pub fn id(&self) -> ThreadId {
        self.shared.id
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn shared(&self) -> &Arc<ThreadShared> {
        &self.shared
    }

    /// The `java.lang.Thread` object bound to this context.
    pub fn peer(&self) -> Option<ObjectRef> {
        self.peer
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.is_interrupted()
    }

    // =========================================================================
    // Frames
    // =========================================================================

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn push_frame(&mut self, method: Arc<Method>) {
        self.frames.push(Frame { method, ip: 0 });
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Records the instruction offset of the innermost frame.
    pub fn set_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    // =========================================================================
    // Pending exception
    // =========================================================================

    pub fn pending_exception(&self) -> Option<&Throwable> {
        self.pending.as_ref()
    }

    pub fn has_pending_exception(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending_exception(&mut self) -> Option<Throwable> {
        self.pending.take()
    }

    /// Stores `exception` as pending. Overwriting one that was never
    /// consumed is fatal.
    pub fn set_pending_exception(&mut self, exception: Throwable) {
        if let Some(existing) = &self.pending {
            fatal(format!("pending exception overwritten: {existing} by {exception}"));
        }
        self.pending = Some(exception);
    }

    /// Runs a native entry point on this thread.
    ///
    /// A returned error becomes the pending exception and the call yields
    /// `Value::NULL`; the engine checks the slot after every native call.
    pub fn call_native(&mut self, native: NativeFn, args: &[Value]) -> Value {
        match native(self, &Arguments::new(args)) {
            Ok(value) => value,
            Err(exception) => {
                trace!(thread = self.id().get(), %exception, "native raised");
                self.set_pending_exception(exception);
                Value::NULL
            }
        }
    }

    /// Links and runs a declared native method with a frame of its own.
    ///
    /// Only builtins can be called here; a method linked to a library
    /// symbol needs the engine's own call adapter.
    pub fn run_native(&mut self, method: &Arc<Method>, args: &[Value]) -> Value {
        let link = match self.vm.resolve_native(method) {
            Ok(link) => link,
            Err(exception) => {
                self.set_pending_exception(exception);
                return Value::NULL;
            }
        };
        match link {
            NativeLink::Builtin(native) => {
                self.push_frame(method.clone());
                let result = self.call_native(native, args);
                self.pop_frame();
                result
            }
            NativeLink::External(_) => {
                self.set_pending_exception(
                    Throwable::thrown("java/lang/UnsatisfiedLinkError")
                        .with_message(format!("{} is bound to a library symbol", method.name)),
                );
                Value::NULL
            }
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.shared.set_state(ThreadState::Exit);
        self.vm.forget_thread(self.shared.id);
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.shared.id)
            .field("peer", &self.peer)
            .field("frames", &self.frames.len())
            .field("pending", &self.pending)
            .finish()
    }
}
