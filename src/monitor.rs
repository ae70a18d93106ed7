//! Intrinsic object monitors.
//!
//! A monitor is a reentrant owner/depth pair plus a FIFO of wait nodes.
//! `wait` enqueues a node, gives up ownership if the caller held it, and
//! sleeps on the monitor's wakeup condvar until its own node is signalled,
//! the thread is interrupted, or the deadline passes. Ownership is not
//! required for `wait`/`notify`; the execution engine enforces that.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::heap::ObjectRef;
use crate::thread::{ThreadId, ThreadShared};

/// Why [`Monitor::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified,
    TimedOut,
    /// The interrupt flag is left set for the caller to observe.
    Interrupted,
}

#[derive(Debug, Default)]
struct WaitNode {
    signalled: AtomicBool,
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    depth: u32,
    waiters: VecDeque<Arc<WaitNode>>,
}

#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    entry: Condvar,
    wakeup: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, thread: ThreadId) {
        let mut state = self.state.lock();
        if state.owner == Some(thread) {
            state.depth += 1;
            return;
        }
        while state.owner.is_some() {
            self.entry.wait(&mut state);
        }
        state.owner = Some(thread);
        state.depth = 1;
    }

    /// Returns `false` if `thread` does not own the monitor.
    pub fn exit(&self, thread: ThreadId) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.entry.notify_one();
        }
        true
    }

    pub fn is_owned_by(&self, thread: ThreadId) -> bool {
        self.state.lock().owner == Some(thread)
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Blocks until notified, interrupted, or `timeout` elapses (`None`
    /// waits indefinitely).
    pub fn wait(self: &Arc<Self>, thread: &ThreadShared, timeout: Option<Duration>) -> WaitOutcome {
        let mut state = self.state.lock();
        *thread.waiting_on.lock() = Some(self.clone());
        if thread.is_interrupted() {
            *thread.waiting_on.lock() = None;
            return WaitOutcome::Interrupted;
        }

        let node = Arc::new(WaitNode::default());
        state.waiters.push_back(node.clone());

        let held = if state.owner == Some(thread.id()) {
            let depth = state.depth;
            state.owner = None;
            state.depth = 0;
            self.entry.notify_one();
            Some(depth)
        } else {
            None
        };

        let deadline = timeout.map(|t| Instant::now() + t);
        let outcome = loop {
            if node.signalled.load(Ordering::Acquire) {
                break WaitOutcome::Notified;
            }
            if thread.is_interrupted() {
                break WaitOutcome::Interrupted;
            }
            match deadline {
                None => self.wakeup.wait(&mut state),
                Some(deadline) => {
                    if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                        break if node.signalled.load(Ordering::Acquire) {
                            WaitOutcome::Notified
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
            }
        };

        if outcome != WaitOutcome::Notified {
            state.waiters.retain(|n| !Arc::ptr_eq(n, &node));
        }
        *thread.waiting_on.lock() = None;

        if let Some(depth) = held {
            while state.owner.is_some() {
                self.entry.wait(&mut state);
            }
            state.owner = Some(thread.id());
            state.depth = depth;
        }
        outcome
    }

    /// Wakes the longest-waiting thread, if any.
    pub fn notify(&self) {
        let mut state = self.state.lock();
        if let Some(node) = state.waiters.pop_front() {
            node.signalled.store(true, Ordering::Release);
            self.wakeup.notify_all();
        }
    }

    pub fn notify_all(&self) {
        let mut state = self.state.lock();
        if state.waiters.is_empty() {
            return;
        }
        for node in state.waiters.drain(..) {
            node.signalled.store(true, Ordering::Release);
        }
        self.wakeup.notify_all();
    }

    /// Wakes every sleeper so interrupted ones can re-check their flag.
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.wakeup.notify_all();
    }
}

/// Monitors by object, created on first use.
#[derive(Default)]
pub struct MonitorTable {
    monitors: Mutex<FxHashMap<ObjectRef, Arc<Monitor>>>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monitor_for(&self, object: ObjectRef) -> Arc<Monitor> {
        self.monitors.lock().entry(object).or_default().clone()
    }

    /// Drops monitors of objects for which `live` is false and that nobody
    /// else holds.
    pub fn prune(&self, mut live: impl FnMut(ObjectRef) -> bool) {
        self.monitors.lock().retain(|r, m| live(*r) || Arc::strong_count(m) > 1);
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
