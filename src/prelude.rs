//! Common imports for embedding the bridge.
//!
//! Small on purpose: the types an execution engine touches on every call.

pub use std::sync::Arc;

pub use crate::class::{Class, ClassId, Field, Method};
pub use crate::exception::{ExceptionKind, JavaResult, Throwable};
pub use crate::heap::ObjectRef;
pub use crate::natives::{Arguments, BuiltinRegistry, NativeLink};
pub use crate::thread::Thread;
pub use crate::value::{Tag, Value};
pub use crate::vm::{Engine, Vm, VmBuilder};
