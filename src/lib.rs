//! # jvm-builtins
//!
//! The native bridge of a Java-compatible virtual machine.
//!
//! This crate implements the native methods behind `java.lang` and
//! `java.lang.reflect` and the registry that links them:
//! - Typed field and array access over nine primitive/reference kinds
//! - Reflective invocation with argument checking and exception rewrapping
//! - Class definition and lookup, stack trace capture, thread and monitor natives
//! - A [`BuiltinRegistry`](natives::BuiltinRegistry) mapping JNI symbols to builtins
//!
//! Bytecode execution is not part of the crate. The VM is handed an
//! [`Engine`](vm::Engine) that runs Java methods; everything else (heap,
//! class table, classpath, libraries, host threads) has a default.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jvm_builtins::prelude::*;
//!
//! struct MyEngine;
//!
//! impl Engine for MyEngine {
//!     fn invoke(
//!         &self,
//!         thread: &mut Thread,
//!         method: &Arc<Method>,
//!         receiver: Option<ObjectRef>,
//!         args: &[Value],
//!     ) -> JavaResult<Value> {
//!         // interpret or compile `method`
//!         # unimplemented!()
//!     }
//! }
//!
//! let vm = Vm::builder()
//!     .engine(MyEngine)
//!     .classpath("build/classes")
//!     .max_heap_bytes(32 << 20)
//!     .build()?;
//!
//! let mut thread = vm.attach_current_thread(None);
//! let class = vm.resolve_class("com/example/Main")?;
//! for method in class.methods.iter().filter(|m| m.is_native()) {
//!     println!("{} -> {:?}", method.name, vm.resolve_native(method));
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Execution engine (yours)                │
//! │        impl Engine { fn invoke(...) }                    │
//! ├─────────────────────────────────────────────────────────┤
//! │              Native entry (Thread::call_native)          │
//! │   JavaResult<Value> -> pending exception slot            │
//! ├─────────────────────────────────────────────────────────┤
//! │                  Builtins (natives module)               │
//! │   field, array, reflect, class_loader, trace, thread,    │
//! │   lang, resource + BuiltinRegistry / NativeResolver      │
//! ├─────────────────────────────────────────────────────────┤
//! │                    VM state (vm module)                  │
//! │   Heap, ClassTable, MonitorTable, threads, classpath     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | `Tag`, `Value`, the primitive codec table, static slots |
//! | [`heap`] | Arena heap, object bodies, `ObjectRef` |
//! | [`class`] | Runtime classes, fields, methods, the class table |
//! | [`classfile`] | Class-file parser |
//! | [`exception`] | `Throwable` and `JavaResult` |
//! | [`natives`] | The builtins, their registry and the native resolver |
//! | [`vm`] | `Vm`, `VmBuilder` and the collaborator traits |
//! | [`thread`] | Execution contexts and thread handles |
//! | [`monitor`] | Object monitors (wait/notify) |
//!
//! ## Errors
//!
//! Java-visible failures are [`Throwable`](exception::Throwable) values
//! returned through [`JavaResult`](exception::JavaResult). Host-level
//! failures (bad classpath, library I/O) are [`VmError`](error::VmError).
//! Broken internal invariants abort through [`vm::fatal`].
//!
//! ## Logging
//!
//! The crate logs through `tracing` and installs no subscriber.

pub mod class;
pub mod classfile;
pub mod config;
pub mod error;
pub mod exception;
pub mod finder;
pub mod heap;
pub mod library;
mod linker;
pub mod monitor;
pub mod natives;
pub mod prelude;
pub mod sys;
pub mod thread;
pub mod value;
pub mod vm;

pub use crate::config::VmConfig;
pub use crate::error::VmError;
pub use crate::exception::{ExceptionKind, JavaResult, Throwable};
pub use crate::natives::{BuiltinRegistry, NativeFn, NativeLink};
pub use crate::value::{Tag, Value};
pub use crate::vm::{Vm, VmBuilder};
