//! Java-visible error values.
//!
//! Bridge operations never unwind and never write a pending exception
//! themselves. They return [`JavaResult`], and the first failed precondition
//! short-circuits with `?` before any heap write. The only place a
//! [`Throwable`] reaches a thread's pending-exception slot is
//! [`Thread::call_native`](crate::thread::Thread::call_native).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::heap::ObjectRef;

/// Result of a bridge operation: a value, or the exception to leave pending.
pub type JavaResult<T> = Result<T, Throwable>;

/// The standard exception kinds raised by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    NullPointer,
    IllegalArgument,
    ArrayIndexOutOfBounds,
    ArrayStore,
    NegativeArraySize,
    InvocationTarget,
    Runtime,
    ClassNotFound,
    ClassFormat,
    Linkage,
    /// Reflective invocation with the wrong number of arguments.
    ///
    /// Kept apart from `IllegalArgument` so callers can tell the two
    /// apart; Java code sees a `java.lang.IllegalArgumentException`.
    WrongArgumentCount,
    /// Any other exception class, usually raised by Java code through the
    /// execution engine. Holds the internal (slash-separated) class name.
    Other(Arc<str>),
}

impl ExceptionKind {
    /// Internal name of the Java class this kind is materialized as.
    pub fn class_name(&self) -> &str {
        match self {
            ExceptionKind::NullPointer => "java/lang/NullPointerException",
            ExceptionKind::IllegalArgument => "java/lang/IllegalArgumentException",
            ExceptionKind::ArrayIndexOutOfBounds => "java/lang/ArrayIndexOutOfBoundsException",
            ExceptionKind::ArrayStore => "java/lang/ArrayStoreException",
            ExceptionKind::NegativeArraySize => "java/lang/NegativeArraySizeException",
            ExceptionKind::InvocationTarget => "java/lang/reflect/InvocationTargetException",
            ExceptionKind::Runtime => "java/lang/RuntimeException",
            ExceptionKind::ClassNotFound => "java/lang/ClassNotFoundException",
            ExceptionKind::ClassFormat => "java/lang/ClassFormatError",
            ExceptionKind::Linkage => "java/lang/LinkageError",
            ExceptionKind::WrongArgumentCount => "java/lang/IllegalArgumentException",
            ExceptionKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name().replace('/', "."))
    }
}

/// An exception value: kind, optional message, optional cause.
///
/// `object` links the value to a heap object when the execution engine has
/// materialized one (for exceptions thrown by Java code).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}{}", render_message(.message))]
pub struct Throwable {
    kind: ExceptionKind,
    message: Option<String>,
    #[source]
    cause: Option<Box<Throwable>>,
    object: Option<ObjectRef>,
}

fn render_message(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

impl Throwable {
    pub fn new(kind: ExceptionKind) -> Self {
        Self { kind, message: None, cause: None, object: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause(mut self, cause: Throwable) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }

    pub fn kind(&self) -> &ExceptionKind {
        &self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cause(&self) -> Option<&Throwable> {
        self.cause.as_deref()
    }

    pub fn object(&self) -> Option<ObjectRef> {
        self.object
    }

    // =========================================================================
    // Standard constructors
    // =========================================================================

    pub fn null_pointer() -> Self {
        Self::new(ExceptionKind::NullPointer)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IllegalArgument).with_message(message)
    }

    pub fn array_index_out_of_bounds(index: i64, length: usize) -> Self {
        Self::new(ExceptionKind::ArrayIndexOutOfBounds)
            .with_message(format!("Index {index} out of bounds for length {length}"))
    }

    pub fn array_store(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ArrayStore).with_message(message)
    }

    pub fn negative_array_size(length: i32) -> Self {
        Self::new(ExceptionKind::NegativeArraySize).with_message(length.to_string())
    }

    /// Wraps a failure raised by reflectively invoked code.
    pub fn invocation_target(cause: Throwable) -> Self {
        Self::new(ExceptionKind::InvocationTarget).with_cause(cause)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Runtime).with_message(message)
    }

    pub fn library_not_found(name: &str) -> Self {
        Self::runtime(format!("library not found: {name}"))
    }

    pub fn class_not_found(name: &str) -> Self {
        Self::new(ExceptionKind::ClassNotFound).with_message(name.replace('/', "."))
    }

    pub fn class_format(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ClassFormat).with_message(message)
    }

    pub fn linkage(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Linkage).with_message(message)
    }

    pub fn wrong_argument_count(expected: usize, actual: usize) -> Self {
        Self::new(ExceptionKind::WrongArgumentCount)
            .with_message(format!("wrong number of arguments: expected {expected}, got {actual}"))
    }

    /// An exception of an arbitrary class, as raised by Java code.
    pub fn thrown(class_name: &str) -> Self {
        Self::new(ExceptionKind::Other(Arc::from(class_name)))
    }
}
