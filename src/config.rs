//! VM configuration.

use std::path::PathBuf;

/// Default heap budget reported by `Runtime.freeMemory`.
pub const DEFAULT_MAX_HEAP_BYTES: usize = 64 * 1024 * 1024;

/// Settings fixed at VM construction. Built through
/// [`VmBuilder`](crate::vm::VmBuilder).
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Directories and jar files searched by `SystemClassLoader`, in order.
    pub classpath: Vec<PathBuf>,
    /// Directories searched by `Runtime.loadLibrary`, in order.
    pub library_path: Vec<PathBuf>,
    /// Stack size for spawned threads; `None` uses the host default.
    pub thread_stack_size: Option<usize>,
    pub max_heap_bytes: usize,
    /// Spawned threads are named `<prefix><id>`.
    pub thread_name_prefix: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            library_path: Vec::new(),
            thread_stack_size: None,
            max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
            thread_name_prefix: "java-thread-".to_string(),
        }
    }
}
