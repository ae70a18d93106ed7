//! The VM: shared state and the collaborator seams.
//!
//! [`Vm`] owns the heap, the class table, monitors, the thread registry and
//! the builtin registry, and holds the pluggable collaborators: the
//! execution [`Engine`] (required), the [`Collector`], the
//! [`ResourceFinder`] and the [`Host`]. Build one with [`Vm::builder`].
//!
//! Lock order: class-initialization lock, then intern table, then heap,
//! then monitor table. The in-progress definition set is only held for a
//! lookup. Never create a class mirror or intern a string while
//! holding the heap lock.

use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::class::{init_flags, Class, ClassId, ClassKind, ClassTable, Field, Method};
use crate::config::VmConfig;
use crate::error::VmError;
use crate::exception::{ExceptionKind, JavaResult, Throwable};
use crate::finder::{ClassPath, ResourceFinder};
use crate::heap::{ArrayBody, Heap, Mirror, ObjectBody, ObjectRef};
use crate::library::NativeLibraries;
use crate::linker;
use crate::monitor::MonitorTable;
use crate::natives::resource::ResourceHandles;
use crate::natives::{BuiltinRegistry, NativeLink, NativeResolver};
use crate::thread::{Thread, ThreadId, ThreadShared, ThreadState};
use crate::value::{Tag, Value};

/// Logs `message` and aborts the process.
///
/// Reserved for broken internal invariants (corrupt metadata, dangling
/// handles, an overwritten pending exception), never for Java-level errors.
#[cold]
pub fn fatal(message: impl fmt::Display) -> ! {
    error!(%message, "fatal VM error");
    std::process::abort()
}

// =============================================================================
// Collaborators
// =============================================================================

/// Runs Java methods. The bridge never interprets bytecode itself.
pub trait Engine: Send + Sync {
    /// Runs `method` synchronously. `receiver` is `None` for static methods;
    /// `args` excludes the receiver.
    fn invoke(
        &self,
        thread: &mut Thread,
        method: &Arc<Method>,
        receiver: Option<ObjectRef>,
        args: &[Value],
    ) -> JavaResult<Value>;

    /// Body of a thread started by `Thread.doStart`: calls `run()V` on the
    /// peer.
    fn run_thread(&self, thread: &mut Thread) -> JavaResult<()> {
        let Some(peer) = thread.peer() else { return Ok(()) };
        let vm = thread.vm().clone();
        let class = vm.heap().read().class_of(peer);
        match vm.classes().find_method(class, "run", "()V") {
            Some(run) => self.invoke(thread, &run, Some(peer), &[]).map(drop),
            None => Ok(()),
        }
    }
}

/// Reclaims heap objects. Called with the heap held exclusively.
pub trait Collector: Send + Sync {
    fn collect(&self, heap: &mut Heap);
}

/// Collector that never frees anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainAll;

impl Collector for RetainAll {
    fn collect(&self, _heap: &mut Heap) {}
}

/// OS services: thread start and process exit.
pub trait Host: Send + Sync {
    fn start(
        &self,
        name: &str,
        stack_size: Option<usize>,
        body: Box<dyn FnOnce() + Send>,
    ) -> io::Result<()>;

    fn exit(&self, code: i32) -> !;
}

/// [`Host`] backed by `std::thread` and `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

impl Host for StdHost {
    fn start(
        &self,
        name: &str,
        stack_size: Option<usize>,
        body: Box<dyn FnOnce() + Send>,
    ) -> io::Result<()> {
        let mut builder = std::thread::Builder::new().name(name.to_owned());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(body).map(drop)
    }

    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`Vm`].
pub struct VmBuilder {
    config: VmConfig,
    engine: Option<Arc<dyn Engine>>,
    collector: Arc<dyn Collector>,
    host: Arc<dyn Host>,
    finders: Vec<Box<dyn ResourceFinder>>,
    registry: Option<Arc<BuiltinRegistry>>,
}

impl Default for VmBuilder {
    fn default() -> Self {
        Self {
            config: VmConfig::default(),
            engine: None,
            collector: Arc::new(RetainAll),
            host: Arc::new(StdHost),
            finders: Vec::new(),
            registry: None,
        }
    }
}

impl VmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a classpath entry (directory or jar).
    pub fn classpath(mut self, entry: impl Into<PathBuf>) -> Self {
        self.config.classpath.push(entry.into());
        self
    }

    /// Append a native library search directory.
    pub fn library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.library_path.push(dir.into());
        self
    }

    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.config.thread_stack_size = Some(bytes);
        self
    }

    pub fn max_heap_bytes(mut self, bytes: usize) -> Self {
        self.config.max_heap_bytes = bytes;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn engine(mut self, engine: impl Engine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    pub fn collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collector = Arc::new(collector);
        self
    }

    pub fn host(mut self, host: impl Host + 'static) -> Self {
        self.host = Arc::new(host);
        self
    }

    /// Add a resource finder searched after the configured classpath.
    pub fn finder(mut self, finder: impl ResourceFinder + 'static) -> Self {
        self.finders.push(Box::new(finder));
        self
    }

    /// Use a prebuilt registry instead of bootstrapping a fresh one.
    pub fn registry(mut self, registry: Arc<BuiltinRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Arc<Vm>, VmError> {
        let engine = self.engine.ok_or(VmError::MissingEngine)?;
        let mut finder = ClassPath::from_paths(&self.config.classpath)?;
        for extra in self.finders {
            finder.push(extra);
        }
        let registry = self.registry.unwrap_or_else(|| Arc::new(BuiltinRegistry::bootstrap()));
        let classes = ClassTable::bootstrap();
        debug!(
            classpath = finder.len(),
            builtins = registry.len(),
            bootstrap_classes = classes.len(),
            "VM created"
        );
        Ok(Arc::new(Vm {
            config: self.config,
            heap: RwLock::new(Heap::new()),
            classes,
            monitors: MonitorTable::new(),
            threads: Mutex::new(FxHashMap::default()),
            next_thread_id: AtomicU64::new(1),
            interned: Mutex::new(FxHashMap::default()),
            libraries: NativeLibraries::new(),
            resources: ResourceHandles::default(),
            class_init_lock: ReentrantMutex::new(()),
            defining: Mutex::new(FxHashMap::default()),
            scratch_bytes: AtomicUsize::new(0),
            engine,
            collector: self.collector,
            finder,
            host: self.host,
            registry,
        }))
    }
}

// =============================================================================
// Vm
// =============================================================================

pub struct Vm {
    config: VmConfig,
    heap: RwLock<Heap>,
    classes: ClassTable,
    monitors: MonitorTable,
    threads: Mutex<FxHashMap<ThreadId, Arc<ThreadShared>>>,
    next_thread_id: AtomicU64,
    interned: Mutex<FxHashMap<String, ObjectRef>>,
    libraries: NativeLibraries,
    pub(crate) resources: ResourceHandles,
    class_init_lock: ReentrantMutex<()>,
    /// Classes whose definition is in progress, with the defining OS thread.
    defining: Mutex<FxHashMap<String, std::thread::ThreadId>>,
    scratch_bytes: AtomicUsize,
    engine: Arc<dyn Engine>,
    collector: Arc<dyn Collector>,
    finder: ClassPath,
    host: Arc<dyn Host>,
    registry: Arc<BuiltinRegistry>,
}

impl Vm {
    pub fn builder() -> VmBuilder {
        VmBuilder::new()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &RwLock<Heap> {
        &self.heap
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    pub fn libraries(&self) -> &NativeLibraries {
        &self.libraries
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn finder(&self) -> &dyn ResourceFinder {
        &self.finder
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    // =========================================================================
    // Classes
    // =========================================================================

    /// Defines a class from class-file bytes.
    pub fn define_class(&self, bytes: &[u8]) -> JavaResult<Arc<Class>> {
        linker::define_class(self, bytes, None)
    }

    /// Finds a loaded class or loads `name` (internal form) through the
    /// classpath. Array names resolve their component first.
    pub fn resolve_class(&self, name: &str) -> JavaResult<Arc<Class>> {
        if let Some(class) = self.classes.find(name) {
            return Ok(class);
        }
        if let Some(component) = name.strip_prefix('[') {
            let component = self.resolve_component(component).ok_or_else(|| Throwable::class_not_found(name))??;
            return Ok(self.classes.array_class(component.id));
        }
        let bytes = self
            .finder
            .find(&format!("{name}.class"))
            .ok_or_else(|| Throwable::class_not_found(name))?;
        match linker::define_class(self, &bytes, Some(name)) {
            // Another thread defined it first.
            Err(e) if *e.kind() == ExceptionKind::Linkage => self.classes.find(name).ok_or(e),
            other => other,
        }
    }

    /// Marks `name` as being defined by the calling thread until the guard
    /// drops. Reaching `name` again on the same thread, through superclasses
    /// or interfaces, is a `ClassCircularityError`. A definition running on
    /// another thread gets no guard; the class table settles that race.
    pub(crate) fn begin_definition(&self, name: &str) -> JavaResult<Option<DefinitionGuard<'_>>> {
        let current = std::thread::current().id();
        let mut defining = self.defining.lock();
        match defining.get(name) {
            Some(owner) if *owner == current => {
                Err(Throwable::thrown("java/lang/ClassCircularityError").with_message(name.replace('/', ".")))
            }
            Some(_) => Ok(None),
            None => {
                defining.insert(name.to_owned(), current);
                Ok(Some(DefinitionGuard { vm: self, name: name.to_owned() }))
            }
        }
    }

    fn resolve_component(&self, descriptor: &str) -> Option<JavaResult<Arc<Class>>> {
        match *descriptor.as_bytes().first()? {
            b'L' => {
                let name = descriptor.strip_prefix('L')?.strip_suffix(';')?;
                Some(self.resolve_class(name))
            }
            b'[' => Some(self.resolve_class(descriptor)),
            c if descriptor.len() == 1 => {
                let tag = Tag::from_descriptor(c).filter(|t| t.is_primitive())?;
                let id = self.classes.well_known().primitive_class(Some(tag));
                Some(Ok(self.classes.class(id)))
            }
            _ => None,
        }
    }

    /// Runs the static initializer of `class` (after its superclass's) once.
    ///
    /// Holds the class-initialization lock throughout; the guard is released
    /// on every path, including initializer failure, which propagates as is.
    pub fn initialize_class(&self, thread: &mut Thread, class: &Arc<Class>) -> JavaResult<()> {
        let _init = self.class_init_lock.lock();
        let flags = class.vm_flags();
        if flags & init_flags::NEED_INIT == 0 || flags & init_flags::INIT != 0 {
            return Ok(());
        }
        class.set_vm_flags(init_flags::INIT);
        if let Some(super_class) = class.super_class.and_then(|id| self.classes.get(id)) {
            self.initialize_class(thread, &super_class)?;
        }
        debug!(class = %class.name, "running static initializer");
        match class.find_declared_method("<clinit>", "()V") {
            Some(clinit) => self.engine.clone().invoke(thread, clinit, None, &[]).map(drop),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// The `java.lang.Class` object for `id`, created on first use.
    pub fn class_mirror(&self, id: ClassId) -> ObjectRef {
        let class = self.classes.class(id);
        if let Some(mirror) = class.mirror() {
            return mirror;
        }
        let mirror = self
            .heap
            .write()
            .allocate(self.classes.well_known().class, ObjectBody::Mirror(Mirror::Class(id)));
        class.install_mirror(mirror)
    }

    pub fn field_mirror(&self, field: &Arc<Field>) -> ObjectRef {
        let class = self.classes.well_known().field;
        self.heap.write().allocate(class, ObjectBody::Mirror(Mirror::Field(field.clone())))
    }

    pub fn method_mirror(&self, method: &Arc<Method>) -> ObjectRef {
        let class = self.classes.well_known().method;
        self.heap.write().allocate(class, ObjectBody::Mirror(Mirror::Method(method.clone())))
    }

    pub fn new_string(&self, value: &str) -> ObjectRef {
        let class = self.classes.well_known().string;
        self.heap.write().allocate(class, ObjectBody::String(value.to_owned()))
    }

    /// The canonical string object for `value`.
    pub fn intern(&self, value: &str) -> ObjectRef {
        let mut interned = self.interned.lock();
        if let Some(&r) = interned.get(value) {
            return r;
        }
        let r = self.new_string(value);
        interned.insert(value.to_owned(), r);
        r
    }

    /// Contents of a `java.lang.String` object.
    pub fn string_value(&self, r: ObjectRef) -> JavaResult<String> {
        self.heap
            .read()
            .object(r)
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Throwable::illegal_argument("not a string"))
    }

    /// Boxes primitives; references pass through.
    pub fn box_value(&self, value: Value) -> Value {
        let Some(class) = self.classes.well_known().box_class(value.tag()) else {
            return value;
        };
        Value::Reference(Some(self.heap.write().allocate(class, ObjectBody::Boxed(value))))
    }

    /// Allocates a zeroed instance of `class`.
    pub fn new_instance(&self, class: &Class) -> JavaResult<ObjectRef> {
        if class.is_array() || class.is_primitive() {
            return Err(Throwable::illegal_argument(format!(
                "cannot instantiate {}",
                class.dotted_name()
            )));
        }
        let body = ObjectBody::instance(class.layout.bytes, class.layout.refs);
        Ok(self.heap.write().allocate(class.id, body))
    }

    /// Allocates a zeroed array whose components are `component`.
    pub fn new_array(&self, component: ClassId, length: i32) -> JavaResult<ObjectRef> {
        let len = usize::try_from(length).map_err(|_| Throwable::negative_array_size(length))?;
        if self.classes.class(component).kind == ClassKind::Primitive(None) {
            return Err(Throwable::illegal_argument("array of void"));
        }
        let array = self.classes.array_class(component);
        let tag = array.array_element().unwrap_or(Tag::Object);
        Ok(self.heap.write().allocate(array.id, ObjectBody::Array(ArrayBody::zeroed(tag, len))))
    }

    /// Heap budget minus bytes in use, floored at zero.
    pub fn free_memory(&self) -> usize {
        self.config.max_heap_bytes.saturating_sub(self.heap.read().bytes_used())
    }

    // =========================================================================
    // Threads
    // =========================================================================

    fn register_thread(&self) -> Arc<ThreadShared> {
        let id = ThreadId::from_raw(self.next_thread_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(ThreadShared::new(id));
        self.threads.lock().insert(id, shared.clone());
        shared
    }

    pub(crate) fn forget_thread(&self, id: ThreadId) {
        self.threads.lock().remove(&id);
    }

    /// Creates a context for the calling OS thread. Without a `peer`, a
    /// fresh `java.lang.Thread` object is allocated.
    pub fn attach_current_thread(self: &Arc<Self>, peer: Option<ObjectRef>) -> Thread {
        let peer = peer.unwrap_or_else(|| {
            let class = self.classes.class(self.classes.well_known().thread);
            let body = ObjectBody::instance(class.layout.bytes, class.layout.refs);
            self.heap.write().allocate(class.id, body)
        });
        Thread::new(self.clone(), self.register_thread(), Some(peer))
    }

    /// Starts a host thread running `peer`. `None` if the host refused; the
    /// context is torn down in that case.
    pub fn spawn_thread(self: &Arc<Self>, peer: ObjectRef) -> Option<ThreadId> {
        let shared = self.register_thread();
        let id = shared.id();
        let mut thread = Thread::new(self.clone(), shared, Some(peer));
        let name = format!("{}{}", self.config.thread_name_prefix, id.get());
        let body = Box::new(move || {
            let engine = thread.vm().engine().clone();
            if let Err(exception) = engine.run_thread(&mut thread) {
                debug!(thread = id.get(), %exception, "thread ended with uncaught exception");
            }
        });
        match self.host.start(&name, self.config.thread_stack_size, body) {
            Ok(()) => {
                debug!(thread = id.get(), name = %name, "thread started");
                Some(id)
            }
            Err(e) => {
                warn!(thread = id.get(), error = %e, "host failed to start thread");
                self.forget_thread(id);
                None
            }
        }
    }

    pub fn thread(&self, id: ThreadId) -> Option<Arc<ThreadShared>> {
        self.threads.lock().get(&id).cloned()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    // =========================================================================
    // Exclusive state
    // =========================================================================

    /// Blocks every other mutator until the guard drops.
    pub fn enter_exclusive(&self, thread: &Thread) -> ExclusiveGuard<'_> {
        let heap = self.heap.write();
        let previous = thread.shared().set_state(ThreadState::Exclusive);
        ExclusiveGuard { heap, shared: thread.shared().clone(), previous }
    }

    /// Runs the collector with the heap held exclusively.
    pub fn collect(&self, thread: &Thread) {
        let mut heap = self.enter_exclusive(thread);
        let before = heap.live_objects();
        self.collector.collect(&mut heap);
        self.monitors.prune(|r| heap.get(r).is_some());
        debug!(
            freed = before.saturating_sub(heap.live_objects()),
            live = heap.live_objects(),
            "collection finished"
        );
    }

    // =========================================================================
    // Scratch buffers and natives
    // =========================================================================

    /// Copies `bytes` into a scratch buffer accounted against the VM until
    /// the returned guard drops.
    pub fn scratch(&self, bytes: &[u8]) -> Scratch<'_> {
        self.scratch_bytes.fetch_add(bytes.len(), Ordering::AcqRel);
        trace!(len = bytes.len(), "acquired scratch buffer");
        Scratch { vm: self, bytes: bytes.to_vec() }
    }

    /// Bytes currently held in scratch buffers.
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes.load(Ordering::Acquire)
    }

    /// Links `method` to its native entry, once.
    pub fn resolve_native(&self, method: &Method) -> JavaResult<NativeLink> {
        let class = self.classes.class(method.class);
        NativeResolver::new(&self.registry, &self.libraries).resolve(&class, method)
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.config)
            .field("classes", &self.classes.len())
            .field("threads", &self.thread_count())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the heap; restores the thread's state on drop.
pub struct ExclusiveGuard<'a> {
    heap: RwLockWriteGuard<'a, Heap>,
    shared: Arc<ThreadShared>,
    previous: ThreadState,
}

impl Deref for ExclusiveGuard<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        &self.heap
    }
}

impl DerefMut for ExclusiveGuard<'_> {
    fn deref_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.shared.set_state(self.previous);
    }
}

/// An in-progress class definition; see [`Vm::begin_definition`].
pub(crate) struct DefinitionGuard<'a> {
    vm: &'a Vm,
    name: String,
}

impl Drop for DefinitionGuard<'_> {
    fn drop(&mut self) {
        self.vm.defining.lock().remove(&self.name);
    }
}

/// A VM-accounted copy of caller bytes.
pub struct Scratch<'a> {
    vm: &'a Vm,
    bytes: Vec<u8>,
}

impl Deref for Scratch<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.vm.scratch_bytes.fetch_sub(self.bytes.len(), Ordering::AcqRel);
        trace!(len = self.bytes.len(), "released scratch buffer");
    }
}
