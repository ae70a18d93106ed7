//! Runtime class metadata.
//!
//! A [`Class`] is immutable after definition except for its static slot
//! table, its initialization flags and its lazily created mirror. Fields and
//! methods are shared as `Arc`s so reflection mirrors and stack traces can
//! hold them without borrowing the class table.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::exception::{JavaResult, Throwable};
use crate::heap::ObjectRef;
use crate::natives::NativeLink;
use crate::sys::jni::{ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
use crate::value::{StaticSlot, Tag};
use crate::vm::fatal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const fn from_raw(raw: u32) -> Self {
        ClassId(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Instance,
    Array { element: Tag, component: ClassId },
    /// `None` is `void`.
    Primitive(Option<Tag>),
}

/// Instance layout: primitive byte area size and reference slot count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub bytes: usize,
    pub refs: usize,
}

#[derive(Debug)]
pub struct Field {
    pub class: ClassId,
    pub name: String,
    pub descriptor: String,
    pub tag: Tag,
    /// Byte offset (instance primitive), slot index (instance reference), or
    /// static table index (static).
    pub offset: usize,
    pub access_flags: u16,
}

impl Field {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

#[derive(Debug)]
pub struct Method {
    pub class: ClassId,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Declared parameters, plus one for the receiver of instance methods.
    pub parameter_count: usize,
    pub parameter_tags: Vec<Tag>,
    /// `None` for `void`.
    pub return_tag: Option<Tag>,
    /// `(start_pc, line)` pairs sorted by `start_pc`.
    pub line_numbers: Vec<(u16, u16)>,
    pub code: Option<Arc<[u8]>>,
    pub(crate) native: OnceLock<NativeLink>,
}

impl Method {
    pub fn new(class: ClassId, name: &str, descriptor: &str, access_flags: u16) -> Option<Self> {
        let (parameter_tags, return_tag) = parse_method_descriptor(descriptor)?;
        let receiver = usize::from(access_flags & ACC_STATIC == 0);
        Some(Self {
            class,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access_flags,
            parameter_count: parameter_tags.len() + receiver,
            parameter_tags,
            return_tag,
            line_numbers: Vec::new(),
            code: None,
            native: OnceLock::new(),
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    /// The linked native entry, if resolution already happened.
    pub fn native_link(&self) -> Option<&NativeLink> {
        self.native.get()
    }

    /// Source line for an instruction offset: -2 for native methods, -1
    /// when unknown.
    pub fn line_number(&self, ip: usize) -> i32 {
        if self.is_native() {
            return -2;
        }
        self.line_numbers
            .iter()
            .take_while(|(start, _)| usize::from(*start) <= ip)
            .last()
            .map_or(-1, |(_, line)| i32::from(*line))
    }
}

/// Class-initialization state bits.
pub mod init_flags {
    /// The class has a `<clinit>` that has not run yet.
    pub const NEED_INIT: u8 = 1 << 0;
    /// Initialization has started.
    pub const INIT: u8 = 1 << 1;
}

#[derive(Debug)]
pub struct Class {
    pub id: ClassId,
    /// Internal (slash-separated) name.
    pub name: Arc<str>,
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub access_flags: u16,
    pub kind: ClassKind,
    pub fields: Vec<Arc<Field>>,
    pub methods: Vec<Arc<Method>>,
    pub layout: Layout,
    pub source_file: Option<String>,
    statics: RwLock<Vec<StaticSlot>>,
    vm_flags: AtomicU8,
    mirror: OnceLock<ObjectRef>,
}

impl Class {
    pub fn new(id: ClassId, name: &str, super_class: Option<ClassId>, kind: ClassKind) -> Self {
        Self {
            id,
            name: Arc::from(name),
            super_class,
            interfaces: Vec::new(),
            access_flags: ACC_PUBLIC,
            kind,
            fields: Vec::new(),
            methods: Vec::new(),
            layout: Layout::default(),
            source_file: None,
            statics: RwLock::new(Vec::new()),
            vm_flags: AtomicU8::new(0),
            mirror: OnceLock::new(),
        }
    }

    pub fn with_statics(mut self, statics: Vec<StaticSlot>) -> Self {
        self.statics = RwLock::new(statics);
        self
    }

    pub fn with_vm_flags(self, flags: u8) -> Self {
        self.vm_flags.store(flags, Ordering::Release);
        self
    }

    pub fn dotted_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    pub fn array_element(&self) -> Option<Tag> {
        match self.kind {
            ClassKind::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<ClassId> {
        match self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Element width in bytes; 0 for anything that is not an array.
    pub fn array_element_size(&self) -> usize {
        self.array_element().map_or(0, Tag::size)
    }

    pub fn static_slot(&self, index: usize) -> Option<StaticSlot> {
        self.statics.read().get(index).copied()
    }

    /// Returns `false` when `index` is outside the static table.
    pub fn set_static_slot(&self, index: usize, slot: StaticSlot) -> bool {
        match self.statics.write().get_mut(index) {
            Some(dst) => {
                *dst = slot;
                true
            }
            None => false,
        }
    }

    pub fn vm_flags(&self) -> u8 {
        self.vm_flags.load(Ordering::Acquire)
    }

    pub fn set_vm_flags(&self, flags: u8) {
        self.vm_flags.fetch_or(flags, Ordering::AcqRel);
    }

    pub fn mirror(&self) -> Option<ObjectRef> {
        self.mirror.get().copied()
    }

    /// Installs the mirror unless another thread won; returns the winner.
    pub(crate) fn install_mirror(&self, mirror: ObjectRef) -> ObjectRef {
        *self.mirror.get_or_init(|| mirror)
    }

    pub fn find_field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Length of the field descriptor at the start of `desc`.
fn field_descriptor_len(desc: &[u8]) -> Option<usize> {
    match *desc.first()? {
        b'L' => desc.iter().position(|&c| c == b';').map(|end| end + 1),
        b'[' => field_descriptor_len(&desc[1..]).map(|n| n + 1),
        c => Tag::from_descriptor(c).map(|_| 1),
    }
}

/// Parameter tags and return tag (`None` for void) of a method descriptor.
pub fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<Tag>, Option<Tag>)> {
    let bytes = descriptor.as_bytes();
    let mut rest = bytes.strip_prefix(b"(")?;
    let mut params = Vec::new();
    while *rest.first()? != b')' {
        let len = field_descriptor_len(rest)?;
        params.push(Tag::from_descriptor(rest[0])?);
        rest = &rest[len..];
    }
    let ret = &rest[1..];
    let return_tag = match ret {
        b"V" => None,
        _ if field_descriptor_len(ret) == Some(ret.len()) => Some(Tag::from_descriptor(ret[0])?),
        _ => return None,
    };
    Some((params, return_tag))
}

/// The argument part of a method descriptor, e.g. `JI[BII` for `(JI[BII)I`.
pub fn argument_descriptor(descriptor: &str) -> Option<&str> {
    let end = descriptor.find(')')?;
    descriptor.get(1..end)
}

// =============================================================================
// Class table
// =============================================================================

/// Ids of the classes the bridge itself allocates instances of.
#[derive(Debug, Clone)]
pub struct WellKnown {
    pub object: ClassId,
    pub class: ClassId,
    pub string: ClassId,
    pub thread: ClassId,
    pub throwable: ClassId,
    pub stack_trace_element: ClassId,
    pub field: ClassId,
    pub method: ClassId,
    /// Indexed by primitive tag.
    pub boxes: [ClassId; 8],
    /// Indexed by primitive tag, `void` last.
    pub primitives: [ClassId; 9],
}

impl WellKnown {
    pub fn box_class(&self, tag: Tag) -> Option<ClassId> {
        self.boxes.get(tag as usize).copied()
    }

    pub fn primitive_class(&self, tag: Option<Tag>) -> ClassId {
        match tag {
            Some(t) if t.is_primitive() => self.primitives[t as usize],
            _ => self.primitives[8],
        }
    }
}

#[derive(Default)]
struct Classes {
    all: Vec<Arc<Class>>,
    by_name: FxHashMap<Arc<str>, ClassId>,
}

/// All defined classes, indexed by id and by internal name.
pub struct ClassTable {
    inner: RwLock<Classes>,
    well_known: WellKnown,
}

const BOX_CLASSES: [&str; 8] = [
    "java/lang/Byte",
    "java/lang/Boolean",
    "java/lang/Character",
    "java/lang/Short",
    "java/lang/Float",
    "java/lang/Double",
    "java/lang/Integer",
    "java/lang/Long",
];

const PRIMITIVE_NAMES: [&str; 9] =
    ["byte", "boolean", "char", "short", "float", "double", "int", "long", "void"];

impl ClassTable {
    /// A table holding the bootstrap classes.
    pub fn bootstrap() -> Self {
        let mut classes = Classes::default();
        let mut add = |name: &str, super_class: Option<ClassId>, kind: ClassKind| {
            let id = ClassId(classes.all.len() as u32);
            let mut class = Class::new(id, name, super_class, kind);
            if matches!(kind, ClassKind::Primitive(_)) {
                class.access_flags = ACC_PUBLIC | ACC_FINAL | ACC_ABSTRACT;
            }
            classes.by_name.insert(class.name.clone(), id);
            classes.all.push(Arc::new(class));
            id
        };

        let object = add("java/lang/Object", None, ClassKind::Instance);
        let obj = Some(object);
        let class = add("java/lang/Class", obj, ClassKind::Instance);
        let string = add("java/lang/String", obj, ClassKind::Instance);
        let thread = add("java/lang/Thread", obj, ClassKind::Instance);
        let throwable = add("java/lang/Throwable", obj, ClassKind::Instance);
        let stack_trace_element = add("java/lang/StackTraceElement", obj, ClassKind::Instance);
        let field = add("java/lang/reflect/Field", obj, ClassKind::Instance);
        let method = add("java/lang/reflect/Method", obj, ClassKind::Instance);
        let number = add("java/lang/Number", obj, ClassKind::Instance);
        let boxes = std::array::from_fn(|i| {
            let parent = if matches!(i, 1 | 2) { obj } else { Some(number) };
            add(BOX_CLASSES[i], parent, ClassKind::Instance)
        });
        let primitives = std::array::from_fn(|i| {
            add(PRIMITIVE_NAMES[i], None, ClassKind::Primitive(Tag::PRIMITIVES.get(i).copied()))
        });

        let well_known = WellKnown {
            object,
            class,
            string,
            thread,
            throwable,
            stack_trace_element,
            field,
            method,
            boxes,
            primitives,
        };
        Self { inner: RwLock::new(classes), well_known }
    }

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    pub fn len(&self) -> usize {
        self.inner.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ClassId) -> Option<Arc<Class>> {
        self.inner.read().all.get(id.index()).cloned()
    }

    /// Like [`get`](Self::get), but an unknown id aborts.
    pub fn class(&self, id: ClassId) -> Arc<Class> {
        self.get(id).unwrap_or_else(|| fatal(format!("unknown class id {id:?}")))
    }

    pub fn find(&self, name: &str) -> Option<Arc<Class>> {
        let inner = self.inner.read();
        inner.by_name.get(name).map(|id| inner.all[id.index()].clone())
    }

    /// Registers a new class under `name`. `build` receives the id the class
    /// will have and must not touch the table.
    pub fn define(
        &self,
        name: &str,
        build: impl FnOnce(ClassId) -> Class,
    ) -> JavaResult<Arc<Class>> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(name) {
            return Err(Throwable::linkage(format!(
                "duplicate class definition: {}",
                name.replace('/', ".")
            )));
        }
        let id = ClassId(inner.all.len() as u32);
        let class = Arc::new(build(id));
        inner.by_name.insert(class.name.clone(), id);
        inner.all.push(class.clone());
        Ok(class)
    }

    /// The array class whose components are `component`, created on first
    /// use.
    pub fn array_class(&self, component: ClassId) -> Arc<Class> {
        let component_class = self.class(component);
        let (name, element) = match component_class.kind {
            ClassKind::Primitive(Some(tag)) => {
                (format!("[{}", tag.descriptor() as char), tag)
            }
            ClassKind::Primitive(None) => fatal("array of void"),
            ClassKind::Array { .. } => (format!("[{}", component_class.name), Tag::Object),
            ClassKind::Instance => (format!("[L{};", component_class.name), Tag::Object),
        };
        if let Some(existing) = self.find(&name) {
            return existing;
        }
        let object = self.well_known.object;
        let built = self.define(&name, |id| {
            let mut class =
                Class::new(id, &name, Some(object), ClassKind::Array { element, component });
            class.access_flags = ACC_PUBLIC | ACC_FINAL | ACC_ABSTRACT;
            class
        });
        match built {
            Ok(class) => class,
            // Lost a race with another thread creating the same array class.
            Err(_) => self.find(&name).unwrap_or_else(|| fatal("array class vanished")),
        }
    }

    /// Walks `sub`'s superclass chain looking for `sup`.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.get(id).and_then(|c| c.super_class);
        }
        false
    }

    fn implements(&self, class: ClassId, interface: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            let Some(c) = self.get(id) else { return false };
            for &i in &c.interfaces {
                if i == interface || self.implements(i, interface) {
                    return true;
                }
            }
            current = c.super_class;
        }
        false
    }

    /// Whether a value of class `source` can be stored where `target` is
    /// expected.
    pub fn is_assignable_from(&self, target: ClassId, source: ClassId) -> bool {
        if target == source {
            return true;
        }
        let (Some(t), Some(s)) = (self.get(target), self.get(source)) else {
            return false;
        };
        match (&t.kind, &s.kind) {
            (_, ClassKind::Primitive(_)) | (ClassKind::Primitive(_), _) => false,
            (ClassKind::Instance, _) if t.is_interface() => self.implements(source, target),
            (
                ClassKind::Array { element: Tag::Object, component: tc },
                ClassKind::Array { element: Tag::Object, component: sc },
            ) => self.is_assignable_from(*tc, *sc),
            (ClassKind::Array { .. }, _) => false,
            (ClassKind::Instance, ClassKind::Array { .. }) => target == self.well_known.object,
            (ClassKind::Instance, ClassKind::Instance) => self.is_subclass(source, target),
        }
    }

    /// Finds a method by name and descriptor, walking up the superclasses.
    pub fn find_method(&self, class: ClassId, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.get(id)?;
            if let Some(m) = c.find_declared_method(name, descriptor) {
                return Some(m.clone());
            }
            current = c.super_class;
        }
        None
    }
}
