//! Arena heap.
//!
//! Objects and arrays live in a slot arena addressed by [`ObjectRef`]
//! indices. Instance bodies keep primitive fields in a little-endian byte
//! area and reference fields in a separate slot area, so a field offset is
//! either a byte offset or a slot index depending on its tag. Every
//! reference store goes through [`Heap::write_barrier`], which records the
//! written object for the collector.

use std::sync::Arc;

use crate::class::{ClassId, Field, Method};
use crate::value::{Tag, Value, REFERENCE_SIZE};
use crate::vm::fatal;

/// Fixed per-object accounting overhead.
const HEADER_SIZE: usize = 16;

/// Index of a live object in the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(u32);

impl ObjectRef {
    pub const fn from_raw(raw: u32) -> Self {
        ObjectRef(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reflection mirror payloads.
#[derive(Debug, Clone)]
pub enum Mirror {
    Class(ClassId),
    Field(Arc<Field>),
    Method(Arc<Method>),
}

/// One captured frame of a stack trace.
#[derive(Debug, Clone)]
pub struct TraceElement {
    pub method: Arc<Method>,
    pub ip: usize,
}

/// Resolved, printable stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTraceElement {
    pub declaring_class: String,
    pub method_name: String,
    pub file_name: Option<String>,
    pub line_number: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayBody {
    Primitive { tag: Tag, data: Vec<u8> },
    References(Vec<Option<ObjectRef>>),
}

impl ArrayBody {
    pub fn zeroed(tag: Tag, length: usize) -> Self {
        match tag {
            Tag::Object => ArrayBody::References(vec![None; length]),
            tag => ArrayBody::Primitive { tag, data: vec![0; length * tag.size()] },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayBody::Primitive { tag, data } => data.len() / tag.size(),
            ArrayBody::References(slots) => slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag(&self) -> Tag {
        match self {
            ArrayBody::Primitive { tag, .. } => *tag,
            ArrayBody::References(_) => Tag::Object,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ObjectBody {
    Instance { bytes: Box<[u8]>, refs: Box<[Option<ObjectRef>]> },
    Array(ArrayBody),
    String(String),
    Boxed(Value),
    Mirror(Mirror),
    Trace(Vec<TraceElement>),
    StackTraceElement(StackTraceElement),
}

impl ObjectBody {
    /// A zeroed instance body for a layout of `bytes` primitive bytes and
    /// `refs` reference slots.
    pub fn instance(bytes: usize, refs: usize) -> Self {
        ObjectBody::Instance {
            bytes: vec![0; bytes].into_boxed_slice(),
            refs: vec![None; refs].into_boxed_slice(),
        }
    }

    fn footprint(&self) -> usize {
        HEADER_SIZE
            + match self {
                ObjectBody::Instance { bytes, refs } => bytes.len() + refs.len() * REFERENCE_SIZE,
                ObjectBody::Array(ArrayBody::Primitive { data, .. }) => data.len(),
                ObjectBody::Array(ArrayBody::References(slots)) => slots.len() * REFERENCE_SIZE,
                ObjectBody::String(s) => s.len(),
                ObjectBody::Boxed(_) => 8,
                ObjectBody::Mirror(_) => REFERENCE_SIZE,
                ObjectBody::Trace(frames) => frames.len() * 2 * REFERENCE_SIZE,
                ObjectBody::StackTraceElement(e) => {
                    e.declaring_class.len() + e.method_name.len() + 4
                }
            }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    class: ClassId,
    hash: i32,
    pub body: ObjectBody,
}

impl Object {
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn identity_hash(&self) -> i32 {
        self.hash
    }

    pub fn as_array(&self) -> Option<&ArrayBody> {
        match &self.body {
            ObjectBody::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayBody> {
        match &mut self.body {
            ObjectBody::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.body {
            ObjectBody::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mirror(&self) -> Option<&Mirror> {
        match &self.body {
            ObjectBody::Mirror(m) => Some(m),
            _ => None,
        }
    }
}

/// The object arena.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Object>>,
    free: Vec<u32>,
    dirty: Vec<ObjectRef>,
    bytes_used: usize,
    hash_seed: u32,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, class: ClassId, body: ObjectBody) -> ObjectRef {
        self.bytes_used += body.footprint();
        let object = Object { class, hash: self.next_hash(), body };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(object);
                ObjectRef(index)
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| fatal("object arena exhausted"));
                self.slots.push(Some(object));
                ObjectRef(index)
            }
        }
    }

    /// Identity hashes are non-negative and stable for the object's life.
    fn next_hash(&mut self) -> i32 {
        self.hash_seed = self.hash_seed.wrapping_add(0x9E37_79B9);
        let mut x = self.hash_seed;
        x ^= x >> 16;
        x = x.wrapping_mul(0x85EB_CA6B);
        x ^= x >> 13;
        (x & 0x7FFF_FFFF) as i32
    }

    pub fn get(&self, r: ObjectRef) -> Option<&Object> {
        self.slots.get(r.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut Object> {
        self.slots.get_mut(r.index()).and_then(Option::as_mut)
    }

    /// Like [`get`](Self::get), but a dangling reference aborts.
    pub fn object(&self, r: ObjectRef) -> &Object {
        self.get(r).unwrap_or_else(|| fatal(format!("dangling object reference {r:?}")))
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> &mut Object {
        match self.slots.get_mut(r.index()).and_then(Option::as_mut) {
            Some(object) => object,
            None => fatal(format!("dangling object reference {r:?}")),
        }
    }

    pub fn class_of(&self, r: ObjectRef) -> ClassId {
        self.object(r).class
    }

    pub fn identity_hash(&self, r: ObjectRef) -> i32 {
        self.object(r).hash
    }

    /// Records a reference store into `r` for the collector.
    pub fn write_barrier(&mut self, r: ObjectRef) {
        if self.dirty.last() != Some(&r) {
            self.dirty.push(r);
        }
    }

    /// Drains the objects written since the last call.
    pub fn take_dirty(&mut self) -> Vec<ObjectRef> {
        std::mem::take(&mut self.dirty)
    }

    /// Unwraps a reference to a boxed primitive; anything else passes through.
    pub fn unbox(&self, value: Value) -> Value {
        match value {
            Value::Reference(Some(r)) => match self.get(r).map(|o| &o.body) {
                Some(ObjectBody::Boxed(v)) => *v,
                _ => value,
            },
            other => other,
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|o| (ObjectRef(i as u32), o)))
    }

    /// Frees every object for which `keep` returns false. Returns the number
    /// of objects freed.
    pub fn retain(&mut self, mut keep: impl FnMut(ObjectRef, &Object) -> bool) -> usize {
        let mut freed = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let r = ObjectRef(i as u32);
            let drop_it = matches!(slot, Some(object) if !keep(r, object));
            if drop_it {
                if let Some(object) = slot.take() {
                    self.bytes_used -= object.body.footprint();
                }
                self.free.push(i as u32);
                freed += 1;
            }
        }
        self.dirty.retain(|r| self.slots[r.index()].is_some());
        freed
    }
}
