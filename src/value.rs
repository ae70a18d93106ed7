//! Type tags and tagged values.
//!
//! Every typed access in the bridge (instance fields, static fields, array
//! elements, reflective arguments) goes through [`Tag`] and [`Value`]. The
//! primitive width and decoding of each tag live in one codec table indexed
//! by the tag, so field and array accessors share the same dispatch.

use crate::exception::{JavaResult, Throwable};
use crate::heap::ObjectRef;
use crate::sys::jni::{jbyte, jchar, jdouble, jfloat, jint, jlong, jshort};

/// Storage width of a reference slot.
pub const REFERENCE_SIZE: usize = std::mem::size_of::<u32>();

/// The nine storage kinds of a field or array element.
///
/// The discriminants index the codec table; `Object` is last and has no
/// codec entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Byte = 0,
    Boolean = 1,
    Char = 2,
    Short = 3,
    Float = 4,
    Double = 5,
    Int = 6,
    Long = 7,
    Object = 8,
}

impl Tag {
    pub const PRIMITIVES: [Tag; 8] = [
        Tag::Byte,
        Tag::Boolean,
        Tag::Char,
        Tag::Short,
        Tag::Float,
        Tag::Double,
        Tag::Int,
        Tag::Long,
    ];

    /// Maps the first character of a field descriptor to its tag.
    pub fn from_descriptor(c: u8) -> Option<Tag> {
        match c {
            b'B' => Some(Tag::Byte),
            b'Z' => Some(Tag::Boolean),
            b'C' => Some(Tag::Char),
            b'S' => Some(Tag::Short),
            b'F' => Some(Tag::Float),
            b'D' => Some(Tag::Double),
            b'I' => Some(Tag::Int),
            b'J' => Some(Tag::Long),
            b'L' | b'[' => Some(Tag::Object),
            _ => None,
        }
    }

    pub fn descriptor(self) -> u8 {
        match self {
            Tag::Byte => b'B',
            Tag::Boolean => b'Z',
            Tag::Char => b'C',
            Tag::Short => b'S',
            Tag::Float => b'F',
            Tag::Double => b'D',
            Tag::Int => b'I',
            Tag::Long => b'J',
            Tag::Object => b'L',
        }
    }

    pub fn java_name(self) -> &'static str {
        match self {
            Tag::Byte => "byte",
            Tag::Boolean => "boolean",
            Tag::Char => "char",
            Tag::Short => "short",
            Tag::Float => "float",
            Tag::Double => "double",
            Tag::Int => "int",
            Tag::Long => "long",
            Tag::Object => "reference",
        }
    }

    pub fn is_primitive(self) -> bool {
        self != Tag::Object
    }

    /// Long and double occupy a 64-bit slot in static storage.
    pub fn is_wide(self) -> bool {
        matches!(self, Tag::Long | Tag::Double)
    }

    /// Storage width in bytes of an instance field or array element.
    pub fn size(self) -> usize {
        match self.codec() {
            Some(codec) => codec.width,
            None => REFERENCE_SIZE,
        }
    }

    fn codec(self) -> Option<&'static Codec> {
        CODECS.get(self as usize)
    }
}

// =============================================================================
// Codec table
// =============================================================================

struct Codec {
    width: usize,
    from_bits: fn(u64) -> Value,
}

fn byte_from_bits(bits: u64) -> Value {
    Value::Byte(bits as u8 as jbyte)
}

fn boolean_from_bits(bits: u64) -> Value {
    Value::Boolean(bits as u8 != 0)
}

fn char_from_bits(bits: u64) -> Value {
    Value::Char(bits as jchar)
}

fn short_from_bits(bits: u64) -> Value {
    Value::Short(bits as u16 as jshort)
}

fn float_from_bits(bits: u64) -> Value {
    Value::Float(f32::from_bits(bits as u32))
}

fn double_from_bits(bits: u64) -> Value {
    Value::Double(f64::from_bits(bits))
}

fn int_from_bits(bits: u64) -> Value {
    Value::Int(bits as u32 as jint)
}

fn long_from_bits(bits: u64) -> Value {
    Value::Long(bits as jlong)
}

static CODECS: [Codec; 8] = [
    Codec { width: 1, from_bits: byte_from_bits },
    Codec { width: 1, from_bits: boolean_from_bits },
    Codec { width: 2, from_bits: char_from_bits },
    Codec { width: 2, from_bits: short_from_bits },
    Codec { width: 4, from_bits: float_from_bits },
    Codec { width: 8, from_bits: double_from_bits },
    Codec { width: 4, from_bits: int_from_bits },
    Codec { width: 8, from_bits: long_from_bits },
];

/// Decodes a primitive of kind `tag` from the first `tag.size()` bytes.
///
/// Returns `None` for `Tag::Object` or when `bytes` is too short.
pub fn load(tag: Tag, bytes: &[u8]) -> Option<Value> {
    let codec = tag.codec()?;
    let raw = bytes.get(..codec.width)?;
    let mut buf = [0u8; 8];
    buf[..codec.width].copy_from_slice(raw);
    Some((codec.from_bits)(u64::from_le_bytes(buf)))
}

/// Encodes a primitive at its own width into the front of `bytes`.
///
/// Returns `false`, leaving `bytes` untouched, for references or when
/// `bytes` is too short.
pub fn store(value: Value, bytes: &mut [u8]) -> bool {
    let (Some(bits), Some(codec)) = (value.bits(), value.tag().codec()) else {
        return false;
    };
    match bytes.get_mut(..codec.width) {
        Some(dst) => {
            dst.copy_from_slice(&bits.to_le_bytes()[..codec.width]);
            true
        }
        None => false,
    }
}

// =============================================================================
// Value
// =============================================================================

/// A tagged value: a primitive payload or a (nullable) heap reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Byte(jbyte),
    Boolean(bool),
    Char(jchar),
    Short(jshort),
    Float(jfloat),
    Double(jdouble),
    Int(jint),
    Long(jlong),
    Reference(Option<ObjectRef>),
}

impl Value {
    pub const NULL: Value = Value::Reference(None);

    pub fn tag(&self) -> Tag {
        match self {
            Value::Byte(_) => Tag::Byte,
            Value::Boolean(_) => Tag::Boolean,
            Value::Char(_) => Tag::Char,
            Value::Short(_) => Tag::Short,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Int(_) => Tag::Int,
            Value::Long(_) => Tag::Long,
            Value::Reference(_) => Tag::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Reference(None))
    }

    /// The reference payload, or `None` for primitives.
    pub fn as_reference(&self) -> Option<Option<ObjectRef>> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Raw payload bits zero-extended from the value's own width.
    pub fn bits(&self) -> Option<u64> {
        let bits = match *self {
            Value::Byte(v) => v as u8 as u64,
            Value::Boolean(v) => v as u64,
            Value::Char(v) => v as u64,
            Value::Short(v) => v as u16 as u64,
            Value::Float(v) => v.to_bits() as u64,
            Value::Double(v) => v.to_bits(),
            Value::Int(v) => v as u32 as u64,
            Value::Long(v) => v as u64,
            Value::Reference(_) => return None,
        };
        Some(bits)
    }

    /// Converts to the storage kind `tag`, applying Java widening
    /// conversions.
    ///
    /// A null reference cannot become a primitive (NullPointerException);
    /// any other mismatch is an IllegalArgumentException.
    pub fn coerce(self, tag: Tag) -> JavaResult<Value> {
        use Value::*;
        if self.tag() == tag {
            return Ok(self);
        }
        let widened = match (self, tag) {
            (Reference(None), _) => return Err(Throwable::null_pointer()),
            (Byte(v), Tag::Short) => Short(v.into()),
            (Byte(v), Tag::Int) => Int(v.into()),
            (Byte(v), Tag::Long) => Long(v.into()),
            (Byte(v), Tag::Float) => Float(v.into()),
            (Byte(v), Tag::Double) => Double(v.into()),
            (Short(v), Tag::Int) => Int(v.into()),
            (Short(v), Tag::Long) => Long(v.into()),
            (Short(v), Tag::Float) => Float(v.into()),
            (Short(v), Tag::Double) => Double(v.into()),
            (Char(v), Tag::Int) => Int(v.into()),
            (Char(v), Tag::Long) => Long(v.into()),
            (Char(v), Tag::Float) => Float(v.into()),
            (Char(v), Tag::Double) => Double(v.into()),
            (Int(v), Tag::Long) => Long(v.into()),
            (Int(v), Tag::Float) => Float(v as f32),
            (Int(v), Tag::Double) => Double(v.into()),
            (Long(v), Tag::Float) => Float(v as f32),
            (Long(v), Tag::Double) => Double(v as f64),
            (Float(v), Tag::Double) => Double(v.into()),
            (value, tag) => {
                return Err(Throwable::illegal_argument(format!(
                    "cannot convert {} to {}",
                    value.tag().java_name(),
                    tag.java_name()
                )))
            }
        };
        Ok(widened)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NULL
    }
}

// =============================================================================
// Static storage
// =============================================================================

/// A normalized static field slot.
///
/// Narrow primitives are widened to a 32-bit word, long and double take a
/// 64-bit slot, references take a reference slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticSlot {
    Word(u32),
    Wide(u64),
    Reference(Option<ObjectRef>),
}

impl StaticSlot {
    /// The default (zero or null) slot for a field of kind `tag`.
    pub fn zero(tag: Tag) -> Self {
        if tag == Tag::Object {
            StaticSlot::Reference(None)
        } else if tag.is_wide() {
            StaticSlot::Wide(0)
        } else {
            StaticSlot::Word(0)
        }
    }

    /// Normalizes a value already coerced to the field's kind.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Reference(r) => StaticSlot::Reference(r),
            v if v.tag().is_wide() => StaticSlot::Wide(v.bits().unwrap_or(0)),
            v => StaticSlot::Word(v.bits().unwrap_or(0) as u32),
        }
    }

    /// Reads the slot back as a value of kind `tag`.
    ///
    /// `None` means the slot shape does not match the tag, i.e. corrupted
    /// class metadata.
    pub fn load(self, tag: Tag) -> Option<Value> {
        match (self, tag) {
            (StaticSlot::Reference(r), Tag::Object) => Some(Value::Reference(r)),
            (StaticSlot::Word(w), t) if t.is_primitive() && !t.is_wide() => {
                t.codec().map(|c| (c.from_bits)(w as u64))
            }
            (StaticSlot::Wide(w), t) if t.is_wide() => t.codec().map(|c| (c.from_bits)(w)),
            _ => None,
        }
    }
}
