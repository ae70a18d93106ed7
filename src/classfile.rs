//! Class file parser.
//!
//! Parses the parts of a `.class` file that class definition needs: the
//! constant pool, fields and methods with their `ConstantValue`, `Code`,
//! `Exceptions` and `LineNumberTable` attributes, and `SourceFile`. Every
//! other attribute is kept as raw bytes.

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Option<CpInfo>>,
}

impl ConstantPool {
    pub fn get(&self, index: u16) -> Result<&CpInfo, ClassFileError> {
        if index == 0 {
            return Err(ClassFileError::InvalidConstantPoolIndex(index));
        }
        self.entries
            .get(index as usize)
            .and_then(|e| e.as_ref())
            .ok_or(ClassFileError::InvalidConstantPoolIndex(index))
    }

    pub fn get_utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpInfo::Utf8(s) => Ok(s.as_str()),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    /// Name of the `CONSTANT_Class` entry at `index`.
    pub fn get_class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpInfo::Class { name_index } => self.get_utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

#[derive(Debug, Clone)]
pub enum CpInfo {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

#[derive(Debug, Clone)]
pub enum AttributeInfo {
    ConstantValue { constantvalue_index: u16 },
    Code(CodeAttribute),
    Exceptions { exception_index_table: Vec<u16> },
    SourceFile { sourcefile_index: u16 },
    LineNumberTable { entries: Vec<LineNumberEntry> },
    Unknown { name: String, info: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    /// Entries of every `LineNumberTable` nested in this attribute.
    pub fn line_numbers(&self) -> impl Iterator<Item = &LineNumberEntry> {
        self.attributes.iter().flat_map(|a| match a {
            AttributeInfo::LineNumberTable { entries } => entries.as_slice(),
            _ => &[][..],
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("invalid magic: {0:#x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("invalid UTF-8")]
    InvalidUtf8,
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ClassFileError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u1(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassFileError> {
        self.read_array().map(u16::from_be_bytes)
    }

    fn read_u4(&mut self) -> Result<u32, ClassFileError> {
        self.read_array().map(u32::from_be_bytes)
    }

    fn read_u8(&mut self) -> Result<u64, ClassFileError> {
        self.read_array().map(u64::from_be_bytes)
    }

    fn read_u2_table(&mut self) -> Result<Vec<u16>, ClassFileError> {
        let count = self.read_u2()? as usize;
        (0..count).map(|_| self.read_u2()).collect()
    }
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = Reader::new(bytes);
        let magic = r.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = r.read_u2()?;
        let major_version = r.read_u2()?;

        let constant_pool = parse_constant_pool(&mut r)?;

        let access_flags = r.read_u2()?;
        let this_class = r.read_u2()?;
        let super_class = r.read_u2()?;
        let interfaces = r.read_u2_table()?;

        let fields_count = r.read_u2()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            fields.push(parse_field(&mut r, &constant_pool)?);
        }

        let methods_count = r.read_u2()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(parse_method(&mut r, &constant_pool)?);
        }

        let attributes = parse_attributes(&mut r, &constant_pool)?;
        if r.remaining() != 0 {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn class_name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.get_class_name(self.this_class)
    }

    /// `None` only for `java/lang/Object`.
    pub fn super_class_name(&self) -> Result<Option<&str>, ClassFileError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.get_class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ClassFileError> {
        self.interfaces.iter().map(|&i| self.constant_pool.get_class_name(i)).collect()
    }

    pub fn source_file(&self) -> Result<Option<&str>, ClassFileError> {
        for attr in &self.attributes {
            if let AttributeInfo::SourceFile { sourcefile_index } = attr {
                return self.constant_pool.get_utf8(*sourcefile_index).map(Some);
            }
        }
        Ok(None)
    }
}

impl FieldInfo {
    pub fn constant_value(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match a {
            AttributeInfo::ConstantValue { constantvalue_index } => Some(*constantvalue_index),
            _ => None,
        })
    }
}

impl MethodInfo {
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match a {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }
}

/// Decodes a `CONSTANT_Utf8` payload. Class files use modified UTF-8: NUL
/// is `C0 80` and supplementary characters are encoded as surrogate pairs
/// of three bytes each.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String, ClassFileError> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_owned());
    }
    let continuation = |at: usize| {
        bytes
            .get(at)
            .filter(|&&b| b & 0xC0 == 0x80)
            .map(|&b| u16::from(b & 0x3F))
            .ok_or(ClassFileError::InvalidUtf8)
    };
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let (unit, len) = match lead {
            0x01..=0x7F => (u16::from(lead), 1),
            0xC0..=0xDF => ((u16::from(lead & 0x1F) << 6) | continuation(i + 1)?, 2),
            0xE0..=0xEF => {
                let unit = (u16::from(lead & 0x0F) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?;
                (unit, 3)
            }
            _ => return Err(ClassFileError::InvalidUtf8),
        };
        units.push(unit);
        i += len;
    }
    // Unpaired surrogates are legal in Java strings but not in `String`.
    Ok(String::from_utf16_lossy(&units))
}

fn parse_constant_pool(r: &mut Reader) -> Result<ConstantPool, ClassFileError> {
    let count = r.read_u2()? as usize;
    let mut entries: Vec<Option<CpInfo>> = Vec::with_capacity(count);
    entries.push(None); // index 0 is unused

    let mut i = 1;
    while i < count {
        let tag = r.read_u1()?;
        let entry = match tag {
            1 => {
                let len = r.read_u2()? as usize;
                let bytes = r.read_bytes(len)?;
                CpInfo::Utf8(decode_modified_utf8(bytes)?)
            }
            3 => CpInfo::Integer(r.read_u4()? as i32),
            4 => CpInfo::Float(f32::from_bits(r.read_u4()?)),
            // Long and double take two pool slots.
            5 | 6 => {
                let bits = r.read_u8()?;
                let wide = if tag == 5 { CpInfo::Long(bits as i64) } else { CpInfo::Double(f64::from_bits(bits)) };
                entries.push(Some(wide));
                entries.push(None);
                i += 2;
                continue;
            }
            7 => CpInfo::Class { name_index: r.read_u2()? },
            8 => CpInfo::String { string_index: r.read_u2()? },
            9 => CpInfo::Fieldref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            10 => CpInfo::Methodref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            11 => CpInfo::InterfaceMethodref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            12 => CpInfo::NameAndType { name_index: r.read_u2()?, descriptor_index: r.read_u2()? },
            15 => CpInfo::MethodHandle { reference_kind: r.read_u1()?, reference_index: r.read_u2()? },
            16 => CpInfo::MethodType { descriptor_index: r.read_u2()? },
            17 => CpInfo::Dynamic { bootstrap_method_attr_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            18 => CpInfo::InvokeDynamic { bootstrap_method_attr_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            19 => CpInfo::Module { name_index: r.read_u2()? },
            20 => CpInfo::Package { name_index: r.read_u2()? },
            _ => return Err(ClassFileError::InvalidConstantPoolTag(tag)),
        };

        entries.push(Some(entry));
        i += 1;
    }

    Ok(ConstantPool { entries })
}

fn parse_field(r: &mut Reader, cp: &ConstantPool) -> Result<FieldInfo, ClassFileError> {
    let access_flags = r.read_u2()?;
    let name_index = r.read_u2()?;
    let descriptor_index = r.read_u2()?;
    let attributes = parse_attributes(r, cp)?;
    Ok(FieldInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_method(r: &mut Reader, cp: &ConstantPool) -> Result<MethodInfo, ClassFileError> {
    let access_flags = r.read_u2()?;
    let name_index = r.read_u2()?;
    let descriptor_index = r.read_u2()?;
    let attributes = parse_attributes(r, cp)?;
    Ok(MethodInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_attributes(r: &mut Reader, cp: &ConstantPool) -> Result<Vec<AttributeInfo>, ClassFileError> {
    let count = r.read_u2()? as usize;
    let mut attrs = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = r.read_u2()?;
        let length = r.read_u4()? as usize;
        let name = cp.get_utf8(name_index)?;
        let info_bytes = r.read_bytes(length)?;
        let mut sub = Reader::new(info_bytes);

        let attr = match name {
            "ConstantValue" => AttributeInfo::ConstantValue { constantvalue_index: sub.read_u2()? },
            "Code" => AttributeInfo::Code(parse_code_attribute(&mut sub, cp)?),
            "Exceptions" => AttributeInfo::Exceptions { exception_index_table: sub.read_u2_table()? },
            "SourceFile" => AttributeInfo::SourceFile { sourcefile_index: sub.read_u2()? },
            "LineNumberTable" => {
                let num = sub.read_u2()? as usize;
                let mut entries = Vec::with_capacity(num);
                for _ in 0..num {
                    entries.push(LineNumberEntry { start_pc: sub.read_u2()?, line_number: sub.read_u2()? });
                }
                AttributeInfo::LineNumberTable { entries }
            }
            _ => AttributeInfo::Unknown { name: name.to_owned(), info: info_bytes.to_vec() },
        };
        if !matches!(attr, AttributeInfo::Unknown { .. }) && sub.remaining() != 0 {
            return Err(ClassFileError::InvalidAttribute(name.to_owned()));
        }
        attrs.push(attr);
    }
    Ok(attrs)
}

fn parse_code_attribute(r: &mut Reader, cp: &ConstantPool) -> Result<CodeAttribute, ClassFileError> {
    let max_stack = r.read_u2()?;
    let max_locals = r.read_u2()?;
    let code_length = r.read_u4()? as usize;
    let code = r.read_bytes(code_length)?.to_vec();
    let exception_table_length = r.read_u2()? as usize;
    let mut exception_table = Vec::with_capacity(exception_table_length);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionTableEntry {
            start_pc: r.read_u2()?,
            end_pc: r.read_u2()?,
            handler_pc: r.read_u2()?,
            catch_type: r.read_u2()?,
        });
    }
    let attributes = parse_attributes(r, cp)?;
    Ok(CodeAttribute { max_stack, max_locals, code, exception_table, attributes })
}
