//! Turns parsed class files into runtime classes.
//!
//! Superclasses and interfaces are resolved (and, if needed, loaded) first.
//! Instance primitives are laid out after the superclass's byte area at
//! their natural alignment; instance references get the next reference
//! slots; statics get one normalized slot each, seeded from `ConstantValue`.

use std::sync::Arc;

use tracing::debug;

use crate::class::{init_flags, parse_method_descriptor, Class, ClassKind, Field, Layout, Method};
use crate::classfile::{ClassFile, ClassFileError, ConstantPool, CpInfo, FieldInfo};
use crate::exception::{JavaResult, Throwable};
use crate::sys::jni::ACC_STATIC;
use crate::value::{StaticSlot, Tag, Value};
use crate::vm::Vm;

fn format_error(e: ClassFileError) -> Throwable {
    Throwable::class_format(e.to_string())
}

struct FieldPlan {
    name: String,
    descriptor: String,
    tag: Tag,
    offset: usize,
    access_flags: u16,
}

/// Defines the class in `bytes`. With `expected`, the class must carry that
/// internal name.
pub(crate) fn define_class(vm: &Vm, bytes: &[u8], expected: Option<&str>) -> JavaResult<Arc<Class>> {
    let cf = ClassFile::parse(bytes).map_err(format_error)?;
    let cp = &cf.constant_pool;
    let name = cf.class_name().map_err(format_error)?;
    if let Some(expected) = expected.filter(|e| *e != name) {
        return Err(Throwable::thrown("java/lang/NoClassDefFoundError")
            .with_message(format!("{} (wrong name: {})", expected, name)));
    }
    if vm.classes().find(name).is_some() {
        return Err(Throwable::linkage(format!("duplicate class definition: {}", name.replace('/', "."))));
    }

    let _defining = vm.begin_definition(name)?;
    let super_class = match cf.super_class_name().map_err(format_error)? {
        Some(super_name) if super_name == name => {
            return Err(Throwable::thrown("java/lang/ClassCircularityError").with_message(name.replace('/', ".")))
        }
        Some(super_name) => Some(vm.resolve_class(super_name)?),
        None => None,
    };
    let mut interfaces = Vec::new();
    for interface in cf.interface_names().map_err(format_error)? {
        interfaces.push(vm.resolve_class(interface)?.id);
    }

    let mut layout = super_class.as_ref().map_or(Layout::default(), |s| s.layout);
    let mut statics = Vec::new();
    let mut plans = Vec::with_capacity(cf.fields.len());
    for info in &cf.fields {
        let field_name = cp.get_utf8(info.name_index).map_err(format_error)?;
        let descriptor = cp.get_utf8(info.descriptor_index).map_err(format_error)?;
        let tag = descriptor
            .bytes()
            .next()
            .and_then(Tag::from_descriptor)
            .ok_or_else(|| Throwable::class_format(format!("bad field descriptor {descriptor}")))?;
        let offset = if info.access_flags & ACC_STATIC != 0 {
            statics.push(initial_static(vm, cp, info, tag)?);
            statics.len() - 1
        } else if tag == Tag::Object {
            layout.refs += 1;
            layout.refs - 1
        } else {
            let size = tag.size();
            let offset = layout.bytes.next_multiple_of(size);
            layout.bytes = offset + size;
            offset
        };
        plans.push(FieldPlan {
            name: field_name.to_owned(),
            descriptor: descriptor.to_owned(),
            tag,
            offset,
            access_flags: info.access_flags,
        });
    }

    let mut methods = Vec::with_capacity(cf.methods.len());
    let mut has_clinit = false;
    for info in &cf.methods {
        let method_name = cp.get_utf8(info.name_index).map_err(format_error)?;
        let descriptor = cp.get_utf8(info.descriptor_index).map_err(format_error)?;
        if parse_method_descriptor(descriptor).is_none() {
            return Err(Throwable::class_format(format!("bad method descriptor {descriptor}")));
        }
        has_clinit |= method_name == "<clinit>";
        let code = info.code().map(|c| {
            let mut lines: Vec<(u16, u16)> = c.line_numbers().map(|e| (e.start_pc, e.line_number)).collect();
            lines.sort_unstable();
            (Arc::<[u8]>::from(c.code.as_slice()), lines)
        });
        methods.push((method_name, descriptor, info.access_flags, code));
    }

    let source_file = cf.source_file().map_err(format_error)?.map(str::to_owned);
    let super_id = super_class.as_ref().map(|s| s.id);
    let access_flags = cf.access_flags;
    let class = vm.classes().define(name, |id| {
        let mut class = Class::new(id, name, super_id, ClassKind::Instance)
            .with_statics(statics)
            .with_vm_flags(if has_clinit { init_flags::NEED_INIT } else { 0 });
        class.access_flags = access_flags;
        class.interfaces = interfaces;
        class.layout = layout;
        class.source_file = source_file;
        class.fields = plans
            .into_iter()
            .map(|p| {
                Arc::new(Field {
                    class: id,
                    name: p.name,
                    descriptor: p.descriptor,
                    tag: p.tag,
                    offset: p.offset,
                    access_flags: p.access_flags,
                })
            })
            .collect();
        class.methods = methods
            .into_iter()
            .filter_map(|(method_name, descriptor, flags, code)| {
                let mut method = Method::new(id, method_name, descriptor, flags)?;
                if let Some((bytes, lines)) = code {
                    method.code = Some(bytes);
                    method.line_numbers = lines;
                }
                Some(Arc::new(method))
            })
            .collect();
        class
    })?;

    debug!(
        class = %class.name,
        fields = class.fields.len(),
        methods = class.methods.len(),
        "defined class"
    );
    Ok(class)
}

/// The starting slot of a static field: its `ConstantValue` or zero.
fn initial_static(vm: &Vm, cp: &ConstantPool, info: &FieldInfo, tag: Tag) -> JavaResult<StaticSlot> {
    let Some(index) = info.constant_value() else {
        return Ok(StaticSlot::zero(tag));
    };
    let value = match (cp.get(index).map_err(format_error)?, tag) {
        (CpInfo::Integer(v), Tag::Int) => Value::Int(*v),
        (CpInfo::Integer(v), Tag::Short) => Value::Short(*v as i16),
        (CpInfo::Integer(v), Tag::Char) => Value::Char(*v as u16),
        (CpInfo::Integer(v), Tag::Byte) => Value::Byte(*v as i8),
        (CpInfo::Integer(v), Tag::Boolean) => Value::Boolean(*v != 0),
        (CpInfo::Float(v), Tag::Float) => Value::Float(*v),
        (CpInfo::Long(v), Tag::Long) => Value::Long(*v),
        (CpInfo::Double(v), Tag::Double) => Value::Double(*v),
        (CpInfo::String { string_index }, Tag::Object) => {
            let s = cp.get_utf8(*string_index).map_err(format_error)?;
            Value::Reference(Some(vm.intern(s)))
        }
        _ => return Err(Throwable::class_format(format!("bad ConstantValue at index {index}"))),
    };
    Ok(StaticSlot::from_value(value))
}
