//! Native method symbol names.
//!
//! `Java_<class>_<method>` is the short form; overloaded natives append
//! `_<argument descriptor>`. Each part is escaped: `/` becomes `_`, `_`
//! becomes `_1`, `;` becomes `_2`, `[` becomes `_3`, and any other
//! character outside `[A-Za-z0-9]` becomes `_0` plus four lowercase hex
//! digits per UTF-16 unit.

use std::fmt::Write;

use crate::class::argument_descriptor;

fn escape_into(out: &mut String, part: &str) {
    for c in part.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(c),
            '/' => out.push('_'),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            other => {
                let mut units = [0u16; 2];
                for unit in other.encode_utf16(&mut units) {
                    let _ = write!(out, "_0{unit:04x}");
                }
            }
        }
    }
}

/// Escapes one name component.
pub fn mangle(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    escape_into(&mut out, part);
    out
}

/// `Java_<class>_<method>` for an internal class name.
pub fn short_symbol(class_name: &str, method_name: &str) -> String {
    let mut out = String::from("Java_");
    escape_into(&mut out, class_name);
    out.push('_');
    escape_into(&mut out, method_name);
    out
}

/// The short symbol plus `_<escaped argument descriptor>`. `None` for a
/// malformed descriptor.
pub fn long_symbol(class_name: &str, method_name: &str, descriptor: &str) -> Option<String> {
    let args = argument_descriptor(descriptor)?;
    let mut out = short_symbol(class_name, method_name);
    out.push('_');
    escape_into(&mut out, args);
    Some(out)
}
