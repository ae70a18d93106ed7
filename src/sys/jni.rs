// jvm-builtins/src/sys/jni.rs
//
// Java primitive types as seen from native code.
//
// The widths here are fixed by the JVM specification and are the storage
// widths used by instance fields and array elements in the arena heap.

#![allow(non_camel_case_types)]

// =============================================================================
// Primitive Types
// =============================================================================

pub type jint = i32;
pub type jlong = i64;
pub type jbyte = i8;
pub type jchar = u16;
pub type jshort = i16;
pub type jfloat = f32;
pub type jdouble = f64;

// =============================================================================
// Access flags (JVMS 4.1, 4.5, 4.6)
// =============================================================================

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
