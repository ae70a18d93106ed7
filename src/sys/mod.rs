//! Raw Java-level type definitions shared by the bridge.

pub mod jni;
