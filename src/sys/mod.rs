//! Raw FFI bindings: the parts of JNI and JVMTI the agent touches.

pub mod jni;
pub mod jvmti;
