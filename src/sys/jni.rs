// jinst/src/sys/jni.rs
//
// The slice of JNI the agent needs: primitive and reference types, return
// codes, and the JavaVM invocation table used to obtain a JVMTI environment.
//
// JNIEnv is never dereferenced by the agent, so it stays opaque.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::c_void;

// =============================================================================
// Primitive Types
// =============================================================================

pub type jint = i32;
pub type jlong = i64;

// =============================================================================
// Reference Types (opaque pointers)
// =============================================================================

pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jthread = jobject;

// =============================================================================
// Return Codes
// =============================================================================

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;

/// Opaque JNI function table. Events hand it to us; we only pass it along.
#[repr(C)]
pub struct JNINativeInterface_ {
    _private: [u8; 0],
}

pub type JNIEnv = *const JNINativeInterface_;

// =============================================================================
// JNIInvokeInterface_ - The JavaVM function table
// =============================================================================

#[repr(C)]
pub struct JNIInvokeInterface_ {
    pub reserved0: *mut c_void,
    pub reserved1: *mut c_void,
    pub reserved2: *mut c_void,

    pub DestroyJavaVM: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub AttachCurrentThread:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    pub DetachCurrentThread: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub GetEnv:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint,
    pub AttachCurrentThreadAsDaemon:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
}

/// In C, `JavaVM` is the vtable pointer itself:
///   typedef const struct JNIInvokeInterface_ *JavaVM;
pub type JavaVM = *const JNIInvokeInterface_;
