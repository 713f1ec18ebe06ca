// jinst/src/sys/jvmti.rs
//
// The slice of JVMTI the agent needs.
//
// Both function tables below are PREFIXES of the real C structs. That is
// sound because the agent only ever reads through a pointer handed out by the
// VM (jvmtiInterface_1_) or passes its own size to SetEventCallbacks, which
// copies that many bytes and zero-fills the remainder (jvmtiEventCallbacks).
// Slot numbers follow jvmti.h; unused slots are kept as opaque padding.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::fmt;
use std::os::raw::{c_char, c_uchar, c_void};
use crate::sys::jni::{jclass, jint, jlong, jobject, jthread, JNIEnv};

// --- Constants ---
pub const JVMTI_VERSION_1_2: jint = 0x30010200;

pub const JVMTI_EVENT_VM_INIT: u32 = 50;
pub const JVMTI_EVENT_CLASS_FILE_LOAD_HOOK: u32 = 54;
pub const JVMTI_EVENT_CLASS_LOAD: u32 = 55;
pub const JVMTI_EVENT_CLASS_PREPARE: u32 = 56;

pub const JVMTI_ENABLE: jint = 1;
pub const JVMTI_DISABLE: jint = 0;

// --- Error Codes ---

/// A `jvmtiError` as returned by the VM.
///
/// Kept as a transparent integer rather than a Rust enum: the VM may return
/// codes we do not list, and an out-of-range enum discriminant is undefined
/// behavior.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct jvmtiError(pub u32);

impl jvmtiError {
    pub const NONE: Self = Self(0);
    pub const INVALID_THREAD: Self = Self(10);
    pub const INVALID_CLASS: Self = Self(21);
    pub const UNMODIFIABLE_CLASS: Self = Self(79);
    pub const NOT_AVAILABLE: Self = Self(98);
    pub const MUST_POSSESS_CAPABILITY: Self = Self(99);
    pub const NULL_POINTER: Self = Self(100);
    pub const ABSENT_INFORMATION: Self = Self(101);
    pub const INVALID_EVENT_TYPE: Self = Self(102);
    pub const ILLEGAL_ARGUMENT: Self = Self(103);
    pub const OUT_OF_MEMORY: Self = Self(110);
    pub const ACCESS_DENIED: Self = Self(111);
    pub const WRONG_PHASE: Self = Self(112);
    pub const INTERNAL: Self = Self(113);
    pub const UNATTACHED_THREAD: Self = Self(115);
    pub const INVALID_ENVIRONMENT: Self = Self(116);

    /// Symbolic name for the codes above, `None` for anything else.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NONE => "JVMTI_ERROR_NONE",
            Self::INVALID_THREAD => "JVMTI_ERROR_INVALID_THREAD",
            Self::INVALID_CLASS => "JVMTI_ERROR_INVALID_CLASS",
            Self::UNMODIFIABLE_CLASS => "JVMTI_ERROR_UNMODIFIABLE_CLASS",
            Self::NOT_AVAILABLE => "JVMTI_ERROR_NOT_AVAILABLE",
            Self::MUST_POSSESS_CAPABILITY => "JVMTI_ERROR_MUST_POSSESS_CAPABILITY",
            Self::NULL_POINTER => "JVMTI_ERROR_NULL_POINTER",
            Self::ABSENT_INFORMATION => "JVMTI_ERROR_ABSENT_INFORMATION",
            Self::INVALID_EVENT_TYPE => "JVMTI_ERROR_INVALID_EVENT_TYPE",
            Self::ILLEGAL_ARGUMENT => "JVMTI_ERROR_ILLEGAL_ARGUMENT",
            Self::OUT_OF_MEMORY => "JVMTI_ERROR_OUT_OF_MEMORY",
            Self::ACCESS_DENIED => "JVMTI_ERROR_ACCESS_DENIED",
            Self::WRONG_PHASE => "JVMTI_ERROR_WRONG_PHASE",
            Self::INTERNAL => "JVMTI_ERROR_INTERNAL",
            Self::UNATTACHED_THREAD => "JVMTI_ERROR_UNATTACHED_THREAD",
            Self::INVALID_ENVIRONMENT => "JVMTI_ERROR_INVALID_ENVIRONMENT",
            _ => return None,
        })
    }
}

impl fmt::Debug for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "jvmtiError({})", self.0),
        }
    }
}

impl fmt::Display for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "JVMTI error {}", self.0),
        }
    }
}

// --- Capabilities ---
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct jvmtiCapabilities {
    bits: [u32; 4],
}

impl jvmtiCapabilities {
    fn set_bit(&mut self, bit_offset: usize, value: bool) {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        if value {
            self.bits[word_index] |= 1 << bit_index;
        } else {
            self.bits[word_index] &= !(1 << bit_index);
        }
    }

    fn get_bit(&self, bit_offset: usize) -> bool {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        (self.bits[word_index] & (1 << bit_index)) != 0
    }

    // [26]
    pub fn set_can_generate_all_class_hook_events(&mut self, v: bool) { self.set_bit(26, v); }
    pub fn can_generate_all_class_hook_events(&self) -> bool { self.get_bit(26) }

    // [37]
    pub fn set_can_retransform_classes(&mut self, v: bool) { self.set_bit(37, v); }
    pub fn can_retransform_classes(&self) -> bool { self.get_bit(37) }
}

// --- Function Typedefs ---
pub type JvmtiSetEventNotificationModeFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mode: jint, event_type: u32, event_thread: jthread) -> jvmtiError;
pub type JvmtiAllocateFn = unsafe extern "system" fn(env: *mut jvmtiEnv, size: jlong, mem_ptr: *mut *mut c_uchar) -> jvmtiError;
pub type JvmtiDeallocateFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mem: *mut c_uchar) -> jvmtiError;
pub type JvmtiGetClassSignatureFn = unsafe extern "system" fn(env: *mut jvmtiEnv, klass: jclass, signature_ptr: *mut *mut c_char, generic_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiSetEventCallbacksFn = unsafe extern "system" fn(env: *mut jvmtiEnv, callbacks: *const jvmtiEventCallbacks, size_of_callbacks: jint) -> jvmtiError;
pub type JvmtiAddCapabilitiesFn = unsafe extern "system" fn(env: *mut jvmtiEnv, capabilities_ptr: *const jvmtiCapabilities) -> jvmtiError;
pub type JvmtiGetEnvironmentLocalStorageFn = unsafe extern "system" fn(env: *mut jvmtiEnv, data_ptr: *mut *mut c_void) -> jvmtiError;
pub type JvmtiSetEnvironmentLocalStorageFn = unsafe extern "system" fn(env: *mut jvmtiEnv, data: *const c_void) -> jvmtiError;

// --- Event Typedefs ---
pub type JvmtiVMInitFn = unsafe extern "system" fn(jvmti_env: *mut jvmtiEnv, jni_env: *mut JNIEnv, thread: jthread);
pub type JvmtiClassFileLoadHookFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    class_being_redefined: jclass,
    loader: jobject,
    name: *const c_char,
    protection_domain: jobject,
    class_data_len: jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jint,
    new_class_data: *mut *mut c_uchar,
);
pub type JvmtiClassLoadFn = unsafe extern "system" fn(jvmti_env: *mut jvmtiEnv, jni_env: *mut JNIEnv, thread: jthread, klass: jclass);
pub type JvmtiClassPrepareFn = unsafe extern "system" fn(jvmti_env: *mut jvmtiEnv, jni_env: *mut JNIEnv, thread: jthread, klass: jclass);

/// Placeholder for an event slot the agent never installs.
pub type JvmtiUnusedEventFn = unsafe extern "system" fn();

type Slots<const N: usize> = [*const c_void; N];

#[repr(C)]
pub struct jvmtiInterface_1_ {
    /*   1: RESERVED */
    pub reserved1: *const c_void,
    /*   2: Set Event Notification Mode */
    pub SetEventNotificationMode: Option<JvmtiSetEventNotificationModeFn>,
    /*   3-45 */
    _slots_3_45: Slots<43>,
    /*  46: Allocate */
    pub Allocate: Option<JvmtiAllocateFn>,
    /*  47: Deallocate */
    pub Deallocate: Option<JvmtiDeallocateFn>,
    /*  48: Get Class Signature */
    pub GetClassSignature: Option<JvmtiGetClassSignatureFn>,
    /*  49-121 */
    _slots_49_121: Slots<73>,
    /* 122: Set Event Callbacks */
    pub SetEventCallbacks: Option<JvmtiSetEventCallbacksFn>,
    /* 123-141 */
    _slots_123_141: Slots<19>,
    /* 142: Add Capabilities */
    pub AddCapabilities: Option<JvmtiAddCapabilitiesFn>,
    /* 143-146 */
    _slots_143_146: Slots<4>,
    /* 147: Get Environment Local Storage */
    pub GetEnvironmentLocalStorage: Option<JvmtiGetEnvironmentLocalStorageFn>,
    /* 148: Set Environment Local Storage */
    pub SetEnvironmentLocalStorage: Option<JvmtiSetEnvironmentLocalStorageFn>,
}

#[cfg(test)]
impl jvmtiInterface_1_ {
    /// A table with every slot empty, for standing in for a VM in tests.
    pub(crate) fn empty() -> Self {
        // Every field is a raw pointer or an `Option<fn>`; all-zero is valid for both.
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
pub struct jvmtiEnv {
    pub functions: *const jvmtiInterface_1_,
}

/// Event callbacks 50 (VMInit) through 56 (ClassPrepare).
#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct jvmtiEventCallbacks {
    pub VMInit: Option<JvmtiVMInitFn>,
    pub VMDeath: Option<JvmtiUnusedEventFn>,
    pub ThreadStart: Option<JvmtiUnusedEventFn>,
    pub ThreadEnd: Option<JvmtiUnusedEventFn>,
    pub ClassFileLoadHook: Option<JvmtiClassFileLoadHookFn>,
    pub ClassLoad: Option<JvmtiClassLoadFn>,
    pub ClassPrepare: Option<JvmtiClassPrepareFn>,
}
