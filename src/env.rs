//! Safe wrapper around the raw JVMTI environment pointer.
//!
//! Covers exactly what the agent needs to register its hook and to hand
//! patched class bytes back to the VM:
//!
//! - **Capabilities**: request class-hook and retransform capabilities
//! - **Events**: install callbacks and enable events
//! - **Memory**: `Allocate`/`Deallocate` for buffers the VM takes ownership of
//! - **Environment-local storage**: per-`jvmtiEnv` context pointer
//! - **Classes**: class signatures for lifecycle tracing
//!
//! Every call returns `Result<_, jvmtiError>`; a missing function-table entry
//! is reported as `JVMTI_ERROR_NOT_AVAILABLE` instead of panicking.

use crate::sys::jni;
use crate::sys::jvmti;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

/// Looks up a function in the JVMTI vtable, bailing out of the enclosing
/// function with `NOT_AVAILABLE` if the VM left the slot empty.
macro_rules! jvmti_fn {
    ($env:expr, $name:ident) => {
        match (*(*$env).functions).$name {
            Some(f) => f,
            None => return Err(jvmti::jvmtiError::NOT_AVAILABLE),
        }
    };
}

fn check(err: jvmti::jvmtiError) -> Result<(), jvmti::jvmtiError> {
    if err == jvmti::jvmtiError::NONE {
        Ok(())
    } else {
        Err(err)
    }
}

/// A JVMTI environment.
///
/// Each successful [`Jvmti::new`] creates a fresh environment, so two agent
/// instances loaded into the same VM never share callbacks or local storage.
pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

impl Jvmti {
    /// Connects to the JVM and retrieves a new JVMTI environment.
    pub fn new(vm: *mut jni::JavaVM) -> Result<Self, jni::jint> {
        if vm.is_null() {
            return Err(jni::JNI_ERR);
        }
        let mut env_ptr: *mut c_void = ptr::null_mut();

        unsafe {
            // vm: *mut JavaVM = *mut *const JNIInvokeInterface_
            let get_env_fn = (**vm).GetEnv;
            let res = get_env_fn(vm, &mut env_ptr, jvmti::JVMTI_VERSION_1_2);
            if res != jni::JNI_OK {
                return Err(res);
            }
        }

        if env_ptr.is_null() {
            return Err(jni::JNI_ERR);
        }
        Ok(Jvmti {
            env: env_ptr as *mut jvmti::jvmtiEnv,
        })
    }

    /// Wraps the environment pointer an event callback was invoked with.
    ///
    /// # Safety
    /// `env` must be a live `jvmtiEnv` for as long as the wrapper is used.
    pub unsafe fn from_raw(env: *mut jvmti::jvmtiEnv) -> Self {
        Jvmti { env }
    }

    pub fn add_capabilities(&self, caps: &jvmti::jvmtiCapabilities) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let add_caps_fn = jvmti_fn!(self.env, AddCapabilities);
            check(add_caps_fn(self.env, caps))
        }
    }

    /// Builds a capability set in place and adds it.
    pub fn add_capabilities_with(
        &self,
        configure: impl FnOnce(&mut jvmti::jvmtiCapabilities),
    ) -> Result<(), jvmti::jvmtiError> {
        let mut caps = jvmti::jvmtiCapabilities::default();
        configure(&mut caps);
        self.add_capabilities(&caps)
    }

    pub fn set_event_callbacks(&self, callbacks: jvmti::jvmtiEventCallbacks) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_callbacks_fn = jvmti_fn!(self.env, SetEventCallbacks);
            let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;
            check(set_callbacks_fn(self.env, &callbacks, size))
        }
    }

    /// `thread` may be null to target all threads.
    pub fn set_event_notification_mode(
        &self,
        enable: bool,
        event_type: u32,
        thread: jni::jthread,
    ) -> Result<(), jvmti::jvmtiError> {
        let mode = if enable { jvmti::JVMTI_ENABLE } else { jvmti::JVMTI_DISABLE };
        unsafe {
            let set_mode_fn = jvmti_fn!(self.env, SetEventNotificationMode);
            check(set_mode_fn(self.env, mode, event_type, thread))
        }
    }

    /// Enables each event for all threads, stopping at the first failure.
    pub fn enable_events_global(&self, events: &[u32]) -> Result<(), (u32, jvmti::jvmtiError)> {
        for &event in events {
            self.set_event_notification_mode(true, event, ptr::null_mut())
                .map_err(|err| (event, err))?;
        }
        Ok(())
    }

    pub fn allocate(&self, size: jni::jlong) -> Result<*mut u8, jvmti::jvmtiError> {
        let mut mem_ptr: *mut u8 = ptr::null_mut();
        unsafe {
            let allocate_fn = jvmti_fn!(self.env, Allocate);
            check(allocate_fn(self.env, size, &mut mem_ptr))?;
        }
        Ok(mem_ptr)
    }

    /// Copies `bytes` into VM-owned memory, as required for
    /// `ClassFileLoadHook`'s `new_class_data`.
    pub fn allocate_copy(&self, bytes: &[u8]) -> Result<*mut u8, jvmti::jvmtiError> {
        let mem = self.allocate(bytes.len() as jni::jlong)?;
        if !bytes.is_empty() {
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), mem, bytes.len()) };
        }
        Ok(mem)
    }

    pub fn deallocate(&self, mem: *mut u8) -> Result<(), jvmti::jvmtiError> {
        if mem.is_null() {
            return Ok(());
        }
        unsafe {
            let deallocate_fn = jvmti_fn!(self.env, Deallocate);
            check(deallocate_fn(self.env, mem))
        }
    }

    /// Returns the JVM type signature of `klass`, e.g. `Ljava/lang/String;`.
    pub fn get_class_signature(&self, klass: jni::jclass) -> Result<String, jvmti::jvmtiError> {
        let mut sig_ptr: *mut c_char = ptr::null_mut();

        unsafe {
            let get_class_sig_fn = jvmti_fn!(self.env, GetClassSignature);
            // Passing null for the generic signature skips allocating it.
            check(get_class_sig_fn(self.env, klass, &mut sig_ptr, ptr::null_mut()))?;
            if sig_ptr.is_null() {
                return Err(jvmti::jvmtiError::NULL_POINTER);
            }

            let signature = CStr::from_ptr(sig_ptr).to_string_lossy().into_owned();
            self.deallocate(sig_ptr as *mut u8)?;
            Ok(signature)
        }
    }

    pub fn get_environment_local_storage(&self) -> Result<*mut c_void, jvmti::jvmtiError> {
        let mut data: *mut c_void = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetEnvironmentLocalStorage);
            check(get_fn(self.env, &mut data))?;
        }
        Ok(data)
    }

    pub fn set_environment_local_storage(&self, data: *const c_void) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_fn = jvmti_fn!(self.env, SetEnvironmentLocalStorage);
            check(set_fn(self.env, data))
        }
    }
}
