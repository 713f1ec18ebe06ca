//! JVMTI glue: the `Agent_OnLoad` / `Agent_OnAttach` entry points, the
//! [`Instrumentation`] implementation, and the event trampolines.
//!
//! The transformer is parked in the environment-local storage of the agent's
//! own `jvmtiEnv` rather than in a process global. Every `-agentpath` entry
//! gets its own environment, so `-agentpath:libjinst.so=a` and
//! `-agentpath:libjinst.so=b` can run side by side in one VM.

use std::ffi::CStr;
use std::io;
use std::os::raw::{c_char, c_uchar, c_void};
use std::ptr;
use std::slice;

use crate::diag::{self, ClassEvent};
use crate::env::Jvmti;
use crate::error::AgentError;
use crate::host::{self, Instrumentation};
use crate::sys::{jni, jvmti};
use crate::transform::{ClassTransformer, LoadKind, Outcome};

const EVENTS: [u32; 4] = [
    jvmti::JVMTI_EVENT_VM_INIT,
    jvmti::JVMTI_EVENT_CLASS_LOAD,
    jvmti::JVMTI_EVENT_CLASS_PREPARE,
    jvmti::JVMTI_EVENT_CLASS_FILE_LOAD_HOOK,
];

/// A JVM reached through a fresh JVMTI environment.
pub struct JvmtiHost {
    jvmti: Jvmti,
}

impl JvmtiHost {
    pub fn connect(vm: *mut jni::JavaVM) -> Result<Self, AgentError> {
        let jvmti = Jvmti::new(vm).map_err(AgentError::GetEnv)?;
        Ok(JvmtiHost { jvmti })
    }
}

impl Instrumentation for JvmtiHost {
    type Error = AgentError;

    fn add_transformer(&mut self, transformer: ClassTransformer) -> Result<(), AgentError> {
        // Same contract as a retransform-capable java.lang.instrument transformer.
        // Hooking primordial classes is only on offer at startup; on attach the
        // VM refuses it, and the target class is never primordial anyway.
        self.jvmti
            .add_capabilities_with(|caps| {
                caps.set_can_generate_all_class_hook_events(true);
                caps.set_can_retransform_classes(true);
            })
            .or_else(|err| match err {
                jvmti::jvmtiError::NOT_AVAILABLE => self
                    .jvmti
                    .add_capabilities_with(|caps| caps.set_can_retransform_classes(true)),
                err => Err(err),
            })
            .map_err(AgentError::jvmti("AddCapabilities"))?;

        let context = Box::into_raw(Box::new(transformer));
        let stored = self
            .jvmti
            .set_environment_local_storage(context as *const c_void)
            .map_err(AgentError::jvmti("SetEnvironmentLocalStorage"))
            .and_then(|()| {
                self.jvmti
                    .set_event_callbacks(callbacks())
                    .map_err(AgentError::jvmti("SetEventCallbacks"))
            });
        if let Err(err) = stored {
            // No event is enabled yet, so nothing can be holding the context.
            let _ = self.jvmti.set_environment_local_storage(ptr::null());
            drop(unsafe { Box::from_raw(context) });
            return Err(err);
        }

        // From here on the context lives as long as the VM.
        self.jvmti
            .enable_events_global(&EVENTS)
            .map_err(|(_, error)| AgentError::Jvmti { call: "SetEventNotificationMode", error })
    }
}

fn callbacks() -> jvmti::jvmtiEventCallbacks {
    let mut callbacks = jvmti::jvmtiEventCallbacks::default();
    callbacks.VMInit = Some(on_vm_init);
    callbacks.ClassFileLoadHook = Some(on_class_file_load_hook);
    callbacks.ClassLoad = Some(on_class_load);
    callbacks.ClassPrepare = Some(on_class_prepare);
    callbacks
}

/// The transformer registered for `env`, if any.
///
/// # Safety
/// `env` must be the environment an event was delivered on.
unsafe fn transformer<'a>(env: *mut jvmti::jvmtiEnv) -> Option<&'a ClassTransformer> {
    let data = Jvmti::from_raw(env).get_environment_local_storage().ok()?;
    (data as *const ClassTransformer).as_ref()
}

/// `Lio/simonis/Foo;` -> `io/simonis/Foo`. Array and primitive signatures
/// come back unchanged.
pub fn class_name_from_signature(signature: &str) -> &str {
    signature
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(signature)
}

// --- Event trampolines ---

unsafe extern "system" fn on_vm_init(env: *mut jvmti::jvmtiEnv, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {
    if let Some(transformer) = transformer(env) {
        diag::print(diag::vm_init(transformer.config()));
    }
}

unsafe extern "system" fn on_class_load(env: *mut jvmti::jvmtiEnv, _jni: *mut jni::JNIEnv, _thread: jni::jthread, klass: jni::jclass) {
    trace_class(env, klass, ClassEvent::Load);
}

unsafe extern "system" fn on_class_prepare(env: *mut jvmti::jvmtiEnv, _jni: *mut jni::JNIEnv, _thread: jni::jthread, klass: jni::jclass) {
    trace_class(env, klass, ClassEvent::Prepare);
}

unsafe fn trace_class(env: *mut jvmti::jvmtiEnv, klass: jni::jclass, event: ClassEvent) {
    let Some(transformer) = transformer(env) else { return };
    match Jvmti::from_raw(env).get_class_signature(klass) {
        Ok(signature) => {
            let name = class_name_from_signature(&signature);
            if transformer.matches(name) {
                diag::print(diag::class_event(event, name));
            }
        }
        Err(_) => diag::report(diag::class_event_failure(event)),
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn on_class_file_load_hook(
    env: *mut jvmti::jvmtiEnv,
    _jni: *mut jni::JNIEnv,
    class_being_redefined: jni::jclass,
    _loader: jni::jobject,
    name: *const c_char,
    _protection_domain: jni::jobject,
    class_data_len: jni::jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jni::jint,
    new_class_data: *mut *mut c_uchar,
) {
    let Some(transformer) = transformer(env) else { return };
    // Anonymous classes arrive without a name; none of them is the target.
    if name.is_null() || class_data.is_null() || class_data_len < 0 {
        return;
    }
    if new_class_data.is_null() || new_class_data_len.is_null() {
        return;
    }
    let class_name = CStr::from_ptr(name).to_string_lossy();
    if !transformer.matches(&class_name) {
        return;
    }

    // The VM's buffer is read-only: patch a copy, hand back a VM-owned one.
    let mut bytes = slice::from_raw_parts(class_data, class_data_len as usize).to_vec();
    let kind = LoadKind::from_redefined(!class_being_redefined.is_null());
    match transformer.transform(&mut io::stdout().lock(), &class_name, kind, &mut bytes) {
        Ok(Outcome::Patched(_)) => {
            let jvmti = Jvmti::from_raw(env);
            match jvmti.allocate_copy(&bytes) {
                Ok(mem) => {
                    *new_class_data_len = bytes.len() as jni::jint;
                    *new_class_data = mem;
                }
                Err(err) => diag::report(diag::failure(format_args!("Allocate({}) failed: {err}", bytes.len()))),
            }
        }
        Ok(Outcome::Skipped | Outcome::Unchanged) => {}
        Err(err) => diag::report(diag::failure(format_args!("transform of {class_name} failed: {err}"))),
    }
}

// --- Exported entry points ---

type EntryPoint = fn(Option<&[u8]>, &mut JvmtiHost) -> Result<(), AgentError>;

unsafe fn start(vm: *mut jni::JavaVM, options: *const c_char, entry: EntryPoint) -> jni::jint {
    let options = (!options.is_null()).then(|| CStr::from_ptr(options).to_bytes());
    match JvmtiHost::connect(vm).and_then(|mut host| entry(options, &mut host)) {
        Ok(()) => jni::JNI_OK,
        Err(err) => {
            diag::report(diag::failure(err));
            jni::JNI_ERR
        }
    }
}

/// Called by the VM for `-agentpath:libjinst.so[=<id>]`.
///
/// # Safety
/// Must only be called by the JVM with a valid `JavaVM` pointer.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "system" fn Agent_OnLoad(
    vm: *mut jni::JavaVM,
    options: *mut c_char,
    _reserved: *mut c_void,
) -> jni::jint {
    start(vm, options, host::premain)
}

/// Called by the VM when the library is attached to a running VM.
///
/// # Safety
/// Must only be called by the JVM with a valid `JavaVM` pointer.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "system" fn Agent_OnAttach(
    vm: *mut jni::JavaVM,
    options: *mut c_char,
    _reserved: *mut c_void,
) -> jni::jint {
    start(vm, options, host::agentmain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::marker::{PATTERN, PATTERN_COUNT};

    const TARGET: &CStr = c"io/simonis/InstrumentationTest";
    const MARKER_AT: usize = 7;

    /// Just enough of a VM to register with: the seven JVMTI functions the
    /// agent calls, recording what they were asked to do.
    #[repr(C)]
    struct FakeVm {
        // First field, so a stub can get back from the env pointer to `self`.
        env: jvmti::jvmtiEnv,
        table: Box<jvmti::jvmtiInterface_1_>,
        refuse_all_class_hooks: bool,
        fail_callbacks: bool,
        capabilities: RefCell<Vec<jvmti::jvmtiCapabilities>>,
        callbacks: RefCell<Option<jvmti::jvmtiEventCallbacks>>,
        enabled: RefCell<Vec<u32>>,
        storage: RefCell<Vec<*const c_void>>,
        allocations: RefCell<Vec<Box<[u8]>>>,
    }

    impl FakeVm {
        fn new() -> Box<Self> {
            Self::build(|_| {})
        }

        fn build(configure: impl FnOnce(&mut FakeVm)) -> Box<Self> {
            let mut table = Box::new(jvmti::jvmtiInterface_1_::empty());
            table.SetEventNotificationMode = Some(set_event_notification_mode);
            table.Allocate = Some(allocate);
            table.Deallocate = Some(deallocate);
            table.SetEventCallbacks = Some(set_event_callbacks);
            table.AddCapabilities = Some(add_capabilities);
            table.GetEnvironmentLocalStorage = Some(get_environment_local_storage);
            table.SetEnvironmentLocalStorage = Some(set_environment_local_storage);

            let mut vm = Box::new(FakeVm {
                env: jvmti::jvmtiEnv { functions: ptr::null() },
                table,
                refuse_all_class_hooks: false,
                fail_callbacks: false,
                capabilities: RefCell::default(),
                callbacks: RefCell::default(),
                enabled: RefCell::default(),
                storage: RefCell::default(),
                allocations: RefCell::default(),
            });
            vm.env.functions = &*vm.table;
            configure(&mut vm);
            vm
        }

        fn env(&self) -> *mut jvmti::jvmtiEnv {
            &self.env as *const jvmti::jvmtiEnv as *mut jvmti::jvmtiEnv
        }

        fn host(&self) -> JvmtiHost {
            JvmtiHost { jvmti: unsafe { Jvmti::from_raw(self.env()) } }
        }

        fn local_storage(&self) -> *const c_void {
            self.storage.borrow().last().copied().unwrap_or(ptr::null())
        }

        /// Delivers one `ClassFileLoadHook` and returns the bytes handed back, if any.
        fn define(&self, name: &CStr, kind: LoadKind, bytes: &[u8]) -> Option<Vec<u8>> {
            let hook = (*self.callbacks.borrow())
                .and_then(|callbacks| callbacks.ClassFileLoadHook)
                .expect("ClassFileLoadHook installed");
            let class_being_redefined: jni::jclass = match kind {
                LoadKind::Load => ptr::null_mut(),
                LoadKind::Redefine => ptr::NonNull::<c_void>::dangling().as_ptr(),
            };
            let mut new_len: jni::jint = -7;
            let mut new_data: *mut c_uchar = ptr::null_mut();
            unsafe {
                hook(
                    self.env(),
                    ptr::null_mut(),
                    class_being_redefined,
                    ptr::null_mut(),
                    name.as_ptr(),
                    ptr::null_mut(),
                    bytes.len() as jni::jint,
                    bytes.as_ptr(),
                    &mut new_len,
                    &mut new_data,
                );
            }
            if new_data.is_null() {
                assert_eq!(new_len, -7, "length set without data");
                return None;
            }
            Some(unsafe { slice::from_raw_parts(new_data, new_len as usize) }.to_vec())
        }
    }

    impl Drop for FakeVm {
        fn drop(&mut self) {
            let data = self.local_storage();
            if !data.is_null() {
                drop(unsafe { Box::from_raw(data as *mut ClassTransformer) });
            }
        }
    }

    unsafe fn fake<'a>(env: *mut jvmti::jvmtiEnv) -> &'a FakeVm {
        &*(env as *const FakeVm)
    }

    unsafe extern "system" fn set_event_notification_mode(
        env: *mut jvmti::jvmtiEnv,
        mode: jni::jint,
        event_type: u32,
        _thread: jni::jthread,
    ) -> jvmti::jvmtiError {
        if mode == jvmti::JVMTI_ENABLE {
            fake(env).enabled.borrow_mut().push(event_type);
        }
        jvmti::jvmtiError::NONE
    }

    unsafe extern "system" fn allocate(env: *mut jvmti::jvmtiEnv, size: jni::jlong, mem_ptr: *mut *mut c_uchar) -> jvmti::jvmtiError {
        let mut block = vec![0u8; size as usize].into_boxed_slice();
        *mem_ptr = block.as_mut_ptr();
        fake(env).allocations.borrow_mut().push(block);
        jvmti::jvmtiError::NONE
    }

    unsafe extern "system" fn deallocate(env: *mut jvmti::jvmtiEnv, mem: *mut c_uchar) -> jvmti::jvmtiError {
        fake(env).allocations.borrow_mut().retain(|block| block.as_ptr() != mem as *const u8);
        jvmti::jvmtiError::NONE
    }

    unsafe extern "system" fn set_event_callbacks(
        env: *mut jvmti::jvmtiEnv,
        callbacks: *const jvmti::jvmtiEventCallbacks,
        _size: jni::jint,
    ) -> jvmti::jvmtiError {
        let vm = fake(env);
        if vm.fail_callbacks {
            return jvmti::jvmtiError::INTERNAL;
        }
        *vm.callbacks.borrow_mut() = Some(*callbacks);
        jvmti::jvmtiError::NONE
    }

    unsafe extern "system" fn add_capabilities(env: *mut jvmti::jvmtiEnv, caps: *const jvmti::jvmtiCapabilities) -> jvmti::jvmtiError {
        let vm = fake(env);
        let caps = *caps;
        vm.capabilities.borrow_mut().push(caps);
        if vm.refuse_all_class_hooks && caps.can_generate_all_class_hook_events() {
            jvmti::jvmtiError::NOT_AVAILABLE
        } else {
            jvmti::jvmtiError::NONE
        }
    }

    unsafe extern "system" fn get_environment_local_storage(env: *mut jvmti::jvmtiEnv, data_ptr: *mut *mut c_void) -> jvmti::jvmtiError {
        *data_ptr = fake(env).local_storage() as *mut c_void;
        jvmti::jvmtiError::NONE
    }

    unsafe extern "system" fn set_environment_local_storage(env: *mut jvmti::jvmtiEnv, data: *const c_void) -> jvmti::jvmtiError {
        fake(env).storage.borrow_mut().push(data);
        jvmti::jvmtiError::NONE
    }

    fn marked_class(version: u8) -> Vec<u8> {
        let mut bytes = 0xCAFEBABE_u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0x01, 0x00, 0x31]);
        for _ in 0..PATTERN_COUNT {
            bytes.extend_from_slice(&PATTERN);
        }
        bytes.push(version);
        bytes
    }

    #[test]
    fn signatures_to_internal_names() {
        assert_eq!(
            class_name_from_signature("Lio/simonis/InstrumentationTest;"),
            "io/simonis/InstrumentationTest"
        );
        assert_eq!(class_name_from_signature("[I"), "[I");
        assert_eq!(class_name_from_signature("I"), "I");
    }

    #[test]
    fn null_vm_is_rejected() {
        let err = JvmtiHost::connect(ptr::null_mut()).err();
        assert_eq!(err, Some(AgentError::GetEnv(jni::JNI_ERR)));
    }

    #[test]
    fn null_vm_fails_agent_load() {
        let code = unsafe { Agent_OnLoad(ptr::null_mut(), ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(code, jni::JNI_ERR);
    }

    #[test]
    fn every_hook_is_wired() {
        let callbacks = callbacks();
        assert!(callbacks.VMInit.is_some());
        assert!(callbacks.ClassFileLoadHook.is_some());
        assert!(callbacks.ClassLoad.is_some());
        assert!(callbacks.ClassPrepare.is_some());
        assert!(callbacks.VMDeath.is_none());
    }

    #[test]
    fn registration_requests_capabilities_and_enables_events() {
        let vm = FakeVm::new();
        let mut out = Vec::new();
        host::install(&mut out, Some(b"z"), &mut vm.host()).unwrap();

        let capabilities = vm.capabilities.borrow();
        assert_eq!(capabilities.len(), 1);
        assert!(capabilities[0].can_generate_all_class_hook_events());
        assert!(capabilities[0].can_retransform_classes());
        assert_eq!(*vm.enabled.borrow(), EVENTS);
        assert_eq!(unsafe { transformer(vm.env()) }.map(ClassTransformer::identity), Some(b'z'));
        assert_eq!(out, b"JINST - agent  z for  io/simonis/InstrumentationTest installed\n");
    }

    #[test]
    fn late_attach_falls_back_to_retransform_only() {
        let vm = FakeVm::build(|vm| vm.refuse_all_class_hooks = true);
        host::install(&mut Vec::new(), None, &mut vm.host()).unwrap();

        let capabilities = vm.capabilities.borrow();
        assert_eq!(capabilities.len(), 2);
        assert!(!capabilities[1].can_generate_all_class_hook_events());
        assert!(capabilities[1].can_retransform_classes());
        assert_eq!(*vm.enabled.borrow(), EVENTS);
    }

    #[test]
    fn failed_callback_registration_releases_the_transformer() {
        let vm = FakeVm::build(|vm| vm.fail_callbacks = true);
        let mut out = Vec::new();
        let err = host::install(&mut out, Some(b"a"), &mut vm.host()).unwrap_err();
        assert_eq!(
            err,
            AgentError::Jvmti { call: "SetEventCallbacks", error: jvmti::jvmtiError::INTERNAL }
        );

        // Stored, then cleared again.
        let storage = vm.storage.borrow();
        assert_eq!(storage.len(), 2);
        assert!(!storage[0].is_null());
        assert!(storage[1].is_null());
        assert!(vm.enabled.borrow().is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn hook_hands_back_a_patched_copy() {
        let vm = FakeVm::new();
        host::install(&mut Vec::new(), Some(b"z"), &mut vm.host()).unwrap();

        let original = marked_class(b'0');
        let loaded = vm.define(TARGET, LoadKind::Load, &original).expect("patched on load");
        assert_eq!(loaded.len(), original.len());
        assert_eq!(&loaded[MARKER_AT + 8..MARKER_AT + 15], b"0JINSTz");
        assert_eq!(loaded[MARKER_AT + 48], b'1');

        let redefined = vm.define(TARGET, LoadKind::Redefine, &loaded).expect("patched on redefine");
        assert_eq!(&redefined[MARKER_AT + 16..MARKER_AT + 23], b"1JINSTz");
        assert_eq!(redefined[MARKER_AT + 48], b'2');
    }

    #[test]
    fn hook_returns_nothing_unless_patched() {
        let vm = FakeVm::new();
        host::install(&mut Vec::new(), Some(b"z"), &mut vm.host()).unwrap();

        assert_eq!(vm.define(c"java/lang/X", LoadKind::Load, &marked_class(b'0')), None);
        assert_eq!(vm.define(TARGET, LoadKind::Load, &0xCAFEBABE_u32.to_be_bytes()), None);
        // Full marker: the transform fails and the class stays as it was.
        assert_eq!(vm.define(TARGET, LoadKind::Redefine, &marked_class(b'5')), None);
        assert!(vm.allocations.borrow().is_empty());
    }

    #[test]
    fn hook_without_a_registered_transformer_is_inert() {
        let vm = FakeVm::new();
        vm.host().jvmti.set_event_callbacks(callbacks()).unwrap();
        assert_eq!(vm.define(TARGET, LoadKind::Load, &marked_class(b'0')), None);
    }
}
