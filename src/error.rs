use crate::sys::{jni, jvmti};
use thiserror::Error;

/// Why a marker could not be patched. The buffer is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("{what} at offset {offset} (+{len} bytes) lies outside the {buffer_len}-byte class buffer")]
    OutOfBounds {
        what: &'static str,
        offset: usize,
        len: usize,
        buffer_len: usize,
    },

    #[error("version counter at offset {offset} is {found:#04x}, expected an ASCII digit")]
    CounterNotDigit { offset: usize, found: u8 },

    #[error("marker already carries {recorded} records, no slot left (max {max})")]
    CapacityExceeded { recorded: usize, max: usize },
}

/// Failures while attaching the agent to the VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("can't access JVMTI (GetEnv returned {0})")]
    GetEnv(jni::jint),

    #[error("{call} failed: {error}")]
    Jvmti {
        call: &'static str,
        error: jvmti::jvmtiError,
    },
}

impl AgentError {
    pub(crate) fn jvmti(call: &'static str) -> impl FnOnce(jvmti::jvmtiError) -> Self {
        move |error| AgentError::Jvmti { call, error }
    }
}
