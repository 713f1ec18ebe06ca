//! The class-file transformer.
//!
//! [`ClassTransformer`] is immutable after construction. The only state that
//! survives between invocations is the version counter inside the class bytes,
//! so the same transformer can serve concurrent hook calls without locking.

use std::fmt;
use std::io::Write;

use crate::config::AgentConfig;
use crate::diag;
use crate::error::PatchError;
use crate::marker::{self, PatchRecord, INITIAL_VERSION, MAX_RECORDS, RECORD_LEN};

/// Why the host is handing us class bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// First definition of the class.
    Load,
    /// Redefinition or retransformation of an already loaded class.
    Redefine,
}

impl LoadKind {
    /// The host signals a redefinition by passing the class being redefined.
    pub fn from_redefined(class_being_redefined: bool) -> Self {
        if class_being_redefined {
            LoadKind::Redefine
        } else {
            LoadKind::Load
        }
    }
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadKind::Load => "load",
            LoadKind::Redefine => "re-define/transform",
        })
    }
}

/// Result of one hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not the target class; nothing was looked at.
    Skipped,
    /// Target class without a marker; the buffer is unchanged.
    Unchanged,
    /// The buffer was patched with this record.
    Patched(PatchRecord),
}

impl Outcome {
    pub fn is_modified(&self) -> bool {
        matches!(self, Outcome::Patched(_))
    }
}

pub struct ClassTransformer {
    config: AgentConfig,
}

impl ClassTransformer {
    pub fn new(config: AgentConfig) -> Self {
        ClassTransformer { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn identity(&self) -> u8 {
        self.config.identity
    }

    pub fn matches(&self, class_name: &str) -> bool {
        class_name.starts_with(&self.config.target)
    }

    /// Runs the hook for one class load or redefinition.
    ///
    /// Classes outside the target prefix are skipped without output. For the
    /// target, the transform line goes to `out` before the marker is searched.
    pub fn transform(
        &self,
        out: &mut impl Write,
        class_name: &str,
        kind: LoadKind,
        buf: &mut [u8],
    ) -> Result<Outcome, PatchError> {
        if !self.matches(class_name) {
            return Ok(Outcome::Skipped);
        }
        let _ = diag::emit(out, diag::transform(class_name, kind));
        self.patch(buf)
    }

    /// Finds the marker in `buf`, bumps its counter and writes this
    /// transformer's record into the next free slot.
    ///
    /// All checks happen before the first write: on error `buf` is untouched.
    pub fn patch(&self, buf: &mut [u8]) -> Result<Outcome, PatchError> {
        let Some(marker_offset) = marker::locate(buf) else {
            return Ok(Outcome::Unchanged);
        };
        let buffer_len = buf.len();

        let counter_at = marker::counter_offset(marker_offset);
        let version = *buf.get(counter_at).ok_or(PatchError::OutOfBounds {
            what: "version counter",
            offset: counter_at,
            len: 1,
            buffer_len,
        })?;
        if !version.is_ascii_digit() {
            return Err(PatchError::CounterNotDigit { offset: counter_at, found: version });
        }

        let recorded = (version - INITIAL_VERSION) as usize;
        if recorded >= MAX_RECORDS {
            return Err(PatchError::CapacityExceeded { recorded, max: MAX_RECORDS });
        }

        let slot = recorded + 1;
        let record = PatchRecord {
            slot,
            offset: marker::slot_offset(marker_offset, slot),
            version,
            identity: self.config.identity,
        };
        // In bounds: slots up to MAX_RECORDS end before the counter byte,
        // which was read above.
        buf[record.offset..record.offset + RECORD_LEN].copy_from_slice(&record.encode());
        buf[counter_at] = version + 1;

        Ok(Outcome::Patched(record))
    }
}
