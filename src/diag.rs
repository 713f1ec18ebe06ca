//! Diagnostic lines on stdout.
//!
//! Test harnesses grep for these, so the spacing is part of the contract.

use std::fmt;
use std::io::{self, Write};

use crate::config::AgentConfig;
use crate::transform::LoadKind;

const PREFIX: &str = "JINST - ";

/// `JINST - agent  <id> for  <target> installed`
pub fn installed(config: &AgentConfig) -> String {
    format!("{PREFIX}agent  {} for  {} installed", config.identity_char(), config.target)
}

/// `JINST - transform:    <class> <load|re-define/transform>`
pub fn transform(class_name: &str, kind: LoadKind) -> String {
    format!("{PREFIX}transform:    {class_name} {kind}")
}

/// `JINST - VMInit <id>`
pub fn vm_init(config: &AgentConfig) -> String {
    format!("{PREFIX}VMInit {}", config.identity_char())
}

/// JVMTI class lifecycle events traced for the target class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassEvent {
    Load,
    Prepare,
}

impl ClassEvent {
    /// Label padded so class names line up with the transform line.
    fn label(self) -> &'static str {
        match self {
            ClassEvent::Load => "ClassLoad:    ",
            ClassEvent::Prepare => "ClassPrepare: ",
        }
    }
}

/// `JINST - ClassLoad:    <class>` / `JINST - ClassPrepare: <class>`
pub fn class_event(event: ClassEvent, class_name: &str) -> String {
    format!("{PREFIX}{}{class_name}", event.label())
}

/// `JINST - <label>Can't get class signature`, written to stderr.
pub fn class_event_failure(event: ClassEvent) -> String {
    format!("{PREFIX}{}Can't get class signature", event.label())
}

/// Writes one line and flushes, so output interleaves correctly with the
/// JVM's own stdout.
pub fn emit(out: &mut impl Write, line: impl fmt::Display) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

/// [`emit`] to stdout. A closed stdout is not the agent's problem.
pub fn print(line: impl fmt::Display) {
    let _ = emit(&mut io::stdout().lock(), line);
}

/// `JINST - <message>`, for failures.
pub fn failure(message: impl fmt::Display) -> String {
    format!("{PREFIX}{message}")
}

/// Writes a failure line to stderr.
pub fn report(line: impl fmt::Display) {
    eprintln!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_line_format() {
        let config = AgentConfig::from_options(Some(b"x"));
        assert_eq!(
            installed(&config),
            "JINST - agent  x for  io/simonis/InstrumentationTest installed"
        );
    }

    #[test]
    fn transform_line_format() {
        assert_eq!(
            transform("io/simonis/InstrumentationTest", LoadKind::Load),
            "JINST - transform:    io/simonis/InstrumentationTest load"
        );
        assert_eq!(
            transform("io/simonis/InstrumentationTest$1", LoadKind::Redefine),
            "JINST - transform:    io/simonis/InstrumentationTest$1 re-define/transform"
        );
    }

    #[test]
    fn lifecycle_line_formats() {
        let config = AgentConfig::from_options(Some(b"b"));
        assert_eq!(vm_init(&config), "JINST - VMInit b");
        assert_eq!(class_event(ClassEvent::Load, "a/B"), "JINST - ClassLoad:    a/B");
        assert_eq!(class_event(ClassEvent::Prepare, "a/B"), "JINST - ClassPrepare: a/B");
        assert_eq!(
            class_event_failure(ClassEvent::Prepare),
            "JINST - ClassPrepare: Can't get class signature"
        );
    }

    #[test]
    fn failure_line_format() {
        assert_eq!(failure("Allocate(12) failed"), "JINST - Allocate(12) failed");
    }

    #[test]
    fn emit_appends_newline() {
        let mut out = Vec::new();
        emit(&mut out, "JINST - VMInit a").unwrap();
        assert_eq!(out, b"JINST - VMInit a\n");
    }
}
