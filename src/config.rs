//! Agent configuration from the `-agentpath:...=<options>` string.

use crate::marker::{DEFAULT_IDENTITY, TARGET_CLASS};

/// Fixed for the lifetime of a transformer once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Byte written at the end of every record this instance produces.
    pub identity: u8,
    /// Only classes whose name starts with this are transformed.
    pub target: String,
}

impl AgentConfig {
    /// Only the first character of `options` is significant; absent or empty
    /// options give the default identity `'a'`.
    pub fn from_options(options: Option<&[u8]>) -> Self {
        let identity = options.and_then(first_char_as_byte).unwrap_or(DEFAULT_IDENTITY);
        AgentConfig {
            identity,
            target: TARGET_CLASS.to_string(),
        }
    }

    /// Identity as printed in diagnostics.
    pub fn identity_char(&self) -> char {
        char::from(self.identity)
    }
}

/// Low byte of the first UTF-16 unit of `options`, the way a Java agent
/// narrows `args.charAt(0)` to a byte. Options that do not start with valid
/// UTF-8 fall back to their first raw byte.
fn first_char_as_byte(options: &[u8]) -> Option<u8> {
    let valid = match std::str::from_utf8(options) {
        Ok(s) => s,
        Err(err) => std::str::from_utf8(&options[..err.valid_up_to()]).unwrap_or(""),
    };
    match valid.chars().next() {
        Some(c) => {
            let mut units = [0u16; 2];
            Some(c.encode_utf16(&mut units)[0] as u8)
        }
        None => options.first().copied(),
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_options(None)
    }
}
