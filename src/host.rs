//! Registration with the host that loads and redefines classes.
//!
//! The JVMTI implementation lives in [`crate::agent`]; tests use their own.

use std::io::{self, Write};

use crate::config::AgentConfig;
use crate::diag;
use crate::transform::ClassTransformer;

/// A host facility that calls a [`ClassTransformer`] for every class load
/// and redefinition after registration.
pub trait Instrumentation {
    type Error;

    /// Takes ownership of the transformer for the rest of the host's life.
    fn add_transformer(&mut self, transformer: ClassTransformer) -> Result<(), Self::Error>;
}

/// Registers the transformer when the agent is loaded at host startup.
pub fn premain<I: Instrumentation>(options: Option<&[u8]>, inst: &mut I) -> Result<(), I::Error> {
    install(&mut io::stdout(), options, inst)
}

/// Registers the transformer when the agent is attached to a running host.
pub fn agentmain<I: Instrumentation>(options: Option<&[u8]>, inst: &mut I) -> Result<(), I::Error> {
    install(&mut io::stdout(), options, inst)
}

/// Builds the transformer for `options`, registers it with `inst` and then
/// writes the install line to `out`. Nothing is written if registration fails.
pub fn install<I: Instrumentation>(
    out: &mut impl Write,
    options: Option<&[u8]>,
    inst: &mut I,
) -> Result<(), I::Error> {
    let config = AgentConfig::from_options(options);
    let line = diag::installed(&config);
    inst.add_transformer(ClassTransformer::new(config))?;
    let _ = diag::emit(out, line);
    Ok(())
}
