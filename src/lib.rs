//! # jinst
//!
//! A JVMTI agent that watermarks one test class every time it is loaded,
//! redefined or retransformed, so a test harness can verify afterwards how
//! often and in which order an instrumentation layer touched the class, and
//! which agent instance did it.
//!
//! The target class `io/simonis/InstrumentationTest` carries a string constant
//! made of 48 `x` followed by the digit `0`. On each hook call the agent
//! finds the `x` run, increments the digit and writes a record
//! `[old digit]JINST[id]` into the next 8-byte slot. See [`marker`] for the
//! exact layout.
//!
//! ## Running
//!
//! ```bash
//! cargo build --release
//! java -agentpath:./target/release/libjinst.so=a \
//!      -agentpath:./target/release/libjinst.so=b \
//!      io.simonis.InstrumentationTest
//! ```
//!
//! The first character of the options string is the agent's identity (`a` if
//! absent). On startup each instance prints
//!
//! ```text
//! JINST - agent  a for  io/simonis/InstrumentationTest installed
//! ```
//!
//! and for every load or redefinition of the target class
//!
//! ```text
//! JINST - transform:    io/simonis/InstrumentationTest load
//! ```
//!
//! The same library can be loaded late through the Attach API
//! (`Agent_OnAttach`); it behaves exactly as at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Agent_OnLoad / Agent_OnAttach  (agent)            │
//! │   JvmtiHost: capabilities, callbacks, local storage      │
//! ├─────────────────────────────────────────────────────────┤
//! │        premain / agentmain  (host::Instrumentation)      │
//! ├─────────────────────────────────────────────────────────┤
//! │   ClassTransformer (transform)  ─ diag ─ config          │
//! │   marker layout + pattern::find                          │
//! ├─────────────────────────────────────────────────────────┤
//! │   env::Jvmti  ─  sys::{jni, jvmti}                       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything below `agent` is plain safe Rust over `&mut [u8]` and can be
//! driven without a JVM:
//!
//! ```rust
//! use jinst::{AgentConfig, ClassTransformer, Outcome};
//!
//! let mut class_bytes = b"..".to_vec();
//! class_bytes.extend_from_slice(&[b'x'; 48]);
//! class_bytes.extend_from_slice(b"0..");
//! let transformer = ClassTransformer::new(AgentConfig::from_options(Some(b"b")));
//!
//! let outcome = transformer.patch(&mut class_bytes).unwrap();
//! assert!(matches!(outcome, Outcome::Patched(_)));
//! assert_eq!(&class_bytes[10..17], b"0JINSTb");
//! ```

pub mod sys;
pub mod env;

pub mod agent;
pub mod config;
pub mod diag;
pub mod error;
pub mod host;
pub mod marker;
pub mod pattern;
pub mod transform;

pub use crate::config::AgentConfig;
pub use crate::error::{AgentError, PatchError};
pub use crate::host::{agentmain, install, premain, Instrumentation};
pub use crate::marker::{read_history, History, PatchRecord};
pub use crate::transform::{ClassTransformer, LoadKind, Outcome};
