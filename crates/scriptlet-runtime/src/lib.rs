//! scriptlet-runtime — sandboxed script compilation and execution.
//!
//! Scriptlets are small, user-supplied rhai programs implementing one
//! decision hook. This crate owns their whole lifecycle:
//!
//! - **Compilation**: sources are compiled against a fixed allow-list of
//!   predeclared capabilities, each with the argument counts it accepts. A
//!   free call resolving to none of them, the script's own functions or the
//!   builtin universe is a compile error, as is a capability call with the
//!   wrong number of arguments.
//! - **Caching**: compiled programs live in a [`ProgramStore`], shared by
//!   `Arc` across concurrent invocations.
//! - **Execution**: every invocation gets a fresh [`ExecutionContext`] with
//!   its own engine, bound capabilities and globals.
//! - **Cancellation**: a [`CancelToken`] is polled at the interpreter's
//!   progress safepoint.
//!
//! # Architecture
//!
//! ```text
//! ProgramStore
//!   ├── compiler (sandboxed rhai::Engine, compile only)
//!   └── programs: name → Arc<CompiledProgram>
//!
//! get(name) ──▶ ExecutionContext
//!                 ├── Arc<CompiledProgram>   (shared, read-only)
//!                 ├── rhai::Engine           (fresh, capabilities bound)
//!                 └── Scope                  (globals, frozen after init)
//! ```

pub mod bridge;
pub mod cancel;
pub mod context;
pub mod engine;
pub mod error;
pub mod program;
pub mod store;

pub use bridge::{to_rhai, to_script_value};
pub use cancel::CancelToken;
pub use context::ExecutionContext;
pub use error::{ScriptError, ScriptResult};
pub use program::{Capability, CompiledProgram};
pub use store::ProgramStore;
