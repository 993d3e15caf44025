pub mod config;
pub mod types;

pub use config::ScriptletConfig;
pub use types::*;
