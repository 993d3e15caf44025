pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use scriptlet_core::ScriptletConfig;

/// Load `scriptlet.toml`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ScriptletConfig> {
    match path {
        Some(path) => ScriptletConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ScriptletConfig::default()),
    }
}

pub fn read_script(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading scriptlet {}", path.display()))
}
