use std::path::Path;

use scriptlet_core::config::EngineConfig;
use scriptlet_placement::scriptlet;
use scriptlet_runtime::ProgramStore;

pub fn validate(path: &Path) -> anyhow::Result<()> {
    let source = super::read_script(path)?;
    let store = ProgramStore::new(EngineConfig::default());

    match scriptlet::validate(&store, &source) {
        Ok(()) => {
            println!("ok");
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {e}", path.display()),
    }
}
