//! Named registry of compiled scriptlets.

use std::collections::HashMap;
use std::sync::Arc;

use rhai::Engine;
use tokio::sync::Mutex;
use tracing::{debug, info};

use scriptlet_core::config::EngineConfig;

use crate::context::ExecutionContext;
use crate::engine::sandboxed_engine;
use crate::error::{ScriptError, ScriptResult};
use crate::program::{Capability, CompiledProgram};

/// Compiles, caches and hands out scriptlet programs by name.
///
/// The registry lock is held only around map access; compilation happens
/// before the lock is taken, so a slow compile never blocks lookups.
#[derive(Clone)]
pub struct ProgramStore {
    compiler: Arc<Engine>,
    engine_config: EngineConfig,
    /// Program cache: name → compiled program.
    programs: Arc<Mutex<HashMap<String, Arc<CompiledProgram>>>>,
}

impl ProgramStore {
    pub fn new(engine_config: EngineConfig) -> Self {
        Self {
            compiler: Arc::new(sandboxed_engine(&engine_config)),
            engine_config,
            programs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Compile without touching the registry.
    pub fn compile(
        &self,
        name: &str,
        predeclared: &[Capability],
        source: &str,
    ) -> ScriptResult<CompiledProgram> {
        CompiledProgram::compile(&self.compiler, name, predeclared, source)
    }

    /// Check that `source` compiles against `predeclared`.
    pub fn validate(&self, predeclared: &[Capability], source: &str) -> ScriptResult<()> {
        self.compile("source", predeclared, source).map(|_| ())
    }

    /// Activate `source` under `name`. Blank source unloads the program.
    ///
    /// On a compile error the previously loaded program stays active.
    pub async fn set(&self, name: &str, predeclared: &[Capability], source: &str) -> ScriptResult<()> {
        if source.trim().is_empty() {
            self.delete(name).await;
            return Ok(());
        }

        let program = Arc::new(self.compile(name, predeclared, source)?);
        let replaced = self
            .programs
            .lock()
            .await
            .insert(name.to_string(), program)
            .is_some();

        info!(program = %name, replaced, "scriptlet loaded");
        Ok(())
    }

    /// Fetch a program with a brand-new execution context.
    pub async fn get(&self, name: &str) -> ScriptResult<(Arc<CompiledProgram>, ExecutionContext)> {
        let program = self
            .programs
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::NotLoaded(name.to_string()))?;

        let context = ExecutionContext::new(
            Arc::clone(&program),
            sandboxed_engine(&self.engine_config),
        );
        Ok((program, context))
    }

    /// Unload `name`. Returns whether a program was loaded.
    pub async fn delete(&self, name: &str) -> bool {
        let removed = self.programs.lock().await.remove(name).is_some();
        if removed {
            info!(program = %name, "scriptlet unloaded");
        } else {
            debug!(program = %name, "no scriptlet to unload");
        }
        removed
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.programs.lock().await.contains_key(name)
    }

    /// Names of all loaded programs, sorted.
    pub async fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.programs.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use rhai::Dynamic;

    const CAPS: &[Capability] = &[Capability::variadic("log_info", 1, 4)];

    fn store() -> ProgramStore {
        ProgramStore::new(EngineConfig::default())
    }

    #[tokio::test]
    async fn store_starts_empty() {
        let store = store();
        assert!(store.loaded().await.is_empty());
        assert!(matches!(store.get("p").await, Err(ScriptError::NotLoaded(name)) if name == "p"));
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = store();
        store.set("p", CAPS, "fn entry(a, b) { }").await.unwrap();

        assert!(store.contains("p").await);
        let (program, _ctx) = store.get("p").await.unwrap();
        assert_eq!(program.name(), "p");
        assert!(program.has_function("entry", 2));
    }

    #[tokio::test]
    async fn empty_source_unloads() {
        let store = store();
        store.set("p", CAPS, "fn entry(a, b) { }").await.unwrap();
        store.set("p", CAPS, "  \n").await.unwrap();

        assert!(matches!(store.get("p").await, Err(ScriptError::NotLoaded(_))));
        // Unloading again is a no-op.
        store.set("p", CAPS, "").await.unwrap();
    }

    #[tokio::test]
    async fn failed_set_keeps_previous_program() {
        let store = store();
        store.set("p", CAPS, "fn entry(a, b) { }").await.unwrap();

        let err = store.set("p", CAPS, "fn entry(a, b) { nope(); }").await.unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));

        let (program, _) = store.get("p").await.unwrap();
        assert!(program.has_function("entry", 2));
    }

    #[tokio::test]
    async fn set_replaces_program() {
        let store = store();
        store.set("p", CAPS, "fn first(a, b) { }").await.unwrap();
        store.set("p", CAPS, "fn second(a, b) { }").await.unwrap();

        let (program, _) = store.get("p").await.unwrap();
        assert!(!program.defines("first"));
        assert!(program.defines("second"));
        assert_eq!(store.loaded().await, vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = store();
        store.set("b", CAPS, "fn entry(a, b) { }").await.unwrap();
        store.set("a", CAPS, "fn entry(a, b) { }").await.unwrap();
        assert_eq!(store.loaded().await, vec!["a".to_string(), "b".to_string()]);

        assert!(store.delete("a").await);
        assert!(!store.delete("a").await);
        assert_eq!(store.loaded().await, vec!["b".to_string()]);
    }

    #[test]
    fn validate_rejects_unknown_names() {
        let store = store();
        assert!(store.validate(CAPS, r#"log_info("x");"#).is_ok());
        assert!(matches!(
            store.validate(CAPS, "log_debug(1);"),
            Err(ScriptError::Compile { .. })
        ));
        assert!(matches!(
            store.validate(CAPS, "log_info();"),
            Err(ScriptError::Compile { .. })
        ));
    }

    #[tokio::test]
    async fn every_get_returns_a_fresh_context() {
        let store = store();
        store
            .set("p", &[], "let calls = 0; fn entry(a, b) { }")
            .await
            .unwrap();

        for _ in 0..2 {
            let (_, mut ctx) = store.get("p").await.unwrap();
            ctx.init(&CancelToken::never()).unwrap();
            ctx.call("entry", (Dynamic::UNIT, Dynamic::UNIT), &CancelToken::never())
                .unwrap();
        }
    }
}
