//! Per-invocation execution contexts.

use std::collections::BTreeSet;
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Scope};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{ScriptError, ScriptResult};
use crate::program::CompiledProgram;

/// Reason reported when the safepoint aborts a script.
const CANCEL_REASON: &str = "Request finished";

/// A single-use pairing of a compiled program with a private engine.
///
/// Lifecycle: [`bind`](Self::bind) every predeclared name, then
/// [`init`](Self::init) once, then [`call`](Self::call) the entry point.
pub struct ExecutionContext {
    program: Arc<CompiledProgram>,
    engine: Engine,
    scope: Scope<'static>,
    bound: BTreeSet<String>,
    initialized: bool,
}

impl ExecutionContext {
    pub(crate) fn new(program: Arc<CompiledProgram>, engine: Engine) -> Self {
        Self {
            program,
            engine,
            scope: Scope::new(),
            bound: BTreeSet::new(),
            initialized: false,
        }
    }

    pub fn program(&self) -> &Arc<CompiledProgram> {
        &self.program
    }

    /// Register a capability under `name` on this context's engine.
    pub fn bind(&mut self, name: &str, register: impl FnOnce(&mut Engine, &str)) -> &mut Self {
        register(&mut self.engine, name);
        self.bound.insert(name.to_string());
        self
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains(name)
    }

    /// Run the program's top-level statements and freeze the globals.
    pub fn init(&mut self, cancel: &CancelToken) -> ScriptResult<()> {
        if self.initialized {
            return Err(ScriptError::Runtime(
                "Failed initializing: context already initialized".to_string(),
            ));
        }

        if let Some(missing) = self
            .program
            .predeclared()
            .iter()
            .find(|cap| !self.bound.contains(cap.name))
        {
            return Err(ScriptError::UnboundName(missing.name.to_string()));
        }

        self.install_safepoint(cancel)?;
        self.engine
            .run_ast_with_scope(&mut self.scope, self.program.ast())
            .map_err(|e| self.classify(e, "Failed initializing"))?;

        let mut frozen = Scope::new();
        for (name, _, value) in self.scope.iter() {
            frozen.push_constant_dynamic(name.to_string(), value);
        }
        self.scope = frozen;
        self.initialized = true;

        debug!(program = %self.program.name(), globals = self.scope.len(), "scriptlet initialized");
        Ok(())
    }

    /// Call `entry` with two positional arguments. A value handed back by an
    /// explicit `return` must be unit; the implicit value of the last
    /// statement is discarded.
    pub fn call(
        &mut self,
        entry: &str,
        args: (Dynamic, Dynamic),
        cancel: &CancelToken,
    ) -> ScriptResult<()> {
        if !self.initialized {
            self.init(cancel)?;
        }
        if !self.program.has_function(entry, 2) {
            return Err(ScriptError::MissingEntryPoint(entry.to_string()));
        }

        self.install_safepoint(cancel)?;
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut self.scope, self.program.ast(), entry, args)
            .map_err(|e| self.classify(e, "Failed to run"))?;

        if !result.is_unit() && self.program.returns_value(entry, 2) {
            return Err(ScriptError::UnexpectedReturn {
                type_name: result.type_name().to_string(),
                value: result.to_string(),
            });
        }

        Ok(())
    }

    fn install_safepoint(&mut self, cancel: &CancelToken) -> ScriptResult<()> {
        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled(CANCEL_REASON.to_string()));
        }

        let token = cancel.clone();
        self.engine.on_progress(move |_| {
            token
                .is_cancelled()
                .then(|| Dynamic::from(CANCEL_REASON.to_string()))
        });
        Ok(())
    }

    fn classify(&self, err: Box<EvalAltResult>, phase: &str) -> ScriptError {
        let message = format!("{phase}: {err}");

        let mut root = *err;
        while let EvalAltResult::ErrorInFunctionCall(_, _, inner, _) = root {
            root = *inner;
        }

        match root {
            EvalAltResult::ErrorTerminated(reason, _) => ScriptError::Cancelled(reason.to_string()),
            EvalAltResult::ErrorFunctionNotFound(signature, _) => {
                let name = signature
                    .split(|c: char| c == ' ' || c == '(')
                    .next()
                    .unwrap_or_default();
                if self.program.is_predeclared(name) && !self.bound.contains(name) {
                    ScriptError::UnboundName(name.to_string())
                } else {
                    ScriptError::Runtime(message)
                }
            }
            _ => ScriptError::Runtime(message),
        }
    }
}
