//! Compiled scriptlet programs.

use std::collections::BTreeSet;

use rhai::{AST, ASTFlags, ASTNode, Engine, Expr, Position, Stmt};

use crate::engine::BUILTINS;
use crate::error::{ScriptError, ScriptResult};

/// A host function scripts may call without defining it, with the number
/// of arguments it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
}

impl Capability {
    /// A capability taking exactly `args` arguments.
    pub const fn new(name: &'static str, args: usize) -> Self {
        Self {
            name,
            min_args: args,
            max_args: args,
        }
    }

    pub const fn variadic(name: &'static str, min_args: usize, max_args: usize) -> Self {
        Self {
            name,
            min_args,
            max_args,
        }
    }

    pub fn accepts(&self, args: usize) -> bool {
        (self.min_args..=self.max_args).contains(&args)
    }

    fn arity(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        }
    }
}

/// An immutable compiled scriptlet.
///
/// Programs are shared read-only between concurrent invocations; everything
/// mutable lives in the per-invocation [`crate::ExecutionContext`].
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    name: String,
    ast: AST,
    predeclared: Vec<Capability>,
    /// Script-defined functions as `(name, arity)`.
    functions: BTreeSet<(String, usize)>,
    /// Functions containing an explicit `return <value>`.
    value_returns: BTreeSet<(String, usize)>,
}

impl CompiledProgram {
    /// Compile `source` and resolve every free call against the script's
    /// own functions, `predeclared` and [`BUILTINS`].
    pub fn compile(
        engine: &Engine,
        name: &str,
        predeclared: &[Capability],
        source: &str,
    ) -> ScriptResult<Self> {
        let compile_error = |message: String| ScriptError::Compile {
            name: name.to_string(),
            message,
        };

        let ast = engine
            .compile(source)
            .map_err(|e| compile_error(e.to_string()))?;

        let functions: BTreeSet<(String, usize)> = ast
            .iter_functions()
            .map(|f| (f.name.to_string(), f.params.len()))
            .collect();

        if let Some((shadowed, _)) = functions
            .iter()
            .find(|(f, _)| predeclared.iter().any(|cap| cap.name == f.as_str()))
        {
            return Err(compile_error(format!(
                "function {shadowed} redefines a predeclared name"
            )));
        }

        let defined: BTreeSet<&str> = functions.iter().map(|(f, _)| f.as_str()).collect();
        if let Some(message) = first_unresolved(&ast, &defined, predeclared) {
            return Err(compile_error(message));
        }

        let value_returns = functions
            .iter()
            .filter(|(f, arity)| returns_value(&ast, f, *arity))
            .cloned()
            .collect();

        Ok(Self {
            name: name.to_string(),
            ast,
            predeclared: predeclared.to_vec(),
            functions,
            value_returns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ast(&self) -> &AST {
        &self.ast
    }

    pub fn predeclared(&self) -> &[Capability] {
        &self.predeclared
    }

    pub fn is_predeclared(&self, name: &str) -> bool {
        self.predeclared.iter().any(|cap| cap.name == name)
    }

    /// Whether the script defines `name` taking exactly `arity` parameters.
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.functions.contains(&(name.to_string(), arity))
    }

    pub fn defines(&self, name: &str) -> bool {
        self.functions.iter().any(|(f, _)| f == name)
    }

    /// Whether `name/arity` has an explicit `return <value>` in its body.
    /// Without one, the value of a function's last statement is incidental.
    pub fn returns_value(&self, name: &str, arity: usize) -> bool {
        self.value_returns.contains(&(name.to_string(), arity))
    }
}

fn returns_value(ast: &AST, name: &str, arity: usize) -> bool {
    let body = ast.clone_functions_only_filtered(|_, _, _, f, params| f == name && params == arity);
    let mut found = false;

    body.walk(&mut |path: &[ASTNode]| {
        // `throw` shares the return node, flagged BREAK.
        if let Some(ASTNode::Stmt(Stmt::Return(Some(expr), flags, _))) = path.last() {
            if !flags.contains(ASTFlags::BREAK) && !matches!(**expr, Expr::Unit(_)) {
                found = true;
                return false;
            }
        }
        true
    });

    found
}

/// Walk the whole AST, function bodies included, and report the first
/// free call or import that does not resolve.
fn first_unresolved(
    ast: &AST,
    defined: &BTreeSet<&str>,
    predeclared: &[Capability],
) -> Option<String> {
    let mut found = None;

    ast.walk(&mut |path: &[ASTNode]| {
        let (call, pos) = match path.last() {
            Some(ASTNode::Expr(Expr::FnCall(call, pos))) => (call, *pos),
            Some(ASTNode::Stmt(Stmt::FnCall(call, pos))) => (call, *pos),
            Some(ASTNode::Stmt(Stmt::Import(..))) => {
                found = Some("modules cannot be imported".to_string());
                return false;
            }
            _ => return true,
        };

        let name = call.name.as_str();
        if call.is_qualified() {
            found = Some(located(format!("qualified call to {name} is not allowed"), pos));
            return false;
        }

        if let Some(cap) = predeclared.iter().find(|cap| cap.name == name) {
            if cap.accepts(call.args.len()) {
                return true;
            }
            found = Some(located(
                format!("{name} takes {} arguments, got {}", cap.arity(), call.args.len()),
                pos,
            ));
            return false;
        }

        // Operators are calls too.
        if !is_identifier(name) || defined.contains(name) || BUILTINS.contains(&name) {
            return true;
        }

        found = Some(located(format!("undefined: {name}"), pos));
        false
    });

    found
}

fn located(message: String, pos: Position) -> String {
    if pos.is_none() {
        message
    } else {
        format!("{message} ({pos})")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sandboxed_engine;
    use scriptlet_core::config::EngineConfig;

    const CAPS: &[Capability] = &[
        Capability::variadic("log_info", 1, 4),
        Capability::new("set_target", 1),
    ];

    fn compile(source: &str) -> ScriptResult<CompiledProgram> {
        let engine = sandboxed_engine(&EngineConfig::default());
        CompiledProgram::compile(&engine, "test", CAPS, source)
    }

    fn compile_message(source: &str) -> String {
        match compile(source) {
            Err(ScriptError::Compile { message, .. }) => message,
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn resolves_predeclared_builtin_and_own_functions() {
        let program = compile(
            r#"
            fn pick(members) {
                let names = [];
                for m in members { names.push(m.server_name); }
                helper(names)
            }
            fn helper(names) { if len(names) > 0 { set_target(names[0]); } }
            log_info("loaded");
            "#,
        )
        .unwrap();

        assert!(program.has_function("pick", 1));
        assert!(!program.has_function("pick", 2));
        assert!(program.defines("helper"));
        assert_eq!(program.name(), "test");
        assert!(program.is_predeclared("set_target"));
    }

    #[test]
    fn unknown_free_call_is_rejected() {
        let message = compile_message("fn f() { launch_missiles(); }");
        assert!(message.contains("undefined: launch_missiles"), "{message}");
    }

    #[test]
    fn unknown_call_at_top_level_is_rejected() {
        let message = compile_message("open_socket(1);");
        assert!(message.contains("open_socket"));
    }

    #[test]
    fn operators_and_methods_are_not_free_calls() {
        assert!(compile("let x = 1 + 2 * 3; let s = \"a\"; let y = s.len() == 1 && !false;").is_ok());
    }

    #[test]
    fn redefining_a_predeclared_name_is_rejected() {
        let message = compile_message("fn set_target(name) { }");
        assert!(message.contains("redefines a predeclared name"));
    }

    #[test]
    fn syntax_errors_are_compile_errors() {
        assert!(matches!(compile("fn ("), Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn capability_arity_is_checked() {
        assert!(compile(r#"log_info("a", 1, "b", 2);"#).is_ok());

        let message = compile_message(r#"log_info("a", 1, "b", 2, "c");"#);
        assert!(message.contains("log_info takes 1 to 4 arguments, got 5"), "{message}");

        let message = compile_message("fn f() { set_target(); }");
        assert!(message.contains("set_target takes 1 arguments, got 0"), "{message}");
    }

    #[test]
    fn explicit_value_returns_are_recorded() {
        let program = compile(
            r#"
            fn tail(a, b) { set_target("x"); }
            fn expr_tail(a, b) { a + b }
            fn bare(a, b) { if a > b { return; } set_target("x"); }
            fn early(a, b) { if a > b { return a; } set_target("x"); }
            fn last(a, b) { let c = a + b; return c; }
            fn thrower(a, b) { throw "no"; }
            "#,
        )
        .unwrap();

        assert!(!program.returns_value("tail", 2));
        assert!(!program.returns_value("expr_tail", 2));
        assert!(!program.returns_value("bare", 2));
        assert!(program.returns_value("early", 2));
        assert!(program.returns_value("last", 2));
        assert!(!program.returns_value("thrower", 2));
        assert!(!program.returns_value("last", 1));
    }

    #[test]
    fn imports_are_rejected() {
        assert!(compile("import \"os\" as os;").is_err());
    }
}
