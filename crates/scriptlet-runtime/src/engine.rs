//! Sandboxed engine construction.

use rhai::{Engine, OptimizationLevel};
use rhai::module_resolvers::DummyModuleResolver;
use tracing::{debug, info};

use scriptlet_core::config::EngineConfig;

/// Free functions every script may call besides its own and the predeclared
/// capabilities.
pub const BUILTINS: &[&str] = &[
    // Language keywords that parse as calls.
    "print",
    "debug",
    "type_of",
    "Fn",
    "call",
    "curry",
    "is_def_fn",
    "is_def_var",
    // Conversions.
    "to_string",
    "to_debug",
    "to_int",
    "to_float",
    "to_char",
    "to_upper",
    "to_lower",
    "parse_int",
    "parse_float",
    "parse_bool",
    // Collections.
    "len",
    "is_empty",
    "keys",
    "values",
    "contains",
    "get",
    "set",
    "push",
    "pop",
    "append",
    "insert",
    "remove",
    "clear",
    "reverse",
    "sort",
    "index_of",
    "filter",
    "map",
    "reduce",
    "some",
    "all",
    "range",
    // Strings.
    "trim",
    "split",
    "sub_string",
    "starts_with",
    "ends_with",
    "replace",
    // Numbers.
    "abs",
    "sign",
    "min",
    "max",
    "floor",
    "ceiling",
    "round",
    "sqrt",
    "int",
    "fraction",
];

/// Build an engine with the sandbox applied: strict variables, no modules,
/// no `eval`, bounded resources and script output routed to tracing.
///
/// The optimizer is off so the compiled AST keeps every explicit `return`.
pub fn sandboxed_engine(config: &EngineConfig) -> Engine {
    let mut engine = Engine::new();

    engine
        .set_optimization_level(OptimizationLevel::None)
        .set_strict_variables(true)
        .set_module_resolver(DummyModuleResolver::new())
        .disable_symbol("eval");

    engine
        .set_max_operations(config.max_operations)
        .set_max_call_levels(config.max_call_levels)
        .set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth)
        .set_max_string_size(config.max_string_size)
        .set_max_array_size(config.max_array_size)
        .set_max_map_size(config.max_map_size);

    engine.on_print(|text| info!(target: "scriptlet", "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: "scriptlet", source = source.unwrap_or(""), %pos, "{text}")
    });

    engine
}
