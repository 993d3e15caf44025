//! Loading the instance placement scriptlet.

use scriptlet_runtime::{ProgramStore, ScriptResult};

use crate::capability::CAPABILITIES;

/// Registry name of the placement program.
pub const INSTANCE_PLACEMENT: &str = "instance_placement";

/// Function the runner calls with `(request, candidate_members)`.
pub const ENTRY_POINT: &str = "instance_placement";

/// Check a placement scriptlet without activating it.
pub fn validate(store: &ProgramStore, source: &str) -> ScriptResult<()> {
    store.validate(CAPABILITIES, source)
}

/// Activate a placement scriptlet. Blank source unloads it.
pub async fn set(store: &ProgramStore, source: &str) -> ScriptResult<()> {
    store.set(INSTANCE_PLACEMENT, CAPABILITIES, source).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptlet_core::config::EngineConfig;
    use scriptlet_runtime::ScriptError;

    const VALID: &str = r#"
fn instance_placement(request, candidate_members) {
    let res = get_instance_resources();
    log_info("placing ", request.name, " needing ", res.cpu_cores);
    for member in candidate_members {
        let state = get_cluster_member_state(member.server_name);
        if type_of(state) != "string" {
            set_target(member.server_name);
        }
    }
    log_warn("done");
}
"#;

    #[test]
    fn capabilities_are_accepted() {
        let store = ProgramStore::new(EngineConfig::default());
        validate(&store, VALID).unwrap();
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let store = ProgramStore::new(EngineConfig::default());
        let err = validate(
            &store,
            "fn instance_placement(request, candidate_members) { delete_instance(request.name); }",
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));
    }

    #[tokio::test]
    async fn set_uses_the_placement_name() {
        let store = ProgramStore::new(EngineConfig::default());
        set(&store, VALID).await.unwrap();
        assert_eq!(store.loaded().await, vec![INSTANCE_PLACEMENT.to_string()]);

        set(&store, "").await.unwrap();
        assert!(!store.contains(INSTANCE_PLACEMENT).await);
    }
}
