//! scriptlet.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptletConfig {
    pub engine: EngineConfig,
    pub placement: PlacementConfig,
}

/// Interpreter sandbox limits. Zero disables a limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 10_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Upper bound on one placement run, e.g. `"5s"`.
    pub timeout: String,
    /// Name of the local cluster member.
    pub server_name: String,
    pub vm_defaults: VmDefaults,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            timeout: "5s".to_string(),
            server_name: "none".to_string(),
            vm_defaults: VmDefaults::default(),
        }
    }
}

impl PlacementConfig {
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.timeout)
            .ok_or_else(|| anyhow::anyhow!("invalid placement timeout {:?}", self.timeout))
    }
}

/// Resource defaults applied to virtual machines that set no explicit limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDefaults {
    pub cpu_cores: u64,
    pub memory: String,
    pub root_disk: String,
}

impl Default for VmDefaults {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            memory: "1GiB".to_string(),
            root_disk: "10GiB".to_string(),
        }
    }
}

impl ScriptletConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScriptletConfig = toml::from_str(&content)?;
        config.placement.timeout()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse `"5s"`, `"500ms"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = ScriptletConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[placement.vm_defaults]"));

        let parsed: ScriptletConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.placement.timeout, "5s");
        assert_eq!(parsed.engine.max_call_levels, 64);
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[engine]
max_operations = 500

[placement]
server_name = "node1"
timeout = "250ms"
"#;
        let config: ScriptletConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_operations, 500);
        assert_eq!(config.engine.max_expr_depth, 64);
        assert_eq!(config.placement.server_name, "node1");
        assert_eq!(
            config.placement.timeout().unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(config.placement.vm_defaults.memory, "1GiB");
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: ScriptletConfig = toml::from_str("").unwrap();
        assert_eq!(config.placement.vm_defaults.cpu_cores, 1);
        assert_eq!(config.placement.timeout().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let config = ScriptletConfig {
            placement: PlacementConfig {
                timeout: "soon".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.placement.timeout().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scriptlet.toml");
        std::fs::write(&path, "[placement]\ntimeout = \"1m\"\n").unwrap();

        let config = ScriptletConfig::from_file(&path).unwrap();
        assert_eq!(config.placement.timeout().unwrap(), Duration::from_secs(60));

        std::fs::write(&path, "[placement]\ntimeout = \"later\"\n").unwrap();
        assert!(ScriptletConfig::from_file(&path).is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn parse_duration_overflow_is_none() {
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(
            parse_duration("307445734561825860m"),
            Some(Duration::from_secs(307445734561825860 * 60))
        );
    }
}
