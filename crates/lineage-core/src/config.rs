//! Deployment configuration: tool binary, timeouts, ignore rules and the
//! stage table.
//!
//! Resolution order: built-in defaults, then a TOML file, then `LINEAGE_*`
//! environment variables. Command-line flags are applied last by the binary.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{LineageError, Result, Stage};

/// Environment variable overriding [`LineageConfig::git_binary`].
pub const ENV_GIT_BINARY: &str = "LINEAGE_GIT_BINARY";
/// Environment variable overriding [`LineageConfig::command_timeout_secs`].
pub const ENV_TIMEOUT_SECS: &str = "LINEAGE_TIMEOUT_SECS";
/// Environment variable overriding [`LineageConfig::history_limit`].
pub const ENV_HISTORY_LIMIT: &str = "LINEAGE_HISTORY_LIMIT";
/// Environment variable overriding [`LineageConfig::cache_enabled`].
pub const ENV_CACHE: &str = "LINEAGE_CACHE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LineageConfig {
    /// Version-control executable.
    pub git_binary: String,
    /// Hard wall-clock limit for every tool invocation (seconds).
    pub command_timeout_secs: u64,
    /// Directory names never descended into.
    pub ignore_dirs: Vec<String>,
    /// File names left out of scans.
    pub ignore_files: Vec<String>,
    /// Default number of commits in a timeline.
    pub history_limit: usize,
    /// Keep built graphs in a fingerprinted in-process cache.
    pub cache_enabled: bool,
    /// Closed, ordered stage table.
    pub stages: Vec<Stage>,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            command_timeout_secs: 30,
            ignore_dirs: vec![".git".into(), ".datalad".into(), ".annex".into()],
            ignore_files: vec![".DS_Store".into()],
            history_limit: 20,
            cache_enabled: false,
            stages: default_stages(),
        }
    }
}

/// input → processing → output → visualization.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new("input", 0, "{input,inputs,raw,raw_data}"),
        Stage::new("processing", 1, "{processing,preprocessed,scripts,analysis}"),
        Stage::new("output", 2, "{output,outputs,results,models}"),
        Stage::new("visualization", 3, "{visualization,visualizations,plots}"),
    ]
}

impl LineageConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LineageError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| LineageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LINEAGE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup(ENV_GIT_BINARY) {
            self.git_binary = binary;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.command_timeout_secs = parse_var(ENV_TIMEOUT_SECS, &secs)?;
        }
        if let Some(limit) = lookup(ENV_HISTORY_LIMIT) {
            self.history_limit = parse_var(ENV_HISTORY_LIMIT, &limit)?;
        }
        if let Some(cache) = lookup(ENV_CACHE) {
            self.cache_enabled = match cache.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(LineageError::Config(format!(
                        "{ENV_CACHE}: expected a boolean, got {other:?}"
                    )))
                }
            };
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.git_binary.trim().is_empty() {
            return Err(LineageError::Config("git_binary must not be empty".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(LineageError::Config(
                "command_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(LineageError::Config(
                "history_limit must be greater than zero".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut orders = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(LineageError::Config("stage name must not be empty".into()));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(LineageError::Config(format!(
                    "duplicate stage name: {}",
                    stage.name
                )));
            }
            if !orders.insert(stage.order) {
                return Err(LineageError::Config(format!(
                    "duplicate stage order {} ({})",
                    stage.order, stage.name
                )));
            }
            globset::Glob::new(&stage.match_rule).map_err(|e| {
                LineageError::Config(format!("stage {}: bad match rule: {e}", stage.name))
            })?;
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LineageError::Config(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = LineageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.stages.len(), 4);
        assert_eq!(config.stages[0].name, "input");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LineageConfig::from_toml_str("history_limit = 50\n").unwrap();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.git_binary, "git");
        assert_eq!(config.stages, default_stages());
    }

    #[test]
    fn test_custom_stage_table() {
        let toml = r#"
            [[stages]]
            name = "ingest"
            order = 0
            match_rule = "{incoming,landing}"

            [[stages]]
            name = "publish"
            order = 1
            matchRule = "public"
        "#;
        let config = LineageConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[1].match_rule, "public");
    }

    #[test]
    fn test_duplicate_stage_order_rejected() {
        let toml = r#"
            [[stages]]
            name = "a"
            order = 0
            match_rule = "a"

            [[stages]]
            name = "b"
            order = 0
            match_rule = "b"
        "#;
        let err = LineageConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate stage order"));
    }

    #[test]
    fn test_bad_glob_rejected() {
        let mut config = LineageConfig::default();
        config.stages[0].match_rule = "{unclosed".into();
        assert!(matches!(config.validate(), Err(LineageError::Config(_))));
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [
            (ENV_TIMEOUT_SECS, "5"),
            (ENV_CACHE, "true"),
            (ENV_GIT_BINARY, "/usr/bin/git"),
        ]
        .into_iter()
        .collect();
        let mut config = LineageConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.command_timeout_secs, 5);
        assert!(config.cache_enabled);
        assert_eq!(config.git_binary, "/usr/bin/git");

        let mut config = LineageConfig::default();
        let err = config
            .apply_overrides(|k| (k == ENV_TIMEOUT_SECS).then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
