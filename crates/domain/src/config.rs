//! Runtime configuration, sourced from environment variables.
//!
//! Integrations may declare additional keys at runtime; those live directly
//! in the process environment and are not modelled here.

use std::path::PathBuf;

/// Connection settings for the single configured LLM endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
    /// Root directory for the filesystem tools; paths may not escape it.
    pub tools_fs_root: PathBuf,
    /// Whether the `run_command` shell tool is exposed.
    pub shell_enabled: bool,
    /// Env file that persisted integration credentials are written to.
    pub env_file: PathBuf,
    pub port: u16,
}

impl Config {
    /// Build a config from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            llm: LlmConfig {
                api_key: var("LLM_API_KEY").unwrap_or_default(),
                base_url: var("LLM_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
                model: var("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            },
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| "envoy.db".into()),
            tools_fs_root: var("TOOLS_FS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| "workspace".into()),
            shell_enabled: var("TOOLS_SHELL_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            env_file: var("ENV_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| ".env".into()),
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".into(),
                model: "gpt-4o-mini".into(),
            },
            database_path: "envoy.db".into(),
            tools_fs_root: "workspace".into(),
            shell_enabled: false,
            env_file: ".env".into(),
            port: 3000,
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn default_config_is_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.database_path, PathBuf::from("envoy.db"));
        assert!(!cfg.shell_enabled);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
    }
}
