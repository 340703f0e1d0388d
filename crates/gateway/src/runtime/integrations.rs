//! Integration credential management.
//!
//! Posted config values are filtered to the keys an integration declares,
//! persisted as `KEY=VALUE` lines in the env file (unrelated lines are
//! preserved), and written into the live process environment so the very
//! next turn — and the sandbox's `env` view — sees them without a restart.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use envoy_domain::error::Result;
use envoy_store::model::IntegrationRow;

use crate::state::AppState;

/// Load `KEY=VALUE` lines from the env file into the process environment.
/// Variables already present in the environment win. Called once on boot.
pub fn load_env_file(path: &Path) {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return;
    };
    let mut loaded = 0usize;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() && std::env::var_os(key).is_none() {
                std::env::set_var(key, value.trim());
                loaded += 1;
            }
        }
    }
    if loaded > 0 {
        tracing::info!(count = loaded, path = %path.display(), "env file loaded");
    }
}

/// Persist posted config values for an integration.
///
/// Keeps only declared keys, drops empty strings, upserts the env file,
/// and updates the live environment immediately. Returns how many values
/// were saved.
pub async fn save_config(
    state: &AppState,
    integration: &IntegrationRow,
    values: &HashMap<String, String>,
) -> Result<usize> {
    let declared: HashSet<&str> = integration
        .config_schema
        .iter()
        .map(|k| k.key.as_str())
        .collect();

    let pairs: Vec<(String, String)> = values
        .iter()
        .filter(|(key, value)| declared.contains(key.as_str()) && !value.trim().is_empty())
        .map(|(key, value)| (key.clone(), value.trim().to_string()))
        .collect();

    if pairs.is_empty() {
        return Ok(0);
    }

    upsert_env_lines(&state.config.env_file, &pairs)?;

    for (key, value) in &pairs {
        std::env::set_var(key, value);
    }

    tracing::info!(
        integration = %integration.name,
        keys = ?pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
        "integration config saved"
    );

    Ok(pairs.len())
}

/// Masked view of an integration's credential values for UI display.
/// Unset keys map to `null`.
pub fn masked_values(integration: &IntegrationRow) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for key in &integration.config_schema {
        let value = match std::env::var(&key.key) {
            Ok(v) if !v.is_empty() => serde_json::Value::String(mask_value(&v)),
            _ => serde_json::Value::Null,
        };
        map.insert(key.key.clone(), value);
    }
    map
}

/// True iff every required key resolves to a non-empty value in the live
/// environment.
pub fn is_configured(integration: &IntegrationRow) -> bool {
    integration
        .config_schema
        .iter()
        .filter(|k| k.required)
        .all(|k| std::env::var(&k.key).map(|v| !v.is_empty()).unwrap_or(false))
}

fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        "***".to_string()
    } else {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}***{tail}")
    }
}

/// Upsert `KEY=VALUE` lines into the env file, preserving every unrelated
/// line already present.
fn upsert_env_lines(path: &Path, pairs: &[(String, String)]) -> std::io::Result<()> {
    let existing = std::fs::read_to_string(path).unwrap_or_default();

    let mut remaining: HashMap<&str, &str> = pairs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let mut lines: Vec<String> = Vec::new();
    for line in existing.lines() {
        let key = line
            .split_once('=')
            .map(|(k, _)| k.trim())
            .filter(|_| !line.trim_start().starts_with('#'));
        match key.and_then(|k| remaining.remove_entry(k)) {
            Some((key, value)) => lines.push(format!("{key}={value}")),
            None => lines.push(line.to_string()),
        }
    }

    // Keys not previously present are appended in declared order.
    for (key, value) in pairs {
        if remaining.remove(key.as_str()).is_some() {
            lines.push(format!("{key}={value}"));
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    std::fs::write(path, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_store::model::ConfigKey;

    fn integration(keys: &[(&str, bool)]) -> IntegrationRow {
        IntegrationRow {
            id: "i1".into(),
            name: "demo".into(),
            description: String::new(),
            config_schema: keys
                .iter()
                .map(|(key, required)| ConfigKey {
                    key: key.to_string(),
                    label: key.to_string(),
                    required: *required,
                })
                .collect(),
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn mask_rules() {
        assert_eq!(mask_value("short"), "***");
        assert_eq!(mask_value("12345678"), "***");
        assert_eq!(mask_value("sk-abcdefgh-xyz"), "sk-***xyz");
    }

    #[test]
    fn masked_values_reports_null_for_unset() {
        let integration = integration(&[("ENVOY_TEST_UNSET_KEY_73", true)]);
        let masked = masked_values(&integration);
        assert!(masked["ENVOY_TEST_UNSET_KEY_73"].is_null());
    }

    #[test]
    fn configured_requires_every_required_key() {
        std::env::set_var("ENVOY_TEST_CFG_A", "value-aaaa");
        std::env::remove_var("ENVOY_TEST_CFG_B");

        let needs_both = integration(&[("ENVOY_TEST_CFG_A", true), ("ENVOY_TEST_CFG_B", true)]);
        assert!(!is_configured(&needs_both));

        let optional_b = integration(&[("ENVOY_TEST_CFG_A", true), ("ENVOY_TEST_CFG_B", false)]);
        assert!(is_configured(&optional_b));
    }

    #[test]
    fn upsert_preserves_unrelated_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nOTHER=keep\nDEMO_TOKEN=old\n").unwrap();

        upsert_env_lines(
            &path,
            &[
                ("DEMO_TOKEN".to_string(), "new".to_string()),
                ("FRESH_KEY".to_string(), "added".to_string()),
            ],
        )
        .unwrap();

        let result = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines, vec!["# comment", "OTHER=keep", "DEMO_TOKEN=new", "FRESH_KEY=added"]);
    }

    #[test]
    fn upsert_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        upsert_env_lines(&path, &[("A".to_string(), "1".to_string())]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=1\n");
    }

    #[test]
    fn load_env_file_does_not_override_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ENVOY_TEST_LOAD_X=from_file\nENVOY_TEST_LOAD_Y=from_file\n")
            .unwrap();

        std::env::set_var("ENVOY_TEST_LOAD_X", "from_process");
        std::env::remove_var("ENVOY_TEST_LOAD_Y");
        load_env_file(&path);

        assert_eq!(std::env::var("ENVOY_TEST_LOAD_X").unwrap(), "from_process");
        assert_eq!(std::env::var("ENVOY_TEST_LOAD_Y").unwrap(), "from_file");
    }
}
