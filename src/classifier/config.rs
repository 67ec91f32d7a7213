//! Workflow configuration loading and validation.
//!
//! Reads `tabmind.yaml` and resolves environment variables, so the API key
//! never has to live in the file itself:
//!
//! ```yaml
//! endpoint: "https://api.example.com/v1/workflow/run"
//! chat_endpoint: "https://api.example.com/v1/workflow/stream_run"
//! workflow_id: "7388"
//! api_key: "${TABMIND_API_KEY}"
//! request_timeout_secs: 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::errors::ClassifierError;

/// Config file name searched for on disk.
pub const CONFIG_FILE_NAME: &str = "tabmind.yaml";

/// Env var holding an explicit config file path.
pub const CONFIG_ENV_VAR: &str = "TABMIND_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Classification workflow endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// URL that runs a workflow and returns its JSON result.
    pub endpoint: String,
    /// URL that runs a workflow as an SSE stream. Defaults to `endpoint`.
    #[serde(default)]
    pub chat_endpoint: Option<String>,
    /// Workflow that classifies tabs.
    pub workflow_id: String,
    /// Workflow used for chat. Defaults to `workflow_id`.
    #[serde(default)]
    pub chat_workflow_id: Option<String>,
    /// Bearer token. Empty values are treated as absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_stream_timeout_secs() -> u64 {
    180
}

impl WorkflowConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn chat_endpoint(&self) -> &str {
        self.chat_endpoint.as_deref().unwrap_or(&self.endpoint)
    }

    pub fn chat_workflow_id(&self) -> &str {
        self.chat_workflow_id.as_deref().unwrap_or(&self.workflow_id)
    }

    /// The API key, if one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Reject configs that cannot possibly work.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClassifierError::ConfigError {
                reason: "endpoint must not be empty".into(),
            });
        }
        if self.workflow_id.trim().is_empty() {
            return Err(ClassifierError::ConfigError {
                reason: "workflow_id must not be empty".into(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ClassifierError::ConfigError {
                reason: "request_timeout_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Resolution order: `TABMIND_CONFIG`, then `tabmind.yaml` in `start` or any
/// ancestor, then the app data directory.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ClassifierError> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "TABMIND_CONFIG points to a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    // 3. App data directory
    let candidate = crate::data_dir().join(CONFIG_FILE_NAME);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(ClassifierError::ConfigError {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load, interpolate, parse and validate the config file.
pub fn load_workflow_config(path: &Path) -> Result<WorkflowConfig, ClassifierError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ClassifierError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    let config = parse_workflow_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        endpoint = %config.endpoint,
        workflow_id = %config.workflow_id,
        has_api_key = config.api_key().is_some(),
        "loaded workflow config"
    );
    Ok(config)
}

/// Parse config text, performing `${VAR}` / `${VAR:-default}` interpolation.
pub fn parse_workflow_config(raw: &str) -> Result<WorkflowConfig, ClassifierError> {
    let interpolated = interpolate_env_vars(raw);
    let config: WorkflowConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ClassifierError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__TABMIND_TEST_MISSING__");
        let result = interpolate_env_vars("${__TABMIND_TEST_MISSING__:-fallback}");
        assert_eq!(result, "fallback");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__TABMIND_TEST_KEY__", "sk-123");
        let result = interpolate_env_vars("key: ${__TABMIND_TEST_KEY__:-none}");
        assert_eq!(result, "key: sk-123");
        std::env::remove_var("__TABMIND_TEST_KEY__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with $ but no braces";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
            endpoint: "http://localhost:9000/run"
            workflow_id: "wf-1"
        "#;
        let config = parse_workflow_config(yaml).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.stream_timeout_secs, 180);
        assert_eq!(config.chat_endpoint(), "http://localhost:9000/run");
        assert_eq!(config.chat_workflow_id(), "wf-1");
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_empty_api_key_is_absent() {
        std::env::remove_var("__TABMIND_TEST_UNSET_KEY__");
        let yaml = r#"
            endpoint: "http://localhost:9000/run"
            workflow_id: "wf-1"
            api_key: "${__TABMIND_TEST_UNSET_KEY__}"
        "#;
        let config = parse_workflow_config(yaml).unwrap();
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_validation_rejects_empty_workflow() {
        let yaml = r#"
            endpoint: "http://localhost:9000/run"
            workflow_id: ""
        "#;
        assert!(matches!(
            parse_workflow_config(yaml),
            Err(ClassifierError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_find_config_walks_upward() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "endpoint: http://x\nworkflow_id: w\n",
        )
        .unwrap();

        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
        assert!(load_workflow_config(&found).is_ok());
    }
}
