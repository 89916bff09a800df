use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VitalError};

/// Top-level Vitalgraph editor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum undo depth; exceeding it silently evicts the oldest command.
    #[serde(default = "default_history_depth")]
    pub depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: default_history_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_zoom_min")]
    pub zoom_min: f64,
    #[serde(default = "default_zoom_max")]
    pub zoom_max: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            zoom_min: default_zoom_min(),
            zoom_max: default_zoom_max(),
        }
    }
}

impl ViewportConfig {
    /// Clamp a requested zoom level into the configured range.
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.zoom_min, self.zoom_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Mark a run `error("timeout")` if no terminal signal arrives within
    /// this many seconds. 0 disables the timeout.
    #[serde(default = "default_run_timeout")]
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_run_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the execution backend REST service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Optional bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
        }
    }
}

fn default_history_depth() -> usize {
    100
}

fn default_zoom_min() -> f64 {
    0.25
}

fn default_zoom_max() -> f64 {
    2.5
}

fn default_run_timeout() -> u64 {
    300
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl EditorConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VitalError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| VitalError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.history.depth, 100);
        assert_eq!(config.viewport.zoom_min, 0.25);
        assert_eq!(config.viewport.zoom_max, 2.5);
        assert_eq!(config.run.timeout_secs, 300);
    }

    #[test]
    fn test_clamp_zoom() {
        let vp = ViewportConfig::default();
        assert_eq!(vp.clamp_zoom(1.0), 1.0);
        assert_eq!(vp.clamp_zoom(0.01), 0.25);
        assert_eq!(vp.clamp_zoom(99.0), 2.5);
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_VITALGRAPH_VAR", "expanded");
        let result = expand_env_vars("key = \"${TEST_VITALGRAPH_VAR}\"");
        assert_eq!(result, "key = \"expanded\"");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_VITALGRAPH_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_VITALGRAPH_VAR}\"");
    }
}
