//! Template-variable resolution with auto-injection marking.
//!
//! Resolution is two-phase: `resolve` marks auto-injectable variables with a
//! human-readable placeholder so the editor can show what *will* be filled,
//! and `strip` removes those marks before dispatch so the backend performs
//! its own context lookup instead of receiving a placeholder literally.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::Agent;

/// Where a resolved value came from. Only `AutoInject` is a placeholder;
/// sample values behave as concrete values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    /// Explicit user-supplied value.
    Explicit,
    /// Pre-defined sample value.
    Sample,
    /// Pending auto-injection; the backend fills it from the context key.
    AutoInject,
}

/// One resolved variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub value: String,
    pub source: BindingSource,
}

impl Binding {
    pub fn explicit(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: BindingSource::Explicit,
        }
    }

    pub fn sample(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: BindingSource::Sample,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == BindingSource::AutoInject
    }
}

/// Ordered map of variable name to resolved binding.
pub type VariableMap = BTreeMap<String, Binding>;

/// Caller-provided resolution context.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Explicit user-supplied overrides; highest precedence.
    pub overrides: HashMap<String, String>,
    /// Context key the backend resolves auto-injected variables against,
    /// e.g. an ISO country code.
    pub context_key: Option<String>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }
}

/// Resolve every declared variable of an agent.
///
/// Precedence per variable: explicit override, then the sample table, then
/// an auto-injection placeholder for recognized key patterns, then an empty
/// explicit string.
pub fn resolve(agent: &Agent, ctx: &ResolveContext) -> VariableMap {
    let mut map = VariableMap::new();
    for name in &agent.template_variables {
        let binding = if let Some(value) = ctx.overrides.get(name) {
            Binding::explicit(value.clone())
        } else if let Some(value) = sample_value(name) {
            Binding::sample(value)
        } else if is_auto_injectable(name) {
            Binding {
                value: placeholder_for(name, ctx.context_key.as_deref()),
                source: BindingSource::AutoInject,
            }
        } else {
            Binding::explicit("")
        };
        map.insert(name.clone(), binding);
    }
    debug!(
        agent = %agent.name,
        variables = map.len(),
        pending = map.values().filter(|b| b.is_placeholder()).count(),
        "Variables resolved"
    );
    map
}

/// Remove every placeholder-marked binding before dispatch.
pub fn strip(map: &VariableMap) -> VariableMap {
    map.iter()
        .filter(|(_, b)| !b.is_placeholder())
        .map(|(k, b)| (k.clone(), b.clone()))
        .collect()
}

/// The plain `name -> value` payload actually sent to the backend.
pub fn payload(map: &VariableMap) -> BTreeMap<String, String> {
    strip(map)
        .into_iter()
        .map(|(k, b)| (k, b.value))
        .collect()
}

/// Variable names the backend can fill from a context lookup.
pub fn is_auto_injectable(name: &str) -> bool {
    name == "OHI_SCORE"
        || name.ends_with("_DATA")
        || name.ends_with("_CONTEXT")
        || name.ends_with("_SCORES")
}

fn placeholder_for(name: &str, context_key: Option<&str>) -> String {
    match context_key {
        Some(key) => format!("(auto-injected for {} from '{}')", name, key),
        None => format!("(auto-injected for {})", name),
    }
}

/// Static sample values for common report variables.
fn sample_value(name: &str) -> Option<&'static str> {
    match name {
        "COUNTRY" => Some("Finland"),
        "COUNTRY_ISO" => Some("FIN"),
        "TOPIC" => Some("Cardiovascular health"),
        "TIMEFRAME" => Some("2015-2025"),
        "LANGUAGE" => Some("en"),
        "REPORT_SECTION" => Some("Executive summary"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalgraph_core::types::AgentCategory;

    fn agent_with(vars: &[&str]) -> Agent {
        Agent::new("Test", AgentCategory::Analysis)
            .with_variables(vars.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_explicit_beats_auto_injection() {
        let agent = agent_with(&["METRICS_DATA"]);
        let ctx = ResolveContext::new().with_override("METRICS_DATA", "raw csv");

        let map = resolve(&agent, &ctx);
        let binding = &map["METRICS_DATA"];
        assert_eq!(binding.source, BindingSource::Explicit);
        assert_eq!(binding.value, "raw csv");
    }

    #[test]
    fn test_explicit_beats_sample() {
        let agent = agent_with(&["COUNTRY"]);
        let ctx = ResolveContext::new().with_override("COUNTRY", "Norway");

        let map = resolve(&agent, &ctx);
        assert_eq!(map["COUNTRY"].value, "Norway");
        assert_eq!(map["COUNTRY"].source, BindingSource::Explicit);
    }

    #[test]
    fn test_sample_table_consulted() {
        let agent = agent_with(&["COUNTRY", "TOPIC"]);
        let map = resolve(&agent, &ResolveContext::new());
        assert_eq!(map["COUNTRY"].source, BindingSource::Sample);
        assert_eq!(map["COUNTRY"].value, "Finland");
    }

    #[test]
    fn test_auto_injectable_patterns() {
        assert!(is_auto_injectable("OHI_SCORE"));
        assert!(is_auto_injectable("METRICS_DATA"));
        assert!(is_auto_injectable("POPULATION_CONTEXT"));
        assert!(is_auto_injectable("WELLBEING_SCORES"));
        assert!(!is_auto_injectable("COUNTRY"));
        assert!(!is_auto_injectable("SCORE"));
    }

    #[test]
    fn test_unknown_variable_resolves_empty_explicit() {
        let agent = agent_with(&["CUSTOM_NOTE"]);
        let map = resolve(&agent, &ResolveContext::new());
        assert_eq!(map["CUSTOM_NOTE"].value, "");
        assert_eq!(map["CUSTOM_NOTE"].source, BindingSource::Explicit);
    }

    #[test]
    fn test_strip_removes_placeholders_only() {
        let agent = agent_with(&["METRICS_DATA", "COUNTRY", "OHI_SCORE"]);
        let ctx = ResolveContext::new().with_context_key("FIN");
        let map = resolve(&agent, &ctx);
        assert!(map["METRICS_DATA"].is_placeholder());
        assert!(map["OHI_SCORE"].is_placeholder());

        let stripped = strip(&map);
        assert!(!stripped.contains_key("METRICS_DATA"));
        assert!(!stripped.contains_key("OHI_SCORE"));
        assert!(stripped.contains_key("COUNTRY"));
    }

    #[test]
    fn test_payload_omits_pending_variables() {
        let agent = agent_with(&["METRICS_DATA", "COUNTRY"]);
        let map = resolve(&agent, &ResolveContext::new().with_context_key("FIN"));

        let payload = payload(&map);
        // The backend auto-fills METRICS_DATA from the context key; the
        // placeholder string must never reach the wire.
        assert!(!payload.contains_key("METRICS_DATA"));
        assert_eq!(payload["COUNTRY"], "Finland");
    }

    #[test]
    fn test_placeholder_mentions_context_key() {
        let agent = agent_with(&["REGIONAL_SCORES"]);
        let map = resolve(&agent, &ResolveContext::new().with_context_key("SWE"));
        assert!(map["REGIONAL_SCORES"].value.contains("SWE"));
    }
}
