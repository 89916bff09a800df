//! Canonical agent records and the in-memory registry.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vitalgraph_core::error::{Result, VitalError};
use vitalgraph_core::types::{AgentCategory, AgentId};

/// A reusable prompt template plus metadata, instantiated as workflow nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AgentCategory,
    /// Presentation only.
    #[serde(default)]
    pub icon: String,
    /// Presentation only.
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub system_prompt: String,
    /// May contain `{VARIABLE}` placeholders.
    #[serde(default)]
    pub user_prompt_template: String,
    /// Declared variables, in template order.
    #[serde(default)]
    pub template_variables: Vec<String>,
    /// Optional per-agent model routing override.
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    /// Inactive agents are excluded from execution.
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// Telemetry, append-only.
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

fn default_is_active() -> bool {
    true
}

impl Agent {
    /// Create a new agent with minimal configuration.
    pub fn new(name: impl Into<String>, category: AgentCategory) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            description: String::new(),
            category,
            icon: String::new(),
            color: String::new(),
            system_prompt: String::new(),
            user_prompt_template: String::new(),
            template_variables: Vec::new(),
            llm_provider: None,
            llm_model: None,
            is_active: true,
            execution_count: 0,
            last_run_at: None,
        }
    }

    /// Set the prompt templates.
    pub fn with_prompts(
        mut self,
        system: impl Into<String>,
        user_template: impl Into<String>,
    ) -> Self {
        self.system_prompt = system.into();
        self.user_prompt_template = user_template.into();
        self
    }

    /// Set the declared template variables.
    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.template_variables = variables;
        self
    }

    /// Set a per-agent model override.
    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self.llm_model = Some(model.into());
        self
    }

    /// Validate the record: non-empty name, no duplicate declared variables.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VitalError::Validation("agent name is empty".into()));
        }
        let mut seen = HashSet::new();
        for var in &self.template_variables {
            if !seen.insert(var.as_str()) {
                return Err(VitalError::Validation(format!(
                    "duplicate template variable '{}'",
                    var
                )));
            }
        }
        Ok(())
    }

    /// Variables referenced as `{NAME}` in either prompt but not declared.
    ///
    /// These are warnings, not failures: templates may intentionally omit
    /// optional variables.
    pub fn template_warnings(&self) -> Vec<String> {
        let declared: HashSet<&str> = self.template_variables.iter().map(|s| s.as_str()).collect();
        let mut undeclared = Vec::new();
        for prompt in [&self.system_prompt, &self.user_prompt_template] {
            for name in referenced_variables(prompt) {
                if !declared.contains(name.as_str()) && !undeclared.contains(&name) {
                    undeclared.push(name);
                }
            }
        }
        undeclared
    }
}

/// Scan a template for `{NAME}` placeholders.
fn referenced_variables(template: &str) -> Vec<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").expect("valid regex"));
    re.captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Partial update applied to an existing agent. `None` fields are untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<AgentCategory>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub system_prompt: Option<String>,
    pub user_prompt_template: Option<String>,
    pub template_variables: Option<Vec<String>>,
    pub llm_provider: Option<Option<String>>,
    pub llm_model: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// In-memory registry of agent records.
pub struct AgentRegistry {
    agents: HashMap<AgentId, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register a validated agent.
    pub fn create(&mut self, agent: Agent) -> Result<&Agent> {
        agent.validate()?;
        if self.agents.contains_key(&agent.id) {
            return Err(VitalError::Validation(format!(
                "agent id '{}' already registered",
                agent.id
            )));
        }
        let warnings = agent.template_warnings();
        if !warnings.is_empty() {
            warn!(agent = %agent.name, undeclared = ?warnings, "Template references undeclared variables");
        }
        debug!(agent_id = %agent.id, name = %agent.name, "Agent registered");
        let id = agent.id.clone();
        self.agents.insert(id.clone(), agent);
        Ok(&self.agents[&id])
    }

    /// Apply a partial update. The patched record is re-validated; an invalid
    /// patch leaves the stored agent unchanged.
    pub fn update(&mut self, id: &AgentId, patch: AgentPatch) -> Result<&Agent> {
        let current = self
            .agents
            .get(id)
            .ok_or_else(|| VitalError::NotFound(format!("agent '{}'", id)))?;

        let mut updated = current.clone();
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(icon) = patch.icon {
            updated.icon = icon;
        }
        if let Some(color) = patch.color {
            updated.color = color;
        }
        if let Some(system_prompt) = patch.system_prompt {
            updated.system_prompt = system_prompt;
        }
        if let Some(user_prompt_template) = patch.user_prompt_template {
            updated.user_prompt_template = user_prompt_template;
        }
        if let Some(template_variables) = patch.template_variables {
            updated.template_variables = template_variables;
        }
        if let Some(llm_provider) = patch.llm_provider {
            updated.llm_provider = llm_provider;
        }
        if let Some(llm_model) = patch.llm_model {
            updated.llm_model = llm_model;
        }
        if let Some(is_active) = patch.is_active {
            updated.is_active = is_active;
        }

        updated.validate()?;
        self.agents.insert(id.clone(), updated);
        Ok(&self.agents[id])
    }

    /// Delete an agent unless the given predicate reports it as referenced
    /// by a live workflow node.
    pub fn delete(&mut self, id: &AgentId, referenced: impl Fn(&AgentId) -> bool) -> Result<Agent> {
        if !self.agents.contains_key(id) {
            return Err(VitalError::NotFound(format!("agent '{}'", id)));
        }
        if referenced(id) {
            return Err(VitalError::Conflict(format!(
                "agent '{}' is referenced by a workflow node",
                id
            )));
        }
        let agent = self
            .agents
            .remove(id)
            .ok_or_else(|| VitalError::NotFound(format!("agent '{}'", id)))?;
        debug!(agent_id = %id, "Agent deleted");
        Ok(agent)
    }

    /// Bump telemetry after a successful run or test.
    pub fn record_run(&mut self, id: &AgentId) -> Result<()> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| VitalError::NotFound(format!("agent '{}'", id)))?;
        agent.execution_count += 1;
        agent.last_run_at = Some(Utc::now());
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn list(&self) -> Vec<&Agent> {
        let mut agents: Vec<&Agent> = self.agents.values().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
