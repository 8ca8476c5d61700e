use crate::envelope::Envelope;
use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Context passed to every action invocation. Carries an opaque caller
/// identity and an arbitrary metadata bag; the registry never interprets
/// either beyond passing them through.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub user_id: String,
    pub metadata: HashMap<String, Value>,
}

impl InvocationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            metadata: HashMap::new(),
        }
    }
}

/// One action a tool exposes.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub required_parameters: Vec<String>,
    pub optional_parameters: Vec<String>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_parameters: Vec::new(),
            optional_parameters: Vec::new(),
        }
    }

    pub fn requires(mut self, params: &[&str]) -> Self {
        self.required_parameters = params.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn optional(mut self, params: &[&str]) -> Self {
        self.optional_parameters = params.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Structural check only: the registry never validates parameter types,
    /// only that every declared required key is present.
    pub fn check_required_present(&self, params: &Value) -> std::result::Result<(), String> {
        let obj = params.as_object();
        for key in &self.required_parameters {
            let present = obj.map(|o| o.contains_key(key)).unwrap_or(false);
            if !present {
                return Err(format!("missing required parameter: {key}"));
            }
        }
        Ok(())
    }
}

/// A non-local tool's health snapshot. Never persisted (spec invariant 6 —
/// health records only exist for EXTERNAL/REMOTE tools, and only in memory).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Error,
    Unknown,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: i64,
}

impl HealthRecord {
    pub fn healthy(timestamp: i64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            timestamp,
        }
    }

    pub fn unhealthy(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            timestamp,
        }
    }

    pub fn error(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: Some(message.into()),
            timestamp,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}

/// Every tool satisfies this contract, regardless of origin. Local tools
/// implement it directly; external/remote tools are wrapped in a synthetic
/// implementation by the adapter layer (C5/C6) so that C4's dispatch path
/// never needs to branch on origin beyond picking which `Tool` to call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str {
        "general"
    }
    fn capabilities(&self) -> &[String];
    fn tags(&self) -> &[String] {
        &[]
    }
    fn actions(&self) -> &[ActionDescriptor];

    async fn execute(
        &self,
        action_name: &str,
        parameters: Value,
        context: &InvocationContext,
    ) -> Result<Envelope>;

    /// Idempotent lifecycle hook; called before the tool is made visible to
    /// dispatch. Default is a no-op for tools with no setup to perform.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Idempotent lifecycle hook; called exactly once on deregistration.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Optional self-reported health probe. When absent, the health monitor
    /// falls back to a ping through the owning adapter.
    async fn health_check(&self) -> Option<HealthRecord> {
        None
    }
}
