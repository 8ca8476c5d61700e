use crate::envelope::Envelope;
use crate::errors::{RegistryError, Result};
use crate::tool::{ActionDescriptor, HealthRecord, InvocationContext, Tool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Where a parameter is placed in the outbound HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamPlacement {
    Path,
    Query,
    Body,
    Form,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRecipe {
    pub name: String,
    pub placement: ParamPlacement,
}

/// One action's HTTP recipe: verb, path template with `{parameter}` slots,
/// where each declared parameter goes, a timeout, and a response projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecipe {
    pub name: String,
    pub description: Option<String>,
    pub method: String,
    pub path_template: String,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub optional_parameters: Vec<String>,
    #[serde(default)]
    pub param_placement: Vec<ParamRecipe>,
    /// JSON pointer into the upstream response body; `None` means identity
    /// (return the body verbatim).
    #[serde(default)]
    pub response_pointer: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Declarative REST/GraphQL config an external tool is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub base_url: String,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    #[serde(default)]
    pub auth_reference: Option<String>,
    pub actions: Vec<ActionRecipe>,
    #[serde(default)]
    pub health_path: Option<String>,
}

/// Resolves an `auth_reference` to an actual credential header at call time.
/// The registry never holds credentials; this seam is external per spec
/// DESIGN NOTES (implicit credential access is explicitly re-architected).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, auth_reference: &str) -> Result<(String, String)>;
}

/// A `CredentialProvider` that never has anything to resolve — used when no
/// credential backend is configured. Callers relying on an `auth_reference`
/// that this provider can't resolve get `unauthorized`, not a panic.
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn resolve(&self, auth_reference: &str) -> Result<(String, String)> {
        Err(RegistryError::Unauthorized(format!(
            "no credential provider configured for auth_reference: {auth_reference}"
        )))
    }
}

const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A synthetic tool wrapping a declarative external-service config.
pub struct ExternalTool {
    name: String,
    version: String,
    description: String,
    capabilities: Vec<String>,
    tags: Vec<String>,
    config: ExternalConfig,
    actions: Vec<ActionDescriptor>,
    client: reqwest::Client,
    credentials: std::sync::Arc<dyn CredentialProvider>,
}

impl ExternalTool {
    pub fn build(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        capabilities: Vec<String>,
        tags: Vec<String>,
        config: ExternalConfig,
        credentials: std::sync::Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(RegistryError::validation("external config missing base_url"));
        }
        let actions = config
            .actions
            .iter()
            .map(|a| {
                ActionDescriptor::new(a.name.clone(), a.description.clone().unwrap_or_default())
                    .requires(
                        &a.required_parameters
                            .iter()
                            .map(String::as_str)
                            .collect::<Vec<_>>(),
                    )
                    .optional(
                        &a.optional_parameters
                            .iter()
                            .map(String::as_str)
                            .collect::<Vec<_>>(),
                    )
            })
            .collect();
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RegistryError::Internal(anyhow::anyhow!(e)))?;
        Ok(Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            capabilities,
            tags,
            config,
            actions,
            client,
            credentials,
        })
    }

    fn find_recipe(&self, action_name: &str) -> Option<&ActionRecipe> {
        self.config.actions.iter().find(|a| a.name == action_name)
    }

    async fn auth_header(&self) -> Result<Option<(String, String)>> {
        match &self.config.auth_reference {
            Some(reference) => self.credentials.resolve(reference).await.map(Some),
            None => Ok(None),
        }
    }

    async fn run_recipe(&self, recipe: &ActionRecipe, parameters: &Value) -> Result<Envelope> {
        let declared: std::collections::HashSet<&str> = recipe
            .required_parameters
            .iter()
            .chain(recipe.optional_parameters.iter())
            .map(String::as_str)
            .collect();
        if let Some(obj) = parameters.as_object() {
            for key in obj.keys() {
                if !declared.contains(key.as_str()) {
                    return Err(RegistryError::validation(format!(
                        "unknown parameter: {key}"
                    )));
                }
            }
        }

        let mut path = recipe.path_template.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut body = serde_json::Map::new();
        let mut form: Vec<(String, String)> = Vec::new();

        for placement in &recipe.param_placement {
            let Some(value) = parameters.get(&placement.name) else {
                continue;
            };
            let as_str = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match placement.placement {
                ParamPlacement::Path => {
                    path = path.replace(&format!("{{{}}}", placement.name), &as_str);
                }
                ParamPlacement::Query => query.push((placement.name.clone(), as_str)),
                ParamPlacement::Body => {
                    body.insert(placement.name.clone(), value.clone());
                }
                ParamPlacement::Form => form.push((placement.name.clone(), as_str)),
            }
        }

        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let method = reqwest::Method::from_bytes(recipe.method.to_uppercase().as_bytes())
            .map_err(|_| RegistryError::validation(format!("invalid HTTP method: {}", recipe.method)))?;

        let mut req = self.client.request(method, &url).query(&query);
        for (k, v) in &self.config.default_headers {
            req = req.header(k, v);
        }
        if let Some((header, value)) = self.auth_header().await? {
            req = req.header(header, value);
        }
        if !body.is_empty() {
            req = req.json(&Value::Object(body));
        } else if !form.is_empty() {
            req = req.form(&form);
        }

        let timeout = recipe
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);

        let response = tokio::time::timeout(timeout, req.send())
            .await
            .map_err(|_| RegistryError::transport("deadline exceeded"))?
            .map_err(|e| RegistryError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| RegistryError::transport(format!("malformed upstream response: {e}")))?;
            let projected = match &recipe.response_pointer {
                Some(pointer) => body.pointer(pointer).cloned().unwrap_or(Value::Null),
                None => body,
            };
            Ok(Envelope::ok(projected))
        } else {
            let snippet = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(256)
                .collect::<String>();
            Err(RegistryError::upstream(format!(
                "upstream returned {status}: {snippet}"
            )))
        }
    }
}

#[async_trait]
impl Tool for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn version(&self) -> &str {
        &self.version
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
    fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    async fn execute(
        &self,
        action_name: &str,
        parameters: Value,
        _context: &InvocationContext,
    ) -> Result<Envelope> {
        let recipe = self
            .find_recipe(action_name)
            .ok_or_else(|| RegistryError::not_found(format!("unknown action: {action_name}")))?;
        match self.run_recipe(recipe, &parameters).await {
            Ok(env) => Ok(env),
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Option<HealthRecord> {
        let path = self.config.health_path.as_ref()?;
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'));
        let now = chrono::Utc::now().timestamp_millis();
        match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, self.client.get(&url).send()).await {
            Ok(Ok(resp)) if resp.status().is_success() => Some(HealthRecord::healthy(now)),
            Ok(Ok(resp)) => Some(HealthRecord::unhealthy(now, format!("status {}", resp.status()))),
            Ok(Err(e)) => Some(HealthRecord::error(now, e.to_string())),
            Err(_) => Some(HealthRecord::unhealthy(now, "health probe timed out")),
        }
    }
}
