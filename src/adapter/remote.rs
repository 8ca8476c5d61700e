use crate::adapter::external::CredentialProvider;
use crate::envelope::Envelope;
use crate::errors::{RegistryError, Result};
use crate::tool::{ActionDescriptor, HealthRecord, InvocationContext, Tool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct HandshakeRequest<'a> {
    client: &'a str,
    version: &'a str,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    compatible: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemoteActionSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub optional_parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteMetadata {
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub actions: Vec<RemoteActionSchema>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteToolListing {
    pub name: String,
    pub version: String,
}

/// Thin JSON-over-HTTP client speaking the registry-to-registry wire
/// protocol: handshake, metadata fetch, listing, dispatch, ping.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RegistryError::Internal(anyhow::anyhow!(e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn handshake(&self) -> Result<()> {
        let body = HandshakeRequest {
            client: "tcrif",
            version: env!("CARGO_PKG_VERSION"),
        };
        let resp = tokio::time::timeout(
            DEFAULT_ACTION_TIMEOUT,
            self.client
                .post(self.url("/registry/handshake"))
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| RegistryError::transport("deadline exceeded"))?
        .map_err(|e| RegistryError::transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RegistryError::upstream(format!(
                "handshake rejected with status {}",
                resp.status()
            )));
        }
        let parsed: HandshakeResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::transport(format!("malformed handshake response: {e}")))?;
        if !parsed.compatible {
            return Err(RegistryError::upstream("remote reports incompatible protocol version"));
        }
        Ok(())
    }

    pub async fn fetch_metadata(&self, name: &str) -> Result<RemoteMetadata> {
        let resp = tokio::time::timeout(
            DEFAULT_ACTION_TIMEOUT,
            self.client.get(self.url(&format!("/registry/tool/{name}"))).send(),
        )
        .await
        .map_err(|_| RegistryError::transport("deadline exceeded"))?
        .map_err(|e| RegistryError::transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RegistryError::upstream(format!(
                "metadata fetch failed with status {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| RegistryError::transport(format!("malformed metadata response: {e}")))
    }

    pub async fn list(&self, origin: &str) -> Result<Vec<RemoteToolListing>> {
        let resp = tokio::time::timeout(
            DEFAULT_ACTION_TIMEOUT,
            self.client
                .get(self.url(&format!("/registry/tools?origin={origin}")))
                .send(),
        )
        .await
        .map_err(|_| RegistryError::transport("deadline exceeded"))?
        .map_err(|e| RegistryError::transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RegistryError::upstream(format!(
                "list failed with status {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| RegistryError::transport(format!("malformed list response: {e}")))
    }

    pub async fn dispatch(
        &self,
        tool_id: &str,
        action: &str,
        params: Value,
        auth_header: Option<(String, String)>,
    ) -> Result<Envelope> {
        let mut req = self
            .client
            .post(self.url(&format!("/registry/call/{tool_id}/{action}")))
            .json(&serde_json::json!({ "params": params }));
        if let Some((header, value)) = auth_header {
            req = req.header(header, value);
        }
        let resp = tokio::time::timeout(DEFAULT_ACTION_TIMEOUT, req.send())
            .await
            .map_err(|_| RegistryError::transport("deadline exceeded"))?
            .map_err(|e| RegistryError::transport(e.to_string()))?;

        // The remote is trusted to conform to the envelope shape; the proxy
        // passes the body through verbatim rather than re-deriving status.
        resp.json::<Envelope>()
            .await
            .map_err(|e| RegistryError::transport(format!("malformed envelope from remote: {e}")))
    }

    pub async fn ping(&self, tool_id: &str) -> Result<bool> {
        let resp = tokio::time::timeout(
            HEALTH_PROBE_TIMEOUT,
            self.client
                .get(self.url(&format!("/registry/tool/{tool_id}/health")))
                .send(),
        )
        .await
        .map_err(|_| RegistryError::transport("deadline exceeded"))?
        .map_err(|e| RegistryError::transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}

/// A local stand-in for a tool hosted on another registry instance. All
/// remote calls resolve `auth_reference` to a credential header just-in-time;
/// the credential itself is never stored on the proxy.
pub struct RemoteProxyTool {
    name: String,
    version: String,
    description: String,
    capabilities: Vec<String>,
    tags: Vec<String>,
    actions: Vec<ActionDescriptor>,
    client: RemoteClient,
    auth_reference: Option<String>,
    credentials: Arc<dyn CredentialProvider>,
}

impl RemoteProxyTool {
    pub async fn register(
        name: impl Into<String>,
        version: impl Into<String>,
        remote_url: impl Into<String>,
        auth_reference: Option<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let name = name.into();
        let client = RemoteClient::new(remote_url)?;
        client.handshake().await?;
        let metadata = client.fetch_metadata(&name).await?;
        let actions = metadata
            .actions
            .iter()
            .map(|a| {
                ActionDescriptor::new(a.name.clone(), a.description.clone())
                    .requires(&a.required_parameters.iter().map(String::as_str).collect::<Vec<_>>())
                    .optional(&a.optional_parameters.iter().map(String::as_str).collect::<Vec<_>>())
            })
            .collect();
        Ok(Self {
            name,
            version: version.into(),
            description: metadata.description,
            capabilities: metadata.capabilities,
            tags: metadata.tags,
            actions,
            client,
            auth_reference,
            credentials,
        })
    }

    async fn auth_header(&self) -> Result<Option<(String, String)>> {
        match &self.auth_reference {
            Some(reference) => self.credentials.resolve(reference).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn tool_id_on_remote(&self) -> String {
        crate::metadata::tool_id(crate::metadata::ToolOrigin::Remote, &self.name, &self.version)
    }
}

#[async_trait]
impl Tool for RemoteProxyTool {
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
        if !self.actions.iter().any(|a| a.name == action_name) {
            return Err(RegistryError::not_found(format!("unknown action: {action_name}")));
        }
        let auth = self.auth_header().await?;
        self.client
            .dispatch(&self.tool_id_on_remote(), action_name, parameters, auth)
            .await
    }

    async fn health_check(&self) -> Option<HealthRecord> {
        let now = chrono::Utc::now().timestamp_millis();
        match self.client.ping(&self.tool_id_on_remote()).await {
            Ok(true) => Some(HealthRecord::healthy(now)),
            Ok(false) => Some(HealthRecord::unhealthy(now, "ping returned non-success")),
            Err(e) => Some(HealthRecord::error(now, e.message())),
        }
    }
}
