use crate::adapter::external::{CredentialProvider, ExternalConfig, ExternalTool};
use crate::adapter::remote::RemoteProxyTool;
use crate::envelope::Envelope;
use crate::errors::{RegistryError, Result};
use crate::metadata::{compare_versions, tool_id, ToolMetadata, ToolOrigin};
use crate::persistence::{self, Snapshot};
use crate::tool::{InvocationContext, Tool};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Default)]
struct Inner {
    metadata: HashMap<String, ToolMetadata>,
    backings: HashMap<String, Arc<dyn Tool>>,
    local_ids: IndexSet<String>,
    external_ids: IndexSet<String>,
    remote_ids: IndexSet<String>,
    name_index: HashMap<String, IndexSet<String>>,
    capability_index: HashMap<String, IndexSet<String>>,
    category_index: HashMap<String, IndexSet<String>>,
    tag_index: HashMap<String, IndexSet<String>>,
}

impl Inner {
    fn origin_set(&mut self, origin: ToolOrigin) -> &mut IndexSet<String> {
        match origin {
            ToolOrigin::Local => &mut self.local_ids,
            ToolOrigin::External => &mut self.external_ids,
            ToolOrigin::Remote => &mut self.remote_ids,
        }
    }

    fn index(&mut self, meta: &ToolMetadata) {
        self.origin_set(meta.origin).insert(meta.tool_id.clone());
        self.name_index
            .entry(meta.name.clone())
            .or_default()
            .insert(meta.tool_id.clone());
        self.category_index
            .entry(meta.category.clone())
            .or_default()
            .insert(meta.tool_id.clone());
        for cap in &meta.capabilities {
            self.capability_index
                .entry(cap.clone())
                .or_default()
                .insert(meta.tool_id.clone());
        }
        for tag in &meta.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(meta.tool_id.clone());
        }
    }

    fn deindex(&mut self, meta: &ToolMetadata) {
        self.origin_set(meta.origin).shift_remove(&meta.tool_id);
        if let Some(set) = self.name_index.get_mut(&meta.name) {
            set.shift_remove(&meta.tool_id);
        }
        if let Some(set) = self.category_index.get_mut(&meta.category) {
            set.shift_remove(&meta.tool_id);
        }
        for cap in &meta.capabilities {
            if let Some(set) = self.capability_index.get_mut(cap) {
                set.shift_remove(&meta.tool_id);
            }
        }
        for tag in &meta.tags {
            if let Some(set) = self.tag_index.get_mut(tag) {
                set.shift_remove(&meta.tool_id);
            }
        }
    }
}

/// Single source of truth over registered tools. The only component that
/// mutates registry state; all mutations serialize behind one lock so the
/// name/version uniqueness invariant and index derivation are never observed
/// mid-update.
pub struct Registry {
    inner: RwLock<Inner>,
    config_path: Option<PathBuf>,
    credentials: Arc<dyn CredentialProvider>,
}

/// How multiple query terms combine: `All` requires every term to match,
/// `Any` requires at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Registry {
    pub fn new(config_path: Option<PathBuf>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config_path,
            credentials,
        }
    }

    pub fn credentials(&self) -> Arc<dyn CredentialProvider> {
        self.credentials.clone()
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    async fn persist(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        let snapshot = self.snapshot().await;
        if let Err(e) = persistence::save_snapshot(path, &snapshot) {
            warn!("failed to persist registry configuration: {e}");
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().await;
        let collect = |ids: &IndexSet<String>| -> Vec<ToolMetadata> {
            ids.iter()
                .filter_map(|id| inner.metadata.get(id).cloned())
                .collect()
        };
        Snapshot {
            local_tools: collect(&inner.local_ids),
            external_tools: collect(&inner.external_ids),
            remote_tools: collect(&inner.remote_ids),
        }
    }

    /// Registers a tool whose implementation lives in-process. `tool.initialize()`
    /// is invoked before the tool becomes visible to dispatch; on failure the
    /// registration is rolled back entirely.
    pub async fn register_local(
        &self,
        tool: Arc<dyn Tool>,
        capabilities: std::collections::BTreeSet<String>,
        tags: std::collections::BTreeSet<String>,
    ) -> Result<Envelope> {
        let name = tool.name().to_string();
        let version = tool.version().to_string();
        let id = tool_id(ToolOrigin::Local, &name, &version);

        {
            let inner = self.inner.read().await;
            if inner.metadata.contains_key(&id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {id}"
                )));
            }
        }

        tool.initialize().await.map_err(|e| {
            RegistryError::Internal(anyhow::anyhow!("initialize failed for {id}: {}", e.message()))
        })?;

        let meta = ToolMetadata::new(
            name,
            version,
            ToolOrigin::Local,
            tool.description().to_string(),
            capabilities,
            tags,
            None,
            None,
            now_millis(),
        );

        {
            let mut inner = self.inner.write().await;
            if inner.metadata.contains_key(&meta.tool_id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {}",
                    meta.tool_id
                )));
            }
            inner.backings.insert(meta.tool_id.clone(), tool);
            inner.index(&meta);
            inner.metadata.insert(meta.tool_id.clone(), meta.clone());
        }
        self.persist().await;
        info!("registered local tool {}", meta.tool_id);
        Ok(Envelope::ok(serde_json::to_value(&meta).unwrap()))
    }

    /// Builds an external adapter tool (C5) from a declarative config and
    /// registers it.
    pub async fn register_external(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        config: ExternalConfig,
        capabilities: std::collections::BTreeSet<String>,
    ) -> Result<Envelope> {
        let name = name.into();
        let version = version.into();
        let id = tool_id(ToolOrigin::External, &name, &version);
        {
            let inner = self.inner.read().await;
            if inner.metadata.contains_key(&id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {id}"
                )));
            }
        }

        let auth_reference = config.auth_reference.clone();
        let endpoint = Some(config.base_url.clone());
        let description = format!("external tool backed by {}", config.base_url);
        let config_doc = config.clone();
        let tool = ExternalTool::build(
            name.clone(),
            version.clone(),
            description.clone(),
            capabilities.iter().cloned().collect(),
            vec![],
            config,
            self.credentials.clone(),
        )?;

        let meta = ToolMetadata::new(
            name,
            version,
            ToolOrigin::External,
            description,
            capabilities,
            std::collections::BTreeSet::new(),
            endpoint,
            auth_reference,
            now_millis(),
        );

        {
            let mut inner = self.inner.write().await;
            if inner.metadata.contains_key(&meta.tool_id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {}",
                    meta.tool_id
                )));
            }
            inner.backings.insert(meta.tool_id.clone(), Arc::new(tool));
            inner.index(&meta);
            inner.metadata.insert(meta.tool_id.clone(), meta.clone());
        }
        self.persist().await;
        if let Some(path) = &self.config_path
            && let Err(e) = persistence::save_external_config(path, &meta.name, &config_doc)
        {
            warn!("failed to persist per-tool config for {}: {e}", meta.name);
        }
        info!("registered external tool {}", meta.tool_id);
        Ok(Envelope::ok(serde_json::to_value(&meta).unwrap()))
    }

    /// Performs a handshake + metadata fetch against `remote_url` (C6) and
    /// registers the resulting proxy.
    pub async fn register_remote(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        remote_url: impl Into<String>,
        auth_reference: Option<String>,
    ) -> Result<Envelope> {
        let name = name.into();
        let version = version.into();
        let remote_url = remote_url.into();
        let id = tool_id(ToolOrigin::Remote, &name, &version);
        {
            let inner = self.inner.read().await;
            if inner.metadata.contains_key(&id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {id}"
                )));
            }
        }

        let proxy = RemoteProxyTool::register(
            name.clone(),
            version.clone(),
            remote_url.clone(),
            auth_reference.clone(),
            self.credentials.clone(),
        )
        .await?;

        let meta = ToolMetadata::new(
            name,
            version,
            ToolOrigin::Remote,
            proxy.description().to_string(),
            proxy.capabilities().iter().cloned().collect(),
            proxy.tags().iter().cloned().collect(),
            Some(remote_url),
            auth_reference,
            now_millis(),
        );

        {
            let mut inner = self.inner.write().await;
            if inner.metadata.contains_key(&meta.tool_id) {
                return Err(RegistryError::conflict(format!(
                    "tool already registered: {}",
                    meta.tool_id
                )));
            }
            inner.backings.insert(meta.tool_id.clone(), Arc::new(proxy));
            inner.index(&meta);
            inner.metadata.insert(meta.tool_id.clone(), meta.clone());
        }
        self.persist().await;
        info!("registered remote tool {}", meta.tool_id);
        Ok(Envelope::ok(serde_json::to_value(&meta).unwrap()))
    }

    /// Asks the remote for its local tool listing and registers each name
    /// not already present. Partial success is allowed — the envelope's
    /// `data.registered` reflects what actually succeeded. Repeated calls
    /// are idempotent: already-registered names are skipped silently, never
    /// re-added to `registered`.
    pub async fn sync_remote(
        &self,
        remote_url: impl Into<String>,
        auth_reference: Option<String>,
    ) -> Result<Envelope> {
        let remote_url = remote_url.into();
        let client = crate::adapter::remote::RemoteClient::new(remote_url.clone())?;
        client.handshake().await?;
        let listing = client.list("local").await?;

        let mut registered = Vec::new();
        for entry in listing {
            let id = tool_id(ToolOrigin::Remote, &entry.name, &entry.version);
            let already_present = {
                let inner = self.inner.read().await;
                inner.metadata.contains_key(&id)
            };
            if already_present {
                continue;
            }
            match self
                .register_remote(
                    entry.name.clone(),
                    entry.version.clone(),
                    remote_url.clone(),
                    auth_reference.clone(),
                )
                .await
            {
                Ok(_) => registered.push(entry.name),
                Err(e) => warn!("sync_remote: failed to register {}: {}", entry.name, e.message()),
            }
        }

        Ok(Envelope::ok(serde_json::json!({ "registered": registered })))
    }

    /// Reverse of registration. Invokes `shutdown()` for local tools.
    pub async fn deregister(&self, id: &str) -> Result<Envelope> {
        let (meta, backing) = {
            let mut inner = self.inner.write().await;
            let meta = inner
                .metadata
                .remove(id)
                .ok_or_else(|| RegistryError::not_found(format!("unknown tool_id: {id}")))?;
            inner.deindex(&meta);
            let backing = inner.backings.remove(id);
            (meta, backing)
        };

        if meta.origin == ToolOrigin::Local
            && let Some(tool) = backing
        {
            if let Err(e) = tool.shutdown().await {
                warn!("shutdown failed for {id}: {}", e.message());
            }
        }

        self.persist().await;
        info!("deregistered tool {id}");
        Ok(Envelope::ok(serde_json::json!({ "tool_id": id })))
    }

    pub async fn get(&self, id: &str) -> Option<ToolMetadata> {
        self.inner.read().await.metadata.get(id).cloned()
    }

    pub async fn backing(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().await.backings.get(id).cloned()
    }

    pub async fn find_by_name(&self, name: &str, origin: Option<ToolOrigin>) -> Vec<ToolMetadata> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.name_index.get(name) else {
            return vec![];
        };
        ids.iter()
            .filter_map(|id| inner.metadata.get(id))
            .filter(|m| origin.is_none_or(|o| m.origin == o))
            .cloned()
            .collect()
    }

    pub async fn find_by_capabilities(&self, capabilities: &[String], mode: MatchMode) -> Vec<ToolMetadata> {
        let inner = self.inner.read().await;
        let ids = Self::match_sets(&inner, &inner.capability_index, capabilities, mode);
        ids.iter().filter_map(|id| inner.metadata.get(id)).cloned().collect()
    }

    pub async fn find_by_category(&self, category: &str) -> Vec<ToolMetadata> {
        let inner = self.inner.read().await;
        inner
            .category_index
            .get(category)
            .map(|ids| ids.iter().filter_map(|id| inner.metadata.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn find_by_tags(&self, tags: &[String], mode: MatchMode) -> Vec<ToolMetadata> {
        let inner = self.inner.read().await;
        let ids = Self::match_sets(&inner, &inner.tag_index, tags, mode);
        ids.iter().filter_map(|id| inner.metadata.get(id)).cloned().collect()
    }

    // Helper kept generic over which index (capability/tag) to intersect/union
    // against, preserving insertion order per spec's tie-break rule.
    fn match_sets(
        inner: &Inner,
        index: &HashMap<String, IndexSet<String>>,
        terms: &[String],
        mode: MatchMode,
    ) -> Vec<String> {
        if terms.is_empty() {
            return vec![];
        }
        let sets: Vec<&IndexSet<String>> = terms.iter().filter_map(|t| index.get(t)).collect();
        if mode == MatchMode::All && sets.len() != terms.len() {
            return vec![];
        }
        let mut ordered: IndexSet<String> = IndexSet::new();
        // Preserve overall registration order by walking the metadata map's
        // insertion-ordered id list rather than each index set individually.
        for id in inner.local_ids.iter().chain(inner.external_ids.iter()).chain(inner.remote_ids.iter()) {
            let matches = match mode {
                MatchMode::All => sets.iter().all(|s| s.contains(id)),
                MatchMode::Any => sets.iter().any(|s| s.contains(id)),
            };
            if matches {
                ordered.insert(id.clone());
            }
        }
        ordered.into_iter().collect()
    }

    /// All registrations sharing `name`, sorted ascending by semver.
    pub async fn versions_of(&self, name: &str) -> Vec<ToolMetadata> {
        let mut entries = self.find_by_name(name, None).await;
        entries.sort_by(compare_versions);
        entries
    }

    pub async fn latest(&self, name: &str) -> Option<ToolMetadata> {
        self.versions_of(name).await.into_iter().next_back()
    }

    pub async fn capabilities(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut caps: Vec<String> = inner.capability_index.keys().cloned().collect();
        caps.sort();
        caps
    }

    pub async fn categories(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut cats: Vec<String> = inner.category_index.keys().cloned().collect();
        cats.sort();
        cats
    }

    pub async fn list(
        &self,
        origin: Option<ToolOrigin>,
        category: Option<&str>,
        capability: Option<&str>,
        tag: Option<&str>,
    ) -> Vec<ToolMetadata> {
        let inner = self.inner.read().await;
        let base_ids: Vec<&String> = match origin {
            Some(ToolOrigin::Local) => inner.local_ids.iter().collect(),
            Some(ToolOrigin::External) => inner.external_ids.iter().collect(),
            Some(ToolOrigin::Remote) => inner.remote_ids.iter().collect(),
            None => inner
                .local_ids
                .iter()
                .chain(inner.external_ids.iter())
                .chain(inner.remote_ids.iter())
                .collect(),
        };
        base_ids
            .into_iter()
            .filter_map(|id| inner.metadata.get(id))
            .filter(|m| category.is_none_or(|c| m.category == c))
            .filter(|m| capability.is_none_or(|c| m.capabilities.contains(c)))
            .filter(|m| tag.is_none_or(|t| m.tags.contains(t)))
            .cloned()
            .collect()
    }

    /// Metadata plus the action catalog, sourced from the tool itself.
    pub async fn describe(&self, id: &str) -> Result<(ToolMetadata, Vec<String>)> {
        let inner = self.inner.read().await;
        let meta = inner
            .metadata
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("unknown tool_id: {id}")))?;
        let backing = inner
            .backings
            .get(id)
            .ok_or_else(|| RegistryError::not_found(format!("unknown tool_id: {id}")))?;
        let actions = backing.actions().iter().map(|a| a.name.clone()).collect();
        Ok((meta, actions))
    }

    pub async fn action_schema(&self, id: &str, action: &str) -> Result<crate::tool::ActionDescriptor> {
        let inner = self.inner.read().await;
        let backing = inner
            .backings
            .get(id)
            .ok_or_else(|| RegistryError::not_found(format!("unknown tool_id: {id}")))?;
        backing
            .actions()
            .iter()
            .find(|a| a.name == action)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("unknown action: {action}")))
    }

    /// Dispatch algorithm (§4.4): resolve metadata, validate the action
    /// exists and required parameters are present, then delegate to the
    /// backing's `execute`. Any panic/exception at this boundary becomes
    /// `internal`.
    pub async fn dispatch(
        &self,
        id: &str,
        action: &str,
        parameters: serde_json::Value,
        context: InvocationContext,
    ) -> Envelope {
        match self.dispatch_inner(id, action, parameters, context).await {
            Ok(env) => env,
            Err(e) => Envelope::from(e),
        }
    }

    async fn dispatch_inner(
        &self,
        id: &str,
        action: &str,
        parameters: serde_json::Value,
        context: InvocationContext,
    ) -> Result<Envelope> {
        let backing = {
            let inner = self.inner.read().await;
            if !inner.metadata.contains_key(id) {
                return Err(RegistryError::not_found(format!("unknown tool_id: {id}")));
            }
            inner
                .backings
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::not_found(format!("unknown tool_id: {id}")))?
        };

        let descriptor = backing
            .actions()
            .iter()
            .find(|a| a.name == action)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("unknown action: {action}")))?;

        descriptor
            .check_required_present(&parameters)
            .map_err(RegistryError::validation)?;

        backing.execute(action, parameters, &context).await
    }

    /// Re-registers persisted external/remote entries on startup. Each
    /// failure is logged and skipped rather than aborting the load.
    pub async fn restore_external(&self, meta: ToolMetadata, config: ExternalConfig) {
        if let Err(e) = self
            .register_external(meta.name.clone(), meta.version.clone(), config, meta.capabilities.clone())
            .await
        {
            warn!(
                "skipping reimport of external tool {}: {}",
                meta.tool_id,
                e.message()
            );
        }
    }

    pub async fn restore_remote(&self, meta: ToolMetadata) {
        let Some(endpoint) = meta.endpoint.clone() else {
            warn!("skipping reimport of remote tool {}: missing endpoint", meta.tool_id);
            return;
        };
        if let Err(e) = self
            .register_remote(meta.name.clone(), meta.version.clone(), endpoint, meta.auth_reference.clone())
            .await
        {
            warn!(
                "skipping reimport of remote tool {}: {}",
                meta.tool_id,
                e.message()
            );
        }
    }
}
