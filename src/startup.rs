use crate::persistence::{self, Snapshot};
use crate::registry::Registry;
use std::sync::Arc;
use tracing::warn;

/// Re-registers persisted external/remote entries (C8). Local entries are
/// informational only and are never re-registered — local tools come from
/// in-process discovery (`crate::tools::register_builtin`). A failure on any
/// single entry is logged and skipped; it never aborts the rest of the load.
pub async fn reimport(registry: &Arc<Registry>, snapshot: Snapshot) {
    for meta in snapshot.external_tools {
        let config = match registry.config_path() {
            Some(path) => persistence::load_external_config(path, &meta.name),
            None => Err(anyhow::anyhow!(
                "no config path configured, cannot locate per-tool external config"
            )),
        };
        match config {
            Ok(config) => registry.restore_external(meta, config).await,
            Err(e) => warn!(
                "skipping reimport of external tool {}: {e}",
                meta.tool_id
            ),
        }
    }

    for meta in snapshot.remote_tools {
        registry.restore_remote(meta).await;
    }
}

/// Loads the on-disk snapshot (if any) and re-registers its external/remote
/// entries. Called once at process startup.
pub async fn load_and_reimport(registry: &Arc<Registry>, config_path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(snapshot) = persistence::load_snapshot(config_path)? {
        reimport(registry, snapshot).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::external::{ExternalConfig, NoCredentials};
    use crate::metadata::ToolOrigin;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn s8_export_import_round_trip_reregisters_external_tool() {
        let server = wiremock::MockServer::start().await;

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("registry_config.json");

        let registry = Arc::new(Registry::new(Some(config_path.clone()), Arc::new(NoCredentials)));
        registry
            .register_external(
                "stub",
                "1.0.0",
                ExternalConfig {
                    base_url: server.uri(),
                    default_headers: Default::default(),
                    auth_reference: Some("secret-handle".to_string()),
                    actions: vec![],
                    health_path: None,
                },
                BTreeSet::new(),
            )
            .await
            .unwrap();

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.external_tools.len(), 1);
        assert!(snapshot.external_tools[0].auth_reference.is_none());

        // Fresh registry, same config path — load_and_reimport should find
        // both the exported snapshot and the per-tool config doc.
        let fresh = Arc::new(Registry::new(Some(config_path.clone()), Arc::new(NoCredentials)));
        load_and_reimport(&fresh, &config_path).await.unwrap();

        let meta = fresh
            .get(&crate::metadata::tool_id(ToolOrigin::External, "stub", "1.0.0"))
            .await;
        assert!(meta.is_some());
    }
}
