use crate::metadata::ToolOrigin;
use crate::registry::Registry;
use crate::tool::HealthRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const DEFAULT_INTERVAL_SECONDS: u64 = 300;

/// Periodic background probe of non-local tools (§4.7). Health records live
/// under their own lock, separate from the registry's metadata lock, and
/// are never persisted.
pub struct HealthMonitor {
    registry: Arc<Registry>,
    interval: Duration,
    records: Arc<RwLock<HashMap<String, HealthRecord>>>,
    running: Arc<AtomicBool>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<Registry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            records: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            task: RwLock::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        let handle = tokio::spawn(async move {
            while this.running.load(Ordering::SeqCst) {
                if let Err(e) = this.check_all().await {
                    tracing::error!("health monitor check failed: {e}");
                }
                tokio::time::sleep(this.interval).await;
            }
        });
        *self.task.write().await = Some(handle);
        info!(
            "health monitor started (check interval: {}s)",
            self.interval.as_secs()
        );
    }

    /// Stops the monitor cleanly; cooperative, not forced — the loop checks
    /// `running` between cycles rather than being aborted mid-probe.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
        info!("health monitor stopped");
    }

    async fn check_all(&self) -> anyhow::Result<()> {
        let local = self.registry.list(Some(ToolOrigin::External), None, None, None).await;
        let remote = self.registry.list(Some(ToolOrigin::Remote), None, None, None).await;

        for meta in local.into_iter().chain(remote) {
            let Some(tool) = self.registry.backing(&meta.tool_id).await else {
                continue;
            };
            let record = match tool.health_check().await {
                Some(record) => record,
                None => HealthRecord {
                    status: crate::tool::HealthStatus::Unknown,
                    message: None,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            };
            if !record.is_healthy() {
                warn!("tool health status: {} - {:?}", meta.tool_id, record.status);
            }
            self.records.write().await.insert(meta.tool_id, record);
        }
        Ok(())
    }

    pub async fn status(&self, tool_id: Option<&str>) -> serde_json::Value {
        let records = self.records.read().await;
        match tool_id {
            Some(id) => serde_json::to_value(records.get(id)).unwrap_or(serde_json::Value::Null),
            None => serde_json::to_value(&*records).unwrap_or(serde_json::Value::Null),
        }
    }

    pub async fn is_healthy(&self, tool_id: &str) -> bool {
        self.records
            .read()
            .await
            .get(tool_id)
            .map(|r| r.is_healthy())
            .unwrap_or(false)
    }

    pub async fn unhealthy(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(_, r)| !r.is_healthy())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::external::NoCredentials;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn s6_health_transition_from_healthy_to_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = Arc::new(Registry::new(None, Arc::new(NoCredentials)));
        registry
            .register_external(
                "stub",
                "1.0.0",
                crate::adapter::external::ExternalConfig {
                    base_url: server.uri(),
                    default_headers: Default::default(),
                    auth_reference: None,
                    actions: vec![],
                    health_path: Some("/health".to_string()),
                },
                Default::default(),
            )
            .await
            .unwrap();

        let monitor = Arc::new(HealthMonitor::new(registry, Duration::from_millis(50)));
        monitor.start().await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(monitor.is_healthy("external.stub.1.0.0").await);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!monitor.is_healthy("external.stub.1.0.0").await);

        monitor.stop().await;
    }
}
