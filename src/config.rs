use std::path::PathBuf;
use std::time::Duration;

use crate::health::DEFAULT_INTERVAL_SECONDS;

/// The core recognizes exactly two environment variables; everything else
/// belongs to individual tools.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub config_path: PathBuf,
    pub health_interval: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let config_path = std::env::var("REGISTRY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./registry_config.json"));

        let health_interval = std::env::var("REGISTRY_HEALTH_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_INTERVAL_SECONDS));

        Self {
            config_path,
            health_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        // SAFETY: test-only manipulation of process env, single-threaded per test.
        unsafe {
            std::env::remove_var("REGISTRY_CONFIG_PATH");
            std::env::remove_var("REGISTRY_HEALTH_INTERVAL_SECONDS");
        }
        let cfg = RuntimeConfig::from_env();
        assert_eq!(cfg.config_path, PathBuf::from("./registry_config.json"));
        assert_eq!(cfg.health_interval, Duration::from_secs(DEFAULT_INTERVAL_SECONDS));
    }
}
