use serde::{Deserialize, Serialize};

use crate::keepalive::KeepaliveConfig;
use crate::media_server::MediaServerConfig;
use crate::paths::PathsConfig;
use crate::snapshot::SnapshotTierConfig;

/// The complete configuration tree for a `camctl-controller` process.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CamctlConfig {
    #[serde(default)]
    pub media_server: MediaServerConfig,
    #[serde(default)]
    pub snapshot: SnapshotTierConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let config = CamctlConfig::default();
        assert_eq!(config.media_server.api_port, 9997);
        assert!(config.snapshot.tier3_activation_timeout_secs > 0.0);
    }
}
