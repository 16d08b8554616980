//! Peer settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use conflux_recon::{config_keys, ConfigMap, ReconConfig};
use conflux_tree::TreeConfig;

use crate::error::{PeerError, Result};

/// Configuration for a [`Peer`](crate::Peer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Name attached to every log line of this peer.
    pub log_name: String,
    /// TCP port the reconciliation listener binds; 0 picks one.
    pub recon_port: u16,
    /// Advertised software version.
    pub version: String,
    /// Advertised HTTP port of the application.
    pub http_port: u16,
    /// Advertised filters applied to the element set.
    pub filters: Vec<String>,
    /// Deadline for reading the remote config on a new connection.
    pub handshake_timeout: Duration,
    /// Capacity of the recovery event channel.
    pub recover_buffer: usize,
    /// Session parameters.
    pub recon: ReconConfig,
    /// Shape of the local tree.
    pub tree: TreeConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            log_name: "conflux".into(),
            recon_port: 11370,
            version: env!("CARGO_PKG_VERSION").into(),
            http_port: 11371,
            filters: Vec::new(),
            handshake_timeout: Duration::from_secs(5),
            recover_buffer: 64,
            recon: ReconConfig::default(),
            tree: TreeConfig::default(),
        }
    }
}

impl PeerConfig {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PeerConfig =
            serde_json::from_str(json).map_err(|e| PeerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.tree.num_samples <= self.recon.mbar {
            return Err(PeerError::Config(format!(
                "num_samples ({}) must exceed mbar ({})",
                self.tree.num_samples, self.recon.mbar
            )));
        }
        self.tree
            .validate()
            .map_err(|e| PeerError::Config(e.to_string()))
    }

    /// The capability map sent in the handshake.
    pub fn config_map(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(config_keys::VERSION.into(), self.version.clone());
        map.insert(config_keys::HTTP_PORT.into(), self.http_port.to_string());
        map.insert(
            config_keys::BIT_QUANTUM.into(),
            self.tree.bit_quantum.to_string(),
        );
        map.insert(config_keys::MBAR.into(), self.recon.mbar.to_string());
        map.insert(config_keys::FILTERS.into(), self.filters.join(","));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerConfig::default();
        assert_eq!(config.recon_port, 11370);
        assert_eq!(config.recon.mbar, 5);
        assert_eq!(config.recon.max_outstanding_recon_requests, 100);
        assert_eq!(config.tree.bit_quantum, 2);
        assert_eq!(config.tree.num_samples, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = PeerConfig::from_json(
            r#"{"log_name": "alpha", "recon_port": 0, "filters": ["yminsky.dedup"], "recon": {"mbar": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.log_name, "alpha");
        assert_eq!(config.recon_port, 0);
        assert_eq!(config.recon.mbar, 3);
        assert_eq!(config.recon.max_outstanding_recon_requests, 100);
        assert_eq!(config.http_port, 11371);
    }

    #[test]
    fn test_from_json_rejects() {
        assert!(matches!(
            PeerConfig::from_json("{not json"),
            Err(PeerError::Config(_))
        ));
        assert!(matches!(
            PeerConfig::from_json(r#"{"recon": {"mbar": 6}}"#),
            Err(PeerError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_bad_tree_shape() {
        for json in [
            r#"{"tree": {"bit_quantum": 0}}"#,
            r#"{"tree": {"bit_quantum": 9}}"#,
            r#"{"tree": {"bit_quantum": 64}}"#,
            r#"{"tree": {"split_threshold": 0, "join_threshold": 0}}"#,
            r#"{"tree": {"split_threshold": 50, "join_threshold": 50}}"#,
        ] {
            assert!(
                matches!(PeerConfig::from_json(json), Err(PeerError::Config(_))),
                "accepted {json}"
            );
        }
        assert!(PeerConfig::from_json(r#"{"tree": {"bit_quantum": 8}}"#).is_ok());
    }

    #[test]
    fn test_config_map() {
        let config = PeerConfig {
            version: "1.2.3".into(),
            http_port: 8080,
            filters: vec!["a".into(), "b".into()],
            ..PeerConfig::default()
        };
        let map = config.config_map();
        assert_eq!(map["version"], "1.2.3");
        assert_eq!(map["http port"], "8080");
        assert_eq!(map["bitquantum"], "2");
        assert_eq!(map["mbar"], "5");
        assert_eq!(map["filters"], "a,b");
    }
}
