use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubkitError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bind host handed to the spawned core and probed for health.
    #[serde(default = "default_core_host")]
    pub core_host: String,
    #[serde(default = "default_core_port")]
    pub core_port: u16,
    /// Port the remote bridge listens on for client connections.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    /// Delay between the last client disconnecting and core teardown.
    #[serde(default = "default_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
}

fn default_core_host() -> String {
    "127.0.0.1".to_string()
}

fn default_core_port() -> u16 {
    8080
}

fn default_bridge_port() -> u16 {
    7878
}

fn default_grace_ms() -> u64 {
    60_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            core_host: default_core_host(),
            core_port: default_core_port(),
            bridge_port: default_bridge_port(),
            shutdown_grace_ms: default_grace_ms(),
            install_root: None,
            manifest_path: None,
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| HubkitError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".config").join("hubkit"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Loads the config file when present, otherwise starts from defaults;
    /// environment variables override either.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| HubkitError::Config(format!("Invalid config: {}", e)))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `HUBKIT_*` overrides. Unparseable numeric values are ignored
    /// in favor of whatever the config already holds.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HUBKIT_CORE_HOST") {
            self.core_host = host;
        }
        if let Some(port) = lookup("HUBKIT_CORE_PORT").and_then(|v| v.parse().ok()) {
            self.core_port = port;
        }
        if let Some(port) = lookup("HUBKIT_BRIDGE_PORT").and_then(|v| v.parse().ok()) {
            self.bridge_port = port;
        }
        if let Some(grace) = lookup("HUBKIT_SHUTDOWN_GRACE_MS").and_then(|v| v.parse().ok()) {
            self.shutdown_grace_ms = grace;
        }
        if let Some(root) = lookup("HUBKIT_INSTALL_ROOT") {
            self.install_root = Some(PathBuf::from(root));
        }
        if let Some(manifest) = lookup("HUBKIT_MANIFEST") {
            self.manifest_path = Some(PathBuf::from(manifest));
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| HubkitError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn install_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.install_root {
            return Ok(root.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| HubkitError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".hubkit").join("core"))
    }

    pub fn manifest_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.manifest_path {
            return Ok(path.clone());
        }
        Ok(Self::config_dir()?.join("manifest.json"))
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_core_contract() {
        let config = AppConfig::default();
        assert_eq!(config.core_host, "127.0.0.1");
        assert_eq!(config.core_port, 8080);
        assert_eq!(config.shutdown_grace_ms, 60_000);
        assert_eq!(config.grace(), Duration::from_millis(60_000));
    }

    #[test]
    fn test_env_overrides() {
        let mut env = HashMap::new();
        env.insert("HUBKIT_CORE_HOST", "0.0.0.0");
        env.insert("HUBKIT_CORE_PORT", "9000");
        env.insert("HUBKIT_SHUTDOWN_GRACE_MS", "5000");
        env.insert("HUBKIT_INSTALL_ROOT", "/opt/hubkit");

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.core_host, "0.0.0.0");
        assert_eq!(config.core_port, 9000);
        assert_eq!(config.shutdown_grace_ms, 5000);
        assert_eq!(config.install_root, Some(PathBuf::from("/opt/hubkit")));
    }

    #[test]
    fn test_unparseable_numeric_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| {
            (key == "HUBKIT_CORE_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.core_port, 8080);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = AppConfig {
            bridge_port: 7979,
            manifest_path: Some(PathBuf::from("/etc/hubkit/manifest.json")),
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.bridge_port, 7979);
        assert_eq!(
            parsed.manifest_path,
            Some(PathBuf::from("/etc/hubkit/manifest.json"))
        );
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let parsed: AppConfig = serde_yaml::from_str("core_port: 9999\n").unwrap();
        assert_eq!(parsed.core_port, 9999);
        assert_eq!(parsed.core_host, "127.0.0.1");
        assert_eq!(parsed.shutdown_grace_ms, 60_000);
    }
}
