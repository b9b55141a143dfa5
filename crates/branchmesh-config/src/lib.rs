//! Configuration management for branchmesh
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (BRANCHMESH_* prefix, `__` between sections)
//! 3. branchmesh.local.toml (gitignored, local overrides)
//! 4. branchmesh.toml (git-tracked, project config)
//! 5. ~/.config/branchmesh/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use branchmesh_types::RunMode;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main branchmesh configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchmeshConfig {
    pub cluster: ClusterConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

/// Where replicas listen and how they are started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Interface every replica binds to.
    pub host: IpAddr,
    /// Replica `id` listens on `base_port + id`. `0` selects ephemeral ports.
    pub base_port: u16,
    /// Pause after each replica is bound before binding the next.
    pub settle_delay_ms: u64,
}

impl ClusterConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 50_000,
            settle_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub mode: RunMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output file for session results. Standard output when unset.
    pub path: Option<PathBuf>,
}

impl BranchmeshConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if let Some(path) = &self.output.path {
            if path.is_relative() {
                self.output.path = Some(base.join(path));
            }
        }
    }

    /// Checks cross-field constraints the type system does not capture.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.host.is_unspecified() && self.cluster.base_port == 0 {
            // Ephemeral ports are reported as bound on the unspecified
            // address, which clients cannot connect to.
            return Err(ConfigError::ValidationError(
                "cluster.host must be a concrete address when cluster.base_port is 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML, in the layout config files use.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BranchmeshConfig::default();
        assert_eq!(config.cluster.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.cluster.base_port, 50_000);
        assert_eq!(config.cluster.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.run.mode, RunMode::Sequential);
        assert!(config.output.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = BranchmeshConfig::default();
        config.output.path = Some(PathBuf::from("out/output.json"));
        config.resolve_paths("/home/user/project");

        assert_eq!(
            config.output.path,
            Some(PathBuf::from("/home/user/project/out/output.json"))
        );
    }

    #[test]
    fn test_unspecified_host_needs_fixed_ports() {
        let mut config = BranchmeshConfig::default();
        config.cluster.host = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        assert!(config.validate().is_ok());

        config.cluster.base_port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let mut config = BranchmeshConfig::default();
        config.run.mode = RunMode::Concurrent;

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[cluster]"));
        assert!(rendered.contains("mode = \"concurrent\""));

        let parsed: BranchmeshConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
