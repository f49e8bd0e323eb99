//! Node-level configuration of the bridge subsystem.
//!
//! Governance-mutable tunables live in [`crate::domain::Params`]; this is
//! what an operator sets once per node or per chain.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default bound on oracle attestations carried by one vote extension.
pub const DEFAULT_MAX_ORACLE_ATTESTATIONS_PER_VOTE: usize = 1024;

/// Default per-block snapshot limit written at genesis.
pub const DEFAULT_SNAPSHOT_LIMIT: u64 = 1000;

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Chain identifier, bound into the checkpoint domain separator.
    pub chain_id: String,
    /// Vote-extension handlers act only at heights strictly above this.
    pub vote_extension_enable_height: u64,
    /// Structural bound checked by VerifyVoteExtension.
    pub max_oracle_attestations_per_vote: usize,
    /// Initial value of the snapshot-limit cell.
    pub default_snapshot_limit: u64,
    /// Only signer allowed to update params.
    pub authority: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chain_id: "layer".to_string(),
            vote_extension_enable_height: 1,
            max_oracle_attestations_per_vote: DEFAULT_MAX_ORACLE_ATTESTATIONS_PER_VOTE,
            default_snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            authority: "tellor10d07y265gmmuvt4z0w9aw880jnsr700j6527cd".to_string(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    bridge: BridgeSection,
    #[serde(default)]
    vote_extensions: VoteExtensionSection,
}

#[derive(Debug, Deserialize, Default)]
struct BridgeSection {
    chain_id: Option<String>,
    authority: Option<String>,
    default_snapshot_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct VoteExtensionSection {
    enable_height: Option<u64>,
    max_oracle_attestations: Option<usize>,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// [bridge]
    /// chain_id = "layertest-4"
    /// authority = "tellor10d07y265gmmuvt4z0w9aw880jnsr700j6527cd"
    /// default_snapshot_limit = 1000
    ///
    /// [vote_extensions]
    /// enable_height = 1
    /// max_oracle_attestations = 1024
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let defaults = Self::default();
        let config = Self {
            chain_id: file.bridge.chain_id.unwrap_or(defaults.chain_id),
            vote_extension_enable_height: file
                .vote_extensions
                .enable_height
                .unwrap_or(defaults.vote_extension_enable_height),
            max_oracle_attestations_per_vote: file
                .vote_extensions
                .max_oracle_attestations
                .unwrap_or(defaults.max_oracle_attestations_per_vote),
            default_snapshot_limit: file
                .bridge
                .default_snapshot_limit
                .unwrap_or(defaults.default_snapshot_limit),
            authority: file.bridge.authority.unwrap_or(defaults.authority),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::Invalid("chain_id cannot be empty".into()));
        }
        if self.authority.trim().is_empty() {
            return Err(ConfigError::Invalid("authority cannot be empty".into()));
        }
        if self.max_oracle_attestations_per_vote == 0 {
            return Err(ConfigError::Invalid(
                "max_oracle_attestations must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {error}")]
    Io { path: String, error: String },
    /// TOML parse error.
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// Parsed, but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty_uses_defaults() {
        assert_eq!(BridgeConfig::parse("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = BridgeConfig::parse(
            r#"
            [bridge]
            chain_id = "layertest-4"
            authority = "gov"
            default_snapshot_limit = 5

            [vote_extensions]
            enable_height = 10
            max_oracle_attestations = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.chain_id, "layertest-4");
        assert_eq!(config.authority, "gov");
        assert_eq!(config.default_snapshot_limit, 5);
        assert_eq!(config.vote_extension_enable_height, 10);
        assert_eq!(config.max_oracle_attestations_per_vote, 64);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            BridgeConfig::parse("[bridge]\nchain_id = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BridgeConfig::parse("[bridge]\nchain_id = \"\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bridge]\nchain_id = \"tellor-1\"").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.chain_id, "tellor-1");

        assert!(matches!(
            BridgeConfig::load("/nonexistent/bridge.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
