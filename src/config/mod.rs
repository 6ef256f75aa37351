//! Client configuration: a JSON file plus command-line/environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crowdfund_core::catalog::DEFAULT_READ_CONCURRENCY;
use crowdfund_core::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Address the crowdfunding contract was deployed at on the development
/// network.
pub const DEFAULT_CONTRACT: Address = Address::new([
    0xf3, 0x4d, 0xca, 0xe7, 0xf0, 0x23, 0x0d, 0x93, 0x77, 0xef, 0xac, 0xf8, 0xf9, 0x8e, 0xa7,
    0xd7, 0x3d, 0x65, 0xfa, 0x40,
]);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    pub contract_address: Address,
    /// Account to act as. When absent the node's first account is used.
    pub account: Option<Address>,
    /// Campaign rows fetched concurrently during a refresh.
    pub read_concurrency: usize,
    pub poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address: DEFAULT_CONTRACT,
            account: None,
            read_concurrency: DEFAULT_READ_CONCURRENCY,
            poll_interval_ms: 1_000,
            receipt_timeout_secs: 120,
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub contract: Option<Address>,
    pub account: Option<Address>,
}

impl ClientConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crowdfund")
            .join("config.json")
    }

    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !path.exists() {
            if explicit {
                bail!("config file {} does not exist", path.display());
            }
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.rpc_url {
            self.rpc_url = url;
        }
        if let Some(contract) = overrides.contract {
            self.contract_address = contract;
        }
        if overrides.account.is_some() {
            self.account = overrides.account;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            bail!("rpc_url must not be empty");
        }
        if self.contract_address.is_zero() {
            bail!("contract_address must not be the zero address");
        }
        if self.read_concurrency == 0 {
            bail!("read_concurrency must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn default_contract_matches_checksum_address() {
        let parsed: Address = "0xf34DCAe7f0230d9377EfacF8F98eA7d73d65FA40".parse().unwrap();
        assert_eq!(parsed, DEFAULT_CONTRACT);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"rpc_url": "http://node:8545", "read_concurrency": 2}"#,
        )
        .unwrap();

        let config = ClientConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.rpc_url, "http://node:8545");
        assert_eq!(config.read_concurrency, 2);
        assert_eq!(config.contract_address, DEFAULT_CONTRACT);
        assert_eq!(config.receipt_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ClientConfig::load(Some(dir.path().join("absent.json").as_path())).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"contract_address": "0x12"}"#).unwrap();
        assert!(ClientConfig::load(Some(path.as_path())).is_err());

        fs::write(&path, r#"{"read_concurrency": 0}"#).unwrap();
        let err = ClientConfig::load(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("read_concurrency"));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let account: Address = "0x0101010101010101010101010101010101010101".parse().unwrap();
        let config = ClientConfig::default().apply(Overrides {
            rpc_url: Some("http://other:8545".into()),
            contract: None,
            account: Some(account),
        });
        assert_eq!(config.rpc_url, "http://other:8545");
        assert_eq!(config.contract_address, DEFAULT_CONTRACT);
        assert_eq!(config.account, Some(account));
    }
}
