//! Layered configuration.
//!
//! Values are resolved in order, later sources winning: built-in defaults, the optional
//! `eth1-mock-rpc.toml` in the working directory, `ETH1_MOCK_*` environment variables,
//! then command line flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::chain::cache;
use crate::core::LoadOptions;
use crate::rpc::SessionConfig;

pub const CONFIG_FILE: &str = "eth1-mock-rpc.toml";
pub const ENV_PREFIX: &str = "ETH1_MOCK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory of validator key files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keystore_path: Option<PathBuf>,
    /// Password unlocking the keystore.
    pub password: String,
    pub host: IpAddr,
    pub http_port: u16,
    pub ws_port: u16,
    /// Ignore the deposit cache and decrypt the keystore again.
    pub invalidate_cache: bool,
    /// Deposits visible from the start, enough to trigger the genesis event.
    pub genesis_deposits: usize,
    /// Log level: trace, debug, info, warn, error.
    pub verbosity: String,
    pub json_logs: bool,
    /// Seconds between chain heads pushed to WebSocket subscribers.
    pub tick_interval_secs: u64,
    /// Deposit cache location. Defaults to a file in the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keystore_path: None,
            password: String::new(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: 7777,
            ws_port: 7778,
            invalidate_cache: false,
            genesis_deposits: 0,
            verbosity: "info".to_string(),
            json_logs: false,
            tick_interval_secs: 10,
            cache_path: None,
        }
    }
}

impl AppConfig {
    /// Resolve the configuration, applying `overrides` (typically parsed CLI args) last.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self, figment::Error> {
        Self::figment(overrides).extract()
    }

    pub fn figment<T: Serialize>(overrides: Option<&T>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }
        figment
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.genesis_deposits == 0 {
            bail!("Please enter a valid number of --genesis-deposits to read from the keystore");
        }
        if self.tick_interval_secs == 0 {
            bail!("tick_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.http_port)
    }

    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.ws_port)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(cache::default_cache_path)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            cache_path: self.cache_path(),
            keystore_path: self.keystore_path.clone(),
            password: self.password.clone(),
            invalidate_cache: self.invalidate_cache,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        http_port: u16,
        genesis_deposits: usize,
    }

    #[test]
    fn defaults_match_the_documented_ports() {
        let config = AppConfig::default();
        assert_eq!(config.http_addr().to_string(), "127.0.0.1:7777");
        assert_eq!(config.ws_addr().to_string(), "127.0.0.1:7778");
        assert_eq!(config.session().tick_interval, Duration::from_secs(10));
    }

    #[test]
    fn overrides_win_over_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "http_port = 9000\nws_port = 9001\n")?;
            jail.set_env("ETH1_MOCK_GENESIS_DEPOSITS", "4");

            let config = AppConfig::new(None::<&Overrides>)?;
            assert_eq!(config.http_port, 9000);
            assert_eq!(config.ws_port, 9001);
            assert_eq!(config.genesis_deposits, 4);

            let overrides = Overrides {
                http_port: 9100,
                genesis_deposits: 8,
            };
            let config = AppConfig::new(Some(&overrides))?;
            assert_eq!(config.http_port, 9100);
            assert_eq!(config.ws_port, 9001);
            assert_eq!(config.genesis_deposits, 8);
            Ok(())
        });
    }

    #[test]
    fn validate_rejects_zero_genesis_deposits() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.genesis_deposits = 3;
        assert!(config.validate().is_ok());

        config.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cache_path_defaults_to_temp_dir() {
        let config = AppConfig::default();
        assert_eq!(config.cache_path(), cache::default_cache_path());
    }
}
