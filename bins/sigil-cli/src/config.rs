//! CLI configuration: TOML file, then `SIGIL_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bitcoin::Network;
use ::config::{Config, Environment, File};
use serde::Deserialize;

use sigil_core::constants::{DEFAULT_ESPLORA_URL, DEFAULT_FEE_RATE, DEFAULT_IO_TIMEOUT_SECS, MIN_FEE};
use sigil_wallet::{EngineConfig, FeePolicy};

const ENV_PREFIX: &str = "SIGIL";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    /// Esplora REST base URL.
    pub esplora_url: String,
    /// `testnet` (also `testnet4`), `signet` or `regtest`.
    pub network: String,
    /// Satoshis per virtual byte.
    pub fee_rate: u64,
    pub min_fee: u64,
    /// Bound on each indexer request, in seconds.
    pub timeout_secs: u64,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            esplora_url: DEFAULT_ESPLORA_URL.to_string(),
            network: "testnet".to_string(),
            fee_rate: DEFAULT_FEE_RATE,
            min_fee: MIN_FEE,
            timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            log_json: false,
        }
    }
}

impl CliConfig {
    /// Load from `path` (or `~/.sigil/config.toml` when absent) and the process
    /// environment. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) if !p.exists() => bail!("Config file not found: {}", p.display()),
            Some(p) => Some(p.to_path_buf()),
            None => default_path(),
        };
        Self::load_with(path.as_deref(), Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an optional file layered under `env`. A missing file is
    /// treated as empty.
    pub fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let cfg: CliConfig = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply command-line overrides, then re-check the merged result.
    pub fn apply_overrides(
        &mut self,
        esplora_url: Option<String>,
        network: Option<String>,
        fee_rate: Option<u64>,
    ) -> Result<()> {
        if let Some(url) = esplora_url {
            self.esplora_url = url;
        }
        if let Some(network) = network {
            self.network = network;
        }
        if let Some(rate) = fee_rate {
            self.fee_rate = rate;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.fee_rate == 0 {
            bail!("fee_rate must be at least 1 sat/vB");
        }
        if self.min_fee < MIN_FEE {
            bail!("min_fee must be at least {MIN_FEE} sats");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be positive");
        }
        self.network()?;
        Ok(())
    }

    pub fn network(&self) -> Result<Network> {
        parse_network(&self.network)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            network: self.network()?,
            fee_policy: FeePolicy {
                fee_rate: self.fee_rate,
                min_fee: self.min_fee,
            },
            io_timeout: self.timeout(),
        })
    }
}

/// `~/.sigil/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".sigil").join("config.toml"))
}

/// Parse network string to a [`Network`]. Mainnet is refused.
pub fn parse_network(s: &str) -> Result<Network> {
    match s.to_lowercase().as_str() {
        "testnet" | "testnet4" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        "mainnet" | "bitcoin" => bail!("mainnet is not supported"),
        other => bail!("Invalid network '{other}' (expected testnet, signet or regtest)"),
    }
}
