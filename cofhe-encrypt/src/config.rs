use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy::{
    primitives::{address, Address},
    signers::local::PrivateKeySigner,
};
use clap::ValueEnum;
use cofhe_telemetry::TelemetryConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::steps::EncryptStep;

/// Chain id of the local development network served by the mock path.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Address the mock verifier contract is deployed at on the local chain.
pub const MOCK_ZK_VERIFIER_ADDRESS: Address = address!("0000000000000000000000000000000000000100");

/// Well-known key the local mock verifier trusts.
pub const MOCK_ZK_VERIFIER_SIGNER_KEY: &str =
    "0x6C8D7F768A6BB4AAFE85E8A2F5A9680355239C7E14646ED62B044E39DE154512";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub encrypt: EncryptSection,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default, rename = "key-store")]
    pub key_store: KeyStoreSection,
    #[serde(default)]
    pub mock: MockSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncryptSection {
    #[serde(default = "default_local_chain_id")]
    pub local_chain_id: u64,
    #[serde(default)]
    pub default_security_zone: u8,
    #[serde(default = "default_use_worker")]
    pub use_worker: bool,
    #[serde(default)]
    pub default_account: Option<Address>,
    #[serde(default)]
    pub default_chain_id: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub coprocessor_url: String,
    #[serde(default)]
    pub verifier_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyStoreSection {
    /// JSON file the fetched keys persist to. Memory only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MockSection {
    /// JSON-RPC endpoint of the local chain. The in-process verifier is used
    /// when unset.
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default = "default_mock_verifier_address")]
    pub verifier_address: Address,
    #[serde(default = "default_mock_signer_key")]
    pub signer_key: String,
    #[serde(default)]
    pub step_delays_ms: MockStepDelays,
}

/// Artificial latency of each mock step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MockStepDelays {
    pub init_tfhe: u64,
    pub fetch_keys: u64,
    pub pack: u64,
    pub prove: u64,
    pub verify: u64,
}

impl MockStepDelays {
    pub const fn zero() -> Self {
        Self {
            init_tfhe: 0,
            fetch_keys: 0,
            pack: 0,
            prove: 0,
            verify: 0,
        }
    }

    pub fn delay(&self, step: EncryptStep) -> Duration {
        Duration::from_millis(match step {
            EncryptStep::InitTfhe => self.init_tfhe,
            EncryptStep::FetchKeys => self.fetch_keys,
            EncryptStep::Pack => self.pack,
            EncryptStep::Prove => self.prove,
            EncryptStep::Verify => self.verify,
        })
    }
}

impl Default for MockStepDelays {
    fn default() -> Self {
        Self {
            init_tfhe: 100,
            fetch_keys: 100,
            pack: 100,
            prove: 500,
            verify: 500,
        }
    }
}

const fn default_local_chain_id() -> u64 {
    LOCAL_CHAIN_ID
}

const fn default_use_worker() -> bool {
    true
}

const fn default_mock_verifier_address() -> Address {
    MOCK_ZK_VERIFIER_ADDRESS
}

fn default_mock_signer_key() -> String {
    MOCK_ZK_VERIFIER_SIGNER_KEY.to_owned()
}

impl Default for EncryptSection {
    fn default() -> Self {
        Self {
            local_chain_id: default_local_chain_id(),
            default_security_zone: 0,
            use_worker: default_use_worker(),
            default_account: None,
            default_chain_id: None,
        }
    }
}

impl Default for MockSection {
    fn default() -> Self {
        Self {
            rpc_url: None,
            verifier_address: default_mock_verifier_address(),
            signer_key: default_mock_signer_key(),
            step_delays_ms: MockStepDelays::default(),
        }
    }
}

impl ChainConfig {
    pub fn new(chain_id: u64, name: &str, coprocessor_url: &str) -> Self {
        Self {
            chain_id,
            name: name.to_owned(),
            coprocessor_url: coprocessor_url.to_owned(),
            verifier_url: None,
        }
    }

    pub fn with_verifier_url(mut self, verifier_url: &str) -> Self {
        self.verifier_url = Some(verifier_url.to_owned());
        self
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(ConfigError::Validation(format!(
                    "chain {} is configured more than once",
                    chain.chain_id
                )));
            }
            if chain.chain_id == self.encrypt.local_chain_id {
                return Err(ConfigError::Validation(format!(
                    "chain {} is the local development chain and always uses the mock path",
                    chain.chain_id
                )));
            }
            check_url(&chain.coprocessor_url, "coprocessor-url")?;
            if let Some(verifier_url) = &chain.verifier_url {
                check_url(verifier_url, "verifier-url")?;
            }
        }
        if let Some(rpc_url) = &self.mock.rpc_url {
            check_url(rpc_url, "mock rpc-url")?;
        }
        self.mock_signer()?;
        Ok(())
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }

    pub fn mock_signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        self.mock
            .signer_key
            .parse()
            .map_err(|err| ConfigError::Validation(format!("mock signer-key: {err}")))
    }

    /// No chains beyond the local one and instantaneous mock steps.
    pub fn local() -> Self {
        Self {
            encrypt: EncryptSection::default(),
            chains: Vec::new(),
            key_store: KeyStoreSection::default(),
            mock: MockSection {
                step_delays_ms: MockStepDelays::zero(),
                ..MockSection::default()
            },
            telemetry: TelemetryConfig::default(),
        }
    }

    pub fn sample() -> Self {
        Self {
            encrypt: EncryptSection::default(),
            chains: vec![
                ChainConfig::new(42069, "fhenix-testnet", "https://testnet-cofhe.fhenix.zone")
                    .with_verifier_url("https://testnet-cofhe-vrf.fhenix.zone"),
                ChainConfig::new(11155111, "sepolia", "https://testnet-cofhe.fhenix.zone")
                    .with_verifier_url("https://testnet-cofhe-vrf.fhenix.zone"),
            ],
            key_store: KeyStoreSection::default(),
            mock: MockSection::default(),
            telemetry: TelemetryConfig::sample("http://localhost:4318"),
        }
    }

    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.chains.push(chain);
        self
    }
}

fn check_url(raw: &str, field: &str) -> Result<(), ConfigError> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|err| ConfigError::Validation(format!("{field} `{raw}`: {err}")))
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, resolve_format(path, format))?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
    }
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}
