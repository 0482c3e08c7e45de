use std::path::PathBuf;

use alloy::primitives::Address;
use clap::Parser;
use cofhe_encrypt::{
    load_config, Collaborators, ConfigFormat, EncryptableItem, Encryptor, StepEvent,
};
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!("Only one of the `dev`, `test`, or `prod` features may be enabled for cofhe-encrypt.");

#[derive(Debug, Parser)]
#[command(
    name = "cofhe-encrypt",
    version,
    about = "Encrypts plaintext values into verified FHE inputs for a CoFHE chain"
)]
struct Cli {
    /// Path to configuration file (TOML or YAML).
    #[arg(long, default_value = "configs/cofhe-encrypt.toml")]
    config: PathBuf,
    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,
    /// Target chain. Defaults to `encrypt.default-chain-id`.
    #[arg(long, env = "COFHE_CHAIN_ID")]
    chain_id: Option<u64>,
    /// Account the inputs are bound to. Defaults to `encrypt.default-account`.
    #[arg(long, env = "COFHE_ACCOUNT")]
    account: Option<Address>,
    /// Security zone override.
    #[arg(long)]
    security_zone: Option<u8>,
    /// Prove on the worker pool (`true`/`false`).
    #[arg(long)]
    use_worker: Option<bool>,
    /// Value to encrypt as `<utype>:<value>`, e.g. `uint32:42`. Repeatable.
    #[arg(long = "item", required = true)]
    items: Vec<EncryptableItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.config_format)?;

    let encryptor = Encryptor::new(config, Collaborators::simulated())
        .map_err(|err| eyre!("{err} ({})", err.code().hint()))?;
    let mut request = encryptor
        .request(cli.items)
        .with_step_callback(|event: &StepEvent| {
            if let StepEvent::End {
                step, duration_ms, ..
            } = event
            {
                info!(%step, duration_ms, "step finished");
            }
        });
    if let Some(chain_id) = cli.chain_id {
        request = request.with_chain_id(chain_id);
    }
    if let Some(account) = cli.account {
        request = request.with_account(account);
    }
    if let Some(security_zone) = cli.security_zone {
        request = request.with_security_zone(security_zone);
    }
    if let Some(use_worker) = cli.use_worker {
        request = request.with_use_worker(use_worker);
    }

    let inputs = request
        .encrypt()
        .await
        .map_err(|err| eyre!("{err} ({})", err.code().hint()))?;
    println!("{}", serde_json::to_string_pretty(&inputs)?);
    println!("{}", encryptor.telemetry().flush().to_json()?);
    Ok(())
}
