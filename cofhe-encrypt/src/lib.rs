//! Encrypted-input orchestration for CoFHE chains.
//!
//! An [`Encryptor`] turns plaintext [`EncryptableItem`]s into
//! [`EncryptedItemInput`]s a contract accepts. Calls on the local
//! development chain go through the mock verifier; every other chain runs
//! init, key fetch, pack, prove and verify against the coprocessor.
//!
//! ```no_run
//! use cofhe_encrypt::{Collaborators, Config, EncryptableItem, Encryptor};
//!
//! # async fn run() -> cofhe_encrypt::EncryptResult<()> {
//! let encryptor = Encryptor::new(Config::sample(), Collaborators::simulated())?;
//! let inputs = encryptor
//!     .request([EncryptableItem::Uint32(42)])
//!     .with_account(Default::default())
//!     .with_chain_id(42069)
//!     .encrypt()
//!     .await?;
//! assert_eq!(inputs.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod encryptor;
pub mod error;
mod flow;
pub mod mock;
pub mod platform;
mod production;
pub mod steps;

pub use config::{
    load_config, parse_config, ChainConfig, Config, ConfigError, ConfigFormat, MockStepDelays,
    LOCAL_CHAIN_ID, MOCK_ZK_VERIFIER_ADDRESS, MOCK_ZK_VERIFIER_SIGNER_KEY,
};
pub use encryptor::{EncryptRequest, Encryptor};
pub use error::{EncryptError, EncryptResult, ErrorCode};
pub use mock::{ContractMockVerifier, LocalMockVerifier, MockError, MockVerifier};
pub use platform::Collaborators;
pub use steps::{EncryptStep, StepContext, StepEvent, StepSink};

pub use cofhe_zk::{EncryptableItem, EncryptedItemInput, FheUintType};
