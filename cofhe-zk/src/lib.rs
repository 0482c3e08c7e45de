//! Pack, prove and verify stages for FHE encrypted inputs.
//!
//! The native prover is reached only through the capability traits in
//! [`backend`]; [`backends::simulated`] provides a deterministic stand-in.
//!
//! # Quickstart
//! ```
//! use cofhe_zk::{
//!     backends::simulated::SimulatedBackend, pack, prove, EncryptableItem, ProofMetadata,
//!     ZkBuilderGenerator,
//! };
//!
//! let backend = SimulatedBackend::new();
//! let (builder, crs) = backend
//!     .generate(&SimulatedBackend::public_key([1; 32]), &SimulatedBackend::crs([2; 32]))
//!     .unwrap();
//! let items: Vec<EncryptableItem> = vec!["bool:true".parse().unwrap(), "uint32:42".parse().unwrap()];
//! let builder = pack(&items, builder).unwrap();
//! let metadata = ProofMetadata {
//!     account: Default::default(),
//!     security_zone: 0,
//!     chain_id: 42069,
//! };
//! let proof = prove(builder, crs.as_ref(), &metadata).unwrap();
//! assert!(!proof.is_empty());
//! ```

pub mod backend;
pub mod backends;
pub mod error;
pub mod runtime;
pub mod stages;
pub mod types;
pub mod verifier;
pub mod worker;

pub use backend::{
    CrsDeserializer, FheKeyDeserializer, RuntimeInitializer, ZkBuilderGenerator, ZkCrs,
    ZkListBuilder,
};
pub use error::{ZkError, ZkResult};
pub use runtime::OnceRuntime;
pub use stages::{pack, prove};
pub use types::{EncryptableItem, EncryptedItemInput, FheUintType, ParseItemError, ProofMetadata};
pub use verifier::{VerifiedInput, VerifierClient, VerifyError};
pub use worker::{prove_with_fallback, BlockingPoolWorker, ProveJob, ProveOutcome, ProveWorker, WorkerError};
