//! Capabilities the native prover exposes to the pipeline. The platform hands
//! implementations to the encryptor once, at construction.

use std::{any::Any, sync::Arc};

use crate::{error::ZkResult, types::EncryptableItem};

/// Validates a serialized compact public key.
pub trait FheKeyDeserializer: Send + Sync {
    fn deserialize(&self, bytes: &[u8]) -> ZkResult<()>;
}

/// Validates a serialized compact PKE CRS.
pub trait CrsDeserializer: Send + Sync {
    fn deserialize(&self, bytes: &[u8]) -> ZkResult<()>;
}

/// Public parameters for one proof. Backends downcast to their own type.
pub trait ZkCrs: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Single-use list of plaintexts waiting to be encrypted and proven.
pub trait ZkListBuilder: Send {
    fn push(&mut self, item: &EncryptableItem) -> ZkResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encrypts the pushed items and produces one packed proof for the batch.
    fn build_with_proof_packed(self: Box<Self>, crs: &dyn ZkCrs, metadata: &[u8])
        -> ZkResult<Vec<u8>>;
}

/// Builds a fresh list builder and CRS handle from raw key material.
pub trait ZkBuilderGenerator: Send + Sync {
    fn generate(
        &self,
        fhe_key: &[u8],
        crs: &[u8],
    ) -> ZkResult<(Box<dyn ZkListBuilder>, Arc<dyn ZkCrs>)>;
}

/// Lazily prepares the native runtime.
pub trait RuntimeInitializer: Send + Sync {
    /// Returns `true` only for the call that actually performed initialization.
    fn init(&self) -> ZkResult<bool>;
}
