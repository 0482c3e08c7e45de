use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::KeyError,
    source::KeySource,
    store::{KeyStore, MemoryKeyStore},
    ArtifactId, ArtifactKind,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub bytes: Arc<[u8]>,
    pub fetched_from_network: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedKeys {
    pub fhe_key: FetchedArtifact,
    pub crs: FetchedArtifact,
}

/// Store-first resolution of key material. Concurrent misses for the same
/// artifact share one network fetch.
pub struct KeyCache {
    store: Arc<dyn KeyStore>,
    source: Arc<dyn KeySource>,
    inflight: DashMap<ArtifactId, Arc<Mutex<()>>>,
}

impl KeyCache {
    pub fn new(store: Arc<dyn KeyStore>, source: Arc<dyn KeySource>) -> Self {
        Self {
            store,
            source,
            inflight: DashMap::new(),
        }
    }

    pub fn in_memory(source: Arc<dyn KeySource>) -> Self {
        Self::new(Arc::new(MemoryKeyStore::new()), source)
    }

    /// Resolves the public key and CRS for `(chain_id, security_zone)`.
    /// `validate` sees every artifact that comes off the network before it is
    /// stored.
    pub async fn fetch_keys<V>(
        &self,
        chain_id: u64,
        security_zone: u8,
        validate: V,
    ) -> Result<FetchedKeys, KeyError>
    where
        V: Fn(ArtifactKind, &[u8]) -> Result<(), String> + Sync,
    {
        self.store.rehydrate().await.map_err(KeyError::Rehydrate)?;
        let (fhe_key, crs) = tokio::join!(
            self.resolve(ArtifactId::fhe_key(chain_id, security_zone), &validate),
            self.resolve(ArtifactId::crs(chain_id, security_zone), &validate),
        );
        Ok(FetchedKeys {
            fhe_key: fhe_key?,
            crs: crs?,
        })
    }

    async fn resolve<V>(&self, id: ArtifactId, validate: &V) -> Result<FetchedArtifact, KeyError>
    where
        V: Fn(ArtifactKind, &[u8]) -> Result<(), String> + Sync,
    {
        if let Some(bytes) = self.store.get(&id) {
            return Ok(cached(bytes));
        }
        let gate = self.inflight.entry(id).or_default().clone();
        let _fetching = gate.lock().await;
        if let Some(bytes) = self.store.get(&id) {
            debug!(artifact = %id, "resolved by concurrent fetch");
            return Ok(cached(bytes));
        }

        let bytes = self
            .source
            .fetch(&id)
            .await
            .map_err(|source| KeyError::Fetch { id, source })?
            .filter(|bytes| !bytes.is_empty())
            .ok_or(KeyError::Missing(id))?;
        validate(id.kind, &bytes).map_err(|details| KeyError::Invalid { id, details })?;
        let bytes: Arc<[u8]> = bytes.into();
        self.store
            .put(id, bytes.clone())
            .await
            .map_err(|source| KeyError::Persist { id, source })?;
        info!(artifact = %id, len = bytes.len(), "fetched from key service");
        Ok(FetchedArtifact {
            bytes,
            fetched_from_network: true,
        })
    }
}

fn cached(bytes: Arc<[u8]>) -> FetchedArtifact {
    FetchedArtifact {
        bytes,
        fetched_from_network: false,
    }
}
