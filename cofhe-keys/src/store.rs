use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::KeyStoreError, ArtifactId, ArtifactKind};

/// Persistent home for fetched key material.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Loads persisted artifacts. Must be called before the first `get`.
    async fn rehydrate(&self) -> Result<(), KeyStoreError>;

    fn get(&self, id: &ArtifactId) -> Option<Arc<[u8]>>;

    async fn put(&self, id: ArtifactId, bytes: Arc<[u8]>) -> Result<(), KeyStoreError>;
}

/// Process-local store; contents live as long as the store.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<BTreeMap<ArtifactId, Arc<[u8]>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn rehydrate(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }

    fn get(&self, id: &ArtifactId) -> Option<Arc<[u8]>> {
        self.entries.read().get(id).cloned()
    }

    async fn put(&self, id: ArtifactId, bytes: Arc<[u8]>) -> Result<(), KeyStoreError> {
        self.entries.write().insert(id, bytes);
        Ok(())
    }
}

type ZoneMap = BTreeMap<String, BTreeMap<String, String>>;

/// On-disk layout: `{ "fhe-key": { "<chain>": { "<zone>": "0x…" } }, "crs": { … } }`.
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct StoreDocument {
    #[serde(default)]
    fhe_key: ZoneMap,
    #[serde(default)]
    crs: ZoneMap,
}

/// JSON file store. A missing file is an empty store; an unreadable or
/// unparsable one fails rehydration.
pub struct FileKeyStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<ArtifactId, Arc<[u8]>>>,
    loaded: tokio::sync::Mutex<bool>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(BTreeMap::new()),
            loaded: tokio::sync::Mutex::new(false),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, details: impl Into<String>) -> KeyStoreError {
        KeyStoreError::Corrupt {
            path: self.path.clone(),
            details: details.into(),
        }
    }

    fn io(&self, source: std::io::Error) -> KeyStoreError {
        KeyStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn decode(&self, document: StoreDocument) -> Result<BTreeMap<ArtifactId, Arc<[u8]>>, KeyStoreError> {
        let mut entries = BTreeMap::new();
        for (kind, zones) in [
            (ArtifactKind::FheKey, document.fhe_key),
            (ArtifactKind::Crs, document.crs),
        ] {
            for (chain, by_zone) in zones {
                let chain_id = chain
                    .parse::<u64>()
                    .map_err(|_| self.corrupt(format!("chain id `{chain}`")))?;
                for (zone, encoded) in by_zone {
                    let security_zone = zone
                        .parse::<u8>()
                        .map_err(|_| self.corrupt(format!("security zone `{zone}`")))?;
                    let bytes = hex::decode(encoded.trim_start_matches("0x")).map_err(|err| {
                        self.corrupt(format!("{} for chain {chain} zone {zone}: {err}", kind.as_str()))
                    })?;
                    let id = ArtifactId {
                        kind,
                        chain_id,
                        security_zone,
                    };
                    entries.insert(id, Arc::from(bytes));
                }
            }
        }
        Ok(entries)
    }

    fn encode(entries: &BTreeMap<ArtifactId, Arc<[u8]>>) -> StoreDocument {
        let mut document = StoreDocument::default();
        for (id, bytes) in entries {
            let zones = match id.kind {
                ArtifactKind::FheKey => &mut document.fhe_key,
                ArtifactKind::Crs => &mut document.crs,
            };
            zones
                .entry(id.chain_id.to_string())
                .or_default()
                .insert(id.security_zone.to_string(), format!("0x{}", hex::encode(bytes)));
        }
        document
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn rehydrate(&self) -> Result<(), KeyStoreError> {
        let mut loaded = self.loaded.lock().await;
        if *loaded {
            return Ok(());
        }
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "key store file absent, starting empty");
                *loaded = true;
                return Ok(());
            }
            Err(err) => return Err(self.io(err)),
        };
        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|err| self.corrupt(err.to_string()))?;
        // Derived struct visitors also accept arrays, which would read as empty.
        if !value.is_object() {
            return Err(self.corrupt("top level is not a JSON object"));
        }
        let document: StoreDocument =
            serde_json::from_value(value).map_err(|err| self.corrupt(err.to_string()))?;
        let entries = self.decode(document)?;
        debug!(path = %self.path.display(), artifacts = entries.len(), "key store rehydrated");
        self.entries.write().extend(entries);
        *loaded = true;
        Ok(())
    }

    fn get(&self, id: &ArtifactId) -> Option<Arc<[u8]>> {
        self.entries.read().get(id).cloned()
    }

    async fn put(&self, id: ArtifactId, bytes: Arc<[u8]>) -> Result<(), KeyStoreError> {
        let _writer = self.write_lock.lock().await;
        let mut staged = self.entries.read().clone();
        staged.insert(id, bytes.clone());
        let encoded = serde_json::to_vec_pretty(&Self::encode(&staged))?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io(err))?;
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, encoded)
            .await
            .map_err(|err| self.io(err))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| self.io(err))?;
        // Only artifacts that reached disk become visible.
        self.entries.write().insert(id, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("cofhe-keys.json");
        let store = FileKeyStore::new(&path);
        store.rehydrate().await.unwrap();
        assert_eq!(store.get(&ArtifactId::crs(1, 0)), None);
        store
            .put(ArtifactId::fhe_key(42069, 0), Arc::from(vec![1u8, 2, 3]))
            .await
            .unwrap();
        store
            .put(ArtifactId::crs(42069, 0), Arc::from(vec![9u8]))
            .await
            .unwrap();

        let reopened = FileKeyStore::new(&path);
        reopened.rehydrate().await.unwrap();
        assert_eq!(
            reopened.get(&ArtifactId::fhe_key(42069, 0)).as_deref(),
            Some(&[1u8, 2, 3][..])
        );
        assert_eq!(
            reopened.get(&ArtifactId::crs(42069, 0)).as_deref(),
            Some(&[9u8][..])
        );
        assert_eq!(reopened.get(&ArtifactId::crs(42069, 1)), None);
    }

    #[tokio::test]
    async fn corrupt_file_fails_rehydration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cofhe-keys.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileKeyStore::new(&path).rehydrate().await.unwrap_err();
        assert!(matches!(err, KeyStoreError::Corrupt { .. }));

        std::fs::write(&path, r#"{"crs": {"mainnet": {"0": "0x00"}}}"#).unwrap();
        let err = FileKeyStore::new(&path).rehydrate().await.unwrap_err();
        assert!(err.to_string().contains("chain id `mainnet`"));
    }

    #[tokio::test]
    async fn wrong_shaped_file_fails_rehydration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cofhe-keys.json");
        for contents in ["[]", "42", r#""keys""#, r#"{"fhe_key": {"1": {"0": "0x00"}}}"#] {
            std::fs::write(&path, contents).unwrap();
            let err = FileKeyStore::new(&path).rehydrate().await.unwrap_err();
            assert!(
                matches!(err, KeyStoreError::Corrupt { .. }),
                "{contents} should be corrupt, got {err}"
            );
        }
    }

    #[tokio::test]
    async fn failed_persist_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cofhe-keys.json");
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        let store = FileKeyStore::new(&path);
        store.rehydrate().await.unwrap();

        let err = store
            .put(ArtifactId::fhe_key(1, 0), Arc::from(vec![1u8]))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::Io { .. }));
        assert_eq!(store.get(&ArtifactId::fhe_key(1, 0)), None);
        assert!(!path.exists());

        std::fs::remove_dir(path.with_extension("tmp")).unwrap();
        store
            .put(ArtifactId::fhe_key(1, 0), Arc::from(vec![1u8]))
            .await
            .unwrap();
        assert_eq!(
            store.get(&ArtifactId::fhe_key(1, 0)).as_deref(),
            Some(&[1u8][..])
        );
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryKeyStore::new();
        store.rehydrate().await.unwrap();
        assert!(store.is_empty());
        store
            .put(ArtifactId::crs(5, 1), Arc::from(vec![7u8; 4]))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&ArtifactId::fhe_key(5, 1)), None);
    }
}
