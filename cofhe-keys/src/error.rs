use std::path::PathBuf;

use thiserror::Error;

use crate::ArtifactId;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("unable to access key store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key store {path} is corrupt: {details}")]
    Corrupt { path: PathBuf, details: String },
    #[error("failed to encode key store: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no coprocessor configured for chain {0}")]
    UnknownChain(u64),
    #[error("key service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("key service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("key service response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key store rehydration failed: {0}")]
    Rehydrate(#[source] KeyStoreError),
    #[error("failed to fetch {id}: {source}")]
    Fetch {
        id: ArtifactId,
        #[source]
        source: FetchError,
    },
    #[error("{0} not found")]
    Missing(ArtifactId),
    #[error("{id} rejected by deserializer: {details}")]
    Invalid { id: ArtifactId, details: String },
    #[error("failed to persist {id}: {source}")]
    Persist {
        id: ArtifactId,
        #[source]
        source: KeyStoreError,
    },
}

impl KeyError {
    pub fn artifact(&self) -> Option<ArtifactId> {
        match self {
            KeyError::Rehydrate(_) => None,
            KeyError::Fetch { id, .. }
            | KeyError::Missing(id)
            | KeyError::Invalid { id, .. }
            | KeyError::Persist { id, .. } => Some(*id),
        }
    }
}
