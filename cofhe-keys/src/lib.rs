//! Public key and CRS cache. Artifacts are keyed by chain and security zone,
//! served from a [`KeyStore`] when present and fetched from the coprocessor
//! key service otherwise.

pub mod cache;
pub mod error;
pub mod source;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cache::{FetchedArtifact, FetchedKeys, KeyCache};
pub use error::{FetchError, KeyError, KeyStoreError};
pub use source::{HttpKeySource, KeySource};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    FheKey,
    Crs,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::FheKey => "fhe-key",
            ArtifactKind::Crs => "crs",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    pub kind: ArtifactKind,
    pub chain_id: u64,
    pub security_zone: u8,
}

impl ArtifactId {
    pub fn fhe_key(chain_id: u64, security_zone: u8) -> Self {
        Self {
            kind: ArtifactKind::FheKey,
            chain_id,
            security_zone,
        }
    }

    pub fn crs(chain_id: u64, security_zone: u8) -> Self {
        Self {
            kind: ArtifactKind::Crs,
            chain_id,
            security_zone,
        }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (chain {}, zone {})",
            self.kind.as_str(),
            self.chain_id,
            self.security_zone
        )
    }
}
