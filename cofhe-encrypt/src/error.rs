use std::{collections::BTreeMap, error::Error as StdError, fmt};

use cofhe_keys::{ArtifactKind, KeyError};
use cofhe_telemetry::TelemetryError;
use serde::Serialize;
use thiserror::Error;

pub type EncryptResult<T> = Result<T, EncryptError>;

/// Stable machine-readable failure codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    MissingFheKeyDeserializer,
    MissingCrsDeserializer,
    MissingZkBuilderGenerator,
    InitTfheFailed,
    KeyStoreRehydrateFailed,
    KeyStorePersistFailed,
    FetchKeysFailed,
    FheKeyNotFound,
    CrsNotFound,
    FheKeyInvalid,
    CrsInvalid,
    AccountUninitialized,
    ChainIdUninitialized,
    ZkPackFailed,
    ZkProveFailed,
    ZkVerifierUrlUninitialized,
    ZkVerifyFailed,
    ZkMocksCalcCtHashesFailed,
    ZkMocksInsertCtHashesFailed,
    ZkMocksCreateProofSignatureFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::MissingFheKeyDeserializer => "MISSING_FHE_KEY_DESERIALIZER",
            ErrorCode::MissingCrsDeserializer => "MISSING_CRS_DESERIALIZER",
            ErrorCode::MissingZkBuilderGenerator => "MISSING_ZK_BUILDER_GENERATOR",
            ErrorCode::InitTfheFailed => "INIT_TFHE_FAILED",
            ErrorCode::KeyStoreRehydrateFailed => "KEY_STORE_REHYDRATE_FAILED",
            ErrorCode::KeyStorePersistFailed => "KEY_STORE_PERSIST_FAILED",
            ErrorCode::FetchKeysFailed => "FETCH_KEYS_FAILED",
            ErrorCode::FheKeyNotFound => "FHE_KEY_NOT_FOUND",
            ErrorCode::CrsNotFound => "CRS_NOT_FOUND",
            ErrorCode::FheKeyInvalid => "FHE_KEY_INVALID",
            ErrorCode::CrsInvalid => "CRS_INVALID",
            ErrorCode::AccountUninitialized => "ACCOUNT_UNINITIALIZED",
            ErrorCode::ChainIdUninitialized => "CHAIN_ID_UNINITIALIZED",
            ErrorCode::ZkPackFailed => "ZK_PACK_FAILED",
            ErrorCode::ZkProveFailed => "ZK_PROVE_FAILED",
            ErrorCode::ZkVerifierUrlUninitialized => "ZK_VERIFIER_URL_UNINITIALIZED",
            ErrorCode::ZkVerifyFailed => "ZK_VERIFY_FAILED",
            ErrorCode::ZkMocksCalcCtHashesFailed => "ZK_MOCKS_CALC_CT_HASHES_FAILED",
            ErrorCode::ZkMocksInsertCtHashesFailed => "ZK_MOCKS_INSERT_CT_HASHES_FAILED",
            ErrorCode::ZkMocksCreateProofSignatureFailed => {
                "ZK_MOCKS_CREATE_PROOF_SIGNATURE_FAILED"
            }
        }
    }

    /// What the caller can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "Report this failure together with its context.",
            ErrorCode::MissingFheKeyDeserializer => {
                "Provide a public key deserializer when constructing the encryptor."
            }
            ErrorCode::MissingCrsDeserializer => {
                "Provide a CRS deserializer when constructing the encryptor."
            }
            ErrorCode::MissingZkBuilderGenerator => {
                "Provide a ZK builder and CRS generator when constructing the encryptor."
            }
            ErrorCode::InitTfheFailed => {
                "Check that the native FHE runtime is available on this platform."
            }
            ErrorCode::KeyStoreRehydrateFailed => {
                "The persisted key store is unreadable; delete it to refetch keys."
            }
            ErrorCode::KeyStorePersistFailed => "Check that the key store path is writable.",
            ErrorCode::FetchKeysFailed => {
                "Check the coprocessor URL for this chain and that the service is reachable."
            }
            ErrorCode::FheKeyNotFound => {
                "The coprocessor has no public key for this chain and security zone."
            }
            ErrorCode::CrsNotFound => "The coprocessor has no CRS for this chain and security zone.",
            ErrorCode::FheKeyInvalid => {
                "The coprocessor returned a public key the deserializer rejected."
            }
            ErrorCode::CrsInvalid => "The coprocessor returned a CRS the deserializer rejected.",
            ErrorCode::AccountUninitialized => {
                "Set an account on the request or as an encryptor default."
            }
            ErrorCode::ChainIdUninitialized => {
                "Set a chain id on the request or as an encryptor default."
            }
            ErrorCode::ZkPackFailed => {
                "Check that the items fit the proof capacity and the keys match the chain."
            }
            ErrorCode::ZkProveFailed => "Retry; if it persists the key material may be corrupt.",
            ErrorCode::ZkVerifierUrlUninitialized => {
                "Configure a verifier URL for this chain."
            }
            ErrorCode::ZkVerifyFailed => {
                "The verifier rejected the proof or was unreachable; check the verifier URL."
            }
            ErrorCode::ZkMocksCalcCtHashesFailed => {
                "Check that the mock verifier contract is deployed on the local chain."
            }
            ErrorCode::ZkMocksInsertCtHashesFailed => {
                "Check that the mock verifier contract accepts writes from the mock signer."
            }
            ErrorCode::ZkMocksCreateProofSignatureFailed => {
                "Check the configured mock signer key."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type surfaced by [`crate::Encryptor`].
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct EncryptError {
    pub code: ErrorCode,
    pub message: String,
    pub hint: String,
    pub context: BTreeMap<String, String>,
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl EncryptError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: code.hint().to_owned(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<KeyError> for EncryptError {
    fn from(err: KeyError) -> Self {
        let code = match &err {
            KeyError::Rehydrate(_) => ErrorCode::KeyStoreRehydrateFailed,
            KeyError::Fetch { .. } => ErrorCode::FetchKeysFailed,
            KeyError::Missing(id) => match id.kind {
                ArtifactKind::FheKey => ErrorCode::FheKeyNotFound,
                ArtifactKind::Crs => ErrorCode::CrsNotFound,
            },
            KeyError::Invalid { id, .. } => match id.kind {
                ArtifactKind::FheKey => ErrorCode::FheKeyInvalid,
                ArtifactKind::Crs => ErrorCode::CrsInvalid,
            },
            KeyError::Persist { .. } => ErrorCode::KeyStorePersistFailed,
        };
        let mut error = EncryptError::new(code, err.to_string());
        if let Some(id) = err.artifact() {
            error = error
                .with_context("artifact", id.kind.as_str())
                .with_context("chain_id", id.chain_id)
                .with_context("security_zone", id.security_zone);
        }
        error.with_source(err)
    }
}

impl From<TelemetryError> for EncryptError {
    fn from(err: TelemetryError) -> Self {
        EncryptError::new(ErrorCode::InternalError, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofhe_keys::ArtifactId;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_have_stable_strings() {
        assert_eq!(
            ErrorCode::MissingCrsDeserializer.as_str(),
            "MISSING_CRS_DESERIALIZER"
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::ZkMocksCalcCtHashesFailed).unwrap(),
            "\"ZK_MOCKS_CALC_CT_HASHES_FAILED\""
        );
    }

    #[test]
    fn missing_artifacts_map_to_distinct_codes() {
        let key: EncryptError = KeyError::Missing(ArtifactId::fhe_key(42069, 1)).into();
        let crs: EncryptError = KeyError::Missing(ArtifactId::crs(42069, 1)).into();
        assert_eq!(key.code(), ErrorCode::FheKeyNotFound);
        assert_eq!(crs.code(), ErrorCode::CrsNotFound);
        assert_eq!(crs.context["chain_id"], "42069");
        assert_eq!(crs.context["security_zone"], "1");
        assert!(crs.source.is_some());
    }

    #[test]
    fn display_leads_with_code() {
        let err = EncryptError::new(ErrorCode::AccountUninitialized, "no account")
            .with_context("step", "verify");
        assert_eq!(err.to_string(), "ACCOUNT_UNINITIALIZED: no account");
        assert_eq!(err.hint, ErrorCode::AccountUninitialized.hint());
    }
}
