use alloy_primitives::{Bytes, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::ProofMetadata;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("verifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("verifier rejected proof: {0}")]
    Rejected(String),
    #[error("verifier response malformed: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct VerifyRequest {
    packed_list: String,
    account_addr: String,
    security_zone: u8,
    chain_id: u64,
}

#[derive(Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    data: Vec<VerifiedItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct VerifiedItem {
    ct_hash: String,
    signature: String,
    #[serde(default)]
    recid: Option<u8>,
}

/// Ciphertext handle and coprocessor signature for one verified item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedInput {
    pub ct_hash: U256,
    pub signature: Bytes,
}

/// HTTP client for the coprocessor proof verifier.
#[derive(Clone, Default)]
pub struct VerifierClient {
    http: Client,
}

impl VerifierClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Submits `proof` to `{verifier_url}/verify`. Returns one entry per
    /// proven item in order.
    pub async fn verify(
        &self,
        verifier_url: &str,
        proof: &[u8],
        metadata: &ProofMetadata,
    ) -> Result<Vec<VerifiedInput>, VerifyError> {
        let url = format!("{}/verify", verifier_url.trim_end_matches('/'));
        let request = VerifyRequest {
            packed_list: format!("0x{}", hex::encode(proof)),
            account_addr: metadata.account.to_checksum(None),
            security_zone: metadata.security_zone,
            chain_id: metadata.chain_id,
        };
        debug!(%url, proof_len = proof.len(), "submitting proof to verifier");
        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: VerifyResponse = response.json().await?;
        if body.status != "success" {
            return Err(VerifyError::Rejected(
                body.error.unwrap_or_else(|| format!("status `{}`", body.status)),
            ));
        }
        body.data.into_iter().map(decode_item).collect()
    }
}

fn decode_item(item: VerifiedItem) -> Result<VerifiedInput, VerifyError> {
    let ct_hash = item
        .ct_hash
        .parse::<U256>()
        .map_err(|err| VerifyError::Malformed(format!("ct_hash `{}`: {err}", item.ct_hash)))?;
    let mut signature = hex::decode(item.signature.trim_start_matches("0x"))
        .map_err(|err| VerifyError::Malformed(format!("signature: {err}")))?;
    if signature.is_empty() {
        return Err(VerifyError::Malformed("empty signature".into()));
    }
    if let Some(recid) = item.recid {
        if recid > 3 {
            return Err(VerifyError::Malformed(format!("recovery id {recid}")));
        }
        signature.push(recid + 27);
    }
    Ok(VerifiedInput {
        ct_hash,
        signature: signature.into(),
    })
}
