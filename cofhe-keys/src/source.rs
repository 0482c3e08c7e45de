use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{error::FetchError, ArtifactId, ArtifactKind};

/// Network origin of key material.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// `Ok(None)` means the service has no artifact for this chain and zone.
    async fn fetch(&self, id: &ArtifactId) -> Result<Option<Vec<u8>>, FetchError>;
}

#[derive(Serialize)]
struct ZoneRequest {
    security_zone: u8,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "publicKey", default)]
    public_key: Option<String>,
}

#[derive(Deserialize)]
struct CrsResponse {
    #[serde(default)]
    crs: Option<String>,
}

/// Client for the coprocessor key endpoints, one base URL per chain.
#[derive(Clone, Default)]
pub struct HttpKeySource {
    http: Client,
    endpoints: BTreeMap<u64, String>,
}

impl HttpKeySource {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn with_endpoint(mut self, chain_id: u64, coprocessor_url: impl Into<String>) -> Self {
        self.endpoints.insert(chain_id, coprocessor_url.into());
        self
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        security_zone: u8,
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .post(&url)
            .json(&ZoneRequest { security_zone })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

fn decode_blob(encoded: Option<String>) -> Result<Option<Vec<u8>>, FetchError> {
    let Some(encoded) = encoded else {
        return Ok(None);
    };
    let digits = encoded.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(None);
    }
    hex::decode(digits)
        .map(Some)
        .map_err(|err| FetchError::Malformed(err.to_string()))
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self, id: &ArtifactId) -> Result<Option<Vec<u8>>, FetchError> {
        let base = self
            .endpoints
            .get(&id.chain_id)
            .ok_or(FetchError::UnknownChain(id.chain_id))?
            .trim_end_matches('/');
        debug!(artifact = %id, "fetching from key service");
        let encoded = match id.kind {
            ArtifactKind::FheKey => {
                self.post::<PublicKeyResponse>(
                    format!("{base}/GetNetworkPublicKey"),
                    id.security_zone,
                )
                .await?
                .public_key
            }
            ArtifactKind::Crs => {
                self.post::<CrsResponse>(format!("{base}/GetCrs"), id.security_zone)
                    .await?
                    .crs
            }
        };
        decode_blob(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_mean_absent() {
        assert_eq!(decode_blob(None).unwrap(), None);
        assert_eq!(decode_blob(Some("0x".into())).unwrap(), None);
        assert_eq!(decode_blob(Some(String::new())).unwrap(), None);
        assert_eq!(decode_blob(Some("0x0a0b".into())).unwrap(), Some(vec![10, 11]));
        assert!(matches!(
            decode_blob(Some("0xzz".into())),
            Err(FetchError::Malformed(_))
        ));
    }
}
