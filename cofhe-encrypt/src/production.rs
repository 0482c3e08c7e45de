use std::sync::Arc;

use async_trait::async_trait;
use cofhe_keys::{ArtifactKind, FetchedKeys, KeyCache};
use cofhe_telemetry::{names, TelemetryHandle};
use cofhe_zk::{
    pack, prove_with_fallback, EncryptedItemInput, ProveJob, VerifierClient, ZkCrs,
    ZkListBuilder,
};
use crate::{
    error::{EncryptError, EncryptResult, ErrorCode},
    flow::{EncryptFlow, RequestContext},
    platform::Platform,
    steps::StepContext,
};

/// Packed builder plus what a worker would need to redo the work.
pub(crate) struct PackedList {
    builder: Box<dyn ZkListBuilder>,
    crs: Arc<dyn ZkCrs>,
    keys: FetchedKeys,
}

pub(crate) struct ProductionFlow<'a> {
    platform: &'a Platform,
    keys: &'a KeyCache,
    verifier: &'a VerifierClient,
    verifier_url: Option<&'a str>,
    telemetry: &'a TelemetryHandle,
}

impl<'a> ProductionFlow<'a> {
    pub(crate) fn new(
        platform: &'a Platform,
        keys: &'a KeyCache,
        verifier: &'a VerifierClient,
        verifier_url: Option<&'a str>,
        telemetry: &'a TelemetryHandle,
    ) -> Self {
        Self {
            platform,
            keys,
            verifier,
            verifier_url,
            telemetry,
        }
    }
}

#[async_trait]
impl EncryptFlow for ProductionFlow<'_> {
    type Keys = FetchedKeys;
    type Packed = PackedList;
    type Proof = Vec<u8>;

    fn mocked(&self) -> bool {
        false
    }

    async fn init_runtime(&self) -> EncryptResult<StepContext> {
        let tfhe_initialized = match &self.platform.runtime {
            Some(runtime) => runtime.init().map_err(|err| {
                EncryptError::new(ErrorCode::InitTfheFailed, err.to_string()).with_source(err)
            })?,
            None => false,
        };
        Ok(StepContext::InitTfhe { tfhe_initialized })
    }

    async fn fetch_keys(
        &self,
        request: &RequestContext,
    ) -> EncryptResult<(FetchedKeys, StepContext)> {
        let metadata = &request.metadata;
        let platform = self.platform;
        let keys = self
            .keys
            .fetch_keys(metadata.chain_id, metadata.security_zone, |kind, bytes| {
                match kind {
                    ArtifactKind::FheKey => platform.fhe_key_deserializer.deserialize(bytes),
                    ArtifactKind::Crs => platform.crs_deserializer.deserialize(bytes),
                }
                .map_err(|err| err.to_string())
            })
            .await?;

        for artifact in [&keys.fhe_key, &keys.crs] {
            let counter = if artifact.fetched_from_network {
                names::KEY_NETWORK_FETCHES
            } else {
                names::KEY_CACHE_HITS
            };
            self.telemetry.record_counter(counter, 1)?;
        }
        let context = StepContext::FetchKeys {
            fhe_key_fetched_from_network: keys.fhe_key.fetched_from_network,
            crs_fetched_from_network: keys.crs.fetched_from_network,
        };
        Ok((keys, context))
    }

    async fn pack(
        &self,
        request: &RequestContext,
        keys: FetchedKeys,
    ) -> EncryptResult<(PackedList, StepContext)> {
        let pack_failed = |err: cofhe_zk::ZkError| {
            EncryptError::new(ErrorCode::ZkPackFailed, err.to_string())
                .with_context("items", request.items.len())
                .with_source(err)
        };
        let (builder, crs) = self
            .platform
            .builder_generator
            .generate(&keys.fhe_key.bytes, &keys.crs.bytes)
            .map_err(pack_failed)?;
        let builder = pack(&request.items, builder).map_err(pack_failed)?;
        let items = builder.len();
        Ok((PackedList { builder, crs, keys }, StepContext::Pack { items }))
    }

    async fn prove(
        &self,
        request: &RequestContext,
        packed: PackedList,
    ) -> EncryptResult<(Vec<u8>, StepContext)> {
        let PackedList { builder, crs, keys } = packed;
        let outcome = prove_with_fallback(
            self.platform.worker.as_deref(),
            request.use_worker,
            || ProveJob {
                fhe_key: keys.fhe_key.bytes.clone(),
                crs: keys.crs.bytes.clone(),
                items: request.items.clone(),
                metadata: request.metadata,
            },
            builder,
            crs.as_ref(),
            &request.metadata,
        )
        .await
        .map_err(|err| {
            EncryptError::new(ErrorCode::ZkProveFailed, err.to_string()).with_source(err)
        })?;

        if outcome.worker_failed_error.is_some() {
            self.telemetry.record_counter(names::WORKER_FALLBACKS, 1)?;
        }
        let context = StepContext::Prove {
            use_worker: outcome.use_worker,
            used_worker: outcome.used_worker,
            worker_failed_error: outcome.worker_failed_error,
        };
        Ok((outcome.proof, context))
    }

    async fn verify(
        &self,
        request: &RequestContext,
        proof: Vec<u8>,
    ) -> EncryptResult<(Vec<EncryptedItemInput>, StepContext)> {
        let metadata = &request.metadata;
        let verifier_url = self.verifier_url.ok_or_else(|| {
            EncryptError::new(
                ErrorCode::ZkVerifierUrlUninitialized,
                format!("no verifier url configured for chain {}", metadata.chain_id),
            )
            .with_context("chain_id", metadata.chain_id)
        })?;
        let verified = self
            .verifier
            .verify(verifier_url, &proof, metadata)
            .await
            .map_err(|err| {
                EncryptError::new(ErrorCode::ZkVerifyFailed, err.to_string())
                    .with_context("verifier_url", verifier_url)
                    .with_source(err)
            })?;
        if verified.len() != request.items.len() {
            return Err(EncryptError::new(
                ErrorCode::ZkVerifyFailed,
                format!(
                    "verifier returned {} items for {} inputs",
                    verified.len(),
                    request.items.len()
                ),
            )
            .with_context("verifier_url", verifier_url));
        }

        let inputs: Vec<EncryptedItemInput> = verified
            .into_iter()
            .zip(&request.items)
            .map(|(verified, item)| EncryptedItemInput {
                ct_hash: verified.ct_hash,
                security_zone: metadata.security_zone,
                utype: item.utype(),
                signature: verified.signature,
            })
            .collect();
        let items = inputs.len();
        Ok((inputs, StepContext::Verify { items }))
    }
}
