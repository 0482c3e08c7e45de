//! Local development chain support. The mock verifier takes plaintexts
//! directly, so no key material, packing or proving is involved; the steps
//! only sleep to keep the timeline shape of a real encryption.

use alloy::{
    primitives::{keccak256, Address, Bytes, U256},
    providers::ProviderBuilder,
    signers::{local::PrivateKeySigner, SignerSync},
    sol,
};
use async_trait::async_trait;
use cofhe_zk::{EncryptableItem, EncryptedItemInput, FheUintType, ProofMetadata};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::MockStepDelays,
    error::{EncryptError, EncryptResult, ErrorCode},
    flow::{EncryptFlow, RequestContext},
    steps::{EncryptStep, StepContext},
};

sol! {
    #[sol(rpc)]
    interface IMockZkVerifier {
        function zkVerifyCalcCtHashesPacked(
            uint256[] values,
            uint8[] utypes,
            address user,
            uint8 securityZone,
            uint256 chainId
        ) external view returns (uint256[] ctHashes);

        function insertPackedCtHashes(uint256[] ctHashes, uint256[] values) external;
    }
}

#[derive(Debug, Error)]
pub enum MockError {
    #[error("mock verifier rpc failed: {0}")]
    Rpc(String),
    #[error("mock verifier returned {got} hashes for {expected} values")]
    LengthMismatch { expected: usize, got: usize },
}

/// Stand-in for the coprocessor verifier on the local development chain.
#[async_trait]
pub trait MockVerifier: Send + Sync {
    async fn calc_ct_hashes(
        &self,
        values: &[U256],
        utypes: &[u8],
        account: Address,
        security_zone: u8,
        chain_id: u64,
    ) -> Result<Vec<U256>, MockError>;

    async fn insert_ct_hashes(&self, ct_hashes: &[U256], values: &[U256])
        -> Result<(), MockError>;
}

/// Replaces the low 16 bits of `hash` with `utype << 8 | security_zone`.
pub fn append_ct_hash_metadata(hash: U256, utype: u8, security_zone: u8) -> U256 {
    let metadata = (U256::from(utype & 0x7f) << 8usize) | U256::from(security_zone);
    (hash & !U256::from(0xffffu64)) | metadata
}

/// Handle the mock verifier assigns to one plaintext.
pub fn mock_ct_hash(
    value: U256,
    utype: u8,
    account: Address,
    security_zone: u8,
    chain_id: u64,
    index: usize,
) -> U256 {
    let mut packed = Vec::with_capacity(32 + 1 + 1 + 20 + 32 + 4);
    packed.extend_from_slice(&value.to_be_bytes::<32>());
    packed.push(utype);
    packed.push(security_zone);
    packed.extend_from_slice(account.as_slice());
    packed.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    packed.extend_from_slice(&(index as u32).to_be_bytes());
    let hash = U256::from_be_bytes(keccak256(&packed).0);
    append_ct_hash_metadata(hash, utype, security_zone)
}

/// Signature the mock verifier contract accepts for one input.
pub fn mock_input_signature(
    signer: &PrivateKeySigner,
    ct_hash: U256,
    security_zone: u8,
    utype: FheUintType,
) -> Result<Bytes, alloy::signers::Error> {
    let mut packed = Vec::with_capacity(32 + 4 + 1);
    packed.extend_from_slice(&ct_hash.to_be_bytes::<32>());
    packed.extend_from_slice(&i32::from(security_zone).to_be_bytes());
    packed.push(utype.code());
    let digest = keccak256(&packed);
    let signature = signer.sign_message_sync(digest.as_slice())?;
    Ok(Bytes::from(signature.as_bytes().to_vec()))
}

/// In-process mock verifier with the contract's hashing rules.
#[derive(Default)]
pub struct LocalMockVerifier {
    stored: DashMap<U256, U256>,
}

impl LocalMockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plaintext recorded for `ct_hash`, if any.
    pub fn plaintext(&self, ct_hash: &U256) -> Option<U256> {
        self.stored.get(ct_hash).map(|value| *value)
    }
}

#[async_trait]
impl MockVerifier for LocalMockVerifier {
    async fn calc_ct_hashes(
        &self,
        values: &[U256],
        utypes: &[u8],
        account: Address,
        security_zone: u8,
        chain_id: u64,
    ) -> Result<Vec<U256>, MockError> {
        if values.len() != utypes.len() {
            return Err(MockError::LengthMismatch {
                expected: values.len(),
                got: utypes.len(),
            });
        }
        Ok(values
            .iter()
            .zip(utypes)
            .enumerate()
            .map(|(index, (value, utype))| {
                mock_ct_hash(*value, *utype, account, security_zone, chain_id, index)
            })
            .collect())
    }

    async fn insert_ct_hashes(
        &self,
        ct_hashes: &[U256],
        values: &[U256],
    ) -> Result<(), MockError> {
        for (ct_hash, value) in ct_hashes.iter().zip(values) {
            self.stored.insert(*ct_hash, *value);
        }
        Ok(())
    }
}

/// Talks to the mock verifier contract deployed on the local chain.
pub struct ContractMockVerifier {
    rpc_url: String,
    address: Address,
    signer: PrivateKeySigner,
}

impl ContractMockVerifier {
    pub fn new(rpc_url: impl Into<String>, address: Address, signer: PrivateKeySigner) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            address,
            signer,
        }
    }
}

fn rpc_error(err: impl std::fmt::Display) -> MockError {
    MockError::Rpc(err.to_string())
}

#[async_trait]
impl MockVerifier for ContractMockVerifier {
    async fn calc_ct_hashes(
        &self,
        values: &[U256],
        utypes: &[u8],
        account: Address,
        security_zone: u8,
        chain_id: u64,
    ) -> Result<Vec<U256>, MockError> {
        let provider = ProviderBuilder::new()
            .connect(&self.rpc_url)
            .await
            .map_err(rpc_error)?;
        let contract = IMockZkVerifier::new(self.address, provider);
        let ct_hashes = contract
            .zkVerifyCalcCtHashesPacked(
                values.to_vec(),
                utypes.to_vec(),
                account,
                security_zone,
                U256::from(chain_id),
            )
            .call()
            .await
            .map_err(rpc_error)?;
        if ct_hashes.len() != values.len() {
            return Err(MockError::LengthMismatch {
                expected: values.len(),
                got: ct_hashes.len(),
            });
        }
        Ok(ct_hashes)
    }

    async fn insert_ct_hashes(
        &self,
        ct_hashes: &[U256],
        values: &[U256],
    ) -> Result<(), MockError> {
        let provider = ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect(&self.rpc_url)
            .await
            .map_err(rpc_error)?;
        let contract = IMockZkVerifier::new(self.address, provider);
        let receipt = contract
            .insertPackedCtHashes(ct_hashes.to_vec(), values.to_vec())
            .send()
            .await
            .map_err(rpc_error)?
            .get_receipt()
            .await
            .map_err(rpc_error)?;
        debug!(tx = %receipt.transaction_hash, "inserted mock ct hashes");
        Ok(())
    }
}

/// Plaintexts waiting for the mock verifier.
pub(crate) struct MockPacked {
    values: Vec<U256>,
    utypes: Vec<FheUintType>,
}

pub(crate) struct MockFlow<'a> {
    verifier: &'a dyn MockVerifier,
    signer: &'a PrivateKeySigner,
    delays: MockStepDelays,
}

impl<'a> MockFlow<'a> {
    pub(crate) fn new(
        verifier: &'a dyn MockVerifier,
        signer: &'a PrivateKeySigner,
        delays: MockStepDelays,
    ) -> Self {
        Self {
            verifier,
            signer,
            delays,
        }
    }

    async fn pause(&self, step: EncryptStep) {
        let delay = self.delays.delay(step);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EncryptFlow for MockFlow<'_> {
    type Keys = ();
    type Packed = MockPacked;
    type Proof = MockPacked;

    fn mocked(&self) -> bool {
        true
    }

    async fn init_runtime(&self) -> EncryptResult<StepContext> {
        self.pause(EncryptStep::InitTfhe).await;
        Ok(StepContext::InitTfhe {
            tfhe_initialized: false,
        })
    }

    async fn fetch_keys(&self, _request: &RequestContext) -> EncryptResult<((), StepContext)> {
        self.pause(EncryptStep::FetchKeys).await;
        Ok((
            (),
            StepContext::FetchKeys {
                fhe_key_fetched_from_network: false,
                crs_fetched_from_network: false,
            },
        ))
    }

    async fn pack(
        &self,
        request: &RequestContext,
        _keys: (),
    ) -> EncryptResult<(MockPacked, StepContext)> {
        self.pause(EncryptStep::Pack).await;
        if request.items.is_empty() {
            return Err(EncryptError::new(ErrorCode::ZkPackFailed, "no items to pack"));
        }
        let packed = MockPacked {
            values: request.items.iter().map(EncryptableItem::to_u256).collect(),
            utypes: request.items.iter().map(EncryptableItem::utype).collect(),
        };
        let items = packed.values.len();
        Ok((packed, StepContext::Pack { items }))
    }

    async fn prove(
        &self,
        _request: &RequestContext,
        packed: MockPacked,
    ) -> EncryptResult<(MockPacked, StepContext)> {
        self.pause(EncryptStep::Prove).await;
        Ok((
            packed,
            StepContext::Prove {
                use_worker: false,
                used_worker: false,
                worker_failed_error: None,
            },
        ))
    }

    async fn verify(
        &self,
        request: &RequestContext,
        packed: MockPacked,
    ) -> EncryptResult<(Vec<EncryptedItemInput>, StepContext)> {
        self.pause(EncryptStep::Verify).await;
        let ProofMetadata {
            account,
            security_zone,
            chain_id,
        } = request.metadata;
        let codes: Vec<u8> = packed.utypes.iter().map(|utype| utype.code()).collect();
        let ct_hashes = self
            .verifier
            .calc_ct_hashes(&packed.values, &codes, account, security_zone, chain_id)
            .await
            .map_err(|err| {
                EncryptError::new(ErrorCode::ZkMocksCalcCtHashesFailed, err.to_string())
                    .with_context("chain_id", chain_id)
                    .with_source(err)
            })?;
        self.verifier
            .insert_ct_hashes(&ct_hashes, &packed.values)
            .await
            .map_err(|err| {
                EncryptError::new(ErrorCode::ZkMocksInsertCtHashesFailed, err.to_string())
                    .with_source(err)
            })?;

        let mut inputs = Vec::with_capacity(ct_hashes.len());
        for (ct_hash, utype) in ct_hashes.into_iter().zip(packed.utypes) {
            let signature = mock_input_signature(self.signer, ct_hash, security_zone, utype)
                .map_err(|err| {
                    EncryptError::new(
                        ErrorCode::ZkMocksCreateProofSignatureFailed,
                        err.to_string(),
                    )
                    .with_source(err)
                })?;
            inputs.push(EncryptedItemInput {
                ct_hash,
                security_zone,
                utype,
                signature,
            });
        }
        let items = inputs.len();
        Ok((inputs, StepContext::Verify { items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MOCK_ZK_VERIFIER_SIGNER_KEY;
    use alloy::primitives::Signature;
    use pretty_assertions::assert_eq;

    fn signer() -> PrivateKeySigner {
        MOCK_ZK_VERIFIER_SIGNER_KEY.parse().unwrap()
    }

    #[test]
    fn metadata_occupies_low_bytes() {
        let hash = U256::MAX;
        let tagged = append_ct_hash_metadata(hash, FheUintType::Uint32.code(), 3);
        let bytes = tagged.to_be_bytes::<32>();
        assert_eq!(bytes[30], 4);
        assert_eq!(bytes[31], 3);
        assert!(bytes[..30].iter().all(|byte| *byte == 0xff));
    }

    #[test]
    fn ct_hashes_are_repeatable_and_distinct() {
        let account = Address::repeat_byte(0x11);
        let first = mock_ct_hash(U256::from(42u8), 4, account, 0, 31337, 0);
        assert_eq!(first, mock_ct_hash(U256::from(42u8), 4, account, 0, 31337, 0));
        assert_ne!(first, mock_ct_hash(U256::from(42u8), 4, account, 0, 31337, 1));
        assert_ne!(first, mock_ct_hash(U256::from(42u8), 4, account, 1, 31337, 0));
    }

    #[test]
    fn signature_recovers_mock_signer() {
        let signer = signer();
        let ct_hash = mock_ct_hash(U256::from(1u8), 0, Address::ZERO, 0, 31337, 0);
        let signature = mock_input_signature(&signer, ct_hash, 0, FheUintType::Bool).unwrap();
        assert_eq!(signature.len(), 65);
        assert_eq!(
            signature,
            mock_input_signature(&signer, ct_hash, 0, FheUintType::Bool).unwrap()
        );

        let mut packed = ct_hash.to_be_bytes::<32>().to_vec();
        packed.extend_from_slice(&0i32.to_be_bytes());
        packed.push(FheUintType::Bool.code());
        let digest = keccak256(&packed);
        let recovered = Signature::try_from(signature.as_ref())
            .unwrap()
            .recover_address_from_msg(digest.as_slice())
            .unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn local_verifier_records_plaintexts() {
        let verifier = LocalMockVerifier::new();
        let values = [U256::from(1u8), U256::from(42u8)];
        let hashes = verifier
            .calc_ct_hashes(&values, &[0, 4], Address::ZERO, 0, 31337)
            .await
            .unwrap();
        verifier.insert_ct_hashes(&hashes, &values).await.unwrap();
        assert_eq!(verifier.plaintext(&hashes[1]), Some(U256::from(42u8)));

        let err = verifier
            .calc_ct_hashes(&values, &[0], Address::ZERO, 0, 31337)
            .await
            .unwrap_err();
        assert!(matches!(err, MockError::LengthMismatch { .. }));
    }
}
