//! Deterministic stand-in for the native prover. Ciphertexts and proofs are
//! blake3 commitments, so the output is only meaningful to
//! [`SimulatedBackend::open_proof`]. Used by the CLI and tests.

use std::{any::Any, sync::Arc};

use blake3::Hasher;

use crate::{
    backend::{
        CrsDeserializer, FheKeyDeserializer, ZkBuilderGenerator, ZkCrs, ZkListBuilder,
    },
    error::{ZkError, ZkResult},
    types::{EncryptableItem, FheUintType, ProofMetadata},
};

const KEY_MAGIC: &[u8] = b"cofhe-sim-pk";
const CRS_MAGIC: &[u8] = b"cofhe-sim-crs";
const PROOF_MAGIC: &[u8; 8] = b"SIMPROOF";
const SEED_LEN: usize = 32;
const CIPHERTEXT_LEN: usize = 32;

/// Largest number of plaintext bits one proof may cover.
pub const MAX_PACKED_BITS: u32 = 2048;

#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedBackend;

impl SimulatedBackend {
    pub fn new() -> Self {
        Self
    }

    /// Serialized public key the deserializer accepts.
    pub fn public_key(seed: [u8; SEED_LEN]) -> Vec<u8> {
        [KEY_MAGIC, seed.as_slice()].concat()
    }

    /// Serialized CRS the deserializer accepts.
    pub fn crs(seed: [u8; SEED_LEN]) -> Vec<u8> {
        [CRS_MAGIC, seed.as_slice()].concat()
    }

    /// Checks the proof tag against `crs` and returns its public contents.
    pub fn open_proof(proof: &[u8], crs: &[u8]) -> ZkResult<OpenedProof> {
        let crs = SimulatedCrs::parse(crs)?;
        let header = PROOF_MAGIC.len() + 4;
        if proof.len() < header || &proof[..PROOF_MAGIC.len()] != PROOF_MAGIC {
            return Err(ZkError::new("not a simulated proof"));
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&proof[PROOF_MAGIC.len()..header]);
        let count = u32::from_be_bytes(count) as usize;
        let body_len = header + count * (1 + CIPHERTEXT_LEN) + ProofMetadata::ENCODED_LEN;
        if proof.len() != body_len + 32 {
            return Err(ZkError::new(format!(
                "proof length {} does not match {count} items",
                proof.len()
            )));
        }
        let (body, tag) = proof.split_at(body_len);
        if tag != proof_tag(body, &crs.digest).as_slice() {
            return Err(ZkError::new("proof tag mismatch"));
        }

        let mut utypes = Vec::with_capacity(count);
        let mut ciphertexts = Vec::with_capacity(count);
        for chunk in body[header..header + count * (1 + CIPHERTEXT_LEN)].chunks(1 + CIPHERTEXT_LEN)
        {
            let utype = FheUintType::from_code(chunk[0])
                .ok_or_else(|| ZkError::new(format!("unknown utype code {}", chunk[0])))?;
            let mut ciphertext = [0u8; CIPHERTEXT_LEN];
            ciphertext.copy_from_slice(&chunk[1..]);
            utypes.push(utype);
            ciphertexts.push(ciphertext);
        }
        Ok(OpenedProof {
            utypes,
            ciphertexts,
            metadata: body[body_len - ProofMetadata::ENCODED_LEN..].to_vec(),
        })
    }
}

/// Public part of a simulated proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedProof {
    pub utypes: Vec<FheUintType>,
    pub ciphertexts: Vec<[u8; CIPHERTEXT_LEN]>,
    pub metadata: Vec<u8>,
}

fn strip_magic<'a>(bytes: &'a [u8], magic: &[u8], what: &str) -> ZkResult<&'a [u8]> {
    match bytes.strip_prefix(magic) {
        Some(seed) if seed.len() == SEED_LEN => Ok(seed),
        Some(seed) => Err(ZkError::new(format!(
            "{what} seed must be {SEED_LEN} bytes, got {}",
            seed.len()
        ))),
        None => Err(ZkError::new(format!("{what} is not a simulated {what}"))),
    }
}

fn proof_tag(body: &[u8], crs_digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(crs_digest);
    hasher.update(body);
    *hasher.finalize().as_bytes()
}

impl FheKeyDeserializer for SimulatedBackend {
    fn deserialize(&self, bytes: &[u8]) -> ZkResult<()> {
        strip_magic(bytes, KEY_MAGIC, "public key").map(|_| ())
    }
}

impl CrsDeserializer for SimulatedBackend {
    fn deserialize(&self, bytes: &[u8]) -> ZkResult<()> {
        strip_magic(bytes, CRS_MAGIC, "crs").map(|_| ())
    }
}

impl ZkBuilderGenerator for SimulatedBackend {
    fn generate(
        &self,
        fhe_key: &[u8],
        crs: &[u8],
    ) -> ZkResult<(Box<dyn ZkListBuilder>, Arc<dyn ZkCrs>)> {
        let seed = strip_magic(fhe_key, KEY_MAGIC, "public key")?;
        let builder = SimulatedListBuilder {
            key_digest: *blake3::hash(seed).as_bytes(),
            items: Vec::new(),
            bits: 0,
        };
        Ok((Box::new(builder), Arc::new(SimulatedCrs::parse(crs)?)))
    }
}

struct SimulatedCrs {
    digest: [u8; 32],
}

impl SimulatedCrs {
    fn parse(bytes: &[u8]) -> ZkResult<Self> {
        let seed = strip_magic(bytes, CRS_MAGIC, "crs")?;
        Ok(Self {
            digest: *blake3::hash(seed).as_bytes(),
        })
    }
}

impl ZkCrs for SimulatedCrs {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SimulatedListBuilder {
    key_digest: [u8; 32],
    items: Vec<EncryptableItem>,
    bits: u32,
}

impl SimulatedListBuilder {
    fn encrypt(&self, index: usize, item: &EncryptableItem) -> [u8; CIPHERTEXT_LEN] {
        let mut hasher = Hasher::new_keyed(&self.key_digest);
        hasher.update(&(index as u32).to_be_bytes());
        hasher.update(&[item.utype().code()]);
        hasher.update(&item.to_u256().to_be_bytes::<32>());
        *hasher.finalize().as_bytes()
    }
}

impl ZkListBuilder for SimulatedListBuilder {
    fn push(&mut self, item: &EncryptableItem) -> ZkResult<()> {
        let bits = self.bits + item.utype().bit_width();
        if bits > MAX_PACKED_BITS {
            return Err(ZkError::new(format!(
                "packing {} would exceed {MAX_PACKED_BITS} bits",
                item.utype()
            )));
        }
        self.bits = bits;
        self.items.push(item.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn build_with_proof_packed(
        self: Box<Self>,
        crs: &dyn ZkCrs,
        metadata: &[u8],
    ) -> ZkResult<Vec<u8>> {
        let crs = crs
            .as_any()
            .downcast_ref::<SimulatedCrs>()
            .ok_or_else(|| ZkError::new("crs was not produced by the simulated backend"))?;
        if metadata.len() != ProofMetadata::ENCODED_LEN {
            return Err(ZkError::new(format!(
                "metadata must be {} bytes, got {}",
                ProofMetadata::ENCODED_LEN,
                metadata.len()
            )));
        }
        let mut proof = Vec::with_capacity(
            PROOF_MAGIC.len() + 4 + self.items.len() * (1 + CIPHERTEXT_LEN) + metadata.len() + 32,
        );
        proof.extend_from_slice(PROOF_MAGIC);
        proof.extend_from_slice(&(self.items.len() as u32).to_be_bytes());
        for (index, item) in self.items.iter().enumerate() {
            proof.push(item.utype().code());
            proof.extend_from_slice(&self.encrypt(index, item));
        }
        proof.extend_from_slice(metadata);
        let tag = proof_tag(&proof, &crs.digest);
        proof.extend_from_slice(&tag);
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{pack, prove};
    use alloy_primitives::Address;
    use pretty_assertions::assert_eq;

    fn metadata() -> ProofMetadata {
        ProofMetadata {
            account: Address::repeat_byte(0x42),
            security_zone: 0,
            chain_id: 42069,
        }
    }

    #[test]
    fn deserializers_reject_foreign_bytes() {
        let backend = SimulatedBackend::new();
        FheKeyDeserializer::deserialize(&backend, &SimulatedBackend::public_key([1; 32]))
            .unwrap();
        CrsDeserializer::deserialize(&backend, &SimulatedBackend::crs([2; 32])).unwrap();
        assert!(FheKeyDeserializer::deserialize(&backend, b"").is_err());
        assert!(CrsDeserializer::deserialize(&backend, &SimulatedBackend::public_key([1; 32]))
            .is_err());
        assert!(FheKeyDeserializer::deserialize(&backend, b"cofhe-sim-pkshort").is_err());
    }

    #[test]
    fn proof_opens_with_matching_crs() {
        let backend = SimulatedBackend::new();
        let key = SimulatedBackend::public_key([7; 32]);
        let crs = SimulatedBackend::crs([9; 32]);
        let (builder, zk_crs) = backend.generate(&key, &crs).unwrap();
        let items = [EncryptableItem::Bool(true), EncryptableItem::Uint32(42)];
        let builder = pack(&items, builder).unwrap();
        let proof = prove(builder, zk_crs.as_ref(), &metadata()).unwrap();

        let opened = SimulatedBackend::open_proof(&proof, &crs).unwrap();
        assert_eq!(opened.utypes, vec![FheUintType::Bool, FheUintType::Uint32]);
        assert_eq!(opened.metadata, metadata().to_bytes());
        assert!(SimulatedBackend::open_proof(&proof, &SimulatedBackend::crs([8; 32])).is_err());
    }

    #[test]
    fn proofs_are_deterministic() {
        let backend = SimulatedBackend::new();
        let key = SimulatedBackend::public_key([7; 32]);
        let crs = SimulatedBackend::crs([9; 32]);
        let run = || {
            let (builder, zk_crs) = backend.generate(&key, &crs).unwrap();
            let builder = pack(&[EncryptableItem::Uint64(5)], builder).unwrap();
            prove(builder, zk_crs.as_ref(), &metadata()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn caps_packed_bits() {
        let backend = SimulatedBackend::new();
        let (builder, _) = backend
            .generate(
                &SimulatedBackend::public_key([1; 32]),
                &SimulatedBackend::crs([1; 32]),
            )
            .unwrap();
        let items = vec![EncryptableItem::Uint128(1); 17];
        let err = pack(&items, builder).err().unwrap();
        assert!(err.to_string().contains("item 16"));
    }
}
