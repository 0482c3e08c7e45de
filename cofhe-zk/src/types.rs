use std::{fmt, str::FromStr};

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encrypted integer type tag carried alongside every ciphertext handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FheUintType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint128,
    Address,
}

impl FheUintType {
    pub const ALL: [FheUintType; 7] = [
        FheUintType::Bool,
        FheUintType::Uint8,
        FheUintType::Uint16,
        FheUintType::Uint32,
        FheUintType::Uint64,
        FheUintType::Uint128,
        FheUintType::Address,
    ];

    /// Wire code used by the coprocessor and the on-chain input structs.
    pub const fn code(self) -> u8 {
        match self {
            FheUintType::Bool => 0,
            FheUintType::Uint8 => 2,
            FheUintType::Uint16 => 3,
            FheUintType::Uint32 => 4,
            FheUintType::Uint64 => 5,
            FheUintType::Uint128 => 6,
            FheUintType::Address => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|utype| utype.code() == code)
    }

    pub const fn bit_width(self) -> u32 {
        match self {
            FheUintType::Bool => 1,
            FheUintType::Uint8 => 8,
            FheUintType::Uint16 => 16,
            FheUintType::Uint32 => 32,
            FheUintType::Uint64 => 64,
            FheUintType::Uint128 => 128,
            FheUintType::Address => 160,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FheUintType::Bool => "bool",
            FheUintType::Uint8 => "uint8",
            FheUintType::Uint16 => "uint16",
            FheUintType::Uint32 => "uint32",
            FheUintType::Uint64 => "uint64",
            FheUintType::Uint128 => "uint128",
            FheUintType::Address => "address",
        }
    }
}

impl fmt::Display for FheUintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext value tagged with the encrypted type it becomes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "utype", content = "data", rename_all = "lowercase")]
pub enum EncryptableItem {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint128(u128),
    Address(Address),
}

impl EncryptableItem {
    pub fn utype(&self) -> FheUintType {
        match self {
            EncryptableItem::Bool(_) => FheUintType::Bool,
            EncryptableItem::Uint8(_) => FheUintType::Uint8,
            EncryptableItem::Uint16(_) => FheUintType::Uint16,
            EncryptableItem::Uint32(_) => FheUintType::Uint32,
            EncryptableItem::Uint64(_) => FheUintType::Uint64,
            EncryptableItem::Uint128(_) => FheUintType::Uint128,
            EncryptableItem::Address(_) => FheUintType::Address,
        }
    }

    /// Plaintext widened to a uint256 word.
    pub fn to_u256(&self) -> U256 {
        match self {
            EncryptableItem::Bool(value) => U256::from(u8::from(*value)),
            EncryptableItem::Uint8(value) => U256::from(*value),
            EncryptableItem::Uint16(value) => U256::from(*value),
            EncryptableItem::Uint32(value) => U256::from(*value),
            EncryptableItem::Uint64(value) => U256::from(*value),
            EncryptableItem::Uint128(value) => U256::from(*value),
            EncryptableItem::Address(value) => U256::from_be_slice(value.as_slice()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseItemError {
    #[error("expected `<utype>:<value>`, got `{0}`")]
    MissingSeparator(String),
    #[error("unknown utype `{0}`")]
    UnknownType(String),
    #[error("value `{value}` does not fit {utype}")]
    InvalidValue { utype: FheUintType, value: String },
}

impl FromStr for EncryptableItem {
    type Err = ParseItemError;

    /// Parses `bool:true`, `uint32:42`, `address:0x…` and friends.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (utype, value) = raw
            .split_once(':')
            .ok_or_else(|| ParseItemError::MissingSeparator(raw.to_owned()))?;
        let utype = FheUintType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(utype.trim()))
            .ok_or_else(|| ParseItemError::UnknownType(utype.to_owned()))?;
        let value = value.trim();
        let invalid = || ParseItemError::InvalidValue {
            utype,
            value: value.to_owned(),
        };
        let item = match utype {
            FheUintType::Bool => EncryptableItem::Bool(value.parse().map_err(|_| invalid())?),
            FheUintType::Uint8 => EncryptableItem::Uint8(value.parse().map_err(|_| invalid())?),
            FheUintType::Uint16 => EncryptableItem::Uint16(value.parse().map_err(|_| invalid())?),
            FheUintType::Uint32 => EncryptableItem::Uint32(value.parse().map_err(|_| invalid())?),
            FheUintType::Uint64 => EncryptableItem::Uint64(value.parse().map_err(|_| invalid())?),
            FheUintType::Uint128 => {
                EncryptableItem::Uint128(value.parse().map_err(|_| invalid())?)
            }
            FheUintType::Address => {
                EncryptableItem::Address(value.parse().map_err(|_| invalid())?)
            }
        };
        Ok(item)
    }
}

/// Public context bound into the proof so it cannot be replayed for another
/// account, zone or chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub account: Address,
    pub security_zone: u8,
    pub chain_id: u64,
}

impl ProofMetadata {
    pub const ENCODED_LEN: usize = 1 + 20 + 32;

    /// `security_zone (1) || account (20) || chain_id as big-endian u256 (32)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.push(self.security_zone);
        out.extend_from_slice(self.account.as_slice());
        out.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        out
    }
}

/// Verified input ready to be passed to a contract call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedItemInput {
    pub ct_hash: U256,
    pub security_zone: u8,
    pub utype: FheUintType,
    pub signature: Bytes,
}
