use thiserror::Error;

/// Failure raised by a native prover capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ZkError(pub String);

impl ZkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ZkResult<T> = Result<T, ZkError>;
