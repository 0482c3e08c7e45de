use tracing::debug;

use crate::{
    backend::{ZkCrs, ZkListBuilder},
    error::{ZkError, ZkResult},
    types::{EncryptableItem, ProofMetadata},
};

/// Pushes `items` into `builder` in order.
pub fn pack(
    items: &[EncryptableItem],
    mut builder: Box<dyn ZkListBuilder>,
) -> ZkResult<Box<dyn ZkListBuilder>> {
    if items.is_empty() {
        return Err(ZkError::new("no items to pack"));
    }
    for (index, item) in items.iter().enumerate() {
        builder
            .push(item)
            .map_err(|err| ZkError::new(format!("item {index} ({}): {err}", item.utype())))?;
    }
    debug!(items = builder.len(), "packed encryptable items");
    Ok(builder)
}

/// Consumes a packed builder and returns the packed proof bytes.
pub fn prove(
    builder: Box<dyn ZkListBuilder>,
    crs: &dyn ZkCrs,
    metadata: &ProofMetadata,
) -> ZkResult<Vec<u8>> {
    let items = builder.len();
    let proof = builder.build_with_proof_packed(crs, &metadata.to_bytes())?;
    debug!(items, proof_len = proof.len(), "built packed proof");
    Ok(proof)
}
