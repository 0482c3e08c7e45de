use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    backend::{ZkBuilderGenerator, ZkCrs, ZkListBuilder},
    error::{ZkError, ZkResult},
    stages::{pack, prove},
    types::{EncryptableItem, ProofMetadata},
};

/// Everything a worker needs to pack and prove on its own.
#[derive(Clone, Debug)]
pub struct ProveJob {
    pub fhe_key: Arc<[u8]>,
    pub crs: Arc<[u8]>,
    pub items: Vec<EncryptableItem>,
    pub metadata: ProofMetadata,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker prover failed: {0}")]
    Prover(#[from] ZkError),
    #[error("worker crashed: {0}")]
    Crashed(String),
    #[error("worker unavailable: {0}")]
    Unavailable(String),
}

/// Runs Pack and Prove away from the calling task.
#[async_trait]
pub trait ProveWorker: Send + Sync {
    async fn prove(&self, job: ProveJob) -> Result<Vec<u8>, WorkerError>;
}

/// Worker backed by the tokio blocking pool.
pub struct BlockingPoolWorker {
    generator: Arc<dyn ZkBuilderGenerator>,
}

impl BlockingPoolWorker {
    pub fn new(generator: Arc<dyn ZkBuilderGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ProveWorker for BlockingPoolWorker {
    async fn prove(&self, job: ProveJob) -> Result<Vec<u8>, WorkerError> {
        let generator = self.generator.clone();
        let proof = tokio::task::spawn_blocking(move || -> ZkResult<Vec<u8>> {
            let (builder, crs) = generator.generate(&job.fhe_key, &job.crs)?;
            let builder = pack(&job.items, builder)?;
            prove(builder, crs.as_ref(), &job.metadata)
        })
        .await
        .map_err(|err| WorkerError::Crashed(err.to_string()))??;
        Ok(proof)
    }
}

/// How the Prove step actually ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProveOutcome {
    pub proof: Vec<u8>,
    pub use_worker: bool,
    pub used_worker: bool,
    pub worker_failed_error: Option<String>,
}

/// Proves on `worker` when enabled, falling back to the already packed
/// `builder` on the calling thread if the worker fails. Only a failure of the
/// local prove is returned as an error.
pub async fn prove_with_fallback<J>(
    worker: Option<&dyn ProveWorker>,
    use_worker: bool,
    job: J,
    builder: Box<dyn ZkListBuilder>,
    crs: &dyn ZkCrs,
    metadata: &ProofMetadata,
) -> ZkResult<ProveOutcome>
where
    J: FnOnce() -> ProveJob + Send,
{
    let mut worker_failed_error = None;
    if let (true, Some(worker)) = (use_worker, worker) {
        match worker.prove(job()).await {
            Ok(proof) => {
                debug!(proof_len = proof.len(), "worker produced proof");
                return Ok(ProveOutcome {
                    proof,
                    use_worker,
                    used_worker: true,
                    worker_failed_error: None,
                });
            }
            Err(err) => {
                warn!(error = %err, "worker prove failed, proving on calling thread");
                worker_failed_error = Some(err.to_string());
            }
        }
    }
    let proof = prove(builder, crs, metadata)?;
    Ok(ProveOutcome {
        proof,
        use_worker,
        used_worker: false,
        worker_failed_error,
    })
}
