use std::sync::Arc;

use cofhe_keys::{KeySource, KeyStore};
use cofhe_zk::{
    backends::simulated::SimulatedBackend, BlockingPoolWorker, CrsDeserializer,
    FheKeyDeserializer, OnceRuntime, ProveWorker, RuntimeInitializer, ZkBuilderGenerator,
};

use crate::{
    error::{EncryptError, EncryptResult, ErrorCode},
    mock::MockVerifier,
};

/// Platform-provided pieces the encryptor is built from. The deserializers
/// and the builder generator are required; everything else falls back to a
/// default derived from the configuration.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub fhe_key_deserializer: Option<Arc<dyn FheKeyDeserializer>>,
    pub crs_deserializer: Option<Arc<dyn CrsDeserializer>>,
    pub builder_generator: Option<Arc<dyn ZkBuilderGenerator>>,
    pub runtime: Option<Arc<dyn RuntimeInitializer>>,
    pub worker: Option<Arc<dyn ProveWorker>>,
    pub key_store: Option<Arc<dyn KeyStore>>,
    pub key_source: Option<Arc<dyn KeySource>>,
    pub mock_verifier: Option<Arc<dyn MockVerifier>>,
}

impl Collaborators {
    /// Simulated prover for every native capability, with a blocking-pool
    /// worker proving on the same backend.
    pub fn simulated() -> Self {
        let backend = Arc::new(SimulatedBackend::new());
        Self::default()
            .with_fhe_key_deserializer(backend.clone())
            .with_crs_deserializer(backend.clone())
            .with_builder_generator(backend.clone())
            .with_runtime(Arc::new(OnceRuntime::noop()))
            .with_worker(Arc::new(BlockingPoolWorker::new(backend)))
    }

    pub fn with_fhe_key_deserializer(mut self, deserializer: Arc<dyn FheKeyDeserializer>) -> Self {
        self.fhe_key_deserializer = Some(deserializer);
        self
    }

    pub fn with_crs_deserializer(mut self, deserializer: Arc<dyn CrsDeserializer>) -> Self {
        self.crs_deserializer = Some(deserializer);
        self
    }

    pub fn with_builder_generator(mut self, generator: Arc<dyn ZkBuilderGenerator>) -> Self {
        self.builder_generator = Some(generator);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeInitializer>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_worker(mut self, worker: Arc<dyn ProveWorker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    pub fn with_key_source(mut self, source: Arc<dyn KeySource>) -> Self {
        self.key_source = Some(source);
        self
    }

    pub fn with_mock_verifier(mut self, verifier: Arc<dyn MockVerifier>) -> Self {
        self.mock_verifier = Some(verifier);
        self
    }

    pub(crate) fn resolve(self) -> EncryptResult<(Platform, Services)> {
        let fhe_key_deserializer = self.fhe_key_deserializer.ok_or_else(|| {
            EncryptError::new(
                ErrorCode::MissingFheKeyDeserializer,
                "no public key deserializer was provided",
            )
        })?;
        let crs_deserializer = self.crs_deserializer.ok_or_else(|| {
            EncryptError::new(
                ErrorCode::MissingCrsDeserializer,
                "no CRS deserializer was provided",
            )
        })?;
        let builder_generator = self.builder_generator.ok_or_else(|| {
            EncryptError::new(
                ErrorCode::MissingZkBuilderGenerator,
                "no ZK builder and CRS generator was provided",
            )
        })?;
        let platform = Platform {
            fhe_key_deserializer,
            crs_deserializer,
            builder_generator,
            runtime: self.runtime,
            worker: self.worker,
        };
        let services = Services {
            key_store: self.key_store,
            key_source: self.key_source,
            mock_verifier: self.mock_verifier,
        };
        Ok((platform, services))
    }
}

/// Native capabilities after construction-time validation.
pub(crate) struct Platform {
    pub(crate) fhe_key_deserializer: Arc<dyn FheKeyDeserializer>,
    pub(crate) crs_deserializer: Arc<dyn CrsDeserializer>,
    pub(crate) builder_generator: Arc<dyn ZkBuilderGenerator>,
    pub(crate) runtime: Option<Arc<dyn RuntimeInitializer>>,
    pub(crate) worker: Option<Arc<dyn ProveWorker>>,
}

/// Optional overrides for the configuration-derived services.
pub(crate) struct Services {
    pub(crate) key_store: Option<Arc<dyn KeyStore>>,
    pub(crate) key_source: Option<Arc<dyn KeySource>>,
    pub(crate) mock_verifier: Option<Arc<dyn MockVerifier>>,
}
