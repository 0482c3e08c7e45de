use std::{sync::Arc, time::Instant};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use cofhe_keys::{FileKeyStore, HttpKeySource, KeyCache, KeySource, KeyStore, MemoryKeyStore};
use cofhe_telemetry::{names, TelemetryHandle};
use cofhe_zk::{EncryptableItem, EncryptedItemInput, ProofMetadata, VerifierClient};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{EncryptError, EncryptResult, ErrorCode},
    flow::{EncryptPath, RequestContext},
    mock::{ContractMockVerifier, LocalMockVerifier, MockFlow, MockVerifier},
    platform::{Collaborators, Platform},
    production::ProductionFlow,
    steps::{StepEvent, StepSink, StepTimeline},
};

struct EncryptorInner {
    config: Config,
    platform: Platform,
    keys: KeyCache,
    verifier: VerifierClient,
    mock_verifier: Arc<dyn MockVerifier>,
    mock_signer: PrivateKeySigner,
    telemetry: TelemetryHandle,
}

/// Long-lived entry point. Cheap to clone; clones share the key cache and
/// telemetry.
#[derive(Clone)]
pub struct Encryptor {
    inner: Arc<EncryptorInner>,
}

impl Encryptor {
    /// Validates the collaborators first, so a missing capability fails
    /// before any configuration or network work happens.
    pub fn new(config: Config, collaborators: Collaborators) -> EncryptResult<Self> {
        let (platform, services) = collaborators.resolve()?;
        config.validate().map_err(|err| {
            EncryptError::new(ErrorCode::InternalError, err.to_string()).with_source(err)
        })?;
        let mock_signer = config.mock_signer().map_err(|err| {
            EncryptError::new(ErrorCode::ZkMocksCreateProofSignatureFailed, err.to_string())
                .with_source(err)
        })?;

        let key_store: Arc<dyn KeyStore> = match (services.key_store, &config.key_store.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileKeyStore::new(path)),
            (None, None) => Arc::new(MemoryKeyStore::new()),
        };
        let key_source: Arc<dyn KeySource> = match services.key_source {
            Some(source) => source,
            None => Arc::new(config.chains.iter().fold(
                HttpKeySource::default(),
                |source, chain| source.with_endpoint(chain.chain_id, chain.coprocessor_url.clone()),
            )),
        };
        let mock_verifier: Arc<dyn MockVerifier> = match (services.mock_verifier, &config.mock.rpc_url) {
            (Some(verifier), _) => verifier,
            (None, Some(rpc_url)) => Arc::new(ContractMockVerifier::new(
                rpc_url.clone(),
                config.mock.verifier_address,
                mock_signer.clone(),
            )),
            (None, None) => Arc::new(LocalMockVerifier::new()),
        };
        let telemetry = TelemetryHandle::from_config(config.telemetry.clone());

        Ok(Self {
            inner: Arc::new(EncryptorInner {
                platform,
                keys: KeyCache::new(key_store, key_source),
                verifier: VerifierClient::default(),
                mock_verifier,
                mock_signer,
                telemetry,
                config,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.inner.telemetry
    }

    /// Starts a request for `items`, pre-filled with the configured defaults.
    pub fn request(&self, items: impl IntoIterator<Item = EncryptableItem>) -> EncryptRequest {
        let defaults = &self.inner.config.encrypt;
        EncryptRequest {
            encryptor: self.clone(),
            items: items.into_iter().collect(),
            account: defaults.default_account,
            chain_id: defaults.default_chain_id,
            security_zone: defaults.default_security_zone,
            use_worker: defaults.use_worker,
            sink: None,
        }
    }

    fn path(&self, chain_id: u64) -> EncryptPath<'_> {
        let inner = &*self.inner;
        if chain_id == inner.config.encrypt.local_chain_id {
            EncryptPath::Mock(MockFlow::new(
                inner.mock_verifier.as_ref(),
                &inner.mock_signer,
                inner.config.mock.step_delays_ms,
            ))
        } else {
            let verifier_url = inner
                .config
                .chain(chain_id)
                .and_then(|chain| chain.verifier_url.as_deref());
            EncryptPath::Production(ProductionFlow::new(
                &inner.platform,
                &inner.keys,
                &inner.verifier,
                verifier_url,
                &inner.telemetry,
            ))
        }
    }
}

/// One encryption. Every `with_*` call returns the updated request;
/// [`EncryptRequest::encrypt`] consumes it.
#[must_use = "a request does nothing until `encrypt` is awaited"]
pub struct EncryptRequest {
    encryptor: Encryptor,
    items: Vec<EncryptableItem>,
    account: Option<Address>,
    chain_id: Option<u64>,
    security_zone: u8,
    use_worker: bool,
    sink: Option<StepSink>,
}

impl EncryptRequest {
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_security_zone(mut self, security_zone: u8) -> Self {
        self.security_zone = security_zone;
        self
    }

    pub fn with_use_worker(mut self, use_worker: bool) -> Self {
        self.use_worker = use_worker;
        self
    }

    pub fn with_step_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepEvent) + Send + Sync + 'static,
    {
        self.sink = Some(StepSink::Callback(Arc::new(callback)));
        self
    }

    pub fn with_step_sender(mut self, sender: UnboundedSender<StepEvent>) -> Self {
        self.sink = Some(StepSink::Channel(sender));
        self
    }

    /// Routes progress into a fresh channel and hands back its receiver.
    pub fn with_step_events(self) -> (Self, UnboundedReceiver<StepEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (self.with_step_sender(sender), receiver)
    }

    pub async fn encrypt(self) -> EncryptResult<Vec<EncryptedItemInput>> {
        let account = self.account.ok_or_else(|| {
            EncryptError::new(ErrorCode::AccountUninitialized, "no account to bind the proof to")
        })?;
        let chain_id = self.chain_id.ok_or_else(|| {
            EncryptError::new(ErrorCode::ChainIdUninitialized, "no chain id to encrypt for")
        })?;
        let encryptor = self.encryptor;
        let telemetry = encryptor.telemetry().clone();
        telemetry.record_counter(names::REQUESTS, 1)?;

        let path = encryptor.path(chain_id);
        let mocked = path.mocked();
        if mocked {
            telemetry.record_counter(names::MOCKED, 1)?;
        }
        let request = RequestContext {
            items: self.items,
            metadata: ProofMetadata {
                account,
                security_zone: self.security_zone,
                chain_id,
            },
            // The mock path never proves, so the worker is irrelevant there.
            use_worker: self.use_worker && !mocked,
        };
        debug!(
            chain_id,
            items = request.items.len(),
            security_zone = self.security_zone,
            mocked,
            "encrypting"
        );

        let started = Instant::now();
        let mut timeline = StepTimeline::new(self.sink, telemetry, mocked);
        let inputs = path.run(&request, &mut timeline).await?;
        info!(
            chain_id,
            items = inputs.len(),
            mocked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "encryption complete"
        );
        Ok(inputs)
    }
}
