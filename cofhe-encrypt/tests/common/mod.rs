#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use alloy::primitives::U256;
use axum::{extract::State, routing::post, Json, Router};
use cofhe_encrypt::{ChainConfig, Config};
use cofhe_zk::backends::simulated::SimulatedBackend;
use serde_json::{json, Value};

pub const STUB_CHAIN_ID: u64 = 42069;
pub const KEY_SEED: [u8; 32] = [7; 32];
pub const CRS_SEED: [u8; 32] = [9; 32];

#[derive(Default)]
pub struct Hits {
    pub public_key: AtomicUsize,
    pub crs: AtomicUsize,
    pub verify: AtomicUsize,
}

impl Hits {
    pub fn keys(&self) -> usize {
        self.public_key.load(Ordering::SeqCst) + self.crs.load(Ordering::SeqCst)
    }

    pub fn verify(&self) -> usize {
        self.verify.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.keys() + self.verify()
    }
}

/// Ways the stub coprocessor misbehaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct Behavior {
    /// `/GetCrs` answers with an empty blob.
    pub omit_crs: bool,
    /// `/GetNetworkPublicKey` serves bytes no deserializer accepts.
    pub foreign_public_key: bool,
    /// `/verify` drops the last verified item.
    pub short_verify: bool,
    /// `/verify` rejects every proof.
    pub reject_proofs: bool,
}

struct StubState {
    hits: Arc<Hits>,
    behavior: Behavior,
}

/// Coprocessor stand-in serving the simulated key material and verifying
/// simulated proofs.
pub struct Coprocessor {
    pub url: String,
    pub hits: Arc<Hits>,
}

impl Coprocessor {
    pub async fn spawn() -> Self {
        Self::spawn_with(Behavior::default()).await
    }

    /// Answers `/GetCrs` with an empty blob.
    pub async fn without_crs() -> Self {
        Self::spawn_with(Behavior {
            omit_crs: true,
            ..Behavior::default()
        })
        .await
    }

    /// An address nothing listens on.
    pub async fn unreachable() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Self {
            url: format!("http://{addr}"),
            hits: Arc::new(Hits::default()),
        }
    }

    pub async fn spawn_with(behavior: Behavior) -> Self {
        let hits = Arc::new(Hits::default());
        let state = Arc::new(StubState {
            hits: hits.clone(),
            behavior,
        });
        let router = Router::new()
            .route("/GetNetworkPublicKey", post(public_key))
            .route("/GetCrs", post(crs))
            .route("/verify", post(verify))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            url: format!("http://{addr}"),
            hits,
        }
    }

    pub fn chain(&self) -> ChainConfig {
        ChainConfig::new(STUB_CHAIN_ID, "stub", &self.url).with_verifier_url(&self.url)
    }

    /// Local config with instant mock steps plus this coprocessor's chain.
    pub fn config(&self) -> Config {
        Config::local().with_chain(self.chain())
    }
}

async fn public_key(State(state): State<Arc<StubState>>, Json(_): Json<Value>) -> Json<Value> {
    state.hits.public_key.fetch_add(1, Ordering::SeqCst);
    let public_key = if state.behavior.foreign_public_key {
        b"not-a-simulated-key".to_vec()
    } else {
        SimulatedBackend::public_key(KEY_SEED)
    };
    Json(json!({ "publicKey": format!("0x{}", hex::encode(public_key)) }))
}

async fn crs(State(state): State<Arc<StubState>>, Json(_): Json<Value>) -> Json<Value> {
    state.hits.crs.fetch_add(1, Ordering::SeqCst);
    let crs = if state.behavior.omit_crs {
        "0x".to_owned()
    } else {
        format!("0x{}", hex::encode(SimulatedBackend::crs(CRS_SEED)))
    };
    Json(json!({ "crs": crs }))
}

async fn verify(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Json<Value> {
    state.hits.verify.fetch_add(1, Ordering::SeqCst);
    if state.behavior.reject_proofs {
        return Json(json!({ "status": "failed", "data": [], "error": "proof rejected" }));
    }
    let packed = body["packed_list"].as_str().unwrap_or_default();
    let opened = hex::decode(packed.trim_start_matches("0x"))
        .map_err(|err| err.to_string())
        .and_then(|proof| {
            SimulatedBackend::open_proof(&proof, &SimulatedBackend::crs(CRS_SEED))
                .map_err(|err| err.to_string())
        });
    match opened {
        Ok(opened) => {
            let mut data: Vec<Value> = opened
                .ciphertexts
                .iter()
                .map(|ciphertext| {
                    json!({
                        "ct_hash": U256::from_be_bytes(*ciphertext).to_string(),
                        "signature": "22".repeat(64),
                        "recid": 1,
                    })
                })
                .collect();
            if state.behavior.short_verify {
                data.pop();
            }
            Json(json!({ "status": "success", "data": data, "error": null }))
        }
        Err(reason) => Json(json!({ "status": "failed", "data": [], "error": reason })),
    }
}
