use std::sync::Arc;

use alloy_primitives::{Address, U256};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use cofhe_zk::{
    backends::simulated::SimulatedBackend, pack, prove, EncryptableItem, ProofMetadata,
    VerifierClient, VerifyError, ZkBuilderGenerator,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const CRS_SEED: [u8; 32] = [5; 32];

#[derive(Default)]
struct Seen {
    requests: Vec<Value>,
}

async fn verify_ok(State(seen): State<Arc<Mutex<Seen>>>, Json(body): Json<Value>) -> Json<Value> {
    let packed = body["packed_list"].as_str().unwrap_or_default().to_owned();
    seen.lock().requests.push(body);
    let proof = hex::decode(packed.trim_start_matches("0x")).unwrap();
    let opened = SimulatedBackend::open_proof(&proof, &SimulatedBackend::crs(CRS_SEED)).unwrap();
    let data: Vec<Value> = opened
        .utypes
        .iter()
        .enumerate()
        .map(|(index, utype)| {
            json!({
                "ct_hash": (1000 + index as u64 * 10 + utype.code() as u64).to_string(),
                "signature": "11".repeat(64),
                "recid": 0,
            })
        })
        .collect();
    Json(json!({ "status": "success", "data": data, "error": null }))
}

async fn verify_rejected() -> Json<Value> {
    Json(json!({ "status": "failed", "data": [], "error": "invalid proof" }))
}

async fn verify_broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn proof(items: &[EncryptableItem], metadata: &ProofMetadata) -> Vec<u8> {
    let (builder, crs) = SimulatedBackend::new()
        .generate(
            &SimulatedBackend::public_key([4; 32]),
            &SimulatedBackend::crs(CRS_SEED),
        )
        .unwrap();
    let builder = pack(items, builder).unwrap();
    prove(builder, crs.as_ref(), metadata).unwrap()
}

fn metadata() -> ProofMetadata {
    ProofMetadata {
        account: Address::repeat_byte(0xaa),
        security_zone: 2,
        chain_id: 42069,
    }
}

#[tokio::test]
async fn verified_items_follow_input_order() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let url = serve(
        Router::new()
            .route("/verify", post(verify_ok))
            .with_state(seen.clone()),
    )
    .await;
    let items = [
        EncryptableItem::Bool(true),
        EncryptableItem::Uint32(42),
        EncryptableItem::Uint8(1),
    ];
    let proof = proof(&items, &metadata());

    let verified = VerifierClient::default()
        .verify(&format!("{url}/"), &proof, &metadata())
        .await
        .unwrap();

    let hashes: Vec<U256> = verified.iter().map(|item| item.ct_hash).collect();
    assert_eq!(
        hashes,
        vec![U256::from(1000u64), U256::from(1014u64), U256::from(1022u64)]
    );
    assert!(verified
        .iter()
        .all(|item| item.signature.len() == 65 && item.signature[64] == 27));

    let requests = &seen.lock().requests;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["security_zone"], json!(2));
    assert_eq!(requests[0]["chain_id"], json!(42069));
    assert_eq!(
        requests[0]["account_addr"],
        json!(Address::repeat_byte(0xaa).to_checksum(None))
    );
}

#[tokio::test]
async fn rejection_is_reported() {
    let url = serve(Router::new().route("/verify", post(verify_rejected))).await;
    let err = VerifierClient::default()
        .verify(&url, &proof(&[EncryptableItem::Uint8(1)], &metadata()), &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Rejected(reason) if reason == "invalid proof"));
}

#[tokio::test]
async fn http_failure_is_reported() {
    let url = serve(Router::new().route("/verify", post(verify_broken))).await;
    let err = VerifierClient::default()
        .verify(&url, &proof(&[EncryptableItem::Uint8(1)], &metadata()), &metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Status { status: 500, .. }));
}
