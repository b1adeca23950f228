//! SidecarLedger against an in-process sidecar
use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use condense_miner::error::MinerError;
use condense_miner::ledger::{Ledger, SidecarLedger};
use condense_miner::settings::LedgerSettings;

async fn metagraph(
    Path(netuid): Path<u16>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if netuid != 47 || params.get("network").map(String::as_str) != Some("test") {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "block": 4242,
        "neurons": [
            {"hotkey": "5Validator", "uid": 0, "stake": 25000.5, "incentive": 0.1},
            {"hotkey": "5Miner", "uid": 1, "stake": 12.0}
        ]
    })))
}

async fn registrations(Path(_netuid): Path<u16>) -> Json<Value> {
    Json(json!([
        {"hotkey": "5Validator", "uid": 0},
        {"hotkey": "5Miner", "uid": 1}
    ]))
}

async fn stake(Path((_netuid, hotkey)): Path<(u16, String)>) -> Result<Json<Value>, StatusCode> {
    match hotkey.as_str() {
        "5Validator" => Ok(Json(json!({"stake": 25000.5}))),
        "5Miner" => Ok(Json(json!({"stake": 12.0}))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn block() -> Json<Value> {
    Json(json!({"block": 4242}))
}

async fn broken() -> &'static str {
    "<html>not json</html>"
}

/// Serve `router` on an ephemeral port and return its base URL
async fn spawn_sidecar(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", address)
}

fn ledger(url: String, netuid: u16) -> SidecarLedger {
    SidecarLedger::new(&LedgerSettings {
        sidecar_url: url,
        netuid,
        network: "test".to_string(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn healthy_sidecar() -> Router {
    Router::new()
        .route("/metagraph/{netuid}", get(metagraph))
        .route("/registrations/{netuid}", get(registrations))
        .route("/stake/{netuid}/{hotkey}", get(stake))
        .route("/block", get(block))
}

#[tokio::test]
async fn test_reads_metagraph_in_one_call() {
    let url = spawn_sidecar(healthy_sidecar()).await;
    let metagraph = ledger(url, 47).metagraph().await.unwrap();

    assert_eq!(metagraph.block, 4242);
    assert_eq!(metagraph.neurons.len(), 2);
    assert_eq!(metagraph.neurons[0].hotkey, "5Validator");
    assert_eq!(metagraph.neurons[0].stake, 25000.5);
    // incentive is optional on the wire
    assert_eq!(metagraph.neurons[1].incentive, 0.0);
}

#[tokio::test]
async fn test_individual_queries() {
    let url = spawn_sidecar(healthy_sidecar()).await;
    let ledger = ledger(url, 47);

    let registrations = ledger.list_registered_identities().await.unwrap();
    assert_eq!(registrations.len(), 2);
    assert_eq!(registrations[1].uid, 1);
    assert_eq!(ledger.get_stake("5Miner").await.unwrap(), 12.0);
    assert_eq!(ledger.current_block().await.unwrap(), 4242);
    assert!(matches!(
        ledger.get_stake("5Nobody").await,
        Err(MinerError::Ledger(_))
    ));
}

#[tokio::test]
async fn test_error_status_is_a_ledger_error() {
    let url = spawn_sidecar(healthy_sidecar()).await;
    // the fake sidecar only knows netuid 47
    let err = ledger(url, 1).metagraph().await.unwrap_err();
    assert!(matches!(err, MinerError::Ledger(ref msg) if msg.contains("404")));
}

#[tokio::test]
async fn test_malformed_response_is_a_ledger_error() {
    let url = spawn_sidecar(Router::new().route("/metagraph/{netuid}", get(broken))).await;
    let err = ledger(url, 47).metagraph().await.unwrap_err();
    assert!(matches!(err, MinerError::Ledger(ref msg) if msg.contains("malformed")));
}

#[tokio::test]
async fn test_unreachable_sidecar_is_a_ledger_error() {
    // bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let err = ledger(format!("http://{}", address), 47)
        .current_block()
        .await
        .unwrap_err();
    assert!(matches!(err, MinerError::Ledger(_)));
    assert!(!err.is_fatal());
}
