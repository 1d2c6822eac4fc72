mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::b256;
use alloy_signer_local::PrivateKeySigner;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_partial_json, header_exists, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use flashbots::FlashbotsClient;
use rescue_core::{
    AccountSnapshot, BundleAssembler, BundleRelay, BundleResolution, FeeEstimator, FlashbotsRelay, RescueError, RescuePipeline, RescuePlan,
    SignedBundle, Termination,
};

fn bundle() -> SignedBundle {
    let (recovery, compromised) = (recovery(), compromised());
    let config = config();
    let snapshot = AccountSnapshot { recovery_nonce: 3, compromised_nonce: 10, compromised_balance: None };
    let fees = FeeEstimator::from_config(&config).estimate(30_000_000_000);

    let entries = RescuePlan::new(&config).build(&recovery, &compromised, &snapshot, &fees).unwrap();
    BundleAssembler::new(config.chain_id).assemble(&entries, 102).unwrap()
}

fn relay(server: &MockServer, chain: Arc<MockChain>) -> FlashbotsRelay<MockChain> {
    let _ = env_logger::try_init_from_env(env_logger::Env::default().default_filter_or("debug"));
    let client = FlashbotsClient::new(Url::parse(&server.uri()).unwrap(), Some(PrivateKeySigner::random()));
    FlashbotsRelay::new(client, chain, Duration::from_millis(1))
}

fn call_bundle_result(results: Vec<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "bundleGasPrice": "20000000000",
            "bundleHash": "0x73b1e258c7a42fd0230b2fd05529c5d4b6fcb66c227783f8bece8aeacdd1db2e",
            "coinbaseDiff": "840000000000000",
            "ethSentToCoinbase": "0",
            "gasFees": "840000000000000",
            "results": results,
            "stateBlockNumber": 100,
            "totalGasUsed": 42000
        }
    })
}

fn simulated_tx(revert: Option<&str>) -> Value {
    let mut tx = json!({
        "coinbaseDiff": "420000000000000",
        "ethSentToCoinbase": "0",
        "fromAddress": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "gasFees": "420000000000000",
        "gasPrice": "20000000000",
        "gasUsed": 21000,
        "toAddress": "0x2dd35b4da6534230ff53048f7477f17f7f4e7a70",
        "txHash": "0x669b4704a7d993a946cdd6e2f95233f308ce0c4649d2e04944e8299efcaa098a",
        "value": "0x"
    });
    if let Some(revert) = revert {
        tx["error"] = json!("execution reverted");
        tx["revert"] = json!(revert);
    }
    tx
}

#[tokio::test]
async fn simulation_targets_block_on_observed_state() {
    let server = MockServer::start().await;
    let bundle = bundle();

    Mock::given(method("POST"))
        .and(header_exists("X-Flashbots-Signature"))
        .and(body_partial_json(json!({
            "method": "eth_callBundle",
            "params": [{"txs": bundle.raw_transactions(), "blockNumber": "0x66", "stateBlockNumber": "0x64"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_bundle_result(vec![simulated_tx(None), simulated_tx(None)])))
        .expect(1)
        .mount(&server)
        .await;

    let report = relay(&server, Arc::new(MockChain::default())).simulate(&bundle, 100).await.unwrap();
    assert_eq!(report.gas_used, alloy_primitives::U256::from(42000));
    assert_eq!(report.coinbase_diff, alloy_primitives::U256::from(840_000_000_000_000u64));
    assert_eq!(report.effective_gas_price, alloy_primitives::U256::from(20_000_000_000u64));
}

#[tokio::test]
async fn reverted_transaction_fails_simulation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(call_bundle_result(vec![simulated_tx(None), simulated_tx(Some("ERC721: caller is not owner"))])),
        )
        .mount(&server)
        .await;

    match relay(&server, Arc::new(MockChain::default())).simulate(&bundle(), 100).await {
        Err(RescueError::SimulationFailure { target_block, reason }) => {
            assert_eq!(target_block, 102);
            assert_eq!(reason, "execution reverted: ERC721: caller is not owner");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn relay_error_fails_simulation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "err: nonce too low"}
        })))
        .mount(&server)
        .await;

    let result = relay(&server, Arc::new(MockChain::default())).simulate(&bundle(), 100).await;
    assert!(matches!(result, Err(RescueError::SimulationFailure { target_block: 102, .. })));
}

#[tokio::test]
async fn rejected_simulation_is_simulation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "err: nonce too low"}
        })))
        .mount(&server)
        .await;

    let err = relay(&server, Arc::new(MockChain::default())).simulate(&bundle(), 100).await.unwrap_err();
    match &err {
        RescueError::SimulationFailure { target_block, reason } => {
            assert_eq!(*target_block, 102);
            assert!(reason.contains("nonce too low"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.is_retryable(true));
    assert!(!err.is_retryable(false));
}

#[tokio::test]
async fn unreadable_simulation_reply_is_simulation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_callBundle"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid bundle"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let relay = relay(&server, Arc::new(MockChain::default()));
    assert!(matches!(relay.simulate(&bundle(), 100).await, Err(RescueError::SimulationFailure { target_block: 102, .. })));
    assert!(matches!(relay.simulate(&bundle(), 100).await, Err(RescueError::SimulationFailure { target_block: 102, .. })));
}

#[tokio::test]
async fn pipeline_retries_rejected_simulation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_callBundle", "params": [{"blockNumber": "0x66"}]})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "err: nonce too low"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_callBundle", "params": [{"blockNumber": "0x67"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_bundle_result(vec![simulated_tx(None)])))
        .expect(1)
        .mount(&server)
        .await;

    let chain = Arc::new(MockChain::default());
    let relay = Arc::new(relay(&server, chain.clone()));
    let mut config = config();
    config.retry_on_simulation_failure = true;
    let mut pipeline = RescuePipeline::new(config, chain, relay, recovery(), compromised()).unwrap().with_dry_run(true);

    assert!(pipeline.on_block(block(100)).await.is_none());
    let termination = pipeline.on_block(block(101)).await;
    assert!(matches!(termination, Some(Termination::Simulated { target_block: 103, .. })));
}

#[tokio::test]
async fn unavailable_relay_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST")).respond_with(ResponseTemplate::new(503).set_body_string("busy")).mount(&server).await;

    let relay = relay(&server, Arc::new(MockChain::default()));
    let err = relay.simulate(&bundle(), 100).await.unwrap_err();
    assert!(matches!(err, RescueError::RelayUnavailable { target_block: 102, .. }));
    assert!(err.is_retryable(false));

    let err = relay.submit(&bundle()).await.unwrap_err();
    assert!(matches!(err, RescueError::RelayUnavailable { .. }));
}

#[tokio::test]
async fn submission_keeps_bundle_hash() {
    let server = MockServer::start().await;
    let bundle = bundle();

    Mock::given(method("POST"))
        .and(header_exists("X-Flashbots-Signature"))
        .and(body_partial_json(json!({"method": "eth_sendBundle", "params": [{"txs": bundle.raw_transactions(), "blockNumber": "0x66"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"bundleHash": "0xcc6c61428c6516a252768859d167dc8f5c8c8c682334a184710f898e422530f8"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let submission = relay(&server, Arc::new(MockChain::default())).submit(&bundle).await.unwrap();
    assert_eq!(submission.bundle_hash, Some(b256!("cc6c61428c6516a252768859d167dc8f5c8c8c682334a184710f898e422530f8")));
    assert_eq!(submission.target_block, 102);
    assert_eq!(submission.bundle_id, bundle.id);
    assert_eq!(submission.transactions, bundle.hashes());
    assert!(submission.signer_nonces.contains(&(recovery().address(), 3)));
    assert!(submission.signer_nonces.contains(&(compromised().address(), 10)));
}

#[tokio::test]
async fn rejected_submission_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST")).respond_with(ResponseTemplate::new(400).set_body_string("invalid bundle")).mount(&server).await;

    let err = relay(&server, Arc::new(MockChain::default())).submit(&bundle()).await.unwrap_err();
    assert!(matches!(err, RescueError::SubmissionFailure { target_block: 102, .. }));
    assert!(!err.is_retryable(true));
}

#[tokio::test]
async fn resolution_reads_chain_after_target_block() {
    let server = MockServer::start().await;
    let bundle = bundle();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": null})))
        .mount(&server)
        .await;

    let chain = Arc::new(MockChain::default());
    {
        let mut state = chain.state.lock().await;
        state.block_number = 102;
        state.included = bundle.hashes().into_iter().collect();
    }

    let relay = relay(&server, chain.clone());
    let submission = relay.submit(&bundle).await.unwrap();
    assert_eq!(submission.bundle_hash, None);
    assert_eq!(relay.await_resolution(&submission).await.unwrap(), BundleResolution::Included);

    chain.state.lock().await.included.clear();
    assert_eq!(relay.await_resolution(&submission).await.unwrap(), BundleResolution::BlockPassedWithoutInclusion);

    chain.set_nonce(compromised().address(), 11).await;
    assert!(matches!(relay.await_resolution(&submission).await.unwrap(), BundleResolution::AccountNonceTooHigh { chain_nonce: 11, .. }));
}
