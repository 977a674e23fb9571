//! HTTP-level gateway tests against a mock server.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use swapdesk::chain::{ChainGateway, JsonRpcChain, PollPolicy, TxPayload, TxStatus};
use swapdesk::config::{AggregatorConfig, RpcConfig};
use swapdesk::error::{ChainError, MarketError};
use swapdesk::market::{AggregatorClient, ChartPeriod, MarketGateway};

const TOKEN: &str = "0x00000000000000000000000000000000000000aa";

fn aggregator(server: &MockServer) -> AggregatorClient {
    AggregatorClient::new(&AggregatorConfig {
        base_url: server.uri(),
        api_key: SecretString::from("test-key"),
    })
}

fn chain(server: &MockServer) -> JsonRpcChain {
    JsonRpcChain::new(&RpcConfig {
        endpoints: HashMap::from([(137, server.uri())]),
    })
}

#[tokio::test]
async fn token_search_sends_bearer_auth_and_matches_by_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token/v1.2/137/search"))
        .and(query_param("query", TOKEN))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"address": "0x00000000000000000000000000000000000000ff", "symbol": "OTHER", "decimals": 18},
            {"address": TOKEN, "symbol": "FOO", "decimals": 18}
        ])))
        .mount(&server)
        .await;

    let info = aggregator(&server)
        .token_info(137, TOKEN)
        .await
        .unwrap()
        .expect("token resolved");
    assert_eq!(info.symbol, "FOO");
    assert_eq!(info.decimals, 18);
}

#[tokio::test]
async fn unknown_token_resolves_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token/v1.2/137/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let info = aggregator(&server).token_info(137, TOKEN).await.unwrap();
    assert!(info.is_none());
}

#[tokio::test]
async fn balances_are_keyed_by_lowercase_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance/v1.2/137/balances/0xwallet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "0x00000000000000000000000000000000000000AA": "1500000",
            "0x00000000000000000000000000000000000000bb": "0"
        })))
        .mount(&server)
        .await;

    let balances = aggregator(&server).balances(137, "0xwallet").await.unwrap();
    assert_eq!(balances.get(TOKEN), Some(&"1500000".to_string()));
}

#[tokio::test]
async fn swap_calldata_carries_slippage_and_parses_gas() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/swap/v6.0/137/swap"))
        .and(query_param("src", TOKEN))
        .and(query_param("slippage", "1"))
        .and(query_param("includeGas", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tx": {
                "to": "0x0000000000000000000000000000000000001111",
                "data": "0xdeadbeef",
                "value": "0",
                "gasPrice": "30000000000",
                "gas": 210000
            }
        })))
        .mount(&server)
        .await;

    let payload = aggregator(&server)
        .swap_calldata(
            137,
            TOKEN,
            "0x00000000000000000000000000000000000000bb",
            1_000_000,
            "0xwallet",
            rust_decimal::Decimal::ONE,
        )
        .await
        .unwrap();
    assert_eq!(payload.data, "0xdeadbeef");
    assert_eq!(payload.gas, Some(210_000));
    assert_eq!(payload.gas_price, Some(30_000_000_000));
}

#[tokio::test]
async fn rate_limit_is_reported_with_the_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/swap/v6.0/137/quote"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = aggregator(&server)
        .quote(137, TOKEN, "0xbb", 100)
        .await
        .unwrap_err();
    match err {
        MarketError::Status { endpoint, status } => {
            assert_eq!(status, 429);
            assert!(endpoint.contains("/quote"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn price_history_decodes_points() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/charts/v1.0/chart/line/{TOKEN}/0xbb/24H/137"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"time": 1700000000, "value": 1.0},
                {"time": 1700003600, "value": 1.5}
            ]
        })))
        .mount(&server)
        .await;

    let points = aggregator(&server)
        .price_history(137, TOKEN, "0xbb", ChartPeriod::Day)
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].value, 1.5);
}

#[tokio::test]
async fn sign_fetches_the_nonce_and_broadcast_returns_the_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionCount"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x9"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0xtxhash"
        })))
        .mount(&server)
        .await;

    let gateway = chain(&server);
    let payload = TxPayload {
        to: "0x3535353535353535353535353535353535353535".to_string(),
        data: "0x".to_string(),
        value: "1000000000000000000".to_string(),
        gas: Some(21_000),
        gas_price: Some(20_000_000_000),
    };
    let secret = SecretString::from("46".repeat(32));

    let signed = gateway.sign(137, &payload, &secret).await.unwrap();
    assert!(signed.raw_hex().starts_with("0x"));
    assert!(!signed.0.is_empty());

    let hash = gateway.broadcast(137, &signed).await.unwrap();
    assert_eq!(hash, "0xtxhash");
}

#[tokio::test]
async fn rpc_errors_are_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32000, "message": "nonce too low"}
        })))
        .mount(&server)
        .await;

    let err = chain(&server)
        .broadcast(137, &swapdesk::chain::SignedTx(vec![1, 2, 3]))
        .await
        .unwrap_err();
    match err {
        ChainError::Rpc { code, message } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "nonce too low");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn poll_waits_through_missing_receipts() {
    let server = MockServer::start().await;
    // First poll: no receipt yet.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": null
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Then the mined receipt.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"status": "0x1"}
        })))
        .mount(&server)
        .await;

    let policy = PollPolicy {
        max_attempts: 5,
        interval: Duration::ZERO,
    };
    let status = chain(&server)
        .poll_receipt(137, "0xtxhash", &policy)
        .await
        .unwrap();
    assert_eq!(status, TxStatus::Confirmed);
}

#[tokio::test]
async fn reverted_receipt_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"status": "0x0"}
        })))
        .mount(&server)
        .await;

    let policy = PollPolicy::default();
    let status = chain(&server)
        .poll_receipt(137, "0xtxhash", &policy)
        .await
        .unwrap();
    assert_eq!(status, TxStatus::Reverted);
}

#[tokio::test]
async fn polling_gives_up_after_the_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": null
        })))
        .mount(&server)
        .await;

    let policy = PollPolicy {
        max_attempts: 2,
        interval: Duration::ZERO,
    };
    let err = chain(&server)
        .poll_receipt(137, "0xtxhash", &policy)
        .await
        .unwrap_err();
    match err {
        ChainError::ConfirmationTimeout { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {other:?}"),
    }
}
