//! HTTP-based integration tests for the JSON-RPC node client.
//!
//! Uses `wiremock` to stand in for a full node.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, header_exists, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use merchant_gateway::app::{BlockInfoResolver, Multiplexer, MultiplexerConfig};
use merchant_gateway::domain::{ERROR_PREFIX, Invocation, NodeClient, NodeError};
use merchant_gateway::infra::{HttpNodeClient, NodeConfig, NodePool};

fn node_config(server: &MockServer) -> NodeConfig {
    let address = server.address();
    NodeConfig {
        host: address.ip().to_string(),
        port: address.port(),
        username: "rpcuser".to_string(),
        password: SecretString::from("rpcpass"),
    }
}

fn client(server: &MockServer, timeout: Duration) -> HttpNodeClient {
    HttpNodeClient::new(&node_config(server), timeout).unwrap()
}

fn rpc_result(result: Value) -> Value {
    json!({"result": result, "error": null, "id": 1})
}

#[tokio::test]
async fn test_call_returns_result_and_sends_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header_exists("authorization"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "method": "getrawtransaction",
            "params": ["abcd", 0]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!("0100"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_secs(5));
    let result = client
        .call("getrawtransaction", &json!(["abcd", 0]))
        .await
        .unwrap();
    assert_eq!(result.get(), r#""0100""#);
}

#[tokio::test]
async fn test_rpc_error_with_http_500() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "result": null,
            "error": {"code": -25, "message": "Missing inputs"},
            "id": 1
        })))
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_secs(5));
    let err = client
        .call("sendrawtransaction", &json!(["00", false, true]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        NodeError::Rpc {
            code: -25,
            message: "Missing inputs".to_string()
        }
    );
}

#[tokio::test]
async fn test_non_json_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_secs(5));
    let err = client
        .call("getblockchaininfo", &json!([]))
        .await
        .unwrap_err();
    match err {
        NodeError::InvalidResponse(message) => {
            assert!(message.contains("401"));
            assert!(message.contains("Unauthorized"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_node_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rpc_result(json!(1)))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_millis(100));
    let err = client
        .call("getblockchaininfo", &json!([]))
        .await
        .unwrap_err();
    assert_eq!(err, NodeError::Timeout(100));
}

#[tokio::test]
async fn test_unreachable_node_is_connection_error() {
    let config = NodeConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        username: "u".to_string(),
        password: SecretString::from("p"),
    };
    let client = HttpNodeClient::new(&config, Duration::from_secs(2)).unwrap();
    let err = client
        .call("getblockchaininfo", &json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Connection(_)));
}

#[tokio::test]
async fn test_multiplexer_over_http_nodes() {
    let low = MockServer::start().await;
    let high = MockServer::start().await;
    let broken = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "blocks": 100, "bestblockhash": "aaa"
        }))))
        .mount(&low)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!({
            "blocks": 105, "bestblockhash": "bbb"
        }))))
        .mount(&high)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&broken)
        .await;

    let clients: Vec<Arc<dyn NodeClient>> = [&low, &high, &broken]
        .into_iter()
        .map(|server| Arc::new(client(server, Duration::from_secs(5))) as Arc<dyn NodeClient>)
        .collect();
    let multiplexer = Arc::new(Multiplexer::new(
        NodePool::new(clients),
        MultiplexerConfig::default(),
    ));

    let responses = multiplexer
        .invoke(&Invocation::blockchain_info(), true, true)
        .await;
    assert_eq!(responses.len(), 3);
    assert_eq!(
        responses
            .iter()
            .filter(|e| e.starts_with(ERROR_PREFIX))
            .count(),
        1
    );

    let tip = BlockInfoResolver::new(multiplexer).resolve_tip().await.unwrap();
    assert_eq!(tip.height, 100);
    assert_eq!(tip.best_block_hash, "aaa");
}

#[tokio::test]
async fn test_unique_results_compare_node_bytes() {
    let first = MockServer::start().await;
    let same = MockServer::start().await;
    let reordered = MockServer::start().await;

    for server in [&first, &same] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"result":{"txid":"ab","confirmations":2},"error":null,"id":1}"#,
            ))
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"result":{"confirmations":2,"txid":"ab"},"error":null,"id":1}"#,
        ))
        .mount(&reordered)
        .await;

    let clients: Vec<Arc<dyn NodeClient>> = [&first, &same, &reordered]
        .into_iter()
        .map(|server| Arc::new(client(server, Duration::from_secs(5))) as Arc<dyn NodeClient>)
        .collect();
    let multiplexer = Multiplexer::new(NodePool::new(clients), MultiplexerConfig::default());

    let responses = multiplexer
        .invoke(&Invocation::raw_transaction("ab", true), false, true)
        .await;
    let mut entries: Vec<&str> = responses.iter().collect();
    entries.sort_unstable();
    assert_eq!(
        entries,
        vec![
            r#"{"confirmations":2,"txid":"ab"}"#,
            r#"{"txid":"ab","confirmations":2}"#,
        ]
    );
}
