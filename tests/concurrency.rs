//! Concurrent dispatch through a single worker.

use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;

use payment_bridge::bridge::GatewayBridge;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_pair_correctly() {
    let bridge = Arc::new(GatewayBridge::spawn(&common::bogus_worker(), common::bogus_gateways()).unwrap());

    let calls = (1..=32i64).map(|amount| {
        let bridge = bridge.clone();
        async move {
            let secure = common::object(json!({"amount": amount.to_string(), "authorization": "53433"}));
            let response = bridge
                .dispatch(Some(Default::default()), Some(secure), "test", Some("capture"))
                .await
                .unwrap();
            (amount, response)
        }
    });

    for (amount, response) in join_all(calls).await {
        assert!(response.success, "capture of {} failed: {}", amount, response.message);
        assert_eq!(response.field("amount"), Some(&json!(amount)));
    }

    assert_eq!(bridge.exchanges(), 32);
    bridge.shutdown().await.unwrap();
}
