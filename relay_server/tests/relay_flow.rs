mod support;

use relay_server::RelaySettings;
use serde_json::json;
use std::time::Duration;
use support::{WsClient, scan, start_server};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[tokio::test]
async fn test_scan_fans_out_to_every_consumer() {
    let addr = start_server(RelaySettings::default()).await;

    let mut producer = WsClient::announce(addr, "producer").await;
    let initial = producer.recv_json().await;
    assert_eq!(initial, json!({"event": "presence_update", "data": {"consumerCount": 0}}));

    let mut first = WsClient::announce(addr, "consumer").await;
    let mut second = WsClient::announce(addr, "pc_client").await;
    assert_eq!(producer.recv_json().await["data"]["consumerCount"], 1);
    assert_eq!(producer.recv_json().await["data"]["consumerCount"], 2);

    producer.send(scan("9780131103627", "EAN_13")).await;

    let first_text = first.recv_text().await;
    let second_text = second.recv_text().await;
    assert_eq!(first_text, second_text);

    let relayed: serde_json::Value = serde_json::from_str(&first_text).expect("valid json");
    assert_eq!(relayed["event"], "scan_event");
    assert_eq!(relayed["data"]["payload"], "9780131103627");
    assert_eq!(relayed["data"]["symbology"], "EAN_13");

    assert_eq!(
        producer.recv_json().await,
        json!({"event": "scan_delivered", "data": {"deliveredTo": 2}})
    );
}

#[tokio::test]
async fn test_scan_without_consumers_is_confirmed_with_zero() {
    let addr = start_server(RelaySettings::default()).await;
    let mut producer = WsClient::announce(addr, "mobile").await;
    let _initial_presence = producer.recv_json().await;

    producer.send(scan("ABC123", "CODE_128")).await;

    assert_eq!(
        producer.recv_json().await,
        json!({"event": "scan_delivered", "data": {"deliveredTo": 0}})
    );
}

#[tokio::test]
async fn test_request_presence_and_heartbeat_are_answered() {
    let addr = start_server(RelaySettings::default()).await;
    let _consumer = WsClient::announce(addr, "consumer").await;
    let mut producer = WsClient::announce(addr, "producer").await;
    let _initial_presence = producer.recv_json().await;

    producer.send(json!({"event": "request_presence"})).await;
    assert_eq!(
        producer.recv_json().await,
        json!({"event": "presence_update", "data": {"consumerCount": 1}})
    );

    producer.send(json!({"event": "heartbeat"})).await;
    assert_eq!(producer.recv_json().await, json!({"event": "heartbeat_ack"}));
}

#[tokio::test]
async fn test_silent_consumer_is_reaped_and_producer_told_once() {
    let addr = start_server(RelaySettings {
        heartbeat_grace: Duration::from_millis(400),
        reap_interval: Duration::from_millis(50),
        ..RelaySettings::default()
    })
    .await;

    let mut producer = WsClient::announce(addr, "producer").await;
    let _initial_presence = producer.recv_json().await;
    let mut consumer = WsClient::announce(addr, "consumer").await;
    assert_eq!(producer.recv_json().await["data"]["consumerCount"], 1);

    // Keep the producer alive while the consumer stays silent past the grace period.
    let mut presence_counts = Vec::new();
    for _ in 0..12 {
        producer.send(json!({"event": "heartbeat"})).await;
        while let Some(text) = producer.try_recv_text(Duration::from_millis(100)).await {
            let message: serde_json::Value = serde_json::from_str(&text).expect("valid json");
            if message["event"] == "presence_update" {
                presence_counts.push(message["data"]["consumerCount"].clone());
            }
        }
    }

    assert_eq!(presence_counts, vec![json!(0)]);

    let frame = consumer.expect_close().await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Policy);
    assert_eq!(frame.reason.as_str(), "heartbeat timeout");
}

#[tokio::test]
async fn test_invalid_role_closes_connection() {
    let addr = start_server(RelaySettings::default()).await;
    let mut client = WsClient::connect(addr).await;

    client
        .send(json!({"event": "client_info", "data": {"role": "spectator"}}))
        .await;

    let frame = client.expect_close().await.expect("close frame");
    assert_eq!(frame.code, CloseCode::Policy);
    assert_eq!(frame.reason.as_str(), "invalid role");
}

#[tokio::test]
async fn test_scan_before_role_announcement_closes_connection() {
    let addr = start_server(RelaySettings::default()).await;
    let mut client = WsClient::connect(addr).await;

    client.send(scan("ABC123", "QR_CODE")).await;

    let frame = client.expect_close().await.expect("close frame");
    assert_eq!(frame.reason.as_str(), "role announcement required");
}

#[tokio::test]
async fn test_duplicate_role_announcement_closes_session() {
    let addr = start_server(RelaySettings::default()).await;
    let mut producer = WsClient::announce(addr, "producer").await;
    let mut consumer = WsClient::announce(addr, "consumer").await;
    let _presence = producer.recv_json().await;

    consumer
        .send(json!({"event": "client_info", "data": {"role": "consumer"}}))
        .await;

    let frame = consumer.expect_close().await.expect("close frame");
    assert_eq!(frame.reason.as_str(), "duplicate role announcement");
    // The rejected consumer leaves the presence set.
    assert_eq!(producer.recv_json().await["data"]["consumerCount"], 1);
    assert_eq!(producer.recv_json().await["data"]["consumerCount"], 0);
}

#[tokio::test]
async fn test_blank_scan_is_rejected_without_routing() {
    let addr = start_server(RelaySettings::default()).await;
    let mut consumer = WsClient::announce(addr, "consumer").await;
    let mut producer = WsClient::announce(addr, "producer").await;
    let _initial_presence = producer.recv_json().await;

    producer.send(scan("   ", "QR_CODE")).await;

    assert_eq!(
        producer.recv_json().await,
        json!({"event": "scan_rejected", "data": {"reason": "payload is required"}})
    );
    assert!(
        consumer
            .try_recv_text(Duration::from_millis(200))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_status_endpoint_reports_sessions_and_scans() {
    let addr = start_server(RelaySettings::default()).await;
    let _consumer = WsClient::announce(addr, "consumer").await;
    let mut producer = WsClient::announce(addr, "producer").await;
    let _initial_presence = producer.recv_json().await;
    producer.send(scan("ABC123", "QR_CODE")).await;
    let _delivered = producer.recv_json().await;

    let status: serde_json::Value = reqwest::get(format!("http://{addr}/api/status"))
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("status should be json");

    assert_eq!(status["producers"], 1);
    assert_eq!(status["consumers"], 1);
    assert_eq!(status["scans_routed"], 1);
    assert_eq!(status["scans_delivered"], 1);
}
