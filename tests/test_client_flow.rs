//! End-to-end client behavior against a stubbed REST backend.
//!
//! The REST side talks to a wiremock server; the realtime side uses the
//! in-memory mock channel. Covers the login orchestration, session reuse,
//! directory dedup, and the degradation paths.

use sengled_bridge::config::{AccountSection, BridgeConfig, MqttSection, RestSection};
use sengled_bridge::testing::MockChannel;
use sengled_bridge::SengledClient;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> BridgeConfig {
    BridgeConfig {
        account: AccountSection {
            username: "user@example.com".to_string(),
            password: Some("hunter2".to_string()),
            password_env: None,
        },
        rest: RestSection {
            ucenter_base: server.uri(),
            life2_base: server.uri(),
            request_timeout_secs: 5,
        },
        mqtt: MqttSection::default(),
    }
}

async fn mount_auth(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/user/app/customer/v2/AuthenCross.json"))
        .and(body_partial_json(serde_json::json!({
            "user": "user@example.com",
            "pwd": "hunter2",
            "osType": "android",
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"jsessionId": "session-1"})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer, info: &str) {
    Mock::given(method("POST"))
        .and(path("/user/app/customer/isSessionTimeout.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"info": info})))
        .mount(server)
        .await;
}

async fn mount_server_info(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/life2/server/getServerInfo.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"inceptionAddr": "wss://test-mqtt.example.com:9443/mqtt"}),
        ))
        .mount(server)
        .await;
}

async fn mount_device_list(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/life2/device/list.json"))
        .and(header("sid", "session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "deviceList": [{
                "deviceUuid": "B0:CE:18:01:02:03",
                "category": "wifielement",
                "typeCode": "wifia19-L",
                "attributeList": [
                    {"name": "switch", "value": "0"},
                    {"name": "brightness", "value": "100"},
                    {"name": "name", "value": "Porch"}
                ]
            }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_brings_client_online() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);

    // Endpoint resolved and applied before the connect.
    let endpoint = channel.endpoint().unwrap();
    assert_eq!(endpoint.host, "test-mqtt.example.com");
    assert_eq!(endpoint.port, 9443);

    assert_eq!(channel.connect_count(), 1);
    assert_eq!(channel.reconnect_count(), 0);

    // Directory populated and the proxy subscribed its status topic.
    let devices = client.devices(false).await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].uuid(), "B0:CE:18:01:02:03");
    assert_eq!(devices[0].name(), "Porch");
    assert_eq!(
        channel.subscribed_topics(),
        vec!["wifielement/B0:CE:18:01:02:03/status".to_string()]
    );
}

#[tokio::test]
async fn test_second_login_reuses_live_session() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_probe(&server, "OK").await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);
    assert!(client.login().await);

    // One authentication, one connect: the second login probed the session
    // and stopped there. The .expect(1) on the auth mock verifies the call
    // count when the server drops.
    assert_eq!(channel.connect_count(), 1);
    assert_eq!(channel.reconnect_count(), 0);
}

#[tokio::test]
async fn test_expired_session_relogin_reconnects_channel() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;
    mount_probe(&server, "EXPIRED").await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);
    assert!(client.login().await);

    assert_eq!(channel.connect_count(), 1);
    assert_eq!(channel.reconnect_count(), 1);
}

#[tokio::test]
async fn test_login_heals_dead_channel_without_reauthentication() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_probe(&server, "OK").await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);
    // Transport drops; the session itself is still live.
    client.shutdown().await;
    assert!(client.login().await);

    assert_eq!(channel.connect_count(), 1);
    assert_eq!(channel.reconnect_count(), 1);
}

#[tokio::test]
async fn test_forced_refreshes_never_duplicate_proxies() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);
    let first = client.devices(true).await;
    let second = client.devices(true).await;

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    // Same proxy instance, not a same-looking duplicate.
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert_eq!(
        channel.subscription_count("wifielement/B0:CE:18:01:02:03/status"),
        1
    );
}

#[tokio::test]
async fn test_login_failure_leaves_client_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/app/customer/v2/AuthenCross.json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(!client.login().await);
    assert_eq!(channel.connect_count(), 0);
    assert!(client.devices(false).await.is_empty());
}

#[tokio::test]
async fn test_missing_token_in_login_response_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/app/customer/v2/AuthenCross.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(!client.login().await);
    assert_eq!(channel.connect_count(), 0);
}

#[tokio::test]
async fn test_endpoint_discovery_failure_is_non_fatal() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/life2/server/getServerInfo.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();

    assert!(client.login().await);
    // No endpoint was ever applied: the channel keeps whatever it had.
    assert!(channel.endpoint().is_none());
    assert_eq!(channel.connect_count(), 1);
}

#[tokio::test]
async fn test_device_list_failure_serves_cache() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_server_info(&server).await;

    // First fetch succeeds, then the backend starts failing.
    let list_guard = Mock::given(method("POST"))
        .and(path("/life2/device/list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "deviceList": [{"deviceUuid": "B0:CE:18:01:02:03", "attributeList": []}]
        })))
        .up_to_n_times(1)
        .mount_as_scoped(&server)
        .await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();
    assert!(client.login().await);
    assert_eq!(client.devices(false).await.len(), 1);

    drop(list_guard);
    Mock::given(method("POST"))
        .and(path("/life2/device/list.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // Forced refresh fails upstream; the cached proxy list survives.
    let devices = client.devices(true).await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].uuid(), "B0:CE:18:01:02:03");
}

#[tokio::test]
async fn test_status_push_flows_to_proxy_and_observer() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();
    assert!(client.login().await);

    let bulb = client.device("B0:CE:18:01:02:03").await.unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    bulb.set_observer(Box::new(move |name, value| {
        seen_clone
            .lock()
            .unwrap()
            .push((name.to_string(), format!("{value:?}")));
    }));

    assert!(bulb.toggle(true).await);
    channel.push(
        "wifielement/B0:CE:18:01:02:03/status",
        br#"[{"dn":"B0:CE:18:01:02:03","type":"switch","value":"1"}]"#,
    );

    assert!(bulb.on());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "switch");
}

#[tokio::test]
async fn test_scan_visits_devices_and_honors_cancellation() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_server_info(&server).await;
    mount_device_list(&server).await;

    let channel = Arc::new(MockChannel::new());
    let client = SengledClient::with_channel(&config_for(&server), channel.clone()).unwrap();
    assert!(client.login().await);

    let visited = client.scan(|_| {}).await;
    assert_eq!(visited, 1);

    // Cancelling before the walk reaches a device stops the iteration.
    let client_ref = &client;
    let visited = client_ref
        .scan(|_| {
            client_ref.cancel_scan();
        })
        .await;
    assert_eq!(visited, 1);
}
