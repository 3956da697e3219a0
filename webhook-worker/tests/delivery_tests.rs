//! End-to-end delivery tests against wiremock endpoints.

mod common;

use std::time::{Duration, Instant};

use common::{dispatcher, fast_settings, WebhookFixture, SECRET, UNREACHABLE_URL};
use huduglue::delivery::{SIGNATURE_HEADER, WEBHOOK_USER_AGENT};
use huduglue::{
    sign_payload, verify_signature_with_tolerance, DeliveryStatus, DispatchSettings, EventType,
    FileStore, Organization, WebhookStore,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_endpoint(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_successful_delivery_is_signed_and_recorded() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(200).set_body_string("ok")).await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri()))
        .secret(SECRET)
        .organization(1, "acme")
        .insert(store.as_ref());

    let org = Organization::new(1, Some("acme".to_string()));
    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({"id": 42}), Some(&org))
        .await;
    assert_eq!(delivered, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let body = String::from_utf8(request.body.clone()).unwrap();
    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(signature, sign_payload(&body, SECRET));
    assert!(verify_signature_with_tolerance(&body, signature, SECRET, 300));

    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(request.headers.get("user-agent").unwrap(), WEBHOOK_USER_AGENT);

    let envelope: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(envelope["event"], "asset_created");
    assert_eq!(envelope["data"], json!({"id": 42}));
    assert_eq!(envelope["webhook_id"], webhook.id);
    assert_eq!(envelope["organization"], "acme");
    assert!(envelope["timestamp"].is_i64());

    let deliveries = store.list_deliveries(webhook.id, 10).unwrap();
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert_eq!(delivery.response_code, Some(200));
    assert_eq!(delivery.response_body.as_deref(), Some("ok"));
    assert!(delivery.error_message.is_none());
    assert!(delivery.duration_ms.is_some());
    assert_eq!(delivery.payload, envelope);
}

#[tokio::test]
async fn test_unsigned_delivery_has_no_signature_header() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(204)).await;

    let (store, dispatcher) = dispatcher(fast_settings());
    WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());

    let envelope: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(envelope["organization"].is_null());
}

#[tokio::test]
async fn test_server_error_marks_delivery_failed() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(500).set_body_string("boom"),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({"id": 1}), None)
        .await;
    assert_eq!(delivered, 0);

    let deliveries = store.list_deliveries(webhook.id, 10).unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].response_code, Some(500));
    assert_eq!(deliveries[0].error_message.as_deref(), Some("HTTP 500: boom"));
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(302).insert_header("location", "/elsewhere"),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    assert_eq!(
        dispatcher.dispatch(EventType::AssetCreated, &json!({}), None).await,
        0
    );

    let deliveries = store.list_deliveries(webhook.id, 10).unwrap();
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].response_code, Some(302));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/slow",
        ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/slow", server.uri())).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 0);

    let deliveries = store.list_deliveries(webhook.id, 10).unwrap();
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(
        deliveries[0].error_message.as_deref(),
        Some("Request timeout after 1 seconds")
    );
    assert!(deliveries[0].response_code.is_none());
}

#[tokio::test]
async fn test_failures_are_isolated_between_webhooks() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/ok", ResponseTemplate::new(200)).await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let broken = WebhookFixture::new(UNREACHABLE_URL).insert(store.as_ref());
    let healthy = WebhookFixture::new(format!("{}/ok", server.uri())).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    let failed = &store.list_deliveries(broken.id, 10).unwrap()[0];
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert!(failed.error_message.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(failed.response_code.is_none());

    let succeeded = &store.list_deliveries(healthy.id, 10).unwrap()[0];
    assert_eq!(succeeded.status, DeliveryStatus::Success);
}

#[tokio::test]
async fn test_only_subscribed_active_webhooks_receive_events() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/assets", ResponseTemplate::new(200)).await;
    mock_endpoint(&server, "/passwords", ResponseTemplate::new(200)).await;
    mock_endpoint(&server, "/inactive", ResponseTemplate::new(200)).await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let assets = WebhookFixture::new(format!("{}/assets", server.uri()))
        .events(&[EventType::AssetCreated, EventType::AssetUpdated])
        .insert(store.as_ref());
    let passwords = WebhookFixture::new(format!("{}/passwords", server.uri()))
        .events(&[EventType::PasswordCreated])
        .insert(store.as_ref());
    let inactive = WebhookFixture::new(format!("{}/inactive", server.uri()))
        .inactive()
        .insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetUpdated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    assert_eq!(store.list_deliveries(assets.id, 10).unwrap().len(), 1);
    assert!(store.list_deliveries(passwords.id, 10).unwrap().is_empty());
    assert!(store.list_deliveries(inactive.id, 10).unwrap().is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/assets");
}

#[tokio::test]
async fn test_organization_scoping() {
    let server = MockServer::start().await;
    for route in ["/global", "/acme", "/globex"] {
        mock_endpoint(&server, route, ResponseTemplate::new(200)).await;
    }

    let (store, dispatcher) = dispatcher(fast_settings());
    let global = WebhookFixture::new(format!("{}/global", server.uri())).insert(store.as_ref());
    let acme = WebhookFixture::new(format!("{}/acme", server.uri()))
        .organization(1, "acme")
        .insert(store.as_ref());
    let globex = WebhookFixture::new(format!("{}/globex", server.uri()))
        .organization(2, "globex")
        .insert(store.as_ref());

    let org = Organization::new(1, Some("acme".to_string()));

    // Org-scoped events stay within the organization by default
    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), Some(&org))
        .await;
    assert_eq!(delivered, 1);
    assert_eq!(store.list_deliveries(acme.id, 10).unwrap().len(), 1);
    assert!(store.list_deliveries(global.id, 10).unwrap().is_empty());
    assert!(store.list_deliveries(globex.id, 10).unwrap().is_empty());

    // Global webhooks join in when enabled
    dispatcher.reload_settings(DispatchSettings {
        include_global_webhooks: true,
        ..fast_settings()
    });
    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), Some(&org))
        .await;
    assert_eq!(delivered, 2);
    assert_eq!(store.list_deliveries(global.id, 10).unwrap().len(), 1);
    assert!(store.list_deliveries(globex.id, 10).unwrap().is_empty());

    // Unscoped events reach every active webhook
    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 3);
    assert_eq!(store.list_deliveries(globex.id, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_global_switch_suppresses_all_deliveries() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(200)).await;

    let (store, dispatcher) = dispatcher(DispatchSettings {
        webhooks_enabled: false,
        ..fast_settings()
    });
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    assert_eq!(
        dispatcher.dispatch(EventType::AssetCreated, &json!({}), None).await,
        0
    );
    assert!(store.list_deliveries(webhook.id, 10).unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_large_response_body_is_truncated() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(200).set_body_string("x".repeat(5000)),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;

    let delivery = &store.list_deliveries(webhook.id, 10).unwrap()[0];
    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert_eq!(delivery.response_body.as_ref().unwrap().chars().count(), 1000);
}

#[tokio::test]
async fn test_oversized_multibyte_body_is_not_buffered() {
    let server = MockServer::start().await;
    // 8 MiB of two-byte characters
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(200).set_body_string("é".repeat(4 * 1024 * 1024)),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    let delivery = &store.list_deliveries(webhook.id, 10).unwrap()[0];
    assert_eq!(delivery.status, DeliveryStatus::Success);
    let body = delivery.response_body.as_ref().unwrap();
    assert_eq!(body.chars().count(), 1000);
    assert!(body.chars().all(|c| c == 'é'));
}

#[tokio::test]
async fn test_failed_body_excerpt_in_error_message() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(422).set_body_string("e".repeat(900)),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

    dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;

    let delivery = &store.list_deliveries(webhook.id, 10).unwrap()[0];
    let message = delivery.error_message.as_deref().unwrap();
    assert!(message.starts_with("HTTP 422: eee"));
    assert_eq!(message.chars().count(), "HTTP 422: ".len() + 200);
    assert_eq!(delivery.response_body.as_ref().unwrap().len(), 900);
}

#[tokio::test]
async fn test_no_delivery_left_pending() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/ok", ResponseTemplate::new(200)).await;
    mock_endpoint(&server, "/error", ResponseTemplate::new(503)).await;
    mock_endpoint(
        &server,
        "/slow",
        ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
    )
    .await;

    let (store, dispatcher) = dispatcher(fast_settings());
    for route in ["/ok", "/error", "/slow"] {
        WebhookFixture::new(format!("{}{}", server.uri(), route)).insert(store.as_ref());
    }
    WebhookFixture::new(UNREACHABLE_URL).insert(store.as_ref());

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    for webhook in store.list_webhooks().unwrap() {
        let deliveries = store.list_deliveries(webhook.id, 10).unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].status.is_terminal());
    }
}

#[tokio::test]
async fn test_custom_headers_cannot_override_protocol_headers() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(200)).await;

    let (store, dispatcher) = dispatcher(fast_settings());
    WebhookFixture::new(format!("{}/hook", server.uri()))
        .secret(SECRET)
        .header("X-Api-Key", "key-123")
        .header("User-Agent", "Spoofed/1.0")
        .header("X-Webhook-Signature", "sha256=forged")
        .insert(store.as_ref());

    assert_eq!(
        dispatcher.dispatch(EventType::AssetCreated, &json!({}), None).await,
        1
    );

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let body = String::from_utf8(request.body.clone()).unwrap();

    assert_eq!(request.headers.get("x-api-key").unwrap(), "key-123");
    assert_eq!(request.headers.get("user-agent").unwrap(), WEBHOOK_USER_AGENT);
    assert_eq!(
        request.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap(),
        sign_payload(&body, SECRET)
    );
}

#[tokio::test]
async fn test_deliveries_run_concurrently() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(800)),
    )
    .await;

    let (store, dispatcher) = dispatcher(DispatchSettings {
        concurrency: 4,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    });
    for _ in 0..4 {
        WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());
    }

    let start = Instant::now();
    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;

    assert_eq!(delivered, 4);
    // Four sequential deliveries would take at least 3.2s
    assert!(start.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn test_deadline_skips_unstarted_deliveries() {
    let server = MockServer::start().await;
    mock_endpoint(
        &server,
        "/hook",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)),
    )
    .await;

    let (store, dispatcher) = dispatcher(DispatchSettings {
        concurrency: 1,
        request_timeout: Duration::from_secs(5),
        deadline: Duration::from_secs(1),
        ..Default::default()
    });
    for _ in 0..3 {
        WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());
    }

    let delivered = dispatcher
        .dispatch(EventType::AssetCreated, &json!({}), None)
        .await;
    assert_eq!(delivered, 1);

    let rows: usize = store
        .list_webhooks()
        .unwrap()
        .iter()
        .map(|w| store.list_deliveries(w.id, 10).unwrap().len())
        .sum();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_send_test_ignores_subscription_and_active_flag() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(200)).await;

    let (store, dispatcher) = dispatcher(DispatchSettings {
        webhooks_enabled: false,
        ..fast_settings()
    });
    let webhook = WebhookFixture::new(format!("{}/hook", server.uri()))
        .events(&[EventType::PasswordCreated])
        .inactive()
        .insert(store.as_ref());

    let delivery = dispatcher
        .send_test(&webhook, EventType::AssetCreated, &json!({"test": true}))
        .await
        .unwrap();

    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert_eq!(delivery.event_type, EventType::AssetCreated);
    assert_eq!(store.get_delivery(delivery.id).unwrap(), delivery);
}

#[tokio::test]
async fn test_file_store_keeps_delivery_log() {
    let server = MockServer::start().await;
    mock_endpoint(&server, "/hook", ResponseTemplate::new(200)).await;

    let dir = tempfile::tempdir().unwrap();
    let webhook_id = {
        let store = std::sync::Arc::new(FileStore::open(dir.path()).unwrap());
        let dispatcher = huduglue::Dispatcher::new(store.clone(), fast_settings()).unwrap();
        let webhook = WebhookFixture::new(format!("{}/hook", server.uri())).insert(store.as_ref());

        dispatcher
            .dispatch(EventType::AssetCreated, &json!({}), None)
            .await;
        webhook.id
    };

    let reopened = FileStore::open(dir.path()).unwrap();
    let deliveries = reopened.list_deliveries(webhook_id, 10).unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Success);
}
