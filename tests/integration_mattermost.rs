//! Integration tests for Mattermost notification sending.
//!
//! Uses wiremock to simulate Mattermost webhook endpoints.

use std::sync::Arc;
use std::time::Duration;

use budgetwatch::config::SecretString;
use budgetwatch::error::{NotifyError, PipelineError};
use budgetwatch::state::{KvStateStore, MemoryBackend};
use budgetwatch::template::{COLOR_EXCEEDED, COLOR_WARNING};
use budgetwatch::{MattermostNotifier, MessageRenderer, Pipeline, RetryPolicy, Timeouts};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_pipeline(webhook_url: &str, channel: &str, notify_timeout: Duration) -> Pipeline {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to create client");

    let notifier = MattermostNotifier::new(
        "mattermost".to_string(),
        SecretString::new(webhook_url.to_string()),
        channel.to_string(),
        client,
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
        },
    );

    Pipeline::new(
        Arc::new(KvStateStore::new(MemoryBackend::new(), "test")),
        Arc::new(notifier),
        MessageRenderer::default(),
        Timeouts {
            state_store: Duration::from_secs(1),
            notify: notify_timeout,
        },
    )
}

fn alert(cost: u32, threshold: &str) -> Vec<u8> {
    format!(
        r#"{{"budgetId":"b-7","budgetDisplayName":"analytics","costAmount":{},"budgetAmount":1000,"currencyCode":"USD","alertThresholdExceeded":{}}}"#,
        cost, threshold
    )
    .into_bytes()
}

async fn received_json(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).expect("payload should be JSON"))
        .collect()
}

#[tokio::test]
async fn attachment_carries_rendered_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/budget"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let pipeline = make_pipeline(
        &format!("{}/hooks/budget", server.uri()),
        "finance",
        Duration::from_secs(5),
    );

    pipeline.handle(&alert(500, "0.5")).await.unwrap();
    pipeline.handle(&alert(1250, "1.2")).await.unwrap();

    let bodies = received_json(&server).await;
    assert_eq!(bodies.len(), 2);

    let warning = &bodies[0];
    assert_eq!(warning["channel"], "finance");
    let attachment = &warning["attachments"][0];
    assert_eq!(attachment["color"], COLOR_WARNING);
    assert!(
        attachment["title"].as_str().unwrap().contains("analytics"),
        "{}",
        attachment
    );
    assert!(attachment["text"].as_str().unwrap().contains("500.00 USD"));
    assert!(attachment["text"].as_str().unwrap().contains("50%"));

    let exceeded = &bodies[1]["attachments"][0];
    assert_eq!(exceeded["color"], COLOR_EXCEEDED);
    assert!(exceeded["text"].as_str().unwrap().contains("1,250.00 USD"));

    server.verify().await;
}

#[tokio::test]
async fn client_error_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = make_pipeline(
        &format!("{}/hooks/gone", server.uri()),
        "",
        Duration::from_secs(5),
    );

    let err = pipeline.handle(&alert(500, "0.5")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Notify(NotifyError::Permanent(_))));

    // Nothing committed: the next delivery tries again.
    let err = pipeline.handle(&alert(500, "0.5")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Notify(_)));

    let bodies = received_json(&server).await;
    assert!(bodies[0].get("channel").is_none());
}

#[tokio::test]
async fn rate_limit_honors_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/busy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = make_pipeline(
        &format!("{}/hooks/busy", server.uri()),
        "",
        Duration::from_secs(5),
    );

    assert!(pipeline.handle(&alert(500, "0.5")).await.unwrap().notified());
    server.verify().await;
}

#[tokio::test]
async fn slow_webhook_hits_notify_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let pipeline = make_pipeline(
        &format!("{}/hooks/slow", server.uri()),
        "",
        Duration::from_millis(200),
    );

    let err = pipeline.handle(&alert(500, "0.5")).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::Notify(NotifyError::Timeout(_))),
        "{:?}",
        err
    );
    assert!(err.is_retryable());
}
