//! The reqwest transport against a mock collector.

#![cfg(feature = "http")]

use std::time::Duration;

use honeybadger::{
    Client, Config, NoticeInput, NotifyOptions, Outcome, ReportingError, TransportError, context,
    transport::{HttpTransport, Transport, TransportOptions},
};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn client(server: &MockServer) -> Client {
    Client::builder()
        .config(
            Config::new("hb-api-key")
                .with_endpoint(server.uri())
                .with_environment("production")
                .with_timeout(Duration::from_secs(2)),
        )
        .without_stats()
        .build()
        .unwrap()
}

async fn received_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    serde_json::from_slice(&requests[0].body).unwrap()
}

#[tokio::test]
async fn posts_notice_with_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notices"))
        .and(header("X-API-Key", "hb-api-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "5f0c4d42-7e1a" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let delivery = client(&server)
        .notify(NoticeInput::message("worker crashed"))
        .await
        .unwrap();

    assert_eq!(delivery.id(), Some("5f0c4d42-7e1a"));
    let body = received_body(&server).await;
    assert_eq!(body["error"]["message"], "worker crashed");
    assert_eq!(body["server"]["environment_name"], "production");
    assert_eq!(body["notifier"]["name"], "honeybadger");
}

#[tokio::test]
async fn forbidden_is_rejected_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notices"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let delivery = client(&server)
        .notify(NoticeInput::message("boom"))
        .await
        .unwrap();

    let Outcome::Rejected(error) = &delivery.outcome else {
        panic!("expected a rejected delivery, got {:?}", delivery.outcome);
    };
    assert_eq!(error.status(), Some(403));
    assert!(error.to_string().contains("403"));
}

#[tokio::test]
async fn filtered_keys_and_cookies_are_masked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "1" })))
        .mount(&server)
        .await;

    let options = NotifyOptions::new()
        .params(context! {
            "username" => "ann",
            "password" => "hunter2",
            "card" => json!({ "creditcard": "4111111111111111", "last4": "1111" }),
        })
        .cookies("session=abc; user_password=secret");

    client(&server)
        .notify_with(NoticeInput::message("signup failed"), options)
        .await
        .unwrap();

    let body = received_body(&server).await;
    let params = &body["request"]["params"];
    assert_eq!(params["username"], "ann");
    assert_eq!(params["password"], "[FILTERED]");
    assert_eq!(params["card"]["creditcard"], "[FILTERED]");
    assert_eq!(params["card"]["last4"], "1111");
    assert_eq!(
        body["request"]["cgi_data"]["HTTP_COOKIE"],
        "session=abc;user_password=[FILTERED]"
    );
}

#[tokio::test]
async fn slow_collector_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = HttpTransport::new().unwrap();
    let options = TransportOptions {
        endpoint: server.uri(),
        api_key: "key".to_owned(),
        timeout: Duration::from_millis(100),
        max_object_depth: 8,
        filters: Vec::new(),
    };

    let result = transport.send(json!({}), &options).await;

    assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(100))));
}

#[tokio::test]
async fn unreachable_collector_is_a_transport_error() {
    let client = Client::builder()
        .config(
            Config::new("key")
                .with_endpoint("http://127.0.0.1:9")
                .with_environment("production"),
        )
        .without_stats()
        .build()
        .unwrap();

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert!(matches!(
        delivery.outcome,
        Outcome::Rejected(ReportingError::Transport(TransportError::Network(_)))
    ));
}
