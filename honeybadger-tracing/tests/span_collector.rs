use async_trait::async_trait;
use honeybadger::{
    Client, Config, Context, Notice, NoticeInput, TransportError,
    hooks::before_notify::BeforeNotifyHook,
    notice::NoticeMetadata,
    transport::{Transport, TransportOptions, TransportResponse},
};
use honeybadger_tracing::{DEFAULT_CONTEXT_KEY, HoneybadgerLayer, SpanCollector, current_spans};
use serde_json::json;
use tracing_subscriber::{Registry, layer::SubscriberExt};

struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(
        &self,
        _payload: serde_json::Value,
        _options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status_code: 201,
            body: String::new(),
        })
    }
}

fn collector() -> SpanCollector {
    SpanCollector {
        context_key: DEFAULT_CONTEXT_KEY,
        capture_fields: true,
        enabled: true,
    }
}

fn notice() -> Notice {
    Notice::build(
        NoticeInput::message("boom"),
        Context::new(),
        &NoticeMetadata::default(),
    )
    .unwrap()
}

#[test]
fn test_collects_span_chain_innermost_first() {
    let subscriber = Registry::default().with(HoneybadgerLayer);
    tracing::subscriber::with_default(subscriber, || {
        let outer = tracing::info_span!("request", request_id = "r-1");
        let _outer = outer.enter();
        let inner = tracing::info_span!("charge", amount = 1250_u64, retry = false);
        let _inner = inner.enter();

        let mut notice = notice();
        collector().before_notify(&mut notice);

        assert_eq!(
            notice.context.get(DEFAULT_CONTEXT_KEY),
            Some(&json!([
                { "name": "charge", "fields": { "amount": 1250, "retry": false } },
                { "name": "request", "fields": { "request_id": "r-1" } },
            ]))
        );
    });
}

#[test]
fn test_recorded_fields_are_captured() {
    let subscriber = Registry::default().with(HoneybadgerLayer);
    tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("job", attempt = tracing::field::Empty);
        span.record("attempt", 3_i64);
        let _span = span.enter();

        assert_eq!(
            current_spans(true),
            Some(json!([{ "name": "job", "fields": { "attempt": 3 } }]))
        );
        assert_eq!(current_spans(false), Some(json!([{ "name": "job" }])));
    });
}

#[test]
fn test_no_span_leaves_context_alone() {
    let subscriber = Registry::default().with(HoneybadgerLayer);
    tracing::subscriber::with_default(subscriber, || {
        let mut notice = notice();
        collector().before_notify(&mut notice);
        assert!(notice.context.get(DEFAULT_CONTEXT_KEY).is_none());
    });
}

#[test]
fn test_disabled_collector() {
    let subscriber = Registry::default().with(HoneybadgerLayer);
    tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("request");
        let _span = span.enter();

        let mut notice = notice();
        SpanCollector {
            enabled: false,
            ..collector()
        }
        .before_notify(&mut notice);
        assert!(notice.context.is_empty());
    });
}

#[tokio::test]
async fn test_client_hook_sees_caller_span() {
    let client = Client::builder()
        .config(Config::new("key").with_environment("production"))
        .transport(NullTransport)
        .without_stats()
        .build()
        .unwrap();
    client.before_notify(collector());

    let subscriber = Registry::default().with(HoneybadgerLayer);
    let prepared = tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("handler", user_id = 42_i64);
        let _span = span.enter();
        client
            .prepare(NoticeInput::message("boom"), Default::default())
            .unwrap()
    });

    assert_eq!(
        prepared.notice().context.get(DEFAULT_CONTEXT_KEY),
        Some(&json!([{ "name": "handler", "fields": { "user_id": 42 } }]))
    );

    let delivery = prepared.deliver().await;
    assert!(delivery.outcome.is_delivered());
}
