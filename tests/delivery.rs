//! Delivery pipeline: preconditions, hooks, transport outcomes.

mod common;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use honeybadger::{
    Client, Config, HookDecision, InvalidInputError, Notice, NoticeInput, NotifyOptions, Outcome,
    ReportingError, SkipReason, StatsError, TransportError, context,
    hooks::Hooks,
    stats::{LoadStats, Stats, StatsProvider},
};

use crate::common::{RecordingTransport, Reply, client, client_with, config};

type Seen = Arc<Mutex<Vec<Option<String>>>>;

/// Records the error each `afterNotify` call receives.
fn record_errors(client: &Client) -> Seen {
    let seen = Seen::default();
    let sink = seen.clone();
    client.after_notify(move |error: Option<&ReportingError>, _notice: &Notice| {
        sink.lock().unwrap().push(error.map(ToString::to_string));
    });
    seen
}

#[tokio::test]
async fn delivered_notice_reports_collector_id() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let err = std::io::Error::other("disk full");
    let delivery = client.notify(&err).await.unwrap();

    assert!(delivery.outcome.is_delivered());
    assert_eq!(delivery.id(), Some("notice-1"));
    assert_eq!(transport.calls(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![None]);

    let payload = &transport.payloads()[0];
    assert_eq!(payload["error"]["class"], "Error");
    assert_eq!(payload["error"]["message"], "disk full");
    assert_eq!(payload["server"]["environment_name"], "production");
    assert_eq!(payload["notifier"]["language"], "rust");
}

#[tokio::test]
async fn notify_never_fails_on_transport_errors() {
    for reply in [
        Reply::Status(403, ""),
        Reply::Status(500, "internal error"),
        Reply::Fail(TransportError::Timeout(Duration::from_secs(10))),
        Reply::Fail(TransportError::Network("connection refused".to_owned())),
        Reply::Panic,
    ] {
        let transport = RecordingTransport::new(reply);
        let client = client(&transport);
        let seen = record_errors(&client);

        let delivery = client
            .notify(NoticeInput::message("boom"))
            .await
            .expect("notify only fails on invalid input");

        assert!(matches!(delivery.outcome, Outcome::Rejected(_)));
        assert_eq!(transport.calls(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_some());
    }
}

#[tokio::test]
async fn forbidden_response_mentions_status() {
    let transport = RecordingTransport::new(Reply::Status(403, ""));
    let client = client(&transport);
    let seen = record_errors(&client);

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert_eq!(delivery.outcome.error().and_then(ReportingError::status), Some(403));
    assert!(seen.lock().unwrap()[0].as_deref().unwrap().contains("403"));
}

#[tokio::test]
async fn blank_message_is_the_only_error() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let result = client.notify(NoticeInput::message("   ")).await;

    assert_eq!(result.unwrap_err(), InvalidInputError);
    assert_eq!(transport.calls(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn veto_skips_transport_but_runs_after_hooks_once() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    client.before_notify(|_notice: &mut Notice| HookDecision::Skip);
    let seen = record_errors(&client);

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert!(matches!(delivery.outcome, Outcome::Skipped(SkipReason::Vetoed)));
    assert_eq!(transport.calls(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn veto_short_circuits_later_before_hooks() {
    let transport = RecordingTransport::accepting();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let client = Client::builder()
        .config(config())
        .transport(transport.clone())
        .without_stats()
        .hooks(
            Hooks::new()
                .before_notify(|notice: &mut Notice| notice.message != "drop me")
                .before_notify(move |_notice: &mut Notice| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .build()
        .unwrap();

    client.notify(NoticeInput::message("drop me")).await.unwrap();
    client.notify(NoticeInput::message("keep me")).await.unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls(), 1);
}

fn panicking_before_hook(_notice: &mut Notice) -> HookDecision {
    panic!("before hook exploded")
}

#[tokio::test]
async fn panicking_before_hook_skips_the_notice() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    client.before_notify(panicking_before_hook);

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert!(matches!(delivery.outcome, Outcome::Skipped(SkipReason::Vetoed)));
    assert_eq!(transport.calls(), 0);
}

fn panicking_after_hook(_error: Option<&ReportingError>, _notice: &Notice) {
    panic!("after hook exploded")
}

#[tokio::test]
async fn panicking_after_hook_does_not_stop_later_hooks() {
    let client = client(&RecordingTransport::accepting());
    let first = record_errors(&client);
    client.after_notify(panicking_after_hook);
    let third = record_errors(&client);

    client.notify(NoticeInput::message("boom")).await.unwrap();

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(third.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_api_key_skips_without_network() {
    let transport = RecordingTransport::accepting();
    let client = client_with(Config::default().with_environment("production"), &transport);
    let seen = record_errors(&client);

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert!(matches!(delivery.outcome, Outcome::Skipped(SkipReason::MissingApiKey)));
    assert_eq!(transport.calls(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn development_environment_disables_reporting() {
    let transport = RecordingTransport::accepting();
    let client = client_with(
        Config::new("key").with_environment("development"),
        &transport,
    );

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();
    assert!(matches!(delivery.outcome, Outcome::Skipped(SkipReason::ReportingDisabled)));

    client.configure(|config| config.report_data = Some(true));
    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();
    assert!(delivery.outcome.is_delivered());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn before_hook_edits_are_seen_by_after_hooks_and_transport() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    client.before_notify(|notice: &mut Notice| {
        notice.context.insert("enriched", true);
        notice.fingerprint = Some("custom".to_owned());
    });

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    client.after_notify(move |_error: Option<&ReportingError>, notice: &Notice| {
        *sink.lock().unwrap() = notice.context.get("enriched").cloned();
    });

    client.notify(NoticeInput::message("boom")).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(serde_json::json!(true)));
    let payload = &transport.payloads()[0];
    assert_eq!(payload["request"]["context"]["enriched"], true);
    assert_eq!(payload["error"]["fingerprint"], "custom");
}

#[tokio::test]
async fn per_call_after_hook_runs_after_global_ones() {
    let client = client(&RecordingTransport::accepting());
    let order = Arc::new(Mutex::new(Vec::new()));

    let global = order.clone();
    client.after_notify(move |_error: Option<&ReportingError>, _notice: &Notice| {
        global.lock().unwrap().push("global");
    });
    let per_call = order.clone();
    let options = NotifyOptions::new()
        .context(context! { "order_id" => 7 })
        .after_notify(move |_error: Option<&ReportingError>, notice: &Notice| {
            assert_eq!(notice.context.get("order_id"), Some(&serde_json::json!(7)));
            per_call.lock().unwrap().push("per-call");
        });

    client
        .notify_with(NoticeInput::message("boom"), options)
        .await
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["global", "per-call"]);
}

#[tokio::test]
async fn hooks_registered_later_only_affect_later_notices() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let pending = client.notify(NoticeInput::message("first"));
    client.before_notify(|_notice: &mut Notice| false);

    assert!(pending.await.unwrap().outcome.is_delivered());
    assert!(client.notify(NoticeInput::message("second")).await.unwrap().outcome.is_skipped());
}

struct FailingStats;

#[async_trait]
impl StatsProvider for FailingStats {
    async fn stats(&self) -> Result<Stats, StatsError> {
        Err(StatsError::Parse("/proc/meminfo"))
    }
}

struct SlowStats;

#[async_trait]
impl StatsProvider for SlowStats {
    async fn stats(&self) -> Result<Stats, StatsError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Stats::default())
    }
}

struct FixedStats;

#[async_trait]
impl StatsProvider for FixedStats {
    async fn stats(&self) -> Result<Stats, StatsError> {
        Ok(Stats {
            mem: None,
            load: Some(LoadStats {
                one: 0.5,
                five: 0.25,
                fifteen: 0.125,
            }),
        })
    }
}

#[tokio::test]
async fn stats_are_attached_to_the_payload() {
    let transport = RecordingTransport::accepting();
    let client = Client::builder()
        .config(config())
        .transport(transport.clone())
        .stats_provider(FixedStats)
        .build()
        .unwrap();

    client.notify(NoticeInput::message("boom")).await.unwrap();

    assert_eq!(transport.payloads()[0]["server"]["stats"]["load"]["one"], 0.5);
}

async fn assert_delivered_without_stats(stats: impl StatsProvider) {
    let transport = RecordingTransport::accepting();
    let client = Client::builder()
        .config(config())
        .transport(transport.clone())
        .stats_provider(stats)
        .build()
        .unwrap();

    let delivery = client.notify(NoticeInput::message("boom")).await.unwrap();

    assert!(delivery.outcome.is_delivered());
    assert!(transport.payloads()[0]["server"].get("stats").is_none());
}

#[tokio::test]
async fn failing_stats_do_not_block_delivery() {
    assert_delivered_without_stats(FailingStats).await;
}

#[tokio::test(start_paused = true)]
async fn slow_stats_do_not_block_delivery() {
    assert_delivered_without_stats(SlowStats).await;
}

#[tokio::test]
async fn concurrent_notifies_are_independent() {
    let transport = RecordingTransport::with_delay(
        Reply::Status(201, r#"{"id":"x"}"#),
        Duration::from_millis(20),
    );
    let client = client(&transport);

    let deliveries = futures::future::join_all(
        (0..10).map(|i| client.notify(NoticeInput::message(format!("notice {i}")))),
    )
    .await;

    assert_eq!(transport.calls(), 10);
    for (i, delivery) in deliveries.into_iter().enumerate() {
        assert_eq!(delivery.unwrap().notice.message, format!("notice {i}"));
    }
}
