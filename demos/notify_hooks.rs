//! `beforeNotify` and `afterNotify` hooks.
//!
//! Before hooks can enrich a notice or drop it; after hooks observe how the
//! delivery went. Hooks are per client, so two clients in one process can be
//! configured independently.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use honeybadger::{
    HookDecision, Notice, Outcome, TransportError,
    hooks::{Hooks, after_notify::AfterNotifyHook, before_notify::BeforeNotifyHook},
    prelude::*,
    transport::{Transport, TransportOptions, TransportResponse},
};

/// Accepts every notice without sending it anywhere.
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
            body: r#"{"id":"n-1"}"#.to_owned(),
        })
    }
}

/// Drops notices for errors nobody needs to hear about.
struct IgnoreBrokenPipes;

impl BeforeNotifyHook for IgnoreBrokenPipes {
    fn before_notify(&self, notice: &mut Notice) -> HookDecision {
        if notice.message.contains("broken pipe") {
            HookDecision::Skip
        } else {
            HookDecision::Proceed
        }
    }
}

/// Counts outcomes by kind.
#[derive(Default)]
struct OutcomeCounter {
    delivered: AtomicUsize,
    skipped: AtomicUsize,
    rejected: AtomicUsize,
}

struct CountOutcomes(Arc<OutcomeCounter>);

impl AfterNotifyHook for CountOutcomes {
    fn after_notify(&self, outcome: &Outcome, notice: &Notice) {
        let counter = match outcome {
            Outcome::Delivered { .. } => &self.0.delivered,
            Outcome::Skipped(reason) => {
                println!("skipped {:?}: {reason}", notice.message);
                &self.0.skipped
            }
            Outcome::Rejected(_) => &self.0.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let counter = Arc::new(OutcomeCounter::default());

    let client = Client::builder()
        .config(Config::new("demo-api-key").with_environment("production"))
        .transport(NullTransport)
        .without_stats()
        .hooks(
            Hooks::new()
                .before_notify(IgnoreBrokenPipes)
                .before_notify(|notice: &mut Notice| {
                    notice.tags.push("demo".to_owned());
                    notice.context.insert("hostname_checked", true);
                })
                .after_notify(CountOutcomes(counter.clone())),
        )
        .build()?;

    // Hooks can also be added later; they apply to notices created afterwards.
    client.after_notify(|error: Option<&honeybadger::ReportingError>, notice: &Notice| {
        println!(
            "{:<45} tags={:?} error={:?}",
            notice.message,
            notice.tags,
            error.map(ToString::to_string)
        );
    });

    client
        .notify(&std::io::Error::other("connection reset by peer"))
        .await?;
    client
        .notify(&std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"))
        .await?;
    client
        .notify_with(
            NoticeInput::message("checkout latency above threshold"),
            NotifyOptions::new().after_notify(
                |_error: Option<&honeybadger::ReportingError>, notice: &Notice| {
                    println!("per-call hook saw context {:?}", notice.context);
                },
            ),
        )
        .await?;

    println!("\nHooks registered on this client:\n{client:#?}");
    println!(
        "\ndelivered={} skipped={} rejected={}",
        counter.delivered.load(Ordering::Relaxed),
        counter.skipped.load(Ordering::Relaxed),
        counter.rejected.load(Ordering::Relaxed),
    );

    Ok(())
}
