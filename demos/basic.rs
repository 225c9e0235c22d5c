//! Basic introduction to honeybadger error reporting.
//!
//! This example demonstrates the fundamental concepts:
//! 1. Building a client from configuration
//! 2. Reporting errors and messages with `notify`
//! 3. Attaching context, globally and per unit of work
//! 4. Inspecting the delivery outcome
//!
//! Notices are printed instead of sent, so no API key or network is needed.

use std::fs;

use async_trait::async_trait;
use honeybadger::{
    Context, NotifyOptions, TransportError,
    prelude::*,
    transport::{Transport, TransportOptions, TransportResponse},
};

/// Prints each payload the way the collector would receive it.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(
        &self,
        payload: serde_json::Value,
        _options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );
        Ok(TransportResponse {
            status_code: 201,
            body: r#"{"id":"local-demo"}"#.to_owned(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to load user configuration")]
struct ConfigError(#[source] std::io::Error);

fn load_user_config() -> Result<String, ConfigError> {
    fs::read_to_string("/nonexistent/config.toml").map_err(ConfigError)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("honeybadger=debug")
        .init();

    let client = Client::builder()
        .config(
            Config::new("demo-api-key")
                .with_environment("production")
                .with_revision("4f2a9c1"),
        )
        .transport(StdoutTransport)
        .build()?;

    // Outside of any scope, context goes to the client's default context.
    client.set_context(context! { "service" => "billing" });

    println!("Example 1: Reporting an error with its causes\n");
    if let Err(err) = load_user_config() {
        let delivery = client.notify(&err).await?;
        println!("\nOutcome: {:?}\n", delivery.outcome);
    }

    println!("Example 2: A message with per-call options\n");
    let delivery = client
        .notify_with(
            NoticeInput::message("nightly invoice run took longer than expected"),
            NotifyOptions::new()
                .component("invoicing")
                .action("nightly_run")
                .tags(["slow"]),
        )
        .await?;
    println!("\nCollector id: {:?}\n", delivery.id());

    println!("Example 3: Context scoped to one unit of work\n");
    client
        .context_store()
        .run(Context::new(), async {
            client.set_context(context! { "invoice_id" => 1042 });
            let err = std::io::Error::other("payment provider returned 502");
            client.notify(&err).await.map(|_| ())
        })
        .await?;

    // The scoped context is gone; only the default context remains.
    println!("\nContext after the scope: {:?}", client.context());

    Ok(())
}
