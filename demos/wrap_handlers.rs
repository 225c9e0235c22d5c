//! Wrapping handlers so their errors are reported before they propagate.
//!
//! Shows the three handler conventions, the serverless adapter and the tower
//! middleware pair. Every error below is reported once, with the context of
//! the invocation it happened in, and then returned unchanged.

use std::time::Duration;

use async_trait::async_trait;
use honeybadger::{
    Notice, ReportingError, TransportError,
    prelude::*,
    transport::{Transport, TransportOptions, TransportResponse},
};
use tower::{ServiceBuilder, ServiceExt, service_fn};

/// Pretends to be a slow collector.
struct SlowTransport;

#[async_trait]
impl Transport for SlowTransport {
    async fn send(
        &self,
        payload: serde_json::Value,
        _options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!(
            "  -> sent {} with context {}",
            payload["error"]["class"], payload["request"]["context"]
        );
        Ok(TransportResponse {
            status_code: 201,
            body: "{}".to_owned(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("image {0} is not a PNG")]
    BadImage(String),
    #[error("queue {0} is unavailable")]
    QueueDown(&'static str),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .config(
            Config::new("demo-api-key")
                .with_environment("production")
                .with_grace_period(Duration::from_secs(1)),
        )
        .transport(SlowTransport)
        .without_stats()
        .build()?;

    client.after_notify(|error: Option<&ReportingError>, notice: &Notice| match error {
        Some(error) => println!("  -> {} was not delivered: {error}", notice.class),
        None => println!("  -> {} settled", notice.class),
    });

    println!("Sync handler");
    let resize = client.wrap(Handler::sync({
        let client = client.clone();
        move |name: String| {
            client.set_context(context! { "image" => name.clone() });
            if name.ends_with(".png") {
                Ok(name)
            } else {
                Err(JobError::BadImage(name))
            }
        }
    }));
    let sync_result = tokio::task::spawn_blocking(move || {
        resize.call_sync("cat.jpg".to_owned())
    })
    .await?;
    println!("  returned {sync_result:?}\n");

    println!("Async handler");
    let enqueue = client.wrap(Handler::future({
        let client = client.clone();
        move |queue: &'static str| {
            let client = client.clone();
            async move {
                client.set_context(context! { "queue" => queue });
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<(), _>(JobError::QueueDown(queue))
            }
        }
    }));
    if let Handler::Async(enqueue) = enqueue {
        println!("  returned {:?}\n", enqueue("thumbnails").await);
    }

    println!("Callback handler through the serverless adapter");
    let lambda = client.lambda_handler(Handler::callback(
        |event: serde_json::Value, done: Completion<String, JobError>| {
            tokio::spawn(async move {
                let key = event["key"].as_str().unwrap_or_default().to_owned();
                done.complete(Err(JobError::BadImage(key)));
            });
        },
    ));
    let lambda_result = lambda.call(serde_json::json!({ "key": "upload.gif" })).await;
    println!("  returned {lambda_result:?}\n");

    println!("Tower middleware");
    let service = ServiceBuilder::new()
        .layer(client.request_handler())
        .layer(client.error_handler().with_options(|path: &&'static str| {
            NotifyOptions::new().url(*path)
        }))
        .service(service_fn({
            let client = client.clone();
            move |path: &'static str| {
                let client = client.clone();
                async move {
                    client.set_context(context! { "path" => path });
                    Err::<(), _>(JobError::QueueDown("emails"))
                }
            }
        }));
    println!("  returned {:?}", service.oneshot("/signup").await);

    Ok(())
}
