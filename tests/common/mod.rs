#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use honeybadger::{
    Client, Config, TransportError,
    transport::{Transport, TransportOptions, TransportResponse},
};

/// What the recording transport answers.
#[derive(Clone, Debug)]
pub enum Reply {
    Status(u16, &'static str),
    Fail(TransportError),
    Panic,
}

#[derive(Debug)]
struct Inner {
    calls: AtomicUsize,
    payloads: Mutex<Vec<serde_json::Value>>,
    reply: Reply,
    delay: Duration,
}

/// Transport that records every payload instead of sending it.
#[derive(Clone, Debug)]
pub struct RecordingTransport(Arc<Inner>);

impl RecordingTransport {
    pub fn new(reply: Reply) -> Self {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub fn with_delay(reply: Reply, delay: Duration) -> Self {
        Self(Arc::new(Inner {
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
            reply,
            delay,
        }))
    }

    pub fn accepting() -> Self {
        Self::new(Reply::Status(201, r#"{"id":"notice-1"}"#))
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.0.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        payload: serde_json::Value,
        _options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        self.0.payloads.lock().unwrap().push(payload);
        if !self.0.delay.is_zero() {
            tokio::time::sleep(self.0.delay).await;
        }
        match &self.0.reply {
            Reply::Status(status_code, body) => Ok(TransportResponse {
                status_code: *status_code,
                body: (*body).to_owned(),
            }),
            Reply::Fail(error) => Err(error.clone()),
            Reply::Panic => panic!("transport exploded"),
        }
    }
}

pub fn config() -> Config {
    Config::new("test-api-key").with_environment("production")
}

pub fn client(transport: &RecordingTransport) -> Client {
    client_with(config(), transport)
}

pub fn client_with(config: Config, transport: &RecordingTransport) -> Client {
    Client::builder()
        .config(config)
        .transport(transport.clone())
        .without_stats()
        .build()
        .unwrap()
}

/// Error type used by the handler tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub &'static str);
