//! Wrapped handlers: reporting before propagation, for every convention.

mod common;

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use honeybadger::{
    Config, Notice, ReportingError, context,
    wrap::{Completion, Handler},
};
use tokio::sync::oneshot;

use crate::common::{HandlerError, RecordingTransport, Reply, client, client_with, config};

type Seen = Arc<Mutex<Vec<Option<String>>>>;

fn record_errors(client: &honeybadger::Client) -> Seen {
    let seen = Seen::default();
    let sink = seen.clone();
    client.after_notify(move |error: Option<&ReportingError>, _notice: &Notice| {
        sink.lock().unwrap().push(error.map(ToString::to_string));
    });
    seen
}

#[tokio::test]
async fn async_handler_error_is_reported_once_then_returned() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::future({
        let client = client.clone();
        move |order: u32| {
            let client = client.clone();
            async move {
                client.set_context(context! { "order" => order });
                tokio::task::yield_now().await;
                Err::<(), _>(HandlerError("card declined"))
            }
        }
    }));
    let Handler::Async(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let result = call(7).await;

    assert_eq!(result, Err(HandlerError("card declined")));
    assert_eq!(transport.calls(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);

    let payload = &transport.payloads()[0];
    assert_eq!(payload["error"]["class"], "HandlerError");
    assert_eq!(payload["error"]["message"], "handler failed: card declined");
    assert_eq!(payload["request"]["context"]["order"], 7);

    // The invocation's context did not leak out.
    assert!(client.context().is_empty());
}

#[tokio::test]
async fn async_handler_success_is_untouched() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let handler = client.wrap(Handler::future(|n: u32| async move {
        Ok::<_, HandlerError>(n * 2)
    }));
    let Handler::Async(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let started = Instant::now();
    assert_eq!(call(21).await, Ok(42));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_handler_error_is_reported_on_multi_thread_runtime() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::sync(|input: &'static str| {
        input.parse::<u32>().map_err(|_| HandlerError("not a number"))
    }));

    assert_eq!(handler.call_sync("12").unwrap(), Ok(12));
    assert_eq!(transport.calls(), 0);

    assert_eq!(handler.call_sync("twelve").unwrap(), Err(HandlerError("not a number")));
    // Reporting finished before the handler returned.
    assert_eq!(transport.calls(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn sync_handler_outside_any_runtime() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let handler = client.wrap(Handler::sync(|_: ()| Err::<(), _>(HandlerError("boom"))));

    assert_eq!(handler.call_sync(()).unwrap(), Err(HandlerError("boom")));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn sync_handler_on_current_thread_runtime() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let handler = client.wrap(Handler::sync(|_: ()| Err::<(), _>(HandlerError("boom"))));

    assert_eq!(handler.call_sync(()).unwrap(), Err(HandlerError("boom")));
    assert_eq!(transport.calls(), 1);
}

fn slow_collector_client(transport: &RecordingTransport) -> honeybadger::Client {
    client_with(config().with_grace_period(Duration::from_millis(50)), transport)
}

#[test]
fn sync_delivery_outlives_grace_period_outside_any_runtime() {
    let transport =
        RecordingTransport::with_delay(Reply::Status(201, "{}"), Duration::from_millis(300));
    let client = slow_collector_client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::sync(|_: ()| Err::<(), _>(HandlerError("boom"))));

    let started = Instant::now();
    assert_eq!(handler.call_sync(()).unwrap(), Err(HandlerError("boom")));
    assert!(started.elapsed() < Duration::from_millis(300));

    std::thread::sleep(Duration::from_millis(800));
    assert_eq!(transport.calls(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn sync_delivery_outlives_grace_period_on_current_thread_runtime() {
    let transport =
        RecordingTransport::with_delay(Reply::Status(201, "{}"), Duration::from_millis(300));
    let client = slow_collector_client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::sync(|_: ()| Err::<(), _>(HandlerError("boom"))));

    let started = Instant::now();
    assert_eq!(handler.call_sync(()).unwrap(), Err(HandlerError("boom")));
    assert!(started.elapsed() < Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[test]
fn sync_throw_without_api_key_still_rethrows() {
    let transport = RecordingTransport::accepting();
    let client = client_with(Config::default().with_environment("production"), &transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::sync(|_: ()| Err::<(), _>(HandlerError("boom"))));

    assert_eq!(handler.call_sync(()).unwrap(), Err(HandlerError("boom")));
    assert_eq!(transport.calls(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn callback_handler_error_completes_after_reporting() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::callback(
        |job: &'static str, done: Completion<(), HandlerError>| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                done.complete(Err(HandlerError(job)));
            });
        },
    ));
    let Handler::Callback(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let (tx, rx) = oneshot::channel();
    let observed = transport.clone();
    call(
        "resize",
        Completion::new(move |result| {
            let _ = tx.send((result, observed.calls()));
        }),
    );

    let (result, calls_at_completion) = rx.await.unwrap();
    assert_eq!(result, Err(HandlerError("resize")));
    assert_eq!(calls_at_completion, 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn callback_handler_success_completes_immediately() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let handler = client.wrap(Handler::callback(|n: u32, done: Completion<u32, HandlerError>| {
        done.complete(Ok(n + 1));
    }));
    let Handler::Callback(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let (tx, rx) = std::sync::mpsc::channel();
    call(1, Completion::new(move |result| tx.send(result).unwrap()));

    // Completed synchronously, before this test yielded once.
    assert_eq!(rx.try_recv().unwrap(), Ok(2));
    assert_eq!(transport.calls(), 0);
}

#[test]
fn callback_handler_error_outside_any_runtime() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::callback(
        |job: &'static str, done: Completion<(), HandlerError>| {
            done.complete(Err(HandlerError(job)));
        },
    ));
    let Handler::Callback(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let (tx, rx) = std::sync::mpsc::channel();
    let observed = transport.clone();
    call(
        "thumbnail",
        Completion::new(move |result| tx.send((result, observed.calls())).unwrap()),
    );

    let (result, calls_at_completion) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result, Err(HandlerError("thumbnail")));
    assert_eq!(calls_at_completion, 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn grace_period_bounds_the_callback_completion() {
    let transport = RecordingTransport::with_delay(
        Reply::Status(201, "{}"),
        Duration::from_secs(30),
    );
    let client = client_with(config().with_grace_period(Duration::from_millis(200)), &transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::callback(
        |job: &'static str, done: Completion<(), HandlerError>| {
            tokio::spawn(async move { done.complete(Err(HandlerError(job))) });
        },
    ));
    let Handler::Callback(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let (tx, rx) = oneshot::channel();
    let started = tokio::time::Instant::now();
    call(
        "export",
        Completion::new(move |result| {
            let _ = tx.send((result, tokio::time::Instant::now()));
        }),
    );

    let (result, completed_at) = rx.await.unwrap();
    assert_eq!(result, Err(HandlerError("export")));
    let waited = completed_at - started;
    assert!(waited >= Duration::from_millis(200));
    assert!(waited < Duration::from_secs(30));

    assert!(seen.lock().unwrap().is_empty());
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn grace_period_bounds_the_wait() {
    let transport = RecordingTransport::with_delay(
        Reply::Status(201, "{}"),
        Duration::from_secs(30),
    );
    let client = client_with(config().with_grace_period(Duration::from_millis(200)), &transport);
    let seen = record_errors(&client);

    let handler = client.wrap(Handler::future(|_: ()| async {
        Err::<(), _>(HandlerError("slow collector"))
    }));
    let Handler::Async(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let started = tokio::time::Instant::now();
    assert_eq!(call(()).await, Err(HandlerError("slow collector")));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(200));
    assert!(waited < Duration::from_secs(30));

    // The delivery keeps going in the background and settles later.
    assert!(seen.lock().unwrap().is_empty());
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reporting_failure_never_replaces_handler_error() {
    let transport = RecordingTransport::new(Reply::Status(403, ""));
    let client = client(&transport);

    let handler = client.wrap(Handler::future(|_: ()| async {
        Err::<(), _>(HandlerError("original"))
    }));
    let Handler::Async(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    assert_eq!(call(()).await, Err(HandlerError("original")));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn concurrent_invocations_report_their_own_context() {
    let transport = RecordingTransport::accepting();
    let client = client(&transport);

    let handler = client.wrap(Handler::future({
        let client = client.clone();
        move |(id, delay): (&'static str, u64)| {
            let client = client.clone();
            async move {
                client.set_context(context! { "reqId" => id });
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Err::<(), _>(HandlerError(id))
            }
        }
    }));
    let Handler::Async(call) = handler else {
        panic!("wrapping keeps the calling convention");
    };

    let (first, second) = tokio::join!(call(("1", 100)), call(("2", 50)));
    assert_eq!(first, Err(HandlerError("1")));
    assert_eq!(second, Err(HandlerError("2")));

    let mut contexts = transport
        .payloads()
        .iter()
        .map(|payload| payload["request"]["context"].clone())
        .collect::<Vec<_>>();
    contexts.sort_by_key(|context| context["reqId"].as_str().map(ToOwned::to_owned));
    assert_eq!(
        contexts,
        vec![
            serde_json::json!({ "reqId": "1" }),
            serde_json::json!({ "reqId": "2" }),
        ]
    );
}
