//! Wrapping handlers so their errors are reported before they propagate.
//!
//! A [`Handler`] is one of three calling conventions: a plain function
//! returning a `Result`, a function returning a future, or a function that
//! hands its result to a final [`Completion`]. [`Client::wrap`] returns a
//! handler of the same convention that
//!
//! * runs every invocation in a fresh, empty [`ContextScope`],
//! * reports an `Err` with the invocation's context,
//! * waits for the report to settle, at most [`Config::grace_period`],
//! * then hands back exactly the value the inner handler produced.
//!
//! ```no_run
//! use honeybadger::{Client, Config, wrap::Handler};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config::new("project-api-key"))?;
//!
//! let parse = client.wrap(Handler::sync(|input: String| input.parse::<u32>()));
//! assert!(parse.call_sync("12".to_owned()).is_some());
//! # Ok(())
//! # }
//! ```
//!
//! [`Config::grace_period`]: crate::Config::grace_period

pub mod lambda;

use core::{
    error::Error,
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::sync::{
    Arc,
    mpsc::{self, RecvTimeoutError},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::{
    client::Client,
    context::{Context, ContextScope},
    delivery::PreparedNotice,
    notice::{NoticeInput, NotifyOptions},
};

/// Boxed future returned by [`Handler::Async`].
pub type HandlerFuture<T, E> = BoxFuture<'static, Result<T, E>>;

type SyncFn<A, T, E> = dyn Fn(A) -> Result<T, E> + Send + Sync;
type AsyncFn<A, T, E> = dyn Fn(A) -> HandlerFuture<T, E> + Send + Sync;
type CallbackFn<A, T, E> = dyn Fn(A, Completion<T, E>) + Send + Sync;

/// A handler in one of the supported calling conventions.
pub enum Handler<A, T, E> {
    /// Returns its result directly.
    Sync(Arc<SyncFn<A, T, E>>),
    /// Returns a future of its result.
    Async(Arc<AsyncFn<A, T, E>>),
    /// Passes its result to the completion it receives as last argument.
    Callback(Arc<CallbackFn<A, T, E>>),
}

impl<A, T, E> Clone for Handler<A, T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(f.clone()),
            Self::Async(f) => Self::Async(f.clone()),
            Self::Callback(f) => Self::Callback(f.clone()),
        }
    }
}

impl<A, T, E> fmt::Debug for Handler<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync(_) => "Handler::Sync",
            Self::Async(_) => "Handler::Async",
            Self::Callback(_) => "Handler::Callback",
        })
    }
}

impl<A, T, E> Handler<A, T, E> {
    /// Handler that returns its result directly.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Handler that returns a future.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args: A| f(args).boxed()))
    }

    /// Handler that reports its result through a [`Completion`].
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(A, Completion<T, E>) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    /// Calls a [`Handler::Sync`]; `None` for the other conventions.
    pub fn call_sync(&self, args: A) -> Option<Result<T, E>> {
        match self {
            Self::Sync(f) => Some(f(args)),
            _ => None,
        }
    }
}

/// The final callback of a [`Handler::Callback`].
///
/// Completing consumes the value, so a handler can complete at most once.
#[must_use = "the caller waits until the completion is invoked"]
pub struct Completion<T, E> {
    complete: Box<dyn FnOnce(Result<T, E>) + Send>,
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T, E> Completion<T, E> {
    /// Wraps `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        Self {
            complete: Box::new(f),
        }
    }

    /// Hands `result` to the caller.
    pub fn complete(self, result: Result<T, E>) {
        (self.complete)(result);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum InvocationState {
    Pending,
    Settling,
    Done,
}

/// Lifecycle of one wrapped call: `Pending -> Settling -> Done`.
///
/// `Done` is only reachable through [`Invocation::done`], which consumes the
/// invocation.
#[derive(Debug)]
pub(crate) struct Invocation {
    id: u64,
    state: InvocationState,
}

static NEXT_INVOCATION: AtomicU64 = AtomicU64::new(1);

impl Invocation {
    pub(crate) fn start() -> Self {
        let id = NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(invocation = id, "invocation pending");
        Self {
            id,
            state: InvocationState::Pending,
        }
    }

    pub(crate) fn settling(&mut self) {
        debug_assert_eq!(self.state, InvocationState::Pending);
        self.state = InvocationState::Settling;
        tracing::trace!(invocation = self.id, "invocation settling");
    }

    pub(crate) fn done(mut self) {
        self.state = InvocationState::Done;
        tracing::trace!(invocation = self.id, "invocation done");
    }
}

/// Prepares a notice for `error` with `scope`'s context.
///
/// `None` when the notice could not even be built; the handler's error is
/// still returned to the caller.
pub(crate) fn prepare_report<E>(
    client: &Client,
    scope: &ContextScope,
    error: &E,
) -> Option<PreparedNotice>
where
    E: Error + 'static,
{
    match scope.run_sync(|| client.prepare(NoticeInput::error(error), NotifyOptions::default())) {
        Ok(prepared) => Some(prepared),
        Err(invalid) => {
            tracing::warn!(%invalid, "handler error could not be reported");
            None
        }
    }
}

/// Delivers `prepared` on its own task and waits for it, at most `grace`.
///
/// A delivery still running when the grace period ends keeps running; its
/// outcome only reaches the `afterNotify` hooks.
pub(crate) async fn settle(prepared: PreparedNotice, grace: Duration) {
    let delivery = tokio::spawn(prepared.deliver());
    match tokio::time::timeout(grace, delivery).await {
        Ok(Ok(_)) => {}
        Ok(Err(join_error)) => tracing::warn!(%join_error, "delivery task failed"),
        Err(_) => tracing::debug!(?grace, "grace period elapsed before delivery settled"),
    }
}

/// Blocking counterpart of [`settle`] for synchronous handlers.
///
/// On a multi-thread runtime the current worker is handed off with
/// `block_in_place`. Anywhere else the delivery gets a thread and a
/// current-thread runtime of its own, and the caller waits on a channel for
/// at most `grace`. The delivery thread is detached, so a delivery that
/// outlives the grace period still runs its `afterNotify` hooks.
pub(crate) fn settle_blocking(prepared: PreparedNotice, grace: Duration) {
    if let Ok(handle) = Handle::try_current()
        && handle.runtime_flavor() == RuntimeFlavor::MultiThread
    {
        tokio::task::block_in_place(|| handle.block_on(settle(prepared, grace)));
        return;
    }

    let (settled, wait) = mpsc::sync_channel::<()>(1);
    let spawned = std::thread::Builder::new()
        .name("honeybadger-delivery".to_owned())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    runtime.block_on(prepared.deliver());
                    let _ = settled.send(());
                }
                Err(error) => {
                    tracing::warn!(%error, "unable to start a runtime for error reporting");
                }
            }
        });
    if let Err(error) = spawned {
        tracing::warn!(%error, "unable to start a thread for error reporting");
        return;
    }

    match wait.recv_timeout(grace) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        Err(RecvTimeoutError::Timeout) => {
            tracing::debug!(?grace, "grace period elapsed before delivery settled");
        }
    }
}

/// Settles `prepared` without blocking the caller, then calls `then`.
fn settle_detached<F>(prepared: Option<PreparedNotice>, grace: Duration, then: F)
where
    F: FnOnce() + Send + 'static,
{
    let Some(prepared) = prepared else {
        return then();
    };
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                settle(prepared, grace).await;
                then();
            });
        }
        Err(_) => {
            settle_blocking(prepared, grace);
            then();
        }
    }
}

/// The completion a wrapped callback handler receives in place of the
/// caller's: `Ok` passes straight through, `Err` is reported first.
fn report_then_complete<T, E>(
    client: Client,
    scope: ContextScope,
    completion: Completion<T, E>,
) -> Completion<T, E>
where
    T: Send + 'static,
    E: Error + Send + 'static,
{
    let mut invocation = Invocation::start();
    Completion::new(move |result: Result<T, E>| {
        invocation.settling();
        match result {
            Ok(value) => {
                invocation.done();
                completion.complete(Ok(value));
            }
            Err(error) => {
                let prepared = prepare_report(&client, &scope, &error);
                settle_detached(prepared, client.config().grace_period, move || {
                    invocation.done();
                    completion.complete(Err(error));
                });
            }
        }
    })
}

impl Client {
    /// Wraps `handler` so that its errors are reported before they reach
    /// the caller. The returned handler has the same calling convention.
    ///
    /// See the [module documentation](crate::wrap).
    pub fn wrap<A, T, E>(&self, handler: Handler<A, T, E>) -> Handler<A, T, E>
    where
        A: Send + 'static,
        T: Send + 'static,
        E: Error + Send + 'static,
    {
        let client = self.clone();
        match handler {
            Handler::Sync(f) => Handler::Sync(Arc::new(move |args: A| {
                let mut invocation = Invocation::start();
                let scope = ContextScope::new(Context::new());
                let result = scope.run_sync(|| f(args));

                invocation.settling();
                if let Err(error) = &result
                    && let Some(prepared) = prepare_report(&client, &scope, error)
                {
                    settle_blocking(prepared, client.config().grace_period);
                }
                invocation.done();
                result
            })),
            Handler::Async(f) => Handler::Async(Arc::new(move |args: A| {
                let client = client.clone();
                let scope = ContextScope::new(Context::new());
                let future = scope.run_sync(|| f(args));
                let mut invocation = Invocation::start();

                async move {
                    let result = scope.clone().run(future).await;

                    invocation.settling();
                    let prepared = result
                        .as_ref()
                        .err()
                        .and_then(|error| prepare_report(&client, &scope, error));
                    if let Some(prepared) = prepared {
                        settle(prepared, client.config().grace_period).await;
                    }
                    invocation.done();
                    result
                }
                .boxed()
            })),
            Handler::Callback(f) => {
                Handler::Callback(Arc::new(move |args: A, completion: Completion<T, E>| {
                    let scope = ContextScope::new(Context::new());
                    let substitute = report_then_complete(client.clone(), scope.clone(), completion);
                    scope.run_sync(|| f(args, substitute));
                }))
            }
        }
    }
}
