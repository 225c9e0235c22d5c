//! Tower middleware for request/response servers.
//!
//! Two layers, normally used together with the request layer outermost:
//!
//! * [`RequestContextLayer`] runs every request in a fresh context scope, so
//!   `set_context` calls made while handling one request never leak into
//!   another.
//! * [`ErrorReportLayer`] reports an `Err` returned by the inner service,
//!   waits for the report to settle (bounded by the grace period) and then
//!   returns the very same error.
//!
//! # Layer order
//!
//! The error layer reads the context of the scope it runs in. Put it inside
//! the request layer, as below. Placed outside, or used on its own, it
//! reports with the client's default context instead of the request's.
//!
//! # Error types
//!
//! The inner service may fail with any concrete `E: Error`, or with
//! [`tower::BoxError`] as produced by stock middleware such as timeouts and
//! buffers. Either way the error is forwarded as is.
//!
//! ```no_run
//! use honeybadger::{Client, Config};
//! use tower::{ServiceBuilder, ServiceExt, service_fn};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config::new("project-api-key"))?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(client.request_handler())
//!     .layer(client.error_handler())
//!     .service(service_fn(|request: String| async move {
//!         request.parse::<u32>()
//!     }));
//! let parsed = service.oneshot("12".to_owned()).await?;
//! # let _ = parsed;
//! # Ok(())
//! # }
//! ```

use core::{
    error::Error,
    fmt,
    marker::PhantomData,
    task::{Context as TaskContext, Poll},
};

use futures::{FutureExt, future::BoxFuture};
use tower::{BoxError, Layer, Service};

use crate::{
    client::Client,
    context::{Context, ContextScope},
    notice::{NoticeInput, NotifyOptions},
    wrap::settle,
};

/// Layer that gives each request its own context scope.
#[derive(Copy, Clone, Debug, Default)]
pub struct RequestContextLayer;

impl RequestContextLayer {
    /// Creates the layer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContext<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContext { inner }
    }
}

/// Service created by [`RequestContextLayer`].
#[derive(Clone, Debug)]
pub struct RequestContext<S> {
    inner: S,
}

impl<S, Req> Service<Req> for RequestContext<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let scope = ContextScope::new(Context::new());
        let future = scope.run_sync(|| self.inner.call(request));
        scope.run(future).boxed()
    }
}

/// Derives per-request [`NotifyOptions`] for [`ErrorReportLayer`].
pub trait RequestOptions<Req>: Clone + Send + Sync + 'static {
    /// Options for reporting an error that occurred while serving `request`.
    fn options(&self, request: &Req) -> NotifyOptions;
}

/// No per-request options.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultOptions;

impl<Req> RequestOptions<Req> for DefaultOptions {
    fn options(&self, _request: &Req) -> NotifyOptions {
        NotifyOptions::default()
    }
}

/// Per-request options from a closure, see [`ErrorReportLayer::with_options`].
#[derive(Clone)]
pub struct OptionsFn<F>(F);

impl<F> fmt::Debug for OptionsFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OptionsFn")
            .field(&core::any::type_name::<F>())
            .finish()
    }
}

impl<Req, F> RequestOptions<Req> for OptionsFn<F>
where
    F: Fn(&Req) -> NotifyOptions + Clone + Send + Sync + 'static,
{
    fn options(&self, request: &Req) -> NotifyOptions {
        (self.0)(request)
    }
}

/// Errors [`ErrorReport`] can report.
///
/// `K` only separates the two implementations and is inferred: [`Typed`]
/// for any concrete `E: Error`, [`Boxed`] for [`BoxError`].
pub trait ReportableError<K>: Send + 'static {
    /// Notice input for this error.
    fn notice_input(&self) -> NoticeInput;
}

/// Marks errors with a concrete type, see [`ReportableError`].
#[derive(Copy, Clone, Debug)]
pub enum Typed {}

/// Marks [`BoxError`], see [`ReportableError`].
#[derive(Copy, Clone, Debug)]
pub enum Boxed {}

impl<E: Error + Send + 'static> ReportableError<Typed> for E {
    fn notice_input(&self) -> NoticeInput {
        NoticeInput::error(self)
    }
}

impl ReportableError<Boxed> for BoxError {
    fn notice_input(&self) -> NoticeInput {
        NoticeInput::error_with_class(&**self, "BoxError".to_owned())
    }
}

/// Layer that reports errors returned by the inner service.
pub struct ErrorReportLayer<O = DefaultOptions, K = Typed> {
    client: Client,
    options: O,
    kind: PhantomData<fn() -> K>,
}

impl<O: Clone, K> Clone for ErrorReportLayer<O, K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            options: self.options.clone(),
            kind: PhantomData,
        }
    }
}

impl<O: fmt::Debug, K> fmt::Debug for ErrorReportLayer<O, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReportLayer")
            .field("client", &self.client)
            .field("options", &self.options)
            .finish()
    }
}

impl<K> ErrorReportLayer<DefaultOptions, K> {
    /// Creates the layer. Prefer [`Client::error_handler`].
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            options: DefaultOptions,
            kind: PhantomData,
        }
    }
}

impl<O, K> ErrorReportLayer<O, K> {
    /// Computes [`NotifyOptions`] from each request before it is handed to
    /// the inner service, e.g. to record the URL or a request id.
    pub fn with_options<F>(self, options: F) -> ErrorReportLayer<OptionsFn<F>, K> {
        ErrorReportLayer {
            client: self.client,
            options: OptionsFn(options),
            kind: PhantomData,
        }
    }
}

impl<S, O: Clone, K> Layer<S> for ErrorReportLayer<O, K> {
    type Service = ErrorReport<S, O, K>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorReport {
            inner,
            client: self.client.clone(),
            options: self.options.clone(),
            kind: PhantomData,
        }
    }
}

/// Service created by [`ErrorReportLayer`].
pub struct ErrorReport<S, O = DefaultOptions, K = Typed> {
    inner: S,
    client: Client,
    options: O,
    kind: PhantomData<fn() -> K>,
}

impl<S: Clone, O: Clone, K> Clone for ErrorReport<S, O, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            client: self.client.clone(),
            options: self.options.clone(),
            kind: PhantomData,
        }
    }
}

impl<S: fmt::Debug, O: fmt::Debug, K> fmt::Debug for ErrorReport<S, O, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReport")
            .field("inner", &self.inner)
            .field("client", &self.client)
            .field("options", &self.options)
            .finish()
    }
}

impl<S, O, K, Req> Service<Req> for ErrorReport<S, O, K>
where
    S: Service<Req>,
    S::Response: Send + 'static,
    S::Error: ReportableError<K>,
    S::Future: Send + 'static,
    O: RequestOptions<Req>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        if ContextScope::current().is_none() {
            tracing::debug!("no request scope around the error layer, using the default context");
        }
        let options = self.options.options(&request);
        let client = self.client.clone();
        let future = self.inner.call(request);

        async move {
            let error = match future.await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match client.prepare(error.notice_input(), options) {
                Ok(prepared) => settle(prepared, client.config().grace_period).await,
                Err(invalid) => tracing::warn!(%invalid, "request error could not be reported"),
            }
            Err(error)
        }
        .boxed()
    }
}

impl Client {
    /// Layer giving each request its own context scope.
    #[must_use]
    pub fn request_handler(&self) -> RequestContextLayer {
        RequestContextLayer
    }

    /// Layer reporting the inner service's errors with this client.
    #[must_use]
    pub fn error_handler<K>(&self) -> ErrorReportLayer<DefaultOptions, K> {
        ErrorReportLayer::new(self.clone())
    }
}
