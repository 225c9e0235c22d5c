//! Adapter for serverless platforms that expect `async fn(event) -> Result`.

use core::{error::Error, fmt, future::pending};

use futures::FutureExt;
use tokio::sync::oneshot;

use super::{Completion, Handler, HandlerFuture, Invocation, prepare_report, settle};
use crate::{
    client::Client,
    context::{Context, ContextScope},
};

/// A handler of any convention exposed as an async function.
///
/// Created by [`Client::lambda_handler`].
pub struct LambdaHandler<A, T, E> {
    client: Client,
    handler: Handler<A, T, E>,
}

impl<A, T, E> Clone for LambdaHandler<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for LambdaHandler<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaHandler")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl<A, T, E> LambdaHandler<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Error + Send + 'static,
{
    /// Handles one event.
    ///
    /// The inner handler starts right away, inside a fresh context scope.
    /// An error is reported and the returned future resolves once the report
    /// settled or the grace period ran out.
    ///
    /// A callback handler that drops its completion without invoking it
    /// leaves the returned future pending forever.
    pub fn call(&self, event: A) -> HandlerFuture<T, E> {
        let client = self.client.clone();
        let scope = ContextScope::new(Context::new());
        let mut invocation = Invocation::start();

        let outcome: HandlerFuture<T, E> = match &self.handler {
            Handler::Sync(f) => {
                let result = scope.run_sync(|| f(event));
                async move { result }.boxed()
            }
            Handler::Async(f) => scope.clone().run(scope.run_sync(|| f(event))).boxed(),
            Handler::Callback(f) => {
                let (tx, rx) = oneshot::channel();
                let completion = Completion::new(move |result| {
                    // The receiver is gone only if the caller stopped waiting.
                    let _ = tx.send(result);
                });
                scope.run_sync(|| f(event, completion));
                async move {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!(
                                "callback handler dropped its completion; the invocation will not finish"
                            );
                            pending().await
                        }
                    }
                }
                .boxed()
            }
        };

        async move {
            let result = outcome.await;

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
    }
}

impl Client {
    /// Exposes `handler` as a serverless entry point.
    ///
    /// ```no_run
    /// use honeybadger::{Client, Config, wrap::Handler};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::new(Config::new("project-api-key"))?;
    /// let handler = client.lambda_handler(Handler::future(|event: serde_json::Value| async move {
    ///     serde_json::from_value::<u64>(event)
    /// }));
    ///
    /// let answer = handler.call(serde_json::json!(42)).await?;
    /// assert_eq!(answer, 42);
    /// # Ok(())
    /// # }
    /// ```
    pub fn lambda_handler<A, T, E>(&self, handler: Handler<A, T, E>) -> LambdaHandler<A, T, E> {
        LambdaHandler {
            client: self.clone(),
            handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(LambdaHandler<String, String, std::io::Error>: Send, Sync, Clone);
    }
}
