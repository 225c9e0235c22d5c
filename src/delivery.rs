//! Delivery of built notices.
//!
//! [`Client::prepare`](crate::Client::prepare) performs the synchronous half
//! of a notify: the precondition check, building the notice and running the
//! `beforeNotify` hooks. The resulting [`PreparedNotice`] does the rest when
//! [`deliver`](PreparedNotice::deliver) is awaited: it collects stats, calls
//! the transport, runs the `afterNotify` hooks and resolves to a
//! [`Delivery`]. Delivery never fails; problems end up in the [`Outcome`].

use core::{fmt, time::Duration};
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::{
    client::Shared,
    error::{ReportingError, TransportError},
    hooks::after_notify::StoredAfterNotifyHook,
    notice::Notice,
    stats::Stats,
    transport::TransportOptions,
};

/// Longest wait for the stats provider.
const STATS_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a notice was not sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No API key is configured.
    MissingApiKey,
    /// Reporting is turned off for this environment.
    ReportingDisabled,
    /// A `beforeNotify` hook skipped the notice or panicked.
    Vetoed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingApiKey => "no API key has been configured",
            Self::ReportingDisabled => "reporting is disabled for this environment",
            Self::Vetoed => "skipped by a beforeNotify hook",
        })
    }
}

/// How a notify call settled.
#[derive(Debug)]
pub enum Outcome {
    /// The collector accepted the notice.
    Delivered {
        /// Id the collector assigned, when the response carried one.
        id: Option<String>,
    },
    /// The transport failed or the collector refused the notice.
    Rejected(ReportingError),
    /// The notice was not sent.
    Skipped(SkipReason),
}

impl Outcome {
    /// The delivery error, for rejected notices only.
    #[must_use]
    pub fn error(&self) -> Option<&ReportingError> {
        match self {
            Self::Rejected(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the collector accepted the notice.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether the notice was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// A settled notify call.
#[derive(Debug)]
pub struct Delivery {
    /// The notice as it was handed to the transport.
    pub notice: Notice,
    /// How delivery went.
    pub outcome: Outcome,
}

impl Delivery {
    /// Id assigned by the collector.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Delivered { id } => id.as_deref(),
            _ => None,
        }
    }
}

pub(crate) enum Plan {
    Send(TransportOptions),
    Skip(SkipReason),
}

/// A notice that passed the synchronous part of the pipeline.
#[must_use = "a prepared notice does nothing until it is delivered"]
pub struct PreparedNotice {
    pub(crate) shared: triomphe::Arc<Shared>,
    pub(crate) notice: Notice,
    pub(crate) plan: Plan,
    pub(crate) after_notify: Option<StoredAfterNotifyHook>,
}

impl fmt::Debug for PreparedNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedNotice")
            .field("notice", &self.notice)
            .field(
                "skip",
                &match &self.plan {
                    Plan::Send(_) => None,
                    Plan::Skip(reason) => Some(reason),
                },
            )
            .finish_non_exhaustive()
    }
}

impl PreparedNotice {
    /// The notice, after the `beforeNotify` hooks.
    #[must_use]
    pub fn notice(&self) -> &Notice {
        &self.notice
    }

    /// Sends the notice and runs the `afterNotify` hooks.
    pub async fn deliver(self) -> Delivery {
        let Self {
            shared,
            notice,
            plan,
            after_notify,
        } = self;

        let outcome = match plan {
            Plan::Skip(reason) => Outcome::Skipped(reason),
            Plan::Send(options) => send(&shared, &notice, &options).await,
        };

        match &outcome {
            Outcome::Delivered { id } => {
                tracing::debug!(id = id.as_deref().unwrap_or("-"), "notice delivered");
            }
            Outcome::Rejected(error) => {
                tracing::warn!(%error, "unable to send error report");
            }
            Outcome::Skipped(reason) => {
                tracing::debug!(%reason, "notice not sent");
            }
        }

        shared.hooks.run_after(&outcome, &notice, after_notify);

        Delivery { notice, outcome }
    }
}

async fn send(shared: &Shared, notice: &Notice, options: &TransportOptions) -> Outcome {
    let stats = collect_stats(shared).await;

    let payload = match notice.to_payload(stats.as_ref()) {
        Ok(payload) => payload,
        Err(error) => return Outcome::Rejected(error.into()),
    };

    let sent = AssertUnwindSafe(shared.transport.send(payload, options))
        .catch_unwind()
        .await;

    match sent {
        Ok(Ok(response)) if response.is_success() => Outcome::Delivered {
            id: response.notice_id(),
        },
        Ok(Ok(response)) => Outcome::Rejected(ReportingError::from_status(
            response.status_code,
            &response.body,
        )),
        Ok(Err(error)) => Outcome::Rejected(error.into()),
        Err(_) => Outcome::Rejected(TransportError::Client("transport panicked".to_owned()).into()),
    }
}

async fn collect_stats(shared: &Shared) -> Option<Stats> {
    let provider = shared.stats.as_ref()?;
    match tokio::time::timeout(STATS_TIMEOUT, provider.stats()).await {
        Ok(Ok(stats)) => Some(stats),
        Ok(Err(error)) => {
            tracing::debug!(%error, "stats unavailable");
            None
        }
        Err(_) => {
            tracing::debug!("stats provider timed out");
            None
        }
    }
}
