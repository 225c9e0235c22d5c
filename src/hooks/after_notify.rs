//! `afterNotify` hooks.
//!
//! After hooks observe the settled result of a delivery: they run once per
//! notice after the transport finished, after a `beforeNotify` hook vetoed
//! the notice, or after the notice was skipped because reporting is
//! disabled. They cannot change the outcome.
//!
//! The closure form receives the delivery error (`None` unless the delivery
//! was rejected) and the notice:
//!
//! ```
//! use honeybadger::{Client, Config, Notice, ReportingError};
//!
//! # fn main() -> Result<(), honeybadger::BuildError> {
//! let client = Client::new(Config::new("project-api-key"))?;
//! client.after_notify(|error: Option<&ReportingError>, notice: &Notice| {
//!     if let Some(error) = error {
//!         eprintln!("could not report {:?}: {error}", notice.message);
//!     }
//! });
//! # Ok(())
//! # }
//! ```
//!
//! Implement [`AfterNotifyHook`] directly to see the full [`Outcome`],
//! including the id the collector assigned.

use core::{fmt, panic::Location};

use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::{delivery::Outcome, error::ReportingError, notice::Notice};

/// A hook that runs after a delivery has settled.
pub trait AfterNotifyHook: 'static + Send + Sync {
    /// Observes the outcome of one notice.
    fn after_notify(&self, outcome: &Outcome, notice: &Notice);
}

impl<F> AfterNotifyHook for F
where
    F: 'static + Send + Sync + Fn(Option<&ReportingError>, &Notice),
{
    fn after_notify(&self, outcome: &Outcome, notice: &Notice) {
        (self)(outcome.error(), notice);
    }
}

pub(crate) trait UntypedAfterNotifyHook: 'static + Send + Sync + fmt::Display {
    fn after_notify(&self, outcome: &Outcome, notice: &Notice);
}

pub(crate) type StoredAfterNotifyHook = Arc<dyn UntypedAfterNotifyHook>;

#[track_caller]
pub(crate) fn after_notify_hook_to_untyped<H>(hook: H) -> StoredAfterNotifyHook
where
    H: AfterNotifyHook,
{
    struct Hook<H> {
        hook: H,
        added_at: &'static Location<'static>,
    }

    impl<H> fmt::Display for Hook<H> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "afterNotify hook {} registered at {}:{}",
                core::any::type_name::<H>(),
                self.added_at.file(),
                self.added_at.line()
            )
        }
    }

    impl<H: AfterNotifyHook> UntypedAfterNotifyHook for Hook<H> {
        fn after_notify(&self, outcome: &Outcome, notice: &Notice) {
            self.hook.after_notify(outcome, notice);
        }
    }

    let hook: Arc<Hook<H>> = Arc::new(Hook {
        hook,
        added_at: Location::caller(),
    });
    hook.unsize(unsize::Coercion!(to dyn UntypedAfterNotifyHook))
}
