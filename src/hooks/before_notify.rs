//! `beforeNotify` hooks.
//!
//! A before hook sees every notice right after it is built and before it is
//! sent. It may edit the notice in place or veto the delivery by returning
//! [`HookDecision::Skip`].
//!
//! # Examples
//!
//! ## Closures
//!
//! A closure taking `&mut Notice` is a hook. It can return `()` (always
//! proceed), a `bool` (`false` skips) or a [`HookDecision`].
//!
//! ```
//! use honeybadger::{Client, Config, Notice};
//!
//! # fn main() -> Result<(), honeybadger::BuildError> {
//! let client = Client::new(Config::new("project-api-key"))?;
//!
//! client.before_notify(|notice: &mut Notice| {
//!     notice.tags.push("billing".to_owned());
//! });
//!
//! // Drop noisy notices entirely
//! client.before_notify(|notice: &mut Notice| !notice.message.contains("broken pipe"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom hook types
//!
//! ```
//! use honeybadger::{
//!     Notice,
//!     hooks::{Hooks, before_notify::{BeforeNotifyHook, HookDecision}},
//! };
//!
//! struct DropHealthChecks;
//!
//! impl BeforeNotifyHook for DropHealthChecks {
//!     fn before_notify(&self, notice: &mut Notice) -> HookDecision {
//!         if notice.url.as_deref() == Some("/healthz") {
//!             HookDecision::Skip
//!         } else {
//!             HookDecision::Proceed
//!         }
//!     }
//! }
//!
//! let hooks = Hooks::new().before_notify(DropHealthChecks);
//! ```

use core::{fmt, panic::Location};

use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::notice::Notice;

/// Whether a notice should continue to the transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    /// Keep going.
    Proceed,
    /// Skip this notice; remaining before hooks do not run.
    Skip,
}

impl From<()> for HookDecision {
    fn from((): ()) -> Self {
        Self::Proceed
    }
}

impl From<bool> for HookDecision {
    fn from(proceed: bool) -> Self {
        if proceed { Self::Proceed } else { Self::Skip }
    }
}

/// A hook that runs before a notice is delivered.
///
/// Hooks run synchronously, in registration order, on the task that called
/// `notify`. A hook that panics is treated as [`HookDecision::Skip`].
pub trait BeforeNotifyHook: 'static + Send + Sync {
    /// Inspects or edits `notice`.
    fn before_notify(&self, notice: &mut Notice) -> HookDecision;
}

impl<F, R> BeforeNotifyHook for F
where
    F: 'static + Send + Sync + Fn(&mut Notice) -> R,
    R: Into<HookDecision>,
{
    fn before_notify(&self, notice: &mut Notice) -> HookDecision {
        (self)(notice).into()
    }
}

pub(crate) trait UntypedBeforeNotifyHook: 'static + Send + Sync + fmt::Display {
    fn before_notify(&self, notice: &mut Notice) -> HookDecision;
}

pub(crate) type StoredBeforeNotifyHook = Arc<dyn UntypedBeforeNotifyHook>;

#[track_caller]
pub(crate) fn before_notify_hook_to_untyped<H>(hook: H) -> StoredBeforeNotifyHook
where
    H: BeforeNotifyHook,
{
    struct Hook<H> {
        hook: H,
        added_at: &'static Location<'static>,
    }

    impl<H> fmt::Display for Hook<H> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "beforeNotify hook {} registered at {}:{}",
                core::any::type_name::<H>(),
                self.added_at.file(),
                self.added_at.line()
            )
        }
    }

    impl<H: BeforeNotifyHook> UntypedBeforeNotifyHook for Hook<H> {
        fn before_notify(&self, notice: &mut Notice) -> HookDecision {
            self.hook.before_notify(notice)
        }
    }

    let hook: Arc<Hook<H>> = Arc::new(Hook {
        hook,
        added_at: Location::caller(),
    });
    hook.unsize(unsize::Coercion!(to dyn UntypedBeforeNotifyHook))
}
