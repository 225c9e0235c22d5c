//! The notify hook pipeline.
//!
//! # Quick Start
//!
//! ```rust
//! use honeybadger::{Client, Config, Notice, ReportingError, hooks::Hooks};
//!
//! # fn main() -> Result<(), honeybadger::BuildError> {
//! let hooks = Hooks::new()
//!     .before_notify(|notice: &mut Notice| {
//!         notice.context.insert("region", "eu-west-1");
//!     })
//!     .after_notify(|error: Option<&ReportingError>, _notice: &Notice| {
//!         if let Some(error) = error {
//!             eprintln!("delivery failed: {error}");
//!         }
//!     });
//!
//! let client = Client::builder()
//!     .config(Config::new("project-api-key"))
//!     .hooks(hooks)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Hook Types
//!
//! - **[`before_notify`]**: edit or veto a notice before it is sent
//! - **[`after_notify`]**: observe the outcome once delivery has settled
//!
//! Hooks belong to a single [`Client`](crate::Client). Registration is
//! additive and lasts for the life of the client; there is no unregister.
//! Hooks can also be registered on a running client with
//! [`Client::before_notify`](crate::Client::before_notify) and
//! [`Client::after_notify`](crate::Client::after_notify).
//!
//! # Registration Order
//!
//! Before hooks run in the order they were registered and stop at the first
//! one that skips. After hooks all run, in registration order, followed by a
//! per-call hook given through
//! [`NotifyOptions::after_notify`](crate::NotifyOptions::after_notify).
//!
//! Each pipeline run works on a snapshot of the hook lists taken when it
//! starts, so hooks registered meanwhile only apply to later notices.
//!
//! # Panics in Hooks
//!
//! Panics never escape the pipeline. A panicking before hook counts as a
//! skip; a panicking after hook is logged and the next one still runs.

pub mod after_notify;
pub mod before_notify;
mod hook_lock;

use core::{any::Any, fmt, panic::Location};
use std::panic::{AssertUnwindSafe, catch_unwind};

use self::{
    after_notify::{AfterNotifyHook, StoredAfterNotifyHook, after_notify_hook_to_untyped},
    before_notify::{
        BeforeNotifyHook, HookDecision, StoredBeforeNotifyHook, before_notify_hook_to_untyped,
    },
    hook_lock::HookLock,
};
use crate::{delivery::Outcome, notice::Notice};

/// Builder collecting hooks for a new [`Client`](crate::Client).
pub struct Hooks {
    before: Vec<StoredBeforeNotifyHook>,
    after: Vec<StoredAfterNotifyHook>,
    created_at: &'static Location<'static>,
}

impl Default for Hooks {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &DisplayList(&self.before))
            .field("after", &DisplayList(&self.after))
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Hooks {
    /// Creates an empty builder.
    #[track_caller]
    #[must_use]
    pub fn new() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            created_at: Location::caller(),
        }
    }

    /// Adds a `beforeNotify` hook.
    #[track_caller]
    #[must_use]
    pub fn before_notify<H: BeforeNotifyHook>(mut self, hook: H) -> Self {
        self.before.push(before_notify_hook_to_untyped(hook));
        self
    }

    /// Adds an `afterNotify` hook.
    #[track_caller]
    #[must_use]
    pub fn after_notify<H: AfterNotifyHook>(mut self, hook: H) -> Self {
        self.after.push(after_notify_hook_to_untyped(hook));
        self
    }
}

/// The hooks registered on one client.
pub(crate) struct HookRegistry {
    before: HookLock<StoredBeforeNotifyHook>,
    after: HookLock<StoredAfterNotifyHook>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl From<Hooks> for HookRegistry {
    fn from(hooks: Hooks) -> Self {
        Self {
            before: HookLock::new(hooks.before),
            after: HookLock::new(hooks.after),
        }
    }
}

impl HookRegistry {
    #[track_caller]
    pub(crate) fn register_before<H: BeforeNotifyHook>(&self, hook: H) {
        self.before.push(before_notify_hook_to_untyped(hook));
    }

    #[track_caller]
    pub(crate) fn register_after<H: AfterNotifyHook>(&self, hook: H) {
        self.after.push(after_notify_hook_to_untyped(hook));
    }

    /// Runs the before hooks. Returns `false` if the notice must be skipped.
    pub(crate) fn run_before(&self, notice: &mut Notice) -> bool {
        for hook in self.before.snapshot().iter() {
            match catch_unwind(AssertUnwindSafe(|| hook.before_notify(notice))) {
                Ok(HookDecision::Proceed) => {}
                Ok(HookDecision::Skip) => {
                    tracing::debug!(%hook, "notice skipped by hook");
                    return false;
                }
                Err(payload) => {
                    tracing::warn!(
                        %hook,
                        panic = panic_message(payload.as_ref()),
                        "hook panicked, skipping notice"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Runs every after hook, then `per_call` if given.
    pub(crate) fn run_after(
        &self,
        outcome: &Outcome,
        notice: &Notice,
        per_call: Option<StoredAfterNotifyHook>,
    ) {
        let snapshot = self.after.snapshot();
        for hook in snapshot.iter().chain(per_call.as_ref()) {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook.after_notify(outcome, notice)))
            {
                tracing::warn!(
                    %hook,
                    panic = panic_message(payload.as_ref()),
                    "hook panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

struct DisplayList<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Debug for DisplayList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(ToString::to_string))
            .finish()
    }
}
