//! Per-unit-of-work context.
//!
//! Every request or invocation gets its own mutable [`Context`], reachable
//! from anywhere inside that unit without being passed around. The active
//! context lives in a tokio task-local, so it follows a future across every
//! suspension point, and two units that interleave on the same runtime never
//! see each other's keys.
//!
//! ```
//! use honeybadger::{context, context::ContextStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = ContextStore::new();
//!
//! let seen = store
//!     .run(context! { "request_id" => "abc" }, async {
//!         store.set_context(context! { "user_id" => 42 });
//!         tokio::task::yield_now().await;
//!         store.current()
//!     })
//!     .await;
//!
//! assert_eq!(seen.get("request_id"), Some(&"abc".into()));
//! assert_eq!(seen.get("user_id"), Some(&42.into()));
//!
//! // Outside of any scope the store falls back to its own default context.
//! assert!(store.current().is_empty());
//! # }
//! ```
//!
//! # Leaving the task
//!
//! Task-locals are not inherited by `tokio::spawn` or by new threads. Work
//! that should keep writing to the same context captures the scope with
//! [`ContextScope::current`] and re-enters it with [`ContextScope::run`] or
//! [`ContextScope::run_sync`], or uses [`spawn`] which does both.

use core::{fmt, future::Future};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use triomphe::Arc;

tokio::task_local! {
    static ACTIVE_SCOPE: ContextScope;
}

/// Ordered string-keyed map of JSON values attached to a notice.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(IndexMap<String, Value, FxBuildHasher>);

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Inserts a key, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a key while keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Shallow merge: every key of `patch` overwrites the same key here.
    pub fn merge(&mut self, patch: Context) {
        self.0.extend(patch.0);
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Map<String, Value>> for Context {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl IntoIterator for Context {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Handle to one unit of work's context.
///
/// Cloning the handle shares the underlying context; creating a new scope
/// with [`ContextScope::new`] does not.
#[derive(Clone)]
pub struct ContextScope {
    cell: Arc<spin::Mutex<Context>>,
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextScope")
            .field(&*self.cell.lock())
            .finish()
    }
}

impl ContextScope {
    /// Creates a fresh scope holding a copy of `initial`.
    #[must_use]
    pub fn new(initial: Context) -> Self {
        Self {
            cell: Arc::new(spin::Mutex::new(initial)),
        }
    }

    /// The scope the caller is running in, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        ACTIVE_SCOPE.try_with(Clone::clone).ok()
    }

    /// Copy of the scope's context at this moment.
    #[must_use]
    pub fn snapshot(&self) -> Context {
        self.cell.lock().clone()
    }

    /// Shallow-merges `patch` into the scope's context.
    pub fn set_context(&self, patch: Context) {
        self.cell.lock().merge(patch);
    }

    /// Empties the scope's context.
    pub fn clear(&self) {
        self.cell.lock().clear();
    }

    /// Polls `future` to completion with this scope active.
    pub fn run<F: Future>(self, future: F) -> impl Future<Output = F::Output> {
        ACTIVE_SCOPE.scope(self, future)
    }

    /// Calls `f` with this scope active.
    pub fn run_sync<R>(&self, f: impl FnOnce() -> R) -> R {
        ACTIVE_SCOPE.sync_scope(self.clone(), f)
    }
}

/// Entry point for reading and writing the active context.
///
/// Each store owns a default context used when no scope is active; that
/// default is never visible from inside a scope. Scopes themselves are
/// ambient and shared by every store running in the same unit of work.
#[derive(Debug, Default)]
pub struct ContextStore {
    default: spin::Mutex<Context>,
}

impl ContextStore {
    /// Creates a store with an empty default context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `future` in a new scope initialized from `initial`.
    ///
    /// A `run` nested inside another starts an independent child scope; the
    /// parent's context is unaffected by anything the child does.
    pub fn run<F: Future>(&self, initial: Context, future: F) -> impl Future<Output = F::Output> {
        ContextScope::new(initial).run(future)
    }

    /// Synchronous counterpart of [`run`](Self::run).
    pub fn run_sync<R>(&self, initial: Context, f: impl FnOnce() -> R) -> R {
        ContextScope::new(initial).run_sync(f)
    }

    /// Snapshot of the active context.
    #[must_use]
    pub fn current(&self) -> Context {
        match ContextScope::current() {
            Some(scope) => scope.snapshot(),
            None => self.default.lock().clone(),
        }
    }

    /// Shallow-merges `patch` into the active context.
    pub fn set_context(&self, patch: impl Into<Context>) {
        let patch = patch.into();
        match ContextScope::current() {
            Some(scope) => scope.set_context(patch),
            None => self.default.lock().merge(patch),
        }
    }

    /// Empties the active context.
    pub fn clear(&self) {
        match ContextScope::current() {
            Some(scope) => scope.clear(),
            None => self.default.lock().clear(),
        }
    }
}

/// Spawns `future` on the tokio runtime inside the caller's scope.
///
/// Without an active scope this is plain `tokio::spawn`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scope = ContextScope::current();
    tokio::spawn(async move {
        match scope {
            Some(scope) => scope.run(future).await,
            None => future.await,
        }
    })
}
