#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Tracing span context for honeybadger notices.
//!
//! # How It Works
//!
//! You add [`HoneybadgerLayer`] to your tracing subscriber alongside your
//! existing layers. It records the field values of every new span so they
//! can be read back when a notice is built. [`SpanCollector`] is a
//! `beforeNotify` hook that copies the active span chain into the notice's
//! context under the `tracing_spans` key.
//!
//! Because `beforeNotify` hooks run on the task that called `notify`, the
//! captured spans are the ones the error happened in.
//!
//! # Quick Start
//!
//! ```no_run
//! use honeybadger::{Client, Config};
//! use honeybadger_tracing::{HoneybadgerLayer, SpanCollector};
//! use tracing_subscriber::{Registry, layer::SubscriberExt};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Set up tracing with HoneybadgerLayer (required)
//! let subscriber = Registry::default()
//!     .with(HoneybadgerLayer)
//!     .with(tracing_subscriber::fmt::layer());
//! tracing::subscriber::set_global_default(subscriber)?;
//!
//! // 2. Copy spans into every notice
//! let client = Client::new(Config::new("project-api-key"))?;
//! client.before_notify(SpanCollector::new());
//! # Ok(())
//! # }
//! ```
//!
//! A notice built inside `#[tracing::instrument(fields(user_id = 42))] fn
//! checkout()` then carries:
//!
//! ```text
//! "tracing_spans": [{ "name": "checkout", "fields": { "user_id": 42 } }]
//! ```
//!
//! # Environment Variables
//!
//! - `HONEYBADGER_TRACING` - Comma-separated options:
//!   - `names` - Only record span names, not their fields
//!   - `off` - Make [`SpanCollector::new`] a no-op

use std::sync::OnceLock;

use honeybadger::{HookDecision, Notice, hooks::before_notify::BeforeNotifyHook};
use serde_json::{Map, Value};
use tracing::{
    Span,
    field::{Field, Visit},
};
use tracing_subscriber::registry::LookupSpan;

/// Context key [`SpanCollector`] writes to by default.
pub const DEFAULT_CONTEXT_KEY: &str = "tracing_spans";

/// Field values recorded for a span.
#[derive(Clone, Default)]
struct CapturedFields(Map<String, Value>);

struct FieldVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_owned(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_owned(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_owned(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_owned(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_owned(), format!("{value:?}").into());
    }
}

/// A tracing layer that records span field values for notices.
///
/// **Required for honeybadger-tracing.** Without it spans are still listed
/// by name, but their fields are missing.
///
/// # Examples
///
/// ```
/// use honeybadger_tracing::HoneybadgerLayer;
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default()
///     .with(HoneybadgerLayer)
///     .with(tracing_subscriber::fmt::layer());
///
/// tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct HoneybadgerLayer;

impl<S> tracing_subscriber::Layer<S> for HoneybadgerLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = CapturedFields::default();
        attrs.record(&mut FieldVisitor(&mut fields.0));
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<CapturedFields>() {
            Some(fields) => values.record(&mut FieldVisitor(&mut fields.0)),
            None => {
                let mut fields = CapturedFields::default();
                values.record(&mut FieldVisitor(&mut fields.0));
                extensions.insert(fields);
            }
        }
    }
}

/// The active span chain as JSON, innermost span first.
///
/// Each entry is `{"name": ..., "fields": {...}}`; `fields` is left out when
/// `with_fields` is false or the span has none. Returns `None` outside of any
/// span, or when the subscriber is not built on
/// [`Registry`](tracing_subscriber::Registry).
#[must_use]
pub fn current_spans(with_fields: bool) -> Option<Value> {
    let span = Span::current();
    let chain = span.with_subscriber(|(span_id, dispatch)| {
        let registry = dispatch.downcast_ref::<tracing_subscriber::Registry>()?;
        let span_ref = registry.span(span_id)?;

        let chain = span_ref
            .scope()
            .map(|ancestor| {
                let mut entry = Map::new();
                entry.insert("name".to_owned(), ancestor.name().into());
                if with_fields
                    && let Some(fields) = ancestor.extensions().get::<CapturedFields>()
                    && !fields.0.is_empty()
                {
                    entry.insert("fields".to_owned(), Value::Object(fields.0.clone()));
                }
                Value::Object(entry)
            })
            .collect::<Vec<_>>();
        Some(Value::Array(chain))
    });
    chain.flatten()
}

/// `beforeNotify` hook that copies the active span chain into
/// [`Notice::context`].
///
/// # Examples
///
/// ```
/// use honeybadger::hooks::Hooks;
/// use honeybadger_tracing::SpanCollector;
///
/// let hooks = Hooks::new().before_notify(SpanCollector {
///     context_key: "spans",
///     capture_fields: false,
///     enabled: true,
/// });
/// ```
#[derive(Copy, Clone, Debug)]
pub struct SpanCollector {
    /// Context key the span chain is stored under.
    pub context_key: &'static str,
    /// Whether span fields are included, or only span names.
    pub capture_fields: bool,
    /// When false the hook leaves notices untouched.
    pub enabled: bool,
}

#[derive(Debug)]
struct HoneybadgerTracingEnvOptions {
    names_only: bool,
    off: bool,
}

impl HoneybadgerTracingEnvOptions {
    fn get() -> &'static Self {
        static HONEYBADGER_TRACING_FLAGS: OnceLock<HoneybadgerTracingEnvOptions> = OnceLock::new();

        HONEYBADGER_TRACING_FLAGS.get_or_init(|| {
            Self::parse(std::env::var("HONEYBADGER_TRACING").ok().as_deref())
        })
    }

    fn parse(var: Option<&str>) -> Self {
        let mut options = HoneybadgerTracingEnvOptions {
            names_only: false,
            off: false,
        };
        for v in var.unwrap_or_default().split(',').map(str::trim) {
            if v.eq_ignore_ascii_case("names") {
                options.names_only = true;
            } else if v.eq_ignore_ascii_case("off") {
                options.off = true;
            }
        }
        options
    }
}

impl SpanCollector {
    /// Creates a [`SpanCollector`] configured by `HONEYBADGER_TRACING`.
    ///
    /// # Examples
    ///
    /// ```
    /// use honeybadger::hooks::Hooks;
    /// use honeybadger_tracing::SpanCollector;
    ///
    /// let hooks = Hooks::new().before_notify(SpanCollector::new());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        let env_options = HoneybadgerTracingEnvOptions::get();
        Self {
            context_key: DEFAULT_CONTEXT_KEY,
            capture_fields: !env_options.names_only,
            enabled: !env_options.off,
        }
    }
}

impl Default for SpanCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl BeforeNotifyHook for SpanCollector {
    fn before_notify(&self, notice: &mut Notice) -> HookDecision {
        if self.enabled
            && let Some(spans) = current_spans(self.capture_fields)
        {
            notice.context.insert(self.context_key, spans);
        }
        HookDecision::Proceed
    }
}
