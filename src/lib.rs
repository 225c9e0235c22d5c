#![forbid(unsafe_code)]
#![deny(
    missing_docs,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Error reporting for servers, request handlers and serverless functions.
//!
//! ## Overview
//!
//! A [`Client`] turns errors into [`Notice`]s and ships them as JSON to a
//! Honeybadger-compatible collector. Around that sits the machinery needed to
//! do this reliably in a concurrent process:
//!
//! - **Context** that is scoped to one unit of work. Every request or
//!   invocation gets its own [`Context`], even when thousands run at once on
//!   the same runtime. See [`context`](mod@context).
//! - **Hooks** that run before a notice is sent (to edit or drop it) and after
//!   the send settled (to observe the outcome). See [`hooks`].
//! - **Wrappers** for handlers of any calling convention that report errors
//!   before they propagate, waiting a bounded grace period for the report to
//!   go out. See [`wrap`] and [`middleware`].
//!
//! Reporting never fails the caller. The only error [`Client::notify`] can
//! return is [`InvalidInputError`]; network failures, rejected API keys and
//! vetoes end up in the [`Outcome`] of the [`Delivery`].
//!
//! ## Quick Example
//!
//! ```no_run
//! use honeybadger::{Client, Config, NotifyOptions, context};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config::from_env()?.with_environment("production"))?;
//!
//! client.before_notify(|notice: &mut honeybadger::Notice| {
//!     notice.tags.push("checkout".to_owned());
//! });
//!
//! let store = client.context_store();
//! store
//!     .run(context! { "request_id" => "r-1" }, async {
//!         client.set_context(context! { "user_id" => 42 });
//!
//!         let err = std::io::Error::other("payment gateway unreachable");
//!         let delivery = client
//!             .notify_with(&err, NotifyOptions::new().component("checkout"))
//!             .await?;
//!         println!("{:?}", delivery.outcome);
//!         Ok::<_, honeybadger::InvalidInputError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `http` (default): [`transport::HttpTransport`], built on `reqwest`.
//! - `backtrace` (default): stack frames for error notices.
//!
//! Span fields from `tracing` can be attached to notices with the
//! `honeybadger-tracing` crate.

#[macro_use]
mod macros;

mod client;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod notice;
pub mod prelude;
pub mod sanitize;
pub mod stats;
pub mod transport;
pub mod wrap;

#[cfg(feature = "backtrace")]
#[cfg_attr(docsrs, doc(cfg(feature = "backtrace")))]
pub mod backtrace;

pub use self::{
    client::{Client, ClientBuilder},
    config::Config,
    context::{Context, ContextScope, ContextStore},
    delivery::{Delivery, Outcome, PreparedNotice, SkipReason},
    error::{
        BuildError, ConfigError, InvalidInputError, ReportingError, StatsError, TransportError,
    },
    hooks::{Hooks, before_notify::HookDecision},
    notice::{Notice, NoticeInput, NotifyOptions},
};
