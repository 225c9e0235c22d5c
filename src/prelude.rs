//! Commonly used items for convenient importing.
//!
//! ```
//! use honeybadger::prelude::*;
//!
//! fn wrapped(client: &Client) -> Handler<u32, u32, std::io::Error> {
//!     client.wrap(Handler::sync(|n| Ok(n * 2)))
//! }
//! ```

pub use crate::{
    Client, Config, Context, Delivery, HookDecision, Notice, NoticeInput, NotifyOptions, Outcome,
    context,
    wrap::{Completion, Handler},
};
