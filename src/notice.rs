//! Notices and how they are built.
//!
//! A [`Notice`] is one reportable event. It is assembled by [`Notice::build`]
//! from a [`NoticeInput`], a snapshot of the active context and the static
//! [`NoticeMetadata`] of the client, then handed to `beforeNotify` hooks,
//! which may edit it in place. Once the hooks have run the notice is moved
//! into the delivery and never changes again.

use core::{error::Error, panic::Location};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::Config,
    context::Context,
    error::InvalidInputError,
    sanitize,
    stats::Stats,
};

/// Class used for notices built from a plain message.
pub const MESSAGE_CLASS: &str = "Error";

const PROJECT_ROOT_PLACEHOLDER: &str = "[PROJECT_ROOT]";

/// One stack frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Line number.
    pub number: Option<u32>,
    /// Source file.
    pub file: Option<String>,
    /// Function name.
    pub method: String,
}

impl Frame {
    fn from_location(location: &Location<'_>, method: &str) -> Self {
        Self {
            number: Some(location.line()),
            file: Some(location.file().to_owned()),
            method: method.to_owned(),
        }
    }
}

/// One entry of an error's `source()` chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    /// Class of the cause, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// `Display` output of the cause.
    pub message: String,
}

/// What a notice is built from: an error or a message.
///
/// Errors convert with `From<&E>`; messages with `From<String>` or
/// [`NoticeInput::message`]. The error's details are extracted immediately,
/// so the input does not borrow the error.
#[derive(Clone, Debug)]
pub struct NoticeInput(InputKind);

#[derive(Clone, Debug)]
enum InputKind {
    Error {
        class: String,
        message: String,
        causes: Vec<Cause>,
    },
    Message(String),
}

impl NoticeInput {
    /// Input from an error value. The class is the error's type name without
    /// its module path.
    pub fn error<E: Error + ?Sized + 'static>(error: &E) -> Self {
        Self::error_with_class(error, short_type_name(core::any::type_name::<E>()))
    }

    /// Input from an error with an explicit class, for type-erased errors
    /// whose type name says nothing useful.
    pub(crate) fn error_with_class<E: Error + ?Sized>(error: &E, class: String) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(Cause {
                class: None,
                message: cause.to_string(),
            });
            source = cause.source();
        }

        Self(InputKind::Error {
            class,
            message: error.to_string(),
            causes,
        })
    }

    /// Input from a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self(InputKind::Message(message.into()))
    }
}

/// `alloc::vec::Vec<my_app::Item>` becomes `Vec<Item>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        match c {
            ':' => segment.clear(),
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push_str(&segment);
                segment.clear();
                out.push(c);
            }
            _ => segment.push(c),
        }
    }
    out.push_str(&segment);
    out
}

impl<E: Error + 'static> From<&E> for NoticeInput {
    fn from(error: &E) -> Self {
        Self::error(error)
    }
}

impl From<String> for NoticeInput {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

/// Client-wide values copied into every notice.
#[derive(Clone, Debug, Default)]
pub struct NoticeMetadata {
    /// Deployment environment.
    pub environment: Option<String>,
    /// Host name.
    pub hostname: Option<String>,
    /// Project root; frame paths under it are shortened.
    pub project_root: Option<String>,
    /// Deployed revision.
    pub revision: Option<String>,
    /// Default component label.
    pub component: Option<String>,
    /// Default action label.
    pub action: Option<String>,
    /// Tags added to every notice.
    pub tags: Vec<String>,
    /// Filters applied to cookies.
    pub filters: Vec<String>,
    /// Process id.
    pub pid: u32,
}

impl From<&Config> for NoticeMetadata {
    fn from(config: &Config) -> Self {
        Self {
            environment: config.environment.clone(),
            hostname: config.hostname.clone(),
            project_root: config.project_root.clone(),
            revision: config.revision.clone(),
            component: config.component.clone(),
            action: config.action.clone(),
            tags: config.tags.clone(),
            filters: config.filters.clone(),
            pid: std::process::id(),
        }
    }
}

/// One reportable event.
///
/// All fields are public so `beforeNotify` hooks can edit them.
#[derive(Clone, Debug, Serialize)]
pub struct Notice {
    /// Error class.
    pub class: String,
    /// Error message.
    pub message: String,
    /// Stack frames, most recent first.
    pub backtrace: Vec<Frame>,
    /// The error's `source()` chain.
    pub causes: Vec<Cause>,
    /// Grouping key overriding the collector's default grouping.
    pub fingerprint: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Snapshot of the context at build time.
    pub context: Context,
    /// Component label (e.g. a controller or handler name).
    pub component: Option<String>,
    /// Action label.
    pub action: Option<String>,
    /// Request URL.
    pub url: Option<String>,
    /// Request parameters.
    pub params: Context,
    /// Session data.
    pub session: Context,
    /// CGI-style request variables, including `HTTP_COOKIE`.
    pub cgi_data: Context,
    /// Deployment environment.
    pub environment: Option<String>,
    /// Host name.
    pub hostname: Option<String>,
    /// Project root.
    pub project_root: Option<String>,
    /// Deployed revision.
    pub revision: Option<String>,
    /// Process id.
    pub pid: u32,
    /// When the notice was built.
    pub time: DateTime<Utc>,
}

impl Notice {
    /// Builds a notice.
    ///
    /// `context` is taken by value, so later changes to the live context do
    /// not reach the notice. Errors get a captured backtrace when the
    /// `backtrace` feature is enabled; messages, and errors whose backtrace
    /// could not be captured, get a single frame at the caller's location.
    ///
    /// # Errors
    ///
    /// [`InvalidInputError`] if the input is a blank message.
    #[track_caller]
    pub fn build(
        input: NoticeInput,
        context: Context,
        metadata: &NoticeMetadata,
    ) -> Result<Self, InvalidInputError> {
        let location = Location::caller();

        let (class, message, causes, backtrace) = match input.0 {
            InputKind::Message(message) if message.trim().is_empty() => {
                return Err(InvalidInputError);
            }
            InputKind::Message(message) => (
                MESSAGE_CLASS.to_owned(),
                message,
                Vec::new(),
                vec![Frame::from_location(location, "notify")],
            ),
            InputKind::Error {
                class,
                message,
                causes,
            } => (class, message, causes, error_backtrace(location)),
        };

        let mut notice = Self {
            class,
            message,
            backtrace,
            causes,
            fingerprint: None,
            tags: metadata.tags.clone(),
            context,
            component: metadata.component.clone(),
            action: metadata.action.clone(),
            url: None,
            params: Context::new(),
            session: Context::new(),
            cgi_data: Context::new(),
            environment: metadata.environment.clone(),
            hostname: metadata.hostname.clone(),
            project_root: metadata.project_root.clone(),
            revision: metadata.revision.clone(),
            pid: metadata.pid,
            time: Utc::now(),
        };

        if let Some(root) = metadata.project_root.as_deref().filter(|root| !root.is_empty()) {
            for frame in &mut notice.backtrace {
                if let Some(file) = &mut frame.file
                    && let Some(rest) = file.strip_prefix(root)
                {
                    *file = format!("{PROJECT_ROOT_PLACEHOLDER}{rest}");
                }
            }
        }

        Ok(notice)
    }

    /// JSON body sent to the collector.
    pub(crate) fn to_payload(&self, stats: Option<&Stats>) -> Result<Value, serde_json::Error> {
        serde_json::to_value(Payload {
            notifier: Notifier {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
                language: "rust",
            },
            error: ErrorSection {
                class: &self.class,
                message: &self.message,
                backtrace: &self.backtrace,
                causes: &self.causes,
                fingerprint: self.fingerprint.as_deref(),
                tags: &self.tags,
            },
            request: RequestSection {
                url: self.url.as_deref(),
                component: self.component.as_deref(),
                action: self.action.as_deref(),
                context: &self.context,
                params: &self.params,
                session: &self.session,
                cgi_data: &self.cgi_data,
            },
            server: ServerSection {
                project_root: self.project_root.as_deref(),
                environment_name: self.environment.as_deref(),
                hostname: self.hostname.as_deref(),
                revision: self.revision.as_deref(),
                pid: self.pid,
                time: self.time,
                stats,
            },
        })
    }
}

fn error_backtrace(location: &Location<'_>) -> Vec<Frame> {
    #[cfg(feature = "backtrace")]
    let captured = crate::backtrace::capture(&crate::backtrace::BacktraceFilter::from_env());
    #[cfg(not(feature = "backtrace"))]
    let captured: Option<Vec<Frame>> = None;

    captured.unwrap_or_else(|| vec![Frame::from_location(location, "notify")])
}

/// Cookies given to [`NotifyOptions::cookies`].
#[derive(Clone, Debug)]
pub enum Cookies {
    /// A raw `Cookie` header.
    Header(String),
    /// Name/value pairs.
    Pairs(Vec<(String, String)>),
}

impl From<&str> for Cookies {
    fn from(header: &str) -> Self {
        Self::Header(header.to_owned())
    }
}

impl From<String> for Cookies {
    fn from(header: String) -> Self {
        Self::Header(header)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Pairs(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl Cookies {
    fn render(&self, filters: &[String]) -> String {
        match self {
            Self::Header(header) => sanitize::filter_cookies(sanitize::parse_cookies(header), filters),
            Self::Pairs(pairs) => sanitize::filter_cookies(
                pairs.iter().map(|(name, value)| (name.as_str(), value.as_str())),
                filters,
            ),
        }
    }
}

/// Per-call options for [`Client::notify_with`](crate::Client::notify_with).
///
/// ```
/// use honeybadger::{NotifyOptions, context};
///
/// let options = NotifyOptions::new()
///     .context(context! { "order_id" => 1234 })
///     .component("checkout")
///     .action("submit")
///     .fingerprint("checkout-submit")
///     .tags(["payments"])
///     .cookies("session=abc; password=hunter2");
/// ```
#[derive(Default)]
pub struct NotifyOptions {
    pub(crate) context: Option<Context>,
    pub(crate) component: Option<String>,
    pub(crate) action: Option<String>,
    pub(crate) fingerprint: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) url: Option<String>,
    pub(crate) params: Option<Context>,
    pub(crate) session: Option<Context>,
    pub(crate) cgi_data: Option<Context>,
    pub(crate) cookies: Option<Cookies>,
    pub(crate) after_notify: Option<crate::hooks::after_notify::StoredAfterNotifyHook>,
}

impl core::fmt::Debug for NotifyOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotifyOptions")
            .field("context", &self.context)
            .field("component", &self.component)
            .field("action", &self.action)
            .field("fingerprint", &self.fingerprint)
            .field("tags", &self.tags)
            .field("url", &self.url)
            .field("after_notify", &self.after_notify.as_ref().map(ToString::to_string))
            .finish_non_exhaustive()
    }
}

impl NotifyOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context merged over the active context for this notice only.
    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Component label.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Action label.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Custom grouping key.
    #[must_use]
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Extra tags, added after the configured ones.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Request URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Request parameters.
    #[must_use]
    pub fn params(mut self, params: Context) -> Self {
        self.params = Some(params);
        self
    }

    /// Session data.
    #[must_use]
    pub fn session(mut self, session: Context) -> Self {
        self.session = Some(session);
        self
    }

    /// CGI-style request variables.
    #[must_use]
    pub fn cgi_data(mut self, cgi_data: Context) -> Self {
        self.cgi_data = Some(cgi_data);
        self
    }

    /// Request cookies, stored filtered as `cgi_data["HTTP_COOKIE"]`.
    #[must_use]
    pub fn cookies(mut self, cookies: impl Into<Cookies>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    /// `afterNotify` hook for this notice only. It runs after the client's
    /// registered hooks.
    #[track_caller]
    #[must_use]
    pub fn after_notify<H>(mut self, hook: H) -> Self
    where
        H: crate::hooks::after_notify::AfterNotifyHook,
    {
        self.after_notify = Some(crate::hooks::after_notify::after_notify_hook_to_untyped(
            hook,
        ));
        self
    }

    /// Applies everything except the hook, which is returned.
    pub(crate) fn apply(
        self,
        notice: &mut Notice,
        filters: &[String],
    ) -> Option<crate::hooks::after_notify::StoredAfterNotifyHook> {
        if let Some(context) = self.context {
            notice.context.merge(context);
        }
        if self.component.is_some() {
            notice.component = self.component;
        }
        if self.action.is_some() {
            notice.action = self.action;
        }
        if self.fingerprint.is_some() {
            notice.fingerprint = self.fingerprint;
        }
        notice.tags.extend(self.tags);
        if self.url.is_some() {
            notice.url = self.url;
        }
        if let Some(params) = self.params {
            notice.params = params;
        }
        if let Some(session) = self.session {
            notice.session = session;
        }
        if let Some(cgi_data) = self.cgi_data {
            notice.cgi_data = cgi_data;
        }
        if let Some(cookies) = self.cookies {
            notice
                .cgi_data
                .insert("HTTP_COOKIE", cookies.render(filters));
        }
        self.after_notify
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    notifier: Notifier,
    error: ErrorSection<'a>,
    request: RequestSection<'a>,
    server: ServerSection<'a>,
}

#[derive(Serialize)]
struct Notifier {
    name: &'static str,
    version: &'static str,
    language: &'static str,
}

#[derive(Serialize)]
struct ErrorSection<'a> {
    class: &'a str,
    message: &'a str,
    backtrace: &'a [Frame],
    #[serde(skip_serializing_if = "<[Cause]>::is_empty")]
    causes: &'a [Cause],
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'a str>,
    tags: &'a [String],
}

#[derive(Serialize)]
struct RequestSection<'a> {
    url: Option<&'a str>,
    component: Option<&'a str>,
    action: Option<&'a str>,
    context: &'a Context,
    params: &'a Context,
    session: &'a Context,
    cgi_data: &'a Context,
}

#[derive(Serialize)]
struct ServerSection<'a> {
    project_root: Option<&'a str>,
    environment_name: Option<&'a str>,
    hostname: Option<&'a str>,
    revision: Option<&'a str>,
    pid: u32,
    time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a Stats>,
}
