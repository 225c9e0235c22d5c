use core::{fmt, future::Future};

use triomphe::Arc;

use crate::{
    config::Config,
    context::{Context, ContextStore},
    delivery::{Delivery, Plan, PreparedNotice, SkipReason},
    error::{BuildError, InvalidInputError},
    hooks::{
        HookRegistry, Hooks, after_notify::AfterNotifyHook, before_notify::BeforeNotifyHook,
    },
    notice::{Notice, NoticeInput, NoticeMetadata, NotifyOptions},
    stats::{ProcStats, StatsProvider},
    transport::{Transport, TransportOptions},
};

pub(crate) struct Shared {
    pub(crate) config: spin::RwLock<Arc<Config>>,
    pub(crate) hooks: HookRegistry,
    pub(crate) context: ContextStore,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) stats: Option<Box<dyn StatsProvider>>,
}

/// A configured notifier.
///
/// Cloning is cheap and every clone shares configuration, hooks and the
/// default context. Separately built clients share nothing but the ambient
/// per-task context scope.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &*self.config())
            .field("hooks", &self.shared.hooks)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`].
#[must_use]
pub struct ClientBuilder {
    config: Config,
    hooks: Hooks,
    transport: Option<Box<dyn Transport>>,
    stats: Option<Box<dyn StatsProvider>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the initial hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Uses `transport` instead of the default HTTP transport.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Uses `stats` instead of [`ProcStats`].
    pub fn stats_provider<S: StatsProvider>(mut self, stats: S) -> Self {
        self.stats = Some(Box::new(stats));
        self
    }

    /// Sends notices without runtime stats.
    pub fn without_stats(mut self) -> Self {
        self.stats = None;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Fails if no transport was given and the default one cannot be built.
    pub fn build(self) -> Result<Client, BuildError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        Ok(Client {
            shared: Arc::new(Shared {
                config: spin::RwLock::new(Arc::new(self.config)),
                hooks: HookRegistry::from(self.hooks),
                context: ContextStore::new(),
                transport,
                stats: self.stats,
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Result<Box<dyn Transport>, BuildError> {
    Ok(Box::new(crate::transport::HttpTransport::new()?))
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Result<Box<dyn Transport>, BuildError> {
    Err(BuildError::MissingTransport)
}

impl Client {
    /// Starts building a client with the default configuration.
    #[track_caller]
    pub fn builder() -> ClientBuilder {
        ClientBuilder {
            config: Config::default(),
            hooks: Hooks::new(),
            transport: None,
            stats: Some(Box::new(ProcStats)),
        }
    }

    /// Client with `config` and the default transport.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn new(config: Config) -> Result<Self, BuildError> {
        Self::builder().config(config).build()
    }

    /// Client configured from `HONEYBADGER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Fails on malformed variables, see [`Config::from_env`].
    pub fn from_env() -> Result<Self, BuildError> {
        Self::new(Config::from_env()?)
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        self.shared.config.read().clone()
    }

    /// Edits the configuration. Notices already prepared keep the old one.
    pub fn configure(&self, edit: impl FnOnce(&mut Config)) {
        let mut guard = self.shared.config.write();
        edit(Arc::make_mut(&mut guard));
    }

    /// Registers a `beforeNotify` hook.
    #[track_caller]
    pub fn before_notify<H: BeforeNotifyHook>(&self, hook: H) {
        self.shared.hooks.register_before(hook);
    }

    /// Registers an `afterNotify` hook.
    #[track_caller]
    pub fn after_notify<H: AfterNotifyHook>(&self, hook: H) {
        self.shared.hooks.register_after(hook);
    }

    /// The client's context store.
    #[must_use]
    pub fn context_store(&self) -> &ContextStore {
        &self.shared.context
    }

    /// Snapshot of the active context.
    #[must_use]
    pub fn context(&self) -> Context {
        self.shared.context.current()
    }

    /// Shallow-merges `patch` into the active context.
    pub fn set_context(&self, patch: impl Into<Context>) {
        self.shared.context.set_context(patch);
    }

    /// Empties the active context.
    pub fn clear_context(&self) {
        self.shared.context.clear();
    }

    /// Reports an error or message.
    ///
    /// The notice is built and the `beforeNotify` hooks run right away, on
    /// the calling task; the returned future sends it and runs the
    /// `afterNotify` hooks. The future must be polled on a tokio runtime.
    ///
    /// # Errors
    ///
    /// Only [`InvalidInputError`], for a blank message. Delivery problems are
    /// reported through [`Delivery::outcome`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use honeybadger::{Client, Config, NoticeInput};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::new(Config::new("project-api-key"))?;
    ///
    /// let err = std::io::Error::other("disk full");
    /// let delivery = client.notify(&err).await?;
    /// println!("{:?}", delivery.outcome);
    ///
    /// client.notify(NoticeInput::message("cache rebuilt from scratch")).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[track_caller]
    pub fn notify(
        &self,
        input: impl Into<NoticeInput>,
    ) -> impl Future<Output = Result<Delivery, InvalidInputError>> + Send + 'static {
        self.notify_with(input, NotifyOptions::default())
    }

    /// [`notify`](Self::notify) with per-call options.
    #[track_caller]
    pub fn notify_with(
        &self,
        input: impl Into<NoticeInput>,
        options: NotifyOptions,
    ) -> impl Future<Output = Result<Delivery, InvalidInputError>> + Send + 'static {
        let prepared = self.prepare(input.into(), options);
        async move { Ok(prepared?.deliver().await) }
    }

    /// Synchronous half of [`notify_with`](Self::notify_with).
    ///
    /// # Errors
    ///
    /// [`InvalidInputError`] for a blank message.
    #[track_caller]
    pub fn prepare(
        &self,
        input: NoticeInput,
        options: NotifyOptions,
    ) -> Result<PreparedNotice, InvalidInputError> {
        let config = self.config();
        let metadata = NoticeMetadata::from(&*config);

        let mut notice = Notice::build(input, self.context(), &metadata)?;
        let after_notify = options.apply(&mut notice, &config.filters);

        let plan = match config.api_key() {
            None => {
                tracing::warn!("unable to send error report: no API key has been configured");
                Plan::Skip(SkipReason::MissingApiKey)
            }
            Some(_) if !config.reporting_enabled() => Plan::Skip(SkipReason::ReportingDisabled),
            Some(_) if !self.shared.hooks.run_before(&mut notice) => Plan::Skip(SkipReason::Vetoed),
            Some(api_key) => Plan::Send(TransportOptions::new(&config, api_key)),
        };

        Ok(PreparedNotice {
            shared: self.shared.clone(),
            notice,
            plan,
            after_notify,
        })
    }
}
