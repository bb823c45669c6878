//! The Sealpost application: router, context and controllers wired
//! together.
//!
//! The host (the browser-extension shell, or a test) builds one
//! [`Sealpost`], then connects channels as its pages open and dispatches
//! the messages they send.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use sealpost_core::{CryptoEngine, SoftEngine};
use sealpost_store::{KeyringStore, MemoryStore};
use sealpost_sync::RemoteSyncTransport;

use crate::config::{Preferences, SealpostConfig};
use crate::context::Context;
use crate::controller::Outbox;
use crate::controllers::register_all;
use crate::error::{Result, RouterError, SealpostError};
use crate::message::Message;
use crate::prompt::SurfaceOpener;
use crate::router::Router;

/// Opener for hosts without UI. Every prompt fails as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

#[async_trait]
impl SurfaceOpener for Headless {
    async fn open_popup(&self, kind: &str, _id: &str) -> Result<()> {
        Err(SealpostError::Surface(format!("cannot open {kind}: headless host")))
    }
}

/// Builder for [`Sealpost`].
pub struct SealpostBuilder {
    config: SealpostConfig,
    crypto: Option<Arc<dyn CryptoEngine>>,
    store: Option<Arc<dyn KeyringStore>>,
    opener: Option<Arc<dyn SurfaceOpener>>,
    remote: Option<Arc<dyn RemoteSyncTransport>>,
}

impl SealpostBuilder {
    fn new() -> Self {
        Self {
            config: SealpostConfig::default(),
            crypto: None,
            store: None,
            opener: None,
            remote: None,
        }
    }

    pub fn config(mut self, config: SealpostConfig) -> Self {
        self.config = config;
        self
    }

    /// Crypto engine. Defaults to [`SoftEngine`].
    pub fn crypto(mut self, crypto: Arc<dyn CryptoEngine>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Keyring storage. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn KeyringStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Host UI. Defaults to [`Headless`].
    pub fn opener(mut self, opener: Arc<dyn SurfaceOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Remote store. Without one, sync runs over the `syncHandler` channel.
    pub fn remote(mut self, remote: Arc<dyn RemoteSyncTransport>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub async fn build(self) -> Result<Sealpost> {
        let router = Router::new();
        let context = Context::new(
            self.config,
            self.crypto.unwrap_or_else(|| Arc::new(SoftEngine::new())),
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            self.opener.unwrap_or_else(|| Arc::new(Headless)),
            self.remote,
            router.downgrade(),
        )
        .await?;
        register_all(&router, &context);
        info!(keyring = %context.config().keyring, "sealpost started");
        Ok(Sealpost { router, context })
    }
}

/// A running Sealpost instance.
pub struct Sealpost {
    router: Router,
    context: Arc<Context>,
}

impl Sealpost {
    pub fn builder() -> SealpostBuilder {
        SealpostBuilder::new()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// A page opened channel `name`; messages for it go to `outbox`.
    pub fn connect(&self, name: &str, outbox: Outbox) -> std::result::Result<(), RouterError> {
        self.router.connect(name, outbox)
    }

    pub fn disconnect(&self, name: &str) -> std::result::Result<(), RouterError> {
        self.router.disconnect(name)
    }

    /// A page sent `message` on channel `sender`. Returns false if the
    /// instance is gone.
    pub fn dispatch(
        &self,
        sender: &str,
        message: Message,
    ) -> std::result::Result<bool, RouterError> {
        self.router.dispatch(sender, message)
    }

    /// Apply preferences sent by the options page as JSON.
    pub fn apply_preferences_json(&self, json: &str) -> Result<bool> {
        let preferences = Preferences::from_json(json)?;
        Ok(self.context.apply_preferences(&preferences))
    }
}
