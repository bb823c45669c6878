//! Test fixtures and helpers.
//!
//! A [`TestApp`] is a Sealpost instance with a scripted host: popups the
//! app asks for show up on [`TestApp::next_popup`], and pages are plain
//! channels ([`Page`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sealpost::{
    Message, Result, RouterError, Sealpost, SealpostConfig, SealpostError, SurfaceOpener,
};
use sealpost_core::{CryptoEngine, GenerateKeyOptions, Key, SoftEngine};
use sealpost_store::{KeyringStore, MemoryStore};
use sealpost_sync::{MemoryRemote, RemoteSyncTransport};

/// How long [`Page::recv`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A popup the app asked the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub kind: String,
    pub id: String,
}

impl PopupRequest {
    /// The channel the popup connects.
    pub fn channel(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }
}

/// Host UI that reports popups instead of opening them.
pub struct ScriptedOpener {
    popups: mpsc::UnboundedSender<PopupRequest>,
    refuse: AtomicBool,
}

impl ScriptedOpener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PopupRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let opener = Arc::new(Self {
            popups: tx,
            refuse: AtomicBool::new(false),
        });
        (opener, rx)
    }

    /// Make every following `open_popup` fail.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl SurfaceOpener for ScriptedOpener {
    async fn open_popup(&self, kind: &str, id: &str) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SealpostError::Surface("popup blocked".into()));
        }
        self.popups
            .send(PopupRequest {
                kind: kind.to_string(),
                id: id.to_string(),
            })
            .map_err(|_| SealpostError::Surface("host gone".into()))
    }
}

/// An extension page: one connected channel.
pub struct Page {
    name: String,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl Page {
    /// Connect channel `name` on `app`.
    pub fn open(app: &Sealpost, name: &str) -> std::result::Result<Self, RouterError> {
        let (tx, rx) = mpsc::unbounded_channel();
        app.connect(name, tx)?;
        Ok(Self {
            name: name.to_string(),
            inbox: rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `message` as this page.
    pub fn send(&self, app: &Sealpost, message: Message) -> bool {
        app.dispatch(&self.name, message).unwrap_or(false)
    }

    /// Next message for this page, or None on timeout or close.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(RECV_TIMEOUT, self.inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next message, which must be an `event`.
    ///
    /// # Panics
    ///
    /// If nothing arrives or a different event arrives.
    pub async fn expect(&mut self, event: &str) -> Message {
        match self.recv().await {
            Some(message) if message.event() == event => message,
            Some(other) => panic!("{}: expected {event}, got {other:?}", self.name),
            None => panic!("{}: expected {event}, got nothing", self.name),
        }
    }

    /// Whatever is queued right now.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            out.push(message);
        }
        out
    }

    pub fn close(self, app: &Sealpost) {
        let _ = app.disconnect(&self.name);
    }
}

/// A Sealpost instance with a scripted host.
pub struct TestApp {
    pub app: Sealpost,
    pub opener: Arc<ScriptedOpener>,
    /// The remote store, when sync does not run over a channel.
    pub remote: Option<Arc<MemoryRemote>>,
    popups: mpsc::UnboundedReceiver<PopupRequest>,
}

impl TestApp {
    /// Memory store, memory remote, default config.
    pub async fn new() -> Self {
        Self::build(
            SealpostConfig::default(),
            Arc::new(MemoryStore::new()),
            Some(Arc::new(MemoryRemote::new())),
        )
        .await
    }

    /// Sync runs over the `syncHandler` channel.
    pub async fn over_channel() -> Self {
        Self::build(SealpostConfig::default(), Arc::new(MemoryStore::new()), None).await
    }

    /// # Panics
    ///
    /// If the app cannot start.
    pub async fn build(
        config: SealpostConfig,
        store: Arc<dyn KeyringStore>,
        remote: Option<Arc<MemoryRemote>>,
    ) -> Self {
        let (opener, popups) = ScriptedOpener::new();
        let mut builder = Sealpost::builder()
            .config(config)
            .store(store)
            .opener(opener.clone());
        if let Some(remote) = &remote {
            builder = builder.remote(remote.clone() as Arc<dyn RemoteSyncTransport>);
        }
        let app = builder.build().await.expect("app starts");
        Self {
            app,
            opener,
            remote,
            popups,
        }
    }

    pub fn open(&self, name: &str) -> std::result::Result<Page, RouterError> {
        Page::open(&self.app, name)
    }

    /// The next popup the app asked for.
    ///
    /// # Panics
    ///
    /// If none is requested within [`RECV_TIMEOUT`].
    pub async fn next_popup(&mut self) -> PopupRequest {
        tokio::time::timeout(RECV_TIMEOUT, self.popups.recv())
            .await
            .ok()
            .flatten()
            .expect("popup requested")
    }

    pub fn pending_popup(&mut self) -> Option<PopupRequest> {
        self.popups.try_recv().ok()
    }

    /// Generate a key locked with `password` and import it into the default
    /// keyring.
    pub async fn add_key(&self, user_id: &str, password: &str) -> Key {
        let key = generate_key(user_id, password).await;
        let keyring = self.app.context().default_keyring().await.expect("keyring");
        keyring.import_key(&key).await.expect("import");
        key
    }

    /// Encrypt `text` to `key` the way a sender would.
    pub async fn encrypt_to(&self, key: &Key, text: &str) -> String {
        self.app
            .context()
            .crypto()
            .encrypt_message(text.as_bytes(), &[key.to_public()], None)
            .await
            .expect("encrypt")
    }
}

/// A fresh private key locked with `password`.
pub async fn generate_key(user_id: &str, password: &str) -> Key {
    SoftEngine::new()
        .generate_key(GenerateKeyOptions {
            user_ids: vec![user_id.to_string()],
            password: password.to_string(),
        })
        .await
        .expect("key generation")
}

/// Armored public block of `keys`.
pub fn armored_public(keys: &[Key]) -> String {
    let public: Vec<Key> = keys.iter().map(Key::to_public).collect();
    SoftEngine::new().armor_keys(&public).expect("armor")
}
