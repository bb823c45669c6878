//! # Sealpost
//!
//! The orchestration core of a browser-extension secure-messaging client:
//! channel routing between extension pages, the controllers behind them,
//! and the shared application context.
//!
//! ## Overview
//!
//! Every extension page talks to Sealpost over a named channel
//! `"<type>-<id>"`. The [`Router`] maps each `id` to one controller
//! instance, so a frame and the dialog it opens (`dFrame-42`, `dDialog-42`)
//! share state. Controllers run as actors: one mailbox per instance,
//! messages handled strictly in arrival order.
//!
//! - **Decrypt** (`dFrame` + `dDialog`): decrypts armored messages,
//!   prompting for the key password when needed
//! - **Password dialog** (`pwdDialog`): created headless when a key must be
//!   unlocked; completes once the key is unlocked or the user cancels
//! - **Import** (`importKeyDialog`) and **key generation** (`keyGenCont`)
//! - **Sync handler** (`syncHandler`): relays keyring sync traffic to the
//!   page that can reach the remote store
//!
//! ## Key Properties
//!
//! - **Single owner**: an instance's state is touched only by its actor
//! - **No cycles**: the context and the prompt surface hold the router
//!   weakly
//! - **Secrets stay inside**: passwords never travel back out over a
//!   channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost::{Message, Sealpost};
//!
//! async fn example() {
//!     let app = Sealpost::builder().build().await.unwrap();
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     app.connect("dFrame-42", tx).unwrap();
//!     app.dispatch(
//!         "dFrame-42",
//!         Message::SetArmored { data: "-----BEGIN SEALPOST MESSAGE-----...".into() },
//!     )
//!     .unwrap();
//!     app.dispatch("dFrame-42", Message::DecryptMessageInit).unwrap();
//!
//!     let reply = rx.recv().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sealpost::core` - keys, ids, channel names, the crypto engine
//! - `sealpost::store` - keyring storage (memory and SQLite)
//! - `sealpost::unlock` - credential cache and unlock coordinator
//! - `sealpost::sync` - keyring sync engine

pub mod app;
pub mod config;
pub mod context;
pub mod controller;
pub mod controllers;
pub mod error;
pub mod message;
pub mod prompt;
pub mod router;
pub mod transport;

// Re-export component crates
pub use sealpost_core as core;
pub use sealpost_store as store;
pub use sealpost_sync as sync;
pub use sealpost_unlock as unlock;

pub use app::{Headless, Sealpost, SealpostBuilder};
pub use config::{Preferences, SealpostConfig};
pub use context::Context;
pub use controller::{Action, BaseController, Controller, Outbox};
pub use error::{Result, RouterError, SealpostError};
pub use message::{InitData, KeySummary, Message};
pub use prompt::{ParkedPrompt, PendingPrompts, RouterPromptSurface, SurfaceOpener};
pub use router::{Factory, Router, WeakRouter};
pub use transport::{ChannelSyncTransport, SyncReply};
