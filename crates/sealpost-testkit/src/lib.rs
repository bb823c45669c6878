//! # Sealpost Testkit
//!
//! Testing utilities for Sealpost.
//!
//! ## Overview
//!
//! - **Fixtures**: a [`TestApp`] with a scripted host, [`Page`]s standing in
//!   for extension pages, and key helpers
//! - **Generators**: proptest strategies for channel names and change logs
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sealpost::Message;
//! use sealpost_testkit::TestApp;
//!
//! # async fn example() {
//! let mut app = TestApp::new().await;
//! let key = app.add_key("Alice <alice@example.org>", "secret").await;
//! let armored = app.encrypt_to(&key, "hello").await;
//!
//! let mut frame = app.open("dFrame-1").unwrap();
//! frame.send(&app.app, Message::SetArmored { data: armored });
//! frame.send(&app.app, Message::DecryptMessageInit);
//!
//! // the key is locked: the app asks for a password dialog
//! let popup = app.next_popup().await;
//! let dialog = app.open(&popup.channel()).unwrap();
//! dialog.send(&app.app, Message::PwdDialogOk { password: "secret".into(), cache: false });
//!
//! frame.expect("waiting-for-password").await;
//! frame.expect("decrypted-message").await;
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealpost_testkit::generators::change_log_pair;
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_idempotent((mut ours, theirs) in change_log_pair()) {
//!         ours.merge(&theirs);
//!         let once = ours.clone();
//!         ours.merge(&theirs);
//!         prop_assert_eq!(ours, once);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{armored_public, generate_key, Page, PopupRequest, ScriptedOpener, TestApp};
pub use generators::{change_log, change_log_pair, channel_name};
