//! Key generation controller (`keyGenCont` + `keyGenDialog`).
//!
//! The container page asks for a key with `generate-key`; the optional
//! dialog only listens for the result.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sealpost_core::{CoreError, GenerateKeyOptions};
use sealpost_sync::SyncOptions;

use crate::context::Context;
use crate::controller::{Action, BaseController, Controller};
use crate::controllers::{KEY_GEN_CONT, KEY_GEN_DIALOG};
use crate::error::Result;
use crate::message::Message;

pub struct KeyGenController {
    base: BaseController,
    context: Arc<Context>,
}

impl KeyGenController {
    pub fn new(base: BaseController, context: Arc<Context>) -> Self {
        Self { base, context }
    }

    async fn generate(&self, user_ids: Vec<String>, password: String) -> Result<String> {
        if user_ids.is_empty() {
            return Err(CoreError::InvalidId("a user id is required".into()).into());
        }
        let key = self
            .context
            .crypto()
            .generate_key(GenerateKeyOptions { user_ids, password })
            .await?;
        let keyring = self.context.default_keyring().await?;
        let first = keyring.default_key().await?.is_none();
        keyring.import_key(&key).await?;
        if first {
            keyring.set_default_key(&key.fingerprint()).await?;
        }
        info!(fingerprint = %key.fingerprint(), keyring = %keyring.id(), "key generated");
        self.context
            .request_sync(keyring.id().clone(), SyncOptions::default());
        Ok(key.fingerprint().to_hex())
    }
}

#[async_trait]
impl Controller for KeyGenController {
    fn base(&self) -> &BaseController {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseController {
        &mut self.base
    }

    async fn handle_message(&mut self, port: &str, message: Message) -> Vec<Action> {
        match message {
            Message::GenerateKey { user_ids, password } => {
                match self.generate(user_ids, password).await {
                    Ok(fingerprint) => {
                        let done = Message::GenerateDone { fingerprint };
                        let mut actions = vec![Action::send(KEY_GEN_CONT, done.clone())];
                        if self.base.has_port(KEY_GEN_DIALOG) {
                            actions.push(Action::send(KEY_GEN_DIALOG, done));
                        }
                        actions
                    }
                    Err(e) => {
                        warn!(id = %self.base.id(), error = %e, "key generation failed");
                        self.base.error_on(&[KEY_GEN_CONT, KEY_GEN_DIALOG], &e)
                    }
                }
            }
            other => {
                debug!(id = %self.base.id(), port, event = other.event(), "ignored");
                Vec::new()
            }
        }
    }
}
