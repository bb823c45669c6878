//! Key import dialog controller (`importKeyDialog`).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sealpost_core::{CryptoError, Key};
use sealpost_sync::SyncOptions;

use crate::context::Context;
use crate::controller::{Action, BaseController, Controller};
use crate::controllers::IMPORT_KEY_DIALOG;
use crate::error::Result;
use crate::message::{InitData, KeySummary, Message};

pub struct ImportController {
    base: BaseController,
    context: Arc<Context>,
    keys: Vec<Key>,
}

impl ImportController {
    pub fn new(base: BaseController, context: Arc<Context>) -> Self {
        Self {
            base,
            context,
            keys: Vec::new(),
        }
    }

    async fn read(&mut self, armored: &str) -> Result<Message> {
        let keys = self.context.crypto().read_keys(armored).await?;
        if keys.is_empty() {
            return Err(CryptoError::Import("no keys in armored text".into()).into());
        }
        let summaries = keys.iter().map(KeySummary::from).collect();
        self.keys = keys;
        Ok(Message::SetInitData {
            data: InitData::KeyImport { keys: summaries },
        })
    }

    async fn import(&mut self) -> Result<Message> {
        if self.keys.is_empty() {
            return Err(CryptoError::Import("nothing to import".into()).into());
        }
        let keyring = self.context.default_keyring().await?;
        let mut fingerprints = Vec::with_capacity(self.keys.len());
        for key in self.keys.drain(..) {
            let result = keyring.import_key(&key).await?;
            debug!(fingerprint = %key.fingerprint(), ?result, "key imported");
            fingerprints.push(key.fingerprint().to_hex());
        }
        info!(count = fingerprints.len(), keyring = %keyring.id(), "import done");
        self.context
            .request_sync(keyring.id().clone(), SyncOptions::default());
        Ok(Message::ImportDone { fingerprints })
    }
}

#[async_trait]
impl Controller for ImportController {
    fn base(&self) -> &BaseController {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseController {
        &mut self.base
    }

    async fn handle_message(&mut self, _port: &str, message: Message) -> Vec<Action> {
        match message {
            Message::KeyImportDialogInit { armored } => match self.read(&armored).await {
                Ok(reply) => vec![Action::send(IMPORT_KEY_DIALOG, reply)],
                Err(e) => {
                    warn!(id = %self.base.id(), error = %e, "import read failed");
                    vec![Action::send(IMPORT_KEY_DIALOG, Message::error(&e))]
                }
            },
            Message::KeyImportDialogOk => match self.import().await {
                Ok(reply) => vec![Action::send(IMPORT_KEY_DIALOG, reply), Action::Complete],
                Err(e) => {
                    warn!(id = %self.base.id(), error = %e, "import failed");
                    vec![Action::send(IMPORT_KEY_DIALOG, Message::error(&e))]
                }
            },
            Message::KeyImportDialogCancel => {
                self.keys.clear();
                vec![
                    Action::send(IMPORT_KEY_DIALOG, Message::DialogDone),
                    Action::Complete,
                ]
            }
            other => {
                debug!(id = %self.base.id(), event = other.event(), "ignored");
                Vec::new()
            }
        }
    }
}
