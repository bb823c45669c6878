//! Decrypt controller (`dFrame` + `dDialog`).
//!
//! The frame hands over the armored text with `set-armored`. When the reader
//! dialog (or the frame itself) sends `decrypt-message-init`, the controller
//! finds the private key the message is encrypted to, unlocks it (prompting
//! if needed) and answers with `decrypted-message` or `error-message`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sealpost_core::{CryptoError, Key, KeyId, KeyPacket};
use sealpost_unlock::UnlockRequest;

use crate::context::Context;
use crate::controller::{Action, BaseController, Controller};
use crate::controllers::{D_DIALOG, D_FRAME};
use crate::error::Result;
use crate::message::Message;

pub struct DecryptController {
    base: BaseController,
    context: Arc<Context>,
    armored: Option<String>,
}

impl DecryptController {
    pub fn new(base: BaseController, context: Arc<Context>) -> Self {
        Self {
            base,
            context,
            armored: None,
        }
    }

    /// Replies go to the reader dialog when it is open.
    fn reply_port(&self) -> &'static str {
        if self.base.has_port(D_DIALOG) {
            D_DIALOG
        } else {
            D_FRAME
        }
    }

    async fn decrypt(&self) -> Result<Message> {
        let armored = self
            .armored
            .as_deref()
            .ok_or_else(|| CryptoError::ArmorParse("no armored message".into()))?;
        let crypto = self.context.crypto();
        let message = crypto.read_message(armored).await?;
        let keyring = self.context.default_keyring().await?;
        let verification: Vec<Key> = keyring.keys().await?.iter().map(Key::to_public).collect();

        // clear-signed text: verify only
        if message.encryption_key_ids.is_empty() {
            let any = verification
                .first()
                .ok_or_else(|| CryptoError::NoKeyFound("keyring is empty".into()))?;
            let verified = crypto.decrypt_message(&message, any, &verification).await?;
            return Ok(decrypted(verified));
        }

        let (key, key_id) = self.find_private_key(&keyring, &message.encryption_key_ids).await?;
        let user_id = key.primary_user_id().map(str::to_owned);
        let waiting = self.base.sender(self.reply_port());
        let mut request = UnlockRequest::new(key, key_id, keyring.id().clone())
            .reason("decrypt")
            .on_before_prompt(move || {
                if let Some(tx) = waiting {
                    let _ = tx.send(Message::WaitingForPassword);
                }
            });
        if let Some(user_id) = user_id {
            request = request.user_id(user_id);
        }
        let unlocked = self.context.unlock().unlock(request).await?;

        let result = crypto
            .decrypt_message(&message, &unlocked, &verification)
            .await?;
        info!(id = %self.base.id(), verified = result.verified, "message decrypted");
        Ok(decrypted(result))
    }

    async fn find_private_key(
        &self,
        keyring: &sealpost_sync::Keyring,
        key_ids: &[KeyId],
    ) -> Result<(Key, KeyId)> {
        for key_id in key_ids {
            if let Some(key) = keyring.key_by_key_id(key_id).await? {
                if key.packet(*key_id).is_some_and(KeyPacket::is_private) {
                    return Ok((key, *key_id));
                }
            }
        }
        let ids: Vec<String> = key_ids.iter().map(KeyId::to_hex).collect();
        Err(CryptoError::NoKeyFound(ids.join(", ")).into())
    }
}

fn decrypted(result: sealpost_core::DecryptedMessage) -> Message {
    Message::DecryptedMessage {
        message: String::from_utf8_lossy(&result.data).into_owned(),
        signer: result.signer.map(|id| id.to_hex()),
        verified: result.verified,
    }
}

#[async_trait]
impl Controller for DecryptController {
    fn base(&self) -> &BaseController {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseController {
        &mut self.base
    }

    async fn handle_message(&mut self, port: &str, message: Message) -> Vec<Action> {
        match message {
            Message::SetArmored { data } => {
                self.armored = Some(data);
                Vec::new()
            }
            Message::DecryptMessageInit => match self.decrypt().await {
                Ok(reply) => vec![Action::send(self.reply_port(), reply)],
                Err(e) => {
                    warn!(id = %self.base.id(), code = %e.code(), error = %e, "decrypt failed");
                    self.base.error_on(&[D_DIALOG, D_FRAME], &e)
                }
            },
            other => {
                debug!(id = %self.base.id(), port, event = other.event(), "ignored");
                Vec::new()
            }
        }
    }
}
