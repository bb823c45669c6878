//! Password dialog controller (`pwdDialog`).
//!
//! Instances are created headless by the prompt surface. On first contact
//! the controller claims the parked prompt for its id; from then on it
//! relays passwords to the unlock coordinator and the coordinator's
//! feedback to the dialog. It completes once the key is unlocked, the user
//! cancels, or the dialog is closed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use sealpost_core::ErrorCode;
use sealpost_unlock::{PromptFeedback, PromptHandle, PromptReply, PromptRequest};

use crate::context::Context;
use crate::controller::{Action, BaseController, Controller};
use crate::controllers::PWD_DIALOG;
use crate::message::{InitData, Message};
use crate::prompt::ParkedPrompt;

struct ActivePrompt {
    request: PromptRequest,
    replies: mpsc::UnboundedSender<PromptReply>,
}

pub struct PwdDialogController {
    base: BaseController,
    context: Arc<Context>,
    prompt: Option<ActivePrompt>,
}

impl PwdDialogController {
    pub fn new(base: BaseController, context: Arc<Context>) -> Self {
        Self {
            base,
            context,
            prompt: None,
        }
    }

    /// Take over the prompt parked for this instance and start relaying its
    /// feedback into the mailbox.
    fn claim(&mut self) -> Option<&ActivePrompt> {
        if self.prompt.is_none() {
            let ParkedPrompt { request, handle } = self.context.prompts().take(self.base.id())?;
            let PromptHandle {
                replies,
                mut feedback,
            } = handle;

            let router = self.context.router().clone();
            let id = self.base.id().to_string();
            tokio::spawn(async move {
                while let Some(f) = feedback.recv().await {
                    let delivered = router
                        .upgrade()
                        .is_some_and(|r| r.post(&id, Message::PromptFeedback(f)));
                    if !delivered {
                        break;
                    }
                }
            });
            debug!(id = %self.base.id(), key_id = %request.key_id, "password prompt claimed");
            self.prompt = Some(ActivePrompt { request, replies });
        }
        self.prompt.as_ref()
    }

    fn reply(&self, reply: PromptReply) -> bool {
        self.prompt
            .as_ref()
            .is_some_and(|p| p.replies.send(reply).is_ok())
    }

    fn cancel(&mut self) -> Vec<Action> {
        if self.reply(PromptReply::Cancel) {
            info!(id = %self.base.id(), "password dialog cancelled");
        }
        self.prompt = None;
        vec![Action::Complete]
    }
}

#[async_trait]
impl Controller for PwdDialogController {
    fn base(&self) -> &BaseController {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseController {
        &mut self.base
    }

    async fn handle_message(&mut self, _port: &str, message: Message) -> Vec<Action> {
        match message {
            Message::PwdDialogInit => match self.claim() {
                Some(prompt) => {
                    let data = InitData::Password {
                        user_id: prompt.request.user_id.clone(),
                        key_id: prompt.request.key_id.to_hex(),
                        reason: prompt.request.reason.clone(),
                        cache: prompt.request.cache_enabled,
                    };
                    vec![Action::send(PWD_DIALOG, Message::SetInitData { data })]
                }
                None => vec![
                    Action::send(
                        PWD_DIALOG,
                        Message::ErrorMessage {
                            code: ErrorCode::InternalError,
                            message: "no pending password request".into(),
                        },
                    ),
                    Action::Complete,
                ],
            },
            Message::PwdDialogOk { password, cache } => {
                self.claim();
                if self.reply(PromptReply::password(password, cache)) {
                    Vec::new()
                } else {
                    vec![Action::Complete]
                }
            }
            Message::PwdDialogCancel => self.cancel(),
            Message::PromptFeedback(PromptFeedback::WrongPassword) => {
                vec![Action::send(PWD_DIALOG, Message::WrongPassword)]
            }
            Message::PromptFeedback(PromptFeedback::Unlocked) => {
                self.prompt = None;
                vec![
                    Action::send(PWD_DIALOG, Message::DialogDone),
                    Action::Complete,
                ]
            }
            Message::PromptFeedback(PromptFeedback::Failed(code)) => {
                self.prompt = None;
                vec![
                    Action::send(
                        PWD_DIALOG,
                        Message::ErrorMessage {
                            code,
                            message: "unlock failed".into(),
                        },
                    ),
                    Action::Complete,
                ]
            }
            other => {
                debug!(id = %self.base.id(), event = other.event(), "ignored");
                Vec::new()
            }
        }
    }

    fn attach_channel(&mut self, _port: &str) -> Vec<Action> {
        self.claim();
        Vec::new()
    }

    fn detach_channel(&mut self, port: &str) -> Vec<Action> {
        if port == PWD_DIALOG {
            return self.cancel();
        }
        Vec::new()
    }
}
