//! Sync handler controller (`syncHandler`).
//!
//! Bridges the sync engine to the page that talks to the remote store.
//! While its port is attached the instance is the target of the channel
//! transport: `sync-event`s posted to it go out on the port, `sync-done`s
//! coming back resolve the waiting transport request.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sealpost_sync::SyncOptions;

use crate::context::Context;
use crate::controller::{Action, BaseController, Controller};
use crate::controllers::SYNC_HANDLER;
use crate::message::Message;
use crate::transport::SyncReply;

pub struct SyncHandlerController {
    base: BaseController,
    context: Arc<Context>,
}

impl SyncHandlerController {
    pub fn new(base: BaseController, context: Arc<Context>) -> Self {
        Self { base, context }
    }

    fn trigger(&self, force: bool) {
        let options = if force {
            SyncOptions::forced()
        } else {
            SyncOptions::default()
        };
        // spawned: the cycle talks back through this very mailbox
        self.context
            .request_sync(self.context.config().keyring.clone(), options);
    }
}

#[async_trait]
impl Controller for SyncHandlerController {
    fn base(&self) -> &BaseController {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseController {
        &mut self.base
    }

    async fn handle_message(&mut self, port: &str, message: Message) -> Vec<Action> {
        match message {
            Message::SyncHandlerInit => {
                self.trigger(false);
                Vec::new()
            }
            Message::SyncTrigger { force } => {
                self.trigger(force);
                Vec::new()
            }
            event @ Message::SyncEvent { .. } => {
                if !self.base.has_port(SYNC_HANDLER) {
                    warn!(id = %self.base.id(), "sync event without a connected page");
                }
                vec![Action::send(SYNC_HANDLER, event)]
            }
            Message::SyncDone {
                id,
                version,
                payload,
                error,
            } => {
                let reply = SyncReply {
                    version,
                    payload,
                    error,
                };
                if !self.context.channel_transport().complete(&id, reply) {
                    debug!(request = %id, "late sync-done dropped");
                }
                Vec::new()
            }
            other => {
                debug!(id = %self.base.id(), port, event = other.event(), "ignored");
                Vec::new()
            }
        }
    }

    fn attach_channel(&mut self, port: &str) -> Vec<Action> {
        if port == SYNC_HANDLER {
            self.context.channel_transport().bind(self.base.id());
        }
        Vec::new()
    }

    fn detach_channel(&mut self, port: &str) -> Vec<Action> {
        if port == SYNC_HANDLER {
            self.context.channel_transport().unbind(self.base.id());
        }
        Vec::new()
    }
}
