//! Remote sync over a `syncHandler` channel.
//!
//! The provider page that can reach the remote store connects a
//! `syncHandler` channel. Each transport request becomes a `sync-event`
//! posted to that instance (and forwarded to the page), and resolves when the
//! page answers with a `sync-done` carrying the same id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};

use sealpost_core::new_instance_id;
use sealpost_sync::{
    DownloadReply, DownloadRequest, RemoteSyncTransport, SyncError, SyncEventKind, UploadReply,
    UploadRequest,
};

use crate::message::Message;
use crate::router::WeakRouter;

/// Body of a `sync-done`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReply {
    pub version: Option<String>,
    pub payload: Option<String>,
    pub error: Option<String>,
}

type Pending = HashMap<String, oneshot::Sender<SyncReply>>;

pub struct ChannelSyncTransport {
    router: WeakRouter,
    handler: Mutex<Option<String>>,
    pending: Mutex<Pending>,
}

/// Removes a request from the pending map however the request ends.
struct PendingGuard<'a> {
    transport: &'a ChannelSyncTransport,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.transport.pending().remove(&self.id);
    }
}

impl ChannelSyncTransport {
    pub fn new(router: WeakRouter) -> Self {
        Self {
            router,
            handler: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handler(&self) -> MutexGuard<'_, Option<String>> {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route requests to the `syncHandler` instance `id`.
    pub fn bind(&self, id: &str) {
        *self.handler() = Some(id.to_string());
        info!(id, "sync handler bound");
    }

    /// Forget instance `id` if it is the bound handler. Requests in flight
    /// fail.
    pub fn unbind(&self, id: &str) {
        let mut handler = self.handler();
        if handler.as_deref() == Some(id) {
            *handler = None;
            self.pending().clear();
            info!(id, "sync handler unbound");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.handler().is_some()
    }

    /// Number of requests waiting for a `sync-done`.
    pub fn in_flight(&self) -> usize {
        self.pending().len()
    }

    /// Resolve request `id`. Returns false for unknown (or timed out) ids.
    pub fn complete(&self, id: &str, reply: SyncReply) -> bool {
        match self.pending().remove(id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                debug!(id, "sync-done for unknown request");
                false
            }
        }
    }

    async fn request(
        &self,
        kind: SyncEventKind,
        version: Option<String>,
        payload: Option<String>,
    ) -> sealpost_sync::Result<SyncReply> {
        let handler = self
            .handler()
            .clone()
            .ok_or_else(|| SyncError::Transport("no sync handler connected".into()))?;
        let router = self
            .router
            .upgrade()
            .ok_or_else(|| SyncError::Transport("router has shut down".into()))?;

        let id = new_instance_id();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id.clone(), tx);
        let _guard = PendingGuard {
            transport: self,
            id: id.clone(),
        };

        let event = Message::SyncEvent {
            kind,
            id,
            version,
            payload,
        };
        if !router.post(&handler, event) {
            return Err(SyncError::Transport("sync handler is gone".into()));
        }
        let reply = rx
            .await
            .map_err(|_| SyncError::Transport("sync handler closed".into()))?;
        match reply.error {
            Some(error) => Err(SyncError::Transport(error)),
            None => Ok(reply),
        }
    }
}

#[async_trait]
impl RemoteSyncTransport for ChannelSyncTransport {
    async fn download(&self, request: DownloadRequest) -> sealpost_sync::Result<DownloadReply> {
        let reply = self
            .request(SyncEventKind::Download, request.version, None)
            .await?;
        Ok(DownloadReply {
            payload: reply.payload,
            version: reply.version,
        })
    }

    async fn upload(&self, request: UploadRequest) -> sealpost_sync::Result<UploadReply> {
        let reply = self
            .request(SyncEventKind::Upload, request.version, Some(request.payload))
            .await?;
        let version = reply
            .version
            .ok_or_else(|| SyncError::Transport("upload reply without version".into()))?;
        Ok(UploadReply { version })
    }
}
