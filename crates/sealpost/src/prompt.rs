//! Password prompts through the router.
//!
//! Opening a prompt creates a headless `pwdDialog` instance, parks the
//! prompt's handle where that instance can pick it up, and asks the host to
//! open the popup that will connect to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use sealpost_unlock::{PromptHandle, PromptRequest, PromptSession, PromptSurface, UnlockError};

use crate::controllers::PWD_DIALOG;
use crate::error::Result;
use crate::message::Message;
use crate::router::WeakRouter;

/// Opens host UI.
#[async_trait]
pub trait SurfaceOpener: Send + Sync {
    /// Open a popup that will connect channel `"<kind>-<id>"`.
    async fn open_popup(&self, kind: &str, id: &str) -> Result<()>;
}

/// A prompt waiting for its dialog instance to claim it.
#[derive(Debug)]
pub struct ParkedPrompt {
    pub request: PromptRequest,
    pub handle: PromptHandle,
}

/// Prompts keyed by the id of the dialog instance that will serve them.
#[derive(Debug, Default)]
pub struct PendingPrompts {
    inner: Mutex<HashMap<String, ParkedPrompt>>,
}

impl PendingPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ParkedPrompt>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn park(&self, id: impl Into<String>, prompt: ParkedPrompt) {
        self.lock().insert(id.into(), prompt);
    }

    pub fn take(&self, id: &str) -> Option<ParkedPrompt> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// [`PromptSurface`] backed by `pwdDialog` controller instances.
pub struct RouterPromptSurface {
    router: WeakRouter,
    prompts: Arc<PendingPrompts>,
    opener: Arc<dyn SurfaceOpener>,
}

impl RouterPromptSurface {
    pub fn new(
        router: WeakRouter,
        prompts: Arc<PendingPrompts>,
        opener: Arc<dyn SurfaceOpener>,
    ) -> Self {
        Self {
            router,
            prompts,
            opener,
        }
    }
}

#[async_trait]
impl PromptSurface for RouterPromptSurface {
    async fn open(&self, request: PromptRequest) -> sealpost_unlock::Result<PromptSession> {
        let router = self
            .router
            .upgrade()
            .ok_or_else(|| UnlockError::PromptUnavailable("router has shut down".into()))?;
        let id = router
            .create_headless(PWD_DIALOG)
            .map_err(|e| UnlockError::PromptUnavailable(e.to_string()))?;

        let key_id = request.key_id;
        let (session, handle) = PromptSession::pair();
        self.prompts.park(id.clone(), ParkedPrompt { request, handle });

        if let Err(e) = self.opener.open_popup(PWD_DIALOG, &id).await {
            warn!(id = %id, error = %e, "password dialog could not be opened");
            self.prompts.take(&id);
            router.post(&id, Message::PwdDialogCancel);
            return Err(UnlockError::PromptUnavailable(e.to_string()));
        }
        debug!(id = %id, key_id = %key_id, "password dialog requested");
        Ok(session)
    }
}
