//! The interactive prompt seam.
//!
//! A [`PromptSurface`] opens some UI that asks for a password and returns a
//! [`PromptSession`]: a stream of replies from the user and a sink for
//! feedback (wrong password, done). The coordinator reads replies until one
//! unlocks the key or the user cancels.

use async_trait::async_trait;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use sealpost_core::{ErrorCode, KeyId, KeyringId};

use crate::error::Result;

/// What the prompt should ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Primary key id of the key being unlocked.
    pub primary_key_id: KeyId,
    /// The packet that needs unlocking.
    pub key_id: KeyId,
    pub user_id: Option<String>,
    pub keyring_id: KeyringId,
    /// Free-text reason shown to the user.
    pub reason: String,
    /// Whether to offer "remember password".
    pub cache_enabled: bool,
}

/// A reply from the user.
#[derive(Clone, PartialEq, Eq)]
pub enum PromptReply {
    Password {
        password: Zeroizing<String>,
        /// Cache the password after a successful unlock.
        remember: bool,
    },
    Cancel,
}

impl PromptReply {
    pub fn password(password: impl Into<String>, remember: bool) -> Self {
        PromptReply::Password {
            password: Zeroizing::new(password.into()),
            remember,
        }
    }
}

impl std::fmt::Debug for PromptReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptReply::Password { remember, .. } => f
                .debug_struct("Password")
                .field("remember", remember)
                .finish_non_exhaustive(),
            PromptReply::Cancel => f.write_str("Cancel"),
        }
    }
}

/// Feedback sent back to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFeedback {
    /// The last password was wrong; ask again.
    WrongPassword,
    /// The key is unlocked; the surface can close.
    Unlocked,
    /// Unlocking failed for another reason; the surface can close.
    Failed(ErrorCode),
}

/// The coordinator's end of an open prompt.
#[derive(Debug)]
pub struct PromptSession {
    pub replies: mpsc::UnboundedReceiver<PromptReply>,
    pub feedback: mpsc::UnboundedSender<PromptFeedback>,
}

/// The surface's end of an open prompt.
#[derive(Debug)]
pub struct PromptHandle {
    pub replies: mpsc::UnboundedSender<PromptReply>,
    pub feedback: mpsc::UnboundedReceiver<PromptFeedback>,
}

impl PromptSession {
    /// Create a connected session / handle pair.
    pub fn pair() -> (PromptSession, PromptHandle) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        (
            PromptSession {
                replies: reply_rx,
                feedback: feedback_tx,
            },
            PromptHandle {
                replies: reply_tx,
                feedback: feedback_rx,
            },
        )
    }

    /// Send feedback. A surface that already went away is not an error.
    pub fn notify(&self, feedback: PromptFeedback) {
        let _ = self.feedback.send(feedback);
    }
}

/// Something that can ask the user for a password.
#[async_trait]
pub trait PromptSurface: Send + Sync {
    async fn open(&self, request: PromptRequest) -> Result<PromptSession>;
}
