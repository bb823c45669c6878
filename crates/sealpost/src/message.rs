//! Message taxonomy exchanged over channels.
//!
//! Every message is a JSON object whose `event` field names the variant,
//! e.g. `{"event":"set-armored","data":"..."}`. Variants marked
//! `#[serde(skip)]` never cross the host boundary; they are posted between
//! instances inside the router.

use serde::{Deserialize, Serialize};

use sealpost_core::{ErrorCode, Key};
use sealpost_sync::SyncEventKind;
use sealpost_unlock::PromptFeedback;

use crate::error::SealpostError;

/// Summary of a key shown in the import dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySummary {
    pub fingerprint: String,
    pub key_id: String,
    pub user_ids: Vec<String>,
    pub private: bool,
    pub created: u64,
}

impl From<&Key> for KeySummary {
    fn from(key: &Key) -> Self {
        Self {
            fingerprint: key.fingerprint.to_hex(),
            key_id: key.primary_key_id().to_hex(),
            user_ids: key.user_ids.clone(),
            private: key.is_private(),
            created: key.created,
        }
    }
}

/// Data a dialog needs to render itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InitData {
    Password {
        user_id: Option<String>,
        key_id: String,
        reason: String,
        /// Whether to offer "remember password".
        cache: bool,
    },
    KeyImport {
        keys: Vec<KeySummary>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Message {
    // decrypt
    DecryptMessageInit,
    SetArmored {
        data: String,
    },
    WaitingForPassword,
    DecryptedMessage {
        message: String,
        signer: Option<String>,
        verified: bool,
    },
    ErrorMessage {
        code: ErrorCode,
        message: String,
    },

    // password dialog
    PwdDialogInit,
    SetInitData {
        data: InitData,
    },
    PwdDialogOk {
        password: String,
        #[serde(default)]
        cache: bool,
    },
    PwdDialogCancel,
    WrongPassword,
    DialogDone,

    // key import
    KeyImportDialogInit {
        armored: String,
    },
    KeyImportDialogOk,
    KeyImportDialogCancel,
    ImportDone {
        fingerprints: Vec<String>,
    },

    // key generation
    GenerateKey {
        user_ids: Vec<String>,
        password: String,
    },
    GenerateDone {
        fingerprint: String,
    },

    // sync
    SyncHandlerInit,
    SyncTrigger {
        #[serde(default)]
        force: bool,
    },
    SyncEvent {
        #[serde(rename = "type")]
        kind: SyncEventKind,
        id: String,
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
    SyncDone {
        id: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        payload: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Feedback from the unlock coordinator to a password dialog.
    #[serde(skip)]
    PromptFeedback(PromptFeedback),
}

impl Message {
    /// An `error-message` for `err`.
    pub fn error(err: &SealpostError) -> Self {
        Message::ErrorMessage {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// The `event` tag of this message.
    pub fn event(&self) -> &'static str {
        match self {
            Message::DecryptMessageInit => "decrypt-message-init",
            Message::SetArmored { .. } => "set-armored",
            Message::WaitingForPassword => "waiting-for-password",
            Message::DecryptedMessage { .. } => "decrypted-message",
            Message::ErrorMessage { .. } => "error-message",
            Message::PwdDialogInit => "pwd-dialog-init",
            Message::SetInitData { .. } => "set-init-data",
            Message::PwdDialogOk { .. } => "pwd-dialog-ok",
            Message::PwdDialogCancel => "pwd-dialog-cancel",
            Message::WrongPassword => "wrong-password",
            Message::DialogDone => "dialog-done",
            Message::KeyImportDialogInit { .. } => "key-import-dialog-init",
            Message::KeyImportDialogOk => "key-import-dialog-ok",
            Message::KeyImportDialogCancel => "key-import-dialog-cancel",
            Message::ImportDone { .. } => "import-done",
            Message::GenerateKey { .. } => "generate-key",
            Message::GenerateDone { .. } => "generate-done",
            Message::SyncHandlerInit => "sync-handler-init",
            Message::SyncTrigger { .. } => "sync-trigger",
            Message::SyncEvent { .. } => "sync-event",
            Message::SyncDone { .. } => "sync-done",
            Message::PromptFeedback(_) => "prompt-feedback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_variant_shape() {
        let value = serde_json::to_value(Message::DecryptMessageInit).unwrap();
        assert_eq!(value, json!({"event": "decrypt-message-init"}));
    }

    #[test]
    fn test_error_message_carries_code() {
        let value = serde_json::to_value(Message::ErrorMessage {
            code: ErrorCode::PwdDialogCancel,
            message: "password dialog cancelled".into(),
        })
        .unwrap();
        assert_eq!(value["event"], "error-message");
        assert_eq!(value["code"], "PWD_DIALOG_CANCEL");
    }

    #[test]
    fn test_sync_event_uses_type_field() {
        let value = serde_json::to_value(Message::SyncEvent {
            kind: SyncEventKind::Download,
            id: "abc".into(),
            version: Some("v3".into()),
            payload: None,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "sync-event", "type": "download", "id": "abc", "version": "v3"})
        );
    }

    #[test]
    fn test_parse_from_host() {
        let ok: Message =
            serde_json::from_str(r#"{"event":"pwd-dialog-ok","password":"pw"}"#).unwrap();
        assert_eq!(
            ok,
            Message::PwdDialogOk {
                password: "pw".into(),
                cache: false
            }
        );

        let done: Message =
            serde_json::from_str(r#"{"event":"sync-done","id":"1","version":"v2"}"#).unwrap();
        assert!(matches!(done, Message::SyncDone { error: None, .. }));
    }

    #[test]
    fn test_init_data_is_nested() {
        let value = serde_json::to_value(Message::SetInitData {
            data: InitData::KeyImport { keys: vec![] },
        })
        .unwrap();
        assert_eq!(value["data"]["kind"], "key-import");
    }

    #[test]
    fn test_internal_variant_does_not_serialize() {
        assert!(serde_json::to_string(&Message::PromptFeedback(PromptFeedback::Unlocked)).is_err());
    }

    #[test]
    fn test_event_matches_tag() {
        let msg = Message::SyncTrigger { force: true };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], msg.event());
    }
}
