//! Channel names: `"<type>-<id>"`.
//!
//! The `id` groups every channel that belongs to one controller instance and
//! the `type` selects the named port on that instance. The name is split at
//! the first hyphen, so ids may themselves contain hyphens (UUIDs).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A parsed channel name.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelName {
    kind: String,
    id: String,
}

impl ChannelName {
    /// Build a channel name from its parts.
    ///
    /// The type must be non-empty ASCII without hyphens, the id non-empty.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Result<Self, CoreError> {
        let kind = kind.into();
        let id = id.into();
        if kind.is_empty() || kind.contains('-') || !kind.is_ascii() {
            return Err(CoreError::MalformedChannel(format!("{kind}-{id}")));
        }
        if id.is_empty() || !id.is_ascii() {
            return Err(CoreError::MalformedChannel(format!("{kind}-{id}")));
        }
        Ok(Self { kind, id })
    }

    /// Parse `"<type>-<id>"`.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        let (kind, id) = name
            .split_once('-')
            .ok_or_else(|| CoreError::MalformedChannel(name.to_string()))?;
        Self::new(kind, id)
    }

    /// The channel type (port name on the owning controller).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The controller instance id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

impl fmt::Debug for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelName({self})")
    }
}

impl FromStr for ChannelName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Generate a fresh opaque instance id.
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
