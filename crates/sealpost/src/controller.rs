//! Controller trait and shared port bookkeeping.
//!
//! A controller owns the state of one instance. The router's actor hands it
//! one envelope at a time; handlers answer with [`Action`]s which the actor
//! carries out after the handler returns.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SealpostError;
use crate::message::Message;

/// Outbound half of a connected channel.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// What a handler wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send `message` on the port named `port`.
    Send { port: String, message: Message },
    /// The instance is finished and leaves the registry.
    Complete,
}

impl Action {
    pub fn send(port: impl Into<String>, message: Message) -> Self {
        Action::Send {
            port: port.into(),
            message,
        }
    }
}

/// Port bookkeeping embedded in every controller.
#[derive(Debug)]
pub struct BaseController {
    id: String,
    main_type: String,
    ports: HashMap<String, Outbox>,
}

impl BaseController {
    pub fn new(id: impl Into<String>, main_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            main_type: main_type.into(),
            ports: HashMap::new(),
        }
    }

    /// The instance id shared by all of its channels.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The type the instance was created for.
    pub fn main_type(&self) -> &str {
        &self.main_type
    }

    pub fn attach(&mut self, port: impl Into<String>, outbox: Outbox) {
        self.ports.insert(port.into(), outbox);
    }

    pub fn detach(&mut self, port: &str) -> bool {
        self.ports.remove(port).is_some()
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.ports.contains_key(port)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// A clone of the port's outbox, for sending from outside a handler.
    pub fn sender(&self, port: &str) -> Option<Outbox> {
        self.ports.get(port).cloned()
    }

    /// Deliver `message` on `port`. Returns false if the port is not open.
    pub fn send(&self, port: &str, message: Message) -> bool {
        match self.ports.get(port) {
            Some(outbox) => outbox.send(message).is_ok(),
            None => {
                debug!(id = %self.id, port, event = message.event(), "port not open, message dropped");
                false
            }
        }
    }

    /// `error-message` on the first open port of `ports`.
    pub fn error_on(&self, ports: &[&str], err: &SealpostError) -> Vec<Action> {
        ports
            .iter()
            .find(|p| self.has_port(p))
            .map(|p| vec![Action::send(*p, Message::error(err))])
            .unwrap_or_default()
    }
}

/// Behaviour of a controller instance.
#[async_trait]
pub trait Controller: Send {
    fn base(&self) -> &BaseController;

    fn base_mut(&mut self) -> &mut BaseController;

    /// Handle a message that arrived on `port`.
    async fn handle_message(&mut self, port: &str, message: Message) -> Vec<Action>;

    /// Called after a channel was attached under `port`.
    fn attach_channel(&mut self, _port: &str) -> Vec<Action> {
        Vec::new()
    }

    /// Called after the channel under `port` went away.
    fn detach_channel(&mut self, _port: &str) -> Vec<Action> {
        Vec::new()
    }
}
