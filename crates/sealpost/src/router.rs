//! Actor router and controller registry.
//!
//! Channels are named `"<type>-<id>"`. All channels sharing an `id` belong to
//! one controller instance; the `type` is the port they are attached under.
//! Each instance runs as a task that drains a mailbox, so its handlers run
//! one at a time in arrival order while different instances interleave.
//!
//! ```text
//! host ── connect("dFrame-42") ──> registry ── Attach ──> [actor 42] ─┐
//! host ── dispatch("dFrame-42") ─> registry ── Message ─> [actor 42]  │
//! host <──────────────────────── outbox <──── Action::Send ───────────┘
//! ```

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sealpost_core::{new_instance_id, ChannelName};

use crate::controller::{Action, BaseController, Controller, Outbox};
use crate::error::RouterError;
use crate::message::Message;

/// Builds the controller of a new instance.
pub type Factory = Arc<dyn Fn(BaseController) -> Box<dyn Controller> + Send + Sync>;

enum Envelope {
    Attach { port: String, outbox: Outbox },
    Detach { port: String },
    Message { port: String, message: Message },
}

struct Instance {
    serial: u64,
    main_type: String,
    mailbox: mpsc::UnboundedSender<Envelope>,
    channels: HashSet<String>,
    /// Created without a channel; lives until it completes.
    headless: bool,
}

#[derive(Default)]
struct Registry {
    instances: HashMap<String, Instance>,
    next_serial: u64,
}

#[derive(Default)]
struct RouterInner {
    factories: RwLock<HashMap<String, Factory>>,
    /// Secondary type -> primary type.
    secondaries: RwLock<HashMap<String, String>>,
    registry: Mutex<Registry>,
}

/// Routes channels and messages to controller instances.
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<RouterInner>,
}

/// Non-owning router handle for collaborators the router itself owns.
#[derive(Clone, Default)]
pub struct WeakRouter {
    inner: Weak<RouterInner>,
}

impl WeakRouter {
    pub fn upgrade(&self) -> Option<Router> {
        self.inner.upgrade().map(|inner| Router { inner })
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register the factory for a primary type.
    pub fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(BaseController) -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.inner
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.into(), Arc::new(factory));
    }

    /// Register `kind` as a secondary of `primary`: it can only attach to an
    /// instance that already exists.
    pub fn register_secondary(&self, kind: impl Into<String>, primary: impl Into<String>) {
        self.inner
            .secondaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.into(), primary.into());
    }

    fn primary_of(&self, kind: &str) -> Option<String> {
        self.inner
            .secondaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn factory(&self, kind: &str) -> Result<Factory, RouterError> {
        self.inner
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
            .ok_or_else(|| RouterError::UnknownType(kind.to_string()))
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach the channel `name`, creating its instance if needed. Outbound
    /// messages for the channel go to `outbox`.
    ///
    /// On error `outbox` is dropped, which closes the channel.
    pub fn connect(&self, name: &str, outbox: Outbox) -> Result<(), RouterError> {
        let name = ChannelName::parse(name)?;
        let (kind, id) = (name.kind(), name.id());

        let mut registry = self.registry();
        if let Some(instance) = registry.instances.get_mut(id) {
            instance.channels.insert(kind.to_string());
            let _ = instance.mailbox.send(Envelope::Attach {
                port: kind.to_string(),
                outbox,
            });
            debug!(channel = %name, "channel attached");
            return Ok(());
        }

        if let Some(primary) = self.primary_of(kind) {
            warn!(channel = %name, primary = %primary, "secondary channel without primary rejected");
            return Err(RouterError::MissingPrimary {
                channel: name.to_string(),
                primary,
            });
        }

        let factory = self.factory(kind)?;
        let instance = self.spawn(&mut registry, id, kind, &factory, false);
        instance.channels.insert(kind.to_string());
        let _ = instance.mailbox.send(Envelope::Attach {
            port: kind.to_string(),
            outbox,
        });
        info!(channel = %name, "controller instance created");
        Ok(())
    }

    /// Detach the channel `name`. The instance goes away with its last
    /// channel unless it is headless.
    pub fn disconnect(&self, name: &str) -> Result<(), RouterError> {
        let name = ChannelName::parse(name)?;
        let (kind, id) = (name.kind(), name.id());

        let mut registry = self.registry();
        let Some(instance) = registry.instances.get_mut(id) else {
            debug!(channel = %name, "disconnect for unknown instance");
            return Ok(());
        };
        instance.channels.remove(kind);
        let _ = instance.mailbox.send(Envelope::Detach {
            port: kind.to_string(),
        });
        if instance.channels.is_empty() && !instance.headless {
            registry.instances.remove(id);
            info!(channel = %name, "controller instance removed");
        } else {
            debug!(channel = %name, "channel detached");
        }
        Ok(())
    }

    /// Deliver a message that arrived on channel `sender`. Returns false if
    /// the instance does not exist and the message was dropped.
    pub fn dispatch(&self, sender: &str, message: Message) -> Result<bool, RouterError> {
        let name = ChannelName::parse(sender)?;
        let registry = self.registry();
        match registry.instances.get(name.id()) {
            Some(instance) => Ok(instance
                .mailbox
                .send(Envelope::Message {
                    port: name.kind().to_string(),
                    message,
                })
                .is_ok()),
            None => {
                warn!(channel = %name, event = message.event(), "message for unknown instance dropped");
                Ok(false)
            }
        }
    }

    /// Deliver an internal message to instance `id` on its main port.
    pub fn post(&self, id: &str, message: Message) -> bool {
        let registry = self.registry();
        match registry.instances.get(id) {
            Some(instance) => instance
                .mailbox
                .send(Envelope::Message {
                    port: instance.main_type.clone(),
                    message,
                })
                .is_ok(),
            None => {
                debug!(id, event = message.event(), "post to unknown instance dropped");
                false
            }
        }
    }

    /// Create an instance of `kind` with no channel attached. It stays
    /// registered until its controller completes.
    pub fn create_headless(&self, kind: &str) -> Result<String, RouterError> {
        let factory = self.factory(kind)?;
        let id = new_instance_id();
        let mut registry = self.registry();
        self.spawn(&mut registry, &id, kind, &factory, true);
        info!(kind, id = %id, "headless controller instance created");
        Ok(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry().instances.contains_key(id)
    }

    pub fn instance_count(&self) -> usize {
        self.registry().instances.len()
    }

    /// Types currently attached to instance `id`.
    pub fn channels(&self, id: &str) -> Vec<String> {
        let mut channels: Vec<String> = self
            .registry()
            .instances
            .get(id)
            .map(|i| i.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    // Factories run under the registry lock and must not call back into the
    // router.
    fn spawn<'r>(
        &self,
        registry: &'r mut Registry,
        id: &str,
        kind: &str,
        factory: &Factory,
        headless: bool,
    ) -> &'r mut Instance {
        let controller = factory(BaseController::new(id, kind));
        let (tx, rx) = mpsc::unbounded_channel();
        registry.next_serial += 1;
        let serial = registry.next_serial;
        tokio::spawn(run_actor(controller, rx, self.downgrade(), serial));
        let instance = Instance {
            serial,
            main_type: kind.to_string(),
            mailbox: tx,
            channels: HashSet::new(),
            headless,
        };
        match registry.instances.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(instance);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(instance),
        }
    }

    fn retire(&self, id: &str, serial: u64) {
        let mut registry = self.registry();
        if registry.instances.get(id).is_some_and(|i| i.serial == serial) {
            registry.instances.remove(id);
            info!(id, "controller instance completed");
        }
    }
}

async fn run_actor(
    mut controller: Box<dyn Controller>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
    router: WeakRouter,
    serial: u64,
) {
    let id = controller.base().id().to_string();
    while let Some(envelope) = mailbox.recv().await {
        let actions = match envelope {
            Envelope::Attach { port, outbox } => {
                controller.base_mut().attach(port.clone(), outbox);
                controller.attach_channel(&port)
            }
            Envelope::Detach { port } => {
                controller.base_mut().detach(&port);
                controller.detach_channel(&port)
            }
            Envelope::Message { port, message } => {
                debug!(id = %id, port = %port, event = message.event(), "message");
                controller.handle_message(&port, message).await
            }
        };

        let mut complete = false;
        for action in actions {
            match action {
                Action::Send { port, message } => {
                    controller.base().send(&port, message);
                }
                Action::Complete => complete = true,
            }
        }
        if complete {
            if let Some(router) = router.upgrade() {
                router.retire(&id, serial);
            }
            break;
        }
    }
    debug!(id = %id, "controller actor stopped");
}
