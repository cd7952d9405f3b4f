//! # Messenger
//!
//! Named broadcast channels. Every instance opened on a name receives every message
//! sent on that name, its own included; each instance drops envelopes stamped with
//! its own key before they reach its callbacks, which gives "send to everyone else"
//! without a broker thread.
//!
//! Instances are opened through a `MessengerHub`, normally the one owned by the
//! `Runtime`, which workers receive at spawn time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use weft_api::{InstanceKey, Payload};

use crate::error::MessengerError;
use crate::subscription::{Listeners, Subscription};

#[derive(Clone, Debug)]
struct Envelope {
    sender: InstanceKey,
    payload: Payload,
}

struct Attachment {
    key: InstanceKey,
    inbox: flume::Sender<Envelope>,
}

/// Registry of named channels and the instances attached to them.
#[derive(Default)]
pub struct MessengerHub {
    channels: Mutex<HashMap<String, Vec<Attachment>>>,
}

impl fmt::Debug for MessengerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerHub")
            .field("channels", &self.names())
            .finish()
    }
}

impl MessengerHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a new instance on `name`, creating the channel if needed.
    pub fn open(self: &Arc<Self>, name: &str) -> Messenger {
        Messenger::open(Arc::clone(self), name)
    }

    /// Names with at least one attached instance.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of instances attached to `name`.
    pub fn attached(&self, name: &str) -> usize {
        self.lock().get(name).map(Vec::len).unwrap_or(0)
    }

    fn attach(&self, name: &str, key: InstanceKey, inbox: flume::Sender<Envelope>) {
        self.lock()
            .entry(name.to_string())
            .or_default()
            .push(Attachment { key, inbox });
    }

    fn detach(&self, name: &str, key: InstanceKey) {
        let mut channels = self.lock();
        if let Some(attachments) = channels.get_mut(name) {
            attachments.retain(|a| a.key != key);
            if attachments.is_empty() {
                channels.remove(name);
            }
        }
    }

    fn broadcast(&self, name: &str, envelope: Envelope) -> usize {
        let mut channels = self.lock();
        let Some(attachments) = channels.get_mut(name) else {
            return 0;
        };
        attachments.retain(|a| a.inbox.send(envelope.clone()).is_ok());
        attachments.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Attachment>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One instance attached to a named channel.
pub struct Messenger {
    name: String,
    key: InstanceKey,
    hub: Arc<MessengerHub>,
    listeners: Listeners<Payload>,
    closed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Messenger {
    fn open(hub: Arc<MessengerHub>, name: &str) -> Self {
        let key = InstanceKey::new();
        let listeners = Listeners::new();
        let (inbox, receiver) = flume::unbounded::<Envelope>();
        hub.attach(name, key, inbox);

        let pump_listeners = listeners.clone();
        let dispatcher = crate::logging::current_subscriber();
        // Callbacks of a worker's messenger run on behalf of that worker.
        let owner = crate::host::current_worker();
        let pump = std::thread::Builder::new()
            .name(format!("weft-messenger-{name}"))
            .spawn(move || {
                let _dispatch = tracing::dispatcher::set_default(&dispatcher);
                crate::host::mark_worker(owner);
                // Ends once the hub drops our inbox sender.
                for envelope in receiver.iter() {
                    if envelope.sender == key {
                        continue;
                    }
                    pump_listeners.emit(&envelope.payload);
                }
            });

        let pump = match pump {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(messenger = name, error = %err, "failed to start messenger delivery thread");
                None
            }
        };

        tracing::debug!(messenger = name, key = %key, "messenger opened");
        Self {
            name: name.to_string(),
            key,
            hub,
            listeners,
            closed: AtomicBool::new(false),
            pump: Mutex::new(pump),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> InstanceKey {
        self.key
    }

    pub fn hub(&self) -> &Arc<MessengerHub> {
        &self.hub
    }

    /// Broadcast `payload` to every other instance on this name.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), MessengerError> {
        if self.is_closed() {
            return Err(MessengerError::Closed(self.name.clone()));
        }
        let delivered = self.hub.broadcast(
            &self.name,
            Envelope {
                sender: self.key,
                payload: payload.into(),
            },
        );
        tracing::trace!(messenger = %self.name, delivered, "messenger broadcast");
        Ok(())
    }

    /// Register a callback for messages sent by other instances.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Detach this instance. Other instances on the same name are unaffected.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.hub.detach(&self.name, self.key);
        self.listeners.clear();

        let pump = self
            .pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = pump {
            // A callback closing its own messenger runs on the pump thread.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!(messenger = %self.name, key = %self.key, "messenger closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.close();
    }
}
