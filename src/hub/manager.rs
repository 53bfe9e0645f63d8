//! Subscription hub: listener sets and broadcast delivery.

use crate::pages::Page;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{DropReason, PushMessage, SubscriberConfig, SubscriberHandle, SubscriberId};

/// Internal subscriber state.
struct Subscriber {
    sender: Sender<PushMessage>,
    /// Whether backlog replay is complete; broadcasts skip subscribers
    /// still catching up.
    caught_up: bool,
}

impl Subscriber {
    /// Try to send. On failure, reports why the subscriber must go.
    fn try_send(&self, message: PushMessage) -> Result<(), DropReason> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(DropReason::Disconnected),
        }
    }
}

/// Holds the live listener set per agency and broadcasts published pages.
pub struct SubscriptionHub {
    listeners: RwLock<HashMap<String, HashMap<SubscriberId, Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber under an agency's listener set.
    ///
    /// The subscriber starts not caught up and receives no broadcasts
    /// until [`mark_caught_up`](Self::mark_caught_up); replayed backlog is
    /// delivered through the same channel via [`send_to`](Self::send_to).
    pub fn subscribe(&self, agency: &str, config: SubscriberConfig) -> SubscriberHandle {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.listeners
            .write()
            .entry(agency.to_string())
            .or_default()
            .insert(
                id,
                Subscriber {
                    sender,
                    caught_up: false,
                },
            );

        SubscriberHandle {
            id,
            agency: agency.to_string(),
            receiver,
        }
    }

    /// Remove a subscriber; idempotent.
    pub fn unsubscribe(&self, agency: &str, id: SubscriberId) {
        let mut listeners = self.listeners.write();
        if let Some(set) = listeners.get_mut(agency) {
            if let Some(subscriber) = set.remove(&id) {
                let _ = subscriber.try_send(PushMessage::Dropped {
                    reason: DropReason::Unsubscribed,
                });
            }
        }
    }

    /// Flip a subscriber to live delivery. Returns `false` if it is gone.
    pub fn mark_caught_up(&self, agency: &str, id: SubscriberId) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.get_mut(agency).and_then(|set| set.get_mut(&id)) {
            Some(subscriber) => {
                subscriber.caught_up = true;
                true
            }
            None => false,
        }
    }

    /// Deliver one message directly to a subscriber (backlog replay).
    /// Returns `false` and removes the subscriber if delivery failed.
    pub fn send_to(&self, agency: &str, id: SubscriberId, message: PushMessage) -> bool {
        let failed = {
            let listeners = self.listeners.read();
            match listeners.get(agency).and_then(|set| set.get(&id)) {
                Some(subscriber) => subscriber.try_send(message).err(),
                None => return false,
            }
        };

        match failed {
            None => true,
            Some(reason) => {
                self.remove(agency, &[(id, reason)]);
                false
            }
        }
    }

    /// Deliver a page to every caught-up subscriber of an agency.
    ///
    /// One failed subscriber is removed without affecting the others.
    pub fn notify(&self, agency: &str, page: &Page) {
        let message = Self::page_message(page);

        let mut failed = Vec::new();
        {
            let listeners = self.listeners.read();
            let Some(set) = listeners.get(agency) else {
                return;
            };
            for (id, subscriber) in set.iter() {
                if !subscriber.caught_up {
                    continue;
                }
                if let Err(reason) = subscriber.try_send(message.clone()) {
                    failed.push((*id, reason));
                }
            }
        }
        self.remove(agency, &failed);
    }

    /// Send a keep-alive frame to every open subscriber across all
    /// agencies. Returns how many frames were delivered.
    pub fn heartbeat(&self) -> usize {
        let mut sent = 0;
        let mut failed: Vec<(String, SubscriberId, DropReason)> = Vec::new();
        {
            let listeners = self.listeners.read();
            for (agency, set) in listeners.iter() {
                for (id, subscriber) in set.iter() {
                    match subscriber.try_send(PushMessage::KeepAlive) {
                        Ok(()) => sent += 1,
                        Err(reason) => failed.push((agency.clone(), *id, reason)),
                    }
                }
            }
        }
        for (agency, id, reason) in failed {
            self.remove(&agency, &[(id, reason)]);
        }
        sent
    }

    pub fn subscriber_count(&self, agency: &str) -> usize {
        self.listeners.read().get(agency).map_or(0, HashMap::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.listeners.read().values().map(HashMap::len).sum()
    }

    /// Remove failed subscribers, notifying them best-effort.
    fn remove(&self, agency: &str, failed: &[(SubscriberId, DropReason)]) {
        if failed.is_empty() {
            return;
        }
        let mut listeners = self.listeners.write();
        if let Some(set) = listeners.get_mut(agency) {
            for (id, reason) in failed {
                if let Some(subscriber) = set.remove(id) {
                    debug!(agency, ?id, ?reason, "removing push subscriber");
                    let _ = subscriber.try_send(PushMessage::Dropped {
                        reason: reason.clone(),
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    /// The frame a page is delivered as, navigation stripped.
    pub fn page_message(page: &Page) -> PushMessage {
        PushMessage::Page {
            id: page.timestamp,
            body: page.body.clone(),
        }
    }
}
