//! Store-and-forward envelope relay
//!
//! The relay sees only sender, recipient and an opaque payload (envelope
//! JSON). Mailboxes hold deliveries until the recipient drains them, in
//! arrival order.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use crate::error::ClientError;

/// One queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Claimed sender identity
    pub sender: String,
    /// Envelope JSON
    pub payload: String,
}

/// Mailbox transport between clients.
pub trait Relay {
    /// Queue `payload` for `recipient`.
    fn deliver(&self, sender: &str, recipient: &str, payload: String) -> Result<(), ClientError>;

    /// Remove and return everything queued for `recipient`, oldest first.
    fn drain(&self, recipient: &str) -> Result<Vec<Delivery>, ClientError>;
}

/// In-process relay. Clones share mailboxes.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    mailboxes: Arc<Mutex<HashMap<String, VecDeque<Delivery>>>>,
}

impl MemoryRelay {
    /// Relay with no queued messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries waiting for `recipient`.
    pub fn pending(&self, recipient: &str) -> Result<usize, ClientError> {
        Ok(self.lock()?.get(recipient).map_or(0, VecDeque::len))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, VecDeque<Delivery>>>, ClientError> {
        self.mailboxes.lock().map_err(|_| ClientError::Relay("mailbox lock poisoned".to_string()))
    }
}

impl Relay for MemoryRelay {
    fn deliver(&self, sender: &str, recipient: &str, payload: String) -> Result<(), ClientError> {
        if recipient.is_empty() {
            return Err(ClientError::Relay("recipient must be non-empty".to_string()));
        }

        self.lock()?
            .entry(recipient.to_string())
            .or_default()
            .push_back(Delivery { sender: sender.to_string(), payload });
        tracing::debug!(sender, recipient, "queued delivery");
        Ok(())
    }

    fn drain(&self, recipient: &str) -> Result<Vec<Delivery>, ClientError> {
        Ok(self.lock()?.remove(recipient).map(Vec::from).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_in_arrival_order_and_empties_mailbox() {
        let relay = MemoryRelay::new();
        relay.deliver("alice", "bob", "1".to_string()).unwrap();
        relay.deliver("carol", "bob", "2".to_string()).unwrap();
        relay.deliver("alice", "carol", "3".to_string()).unwrap();
        assert_eq!(relay.pending("bob").unwrap(), 2);

        let drained = relay.drain("bob").unwrap();
        let payloads: Vec<_> = drained.iter().map(|d| d.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1", "2"]);
        assert_eq!(drained[1].sender, "carol");

        assert!(relay.drain("bob").unwrap().is_empty());
        assert_eq!(relay.pending("carol").unwrap(), 1);
    }

    #[test]
    fn empty_recipient_is_rejected() {
        let relay = MemoryRelay::new();
        assert!(matches!(relay.deliver("alice", "", String::new()), Err(ClientError::Relay(_))));
    }
}
