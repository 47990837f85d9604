//! Restartable messenger snapshot
//!
//! Captures the local identity, the certificate table and every session
//! (chains, ratchet keys, counters, skipped keys, seen ids) as one JSON
//! document. The document holds secret key material and must only be
//! persisted through an encrypted store.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tessera_crypto::{ChainRatchet, KeyPair, MessageKey, PublicKey, encoding::base64_bytes};

use super::{
    certificate::{Certificate, Identity},
    error::MessengerError,
    header::MessageId,
    session::{RatchetSession, ReceiveChain, SendChain},
};

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessengerSnapshot {
    version: u32,
    identity: Option<IdentitySnapshot>,
    certificates: BTreeMap<String, Certificate>,
    sessions: BTreeMap<String, SessionSnapshot>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentitySnapshot {
    name: String,
    #[serde(with = "base64_bytes")]
    static_secret: [u8; 32],
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSnapshot {
    #[serde(with = "base64_bytes")]
    root_key: [u8; 32],
    send: Option<SendSnapshot>,
    receive: Option<ReceiveSnapshot>,
    prev_send_counter: u32,
    skipped_keys: Vec<SkippedKeySnapshot>,
    seen: Vec<MessageId>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendSnapshot {
    #[serde(with = "base64_bytes")]
    ratchet_secret: [u8; 32],
    #[serde(with = "base64_bytes")]
    chain_key: [u8; 32],
    counter: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveSnapshot {
    ratchet_public_key: PublicKey,
    #[serde(with = "base64_bytes")]
    chain_key: [u8; 32],
    counter: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkippedKeySnapshot {
    ratchet_key: PublicKey,
    message_number: u32,
    #[serde(with = "base64_bytes")]
    key: [u8; 32],
}

/// Restored messenger parts.
pub(crate) struct RestoredState {
    pub(crate) identity: Option<Identity>,
    pub(crate) certificates: HashMap<String, Certificate>,
    pub(crate) sessions: HashMap<String, RatchetSession>,
}

impl MessengerSnapshot {
    pub(crate) fn capture(
        identity: Option<&Identity>,
        certificates: &HashMap<String, Certificate>,
        sessions: &HashMap<String, RatchetSession>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            identity: identity.map(|identity| IdentitySnapshot {
                name: identity.name.clone(),
                static_secret: identity.key_pair.secret_bytes(),
            }),
            certificates: certificates
                .iter()
                .map(|(name, cert)| (name.clone(), cert.clone()))
                .collect(),
            sessions: sessions
                .iter()
                .map(|(name, session)| (name.clone(), SessionSnapshot::from(session)))
                .collect(),
        }
    }

    pub(crate) fn to_json(&self) -> Result<String, MessengerError> {
        serde_json::to_string(self)
            .map_err(|e| MessengerError::invalid(format!("failed to encode snapshot: {e}")))
    }

    pub(crate) fn from_json(text: &str) -> Result<Self, MessengerError> {
        serde_json::from_str(text)
            .map_err(|e| MessengerError::invalid(format!("malformed snapshot: {e}")))
    }

    pub(crate) fn restore(self) -> Result<RestoredState, MessengerError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(MessengerError::invalid(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }

        for (name, cert) in &self.certificates {
            if *name != cert.identity {
                return Err(MessengerError::invalid(format!(
                    "certificate stored under '{name}' is issued to '{}'",
                    cert.identity
                )));
            }
        }

        let identity = self.identity.map(|identity| Identity {
            name: identity.name,
            key_pair: KeyPair::from_secret_bytes(identity.static_secret),
        });

        let sessions = self
            .sessions
            .into_iter()
            .map(|(name, session)| (name, RatchetSession::from(session)))
            .collect();

        Ok(RestoredState { identity, certificates: self.certificates.into_iter().collect(), sessions })
    }
}

impl From<&RatchetSession> for SessionSnapshot {
    fn from(session: &RatchetSession) -> Self {
        let mut skipped_keys: Vec<SkippedKeySnapshot> = session
            .skipped
            .iter()
            .map(|(id, key)| SkippedKeySnapshot {
                ratchet_key: id.ratchet_key,
                message_number: id.message_number,
                key: *key.key(),
            })
            .collect();
        skipped_keys.sort_by_key(|entry| (entry.ratchet_key, entry.message_number));

        let mut seen: Vec<MessageId> = session.seen.iter().copied().collect();
        seen.sort();

        Self {
            root_key: session.root_key,
            send: session.send.as_ref().map(|send| SendSnapshot {
                ratchet_secret: send.ratchet_key.secret_bytes(),
                chain_key: *send.chain.chain_key(),
                counter: send.chain.counter(),
            }),
            receive: session.receive.as_ref().map(|receive| ReceiveSnapshot {
                ratchet_public_key: receive.ratchet_key,
                chain_key: *receive.chain.chain_key(),
                counter: receive.chain.counter(),
            }),
            prev_send_counter: session.prev_send_counter,
            skipped_keys,
            seen,
        }
    }
}

impl From<SessionSnapshot> for RatchetSession {
    fn from(snapshot: SessionSnapshot) -> Self {
        let skipped = snapshot
            .skipped_keys
            .into_iter()
            .map(|entry| {
                let id =
                    MessageId { ratchet_key: entry.ratchet_key, message_number: entry.message_number };
                (id, MessageKey::from_parts(entry.key, entry.message_number))
            })
            .collect();

        Self {
            root_key: snapshot.root_key,
            send: snapshot.send.map(|send| SendChain {
                ratchet_key: KeyPair::from_secret_bytes(send.ratchet_secret),
                chain: ChainRatchet::from_parts(send.chain_key, send.counter),
            }),
            receive: snapshot.receive.map(|receive| ReceiveChain {
                ratchet_key: receive.ratchet_public_key,
                chain: ChainRatchet::from_parts(receive.chain_key, receive.counter),
            }),
            prev_send_counter: snapshot.prev_send_counter,
            skipped,
            seen: snapshot.seen.into_iter().collect::<HashSet<_>>(),
        }
    }
}
