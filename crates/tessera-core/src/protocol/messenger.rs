//! Messenger: identity, certificate table and per-peer sessions
//!
//! Routes send and receive calls through the [`RatchetSession`] for the
//! named peer. Every mutating call is transactional: work happens on a copy
//! of the session, which replaces the stored one only on success.
//!
//! # Self-healing
//!
//! When a message from a peer with an existing session fails AEAD
//! verification, the session is discarded and the message is retried once
//! as first contact. The discard is permanent even if the retry fails.
//! Replays, malformed headers and passed counters never trigger it.
//!
//! # Concurrency
//!
//! Messages to or from one peer must be processed one at a time in arrival
//! order; `&mut self` enforces this within a process.

use std::collections::HashMap;

use tessera_crypto::{AuthorityKey, KeyPair, PublicKey, Signature};

use super::{
    certificate::{Certificate, Identity, TrustPolicy},
    error::MessengerError,
    header::Envelope,
    session::{RatchetSession, SessionState},
    snapshot::MessengerSnapshot,
};
use crate::env::Environment;

/// Messenger configuration.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Authority whose signatures vouch for certificates
    pub authority_key: AuthorityKey,
    /// Escrow public key every message key is sealed to
    pub escrow_public_key: PublicKey,
    /// Handling of unsigned certificates
    pub trust_policy: TrustPolicy,
    /// Retry once as first contact after an AEAD failure
    pub self_heal: bool,
}

impl MessengerConfig {
    /// Config with trust-on-first-use and self-healing enabled.
    pub fn new(authority_key: AuthorityKey, escrow_public_key: PublicKey) -> Self {
        Self {
            authority_key,
            escrow_public_key,
            trust_policy: TrustPolicy::default(),
            self_heal: true,
        }
    }
}

/// End-to-end messenger for one local identity.
///
/// # Invariants
///
/// - At most one session per peer identity
/// - A session for a peer never outlives a change of that peer's key
/// - Sessions are keyed to the current local identity
///
/// Cloning copies every session, so a clone taken before a call is a
/// rollback point for it.
#[derive(Clone)]
pub struct Messenger<E: Environment> {
    env: E,
    config: MessengerConfig,
    identity: Option<Identity>,
    certificates: HashMap<String, Certificate>,
    sessions: HashMap<String, RatchetSession>,
}

impl<E: Environment> Messenger<E> {
    /// Create a messenger with no identity yet.
    pub fn new(env: E, config: MessengerConfig) -> Self {
        Self {
            env,
            config,
            identity: None,
            certificates: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Create the local identity with a fresh static key pair.
    ///
    /// Replacing an existing identity drops every session, since they were
    /// bound to the old static key.
    pub fn generate_certificate(&mut self, identity: &str) -> Result<Certificate, MessengerError> {
        if identity.is_empty() {
            return Err(MessengerError::invalid("identity must be non-empty"));
        }

        let key_pair = KeyPair::from_secret_bytes(self.env.random_array());
        let identity = Identity { name: identity.to_string(), key_pair };
        let certificate = identity.certificate();

        if self.identity.is_some() && !self.sessions.is_empty() {
            tracing::info!(sessions = self.sessions.len(), "identity replaced, dropping sessions");
            self.sessions.clear();
        }

        tracing::info!(
            identity = %certificate.identity,
            key = %certificate.static_public_key.fingerprint(),
            "generated certificate"
        );

        self.identity = Some(identity);
        Ok(certificate)
    }

    /// Store a peer certificate.
    ///
    /// A signature is verified against the authority key. Without one, the
    /// certificate is accepted only under [`TrustPolicy::TrustOnFirstUse`].
    /// A certificate whose key differs from the stored one for the same
    /// identity drops that peer's session.
    ///
    /// # Errors
    ///
    /// - `Certificate`: bad signature, or missing signature under
    ///   [`TrustPolicy::RequireSignature`]
    /// - `InvalidInput`: empty identity
    pub fn receive_certificate(
        &mut self,
        certificate: Certificate,
        signature: Option<&Signature>,
    ) -> Result<(), MessengerError> {
        if certificate.identity.is_empty() {
            return Err(MessengerError::invalid("certificate identity must be non-empty"));
        }

        match (signature, self.config.trust_policy) {
            (Some(signature), _) => {
                certificate.verify(&self.config.authority_key, signature)?;
            },
            (None, TrustPolicy::RequireSignature) => {
                return Err(MessengerError::Certificate {
                    reason: format!("certificate for '{}' is unsigned", certificate.identity),
                });
            },
            (None, TrustPolicy::TrustOnFirstUse) => {
                tracing::warn!(
                    identity = %certificate.identity,
                    key = %certificate.static_public_key.fingerprint(),
                    "accepting unsigned certificate on first use"
                );
            },
        }

        if let Some(previous) = self.certificates.get(&certificate.identity) {
            if previous.static_public_key != certificate.static_public_key {
                let dropped = self.sessions.remove(&certificate.identity).is_some();
                tracing::info!(
                    identity = %certificate.identity,
                    old_key = %previous.static_public_key.fingerprint(),
                    new_key = %certificate.static_public_key.fingerprint(),
                    dropped_session = dropped,
                    "peer key rotated"
                );
            }
        } else {
            tracing::info!(identity = %certificate.identity, "accepted certificate");
        }

        self.certificates.insert(certificate.identity.clone(), certificate);
        Ok(())
    }

    /// Encrypt `plaintext` for `peer`.
    ///
    /// # Errors
    ///
    /// - `Session`: no local identity yet
    /// - `Certificate`: peer certificate unknown
    pub fn send_message(&mut self, peer: &str, plaintext: &str) -> Result<Envelope, MessengerError> {
        self.require_identity()?;
        let peer_static = self.peer_key(peer)?;

        let mut session = match self.sessions.get(peer) {
            Some(session) => session.clone(),
            None => {
                tracing::info!(peer, "starting session as initiator");
                RatchetSession::initiate(&self.env, &peer_static)?
            },
        };

        let envelope = session.encrypt(
            &self.env,
            &peer_static,
            &self.config.escrow_public_key,
            plaintext.as_bytes(),
        )?;

        self.sessions.insert(peer.to_string(), session);
        Ok(envelope)
    }

    /// Decrypt a message from `peer`.
    ///
    /// # Errors
    ///
    /// - `Session`: no local identity, passed counter, or skip limit
    /// - `Certificate`: sender certificate unknown
    /// - `Replay`: message already decrypted
    /// - `Decryption`: AEAD failure, after the self-heal retry if enabled
    /// - `InvalidInput`: structurally malformed header
    pub fn receive_message(
        &mut self,
        peer: &str,
        envelope: &Envelope,
    ) -> Result<String, MessengerError> {
        envelope.header.check_structure()?;
        let own_static = self.require_identity()?.key_pair.clone();
        let peer_static = self.peer_key(peer)?;
        let sender_ratchet_key = envelope.header.sender_ephemeral_public_key;

        let existing = self.sessions.get(peer).cloned();
        let had_session = existing.is_some();
        let mut session = match existing {
            Some(session) => session,
            None => {
                tracing::info!(peer, "starting session as responder");
                RatchetSession::accept(&own_static, &sender_ratchet_key)?
            },
        };

        let plaintext = match session.decrypt(&self.env, &own_static, &peer_static, envelope) {
            Ok(plaintext) => plaintext,
            Err(err) if err.is_desync() && had_session && self.config.self_heal => {
                tracing::warn!(peer, error = %err, "discarding session and retrying as first contact");
                self.sessions.remove(peer);

                session = RatchetSession::accept(&own_static, &sender_ratchet_key)?;
                session.decrypt(&self.env, &own_static, &peer_static, envelope)?
            },
            Err(err) => return Err(err),
        };

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| MessengerError::invalid("plaintext is not valid UTF-8"))?;

        self.sessions.insert(peer.to_string(), session);
        Ok(plaintext)
    }

    /// Serialize the full messenger state.
    ///
    /// The output contains secret keys. Persist it only through an encrypted
    /// store.
    pub fn export_state(&self) -> Result<String, MessengerError> {
        MessengerSnapshot::capture(self.identity.as_ref(), &self.certificates, &self.sessions)
            .to_json()
    }

    /// Rebuild a messenger from [`export_state`](Self::export_state) output.
    pub fn import_state(env: E, config: MessengerConfig, state: &str) -> Result<Self, MessengerError> {
        let restored = MessengerSnapshot::from_json(state)?.restore()?;

        tracing::debug!(
            certificates = restored.certificates.len(),
            sessions = restored.sessions.len(),
            "imported messenger state"
        );

        Ok(Self {
            env,
            config,
            identity: restored.identity,
            certificates: restored.certificates,
            sessions: restored.sessions,
        })
    }

    /// Local identity, if generated.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Stored certificate for `peer`.
    pub fn certificate(&self, peer: &str) -> Option<&Certificate> {
        self.certificates.get(peer)
    }

    /// Identities with a stored certificate, sorted.
    pub fn known_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.certificates.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Session state with `peer`.
    pub fn session_state(&self, peer: &str) -> SessionState {
        self.sessions.get(peer).map_or(SessionState::Uninitialized, RatchetSession::state)
    }

    /// Cached out-of-order keys for `peer`.
    pub fn skipped_key_count(&self, peer: &str) -> usize {
        self.sessions.get(peer).map_or(0, RatchetSession::skipped_key_count)
    }

    /// Active configuration.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    fn require_identity(&self) -> Result<&Identity, MessengerError> {
        self.identity
            .as_ref()
            .ok_or_else(|| MessengerError::session("no local identity; generate a certificate first"))
    }

    fn peer_key(&self, peer: &str) -> Result<PublicKey, MessengerError> {
        self.certificates.get(peer).map(|cert| cert.static_public_key).ok_or_else(|| {
            MessengerError::Certificate { reason: format!("no certificate for '{peer}'") }
        })
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self, peer: &str) -> Option<&mut RatchetSession> {
        self.sessions.get_mut(peer)
    }
}

impl<E: Environment> std::fmt::Debug for Messenger<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("identity", &self.identity)
            .field("certificates", &self.certificates.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
