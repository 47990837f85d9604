//! Certificate directory and backup locker
//!
//! The directory maps identities to published certificates and keeps one
//! encrypted vault backup per user. It is untrusted: certificates it
//! returns are checked by the messenger's trust policy, and backups are
//! only usable with the owner's password.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use tessera_core::Certificate;
use tessera_crypto::{AuthoritySigner, Signature};

use crate::{error::ClientError, store::StoredBlob};

/// Directory entry for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCertificate {
    /// Certificate as published
    pub certificate: Certificate,
    /// Authority signature over the certificate, if the directory signs
    pub signature: Option<Signature>,
    /// Human-readable name chosen by the owner
    pub display_name: Option<String>,
}

/// Certificate lookup and backup storage.
pub trait Directory {
    /// Publish or replace the certificate for `certificate.identity`.
    fn publish(
        &self,
        certificate: &Certificate,
        display_name: Option<&str>,
    ) -> Result<(), ClientError>;

    /// Entry for `identity`, if published.
    fn fetch(&self, identity: &str) -> Result<Option<PublishedCertificate>, ClientError>;

    /// Every published entry, sorted by identity.
    fn list(&self) -> Result<Vec<PublishedCertificate>, ClientError>;

    /// Replace the backup pair for `user`.
    fn store_backup(&self, user: &str, backup: &StoredBlob) -> Result<(), ClientError>;

    /// Backup pair for `user`, if any.
    fn fetch_backup(&self, user: &str) -> Result<Option<StoredBlob>, ClientError>;
}

#[derive(Default)]
struct DirectoryState {
    entries: BTreeMap<String, PublishedCertificate>,
    backups: BTreeMap<String, StoredBlob>,
}

/// In-process directory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
    signer: Option<Arc<AuthoritySigner>>,
}

impl MemoryDirectory {
    /// Directory that publishes certificates unsigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that signs every published certificate.
    pub fn with_authority(signer: AuthoritySigner) -> Self {
        Self { state: Arc::default(), signer: Some(Arc::new(signer)) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DirectoryState>, ClientError> {
        self.state.lock().map_err(|_| ClientError::Directory("state lock poisoned".to_string()))
    }
}

impl Directory for MemoryDirectory {
    fn publish(
        &self,
        certificate: &Certificate,
        display_name: Option<&str>,
    ) -> Result<(), ClientError> {
        if certificate.identity.is_empty() {
            return Err(ClientError::InvalidInput("certificate identity must be non-empty".into()));
        }

        let signature = match &self.signer {
            Some(signer) => Some(signer.sign(&certificate.signed_bytes()?)),
            None => None,
        };

        let entry = PublishedCertificate {
            certificate: certificate.clone(),
            signature,
            display_name: display_name.map(str::to_string),
        };

        tracing::debug!(
            identity = %certificate.identity,
            signed = entry.signature.is_some(),
            "certificate published"
        );
        self.lock()?.entries.insert(certificate.identity.clone(), entry);
        Ok(())
    }

    fn fetch(&self, identity: &str) -> Result<Option<PublishedCertificate>, ClientError> {
        Ok(self.lock()?.entries.get(identity).cloned())
    }

    fn list(&self) -> Result<Vec<PublishedCertificate>, ClientError> {
        Ok(self.lock()?.entries.values().cloned().collect())
    }

    fn store_backup(&self, user: &str, backup: &StoredBlob) -> Result<(), ClientError> {
        self.lock()?.backups.insert(user.to_string(), backup.clone());
        Ok(())
    }

    fn fetch_backup(&self, user: &str) -> Result<Option<StoredBlob>, ClientError> {
        Ok(self.lock()?.backups.get(user).cloned())
    }
}
