//! Identity certificates and trust policy

use serde::{Deserialize, Serialize};
use tessera_crypto::{AuthorityKey, KeyPair, PublicKey, Signature};

use super::error::MessengerError;

/// `{identity, staticPublicKey}` binding, the unit of trust bootstrap.
///
/// Immutable once issued. A second certificate for a known identity with a
/// different key is a key rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Identity name the certificate is issued to
    pub identity: String,
    /// Long-term X25519 public key
    pub static_public_key: PublicKey,
}

impl Certificate {
    /// Bytes covered by the authority signature: the certificate's JSON.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, MessengerError> {
        serde_json::to_vec(self)
            .map_err(|e| MessengerError::invalid(format!("failed to encode certificate: {e}")))
    }

    /// Check `signature` against `authority`.
    pub fn verify(
        &self,
        authority: &AuthorityKey,
        signature: &Signature,
    ) -> Result<(), MessengerError> {
        authority.verify(&self.signed_bytes()?, signature).map_err(|_| {
            MessengerError::Certificate {
                reason: format!("signature for '{}' does not verify", self.identity),
            }
        })
    }
}

/// How certificates without an authority signature are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Accept unsigned certificates, logging a warning for each.
    ///
    /// A substituted key for an identity never seen before goes undetected.
    #[default]
    TrustOnFirstUse,
    /// Reject any certificate that is not signed by the authority.
    RequireSignature,
}

/// Local party: name plus long-term key pair.
#[derive(Clone)]
pub struct Identity {
    pub(crate) name: String,
    pub(crate) key_pair: KeyPair,
}

impl Identity {
    /// Identity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Long-term public key.
    pub fn public_key(&self) -> &PublicKey {
        self.key_pair.public()
    }

    /// Certificate advertising this identity.
    pub fn certificate(&self) -> Certificate {
        Certificate { identity: self.name.clone(), static_public_key: *self.key_pair.public() }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("public_key", self.key_pair.public())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tessera_crypto::AuthoritySigner;

    use super::*;

    fn cert() -> Certificate {
        Certificate {
            identity: "alice".to_string(),
            static_public_key: *KeyPair::from_secret_bytes([1u8; 32]).public(),
        }
    }

    #[test]
    fn json_uses_camel_case() {
        let json = String::from_utf8(cert().signed_bytes().unwrap()).unwrap();
        assert!(json.starts_with(r#"{"identity":"alice","staticPublicKey":""#));
    }

    #[test]
    fn signed_certificate_verifies() {
        let signer = AuthoritySigner::from_secret_bytes(&[7u8; 32]);
        let certificate = cert();
        let signature = signer.sign(&certificate.signed_bytes().unwrap());
        assert!(certificate.verify(&signer.authority_key(), &signature).is_ok());
    }

    #[test]
    fn altered_certificate_fails() {
        let signer = AuthoritySigner::from_secret_bytes(&[7u8; 32]);
        let signature = signer.sign(&cert().signed_bytes().unwrap());

        let mut forged = cert();
        forged.identity = "mallory".to_string();
        assert!(matches!(
            forged.verify(&signer.authority_key(), &signature),
            Err(MessengerError::Certificate { .. })
        ));
    }
}
