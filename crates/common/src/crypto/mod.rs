//! Cryptographic primitives for Warden
//!
//! This module is the crypto adapter consumed by the channel guard:
//!
//! - **Identity**: Ed25519 keypairs (`SecretKey`/`PublicKey`) for principals
//! - **Challenge nonces**: 32-byte random challenges, single-use per session
//! - **Proof of possession**: signing and verifying a nonce under a stored
//!   credential and algorithm tag
//! - **Trust anchors**: parsing an X.509 root for certificate credentials
//!
//! # Authentication Model
//!
//! A principal's credential as stored in the principal table is the raw bytes
//! of its public key. Authentication is a two-step challenge–response:
//!
//! 1. The client presents its name and credential; the server checks the
//!    credential bit-for-bit against the table and answers with a fresh nonce.
//! 2. The client signs the nonce with its private key; the server verifies
//!    the signature under the stored credential and algorithm tag.
//!
//! Algorithm tags are a closed set. A tag the adapter does not recognize
//! never verifies.

mod keys;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;

/// Length of an authentication challenge nonce in bytes
pub const NONCE_LEN: usize = 32;

/// Errors from the crypto adapter
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unknown authentication algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("nonce generation failed: {0}")]
    NonceGeneration(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] KeyError),

    #[error("invalid root certificate: {0}")]
    InvalidRootCert(String),
}

/// Authentication algorithms the adapter recognizes
///
/// The tag is what the principal table stores and what crosses the wire in
/// a principal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    Ed25519,
}

impl AuthAlgorithm {
    pub const ED25519_TAG: &'static str = "ed25519";

    /// Resolve an algorithm tag. Unknown tags resolve to `None`, which
    /// callers must treat as verification failure.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            Self::ED25519_TAG => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Ed25519 => Self::ED25519_TAG,
        }
    }
}

/// Generate a cryptographically strong challenge nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::NonceGeneration(e.to_string()))?;
    Ok(nonce)
}

/// Verify that `signature` is a valid signature of `nonce` under the public
/// key encoded in `credential`, using the algorithm named by `alg_tag`.
///
/// Returns false on an unknown algorithm tag, a malformed credential, a
/// malformed signature, or a signature that does not verify. This function
/// never errors: every failure mode is a refusal.
pub fn verify_signed_nonce(alg_tag: &str, credential: &[u8], nonce: &[u8], signature: &[u8]) -> bool {
    let Some(alg) = AuthAlgorithm::from_tag(alg_tag) else {
        tracing::warn!(alg = alg_tag, "refusing verification under unknown algorithm");
        return false;
    };
    match alg {
        AuthAlgorithm::Ed25519 => {
            let Ok(key) = PublicKey::try_from(credential) else {
                return false;
            };
            let Ok(sig) = Signature::from_slice(signature) else {
                return false;
            };
            key.verify(nonce, &sig).is_ok()
        }
    }
}

/// Sign a challenge nonce with a private key. Client-side helper for the
/// second authentication step.
pub fn sign_nonce(key: &SecretKey, nonce: &[u8]) -> Vec<u8> {
    key.sign(nonce).to_bytes().to_vec()
}

/// Parse a DER-encoded X.509 certificate into a trust anchor store.
///
/// The returned store is installed into session state by
/// [`ChannelGuard::init_root_cert`](crate::guard::ChannelGuard::init_root_cert)
/// for validating certificate-chain credentials.
pub fn parse_root_cert(der: &[u8]) -> Result<RootCertStore, CryptoError> {
    let cert = CertificateDer::from(der.to_vec());
    let mut roots = RootCertStore::empty();
    roots
        .add(cert)
        .map_err(|e| CryptoError::InvalidRootCert(e.to_string()))?;
    Ok(roots)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_nonce_is_fresh() {
        let a = generate_nonce().unwrap();
        let b = generate_nonce().unwrap();
        assert_eq!(a.len(), NONCE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_signed_nonce_roundtrip() {
        let key = SecretKey::generate();
        let credential = key.public().to_bytes().to_vec();
        let nonce = generate_nonce().unwrap();
        let sig = sign_nonce(&key, &nonce);

        assert!(verify_signed_nonce(
            AuthAlgorithm::ED25519_TAG,
            &credential,
            &nonce,
            &sig
        ));

        // Wrong nonce fails
        let other_nonce = generate_nonce().unwrap();
        assert!(!verify_signed_nonce(
            AuthAlgorithm::ED25519_TAG,
            &credential,
            &other_nonce,
            &sig
        ));

        // Wrong key fails
        let other_credential = SecretKey::generate().public().to_bytes().to_vec();
        assert!(!verify_signed_nonce(
            AuthAlgorithm::ED25519_TAG,
            &other_credential,
            &nonce,
            &sig
        ));
    }

    #[test]
    fn test_unknown_algorithm_never_verifies() {
        let key = SecretKey::generate();
        let credential = key.public().to_bytes().to_vec();
        let nonce = generate_nonce().unwrap();
        let sig = sign_nonce(&key, &nonce);

        assert!(!verify_signed_nonce("rsa-2048-sha256", &credential, &nonce, &sig));
        assert!(!verify_signed_nonce("", &credential, &nonce, &sig));
    }

    #[test]
    fn test_malformed_signature_refused() {
        let key = SecretKey::generate();
        let credential = key.public().to_bytes().to_vec();
        let nonce = generate_nonce().unwrap();

        assert!(!verify_signed_nonce(
            AuthAlgorithm::ED25519_TAG,
            &credential,
            &nonce,
            b"not a signature"
        ));
    }

    #[test]
    fn test_parse_root_cert_rejects_garbage() {
        assert!(parse_root_cert(b"definitely not asn1").is_err());
    }
}
