//! Certificate manager external collaborator (`spec.md` §1): selects local
//! certs/keys by requested parameters, validates peer chains, exposes public
//! keys and usage flags. Path building and X.509 parsing are out of scope;
//! the core only needs the results.

use hitls_core::msgs::enums::{NamedGroup, SignatureScheme};
use hitls_crypto::KeyHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Ecdsa(NamedGroup),
    Ed25519,
    Sm2,
}

/// A local certificate chain plus a handle to its private key, as selected
/// by `select_certificate` for the parameters the peer advertised.
#[derive(Debug, Clone)]
pub struct LocalCertifiedKey {
    /// DER-encoded certificate chain, leaf first.
    pub chain: Vec<Vec<u8>>,
    pub key_handle: KeyHandle,
    pub key_kind: KeyKind,
}

/// Everything the core needs from the peer's validated chain: enough to
/// check a `CertificateVerify` signature and nothing about path-building.
#[derive(Debug, Clone)]
pub struct PeerCertified {
    pub public_key: Vec<u8>,
    pub key_kind: KeyKind,
}

pub trait CertificateManager: Send + Sync {
    /// Picks a local certificate whose key type is compatible with
    /// `offered_schemes` and, for TLCP, matches `is_sm2`. `None` means no
    /// usable certificate is configured; the caller maps this to
    /// `handshake_failure` or (server, no client-auth requirement) skips
    /// client authentication.
    fn select_certificate(&self, offered_schemes: &[SignatureScheme]) -> Option<LocalCertifiedKey>;

    /// Validates the peer's chain (expiry, trust anchor, usage flags) and
    /// extracts the leaf's public key and key kind. Path-building and
    /// OCSP/CRL are the certificate manager's concern entirely; the core
    /// treats this as opaque pass/fail.
    fn validate_peer_chain(&self, chain: &[Vec<u8>]) -> Result<PeerCertified, CertificateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("peer certificate chain does not chain to a trusted root")]
    UnknownCa,
    #[error("peer certificate is expired or not yet valid")]
    Expired,
    #[error("peer certificate key usage does not permit this operation")]
    UsageMismatch,
    #[error("peer certificate chain is malformed")]
    Malformed,
}
