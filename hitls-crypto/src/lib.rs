//! Crypto provider contract (`spec.md` §1): AEAD/HMAC/HKDF/ECDH/DH/RSA/
//! ECDSA/SM2 and DRBG, invoked by the handshake core for key generation, key
//! schedule, signing, verification, and key derivation. The core never
//! reaches for a concrete crypto crate directly — it holds a
//! `Arc<dyn CryptoProvider>`, passed in at construction (Design Notes:
//! "`g_libCtx` becomes an explicit `LibraryContext`... process-wide
//! singletons are banned").
//!
//! Mirrors `tls_backend::Backend` (`tls-client/src/backend/mod.rs`): one
//! async trait covering every crypto operation the handshake needs, so a
//! concrete implementation (ring, a TLCP-aware SM2/SM3/SM4 backend, an HSM
//! bridge) is a single `impl` block away.

pub mod error;

pub use error::{CryptoError, CryptoResult};

use async_trait::async_trait;
use hitls_core::msgs::enums::{CipherSuite, NamedGroup, SignatureScheme};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An ephemeral or static asymmetric key pair, opaque to the handshake core.
/// Holds only what the core needs to complete an exchange: the public bytes
/// to put on the wire, plus a provider-assigned handle to recall the private
/// half for `ecdh`/`sign`. Never implements `Clone`/`Copy`: a key pair is
/// moved into the handshake scratch and zeroized exactly once.
#[derive(Debug)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub handle: KeyHandle,
}

/// An opaque reference to provider-held private key material. The core
/// never sees the private scalar/exponent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Sm3,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Sm3 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

/// A secret derived by the provider (HKDF output, PRF output, master
/// secret). Zeroized when dropped — the handshake scratch that owns these
/// never leaks key material past handshake completion or abort
/// (`spec.md` §3 invariants).
#[derive(Clone, ZeroizeOnDrop)]
pub struct Secret(pub Vec<u8>);

impl Secret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// The crypto provider contract. All methods are `async` because a provider
/// may delegate to a remote HSM/enclave; an in-process `ring`/RustCrypto
/// implementation simply resolves immediately.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Fills `out` with cryptographically secure random bytes (DRBG,
    /// `spec.md` §5: "the core treats it as opaque and re-entrant").
    fn random(&self, out: &mut [u8]) -> CryptoResult<()>;

    /// Generates an ephemeral key-exchange key pair for `group` (ECDHE/DHE,
    /// or the TLS 1.3 `key_share` groups).
    async fn generate_key_share(&self, group: NamedGroup) -> CryptoResult<KeyPair>;

    /// Computes the ECDH/DH shared secret between `handle` and `peer_public`.
    async fn key_exchange(&self, group: NamedGroup, handle: KeyHandle, peer_public: &[u8]) -> CryptoResult<Secret>;

    /// RSA PKCS#1 v1.5 decryption of the `ClientKeyExchange`
    /// EncryptedPreMasterSecret. Returns `Err(DecryptFailed)` on a padding
    /// failure; the handshake layer — never the provider — is responsible
    /// for substituting a random PMS in constant time (`spec.md` §4.5,
    /// Bleichenbacher mitigation) so the *decision* to hide the failure
    /// stays in one auditable place.
    async fn rsa_decrypt_pkcs1(&self, cert_handle: KeyHandle, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;

    async fn sign(&self, handle: KeyHandle, scheme: SignatureScheme, message: &[u8]) -> CryptoResult<Vec<u8>>;

    async fn verify(&self, public_key: &[u8], scheme: SignatureScheme, message: &[u8], signature: &[u8]) -> CryptoResult<()>;

    fn hmac(&self, hash: HashAlgorithm, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>>;

    fn hash(&self, hash: HashAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// HKDF-Extract (RFC 5869 §2.2), used by the TLS 1.3 key schedule ladder.
    fn hkdf_extract(&self, hash: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> CryptoResult<Secret>;

    /// HKDF-Expand-Label (RFC 8446 §7.1).
    fn hkdf_expand_label(&self, hash: HashAlgorithm, secret: &[u8], label: &[u8], context: &[u8], len: usize) -> CryptoResult<Secret>;

    /// AEAD seal for cipher suite `suite`'s bulk algorithm.
    fn aead_seal(&self, suite: CipherSuite, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// AEAD open; `Err(DecryptFailed)` on authentication failure (bad tag).
    fn aead_open(&self, suite: CipherSuite, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Constant-time equality over two equal-length byte slices, as Design Notes
/// requires ("must be explicit in the API of the primitive being called; do
/// not rely on compiler behavior of generic `memcmp`"). Returns `false`
/// (rather than panicking) on length mismatch — callers compare fixed-size
/// fields (session id, PSK binder, RSA PMS version bytes) where a length
/// mismatch is itself just "not equal", never a bug to surface differently.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Zeroizes `buf` in place. Thin wrapper so call sites read as "this is a
/// secret being destroyed", matching the scratch/session zeroize-on-drop
/// posture throughout the handshake crate.
pub fn zeroize_bytes(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_length_mismatch_without_panic() {
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2]));
    }

    #[test]
    fn constant_time_eq_detects_single_byte_difference() {
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
    }
}
