use thiserror::Error;

/// Crypto-provider failures (`spec.md` §7, "Crypto errors" — always fatal).
/// RSA decryption failure during ≤1.2 key exchange is the one exception: the
/// handshake layer absorbs it into constant-time PMS substitution rather
/// than propagating this error (`spec.md` §4.5, Bleichenbacher mitigation).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key generation failed")]
    KeyGenFailed,
    #[error("signature verification failed")]
    VerifyFailed,
    #[error("decryption failed")]
    DecryptFailed,
    #[error("signing failed")]
    SignFailed,
    #[error("key derivation failed")]
    DeriveFailed,
    #[error("unsupported algorithm for this operation")]
    Unsupported,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
