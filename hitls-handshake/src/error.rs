//! Top-level error taxonomy (`spec.md` §7). Every fatal variant carries the
//! alert description the caller must send — the alert is part of the error
//! variant, not a side channel (Design Notes).

use hitls_core::error::DecodeError;
use hitls_core::msgs::enums::AlertDescription;
use hitls_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("illegal parameter: {0}")]
    IllegalParameter(&'static str),
    #[error("missing required extension: {0}")]
    MissingExtension(&'static str),
    #[error("unexpected message in current state: {0:?}")]
    UnexpectedMessage(hitls_core::msgs::enums::HandshakeType),
    #[error("decrypt error")]
    DecryptError,
    #[error("handshake failure: {0}")]
    HandshakeFailure(&'static str),
    #[error("unknown certificate authority")]
    UnknownCa,
    #[error("certificate required")]
    CertificateRequired,

    #[error("crypto operation failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("message codec error: {0}")]
    Codec(#[from] DecodeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("no shared cipher suite")]
    NoSharedCipher,
    #[error("no shared group")]
    NoSharedGroup,

    #[error("peer sent a fatal or unexpected-warning alert: {0:?}")]
    PeerAlert(AlertDescription),

    #[error("handshake cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// The alert this error implies should be sent to the peer, if any.
    /// `None` for errors that never reach the wire (config errors raised
    /// before any record is sent, or `Cancelled`, which tears the connection
    /// down locally).
    pub fn alert(&self) -> Option<AlertDescription> {
        Some(match self {
            Error::UnsupportedVersion => AlertDescription::ProtocolVersion,
            Error::IllegalParameter(_) => AlertDescription::IllegalParameter,
            Error::MissingExtension(_) => AlertDescription::MissingExtension,
            Error::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            Error::DecryptError => AlertDescription::DecryptError,
            Error::HandshakeFailure(_) => AlertDescription::HandshakeFailure,
            Error::UnknownCa => AlertDescription::UnknownCa,
            Error::CertificateRequired => AlertDescription::CertificateRequired,
            Error::Crypto(_) => AlertDescription::InternalError,
            Error::Codec(e) => e.recommended_alert(),
            Error::NoSharedCipher | Error::NoSharedGroup => AlertDescription::HandshakeFailure,
            Error::PeerAlert(_) => return None,
            Error::InvalidConfig(_) => return None,
            Error::Cancelled => return None,
            Error::Internal(_) => AlertDescription::InternalError,
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned by `step()`: I/O signals are not errors (`spec.md` §7).
#[derive(Debug)]
pub enum StepResult {
    WantRead,
    WantWrite,
    Done,
    Progress,
}
