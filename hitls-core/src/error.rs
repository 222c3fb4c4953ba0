//! Codec error taxonomy (`spec.md` §4.1): every decode/encode failure maps
//! to a recommended alert so the caller never has to re-derive one.

use crate::msgs::enums::AlertDescription;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    Truncated,
    LengthOverflow,
    UnknownExtensionInStrictPosition,
    DuplicateExtension,
    EmptyWhereNonEmptyRequired,
    VersionMismatch,
    IllegalValue,
    TrailingBytes,
}

impl DecodeErrorKind {
    /// The alert a caller must send for this decode failure, per the codec
    /// error table in `spec.md` §4.1.
    pub fn recommended_alert(self) -> AlertDescription {
        match self {
            DecodeErrorKind::Truncated | DecodeErrorKind::LengthOverflow => AlertDescription::DecodeError,
            DecodeErrorKind::UnknownExtensionInStrictPosition
            | DecodeErrorKind::DuplicateExtension
            | DecodeErrorKind::EmptyWhereNonEmptyRequired
            | DecodeErrorKind::IllegalValue
            | DecodeErrorKind::TrailingBytes => AlertDescription::IllegalParameter,
            DecodeErrorKind::VersionMismatch => AlertDescription::ProtocolVersion,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("decode error: {kind:?}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind) -> Self {
        DecodeError { kind }
    }

    pub fn recommended_alert(&self) -> AlertDescription {
        self.kind.recommended_alert()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("buffer too small to encode message")]
    BufferTooSmall,
    #[error("message is inconsistent and cannot be encoded: {0}")]
    InconsistentMessage(&'static str),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
pub type EncodeResult<T> = Result<T, EncodeError>;
