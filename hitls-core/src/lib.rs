//! Wire types and codec for the openHiTLS handshake core.
//!
//! Pure functions over byte buffers: every handshake message variant for
//! SSLv3 through TLS 1.3, DTLS 1.0/1.2, and TLCP 1.1, plus the shared
//! primitives (`Codec`, `Reader`, length-prefixed payload newtypes, the
//! cipher suite table). No I/O, no crypto, no state machine — those live in
//! `hitls-crypto` and `hitls-handshake`.

pub mod error;
pub mod msgs;
pub mod suites;

pub use error::{DecodeError, DecodeErrorKind, EncodeError};
