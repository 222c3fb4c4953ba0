//! Handshake protocol core: negotiates a protocol version, cipher suite,
//! and set of extensions with a peer, derives the resulting traffic
//! secrets, and hands them to a caller-supplied record layer
//! (`spec.md` §1-2). Wire encoding/decoding lives in `hitls_core`;
//! cryptographic primitives live behind `hitls_crypto::CryptoProvider`.
//! This crate owns everything in between: the state machine, the key
//! schedule, extension negotiation, and the session/ticket store.

pub mod cert;
pub mod config;
pub mod context;
pub mod error;
pub mod extensions;
pub mod key_schedule;
pub mod record;
pub mod scratch;
pub mod session;
pub mod state_machine;
pub mod transcript;

pub use config::Config;
pub use context::{ConnectionContext, Role};
pub use error::{Error, Result, StepResult};
pub use state_machine::{ClientHandshake, ServerHandshake};
