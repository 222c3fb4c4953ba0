//! Handshake State Machine (`spec.md` §4.5): the core of the core. Modeled
//! as a typestate chain — `trait State { async fn handle(...) }` plus a
//! boxed `NextState` — generalized from `eloff-rustls`'s
//! `rustls/src/client/hs.rs` (`pub(super) trait State`,
//! `NextStateOrError`) to cover both roles and every version this core
//! supports. `common` holds logic shared by both roles; `client`/`server`
//! hold the per-role state tables.

pub mod client;
pub mod common;
pub mod server;

use std::sync::Arc;

use async_trait::async_trait;
use hitls_core::error::DecodeError;
use hitls_core::msgs::enums::{AlertLevel, HandshakeType};
use hitls_core::msgs::message::{DecodeContext, Message};
use hitls_crypto::CryptoProvider;

use crate::config::Config;
use crate::context::ConnectionContext;
use crate::error::{Error, Result};
use crate::record::{Direction, RecordLayer};
use crate::scratch::HandshakeScratch;

pub use client::ClientHandshake;
pub use server::ServerHandshake;

/// Everything a `State::handle` implementation needs: negotiated/persistent
/// state, this handshake's scratch space, the shared configuration, and the
/// record-layer collaborator bytes flow through. One `Driver` backs either
/// a `ClientHandshake` or a `ServerHandshake` for the lifetime of one
/// handshake attempt.
pub struct Driver {
    pub ctx: ConnectionContext,
    pub scratch: HandshakeScratch,
    pub config: Arc<Config>,
    pub record: Box<dyn RecordLayer>,
}

impl Driver {
    pub fn provider(&self) -> &dyn CryptoProvider {
        self.config.crypto_provider.as_ref()
    }

    fn decode_context(&self, kx_is_rsa: Option<bool>) -> DecodeContext {
        let role = match self.ctx.role {
            crate::context::Role::Client => hitls_core::msgs::enums::Role::Client,
            crate::context::Role::Server => hitls_core::msgs::enums::Role::Server,
        };
        let version = self.ctx.negotiated_version.unwrap_or(hitls_core::msgs::enums::ProtocolVersion::TLSv1_2);
        DecodeContext { version, role, kx_is_rsa }
    }

    /// Decodes one complete handshake message — as delivered by
    /// `RecordLayer::try_recv`, header included — appends its raw bytes to
    /// the transcript exactly once (`spec.md` §3 invariant), and returns
    /// the parsed payload. TLS framing only; DTLS framing strips its extra
    /// 8-byte fragment header before calling this (`spec.md` §6).
    pub fn decode_and_record(&mut self, raw: &[u8], kx_is_rsa: Option<bool>) -> Result<Message> {
        if raw.len() < 4 {
            return Err(Error::Codec(DecodeError::new(hitls_core::error::DecodeErrorKind::Truncated)));
        }
        let kind = HandshakeType::from_raw(raw[0]);
        let len = u32::from_be_bytes([0, raw[1], raw[2], raw[3]]) as usize;
        let body = raw.get(4..4 + len).ok_or_else(|| Error::Codec(DecodeError::new(hitls_core::error::DecodeErrorKind::Truncated)))?;
        let ctx = self.decode_context(kx_is_rsa);
        let msg = Message::decode(kind, ctx, body).map_err(Error::Codec)?;
        self.scratch.transcript.update(raw);
        Ok(msg)
    }

    /// Encodes a handshake message, appends it to the transcript, and hands
    /// it to the record layer.
    pub fn send(&mut self, message: &Message) {
        let mut bytes = Vec::new();
        message.encode(&mut bytes);
        self.scratch.transcript.update(&bytes);
        self.record.send_handshake(&bytes);
    }

    pub fn fail(&mut self, err: Error) -> Error {
        if let Some(alert) = err.alert() {
            self.record.send_alert(AlertLevel::Fatal, alert);
        }
        err
    }

    pub fn activate_keys(&mut self, direction: Direction, secret: &hitls_crypto::Secret) {
        self.record.activate_keys(direction, secret);
    }
}

/// One state in the handshake table, keyed implicitly by
/// `(role, version, current_state)`; `event` is the `handle` call itself.
/// `DecodeError` surfaces directly since a malformed message is itself an
/// event this table must react to (mapped to an alert via `Error::Codec`).
#[async_trait]
pub trait State: Send {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState>;

    /// Whether this state accepts `app_signal(key_update)`/post-handshake
    /// messages rather than handshake-proper ones; only the terminal
    /// "connected" states do.
    fn is_connected(&self) -> bool {
        false
    }
}

pub type NextState = Box<dyn State>;
