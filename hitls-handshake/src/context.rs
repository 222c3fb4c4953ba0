//! Connection context (`spec.md` §3): per-endpoint state that outlives any
//! single handshake — role, negotiated parameters, renegotiation and
//! resumption state, post-handshake auth state. Generalized from the
//! per-role fields `tls-client`'s backend carries split across its client
//! and server connection structs.

use std::sync::Arc;

use hitls_core::msgs::enums::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The inclusive version range this endpoint is configured (or was told) to
/// accept, independent of what gets negotiated for a given connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: ProtocolVersion,
    pub max: ProtocolVersion,
}

impl VersionRange {
    pub fn contains(&self, version: ProtocolVersion) -> bool {
        version.to_raw() <= self.max.to_raw() && version.to_raw() >= self.min.to_raw()
    }
}

/// Post-handshake client authentication state (TLS 1.3 only, RFC 8446
/// §4.6.2). Named states, not a bool, because "requested but not yet
/// answered" and "never requested" both disallow re-requesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostHandshakeAuthState {
    /// Neither side advertised `post_handshake_auth`.
    None,
    /// The client advertised support; no request has been sent yet.
    Supported,
    /// A `CertificateRequest` has been sent and a reply is outstanding.
    Requested,
    /// The peer's `Certificate`/`CertificateVerify` reply was accepted.
    Completed,
}

/// Secure renegotiation state (RFC 5746), tracked across the connection's
/// whole lifetime rather than per-handshake since it gates whether a second
/// handshake on the same connection is permitted at all.
#[derive(Debug, Clone, Default)]
pub struct RenegotiationState {
    /// Whether the peer (and, for a server, this endpoint too) indicated
    /// secure renegotiation support via the extension or the SCSV.
    pub secure_renegotiation_supported: bool,
    /// `client_verify_data || server_verify_data` from the most recently
    /// completed handshake on this connection, empty before the first one.
    pub last_verify_data: Vec<u8>,
    /// Number of handshakes completed so far on this connection; 0 before
    /// the first Finished exchange.
    pub handshake_count: u32,
}

/// Resumption state tracked across handshakes on one connection: whether
/// the active session came from resumption, and — relevant only on the
/// renegotiation path — whether resumption is still permitted at all
/// (`spec.md` Open Question: secure renegotiation only).
#[derive(Debug, Clone, Default)]
pub struct ResumptionState {
    pub resumed: bool,
    pub is_resumption_on_renego_allowed: bool,
}

/// Everything negotiated for (or persisting across) a connection. One
/// `ConnectionContext` per connection; never shared across threads without
/// external synchronization (`spec.md` §3).
pub struct ConnectionContext {
    pub role: Role,
    pub configured_versions: VersionRange,
    pub negotiated_version: Option<ProtocolVersion>,
    pub negotiated_cipher_suite: Option<CipherSuite>,
    pub negotiated_group: Option<NamedGroup>,
    pub negotiated_signature_scheme: Option<SignatureScheme>,
    pub negotiated_alpn: Option<Vec<u8>>,
    pub sni: Option<Vec<u8>>,
    pub renegotiation: RenegotiationState,
    pub resumption: ResumptionState,
    pub post_handshake_auth: PostHandshakeAuthState,
    pub extended_master_secret: bool,
    pub encrypt_then_mac: bool,
    /// The session this connection is either resuming from or will persist
    /// into the cache once established; `None` until a session exists.
    pub active_session: Option<Arc<Session>>,
}

impl ConnectionContext {
    pub fn new(role: Role, configured_versions: VersionRange) -> Self {
        ConnectionContext {
            role,
            configured_versions,
            negotiated_version: None,
            negotiated_cipher_suite: None,
            negotiated_group: None,
            negotiated_signature_scheme: None,
            negotiated_alpn: None,
            sni: None,
            renegotiation: RenegotiationState::default(),
            resumption: ResumptionState::default(),
            post_handshake_auth: PostHandshakeAuthState::None,
            extended_master_secret: false,
            encrypt_then_mac: false,
            active_session: None,
        }
    }

    pub fn is_tls13(&self) -> bool {
        self.negotiated_version.is_some_and(|v| v.is_tls13())
    }

    /// Whether a second handshake may be started on this connection at all:
    /// only ever true once secure renegotiation was confirmed on the first
    /// handshake (`spec.md` §4.5 invariant — insecure renegotiation is
    /// refused unconditionally, no legacy opt-in).
    pub fn may_renegotiate(&self) -> bool {
        self.renegotiation.secure_renegotiation_supported && self.renegotiation.handshake_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_range_contains_is_inclusive() {
        let range = VersionRange { min: ProtocolVersion::TLSv1_2, max: ProtocolVersion::TLSv1_3 };
        assert!(range.contains(ProtocolVersion::TLSv1_2));
        assert!(range.contains(ProtocolVersion::TLSv1_3));
        assert!(!range.contains(ProtocolVersion::SSLv3));
    }

    #[test]
    fn fresh_context_cannot_renegotiate() {
        let ctx = ConnectionContext::new(Role::Client, VersionRange { min: ProtocolVersion::TLSv1_2, max: ProtocolVersion::TLSv1_3 });
        assert!(!ctx.may_renegotiate());
    }
}
