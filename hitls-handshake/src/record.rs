//! Record-layer external collaborator (`spec.md` §1): fragments, encrypts,
//! decrypts, gates ChangeCipherSpec, and provides key-activation hooks. The
//! core calls outward through this trait; it never frames or encrypts a
//! record itself.

use hitls_core::msgs::enums::{AlertDescription, AlertLevel, ContentType};
use hitls_crypto::Secret;

/// Which traffic direction a key-activation call installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Narrow interface onto the record layer. A concrete implementation
/// fragments handshake bytes into records, applies/removes the active AEAD,
/// and gates `ChangeCipherSpec` the way `spec.md` §1 describes
/// (`ctrlCCS`, `sendAlert`).
pub trait RecordLayer: Send {
    /// Delivers `bytes` (one complete, reassembled handshake message body,
    /// including its 4-byte or DTLS 12-byte header) for transmission as
    /// `ContentType::Handshake` records, fragmented as the record layer sees
    /// fit.
    fn send_handshake(&mut self, bytes: &[u8]);

    /// Sends an alert record. A fatal alert is always the last thing sent on
    /// a connection before it is torn down.
    fn send_alert(&mut self, level: AlertLevel, description: AlertDescription);

    /// Sends a plaintext (or, post-CCS, encrypted) `ChangeCipherSpec` record
    /// (≤1.2 and the DTLS/TLS-1.3 middlebox-compatibility CCS).
    fn send_change_cipher_spec(&mut self);

    /// Installs the traffic secret for `direction`, deriving key/iv/(for
    /// ≤1.2, MAC key) from it via the crypto provider. Called only after the
    /// corresponding CCS (≤1.2) or immediately after the ServerHello is
    /// emitted/received (1.3) — `spec.md` §3 invariant.
    fn activate_keys(&mut self, direction: Direction, traffic_secret: &Secret);

    /// Returns the next complete inbound record's content type and payload,
    /// or `None` if more bytes are needed (`WantRead`).
    fn try_recv(&mut self) -> Option<(ContentType, Vec<u8>)>;
}
