//! Handshake scratch (`spec.md` §3): ephemeral, per-handshake data, flattened
//! into owned sub-structs with no back-pointers (Design Notes: the source's
//! `hsCtx -> kxCtx -> pskInfo` intrusive chain becomes plain ownership here).
//! Allocated at handshake start, zeroized and freed on completion or abort.

use hitls_core::msgs::enums::{CipherSuite, NamedGroup};
use hitls_core::msgs::handshake::ClientHelloPayload;
use hitls_crypto::{KeyHandle, Secret};
use zeroize::Zeroize;

use crate::cert::PeerCertified;
use crate::transcript::Transcript;

/// Key-exchange scratch: the local ephemeral key pair (if any were
/// generated), the peer's public share once received, and the negotiated
/// group. For RSA key exchange `group` is `None` and `peer_public`/`local`
/// are unused; for TLCP ECDH, `group` names the curve the certificate fixes.
#[derive(Default)]
pub struct KeyExchangeScratch {
    pub group: Option<NamedGroup>,
    pub local_public: Option<Vec<u8>>,
    pub local_handle: Option<KeyHandle>,
    pub peer_public: Option<Vec<u8>>,
}

impl Drop for KeyExchangeScratch {
    fn drop(&mut self) {
        if let Some(p) = self.local_public.as_mut() {
            p.zeroize();
        }
        if let Some(p) = self.peer_public.as_mut() {
            p.zeroize();
        }
    }
}

/// One PSK the client offered or the server is considering: its identity
/// bytes, its index into the `ClientHello`'s `pre_shared_key` identity list
/// (needed to match the server's selected-identity index and to recompute
/// binders in order), and whether it came from a resumption ticket or was
/// supplied out-of-band.
pub struct PskCandidate {
    pub identity: Vec<u8>,
    pub index: u16,
    pub secret: Secret,
    pub is_external: bool,
}

/// What a `HelloRetryRequest` committed the server to, recorded at the
/// moment the server's own HRR is sent so the second `ClientHello` can be
/// checked against it (RFC 8446 §4.1.2/§4.1.4, `spec.md` §4.5): a retry that
/// changes the cipher suite, `session_id`, or key_share group the HRR
/// selected is `illegal_parameter`, not a fresh negotiation.
pub struct HrrExpectation {
    pub cipher_suite: CipherSuite,
    pub session_id: Vec<u8>,
    pub group: NamedGroup,
}

/// PSK-related scratch: every PSK under consideration this handshake, plus
/// which one (if any) was ultimately selected.
#[derive(Default)]
pub struct PskScratch {
    pub candidates: Vec<PskCandidate>,
    pub selected_index: Option<u16>,
}

impl PskScratch {
    pub fn selected(&self) -> Option<&PskCandidate> {
        let index = self.selected_index?;
        self.candidates.iter().find(|c| c.index == index)
    }
}

/// Secrets produced by the key schedule as the handshake progresses,
/// retained only as long as they are needed to derive the next rung or to
/// activate record-layer keys. Every field is wiped on drop via `Secret`'s
/// own `ZeroizeOnDrop`.
#[derive(Default)]
pub struct PendingSecrets {
    pub client_handshake_traffic: Option<Secret>,
    pub server_handshake_traffic: Option<Secret>,
    pub client_application_traffic: Option<Secret>,
    pub server_application_traffic: Option<Secret>,
    pub exporter_master: Option<Secret>,
    pub resumption_master: Option<Secret>,
    /// TLS ≤1.2 only: the single master secret both traffic keys derive
    /// from directly, with no intermediate rungs.
    pub master_secret_tls12: Option<Vec<u8>>,
}

impl Drop for PendingSecrets {
    fn drop(&mut self) {
        if let Some(m) = self.master_secret_tls12.as_mut() {
            m.zeroize();
        }
    }
}

/// Per-handshake scratch space. One instance per handshake attempt (not per
/// connection): a renegotiation or a post-HRR restart allocates a fresh one.
pub struct HandshakeScratch {
    pub transcript: Transcript,
    pub client_random: [u8; 32],
    pub server_random: Option<[u8; 32]>,
    /// Echo of the `legacy_session_id` the client sent, needed to echo it
    /// back verbatim on the TLS 1.3 middlebox-compatibility path and to look
    /// up/compare against a cached session on ≤1.2.
    pub session_id_echo: Vec<u8>,
    /// The first `ClientHello`, retained as an owned deep copy so a
    /// `HelloRetryRequest` restart can replay it into the rewritten
    /// transcript without any reference back into caller-owned buffers
    /// (Design Notes: "owned deep copy, not a reference").
    pub first_client_hello: Option<ClientHelloPayload>,
    pub key_exchange: KeyExchangeScratch,
    pub psk: PskScratch,
    pub peer_certificate: Option<PeerCertified>,
    pub secrets: PendingSecrets,
    /// Set once a `HelloRetryRequest` has been sent/received this
    /// handshake; a second one is a protocol violation (RFC 8446 §4.1.4).
    pub hello_retry_requested: bool,
    /// Server-side only: what the just-sent HRR committed the negotiation
    /// to, checked against the second `ClientHello`.
    pub hrr_expectation: Option<HrrExpectation>,
    /// Count of plaintext `ChangeCipherSpec` records seen this handshake
    /// (RFC 8446 Appendix D.4 middlebox-compatibility CCS / ≤1.2's
    /// mandatory one): at most one is ever legitimate.
    pub ccs_seen: u32,
}

impl HandshakeScratch {
    pub fn new(client_random: [u8; 32]) -> Self {
        HandshakeScratch {
            transcript: Transcript::new(),
            client_random,
            server_random: None,
            session_id_echo: Vec::new(),
            first_client_hello: None,
            key_exchange: KeyExchangeScratch::default(),
            psk: PskScratch::default(),
            peer_certificate: None,
            secrets: PendingSecrets::default(),
            hello_retry_requested: false,
            hrr_expectation: None,
            ccs_seen: 0,
        }
    }
}

impl Drop for HandshakeScratch {
    fn drop(&mut self) {
        self.client_random.zeroize();
        if let Some(r) = self.server_random.as_mut() {
            r.zeroize();
        }
        self.session_id_echo.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psk_scratch_selected_looks_up_by_index() {
        let mut scratch = PskScratch::default();
        scratch.candidates.push(PskCandidate { identity: vec![1], index: 0, secret: Secret(vec![0xAA; 32]), is_external: false });
        scratch.candidates.push(PskCandidate { identity: vec![2], index: 1, secret: Secret(vec![0xBB; 32]), is_external: true });
        scratch.selected_index = Some(1);
        assert_eq!(scratch.selected().unwrap().identity, vec![2]);
    }

    #[test]
    fn psk_scratch_selected_none_without_selection() {
        let scratch = PskScratch::default();
        assert!(scratch.selected().is_none());
    }
}
