//! Client-side extension packing and response validation (`spec.md` §4.4).
//! `build_client_hello_extensions` assembles the offer; `validate_server_hello_extensions`
//! checks the server didn't select anything the client never offered — RFC
//! 8446 §4.1.3 and RFC 5246 §7.4.1.4 both treat an extension the client
//! didn't send as `unsupported_extension`.

use hitls_core::msgs::enums::{CipherSuite, ExtensionType, NamedGroup, ProtocolVersion, SignatureScheme};
use hitls_core::msgs::handshake::{Extensions, ExtensionPayload, KeyShareEntry};

use crate::error::{Error, Result};

/// Parameters needed to build a `ClientHello`'s extension block. PSK
/// identities/binders are assembled separately by the state machine once
/// the transcript-dependent binder HMACs can be computed.
pub struct ClientExtensionRequest<'a> {
    pub versions: &'a [ProtocolVersion],
    pub groups: &'a [NamedGroup],
    pub signature_schemes: &'a [SignatureScheme],
    pub key_shares: Vec<KeyShareEntry>,
    pub server_name: Option<&'a [u8]>,
    pub alpn_protocols: &'a [Vec<u8>],
    pub enable_extended_master_secret: bool,
    pub enable_encrypt_then_mac: bool,
    pub session_ticket: Option<&'a [u8]>,
    pub renegotiation_verify_data: Option<&'a [u8]>,
    pub post_handshake_auth: bool,
}

pub fn build_client_hello_extensions(req: &ClientExtensionRequest) -> Extensions {
    let mut ext = Extensions::new();

    if let Some(name) = req.server_name {
        ext.push(ExtensionPayload::ServerName(name.to_vec()));
    }

    ext.push(ExtensionPayload::SupportedVersions(req.versions.to_vec()));
    ext.push(ExtensionPayload::SupportedGroups(req.groups.to_vec()));
    ext.push(ExtensionPayload::SignatureAlgorithms(req.signature_schemes.to_vec()));

    if !req.key_shares.is_empty() {
        ext.push(ExtensionPayload::KeyShare(req.key_shares.clone()));
    }

    if !req.alpn_protocols.is_empty() {
        ext.push(ExtensionPayload::Alpn(req.alpn_protocols.to_vec()));
    }

    if req.enable_extended_master_secret {
        ext.push(ExtensionPayload::ExtendedMasterSecret);
    }

    if req.enable_encrypt_then_mac {
        ext.push(ExtensionPayload::EncryptThenMac);
    }

    match req.renegotiation_verify_data {
        Some(data) => ext.push(ExtensionPayload::RenegotiationInfo(data.to_vec())),
        None => ext.push(ExtensionPayload::RenegotiationInfo(Vec::new())),
    }

    if let Some(ticket) = req.session_ticket {
        ext.push(ExtensionPayload::SessionTicket(ticket.to_vec()));
    }

    if req.post_handshake_auth {
        ext.push(ExtensionPayload::PostHandshakeAuth);
    }

    ext
}

/// The client-offered cipher suite list always carries the empty-
/// renegotiation-info SCSV ahead of real suites on an initial handshake
/// with no prior verify_data, satisfying the RFC 5746 §3.4 equivalence
/// with sending the extension (`spec.md` §4.4 "Renegotiation info").
pub fn client_cipher_suites_with_scsv(suites: &[CipherSuite], is_initial_handshake: bool) -> Vec<CipherSuite> {
    let mut out = suites.to_vec();
    if is_initial_handshake {
        out.push(CipherSuite::TlsEmptyRenegotiationInfoScsv);
    }
    out
}

/// Confirms the server didn't select an extension type the client never
/// offered, and that `renegotiation_info` (if present) matches the saved
/// verify_data on a renegotiation.
pub fn validate_server_hello_extensions(offered: &Extensions, received: &Extensions, saved_client_verify_data: &[u8]) -> Result<()> {
    for got in received.iter() {
        let ty = got.ext_type();
        if ty == ExtensionType::RenegotiationInfo {
            continue; // checked separately below, always legal to echo back
        }
        if !offered.contains(ty) {
            return Err(Error::IllegalParameter("server selected an extension the client did not offer"));
        }
    }

    if let Some(ExtensionPayload::RenegotiationInfo(v)) = received.get(ExtensionType::RenegotiationInfo) {
        if saved_client_verify_data.is_empty() {
            if !v.is_empty() {
                return Err(Error::HandshakeFailure("server sent non-empty renegotiation_info on initial handshake"));
            }
        } else if v.as_slice() != saved_client_verify_data {
            return Err(Error::HandshakeFailure("server renegotiation_info does not match saved verify_data"));
        }
    } else if !saved_client_verify_data.is_empty() {
        return Err(Error::HandshakeFailure("server omitted renegotiation_info on a renegotiation"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scsv_appended_only_on_initial_handshake() {
        let suites = vec![CipherSuite::TlsAes128GcmSha256];
        let with_scsv = client_cipher_suites_with_scsv(&suites, true);
        assert!(with_scsv.contains(&CipherSuite::TlsEmptyRenegotiationInfoScsv));
        let without = client_cipher_suites_with_scsv(&suites, false);
        assert!(!without.contains(&CipherSuite::TlsEmptyRenegotiationInfoScsv));
    }

    #[test]
    fn rejects_unoffered_extension_in_server_hello() {
        let offered = Extensions::new();
        let mut received = Extensions::new();
        received.push(ExtensionPayload::ExtendedMasterSecret);
        assert!(validate_server_hello_extensions(&offered, &received, &[]).is_err());
    }

    #[test]
    fn accepts_empty_renegotiation_info_on_initial_handshake() {
        let mut offered = Extensions::new();
        offered.push(ExtensionPayload::RenegotiationInfo(Vec::new()));
        let mut received = Extensions::new();
        received.push(ExtensionPayload::RenegotiationInfo(Vec::new()));
        assert!(validate_server_hello_extensions(&offered, &received, &[]).is_ok());
    }
}
