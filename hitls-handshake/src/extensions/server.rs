//! Server-side extension selection (`spec.md` §4.4 "Selection rules (server
//! side, condensed)"). Each function implements one bullet of that section
//! and is independently unit-testable; the state machine calls them in
//! sequence while building `ServerHello`/`EncryptedExtensions`.

use hitls_core::msgs::enums::{CipherSuite, ExtensionType, NamedGroup, ProtocolVersion, SignatureScheme};
use hitls_core::msgs::handshake::{ClientHelloPayload, ExtensionPayload};
use hitls_core::suites::{BulkAlgorithm, KeyExchangeKind, SupportedCipherSuite};

use crate::cert::KeyKind;
use crate::error::{Error, Result};

/// Picks a cipher suite. `server_preference` iterates `candidates` (the
/// server's own preference order); otherwise it iterates the client's
/// offered list, picking the first one present in `candidates`.
/// `key_available` reports whether this endpoint can actually perform the
/// suite's key exchange (certificate of the right type present for
/// ECDHE-RSA/ECDHE-ECDSA/RSA static kx, or a usable group for the PSK-only
/// 1.3 case — `spec.md` §4.4 "Cipher suite").
pub fn select_cipher_suite(
    candidates: &[&'static SupportedCipherSuite],
    client_offered: &[CipherSuite],
    version: ProtocolVersion,
    server_preference: bool,
    key_available: impl Fn(&SupportedCipherSuite) -> bool,
) -> Option<&'static SupportedCipherSuite> {
    let usable = |s: &&SupportedCipherSuite| s.usable_for_version(version) && client_offered.contains(&s.suite) && key_available(s);
    if server_preference {
        candidates.iter().find(|s| usable(s)).copied()
    } else {
        client_offered.iter().find_map(|offered| candidates.iter().find(|s| s.suite == *offered && usable(s)).copied())
    }
}

/// Whether `kind` can serve `kx` (`spec.md` §4.4 "Cipher suite": "cert type
/// available").
pub fn cert_kind_fits_kx(kind: KeyKind, kx: KeyExchangeKind) -> bool {
    match kx {
        KeyExchangeKind::Rsa | KeyExchangeKind::EcdheRsa => matches!(kind, KeyKind::Rsa),
        KeyExchangeKind::EcdheEcdsa => matches!(kind, KeyKind::Ecdsa(_) | KeyKind::Ed25519),
        KeyExchangeKind::EccSm2 => matches!(kind, KeyKind::Sm2),
        KeyExchangeKind::Tls13 => true, // decided by signature_algorithms negotiation, not the suite id
    }
}

/// `spec.md` §4.4 "Group": intersect preference and client list, filtered to
/// groups legal for `version`.
pub fn select_group(server_groups: &[NamedGroup], client_groups: &[NamedGroup]) -> Option<NamedGroup> {
    server_groups.iter().copied().find(|g| client_groups.contains(g))
}

/// `spec.md` §4.4 "Signature scheme": pick the first scheme in local
/// preference order that both (a) the client offered and (b) the selected
/// certificate's key kind can produce. TLS 1.3 requires the client to have
/// sent `signature_algorithms` at all; callers pass `client_schemes: &[]`
/// only for ≤1.2 connections that legally omitted the extension (legacy
/// default is implicitly RSA-with-MD5/SHA1, which this core does not
/// support, so an empty list here always fails to select — matching the
/// practical behavior of refusing legacy-default signing).
pub fn select_signature_scheme(
    server_schemes: &[SignatureScheme],
    client_schemes: &[SignatureScheme],
    key_kind: KeyKind,
) -> Option<SignatureScheme> {
    server_schemes.iter().copied().find(|s| client_schemes.contains(s) && scheme_fits_key(*s, key_kind))
}

fn scheme_fits_key(scheme: SignatureScheme, key_kind: KeyKind) -> bool {
    match key_kind {
        KeyKind::Rsa => matches!(
            scheme,
            SignatureScheme::RsaPkcs1Sha256
                | SignatureScheme::RsaPkcs1Sha384
                | SignatureScheme::RsaPkcs1Sha512
                | SignatureScheme::RsaPssRsaeSha256
                | SignatureScheme::RsaPssRsaeSha384
                | SignatureScheme::RsaPssRsaeSha512
        ),
        KeyKind::Ecdsa(NamedGroup::Secp256r1) => scheme == SignatureScheme::EcdsaSecp256r1Sha256,
        KeyKind::Ecdsa(NamedGroup::Secp384r1) => scheme == SignatureScheme::EcdsaSecp384r1Sha384,
        KeyKind::Ecdsa(_) => scheme == SignatureScheme::EcdsaSecp521r1Sha512,
        KeyKind::Ed25519 => scheme == SignatureScheme::Ed25519,
        KeyKind::Sm2 => scheme == SignatureScheme::Sm2Sm3,
    }
}

/// `spec.md` §4.4 "Extended master secret". Returns whether EMS is in
/// effect for this connection, or an error if a local requirement was
/// violated. `resumed_session_ems` is `Some(flag)` only when resuming a
/// ≤1.2 session; RFC 7627 §5.3 forbids the asymmetric cases.
pub fn negotiate_ems(require_ems: bool, client_offered_ems: bool, resumed_session_ems: Option<bool>) -> Result<bool> {
    if require_ems && !client_offered_ems {
        return Err(Error::HandshakeFailure("extended master secret required but not offered"));
    }
    if let Some(session_ems) = resumed_session_ems {
        if session_ems != client_offered_ems {
            return Err(Error::HandshakeFailure("resumption extended-master-secret mismatch"));
        }
    }
    Ok(client_offered_ems)
}

/// `spec.md` §4.4 "Encrypt-then-MAC": only legal with a CBC bulk cipher, and
/// a renegotiation may never turn it off once it was on.
pub fn negotiate_etm(client_offered_etm: bool, bulk: BulkAlgorithm, previously_negotiated: Option<bool>) -> Result<bool> {
    let cbc = matches!(bulk, BulkAlgorithm::Aes128Cbc | BulkAlgorithm::Sm4Cbc);
    let negotiated = client_offered_etm && cbc;
    if let Some(true) = previously_negotiated {
        if !negotiated {
            return Err(Error::HandshakeFailure("renegotiation may not downgrade encrypt-then-mac"));
        }
    }
    Ok(negotiated)
}

/// `spec.md` §4.4 "Renegotiation info": validates the client's
/// `renegotiation_info` (or SCSV) against the saved verify_data from the
/// prior handshake, or requires it empty on an initial handshake.
pub fn check_renegotiation_info(client_hello: &ClientHelloPayload, saved_client_verify_data: &[u8]) -> Result<()> {
    let scsv_present = client_hello.cipher_suites.contains(&CipherSuite::TlsEmptyRenegotiationInfoScsv);
    let ext = client_hello.extensions.get(ExtensionType::RenegotiationInfo);
    let ext_value: Option<&[u8]> = match ext {
        Some(ExtensionPayload::RenegotiationInfo(v)) => Some(v.as_slice()),
        _ => None,
    };

    if saved_client_verify_data.is_empty() {
        // Initial handshake: either signal is acceptable, but an extension
        // value must be empty if present.
        if let Some(v) = ext_value {
            if !v.is_empty() {
                return Err(Error::HandshakeFailure("renegotiation_info non-empty on initial handshake"));
            }
        }
        return Ok(());
    }

    // Renegotiation: must equal the saved verify_data, extension required
    // (the SCSV has no meaning on a renegotiation).
    let _ = scsv_present;
    match ext_value {
        Some(v) if v == saved_client_verify_data => Ok(()),
        _ => Err(Error::HandshakeFailure("renegotiation_info does not match saved verify_data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitls_core::suites::{ALL_PRE_TLS13_SUITES, ECC_SM4_GCM_SM3};

    #[test]
    fn select_cipher_suite_prefers_server_order() {
        let client_offered = vec![CipherSuite::TlsRsaWithAes128GcmSha256, CipherSuite::TlsEcdheRsaWithAes128GcmSha256];
        let chosen = select_cipher_suite(ALL_PRE_TLS13_SUITES, &client_offered, ProtocolVersion::TLSv1_2, true, |_| true);
        // ALL_PRE_TLS13_SUITES lists ECDHE-ECDSA first, but the client didn't
        // offer it, so the first server-order suite actually usable is
        // ECDHE-RSA.
        assert_eq!(chosen.unwrap().suite, CipherSuite::TlsEcdheRsaWithAes128GcmSha256);
    }

    #[test]
    fn select_cipher_suite_honors_key_availability() {
        let client_offered = vec![CipherSuite::TlsEcdheEcdsaWithAes128GcmSha256, CipherSuite::TlsEcdheRsaWithAes128GcmSha256];
        let chosen = select_cipher_suite(ALL_PRE_TLS13_SUITES, &client_offered, ProtocolVersion::TLSv1_2, true, |s| {
            !matches!(s.kx, KeyExchangeKind::EcdheEcdsa)
        });
        assert_eq!(chosen.unwrap().suite, CipherSuite::TlsEcdheRsaWithAes128GcmSha256);
    }

    #[test]
    fn ems_required_but_missing_fails() {
        assert!(negotiate_ems(true, false, None).is_err());
        assert!(negotiate_ems(false, false, None).unwrap() == false);
    }

    #[test]
    fn ems_resumption_mismatch_fails() {
        assert!(negotiate_ems(false, true, Some(false)).is_err());
        assert!(negotiate_ems(false, true, Some(true)).unwrap());
    }

    #[test]
    fn etm_requires_cbc() {
        assert!(!negotiate_etm(true, BulkAlgorithm::Aes128Gcm, None).unwrap());
        assert!(negotiate_etm(true, BulkAlgorithm::Aes128Cbc, None).unwrap());
    }

    #[test]
    fn etm_renegotiation_cannot_downgrade() {
        assert!(negotiate_etm(false, BulkAlgorithm::Aes128Gcm, Some(true)).is_err());
    }

    #[test]
    fn tlcp_cert_kind_fits_sm2() {
        assert!(cert_kind_fits_kx(KeyKind::Sm2, ECC_SM4_GCM_SM3.kx));
        assert!(!cert_kind_fits_kx(KeyKind::Rsa, ECC_SM4_GCM_SM3.kx));
    }
}
