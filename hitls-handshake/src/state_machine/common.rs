//! Shared state-machine logic used by both roles (`spec.md` §4.5): the
//! pieces that don't belong to "client" or "server" specifically —
//! Bleichenbacher mitigation, PSK binder verification, the downgrade
//! sentinel check, and `KeyUpdate` ratcheting.

use hitls_core::msgs::enums::ProtocolVersion;
use hitls_core::msgs::handshake::Random;
use hitls_crypto::{constant_time_eq, CryptoProvider, HashAlgorithm, Secret};

use crate::error::{Error, Result};
use crate::key_schedule::Tls13KeySchedule;

/// RSA `ClientKeyExchange` decrypt (`spec.md` §4.5 Bleichenbacher
/// mitigation, `original_source/.../pack_client_key_exchange.c`'s separate
/// constant-time version-check step — SPEC_FULL.md supplemented feature
/// #4). On any failure — decrypt error, wrong length, or wrong
/// `client_version` in the decrypted PMS — synthesizes a random PMS instead
/// of returning the error, so the handshake proceeds identically (and later
/// fails only at the Finished check) whether or not an attacker's guess was
/// right. Never returns `Err` for a decrypt/format failure; only a
/// `CryptoError` from `random()` itself propagates.
pub async fn rsa_decrypt_pms_constant_time(
    provider: &dyn CryptoProvider,
    cert_handle: hitls_crypto::KeyHandle,
    ciphertext: &[u8],
    expected_client_version: ProtocolVersion,
) -> Result<Vec<u8>> {
    let mut fallback = vec![0u8; 48];
    provider.random(&mut fallback)?;
    fallback[0..2].copy_from_slice(&expected_client_version.to_raw().to_be_bytes());

    let decrypted = provider.rsa_decrypt_pkcs1(cert_handle, ciphertext).await;
    let candidate = match decrypted {
        Ok(v) if v.len() == 48 => v,
        _ => fallback.clone(),
    };

    // Constant-time select: never branch on whether the version bytes
    // matched, so an attacker cannot distinguish "bad padding" from "good
    // padding, bad version" by timing (RFC 5246 §7.4.7.1).
    let version_ok = constant_time_eq(&candidate[0..2], &expected_client_version.to_raw().to_be_bytes());
    Ok(if version_ok { candidate } else { fallback })
}

/// Verifies a single PSK binder (`spec.md` §4.4 PreSharedKey / RFC 8446
/// §4.2.11.2): first-match semantics — the caller selects identity index
/// `selected_index` independent of this check, then this only confirms the
/// binder HMAC for *that* identity is correct. Constant-time compare
/// (Design Notes: explicit in the API).
pub fn verify_psk_binder(
    provider: &dyn CryptoProvider,
    hash: HashAlgorithm,
    binder_key: &Secret,
    truncated_hello_hash: &[u8],
    received_binder: &[u8],
) -> Result<()> {
    let expected = crate::transcript::compute_psk_binder(provider, hash, binder_key.as_bytes(), truncated_hello_hash);
    if constant_time_eq(&expected, received_binder) {
        Ok(())
    } else {
        Err(Error::HandshakeFailure("psk binder verification failed"))
    }
}

/// RFC 8446 §4.1.3 downgrade protection: a TLS-1.3-capable server signals an
/// intentional downgrade to ≤1.2 by setting the last 8 bytes of its
/// `ServerHello.random`. A client that is itself 1.3-capable and sees this
/// marker on a connection that negotiated ≤1.2 must abort — it signals an
/// active downgrade attack (or a non-compliant negotiation), never a
/// legitimate low-version-only server (which leaves the marker unset).
pub fn check_downgrade_sentinel(client_supports_tls13: bool, negotiated_version: ProtocolVersion, server_random: &Random) -> Result<()> {
    if !client_supports_tls13 || negotiated_version.is_tls13() {
        return Ok(());
    }
    if let Some(marker) = server_random.downgrade_marker() {
        let expects_tls12 = negotiated_version == ProtocolVersion::TLSv1_2;
        let matches = if expects_tls12 { marker == Random::DOWNGRADE_TO_TLS12 } else { marker == Random::DOWNGRADE_TO_TLS11_OR_BELOW };
        if matches {
            return Err(Error::IllegalParameter("downgrade sentinel present from a TLS 1.3-capable peer"));
        }
    }
    Ok(())
}

/// `KeyUpdate` ratchet (RFC 8446 §7.2 / `spec.md` §4.5): derives the next
/// application traffic secret for one direction. The caller is responsible
/// for re-keying the record layer with the result and, if `request_peer_update`
/// is set, sending its own `KeyUpdate(update_requested)`.
pub fn ratchet_traffic_secret(provider: &dyn CryptoProvider, hash: HashAlgorithm, current: &Secret) -> Secret {
    Tls13KeySchedule::next_application_traffic_secret(provider, hash, current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_sentinel_ignored_when_negotiated_tls13() {
        let mut random = Random([0u8; 32]);
        random.0[24..32].copy_from_slice(&Random::DOWNGRADE_TO_TLS12);
        assert!(check_downgrade_sentinel(true, ProtocolVersion::TLSv1_3, &random).is_ok());
    }

    #[test]
    fn downgrade_sentinel_rejected_when_present_and_applicable() {
        let mut random = Random([0u8; 32]);
        random.0[24..32].copy_from_slice(&Random::DOWNGRADE_TO_TLS12);
        assert!(check_downgrade_sentinel(true, ProtocolVersion::TLSv1_2, &random).is_err());
    }

    #[test]
    fn downgrade_sentinel_ignored_when_client_never_offered_tls13() {
        let mut random = Random([0u8; 32]);
        random.0[24..32].copy_from_slice(&Random::DOWNGRADE_TO_TLS12);
        assert!(check_downgrade_sentinel(false, ProtocolVersion::TLSv1_2, &random).is_ok());
    }
}
