//! TLS 1.3 HKDF key-schedule ladder and TLS ≤1.2 master-secret derivation
//! (`spec.md` §4.2). Naming follows RFC 8446 §7.1 throughout; the stage
//! names (`early_secret`, `handshake_secret`, ...) also match the
//! `Witness` struct documented in the teacher's Origo backend
//! (`tls-client/src/backend/standard13.rs`), which records the exact same
//! ladder for zk-proof instrumentation — not reused here, just confirms the
//! stage order.

use hitls_crypto::{CryptoProvider, HashAlgorithm, Secret};

const DERIVED_LABEL: &[u8] = b"derived";

fn empty_hash(provider: &dyn CryptoProvider, hash: HashAlgorithm) -> Vec<u8> {
    provider.hash(hash, &[]).expect("hash provider is infallible for supported algorithms")
}

/// `Derive-Secret(Secret, Label, Messages) = HKDF-Expand-Label(Secret, Label, Hash(Messages), Hash.length)`.
pub fn derive_secret(provider: &dyn CryptoProvider, hash: HashAlgorithm, secret: &[u8], label: &[u8], transcript_hash: &[u8]) -> Secret {
    provider
        .hkdf_expand_label(hash, secret, label, transcript_hash, hash.output_len())
        .expect("hkdf_expand_label is infallible for supported hash lengths")
}

/// The five rungs of the RFC 8446 §7.1 ladder this core walks per handshake.
/// `early_secret` is computed even without a PSK (`HKDF-Extract(0, 0)`) since
/// the ladder always starts there; `psk` is `None` for a fresh (non-resumed,
/// non-external-PSK) handshake.
pub struct Tls13KeySchedule {
    hash: HashAlgorithm,
    early_secret: Secret,
    handshake_secret: Option<Secret>,
    master_secret: Option<Secret>,
}

impl Tls13KeySchedule {
    /// `psk` is the resumption PSK (from a ticket) or an externally supplied
    /// PSK; `None` derives `early_secret` from an all-zero IKM.
    pub fn new(provider: &dyn CryptoProvider, hash: HashAlgorithm, psk: Option<&[u8]>) -> Self {
        let zero = vec![0u8; hash.output_len()];
        let ikm = psk.map(|p| p.to_vec()).unwrap_or_else(|| zero.clone());
        let early_secret = provider.hkdf_extract(hash, &zero, &ikm).expect("hkdf_extract is infallible");
        Tls13KeySchedule { hash, early_secret, handshake_secret: None, master_secret: None }
    }

    /// Derives the PSK `binder_key`. External PSKs use label `"ext binder"`,
    /// resumption PSKs use `"res binder"` (RFC 8446 §7.1).
    pub fn binder_key(&self, provider: &dyn CryptoProvider, is_external_psk: bool) -> Secret {
        let label: &[u8] = if is_external_psk { b"ext binder" } else { b"res binder" };
        let empty = empty_hash(provider, self.hash);
        derive_secret(provider, self.hash, self.early_secret.as_bytes(), label, &empty)
    }

    pub fn client_early_traffic_secret(&self, provider: &dyn CryptoProvider, client_hello_hash: &[u8]) -> Secret {
        derive_secret(provider, self.hash, self.early_secret.as_bytes(), b"c e traffic", client_hello_hash)
    }

    pub fn early_exporter_master_secret(&self, provider: &dyn CryptoProvider, client_hello_hash: &[u8]) -> Secret {
        derive_secret(provider, self.hash, self.early_secret.as_bytes(), b"e exp master", client_hello_hash)
    }

    /// Consumes the (EC)DHE shared secret to produce `handshake_secret`,
    /// then derives and returns `(client_hs_traffic, server_hs_traffic)`
    /// over `transcript_hash` = hash(ClientHello..ServerHello).
    pub fn into_handshake_traffic(&mut self, provider: &dyn CryptoProvider, dhe_shared_secret: &[u8], transcript_hash: &[u8]) -> (Secret, Secret) {
        let empty = empty_hash(provider, self.hash);
        let derived = derive_secret(provider, self.hash, self.early_secret.as_bytes(), DERIVED_LABEL, &empty);
        let handshake_secret = provider
            .hkdf_extract(self.hash, derived.as_bytes(), dhe_shared_secret)
            .expect("hkdf_extract is infallible");
        let c_hs = derive_secret(provider, self.hash, handshake_secret.as_bytes(), b"c hs traffic", transcript_hash);
        let s_hs = derive_secret(provider, self.hash, handshake_secret.as_bytes(), b"s hs traffic", transcript_hash);
        self.handshake_secret = Some(handshake_secret);
        (c_hs, s_hs)
    }

    /// Derives `master_secret` from `handshake_secret`, then returns
    /// `(client_app_traffic, server_app_traffic, exporter_master)` over
    /// `transcript_hash` = hash(ClientHello..server Finished).
    pub fn into_application_traffic(&mut self, provider: &dyn CryptoProvider, transcript_hash: &[u8]) -> (Secret, Secret, Secret) {
        let handshake_secret = self.handshake_secret.as_ref().expect("into_handshake_traffic must run first");
        let empty = empty_hash(provider, self.hash);
        let derived = derive_secret(provider, self.hash, handshake_secret.as_bytes(), DERIVED_LABEL, &empty);
        let zero = vec![0u8; self.hash.output_len()];
        let master_secret = provider.hkdf_extract(self.hash, derived.as_bytes(), &zero).expect("hkdf_extract is infallible");
        let c_ap = derive_secret(provider, self.hash, master_secret.as_bytes(), b"c ap traffic", transcript_hash);
        let s_ap = derive_secret(provider, self.hash, master_secret.as_bytes(), b"s ap traffic", transcript_hash);
        let exporter = derive_secret(provider, self.hash, master_secret.as_bytes(), b"exp master", transcript_hash);
        self.master_secret = Some(master_secret);
        (c_ap, s_ap, exporter)
    }

    /// `resumption_master_secret`, derived over hash(ClientHello..client
    /// Finished) once the handshake has fully completed.
    pub fn resumption_master_secret(&self, provider: &dyn CryptoProvider, transcript_hash: &[u8]) -> Secret {
        let master_secret = self.master_secret.as_ref().expect("into_application_traffic must run first");
        derive_secret(provider, self.hash, master_secret.as_bytes(), b"res master", transcript_hash)
    }

    /// Ratchets a traffic secret forward for `KeyUpdate`
    /// (`application_traffic_secret_N+1 = HKDF-Expand-Label(secret_N, "traffic upd", "", Hash.length)`,
    /// RFC 8446 §7.2).
    pub fn next_application_traffic_secret(provider: &dyn CryptoProvider, hash: HashAlgorithm, current: &Secret) -> Secret {
        provider
            .hkdf_expand_label(hash, current.as_bytes(), b"traffic upd", b"", hash.output_len())
            .expect("hkdf_expand_label is infallible for supported hash lengths")
    }

    /// Per-direction `key`/`iv` from a traffic secret (RFC 8446 §7.3).
    pub fn traffic_key_and_iv(provider: &dyn CryptoProvider, hash: HashAlgorithm, traffic_secret: &Secret, key_len: usize, iv_len: usize) -> (Secret, Secret) {
        let key = provider
            .hkdf_expand_label(hash, traffic_secret.as_bytes(), b"key", b"", key_len)
            .expect("hkdf_expand_label is infallible for supported hash lengths");
        let iv = provider
            .hkdf_expand_label(hash, traffic_secret.as_bytes(), b"iv", b"", iv_len)
            .expect("hkdf_expand_label is infallible for supported hash lengths");
        (key, iv)
    }
}

/// TLS ≤1.2 master secret derivation: legacy PRF variant (RFC 5246 §8.1) or
/// extended-master-secret variant (RFC 7627 §4), selected by whether EMS was
/// negotiated.
pub fn master_secret_tls12(
    provider: &dyn CryptoProvider,
    hash: HashAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    session_hash_if_ems: Option<&[u8]>,
) -> Vec<u8> {
    let (label, seed): (&[u8], Vec<u8>) = match session_hash_if_ems {
        Some(session_hash) => (b"extended master secret", session_hash.to_vec()),
        None => (b"master secret", [client_random.as_slice(), server_random.as_slice()].concat()),
    };
    let full_seed = [label, seed.as_slice()].concat();
    crate::transcript::tls12_prf(provider, hash, pre_master_secret, &full_seed, 48)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_secret_uses_hash_output_len() {
        // Smoke test: the fake provider in `transcript` module is private to
        // that module, so this just checks the constant plumbing compiles
        // and `DERIVED_LABEL` is what RFC 8446 specifies.
        assert_eq!(DERIVED_LABEL, b"derived");
    }
}
