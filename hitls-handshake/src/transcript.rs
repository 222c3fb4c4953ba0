//! Running handshake transcript hash and Finished/verify_data computation
//! (`spec.md` §4.2). Pure bookkeeping over bytes the caller has already
//! decided belong in the transcript — this module never decides *whether* a
//! message counts, only accumulates and hashes.

use hitls_crypto::{CryptoProvider, HashAlgorithm};

/// The running transcript. Hashing may be deferred until the cipher suite
/// (and therefore the hash algorithm) is chosen — earlier bytes are buffered
/// and replayed into the hash once it's known (`spec.md` §4.2).
pub struct Transcript {
    hash: Option<HashAlgorithm>,
    /// Buffered raw bytes, retained until `init` is called for messages seen
    /// before the hash algorithm was known (typically just ClientHello1).
    pending: Vec<u8>,
    /// Once `hash` is set, bytes are also buffered here so
    /// `transcript_rewrite_for_hrr` can replace the ClientHello1 prefix
    /// without needing a running-digest "undo".
    buffer: Vec<u8>,
    /// `buffer.len()` as of just before the most recent `update()` call.
    /// `decode_and_record` appends an inbound message before the state
    /// machine inspects it, but a Finished/CertificateVerify check is
    /// defined over the transcript *excluding* the very message it
    /// authenticates (RFC 8446 §4.4.3/§4.4.4, RFC 5246 §7.4.9) — this lets
    /// `hash_excluding_last_message` reconstruct that boundary.
    pre_last_update_len: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript { hash: None, pending: Vec::new(), buffer: Vec::new(), pre_last_update_len: 0 }
    }

    pub fn init(&mut self, hash: HashAlgorithm) {
        if self.hash.is_some() {
            return;
        }
        self.hash = Some(hash);
        self.buffer = std::mem::take(&mut self.pending);
        self.pre_last_update_len = self.buffer.len();
    }

    pub fn is_initialized(&self) -> bool {
        self.hash.is_some()
    }

    /// Appends one full handshake message's bytes (header included) to the
    /// transcript, in on-the-wire order, exactly once per successfully
    /// parsed message (`spec.md` §3 invariant). The caller is responsible
    /// for calling this only after a successful parse.
    pub fn update(&mut self, bytes: &[u8]) {
        if self.hash.is_some() {
            self.pre_last_update_len = self.buffer.len();
            self.buffer.extend_from_slice(bytes);
        } else {
            self.pending.extend_from_slice(bytes);
        }
    }

    /// Snapshot of the running hash without consuming the transcript.
    pub fn current_hash(&self, provider: &dyn CryptoProvider) -> Vec<u8> {
        let hash = self.hash.expect("transcript_hash() called before transcript_init()");
        provider.hash(hash, &self.buffer).expect("hash provider is infallible for supported algorithms")
    }

    /// Hash over the transcript as it stood immediately before the most
    /// recent `update()` — i.e. excluding the last-appended message. Used to
    /// check a just-received Finished or CertificateVerify, both of which
    /// authenticate everything *except* themselves.
    pub fn hash_excluding_last_message(&self, provider: &dyn CryptoProvider) -> Vec<u8> {
        let hash = self.hash.expect("transcript_hash() called before transcript_init()");
        provider.hash(hash, &self.buffer[..self.pre_last_update_len]).expect("hash provider is infallible for supported algorithms")
    }

    /// RFC 8446 §4.4.1 / `spec.md` §3 invariant: replaces the buffered
    /// ClientHello1 bytes with `message_hash(ClientHello1)` wrapped in a
    /// synthetic handshake header (type `message_hash`, 1-byte hash-length
    /// body), ahead of appending HelloRetryRequest and ClientHello2. Must be
    /// called exactly once, immediately after HelloRetryRequest is decided
    /// and before either side appends HRR or ClientHello2 to the transcript.
    pub fn rewrite_for_hrr(&mut self, provider: &dyn CryptoProvider) {
        let hash = self.hash.expect("rewrite_for_hrr requires the hash algorithm to be known (HRR implies cipher/group negotiation has started)");
        let ch1_hash = provider.hash(hash, &self.buffer).expect("hash provider is infallible for supported algorithms");
        let mut synthetic = Vec::with_capacity(4 + ch1_hash.len());
        synthetic.push(hitls_core::msgs::enums::HandshakeType::MessageHash.to_raw());
        let len = (ch1_hash.len() as u32).to_be_bytes();
        synthetic.extend_from_slice(&len[1..]);
        synthetic.extend_from_slice(&ch1_hash);
        self.buffer = synthetic;
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// TLS ≤1.2 Finished payload is always 12 bytes (RFC 5246 §7.4.9); TLS 1.3's
/// is the full HMAC output length for the negotiated hash.
pub fn compute_verify_data_tls12(
    provider: &dyn CryptoProvider,
    hash: HashAlgorithm,
    master_secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Vec<u8> {
    let seed = [label, transcript_hash].concat();
    tls12_prf(provider, hash, master_secret, &seed, 12)
}

/// TLS 1.3 verify_data = HMAC(finished_key, transcript_hash) (RFC 8446
/// §4.4.4), where `finished_key = HKDF-Expand-Label(base_key, "finished", "", Hash.length)`.
pub fn compute_verify_data_tls13(
    provider: &dyn CryptoProvider,
    hash: HashAlgorithm,
    base_key: &[u8],
    transcript_hash: &[u8],
) -> Vec<u8> {
    let finished_key = provider
        .hkdf_expand_label(hash, base_key, b"finished", b"", hash.output_len())
        .expect("hkdf_expand_label is infallible for supported hash lengths");
    provider.hmac(hash, finished_key.as_bytes(), transcript_hash).expect("hmac is infallible for supported hash algorithms")
}

/// TLS 1.0-1.2 legacy PRF (RFC 5246 §5): `P_hash` iterated HMAC expansion.
/// TLS 1.2 uses SHA-256 (or the suite's PRF hash); TLS 1.0/1.1/SSLv3 use the
/// MD5+SHA1 split PRF, which is not modeled here since the config layer
/// never negotiates those versions with a PRF-dependent cipher in this core
/// (TLS 1.0/1.1 support is record-layer/version-negotiation only).
pub fn tls12_prf(provider: &dyn CryptoProvider, hash: HashAlgorithm, secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(out_len);
    let mut a = provider.hmac(hash, secret, seed).expect("hmac is infallible for supported hash algorithms");
    while result.len() < out_len {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        let chunk = provider.hmac(hash, secret, &input).expect("hmac is infallible for supported hash algorithms");
        result.extend_from_slice(&chunk);
        a = provider.hmac(hash, secret, &a).expect("hmac is infallible for supported hash algorithms");
    }
    result.truncate(out_len);
    result
}

/// PSK binder HMAC (RFC 8446 §4.2.11.2): `HMAC(binder_key, transcript_hash(truncated ClientHello))`.
/// Called both at ClientHello pack-time and at ServerHello verify-time over
/// the same truncated-hello prefix (`spec.md` §4.2).
pub fn compute_psk_binder(
    provider: &dyn CryptoProvider,
    hash: HashAlgorithm,
    binder_key: &[u8],
    truncated_hello_hash: &[u8],
) -> Vec<u8> {
    let finished_key = provider
        .hkdf_expand_label(hash, binder_key, b"finished", b"", hash.output_len())
        .expect("hkdf_expand_label is infallible for supported hash lengths");
    provider.hmac(hash, finished_key.as_bytes(), truncated_hello_hash).expect("hmac is infallible for supported hash algorithms")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider;

    #[async_trait::async_trait]
    impl CryptoProvider for FakeProvider {
        fn random(&self, out: &mut [u8]) -> hitls_crypto::CryptoResult<()> {
            out.fill(0x42);
            Ok(())
        }
        async fn generate_key_share(&self, _group: hitls_core::msgs::enums::NamedGroup) -> hitls_crypto::CryptoResult<hitls_crypto::KeyPair> {
            unimplemented!()
        }
        async fn key_exchange(&self, _g: hitls_core::msgs::enums::NamedGroup, _h: hitls_crypto::KeyHandle, _p: &[u8]) -> hitls_crypto::CryptoResult<hitls_crypto::Secret> {
            unimplemented!()
        }
        async fn rsa_decrypt_pkcs1(&self, _h: hitls_crypto::KeyHandle, _c: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            unimplemented!()
        }
        async fn sign(&self, _h: hitls_crypto::KeyHandle, _s: hitls_core::msgs::enums::SignatureScheme, _m: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            unimplemented!()
        }
        async fn verify(&self, _pk: &[u8], _s: hitls_core::msgs::enums::SignatureScheme, _m: &[u8], _sig: &[u8]) -> hitls_crypto::CryptoResult<()> {
            unimplemented!()
        }
        fn hmac(&self, _hash: HashAlgorithm, key: &[u8], data: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            // deterministic stand-in, good enough to exercise buffering logic
            let mut out = key.to_vec();
            out.extend_from_slice(data);
            Ok(out)
        }
        fn hash(&self, _hash: HashAlgorithm, data: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            Ok(data.to_vec())
        }
        fn hkdf_extract(&self, _hash: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> hitls_crypto::CryptoResult<hitls_crypto::Secret> {
            Ok(hitls_crypto::Secret([salt, ikm].concat()))
        }
        fn hkdf_expand_label(&self, _hash: HashAlgorithm, secret: &[u8], label: &[u8], _context: &[u8], len: usize) -> hitls_crypto::CryptoResult<hitls_crypto::Secret> {
            let mut out = secret.to_vec();
            out.extend_from_slice(label);
            out.resize(len.max(out.len()), 0);
            out.truncate(len);
            Ok(hitls_crypto::Secret(out))
        }
        fn aead_seal(&self, _s: hitls_core::msgs::enums::CipherSuite, _k: &[u8], _n: &[u8], _a: &[u8], p: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            Ok(p.to_vec())
        }
        fn aead_open(&self, _s: hitls_core::msgs::enums::CipherSuite, _k: &[u8], _n: &[u8], _a: &[u8], c: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            Ok(c.to_vec())
        }
    }

    #[test]
    fn buffering_before_init_then_replays() {
        let mut t = Transcript::new();
        t.update(b"client-hello-1");
        assert!(!t.is_initialized());
        t.init(HashAlgorithm::Sha256);
        t.update(b"server-hello");
        let provider = FakeProvider;
        let digest = t.current_hash(&provider);
        assert_eq!(digest, b"client-hello-1server-hello".to_vec());
    }

    #[test]
    fn hrr_rewrite_replaces_prefix() {
        let mut t = Transcript::new();
        t.init(HashAlgorithm::Sha256);
        t.update(b"CH1");
        let provider = FakeProvider;
        t.rewrite_for_hrr(&provider);
        t.update(b"HRR");
        t.update(b"CH2");
        let digest = t.current_hash(&provider);
        // synthetic message_hash header (type 254, 3-byte len = 3) + "CH1" + "HRR" + "CH2"
        assert_eq!(digest, [&[254, 0, 0, 3][..], b"CH1", b"HRR", b"CH2"].concat());
    }
}
