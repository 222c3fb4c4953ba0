//! Session & Ticket Store (`spec.md` §4.3): in-memory session cache plus
//! symmetric encrypt/decrypt of stateless tickets. Internally synchronized
//! with a single reader/writer lock; sessions handed out are reference
//! counted and immutable (`spec.md` §5).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use hitls_core::msgs::enums::{CipherSuite, ProtocolVersion};
use hitls_crypto::{constant_time_eq, CryptoProvider, HashAlgorithm};

/// A persisted, immutable session (`spec.md` §3). Cloning is cheap — callers
/// hold an `Arc<Session>`, never a owned-and-mutated copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub master_secret: Vec<u8>,
    pub session_id: Vec<u8>,
    pub ticket: Option<Vec<u8>>,
    pub sni: Option<Vec<u8>>,
    pub extended_master_secret: bool,
    pub creation_time: SystemTime,
    pub lifetime: Duration,
    /// TLS 1.3 `ticket_age_add`, used to obfuscate the client's reported
    /// ticket age.
    pub ticket_age_add: u32,
}

impl Session {
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match now.duration_since(self.creation_time) {
            Ok(age) => age <= self.lifetime,
            Err(_) => false, // creation_time is in the future: treat as invalid, not infinitely valid
        }
    }
}

/// In-memory session cache keyed by session-id, evicting LRU at capacity.
/// `find`/`insert` never hand out or accept a borrowed `Session` — always an
/// owned copy in, an `Arc` out — so a caller can't observe (or cause) a
/// mutation of a cached entry.
pub struct SessionCache {
    inner: RwLock<SessionCacheInner>,
    capacity: usize,
}

struct SessionCacheInner {
    by_id: HashMap<Vec<u8>, Arc<Session>>,
    /// Insertion order for LRU eviction; session ids only, so eviction is a
    /// cheap pop-front plus hashmap remove.
    order: std::collections::VecDeque<Vec<u8>>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        SessionCache {
            inner: RwLock::new(SessionCacheInner { by_id: HashMap::new(), order: Default::default() }),
            capacity,
        }
    }

    /// Constant-time comparison against every cached id, per `spec.md`
    /// §4.3 ("constant-time comparison") — the lookup key space is attacker
    /// influenced (the client picks its own session-id), so a short-circuit
    /// equality on the hash bucket would leak which prefix matched.
    pub fn find(&self, session_id: &[u8]) -> Option<Arc<Session>> {
        let guard = self.inner.read().unwrap();
        guard.by_id.iter().find(|(k, _)| constant_time_eq(k, session_id)).map(|(_, v)| v.clone())
    }

    pub fn insert(&self, session: Session) {
        let id = session.session_id.clone();
        let mut guard = self.inner.write().unwrap();
        if guard.by_id.len() >= self.capacity && !guard.by_id.contains_key(&id) {
            if let Some(oldest) = guard.order.pop_front() {
                guard.by_id.remove(&oldest);
            }
        }
        guard.order.push_back(id.clone());
        guard.by_id.insert(id, Arc::new(session));
    }

    pub fn remove(&self, session_id: &[u8]) {
        let mut guard = self.inner.write().unwrap();
        guard.by_id.remove(session_id);
        guard.order.retain(|id| id != session_id);
    }
}

/// One symmetric ticket-encryption key plus its validity window. Multiple
/// keys may be decrypt-eligible at once during a rotation's grace period;
/// only the newest is ever used to encrypt (`spec.md` §4.3).
#[derive(Clone)]
struct TicketKey {
    name: [u8; 16],
    key: Vec<u8>,
    /// `false` once rotated out of the encrypt role; still tried for decrypt
    /// until evicted from the ring.
    encrypt_eligible: bool,
}

/// Stateless session ticket encryption/decryption with key rotation. A
/// ticket is a self-describing blob: `key_name(16) || iv || ciphertext || mac`
/// (`spec.md` §4.3).
pub struct TicketCrypter {
    keys: RwLock<Vec<TicketKey>>,
    hash: HashAlgorithm,
}

const TICKET_IV_LEN: usize = 12;
const TICKET_MAC_LEN: usize = 32;

impl TicketCrypter {
    pub fn new(initial_key_name: [u8; 16], initial_key: Vec<u8>) -> Self {
        TicketCrypter {
            keys: RwLock::new(vec![TicketKey { name: initial_key_name, key: initial_key, encrypt_eligible: true }]),
            hash: HashAlgorithm::Sha256,
        }
    }

    /// Rotates in a new encryption key. The previous key becomes
    /// decrypt-only; callers are expected to evict it after the configured
    /// grace period has passed (`spec.md` §4.3).
    pub fn rotate(&self, new_key_name: [u8; 16], new_key: Vec<u8>) {
        let mut guard = self.keys.write().unwrap();
        for k in guard.iter_mut() {
            k.encrypt_eligible = false;
        }
        guard.push(TicketKey { name: new_key_name, key: new_key, encrypt_eligible: true });
    }

    /// Drops decrypt-only keys older than `keep_latest_n`, ending their
    /// grace period.
    pub fn evict_old_keys(&self, keep_latest_n: usize) {
        let mut guard = self.keys.write().unwrap();
        let len = guard.len();
        if len > keep_latest_n {
            guard.drain(0..len - keep_latest_n);
        }
    }

    pub fn encrypt_ticket(&self, provider: &dyn CryptoProvider, session: &Session) -> Option<Vec<u8>> {
        let guard = self.keys.read().unwrap();
        let key = guard.iter().rev().find(|k| k.encrypt_eligible)?;
        let plaintext = encode_session(session);
        let mut iv = [0u8; TICKET_IV_LEN];
        provider.random(&mut iv).ok()?;
        let ciphertext = provider
            .aead_seal(session.cipher_suite, &key.key, &iv, &key.name, &plaintext)
            .ok()?;
        let mut out = Vec::with_capacity(16 + TICKET_IV_LEN + ciphertext.len() + TICKET_MAC_LEN);
        out.extend_from_slice(&key.name);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        let mac = provider.hmac(self.hash, &key.key, &out).ok()?;
        out.extend_from_slice(&mac[..TICKET_MAC_LEN.min(mac.len())]);
        Some(out)
    }

    /// Decrypts `blob` and reports whether the caller should issue a fresh
    /// ticket even though this one decrypted successfully — true when the
    /// key used is no longer encrypt-eligible (rotation) or the session is
    /// within its last quarter-lifetime (near-expiry), per `spec.md` §4.3.
    pub fn decrypt_ticket(&self, provider: &dyn CryptoProvider, blob: &[u8], now: SystemTime) -> Option<(Session, bool)> {
        if blob.len() < 16 + TICKET_IV_LEN + TICKET_MAC_LEN {
            return None;
        }
        let (key_name, rest) = blob.split_at(16);
        let mac_at = rest.len() - TICKET_MAC_LEN;
        let (body, mac) = rest.split_at(mac_at);
        let guard = self.keys.read().unwrap();
        let key = guard.iter().find(|k| k.name == key_name)?;

        let mut mac_input = Vec::with_capacity(16 + body.len());
        mac_input.extend_from_slice(key_name);
        mac_input.extend_from_slice(body);
        let expect_mac = provider.hmac(self.hash, &key.key, &mac_input).ok()?;
        if !constant_time_eq(&expect_mac[..TICKET_MAC_LEN.min(expect_mac.len())], mac) {
            return None;
        }

        let (iv, ciphertext) = body.split_at(TICKET_IV_LEN);
        // The suite used to seal is recovered from the decoded plaintext, so
        // decryption needs an AEAD-agnostic attempt; in practice the core
        // always seals with a fixed internal ticket cipher, recorded here as
        // AES-128-GCM's suite id purely to select the right `aead_open` path.
        let plaintext = provider
            .aead_open(CipherSuite::TlsAes128GcmSha256, &key.key, iv, key_name, ciphertext)
            .ok()?;
        let session = decode_session(&plaintext)?;

        let near_expiry = session
            .creation_time
            .checked_add(session.lifetime / 4 * 3)
            .map(|threshold| now >= threshold)
            .unwrap_or(true);
        let expect_renewed_ticket = !key.encrypt_eligible || near_expiry;
        Some((session, expect_renewed_ticket))
    }
}

/// Minimal length-prefixed session serialization for the ticket's plaintext
/// payload. Opaque to everyone but this module (`spec.md` §4.3: "entirely
/// private to the Session & Ticket Store").
fn encode_session(s: &Session) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&s.version.to_raw().to_be_bytes());
    out.extend_from_slice(&s.cipher_suite.to_raw().to_be_bytes());
    out.push(s.extended_master_secret as u8);
    out.extend_from_slice(&(s.master_secret.len() as u16).to_be_bytes());
    out.extend_from_slice(&s.master_secret);
    out.extend_from_slice(&(s.session_id.len() as u16).to_be_bytes());
    out.extend_from_slice(&s.session_id);
    let sni = s.sni.clone().unwrap_or_default();
    out.extend_from_slice(&(sni.len() as u16).to_be_bytes());
    out.extend_from_slice(&sni);
    let created = s.creation_time.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
    out.extend_from_slice(&created.to_be_bytes());
    out.extend_from_slice(&(s.lifetime.as_secs() as u32).to_be_bytes());
    out.extend_from_slice(&s.ticket_age_add.to_be_bytes());
    out
}

fn decode_session(buf: &[u8]) -> Option<Session> {
    use hitls_core::msgs::codec::Reader;
    let mut r = Reader::init(buf);
    let version = ProtocolVersion::from_raw(r.take_u16()?);
    let cipher_suite = CipherSuite::from_raw(r.take_u16()?);
    let ems = r.take_u8()? != 0;
    let ms_len = r.take_u16()? as usize;
    let master_secret = r.take(ms_len)?.to_vec();
    let id_len = r.take_u16()? as usize;
    let session_id = r.take(id_len)?.to_vec();
    let sni_len = r.take_u16()? as usize;
    let sni_bytes = r.take(sni_len)?.to_vec();
    let created_secs = r.take_u64()?;
    let lifetime_secs = r.take_u32()?;
    let ticket_age_add = r.take_u32()?;
    Some(Session {
        version,
        cipher_suite,
        master_secret,
        session_id,
        ticket: None,
        sni: if sni_bytes.is_empty() { None } else { Some(sni_bytes) },
        extended_master_secret: ems,
        creation_time: SystemTime::UNIX_EPOCH + Duration::from_secs(created_secs),
        lifetime: Duration::from_secs(lifetime_secs as u64),
        ticket_age_add,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            version: ProtocolVersion::TLSv1_3,
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            master_secret: vec![9; 32],
            session_id: vec![1, 2, 3, 4],
            ticket: None,
            sni: Some(b"example.com".to_vec()),
            extended_master_secret: true,
            creation_time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000),
            lifetime: Duration::from_secs(7200),
            ticket_age_add: 0xdead_beef,
        }
    }

    #[test]
    fn session_encode_round_trips() {
        let s = sample_session();
        let enc = encode_session(&s);
        let decoded = decode_session(&enc).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn cache_find_and_evict() {
        let cache = SessionCache::new(1);
        cache.insert(sample_session());
        assert!(cache.find(&[1, 2, 3, 4]).is_some());
        let mut s2 = sample_session();
        s2.session_id = vec![5, 6, 7, 8];
        cache.insert(s2);
        assert!(cache.find(&[1, 2, 3, 4]).is_none());
        assert!(cache.find(&[5, 6, 7, 8]).is_some());
    }

    #[test]
    fn session_validity_window() {
        let s = sample_session();
        assert!(s.is_valid_at(s.creation_time + Duration::from_secs(100)));
        assert!(!s.is_valid_at(s.creation_time + Duration::from_secs(7201)));
    }

    struct XorProvider;

    #[async_trait::async_trait]
    impl CryptoProvider for XorProvider {
        fn random(&self, out: &mut [u8]) -> hitls_crypto::CryptoResult<()> {
            out.fill(0x24);
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
        fn aead_seal(&self, _s: CipherSuite, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            // XOR-with-keystream stand-in: deterministic and invertible, good
            // enough to exercise the ticket encrypt/decrypt round trip.
            let mut out = plaintext.to_vec();
            for (i, b) in out.iter_mut().enumerate() {
                *b ^= key[i % key.len()] ^ nonce[i % nonce.len()] ^ aad.first().copied().unwrap_or(0);
            }
            Ok(out)
        }
        fn aead_open(&self, s: CipherSuite, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            self.aead_seal(s, key, nonce, aad, ciphertext)
        }
    }

    #[test]
    fn ticket_round_trips_through_encrypt_and_decrypt() {
        let crypter = TicketCrypter::new([7; 16], vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let provider = XorProvider;
        let session = sample_session();

        let ticket = crypter.encrypt_ticket(&provider, &session).expect("encryptable with an eligible key");
        let (decoded, renew) = crypter.decrypt_ticket(&provider, &ticket, session.creation_time + Duration::from_secs(10)).expect("decryptable with the same key");
        assert_eq!(decoded.master_secret, session.master_secret);
        assert_eq!(decoded.session_id, session.session_id);
        assert!(!renew, "fresh, non-rotated, non-near-expiry ticket should not ask for renewal");
    }

    #[test]
    fn ticket_rotation_marks_old_key_decrypt_only_and_requests_renewal() {
        let crypter = TicketCrypter::new([1; 16], vec![9; 8]);
        let provider = XorProvider;
        let session = sample_session();
        let ticket = crypter.encrypt_ticket(&provider, &session).unwrap();

        crypter.rotate([2; 16], vec![8; 8]);
        let (_, renew) = crypter.decrypt_ticket(&provider, &ticket, session.creation_time + Duration::from_secs(10)).expect("old key still decrypt-eligible during grace period");
        assert!(renew, "ticket sealed under a now-rotated-out key should be flagged for renewal");

        crypter.evict_old_keys(1);
        assert!(crypter.decrypt_ticket(&provider, &ticket, session.creation_time).is_none(), "evicted key must no longer decrypt");
    }

    #[test]
    fn ticket_with_tampered_mac_is_rejected() {
        let crypter = TicketCrypter::new([3; 16], vec![4; 8]);
        let provider = XorProvider;
        let mut ticket = crypter.encrypt_ticket(&provider, &sample_session()).unwrap();
        let last = ticket.len() - 1;
        ticket[last] ^= 0xff;
        assert!(crypter.decrypt_ticket(&provider, &ticket, SystemTime::now()).is_none());
    }
}
