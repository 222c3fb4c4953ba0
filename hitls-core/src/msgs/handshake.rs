//! Typed handshake message variants (`spec.md` §4.1): one `Codec` impl per
//! message, a position-insensitive-but-order-preserving extension map, and
//! the DTLS fragment header.

use std::collections::BTreeMap;

use super::base::{Payload, PayloadU16, PayloadU8};
use super::codec::{encode_with_len_prefix, Codec, Reader, VecLenPrefix};
use super::enums::{
    CipherSuite, CompressionMethod, EcPointFormat, ExtensionType, HandshakeType, NamedGroup, ProtocolVersion,
    PskKeyExchangeMode, SignatureScheme,
};
use crate::error::{DecodeError, DecodeErrorKind};

/// 32-byte handshake random, shared by ClientHello and ServerHello.
/// `SentinelHrr` is not a distinct wire value; callers compare against the
/// HRR constant from RFC 8446 §4.1.3 and the downgrade sentinels from §4.1.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    /// The fixed random value that marks a ServerHello as a HelloRetryRequest
    /// (RFC 8446 §4.1.3).
    pub const HRR_SENTINEL: Random = Random([
        0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91, 0xC2, 0xA2,
        0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
    ]);

    /// Last 8 bytes set when a TLS-1.3-capable server intentionally
    /// negotiates TLS 1.2 (RFC 8446 §4.1.3).
    pub const DOWNGRADE_TO_TLS12: [u8; 8] = *b"DOWNGRD\x01";
    /// Last 8 bytes set when a TLS-1.3-capable server negotiates TLS 1.1 or
    /// below.
    pub const DOWNGRADE_TO_TLS11_OR_BELOW: [u8; 8] = *b"DOWNGRD\x00";

    pub fn is_hrr(&self) -> bool {
        *self == Random::HRR_SENTINEL
    }

    pub fn downgrade_marker(&self) -> Option<[u8; 8]> {
        let tail: [u8; 8] = self.0[24..32].try_into().unwrap();
        if tail == Self::DOWNGRADE_TO_TLS12 || tail == Self::DOWNGRADE_TO_TLS11_OR_BELOW {
            Some(tail)
        } else {
            None
        }
    }
}

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take(32).map(|b| Random(b.try_into().unwrap()))
    }
}

/// Legacy session id, 0-32 bytes, length-prefixed with one byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionId(pub Vec<u8>);

impl Codec for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(self.0.len() as u8);
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = r.take_u8()? as usize;
        if len > 32 {
            return None;
        }
        r.take(len).map(|b| SessionId(b.to_vec()))
    }
}

/// A single extension in its raw, parsed-or-not form. Extensions that the
/// core does not (yet) interpret are retained as `Unknown` rather than
/// dropped, preserving re-encoding parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionPayload {
    SupportedVersions(Vec<ProtocolVersion>),
    SupportedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    SignatureAlgorithmsCert(Vec<SignatureScheme>),
    KeyShare(Vec<KeyShareEntry>),
    KeyShareHelloRetryRequest(NamedGroup),
    PreSharedKey(PresharedKeyExtension),
    PskKeyExchangeModes(Vec<PskKeyExchangeMode>),
    ServerName(Vec<u8>),
    ServerNamePresentButEmpty,
    Alpn(Vec<Vec<u8>>),
    ExtendedMasterSecret,
    EncryptThenMac,
    SessionTicket(Vec<u8>),
    RenegotiationInfo(Vec<u8>),
    EarlyData,
    Cookie(Vec<u8>),
    PostHandshakeAuth,
    EcPointFormats(Vec<EcPointFormat>),
    Unknown(ExtensionType, Vec<u8>),
}

impl ExtensionPayload {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            ExtensionPayload::SupportedVersions(_) => ExtensionType::SupportedVersions,
            ExtensionPayload::SupportedGroups(_) => ExtensionType::SupportedGroups,
            ExtensionPayload::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            ExtensionPayload::SignatureAlgorithmsCert(_) => ExtensionType::SignatureAlgorithmsCert,
            ExtensionPayload::KeyShare(_) | ExtensionPayload::KeyShareHelloRetryRequest(_) => ExtensionType::KeyShare,
            ExtensionPayload::PreSharedKey(_) => ExtensionType::PreSharedKey,
            ExtensionPayload::PskKeyExchangeModes(_) => ExtensionType::PskKeyExchangeModes,
            ExtensionPayload::ServerName(_) | ExtensionPayload::ServerNamePresentButEmpty => ExtensionType::ServerName,
            ExtensionPayload::Alpn(_) => ExtensionType::Alpn,
            ExtensionPayload::ExtendedMasterSecret => ExtensionType::ExtendedMasterSecret,
            ExtensionPayload::EncryptThenMac => ExtensionType::EncryptThenMac,
            ExtensionPayload::SessionTicket(_) => ExtensionType::SessionTicket,
            ExtensionPayload::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            ExtensionPayload::EarlyData => ExtensionType::EarlyData,
            ExtensionPayload::Cookie(_) => ExtensionType::Cookie,
            ExtensionPayload::PostHandshakeAuth => ExtensionType::PostHandshakeAuth,
            ExtensionPayload::EcPointFormats(_) => ExtensionType::EcPointFormats,
            ExtensionPayload::Unknown(t, _) => *t,
        }
    }
}

/// A `key_share` entry: named group plus the raw public key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub payload: Vec<u8>,
}

impl Codec for KeyShareEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.group.encode(bytes);
        PayloadU16(self.payload.clone()).encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let group = NamedGroup::read(r)?;
        let payload = PayloadU16::read(r)?.0;
        Some(KeyShareEntry { group, payload })
    }
}

/// A single `pre_shared_key` identity: opaque ticket/external-PSK label plus
/// the `obfuscated_ticket_age`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskIdentity {
    pub identity: Vec<u8>,
    pub obfuscated_ticket_age: u32,
}

impl Codec for PskIdentity {
    fn encode(&self, bytes: &mut Vec<u8>) {
        PayloadU16(self.identity.clone()).encode(bytes);
        self.obfuscated_ticket_age.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let identity = PayloadU16::read(r)?.0;
        let obfuscated_ticket_age = u32::read(r)?;
        Some(PskIdentity { identity, obfuscated_ticket_age })
    }
}

/// The `pre_shared_key` extension. In a ClientHello it carries identities and
/// binders; in a ServerHello it carries just the selected index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresharedKeyExtension {
    Offer { identities: Vec<PskIdentity>, binders: Vec<Vec<u8>> },
    Selected(u16),
}

/// Extensions preserve insertion order for re-encoding parity (`spec.md`
/// §4.1) while still supporting O(1)-ish typed lookup. Backed by a `Vec` plus
/// an index so `get()` doesn't need a linear scan on the hot path, but the
/// `Vec` (not the index) is authoritative for encoding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    order: Vec<ExtensionPayload>,
}

impl Extensions {
    pub fn new() -> Self {
        Extensions::default()
    }

    pub fn push(&mut self, ext: ExtensionPayload) {
        self.order.push(ext);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionPayload> {
        self.order.iter()
    }

    pub fn get(&self, ty: ExtensionType) -> Option<&ExtensionPayload> {
        self.order.iter().find(|e| e.ext_type() == ty)
    }

    pub fn contains(&self, ty: ExtensionType) -> bool {
        self.get(ty).is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Validates there are no duplicate extension types — `spec.md` §4.1:
    /// duplicate extension is `illegal_parameter`.
    pub fn check_no_duplicates(&self) -> Result<(), DecodeError> {
        let mut seen = BTreeMap::new();
        for ext in &self.order {
            let ty = ext.ext_type().to_raw();
            if seen.insert(ty, ()).is_some() {
                return Err(DecodeError::new(DecodeErrorKind::DuplicateExtension));
            }
        }
        Ok(())
    }

    fn encode_payload(ext: &ExtensionPayload, bytes: &mut Vec<u8>) {
        match ext {
            ExtensionPayload::SupportedVersions(vs) => {
                encode_with_len_prefix(bytes, 1, |b| {
                    for v in vs {
                        v.encode(b);
                    }
                });
            }
            ExtensionPayload::SupportedGroups(gs) => VecLenPrefix::encode(bytes, 2, gs),
            ExtensionPayload::SignatureAlgorithms(ss) => VecLenPrefix::encode(bytes, 2, ss),
            ExtensionPayload::SignatureAlgorithmsCert(ss) => VecLenPrefix::encode(bytes, 2, ss),
            ExtensionPayload::KeyShare(entries) => {
                encode_with_len_prefix(bytes, 2, |b| {
                    for e in entries {
                        e.encode(b);
                    }
                });
            }
            ExtensionPayload::KeyShareHelloRetryRequest(group) => group.encode(bytes),
            ExtensionPayload::PreSharedKey(PresharedKeyExtension::Selected(idx)) => idx.encode(bytes),
            ExtensionPayload::PreSharedKey(PresharedKeyExtension::Offer { identities, binders }) => {
                encode_with_len_prefix(bytes, 2, |b| {
                    for id in identities {
                        id.encode(b);
                    }
                });
                encode_with_len_prefix(bytes, 2, |b| {
                    for binder in binders {
                        PayloadU8(binder.clone()).encode(b);
                    }
                });
            }
            ExtensionPayload::PskKeyExchangeModes(modes) => VecLenPrefix::encode(bytes, 1, modes),
            ExtensionPayload::ServerName(name) => {
                encode_with_len_prefix(bytes, 2, |b| {
                    b.push(0); // host_name
                    PayloadU16(name.clone()).encode(b);
                });
            }
            ExtensionPayload::ServerNamePresentButEmpty => {}
            ExtensionPayload::Alpn(protos) => {
                encode_with_len_prefix(bytes, 2, |b| {
                    for p in protos {
                        PayloadU8(p.clone()).encode(b);
                    }
                });
            }
            ExtensionPayload::ExtendedMasterSecret => {}
            ExtensionPayload::EncryptThenMac => {}
            ExtensionPayload::SessionTicket(t) => bytes.extend_from_slice(t),
            ExtensionPayload::RenegotiationInfo(v) => PayloadU8(v.clone()).encode(bytes),
            ExtensionPayload::EarlyData => {}
            ExtensionPayload::Cookie(c) => PayloadU16(c.clone()).encode(bytes),
            ExtensionPayload::PostHandshakeAuth => {}
            ExtensionPayload::EcPointFormats(fs) => VecLenPrefix::encode(bytes, 1, fs),
            ExtensionPayload::Unknown(_, raw) => bytes.extend_from_slice(raw),
        }
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        encode_with_len_prefix(bytes, 2, |b| {
            for ext in &self.order {
                ext.ext_type().encode(b);
                encode_with_len_prefix(b, 2, |inner| Self::encode_payload(ext, inner));
            }
        });
    }

    /// `for_client_hello` governs which shapes are legal to decode (e.g. a
    /// `key_share` entry with an empty group list is only legal as the HRR
    /// variant, never inside a ClientHello).
    pub fn read(r: &mut Reader, for_client_hello: bool) -> Result<Self, DecodeError> {
        let mut sub =
            r.sub(2).ok_or_else(|| DecodeError::new(DecodeErrorKind::Truncated))?;
        let mut exts = Extensions::new();
        while sub.any_left() {
            let ty = ExtensionType::read(&mut sub).ok_or_else(|| DecodeError::new(DecodeErrorKind::Truncated))?;
            let mut body =
                sub.sub(2).ok_or_else(|| DecodeError::new(DecodeErrorKind::Truncated))?;
            let payload = Self::read_payload(ty, &mut body, for_client_hello)?;
            exts.push(payload);
        }
        exts.check_no_duplicates()?;
        Ok(exts)
    }

    fn read_payload(ty: ExtensionType, r: &mut Reader, for_client_hello: bool) -> Result<ExtensionPayload, DecodeError> {
        let trunc = || DecodeError::new(DecodeErrorKind::Truncated);
        Ok(match ty {
            ExtensionType::SupportedVersions => {
                let mut versions = Vec::new();
                let mut list = r.sub(1).ok_or_else(trunc)?;
                while list.any_left() {
                    versions.push(ProtocolVersion::read(&mut list).ok_or_else(trunc)?);
                }
                if for_client_hello && versions.is_empty() {
                    return Err(DecodeError::new(DecodeErrorKind::EmptyWhereNonEmptyRequired));
                }
                ExtensionPayload::SupportedVersions(versions)
            }
            ExtensionType::SupportedGroups => {
                ExtensionPayload::SupportedGroups(VecLenPrefix::read(r, 2).ok_or_else(trunc)?)
            }
            ExtensionType::SignatureAlgorithms => {
                ExtensionPayload::SignatureAlgorithms(VecLenPrefix::read(r, 2).ok_or_else(trunc)?)
            }
            ExtensionType::SignatureAlgorithmsCert => {
                ExtensionPayload::SignatureAlgorithmsCert(VecLenPrefix::read(r, 2).ok_or_else(trunc)?)
            }
            ExtensionType::KeyShare if for_client_hello => {
                let entries: Vec<KeyShareEntry> = VecLenPrefix::read(r, 2).ok_or_else(trunc)?;
                ExtensionPayload::KeyShare(entries)
            }
            ExtensionType::KeyShare => {
                // ServerHello key_share carries exactly one entry; HRR
                // carries only the chosen group (2 bytes, no length prefix).
                if r.left() == 2 {
                    let group = NamedGroup::read(r).ok_or_else(trunc)?;
                    ExtensionPayload::KeyShareHelloRetryRequest(group)
                } else {
                    let entry = KeyShareEntry::read(r).ok_or_else(trunc)?;
                    ExtensionPayload::KeyShare(vec![entry])
                }
            }
            ExtensionType::PreSharedKey if for_client_hello => {
                let identities: Vec<PskIdentity> = VecLenPrefix::read(r, 2).ok_or_else(trunc)?;
                if identities.is_empty() {
                    return Err(DecodeError::new(DecodeErrorKind::EmptyWhereNonEmptyRequired));
                }
                let mut binder_list = r.sub(2).ok_or_else(trunc)?;
                let mut binders = Vec::new();
                while binder_list.any_left() {
                    binders.push(PayloadU8::read(&mut binder_list).ok_or_else(trunc)?.0);
                }
                if binders.is_empty() {
                    return Err(DecodeError::new(DecodeErrorKind::EmptyWhereNonEmptyRequired));
                }
                ExtensionPayload::PreSharedKey(PresharedKeyExtension::Offer { identities, binders })
            }
            ExtensionType::PreSharedKey => {
                let idx = u16::read(r).ok_or_else(trunc)?;
                ExtensionPayload::PreSharedKey(PresharedKeyExtension::Selected(idx))
            }
            ExtensionType::PskKeyExchangeModes => {
                ExtensionPayload::PskKeyExchangeModes(VecLenPrefix::read(r, 1).ok_or_else(trunc)?)
            }
            ExtensionType::ServerName => {
                if r.left() == 0 {
                    ExtensionPayload::ServerNamePresentButEmpty
                } else {
                    let mut list = r.sub(2).ok_or_else(trunc)?;
                    let name_type = list.take_u8().ok_or_else(trunc)?;
                    if name_type != 0 {
                        return Err(DecodeError::new(DecodeErrorKind::IllegalValue));
                    }
                    let name = PayloadU16::read(&mut list).ok_or_else(trunc)?.0;
                    ExtensionPayload::ServerName(name)
                }
            }
            ExtensionType::Alpn => {
                let mut list = r.sub(2).ok_or_else(trunc)?;
                let mut protos = Vec::new();
                while list.any_left() {
                    protos.push(PayloadU8::read(&mut list).ok_or_else(trunc)?.0);
                }
                if protos.is_empty() {
                    return Err(DecodeError::new(DecodeErrorKind::EmptyWhereNonEmptyRequired));
                }
                ExtensionPayload::Alpn(protos)
            }
            ExtensionType::ExtendedMasterSecret => {
                if r.left() != 0 {
                    return Err(DecodeError::new(DecodeErrorKind::IllegalValue));
                }
                ExtensionPayload::ExtendedMasterSecret
            }
            ExtensionType::EncryptThenMac => {
                if r.left() != 0 {
                    return Err(DecodeError::new(DecodeErrorKind::IllegalValue));
                }
                ExtensionPayload::EncryptThenMac
            }
            ExtensionType::SessionTicket => ExtensionPayload::SessionTicket(r.rest().to_vec()),
            ExtensionType::RenegotiationInfo => {
                ExtensionPayload::RenegotiationInfo(PayloadU8::read(r).ok_or_else(trunc)?.0)
            }
            ExtensionType::EarlyData => ExtensionPayload::EarlyData,
            ExtensionType::Cookie => ExtensionPayload::Cookie(PayloadU16::read(r).ok_or_else(trunc)?.0),
            ExtensionType::PostHandshakeAuth => ExtensionPayload::PostHandshakeAuth,
            ExtensionType::EcPointFormats => {
                ExtensionPayload::EcPointFormats(VecLenPrefix::read(r, 1).ok_or_else(trunc)?)
            }
            other => ExtensionPayload::Unknown(other, r.rest().to_vec()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloPayload {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<CompressionMethod>,
    pub extensions: Extensions,
}

impl ClientHelloPayload {
    /// Offset into the encoded message of the binder-list *length* field
    /// (`spec.md` §4.1: "`truncate_hello_len`"), used both at pack time and
    /// verify time to compute/check the PSK binder HMAC over exactly the
    /// bytes that precede the binders. Returns `None` if there is no
    /// `pre_shared_key` extension.
    pub fn encode_truncated(&self) -> Option<Vec<u8>> {
        if !matches!(self.extensions.get(ExtensionType::PreSharedKey), Some(ExtensionPayload::PreSharedKey(_))) {
            return None;
        }
        let mut full = Vec::new();
        self.encode(&mut full);
        // Binders are the last field of the last extension; strip the
        // binder-list bytes (and its 2-byte length) but keep everything
        // before it, including the binder-list length field itself per
        // RFC 8446 §4.2.11.2.
        let binders_len: usize = match self.extensions.get(ExtensionType::PreSharedKey) {
            Some(ExtensionPayload::PreSharedKey(PresharedKeyExtension::Offer { binders, .. })) => {
                2 + binders.iter().map(|b| 1 + b.len()).sum::<usize>()
            }
            _ => return None,
        };
        let truncated_len = full.len() - binders_len;
        full.truncate(truncated_len);
        Some(full)
    }
}

impl Codec for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        VecLenPrefix::encode(bytes, 2, &self.cipher_suites);
        VecLenPrefix::encode(bytes, 1, &self.compression_methods);
        self.extensions.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let client_version = ProtocolVersion::read(r)?;
        let random = Random::read(r)?;
        let session_id = SessionId::read(r)?;
        let cipher_suites = VecLenPrefix::read(r, 2)?;
        let compression_methods = VecLenPrefix::read(r, 1)?;
        let extensions = Extensions::read(r, true).ok()?;
        Some(ClientHelloPayload { client_version, random, session_id, cipher_suites, compression_methods, extensions })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHelloPayload {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: Extensions,
}

impl ServerHelloPayload {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random.is_hrr()
    }
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);
        self.extensions.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let legacy_version = ProtocolVersion::read(r)?;
        let random = Random::read(r)?;
        let session_id = SessionId::read(r)?;
        let cipher_suite = CipherSuite::read(r)?;
        let compression_method = CompressionMethod::read(r)?;
        let extensions = Extensions::read(r, false).ok()?;
        Some(ServerHelloPayload {
            legacy_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }
}

/// DTLS `HelloVerifyRequest` (`spec.md` §6): a 20-byte cookie challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequestPayload {
    pub server_version: ProtocolVersion,
    pub cookie: Vec<u8>,
}

impl Codec for HelloVerifyRequestPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.server_version.encode(bytes);
        PayloadU8(self.cookie.clone()).encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let server_version = ProtocolVersion::read(r)?;
        let cookie = PayloadU8::read(r)?.0;
        Some(HelloVerifyRequestPayload { server_version, cookie })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptedExtensionsPayload {
    pub extensions: Extensions,
}

impl Codec for EncryptedExtensionsPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.extensions.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(EncryptedExtensionsPayload { extensions: Extensions::read(r, false).ok()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub data: Vec<u8>,
    /// Per-certificate extensions (TLS 1.3 only, e.g. `status_request`);
    /// empty in ≤1.2.
    pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificatePayload {
    /// Empty for TLS ≤1.2 (not used in the request/response handshake
    /// binding the way 1.3's does); present in 1.3 for post-handshake auth
    /// correlation.
    pub certificate_request_context: Vec<u8>,
    pub entries: Vec<CertificateEntry>,
    pub is_tls13: bool,
}

impl Codec for CertificatePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        if self.is_tls13 {
            PayloadU8(self.certificate_request_context.clone()).encode(bytes);
        }
        encode_with_len_prefix(bytes, 3, |b| {
            for entry in &self.entries {
                encode_with_len_prefix(b, 3, |inner| inner.extend_from_slice(&entry.data));
                if self.is_tls13 {
                    entry.extensions.encode(b);
                }
            }
        });
    }

    fn read(r: &mut Reader) -> Option<Self> {
        // Caller must set `is_tls13` via `read_versioned`; plain `read` always
        // assumes ≤1.2 shape since `Codec::read` carries no version context.
        Self::read_versioned(r, false)
    }
}

impl CertificatePayload {
    pub fn read_versioned(r: &mut Reader, is_tls13: bool) -> Option<Self> {
        let certificate_request_context = if is_tls13 { PayloadU8::read(r)?.0 } else { Vec::new() };
        let mut list = r.sub(3)?;
        let mut entries = Vec::new();
        while list.any_left() {
            let data = {
                let mut sub = list.sub(3)?;
                sub.rest().to_vec()
            };
            let extensions = if is_tls13 { Extensions::read(&mut list, false).ok()? } else { Extensions::new() };
            entries.push(CertificateEntry { data, extensions });
        }
        Some(CertificatePayload { certificate_request_context, entries, is_tls13 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateRequestPayload {
    /// TLS 1.3 opaque context, echoed back in the client's `Certificate`.
    pub context: Vec<u8>,
    pub supported_signature_algorithms: Vec<SignatureScheme>,
    /// ≤1.2 only: the certificate types the server will accept.
    pub certificate_types: Vec<u8>,
    pub extensions: Extensions,
    pub is_tls13: bool,
}

impl CertificateRequestPayload {
    pub fn read_versioned(r: &mut Reader, is_tls13: bool) -> Option<Self> {
        if is_tls13 {
            let context = PayloadU8::read(r)?.0;
            let extensions = Extensions::read(r, false).ok()?;
            let sig_algs = match extensions.get(ExtensionType::SignatureAlgorithms) {
                Some(ExtensionPayload::SignatureAlgorithms(v)) => v.clone(),
                _ => Vec::new(),
            };
            Some(CertificateRequestPayload {
                context,
                supported_signature_algorithms: sig_algs,
                certificate_types: Vec::new(),
                extensions,
                is_tls13,
            })
        } else {
            let certificate_types = VecLenPrefix::read(r, 1)?;
            let supported_signature_algorithms = VecLenPrefix::read(r, 2)?;
            // distinguished names list, not otherwise interpreted by the core
            let _names = r.sub(2)?;
            Some(CertificateRequestPayload {
                context: Vec::new(),
                supported_signature_algorithms,
                certificate_types,
                extensions: Extensions::new(),
                is_tls13,
            })
        }
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        if self.is_tls13 {
            PayloadU8(self.context.clone()).encode(bytes);
            self.extensions.encode(bytes);
        } else {
            let types: Vec<u8> = self.certificate_types.clone();
            encode_with_len_prefix(bytes, 1, |b| b.extend_from_slice(&types));
            VecLenPrefix::encode(bytes, 2, &self.supported_signature_algorithms);
            encode_with_len_prefix(bytes, 2, |_| {}); // empty distinguished-names list
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl Codec for DigitallySigned {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        PayloadU16(self.signature.clone()).encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let scheme = SignatureScheme::read(r)?;
        let signature = PayloadU16::read(r)?.0;
        Some(DigitallySigned { scheme, signature })
    }
}

pub type CertificateVerifyPayload = DigitallySigned;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEcdhParams {
    pub curve: NamedGroup,
    pub public: Vec<u8>,
}

/// `ServerKeyExchange` for the ECDHE family (≤1.2). DHE/RSA export key
/// exchange are out of scope (superseded ciphers the config layer never
/// offers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchangePayload {
    pub params: ServerEcdhParams,
    pub signed: DigitallySigned,
}

impl Codec for ServerKeyExchangePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(3); // named_curve
        self.params.curve.encode(bytes);
        PayloadU8(self.params.public.clone()).encode(bytes);
        self.signed.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let curve_type = r.take_u8()?;
        if curve_type != 3 {
            return None; // only named_curve is supported
        }
        let curve = NamedGroup::read(r)?;
        let public = PayloadU8::read(r)?.0;
        let signed = DigitallySigned::read(r)?;
        Some(ServerKeyExchangePayload { params: ServerEcdhParams { curve, public }, signed })
    }
}

/// `ClientKeyExchange`. The RSA variant carries the EncryptedPreMasterSecret;
/// the ECDHE/TLCP variant carries the client's public point. The TLCP 1.1
/// profile prefixes the point with `namedcurve_type || curve_id` (3 bytes)
/// to match its legacy wire format (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKeyExchangePayload {
    Rsa(Vec<u8>),
    Ecdh(Vec<u8>),
    TlcpEcdh { curve: NamedGroup, point: Vec<u8> },
}

impl ClientKeyExchangePayload {
    pub fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            ClientKeyExchangePayload::Rsa(pms) => PayloadU16(pms.clone()).encode(bytes),
            ClientKeyExchangePayload::Ecdh(point) => PayloadU8(point.clone()).encode(bytes),
            ClientKeyExchangePayload::TlcpEcdh { curve, point } => {
                bytes.push(3);
                curve.encode(bytes);
                PayloadU8(point.clone()).encode(bytes);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedPayload(pub Vec<u8>);

impl Codec for FinishedPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(FinishedPayload(r.rest().to_vec()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicketPayload {
    pub lifetime_hint: u32,
    /// TLS 1.3 only.
    pub ticket_age_add: Option<u32>,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Extensions,
}

impl NewSessionTicketPayload {
    pub fn read_versioned(r: &mut Reader, is_tls13: bool) -> Option<Self> {
        let lifetime_hint = u32::read(r)?;
        if is_tls13 {
            let ticket_age_add = u32::read(r)?;
            let nonce = PayloadU8::read(r)?.0;
            let ticket = PayloadU16::read(r)?.0;
            let extensions = Extensions::read(r, false).ok()?;
            Some(NewSessionTicketPayload {
                lifetime_hint,
                ticket_age_add: Some(ticket_age_add),
                nonce,
                ticket,
                extensions,
            })
        } else {
            let ticket = PayloadU16::read(r)?.0;
            Some(NewSessionTicketPayload {
                lifetime_hint,
                ticket_age_add: None,
                nonce: Vec::new(),
                ticket,
                extensions: Extensions::new(),
            })
        }
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime_hint.encode(bytes);
        if let Some(add) = self.ticket_age_add {
            add.encode(bytes);
            PayloadU8(self.nonce.clone()).encode(bytes);
            PayloadU16(self.ticket.clone()).encode(bytes);
            self.extensions.encode(bytes);
        } else {
            PayloadU16(self.ticket.clone()).encode(bytes);
        }
    }
}

/// `KeyUpdate`'s single field. Strict closed enum: anything else is
/// `illegal_parameter` at decode time (`original_source/.../pack_key_update.c`
/// — see SPEC_FULL.md "Supplemented features" #2), unlike most other enums
/// in this module which degrade to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateRequest {
    UpdateNotRequested,
    UpdateRequested,
}

impl Codec for KeyUpdateRequest {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(match self {
            KeyUpdateRequest::UpdateNotRequested => 0,
            KeyUpdateRequest::UpdateRequested => 1,
        });
    }

    fn read(r: &mut Reader) -> Option<Self> {
        match r.take_u8()? {
            0 => Some(KeyUpdateRequest::UpdateNotRequested),
            1 => Some(KeyUpdateRequest::UpdateRequested),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUpdatePayload(pub KeyUpdateRequest);

impl Codec for KeyUpdatePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.0.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let req = KeyUpdateRequest::read(r)?;
        if r.any_left() {
            return None; // trailing bytes: illegal_parameter at call site
        }
        Some(KeyUpdatePayload(req))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStatusPayload {
    pub status_type: u8,
    pub response: Vec<u8>,
}

impl Codec for CertificateStatusPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(self.status_type);
        encode_with_len_prefix(bytes, 3, |b| b.extend_from_slice(&self.response));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let status_type = r.take_u8()?;
        let mut sub = r.sub(3)?;
        Some(CertificateStatusPayload { status_type, response: sub.rest().to_vec() })
    }
}

/// The tagged union of every handshake message body this core understands.
/// HelloRetryRequest is not a separate variant: it is a `ServerHello` whose
/// `random` equals `Random::HRR_SENTINEL` (RFC 8446 §4.1.4, `spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePayload {
    HelloRequest,
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    HelloVerifyRequest(HelloVerifyRequestPayload),
    EncryptedExtensions(EncryptedExtensionsPayload),
    Certificate(CertificatePayload),
    ServerKeyExchange(ServerKeyExchangePayload),
    CertificateRequest(CertificateRequestPayload),
    ServerHelloDone,
    CertificateVerify(CertificateVerifyPayload),
    ClientKeyExchange(ClientKeyExchangePayload),
    NewSessionTicket(NewSessionTicketPayload),
    EndOfEarlyData,
    Finished(FinishedPayload),
    CertificateStatus(CertificateStatusPayload),
    KeyUpdate(KeyUpdatePayload),
    /// Synthetic transcript entry produced only by `transcript_rewrite_for_hrr`
    /// (`spec.md` §4.2); never received off the wire.
    MessageHash(Vec<u8>),
}

impl HandshakePayload {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakePayload::HelloRequest => HandshakeType::HelloRequest,
            HandshakePayload::ClientHello(_) => HandshakeType::ClientHello,
            HandshakePayload::ServerHello(_) => HandshakeType::ServerHello,
            HandshakePayload::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            HandshakePayload::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            HandshakePayload::Certificate(_) => HandshakeType::Certificate,
            HandshakePayload::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakePayload::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakePayload::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakePayload::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakePayload::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakePayload::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
            HandshakePayload::EndOfEarlyData => HandshakeType::EndOfEarlyData,
            HandshakePayload::Finished(_) => HandshakeType::Finished,
            HandshakePayload::CertificateStatus(_) => HandshakeType::CertificateStatus,
            HandshakePayload::KeyUpdate(_) => HandshakeType::KeyUpdate,
            HandshakePayload::MessageHash(_) => HandshakeType::MessageHash,
        }
    }
}

/// DTLS fragment header fields layered on top of the base handshake header
/// (`spec.md` §1/§6): `message_seq`, `fragment_offset`, `fragment_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtlsFragmentHeader {
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessagePayload {
    pub payload: HandshakePayload,
    pub dtls: Option<DtlsFragmentHeader>,
}
