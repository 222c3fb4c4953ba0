//! Top-level message framing: `decode`/`encode` entry points (`spec.md`
//! §4.1 public contract) plus the plaintext `Alert` and `ChangeCipherSpec`
//! messages the record layer hands the core unencrypted.

use super::codec::{Codec, Reader};
use super::enums::{AlertDescription, AlertLevel, ContentType, HandshakeType, ProtocolVersion, Role};
use super::handshake::{
    CertificatePayload, CertificateRequestPayload, ClientHelloPayload, ClientKeyExchangePayload,
    DtlsFragmentHeader, EncryptedExtensionsPayload, FinishedPayload, HandshakeMessagePayload, HandshakePayload,
    HelloVerifyRequestPayload, KeyUpdatePayload, NewSessionTicketPayload, ServerHelloPayload,
    ServerKeyExchangePayload, CertificateStatusPayload, CertificateVerifyPayload,
};
use crate::error::{DecodeError, DecodeErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Alert { level: AlertLevel::Fatal, description }
    }
}

impl Codec for Alert {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.level.encode(bytes);
        self.description.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let level = AlertLevel::read(r)?;
        let description = AlertDescription::read(r)?;
        Some(Alert { level, description })
    }
}

/// A fully-decoded handshake message, independent of its record-layer
/// framing. `Message::decode`/`Message::encode` are the codec's public
/// contract (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: HandshakeMessagePayload,
}

/// Version/role context the codec needs to disambiguate message shapes that
/// are not self-describing on the wire (1.3 vs ≤1.2 `Certificate`,
/// `NewSessionTicket`; ECDHE vs RSA vs TLCP `ClientKeyExchange`; DTLS framing).
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub version: ProtocolVersion,
    pub role: Role,
    /// Set once the negotiated cipher suite's key-exchange kind is known;
    /// `None` only while decoding the very first ClientHello/ServerHello.
    pub kx_is_rsa: Option<bool>,
}

impl Message {
    /// Decodes one handshake message body for `kind` out of `buf`, which must
    /// contain exactly the message body (the 4-byte, or DTLS 12-byte, header
    /// has already been stripped by the record layer / fragment reassembler).
    pub fn decode(kind: HandshakeType, ctx: DecodeContext, buf: &[u8]) -> Result<Message, DecodeError> {
        let mut r = Reader::init(buf);
        let trunc = || DecodeError::new(DecodeErrorKind::Truncated);
        let is_tls13 = ctx.version.is_tls13();
        let payload = match kind {
            HandshakeType::HelloRequest => HandshakePayload::HelloRequest,
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::HelloVerifyRequest => {
                HandshakePayload::HelloVerifyRequest(HelloVerifyRequestPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::EncryptedExtensions => {
                HandshakePayload::EncryptedExtensions(EncryptedExtensionsPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::Certificate => {
                HandshakePayload::Certificate(CertificatePayload::read_versioned(&mut r, is_tls13).ok_or_else(trunc)?)
            }
            HandshakeType::ServerKeyExchange => {
                HandshakePayload::ServerKeyExchange(ServerKeyExchangePayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::CertificateRequest => HandshakePayload::CertificateRequest(
                CertificateRequestPayload::read_versioned(&mut r, is_tls13).ok_or_else(trunc)?,
            ),
            HandshakeType::ServerHelloDone => HandshakePayload::ServerHelloDone,
            HandshakeType::CertificateVerify => {
                HandshakePayload::CertificateVerify(CertificateVerifyPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::ClientKeyExchange => {
                HandshakePayload::ClientKeyExchange(decode_client_key_exchange(ctx, &mut r)?)
            }
            HandshakeType::NewSessionTicket => HandshakePayload::NewSessionTicket(
                NewSessionTicketPayload::read_versioned(&mut r, is_tls13).ok_or_else(trunc)?,
            ),
            HandshakeType::EndOfEarlyData => HandshakePayload::EndOfEarlyData,
            HandshakeType::Finished => HandshakePayload::Finished(FinishedPayload::read(&mut r).ok_or_else(trunc)?),
            HandshakeType::CertificateStatus => {
                HandshakePayload::CertificateStatus(CertificateStatusPayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::KeyUpdate => {
                HandshakePayload::KeyUpdate(KeyUpdatePayload::read(&mut r).ok_or_else(trunc)?)
            }
            HandshakeType::MessageHash | HandshakeType::Unknown(_) => {
                return Err(DecodeError::new(DecodeErrorKind::IllegalValue));
            }
        };
        if r.any_left() {
            return Err(DecodeError::new(DecodeErrorKind::TrailingBytes));
        }
        Ok(Message { payload: HandshakeMessagePayload { payload, dtls: None } })
    }

    /// Reassembles a single DTLS fragment header (`message_seq`,
    /// `fragment_offset`, `fragment_length`) that precedes the body in the
    /// on-the-wire DTLS handshake record. The fragment reassembly table
    /// itself lives in the state machine (`spec.md` §5/§9), not here.
    pub fn decode_dtls_header(r: &mut Reader) -> Option<DtlsFragmentHeader> {
        let message_seq = r.take_u16()?;
        let fragment_offset = r.take_u24()?;
        let fragment_length = r.take_u24()?;
        Some(DtlsFragmentHeader { message_seq, fragment_offset, fragment_length })
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        let body_start_marker = bytes.len();
        self.payload.payload.handshake_type().encode(bytes);
        super::codec::encode_with_len_prefix(bytes, 3, |b| encode_body(&self.payload.payload, b));
        let _ = body_start_marker;
    }
}

fn encode_body(payload: &HandshakePayload, bytes: &mut Vec<u8>) {
    match payload {
        HandshakePayload::HelloRequest
        | HandshakePayload::ServerHelloDone
        | HandshakePayload::EndOfEarlyData => {}
        HandshakePayload::ClientHello(p) => p.encode(bytes),
        HandshakePayload::ServerHello(p) => p.encode(bytes),
        HandshakePayload::HelloVerifyRequest(p) => p.encode(bytes),
        HandshakePayload::EncryptedExtensions(p) => p.encode(bytes),
        HandshakePayload::Certificate(p) => p.encode(bytes),
        HandshakePayload::ServerKeyExchange(p) => p.encode(bytes),
        HandshakePayload::CertificateRequest(p) => p.encode(bytes),
        HandshakePayload::CertificateVerify(p) => p.encode(bytes),
        HandshakePayload::ClientKeyExchange(p) => p.encode(bytes),
        HandshakePayload::NewSessionTicket(p) => p.encode(bytes),
        HandshakePayload::Finished(p) => p.encode(bytes),
        HandshakePayload::CertificateStatus(p) => p.encode(bytes),
        HandshakePayload::KeyUpdate(p) => p.encode(bytes),
        HandshakePayload::MessageHash(h) => bytes.extend_from_slice(h),
    }
}

fn decode_client_key_exchange(ctx: DecodeContext, r: &mut Reader) -> Result<ClientKeyExchangePayload, DecodeError> {
    use super::base::{PayloadU16, PayloadU8};
    use super::enums::NamedGroup;
    let trunc = DecodeError::new(DecodeErrorKind::Truncated);
    match ctx.kx_is_rsa {
        Some(true) => {
            let pms = if ctx.version == ProtocolVersion::SSLv3 {
                r.rest().to_vec()
            } else {
                PayloadU16::read(r).ok_or(trunc)?.0
            };
            Ok(ClientKeyExchangePayload::Rsa(pms))
        }
        Some(false) if ctx.version == ProtocolVersion::TLCPv1_1 => {
            let curve_type = r.take_u8().ok_or(trunc)?;
            if curve_type != 3 {
                return Err(DecodeError::new(DecodeErrorKind::IllegalValue));
            }
            let curve = NamedGroup::read(r).ok_or(trunc)?;
            let point = PayloadU8::read(r).ok_or(trunc)?.0;
            Ok(ClientKeyExchangePayload::TlcpEcdh { curve, point })
        }
        Some(false) => {
            let point = PayloadU8::read(r).ok_or(trunc)?.0;
            Ok(ClientKeyExchangePayload::Ecdh(point))
        }
        None => Err(DecodeError::new(DecodeErrorKind::IllegalValue)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::enums::{CipherSuite, CompressionMethod};
    use crate::msgs::handshake::{Extensions, Random, SessionId};

    fn ctx13() -> DecodeContext {
        DecodeContext { version: ProtocolVersion::TLSv1_3, role: Role::Server, kx_is_rsa: None }
    }

    #[test]
    fn client_hello_round_trips() {
        let ch = ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random([7u8; 32]),
            session_id: SessionId(vec![]),
            cipher_suites: vec![CipherSuite::TlsAes128GcmSha256],
            compression_methods: vec![CompressionMethod::Null],
            extensions: Extensions::new(),
        };
        let msg = Message { payload: HandshakeMessagePayload { payload: HandshakePayload::ClientHello(ch.clone()), dtls: None } };
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        // strip the 4-byte handshake header the way the record layer would
        // have delivered just the body to `decode`.
        let body = &buf[4..];
        let decoded = Message::decode(HandshakeType::ClientHello, ctx13(), body).unwrap();
        assert_eq!(decoded.payload.payload, HandshakePayload::ClientHello(ch));
    }

    #[test]
    fn truncated_client_hello_is_decode_error() {
        let body = [0x03, 0x03]; // only the version, nothing else
        let err = Message::decode(HandshakeType::ClientHello, ctx13(), &body).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Truncated);
    }
}
