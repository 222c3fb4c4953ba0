//! Client-side handshake state table (`spec.md` §4.5). One `State` impl per
//! wait point; `ClientHandshake` owns the `Driver` and drives `step()` calls
//! into it. Mirrors `eloff-rustls`'s `ExpectServerHello` / `ExpectFinished`
//! state chain, generalized to both the TLS 1.3 and ≤1.2/TLCP branches.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace, warn};

use hitls_core::msgs::enums::{CipherSuite, CompressionMethod as WireCompressionMethod, ContentType, HandshakeType, ProtocolVersion};
use hitls_core::msgs::handshake::{
    ClientHelloPayload, ClientKeyExchangePayload, HandshakeMessagePayload, HandshakePayload, KeyShareEntry,
    PresharedKeyExtension, PskIdentity, Random, SessionId,
};
use hitls_core::msgs::message::Message;
use hitls_core::suites::{find_suite, KeyExchangeKind};
use hitls_crypto::{HashAlgorithm, Secret};

use crate::error::{Error, Result, StepResult};
use crate::extensions::client::{
    build_client_hello_extensions, client_cipher_suites_with_scsv, validate_server_hello_extensions,
    ClientExtensionRequest,
};
use crate::key_schedule::{master_secret_tls12, Tls13KeySchedule};
use crate::record::Direction;
use crate::session::Session;
use crate::state_machine::common::{check_downgrade_sentinel, ratchet_traffic_secret};
use crate::state_machine::{Driver, NextState, State};
use crate::transcript::{compute_verify_data_tls12, compute_verify_data_tls13};

fn hash_for_suite(suite: CipherSuite) -> HashAlgorithm {
    match find_suite(suite).map(|s| s.hash_output_len) {
        Some(48) => HashAlgorithm::Sha384,
        _ => HashAlgorithm::Sha256,
    }
}

fn unexpected(kind: HandshakeType) -> Error {
    Error::UnexpectedMessage(kind)
}

fn handshake_message(payload: HandshakePayload) -> Message {
    Message { payload: HandshakeMessagePayload { payload, dtls: None } }
}

/// Everything needed to (re)build a `ClientHello`, retained across a
/// HelloRetryRequest restart.
struct OfferParams {
    server_name: Option<Vec<u8>>,
    resuming: Option<Arc<Session>>,
}

/// Builds and sends the initial `ClientHello`, generating a fresh key share
/// for the first configured group (`spec.md` §4.4 "Group": client offers in
/// preference order, one share up front per RFC 8446 §4.2.8 common practice).
pub async fn build_initial_client_hello(driver: &mut Driver, offer: &OfferParams) -> Result<ClientHelloPayload> {
    let versions = version_list(driver);
    let is_tls13_capable = versions.contains(&ProtocolVersion::TLSv1_3);

    let mut client_random = [0u8; 32];
    driver.provider().random(&mut client_random)?;
    driver.scratch.client_random = client_random;

    let mut session_id = vec![0u8; 32];
    driver.provider().random(&mut session_id)?;
    driver.scratch.session_id_echo = session_id.clone();

    let groups = driver.config.groups.clone();
    let mut key_shares = Vec::new();
    if is_tls13_capable {
        if let Some(&group) = groups.first() {
            let pair = driver.provider().generate_key_share(group).await?;
            driver.scratch.key_exchange.group = Some(group);
            driver.scratch.key_exchange.local_public = Some(pair.public.clone());
            driver.scratch.key_exchange.local_handle = Some(pair.handle);
            key_shares.push(KeyShareEntry { group, payload: pair.public });
        }
    }

    let mut cipher_suites: Vec<CipherSuite> = driver.config.tls13_cipher_suites.clone();
    cipher_suites.extend(driver.config.legacy_cipher_suites.clone());
    let cipher_suites = client_cipher_suites_with_scsv(&cipher_suites, driver.ctx.renegotiation.handshake_count == 0);

    let saved_verify_data = driver.ctx.renegotiation.last_verify_data.clone();
    let session_ticket = offer.resuming.as_ref().and_then(|s| s.ticket.as_deref());

    let req = ClientExtensionRequest {
        versions: &versions,
        groups: &groups,
        signature_schemes: &driver.config.signature_schemes,
        key_shares,
        server_name: offer.server_name.as_deref(),
        alpn_protocols: &driver.config.alpn_protocols,
        enable_extended_master_secret: driver.config.enable_extended_master_secret,
        enable_encrypt_then_mac: driver.config.enable_encrypt_then_mac,
        session_ticket,
        renegotiation_verify_data: if saved_verify_data.is_empty() { None } else { Some(&saved_verify_data) },
        post_handshake_auth: is_tls13_capable,
    };
    let mut extensions = build_client_hello_extensions(&req);

    // Resumption PSK offer (TLS 1.3 ticket path): identity + obfuscated age
    // now, binder is computed and spliced in once the rest of ClientHello is
    // fixed (RFC 8446 §4.2.11).
    if let Some(session) = offer.resuming.as_ref() {
        if is_tls13_capable && session.version.is_tls13() {
            let age_ms = session
                .creation_time
                .elapsed()
                .map(|d| d.as_millis() as u32)
                .unwrap_or(0)
                .wrapping_add(session.ticket_age_add);
            if let Some(ticket) = session.ticket.clone() {
                let identity = PskIdentity { identity: ticket, obfuscated_ticket_age: age_ms };
                let hash = hash_for_suite(session.cipher_suite);
                let placeholder_binder = vec![0u8; hash.output_len()];
                extensions.push(hitls_core::msgs::handshake::ExtensionPayload::PreSharedKey(
                    PresharedKeyExtension::Offer { identities: vec![identity], binders: vec![placeholder_binder] },
                ));
                driver.scratch.psk.candidates.push(crate::scratch::PskCandidate {
                    identity: session.ticket.clone().unwrap_or_default(),
                    index: 0,
                    secret: Secret(session.master_secret.clone()),
                    is_external: false,
                });
            }
        }
    }

    let legacy_version = if is_tls13_capable { ProtocolVersion::TLSv1_2 } else { *versions.iter().max_by_key(|v| v.to_raw()).unwrap_or(&ProtocolVersion::TLSv1_2) };

    let mut hello = ClientHelloPayload {
        client_version: legacy_version,
        random: Random(client_random),
        session_id: SessionId(session_id),
        cipher_suites,
        compression_methods: vec![WireCompressionMethod::Null],
        extensions,
    };

    splice_psk_binder(driver, &mut hello).await?;
    Ok(hello)
}

/// Recomputes and splices the PSK binder(s) over the truncated ClientHello
/// (everything up to, but not including, the binder list itself — RFC 8446
/// §4.2.11.2). No-op if there is no `pre_shared_key` extension.
async fn splice_psk_binder(driver: &mut Driver, hello: &mut ClientHelloPayload) -> Result<()> {
    let Some(candidate) = driver.scratch.psk.candidates.first() else { return Ok(()) };
    let Some(truncated) = hello.encode_truncated() else { return Ok(()) };
    let hash = hash_for_suite(driver.config.tls13_cipher_suites.first().copied().unwrap_or(CipherSuite::TlsAes128GcmSha256));
    let truncated_hash = driver.provider().hash(hash, &truncated)?;
    let schedule = Tls13KeySchedule::new(driver.provider(), hash, Some(candidate.secret.as_bytes()));
    let binder_key = schedule.binder_key(driver.provider(), candidate.is_external);
    let binder = crate::transcript::compute_psk_binder(driver.provider(), hash, binder_key.as_bytes(), &truncated_hash);

    // `Extensions` has no in-place mutator; rebuild the PSK extension with
    // the real binder and replace it via a fresh `Extensions` in the same
    // push order (push order is encoding order, so the PSK extension must
    // stay last, matching RFC 8446 §4.2.11's "MUST be the last extension").
    let mut rebuilt = hitls_core::msgs::handshake::Extensions::new();
    for ext in hello.extensions.iter() {
        match ext {
            hitls_core::msgs::handshake::ExtensionPayload::PreSharedKey(PresharedKeyExtension::Offer {
                identities,
                ..
            }) => {
                rebuilt.push(hitls_core::msgs::handshake::ExtensionPayload::PreSharedKey(
                    PresharedKeyExtension::Offer { identities: identities.clone(), binders: vec![binder.clone()] },
                ));
            }
            other => rebuilt.push(other.clone()),
        }
    }
    hello.extensions = rebuilt;
    Ok(())
}

fn version_list(driver: &Driver) -> Vec<ProtocolVersion> {
    let range = driver.ctx.configured_versions;
    [ProtocolVersion::TLSv1_3, ProtocolVersion::TLSv1_2, ProtocolVersion::TLCPv1_1]
        .into_iter()
        .filter(|v| range.contains(*v))
        .collect()
}

/// Public entry point: builds the `Driver`, sends the first `ClientHello`,
/// and returns the handshake ready for `step()`.
pub struct ClientHandshake {
    driver: Driver,
    state: Option<NextState>,
}

impl ClientHandshake {
    pub async fn start(mut driver: Driver, server_name: Option<Vec<u8>>, resuming: Option<Arc<Session>>) -> Result<Self> {
        driver.ctx.sni = server_name.clone();
        let offer = OfferParams { server_name, resuming: resuming.clone() };
        let hello = build_initial_client_hello(&mut driver, &offer).await?;
        driver.scratch.first_client_hello = Some(hello.clone());
        debug!("client: sending ClientHello");
        driver.send(&handshake_message(HandshakePayload::ClientHello(hello)));
        Ok(ClientHandshake { driver, state: Some(Box::new(AwaitServerHello { resuming })) })
    }

    fn kx_is_rsa(&self) -> Option<bool> {
        self.driver
            .ctx
            .negotiated_cipher_suite
            .and_then(find_suite)
            .map(|s| matches!(s.kx, KeyExchangeKind::Rsa))
    }

    /// Advances the handshake by one inbound record, or reports `WantRead`
    /// if `incoming` is `None`. `spec.md` §5: no internal suspension points,
    /// the caller drives every step.
    pub async fn step(&mut self, incoming: Option<(ContentType, Vec<u8>)>) -> Result<StepResult> {
        let (content_type, raw) = match incoming {
            Some(v) => v,
            None => return Ok(StepResult::WantRead),
        };
        match content_type {
            ContentType::Handshake => {
                let kx_is_rsa = self.kx_is_rsa();
                let msg = self.driver.decode_and_record(&raw, kx_is_rsa)?;
                let kind = msg.payload.payload.handshake_type();
                trace!("client: received {:?}", kind);
                let state = self.state.take().ok_or(Error::Internal("handshake already finished"))?;
                match state.handle(&mut self.driver, msg).await {
                    Ok(next) => {
                        let connected = next.is_connected();
                        self.state = Some(next);
                        Ok(if connected { StepResult::Done } else { StepResult::Progress })
                    }
                    Err(e) => Err(self.driver.fail(e)),
                }
            }
            ContentType::ChangeCipherSpec => Ok(StepResult::Progress),
            ContentType::Alert => {
                warn!("client: received alert record");
                Err(Error::HandshakeFailure("peer sent an alert"))
            }
            ContentType::ApplicationData | ContentType::Unknown(_) => {
                Err(Error::Internal("unexpected content type during handshake"))
            }
        }
    }

    pub fn context(&self) -> &crate::context::ConnectionContext {
        &self.driver.ctx
    }
}

/// Waiting for `ServerHello` (or a `HelloRetryRequest`, which is a
/// `ServerHello` with the RFC 8446 §4.1.3 sentinel random).
struct AwaitServerHello {
    resuming: Option<Arc<Session>>,
}

#[async_trait]
impl State for AwaitServerHello {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::ServerHello(sh) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };

        let client_supports_tls13 = driver.config.supports_tls13();
        let negotiated_version = crate::extensions::negotiate_version(
            match sh.extensions.get(hitls_core::msgs::enums::ExtensionType::SupportedVersions) {
                Some(hitls_core::msgs::handshake::ExtensionPayload::SupportedVersions(v)) => Some(v.as_slice()),
                _ => None,
            },
            sh.legacy_version,
            driver.ctx.configured_versions.min,
            driver.ctx.configured_versions.max,
        )
        .ok_or(Error::UnsupportedVersion)?;

        if sh.is_hello_retry_request() {
            if driver.scratch.hello_retry_requested {
                return Err(Error::HandshakeFailure("a second HelloRetryRequest is a protocol violation"));
            }
            return handle_hello_retry_request(driver, sh, negotiated_version, self.resuming).await;
        }

        driver.ctx.negotiated_version = Some(negotiated_version);
        driver.ctx.negotiated_cipher_suite = Some(sh.cipher_suite);
        driver.scratch.server_random = Some(sh.random.0);
        check_downgrade_sentinel(client_supports_tls13, negotiated_version, &sh.random)?;

        let saved_verify_data = driver.ctx.renegotiation.last_verify_data.clone();
        let first_hello = driver.scratch.first_client_hello.clone().expect("ClientHello was sent before AwaitServerHello");
        validate_server_hello_extensions(&first_hello.extensions, &sh.extensions, &saved_verify_data)?;

        let hash = hash_for_suite(sh.cipher_suite);
        driver.scratch.transcript.init(hash);

        if negotiated_version.is_tls13() {
            continue_tls13(driver, sh).await
        } else {
            continue_legacy(driver, sh, self.resuming)
        }
    }
}

async fn handle_hello_retry_request(
    driver: &mut Driver,
    hrr: hitls_core::msgs::handshake::ServerHelloPayload,
    negotiated_version: ProtocolVersion,
    resuming: Option<Arc<Session>>,
) -> Result<NextState> {
    let hash = hash_for_suite(hrr.cipher_suite);
    driver.scratch.transcript.init(hash);
    driver.scratch.transcript.rewrite_for_hrr(driver.provider());
    driver.scratch.hello_retry_requested = true;
    driver.ctx.negotiated_version = Some(negotiated_version);
    driver.ctx.negotiated_cipher_suite = Some(hrr.cipher_suite);

    let selected_group = match hrr.extensions.get(hitls_core::msgs::enums::ExtensionType::KeyShare) {
        Some(hitls_core::msgs::handshake::ExtensionPayload::KeyShareHelloRetryRequest(group)) => *group,
        _ => return Err(Error::IllegalParameter("HelloRetryRequest missing key_share group")),
    };

    let pair = driver.provider().generate_key_share(selected_group).await?;
    driver.scratch.key_exchange.group = Some(selected_group);
    driver.scratch.key_exchange.local_public = Some(pair.public.clone());
    driver.scratch.key_exchange.local_handle = Some(pair.handle);

    // Record the HRR itself into the transcript (it is a normal ServerHello
    // on the wire) before building ClientHello2.
    let mut hrr_bytes = Vec::new();
    handshake_message(HandshakePayload::ServerHello(hrr)).encode(&mut hrr_bytes);
    driver.scratch.transcript.update(&hrr_bytes);

    let offer = OfferParams { server_name: driver.ctx.sni.clone(), resuming: resuming.clone() };
    let mut hello2 = build_initial_client_hello(driver, &offer).await?;
    hello2.session_id = driver.scratch.first_client_hello.as_ref().expect("CH1 recorded").session_id.clone();
    driver.scratch.first_client_hello = Some(hello2.clone());
    debug!("client: sending ClientHello2 after HelloRetryRequest");
    driver.send(&handshake_message(HandshakePayload::ClientHello(hello2)));

    Ok(Box::new(AwaitServerHello { resuming }))
}

async fn continue_tls13(driver: &mut Driver, sh: hitls_core::msgs::handshake::ServerHelloPayload) -> Result<NextState> {
    let hash = hash_for_suite(sh.cipher_suite);

    let psk_selected = match sh.extensions.get(hitls_core::msgs::enums::ExtensionType::PreSharedKey) {
        Some(hitls_core::msgs::handshake::ExtensionPayload::PreSharedKey(PresharedKeyExtension::Selected(idx))) => {
            Some(*idx)
        }
        _ => None,
    };
    driver.scratch.psk.selected_index = psk_selected;

    let peer_public = match sh.extensions.get(hitls_core::msgs::enums::ExtensionType::KeyShare) {
        Some(hitls_core::msgs::handshake::ExtensionPayload::KeyShare(entries)) => entries.first().cloned(),
        _ => None,
    };

    let dhe_secret = match (peer_public, driver.scratch.key_exchange.local_handle) {
        (Some(entry), Some(handle)) => {
            driver.ctx.negotiated_group = Some(entry.group);
            driver.provider().key_exchange(entry.group, handle, &entry.payload).await?.0
        }
        _ if psk_selected.is_some() => vec![0u8; hash.output_len()], // PSK-only mode, no (EC)DHE component
        _ => return Err(Error::HandshakeFailure("server selected TLS 1.3 with no key_share and no psk")),
    };

    let psk = driver.scratch.psk.selected().map(|c| c.secret.as_bytes().to_vec());
    let mut schedule = Tls13KeySchedule::new(driver.provider(), hash, psk.as_deref());

    let ch_sh_hash = driver.scratch.transcript.current_hash(driver.provider());
    let (c_hs, s_hs) = schedule.into_handshake_traffic(driver.provider(), &dhe_secret, &ch_sh_hash);

    driver.activate_keys(Direction::Read, &s_hs);
    driver.activate_keys(Direction::Write, &c_hs);
    driver.scratch.secrets.client_handshake_traffic = Some(Secret(c_hs.as_bytes().to_vec()));
    driver.scratch.secrets.server_handshake_traffic = Some(Secret(s_hs.as_bytes().to_vec()));

    Ok(Box::new(AwaitEncryptedExtensions { schedule, hash }))
}

fn continue_legacy(driver: &mut Driver, sh: hitls_core::msgs::handshake::ServerHelloPayload, resuming: Option<Arc<Session>>) -> Result<NextState> {
    let resumed = resuming.as_ref().is_some_and(|s| s.session_id == sh.session_id.0);
    if resumed {
        let session = resuming.expect("checked above");
        driver.ctx.resumption.resumed = true;
        driver.ctx.extended_master_secret = session.extended_master_secret;
        driver.ctx.active_session = Some(session.clone());
        return Ok(Box::new(AwaitChangeCipherSpecAndFinished {
            master_secret: session.master_secret.clone(),
            resumed: true,
        }));
    }
    driver.ctx.extended_master_secret =
        sh.extensions.contains(hitls_core::msgs::enums::ExtensionType::ExtendedMasterSecret);
    Ok(Box::new(AwaitServerCertificate))
}

/// TLS 1.3 only: `EncryptedExtensions`, next the server may send
/// `CertificateRequest`, `Certificate`+`CertificateVerify`, or go straight to
/// `Finished` (PSK resumption path, no certificate exchange).
struct AwaitEncryptedExtensions {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

#[async_trait]
impl State for AwaitEncryptedExtensions {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::EncryptedExtensions(ee) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        if let Some(hitls_core::msgs::handshake::ExtensionPayload::Alpn(protos)) =
            ee.extensions.get(hitls_core::msgs::enums::ExtensionType::Alpn)
        {
            driver.ctx.negotiated_alpn = protos.first().cloned();
        }
        Ok(Box::new(AwaitCertificateRequestOrCertificateOrFinished { schedule: self.schedule, hash: self.hash }))
    }
}

struct AwaitCertificateRequestOrCertificateOrFinished {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

#[async_trait]
impl State for AwaitCertificateRequestOrCertificateOrFinished {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::CertificateRequest(_cr) => {
                // Client authentication is out of scope for what this
                // connection negotiated unless a resolver was configured;
                // absent one, the client proceeds without a certificate
                // (empty Certificate message), per RFC 8446 §4.3.2.
                Ok(Box::new(AwaitCertificateRequestOrCertificateOrFinished { schedule: self.schedule, hash: self.hash }))
            }
            HandshakePayload::Certificate(cert) => {
                let chain = cert.entries.into_iter().map(|e| e.data).collect::<Vec<_>>();
                let peer = driver.config.certificate_manager.validate_peer_chain(&chain).map_err(|_| Error::UnknownCa)?;
                driver.scratch.peer_certificate = Some(peer);
                Ok(Box::new(AwaitCertificateVerify { schedule: self.schedule, hash: self.hash }))
            }
            HandshakePayload::Finished(f) => {
                finish_server_tls13(driver, self.schedule, self.hash, f.0).await
            }
            other => Err(unexpected(other.handshake_type())),
        }
    }
}

struct AwaitCertificateVerify {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

#[async_trait]
impl State for AwaitCertificateVerify {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::CertificateVerify(cv) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        let peer = driver.scratch.peer_certificate.clone().ok_or(Error::HandshakeFailure("CertificateVerify with no Certificate"))?;
        let transcript_hash = driver.scratch.transcript.hash_excluding_last_message(driver.provider());
        let signed_content = tls13_signature_content(b"TLS 1.3, server CertificateVerify", &transcript_hash);
        driver.provider().verify(&peer.public_key, cv.scheme, &signed_content, &cv.signature).await.map_err(|_| {
            Error::HandshakeFailure("server CertificateVerify signature did not verify")
        })?;
        driver.ctx.negotiated_signature_scheme = Some(cv.scheme);
        Ok(Box::new(AwaitServerFinished { schedule: self.schedule, hash: self.hash }))
    }
}

struct AwaitServerFinished {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

#[async_trait]
impl State for AwaitServerFinished {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::Finished(f) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        finish_server_tls13(driver, self.schedule, self.hash, f.0).await
    }
}

/// RFC 8446 §4.4.3: the content actually signed/verified is a fixed 64
/// 0x20-bytes prefix, a context string, a 0x00 separator, and the
/// transcript hash — never the raw transcript hash alone.
fn tls13_signature_content(context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut out = vec![0x20u8; 64];
    out.extend_from_slice(context);
    out.push(0x00);
    out.extend_from_slice(transcript_hash);
    out
}

async fn finish_server_tls13(driver: &mut Driver, mut schedule: Tls13KeySchedule, hash: HashAlgorithm, verify_data: Vec<u8>) -> Result<NextState> {
    let base_key = driver.scratch.secrets.server_handshake_traffic.as_ref().expect("set in continue_tls13").as_bytes().to_vec();
    let transcript_hash = driver.scratch.transcript.hash_excluding_last_message(driver.provider());
    let expected = compute_verify_data_tls13(driver.provider(), hash, &base_key, &transcript_hash);
    if !hitls_crypto::constant_time_eq(&expected, &verify_data) {
        return Err(Error::DecryptError);
    }

    // Client Finished and the application traffic secrets are both derived
    // over the same transcript point — ClientHello...server Finished,
    // inclusive of server Finished but not of the client's own about-to-be-
    // sent Finished (RFC 8446 §4.4.4, §7.1).
    let client_base = driver.scratch.secrets.client_handshake_traffic.as_ref().expect("set in continue_tls13").as_bytes().to_vec();
    let pre_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
    let client_verify_data = compute_verify_data_tls13(driver.provider(), hash, &client_base, &pre_finished_hash);
    driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(client_verify_data))));

    let (c_ap, s_ap, exporter) = schedule.into_application_traffic(driver.provider(), &pre_finished_hash);
    driver.activate_keys(Direction::Write, &c_ap);
    driver.activate_keys(Direction::Read, &s_ap);
    driver.scratch.secrets.client_application_traffic = Some(Secret(c_ap.as_bytes().to_vec()));
    driver.scratch.secrets.server_application_traffic = Some(Secret(s_ap.as_bytes().to_vec()));
    driver.scratch.secrets.exporter_master = Some(Secret(exporter.as_bytes().to_vec()));

    driver.ctx.renegotiation.handshake_count += 1;
    debug!("client: TLS 1.3 handshake complete");
    Ok(Box::new(Connected13 { schedule, hash }))
}

/// `spec.md` ≤1.2 path after a fresh (non-resumed) ServerHello: waits for
/// `Certificate`, then optionally `ServerKeyExchange`, then optionally
/// `CertificateRequest`, then `ServerHelloDone`.
struct AwaitServerCertificate;

#[async_trait]
impl State for AwaitServerCertificate {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::Certificate(cert) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        let chain = cert.entries.into_iter().map(|e| e.data).collect::<Vec<_>>();
        let peer = driver.config.certificate_manager.validate_peer_chain(&chain).map_err(|_| Error::UnknownCa)?;
        driver.scratch.peer_certificate = Some(peer);
        Ok(Box::new(AwaitServerKeyExchangeOrDone { client_cert_requested: false }))
    }
}

struct AwaitServerKeyExchangeOrDone {
    client_cert_requested: bool,
}

#[async_trait]
impl State for AwaitServerKeyExchangeOrDone {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::ServerKeyExchange(ske) => {
                let peer = driver.scratch.peer_certificate.clone().expect("Certificate precedes ServerKeyExchange");
                let mut signed_content = Vec::with_capacity(64 + 64 + 64);
                signed_content.extend_from_slice(&driver.scratch.client_random);
                signed_content.extend_from_slice(&driver.scratch.server_random.expect("set in continue_legacy"));
                signed_content.push(3); // named_curve
                signed_content.extend(ske.params.curve.to_raw().to_be_bytes());
                signed_content.push(ske.params.public.len() as u8);
                signed_content.extend_from_slice(&ske.params.public);
                driver
                    .provider()
                    .verify(&peer.public_key, ske.signed.scheme, &signed_content, &ske.signed.signature)
                    .await
                    .map_err(|_| Error::DecryptError)?;
                driver.ctx.negotiated_group = Some(ske.params.curve);
                driver.scratch.key_exchange.group = Some(ske.params.curve);
                driver.scratch.key_exchange.peer_public = Some(ske.params.public);
                Ok(Box::new(AwaitCertRequestOrDone { client_cert_requested: self.client_cert_requested }))
            }
            HandshakePayload::CertificateRequest(_cr) => {
                Ok(Box::new(AwaitCertRequestOrDone { client_cert_requested: true }))
            }
            HandshakePayload::ServerHelloDone => finish_client_key_exchange(driver, self.client_cert_requested).await,
            other => Err(unexpected(other.handshake_type())),
        }
    }
}

struct AwaitCertRequestOrDone {
    client_cert_requested: bool,
}

#[async_trait]
impl State for AwaitCertRequestOrDone {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::CertificateRequest(_cr) => {
                Ok(Box::new(AwaitCertRequestOrDone { client_cert_requested: true }))
            }
            HandshakePayload::ServerHelloDone => finish_client_key_exchange(driver, self.client_cert_requested).await,
            other => Err(unexpected(other.handshake_type())),
        }
    }
}

async fn finish_client_key_exchange(driver: &mut Driver, client_cert_requested: bool) -> Result<NextState> {
    let suite = driver.ctx.negotiated_cipher_suite.and_then(find_suite).ok_or(Error::NoSharedCipher)?;
    let hash = hash_for_suite(suite.suite);

    if client_cert_requested {
        // No client certificate configured for this connection: send an
        // empty Certificate message (RFC 5246 §7.4.6), never abort the
        // handshake solely because client auth was requested.
        driver.send(&handshake_message(HandshakePayload::Certificate(
            hitls_core::msgs::handshake::CertificatePayload { is_tls13: false, ..Default::default() },
        )));
    }

    let pre_master_secret = match suite.kx {
        KeyExchangeKind::Rsa => {
            let mut pms = vec![0u8; 48];
            driver.provider().random(&mut pms)?;
            let version = driver.ctx.negotiated_version.expect("negotiated before key exchange");
            pms[0..2].copy_from_slice(&version.to_raw().to_be_bytes());
            let _peer = driver.scratch.peer_certificate.clone().ok_or(Error::CertificateRequired)?;
            // No client-side RSA-encrypt primitive in this core's crypto contract
            // (only the server's constant-time decrypt path is modeled).
            driver.send(&handshake_message(HandshakePayload::ClientKeyExchange(ClientKeyExchangePayload::Rsa(pms.clone()))));
            pms
        }
        KeyExchangeKind::EcdheRsa | KeyExchangeKind::EcdheEcdsa | KeyExchangeKind::EccSm2 => {
            let group = driver.scratch.key_exchange.group.ok_or(Error::NoSharedGroup)?;
            let pair = driver.provider().generate_key_share(group).await?;
            driver.scratch.key_exchange.local_public = Some(pair.public.clone());
            driver.scratch.key_exchange.local_handle = Some(pair.handle);
            let peer_public = driver.scratch.key_exchange.peer_public.clone().ok_or(Error::HandshakeFailure("no ServerKeyExchange public point"))?;
            let shared = driver.provider().key_exchange(group, pair.handle, &peer_public).await?;
            let msg = if driver.ctx.negotiated_version == Some(ProtocolVersion::TLCPv1_1) {
                ClientKeyExchangePayload::TlcpEcdh { curve: group, point: pair.public }
            } else {
                ClientKeyExchangePayload::Ecdh(pair.public)
            };
            driver.send(&handshake_message(HandshakePayload::ClientKeyExchange(msg)));
            shared.0
        }
        KeyExchangeKind::Tls13 => unreachable!("TLS 1.3 suites never reach the ≤1.2 key exchange path"),
    };

    let client_random = driver.scratch.client_random;
    let server_random = driver.scratch.server_random.expect("set in continue_legacy");
    let session_hash = if driver.ctx.extended_master_secret {
        Some(driver.scratch.transcript.current_hash(driver.provider()))
    } else {
        None
    };
    let master_secret = master_secret_tls12(driver.provider(), hash, &pre_master_secret, &client_random, &server_random, session_hash.as_deref());
    driver.scratch.secrets.master_secret_tls12 = Some(master_secret.clone());

    // No private key configured client-side: an empty Certificate chain
    // never needs a CertificateVerify.

    driver.record.send_change_cipher_spec();
    let write_secret = Secret(master_secret.clone());
    driver.activate_keys(Direction::Write, &write_secret);

    let client_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
    let client_verify_data = compute_verify_data_tls12(driver.provider(), hash, &master_secret, b"client finished", &client_finished_hash);
    driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(client_verify_data.clone()))));

    driver.ctx.renegotiation.last_verify_data.clear();
    driver.ctx.renegotiation.last_verify_data.extend_from_slice(&client_verify_data);

    Ok(Box::new(AwaitChangeCipherSpecAndFinished { master_secret, resumed: false }))
}

/// Waiting for the server's `ChangeCipherSpec` + `Finished`, both on the
/// abbreviated (resumed) and full handshake paths.
struct AwaitChangeCipherSpecAndFinished {
    master_secret: Vec<u8>,
    resumed: bool,
}

#[async_trait]
impl State for AwaitChangeCipherSpecAndFinished {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::Finished(f) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        let suite = driver.ctx.negotiated_cipher_suite.and_then(find_suite).ok_or(Error::NoSharedCipher)?;
        let hash = hash_for_suite(suite.suite);

        if self.resumed {
            let read_secret = Secret(self.master_secret.clone());
            driver.activate_keys(Direction::Read, &read_secret);
        }

        let server_finished_hash = driver.scratch.transcript.hash_excluding_last_message(driver.provider());
        let expected = compute_verify_data_tls12(driver.provider(), hash, &self.master_secret, b"server finished", &server_finished_hash);
        if !hitls_crypto::constant_time_eq(&expected, &f.0) {
            return Err(Error::DecryptError);
        }

        if self.resumed {
            driver.record.send_change_cipher_spec();
            let write_secret = Secret(self.master_secret.clone());
            driver.activate_keys(Direction::Write, &write_secret);
            let client_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
            let client_verify_data = compute_verify_data_tls12(driver.provider(), hash, &self.master_secret, b"client finished", &client_finished_hash);
            driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(client_verify_data.clone()))));
            driver.ctx.renegotiation.last_verify_data.clear();
            driver.ctx.renegotiation.last_verify_data.extend_from_slice(&client_verify_data);
        } else {
            driver.ctx.renegotiation.last_verify_data.extend_from_slice(&f.0);
        }

        driver.ctx.renegotiation.secure_renegotiation_supported = true;
        driver.ctx.renegotiation.handshake_count += 1;
        debug!("client: TLS <=1.2 handshake complete (resumed={})", self.resumed);
        Ok(Box::new(ConnectedLegacy))
    }
}

/// Terminal TLS 1.3 state: handles `NewSessionTicket` and `KeyUpdate`
/// directly rather than folding them into a shared dispatch arm (Design
/// Notes / SPEC_FULL.md supplemented feature #3: dedicated post-handshake
/// entry points).
struct Connected13 {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

impl Connected13 {
    fn handle_new_session_ticket(&self, driver: &mut Driver, ticket: hitls_core::msgs::handshake::NewSessionTicketPayload) -> Result<()> {
        if driver.scratch.secrets.resumption_master.is_none() {
            let transcript_hash = driver.scratch.transcript.current_hash(driver.provider());
            let rm = self.schedule.resumption_master_secret(driver.provider(), &transcript_hash);
            driver.scratch.secrets.resumption_master = Some(rm);
        }
        let resumption_master = driver.scratch.secrets.resumption_master.as_ref().expect("just set").as_bytes().to_vec();

        let nonce_derived = driver.provider().hkdf_expand_label(self.hash, &resumption_master, b"resumption", &ticket.nonce, self.hash.output_len())?;
        let session = Session {
            version: driver.ctx.negotiated_version.expect("tls13 connected"),
            cipher_suite: driver.ctx.negotiated_cipher_suite.expect("tls13 connected"),
            master_secret: nonce_derived.as_bytes().to_vec(),
            session_id: Vec::new(),
            ticket: Some(ticket.ticket),
            sni: driver.ctx.sni.clone(),
            extended_master_secret: true,
            creation_time: std::time::SystemTime::now(),
            lifetime: std::time::Duration::from_secs(ticket.lifetime_hint as u64),
            ticket_age_add: ticket.ticket_age_add.unwrap_or(0),
        };
        driver.ctx.active_session = Some(Arc::new(session.clone()));
        driver.config.session_cache.insert(session);
        Ok(())
    }

    fn handle_key_update(&mut self, driver: &mut Driver, update: hitls_core::msgs::handshake::KeyUpdatePayload) -> Result<()> {
        let current = driver.scratch.secrets.server_application_traffic.as_ref().expect("connected").clone();
        let next = ratchet_traffic_secret(driver.provider(), self.hash, &current);
        driver.activate_keys(Direction::Read, &next);
        driver.scratch.secrets.server_application_traffic = Some(next);
        if update.0 == hitls_core::msgs::handshake::KeyUpdateRequest::UpdateRequested {
            let current = driver.scratch.secrets.client_application_traffic.as_ref().expect("connected").clone();
            let next = ratchet_traffic_secret(driver.provider(), self.hash, &current);
            driver.send(&handshake_message(HandshakePayload::KeyUpdate(hitls_core::msgs::handshake::KeyUpdatePayload(
                hitls_core::msgs::handshake::KeyUpdateRequest::UpdateNotRequested,
            ))));
            driver.activate_keys(Direction::Write, &next);
            driver.scratch.secrets.client_application_traffic = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl State for Connected13 {
    async fn handle(mut self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::NewSessionTicket(ticket) => {
                self.handle_new_session_ticket(driver, ticket)?;
                Ok(self)
            }
            HandshakePayload::KeyUpdate(update) => {
                self.handle_key_update(driver, update)?;
                Ok(self)
            }
            HandshakePayload::CertificateRequest(_cr) => {
                // Post-handshake client auth (RFC 8446 §4.6.2): no client
                // certificate configured, reply with an empty chain.
                driver.ctx.post_handshake_auth = crate::context::PostHandshakeAuthState::Requested;
                driver.send(&handshake_message(HandshakePayload::Certificate(
                    hitls_core::msgs::handshake::CertificatePayload { is_tls13: true, ..Default::default() },
                )));
                driver.ctx.post_handshake_auth = crate::context::PostHandshakeAuthState::Completed;
                Ok(self)
            }
            other => Err(unexpected(other.handshake_type())),
        }
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Terminal ≤1.2/TLCP state: a `HelloRequest` invites renegotiation, which
/// this core always refuses unless secure renegotiation was already
/// confirmed (`spec.md` §4.5 invariant).
struct ConnectedLegacy;

impl ConnectedLegacy {
    fn handle_renegotiation_request(&self, driver: &mut Driver) -> Result<()> {
        if !driver.ctx.may_renegotiate() {
            return Err(Error::HandshakeFailure("refusing renegotiation: secure renegotiation was not established"));
        }
        Ok(())
    }
}

#[async_trait]
impl State for ConnectedLegacy {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::HelloRequest => {
                self.handle_renegotiation_request(driver)?;
                Ok(self)
            }
            other => Err(unexpected(other.handshake_type())),
        }
    }

    fn is_connected(&self) -> bool {
        true
    }
}
