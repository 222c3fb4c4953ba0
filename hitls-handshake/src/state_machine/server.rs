//! Server-side handshake state table (`spec.md` §4.5). Mirrors `client.rs`'s
//! typestate chain; the two share `common.rs` but otherwise don't call into
//! each other. Grounded on `eloff-rustls`'s `rustls/src/server/hs.rs`
//! `ExpectClientHello` / `ExpectCertificate` chain, generalized across the
//! TLS 1.3, ≤1.2, TLCP, and DTLS branches this core supports.

use std::time::SystemTime;

use async_trait::async_trait;
use log::{debug, trace, warn};

use hitls_core::msgs::enums::{
    CipherSuite, CompressionMethod as WireCompressionMethod, ContentType, ExtensionType, HandshakeType, ProtocolVersion,
};
use hitls_core::msgs::handshake::{
    CertificateEntry, CertificatePayload, DigitallySigned, EncryptedExtensionsPayload,
    Extensions, ExtensionPayload, HandshakeMessagePayload, HandshakePayload, HelloVerifyRequestPayload, KeyShareEntry,
    NewSessionTicketPayload, PresharedKeyExtension, Random, ServerEcdhParams, ServerHelloPayload,
    ServerKeyExchangePayload, SessionId,
};
use hitls_core::msgs::message::Message;
use hitls_core::suites::{find_suite, KeyExchangeKind, SupportedCipherSuite};
use hitls_crypto::{constant_time_eq, HashAlgorithm, Secret};

use crate::cert::KeyKind;
use crate::error::{Error, Result, StepResult};
use crate::extensions::server::{
    cert_kind_fits_kx, check_renegotiation_info, negotiate_ems, negotiate_etm, select_cipher_suite, select_group,
    select_signature_scheme,
};
use crate::extensions::negotiate_version;
use crate::key_schedule::{master_secret_tls12, Tls13KeySchedule};
use crate::record::Direction;
use crate::session::Session;
use crate::state_machine::common::{ratchet_traffic_secret, rsa_decrypt_pms_constant_time, verify_psk_binder};
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

/// RFC 8446 §4.4.3 content wrapper, identical to the client's helper — kept
/// as a private copy rather than shared, since the two sides use distinct
/// context strings and this core has no shared "signing" module to put it in.
fn tls13_signature_content(context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut out = vec![0x20u8; 64];
    out.extend_from_slice(context);
    out.push(0x00);
    out.extend_from_slice(transcript_hash);
    out
}

/// Public entry point: the server side never sends anything before it has
/// seen a `ClientHello`, so `start` just parks in `AwaitClientHello`.
pub struct ServerHandshake {
    driver: Driver,
    state: Option<NextState>,
}

impl ServerHandshake {
    pub fn start(driver: Driver) -> Self {
        ServerHandshake { driver, state: Some(Box::new(AwaitClientHello)) }
    }

    fn kx_is_rsa(&self) -> Option<bool> {
        self.driver
            .ctx
            .negotiated_cipher_suite
            .and_then(find_suite)
            .map(|s| matches!(s.kx, KeyExchangeKind::Rsa))
    }

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
                trace!("server: received {:?}", kind);
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
            ContentType::ChangeCipherSpec => {
                self.driver.scratch.ccs_seen += 1;
                if self.driver.scratch.ccs_seen > 1 {
                    return Err(self.driver.fail(Error::HandshakeFailure("unexpected second plaintext ChangeCipherSpec")));
                }
                Ok(StepResult::Progress)
            }
            ContentType::Alert => {
                warn!("server: received alert record");
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

/// Computes the RFC 6347 §4.2.1 stateless cookie: `HMAC(cookie_key,
/// client_random || session_id || cipher_suites || compression_methods)`,
/// i.e. everything in `ClientHello` that the server can recompute without
/// holding state between the two datagrams.
fn compute_dtls_cookie(driver: &Driver, ch: &hitls_core::msgs::handshake::ClientHelloPayload) -> Option<Vec<u8>> {
    let key = driver.config.cookie_key.as_ref()?;
    let mut input = Vec::new();
    input.extend_from_slice(&ch.random.0);
    input.extend_from_slice(&ch.session_id.0);
    for cs in &ch.cipher_suites {
        input.extend_from_slice(&cs.to_raw().to_be_bytes());
    }
    for cm in &ch.compression_methods {
        input.push(cm.to_raw());
    }
    driver.provider().hmac(HashAlgorithm::Sha256, key, &input).ok()
}

/// Waiting for the first (or, on DTLS, the cookie-bearing second)
/// `ClientHello`.
struct AwaitClientHello;

#[async_trait]
impl State for AwaitClientHello {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::ClientHello(ch) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };

        // DTLS stateless cookie exchange (RFC 6347 §4.2.1): if configured and
        // the client hasn't echoed a valid cookie yet, challenge it and wait
        // for a fresh ClientHello rather than committing any server-side
        // state. `cookie` on ClientHello travels as an extension in this
        // core's wire model rather than a dedicated field, matching how the
        // rest of the extension set is threaded through `Extensions`.
        if driver.ctx.negotiated_version.is_none() && driver.config.cookie_key.is_some() {
            let expected = compute_dtls_cookie(driver, &ch);
            let presented = match ch.extensions.get(ExtensionType::Cookie) {
                Some(ExtensionPayload::Cookie(c)) => Some(c.as_slice()),
                _ => None,
            };
            let cookie_ok = match (&expected, presented) {
                (Some(exp), Some(got)) => constant_time_eq(exp, got),
                _ => false,
            };
            if !cookie_ok {
                let cookie = expected.ok_or(Error::InvalidConfig("cookie_key configured but hmac failed"))?;
                debug!("server: issuing HelloVerifyRequest");
                driver.send(&handshake_message(HandshakePayload::HelloVerifyRequest(HelloVerifyRequestPayload {
                    server_version: ProtocolVersion::TLSv1_2,
                    cookie,
                })));
                return Ok(Box::new(AwaitClientHello));
            }
        }

        let client_supported_versions = match ch.extensions.get(ExtensionType::SupportedVersions) {
            Some(ExtensionPayload::SupportedVersions(v)) => Some(v.as_slice()),
            _ => None,
        };
        let negotiated_version = negotiate_version(
            client_supported_versions,
            ch.client_version,
            driver.ctx.configured_versions.min,
            driver.ctx.configured_versions.max,
        )
        .ok_or(Error::UnsupportedVersion)?;
        driver.ctx.negotiated_version = Some(negotiated_version);

        let saved_verify_data = driver.ctx.renegotiation.last_verify_data.clone();
        check_renegotiation_info(&ch, &saved_verify_data)?;

        if let Some(ExtensionPayload::ServerName(name)) = ch.extensions.get(ExtensionType::ServerName) {
            driver.ctx.sni = Some(name.clone());
        }

        let client_groups = match ch.extensions.get(ExtensionType::SupportedGroups) {
            Some(ExtensionPayload::SupportedGroups(g)) => g.clone(),
            _ => Vec::new(),
        };
        let client_schemes = match ch.extensions.get(ExtensionType::SignatureAlgorithms) {
            Some(ExtensionPayload::SignatureAlgorithms(s)) => s.clone(),
            _ => Vec::new(),
        };

        if negotiated_version.is_tls13() {
            continue_tls13(driver, ch, client_groups, client_schemes).await
        } else {
            continue_legacy(driver, ch, client_groups, client_schemes).await
        }
    }
}

async fn continue_tls13(
    driver: &mut Driver,
    ch: hitls_core::msgs::handshake::ClientHelloPayload,
    client_groups: Vec<hitls_core::msgs::enums::NamedGroup>,
    client_schemes: Vec<hitls_core::msgs::enums::SignatureScheme>,
) -> Result<NextState> {
    let candidates = driver
        .config
        .tls13_cipher_suites
        .iter()
        .filter_map(|s| find_suite(*s))
        .collect::<Vec<_>>();
    let chosen = select_cipher_suite(&candidates, &ch.cipher_suites, ProtocolVersion::TLSv1_3, true, |_| true)
        .ok_or(Error::NoSharedCipher)?;
    driver.ctx.negotiated_cipher_suite = Some(chosen.suite);
    let hash = hash_for_suite(chosen.suite);
    driver.scratch.transcript.init(hash);

    let client_key_shares = match ch.extensions.get(ExtensionType::KeyShare) {
        Some(ExtensionPayload::KeyShare(entries)) => entries.clone(),
        _ => Vec::new(),
    };
    let group = select_group(&driver.config.groups, &client_groups);

    // RFC 8446 §4.1.2/§4.1.4, `spec.md` §4.5: the second ClientHello must
    // match what the HelloRetryRequest committed the negotiation to exactly;
    // anything else is an active attack or a broken client, never a fresh
    // renegotiation attempt.
    if driver.scratch.hello_retry_requested {
        let expectation = driver
            .scratch
            .hrr_expectation
            .as_ref()
            .ok_or(Error::Internal("hello_retry_requested set without a recorded HrrExpectation"))?;
        if chosen.suite != expectation.cipher_suite {
            return Err(Error::IllegalParameter("second ClientHello changed cipher suite after HelloRetryRequest"));
        }
        if ch.session_id.0 != expectation.session_id {
            return Err(Error::IllegalParameter("second ClientHello changed session_id after HelloRetryRequest"));
        }
        if !client_key_shares.iter().any(|e| e.group == expectation.group) {
            return Err(Error::IllegalParameter("second ClientHello did not key-share the HelloRetryRequest's selected group"));
        }
    }

    // PSK offer processing: match identities against the configured external
    // PSK store and the session cache (ticket), first-match order as the
    // client sent them (RFC 8446 §4.2.11).
    let psk_offer = match ch.extensions.get(ExtensionType::PreSharedKey) {
        Some(ExtensionPayload::PreSharedKey(PresharedKeyExtension::Offer { identities, binders })) => {
            Some((identities.clone(), binders.clone()))
        }
        _ => None,
    };

    let mut selected_psk: Option<(u16, Vec<u8>, bool)> = None; // (index, secret, is_external)
    if let Some((identities, binders)) = &psk_offer {
        for (idx, identity) in identities.iter().enumerate() {
            if let Some(store) = &driver.config.psk_store {
                if let Some(ext_psk) = store.find(&identity.identity) {
                    selected_psk = Some((idx as u16, ext_psk.secret, true));
                    break;
                }
            }
            if selected_psk.is_none() {
                if let Some(ticket_crypter) = &driver.config.ticket_crypter {
                    if let Some((session, _renew)) = ticket_crypter.decrypt_ticket(driver.provider(), &identity.identity, SystemTime::now()) {
                        if session.is_valid_at(SystemTime::now()) && session.version.is_tls13() {
                            selected_psk = Some((idx as u16, session.master_secret.clone(), false));
                            break;
                        }
                    }
                }
            }
        }
        if let Some((idx, secret, is_external)) = &selected_psk {
            let truncated = ch.encode_truncated().ok_or(Error::IllegalParameter("ClientHello has no PreSharedKey extension to truncate"))?;
            let truncated_hash = driver.provider().hash(hash, &truncated)?;
            let schedule = Tls13KeySchedule::new(driver.provider(), hash, Some(secret));
            let binder_key = schedule.binder_key(driver.provider(), *is_external);
            let received_binder = binders.get(*idx as usize).ok_or(Error::IllegalParameter("psk binder list shorter than identity list"))?;
            verify_psk_binder(driver.provider(), hash, &binder_key, &truncated_hash, received_binder)?;
        }
    }

    // Group selection failed but the client could retry with a different
    // key_share: issue a HelloRetryRequest rather than failing outright, as
    // long as some mutually supported group exists at all.
    let peer_entry = group.and_then(|g| client_key_shares.iter().find(|e| e.group == g).cloned());
    if group.is_some() && peer_entry.is_none() {
        let retry_group = group.expect("checked Some above");
        if !driver.scratch.hello_retry_requested {
            driver.scratch.hrr_expectation = Some(crate::scratch::HrrExpectation {
                cipher_suite: chosen.suite,
                session_id: ch.session_id.0.clone(),
                group: retry_group,
            });
            return send_hello_retry_request(driver, chosen.suite, retry_group, ch).await;
        }
        return Err(Error::HandshakeFailure("client did not key-share the regenerated group after HelloRetryRequest"));
    }

    driver.ctx.negotiated_group = group;

    let dhe_secret = match (peer_entry, group) {
        (Some(entry), Some(g)) => {
            let pair = driver.provider().generate_key_share(g).await?;
            let shared = driver.provider().key_exchange(g, pair.handle, &entry.payload).await?;
            driver.scratch.key_exchange.group = Some(g);
            driver.scratch.key_exchange.local_public = Some(pair.public.clone());
            driver.scratch.key_exchange.local_handle = Some(pair.handle);
            Some((pair.public, shared.0))
        }
        _ if selected_psk.is_some() => None, // PSK-only mode, no (EC)DHE component
        _ => return Err(Error::NoSharedGroup),
    };

    driver.scratch.first_client_hello = Some(ch.clone());

    let mut sh_extensions = Extensions::new();
    sh_extensions.push(ExtensionPayload::SupportedVersions(vec![ProtocolVersion::TLSv1_3]));
    if let Some((server_public, _)) = &dhe_secret {
        let g = group.expect("dhe_secret implies group");
        sh_extensions.push(ExtensionPayload::KeyShare(vec![KeyShareEntry { group: g, payload: server_public.clone() }]));
    }
    if let Some((idx, _, _)) = &selected_psk {
        sh_extensions.push(ExtensionPayload::PreSharedKey(PresharedKeyExtension::Selected(*idx)));
    }

    let mut server_random = [0u8; 32];
    driver.provider().random(&mut server_random)?;
    let sh = ServerHelloPayload {
        legacy_version: ProtocolVersion::TLSv1_2,
        random: Random(server_random),
        session_id: ch.session_id.clone(),
        cipher_suite: chosen.suite,
        compression_method: WireCompressionMethod::Null,
        extensions: sh_extensions,
    };
    driver.scratch.server_random = Some(server_random);
    debug!("server: sending ServerHello (TLS 1.3)");
    driver.send(&handshake_message(HandshakePayload::ServerHello(sh)));

    let dhe_bytes = dhe_secret.map(|(_, s)| s).unwrap_or_else(|| vec![0u8; hash.output_len()]);
    let psk_secret = selected_psk.as_ref().map(|(_, secret, _)| secret.clone());
    let mut schedule = Tls13KeySchedule::new(driver.provider(), hash, psk_secret.as_deref());

    let ch_sh_hash = driver.scratch.transcript.current_hash(driver.provider());
    let (c_hs, s_hs) = schedule.into_handshake_traffic(driver.provider(), &dhe_bytes, &ch_sh_hash);
    driver.activate_keys(Direction::Write, &s_hs);
    driver.activate_keys(Direction::Read, &c_hs);
    driver.scratch.secrets.client_handshake_traffic = Some(Secret(c_hs.as_bytes().to_vec()));
    driver.scratch.secrets.server_handshake_traffic = Some(Secret(s_hs.as_bytes().to_vec()));

    let alpn_selected = match ch.extensions.get(ExtensionType::Alpn) {
        Some(ExtensionPayload::Alpn(offered)) => {
            driver.config.alpn_selector.as_ref().and_then(|sel| sel.select(offered))
        }
        _ => None,
    };
    driver.ctx.negotiated_alpn = alpn_selected.clone();

    let mut ee_extensions = Extensions::new();
    if let Some(proto) = &alpn_selected {
        ee_extensions.push(ExtensionPayload::Alpn(vec![proto.clone()]));
    }
    driver.send(&handshake_message(HandshakePayload::EncryptedExtensions(EncryptedExtensionsPayload {
        extensions: ee_extensions,
    })));

    if selected_psk.is_some() {
        // Resumption handshake: no Certificate/CertificateVerify round, go
        // straight to the server's Finished.
        return send_server_finished_tls13(driver, schedule, hash).await;
    }

    let local = driver
        .config
        .certificate_resolver
        .as_ref()
        .and_then(|r| r.resolve(driver.ctx.sni.as_deref(), &client_schemes))
        .or_else(|| driver.config.certificate_manager.select_certificate(&client_schemes))
        .ok_or(Error::HandshakeFailure("no certificate configured for any offered signature scheme"))?;

    let entries = local.chain.into_iter().map(|data| CertificateEntry { data, extensions: Extensions::new() }).collect();
    driver.send(&handshake_message(HandshakePayload::Certificate(CertificatePayload {
        certificate_request_context: Vec::new(),
        entries,
        is_tls13: true,
    })));

    let scheme = select_signature_scheme(&driver.config.signature_schemes, &client_schemes, local.key_kind)
        .ok_or(Error::HandshakeFailure("no shared signature scheme for the selected certificate"))?;
    let transcript_hash = driver.scratch.transcript.current_hash(driver.provider());
    let signed_content = tls13_signature_content(b"TLS 1.3, server CertificateVerify", &transcript_hash);
    let signature = driver.provider().sign(local.key_handle, scheme, &signed_content).await?;
    driver.send(&handshake_message(HandshakePayload::CertificateVerify(DigitallySigned { scheme, signature })));
    driver.ctx.negotiated_signature_scheme = Some(scheme);

    send_server_finished_tls13(driver, schedule, hash).await
}

async fn send_hello_retry_request(
    driver: &mut Driver,
    chosen_suite: CipherSuite,
    retry_group: hitls_core::msgs::enums::NamedGroup,
    ch: hitls_core::msgs::handshake::ClientHelloPayload,
) -> Result<NextState> {
    driver.scratch.transcript.rewrite_for_hrr(driver.provider());
    driver.scratch.hello_retry_requested = true;

    let mut hrr_extensions = Extensions::new();
    hrr_extensions.push(ExtensionPayload::SupportedVersions(vec![ProtocolVersion::TLSv1_3]));
    hrr_extensions.push(ExtensionPayload::KeyShareHelloRetryRequest(retry_group));
    let hrr = ServerHelloPayload {
        legacy_version: ProtocolVersion::TLSv1_2,
        random: Random(Random::HRR_SENTINEL),
        session_id: ch.session_id,
        cipher_suite: chosen_suite,
        compression_method: WireCompressionMethod::Null,
        extensions: hrr_extensions,
    };
    debug!("server: sending HelloRetryRequest");
    driver.send(&handshake_message(HandshakePayload::ServerHello(hrr)));
    Ok(Box::new(AwaitClientHello))
}

async fn send_server_finished_tls13(driver: &mut Driver, mut schedule: Tls13KeySchedule, hash: HashAlgorithm) -> Result<NextState> {
    let base_key = driver.scratch.secrets.server_handshake_traffic.as_ref().expect("set in continue_tls13").as_bytes().to_vec();
    let transcript_hash = driver.scratch.transcript.current_hash(driver.provider());
    let verify_data = compute_verify_data_tls13(driver.provider(), hash, &base_key, &transcript_hash);
    driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(verify_data))));

    // The application traffic secrets and the soon-to-be-checked client
    // Finished are both derived over this same point — ClientHello...server
    // Finished — symmetric to the client side's `finish_server_tls13`.
    let post_server_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
    let (c_ap, s_ap, exporter) = schedule.into_application_traffic(driver.provider(), &post_server_finished_hash);
    driver.activate_keys(Direction::Read, &c_ap);
    driver.activate_keys(Direction::Write, &s_ap);
    driver.scratch.secrets.client_application_traffic = Some(Secret(c_ap.as_bytes().to_vec()));
    driver.scratch.secrets.server_application_traffic = Some(Secret(s_ap.as_bytes().to_vec()));
    driver.scratch.secrets.exporter_master = Some(Secret(exporter.as_bytes().to_vec()));

    Ok(Box::new(AwaitClientFinished13 { schedule, hash }))
}

/// Waiting for the client's TLS 1.3 Finished (post-handshake client auth is
/// never requested by this implementation on the server-initiated path, so
/// there is no `CertificateRequest` wait state here — only resumption and
/// full handshakes, both of which end at the client's Finished).
struct AwaitClientFinished13 {
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

#[async_trait]
impl State for AwaitClientFinished13 {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::Finished(f) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        let base_key = driver.scratch.secrets.client_handshake_traffic.as_ref().expect("set in continue_tls13").as_bytes().to_vec();
        let transcript_hash = driver.scratch.transcript.hash_excluding_last_message(driver.provider());
        let expected = compute_verify_data_tls13(driver.provider(), self.hash, &base_key, &transcript_hash);
        if !constant_time_eq(&expected, &f.0) {
            return Err(Error::DecryptError);
        }

        driver.ctx.renegotiation.handshake_count += 1;
        debug!("server: TLS 1.3 handshake complete");

        if driver.config.enable_session_tickets {
            if let Some(crypter) = driver.config.ticket_crypter.clone() {
                let resumption_hash = driver.scratch.transcript.current_hash(driver.provider());
                let resumption_master = self.schedule.resumption_master_secret(driver.provider(), &resumption_hash);
                issue_new_session_ticket(driver, &crypter, &resumption_master)?;
            }
        }

        Ok(Box::new(Connected13Server { schedule: self.schedule, hash: self.hash }))
    }
}

fn issue_new_session_ticket(driver: &mut Driver, crypter: &crate::session::TicketCrypter, resumption_master: &Secret) -> Result<()> {
    let hash = driver.ctx.negotiated_cipher_suite.map(hash_for_suite).unwrap_or(HashAlgorithm::Sha256);
    let mut nonce = vec![0u8; 8];
    driver.provider().random(&mut nonce)?;
    let psk = driver.provider().hkdf_expand_label(hash, resumption_master.as_bytes(), b"resumption", &nonce, hash.output_len())?;
    let mut ticket_age_add = [0u8; 4];
    driver.provider().random(&mut ticket_age_add)?;
    let ticket_age_add = u32::from_be_bytes(ticket_age_add);

    let lifetime = std::time::Duration::from_secs(7200);
    let session = Session {
        version: driver.ctx.negotiated_version.expect("tls13 connected"),
        cipher_suite: driver.ctx.negotiated_cipher_suite.expect("tls13 connected"),
        master_secret: psk.as_bytes().to_vec(),
        session_id: Vec::new(),
        ticket: None,
        sni: driver.ctx.sni.clone(),
        extended_master_secret: true,
        creation_time: SystemTime::now(),
        lifetime,
        ticket_age_add,
    };
    let Some(ticket_blob) = crypter.encrypt_ticket(driver.provider(), &session) else { return Ok(()) };

    driver.send(&handshake_message(HandshakePayload::NewSessionTicket(NewSessionTicketPayload {
        lifetime_hint: lifetime.as_secs() as u32,
        ticket_age_add: Some(ticket_age_add),
        nonce,
        ticket: ticket_blob,
        extensions: Extensions::new(),
    })));
    Ok(())
}

/// Terminal TLS 1.3 state: mirrors `Connected13`'s server-initiated
/// `KeyUpdate` and post-handshake client-auth request handling.
struct Connected13Server {
    #[allow(dead_code)]
    schedule: Tls13KeySchedule,
    hash: HashAlgorithm,
}

impl Connected13Server {
    fn handle_key_update(&mut self, driver: &mut Driver, update: hitls_core::msgs::handshake::KeyUpdatePayload) -> Result<()> {
        let current = driver.scratch.secrets.client_application_traffic.as_ref().expect("connected").clone();
        let next = ratchet_traffic_secret(driver.provider(), self.hash, &current);
        driver.activate_keys(Direction::Read, &next);
        driver.scratch.secrets.client_application_traffic = Some(next);
        if update.0 == hitls_core::msgs::handshake::KeyUpdateRequest::UpdateRequested {
            let current = driver.scratch.secrets.server_application_traffic.as_ref().expect("connected").clone();
            let next = ratchet_traffic_secret(driver.provider(), self.hash, &current);
            driver.send(&handshake_message(HandshakePayload::KeyUpdate(hitls_core::msgs::handshake::KeyUpdatePayload(
                hitls_core::msgs::handshake::KeyUpdateRequest::UpdateNotRequested,
            ))));
            driver.activate_keys(Direction::Write, &next);
            driver.scratch.secrets.server_application_traffic = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl State for Connected13Server {
    async fn handle(mut self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        match message.payload.payload {
            HandshakePayload::KeyUpdate(update) => {
                self.handle_key_update(driver, update)?;
                Ok(self)
            }
            HandshakePayload::Certificate(_) => {
                // A reply to a post-handshake CertificateRequest this
                // endpoint never sends; accepted only if previously
                // requested (tracked via `post_handshake_auth`).
                if driver.ctx.post_handshake_auth != crate::context::PostHandshakeAuthState::Requested {
                    return Err(Error::UnexpectedMessage(HandshakeType::Certificate));
                }
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

/// ≤1.2/TLCP path: cipher suite / group / signature-scheme selection,
/// session resumption lookup, then the `Certificate`/`ServerKeyExchange`/
/// `CertificateRequest`/`ServerHelloDone` flight.
async fn continue_legacy(
    driver: &mut Driver,
    ch: hitls_core::msgs::handshake::ClientHelloPayload,
    client_groups: Vec<hitls_core::msgs::enums::NamedGroup>,
    client_schemes: Vec<hitls_core::msgs::enums::SignatureScheme>,
) -> Result<NextState> {
    let negotiated_version = driver.ctx.negotiated_version.expect("set by AwaitClientHello");
    let candidates: Vec<&'static SupportedCipherSuite> = driver
        .config
        .legacy_cipher_suites
        .iter()
        .filter_map(|s| find_suite(*s))
        .filter(|s| s.usable_for_version(negotiated_version))
        .collect();

    // Session resumption: only honor a cached session whose stored version
    // equals the version just negotiated (SPEC_FULL.md supplemented
    // feature — version confusion across a resumed session is refused
    // rather than silently renegotiated to the cached version).
    let resumed_session = driver.config.session_cache.find(&ch.session_id.0).filter(|s| s.version == negotiated_version);

    let client_offered_ems = ch.extensions.contains(ExtensionType::ExtendedMasterSecret);
    let client_offered_etm = ch.extensions.contains(ExtensionType::EncryptThenMac);

    if let Some(session) = resumed_session {
        let chosen = find_suite(session.cipher_suite).ok_or(Error::NoSharedCipher)?;
        if !ch.cipher_suites.contains(&chosen.suite) {
            return Err(Error::HandshakeFailure("resumed session's cipher suite not offered"));
        }
        driver.ctx.negotiated_cipher_suite = Some(chosen.suite);
        let hash = hash_for_suite(chosen.suite);
        driver.scratch.transcript.init(hash);

        let ems = negotiate_ems(false, client_offered_ems, Some(session.extended_master_secret))?;
        driver.ctx.extended_master_secret = ems;
        let etm = negotiate_etm(client_offered_etm, chosen.bulk, None)?;
        driver.ctx.encrypt_then_mac = etm;

        let mut sh_extensions = Extensions::new();
        if ems {
            sh_extensions.push(ExtensionPayload::ExtendedMasterSecret);
        }
        if etm {
            sh_extensions.push(ExtensionPayload::EncryptThenMac);
        }
        sh_extensions.push(ExtensionPayload::RenegotiationInfo(driver.ctx.renegotiation.last_verify_data.clone()));

        let mut server_random = [0u8; 32];
        driver.provider().random(&mut server_random)?;
        driver.scratch.server_random = Some(server_random);
        let sh = ServerHelloPayload {
            legacy_version: negotiated_version,
            random: Random(server_random),
            session_id: SessionId(session.session_id.clone()),
            cipher_suite: chosen.suite,
            compression_method: WireCompressionMethod::Null,
            extensions: sh_extensions,
        };
        debug!("server: sending ServerHello (resumed session)");
        driver.send(&handshake_message(HandshakePayload::ServerHello(sh)));

        driver.ctx.resumption.resumed = true;
        driver.ctx.active_session = Some(session.clone());

        driver.record.send_change_cipher_spec();
        let write_secret = Secret(session.master_secret.clone());
        driver.activate_keys(Direction::Write, &write_secret);

        let server_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
        let verify_data = compute_verify_data_tls12(driver.provider(), hash, &session.master_secret, b"server finished", &server_finished_hash);
        driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(verify_data))));

        return Ok(Box::new(AwaitClientFinishedLegacy { master_secret: session.master_secret.clone(), resumed: true }));
    }

    // Certificate-kind availability is checked once the certificate is
    // resolved below, not during suite selection: `select_cipher_suite`
    // picks by version/client-offer only, and the certificate lookup fails
    // the handshake outright if the negotiated suite's key kind isn't
    // actually available.
    let chosen = select_cipher_suite(&candidates, &ch.cipher_suites, negotiated_version, true, |_| true)
        .ok_or(Error::NoSharedCipher)?;
    driver.ctx.negotiated_cipher_suite = Some(chosen.suite);
    let hash = hash_for_suite(chosen.suite);
    driver.scratch.transcript.init(hash);

    let ems = negotiate_ems(false, client_offered_ems, None)?;
    driver.ctx.extended_master_secret = ems;
    let etm = negotiate_etm(client_offered_etm, chosen.bulk, None)?;
    driver.ctx.encrypt_then_mac = etm;

    let mut sh_extensions = Extensions::new();
    if ems {
        sh_extensions.push(ExtensionPayload::ExtendedMasterSecret);
    }
    if etm {
        sh_extensions.push(ExtensionPayload::EncryptThenMac);
    }
    sh_extensions.push(ExtensionPayload::RenegotiationInfo(driver.ctx.renegotiation.last_verify_data.clone()));

    let mut new_session_id = vec![0u8; 32];
    driver.provider().random(&mut new_session_id)?;

    let mut server_random = [0u8; 32];
    driver.provider().random(&mut server_random)?;
    driver.scratch.server_random = Some(server_random);
    let sh = ServerHelloPayload {
        legacy_version: negotiated_version,
        random: Random(server_random),
        session_id: SessionId(new_session_id.clone()),
        cipher_suite: chosen.suite,
        compression_method: WireCompressionMethod::Null,
        extensions: sh_extensions,
    };
    debug!("server: sending ServerHello");
    driver.send(&handshake_message(HandshakePayload::ServerHello(sh)));

    let key_kind_needed = |kind: KeyKind| cert_kind_fits_kx(kind, chosen.kx);
    let local = driver
        .config
        .certificate_resolver
        .as_ref()
        .and_then(|r| r.resolve(driver.ctx.sni.as_deref(), &client_schemes))
        .or_else(|| driver.config.certificate_manager.select_certificate(&client_schemes))
        .filter(|l| key_kind_needed(l.key_kind))
        .ok_or(Error::HandshakeFailure("no certificate configured for the negotiated cipher suite"))?;

    let entries = local.chain.clone().into_iter().map(|data| CertificateEntry { data, extensions: Extensions::new() }).collect();
    driver.send(&handshake_message(HandshakePayload::Certificate(CertificatePayload {
        certificate_request_context: Vec::new(),
        entries,
        is_tls13: false,
    })));

    let kx_secret = match chosen.kx {
        KeyExchangeKind::Rsa => None,
        KeyExchangeKind::EcdheRsa | KeyExchangeKind::EcdheEcdsa | KeyExchangeKind::EccSm2 => {
            let group = select_group(&driver.config.groups, &client_groups).ok_or(Error::NoSharedGroup)?;
            let pair = driver.provider().generate_key_share(group).await?;
            driver.scratch.key_exchange.group = Some(group);
            driver.scratch.key_exchange.local_public = Some(pair.public.clone());
            driver.scratch.key_exchange.local_handle = Some(pair.handle);

            let scheme = select_signature_scheme(&driver.config.signature_schemes, &client_schemes, local.key_kind)
                .ok_or(Error::HandshakeFailure("no shared signature scheme for ServerKeyExchange"))?;
            let mut signed_content = Vec::with_capacity(64 + 64 + 64);
            signed_content.extend_from_slice(&driver.scratch.client_random);
            signed_content.extend_from_slice(&server_random);
            signed_content.push(3); // named_curve
            signed_content.extend(group.to_raw().to_be_bytes());
            signed_content.push(pair.public.len() as u8);
            signed_content.extend_from_slice(&pair.public);
            let signature = driver.provider().sign(local.key_handle, scheme, &signed_content).await?;
            driver.ctx.negotiated_signature_scheme = Some(scheme);
            driver.ctx.negotiated_group = Some(group);

            driver.send(&handshake_message(HandshakePayload::ServerKeyExchange(ServerKeyExchangePayload {
                params: ServerEcdhParams { curve: group, public: pair.public },
                signed: DigitallySigned { scheme, signature },
            })));
            Some(pair.handle)
        }
        KeyExchangeKind::Tls13 => unreachable!("TLS 1.3 suites never reach the legacy path"),
    };

    driver.send(&handshake_message(HandshakePayload::ServerHelloDone));

    Ok(Box::new(AwaitClientKeyExchangeLegacy {
        hash,
        master_key_cert: local.key_handle,
        kx_local_handle: kx_secret,
    }))
}

/// Waiting for (optionally) client `Certificate`, then `ClientKeyExchange`,
/// then `ChangeCipherSpec`+`Finished`. This core never sends
/// `CertificateRequest` on the server side, so the client-certificate branch
/// is unreachable today but the state still decodes it gracefully as
/// "unexpected" rather than panicking.
struct AwaitClientKeyExchangeLegacy {
    hash: HashAlgorithm,
    master_key_cert: hitls_crypto::KeyHandle,
    kx_local_handle: Option<hitls_crypto::KeyHandle>,
}

#[async_trait]
impl State for AwaitClientKeyExchangeLegacy {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::ClientKeyExchange(cke) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };

        let pre_master_secret = match cke {
            hitls_core::msgs::handshake::ClientKeyExchangePayload::Rsa(ciphertext) => {
                let expected_version = driver.ctx.negotiated_version.expect("negotiated before key exchange");
                rsa_decrypt_pms_constant_time(driver.provider(), self.master_key_cert, &ciphertext, expected_version).await?
            }
            hitls_core::msgs::handshake::ClientKeyExchangePayload::Ecdh(point)
            | hitls_core::msgs::handshake::ClientKeyExchangePayload::TlcpEcdh { point, .. } => {
                let group = driver.scratch.key_exchange.group.ok_or(Error::NoSharedGroup)?;
                let handle = self.kx_local_handle.ok_or(Error::HandshakeFailure("no server key-exchange handle for ECDH"))?;
                driver.provider().key_exchange(group, handle, &point).await?.0
            }
        };

        let client_random = driver.scratch.client_random;
        let server_random = driver.scratch.server_random.expect("set before ServerHelloDone");
        let session_hash = if driver.ctx.extended_master_secret {
            Some(driver.scratch.transcript.current_hash(driver.provider()))
        } else {
            None
        };
        let master_secret = master_secret_tls12(driver.provider(), self.hash, &pre_master_secret, &client_random, &server_random, session_hash.as_deref());
        driver.scratch.secrets.master_secret_tls12 = Some(master_secret.clone());

        Ok(Box::new(AwaitClientFinishedLegacy { master_secret, resumed: false }))
    }
}

/// Waiting for the client's `ChangeCipherSpec` + `Finished`, full and
/// resumed paths alike — mirrors `client.rs`'s `AwaitChangeCipherSpecAndFinished`.
struct AwaitClientFinishedLegacy {
    master_secret: Vec<u8>,
    resumed: bool,
}

#[async_trait]
impl State for AwaitClientFinishedLegacy {
    async fn handle(self: Box<Self>, driver: &mut Driver, message: Message) -> Result<NextState> {
        let HandshakePayload::Finished(f) = message.payload.payload else {
            return Err(unexpected(message.payload.payload.handshake_type()));
        };
        let suite = driver.ctx.negotiated_cipher_suite.and_then(find_suite).ok_or(Error::NoSharedCipher)?;
        let hash = hash_for_suite(suite.suite);

        if !self.resumed {
            let read_secret = Secret(self.master_secret.clone());
            driver.activate_keys(Direction::Read, &read_secret);
        }

        let client_finished_hash = driver.scratch.transcript.hash_excluding_last_message(driver.provider());
        let expected = compute_verify_data_tls12(driver.provider(), hash, &self.master_secret, b"client finished", &client_finished_hash);
        if !constant_time_eq(&expected, &f.0) {
            return Err(Error::DecryptError);
        }

        driver.ctx.renegotiation.last_verify_data.clear();
        driver.ctx.renegotiation.last_verify_data.extend_from_slice(&f.0);

        if !self.resumed {
            driver.record.send_change_cipher_spec();
            let write_secret = Secret(self.master_secret.clone());
            driver.activate_keys(Direction::Write, &write_secret);
            let server_finished_hash = driver.scratch.transcript.current_hash(driver.provider());
            let verify_data = compute_verify_data_tls12(driver.provider(), hash, &self.master_secret, b"server finished", &server_finished_hash);
            driver.send(&handshake_message(HandshakePayload::Finished(hitls_core::msgs::handshake::FinishedPayload(verify_data.clone()))));
            driver.ctx.renegotiation.last_verify_data.extend_from_slice(&verify_data);

            if driver.config.enable_session_tickets {
                let mut session_id = vec![0u8; 32];
                driver.provider().random(&mut session_id)?;
                let session = Session {
                    version: driver.ctx.negotiated_version.expect("negotiated"),
                    cipher_suite: suite.suite,
                    master_secret: self.master_secret.clone(),
                    session_id,
                    ticket: None,
                    sni: driver.ctx.sni.clone(),
                    extended_master_secret: driver.ctx.extended_master_secret,
                    creation_time: SystemTime::now(),
                    lifetime: std::time::Duration::from_secs(7200),
                    ticket_age_add: 0,
                };
                driver.config.session_cache.insert(session);
            }
        }

        driver.ctx.renegotiation.secure_renegotiation_supported = true;
        driver.ctx.renegotiation.handshake_count += 1;
        debug!("server: TLS <=1.2 handshake complete (resumed={})", self.resumed);
        Ok(Box::new(ConnectedLegacyServer))
    }
}

/// Terminal ≤1.2/TLCP state. This core never initiates server-side
/// renegotiation; an inbound `HelloRequest` on the server side is itself a
/// protocol violation (`HelloRequest` only ever flows server-to-client).
struct ConnectedLegacyServer;

#[async_trait]
impl State for ConnectedLegacyServer {
    async fn handle(self: Box<Self>, _driver: &mut Driver, message: Message) -> Result<NextState> {
        Err(unexpected(message.payload.payload.handshake_type()))
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use hitls_core::msgs::handshake::{ClientHelloPayload, Extensions, Random, SessionId};
    use hitls_core::msgs::enums::{CompressionMethod, ProtocolVersion};

    struct XorProvider;

    #[async_trait]
    impl hitls_crypto::CryptoProvider for XorProvider {
        fn random(&self, out: &mut [u8]) -> hitls_crypto::CryptoResult<()> {
            out.fill(0x11);
            Ok(())
        }
        async fn generate_key_share(&self, _g: hitls_core::msgs::enums::NamedGroup) -> hitls_crypto::CryptoResult<hitls_crypto::KeyPair> {
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
        fn aead_seal(&self, _s: CipherSuite, _k: &[u8], _n: &[u8], _a: &[u8], p: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            Ok(p.to_vec())
        }
        fn aead_open(&self, _s: CipherSuite, _k: &[u8], _n: &[u8], _a: &[u8], c: &[u8]) -> hitls_crypto::CryptoResult<Vec<u8>> {
            Ok(c.to_vec())
        }
    }

    struct NoCertManager;
    impl crate::cert::CertificateManager for NoCertManager {
        fn select_certificate(&self, _offered: &[hitls_core::msgs::enums::SignatureScheme]) -> Option<crate::cert::LocalCertifiedKey> {
            None
        }
        fn validate_peer_chain(&self, _chain: &[Vec<u8>]) -> std::result::Result<crate::cert::PeerCertified, crate::cert::CertificateError> {
            Err(crate::cert::CertificateError::Malformed)
        }
    }

    fn make_driver(cookie_key: Option<Vec<u8>>) -> Driver {
        let provider: Arc<dyn hitls_crypto::CryptoProvider> = Arc::new(XorProvider);
        let cert_manager: Arc<dyn crate::cert::CertificateManager> = Arc::new(NoCertManager);
        let session_cache = Arc::new(crate::session::SessionCache::new(16));
        let mut builder = crate::config::Config::builder(provider, cert_manager, session_cache);
        if let Some(key) = cookie_key {
            builder = builder.cookie_key(key);
        }
        let config = Arc::new(builder.build());
        Driver {
            ctx: crate::context::ConnectionContext::new(
                crate::context::Role::Server,
                crate::context::VersionRange { min: ProtocolVersion::TLSv1_2, max: ProtocolVersion::TLSv1_3 },
            ),
            scratch: crate::scratch::HandshakeScratch::new([0u8; 32]),
            config,
            record: Box::new(NullRecordLayer),
        }
    }

    /// A driver configured to actually negotiate a TLS 1.3 cipher suite, for
    /// exercising `continue_tls13` directly.
    fn make_tls13_driver() -> Driver {
        let provider: Arc<dyn hitls_crypto::CryptoProvider> = Arc::new(XorProvider);
        let cert_manager: Arc<dyn crate::cert::CertificateManager> = Arc::new(NoCertManager);
        let session_cache = Arc::new(crate::session::SessionCache::new(16));
        let config = crate::config::Config::builder(provider, cert_manager, session_cache)
            .tls13_cipher_suites(vec![CipherSuite::TlsAes128GcmSha256])
            .build();
        Driver {
            ctx: crate::context::ConnectionContext::new(
                crate::context::Role::Server,
                crate::context::VersionRange { min: ProtocolVersion::TLSv1_2, max: ProtocolVersion::TLSv1_3 },
            ),
            scratch: crate::scratch::HandshakeScratch::new([0u8; 32]),
            config: Arc::new(config),
            record: Box::new(NullRecordLayer),
        }
    }

    struct NullRecordLayer;
    impl crate::record::RecordLayer for NullRecordLayer {
        fn send_handshake(&mut self, _bytes: &[u8]) {}
        fn send_alert(&mut self, _level: hitls_core::msgs::enums::AlertLevel, _description: hitls_core::msgs::enums::AlertDescription) {}
        fn send_change_cipher_spec(&mut self) {}
        fn activate_keys(&mut self, _direction: Direction, _traffic_secret: &Secret) {}
        fn try_recv(&mut self) -> Option<(ContentType, Vec<u8>)> {
            None
        }
    }

    fn sample_client_hello() -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random([7u8; 32]),
            session_id: SessionId(Vec::new()),
            cipher_suites: vec![CipherSuite::TlsAes128GcmSha256],
            compression_methods: vec![CompressionMethod::Null],
            extensions: Extensions::new(),
        }
    }

    #[test]
    fn dtls_cookie_is_none_without_a_configured_key() {
        let driver = make_driver(None);
        assert!(compute_dtls_cookie(&driver, &sample_client_hello()).is_none());
    }

    #[test]
    fn dtls_cookie_is_deterministic_for_the_same_client_hello() {
        let driver = make_driver(Some(vec![1, 2, 3, 4]));
        let ch = sample_client_hello();
        let a = compute_dtls_cookie(&driver, &ch).unwrap();
        let b = compute_dtls_cookie(&driver, &ch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dtls_cookie_changes_with_client_random() {
        let driver = make_driver(Some(vec![1, 2, 3, 4]));
        let mut ch = sample_client_hello();
        let base = compute_dtls_cookie(&driver, &ch).unwrap();
        ch.random = Random([9u8; 32]);
        let changed = compute_dtls_cookie(&driver, &ch).unwrap();
        assert_ne!(base, changed);
    }

    fn tls13_client_hello(session_id: Vec<u8>) -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random([7u8; 32]),
            session_id: SessionId(session_id),
            cipher_suites: vec![CipherSuite::TlsAes128GcmSha256],
            compression_methods: vec![CompressionMethod::Null],
            extensions: Extensions::new(),
        }
    }

    #[test]
    fn hrr_retry_with_mismatched_session_id_is_illegal_parameter() {
        let mut driver = make_tls13_driver();
        driver.scratch.hello_retry_requested = true;
        driver.scratch.hrr_expectation = Some(crate::scratch::HrrExpectation {
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            session_id: vec![1, 2, 3],
            group: hitls_core::msgs::enums::NamedGroup::X25519,
        });
        let ch = tls13_client_hello(vec![9, 9, 9]);
        let result = futures::executor::block_on(continue_tls13(&mut driver, ch, Vec::new(), Vec::new()));
        assert!(matches!(result, Err(Error::IllegalParameter(_))));
    }

    #[test]
    fn hrr_retry_without_the_selected_group_in_key_share_is_illegal_parameter() {
        let mut driver = make_tls13_driver();
        driver.scratch.hello_retry_requested = true;
        driver.scratch.hrr_expectation = Some(crate::scratch::HrrExpectation {
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            session_id: Vec::new(),
            group: hitls_core::msgs::enums::NamedGroup::X25519,
        });
        let ch = tls13_client_hello(Vec::new());
        // No key_share extension at all: the retry never re-offered the
        // group the HelloRetryRequest asked for.
        let result = futures::executor::block_on(continue_tls13(&mut driver, ch, Vec::new(), Vec::new()));
        assert!(matches!(result, Err(Error::IllegalParameter(_))));
    }

    #[test]
    fn hrr_retry_with_matching_fields_passes_the_consistency_check() {
        // `make_tls13_driver` configures no groups at all, so `select_group`
        // always returns `None` and the handshake fails downstream with
        // `NoSharedGroup` once (EC)DHE is attempted — the only thing this
        // test asserts is that matching cipher_suite/session_id/group fields
        // clear the consistency check itself without an `IllegalParameter`.
        let mut driver = make_tls13_driver();
        driver.scratch.hello_retry_requested = true;
        driver.scratch.hrr_expectation = Some(crate::scratch::HrrExpectation {
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            session_id: Vec::new(),
            group: hitls_core::msgs::enums::NamedGroup::X25519,
        });
        let mut ch = tls13_client_hello(Vec::new());
        ch.extensions.push(ExtensionPayload::KeyShare(vec![KeyShareEntry {
            group: hitls_core::msgs::enums::NamedGroup::X25519,
            payload: vec![0u8; 32],
        }]));
        let result = futures::executor::block_on(continue_tls13(&mut driver, ch, Vec::new(), Vec::new()));
        assert!(matches!(result, Err(Error::NoSharedGroup)));
    }
}
