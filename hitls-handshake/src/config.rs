//! Configuration (`spec.md` §3/§4.4/§6): versions, cipher suites, groups,
//! signature schemes, and the pluggable selector callbacks a concrete
//! application supplies (SNI routing, certificate selection, ALPN
//! selection, PSK lookup). Grounded on `tls-client`'s `ClientConfig`/
//! `ServerConfig` split, generalized to one role-agnostic struct plus a
//! `Role`-specific callback set, since this core serves both roles from one
//! state machine (`spec.md` §4.5).

use std::sync::Arc;

use hitls_core::msgs::enums::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};
use hitls_crypto::CryptoProvider;

use crate::cert::{CertificateManager, LocalCertifiedKey};
use crate::context::VersionRange;
use crate::session::{SessionCache, TicketCrypter};

/// Server-side SNI-driven certificate selection, kept distinct from
/// `CertificateManager::select_certificate` because SNI selects among
/// multiple configured identities *before* signature-scheme filtering
/// narrows to one.
pub trait CertificateResolver: Send + Sync {
    fn resolve(&self, server_name: Option<&[u8]>, offered_schemes: &[SignatureScheme]) -> Option<LocalCertifiedKey>;
}

/// Server-side ALPN selection: given the client's ordered protocol list,
/// return the one protocol to negotiate, or `None` to send no ALPN
/// extension at all. Returning a protocol not present in `offered` is a
/// caller bug the state machine will reject before encoding it.
pub trait AlpnSelector: Send + Sync {
    fn select(&self, offered: &[Vec<u8>]) -> Option<Vec<u8>>;
}

/// A single external PSK identity this endpoint can use, keyed by the
/// identity bytes the peer would present.
pub struct ExternalPsk {
    pub identity: Vec<u8>,
    pub secret: Vec<u8>,
}

/// Looks up an external (non-ticket) PSK by identity, for deployments using
/// out-of-band provisioned PSKs rather than session resumption alone.
pub trait PskStore: Send + Sync {
    fn find(&self, identity: &[u8]) -> Option<ExternalPsk>;
}

/// Shared, role-agnostic configuration. Built once via `ConfigBuilder` and
/// held behind an `Arc`, since one configuration is typically reused across
/// many connections (`spec.md` §5).
pub struct Config {
    pub versions: VersionRange,
    /// Cipher suites usable on the TLS 1.3 branch, in preference order.
    pub tls13_cipher_suites: Vec<CipherSuite>,
    /// Cipher suites usable on the ≤1.2/TLCP branch, in preference order.
    pub legacy_cipher_suites: Vec<CipherSuite>,
    pub groups: Vec<NamedGroup>,
    pub signature_schemes: Vec<SignatureScheme>,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub enable_extended_master_secret: bool,
    pub enable_encrypt_then_mac: bool,
    pub enable_session_tickets: bool,
    pub max_early_data_size: Option<u32>,
    pub crypto_provider: Arc<dyn CryptoProvider>,
    pub certificate_manager: Arc<dyn CertificateManager>,
    pub certificate_resolver: Option<Arc<dyn CertificateResolver>>,
    pub alpn_selector: Option<Arc<dyn AlpnSelector>>,
    pub psk_store: Option<Arc<dyn PskStore>>,
    pub session_cache: Arc<SessionCache>,
    /// Server-side stateless session ticket encryption. `None` disables
    /// `NewSessionTicket` issuance even if `enable_session_tickets` is set.
    pub ticket_crypter: Option<Arc<TicketCrypter>>,
    /// Server-side DTLS cookie HMAC key (RFC 6347 §4.2.1). `None` skips the
    /// `HelloVerifyRequest` round trip entirely — acceptable for a server
    /// behind a transport that already screens source addresses, but leaves
    /// this endpoint without amplification-DoS protection for DTLS.
    pub cookie_key: Option<Vec<u8>>,
}

impl Config {
    pub fn builder(crypto_provider: Arc<dyn CryptoProvider>, certificate_manager: Arc<dyn CertificateManager>, session_cache: Arc<SessionCache>) -> ConfigBuilder {
        ConfigBuilder::new(crypto_provider, certificate_manager, session_cache)
    }

    pub fn supports_tls13(&self) -> bool {
        self.versions.contains(ProtocolVersion::TLSv1_3) && !self.tls13_cipher_suites.is_empty()
    }
}

/// Builder with conservative defaults: TLS 1.2 through 1.3, EMS and
/// session tickets on, Encrypt-then-MAC off (only meaningful once a CBC
/// suite is configured).
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(crypto_provider: Arc<dyn CryptoProvider>, certificate_manager: Arc<dyn CertificateManager>, session_cache: Arc<SessionCache>) -> Self {
        ConfigBuilder {
            config: Config {
                versions: VersionRange { min: ProtocolVersion::TLSv1_2, max: ProtocolVersion::TLSv1_3 },
                tls13_cipher_suites: Vec::new(),
                legacy_cipher_suites: Vec::new(),
                groups: Vec::new(),
                signature_schemes: Vec::new(),
                alpn_protocols: Vec::new(),
                enable_extended_master_secret: true,
                enable_encrypt_then_mac: false,
                enable_session_tickets: true,
                max_early_data_size: None,
                crypto_provider,
                certificate_manager,
                certificate_resolver: None,
                alpn_selector: None,
                psk_store: None,
                session_cache,
                ticket_crypter: None,
                cookie_key: None,
            },
        }
    }

    pub fn versions(mut self, range: VersionRange) -> Self {
        self.config.versions = range;
        self
    }

    pub fn tls13_cipher_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.config.tls13_cipher_suites = suites;
        self
    }

    pub fn legacy_cipher_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.config.legacy_cipher_suites = suites;
        self
    }

    pub fn groups(mut self, groups: Vec<NamedGroup>) -> Self {
        self.config.groups = groups;
        self
    }

    pub fn signature_schemes(mut self, schemes: Vec<SignatureScheme>) -> Self {
        self.config.signature_schemes = schemes;
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.config.alpn_protocols = protocols;
        self
    }

    pub fn enable_encrypt_then_mac(mut self, enable: bool) -> Self {
        self.config.enable_encrypt_then_mac = enable;
        self
    }

    pub fn enable_extended_master_secret(mut self, enable: bool) -> Self {
        self.config.enable_extended_master_secret = enable;
        self
    }

    pub fn certificate_resolver(mut self, resolver: Arc<dyn CertificateResolver>) -> Self {
        self.config.certificate_resolver = Some(resolver);
        self
    }

    pub fn alpn_selector(mut self, selector: Arc<dyn AlpnSelector>) -> Self {
        self.config.alpn_selector = Some(selector);
        self
    }

    pub fn psk_store(mut self, store: Arc<dyn PskStore>) -> Self {
        self.config.psk_store = Some(store);
        self
    }

    pub fn max_early_data_size(mut self, size: u32) -> Self {
        self.config.max_early_data_size = Some(size);
        self
    }

    pub fn ticket_crypter(mut self, crypter: Arc<TicketCrypter>) -> Self {
        self.config.ticket_crypter = Some(crypter);
        self
    }

    pub fn cookie_key(mut self, key: Vec<u8>) -> Self {
        self.config.cookie_key = Some(key);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
