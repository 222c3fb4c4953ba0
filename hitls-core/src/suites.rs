//! Static cipher suite table. A separate list is kept for TLS 1.3 suites
//! (`spec.md` §3 Configuration: "separate list for TLS 1.3") because their
//! key-exchange model (always ephemeral, PSK-or-certificate auth decided by
//! extensions rather than by the suite id) differs enough from ≤1.2 suites
//! that mixing them in one preference list invites version-confusion bugs.

use crate::msgs::enums::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeKind {
    /// TLS 1.3: key exchange is negotiated via `key_share`/`psk`, not tied to
    /// the suite id.
    Tls13,
    Rsa,
    EcdheRsa,
    EcdheEcdsa,
    /// TLCP 1.1 ECC (SM2) cipher suites.
    EccSm2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
    Aes128Cbc,
    Sm4Gcm,
    Sm4Cbc,
}

#[derive(Debug, Clone, Copy)]
pub struct SupportedCipherSuite {
    pub suite: CipherSuite,
    pub kx: KeyExchangeKind,
    pub bulk: BulkAlgorithm,
    /// The transcript/PRF hash this suite binds to (HKDF hash for 1.3, PRF
    /// hash for ≤1.2).
    pub hash_output_len: usize,
    pub min_version: ProtocolVersion,
    pub max_version: ProtocolVersion,
}

impl SupportedCipherSuite {
    pub fn is_tls13(&self) -> bool {
        matches!(self.kx, KeyExchangeKind::Tls13)
    }

    pub fn usable_for_version(&self, version: ProtocolVersion) -> bool {
        version.to_raw() >= self.min_version.to_raw() && version.to_raw() <= self.max_version.to_raw()
            || (version.is_dtls() && self.usable_for_version(version.baseline()))
    }

    pub fn requires_signature_scheme_for_key(&self, scheme: SignatureScheme) -> bool {
        match self.kx {
            KeyExchangeKind::Rsa => false, // static RSA kx needs no CertificateVerify
            KeyExchangeKind::EcdheRsa => matches!(
                scheme,
                SignatureScheme::RsaPkcs1Sha256
                    | SignatureScheme::RsaPkcs1Sha384
                    | SignatureScheme::RsaPkcs1Sha512
                    | SignatureScheme::RsaPssRsaeSha256
                    | SignatureScheme::RsaPssRsaeSha384
                    | SignatureScheme::RsaPssRsaeSha512
            ),
            KeyExchangeKind::EcdheEcdsa => matches!(
                scheme,
                SignatureScheme::EcdsaSecp256r1Sha256
                    | SignatureScheme::EcdsaSecp384r1Sha384
                    | SignatureScheme::EcdsaSecp521r1Sha512
                    | SignatureScheme::Ed25519
            ),
            KeyExchangeKind::EccSm2 => matches!(scheme, SignatureScheme::Sm2Sm3),
            KeyExchangeKind::Tls13 => true, // decided by the cert's key type, checked elsewhere
        }
    }
}

pub static TLS13_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsAes128GcmSha256,
    kx: KeyExchangeKind::Tls13,
    bulk: BulkAlgorithm::Aes128Gcm,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLSv1_3,
    max_version: ProtocolVersion::TLSv1_3,
};

pub static TLS13_AES_256_GCM_SHA384: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsAes256GcmSha384,
    kx: KeyExchangeKind::Tls13,
    bulk: BulkAlgorithm::Aes256Gcm,
    hash_output_len: 48,
    min_version: ProtocolVersion::TLSv1_3,
    max_version: ProtocolVersion::TLSv1_3,
};

pub static TLS13_CHACHA20_POLY1305_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsChacha20Poly1305Sha256,
    kx: KeyExchangeKind::Tls13,
    bulk: BulkAlgorithm::Chacha20Poly1305,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLSv1_3,
    max_version: ProtocolVersion::TLSv1_3,
};

pub static TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsEcdheEcdsaWithAes128GcmSha256,
    kx: KeyExchangeKind::EcdheEcdsa,
    bulk: BulkAlgorithm::Aes128Gcm,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLSv1_2,
    max_version: ProtocolVersion::TLSv1_2,
};

pub static TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsEcdheRsaWithAes128GcmSha256,
    kx: KeyExchangeKind::EcdheRsa,
    bulk: BulkAlgorithm::Aes128Gcm,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLSv1_2,
    max_version: ProtocolVersion::TLSv1_2,
};

pub static TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsEcdheRsaWithAes128CbcSha,
    kx: KeyExchangeKind::EcdheRsa,
    bulk: BulkAlgorithm::Aes128Cbc,
    hash_output_len: 20,
    min_version: ProtocolVersion::SSLv3,
    max_version: ProtocolVersion::TLSv1_2,
};

pub static TLS_RSA_WITH_AES_128_GCM_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TlsRsaWithAes128GcmSha256,
    kx: KeyExchangeKind::Rsa,
    bulk: BulkAlgorithm::Aes128Gcm,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLSv1_2,
    max_version: ProtocolVersion::TLSv1_2,
};

pub static ECC_SM4_GCM_SM3: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::EccSm4GcmSm3,
    kx: KeyExchangeKind::EccSm2,
    bulk: BulkAlgorithm::Sm4Gcm,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLCPv1_1,
    max_version: ProtocolVersion::TLCPv1_1,
};

pub static ECC_SM4_CBC_SM3: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::EccSm4CbcSm3,
    kx: KeyExchangeKind::EccSm2,
    bulk: BulkAlgorithm::Sm4Cbc,
    hash_output_len: 32,
    min_version: ProtocolVersion::TLCPv1_1,
    max_version: ProtocolVersion::TLCPv1_1,
};

pub static ALL_TLS13_SUITES: &[&SupportedCipherSuite] =
    &[&TLS13_AES_128_GCM_SHA256, &TLS13_AES_256_GCM_SHA384, &TLS13_CHACHA20_POLY1305_SHA256];

pub static ALL_PRE_TLS13_SUITES: &[&SupportedCipherSuite] = &[
    &TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    &TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    &TLS_RSA_WITH_AES_128_GCM_SHA256,
];

pub static ALL_TLCP_SUITES: &[&SupportedCipherSuite] = &[&ECC_SM4_GCM_SM3, &ECC_SM4_CBC_SM3];

pub fn find_suite(suite: CipherSuite) -> Option<&'static SupportedCipherSuite> {
    ALL_TLS13_SUITES
        .iter()
        .chain(ALL_PRE_TLS13_SUITES.iter())
        .chain(ALL_TLCP_SUITES.iter())
        .find(|s| s.suite == suite)
        .copied()
}

/// Default elliptic-curve group preference order, strongest/fastest first.
pub static DEFAULT_GROUPS: &[NamedGroup] = &[NamedGroup::X25519, NamedGroup::Secp256r1, NamedGroup::Secp384r1];
