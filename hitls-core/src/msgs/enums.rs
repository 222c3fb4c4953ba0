//! Protocol enums. Every enum round-trips through a `Codec` impl so a
//! malformed/unknown wire value becomes an `Unknown(raw)` variant rather than
//! a parse failure — the state machine decides whether an unknown value is
//! fatal, not the codec (the one exception is `KeyUpdate`'s request field,
//! which the original implementation treats as a strict closed enum; see
//! `handshake::KeyUpdateRequest`).

use super::codec::{Codec, Reader};

macro_rules! enum_with_unknown {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+,
            Unknown($repr),
        }

        impl $name {
            pub fn to_raw(self) -> $repr {
                match self {
                    $($name::$variant => $value),+,
                    $name::Unknown(v) => v,
                }
            }

            pub fn from_raw(v: $repr) -> Self {
                match v {
                    $($value => $name::$variant),+,
                    _ => $name::Unknown(v),
                }
            }
        }

        impl Codec for $name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                self.to_raw().encode(bytes);
            }

            fn read(r: &mut Reader) -> Option<Self> {
                <$repr as Codec>::read(r).map(Self::from_raw)
            }
        }
    };
}

enum_with_unknown! {
    /// Record-layer/legacy-field protocol version. Every handshake version
    /// this core supports, including the DTLS and TLCP profiles.
    ProtocolVersion(u16) {
        SSLv3 = 0x0300,
        TLSv1_0 = 0x0301,
        TLSv1_1 = 0x0302,
        TLSv1_2 = 0x0303,
        TLSv1_3 = 0x0304,
        TLCPv1_1 = 0x0101,
        DTLSv1_0 = 0xFEFF,
        DTLSv1_2 = 0xFEFD,
    }
}

impl ProtocolVersion {
    pub fn is_dtls(self) -> bool {
        matches!(self, ProtocolVersion::DTLSv1_0 | ProtocolVersion::DTLSv1_2)
    }

    pub fn is_tls13(self) -> bool {
        matches!(self, ProtocolVersion::TLSv1_3)
    }

    /// Maps `DTLSv1_2` onto the same resumption/EMS/cipher-selection branch
    /// as `TLSv1_2` everywhere in the core (Open Question resolution).
    pub fn baseline(self) -> ProtocolVersion {
        match self {
            ProtocolVersion::DTLSv1_2 => ProtocolVersion::TLSv1_2,
            ProtocolVersion::DTLSv1_0 => ProtocolVersion::TLSv1_1,
            other => other,
        }
    }
}

enum_with_unknown! {
    ContentType(u8) {
        ChangeCipherSpec = 20,
        Alert = 21,
        Handshake = 22,
        ApplicationData = 23,
    }
}

enum_with_unknown! {
    HandshakeType(u8) {
        HelloRequest = 0,
        ClientHello = 1,
        ServerHello = 2,
        HelloVerifyRequest = 3,
        NewSessionTicket = 4,
        EndOfEarlyData = 5,
        EncryptedExtensions = 8,
        Certificate = 11,
        ServerKeyExchange = 12,
        CertificateRequest = 13,
        ServerHelloDone = 14,
        CertificateVerify = 15,
        ClientKeyExchange = 16,
        Finished = 20,
        CertificateStatus = 22,
        KeyUpdate = 24,
        MessageHash = 254,
    }
}

enum_with_unknown! {
    AlertLevel(u8) {
        Warning = 1,
        Fatal = 2,
    }
}

enum_with_unknown! {
    AlertDescription(u8) {
        CloseNotify = 0,
        UnexpectedMessage = 10,
        BadRecordMac = 20,
        DecryptionFailed = 21,
        RecordOverflow = 22,
        DecompressionFailure = 30,
        HandshakeFailure = 40,
        NoCertificate = 41,
        BadCertificate = 42,
        UnsupportedCertificate = 43,
        CertificateRevoked = 44,
        CertificateExpired = 45,
        CertificateUnknown = 46,
        IllegalParameter = 47,
        UnknownCa = 48,
        AccessDenied = 49,
        DecodeError = 50,
        DecryptError = 51,
        ExportRestriction = 60,
        ProtocolVersion = 70,
        InsufficientSecurity = 71,
        InternalError = 80,
        InappropriateFallback = 86,
        UserCanceled = 90,
        NoRenegotiation = 100,
        MissingExtension = 109,
        UnsupportedExtension = 110,
        UnrecognizedName = 112,
        BadCertificateStatusResponse = 113,
        UnknownPskIdentity = 115,
        CertificateRequired = 116,
        NoApplicationProtocol = 120,
    }
}

enum_with_unknown! {
    ExtensionType(u16) {
        ServerName = 0,
        StatusRequest = 5,
        SupportedGroups = 10,
        EcPointFormats = 11,
        SignatureAlgorithms = 13,
        Alpn = 16,
        SignedCertificateTimestamp = 18,
        EncryptThenMac = 22,
        ExtendedMasterSecret = 23,
        SessionTicket = 35,
        PreSharedKey = 41,
        EarlyData = 42,
        SupportedVersions = 43,
        Cookie = 44,
        PskKeyExchangeModes = 45,
        CertificateAuthorities = 47,
        PostHandshakeAuth = 49,
        SignatureAlgorithmsCert = 50,
        KeyShare = 51,
        RenegotiationInfo = 0xff01,
    }
}

enum_with_unknown! {
    NamedGroup(u16) {
        Secp256r1 = 23,
        Secp384r1 = 24,
        Secp521r1 = 25,
        X25519 = 29,
        X448 = 30,
        Ffdhe2048 = 256,
        Ffdhe3072 = 257,
        Ffdhe4096 = 258,
        Sm2P256 = 0x0029,
    }
}

enum_with_unknown! {
    SignatureScheme(u16) {
        RsaPkcs1Sha256 = 0x0401,
        RsaPkcs1Sha384 = 0x0501,
        RsaPkcs1Sha512 = 0x0601,
        EcdsaSecp256r1Sha256 = 0x0403,
        EcdsaSecp384r1Sha384 = 0x0503,
        EcdsaSecp521r1Sha512 = 0x0603,
        RsaPssRsaeSha256 = 0x0804,
        RsaPssRsaeSha384 = 0x0805,
        RsaPssRsaeSha512 = 0x0806,
        Ed25519 = 0x0807,
        Sm2Sm3 = 0x0708,
    }
}

enum_with_unknown! {
    CipherSuite(u16) {
        TlsAes128GcmSha256 = 0x1301,
        TlsAes256GcmSha384 = 0x1302,
        TlsChacha20Poly1305Sha256 = 0x1303,
        TlsRsaWithAes128GcmSha256 = 0x009c,
        TlsRsaWithAes256GcmSha384 = 0x009d,
        TlsEcdheRsaWithAes128GcmSha256 = 0xc02f,
        TlsEcdheEcdsaWithAes128GcmSha256 = 0xc02b,
        TlsEcdheRsaWithAes128CbcSha = 0xc013,
        TlsEcdheEcdsaWithAes128CbcSha256 = 0xc023,
        TlsEmptyRenegotiationInfoScsv = 0x00ff,
        EccSm4GcmSm3 = 0xe011,
        EccSm4CbcSm3 = 0xe013,
    }
}

enum_with_unknown! {
    CompressionMethod(u8) {
        Null = 0,
    }
}

enum_with_unknown! {
    PskKeyExchangeMode(u8) {
        PskKe = 0,
        PskDheKe = 1,
    }
}

enum_with_unknown! {
    EcPointFormat(u8) {
        Uncompressed = 0,
        Ansix962CompressedPrime = 1,
    }
}

/// Which side of the connection a state machine instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_value() {
        let v = ProtocolVersion::TLSv1_3;
        let enc = v.get_encoding();
        assert_eq!(enc, vec![0x03, 0x04]);
        assert_eq!(ProtocolVersion::read_bytes(&enc), Some(ProtocolVersion::TLSv1_3));
    }

    #[test]
    fn unknown_value_round_trips_as_unknown() {
        let enc = vec![0x12, 0x34];
        let parsed = ExtensionType::read_bytes(&enc).unwrap();
        assert_eq!(parsed, ExtensionType::Unknown(0x1234));
        assert_eq!(parsed.get_encoding(), enc);
    }

    #[test]
    fn dtls12_baseline_is_tls12() {
        assert_eq!(ProtocolVersion::DTLSv1_2.baseline(), ProtocolVersion::TLSv1_2);
    }
}
