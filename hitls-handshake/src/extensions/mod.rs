//! Extension Negotiation (`spec.md` §4.4): produces the extension set for
//! each outbound message, validates the inbound set, and cross-applies
//! negotiated values back into the `ConnectionContext`. Split into a
//! client-side packer (`client`) and a server-side selector (`server`); both
//! lean on the shared outcome types here.

pub mod client;
pub mod server;

use hitls_core::msgs::enums::ProtocolVersion;

/// Result of invoking the user's SNI callback (`spec.md` §4.4 "SNI").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniOutcome {
    /// The server recognizes the name (or runs one identity regardless).
    Ok,
    /// The server doesn't recognize the name but continues anyway,
    /// `isSniStateOK=false`.
    NoAck,
    /// Fatal: the caller wants this connection torn down with
    /// `unrecognized_name`.
    Fatal,
}

/// Result of invoking the user's ALPN callback.
pub enum AlpnOutcome {
    Selected(Vec<u8>),
    /// Proceed without negotiating ALPN at all.
    NoAck,
    /// Fatal: `no_application_protocol`.
    Fatal,
}

/// Picks the negotiated version per `spec.md` §4.4 "Version": prefers
/// `supported_versions` intersected with the local `[min, max]` range over
/// the `legacy_version` field, and refuses to let TLS 1.3 negotiate if the
/// client's legacy field alone (no `supported_versions`) claims SSL 3.0 —
/// TLS 1.3 is only ever reached via the extension.
pub fn negotiate_version(
    client_supported_versions: Option<&[ProtocolVersion]>,
    legacy_version: ProtocolVersion,
    local_min: ProtocolVersion,
    local_max: ProtocolVersion,
) -> Option<ProtocolVersion> {
    if let Some(offered) = client_supported_versions {
        return offered
            .iter()
            .copied()
            .filter(|v| v.to_raw() >= local_min.to_raw() && v.to_raw() <= local_max.to_raw())
            .max_by_key(|v| v.to_raw());
    }
    if legacy_version == ProtocolVersion::SSLv3 {
        return None;
    }
    let capped = legacy_version.to_raw().min(local_max.to_raw());
    if capped < local_min.to_raw() {
        return None;
    }
    Some(ProtocolVersion::from_raw(capped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_supported_versions_extension_over_legacy() {
        let offered = [ProtocolVersion::TLSv1_2, ProtocolVersion::TLSv1_3];
        let chosen = negotiate_version(Some(&offered), ProtocolVersion::TLSv1_2, ProtocolVersion::TLSv1_2, ProtocolVersion::TLSv1_3);
        assert_eq!(chosen, Some(ProtocolVersion::TLSv1_3));
    }

    #[test]
    fn legacy_version_capped_by_local_max() {
        let chosen = negotiate_version(None, ProtocolVersion::TLSv1_3, ProtocolVersion::TLSv1_0, ProtocolVersion::TLSv1_2);
        assert_eq!(chosen, Some(ProtocolVersion::TLSv1_2));
    }

    #[test]
    fn sslv3_legacy_only_never_selected() {
        let chosen = negotiate_version(None, ProtocolVersion::SSLv3, ProtocolVersion::SSLv3, ProtocolVersion::TLSv1_3);
        assert_eq!(chosen, None);
    }
}
