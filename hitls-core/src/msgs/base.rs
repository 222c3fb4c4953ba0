//! Length-prefixed opaque byte strings, the `PayloadU8`/`U16`/`U24` family
//! used throughout the handshake messages for fields the core treats as
//! opaque blobs (random, session id, certificate DER, key share bytes, ...).

use super::codec::{Codec, Reader};

/// An unprefixed opaque payload that consumes the rest of its enclosing
/// `Reader` (used only inside an already length-delimited sub-reader, e.g.
/// a single certificate's DER bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(pub Vec<u8>);

impl Codec for Payload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(Payload(r.rest().to_vec()))
    }
}

macro_rules! payload_prefixed {
    ($name:ident, $len_bytes:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name(pub Vec<u8>);

        impl Codec for $name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                super::codec::encode_with_len_prefix(bytes, $len_bytes, |b| {
                    b.extend_from_slice(&self.0);
                });
            }

            fn read(r: &mut Reader) -> Option<Self> {
                let sub = r.sub($len_bytes)?;
                Some($name(sub.rest().to_vec()))
            }
        }
    };
}

payload_prefixed!(PayloadU8, 1);
payload_prefixed!(PayloadU16, 2);
payload_prefixed!(PayloadU24, 3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_u16_round_trips() {
        let p = PayloadU16(vec![1, 2, 3, 4]);
        let enc = p.get_encoding();
        assert_eq!(enc, vec![0x00, 0x04, 1, 2, 3, 4]);
        assert_eq!(PayloadU16::read_bytes(&enc), Some(p));
    }

    #[test]
    fn payload_u8_empty() {
        let p = PayloadU8(vec![]);
        assert_eq!(p.get_encoding(), vec![0x00]);
    }
}
