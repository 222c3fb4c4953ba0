//! Byte-level encode/decode primitives shared by every handshake message.
//!
//! Mirrors the `Codec`/`Reader` split used throughout the handshake message
//! types: a type that knows how to serialize itself into a growable `Vec<u8>`
//! and deserialize itself from a cursor over a borrowed byte slice.

/// A cursor over a borrowed byte slice. Never copies; every `get_*` either
/// advances and returns a slice/value or leaves the cursor untouched and
/// returns `None`.
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn init(buf: &'a [u8]) -> Self {
        Reader { buf, offset: 0 }
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    pub fn used(&self) -> usize {
        self.offset
    }

    pub fn left(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn any_left(&self) -> bool {
        self.offset < self.buf.len()
    }

    /// Returns `true` only if every byte in the buffer has been consumed.
    /// Handshake messages must be fully consumed; leftover bytes are a
    /// decode error (`illegal_parameter` at the call site).
    pub fn expect_exhausted(&self) -> bool {
        self.offset == self.buf.len()
    }

    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.left() < len {
            return None;
        }
        let start = self.offset;
        self.offset += len;
        Some(&self.buf[start..self.offset])
    }

    pub fn take_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn take_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn take_u24(&mut self) -> Option<u32> {
        self.take(3).map(|b| u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn take_u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_u64(&mut self) -> Option<u64> {
        self.take(8).map(|b| {
            let mut a = [0u8; 8];
            a.copy_from_slice(b);
            u64::from_be_bytes(a)
        })
    }

    /// Reads a length-prefixed sub-buffer (the prefix has `len_bytes` bytes,
    /// 1/2/3 supported) and returns a fresh `Reader` scoped to exactly that
    /// many bytes, so callers cannot accidentally read past the declared
    /// length of the nested structure.
    pub fn sub(&mut self, len_bytes: usize) -> Option<Reader<'a>> {
        let len = match len_bytes {
            1 => self.take_u8()? as usize,
            2 => self.take_u16()? as usize,
            3 => self.take_u24()? as usize,
            _ => unreachable!("length prefixes are 1, 2 or 3 bytes"),
        };
        self.take(len).map(Reader::init)
    }
}

/// Types that know how to append their wire encoding to a buffer and parse
/// themselves back out of a `Reader`. Pure; no I/O, no allocation beyond the
/// output buffer.
pub trait Codec: Sized {
    fn encode(&self, bytes: &mut Vec<u8>);

    fn read(r: &mut Reader) -> Option<Self>;

    fn get_encoding(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::init(bytes);
        Self::read(&mut r)
    }
}

impl Codec for u8 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(*self);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take_u8()
    }
}

impl Codec for u16 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take_u16()
    }
}

impl Codec for u32 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take_u32()
    }
}

/// A 24-bit big-endian length/value, used for handshake message lengths and
/// certificate list lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U24(pub u32);

impl Codec for U24 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        let b = self.0.to_be_bytes();
        bytes.extend_from_slice(&b[1..]);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take_u24().map(U24)
    }
}

/// Appends a placeholder length, runs `write`, then backpatches the real
/// length using `len_bytes` bytes (1, 2 or 3). Used for every
/// length-prefixed nested structure (extensions, certificate lists, ...).
pub fn encode_with_len_prefix(bytes: &mut Vec<u8>, len_bytes: usize, write: impl FnOnce(&mut Vec<u8>)) {
    let start = bytes.len();
    bytes.resize(start + len_bytes, 0);
    write(bytes);
    let len = bytes.len() - start - len_bytes;
    let len_be = (len as u32).to_be_bytes();
    bytes[start..start + len_bytes].copy_from_slice(&len_be[4 - len_bytes..]);
}

/// A vector of `Codec` items, length-prefixed with `len_bytes` bytes.
pub struct VecLenPrefix;

impl VecLenPrefix {
    pub fn encode<T: Codec>(bytes: &mut Vec<u8>, len_bytes: usize, items: &[T]) {
        encode_with_len_prefix(bytes, len_bytes, |b| {
            for item in items {
                item.encode(b);
            }
        });
    }

    pub fn read<T: Codec>(r: &mut Reader, len_bytes: usize) -> Option<Vec<T>> {
        let mut sub = r.sub(len_bytes)?;
        let mut out = Vec::new();
        while sub.any_left() {
            out.push(T::read(&mut sub)?);
        }
        Some(out)
    }
}
