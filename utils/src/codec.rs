//! Serialize structured data into a compact, deterministic binary form.
//!
//! Every message exchanged between members (and every payload that is signed)
//! is encoded with these traits. Integers are big-endian, variable-length
//! collections carry a `u32` length prefix and reads of untrusted lengths are
//! bounded by a caller-provided configuration.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur when decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("invalid length: {0}")]
    InvalidLength(usize),
    #[error("invalid bool")]
    InvalidBool,
    #[error("invalid data in {0}: {1}")]
    Invalid(&'static str, &'static str),
}

/// Types that can be written to a buffer.
pub trait Write {
    /// Encodes this value by writing to a buffer.
    fn write(&self, buf: &mut impl BufMut);
}

/// Types that know their encoded length.
pub trait EncodeSize {
    /// Returns the exact number of bytes `write` produces.
    fn encode_size(&self) -> usize;
}

/// Types that can be encoded to a standalone buffer.
pub trait Encode: Write + EncodeSize {
    /// Encodes a value into a freshly allocated buffer.
    fn encode(&self) -> BytesMut {
        let len = self.encode_size();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len, "write() did not write expected bytes");
        buffer
    }
}

impl<T: Write + EncodeSize> Encode for T {}

/// Types that can be read from a buffer.
///
/// `Cfg` bounds allocations when decoding untrusted data (use `()` when no
/// configuration is needed).
pub trait Read: Sized {
    type Cfg: Clone;

    /// Reads a value from the buffer, consuming the necessary bytes.
    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, Error>;
}

/// Convenience for types without read configuration.
pub trait ReadExt: Read<Cfg = ()> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Self::read_cfg(buf, &())
    }
}

impl<T: Read<Cfg = ()>> ReadExt for T {}

/// Types that can be decoded from a buffer that must be fully consumed.
pub trait Decode: Read {
    fn decode_cfg(mut buf: impl Buf, cfg: &Self::Cfg) -> Result<Self, Error> {
        let result = Self::read_cfg(&mut buf, cfg)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(result)
    }
}

impl<T: Read> Decode for T {}

/// Convenience for decoding types without read configuration.
pub trait DecodeExt: Decode<Cfg = ()> {
    fn decode(buf: impl Buf) -> Result<Self, Error> {
        Self::decode_cfg(buf, &())
    }
}

impl<T: Decode<Cfg = ()>> DecodeExt for T {}

/// Returns an error if `buf` holds fewer than `len` bytes.
#[inline]
pub fn at_least(buf: &impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

/// Reads a `u32` length prefix and checks it against `max`.
fn read_len(buf: &mut impl Buf, max: usize) -> Result<usize, Error> {
    let len = u32::read(buf)? as usize;
    if len > max {
        return Err(Error::InvalidLength(len));
    }
    Ok(len)
}

macro_rules! impl_int {
    ($type:ty, $size:expr, $put:ident, $get:ident) => {
        impl Write for $type {
            #[inline]
            fn write(&self, buf: &mut impl BufMut) {
                buf.$put(*self);
            }
        }

        impl EncodeSize for $type {
            #[inline]
            fn encode_size(&self) -> usize {
                $size
            }
        }

        impl Read for $type {
            type Cfg = ();

            #[inline]
            fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
                at_least(buf, $size)?;
                Ok(buf.$get())
            }
        }
    };
}

impl_int!(u8, 1, put_u8, get_u8);
impl_int!(u16, 2, put_u16, get_u16);
impl_int!(u32, 4, put_u32, get_u32);
impl_int!(u64, 8, put_u64, get_u64);

impl Write for bool {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl EncodeSize for bool {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Read for bool {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        match u8::read(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidBool),
        }
    }
}

impl<const N: usize> Write for [u8; N] {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> EncodeSize for [u8; N] {
    fn encode_size(&self) -> usize {
        N
    }
}

impl<const N: usize> Read for [u8; N] {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        at_least(buf, N)?;
        let mut out = [0u8; N];
        buf.copy_to_slice(&mut out);
        Ok(out)
    }
}

impl Write for Bytes {
    fn write(&self, buf: &mut impl BufMut) {
        (self.len() as u32).write(buf);
        buf.put_slice(self);
    }
}

impl EncodeSize for Bytes {
    fn encode_size(&self) -> usize {
        4 + self.len()
    }
}

/// Reading `Bytes` is bounded by the maximum accepted length.
impl Read for Bytes {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, Error> {
        let len = read_len(buf, *max)?;
        at_least(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}

impl<T: Write> Write for Vec<T> {
    fn write(&self, buf: &mut impl BufMut) {
        (self.len() as u32).write(buf);
        for item in self {
            item.write(buf);
        }
    }
}

impl<T: EncodeSize> EncodeSize for Vec<T> {
    fn encode_size(&self) -> usize {
        4 + self.iter().map(EncodeSize::encode_size).sum::<usize>()
    }
}

/// Reading a `Vec` is bounded by the maximum number of items and configured
/// with the item configuration.
impl<T: Read> Read for Vec<T> {
    type Cfg = (usize, T::Cfg);

    fn read_cfg(buf: &mut impl Buf, (max, cfg): &Self::Cfg) -> Result<Self, Error> {
        let len = read_len(buf, *max)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read_cfg(buf, cfg)?);
        }
        Ok(items)
    }
}

impl<T: Write> Write for Option<T> {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Some(value) => {
                true.write(buf);
                value.write(buf);
            }
            None => false.write(buf),
        }
    }
}

impl<T: EncodeSize> EncodeSize for Option<T> {
    fn encode_size(&self) -> usize {
        1 + self.as_ref().map_or(0, EncodeSize::encode_size)
    }
}

impl<T: Read> Read for Option<T> {
    type Cfg = T::Cfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &T::Cfg) -> Result<Self, Error> {
        if bool::read(buf)? {
            return Ok(Some(T::read_cfg(buf, cfg)?));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_integers() {
        let mut buf = BytesMut::new();
        7u8.write(&mut buf);
        0x0102u16.write(&mut buf);
        0x01020304u32.write(&mut buf);
        u64::MAX.write(&mut buf);
        assert_eq!(buf.len(), 1 + 2 + 4 + 8);
        assert_eq!(&buf[..7], &[7, 1, 2, 1, 2, 3, 4]);

        let mut buf = buf.freeze();
        assert_eq!(u8::read(&mut buf).unwrap(), 7);
        assert_eq!(u16::read(&mut buf).unwrap(), 0x0102);
        assert_eq!(u32::read(&mut buf).unwrap(), 0x01020304);
        assert_eq!(u64::read(&mut buf).unwrap(), u64::MAX);
        assert!(matches!(u8::read(&mut buf), Err(Error::EndOfBuffer)));
    }

    #[test_case(&[0] => Ok(false); "false")]
    #[test_case(&[1] => Ok(true); "true")]
    #[test_case(&[2] => Err(Error::InvalidBool); "invalid")]
    #[test_case(&[] => Err(Error::EndOfBuffer); "empty")]
    fn test_bool(bytes: &'static [u8]) -> Result<bool, Error> {
        bool::decode(bytes)
    }

    #[test]
    fn test_bytes_limit() {
        let value = Bytes::from_static(b"hello");
        let encoded = value.encode();
        assert_eq!(Bytes::decode_cfg(encoded.clone(), &5).unwrap(), value);
        assert!(matches!(
            Bytes::decode_cfg(encoded, &4),
            Err(Error::InvalidLength(5))
        ));
    }

    #[test]
    fn test_vec_limit() {
        let value = vec![1u32, 2, 3];
        let encoded = value.encode();
        assert_eq!(encoded.len(), value.encode_size());
        assert_eq!(Vec::<u32>::decode_cfg(encoded.clone(), &(3, ())).unwrap(), value);
        assert!(matches!(
            Vec::<u32>::decode_cfg(encoded, &(2, ())),
            Err(Error::InvalidLength(3))
        ));
    }

    #[test]
    fn test_option() {
        let some = Some(9u64).encode();
        assert_eq!(Option::<u64>::decode(some).unwrap(), Some(9));
        let none = None::<u64>.encode();
        assert_eq!(none.len(), 1);
        assert_eq!(Option::<u64>::decode(none).unwrap(), None);
    }

    #[test]
    fn test_extra_data() {
        let mut encoded = 1u32.encode();
        encoded.put_u8(0);
        assert!(matches!(u32::decode(encoded), Err(Error::ExtraData(1))));
    }

    #[test]
    fn test_truncated_array() {
        let encoded = [1u8, 2, 3];
        assert!(matches!(
            <[u8; 4]>::decode(&encoded[..]),
            Err(Error::EndOfBuffer)
        ));
    }
}
