//! Deterministic big-endian (network order) encode/decode into a bounded
//! buffer with an advancing offset. Grounded on the byte-cursor style of
//! Amazon's clock-bound-c client (fixed arrays, manual offsets,
//! `byteorder::NetworkEndian`), adapted into a reusable write/read cursor
//! pair instead of one-off fixed-size request/response arrays.

use byteorder::{BigEndian, ByteOrder};

use crate::error::ClkmgrError;

/// Maximum datagram size accepted by the queue transport.
pub const MAX_BUFFER_LEN: usize = 4096;

/// A bounded, growable write cursor. Every `put_*` call fails the whole
/// message rather than writing a partial field once the buffer would
/// exceed `MAX_BUFFER_LEN`.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            buf: Vec::with_capacity(256),
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<(), ClkmgrError> {
        if self.buf.len() + additional > MAX_BUFFER_LEN {
            return Err(ClkmgrError::BufferOverflow {
                max: MAX_BUFFER_LEN,
            });
        }
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<(), ClkmgrError> {
        self.reserve(1)?;
        self.buf.push(v);
        Ok(())
    }

    pub fn put_bool(&mut self, v: bool) -> Result<(), ClkmgrError> {
        self.put_u8(if v { 1 } else { 0 })
    }

    pub fn put_u16(&mut self, v: u16) -> Result<(), ClkmgrError> {
        self.reserve(2)?;
        let mut tmp = [0u8; 2];
        BigEndian::write_u16(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), ClkmgrError> {
        self.reserve(4)?;
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        Ok(())
    }

    pub fn put_i32(&mut self, v: i32) -> Result<(), ClkmgrError> {
        self.put_u32(v as u32)
    }

    pub fn put_u64(&mut self, v: u64) -> Result<(), ClkmgrError> {
        self.reserve(8)?;
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        Ok(())
    }

    pub fn put_i64(&mut self, v: i64) -> Result<(), ClkmgrError> {
        self.put_u64(v as u64)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), ClkmgrError> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_fixed_array<const N: usize>(&mut self, arr: &[u8; N]) -> Result<(), ClkmgrError> {
        self.put_bytes(arr)
    }

    /// 16-bit length-prefixed string, not null-terminated on the wire.
    pub fn put_str(&mut self, s: &str) -> Result<(), ClkmgrError> {
        if s.len() > u16::MAX as usize {
            return Err(ClkmgrError::MalformedField(format!(
                "string too long: {} bytes",
                s.len()
            )));
        }
        self.put_u16(s.len() as u16)?;
        self.put_bytes(s.as_bytes())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded read cursor over a borrowed byte slice.
pub struct Decoder<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClkmgrError> {
        if self.offset + n > self.buf.len() {
            return Err(ClkmgrError::Truncated {
                needed: self.offset + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, ClkmgrError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, ClkmgrError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16, ClkmgrError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn get_u32(&mut self) -> Result<u32, ClkmgrError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn get_i32(&mut self) -> Result<i32, ClkmgrError> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_u64(&mut self) -> Result<u64, ClkmgrError> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn get_i64(&mut self) -> Result<i64, ClkmgrError> {
        Ok(self.get_u64()? as i64)
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], ClkmgrError> {
        self.take(n)
    }

    pub fn get_fixed_array<const N: usize>(&mut self) -> Result<[u8; N], ClkmgrError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn get_str(&mut self) -> Result<String, ClkmgrError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ClkmgrError::MalformedField(format!("invalid utf-8 string: {e}")))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_primitives() {
        let mut enc = Encoder::new();
        enc.put_u8(0xab).unwrap();
        enc.put_u16(0x1234).unwrap();
        enc.put_u32(0xdead_beef).unwrap();
        enc.put_i64(-42).unwrap();
        enc.put_str("clkmgr").unwrap();
        enc.put_fixed_array(&[1u8, 2, 3, 4]).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u8().unwrap(), 0xab);
        assert_eq!(dec.get_u16().unwrap(), 0x1234);
        assert_eq!(dec.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(dec.get_i64().unwrap(), -42);
        assert_eq!(dec.get_str().unwrap(), "clkmgr");
        assert_eq!(dec.get_fixed_array::<4>().unwrap(), [1, 2, 3, 4]);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn truncated_read_is_an_error() {
        let bytes = [0u8; 1];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.get_u32(),
            Err(ClkmgrError::Truncated { .. })
        ));
    }

    #[test]
    fn overflow_write_is_an_error() {
        let mut enc = Encoder::new();
        let chunk = vec![0u8; MAX_BUFFER_LEN];
        enc.put_bytes(&chunk).unwrap();
        assert!(matches!(
            enc.put_u8(1),
            Err(ClkmgrError::BufferOverflow { .. })
        ));
    }

    proptest! {
        #[test]
        fn u32_and_i64_round_trip(a in any::<u32>(), b in any::<i64>()) {
            let mut enc = Encoder::new();
            enc.put_u32(a).unwrap();
            enc.put_i64(b).unwrap();
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            prop_assert_eq!(dec.get_u32().unwrap(), a);
            prop_assert_eq!(dec.get_i64().unwrap(), b);
        }

        #[test]
        fn fixed_array_round_trips_for_any_bytes(arr in any::<[u8; 8]>()) {
            let mut enc = Encoder::new();
            enc.put_fixed_array(&arr).unwrap();
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            prop_assert_eq!(dec.get_fixed_array::<8>().unwrap(), arr);
        }
    }
}
