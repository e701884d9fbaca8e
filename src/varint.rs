use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::ops::Deref;

use crate::errors::ProtocolError;

pub(crate) const SEGMENT_BITS: u8 = 0x7f; // 0111 1111
pub(crate) const CONTINUE_BIT: u8 = 0x80; // 1000 0000

/// A VarInt never spans more than this many bytes.
pub(crate) const MAX_VARINT_LEN: usize = 5;

pub(crate) struct VarInt {
    bytes: Bytes,
}

impl VarInt {
    pub(crate) fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<i32> for VarInt {
    fn from(value: i32) -> Self {
        let mut value = value as u32;
        let mut buffer = BytesMut::with_capacity(MAX_VARINT_LEN);

        loop {
            let temp = (value & SEGMENT_BITS as u32) as u8;
            value >>= 7;

            if value == 0 {
                buffer.put_u8(temp);
                break;
            }

            buffer.put_u8(temp | CONTINUE_BIT);
        }

        Self {
            bytes: buffer.freeze(),
        }
    }
}

impl TryFrom<VarInt> for i32 {
    type Error = ProtocolError;

    fn try_from(varint: VarInt) -> Result<Self, Self::Error> {
        let mut bytes = varint.bytes;
        get_varint(&mut bytes)
    }
}

impl Deref for VarInt {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

/// Read one VarInt from the front of `buf`.
///
/// Fails with [`ProtocolError::MalformedVarInt`] after five groups without a
/// terminating byte, and with [`ProtocolError::TruncatedStream`] if `buf`
/// runs out first.
pub(crate) fn get_varint(buf: &mut impl Buf) -> Result<i32, ProtocolError> {
    let mut value: u32 = 0;

    for group in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::TruncatedStream);
        }

        let current = buf.get_u8();
        value |= ((current & SEGMENT_BITS) as u32) << (7 * group);

        if current & CONTINUE_BIT == 0 {
            return Ok(value as i32);
        }
    }

    Err(ProtocolError::MalformedVarInt)
}

pub(crate) fn put_varint(buf: &mut impl BufMut, value: i32) {
    buf.put_slice(&VarInt::from(value));
}

/// Write `string` as a VarInt byte length followed by its UTF-8 bytes.
pub(crate) fn put_string(buf: &mut impl BufMut, string: &str) {
    put_varint(buf, string.len() as i32);
    buf.put_slice(string.as_bytes());
}

/// Read a VarInt-length-prefixed UTF-8 string from the front of `buf`.
pub(crate) fn get_string(buf: &mut impl Buf) -> Result<String, ProtocolError> {
    let len = get_varint(buf)?;
    let len = usize::try_from(len).map_err(|_| ProtocolError::FrameTooLarge(len))?;

    if buf.remaining() < len {
        return Err(ProtocolError::TruncatedStream);
    }

    let mut raw = vec![0; len];
    buf.copy_to_slice(&mut raw);

    String::from_utf8(raw).map_err(|_| ProtocolError::InvalidString)
}
