use crate::{
    errors::ProtocolError,
    varint::{VarInt, CONTINUE_BIT, MAX_VARINT_LEN},
};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, Result};

/// Largest packet the server list ping protocol allows (2^21 - 1 bytes).
pub(crate) const MAX_FRAME_LEN: i32 = 2_097_151;

/// Trait to allow for reading `VarInt`s and whole frames from the socket.
///
/// The type is specified [in wiki.vg](https://wiki.vg/Protocol#VarInt_and_VarLong).
#[async_trait]
pub(crate) trait ReadFrame {
    /// Read a [VarInt] from the socket.
    /// Returns the parsed value as [i32] in a [Result].
    async fn read_varint(&mut self) -> Result<i32>;

    /// Read one length-prefixed frame and return its body, length excluded.
    async fn read_frame(&mut self) -> Result<Bytes>;
}

#[async_trait]
impl<T> ReadFrame for T
where
    T: AsyncRead + Unpin + Send,
{
    async fn read_varint(&mut self) -> Result<i32> {
        let mut bytes = BytesMut::with_capacity(MAX_VARINT_LEN);

        loop {
            let current = read_u8_or_truncated(self).await?;
            bytes.put_u8(current);

            if current & CONTINUE_BIT == 0 {
                break;
            }

            if bytes.len() == MAX_VARINT_LEN {
                return Err(ProtocolError::MalformedVarInt.into());
            }
        }

        let value: i32 = VarInt::new(bytes.freeze()).try_into()?;
        Ok(value)
    }

    async fn read_frame(&mut self) -> Result<Bytes> {
        let len = self.read_varint().await?;

        if !(1..=MAX_FRAME_LEN).contains(&len) {
            return Err(ProtocolError::FrameTooLarge(len).into());
        }

        let mut buffer = vec![0; len as usize];
        self.read_exact(&mut buffer)
            .await
            .map_err(truncated_on_eof)?;

        Ok(Bytes::from(buffer))
    }
}

async fn read_u8_or_truncated<T>(reader: &mut T) -> Result<u8>
where
    T: AsyncRead + Unpin + Send,
{
    reader.read_u8().await.map_err(truncated_on_eof)
}

fn truncated_on_eof(err: std::io::Error) -> std::io::Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::TruncatedStream.into()
    } else {
        err
    }
}
