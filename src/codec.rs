//! Wire codec (C1): length-prefixed big-endian frames.
//!
//! Frame layout on the wire, both directions:
//! `[ u32 total_size ][ u8 opcode ][ payload ... ]`, where `total_size`
//! covers `opcode + payload` but not the size field itself.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RemoteError;

/// Builds one outgoing frame. Fields are appended in wire order, then
/// [`MessageBuilder::finish`] prepends the big-endian size prefix.
pub struct MessageBuilder {
    opcode: u8,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            body: Vec::new(),
        }
    }

    pub fn put_u8(mut self, v: u8) -> Self {
        self.body.push(v);
        self
    }

    pub fn put_u16(mut self, v: u16) -> Self {
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u32(mut self, v: u32) -> Self {
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u64(mut self, v: u64) -> Self {
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_string(mut self, s: &str) -> Self {
        let bytes = s.as_bytes();
        self.body
            .extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.body.extend_from_slice(bytes);
        self
    }

    /// Produce the complete frame: `size | opcode | payload`.
    pub fn finish(self) -> Vec<u8> {
        let total_size = 1u32 + self.body.len() as u32;
        let mut out = Vec::with_capacity(4 + total_size as usize);
        out.extend_from_slice(&total_size.to_be_bytes());
        out.push(self.opcode);
        out.extend_from_slice(&self.body);
        out
    }

    pub async fn send<W: AsyncWrite + Unpin>(self, w: &mut W) -> Result<(), RemoteError> {
        let frame = self.finish();
        w.write_all(&frame).await?;
        Ok(())
    }
}

/// Cursor over a received frame's payload. Handlers consume fields
/// left-to-right; [`MessageCursor::finish`] enforces the post-dispatch
/// exhaustion check.
pub struct MessageCursor<'a> {
    opcode: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageCursor<'a> {
    pub fn new(opcode: u8, data: &'a [u8]) -> Self {
        Self { opcode, data, pos: 0 }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RemoteError> {
        if self.remaining() < n {
            return Err(RemoteError::protocol(format!(
                "underrun: opcode {} wanted {n} bytes, {} remain",
                self.opcode,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, RemoteError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, RemoteError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, RemoteError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, RemoteError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_string(&mut self) -> Result<String, RemoteError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RemoteError::protocol(format!("bad utf-8 in string field: {e}")))
    }

    /// Must be called after a handler finishes consuming a frame; a
    /// non-zero remainder means the handler under-read the payload.
    pub fn finish(self) -> Result<(), RemoteError> {
        if self.remaining() != 0 {
            return Err(RemoteError::protocol(format!(
                "opcode {} left {} unread bytes",
                self.opcode,
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Reads one length-prefixed frame from an async byte stream, per the
/// four-step protocol: size, opcode, payload, hand off.
pub struct FrameReader;

impl FrameReader {
    pub async fn read_frame<R: AsyncRead + Unpin>(
        r: &mut R,
    ) -> Result<(u8, Vec<u8>), RemoteError> {
        let mut size_buf = [0u8; 4];
        r.read_exact(&mut size_buf).await.map_err(map_short_read)?;
        let total_size = u32::from_be_bytes(size_buf);

        if total_size == 0 {
            return Err(RemoteError::protocol("zero-length frame (missing opcode)"));
        }

        let mut opcode_buf = [0u8; 1];
        r.read_exact(&mut opcode_buf).await.map_err(map_short_read)?;
        let opcode = opcode_buf[0];

        let payload_len = (total_size - 1) as usize;
        let mut payload = vec![0u8; payload_len];
        r.read_exact(&mut payload).await.map_err(map_short_read)?;

        Ok((opcode, payload))
    }
}

fn map_short_read(e: std::io::Error) -> RemoteError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        RemoteError::protocol(format!("short read: {e}"))
    } else {
        e.into()
    }
}
