// src/control/frame.rs

//! Length-prefixed frames: `[u32 BE length][u8 code][payload]`.
//!
//! `length` counts the code byte plus the payload.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{HotswapError, Result};

pub const HEADER_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = 1 + self.payload.len();
        if len > MAX_FRAME_LEN {
            return Err(HotswapError::FrameTooLarge(len));
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + len);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.push(self.code);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not hold a complete frame yet, and
    /// the number of bytes consumed otherwise.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(header) = buf.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let len = frame_len(header)?;
        let Some(body) = buf.get(HEADER_LEN..HEADER_LEN + len) else {
            return Ok(None);
        };
        let frame = Frame::new(body[0], &body[1..]);
        Ok(Some((frame, HEADER_LEN + len)))
    }
}

fn frame_len(header: &[u8]) -> Result<usize> {
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(header);
    let len = u32::from_be_bytes(raw) as usize;
    if len == 0 {
        return Err(HotswapError::Protocol(
            "frame length must include the command code".to_string(),
        ));
    }
    if len > MAX_FRAME_LEN {
        return Err(HotswapError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = frame_len(&header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let payload = body.split_off(1);
    Ok(Some(Frame {
        code: body[0],
        payload,
    }))
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = frame.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
