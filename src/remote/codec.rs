use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::remote::protocol::Frame;

pub(crate) const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub(crate) enum CodecError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("frame encoding error: {0}")]
  Encoding(#[from] serde_json::Error),
  #[error("frame too large: {0} bytes")]
  FrameTooLarge(usize),
}

/// Frame format: a u32 little-endian length prefix followed by the JSON
/// body. The transport underneath only has to be a reliable ordered byte
/// stream.
pub(crate) async fn write_frame<W>(stream: &mut W, frame: &Frame) -> Result<(), CodecError>
where
  W: AsyncWrite + Unpin, {
  let body = serde_json::to_vec(frame)?;
  if body.len() > MAX_FRAME_SIZE {
    return Err(CodecError::FrameTooLarge(body.len()));
  }
  stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
  stream.write_all(&body).await?;
  stream.flush().await?;
  Ok(())
}

pub(crate) async fn read_frame<R>(stream: &mut R) -> Result<Frame, CodecError>
where
  R: AsyncRead + Unpin, {
  let mut prefix = [0u8; 4];
  stream.read_exact(&mut prefix).await?;
  let length = u32::from_le_bytes(prefix) as usize;
  if length > MAX_FRAME_SIZE {
    return Err(CodecError::FrameTooLarge(length));
  }
  let mut body = vec![0u8; length];
  stream.read_exact(&mut body).await?;
  Ok(serde_json::from_slice(&body)?)
}
