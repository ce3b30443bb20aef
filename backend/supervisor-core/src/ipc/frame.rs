use crate::error::ipc::IpcError;

use common::ErrorLocation;

use std::panic::Location;

use log::trace;
use prost::Message as ProstMessage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;
const READ_CHUNK_LEN: usize = 8 * 1024;

/// Prefix `payload` with its little-endian `u32` length.
#[track_caller]
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, IpcError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(IpcError::Frame {
            message: format!(
                "Payload of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
                payload.len()
            ),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Payload(Vec<u8>),
    /// Header announced more than the decoder accepts. The stream cannot be
    /// resynchronised after this.
    TooLarge(usize),
}

/// Incremental frame parser. Bytes go in with [`push`](Self::push) in any
/// chunking; complete frames come out of [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return None;
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;

        if len > self.max_len {
            self.buffer.clear();
            return Some(Frame::TooLarge(len));
        }

        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return None;
        }

        let payload = self.buffer[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();
        self.buffer.drain(..FRAME_HEADER_LEN + len);
        Some(Frame::Payload(payload))
    }
}

/// A byte stream carrying length-prefixed protobuf messages.
pub struct FramedStream<S> {
    stream: S,
    decoder: FrameDecoder,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::default(),
        }
    }

    pub async fn send<M: ProstMessage>(&mut self, message: &M) -> Result<(), IpcError> {
        let frame = encode_frame(&message.encode_to_vec())?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        trace!("Sent frame of {} bytes", frame.len());
        Ok(())
    }

    /// Next complete frame, or `None` once the peer closed cleanly between frames.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>, IpcError> {
        let mut chunk = [0u8; READ_CHUNK_LEN];

        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }

            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                if self.decoder.buffered() == 0 {
                    return Ok(None);
                }

                return Err(IpcError::Frame {
                    message: format!(
                        "Connection closed with {} bytes of an incomplete frame",
                        self.decoder.buffered()
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            self.decoder.push(&chunk[..read]);
        }
    }

    /// Next decoded message, or `None` on clean close.
    pub async fn recv<M: ProstMessage + Default>(&mut self) -> Result<Option<M>, IpcError> {
        match self.recv_frame().await? {
            None => Ok(None),
            Some(Frame::Payload(payload)) => Ok(Some(M::decode(payload.as_slice())?)),
            Some(Frame::TooLarge(len)) => Err(IpcError::Frame {
                message: format!("Peer announced a {len} byte frame"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}
