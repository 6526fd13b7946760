use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ConnError, FrameFlags, ProtocolError};

/// First two bytes of every frame.
pub const FRAME_MAGIC: [u8; 2] = [0x53, 0x42];

/// Protocol version carried in the header's third byte.
pub const FRAME_VERSION: u8 = 0x01;

/// Fixed size of the encoded frame header.
pub const FRAME_HEADER_LEN: usize = 18;

/// On-wire frame types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    AuthBegin = 0x01,
    AuthChallenge = 0x02,
    AuthProof = 0x03,
    AuthOk = 0x04,
    AuthError = 0x05,
    Payload = 0x10,
    Ping = 0xFE,
    Pong = 0xFF,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Option<FrameType> {
        match value {
            0x01 => Some(FrameType::AuthBegin),
            0x02 => Some(FrameType::AuthChallenge),
            0x03 => Some(FrameType::AuthProof),
            0x04 => Some(FrameType::AuthOk),
            0x05 => Some(FrameType::AuthError),
            0x10 => Some(FrameType::Payload),
            0xFE => Some(FrameType::Ping),
            0xFF => Some(FrameType::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for the five handshake stages.
    pub fn is_auth(self) -> bool {
        matches!(
            self,
            FrameType::AuthBegin
                | FrameType::AuthChallenge
                | FrameType::AuthProof
                | FrameType::AuthOk
                | FrameType::AuthError
        )
    }

    /// True for the keepalive frames.
    pub fn is_keepalive(self) -> bool {
        matches!(self, FrameType::Ping | FrameType::Pong)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameType::AuthBegin => "auth_begin",
            FrameType::AuthChallenge => "auth_challenge",
            FrameType::AuthProof => "auth_proof",
            FrameType::AuthOk => "auth_ok",
            FrameType::AuthError => "auth_error",
            FrameType::Payload => "payload",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
        };
        write!(f, "{name}")
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub flags: FrameFlags,
    pub stream_id: u64,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Serialize into the fixed 18-byte wire layout.
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0..2].copy_from_slice(&FRAME_MAGIC);
        buf[2] = FRAME_VERSION;
        buf[3] = self.frame_type.as_u8();
        buf[4..6].copy_from_slice(&self.flags.bits().to_be_bytes());
        buf[6..14].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[14..18].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Validate and decode an 18-byte header.
    ///
    /// Checks run in a fixed priority order so that a frame failing on
    /// several criteria is always rejected the same way: magic, version,
    /// type, flags, then size against `max_payload`.
    pub fn decode(buf: &[u8; FRAME_HEADER_LEN], max_payload: u32) -> Result<Self, ProtocolError> {
        if buf[0..2] != FRAME_MAGIC {
            return Err(ProtocolError::BadMagic {
                found: [buf[0], buf[1]],
            });
        }
        if buf[2] != FRAME_VERSION {
            return Err(ProtocolError::BadVersion { found: buf[2] });
        }
        let frame_type =
            FrameType::from_u8(buf[3]).ok_or(ProtocolError::UnknownType { found: buf[3] })?;
        let raw_flags = u16::from_be_bytes([buf[4], buf[5]]);
        let flags = FrameFlags::from_bits(raw_flags)
            .ok_or(ProtocolError::InvalidFlags { found: raw_flags })?;
        let stream_id = u64::from_be_bytes([
            buf[6], buf[7], buf[8], buf[9], buf[10], buf[11], buf[12], buf[13],
        ]);
        let payload_len = u32::from_be_bytes([buf[14], buf[15], buf[16], buf[17]]);
        if payload_len > max_payload {
            return Err(ProtocolError::FrameTooLarge {
                len: payload_len,
                max: max_payload,
            });
        }
        Ok(FrameHeader {
            frame_type,
            flags,
            stream_id,
            payload_len,
        })
    }
}

/// One wire frame; exists only while crossing the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, flags: FrameFlags, stream_id: u64, payload: Vec<u8>) -> Self {
        Frame {
            header: FrameHeader {
                frame_type,
                flags,
                stream_id,
                payload_len: payload.len() as u32,
            },
            payload,
        }
    }
}

/// Write one frame: header, then payload. Never flushes the writer.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&frame.header.encode()).await?;
    if !frame.payload.is_empty() {
        writer.write_all(&frame.payload).await?;
    }
    Ok(())
}

/// Read and validate one frame.
///
/// Header validation failures map to [`ProtocolError`]; short reads and
/// transport failures surface the underlying I/O error unchanged so EOF
/// stays distinguishable from malformed traffic.
pub async fn read_frame<R>(reader: &mut R, max_payload: u32) -> Result<Frame, ConnError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&header_buf, max_payload)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    if !payload.is_empty() {
        reader.read_exact(&mut payload).await?;
    }
    Ok(Frame { header, payload })
}
