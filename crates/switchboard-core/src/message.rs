use bytes::Bytes;

use crate::{EnvelopeViolation, FrameType};

/// Size of the payload-message envelope carried at the start of the first
/// fragment of every payload message.
pub const ENVELOPE_LEN: usize = 4;

/// Handshake stage of an auth message; maps 1:1 onto the auth frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Begin,
    Challenge,
    Proof,
    Ok,
    Error,
}

impl AuthStage {
    pub fn frame_type(self) -> FrameType {
        match self {
            AuthStage::Begin => FrameType::AuthBegin,
            AuthStage::Challenge => FrameType::AuthChallenge,
            AuthStage::Proof => FrameType::AuthProof,
            AuthStage::Ok => FrameType::AuthOk,
            AuthStage::Error => FrameType::AuthError,
        }
    }

    pub fn from_frame_type(frame_type: FrameType) -> Option<AuthStage> {
        match frame_type {
            FrameType::AuthBegin => Some(AuthStage::Begin),
            FrameType::AuthChallenge => Some(AuthStage::Challenge),
            FrameType::AuthProof => Some(AuthStage::Proof),
            FrameType::AuthOk => Some(AuthStage::Ok),
            FrameType::AuthError => Some(AuthStage::Error),
            _ => None,
        }
    }
}

/// Role of a payload message within its stream.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Request = 0x01,
    Response = 0x02,
    Oneway = 0x03,
}

impl PayloadKind {
    pub fn from_u8(value: u8) -> Option<PayloadKind> {
        match value {
            0x01 => Some(PayloadKind::Request),
            0x02 => Some(PayloadKind::Response),
            0x03 => Some(PayloadKind::Oneway),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Encoding of a payload message's data bytes. Only opaque bytes are
/// defined in v1.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    #[default]
    Opaque = 0x00,
}

impl PayloadFormat {
    pub fn from_u8(value: u8) -> Option<PayloadFormat> {
        match value {
            0x00 => Some(PayloadFormat::Opaque),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The 4-byte header at the start of a payload message's first fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub kind: PayloadKind,
    pub format: PayloadFormat,
}

impl Envelope {
    pub fn encode(&self) -> [u8; ENVELOPE_LEN] {
        [self.kind.as_u8(), self.format.as_u8(), 0x00, 0x00]
    }

    /// Parse the envelope from the head of a first fragment.
    pub fn parse(bytes: &[u8]) -> Result<Envelope, EnvelopeViolation> {
        if bytes.len() < ENVELOPE_LEN {
            return Err(EnvelopeViolation::Truncated {
                len: bytes.len() as u32,
            });
        }
        let reserved = u16::from_be_bytes([bytes[2], bytes[3]]);
        if reserved != 0 {
            return Err(EnvelopeViolation::ReservedBits { found: reserved });
        }
        let format = PayloadFormat::from_u8(bytes[1])
            .ok_or(EnvelopeViolation::UnknownFormat { found: bytes[1] })?;
        let kind = PayloadKind::from_u8(bytes[0])
            .ok_or(EnvelopeViolation::UnknownKind { found: bytes[0] })?;
        Ok(Envelope { kind, format })
    }
}

/// One reassembled logical message.
///
/// The model is purely structural; cross-field rules (stream id domains,
/// keepalive emptiness) are enforced on the connection's send path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keepalive probe.
    Ping,
    /// Keepalive answer.
    Pong,
    /// One handshake stage; the body is a UTF-8 JSON document owned by the
    /// auth layer.
    Auth { stage: AuthStage, body: Bytes },
    /// Proxied application bytes on a non-zero stream.
    Payload {
        stream_id: u64,
        kind: PayloadKind,
        format: PayloadFormat,
        data: Bytes,
    },
}

impl Message {
    /// Frame type this message is carried as.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Message::Ping => FrameType::Ping,
            Message::Pong => FrameType::Pong,
            Message::Auth { stage, .. } => stage.frame_type(),
            Message::Payload { .. } => FrameType::Payload,
        }
    }

    /// Convenience constructor for an opaque request.
    pub fn request(stream_id: u64, data: impl Into<Bytes>) -> Message {
        Message::Payload {
            stream_id,
            kind: PayloadKind::Request,
            format: PayloadFormat::Opaque,
            data: data.into(),
        }
    }

    /// Convenience constructor for an opaque response.
    pub fn response(stream_id: u64, data: impl Into<Bytes>) -> Message {
        Message::Payload {
            stream_id,
            kind: PayloadKind::Response,
            format: PayloadFormat::Opaque,
            data: data.into(),
        }
    }

    /// Convenience constructor for an opaque oneway message.
    pub fn oneway(stream_id: u64, data: impl Into<Bytes>) -> Message {
        Message::Payload {
            stream_id,
            kind: PayloadKind::Oneway,
            format: PayloadFormat::Opaque,
            data: data.into(),
        }
    }

    /// Convenience constructor for an auth stage message.
    pub fn auth(stage: AuthStage, body: impl Into<Bytes>) -> Message {
        Message::Auth {
            stage,
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope {
            kind: PayloadKind::Response,
            format: PayloadFormat::Opaque,
        };
        let bytes = envelope.encode();
        assert_eq!(bytes, [0x02, 0x00, 0x00, 0x00]);
        assert_eq!(Envelope::parse(&bytes), Ok(envelope));
    }

    #[test]
    fn envelope_rejects_truncation() {
        assert_eq!(
            Envelope::parse(&[0x01, 0x00, 0x00]),
            Err(EnvelopeViolation::Truncated { len: 3 })
        );
    }

    #[test]
    fn envelope_rejects_reserved_bits() {
        assert_eq!(
            Envelope::parse(&[0x01, 0x00, 0x00, 0x01]),
            Err(EnvelopeViolation::ReservedBits { found: 1 })
        );
    }

    #[test]
    fn envelope_rejects_unknown_format() {
        assert_eq!(
            Envelope::parse(&[0x01, 0x07, 0x00, 0x00]),
            Err(EnvelopeViolation::UnknownFormat { found: 0x07 })
        );
    }

    #[test]
    fn envelope_rejects_unknown_kind() {
        for kind in [0x00u8, 0x04, 0xFF] {
            assert_eq!(
                Envelope::parse(&[kind, 0x00, 0x00, 0x00]),
                Err(EnvelopeViolation::UnknownKind { found: kind })
            );
        }
    }

    #[test]
    fn auth_stage_maps_onto_frame_types() {
        for stage in [
            AuthStage::Begin,
            AuthStage::Challenge,
            AuthStage::Proof,
            AuthStage::Ok,
            AuthStage::Error,
        ] {
            assert_eq!(AuthStage::from_frame_type(stage.frame_type()), Some(stage));
        }
        assert_eq!(AuthStage::from_frame_type(FrameType::Ping), None);
        assert_eq!(AuthStage::from_frame_type(FrameType::Payload), None);
    }
}
