use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use crate::{
    AuthStage, CancelCause, CancelToken, ConnConfig, ConnError, ENVELOPE_LEN, Envelope,
    FragmentViolation, Frame, FrameFlags, FrameHeader, FrameType, Message, ProtocolError,
    read_frame, write_frame,
};

type Reader = Box<dyn AsyncRead + Unpin + Send + Sync>;
type Writer = Box<dyn AsyncWrite + Unpin + Send + Sync>;

/// One tunnel endpoint over an ordered, reliable byte stream.
///
/// A connection exclusively owns its transport and is safe for exactly one
/// concurrent sender and one concurrent receiver: each direction is
/// serialized behind its own lock, so a fragmented send is atomic from the
/// peer's view and reassembly is atomic for the receiving task.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    reader: AsyncMutex<Reader>,
    writer: AsyncMutex<Writer>,
    closed: AtomicBool,
    config: ConnConfig,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Self::with_config(stream, ConnConfig::default())
    }

    pub fn with_config<S>(stream: S, config: ConnConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_split_with_config(reader, writer, config)
    }

    /// Build a connection from separate read and write handles, such as a
    /// split TLS stream.
    pub fn from_split<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + Sync + 'static,
        W: AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Self::from_split_with_config(reader, writer, ConnConfig::default())
    }

    pub fn from_split_with_config<R, W>(reader: R, writer: W, config: ConnConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + Sync + 'static,
        W: AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Connection {
            inner: Arc::new(ConnInner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// In-memory connected pair, mostly for tests.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_config(ConnConfig::default())
    }

    pub fn pair_with_config(config: ConnConfig) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Self::with_config(a, config), Self::with_config(b, config))
    }

    pub fn config(&self) -> &ConnConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the underlying endpoint.
    ///
    /// Shuts down the write half so the peer observes EOF. Safe to call
    /// more than once; transport errors during shutdown are swallowed.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing connection");
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Emit one logical message, fragmenting as needed.
    ///
    /// Fragment sizing follows the connection's `max_frame_payload`; flag
    /// discipline is `START|END` for a single frame, else `START`, bare
    /// middles, and a final `END`.
    pub async fn send(&self, message: &Message, token: &CancelToken) -> Result<(), ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let frames = encode_message(message, &self.inner.config)?;
        trace!(
            frame_type = %message.frame_type(),
            frames = frames.len(),
            "sending message"
        );

        let mut writer = self.inner.writer.lock().await;
        let io = async {
            for frame in &frames {
                write_frame(&mut **writer, frame).await?;
            }
            writer.flush().await?;
            Ok(())
        };
        resolve(token.guard(io).await, token)
    }

    /// Return the next fully reassembled logical message.
    ///
    /// Any protocol-class failure closes the connection best-effort before
    /// the error is surfaced; a desynchronized stream cannot be recovered,
    /// and tearing it down lets the peer observe EOF. I/O errors and
    /// cancellation leave the connection open.
    pub async fn recv(&self, token: &CancelToken) -> Result<Message, ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let max_payload = self.inner.config.max_frame_payload;
        let result = {
            let mut reader = self.inner.reader.lock().await;
            let guarded = token.guard(recv_message(&mut **reader, max_payload)).await;
            resolve(guarded, token)
        };
        if let Err(e) = &result {
            if e.is_protocol() {
                debug!(error = %e, "protocol error on receive, closing connection");
                self.close().await;
            }
        }
        result
    }

    /// Send a keepalive probe.
    pub async fn ping(&self, token: &CancelToken) -> Result<(), ConnError> {
        self.send(&Message::Ping, token).await
    }
}

/// Collapse a guarded result, reporting the cancellation cause in place of
/// an I/O error that surfaced while the token was already signalled.
/// Protocol errors are never masked; they reflect peer traffic, not the
/// interrupted syscall.
fn resolve<T>(
    guarded: Result<Result<T, ConnError>, CancelCause>,
    token: &CancelToken,
) -> Result<T, ConnError> {
    match guarded {
        Err(cause) => Err(ConnError::Cancelled(cause)),
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ConnError::Io(e))) => match token.cause() {
            Some(cause) => Err(ConnError::Cancelled(cause)),
            None => Err(ConnError::Io(e)),
        },
        Ok(Err(e)) => Err(e),
    }
}

fn keepalive_frame(frame_type: FrameType) -> Frame {
    Frame::new(frame_type, FrameFlags::WHOLE, 0, Vec::new())
}

/// Split `body` into frames of at most `max_payload` bytes, with `prefix`
/// prepended to the first frame's payload.
fn fragment(
    frame_type: FrameType,
    stream_id: u64,
    prefix: &[u8],
    body: &[u8],
    max_payload: u32,
) -> Vec<Frame> {
    let max = max_payload as usize;
    let first_take = body.len().min(max - prefix.len());

    let mut first_payload = Vec::with_capacity(prefix.len() + first_take);
    first_payload.extend_from_slice(prefix);
    first_payload.extend_from_slice(&body[..first_take]);

    let mut rest = &body[first_take..];
    if rest.is_empty() {
        return vec![Frame::new(frame_type, FrameFlags::WHOLE, stream_id, first_payload)];
    }

    let mut frames = vec![Frame::new(
        frame_type,
        FrameFlags::START,
        stream_id,
        first_payload,
    )];
    while !rest.is_empty() {
        let take = rest.len().min(max);
        let (chunk, tail) = rest.split_at(take);
        let flags = if tail.is_empty() {
            FrameFlags::END
        } else {
            FrameFlags::empty()
        };
        frames.push(Frame::new(frame_type, flags, stream_id, chunk.to_vec()));
        rest = tail;
    }
    frames
}

fn encode_message(message: &Message, config: &ConnConfig) -> Result<Vec<Frame>, ConnError> {
    match message {
        Message::Ping => Ok(vec![keepalive_frame(FrameType::Ping)]),
        Message::Pong => Ok(vec![keepalive_frame(FrameType::Pong)]),
        Message::Auth { stage, body } => {
            config.ensure_sendable()?;
            Ok(fragment(
                stage.frame_type(),
                0,
                &[],
                body,
                config.max_frame_payload,
            ))
        }
        Message::Payload {
            stream_id,
            kind,
            format,
            data,
        } => {
            if *stream_id == 0 {
                return Err(ProtocolError::InvalidStreamId {
                    frame_type: FrameType::Payload,
                    stream_id: 0,
                }
                .into());
            }
            config.ensure_sendable()?;
            let envelope = Envelope {
                kind: *kind,
                format: *format,
            };
            Ok(fragment(
                FrameType::Payload,
                *stream_id,
                &envelope.encode(),
                data,
                config.max_frame_payload,
            ))
        }
    }
}

async fn recv_message<R>(reader: &mut R, max_payload: u32) -> Result<Message, ConnError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let first = read_frame(reader, max_payload).await?;
    let header = first.header;
    trace!(frame_type = %header.frame_type, stream_id = header.stream_id, "received first frame");

    if !header.flags.contains(FrameFlags::START) {
        return Err(FragmentViolation::MissingStart.into());
    }

    match header.frame_type {
        FrameType::Ping | FrameType::Pong => {
            if header.flags != FrameFlags::WHOLE {
                return Err(FragmentViolation::ControlFragmented.into());
            }
            if header.stream_id != 0 {
                return Err(ProtocolError::InvalidStreamId {
                    frame_type: header.frame_type,
                    stream_id: header.stream_id,
                }
                .into());
            }
            if !first.payload.is_empty() {
                return Err(FragmentViolation::ControlPayload {
                    len: first.payload.len() as u32,
                }
                .into());
            }
            Ok(match header.frame_type {
                FrameType::Ping => Message::Ping,
                _ => Message::Pong,
            })
        }
        FrameType::Payload => {
            if header.stream_id == 0 {
                return Err(ProtocolError::InvalidStreamId {
                    frame_type: FrameType::Payload,
                    stream_id: 0,
                }
                .into());
            }
            let envelope = Envelope::parse(&first.payload)?;
            let data = reassemble(
                reader,
                max_payload,
                &header,
                first.payload[ENVELOPE_LEN..].to_vec(),
            )
            .await?;
            Ok(Message::Payload {
                stream_id: header.stream_id,
                kind: envelope.kind,
                format: envelope.format,
                data: Bytes::from(data),
            })
        }
        auth_type => {
            let Some(stage) = AuthStage::from_frame_type(auth_type) else {
                return Err(ProtocolError::UnknownType {
                    found: auth_type.as_u8(),
                }
                .into());
            };
            if header.stream_id != 0 {
                return Err(ProtocolError::InvalidStreamId {
                    frame_type: auth_type,
                    stream_id: header.stream_id,
                }
                .into());
            }
            let body = reassemble(reader, max_payload, &header, first.payload).await?;
            Ok(Message::Auth {
                stage,
                body: Bytes::from(body),
            })
        }
    }
}

/// Append continuation fragments to `buf` until a frame carrying `END`.
///
/// Continuations must keep the opener's type and stream id, must not carry
/// `START`, and contribute their payload bytes verbatim.
async fn reassemble<R>(
    reader: &mut R,
    max_payload: u32,
    opener: &FrameHeader,
    mut buf: Vec<u8>,
) -> Result<Vec<u8>, ConnError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut last_flags = opener.flags;
    while !last_flags.contains(FrameFlags::END) {
        let next = read_frame(reader, max_payload).await?;
        if next.header.frame_type != opener.frame_type {
            return Err(FragmentViolation::TypeChanged {
                expected: opener.frame_type,
                found: next.header.frame_type,
            }
            .into());
        }
        if next.header.stream_id != opener.stream_id {
            return Err(FragmentViolation::StreamChanged {
                expected: opener.stream_id,
                found: next.header.stream_id,
            }
            .into());
        }
        if next.header.flags.contains(FrameFlags::START) {
            return Err(FragmentViolation::UnexpectedStart.into());
        }
        buf.extend_from_slice(&next.payload);
        last_flags = next.header.flags;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ConnConfig {
        ConnConfig {
            max_frame_payload: 16,
        }
    }

    #[test]
    fn ping_is_one_whole_frame() {
        let frames = encode_message(&Message::Ping, &ConnConfig::default()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.frame_type, FrameType::Ping);
        assert_eq!(frames[0].header.flags, FrameFlags::WHOLE);
        assert_eq!(frames[0].header.stream_id, 0);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn small_payload_is_one_frame_with_envelope() {
        let message = Message::request(123, &b"hello world"[..]);
        let frames = encode_message(&message, &ConnConfig::default()).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.header.flags, FrameFlags::WHOLE);
        assert_eq!(frame.header.stream_id, 123);
        assert_eq!(&frame.payload[..4], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&frame.payload[4..], b"hello world");
    }

    #[test]
    fn payload_fragmentation_respects_max_and_flags() {
        let data: Vec<u8> = (0..100u8).collect();
        let message = Message::response(999, data.clone());
        let frames = encode_message(&message, &small_config()).unwrap();

        // First frame: envelope + 12 data bytes; then chunks of 16.
        assert_eq!(frames[0].payload.len(), 16);
        assert_eq!(frames[0].header.flags, FrameFlags::START);
        for frame in &frames[1..frames.len() - 1] {
            assert_eq!(frame.header.flags, FrameFlags::empty());
            assert!(frame.payload.len() <= 16);
        }
        assert_eq!(frames.last().unwrap().header.flags, FrameFlags::END);

        let total: usize = frames.iter().map(|f| f.payload.len()).sum();
        assert_eq!(total, ENVELOPE_LEN + data.len());
        for frame in &frames {
            assert_eq!(frame.header.stream_id, 999);
            assert_eq!(frame.header.frame_type, FrameType::Payload);
        }
    }

    #[test]
    fn empty_payload_message_is_envelope_only() {
        let message = Message::oneway(5, Bytes::new());
        let frames = encode_message(&message, &small_config()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.flags, FrameFlags::WHOLE);
        assert_eq!(frames[0].payload, vec![0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn zero_stream_id_rejected_on_send() {
        let message = Message::request(0, &b"x"[..]);
        match encode_message(&message, &ConnConfig::default()) {
            Err(ConnError::Protocol(ProtocolError::InvalidStreamId { stream_id: 0, .. })) => {}
            other => panic!("expected invalid stream id, got {other:?}"),
        }
    }

    #[test]
    fn unusable_max_payload_is_config_error() {
        let config = ConnConfig {
            max_frame_payload: 4,
        };
        let message = Message::request(1, &b"x"[..]);
        assert!(matches!(
            encode_message(&message, &config),
            Err(ConnError::Config(_))
        ));
    }

    #[test]
    fn resolve_masks_only_io_errors_after_cancel() {
        let token = CancelToken::new();
        token.cancel();

        let io_err: Result<Result<(), ConnError>, CancelCause> = Ok(Err(ConnError::Io(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        )));
        assert!(matches!(
            resolve(io_err, &token),
            Err(ConnError::Cancelled(CancelCause::Cancelled))
        ));

        let proto_err: Result<Result<(), ConnError>, CancelCause> = Ok(Err(
            ConnError::Protocol(ProtocolError::BadVersion { found: 2 }),
        ));
        assert!(matches!(
            resolve(proto_err, &token),
            Err(ConnError::Protocol(ProtocolError::BadVersion { found: 2 }))
        ));
    }

    #[test]
    fn auth_body_fragments_generically() {
        let body = vec![0xABu8; 40];
        let message = Message::auth(AuthStage::Begin, body.clone());
        let frames = encode_message(&message, &small_config()).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].header.flags, FrameFlags::START);
        assert_eq!(frames[1].header.flags, FrameFlags::empty());
        assert_eq!(frames[2].header.flags, FrameFlags::END);
        let total: usize = frames.iter().map(|f| f.payload.len()).sum();
        assert_eq!(total, body.len());
        for frame in &frames {
            assert_eq!(frame.header.stream_id, 0);
            assert_eq!(frame.header.frame_type, FrameType::AuthBegin);
        }
    }
}
