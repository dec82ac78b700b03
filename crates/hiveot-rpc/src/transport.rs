//! Framed byte transports.
//!
//! The connection layer only needs a sink and a stream of whole frames. Byte
//! streams (UDS, TCP, TLS) get length-delimited framing; WebSocket transports map
//! one binary message to one frame.

use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use hiveot_kernel::{HubError, HubResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Largest accepted frame.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = HubError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = HubResult<Bytes>> + Send>>;

/// Bidirectional frame conduit.
pub struct FrameTransport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for FrameTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTransport").finish_non_exhaustive()
    }
}

impl FrameTransport {
    pub fn new<S, T>(sink: S, stream: T) -> Self
    where
        S: Sink<Bytes, Error = HubError> + Send + 'static,
        T: Stream<Item = HubResult<Bytes>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Length-delimited frames over a byte stream.
    pub fn from_io<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        let (sink, stream) = Framed::new(io, codec).split();
        let sink = sink.sink_map_err(HubError::from);
        let stream = stream.map(|frame| frame.map(BytesMut::freeze).map_err(HubError::from));
        Self::new(sink, stream)
    }

    /// Two connected in-memory transports.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Self::from_io(a), Self::from_io(b))
    }
}
