//! Request payload handle with shared, drainable state.
//!
//! A [`Body`] is a cheaply cloneable handle: every clone refers to the same underlying
//! stream, so one party (the router) can keep a handle while another (the handler) owns
//! the [`Request`](super::Request). Bytes consumed through any clone are gone for all of
//! them.

use std::fmt;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

/// Read buffer size used by [`Body::read_to_end`] and [`Body::drain`].
const CHUNK_SIZE: usize = 8 * 1024;

type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

enum State {
    // No payload was ever attached.
    Empty,
    Stream(BoxReader),
    // Fully drained or explicitly released.
    Closed,
}

/// A shared handle to an HTTP request body.
///
/// # Examples
///
/// ```
/// use autoroute::http::Body;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let body = Body::from_bytes("hello");
/// let other = body.clone();
///
/// assert_eq!(body.read_chunk(2).await?.as_ref(), b"he");
/// assert_eq!(other.drain().await?, 3);
/// assert!(body.is_closed().await);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Body {
    state: Arc<Mutex<State>>,
}

impl Body {
    /// Creates a body with no payload.
    pub fn empty() -> Self {
        Self::with_state(State::Empty)
    }

    /// Creates a body backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::from_reader(Cursor::new(bytes))
    }

    /// Creates a body that streams from an arbitrary async reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::with_state(State::Stream(Box::pin(reader)))
    }

    fn with_state(state: State) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Reads up to `max` bytes. An empty result means the body is exhausted.
    pub async fn read_chunk(&self, max: usize) -> io::Result<Bytes> {
        let mut state = self.state.lock().await;
        let State::Stream(reader) = &mut *state else {
            return Ok(Bytes::new());
        };

        let mut buf = BytesMut::with_capacity(max);
        reader.as_mut().take(max as u64).read_buf(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Reads until the body ends or `limit` bytes have been collected.
    pub async fn read_up_to(&self, limit: usize) -> io::Result<Bytes> {
        let mut state = self.state.lock().await;
        let State::Stream(reader) = &mut *state else {
            return Ok(Bytes::new());
        };

        let mut buf = Vec::new();
        reader.as_mut().take(limit as u64).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Reads the remainder of the body into a single buffer.
    ///
    /// The handle stays open afterwards; later reads simply return nothing.
    pub async fn read_to_end(&self) -> io::Result<Bytes> {
        let mut state = self.state.lock().await;
        let State::Stream(reader) = &mut *state else {
            return Ok(Bytes::new());
        };

        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        while reader.read_buf(&mut buf).await? != 0 {
            buf.reserve(CHUNK_SIZE);
        }
        Ok(buf.freeze())
    }

    /// Reads and discards every remaining byte, then releases the stream.
    ///
    /// Returns the number of bytes discarded. Absent, empty, and already closed bodies
    /// are a no-op.
    pub async fn drain(&self) -> io::Result<u64> {
        let mut state = self.state.lock().await;
        let discarded = match &mut *state {
            State::Stream(reader) => tokio::io::copy(reader, &mut tokio::io::sink()).await?,
            State::Empty | State::Closed => return Ok(0),
        };
        *state = State::Closed;
        Ok(discarded)
    }

    /// Returns `true` once the body has been drained.
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, State::Closed)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_body_reads_nothing() {
        let body = Body::empty();
        assert!(body.read_to_end().await.unwrap().is_empty());
        assert_eq!(body.drain().await.unwrap(), 0);
        assert!(!body.is_closed().await);
    }

    #[tokio::test]
    async fn empty_bytes_become_empty_body() {
        let body = Body::from_bytes(Bytes::new());
        assert_eq!(body.drain().await.unwrap(), 0);
        assert!(!body.is_closed().await);
    }

    #[tokio::test]
    async fn clones_share_the_stream() {
        let body = Body::from_bytes("abcdef");
        let handle = body.clone();

        assert_eq!(body.read_chunk(4).await.unwrap().as_ref(), b"abcd");
        assert_eq!(handle.read_to_end().await.unwrap().as_ref(), b"ef");
    }

    #[tokio::test]
    async fn read_up_to_stops_at_limit() {
        let body = Body::from_bytes("0123456789");
        assert_eq!(body.read_up_to(4).await.unwrap().as_ref(), b"0123");
        assert_eq!(body.read_up_to(64).await.unwrap().as_ref(), b"456789");
    }

    #[tokio::test]
    async fn drain_discards_and_closes() {
        let body = Body::from_bytes("leftover payload");
        body.read_chunk(4).await.unwrap();

        assert_eq!(body.drain().await.unwrap(), 12);
        assert!(body.is_closed().await);
        assert!(body.read_chunk(16).await.unwrap().is_empty());
        assert_eq!(body.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn streams_from_reader() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let body = Body::from_reader(rx);

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(b"streamed").await.unwrap();
        });

        assert_eq!(body.read_to_end().await.unwrap().as_ref(), b"streamed");
    }
}
