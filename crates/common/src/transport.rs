//! Channel abstraction.
//!
//! The protocol assumes a reliable, ordered byte stream whose
//! confidentiality and integrity are someone else's problem (TLS in
//! production, a duplex pipe in tests). [`Transport`] is the seam: one
//! frame in, one frame out. [`StreamTransport`] adapts any async byte
//! stream, so a TLS stream and an in-process duplex stream share the same
//! implementation, and tests exercise the exact code path production uses.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

use crate::protocol::framing::{read_frame, write_frame};

/// Errors on a channel
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds the frame cap")]
    FrameTooLarge(usize),
}

/// One framed, ordered message channel
pub trait Transport: Send {
    /// Write one framed message.
    fn send_frame(
        &mut self,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Read one framed message. An error means the channel is unusable.
    fn recv_frame(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// [`Transport`] over any async byte stream
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.stream, payload).await
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut self.stream).await
    }
}

/// A connected pair of in-memory transports.
///
/// The client end and server end are symmetric; what one sends the other
/// receives. Dropping either end closes the channel, which the peer
/// observes as a receive error.
pub fn memory_pair() -> (
    StreamTransport<DuplexStream>,
    StreamTransport<DuplexStream>,
) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (StreamTransport::new(client), StreamTransport::new(server))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_delivers_frames_in_order() {
        let (mut client, mut server) = memory_pair();

        client.send_frame(b"first").await.unwrap();
        client.send_frame(b"second").await.unwrap();

        assert_eq!(server.recv_frame().await.unwrap(), b"first");
        assert_eq!(server.recv_frame().await.unwrap(), b"second");

        server.send_frame(b"reply").await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"reply");
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_channel() {
        let (client, mut server) = memory_pair();
        drop(client);
        assert!(server.recv_frame().await.is_err());
    }
}
