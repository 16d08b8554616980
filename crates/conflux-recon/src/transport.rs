//! Transport abstraction for the reconciliation protocol.
//!
//! A transport is one ordered, bidirectional connection to a single remote.
//! Incoming messages are buffered so the session can poll without blocking.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::{ReconError, Result};
use crate::messages::ReconMsg;

/// Capacity of the receive buffer between the reader and the session.
pub const INBOX_CAPACITY: usize = 256;

/// An ordered message connection to one remote peer.
#[async_trait]
pub trait Transport: Send {
    /// Send a message to the remote.
    async fn send(&mut self, msg: ReconMsg) -> Result<()>;

    /// Take the next buffered message, if one has already arrived.
    fn try_recv(&mut self) -> Result<Option<ReconMsg>>;

    /// Wait for the next message.
    ///
    /// Returns None if the timeout expires first.
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ReconMsg>>;

    /// Wait for the next message, failing with [`ReconError::Timeout`].
    async fn recv(&mut self, timeout: Duration) -> Result<ReconMsg> {
        self.recv_timeout(timeout)
            .await?
            .ok_or_else(|| ReconError::Timeout(format!("no message within {timeout:?}")))
    }

    /// Address of the remote, for logs and recovery events.
    fn remote_addr(&self) -> String;

    /// Close the sending side of the connection.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, msg: ReconMsg) -> Result<()> {
        (**self).send(msg).await
    }

    fn try_recv(&mut self) -> Result<Option<ReconMsg>> {
        (**self).try_recv()
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ReconMsg>> {
        (**self).recv_timeout(timeout).await
    }

    fn remote_addr(&self) -> String {
        (**self).remote_addr()
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Receiving end shared by the transports.
///
/// The producer sends at most one error and then hangs up.
struct Inbox {
    rx: mpsc::Receiver<Result<ReconMsg>>,
}

impl Inbox {
    fn try_recv(&mut self) -> Result<Option<ReconMsg>> {
        match self.rx.try_recv() {
            Ok(item) => item.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ReconError::Closed),
        }
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ReconMsg>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => item.map(Some),
            Ok(None) => Err(ReconError::Closed),
            Err(_) => Ok(None),
        }
    }
}

/// TCP transport using length-prefixed CBOR frames.
pub mod tcp {
    use super::*;

    use tokio::io::AsyncWriteExt;
    use tokio::net::tcp::OwnedWriteHalf;
    use tokio::net::{TcpStream, ToSocketAddrs};
    use tokio::task::JoinHandle;
    use tracing::trace;

    use crate::wire;

    /// A framed TCP connection.
    ///
    /// A background task decodes incoming frames into the inbox; it is
    /// aborted when the transport is dropped.
    pub struct TcpTransport {
        writer: OwnedWriteHalf,
        inbox: Inbox,
        remote: String,
        reader: JoinHandle<()>,
    }

    impl TcpTransport {
        /// Wrap an established stream.
        pub fn new(stream: TcpStream) -> Result<Self> {
            let remote = stream.peer_addr()?.to_string();
            let (mut read_half, writer) = stream.into_split();
            let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

            let reader = tokio::spawn(async move {
                loop {
                    match wire::read_msg(&mut read_half).await {
                        Ok(msg) => {
                            trace!(%msg, "frame received");
                            if tx.send(Ok(msg)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                    }
                }
            });

            Ok(Self {
                writer,
                inbox: Inbox { rx },
                remote,
                reader,
            })
        }

        /// Connect to a listening peer.
        pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Self::new(stream)
        }
    }

    #[async_trait]
    impl Transport for TcpTransport {
        async fn send(&mut self, msg: ReconMsg) -> Result<()> {
            wire::write_msg(&mut self.writer, &msg).await
        }

        fn try_recv(&mut self) -> Result<Option<ReconMsg>> {
            self.inbox.try_recv()
        }

        async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ReconMsg>> {
            self.inbox.recv_timeout(timeout).await
        }

        fn remote_addr(&self) -> String {
            self.remote.clone()
        }

        async fn close(&mut self) -> Result<()> {
            self.writer.shutdown().await?;
            Ok(())
        }
    }

    impl Drop for TcpTransport {
        fn drop(&mut self) {
            self.reader.abort();
        }
    }
}

/// A simple in-memory transport for testing.
pub mod memory {
    use super::*;

    /// One end of an in-process connection.
    pub struct MemoryTransport {
        tx: Option<mpsc::Sender<Result<ReconMsg>>>,
        inbox: Inbox,
        remote: String,
    }

    impl MemoryTransport {
        /// Create two connected ends.
        pub fn pair() -> (Self, Self) {
            let (a_tx, a_rx) = mpsc::channel(INBOX_CAPACITY);
            let (b_tx, b_rx) = mpsc::channel(INBOX_CAPACITY);
            let a = Self {
                tx: Some(b_tx),
                inbox: Inbox { rx: a_rx },
                remote: "memory:b".into(),
            };
            let b = Self {
                tx: Some(a_tx),
                inbox: Inbox { rx: b_rx },
                remote: "memory:a".into(),
            };
            (a, b)
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, msg: ReconMsg) -> Result<()> {
            let tx = self.tx.as_ref().ok_or(ReconError::Closed)?;
            tx.send(Ok(msg))
                .await
                .map_err(|_| ReconError::Transport("peer disconnected".into()))
        }

        fn try_recv(&mut self) -> Result<Option<ReconMsg>> {
            self.inbox.try_recv()
        }

        async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ReconMsg>> {
            self.inbox.recv_timeout(timeout).await
        }

        fn remote_addr(&self) -> String {
            self.remote.clone()
        }

        async fn close(&mut self) -> Result<()> {
            self.tx = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTransport;
    use super::tcp::TcpTransport;
    use super::*;

    #[tokio::test]
    async fn test_memory_pair() {
        let (mut a, mut b) = MemoryTransport::pair();
        assert!(b.try_recv().unwrap().is_none());

        a.send(ReconMsg::SyncFail).await.unwrap();
        a.send(ReconMsg::Done).await.unwrap();
        assert_eq!(
            b.recv(Duration::from_secs(1)).await.unwrap(),
            ReconMsg::SyncFail
        );
        assert_eq!(b.try_recv().unwrap(), Some(ReconMsg::Done));
        assert_eq!(a.remote_addr(), "memory:b");
    }

    #[tokio::test]
    async fn test_memory_close_is_seen_by_remote() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.close().await.unwrap();
        assert!(matches!(b.try_recv(), Err(ReconError::Closed)));
        assert!(matches!(a.send(ReconMsg::Done).await, Err(ReconError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_times_out() {
        let (_a, mut b) = MemoryTransport::pair();
        let result = b.recv(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ReconError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_tcp_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = TcpTransport::new(stream).unwrap();
            let msg = transport.recv(Duration::from_secs(5)).await.unwrap();
            transport.send(msg).await.unwrap();
            transport.close().await.unwrap();
        });

        let mut client = TcpTransport::connect(addr).await.unwrap();
        assert_eq!(client.remote_addr(), addr.to_string());
        client.send(ReconMsg::SyncFail).await.unwrap();
        assert_eq!(
            client.recv(Duration::from_secs(5)).await.unwrap(),
            ReconMsg::SyncFail
        );
        server.await.unwrap();

        // The server shut down its side; the reader reports the close.
        let closed = client.recv(Duration::from_secs(5)).await;
        assert!(matches!(closed, Err(ReconError::Closed)));
    }
}
