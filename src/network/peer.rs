// Peer connection management

use crate::config::NetworkConfig;
use crate::network::codec::{read_frame, write_frame};
use crate::network::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Locally assigned peer identifier
pub type PeerId = u64;

/// Failure on a single peer link; the link is torn down, other peers are unaffected
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("timed out")]
    Timeout,
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("outbound queue is full")]
    QueueFull,
    #[error("peer link is closed")]
    Closed,
}

/// Resolves once the watched flag turns true or its sender goes away
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|flag| *flag).await;
}

/// Sending side of one connection to a remote node.
///
/// Frames are queued and written by a dedicated task so a slow peer never
/// blocks a broadcast.
pub struct PeerLink {
    id: PeerId,
    addr: SocketAddr,
    outbox: mpsc::Sender<Arc<Vec<u8>>>,
    close: watch::Sender<bool>,
}

/// Receiving side of one connection
pub struct PeerReader {
    addr: SocketAddr,
    read_half: OwnedReadHalf,
    closed: watch::Receiver<bool>,
    max_frame_bytes: usize,
    frame_timeout: Duration,
}

impl PeerLink {
    /// Split the stream and start the writer task
    pub fn spawn(
        id: PeerId,
        stream: TcpStream,
        addr: SocketAddr,
        config: &NetworkConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> (Self, PeerReader) {
        let (read_half, mut write_half) = stream.into_split();
        let (outbox, mut queue) = mpsc::channel::<Arc<Vec<u8>>>(config.outbound_queue);
        let (close, closed) = watch::channel(false);

        let max_frame_bytes = config.max_frame_bytes;
        let write_timeout = config.write_timeout();
        let mut writer_closed = closed.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = queue.recv() => {
                        let Some(frame) = frame else { break };
                        let writing = write_frame(&mut write_half, &frame, max_frame_bytes);
                        match timeout(write_timeout, writing).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                log::warn!("Failed to send to peer {}: {}", addr, e);
                                break;
                            }
                            Err(_) => {
                                log::warn!("Send to peer {} timed out", addr);
                                break;
                            }
                        }
                    }
                    _ = signalled(&mut writer_closed) => break,
                    _ = signalled(&mut shutdown) => break,
                }
            }
            let _ = write_half.shutdown().await;
        });

        let reader = PeerReader {
            addr,
            read_half,
            closed,
            max_frame_bytes,
            frame_timeout: config.frame_timeout(),
        };

        (Self { id, addr, outbox, close }, reader)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Get peer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue an already serialized message
    pub fn send_frame(&self, frame: Arc<Vec<u8>>) -> Result<(), PeerError> {
        self.outbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PeerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PeerError::Closed,
        })
    }

    /// Serialize and queue a message
    pub fn send(&self, message: &Message) -> Result<(), PeerError> {
        self.send_frame(Arc::new(message.serialize()?))
    }

    /// Stop both the writer task and the reader
    pub fn close(&self) {
        let _ = self.close.send(true);
    }
}

impl PeerReader {
    /// Receive the next message; `Ok(None)` once the peer hung up or the link was closed
    pub async fn next_message(&mut self) -> Result<Option<Message>, PeerError> {
        let reading = read_frame(&mut self.read_half, self.max_frame_bytes, self.frame_timeout);
        let frame = tokio::select! {
            frame = reading => frame?,
            _ = signalled(&mut self.closed) => return Ok(None),
        };

        match frame {
            Some(bytes) => Message::deserialize(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;
    use tokio::net::TcpListener;

    type Side = (PeerLink, PeerReader);

    async fn link_pair_with(config: NetworkConfig) -> (Side, Side, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();
        let (server, server_addr) = accepted.unwrap();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let a = PeerLink::spawn(1, client, addr, &config, shutdown_rx.clone());
        let b = PeerLink::spawn(2, server, server_addr, &config, shutdown_rx);
        (a, b, shutdown)
    }

    async fn link_pair() -> (Side, Side, watch::Sender<bool>) {
        link_pair_with(NetworkConfig::default()).await
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let ((a, _a_reader), (_b, mut b_reader), _shutdown) = link_pair().await;

        a.send(&Message::RequestChain).unwrap();
        a.send(&Message::NewBlock(Block::genesis(0.0))).unwrap();

        assert_eq!(b_reader.next_message().await.unwrap(), Some(Message::RequestChain));
        assert_eq!(
            b_reader.next_message().await.unwrap(),
            Some(Message::NewBlock(Block::genesis(0.0)))
        );
    }

    #[tokio::test]
    async fn test_close_ends_remote_reader() {
        let ((a, mut a_reader), (_b, mut b_reader), _shutdown) = link_pair().await;

        a.close();

        assert!(a_reader.next_message().await.unwrap().is_none());
        // Writer task shuts down its half, so the remote sees EOF
        assert!(b_reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_an_error() {
        let ((a, _a_reader), (_b, mut b_reader), _shutdown) = link_pair().await;

        a.send_frame(Arc::new(b"{not json".to_vec())).unwrap();

        assert!(matches!(b_reader.next_message().await, Err(PeerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_frames() {
        let config = NetworkConfig {
            outbound_queue: 1,
            ..NetworkConfig::default()
        };
        let ((a, _a_reader), (_b, mut b_reader), _shutdown) = link_pair_with(config).await;

        // No await in between, so the writer task cannot drain the queue
        a.send(&Message::RequestChain).unwrap();
        assert!(matches!(a.send(&Message::RequestChain), Err(PeerError::QueueFull)));

        // The queued frame still goes out and the link stays usable
        assert_eq!(b_reader.next_message().await.unwrap(), Some(Message::RequestChain));
        a.send(&Message::RequestChain).unwrap();
        assert_eq!(b_reader.next_message().await.unwrap(), Some(Message::RequestChain));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let ((a, _a_reader), _b, _shutdown) = link_pair().await;

        a.close();
        tokio::time::timeout(Duration::from_secs(5), async {
            while a.send(&Message::RequestChain).is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(a.send(&Message::RequestChain), Err(PeerError::Closed)));
    }
}
