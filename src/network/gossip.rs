// Flood gossip between peers sharing one ledger

use crate::config::NetworkConfig;
use crate::core::{Block, Transaction};
use crate::ledger::{ChainSnapshot, Ledger, LedgerEvent};
use crate::network::peer::signalled;
use crate::network::{
    Message, PeerError, PeerId, PeerLink, PeerReader, SeenCache, SyncOutcome, SyncProtocol,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Peer set plus the message handling that keeps the shared ledger in step
/// with the rest of the network.
///
/// Cheap to clone; every clone drives the same peers and ledger.
#[derive(Clone)]
pub struct GossipNetwork {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<Mutex<Ledger>>,
    peers: RwLock<HashMap<PeerId, PeerLink>>,
    /// Keys of blocks and transactions already applied, never of rejected ones
    seen: parking_lot::Mutex<SeenCache>,
    config: NetworkConfig,
    shutdown: watch::Receiver<bool>,
    next_id: AtomicU64,
}

impl GossipNetwork {
    pub fn new(
        ledger: Arc<Mutex<Ledger>>,
        config: NetworkConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let seen = SeenCache::new(config.seen_cache_size);
        Self {
            inner: Arc::new(Inner {
                ledger,
                peers: RwLock::new(HashMap::new()),
                seen: parking_lot::Mutex::new(seen),
                config,
                shutdown,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Shared ledger this network feeds
    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        self.inner.ledger.clone()
    }

    /// Bind and start accepting peers in the background; returns the bound address
    pub async fn listen(&self, host: &str, port: u16) -> Result<SocketAddr, PeerError> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;

        log::info!("Node listening on {}", addr);

        let net = self.clone();
        tokio::spawn(async move { net.accept_loop(listener).await });

        Ok(addr)
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown = self.inner.shutdown.clone();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = signalled(&mut shutdown) => break,
            };

            match accepted {
                Ok((stream, addr)) => {
                    if self.peer_count().await >= self.inner.config.max_peers {
                        log::warn!("Refusing connection from {}: peer limit reached", addr);
                        drop(stream);
                    } else {
                        log::info!("New connection from {}", addr);
                        self.register(stream, addr).await;
                    }
                }
                Err(e) => {
                    log::error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        log::debug!("Accept loop stopped");
    }

    /// Open an outbound link and ask the peer for its chain
    pub async fn connect(&self, host: &str, port: u16) -> Result<PeerId, PeerError> {
        let connecting = TcpStream::connect((host, port));
        let stream = timeout(self.inner.config.connect_timeout(), connecting)
            .await
            .map_err(|_| PeerError::Timeout)??;
        let addr = stream.peer_addr()?;

        let id = self.register(stream, addr).await;
        log::info!("Connected to peer {}", addr);

        self.send_to(id, &SyncProtocol::request()).await?;
        Ok(id)
    }

    async fn register(&self, stream: TcpStream, addr: SocketAddr) -> PeerId {
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let shutdown = self.inner.shutdown.clone();
        let (link, reader) = PeerLink::spawn(id, stream, addr, &self.inner.config, shutdown);
        self.inner.peers.write().await.insert(id, link);

        let net = self.clone();
        tokio::spawn(async move { net.receive_loop(id, reader).await });

        id
    }

    async fn receive_loop(self, id: PeerId, mut reader: PeerReader) {
        let mut shutdown = self.inner.shutdown.clone();
        let addr = reader.addr();

        loop {
            let next = tokio::select! {
                next = reader.next_message() => next,
                _ = signalled(&mut shutdown) => break,
            };

            match next {
                Ok(Some(message)) => self.dispatch(id, message).await,
                Ok(None) => {
                    log::info!("Peer {} disconnected", addr);
                    break;
                }
                Err(e) => {
                    log::warn!("Dropping peer {}: {}", addr, e);
                    break;
                }
            }
        }

        self.disconnect(id).await;
    }

    async fn dispatch(&self, from: PeerId, message: Message) {
        log::debug!("Received {} from peer {}", message.message_type(), from);

        if let Some(key) = message.content_key() {
            if self.inner.seen.lock().contains(&key) {
                log::debug!("Ignoring already seen {}", key);
                return;
            }
        }

        match message {
            Message::NewBlock(block) => self.on_block(from, block).await,
            Message::NewTransaction(tx) => self.on_transaction(from, tx).await,
            Message::RequestChain => self.on_chain_request(from).await,
            Message::ChainResponse(snapshot) => self.on_chain_response(from, snapshot).await,
        }
    }

    /// Record gossip that has been applied so echoes of it are skipped
    fn remember(&self, message: &Message) {
        if let Some(key) = message.content_key() {
            self.inner.seen.lock().insert(&key);
        }
    }

    async fn on_block(&self, from: PeerId, block: Block) {
        let (accepted, behind) = {
            let mut ledger = self.inner.ledger.lock().await;
            if ledger.accept_block_from_network(block.clone()) {
                (true, false)
            } else {
                (false, SyncProtocol::needs_catch_up(&ledger, &block))
            }
        };

        if accepted {
            let message = Message::NewBlock(block);
            self.remember(&message);
            self.broadcast(&message, Some(from)).await;
        } else if behind {
            log::info!(
                "Block {} is ahead of our tip, requesting chain from peer {}",
                block.index,
                from
            );
            if let Err(e) = self.send_to(from, &SyncProtocol::request()).await {
                log::warn!("Failed to request chain from peer {}: {}", from, e);
            }
        }
    }

    async fn on_transaction(&self, from: PeerId, tx: Transaction) {
        let verify = self.inner.config.verify_relayed_transactions;
        let accepted = self
            .inner
            .ledger
            .lock()
            .await
            .accept_transaction_from_network(tx.clone(), verify);

        if accepted {
            log::debug!("Relaying transaction {} -> {}", tx.from, tx.to);
            let message = Message::NewTransaction(tx);
            self.remember(&message);
            self.broadcast(&message, Some(from)).await;
        }
    }

    async fn on_chain_request(&self, from: PeerId) {
        let response = {
            let ledger = self.inner.ledger.lock().await;
            SyncProtocol::respond(&ledger)
        };

        if let Err(e) = self.send_to(from, &response).await {
            log::warn!("Failed to answer chain request from peer {}: {}", from, e);
        }
    }

    async fn on_chain_response(&self, from: PeerId, snapshot: ChainSnapshot) {
        let verify = self.inner.config.verify_relayed_transactions;
        let outcome = {
            let mut ledger = self.inner.ledger.lock().await;
            SyncProtocol::apply(&mut ledger, snapshot, verify)
        };

        if let SyncOutcome::Adopted { previous_len, new_len } = outcome {
            log::info!(
                "Synchronized with peer {}: {} -> {} blocks",
                from,
                previous_len,
                new_len
            );
        }
    }

    /// Queue `message` for every peer except `exclude`; returns how many
    /// peers it was queued for
    pub async fn broadcast(&self, message: &Message, exclude: Option<PeerId>) -> usize {
        let frame = match message.serialize() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                log::error!("Failed to serialize {}: {}", message.message_type(), e);
                return 0;
            }
        };

        let peers = self.inner.peers.read().await;
        let mut sent = 0;

        for (id, link) in peers.iter() {
            if Some(*id) == exclude {
                continue;
            }
            match link.send_frame(frame.clone()) {
                Ok(()) => sent += 1,
                Err(e) => log::warn!(
                    "Failed to queue {} for peer {}: {}",
                    message.message_type(),
                    link.addr(),
                    e
                ),
            }
        }

        log::debug!("Broadcast {} to {} peers", message.message_type(), sent);
        sent
    }

    /// Queue `message` for a single peer
    pub async fn send_to(&self, id: PeerId, message: &Message) -> Result<(), PeerError> {
        let peers = self.inner.peers.read().await;
        let link = peers.get(&id).ok_or(PeerError::Closed)?;
        link.send(message)
    }

    /// Flood a locally produced ledger event
    pub async fn announce(&self, event: &LedgerEvent) -> usize {
        let message = match event {
            LedgerEvent::BlockMined(block) => Message::NewBlock(block.clone()),
            LedgerEvent::TransactionAccepted(tx) => Message::NewTransaction(tx.clone()),
        };

        // Our own gossip echoed back by a peer must not be processed again
        self.remember(&message);

        self.broadcast(&message, None).await
    }

    /// Announce every event from `events` until shutdown
    pub fn relay_events(&self, mut events: broadcast::Receiver<LedgerEvent>) -> JoinHandle<()> {
        let net = self.clone();
        let mut shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = signalled(&mut shutdown) => break,
                };

                match event {
                    Ok(event) => {
                        net.announce(&event).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Gossip fell behind by {} ledger events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Get number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.inner.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<(PeerId, SocketAddr)> {
        self.inner
            .peers
            .read()
            .await
            .iter()
            .map(|(id, link)| (*id, link.addr()))
            .collect()
    }

    /// Close and forget one peer; false if it was not registered
    pub async fn disconnect(&self, id: PeerId) -> bool {
        match self.inner.peers.write().await.remove(&id) {
            Some(link) => {
                link.close();
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let mut peers = self.inner.peers.write().await;
        for (_, link) in peers.drain() {
            link.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{CancelToken, FixedPolicy};
    use crate::wallet::{KeyPair, Secp256k1Verifier};

    fn ledger() -> Ledger {
        Ledger::new(
            Box::new(FixedPolicy::new(1, 10.0)),
            Arc::new(Secp256k1Verifier::new()),
            0.0,
        )
    }

    fn network_with(config: NetworkConfig, shutdown: watch::Receiver<bool>) -> GossipNetwork {
        GossipNetwork::new(Arc::new(Mutex::new(ledger())), config, shutdown)
    }

    fn network(shutdown: watch::Receiver<bool>) -> GossipNetwork {
        network_with(NetworkConfig::default(), shutdown)
    }

    fn mined_block(source: &mut Ledger) -> Block {
        match source.mine_block("miner", &CancelToken::new()).unwrap() {
            LedgerEvent::BlockMined(block) => block,
            other => panic!("unexpected event {:?}", other),
        }
    }

    async fn wait_for_len(ledger: &Arc<Mutex<Ledger>>, len: usize) {
        timeout(Duration::from_secs(5), async {
            while ledger.lock().await.len() != len {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("ledger did not converge");
    }

    async fn wait_for_peers(net: &GossipNetwork, count: usize) {
        timeout(Duration::from_secs(5), async {
            while net.peer_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("peer count did not settle");
    }

    #[tokio::test]
    async fn test_connect_requests_chain() {
        let (_shutdown, rx) = watch::channel(false);
        let a = network(rx.clone());
        let b = network(rx);

        a.ledger().lock().await.mine_block("miner", &CancelToken::new()).unwrap();

        let addr = a.listen("127.0.0.1", 0).await.unwrap();
        b.connect("127.0.0.1", addr.port()).await.unwrap();

        wait_for_len(&b.ledger(), 2).await;
        assert_eq!(b.ledger().lock().await.balance_of("miner"), 10.0);
    }

    #[tokio::test]
    async fn test_announce_reaches_peer() {
        let (_shutdown, rx) = watch::channel(false);
        let a = network(rx.clone());
        let b = network(rx);

        let addr = a.listen("127.0.0.1", 0).await.unwrap();
        b.connect("127.0.0.1", addr.port()).await.unwrap();
        wait_for_peers(&a, 1).await;

        let event = b.ledger().lock().await.mine_block("miner", &CancelToken::new()).unwrap();
        assert_eq!(b.announce(&event).await, 1);

        wait_for_len(&a.ledger(), 2).await;
    }

    #[tokio::test]
    async fn test_block_ahead_of_tip_triggers_catch_up() {
        let (_shutdown, rx) = watch::channel(false);
        let behind = network(rx.clone());
        let ahead = network(rx);

        {
            let shared = ahead.ledger();
            let mut ledger = shared.lock().await;
            mined_block(&mut ledger);
            mined_block(&mut ledger);
        }

        // The outbound side syncs, the listening side does not
        let addr = behind.listen("127.0.0.1", 0).await.unwrap();
        ahead.connect("127.0.0.1", addr.port()).await.unwrap();
        wait_for_peers(&behind, 1).await;
        assert_eq!(behind.ledger().lock().await.len(), 1);

        let tip = ahead.ledger().lock().await.latest().unwrap().clone();
        assert_eq!(ahead.broadcast(&Message::NewBlock(tip.clone()), None).await, 1);

        wait_for_len(&behind.ledger(), 3).await;
        assert_eq!(behind.ledger().lock().await.latest().unwrap(), &tip);
    }

    #[tokio::test]
    async fn test_peer_limit_refuses_extra_connections() {
        let (_shutdown, rx) = watch::channel(false);
        let config = NetworkConfig {
            max_peers: 1,
            ..NetworkConfig::default()
        };
        let a = network_with(config, rx.clone());
        let b = network(rx.clone());
        let c = network(rx);

        let addr = a.listen("127.0.0.1", 0).await.unwrap();
        b.connect("127.0.0.1", addr.port()).await.unwrap();
        wait_for_peers(&a, 1).await;

        // TCP accepts, then the node hangs up on the extra peer; the hang-up
        // may already be visible by the time the chain request is queued
        let _ = c.connect("127.0.0.1", addr.port()).await;
        wait_for_peers(&c, 0).await;

        assert_eq!(a.peer_count().await, 1);
        assert_eq!(b.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_seen_message_is_ignored() {
        let (_shutdown, rx) = watch::channel(false);
        let a = network(rx);
        let block = mined_block(&mut ledger());

        a.inner.seen.lock().insert(&format!("block:{}", block.hash));
        a.dispatch(7, Message::NewBlock(block.clone())).await;
        assert_eq!(a.ledger().lock().await.len(), 1);

        let fresh = network(watch::channel(false).1);
        fresh.dispatch(7, Message::NewBlock(block.clone())).await;
        assert_eq!(fresh.ledger().lock().await.len(), 2);
        assert!(fresh.inner.seen.lock().contains(&format!("block:{}", block.hash)));
    }

    #[tokio::test]
    async fn test_forged_block_does_not_shadow_genuine_one() {
        let (_shutdown, rx) = watch::channel(false);
        let a = network(rx);
        let genuine = mined_block(&mut ledger());

        // Same claimed hash, different content
        let mut forged = genuine.clone();
        forged.transactions[0].amount = 1_000.0;

        a.dispatch(7, Message::NewBlock(forged)).await;
        assert_eq!(a.ledger().lock().await.len(), 1);

        a.dispatch(7, Message::NewBlock(genuine.clone())).await;
        assert_eq!(a.ledger().lock().await.latest().unwrap(), &genuine);
    }

    #[tokio::test]
    async fn test_rejected_transaction_is_not_remembered() {
        let (_shutdown, rx) = watch::channel(false);
        let a = network(rx);
        let alice = KeyPair::generate();
        let transfer = alice.sign_transfer("Alice", "Bob", 4.0);

        let tx = Transaction {
            from: transfer.from,
            to: transfer.to,
            amount: transfer.amount,
            timestamp: 1.0,
            signature: Some(transfer.signature),
            public_key: Some(transfer.public_key),
        };
        let mut forged = tx.clone();
        forged.amount = 40.0;
        let forged_key = Message::NewTransaction(forged.clone()).content_key().unwrap();

        a.dispatch(7, Message::NewTransaction(forged)).await;
        assert!(!a.inner.seen.lock().contains(&forged_key));
        assert!(a.ledger().lock().await.pending_transactions().is_empty());

        a.dispatch(7, Message::NewTransaction(tx.clone())).await;
        assert_eq!(a.ledger().lock().await.pending_transactions(), &[tx][..]);
    }

    #[tokio::test]
    async fn test_shutdown_drops_peers() {
        let (shutdown, rx) = watch::channel(false);
        let a = network(rx.clone());
        let b = network(rx);

        let addr = a.listen("127.0.0.1", 0).await.unwrap();
        b.connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(b.peer_count().await, 1);

        shutdown.send(true).unwrap();
        wait_for_peers(&b, 0).await;
    }
}
