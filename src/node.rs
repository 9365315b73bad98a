// Node: ledger, gossip network and mining worker wired together

use crate::config::{ConfigError, NodeConfig};
use crate::consensus::{CancelToken, Miner};
use crate::core::Block;
use crate::ledger::{ChainSnapshot, Ledger, LedgerError, LedgerEvent};
use crate::network::{signalled, GossipNetwork, PeerError, PeerId};
use crate::wallet::SignatureVerifier;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mining worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("invalid address {0:?}, expected host:port")]
    InvalidAddress(String),
}

/// A running participant: one ledger behind one lock, shared with the
/// gossip network, plus the channel that carries local ledger events out
/// to peers.
#[derive(Clone)]
pub struct Node {
    ledger: Arc<Mutex<Ledger>>,
    network: GossipNetwork,
    events: broadcast::Sender<LedgerEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    cancel: CancelToken,
    config: Arc<NodeConfig>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let genesis_timestamp = config.consensus.genesis_timestamp;
        let ledger = Ledger::new(Box::new(config.policy()), verifier, genesis_timestamp);
        let ledger = Arc::new(Mutex::new(ledger));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let network = GossipNetwork::new(ledger.clone(), config.network.clone(), shutdown_rx);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            ledger,
            network,
            events,
            shutdown: Arc::new(shutdown),
            cancel: CancelToken::new(),
            config: Arc::new(config),
        })
    }

    /// Listen, hook gossip up to ledger events, dial bootstrap peers and
    /// start the auto-miner if configured. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        let (host, port) = parse_host_port(&self.config.listen)?;
        let addr = self.network.listen(&host, port).await?;

        self.network.relay_events(self.events.subscribe());

        for peer in &self.config.peers {
            if let Err(e) = self.connect(peer).await {
                log::warn!("Failed to connect to bootstrap peer {}: {}", peer, e);
            }
        }

        let miner = &self.config.miner;
        if let (Some(address), Some(secs)) = (&miner.address, miner.interval_secs) {
            self.spawn_auto_miner(address.clone(), Duration::from_secs(secs));
        }

        Ok(addr)
    }

    fn spawn_auto_miner(&self, address: String, every: Duration) {
        let node = self.clone();
        let mut shutdown = self.shutdown.subscribe();

        log::info!("Auto-mining to {} every {:?}", address, every);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = signalled(&mut shutdown) => break,
                }

                match node.mine(&address).await {
                    Ok(block) => log::info!("Auto-mined block {} ({})", block.index, block.hash),
                    Err(NodeError::Ledger(LedgerError::MiningCancelled)) => break,
                    Err(e) => log::warn!("Auto-mining failed: {}", e),
                }
            }
        });
    }

    /// Dial `host:port`; the new peer is asked for its chain straight away
    pub async fn connect(&self, target: &str) -> Result<PeerId, NodeError> {
        let (host, port) = parse_host_port(target)?;
        Ok(self.network.connect(&host, port).await?)
    }

    /// Validate and queue a transaction, then gossip it
    pub async fn submit_transaction(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        signature: Option<&str>,
        public_key: Option<&str>,
    ) -> Result<(), NodeError> {
        let event = self
            .ledger
            .lock()
            .await
            .submit_transaction(from, to, amount, signature, public_key)?;

        if let Some(event) = event {
            self.publish(event);
        }
        Ok(())
    }

    /// Mine the pending pool on a blocking worker.
    ///
    /// The ledger lock is held only to build the candidate and to commit it,
    /// so peers keep being served during the search. A block that lost the
    /// race against a network block fails to commit and is discarded.
    pub async fn mine(&self, miner_address: &str) -> Result<Block, NodeError> {
        let (mut block, difficulty) = {
            let ledger = self.ledger.lock().await;
            (ledger.candidate_block(miner_address)?, ledger.difficulty())
        };

        let cancel = self.cancel.clone();
        let (block, result) = tokio::task::spawn_blocking(move || {
            let result = Miner::new(difficulty).mine(&mut block, &cancel);
            (block, result)
        })
        .await?;

        if !result.success {
            return Err(LedgerError::MiningCancelled.into());
        }

        log::info!(
            "Mined block {} with nonce {} after {} attempts ({:.0} H/s)",
            block.index,
            result.nonce,
            result.attempts,
            result.hash_rate()
        );

        let event = self.ledger.lock().await.commit_block(block.clone())?;
        self.publish(event);
        Ok(block)
    }

    fn publish(&self, event: LedgerEvent) {
        // No receiver simply means the network is not started yet
        let _ = self.events.send(event);
    }

    pub async fn balance_of(&self, address: &str) -> f64 {
        self.ledger.lock().await.balance_of(address)
    }

    pub async fn chain_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    pub async fn latest(&self) -> Result<Block, NodeError> {
        Ok(self.ledger.lock().await.latest()?.clone())
    }

    pub async fn snapshot(&self) -> ChainSnapshot {
        self.ledger.lock().await.snapshot()
    }

    pub async fn peer_count(&self) -> usize {
        self.network.peer_count().await
    }

    /// Local ledger events as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        self.ledger.clone()
    }

    pub fn network(&self) -> &GossipNetwork {
        &self.network
    }

    /// Cancel mining, stop every worker and drop all peers
    pub async fn shutdown(&self) {
        log::info!("Shutting down node");
        self.cancel.cancel();
        let _ = self.shutdown.send(true);
        self.network.close_all().await;
    }
}

/// Split `host:port`
pub fn parse_host_port(target: &str) -> Result<(String, u16), NodeError> {
    let invalid = || NodeError::InvalidAddress(target.to_string());

    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}
