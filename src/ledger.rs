// Ledger: the chain of sealed blocks plus the pending-transaction pool

use crate::consensus::{BlockValidator, CancelToken, ConsensusPolicy, Miner, ValidationError};
use crate::core::{now_secs, Block, SignedPayload, Transaction};
use crate::wallet::SignatureVerifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Ledger errors surfaced to callers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("chain is empty")]
    EmptyChain,
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] ValidationError),
    #[error("mining was cancelled")]
    MiningCancelled,
}

/// Domain events produced by local ledger mutations, consumed by gossip
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    BlockMined(Block),
    TransactionAccepted(Transaction),
}

/// Full ledger state as exchanged during sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

/// Ordered chain of blocks and the pool of transactions awaiting a block.
///
/// Not internally synchronized: shared owners must serialize every mutation
/// and compound read behind one lock (see `Node`).
pub struct Ledger {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    policy: Box<dyn ConsensusPolicy>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Ledger {
    /// Create a ledger holding only the genesis block
    pub fn new(
        policy: Box<dyn ConsensusPolicy>,
        verifier: Arc<dyn SignatureVerifier>,
        genesis_timestamp: f64,
    ) -> Self {
        Self {
            chain: vec![Block::genesis(genesis_timestamp)],
            pending_transactions: Vec::new(),
            policy,
            verifier,
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn genesis(&self) -> Result<&Block, LedgerError> {
        self.chain.first().ok_or(LedgerError::EmptyChain)
    }

    /// Last block of the chain
    pub fn latest(&self) -> Result<&Block, LedgerError> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    /// Difficulty required for the next block
    pub fn difficulty(&self) -> u32 {
        self.policy.difficulty_at(self.chain.len() as u64)
    }

    /// Reward paid for the next block
    pub fn mining_reward(&self) -> f64 {
        self.policy.reward_at(self.chain.len() as u64)
    }

    /// Queue a transaction.
    ///
    /// Reward payouts (`from == "network"`) are queued unconditionally and
    /// produce no event. Everything else must carry a signature over the
    /// canonical `{from, to, amount}` payload.
    ///
    /// The check proves only that the holder of `public_key` signed this
    /// payload. `from` is not derived from that key, so any key holder can
    /// sign a transfer naming another account as sender; balances are not
    /// checked either. Callers that need ownership must compare `from`
    /// against the key's address themselves.
    pub fn submit_transaction(
        &mut self,
        from: &str,
        to: &str,
        amount: f64,
        signature: Option<&str>,
        public_key: Option<&str>,
    ) -> Result<Option<LedgerEvent>, LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let payload = SignedPayload::new(from, to, amount);

        if payload.from == crate::core::NETWORK_SENDER {
            self.pending_transactions.push(Transaction::reward(to, amount, now_secs()));
            return Ok(None);
        }

        let (Some(signature), Some(public_key)) = (signature, public_key) else {
            log::warn!("Rejected transaction {} -> {}: missing signature", from, to);
            return Err(LedgerError::InvalidSignature);
        };

        if !self.verify_payload(&payload, signature, public_key) {
            log::warn!("Rejected transaction {} -> {}: signature does not verify", from, to);
            return Err(LedgerError::InvalidSignature);
        }

        let tx = Transaction {
            from: payload.from,
            to: payload.to,
            amount,
            timestamp: now_secs(),
            signature: Some(signature.to_string()),
            public_key: Some(public_key.to_string()),
        };

        log::info!("Accepted transaction {} -> {} ({})", tx.from, tx.to, tx.amount);
        self.pending_transactions.push(tx.clone());
        Ok(Some(LedgerEvent::TransactionAccepted(tx)))
    }

    /// Queue a transaction relayed by a peer.
    ///
    /// Reward payouts are never accepted outside a block. With `verify` set the
    /// signature is re-checked exactly as for local submissions. Returns false
    /// for rejected or already pending transactions.
    pub fn accept_transaction_from_network(&mut self, tx: Transaction, verify: bool) -> bool {
        if let Err(reason) = self.check_relayed(&tx, verify) {
            log::warn!("Dropped relayed transaction {} -> {}: {}", tx.from, tx.to, reason);
            return false;
        }

        if self.pending_transactions.contains(&tx) {
            return false;
        }

        self.pending_transactions.push(tx);
        true
    }

    /// Rules every transaction arriving from a peer must pass
    fn check_relayed(&self, tx: &Transaction, verify: bool) -> Result<(), &'static str> {
        if tx.is_reward() {
            return Err("reward outside a block");
        }

        if !tx.amount.is_finite() || tx.amount < 0.0 {
            return Err("invalid amount");
        }

        if verify {
            let verified = match (&tx.signature, &tx.public_key) {
                (Some(signature), Some(public_key)) => {
                    self.verify_payload(&tx.payload(), signature, public_key)
                }
                _ => false,
            };
            if !verified {
                return Err("bad signature");
            }
        }

        Ok(())
    }

    fn verify_payload(&self, payload: &SignedPayload, signature: &str, public_key: &str) -> bool {
        match hex::decode(public_key) {
            Ok(key_bytes) => self.verifier.verify(&key_bytes, &payload.canonical(), signature),
            Err(_) => false,
        }
    }

    /// Build an unmined block from the pending pool plus the miner's reward
    pub fn candidate_block(&self, miner_address: &str) -> Result<Block, LedgerError> {
        let latest = self.latest()?;
        let height = self.chain.len() as u64;

        let mut transactions = self.pending_transactions.clone();
        transactions.push(Transaction::reward(
            miner_address,
            self.policy.reward_at(height),
            now_secs(),
        ));

        Ok(Block::seal(height, transactions, now_secs(), latest.hash.clone()))
    }

    /// Append a locally mined block.
    ///
    /// The block is revalidated against the current tip, so a block mined
    /// against a tip that has since moved is rejected. Only the transactions
    /// the block carries leave the pending pool.
    pub fn commit_block(&mut self, block: Block) -> Result<LedgerEvent, LedgerError> {
        self.check_new_block(&block, self.latest()?)?;

        self.pending_transactions.retain(|tx| !block.contains(tx));
        log::info!("Appended block {} ({})", block.index, block.hash);
        self.chain.push(block.clone());

        Ok(LedgerEvent::BlockMined(block))
    }

    /// Mine the pending pool into a new block, synchronously.
    ///
    /// Blocks the calling thread for the whole proof-of-work search; callers
    /// needing responsiveness should use `Node::mine` instead.
    pub fn mine_block(
        &mut self,
        miner_address: &str,
        cancel: &CancelToken,
    ) -> Result<LedgerEvent, LedgerError> {
        let mut block = self.candidate_block(miner_address)?;
        let difficulty = self.policy.difficulty_at(block.index);

        let result = Miner::new(difficulty).mine(&mut block, cancel);
        if !result.success {
            return Err(LedgerError::MiningCancelled);
        }

        log::info!(
            "Mined block {} with nonce {} after {} attempts",
            block.index,
            result.nonce,
            result.attempts
        );
        self.commit_block(block)
    }

    /// Single-block predicate shared by local appends and network blocks
    pub fn check_new_block(
        &self,
        candidate: &Block,
        predecessor: &Block,
    ) -> Result<(), ValidationError> {
        BlockValidator::new(self.policy.as_ref()).validate_successor(candidate, predecessor)
    }

    pub fn is_valid_new_block(&self, candidate: &Block, predecessor: &Block) -> bool {
        self.check_new_block(candidate, predecessor).is_ok()
    }

    /// Replay every adjacency and hash invariant over the whole chain
    pub fn check_chain(&self) -> Result<(), ValidationError> {
        let genesis = self.chain.first().ok_or(ValidationError::EmptyChain)?;
        if genesis.index != 0 || !genesis.has_valid_hash() {
            return Err(ValidationError::GenesisMismatch);
        }
        BlockValidator::new(self.policy.as_ref()).validate_chain(&self.chain, genesis)
    }

    pub fn is_chain_valid(&self) -> bool {
        self.check_chain().is_ok()
    }

    /// Append a block received from a peer if it directly extends the tip.
    ///
    /// No fork search is performed. Rejection leaves the state untouched.
    pub fn accept_block_from_network(&mut self, block: Block) -> bool {
        let verdict = match self.latest() {
            Ok(latest) => self.check_new_block(&block, latest),
            Err(_) => Err(ValidationError::EmptyChain),
        };

        if let Err(e) = verdict {
            log::warn!("Rejected network block {}: {}", block.index, e);
            return false;
        }

        self.pending_transactions.retain(|tx| !block.contains(tx));
        log::info!("Accepted network block {} ({})", block.index, block.hash);
        self.chain.push(block);
        true
    }

    /// Decide whether a peer's snapshot may replace the local state
    pub fn check_replacement(&self, candidate: &ChainSnapshot) -> Result<(), ValidationError> {
        if candidate.chain.len() < self.chain.len() {
            return Err(ValidationError::ChainTooShort {
                candidate: candidate.chain.len(),
                local: self.chain.len(),
            });
        }

        let genesis = self.chain.first().ok_or(ValidationError::EmptyChain)?;
        BlockValidator::new(self.policy.as_ref()).validate_chain(&candidate.chain, genesis)
    }

    /// Wholesale replacement during sync: longest-or-equal valid chain wins.
    ///
    /// On equal length the candidate still wins, so the last valid arrival is
    /// kept. The candidate pool is filtered with the relay rules and stripped
    /// of anything the adopted chain already confirms. Chain and pending pool
    /// are replaced together or not at all.
    pub fn replace_chain(&mut self, candidate: ChainSnapshot, verify: bool) -> bool {
        if let Err(e) = self.check_replacement(&candidate) {
            log::warn!("Rejected chain replacement: {}", e);
            return false;
        }

        let offered = candidate.pending_transactions.len();
        let mut pending: Vec<Transaction> = Vec::with_capacity(offered);
        for tx in candidate.pending_transactions {
            if let Err(reason) = self.check_relayed(&tx, verify) {
                log::warn!("Dropped synced transaction {} -> {}: {}", tx.from, tx.to, reason);
                continue;
            }
            if candidate.chain.iter().any(|block| block.contains(&tx)) || pending.contains(&tx) {
                continue;
            }
            pending.push(tx);
        }

        log::info!(
            "Replacing chain: {} -> {} blocks, {} of {} pending transactions kept",
            self.chain.len(),
            candidate.chain.len(),
            pending.len(),
            offered
        );
        self.chain = candidate.chain;
        self.pending_transactions = pending;
        true
    }

    /// Balance derived by replaying every confirmed transaction
    pub fn balance_of(&self, address: &str) -> f64 {
        let mut balance = 0.0;
        for tx in self.chain.iter().flat_map(|block| &block.transactions) {
            if tx.from == address {
                balance -= tx.amount;
            }
            if tx.to == address {
                balance += tx.amount;
            }
        }
        balance
    }

    /// Copy of the full state for a `CHAIN_RESPONSE`
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.chain.clone(),
            pending_transactions: self.pending_transactions.clone(),
        }
    }
}
