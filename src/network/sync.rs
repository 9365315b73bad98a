// Chain request / response exchange used to bring a peer up to date

use crate::core::Block;
use crate::ledger::{ChainSnapshot, Ledger};
use crate::network::Message;

/// Result of applying a `CHAIN_RESPONSE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Adopted { previous_len: usize, new_len: usize },
    Rejected,
}

/// Sync protocol: a new connection asks for the remote chain and adopts it
/// when it is at least as long and fully valid.
pub struct SyncProtocol;

impl SyncProtocol {
    /// Message sent to a freshly connected peer
    pub fn request() -> Message {
        Message::RequestChain
    }

    /// Reply to a `REQUEST_CHAIN`
    pub fn respond(ledger: &Ledger) -> Message {
        Message::ChainResponse(ledger.snapshot())
    }

    /// Feed a peer's snapshot into the ledger; `verify` re-checks the
    /// signatures of its pending transactions
    pub fn apply(ledger: &mut Ledger, snapshot: ChainSnapshot, verify: bool) -> SyncOutcome {
        let previous_len = ledger.len();
        if ledger.replace_chain(snapshot, verify) {
            SyncOutcome::Adopted {
                previous_len,
                new_len: ledger.len(),
            }
        } else {
            SyncOutcome::Rejected
        }
    }

    /// A gossiped block beyond our tip's successor means we missed blocks
    pub fn needs_catch_up(ledger: &Ledger, block: &Block) -> bool {
        match ledger.latest() {
            Ok(latest) => block.index > latest.index + 1,
            Err(_) => true,
        }
    }
}
