// P2P networking

mod codec;
mod gossip;
mod message;
mod peer;
mod seen;
mod sync;

pub use codec::{read_frame, write_frame, FRAME_HEADER_LEN};
pub use gossip::GossipNetwork;
pub use message::{Message, MessageType};
pub(crate) use peer::signalled;
pub use peer::{PeerError, PeerId, PeerLink, PeerReader};
pub use seen::SeenCache;
pub use sync::{SyncOutcome, SyncProtocol};
