//! Namespace-based peer rendezvous: peers register signed address records
//! under a namespace with a point server, and discover other peers
//! registered in that namespace through paginated queries.

pub mod discoverer;
pub mod error;
pub mod point;
pub mod record;
pub mod store;
pub mod wire;

pub use discoverer::{AdvertiseHandle, Discoverer};
pub use error::{CodecError, DiscovererError, RecordError, RendezvousError, StoreError};
pub use point::{Point, PointConfig, PointStats};
pub use record::{PeerRecord, SignedPeerRecord};
pub use store::{Quotas, Registration, Store};
pub use wire::{DiscoveredPeer, RendezvousMessage, StatusCode};
