//! Shared primitives for the dep2p transport and rendezvous cores.
//!
//! This crate holds the types that every other crate in the workspace needs
//! to agree on bit-for-bit: the peer identifier, the self-describing
//! network address, and the error kinds that cross crate boundaries.

pub mod error;
pub mod multiaddr;
pub mod peer_id;

pub use error::{MultiaddrError, TypesResult};
pub use multiaddr::{Multiaddr, Protocol};
pub use peer_id::{KeyAlgorithm, PeerId};
