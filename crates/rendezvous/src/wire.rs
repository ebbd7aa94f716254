//! Wire framing for the rendezvous protocol: a 4-byte big-endian length
//! prefix followed by a bincode-encoded, tagged [`RendezvousMessage`].
//! Frames larger than [`MAX_FRAME_SIZE`] are rejected before decoding so a
//! hostile peer can't force an unbounded allocation.

use serde::{Deserialize, Serialize};

use dep2p_transport::Stream;
use dep2p_types::{Multiaddr, PeerId};

use crate::error::CodecError;
use crate::record::SignedPeerRecord;

pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    NotAuthorized,
    InvalidNamespace,
    /// Reserved for a future ttl validation rule; the current quota policy
    /// only clamps requested ttls, it never rejects one.
    InvalidTtl,
    /// Reserved for a future cursor validation rule; pagination cursors are
    /// currently always well-formed 4-byte offsets.
    InvalidCookie,
    InvalidSignature,
    QuotaExceeded,
    InternalError,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationView {
    pub namespace: String,
    pub signed_record: SignedPeerRecord,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RendezvousMessage {
    Register {
        namespace: String,
        signed_record: SignedPeerRecord,
        ttl_secs: u64,
    },
    RegisterResponse {
        status: StatusCode,
        ttl_secs: u64,
    },
    Unregister {
        namespace: String,
        peer_id: PeerId,
    },
    Discover {
        namespace: String,
        cursor: Option<[u8; 4]>,
        limit: u32,
    },
    DiscoverResponse {
        registrations: Vec<RegistrationView>,
        cursor: Option<[u8; 4]>,
    },
}

pub fn cursor_to_bytes(offset: u32) -> [u8; 4] {
    offset.to_be_bytes()
}

pub fn cursor_from_bytes(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

pub fn encode_frame(message: &RendezvousMessage) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
            got: payload.len(),
        });
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn decode_frame(payload: &[u8]) -> Result<RendezvousMessage, CodecError> {
    bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Write one length-prefixed message to a stream.
pub async fn write_message(stream: &mut Stream, message: &RendezvousMessage) -> Result<(), CodecError> {
    let frame = encode_frame(message)?;
    let mut offset = 0;
    while offset < frame.len() {
        let n = stream
            .write(&frame[offset..])
            .await
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        if n == 0 {
            return Err(CodecError::Truncated);
        }
        offset += n;
    }
    Ok(())
}

/// Read one length-prefixed message from a stream.
pub async fn read_message(stream: &mut Stream) -> Result<RendezvousMessage, CodecError> {
    let mut len_buf = [0u8; 4];
    read_exact(stream, &mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
            got: len,
        });
    }

    let mut payload = vec![0u8; len];
    read_exact(stream, &mut payload).await?;
    decode_frame(&payload)
}

async fn read_exact(stream: &mut Stream, buf: &mut [u8]) -> Result<(), CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream
            .read(&mut buf[filled..])
            .await
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .ok_or(CodecError::Truncated)?;
        if n == 0 {
            return Err(CodecError::Truncated);
        }
        filled += n;
    }
    Ok(())
}

/// A peer's registered addresses as returned by a `Discover` call.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub peer_id: PeerId,
    pub addresses: Vec<Multiaddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let message = RendezvousMessage::Unregister {
            namespace: "chat".into(),
            peer_id: PeerId::from_public_key(dep2p_types::KeyAlgorithm::Ed25519, &[7; 32]),
        };
        let frame = encode_frame(&message).unwrap();
        let payload = &frame[4..];
        let decoded = decode_frame(payload).unwrap();
        match decoded {
            RendezvousMessage::Unregister { namespace, peer_id } => {
                assert_eq!(namespace, "chat");
                assert_eq!(peer_id, PeerId::from_public_key(dep2p_types::KeyAlgorithm::Ed25519, &[7; 32]));
            }
            _ => panic!("wrong variant decoded"),
        }
    }

    #[test]
    fn cursor_round_trips_through_bytes() {
        let offset = 4096u32;
        assert_eq!(cursor_from_bytes(cursor_to_bytes(offset)), offset);
    }
}
