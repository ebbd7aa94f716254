//! Signed peer records: a peer's self-attested address list, bound to its
//! identity by a signature so a rendezvous point can't forge or tamper
//! with what it hands out on discovery.
//!
//! Envelope binary layout (all integers big-endian):
//!
//! ```text
//! [1 byte key_type][2 bytes pubkey_len][pubkey]
//! [2 bytes record_len][record bytes][2 bytes sig_len][signature]
//! ```
//!
//! The signature covers `b"/dep2p/peer-record" ‖ record_bytes`, never the
//! outer envelope, so the envelope's own length prefixes can't be used to
//! smuggle bytes into what gets verified. `record_bytes` itself has its own
//! fixed layout, also big-endian throughout:
//!
//! ```text
//! [2 bytes peer_id_len][peer_id][8 bytes seq][8 bytes timestamp_nanos]
//! [2 bytes addrs_count] x (repeated [2 bytes addr_len][addr text, utf-8])
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use dep2p_identity::Identity;
use dep2p_types::{KeyAlgorithm, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

const DOMAIN_SEPARATOR: &[u8] = b"/dep2p/peer-record";
const MAX_ADDRESSES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub addresses: Vec<Multiaddr>,
    pub seq: u64,
    pub timestamp_nanos: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPeerRecord {
    pub key_type: KeyAlgorithm,
    pub public_key: Vec<u8>,
    pub record: PeerRecord,
    pub signature: Vec<u8>,
}

impl SignedPeerRecord {
    pub fn sign(identity: &Identity, addresses: Vec<Multiaddr>, seq: u64) -> Result<Self, RecordError> {
        if addresses.len() > MAX_ADDRESSES {
            return Err(RecordError::TooManyAddresses {
                max: MAX_ADDRESSES,
                got: addresses.len(),
            });
        }
        let timestamp_nanos = now_nanos();
        let record = PeerRecord {
            peer_id: identity.peer_id(),
            addresses,
            seq,
            timestamp_nanos,
        };
        let record_bytes = encode_record(&record);

        let mut signing_input = Vec::with_capacity(DOMAIN_SEPARATOR.len() + record_bytes.len());
        signing_input.extend_from_slice(DOMAIN_SEPARATOR);
        signing_input.extend_from_slice(&record_bytes);

        let signature = identity.sign(&signing_input)?;
        Ok(Self {
            key_type: identity.algorithm(),
            public_key: identity.public_key_bytes(),
            record,
            signature,
        })
    }

    pub fn verify(&self) -> Result<(), RecordError> {
        let record_bytes = encode_record(&self.record);
        let mut signing_input = Vec::with_capacity(DOMAIN_SEPARATOR.len() + record_bytes.len());
        signing_input.extend_from_slice(DOMAIN_SEPARATOR);
        signing_input.extend_from_slice(&record_bytes);

        dep2p_identity::verify_signature(self.key_type, &self.public_key, &signing_input, &self.signature)?;

        let expected_peer_id = PeerId::from_public_key(self.key_type, &self.public_key);
        if expected_peer_id != self.record.peer_id {
            return Err(RecordError::Malformed);
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let record_bytes = encode_record(&self.record);
        let mut out = Vec::new();
        out.push(self.key_type.tag());
        out.extend_from_slice(&(self.public_key.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&(record_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&record_bytes);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut cursor = 0usize;

        let key_type_tag = *bytes.get(cursor).ok_or(RecordError::Malformed)?;
        let key_type = KeyAlgorithm::from_tag(key_type_tag).ok_or(RecordError::UnknownAlgorithm(key_type_tag))?;
        cursor += 1;

        let pubkey_len = read_u16(bytes, &mut cursor)?;
        let public_key = read_bytes(bytes, &mut cursor, pubkey_len)?;

        let record_len = read_u16(bytes, &mut cursor)?;
        let record_bytes = read_bytes(bytes, &mut cursor, record_len)?;
        let record = decode_record(&record_bytes)?;

        let sig_len = read_u16(bytes, &mut cursor)?;
        let signature = read_bytes(bytes, &mut cursor, sig_len)?;

        Ok(Self {
            key_type,
            public_key,
            record,
            signature,
        })
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

fn encode_record(record: &PeerRecord) -> Vec<u8> {
    let peer_id_bytes = record.peer_id.as_bytes();
    let mut out = Vec::new();
    out.extend_from_slice(&(peer_id_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(peer_id_bytes);
    out.extend_from_slice(&record.seq.to_be_bytes());
    out.extend_from_slice(&record.timestamp_nanos.to_be_bytes());
    out.extend_from_slice(&(record.addresses.len() as u16).to_be_bytes());
    for addr in &record.addresses {
        let text = addr.to_string();
        let text_bytes = text.as_bytes();
        out.extend_from_slice(&(text_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(text_bytes);
    }
    out
}

fn decode_record(bytes: &[u8]) -> Result<PeerRecord, RecordError> {
    let mut cursor = 0usize;

    let peer_id_len = read_u16(bytes, &mut cursor)?;
    let peer_id_bytes = read_bytes(bytes, &mut cursor, peer_id_len)?;
    if peer_id_bytes.len() != 32 {
        return Err(RecordError::Malformed);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&peer_id_bytes);
    let peer_id = PeerId::from_digest(digest);

    let seq = read_u64(bytes, &mut cursor)?;
    let timestamp_nanos = read_u64(bytes, &mut cursor)?;

    let addrs_count = read_u16(bytes, &mut cursor)?;
    if addrs_count > MAX_ADDRESSES {
        return Err(RecordError::TooManyAddresses {
            max: MAX_ADDRESSES,
            got: addrs_count,
        });
    }
    let mut addresses = Vec::with_capacity(addrs_count);
    for _ in 0..addrs_count {
        let addr_len = read_u16(bytes, &mut cursor)?;
        let addr_bytes = read_bytes(bytes, &mut cursor, addr_len)?;
        let text = String::from_utf8(addr_bytes).map_err(|_| RecordError::Malformed)?;
        let addr: Multiaddr = text.parse().map_err(|_| RecordError::Malformed)?;
        addresses.push(addr);
    }

    Ok(PeerRecord {
        peer_id,
        addresses,
        seq,
        timestamp_nanos,
    })
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<usize, RecordError> {
    let slice = bytes.get(*cursor..*cursor + 2).ok_or(RecordError::Malformed)?;
    *cursor += 2;
    Ok(u16::from_be_bytes([slice[0], slice[1]]) as usize)
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64, RecordError> {
    let slice = bytes.get(*cursor..*cursor + 8).ok_or(RecordError::Malformed)?;
    *cursor += 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_be_bytes(buf))
}

fn read_bytes(bytes: &[u8], cursor: &mut usize, len: usize) -> Result<Vec<u8>, RecordError> {
    let slice = bytes.get(*cursor..*cursor + len).ok_or(RecordError::Malformed)?;
    *cursor += len;
    Ok(slice.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_accepts_untampered_record() {
        let identity = Identity::generate_ed25519();
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let signed = SignedPeerRecord::sign(&identity, vec![addr], 1).unwrap();
        signed.verify().unwrap();
    }

    #[test]
    fn encode_decode_round_trips() {
        let identity = Identity::generate_ed25519();
        let addr: Multiaddr = "/ip4/10.0.0.1/udp/4002/quic-v1".parse().unwrap();
        let signed = SignedPeerRecord::sign(&identity, vec![addr], 3).unwrap();

        let encoded = signed.encode();
        let decoded = SignedPeerRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, signed);
        decoded.verify().unwrap();
    }

    #[test]
    fn verify_rejects_tampered_record() {
        let identity = Identity::generate_ed25519();
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let mut signed = SignedPeerRecord::sign(&identity, vec![addr], 1).unwrap();
        signed.record.seq = 99;
        assert!(signed.verify().is_err());
    }

    #[test]
    fn sign_rejects_more_than_max_addresses() {
        let identity = Identity::generate_ed25519();
        let addrs: Vec<Multiaddr> = (0..MAX_ADDRESSES + 1)
            .map(|i| format!("/ip4/127.0.0.1/udp/{}/quic-v1", 4000 + i).parse().unwrap())
            .collect();
        let result = SignedPeerRecord::sign(&identity, addrs, 1);
        assert!(matches!(result, Err(RecordError::TooManyAddresses { .. })));
    }
}
