//! Address-layer packet
//!
//! The signed unit exchanged between relays. The signature covers
//!
//! ```text
//! SHA3-256(receiver || sender || protocol || version (u64 BE) || body)
//! ```
//!
//! with both keys in compressed form and the protocol as a single byte.
//! This order is part of the wire contract and only changes together with
//! [`PACKET_VERSION`].
//!
//! On the wire the packet is a protobuf message; readers skip tags they do
//! not know, so fields can be appended without breaking older nodes.

use prost::Message as _;
use relaynet_crypto::{signing, Digest, SecretKey};

use crate::error::{Error, Result};
use crate::types::NodeAddress;

/// Current packet format version
pub const PACKET_VERSION: u64 = 1;

/// Field-tagged wire representation
#[derive(Clone, PartialEq, prost::Message)]
struct PacketWire {
    #[prost(bytes = "vec", tag = "1")]
    receiver: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    sender: Vec<u8>,
    #[prost(uint32, tag = "3")]
    protocol: u32,
    #[prost(uint64, tag = "4")]
    version: u64,
    #[prost(bytes = "vec", tag = "5")]
    body: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    signature: Vec<u8>,
    #[prost(bool, tag = "7")]
    plain: bool,
    #[prost(bool, tag = "8")]
    check_instructions: bool,
}

/// A signed address-layer packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressLayerPacket {
    /// Sending node
    pub sender: NodeAddress,
    /// Destination node
    pub receiver: NodeAddress,
    /// Protocol type used to select a handler at the destination
    pub protocol: u8,
    /// Packet format version
    pub version: u64,
    /// Payload
    pub body: Vec<u8>,
    /// DER ECDSA signature by `sender`
    pub signature: Vec<u8>,
    /// Body is not encrypted
    pub plain: bool,
    /// Sender asks the receiver to check its instructions
    pub check_instructions: bool,
}

impl AddressLayerPacket {
    /// Create an unsigned packet with the current version
    pub fn new(sender: NodeAddress, receiver: NodeAddress, protocol: u8, body: Vec<u8>) -> Self {
        Self {
            sender,
            receiver,
            protocol,
            version: PACKET_VERSION,
            body,
            signature: Vec::new(),
            plain: true,
            check_instructions: false,
        }
    }

    /// Hash covered by the signature
    pub fn compute_hash(&self) -> Digest {
        signing::hash(&[
            &self.receiver.to_bytes(),
            &self.sender.to_bytes(),
            &[self.protocol],
            &self.version.to_be_bytes(),
            &self.body,
        ])
    }

    /// Sign with the sender's secret key
    pub fn sign(&mut self, secret_key: &SecretKey) {
        self.signature = signing::sign(secret_key, &self.compute_hash());
    }

    /// Check the signature against the embedded sender key.
    ///
    /// This detects tampering only: it does not prove the sender key belongs
    /// to a known relay.
    pub fn validate_signature(&self) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        signing::verify(self.sender.public_key(), &self.signature, &self.compute_hash())
            .unwrap_or(false)
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        PacketWire {
            receiver: self.receiver.to_bytes().to_vec(),
            sender: self.sender.to_bytes().to_vec(),
            protocol: u32::from(self.protocol),
            version: self.version,
            body: self.body.clone(),
            signature: self.signature.clone(),
            plain: self.plain,
            check_instructions: self.check_instructions,
        }
        .encode_to_vec()
    }

    /// Decode from wire bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire = PacketWire::decode(bytes)?;

        let protocol = u8::try_from(wire.protocol)
            .map_err(|_| Error::Decode(format!("protocol type {} out of range", wire.protocol)))?;

        Ok(Self {
            sender: NodeAddress::from_bytes(&wire.sender)?,
            receiver: NodeAddress::from_bytes(&wire.receiver)?,
            protocol,
            version: wire.version,
            body: wire.body,
            signature: wire.signature,
            plain: wire.plain,
            check_instructions: wire.check_instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaynet_crypto::SigningKeyPair;

    fn signed_packet() -> (AddressLayerPacket, SigningKeyPair) {
        let sender = SigningKeyPair::from_secret_bytes(&[0x21; 32]).unwrap();
        let receiver = SigningKeyPair::generate();
        let mut packet = AddressLayerPacket::new(
            NodeAddress::new(*sender.public_key()),
            NodeAddress::new(*receiver.public_key()),
            7,
            b"hello".to_vec(),
        );
        let secret = relaynet_crypto::signing::parse_secret_key(&[0x21; 32]).unwrap();
        packet.sign(&secret);
        (packet, sender)
    }

    #[test]
    fn test_signed_packet_validates() {
        let (packet, _) = signed_packet();
        assert!(packet.validate_signature());
    }

    #[test]
    fn test_unsigned_packet_is_invalid() {
        let (mut packet, _) = signed_packet();
        packet.signature.clear();
        assert!(!packet.validate_signature());
    }

    #[test]
    fn test_garbage_signature_is_invalid() {
        let (mut packet, _) = signed_packet();
        packet.signature = vec![0xde, 0xad];
        assert!(!packet.validate_signature());
    }

    #[test]
    fn test_tampering_invalidates() {
        let (packet, _) = signed_packet();

        let mut p = packet.clone();
        p.body[0] ^= 1;
        assert!(!p.validate_signature());

        let mut p = packet.clone();
        p.protocol += 1;
        assert!(!p.validate_signature());

        let mut p = packet.clone();
        p.version += 1;
        assert!(!p.validate_signature());

        let mut p = packet.clone();
        p.receiver = NodeAddress::new(*SigningKeyPair::generate().public_key());
        assert!(!p.validate_signature());

        let mut p = packet;
        p.sender = NodeAddress::new(*SigningKeyPair::generate().public_key());
        assert!(!p.validate_signature());
    }

    #[test]
    fn test_flags_are_not_signed() {
        let (mut packet, _) = signed_packet();
        packet.plain = false;
        packet.check_instructions = true;
        assert!(packet.validate_signature());
    }

    #[test]
    fn test_hash_field_order() {
        let (packet, _) = signed_packet();
        let expected = signing::hash(&[
            &packet.receiver.to_bytes(),
            &packet.sender.to_bytes(),
            &[7u8],
            &1u64.to_be_bytes(),
            b"hello",
        ]);
        assert_eq!(packet.compute_hash(), expected);
    }

    #[test]
    fn test_wire_roundtrip_preserves_signature() {
        let (mut packet, _) = signed_packet();
        packet.check_instructions = true;
        let decoded = AddressLayerPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.validate_signature());
    }

    #[test]
    fn test_decode_garbage() {
        let result = AddressLayerPacket::decode(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_bad_key() {
        let wire = PacketWire {
            receiver: vec![0x02; 33],
            sender: vec![0x07; 33],
            protocol: 1,
            version: 1,
            body: b"x".to_vec(),
            ..Default::default()
        };
        let result = AddressLayerPacket::decode(&wire.encode_to_vec());
        assert!(matches!(result, Err(Error::KeyFormat(_))));
    }

    #[test]
    fn test_decode_protocol_out_of_range() {
        let (packet, _) = signed_packet();
        let mut wire = PacketWire::decode(packet.encode().as_slice()).unwrap();
        wire.protocol = 300;
        let result = AddressLayerPacket::decode(&wire.encode_to_vec());
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let (packet, _) = signed_packet();
        let mut bytes = packet.encode();
        // field 15, wire type 2 (length-delimited), 3 bytes
        bytes.extend_from_slice(&[0x7a, 0x03, b'n', b'e', b'w']);
        let decoded = AddressLayerPacket::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }
}
