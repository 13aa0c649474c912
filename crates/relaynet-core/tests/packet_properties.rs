//! Property tests for the address-layer packet signature contract

use proptest::prelude::*;
use relaynet_core::{AddressLayerPacket, NodeAddress};
use relaynet_crypto::signing::parse_secret_key;
use relaynet_crypto::SigningKeyPair;

fn key_from_seed(seed: u8) -> (relaynet_crypto::SecretKey, NodeAddress) {
    // valid secrets are non-zero and below the curve order
    let bytes = [seed.clamp(1, 0x7f); 32];
    let secret = parse_secret_key(&bytes).unwrap();
    let pair = SigningKeyPair::from_secret_bytes(&bytes).unwrap();
    (secret, NodeAddress::new(*pair.public_key()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn signed_packets_validate(
        body in proptest::collection::vec(any::<u8>(), 1..256),
        protocol in any::<u8>(),
        version in any::<u64>(),
        sender_seed in 1u8..=127,
        receiver_seed in 1u8..=127,
    ) {
        let (secret, sender) = key_from_seed(sender_seed);
        let (_, receiver) = key_from_seed(receiver_seed);

        let mut packet = AddressLayerPacket::new(sender, receiver, protocol, body);
        packet.version = version;
        packet.sign(&secret);

        prop_assert!(packet.validate_signature());

        let decoded = AddressLayerPacket::decode(&packet.encode()).unwrap();
        prop_assert!(decoded.validate_signature());
    }

    #[test]
    fn body_mutation_breaks_signature(
        body in proptest::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (secret, sender) = key_from_seed(3);
        let (_, receiver) = key_from_seed(4);

        let mut packet = AddressLayerPacket::new(sender, receiver, 9, body);
        packet.sign(&secret);

        let i = index.index(packet.body.len());
        packet.body[i] ^= flip;
        prop_assert!(!packet.validate_signature());
    }

    #[test]
    fn header_mutation_breaks_signature(
        protocol in any::<u8>(),
        protocol_delta in 1u8..=255,
        version_delta in 1u64..1000,
    ) {
        let (secret, sender) = key_from_seed(5);
        let (_, receiver) = key_from_seed(6);

        let mut packet = AddressLayerPacket::new(sender, receiver, protocol, b"body".to_vec());
        packet.sign(&secret);

        let mut p = packet.clone();
        p.protocol = p.protocol.wrapping_add(protocol_delta);
        prop_assert!(!p.validate_signature());

        let mut p = packet;
        p.version = p.version.wrapping_add(version_delta);
        prop_assert!(!p.validate_signature());
    }
}
