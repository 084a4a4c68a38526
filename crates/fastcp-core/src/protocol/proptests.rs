//! Property-based tests for the frame codec, payloads, and session cipher.

#![cfg(test)]

use proptest::prelude::*;

use crate::constants::{MAX_PAYLOAD, NONCE_LEN};
use crate::crypto::Cipher;
use crate::protocol::codec::{decode_header, encode_packet};
use crate::protocol::{DataStreamChunk, EndFileTransfer, Packet};

prop_compose! {
    fn arb_packet()(
        opcode in 0u8..=4,
        flags in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..2048),
    ) -> Packet {
        Packet { opcode, flags, payload }
    }
}

prop_compose! {
    fn arb_chunk_header()(
        sequence in any::<u32>(),
        compression in any::<u16>(),
        data_length in any::<u32>(),
    ) -> DataStreamChunk {
        DataStreamChunk { sequence, compression, data_length }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn frame_roundtrip(packet in arb_packet()) {
        let bytes = encode_packet(&packet).unwrap();
        let header = decode_header(&bytes[..4]).unwrap();

        prop_assert_eq!(header.opcode, packet.opcode);
        prop_assert_eq!(header.flags, packet.flags);
        prop_assert_eq!(header.len as usize, bytes.len());
        prop_assert_eq!(&bytes[4..], &packet.payload[..]);
    }

    #[test]
    fn decode_header_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..16)) {
        let _ = decode_header(&bytes);
    }

    #[test]
    fn oversize_payload_refused(extra in 1usize..1024) {
        let packet = Packet {
            opcode: 3,
            flags: 0,
            payload: vec![0u8; MAX_PAYLOAD + extra],
        };
        prop_assert!(encode_packet(&packet).is_err());
    }

    #[test]
    fn chunk_header_roundtrip(chunk in arb_chunk_header()) {
        let decoded = DataStreamChunk::decode(&chunk.encode()).unwrap();
        prop_assert_eq!(decoded, chunk);
    }

    #[test]
    fn end_transfer_roundtrip(checksum in any::<[u8; 32]>()) {
        let end = EndFileTransfer { checksum };
        let decoded = EndFileTransfer::decode(&end.encode()).unwrap();
        prop_assert_eq!(decoded, end);
    }

    #[test]
    fn cipher_roundtrip_is_identity(
        key16 in any::<[u8; 16]>(),
        nonce in any::<[u8; NONCE_LEN]>(),
        data in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let cipher = Cipher::with_key(&key16, &nonce);
        let decrypted = cipher.decrypt(cipher.encrypt(data.clone()));
        prop_assert_eq!(decrypted, data);
    }

    #[test]
    fn cipher_roundtrip_aes256(
        key32 in any::<[u8; 32]>(),
        nonce in any::<[u8; NONCE_LEN]>(),
        data in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let cipher = Cipher::with_key(&key32, &nonce);
        let decrypted = cipher.decrypt(cipher.encrypt(data.clone()));
        prop_assert_eq!(decrypted, data);
    }
}
