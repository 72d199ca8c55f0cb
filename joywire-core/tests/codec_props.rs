//! Property tests for the frame codec

use joywire_core::codec::{
    bit_count_minus1, decode_byte, decode_frame, encode, oversample, CodecError, RxPacking,
};
use joywire_core::{DMA_MAX_FRAME_BYTES, FIFO_MAX_FRAME_BYTES};
use proptest::collection::vec;
use proptest::prelude::*;

/// Rebuild the payload bytes from an encoded word stream
fn unpack(words: &[u32], len: usize) -> Vec<u8> {
    words[1..]
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .take(len)
        .collect()
}

proptest! {
    #[test]
    fn encode_layout(frame in vec(any::<u8>(), 1..=DMA_MAX_FRAME_BYTES)) {
        let words = encode(&frame, DMA_MAX_FRAME_BYTES).unwrap();

        prop_assert_eq!(words.len(), 1 + frame.len().div_ceil(4));
        prop_assert_eq!(words[0], bit_count_minus1(frame.len()));
        prop_assert_eq!(unpack(&words, frame.len()), frame.clone());

        // Padding bytes in the last word are zero
        let padded: Vec<u8> = words[1..].iter().flat_map(|w| w.to_be_bytes()).collect();
        prop_assert!(padded[frame.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_rejects_over_limit(extra in 1usize..8) {
        let frame = vec![0u8; FIFO_MAX_FRAME_BYTES + extra];
        prop_assert_eq!(encode(&frame, FIFO_MAX_FRAME_BYTES), Err(CodecError::FrameTooLong));
    }

    #[test]
    fn majority_survives_one_bad_sample_per_bit(byte in any::<u8>(), picks in vec(0u32..4, 8)) {
        // pick 3 leaves a triplet clean, 0..=2 flips that sample
        let mut samples = oversample(byte);
        for (bit, &pick) in picks.iter().enumerate() {
            if pick < 3 {
                samples ^= 1 << (23 - 3 * bit as u32 - pick);
            }
        }
        prop_assert_eq!(decode_byte(samples), byte);
    }

    #[test]
    fn upper_bits_never_matter(byte in any::<u8>(), noise in any::<u8>()) {
        let samples = ((noise as u32) << 24) | oversample(byte);
        prop_assert_eq!(decode_byte(samples), byte);
    }

    #[test]
    fn decode_frame_one_byte_per_word(frame in vec(any::<u8>(), 0..=FIFO_MAX_FRAME_BYTES)) {
        let words: Vec<u32> = frame.iter().map(|&b| oversample(b)).collect();
        let decoded = decode_frame(&words, frame.len(), RxPacking::OneBytePerWord);
        prop_assert_eq!(decoded.as_bytes(), frame.as_slice());
    }

    #[test]
    fn encode_then_line_then_decode(frame in vec(any::<u8>(), 1..=DMA_MAX_FRAME_BYTES)) {
        let words = encode(&frame, DMA_MAX_FRAME_BYTES).unwrap();

        // A clean loopback line delivers each transmitted byte as 3 samples per bit
        let line: Vec<u32> = unpack(&words, frame.len())
            .into_iter()
            .map(oversample)
            .collect();
        prop_assert_eq!(line.len(), frame.len());

        let decoded = decode_frame(&line, frame.len(), RxPacking::OneBytePerWord);
        prop_assert_eq!(decoded.as_bytes(), frame.as_slice());
    }
}
