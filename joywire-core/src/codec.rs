//! Frame codec
//!
//! Pure conversions between byte frames and the 32-bit word streams the
//! bit-level transport consumes and produces. No hardware access.
//!
//! Transmit word stream:
//! ```text
//! ┌──────────────────┬─────────────┬─────────────┬───
//! │ bits_to_send - 1 │ b0 b1 b2 b3 │ b4 b5 b6 b7 │ ...
//! │ header word      │ MSB first, last word zero-padded
//! └──────────────────┴─────────────┴─────────────┴───
//! ```
//!
//! Receive words carry 3 samples per bit for 8 bits in their low 24 bits,
//! oldest sample in bit 23:
//! ```text
//! 00000000 | s0 s1 s2 | s0 s1 s2 | ... | s0 s1 s2
//!            bit 7                      bit 0
//! ```

use heapless::Vec;

use crate::frame::{Frame, MAX_FRAME_CAPACITY};

/// Payload bytes packed into one transmit word
pub const BYTES_PER_WORD: usize = 4;

/// Line samples taken per received bit
pub const SAMPLES_PER_BIT: u32 = 3;

/// Width of one oversampled byte in a receive word
pub const SAMPLE_WINDOW_BITS: u32 = 8 * SAMPLES_PER_BIT;

const SAMPLE_WINDOW_MASK: u32 = (1 << SAMPLE_WINDOW_BITS) - 1;

/// Largest transmit word stream (header plus payload words)
pub const MAX_TX_WORDS: usize = 1 + MAX_FRAME_CAPACITY.div_ceil(BYTES_PER_WORD);

/// Largest receive word count (one word per byte)
pub const MAX_RX_WORDS: usize = MAX_FRAME_CAPACITY;

/// Encoded transmit words
pub type WordStream = Vec<u32, MAX_TX_WORDS>;

/// Codec errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Frame exceeds the allowed length
    FrameTooLong,
}

/// How received bytes are laid out in receive words
///
/// Fixed per deployment; must match the receive program's push threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxPacking {
    /// One oversampled byte in the low 24 bits of each word
    #[default]
    OneBytePerWord,
    /// Two bytes per word: the window at bits 31..8 then the window at bits 23..0
    TwoBytesPerWord,
}

impl RxPacking {
    /// Bytes carried by one receive word
    pub const fn bytes_per_word(self) -> usize {
        match self {
            RxPacking::OneBytePerWord => 1,
            RxPacking::TwoBytesPerWord => 2,
        }
    }
}

/// Bit-count header value for a frame of `len` bytes (`len >= 1`)
pub fn bit_count_minus1(len: usize) -> u32 {
    (len as u32 * 8).saturating_sub(1)
}

/// Number of receive words holding `len` bytes
pub fn rx_word_count(len: usize, packing: RxPacking) -> usize {
    len.div_ceil(packing.bytes_per_word())
}

/// Encode a frame into the transmit word stream
///
/// An empty frame encodes to an empty stream (nothing to send).
/// Frames longer than `max_bytes` are rejected.
pub fn encode(frame: &[u8], max_bytes: usize) -> Result<WordStream, CodecError> {
    if frame.len() > max_bytes.min(MAX_FRAME_CAPACITY) {
        return Err(CodecError::FrameTooLong);
    }

    let mut words = WordStream::new();
    if frame.is_empty() {
        return Ok(words);
    }

    words
        .push(bit_count_minus1(frame.len()))
        .map_err(|_| CodecError::FrameTooLong)?;

    for chunk in frame.chunks(BYTES_PER_WORD) {
        let mut packed = [0u8; BYTES_PER_WORD];
        packed[..chunk.len()].copy_from_slice(chunk);
        words
            .push(u32::from_be_bytes(packed))
            .map_err(|_| CodecError::FrameTooLong)?;
    }

    Ok(words)
}

/// Recover one byte from 24 oversampled bits by per-bit majority vote
///
/// Tolerates one wrong sample per bit. Bits above 23 are ignored.
pub fn decode_byte(samples: u32) -> u8 {
    let mut out = 0u8;
    for i in 0..8 {
        let base = SAMPLE_WINDOW_BITS - 1 - SAMPLES_PER_BIT * i;
        let s0 = (samples >> base) & 1;
        let s1 = (samples >> (base - 1)) & 1;
        let s2 = (samples >> (base - 2)) & 1;
        let majority = (s0 & s1) | (s1 & s2) | (s2 & s0);
        out = (out << 1) | majority as u8;
    }
    out
}

/// Decode `len` bytes from received words
///
/// Never fails: missing words simply shorten the frame, and timeouts are
/// detected upstream.
pub fn decode_frame(words: &[u32], len: usize, packing: RxPacking) -> Frame {
    let mut frame = Frame::empty();
    let per_word = packing.bytes_per_word();

    for index in 0..len.min(MAX_FRAME_CAPACITY) {
        let Some(&word) = words.get(index / per_word) else {
            break;
        };
        let window = match (packing, index % per_word) {
            (RxPacking::TwoBytesPerWord, 0) => word >> 8,
            _ => word & SAMPLE_WINDOW_MASK,
        };
        // Capacity was checked by the loop bound
        let _ = frame.push(decode_byte(window));
    }

    frame
}

/// Oversample a byte the way a clean line would (3 equal samples per bit)
///
/// Used for loopback diagnostics and tests.
pub fn oversample(byte: u8) -> u32 {
    (0..8u32).fold(0u32, |acc, i| {
        let bit = ((byte >> (7 - i)) & 1) as u32;
        (acc << SAMPLES_PER_BIT) | (bit * 0b111)
    })
}
