//! Byte frames exchanged over the bus

use core::ops::Deref;

use heapless::Vec;

use crate::codec::CodecError;

/// Longest frame accepted in DMA mode
pub const DMA_MAX_FRAME_BYTES: usize = 16;

/// Longest frame accepted in FIFO-only mode (8 FIFO words of 4 bytes)
pub const FIFO_MAX_FRAME_BYTES: usize = 4 * 8;

/// Storage capacity of a [`Frame`], the largest limit of any mode
pub const MAX_FRAME_CAPACITY: usize = FIFO_MAX_FRAME_BYTES;

/// An ordered sequence of bytes sent or received as one unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    bytes: Vec<u8, MAX_FRAME_CAPACITY>,
}

impl Frame {
    /// Create a frame from a byte slice
    pub fn new(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut frame = Self::empty();
        frame
            .bytes
            .extend_from_slice(bytes)
            .map_err(|_| CodecError::FrameTooLong)?;
        Ok(frame)
    }

    /// Create a frame with no bytes
    pub const fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append one byte
    pub fn push(&mut self, byte: u8) -> Result<(), CodecError> {
        self.bytes.push(byte).map_err(|_| CodecError::FrameTooLong)
    }

    /// Frame contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:02X}", self.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_slice() {
        let frame = Frame::new(&[0x12, 0x34]).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.as_bytes(), &[0x12, 0x34]);
    }

    #[test]
    fn test_frame_capacity() {
        assert!(Frame::new(&[0u8; MAX_FRAME_CAPACITY]).is_ok());
        assert_eq!(
            Frame::new(&[0u8; MAX_FRAME_CAPACITY + 1]),
            Err(CodecError::FrameTooLong)
        );
    }

    #[test]
    fn test_frame_push_until_full() {
        let mut frame = Frame::empty();
        for i in 0..MAX_FRAME_CAPACITY {
            frame.push(i as u8).unwrap();
        }
        assert_eq!(frame.push(0xFF), Err(CodecError::FrameTooLong));
    }
}
