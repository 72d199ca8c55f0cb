//! Bulk-transfer engine abstractions
//!
//! A [`BulkChannel`] is one claimed DMA channel bound to one transport FIFO.
//! The fixed-address side is always the FIFO, the incrementing side is the
//! memory buffer, words are 32 bits wide and pacing follows the transport's
//! data-request signal.
//!
//! Arming never blocks. Completion is reported asynchronously by the
//! chip's interrupt handler, exactly once per armed transfer, unless the
//! transfer is aborted first.

/// Transfer direction, relative to the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Memory to transmit FIFO
    Tx,
    /// Receive FIFO to memory
    Rx,
}

/// Errors from the bulk-transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// No free channel at acquisition time
    ChannelUnavailable,
}

/// One claimed bulk-transfer channel
///
/// The buffer handed to `start_*` must stay untouched until completion is
/// observed or [`BulkChannel::abort`] returns. Callers own the buffer for
/// the whole transfer and abort before reusing it.
pub trait BulkChannel {
    /// Hardware channel number (diagnostics)
    fn id(&self) -> u8;

    /// Direction this channel was claimed for
    fn direction(&self) -> Direction;

    /// Largest word count a single transfer may carry
    fn max_words(&self) -> usize;

    /// Configure and arm a memory-to-FIFO transfer of `words`
    fn start_tx(&mut self, words: &[u32]);

    /// Configure and arm a FIFO-to-memory transfer filling `words`
    fn start_rx(&mut self, words: &mut [u32]);

    /// Cancel any in-flight transfer and suppress its completion interrupt
    ///
    /// Leaves the channel idle and ready to be armed again.
    fn abort(&mut self);
}
