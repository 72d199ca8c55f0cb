//! DMA channels feeding the PIO FIFOs
//!
//! Embassy owns `DMA_IRQ_0` for its own transfers. The channels claimed
//! here are moved to `DMA_IRQ_1`, whose handler ([`on_dma_irq`]) reports
//! each completion to the matching [`CompletionSignal`]. That handler is
//! the only writer of `Done`/`Error`.
//!
//! At most one channel per direction can be claimed, since each direction
//! has exactly one completion cell.

use core::sync::atomic::{compiler_fence, Ordering as FenceOrdering};

use embassy_rp::dma::Channel;
use embassy_rp::pac;
use embassy_rp::pac::dma::vals::{DataSize, TreqSel};
use embassy_rp::Peri;
use joywire_core::codec::{MAX_RX_WORDS, MAX_TX_WORDS};
use joywire_core::{CompletionSignal, Completions};
use joywire_hal::{BulkChannel, Direction, EngineError};
use portable_atomic::{AtomicU8, Ordering};

use crate::transport::FifoEndpoint;

/// Completion interrupt line used for the bus channels
const BUS_DMA_IRQ: usize = 1;

/// Embassy's completion interrupt line
const EMBASSY_DMA_IRQ: usize = 0;

const UNCLAIMED: u8 = 0xFF;

static COMPLETIONS: Completions = Completions::new();

/// Hardware channel number per direction (TX, RX)
static CLAIMED: [AtomicU8; 2] = [AtomicU8::new(UNCLAIMED), AtomicU8::new(UNCLAIMED)];

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Tx => 0,
        Direction::Rx => 1,
    }
}

/// Report finished bus transfers; call from `DMA_IRQ_1`
pub fn on_dma_irq() {
    let pending = pac::DMA.ints(BUS_DMA_IRQ).read();

    for direction in [Direction::Tx, Direction::Rx] {
        let number = CLAIMED[slot(direction)].load(Ordering::Acquire);
        if number == UNCLAIMED || pending & (1 << number) == 0 {
            continue;
        }

        let signal = COMPLETIONS.get(direction);
        if pac::DMA.ch(number as usize).ctrl_trig().read().ahb_error() {
            signal.mark_error();
        } else {
            signal.mark_done();
        }
    }

    pac::DMA.ints(BUS_DMA_IRQ).write_value(pending);
}

/// One claimed DMA channel bound to one PIO FIFO
pub struct DmaChannel<'d, C: Channel> {
    _channel: Peri<'d, C>,
    number: u8,
    endpoint: FifoEndpoint,
}

impl<'d, C: Channel> DmaChannel<'d, C> {
    /// Claim `channel` for transfers to or from `endpoint`
    ///
    /// Returns the channel and the completion cell its interrupt writes.
    /// Fails if a channel is already claimed for that direction.
    pub fn claim(
        channel: Peri<'d, C>,
        endpoint: FifoEndpoint,
    ) -> Result<(Self, &'static CompletionSignal), EngineError> {
        let number = channel.number();
        CLAIMED[slot(endpoint.direction)]
            .compare_exchange(UNCLAIMED, number, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::ChannelUnavailable)?;

        let mask = 1u32 << number;
        // Route this channel's completion away from embassy's handler
        pac::DMA.inte(EMBASSY_DMA_IRQ).modify(|w| *w &= !mask);
        pac::DMA.ints(BUS_DMA_IRQ).write_value(mask);
        pac::DMA.inte(BUS_DMA_IRQ).modify(|w| *w |= mask);

        #[cfg(feature = "defmt")]
        defmt::debug!("dma: ch{} claimed for {}", number, endpoint.direction);

        Ok((
            Self {
                _channel: channel,
                number,
                endpoint,
            },
            COMPLETIONS.get(endpoint.direction),
        ))
    }

    fn arm(&mut self, read_addr: u32, write_addr: u32, count: usize) {
        let ch = pac::DMA.ch(self.number as usize);
        let (incr_read, incr_write) = match self.endpoint.direction {
            Direction::Tx => (true, false),
            Direction::Rx => (false, true),
        };

        ch.read_addr().write_value(read_addr);
        ch.write_addr().write_value(write_addr);
        ch.trans_count().write_value(count as u32);
        compiler_fence(FenceOrdering::SeqCst);
        ch.ctrl_trig().write(|w| {
            w.set_treq_sel(TreqSel::from(self.endpoint.dreq));
            w.set_data_size(DataSize::SIZE_WORD);
            w.set_incr_read(incr_read);
            w.set_incr_write(incr_write);
            // Chaining to itself disables chaining
            w.set_chain_to(self.number);
            // Clear any error left by an earlier fault
            w.set_read_error(true);
            w.set_write_error(true);
            w.set_en(true);
        });
        compiler_fence(FenceOrdering::SeqCst);
    }
}

impl<'d, C: Channel> BulkChannel for DmaChannel<'d, C> {
    fn id(&self) -> u8 {
        self.number
    }

    fn direction(&self) -> Direction {
        self.endpoint.direction
    }

    fn max_words(&self) -> usize {
        match self.endpoint.direction {
            Direction::Tx => MAX_TX_WORDS,
            Direction::Rx => MAX_RX_WORDS,
        }
    }

    fn start_tx(&mut self, words: &[u32]) {
        self.arm(words.as_ptr() as u32, self.endpoint.addr, words.len());
    }

    fn start_rx(&mut self, words: &mut [u32]) {
        self.arm(self.endpoint.addr, words.as_mut_ptr() as u32, words.len());
    }

    fn abort(&mut self) {
        let mask = 1u32 << self.number;
        let ch = pac::DMA.ch(self.number as usize);

        // An abort can raise a spurious completion; keep it off the line
        pac::DMA.inte(BUS_DMA_IRQ).modify(|w| *w &= !mask);
        pac::DMA.chan_abort().modify(|m| m.set_chan_abort(mask as u16));
        while ch.ctrl_trig().read().busy() {}
        pac::DMA.ints(BUS_DMA_IRQ).write_value(mask);
        pac::DMA.inte(BUS_DMA_IRQ).modify(|w| *w |= mask);
    }
}

impl<'d, C: Channel> Drop for DmaChannel<'d, C> {
    fn drop(&mut self) {
        self.abort();
        pac::DMA
            .inte(BUS_DMA_IRQ)
            .modify(|w| *w &= !(1u32 << self.number));
        CLAIMED[slot(self.endpoint.direction)].store(UNCLAIMED, Ordering::Release);
    }
}
