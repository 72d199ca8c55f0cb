//! Frame transceiver
//!
//! Sequences one transfer per direction:
//!
//! ```text
//! TX: Idle ─▶ SendArmed ─▶ SendWaitComplete ─▶ Idle
//!      wait bus turn, stage words, arm engine, notify transport, wait
//!
//! RX: Idle ─▶ ReceiveArmed ─▶ ReceiveWaitComplete ─▶ Idle (+ frame)
//!      arm engine, publish bit count, wait, majority-decode
//! ```
//!
//! Every wait is bounded. A transfer that misses its deadline is aborted,
//! its completion signal disarmed and its transport reset before the error
//! is returned, so the next call starts from clean hardware.
//!
//! On a half-duplex bus the receive must be armed before the matching send
//! (see [`Transceiver::exchange`]).

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use joywire_hal::transport::BUS_TURN_IRQ;
use joywire_hal::{BitTransport, BulkChannel, Direction};

use crate::codec::{self, MAX_RX_WORDS, MAX_TX_WORDS};
use crate::config::{TransceiverConfig, TransferMode};
use crate::error::{ExchangeError, RxError, TxError};
use crate::frame::Frame;
use crate::signal::{CompletionSignal, CompletionStatus};

/// Transmit direction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    /// No transmit in flight
    Idle,
    /// Words staged and engine armed
    SendArmed,
    /// Transport notified, waiting for completion
    SendWaitComplete,
}

/// Receive direction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// No receive in flight
    Idle,
    /// Engine armed and bit count published
    ReceiveArmed,
    /// Waiting for completion
    ReceiveWaitComplete,
}

/// Word buffers the bulk-transfer engine reads from and writes to
///
/// Kept outside the transceiver so they never move while a transfer is
/// armed. Firmware places them in a `static`.
pub struct TransferBuffers {
    tx: [u32; MAX_TX_WORDS],
    rx: [u32; MAX_RX_WORDS],
}

impl TransferBuffers {
    /// Zeroed buffers
    pub const fn new() -> Self {
        Self {
            tx: [0; MAX_TX_WORDS],
            rx: [0; MAX_RX_WORDS],
        }
    }
}

impl Default for TransferBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// One direction's hardware: transport, engine channel and completion cell
pub struct Port<'a, T, C> {
    transport: T,
    channel: C,
    signal: &'a CompletionSignal,
}

impl<'a, T: BitTransport, C: BulkChannel> Port<'a, T, C> {
    /// Bundle a transport with the channel feeding it
    ///
    /// `signal` must be the cell the channel's completion interrupt writes.
    pub fn new(transport: T, channel: C, signal: &'a CompletionSignal) -> Self {
        Self {
            transport,
            channel,
            signal,
        }
    }
}

/// Snapshot of both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Transmit program counter
    pub tx_pc: u8,
    /// Receive program counter
    pub rx_pc: u8,
    /// Transmit state
    pub tx_state: TxState,
    /// Receive state
    pub rx_state: RxState,
    /// Transmit completion cell
    pub tx_completion: CompletionStatus,
    /// Receive completion cell
    pub rx_completion: CompletionStatus,
}

/// How a bounded completion wait ended
enum Outcome {
    Done,
    Fault,
    TimedOut,
}

/// Time left for a polled hardware wait
struct Budget {
    remaining_us: u32,
    step_us: u32,
}

impl Budget {
    fn new(total_us: u32, step_us: u32) -> Self {
        Self {
            remaining_us: total_us,
            step_us: step_us.max(1),
        }
    }

    /// Sleep one step; `false` once the budget is spent
    async fn wait<D: DelayNs>(&mut self, delay: &mut D) -> bool {
        if self.remaining_us == 0 {
            return false;
        }
        let step = self.step_us.min(self.remaining_us);
        delay.delay_us(step).await;
        self.remaining_us -= step;
        true
    }
}

/// An armed engine transfer that is aborted unless explicitly settled
///
/// Dropping an unsettled transfer (deadline missed, error path, or the
/// owning future dropped mid-wait) aborts the channel, disarms the signal
/// and returns the direction to idle.
struct ArmedTransfer<'g, C: BulkChannel, S: Copy> {
    channel: &'g mut C,
    signal: &'g CompletionSignal,
    state: &'g mut S,
    idle: S,
    settled: bool,
}

impl<'g, C: BulkChannel, S: Copy> ArmedTransfer<'g, C, S> {
    fn new(channel: &'g mut C, signal: &'g CompletionSignal, state: &'g mut S, idle: S) -> Self {
        Self {
            channel,
            signal,
            state,
            idle,
            settled: false,
        }
    }

    fn advance(&mut self, next: S) {
        *self.state = next;
    }

    fn channel(&mut self) -> &mut C {
        &mut *self.channel
    }

    /// Completion was observed and consumed
    fn complete(mut self) {
        *self.state = self.idle;
        self.settled = true;
    }

    /// Leave the transfer armed for a later wait
    fn detach(mut self) {
        self.settled = true;
    }
}

impl<C: BulkChannel, S: Copy> Drop for ArmedTransfer<'_, C, S> {
    fn drop(&mut self) {
        if !self.settled {
            self.channel.abort();
            self.signal.disarm();
            *self.state = self.idle;
        }
    }
}

/// A CPU-fed transfer that resets its transport unless explicitly settled
///
/// The FIFO path has no engine to abort: a send or receive cut short
/// leaves words or a bit count behind in the program, so the transport is
/// reset and the direction returned to idle.
struct FifoTransfer<'g, T: BitTransport, S: Copy> {
    transport: &'g mut T,
    state: &'g mut S,
    idle: S,
    settled: bool,
}

impl<'g, T: BitTransport, S: Copy> FifoTransfer<'g, T, S> {
    fn new(transport: &'g mut T, state: &'g mut S, idle: S) -> Self {
        Self {
            transport,
            state,
            idle,
            settled: false,
        }
    }

    fn advance(&mut self, next: S) {
        *self.state = next;
    }

    fn transport(&mut self) -> &mut T {
        &mut *self.transport
    }

    /// Every word moved
    fn complete(mut self) {
        *self.state = self.idle;
        self.settled = true;
    }
}

impl<T: BitTransport, S: Copy> Drop for FifoTransfer<'_, T, S> {
    fn drop(&mut self) {
        if !self.settled {
            self.transport.reset();
            *self.state = self.idle;
        }
    }
}

/// Wait for a completion report or the deadline, whichever comes first
async fn wait_for_completion<D: DelayNs>(
    signal: &CompletionSignal,
    delay: &mut D,
    timeout_us: u32,
) -> Outcome {
    match select(signal.wait(), delay.delay_us(timeout_us)).await {
        Either::First(CompletionStatus::Done) => Outcome::Done,
        Either::First(_) => Outcome::Fault,
        // The interrupt may have landed right at the deadline
        Either::Second(()) => match signal.take_if_finished() {
            CompletionStatus::Done => Outcome::Done,
            CompletionStatus::Error => Outcome::Fault,
            _ => Outcome::TimedOut,
        },
    }
}

/// Push one word into a transport FIFO within `budget`
async fn push_word<T: BitTransport, D: DelayNs>(
    transport: &mut T,
    delay: &mut D,
    budget: &mut Budget,
    word: u32,
) -> bool {
    while !transport.try_push(word) {
        if !budget.wait(delay).await {
            return false;
        }
    }
    true
}

/// Frame transceiver over one transmit and one receive port
pub struct Transceiver<'a, TT, TC, RT, RC, D>
where
    TT: BitTransport,
    TC: BulkChannel,
    RT: BitTransport,
    RC: BulkChannel,
    D: DelayNs,
{
    tx: Port<'a, TT, TC>,
    rx: Port<'a, RT, RC>,
    delay: D,
    config: TransceiverConfig,
    tx_state: TxState,
    rx_state: RxState,
    buffers: &'a mut TransferBuffers,
    rx_expected: Option<usize>,
}

impl<'a, TT, TC, RT, RC, D> Transceiver<'a, TT, TC, RT, RC, D>
where
    TT: BitTransport,
    TC: BulkChannel,
    RT: BitTransport,
    RC: BulkChannel,
    D: DelayNs,
{
    /// Create a transceiver from started transports and claimed channels
    pub fn new(
        tx: Port<'a, TT, TC>,
        rx: Port<'a, RT, RC>,
        delay: D,
        config: TransceiverConfig,
        buffers: &'a mut TransferBuffers,
    ) -> Self {
        debug_assert_eq!(tx.channel.direction(), Direction::Tx);
        debug_assert_eq!(rx.channel.direction(), Direction::Rx);
        debug!(
            "transceiver: tx ch{} rx ch{} max {} bytes",
            tx.channel.id(),
            rx.channel.id(),
            config.max_frame_bytes()
        );

        Self {
            tx,
            rx,
            delay,
            config,
            tx_state: TxState::Idle,
            rx_state: RxState::Idle,
            buffers,
            rx_expected: None,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    /// Longest frame accepted in the active mode
    pub fn max_frame_bytes(&self) -> usize {
        self.config.max_frame_bytes()
    }

    /// Transmit direction state
    pub fn tx_state(&self) -> TxState {
        self.tx_state
    }

    /// Receive direction state
    pub fn rx_state(&self) -> RxState {
        self.rx_state
    }

    /// Program counters and direction states
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            tx_pc: self.tx.transport.program_counter(),
            rx_pc: self.rx.transport.program_counter(),
            tx_state: self.tx_state,
            rx_state: self.rx_state,
            tx_completion: self.tx.signal.status(),
            rx_completion: self.rx.signal.status(),
        }
    }

    /// Send one frame
    ///
    /// An empty frame succeeds without touching hardware. A frame longer
    /// than the active mode allows fails before anything is armed.
    pub async fn send(&mut self, frame: &[u8], timeout_us: u32) -> Result<(), TxError> {
        let words = codec::encode(frame, self.config.max_frame_bytes())?;
        if words.is_empty() {
            return Ok(());
        }
        if self.config.mode == TransferMode::Dma && words.len() > self.tx.channel.max_words() {
            return Err(TxError::FrameTooLong);
        }
        if self.tx_state != TxState::Idle || self.tx.signal.status() != CompletionStatus::NotStarted
        {
            warn!("send: transmit still pending");
            return Err(TxError::Busy);
        }

        self.wait_bus_turn().await?;
        trace!("send: {} bytes in {} words", frame.len(), words.len());

        match self.config.mode {
            TransferMode::Dma => self.send_dma(&words, timeout_us).await,
            TransferMode::Fifo => self.send_fifo(&words, timeout_us).await,
        }
    }

    /// Wait until the previous frame has fully drained, then take the token
    async fn wait_bus_turn(&mut self) -> Result<(), TxError> {
        let mut budget = Budget::new(self.config.bus_turn_timeout_us, self.config.poll_step_us());
        while !self.tx.transport.interrupt_flag(BUS_TURN_IRQ) {
            if !budget.wait(&mut self.delay).await {
                warn!("send: bus turn not released");
                self.tx.transport.reset();
                return Err(TxError::TimedOut);
            }
        }
        self.tx.transport.clear_interrupt_flag(BUS_TURN_IRQ);
        Ok(())
    }

    async fn send_dma(&mut self, words: &[u32], timeout_us: u32) -> Result<(), TxError> {
        let Self {
            tx,
            delay,
            tx_state,
            buffers,
            ..
        } = self;

        let staged = &mut buffers.tx[..words.len()];
        staged.copy_from_slice(words);

        tx.signal.arm();
        let mut transfer = ArmedTransfer::new(&mut tx.channel, tx.signal, tx_state, TxState::Idle);
        transfer.advance(TxState::SendArmed);
        transfer.channel().start_tx(staged);
        tx.transport.force_start_notification();
        transfer.advance(TxState::SendWaitComplete);

        match wait_for_completion(tx.signal, delay, timeout_us).await {
            Outcome::Done => {
                transfer.complete();
                Ok(())
            }
            Outcome::Fault => {
                drop(transfer);
                tx.transport.reset();
                warn!("send: engine fault");
                Err(TxError::HardwareFault)
            }
            Outcome::TimedOut => {
                drop(transfer);
                tx.transport.reset();
                warn!("send: timed out after {}us", timeout_us);
                Err(TxError::TimedOut)
            }
        }
    }

    /// CPU-driven send: queue words, notify once the FIFO fills or the
    /// frame is queued, keep feeding while the program drains
    async fn send_fifo(&mut self, words: &[u32], timeout_us: u32) -> Result<(), TxError> {
        let Self {
            tx,
            delay,
            config,
            tx_state,
            ..
        } = self;

        let mut budget = Budget::new(timeout_us, config.poll_step_us());
        let mut notified = false;
        let mut transfer = FifoTransfer::new(&mut tx.transport, tx_state, TxState::Idle);
        transfer.advance(TxState::SendArmed);

        for &word in words {
            if !notified {
                if transfer.transport().try_push(word) {
                    continue;
                }
                // FIFO full: let the program start draining
                transfer.transport().force_start_notification();
                notified = true;
                transfer.advance(TxState::SendWaitComplete);
            }
            if !push_word(transfer.transport(), delay, &mut budget, word).await {
                drop(transfer);
                warn!("send: FIFO stalled");
                return Err(TxError::TimedOut);
            }
        }

        if !notified {
            transfer.transport().force_start_notification();
        }
        transfer.complete();
        Ok(())
    }

    /// Arm the receive side for a frame of `expected_len` bytes
    ///
    /// Returns as soon as the engine is armed and the bit count published.
    pub async fn arm_receive(&mut self, expected_len: usize) -> Result<(), RxError> {
        if expected_len > self.config.max_frame_bytes() {
            return Err(RxError::FrameTooLong);
        }
        if self.rx_expected.is_some() || self.rx.signal.status() != CompletionStatus::NotStarted {
            warn!("receive: already armed");
            return Err(RxError::Busy);
        }
        if expected_len == 0 {
            self.rx_expected = Some(0);
            return Ok(());
        }

        let word_count = codec::rx_word_count(expected_len, self.config.rx_packing);
        let bit_count = codec::bit_count_minus1(expected_len);
        let Self {
            rx,
            delay,
            config,
            rx_state,
            buffers,
            rx_expected,
            ..
        } = self;
        let mut budget = Budget::new(config.bus_turn_timeout_us, config.poll_step_us());

        match config.mode {
            TransferMode::Dma => {
                if word_count > rx.channel.max_words() {
                    return Err(RxError::FrameTooLong);
                }
                rx.signal.arm();
                let mut transfer =
                    ArmedTransfer::new(&mut rx.channel, rx.signal, rx_state, RxState::Idle);
                transfer.channel().start_rx(&mut buffers.rx[..word_count]);
                transfer.advance(RxState::ReceiveArmed);

                if !push_word(&mut rx.transport, delay, &mut budget, bit_count).await {
                    drop(transfer);
                    rx.transport.reset();
                    warn!("receive: bit count not accepted");
                    return Err(RxError::TimedOut);
                }
                transfer.detach();
            }
            TransferMode::Fifo => {
                if !push_word(&mut rx.transport, delay, &mut budget, bit_count).await {
                    rx.transport.reset();
                    warn!("receive: bit count not accepted");
                    return Err(RxError::TimedOut);
                }
                *rx_state = RxState::ReceiveArmed;
            }
        }

        trace!("receive: armed for {} bytes", expected_len);
        *rx_expected = Some(expected_len);
        Ok(())
    }

    /// Wait for the armed receive and decode it
    pub async fn finish_receive(&mut self, timeout_us: u32) -> Result<Frame, RxError> {
        let Some(expected_len) = self.rx_expected.take() else {
            return Err(RxError::NotArmed);
        };
        if expected_len == 0 {
            return Ok(Frame::empty());
        }

        let packing = self.config.rx_packing;
        let word_count = codec::rx_word_count(expected_len, packing);
        let Self {
            rx,
            delay,
            config,
            rx_state,
            buffers,
            ..
        } = self;

        match config.mode {
            TransferMode::Dma => {
                let mut transfer =
                    ArmedTransfer::new(&mut rx.channel, rx.signal, rx_state, RxState::Idle);
                transfer.advance(RxState::ReceiveWaitComplete);

                match wait_for_completion(rx.signal, delay, timeout_us).await {
                    Outcome::Done => {
                        transfer.complete();
                        Ok(codec::decode_frame(
                            &buffers.rx[..word_count],
                            expected_len,
                            packing,
                        ))
                    }
                    Outcome::Fault => {
                        drop(transfer);
                        rx.transport.reset();
                        warn!("receive: engine fault");
                        Err(RxError::HardwareFault)
                    }
                    Outcome::TimedOut => {
                        drop(transfer);
                        rx.transport.reset();
                        warn!("receive: timed out after {}us", timeout_us);
                        Err(RxError::TimedOut)
                    }
                }
            }
            TransferMode::Fifo => {
                let mut transfer = FifoTransfer::new(&mut rx.transport, rx_state, RxState::Idle);
                transfer.advance(RxState::ReceiveWaitComplete);
                let mut budget = Budget::new(timeout_us, config.poll_step_us());
                let mut received = 0;

                while received < word_count {
                    match transfer.transport().try_pull() {
                        Some(word) => {
                            buffers.rx[received] = word;
                            received += 1;
                        }
                        None => {
                            if !budget.wait(delay).await {
                                drop(transfer);
                                warn!("receive: {} of {} words", received, word_count);
                                return Err(RxError::TimedOut);
                            }
                        }
                    }
                }

                transfer.complete();
                Ok(codec::decode_frame(
                    &buffers.rx[..word_count],
                    expected_len,
                    packing,
                ))
            }
        }
    }

    /// Drop an armed receive and reset the receive transport
    pub fn cancel_receive(&mut self) {
        if self.rx_expected.take().is_none() {
            return;
        }
        if self.config.mode == TransferMode::Dma {
            self.rx.channel.abort();
            self.rx.signal.disarm();
        }
        self.rx.transport.reset();
        self.rx_state = RxState::Idle;
        debug!("receive: cancelled");
    }

    /// Receive one frame of `expected_len` bytes
    pub async fn receive(&mut self, expected_len: usize, timeout_us: u32) -> Result<Frame, RxError> {
        self.arm_receive(expected_len).await?;
        self.finish_receive(timeout_us).await
    }

    /// Send a request and receive its response
    ///
    /// The receive is armed first so no response bit is missed. If the send
    /// fails the receive is cancelled.
    pub async fn exchange(
        &mut self,
        frame: &[u8],
        expected_len: usize,
        timeout_us: u32,
    ) -> Result<Frame, ExchangeError> {
        if frame.len() > self.config.max_frame_bytes() {
            return Err(TxError::FrameTooLong.into());
        }

        self.arm_receive(expected_len).await?;
        if let Err(e) = self.send(frame, timeout_us).await {
            self.cancel_receive();
            return Err(e.into());
        }
        Ok(self.finish_receive(timeout_us).await?)
    }
}

impl<TT, TC, RT, RC, D> Drop for Transceiver<'_, TT, TC, RT, RC, D>
where
    TT: BitTransport,
    TC: BulkChannel,
    RT: BitTransport,
    RC: BulkChannel,
    D: DelayNs,
{
    fn drop(&mut self) {
        // The buffers outlive us, but nothing may write them after we're gone
        self.tx.channel.abort();
        self.tx.signal.disarm();
        self.rx.channel.abort();
        self.rx.signal.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{oversample, RxPacking};
    use crate::signal::Completions;
    use core::cell::Cell;
    use embassy_futures::block_on;
    use heapless::{Deque, Vec};

    /// Transport that records what the transceiver does to it
    struct MockTransport {
        bus_turn: bool,
        drains: bool,
        fifo_depth: usize,
        fifo: Vec<u32, 8>,
        sent: Vec<u32, 16>,
        notified: bool,
        notifications: usize,
        clears: usize,
        resets: usize,
        rx_words: Deque<u32, 32>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                bus_turn: true,
                drains: true,
                fifo_depth: 4,
                fifo: Vec::new(),
                sent: Vec::new(),
                notified: false,
                notifications: 0,
                clears: 0,
                resets: 0,
                rx_words: Deque::new(),
            }
        }
    }

    impl BitTransport for MockTransport {
        fn start(&mut self) {}

        fn stop(&mut self) {}

        fn reset(&mut self) {
            self.resets += 1;
            self.fifo.clear();
            self.notified = false;
        }

        fn force_start_notification(&mut self) {
            self.notifications += 1;
            self.notified = true;
            for &word in self.fifo.iter() {
                let _ = self.sent.push(word);
            }
            self.fifo.clear();
            if self.drains {
                self.bus_turn = true;
            }
        }

        fn program_counter(&self) -> u8 {
            7
        }

        fn interrupt_flag(&self, index: u8) -> bool {
            index == BUS_TURN_IRQ && self.bus_turn
        }

        fn clear_interrupt_flag(&mut self, index: u8) {
            if index == BUS_TURN_IRQ {
                self.clears += 1;
                self.bus_turn = false;
                self.notified = false;
            }
        }

        fn try_push(&mut self, word: u32) -> bool {
            if self.notified {
                return self.sent.push(word).is_ok();
            }
            if self.fifo.len() >= self.fifo_depth {
                return false;
            }
            self.fifo.push(word).is_ok()
        }

        fn try_pull(&mut self) -> Option<u32> {
            self.rx_words.pop_front()
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Completion {
        Done,
        Error,
        Never,
    }

    #[derive(Default)]
    struct ChannelProbe {
        starts: Cell<usize>,
        aborts: Cell<usize>,
    }

    /// Engine channel that completes synchronously as configured
    struct MockChannel<'a> {
        direction: Direction,
        signal: &'a CompletionSignal,
        probe: &'a ChannelProbe,
        completion: Completion,
        tx_words: Vec<u32, 16>,
        rx_words: Vec<u32, 32>,
    }

    impl<'a> MockChannel<'a> {
        fn new(direction: Direction, signal: &'a CompletionSignal, probe: &'a ChannelProbe) -> Self {
            Self {
                direction,
                signal,
                probe,
                completion: Completion::Done,
                tx_words: Vec::new(),
                rx_words: Vec::new(),
            }
        }

        fn report(&self) {
            match self.completion {
                Completion::Done => self.signal.mark_done(),
                Completion::Error => self.signal.mark_error(),
                Completion::Never => {}
            }
        }
    }

    impl BulkChannel for MockChannel<'_> {
        fn id(&self) -> u8 {
            match self.direction {
                Direction::Tx => 2,
                Direction::Rx => 3,
            }
        }

        fn direction(&self) -> Direction {
            self.direction
        }

        fn max_words(&self) -> usize {
            16
        }

        fn start_tx(&mut self, words: &[u32]) {
            self.probe.starts.set(self.probe.starts.get() + 1);
            self.tx_words.clear();
            let _ = self.tx_words.extend_from_slice(words);
            self.report();
        }

        fn start_rx(&mut self, words: &mut [u32]) {
            self.probe.starts.set(self.probe.starts.get() + 1);
            for (slot, &word) in words.iter_mut().zip(self.rx_words.iter()) {
                *slot = word;
            }
            self.report();
        }

        fn abort(&mut self) {
            self.probe.aborts.set(self.probe.aborts.get() + 1);
        }
    }

    /// Delay that returns at once, or never when stalled
    #[derive(Default)]
    struct MockDelay {
        elapsed_ns: u64,
        stall: bool,
    }

    impl DelayNs for MockDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.elapsed_ns += u64::from(ns);
            if self.stall {
                core::future::pending::<()>().await;
            }
        }
    }

    type TestTransceiver<'a> =
        Transceiver<'a, MockTransport, MockChannel<'a>, MockTransport, MockChannel<'a>, MockDelay>;

    struct Fixture {
        completions: Completions,
        tx_probe: ChannelProbe,
        rx_probe: ChannelProbe,
        buffers: TransferBuffers,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                completions: Completions::new(),
                tx_probe: ChannelProbe::default(),
                rx_probe: ChannelProbe::default(),
                buffers: TransferBuffers::new(),
            }
        }

        fn transceiver(&mut self, config: TransceiverConfig) -> TestTransceiver<'_> {
            let tx = Port::new(
                MockTransport::new(),
                MockChannel::new(Direction::Tx, &self.completions.tx, &self.tx_probe),
                &self.completions.tx,
            );
            let rx = Port::new(
                MockTransport::new(),
                MockChannel::new(Direction::Rx, &self.completions.rx, &self.rx_probe),
                &self.completions.rx,
            );
            Transceiver::new(tx, rx, MockDelay::default(), config, &mut self.buffers)
        }
    }

    fn fifo_config() -> TransceiverConfig {
        TransceiverConfig {
            mode: TransferMode::Fifo,
            ..Default::default()
        }
    }

    #[test]
    fn test_send_single_byte() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        block_on(xcvr.send(&[0xA5], 1_000)).unwrap();

        assert_eq!(xcvr.tx.channel.tx_words.as_slice(), &[7, 0xA500_0000]);
        assert_eq!(xcvr.tx.transport.notifications, 1);
        assert_eq!(xcvr.tx.transport.clears, 1);
        assert_eq!(xcvr.tx_state(), TxState::Idle);
        assert_eq!(xcvr.tx.signal.status(), CompletionStatus::NotStarted);
    }

    #[test]
    fn test_send_full_word() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        block_on(xcvr.send(&[0x12, 0x34, 0x56, 0x78], 1_000)).unwrap();
        assert_eq!(xcvr.tx.channel.tx_words.as_slice(), &[31, 0x1234_5678]);
    }

    #[test]
    fn test_send_empty_is_noop() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        assert_eq!(block_on(xcvr.send(&[], 1_000)), Ok(()));
        assert_eq!(xcvr.tx.transport.notifications, 0);
        assert_eq!(xcvr.tx.transport.clears, 0);
        assert_eq!(xcvr.tx.channel.probe.starts.get(), 0);
    }

    #[test]
    fn test_send_too_long_touches_nothing() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        let frame = [0u8; 17];
        assert_eq!(block_on(xcvr.send(&frame, 1_000)), Err(TxError::FrameTooLong));
        assert_eq!(xcvr.tx.channel.probe.starts.get(), 0);
        assert_eq!(xcvr.tx.transport.clears, 0);
        assert_eq!(xcvr.tx.transport.notifications, 0);
        assert_eq!(xcvr.tx.signal.status(), CompletionStatus::NotStarted);
    }

    #[test]
    fn test_send_refuses_second_arm() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        // A transmit whose completion was never consumed
        xcvr.tx.signal.arm();
        assert_eq!(block_on(xcvr.send(&[0x01], 1_000)), Err(TxError::Busy));
        assert_eq!(xcvr.tx.channel.probe.starts.get(), 0);
        assert!(xcvr.tx.signal.is_pending());
    }

    #[test]
    fn test_send_bus_turn_timeout() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.tx.transport.bus_turn = false;

        assert_eq!(block_on(xcvr.send(&[0x01], 1_000)), Err(TxError::TimedOut));
        assert_eq!(xcvr.tx.channel.probe.starts.get(), 0);
        assert_eq!(xcvr.tx.transport.resets, 1);
        assert!(xcvr.delay.elapsed_ns >= 2_000_000);
    }

    #[test]
    fn test_send_timeout_aborts_and_recovers() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.tx.channel.completion = Completion::Never;

        assert_eq!(block_on(xcvr.send(&[0x01], 1_000)), Err(TxError::TimedOut));
        assert_eq!(xcvr.tx.channel.probe.aborts.get(), 1);
        assert_eq!(xcvr.tx.transport.resets, 1);
        assert_eq!(xcvr.tx_state(), TxState::Idle);
        assert_eq!(xcvr.tx.signal.status(), CompletionStatus::NotStarted);

        xcvr.tx.channel.completion = Completion::Done;
        assert_eq!(block_on(xcvr.send(&[0x02], 1_000)), Ok(()));
    }

    #[test]
    fn test_send_engine_fault() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.tx.channel.completion = Completion::Error;

        let err = block_on(xcvr.send(&[0x01], 1_000)).unwrap_err();
        assert_eq!(err, TxError::HardwareFault);
        assert!(err.is_retryable());
        assert_eq!(xcvr.tx.transport.resets, 1);
    }

    #[test]
    fn test_receive_all_ones() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        let _ = xcvr.rx.channel.rx_words.push(0b111_111_111_111_111_111_111_111);

        let frame = block_on(xcvr.receive(1, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0xFF]);
        // Bit count published to the receive program
        assert_eq!(xcvr.rx.transport.fifo.as_slice(), &[7]);
        assert_eq!(xcvr.rx_state(), RxState::Idle);
    }

    #[test]
    fn test_receive_repairs_single_glitches() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        let mut noisy = oversample(0xA5);
        for i in 0..8 {
            noisy ^= 1 << (23 - 3 * i - (i % 3));
        }
        let _ = xcvr.rx.channel.rx_words.push(noisy);

        let frame = block_on(xcvr.receive(1, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0xA5]);
    }

    #[test]
    fn test_receive_timeout_then_recovers() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.rx.channel.completion = Completion::Never;

        assert_eq!(block_on(xcvr.receive(4, 1_000)), Err(RxError::TimedOut));
        assert_eq!(xcvr.rx.channel.probe.aborts.get(), 1);
        assert_eq!(xcvr.rx.transport.resets, 1);
        assert_eq!(xcvr.rx_state(), RxState::Idle);

        xcvr.rx.channel.completion = Completion::Done;
        for byte in [0x01, 0x02, 0x03, 0x04] {
            let _ = xcvr.rx.channel.rx_words.push(oversample(byte));
        }
        let frame = block_on(xcvr.receive(4, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_receive_rejects_long_frame() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        assert_eq!(block_on(xcvr.receive(17, 1_000)), Err(RxError::FrameTooLong));
        assert_eq!(xcvr.rx.channel.probe.starts.get(), 0);
        assert!(xcvr.rx.transport.fifo.is_empty());
    }

    #[test]
    fn test_arm_twice_is_busy() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.rx.channel.completion = Completion::Never;

        block_on(xcvr.arm_receive(2)).unwrap();
        assert_eq!(xcvr.rx_state(), RxState::ReceiveArmed);
        assert_eq!(block_on(xcvr.arm_receive(2)), Err(RxError::Busy));
        assert_eq!(xcvr.rx.channel.probe.starts.get(), 1);

        xcvr.cancel_receive();
        assert_eq!(xcvr.rx.channel.probe.aborts.get(), 1);
        assert_eq!(xcvr.rx.signal.status(), CompletionStatus::NotStarted);
        assert_eq!(xcvr.rx_state(), RxState::Idle);
    }

    #[test]
    fn test_finish_without_arm() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        assert_eq!(block_on(xcvr.finish_receive(1_000)), Err(RxError::NotArmed));
    }

    #[test]
    fn test_receive_zero_length() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        let frame = block_on(xcvr.receive(0, 1_000)).unwrap();
        assert!(frame.is_empty());
        assert_eq!(xcvr.rx.channel.probe.starts.get(), 0);
    }

    #[test]
    fn test_exchange_loopback() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        let request = [0x12, 0x34, 0x56];
        for &byte in &request {
            let _ = xcvr.rx.channel.rx_words.push(oversample(byte));
        }

        let response = block_on(xcvr.exchange(&request, request.len(), 1_000)).unwrap();
        assert_eq!(response.as_bytes(), &request);
        assert_eq!(xcvr.tx.channel.tx_words.as_slice(), &[23, 0x1234_5600]);
    }

    #[test]
    fn test_exchange_cancels_receive_when_send_fails() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.tx.channel.completion = Completion::Never;
        xcvr.rx.channel.completion = Completion::Never;

        let result = block_on(xcvr.exchange(&[0x01], 1, 1_000));
        assert_eq!(result, Err(ExchangeError::Tx(TxError::TimedOut)));
        assert_eq!(xcvr.rx.channel.probe.aborts.get(), 1);
        assert_eq!(xcvr.rx_state(), RxState::Idle);
        assert_eq!(block_on(xcvr.finish_receive(1_000)), Err(RxError::NotArmed));
    }

    #[test]
    fn test_exchange_too_long_arms_nothing() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());

        let result = block_on(xcvr.exchange(&[0u8; 17], 1, 1_000));
        assert_eq!(result, Err(ExchangeError::Tx(TxError::FrameTooLong)));
        assert_eq!(xcvr.rx.channel.probe.starts.get(), 0);
    }

    #[test]
    fn test_dropped_receive_is_aborted() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig::default());
        xcvr.rx.channel.completion = Completion::Never;
        xcvr.delay.stall = true;

        // The ready future wins; the receive is dropped mid-wait
        let outcome = block_on(select(xcvr.receive(2, 1_000), core::future::ready(())));
        assert!(matches!(outcome, Either::Second(())));

        assert_eq!(xcvr.rx.channel.probe.aborts.get(), 1);
        assert_eq!(xcvr.rx.signal.status(), CompletionStatus::NotStarted);
        assert_eq!(xcvr.rx_state(), RxState::Idle);
    }

    #[test]
    fn test_dropped_fifo_send_is_reset() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());
        // Program not draining: nothing beyond the FIFO is accepted
        while xcvr.tx.transport.sent.push(0).is_ok() {}
        xcvr.delay.stall = true;

        let outcome = block_on(select(xcvr.send(&[0x5A; 32], 1_000), core::future::ready(())));
        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(xcvr.tx_state(), TxState::Idle);
        assert_eq!(xcvr.tx.transport.resets, 1);

        xcvr.tx.transport.sent.clear();
        xcvr.delay.stall = false;
        assert_eq!(block_on(xcvr.send(&[0x5A; 32], 1_000)), Ok(()));
        assert_eq!(xcvr.tx.transport.sent.len(), 9);
    }

    #[test]
    fn test_dropped_fifo_receive_is_reset() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());
        xcvr.delay.stall = true;

        block_on(xcvr.arm_receive(2)).unwrap();
        let outcome = block_on(select(xcvr.finish_receive(1_000), core::future::ready(())));
        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(xcvr.rx_state(), RxState::Idle);
        assert_eq!(xcvr.rx.transport.resets, 1);
        // The stale bit count went with the reset
        assert!(xcvr.rx.transport.fifo.is_empty());

        xcvr.delay.stall = false;
        for byte in [0x0F, 0xF0, 0x3C] {
            let _ = xcvr.rx.transport.rx_words.push_back(oversample(byte));
        }
        let frame = block_on(xcvr.receive(3, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0x0F, 0xF0, 0x3C]);
        assert_eq!(xcvr.rx.transport.fifo.as_slice(), &[23]);
    }

    #[test]
    fn test_receive_two_bytes_per_word() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(TransceiverConfig {
            rx_packing: RxPacking::TwoBytesPerWord,
            ..Default::default()
        });
        let _ = xcvr.rx.channel.rx_words.push(0xFFFF_FFFF);
        let _ = xcvr.rx.channel.rx_words.push(0x0000_0000);
        // Only two words belong to a 3-byte frame
        let _ = xcvr.rx.channel.rx_words.push(0xFFFF_FFFF);

        let frame = block_on(xcvr.receive(3, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0xFF, 0xFF, 0x00]);
        assert_eq!(xcvr.rx.transport.fifo.as_slice(), &[23]);
    }

    #[test]
    fn test_drop_aborts_both_channels() {
        let mut fixture = Fixture::new();
        {
            let mut xcvr = fixture.transceiver(TransceiverConfig::default());
            xcvr.rx.channel.completion = Completion::Never;
            block_on(xcvr.arm_receive(1)).unwrap();
        }
        assert_eq!(fixture.tx_probe.aborts.get(), 1);
        assert_eq!(fixture.rx_probe.aborts.get(), 1);
        assert_eq!(fixture.completions.rx.status(), CompletionStatus::NotStarted);
    }

    #[test]
    fn test_fifo_send_large_frame() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());

        let frame = [0x5Au8; 32];
        block_on(xcvr.send(&frame, 1_000)).unwrap();

        let sent = &xcvr.tx.transport.sent;
        assert_eq!(sent.len(), 9);
        assert_eq!(sent[0], 255);
        assert!(sent[1..].iter().all(|&w| w == 0x5A5A_5A5A));
        assert_eq!(xcvr.tx.transport.notifications, 1);
        // No engine involvement in FIFO mode
        assert_eq!(xcvr.tx.channel.probe.starts.get(), 0);
    }

    #[test]
    fn test_fifo_send_short_frame_notifies_after_queueing() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());

        block_on(xcvr.send(&[0xA5], 1_000)).unwrap();
        assert_eq!(xcvr.tx.transport.sent.as_slice(), &[7, 0xA500_0000]);
    }

    #[test]
    fn test_fifo_receive() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());
        for byte in [0xDE, 0xAD, 0xBE] {
            let _ = xcvr.rx.transport.rx_words.push_back(oversample(byte));
        }

        let frame = block_on(xcvr.receive(3, 1_000)).unwrap();
        assert_eq!(frame.as_bytes(), &[0xDE, 0xAD, 0xBE]);
        assert_eq!(xcvr.rx.channel.probe.starts.get(), 0);
    }

    #[test]
    fn test_fifo_receive_timeout() {
        let mut fixture = Fixture::new();
        let mut xcvr = fixture.transceiver(fifo_config());
        let _ = xcvr.rx.transport.rx_words.push_back(oversample(0x11));

        assert_eq!(block_on(xcvr.receive(2, 100)), Err(RxError::TimedOut));
        assert_eq!(xcvr.rx.transport.resets, 1);
        assert_eq!(xcvr.rx_state(), RxState::Idle);
    }

    #[test]
    fn test_diagnostics() {
        let mut fixture = Fixture::new();
        let xcvr = fixture.transceiver(TransceiverConfig::default());

        let diag = xcvr.diagnostics();
        assert_eq!(diag.tx_pc, 7);
        assert_eq!(diag.tx_state, TxState::Idle);
        assert_eq!(diag.rx_completion, CompletionStatus::NotStarted);
    }
}
