//! Completion signal shared with interrupt context
//!
//! One cell per direction. The completion interrupt is the only writer of
//! `Done`/`Error`; the transceiver is the only writer of `NotStarted`/
//! `Pending` and the only reader. With exactly one writer per transition a
//! plain atomic load/store handoff is sufficient, no lock is shared with
//! the interrupt.
//!
//! ```text
//!            arm()              mark_done()/mark_error()
//! NotStarted ─────▶ Pending ──────────────────────────▶ Done | Error
//!     ▲                │                                    │
//!     │   disarm()     │         take_if_finished()         │
//!     └────────────────┴────────────────────────────────────┘
//! ```

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;
use joywire_hal::Direction;
use portable_atomic::{AtomicU8, Ordering};

/// Observable state of one transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CompletionStatus {
    /// Nothing armed
    NotStarted = 0,
    /// Transfer armed, completion not yet reported
    Pending = 1,
    /// Completion interrupt reported success
    Done = 2,
    /// Completion interrupt reported an engine error
    Error = 3,
}

impl CompletionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CompletionStatus::Pending,
            2 => CompletionStatus::Done,
            3 => CompletionStatus::Error,
            _ => CompletionStatus::NotStarted,
        }
    }

    /// Whether the transfer reached a final state
    pub fn is_finished(self) -> bool {
        matches!(self, CompletionStatus::Done | CompletionStatus::Error)
    }
}

/// Single-writer/single-reader completion cell
pub struct CompletionSignal {
    state: AtomicU8,
    waker: AtomicWaker,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Create an idle signal
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(CompletionStatus::NotStarted as u8),
            waker: AtomicWaker::new(),
        }
    }

    /// Current state without consuming it
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a transfer is armed and not yet reported
    pub fn is_pending(&self) -> bool {
        self.status() == CompletionStatus::Pending
    }

    /// Report a successful transfer (interrupt context only)
    pub fn mark_done(&self) {
        self.state
            .store(CompletionStatus::Done as u8, Ordering::Release);
        self.waker.wake();
    }

    /// Report a failed transfer (interrupt context only)
    pub fn mark_error(&self) {
        self.state
            .store(CompletionStatus::Error as u8, Ordering::Release);
        self.waker.wake();
    }

    /// Mark a transfer as armed (transceiver only, before starting the engine)
    pub(crate) fn arm(&self) {
        self.state
            .store(CompletionStatus::Pending as u8, Ordering::Release);
    }

    /// Forget an aborted transfer (transceiver only, after the engine abort)
    pub(crate) fn disarm(&self) {
        self.state
            .store(CompletionStatus::NotStarted as u8, Ordering::Release);
    }

    /// Consume a final state
    ///
    /// `Done` and `Error` are returned once and reset the cell to
    /// `NotStarted`; `Pending` and `NotStarted` are returned as-is.
    pub fn take_if_finished(&self) -> CompletionStatus {
        let status = self.status();
        if status.is_finished() {
            self.disarm();
        }
        status
    }

    /// Wait until the armed transfer reports, consuming the result
    ///
    /// Resolves to `Done` or `Error`. Must only be awaited while a transfer
    /// is armed; callers bound it with a timeout.
    pub async fn wait(&self) -> CompletionStatus {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            match self.take_if_finished() {
                status if status.is_finished() => Poll::Ready(status),
                _ => Poll::Pending,
            }
        })
        .await
    }
}

/// The pair of completion signals, one per direction
pub struct Completions {
    /// Transmit (memory to FIFO) completion
    pub tx: CompletionSignal,
    /// Receive (FIFO to memory) completion
    pub rx: CompletionSignal,
}

impl Default for Completions {
    fn default() -> Self {
        Self::new()
    }
}

impl Completions {
    /// Create both signals idle
    pub const fn new() -> Self {
        Self {
            tx: CompletionSignal::new(),
            rx: CompletionSignal::new(),
        }
    }

    /// Signal for one direction
    pub fn get(&self, direction: Direction) -> &CompletionSignal {
        match direction {
            Direction::Tx => &self.tx,
            Direction::Rx => &self.rx,
        }
    }
}
