//! Transceiver error taxonomy
//!
//! Every failure is returned to the caller. The only silent failure class
//! is a byte that majority voting could not repair (two or more bad
//! samples in one bit), which surfaces as a wrong but well-defined byte.

use crate::codec::CodecError;

/// Errors returned by `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// Frame longer than the active mode allows; nothing was touched
    FrameTooLong,
    /// No completion (or no bus turn) within the deadline; hardware is idle again
    TimedOut,
    /// The bulk-transfer engine reported an error completion
    HardwareFault,
    /// A previous transmit on this direction is still pending
    Busy,
}

/// Errors returned by `receive` and its split halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// Expected length longer than the active mode allows; nothing was touched
    FrameTooLong,
    /// No completion within the deadline; hardware is idle again
    TimedOut,
    /// The bulk-transfer engine reported an error completion
    HardwareFault,
    /// A previous receive on this direction is still armed
    Busy,
    /// `finish_receive` called without a matching `arm_receive`
    NotArmed,
}

/// Errors returned by `exchange` (request then response)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExchangeError {
    /// The request could not be sent
    Tx(TxError),
    /// The response could not be received
    Rx(RxError),
}

impl TxError {
    /// Whether retrying the same transfer can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::TimedOut | TxError::HardwareFault)
    }
}

impl RxError {
    /// Whether retrying the same transfer can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RxError::TimedOut | RxError::HardwareFault)
    }
}

impl From<CodecError> for TxError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::FrameTooLong => TxError::FrameTooLong,
        }
    }
}

impl From<CodecError> for RxError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::FrameTooLong => RxError::FrameTooLong,
        }
    }
}

impl From<TxError> for ExchangeError {
    fn from(e: TxError) -> Self {
        ExchangeError::Tx(e)
    }
}

impl From<RxError> for ExchangeError {
    fn from(e: RxError) -> Self {
        ExchangeError::Rx(e)
    }
}
