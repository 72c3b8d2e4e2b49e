//! Protocol error types

use std::io;
use thiserror::Error;

/// Cipher errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Value {0:#x} is outside the 7-bit symbol domain")]
    OutOfDomain(u32),

    #[error("Key {0} is outside the allowed range 0..=25")]
    InvalidKey(u8),
}

/// Frame codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("{layer} header truncated: expected at least {expected} bytes, got {actual}")]
    Truncated {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Marked segment carries out-of-range symbol {0}")]
    SymbolOutOfRange(u16),
}

/// Operator input errors (recoverable, the caller reprompts)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("IP address is invalid: {0:?}")]
    InvalidHost(String),

    #[error("Key value is invalid: {0:?} (expected an integer from 0 to 25)")]
    InvalidKey(String),
}

/// Transport errors (fatal to the path that hit them)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to send covert packet: {0}")]
    Send(#[source] io::Error),

    #[error("Packet capture failed: {0}")]
    Capture(#[source] io::Error),

    #[error("Keyboard input failed: {0}")]
    Keyboard(#[source] io::Error),

    #[error("Failed to write log entry: {0}")]
    Log(#[source] io::Error),
}
