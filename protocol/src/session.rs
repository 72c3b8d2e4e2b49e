//! Session parameters shared by both paths

use crate::cipher::Key;
use crate::constants::{DEFAULT_HOST, MAX_KEY};
use crate::error::SessionError;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Host and key for one covert session
///
/// The receiver only needs the key; the host is where the sender aims its packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub host: Ipv4Addr,
    pub key: Key,
}

impl Session {
    pub fn new(host: Ipv4Addr, key: Key) -> Self {
        Self { host, key }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::from_str(DEFAULT_HOST).unwrap_or(Ipv4Addr::LOCALHOST),
            key: Key::default(),
        }
    }
}

/// Validate a dotted-quad IPv4 literal
pub fn parse_host(input: &str) -> Result<Ipv4Addr, SessionError> {
    input
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| SessionError::InvalidHost(input.trim().to_string()))
}

/// Validate a key: an integer from 0 to 25
pub fn parse_key(input: &str) -> Result<Key, SessionError> {
    let trimmed = input.trim();
    let invalid = || SessionError::InvalidKey(trimmed.to_string());

    let value: i64 = trimmed.parse().map_err(|_| invalid())?;
    if !(0..=MAX_KEY as i64).contains(&value) {
        return Err(invalid());
    }
    Key::new(value as u8).map_err(|_| invalid())
}

impl FromStr for Key {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_key(s)
    }
}

/// Cooperative cancellation flag shared between a path and whoever drives it
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
