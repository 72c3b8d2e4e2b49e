//! Transmit path: keystrokes in, covert segments out
//!
//! Each released printable key becomes exactly one covert packet, sent before the
//! next event is read. There is no batching, retry, or acknowledgement.

use crate::cipher::{self, Symbol};
use crate::error::TransportError;
use crate::frame::CovertPacket;
use crate::session::{Session, StopToken};
use rand::Rng;
use rand::rngs::ThreadRng;
use tracing::{debug, info, warn};

/// Key identity as reported by a keyboard source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    /// Ends the session
    Escape,
    /// Any key without a character (Enter, arrows, function keys, ...)
    Special(String),
}

/// Keyboard event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed(KeyCode),
    Released(KeyCode),
}

/// Outbound side of the raw packet facility
pub trait PacketSink {
    fn send(&mut self, packet: &CovertPacket) -> Result<(), TransportError>;
}

/// Why a transmit session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitEnd {
    Escape,
    Stopped,
    SourceExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitSummary {
    pub sent: usize,
    pub skipped: usize,
    pub end: TransmitEnd,
}

pub struct TransmitPath<S, R = ThreadRng> {
    session: Session,
    sink: S,
    rng: R,
    stop: StopToken,
}

impl<S: PacketSink> TransmitPath<S, ThreadRng> {
    pub fn new(session: Session, sink: S, stop: StopToken) -> Self {
        Self::with_rng(session, sink, stop, rand::thread_rng())
    }
}

impl<S: PacketSink, R: Rng> TransmitPath<S, R> {
    /// Create a path with an explicit source for the auxiliary port value
    pub fn with_rng(session: Session, sink: S, stop: StopToken, rng: R) -> Self {
        Self {
            session,
            sink,
            rng,
            stop,
        }
    }

    /// Consume key events until escape, cancellation, or the end of the source
    ///
    /// # Returns
    /// * `Ok(TransmitSummary)` - Session ended normally
    /// * `Err(TransportError)` - Keyboard or send failure; nothing is retried
    pub fn run<I>(&mut self, events: I) -> Result<TransmitSummary, TransportError>
    where
        I: IntoIterator<Item = Result<KeyEvent, TransportError>>,
    {
        let mut sent = 0;
        let mut skipped = 0;

        info!(host = %self.session.host, "Transmit path started (Esc to stop)");

        for event in events {
            if self.stop.is_cancelled() {
                break;
            }

            match event? {
                KeyEvent::Pressed(code) => {
                    debug!("Before encryption: {:?}", code);
                }
                KeyEvent::Released(KeyCode::Escape) => {
                    info!("Escape released, ending transmit session");
                    return Ok(TransmitSummary {
                        sent,
                        skipped,
                        end: TransmitEnd::Escape,
                    });
                }
                KeyEvent::Released(KeyCode::Char(c)) if is_printable(c) => {
                    match self.send_char(c) {
                        Ok(true) => sent += 1,
                        Ok(false) => skipped += 1,
                        Err(e) => return Err(e),
                    }
                }
                KeyEvent::Released(code) => {
                    debug!("Special key {:?} released, nothing sent", code);
                    skipped += 1;
                }
            }
        }

        let end = if self.stop.is_cancelled() {
            TransmitEnd::Stopped
        } else {
            TransmitEnd::SourceExhausted
        };
        info!(sent, skipped, "Transmit path finished ({:?})", end);
        Ok(TransmitSummary { sent, skipped, end })
    }

    /// Encrypt one character and send it as a single covert packet
    ///
    /// Returns `Ok(false)` when the character is outside the symbol domain and
    /// was skipped.
    pub fn send_char(&mut self, c: char) -> Result<bool, TransportError> {
        let symbol = match Symbol::try_from(c) {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!("Cannot encode {:?}: {}", c, e);
                return Ok(false);
            }
        };

        let encrypted = cipher::encrypt(symbol, self.session.key);
        let aux: u16 = self.rng.gen_range(0..=u16::MAX);
        let packet = CovertPacket::encode(encrypted, self.session.host, aux);

        self.sink.send(&packet)?;
        info!("Sent {:?} as {} (port {})", c, encrypted, packet.source_port);
        Ok(true)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn is_printable(c: char) -> bool {
    c == ' ' || c.is_ascii_graphic() || !c.is_ascii()
}
