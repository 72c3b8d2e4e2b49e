//! Receive path: captured datagrams in, decrypted log entries out

use crate::cipher::{self, Key, Symbol};
use crate::constants::LOG_SEPARATOR;
use crate::error::TransportError;
use crate::frame::{self, Decoded, MarkerMatch};
use crate::session::StopToken;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One item from a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// Raw IPv4 datagram
    Packet(Vec<u8>),
    /// The source woke up without traffic
    Idle,
}

/// Destination for decoded entries
pub trait DecodeLog {
    /// Persist one flushed entry: the raw encrypted text and its decryption
    fn record(&mut self, encrypted: &str, decrypted: &str) -> Result<(), TransportError>;
}

/// How covert symbols are grouped into log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Every covert packet is its own entry
    #[default]
    PerSymbol,
    /// Entries hold up to `max_symbols`, and a partial group is written once no
    /// covert packet has arrived for `idle_timeout`
    Grouped {
        max_symbols: usize,
        idle_timeout: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveOptions {
    pub marker: MarkerMatch,
    pub framing: Framing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveSummary {
    pub captured: u64,
    pub covert: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub flushed: u64,
}

pub struct ReceivePath<L> {
    key: Key,
    log: L,
    options: ReceiveOptions,
    stop: StopToken,
    buffer: Vec<Symbol>,
    last_symbol_at: Option<Instant>,
    summary: ReceiveSummary,
}

impl<L: DecodeLog> ReceivePath<L> {
    pub fn new(key: Key, log: L, options: ReceiveOptions, stop: StopToken) -> Self {
        Self {
            key,
            log,
            options,
            stop,
            buffer: Vec::new(),
            last_symbol_at: None,
            summary: ReceiveSummary::default(),
        }
    }

    /// Process captures until the source ends or the stop token fires
    ///
    /// Irrelevant and malformed packets are skipped. Anything still buffered is
    /// flushed before returning, including when the capture source fails.
    ///
    /// # Returns
    /// * `Ok(ReceiveSummary)` - Counters for the session
    /// * `Err(TransportError)` - Capture or log failure
    pub fn run<I>(&mut self, captures: I) -> Result<ReceiveSummary, TransportError>
    where
        I: IntoIterator<Item = Result<Capture, TransportError>>,
    {
        info!("Receive path started, waiting for covert packets");

        for capture in captures {
            if self.stop.is_cancelled() {
                break;
            }

            let capture = match capture {
                Ok(capture) => capture,
                Err(e) => {
                    self.flush()?;
                    return Err(e);
                }
            };

            match capture {
                Capture::Packet(datagram) => {
                    self.handle_packet(&datagram)?;
                }
                Capture::Idle => self.flush_if_idle()?,
            }
        }

        self.flush()?;
        info!(
            captured = self.summary.captured,
            covert = self.summary.covert,
            "Receive path finished"
        );
        Ok(self.summary)
    }

    /// Inspect one captured datagram
    ///
    /// Returns the encrypted symbol when the datagram was covert.
    pub fn handle_packet(&mut self, datagram: &[u8]) -> Result<Option<Symbol>, TransportError> {
        self.summary.captured += 1;
        self.flush_if_idle()?;

        let symbol = match frame::decode(datagram, self.options.marker) {
            Ok(Decoded::Covert(symbol)) => symbol,
            Ok(Decoded::NotTcp | Decoded::Unmarked) => {
                self.summary.ignored += 1;
                return Ok(None);
            }
            Err(e) => {
                debug!("Skipping malformed packet: {}", e);
                self.summary.malformed += 1;
                return Ok(None);
            }
        };

        self.summary.covert += 1;
        self.buffer.push(symbol);
        self.last_symbol_at = Some(Instant::now());
        debug!("Covert symbol {} buffered ({} pending)", symbol, self.buffer.len());

        match self.options.framing {
            Framing::PerSymbol => self.flush()?,
            Framing::Grouped { max_symbols, .. } => {
                if self.buffer.len() >= max_symbols.max(1) {
                    self.flush()?;
                }
            }
        }

        Ok(Some(symbol))
    }

    /// Write out a partial group whose idle timeout has elapsed
    pub fn flush_if_idle(&mut self) -> Result<(), TransportError> {
        let Framing::Grouped { idle_timeout, .. } = self.options.framing else {
            return Ok(());
        };

        match self.last_symbol_at {
            Some(at) if at.elapsed() >= idle_timeout => self.flush(),
            _ => Ok(()),
        }
    }

    /// Decrypt and record everything buffered, then clear the buffer
    pub fn flush(&mut self) -> Result<(), TransportError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let encrypted: String = self.buffer.iter().map(|s| s.as_char()).collect();
        let decrypted: String = self
            .buffer
            .iter()
            .map(|s| cipher::decrypt(*s, self.key).as_char())
            .collect();

        self.log.record(&encrypted, &decrypted)?;
        debug!("Decoded {:?}", decrypted);

        self.buffer.clear();
        self.last_symbol_at = None;
        self.summary.flushed += 1;
        Ok(())
    }

    pub fn buffered(&self) -> &[Symbol] {
        &self.buffer
    }

    pub fn summary(&self) -> ReceiveSummary {
        self.summary
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}

/// Format one entry the way the append-only logs store it
pub fn log_entry(text: &str) -> String {
    let mut entry = String::with_capacity(text.len() + 1);
    entry.push_str(text);
    entry.push(LOG_SEPARATOR);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CovertPacket, TcpFlags};
    use crate::session::Session;
    use crate::transmit::{KeyCode, KeyEvent, PacketSink, TransmitPath};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io;
    use std::net::Ipv4Addr;

    const SENDER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 1);
    const RECEIVER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 2);

    #[derive(Default)]
    struct MemoryLog {
        encrypted: String,
        decrypted: String,
    }

    impl DecodeLog for MemoryLog {
        fn record(&mut self, encrypted: &str, decrypted: &str) -> Result<(), TransportError> {
            self.encrypted.push_str(&log_entry(encrypted));
            self.decrypted.push_str(&log_entry(decrypted));
            Ok(())
        }
    }

    struct BrokenLog;

    impl DecodeLog for BrokenLog {
        fn record(&mut self, _: &str, _: &str) -> Result<(), TransportError> {
            Err(TransportError::Log(io::Error::from(io::ErrorKind::WriteZero)))
        }
    }

    fn key(value: u8) -> Key {
        Key::new(value).unwrap()
    }

    fn covert(value: u8) -> Capture {
        let symbol = Symbol::new(value).unwrap();
        Capture::Packet(CovertPacket::encode(symbol, RECEIVER, 80).to_datagram(SENDER))
    }

    fn with_flags(value: u16, flags: TcpFlags) -> Capture {
        let mut packet = CovertPacket::encode(Symbol::new(0).unwrap(), RECEIVER, 80);
        packet.source_port = value;
        packet.flags = flags;
        Capture::Packet(packet.to_datagram(SENDER))
    }

    fn receiver(k: u8, options: ReceiveOptions) -> ReceivePath<MemoryLog> {
        ReceivePath::new(key(k), MemoryLog::default(), options, StopToken::new())
    }

    #[test]
    fn test_decodes_abc_per_symbol() {
        let captures = [100, 101, 102].map(|v| Ok(covert(v)));
        let mut path = receiver(3, ReceiveOptions::default());
        let summary = path.run(captures).unwrap();

        assert_eq!(summary.covert, 3);
        assert_eq!(summary.flushed, 3);
        assert_eq!(path.log().encrypted, "d e f ");
        assert_eq!(path.log().decrypted, "a b c ");
    }

    #[test]
    fn test_irrelevant_traffic_leaves_no_trace() {
        let mut udp = datagram(100);
        udp[9] = 17;

        let captures = vec![
            Ok(Capture::Packet(udp)),
            Ok(with_flags(100, TcpFlags::ACK | TcpFlags::PSH)),
            Ok(with_flags(100, TcpFlags::SYN)),
            Ok(Capture::Packet(vec![0x45, 0x00])),
            Ok(Capture::Packet(Vec::new())),
            Ok(with_flags(8080, TcpFlags::ECE)),
            Ok(Capture::Idle),
        ];

        let mut path = receiver(3, ReceiveOptions::default());
        let summary = path.run(captures).unwrap();

        assert_eq!(summary.captured, 6);
        assert_eq!(summary.covert, 0);
        assert_eq!(summary.ignored, 3);
        assert_eq!(summary.malformed, 3);
        assert!(path.buffered().is_empty());
        assert!(path.log().encrypted.is_empty());
        assert!(path.log().decrypted.is_empty());
    }

    #[test]
    fn test_exact_marker_rejects_combined_flags() {
        let options = ReceiveOptions {
            marker: MarkerMatch::Exact,
            ..ReceiveOptions::default()
        };
        let captures = vec![Ok(with_flags(100, TcpFlags::ECE | TcpFlags::ACK)), Ok(covert(101))];

        let mut path = receiver(3, options);
        let summary = path.run(captures).unwrap();

        assert_eq!(summary.covert, 1);
        assert_eq!(path.log().decrypted, "b ");
    }

    #[test]
    fn test_grouped_flushes_on_size_and_end() {
        let options = ReceiveOptions {
            framing: Framing::Grouped {
                max_symbols: 3,
                idle_timeout: Duration::from_secs(3600),
            },
            ..ReceiveOptions::default()
        };
        let captures = "hello".bytes().map(|b| Ok(covert(b + 1)));

        let mut path = receiver(1, options);
        let summary = path.run(captures).unwrap();

        assert_eq!(summary.flushed, 2);
        assert_eq!(path.log().decrypted, "hel lo ");
    }

    #[test]
    fn test_grouped_waits_until_idle_timeout() {
        let patient = ReceiveOptions {
            framing: Framing::Grouped {
                max_symbols: 10,
                idle_timeout: Duration::from_secs(3600),
            },
            ..ReceiveOptions::default()
        };
        let mut path = receiver(0, patient);
        path.handle_packet(&datagram(b'o')).unwrap();
        path.handle_packet(&datagram(b'k')).unwrap();
        path.flush_if_idle().unwrap();
        assert_eq!(path.buffered().len(), 2);
        assert!(path.log().decrypted.is_empty());

        let eager = ReceiveOptions {
            framing: Framing::Grouped {
                max_symbols: 10,
                idle_timeout: Duration::ZERO,
            },
            ..ReceiveOptions::default()
        };
        let mut path = receiver(0, eager);
        let summary = path.run(vec![Ok(covert(b'x')), Ok(Capture::Idle)]).unwrap();
        assert_eq!(summary.flushed, 1);
        assert_eq!(path.log().decrypted, "x ");
    }

    #[test]
    fn test_stop_token_flushes_pending_group() {
        let stop = StopToken::new();
        let options = ReceiveOptions {
            framing: Framing::Grouped {
                max_symbols: 8,
                idle_timeout: Duration::from_secs(60),
            },
            ..ReceiveOptions::default()
        };
        let mut path = ReceivePath::new(key(2), MemoryLog::default(), options, stop.clone());

        let captures = [b'j', b'k', b'l'].into_iter().enumerate().map(|(i, b)| {
            if i == 2 {
                stop.cancel();
            }
            Ok(covert(b + 2))
        });
        let summary = path.run(captures).unwrap();

        assert_eq!(summary.covert, 2);
        assert_eq!(path.log().decrypted, "jk ");
    }

    #[test]
    fn test_log_failure_is_fatal() {
        let mut path =
            ReceivePath::new(key(3), BrokenLog, ReceiveOptions::default(), StopToken::new());
        let result = path.run(vec![Ok(covert(100))]);
        assert!(matches!(result, Err(TransportError::Log(_))));
    }

    #[test]
    fn test_capture_failure_is_fatal() {
        let mut path = receiver(3, ReceiveOptions::default());
        let captures = vec![
            Ok(covert(100)),
            Err(TransportError::Capture(io::Error::from(io::ErrorKind::PermissionDenied))),
        ];
        assert!(matches!(path.run(captures), Err(TransportError::Capture(_))));
        assert_eq!(path.log().decrypted, "a ");
    }

    #[test]
    fn test_capture_failure_flushes_pending_group() {
        let options = ReceiveOptions {
            framing: Framing::Grouped {
                max_symbols: 8,
                idle_timeout: Duration::from_secs(60),
            },
            ..ReceiveOptions::default()
        };
        let mut path = receiver(1, options);
        let captures = vec![
            Ok(covert(b'h' + 1)),
            Ok(covert(b'i' + 1)),
            Err(TransportError::Capture(io::Error::from(io::ErrorKind::ConnectionReset))),
        ];

        assert!(matches!(path.run(captures), Err(TransportError::Capture(_))));
        assert!(path.buffered().is_empty());
        assert_eq!(path.log().encrypted, "ij ");
        assert_eq!(path.log().decrypted, "hi ");
        assert_eq!(path.summary().flushed, 1);
    }

    #[test]
    fn test_transmit_to_receive_end_to_end() {
        struct Wire(Vec<Vec<u8>>);

        impl PacketSink for Wire {
            fn send(&mut self, packet: &CovertPacket) -> Result<(), TransportError> {
                self.0.push(packet.to_datagram(SENDER));
                Ok(())
            }
        }

        let session = Session::new(RECEIVER, key(25));
        let rng = StdRng::seed_from_u64(3);
        let mut sender = TransmitPath::with_rng(session, Wire(Vec::new()), StopToken::new(), rng);
        let keys = "Hi there~"
            .chars()
            .map(|c| Ok(KeyEvent::Released(KeyCode::Char(c))))
            .chain([Ok(KeyEvent::Released(KeyCode::Escape))]);
        sender.run(keys).unwrap();

        let wire = sender.into_sink().0;
        let mut path = receiver(25, ReceiveOptions::default());
        path.run(wire.into_iter().map(|d| Ok(Capture::Packet(d)))).unwrap();

        assert_eq!(path.log().decrypted, "H i   t h e r e ~ ");
    }

    fn datagram(value: u8) -> Vec<u8> {
        match covert(value) {
            Capture::Packet(bytes) => bytes,
            Capture::Idle => unreachable!(),
        }
    }
}
