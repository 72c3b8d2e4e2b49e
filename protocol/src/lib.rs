//! Keyhole Protocol Library
//!
//! Covert keystroke channel carried in TCP header fields. One encrypted symbol
//! rides in the source port of one segment, and the ECE flag marks the segment as
//! covert. This crate holds the cipher, the frame codec, and the transmit and
//! receive paths; raw sockets, keyboards and log files plug in through the
//! [`transmit::PacketSink`], [`receive::DecodeLog`] and iterator seams.

pub mod cipher;
pub mod constants;
pub mod error;
pub mod frame;
pub mod receive;
pub mod session;
pub mod transmit;

pub use cipher::{Key, Symbol};
pub use error::{CipherError, FrameError, SessionError, TransportError};
pub use session::{Session, StopToken};
