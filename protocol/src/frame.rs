//! Covert frame codec
//!
//! One encrypted symbol travels in one TCP segment:
//!
//! ```text
//! source port       encrypted symbol (0..=127)
//! destination port  arbitrary value, ignored by receivers
//! flags             ECE (0x40) marks the segment as covert
//! ```
//!
//! Everything else in the IPv4 and TCP headers is unconstrained. Receivers look at
//! the protocol number and the flags byte first, so ordinary traffic is discarded
//! without touching the ports.

use crate::cipher::Symbol;
use crate::constants::{
    DEFAULT_TTL, DEFAULT_WINDOW, IPPROTO_TCP, IPV4_HEADER_LEN, TCP_HEADER_LEN,
};
use crate::error::FrameError;
use bitflags::bitflags;
use std::net::Ipv4Addr;

bitflags! {
    /// TCP header flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
        /// ECN-Echo, repurposed as the covert marker
        const ECE = 0x40;
        const CWR = 0x80;
    }
}

/// Flag that marks a segment as carrying a covert symbol
pub const COVERT_MARKER: TcpFlags = TcpFlags::ECE;

/// How strictly a receiver matches the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerMatch {
    /// The marker bit is set, other flags are ignored
    #[default]
    Bit,
    /// The flags byte is exactly the marker
    Exact,
}

impl MarkerMatch {
    pub fn matches(self, flags: TcpFlags) -> bool {
        match self {
            MarkerMatch::Bit => flags.contains(COVERT_MARKER),
            MarkerMatch::Exact => flags == COVERT_MARKER,
        }
    }
}

/// Header values for one covert segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovertPacket {
    pub destination: Ipv4Addr,
    /// Carries the encrypted symbol
    pub source_port: u16,
    /// Arbitrary filler
    pub destination_port: u16,
    pub flags: TcpFlags,
}

impl CovertPacket {
    /// Build the packet for an already encrypted symbol
    pub fn encode(symbol: Symbol, destination: Ipv4Addr, aux: u16) -> Self {
        Self {
            destination,
            source_port: symbol.value() as u16,
            destination_port: aux,
            flags: COVERT_MARKER,
        }
    }

    /// Encrypted symbol carried in the data field
    pub fn symbol(&self) -> Result<Symbol, FrameError> {
        Symbol::try_from(self.source_port)
            .map_err(|_| FrameError::SymbolOutOfRange(self.source_port))
    }

    /// Serialize the TCP header for a raw socket that builds the IP header itself
    ///
    /// `source` only feeds the checksum pseudo header and must match the address the
    /// kernel will put on the datagram.
    pub fn to_segment(&self, source: Ipv4Addr) -> [u8; TCP_HEADER_LEN] {
        let mut bytes = [0u8; TCP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        // sequence and acknowledgement numbers stay zero
        bytes[12] = ((TCP_HEADER_LEN / 4) as u8) << 4;
        bytes[13] = self.flags.bits();
        bytes[14..16].copy_from_slice(&DEFAULT_WINDOW.to_be_bytes());

        let pseudo = pseudo_header(source, self.destination, TCP_HEADER_LEN as u16);
        let checksum = internet_checksum(&[&pseudo[..], &bytes[..]]);
        bytes[16..18].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    /// Serialize a complete IPv4 datagram, as a capture would see it
    pub fn to_datagram(&self, source: Ipv4Addr) -> Vec<u8> {
        let total_len = (IPV4_HEADER_LEN + TCP_HEADER_LEN) as u16;
        let mut header = [0u8; IPV4_HEADER_LEN];
        header[0] = 0x40 | (IPV4_HEADER_LEN / 4) as u8;
        header[2..4].copy_from_slice(&total_len.to_be_bytes());
        header[4..6].copy_from_slice(&1u16.to_be_bytes());
        header[8] = DEFAULT_TTL;
        header[9] = IPPROTO_TCP;
        header[12..16].copy_from_slice(&source.octets());
        header[16..20].copy_from_slice(&self.destination.octets());
        let checksum = internet_checksum(&[&header[..]]);
        header[10..12].copy_from_slice(&checksum.to_be_bytes());

        let mut datagram = Vec::with_capacity(total_len as usize);
        datagram.extend_from_slice(&header);
        datagram.extend_from_slice(&self.to_segment(source));
        datagram
    }
}

/// Classification of a captured datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// Not an IPv4 TCP segment (or not the first fragment of one)
    NotTcp,
    /// TCP segment without the covert marker
    Unmarked,
    /// Covert segment and the encrypted symbol it carries
    Covert(Symbol),
}

/// Classify a captured IPv4 datagram and extract its covert symbol
///
/// # Returns
/// * `Ok(Decoded)` - Classification; only `Covert` carries data
/// * `Err(FrameError)` - Headers are truncated, or a marked segment carries a
///   data field outside the symbol domain
pub fn decode(datagram: &[u8], marker: MarkerMatch) -> Result<Decoded, FrameError> {
    let Some(&version_ihl) = datagram.first() else {
        return Err(FrameError::Truncated {
            layer: "IPv4",
            expected: IPV4_HEADER_LEN,
            actual: 0,
        });
    };

    if version_ihl >> 4 != 4 {
        return Ok(Decoded::NotTcp);
    }

    let header_len = ((version_ihl & 0x0f) as usize * 4).max(IPV4_HEADER_LEN);
    if datagram.len() < header_len {
        return Err(FrameError::Truncated {
            layer: "IPv4",
            expected: header_len,
            actual: datagram.len(),
        });
    }

    let fragment_offset = u16::from_be_bytes([datagram[6], datagram[7]]) & 0x1fff;
    if datagram[9] != IPPROTO_TCP || fragment_offset != 0 {
        return Ok(Decoded::NotTcp);
    }

    let segment = &datagram[header_len..];
    if segment.len() < TCP_HEADER_LEN {
        return Err(FrameError::Truncated {
            layer: "TCP",
            expected: TCP_HEADER_LEN,
            actual: segment.len(),
        });
    }

    let flags = TcpFlags::from_bits_retain(segment[13]);
    if !marker.matches(flags) {
        return Ok(Decoded::Unmarked);
    }

    let source_port = u16::from_be_bytes([segment[0], segment[1]]);
    let symbol =
        Symbol::try_from(source_port).map_err(|_| FrameError::SymbolOutOfRange(source_port))?;
    Ok(Decoded::Covert(symbol))
}

fn pseudo_header(source: Ipv4Addr, destination: Ipv4Addr, segment_len: u16) -> [u8; 12] {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&source.octets());
    pseudo[4..8].copy_from_slice(&destination.octets());
    pseudo[9] = IPPROTO_TCP;
    pseudo[10..12].copy_from_slice(&segment_len.to_be_bytes());
    pseudo
}

/// RFC 1071 one's complement sum over the concatenation of `parts`
///
/// Every part except the last must have even length.
fn internet_checksum(parts: &[&[u8]]) -> u16 {
    let mut sum: u32 = 0;
    for part in parts {
        let mut words = part.chunks_exact(2);
        for word in &mut words {
            sum += u16::from_be_bytes([word[0], word[1]]) as u32;
        }
        if let [last] = words.remainder() {
            sum += (*last as u32) << 8;
        }
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
