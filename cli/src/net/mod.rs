//! Raw packet I/O
//!
//! Both directions use a raw IPv4 socket bound to the TCP protocol number, which
//! needs root or CAP_NET_RAW. On Linux such a socket also receives a copy of every
//! inbound TCP datagram, IP header included, which is what the capture side reads.

use anyhow::{Context, Result};
use protocol::frame::CovertPacket;
use protocol::receive::Capture;
use protocol::transmit::PacketSink;
use protocol::{StopToken, TransportError};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// Largest IPv4 datagram
const CAPTURE_BUFFER_SIZE: usize = 65535;

fn raw_tcp_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
}

/// Sends covert segments; the kernel builds the IP header
pub struct RawSender {
    socket: Socket,
    source: Ipv4Addr,
}

impl RawSender {
    pub fn open(destination: Ipv4Addr, source: Option<Ipv4Addr>) -> Result<Self> {
        let socket =
            raw_tcp_socket().context("Failed to open raw TCP socket (CAP_NET_RAW required)")?;

        let source = match source {
            Some(source) => source,
            None => route_source(destination)
                .with_context(|| format!("Failed to find a route to {}", destination))?,
        };

        info!("Sending covert packets {} -> {}", source, destination);
        Ok(Self { socket, source })
    }
}

impl PacketSink for RawSender {
    fn send(&mut self, packet: &CovertPacket) -> Result<(), TransportError> {
        let segment = packet.to_segment(self.source);
        let address = SockAddr::from(SocketAddrV4::new(packet.destination, 0));

        self.socket
            .send_to(&segment, &address)
            .map_err(TransportError::Send)?;
        debug!(
            "Sent segment sport={} dport={} to {}",
            packet.source_port, packet.destination_port, packet.destination
        );
        Ok(())
    }
}

/// Local address the kernel would use to reach `destination`
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn route_source(destination: Ipv4Addr) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((destination, 9))?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(source) => Ok(source),
        IpAddr::V6(source) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("route to {} uses IPv6 source {}", destination, source),
        )),
    }
}

/// Passive capture of inbound TCP datagrams
///
/// Reads time out every `poll_interval` and yield [`Capture::Idle`], which is when
/// the stop token is checked.
pub struct RawCapture {
    socket: Socket,
    buffer: Vec<u8>,
    stop: StopToken,
}

impl RawCapture {
    pub fn open(poll_interval: Duration, stop: StopToken) -> Result<Self> {
        let socket =
            raw_tcp_socket().context("Failed to open raw TCP socket (CAP_NET_RAW required)")?;
        socket
            .set_read_timeout(Some(poll_interval))
            .context("Failed to set capture read timeout")?;

        info!("Capturing TCP traffic");
        Ok(Self {
            socket,
            buffer: vec![0u8; CAPTURE_BUFFER_SIZE],
            stop,
        })
    }
}

impl Iterator for RawCapture {
    type Item = Result<Capture, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_cancelled() {
            return None;
        }

        match (&self.socket).read(&mut self.buffer) {
            Ok(len) => Some(Ok(Capture::Packet(self.buffer[..len].to_vec()))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Some(Ok(Capture::Idle))
            }
            Err(e) => Some(Err(TransportError::Capture(e))),
        }
    }
}
