use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::net::frame::MAX_DATAGRAM;
use crate::net::protocol::Packet;
use crate::net::stats::NetworkStats;

/// The datagram surface both endpoints talk through. Non-blocking; callers
/// drain [`recv_batch`](Self::recv_batch) from their tick loop. Packets
/// that fail framing or payload decoding are counted, logged and dropped
/// without disturbing the endpoint.
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    recv_buffer: [u8; MAX_DATAGRAM],
    stats: NetworkStats,
    compression_threshold: usize,
}

impl UdpEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            recv_buffer: [0u8; MAX_DATAGRAM],
            stats: NetworkStats::default(),
            compression_threshold: crate::net::payload::DEFAULT_COMPRESSION_THRESHOLD,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub fn set_compression_threshold(&mut self, threshold: usize) {
        self.compression_threshold = threshold;
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> io::Result<usize> {
        let data = packet
            .encode_with_threshold(self.compression_threshold)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        debug_assert!(data.len() <= MAX_DATAGRAM);
        let bytes = self.socket.send_to(&data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn send(&mut self, packet: &Packet) -> io::Result<usize> {
        let addr = self
            .remote_addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no remote address set"))?;
        self.send_to(packet, addr)
    }

    /// Drains every datagram currently queued on the socket. Returns
    /// `(packet, source, wire_len)` per decodable datagram; undecodable
    /// ones are dropped with a debug log line.
    pub fn recv_batch(&mut self) -> io::Result<Vec<(Packet, SocketAddr, usize)>> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => match Packet::decode(&self.recv_buffer[..size]) {
                    Ok(packet) => {
                        self.stats.packets_received += 1;
                        self.stats.bytes_received += size as u64;
                        packets.push((packet, addr, size));
                    }
                    Err(e) => {
                        self.stats.packets_dropped += 1;
                        log::debug!("dropping {size}-byte datagram from {addr}: {e}");
                    }
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(packets)
    }
}
