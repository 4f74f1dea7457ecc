use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::{MAX_PACKET_SIZE, PacketHeader};
use super::stats::{NetworkCounters, NetworkStats};

/// Non-blocking UDP socket shared by the tick thread and the receive loop.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    counters: NetworkCounters,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            counters: NetworkCounters::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> NetworkStats {
        self.counters.snapshot()
    }

    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Packet exceeds MTU",
            ));
        }

        match self.socket.send_to(data, addr) {
            Ok(bytes) => {
                self.counters.record_sent(bytes);
                Ok(bytes)
            }
            Err(e) => {
                self.counters.record_send_failure();
                Err(e)
            }
        }
    }

    /// Drains every pending datagram, silently dropping those with a foreign
    /// magic or version.
    pub fn receive(&self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut datagrams = Vec::new();
        let mut recv_buffer = [0u8; MAX_PACKET_SIZE + 1];

        loop {
            match self.socket.recv_from(&mut recv_buffer) {
                Ok((size, addr)) => {
                    if size > MAX_PACKET_SIZE {
                        self.counters.record_rejected();
                        continue;
                    }

                    let data = &recv_buffer[..size];
                    match PacketHeader::split(data) {
                        Ok(_) => {
                            self.counters.record_received(size);
                            datagrams.push((data.to_vec(), addr));
                        }
                        Err(_) => self.counters.record_rejected(),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(datagrams)
    }
}
