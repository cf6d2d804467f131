use anyhow::{Context, Result, anyhow};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::probe::Transport;

/// Resolves `destination` through the system resolver and picks the first
/// IPv4 address.
pub fn resolve(destination: &str) -> Result<Ipv4Addr> {
    // Port 0 is ignored for ICMP
    let addrs = (destination, 0)
        .to_socket_addrs()
        .with_context(|| format!("{destination}: name resolution failed"))?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| anyhow!("{destination}: no IPv4 address"))
}

/// A raw ICMP socket connected to a single peer.
///
/// Reads return the whole datagram including the IPv4 header. The socket is
/// closed when this value is dropped.
pub struct IcmpSocket {
    socket: Socket,
    peer: Ipv4Addr,
    deadline: Option<Instant>,
}

impl IcmpSocket {
    pub fn connect(destination: &str, timeout: Duration) -> Result<Self> {
        let peer = resolve(destination)?;
        let socket = open_raw()?;

        let addr = SockAddr::from(SocketAddr::new(IpAddr::V4(peer), 0));
        socket
            .connect_timeout(&addr, timeout)
            .with_context(|| format!("failed to connect to {peer}"))?;

        Ok(Self {
            socket,
            peer,
            deadline: None,
        })
    }

    pub fn peer(&self) -> Ipv4Addr {
        self.peer
    }

    /// Time left before the deadline, `None` when no deadline is set.
    fn remaining(&self) -> io::Result<Option<Duration>> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        match deadline.checked_duration_since(Instant::now()) {
            Some(left) if !left.is_zero() => Ok(Some(left)),
            _ => Err(timed_out()),
        }
    }
}

impl Transport for IcmpSocket {
    fn set_deadline(&mut self, deadline: Instant) -> io::Result<()> {
        self.deadline = Some(deadline);
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.socket.set_write_timeout(left)?;
        self.socket.write(packet).map_err(map_timeout)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.socket.set_read_timeout(left)?;
        self.socket.read(buf).map_err(map_timeout)
    }
}

fn open_raw() -> Result<Socket> {
    // SOCK_RAW: socket2 only exposes Type::RAW behind its "all" feature
    Socket::new(
        Domain::IPV4,
        Type::from(libc::SOCK_RAW),
        Some(Protocol::ICMPV4),
    )
    .map_err(|err| {
        let denied = matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES));
        let err = anyhow::Error::new(err);
        if denied {
            err.context("raw ICMP sockets require root or CAP_NET_RAW")
        } else {
            err.context("failed to create raw ICMP socket")
        }
    })
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "request timed out")
}

// SO_RCVTIMEO/SO_SNDTIMEO expiry surfaces as EAGAIN.
fn map_timeout(err: io::Error) -> io::Error {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => timed_out(),
        _ => err,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_literal() {
        assert_eq!(resolve("127.0.0.1").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_resolve_rejects_ipv6_only() {
        assert!(resolve("::1").is_err());
    }

    #[test]
    fn test_map_timeout() {
        let err = map_timeout(io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let err = map_timeout(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
