use log::{debug, warn};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::icmp::{self, EchoPacket, EchoReply};
use crate::schedule::{StopSignal, Tick, Ticker};
use crate::stats::Statistics;

/// Receive buffer size; longer replies are truncated.
pub const RECV_BUFFER_LEN: usize = 128;

/// The connection the probe loop talks through.
pub trait Transport {
    /// Bounds every following send and receive.
    fn set_deadline(&mut self, deadline: Instant) -> io::Result<()>;
    fn send(&mut self, packet: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Connect deadline and per-tick send/receive deadline.
    pub timeout: Duration,
    /// Payload bytes per request.
    pub size: usize,
    /// Stop after this many requests were sent.
    pub count: u32,
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            size: 64,
            count: 4,
            interval: Duration::from_secs(1),
        }
    }
}

/// Mutable state of one ping run.
#[derive(Debug, Clone)]
pub struct ProbeSession {
    destination: String,
    address: Ipv4Addr,
    config: ProbeConfig,
    stats: Statistics,
    counter: u16,
}

impl ProbeSession {
    pub fn new(destination: impl Into<String>, address: Ipv4Addr, config: ProbeConfig) -> Self {
        Self {
            destination: destination.into(),
            address,
            config,
            stats: Statistics::default(),
            counter: 0,
        }
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    fn next_counter(&mut self) -> u16 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }

    fn done(&self) -> bool {
        self.stats.sent() >= self.config.count
    }
}

enum Flow {
    Continue,
    Finish,
}

/// Drives a session from banner to statistics over an owned transport.
pub struct Probe<T> {
    transport: T,
    session: ProbeSession,
    stop: StopSignal,
}

impl<T: Transport> Probe<T> {
    pub fn new(transport: T, session: ProbeSession, stop: StopSignal) -> Self {
        Self {
            transport,
            session,
            stop,
        }
    }

    /// Runs until the count is reached or the stop signal is raised. The
    /// statistics block is written once the banner was, whatever ends the
    /// loop. The transport is dropped on return.
    pub fn run<W: Write>(mut self, out: &mut W) -> io::Result<Statistics> {
        let size = self.session.config.size;
        writeln!(
            out,
            "PING {} ({}) {}({}) bytes of data.",
            self.session.destination,
            self.session.address,
            size,
            size.saturating_add(icmp::OVERHEAD)
        )?;

        let outcome = self.drive(out);
        write!(out, "{}", self.session.stats.report(&self.session.destination))?;
        outcome?;
        Ok(self.session.stats)
    }

    fn drive<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let mut ticker = Ticker::new(self.session.config.interval);
        while !self.session.done() {
            if ticker.wait(&self.stop) == Tick::Stop {
                debug!("stop signal raised");
                break;
            }
            if let Flow::Finish = self.tick(out)? {
                break;
            }
        }
        Ok(())
    }

    fn tick<W: Write>(&mut self, out: &mut W) -> io::Result<Flow> {
        let seq = self.session.next_counter();
        let packet = EchoPacket::request(seq, self.session.config.size).encode();

        let deadline = Instant::now() + self.session.config.timeout;
        if let Err(err) = self.transport.set_deadline(deadline) {
            warn!("icmp_seq={seq}: failed to set deadline: {err}");
            return Ok(Flow::Continue);
        }

        let sent_at = Instant::now();
        if let Err(err) = self.transport.send(&packet) {
            warn!("icmp_seq={seq}: send failed: {err}");
            return Ok(Flow::Continue);
        }
        self.session.stats.record_sent();

        let mut buf = [0u8; RECV_BUFFER_LEN];
        match self.await_reply(seq, &mut buf) {
            Ok((len, reply)) => {
                let rtt = sent_at.elapsed().as_micros() as f64 / 1000.0;
                writeln!(
                    out,
                    "{} bytes from {}: icmp_seq={} ttl={} time={:.1} ms",
                    len.saturating_sub(icmp::OVERHEAD),
                    reply.source,
                    seq,
                    reply.ttl,
                    rtt
                )?;
                self.session.stats.record_reply(rtt);
            }
            Err(err) => warn!("icmp_seq={seq}: {err}"),
        }

        Ok(if self.session.done() {
            Flow::Finish
        } else {
            Flow::Continue
        })
    }

    /// Reads until the reply to `seq` arrives; other datagrams are skipped.
    fn await_reply(&mut self, seq: u16, buf: &mut [u8]) -> io::Result<(usize, EchoReply)> {
        loop {
            let len = self.transport.recv(buf)?;
            match EchoReply::parse(&buf[..len]) {
                Ok(reply) if reply.answers(seq) => return Ok((len, reply)),
                Ok(reply) => debug!(
                    "skipping icmp type {} id {} seq {} from {}",
                    reply.icmp_type, reply.identifier, reply.sequence, reply.source
                ),
                Err(err) => debug!("skipping datagram: {err:#}"),
            }
        }
    }
}
