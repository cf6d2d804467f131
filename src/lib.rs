//! Minimal ICMP echo prober: sends one Echo Request per tick over a raw
//! socket, measures round-trip times and reports loss and RTT statistics.
//!
//! Sending and receiving raw ICMP requires root or `CAP_NET_RAW`.

pub mod args;
pub mod icmp;
pub mod probe;
pub mod schedule;
pub mod socket;
pub mod stats;

pub use self::probe::{Probe, ProbeConfig, ProbeSession, Transport};
pub use self::schedule::{StopHandle, StopSignal, stop_channel};
pub use self::stats::Statistics;
