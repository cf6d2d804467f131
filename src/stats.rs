use std::fmt;

/// Running counters and RTT accounting for one session. All times are in
/// milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    sent: u32,
    received: u32,
    min: Option<f64>,
    max: f64,
    total: f64,
}

impl Statistics {
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_reply(&mut self, rtt: f64) {
        self.received += 1;
        // Seeded by the first reply so a zero default never wins.
        self.min = Some(self.min.map_or(rtt, |min| min.min(rtt)));
        self.max = self.max.max(rtt);
        self.total += rtt;
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    /// Truncated loss percentage; 0 when nothing was sent.
    pub fn loss_percent(&self) -> u32 {
        if self.sent == 0 {
            return 0;
        }
        let lost = self.sent.saturating_sub(self.received) as u64;
        (lost * 100 / self.sent as u64) as u32
    }

    pub fn min_ms(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }

    pub fn max_ms(&self) -> f64 {
        self.max
    }

    pub fn avg_ms(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.total / self.received as f64
    }

    /// Sum of all reply RTTs.
    pub fn total_ms(&self) -> f64 {
        self.total
    }

    pub fn report<'a>(&'a self, destination: &'a str) -> Report<'a> {
        Report {
            destination,
            stats: self,
        }
    }
}

/// The statistics block printed when a session ends.
pub struct Report<'a> {
    destination: &'a str,
    stats: &'a Statistics,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stats;
        writeln!(f, "--- {} ping statistics ---", self.destination)?;
        writeln!(
            f,
            "{} packets transmitted, {} received, {}% packet loss, time {}ms",
            s.sent,
            s.received,
            s.loss_percent(),
            s.total_ms() as u64
        )?;
        writeln!(
            f,
            "rtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
            s.min_ms(),
            s.avg_ms(),
            s.max_ms()
        )
    }
}
