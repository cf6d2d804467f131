use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Raises the stop signal from another thread (e.g. a Ctrl+C handler).
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn raise(&self) {
        // The loop may already be gone; nothing to notify then.
        let _ = self.tx.send(());
    }
}

/// Cancellation token observed by the probe loop once per tick.
#[derive(Debug)]
pub struct StopSignal {
    rx: Receiver<()>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel();
    (StopHandle { tx }, StopSignal { rx })
}

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()))
    }

    /// Blocks until `deadline` or until the signal is raised, whichever is
    /// first. Returns true when stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                // Every handle is gone, so only the timer can fire.
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Fire,
    Stop,
}

/// Fixed-interval timer. The first tick fires one interval after creation.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// Waits for the next tick or the stop signal.
    pub fn wait(&mut self, stop: &StopSignal) -> Tick {
        if stop.is_raised() || stop.wait_until(self.next) {
            return Tick::Stop;
        }

        // Ticks missed while a slow tick was running are dropped.
        let now = Instant::now();
        self.next += self.interval;
        if self.next < now {
            self.next = now;
        }
        Tick::Fire
    }
}
