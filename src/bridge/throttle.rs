use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registration slot taken from the throttle. Hand it back with
/// [`RegistrationThrottle::restore`] if the registration was never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    previous: Option<Instant>,
    at: Instant,
}

/// Process-wide record of the last push registration.
pub struct RegistrationThrottle {
    interval: Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<Instant>>,
}

impl RegistrationThrottle {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, Arc::new(SystemClock))
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            last: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Instant>> {
        // Only ever holds a timestamp; a poisoned value is still valid.
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the slot if nothing was registered yet or strictly more than
    /// `interval` has passed since the last registration.
    pub fn try_acquire(&self) -> Option<Reservation> {
        let now = self.clock.now();
        let mut last = self.slot();
        let due = match *last {
            None => true,
            Some(prev) => now.saturating_duration_since(prev) > self.interval,
        };
        if !due {
            return None;
        }
        let reservation = Reservation {
            previous: *last,
            at: now,
        };
        *last = Some(now);
        Some(reservation)
    }

    /// Record a registration regardless of the interval.
    pub fn record(&self) -> Reservation {
        let now = self.clock.now();
        let mut last = self.slot();
        let reservation = Reservation {
            previous: *last,
            at: now,
        };
        *last = Some(now);
        reservation
    }

    /// Undo `reservation` unless a later registration already replaced it.
    pub fn restore(&self, reservation: Reservation) {
        let mut last = self.slot();
        if *last == Some(reservation.at) {
            *last = reservation.previous;
        }
    }

    pub fn last_registration(&self) -> Option<Instant> {
        *self.slot()
    }
}
