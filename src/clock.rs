//! Injectable time source.
//!
//! Calendar, urgency and cache-expiry logic read "now" through [`Clock`] so
//! tests can pin the current instant.

use std::sync::Mutex;
use time::{Duration, OffsetDateTime, UtcOffset};

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock expressed in the campus offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        match self.now.lock() {
            Ok(mut guard) => *guard += by,
            Err(poisoned) => *poisoned.into_inner() += by,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(datetime!(2025-09-15 08:00 UTC));

        clock.advance(Duration::minutes(5));

        assert_eq!(clock.now(), datetime!(2025-09-15 08:05 UTC));
    }

    #[test]
    fn system_clock_uses_configured_offset() -> Result<(), time::error::ComponentRange> {
        let offset = UtcOffset::from_hms(-5, 0, 0)?;
        let clock = SystemClock::new(offset);

        assert_eq!(clock.now().offset(), offset);
        Ok(())
    }
}
