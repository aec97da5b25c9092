//! Wall-clock abstraction.
//!
//! Every component that gates on "now" (the schedule cache, the queue's
//! `scheduled_for` filter, the processor's pass budget) takes a `&dyn
//! Clock` instead of calling `Utc::now()` directly, so tests can pin time
//! without sleeping — grounded on the teacher's habit of threading
//! `chrono::Utc::now()` through call sites explicitly rather than hiding
//! it in a global.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_advances() {
        let t = Utc::now();
        let clock = FixedClock(t);
        assert_eq!(clock.now(), t);
        assert_eq!(clock.now(), t);
    }
}
