//! Wall-clock source for timestamps written into incidents and records.
//!
//! Phase delays and acknowledgment deadlines are measured on
//! `tokio::time::Instant`; this trait only supplies the `DateTime<Utc>` values
//! that end up in audit data.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with tokio's clock.
///
/// Anchored to the system time at construction; afterwards it moves with
/// `tokio::time::Instant`, so under a paused runtime timestamps advance exactly
/// as far as the virtual timers do.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    instant_origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            wall_origin,
            instant_origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.instant_origin.elapsed();
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_virtual_time() {
        let origin = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = TokioClock::starting_at(origin);
        assert_eq!(clock.now(), origin);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(clock.now(), origin + chrono::Duration::seconds(300));
    }
}
