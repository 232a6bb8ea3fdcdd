//! Hub time: a monotonic instant for timers and rate limits plus unix
//! seconds for anything persisted (ban expiry, join times).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    mono: Instant,
    wall: i64,
}

impl Clock {
    pub fn now() -> Self {
        Self {
            mono: Instant::now(),
            wall: chrono::Utc::now().timestamp(),
        }
    }

    pub fn mono(&self) -> Instant {
        self.mono
    }

    pub fn wall(&self) -> i64 {
        self.wall
    }

    /// Re-read the system clocks. The monotonic half never moves backwards.
    pub fn sync(&mut self) {
        let now = Instant::now();
        if now > self.mono {
            self.mono = now;
        }
        self.wall = chrono::Utc::now().timestamp();
    }

    /// Move both halves forward; used by tests to simulate elapsed time.
    pub fn advance(&mut self, by: Duration) {
        self.mono += by;
        self.wall += by.as_secs() as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_moves_both() {
        let mut clock = Clock::now();
        let (mono, wall) = (clock.mono(), clock.wall());
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.mono() - mono, Duration::from_secs(5));
        assert_eq!(clock.wall() - wall, 5);
    }

    #[test]
    fn test_sync_never_goes_back() {
        let mut clock = Clock::now();
        clock.advance(Duration::from_secs(3600));
        let ahead = clock.mono();
        clock.sync();
        assert_eq!(clock.mono(), ahead);
    }
}
