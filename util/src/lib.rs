use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic id generator for in-process identifiers.
///
/// Ids handed out by one generator are never reused while it lives.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a new generator starting at the provided value.
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Returns the next id in sequence.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Milliseconds since the Unix epoch, or zero if the clock is before it.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_unique() {
        let ids = IdGenerator::new(7);
        assert_eq!(ids.next(), 7);
        assert_eq!(ids.next(), 8);
        assert_eq!(ids.next(), 9);
    }

    #[test]
    fn clock_is_past_epoch() {
        assert!(unix_millis() > 0);
    }
}
