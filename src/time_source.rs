//! Wall-clock reads, relative-minute computation and suspendable sleep,
//! abstracted behind a trait so the executor's settle loops and
//! deadlines are deterministically testable (spec.md §2 item 2, §5).

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[async_trait]
pub trait TimeSource: Send + Sync {
    fn now_unix(&self) -> i64;

    /// Whole minutes elapsed between `since` and now.
    fn diff_minutes(&self, since: i64) -> i64 {
        (self.now_unix() - since) / 60
    }

    async fn sleep_seconds(&self, seconds: u64);
}

/// Real wall-clock + tokio sleep, used in production — grounded in the
/// teacher's direct `tokio::time::sleep` calls in `main.rs`, generalized
/// into a trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

#[async_trait]
impl TimeSource for SystemTimeSource {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs() as i64
    }

    async fn sleep_seconds(&self, seconds: u64) {
        tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
    }
}

/// A controllable clock for tests: `now_unix` is an atomic the test
/// advances directly, and `sleep_seconds` advances it instead of
/// actually waiting, so settle-loop/deadline tests run instantly.
pub struct FakeTimeSource {
    now: AtomicI64,
}

impl FakeTimeSource {
    pub fn new(start: i64) -> Self {
        Self { now: AtomicI64::new(start) }
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance_seconds(minutes * 60);
    }
}

#[async_trait]
impl TimeSource for FakeTimeSource {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_seconds(&self, seconds: u64) {
        self.advance_seconds(seconds as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_minutes_is_whole_minutes() {
        let clock = FakeTimeSource::new(0);
        clock.advance_seconds(119);
        assert_eq!(clock.diff_minutes(0), 1);
        clock.advance_seconds(1);
        assert_eq!(clock.diff_minutes(0), 2);
    }

    #[tokio::test]
    async fn fake_sleep_advances_clock_instead_of_waiting() {
        let clock = FakeTimeSource::new(1_000);
        clock.sleep_seconds(5).await;
        assert_eq!(clock.now_unix(), 1_005);
    }
}
