//! Auto-trigger scheduler: synthetic turns driven by check-in changes.
//!
//! Greeting fires once, the first time any check-in field is present. After that, every
//! change of the check-in (re)arms a single debounce timer; when it elapses one
//! check-in-updated turn is due.

use crate::checkin::CheckinSnapshot;
use crate::dispatch::SystemTrigger;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

type CheckinKey = (Option<u8>, Option<u8>, Option<u8>);

pub struct AutoTrigger {
    debounce: Duration,
    greeted: bool,
    last_key: Option<CheckinKey>,
    pending: Option<Pin<Box<Sleep>>>,
}

impl AutoTrigger {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            greeted: false,
            last_key: None,
            pending: None,
        }
    }

    pub fn greeted(&self) -> bool {
        self.greeted
    }

    /// Whether a check-in-updated turn is waiting on the debounce timer.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record the current check-in. Returns `Greeting` when the greeting is due now;
    /// otherwise a changed check-in re-arms the debounce timer. Must be called inside a
    /// tokio runtime (arming the timer registers with its time driver).
    pub fn observe(&mut self, checkin: &CheckinSnapshot) -> Option<SystemTrigger> {
        let key = checkin.key();
        if !self.greeted {
            if checkin.is_empty() {
                return None;
            }
            self.greeted = true;
            self.last_key = Some(key);
            return Some(SystemTrigger::Greeting);
        }
        if self.last_key == Some(key) {
            return None;
        }
        self.last_key = Some(key);
        self.arm();
        None
    }

    fn arm(&mut self) {
        let deadline = Instant::now() + self.debounce;
        match self.pending.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.pending = Some(Box::pin(sleep_until(deadline))),
        }
    }

    /// Drop the pending timer, if any.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Resolves with `CheckinUpdated` when the debounce elapses; never resolves while
    /// nothing is armed. Cancel-safe.
    pub async fn due(&mut self) -> SystemTrigger {
        match self.pending.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.pending = None;
                SystemTrigger::CheckinUpdated
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkin(energy: Option<u8>, stress: Option<u8>, sleep: Option<u8>) -> CheckinSnapshot {
        CheckinSnapshot::new(energy, stress, sleep)
    }

    #[tokio::test(start_paused = true)]
    async fn greeting_waits_for_first_value_and_fires_once() {
        let mut t = AutoTrigger::new(Duration::from_millis(2000));
        assert_eq!(t.observe(&CheckinSnapshot::default()), None);
        assert_eq!(
            t.observe(&checkin(None, Some(3), None)),
            Some(SystemTrigger::Greeting)
        );
        assert_eq!(t.observe(&checkin(None, Some(4), None)), None);
        assert_eq!(t.observe(&checkin(Some(1), Some(4), None)), None);
        assert!(t.greeted());
    }

    #[tokio::test(start_paused = true)]
    async fn no_timer_before_greeting_or_without_change() {
        let mut t = AutoTrigger::new(Duration::from_millis(2000));
        t.observe(&CheckinSnapshot::default());
        assert!(!t.is_pending());
        t.observe(&checkin(Some(2), None, None));
        assert!(!t.is_pending());
        t.observe(&checkin(Some(2), None, None));
        assert!(!t.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_fires_once_after_quiet_period() {
        let mut t = AutoTrigger::new(Duration::from_millis(2000));
        t.observe(&checkin(Some(3), None, None));
        let start = Instant::now();
        for v in 1..=4u8 {
            t.observe(&checkin(Some(3), Some(v), None));
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(t.is_pending());
        assert_eq!(t.due().await, SystemTrigger::CheckinUpdated);
        // Last change happened at 1500 ms; the fire comes 2000 ms after it.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3500), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3600), "{:?}", elapsed);
        assert!(!t.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_pending_timer() {
        let mut t = AutoTrigger::new(Duration::from_millis(2000));
        t.observe(&checkin(Some(3), None, None));
        t.observe(&checkin(Some(4), None, None));
        t.clear();
        let fired = tokio::time::timeout(Duration::from_secs(5), t.due()).await;
        assert!(fired.is_err());
    }
}
