//! First-signal-wins resolution between concurrent producers
//!
//! Each producer holds a [`RaceEntrant`] and reports exactly once. The first
//! report is delivered to the single consumer; later reports are accepted and
//! dropped without blocking, so a losing producer never hangs on a consumer
//! that has already moved on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumer side of the race
pub struct OutcomeRace<T> {
    tx: mpsc::Sender<T>,
    rx: mpsc::Receiver<T>,
    decided: Arc<AtomicBool>,
}

/// Producer side of the race. Consumed by [`RaceEntrant::finish`].
pub struct RaceEntrant<T> {
    tx: mpsc::Sender<T>,
    decided: Arc<AtomicBool>,
}

impl<T: Send> OutcomeRace<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(2);
        Self {
            tx,
            rx,
            decided: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a producer.
    pub fn entrant(&self) -> RaceEntrant<T> {
        RaceEntrant {
            tx: self.tx.clone(),
            decided: Arc::clone(&self.decided),
        }
    }

    /// Wait for the first report.
    ///
    /// Returns `None` only if every entrant was dropped without reporting.
    pub async fn resolve(self) -> Option<T> {
        let Self { tx, mut rx, .. } = self;
        drop(tx);
        rx.recv().await
    }
}

impl<T: Send> Default for OutcomeRace<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RaceEntrant<T> {
    /// Report a value. Returns true if this report won the race.
    pub fn finish(self, value: T) -> bool {
        if self.decided.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Capacity is never exhausted by the single winning write; a closed
        // channel means the consumer is gone and the value is moot.
        let _ = self.tx.try_send(value);
        true
    }

    /// Whether some entrant has already reported.
    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_report_wins() {
        let race = OutcomeRace::new();
        let a = race.entrant();
        let b = race.entrant();

        assert!(a.finish("completed"));
        assert!(b.is_decided());
        assert!(!b.finish("expired"));

        assert_eq!(race.resolve().await, Some("completed"));
    }

    #[tokio::test]
    async fn test_abandoned_race_resolves_to_none() {
        let race: OutcomeRace<u8> = OutcomeRace::new();
        let entrant = race.entrant();
        drop(entrant);
        assert_eq!(race.resolve().await, None);
    }

    #[test]
    fn test_resolve_waits_for_a_report() {
        let race = OutcomeRace::new();
        let entrant = race.entrant();
        let mut resolving = tokio_test::task::spawn(race.resolve());

        tokio_test::assert_pending!(resolving.poll());
        assert!(entrant.finish("completed"));
        assert!(resolving.is_woken());
        assert_eq!(tokio_test::assert_ready!(resolving.poll()), Some("completed"));
    }

    #[tokio::test]
    async fn test_late_report_after_consumer_left_does_not_block() {
        let race = OutcomeRace::new();
        let winner = race.entrant();
        let loser = race.entrant();
        winner.finish(1);
        assert_eq!(race.resolve().await, Some(1));

        let late = tokio::task::spawn_blocking(move || loser.finish(2));
        let won = tokio::time::timeout(Duration::from_secs(1), late)
            .await
            .expect("late producer blocked")
            .unwrap();
        assert!(!won);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_reports_resolve_once() {
        for _ in 0..200 {
            let race = OutcomeRace::new();
            let completion = race.entrant();
            let timer = race.entrant();

            let deadline = tokio::time::Instant::now() + Duration::from_millis(1);
            let c = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                completion.finish("completed")
            });
            let t = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                timer.finish("expired")
            });

            let resolved = tokio::time::timeout(Duration::from_secs(1), race.resolve())
                .await
                .expect("resolver blocked");
            assert!(resolved.is_some());

            let (c_won, t_won) = (c.await.unwrap(), t.await.unwrap());
            assert!(c_won ^ t_won, "exactly one producer must win");
            let expected = if c_won { "completed" } else { "expired" };
            assert_eq!(resolved, Some(expected));
        }
    }
}
