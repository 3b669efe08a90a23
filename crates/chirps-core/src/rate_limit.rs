//! FIFO request pacing
//!
//! Callers are dispatched at most once per `1 / queries_per_second` seconds, in
//! the order they asked. Unlike a token bucket there is no burst allowance: ten
//! callers arriving together leave over ten intervals.
//!
//! The only shared state is a dispatch timestamp and a queue counter behind a
//! mutex. The lock is never held across an await; waiting happens outside it.

use crate::error::{CorpusError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct LimiterState {
    last_dispatch: Option<Instant>,
    queued: u32,
}

/// Shared pacing gate for outbound requests
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter allowing `queries_per_second` dispatches per second
    pub fn new(queries_per_second: f64) -> Result<Self> {
        Ok(Self {
            interval: dispatch_interval(queries_per_second)?,
            state: Mutex::new(LimiterState::default()),
        })
    }

    /// Minimum spacing between two dispatches
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Callers currently waiting for their slot
    pub fn queued(&self) -> u32 {
        self.state().queued
    }

    /// Wait for this caller's turn.
    ///
    /// The returned permit marks the dispatch instant. Dropping it releases
    /// nothing: the gate paces dispatch only, so responses may overlap.
    pub async fn acquire(self: &Arc<Self>) -> DispatchPermit {
        self.reserve().wait().await
    }

    /// Take a place in the queue now and wait for it later.
    ///
    /// Reserving in a loop and then spawning one task per reservation fixes the
    /// dispatch order to the loop order, whatever order the tasks get polled in.
    pub fn reserve(self: &Arc<Self>) -> Reservation {
        let now = Instant::now();
        let mut state = self.state();

        let Some(last) = state.last_dispatch else {
            // First caller in the limiter's lifetime goes straight through
            state.last_dispatch = Some(now);
            return Reservation {
                limiter: Arc::clone(self),
                delay: Duration::ZERO,
                queued: false,
                settled: false,
            };
        };

        state.queued += 1;
        let due = self.interval * state.queued;
        let delay = due.saturating_sub(now.saturating_duration_since(last));

        Reservation {
            limiter: Arc::clone(self),
            delay,
            queued: true,
            settled: false,
        }
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spacing between dispatches for a `queries_per_second` rate
pub(crate) fn dispatch_interval(queries_per_second: f64) -> Result<Duration> {
    if !queries_per_second.is_finite() || queries_per_second <= 0.0 {
        return Err(CorpusError::Config(format!(
            "queries_per_second must be a positive number, got {queries_per_second}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / queries_per_second).map_err(|e| {
        CorpusError::Config(format!(
            "queries_per_second {queries_per_second} gives an unusable interval: {e}"
        ))
    })
}

/// A queued slot obtained from [`RateLimiter::reserve`].
///
/// Dropping it without waiting gives the slot back.
#[derive(Debug)]
#[must_use = "a reservation does nothing until it is waited on"]
pub struct Reservation {
    limiter: Arc<RateLimiter>,
    delay: Duration,
    queued: bool,
    settled: bool,
}

impl Reservation {
    /// Time left before this slot may dispatch, as computed at reservation
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep until the slot is due and record the dispatch
    pub async fn wait(mut self) -> DispatchPermit {
        if !self.queued {
            self.settled = true;
            return DispatchPermit {
                dispatched_at: Instant::now(),
            };
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let now = Instant::now();
        {
            let mut state = self.limiter.state();
            state.last_dispatch = Some(now);
            state.queued = state.queued.saturating_sub(1);
        }
        self.settled = true;

        DispatchPermit { dispatched_at: now }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.queued && !self.settled {
            let mut state = self.limiter.state();
            state.queued = state.queued.saturating_sub(1);
        }
    }
}

/// Proof that the caller was let through, and when
#[derive(Debug, Clone, Copy)]
pub struct DispatchPermit {
    dispatched_at: Instant,
}

impl DispatchPermit {
    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_rates() {
        assert!(RateLimiter::new(0.0).is_err());
        assert!(RateLimiter::new(-1.0).is_err());
        assert!(RateLimiter::new(f64::NAN).is_err());
        assert!(RateLimiter::new(f64::MIN_POSITIVE).is_err());
        assert!(RateLimiter::new(1e-30).is_err());
        assert_eq!(
            RateLimiter::new(4.0).unwrap().interval(),
            Duration::from_millis(250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = Arc::new(RateLimiter::new(1.0).unwrap());
        let start = Instant::now();

        let permit = limiter.acquire().await;
        assert_eq!(permit.dispatched_at() - start, Duration::ZERO);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced_in_arrival_order() {
        let limiter = Arc::new(RateLimiter::new(1.0).unwrap());

        let (a, b, c) = tokio::join!(limiter.acquire(), limiter.acquire(), limiter.acquire());
        let (a, b, c) = (a.dispatched_at(), b.dispatched_at(), c.dispatched_at());

        assert!(b - a >= Duration::from_secs(1));
        assert!(c - b >= Duration::from_secs(1));
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reservations_keep_reservation_order() {
        let limiter = Arc::new(RateLimiter::new(2.0).unwrap());
        let reservations: Vec<_> = (0..4).map(|_| limiter.reserve()).collect();

        // Spawn in reverse so poll order disagrees with reservation order
        let mut handles = Vec::new();
        for (index, reservation) in reservations.into_iter().enumerate().rev() {
            handles.push(tokio::spawn(async move {
                (index, reservation.wait().await.dispatched_at())
            }));
        }

        let mut dispatched = Vec::new();
        for handle in handles {
            dispatched.push(handle.await.unwrap());
        }
        dispatched.sort_by_key(|&(_, at)| at);

        let order: Vec<usize> = dispatched.iter().map(|&(index, _)| index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        for pair in dispatched.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_delay() {
        let limiter = Arc::new(RateLimiter::new(1.0).unwrap());
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = Instant::now();
        let permit = limiter.acquire().await;
        assert_eq!(permit.dispatched_at() - before, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_reservation_frees_its_slot() {
        let limiter = Arc::new(RateLimiter::new(1.0).unwrap());
        limiter.acquire().await;

        let reservation = limiter.reserve();
        assert_eq!(limiter.queued(), 1);
        assert_eq!(reservation.delay(), Duration::from_secs(1));
        drop(reservation);
        assert_eq!(limiter.queued(), 0);

        // The next caller only waits one interval, not two
        let next = limiter.reserve();
        assert_eq!(next.delay(), Duration::from_secs(1));
    }
}
