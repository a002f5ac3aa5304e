use governor::{Quota, RateLimiter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::models::TradingMode;

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct Pacing {
    interval: Duration,
    // None when pacing is disabled (zero interval)
    limiter: Option<Arc<DirectRateLimiter>>,
    // Bumped on every replacement so waiters on a retired limiter can tell
    generation: u64,
}

impl Pacing {
    fn new(interval: Duration, generation: u64) -> Self {
        // Burst of one: every permit is at least `interval` after the previous one
        let limiter = Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self {
            interval,
            limiter,
            generation,
        }
    }

    /// Replacement limiter whose first permit is already spent
    ///
    /// The next permit is then at least `interval` after the switch, which is
    /// never earlier than `interval` after the last permit of the old limiter.
    fn replacing(previous: &Pacing, interval: Duration) -> Self {
        let pacing = Pacing::new(interval, previous.generation + 1);
        if let Some(limiter) = &pacing.limiter {
            let _ = limiter.check();
        }
        pacing
    }
}

/// Global pacing gate for every call to the external venue
///
/// One instance is shared (behind an `Arc`) by everything that talks to the
/// venue. `wait_for_next` must be awaited immediately before each call, not
/// once per tick: a single tick issues several calls and each one counts
/// against the venue's per-second cap.
///
/// The check-and-record step is governor's atomic GCRA update, so two tasks
/// racing on the same instance can never both observe a stale permit time.
/// Switching modes keeps the spacing: the first call after [`set_mode`](Self::set_mode)
/// still waits a full new interval.
pub struct RequestLimiter {
    pacing: RwLock<Pacing>,
    mode: RwLock<Option<TradingMode>>,
    permits: AtomicU64,
}

impl RequestLimiter {
    /// Limiter using the interval of the given trading mode
    pub fn for_mode(mode: TradingMode) -> Self {
        Self {
            pacing: RwLock::new(Pacing::new(mode.min_request_interval(), 0)),
            mode: RwLock::new(Some(mode)),
            permits: AtomicU64::new(0),
        }
    }

    /// Limiter with an explicit interval (configuration override)
    ///
    /// A zero interval disables pacing entirely, which is only useful for
    /// replays against a simulated venue.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            pacing: RwLock::new(Pacing::new(interval, 0)),
            mode: RwLock::new(None),
            permits: AtomicU64::new(0),
        }
    }

    /// Switch to the interval of another trading mode
    pub fn set_mode(&self, mode: TradingMode) {
        let interval = mode.min_request_interval();
        {
            let mut pacing = self.pacing.write().unwrap_or_else(PoisonError::into_inner);
            *pacing = Pacing::replacing(&pacing, interval);
        }
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = Some(mode);

        tracing::info!(%mode, interval_ms = interval.as_millis() as u64, "Request pacing updated");
    }

    /// Wait until the next venue call is allowed, then claim it
    ///
    /// The first call after construction never waits.
    pub async fn wait_for_next(&self) {
        loop {
            let (limiter, generation) = {
                let pacing = self.pacing.read().unwrap_or_else(PoisonError::into_inner);
                (pacing.limiter.clone(), pacing.generation)
            };

            if let Some(limiter) = limiter {
                limiter.until_ready().await;
            }

            // A permit from a limiter retired mid-wait does not count
            if self.generation() == generation {
                break;
            }
        }

        self.permits.fetch_add(1, Ordering::SeqCst);
    }

    fn generation(&self) -> u64 {
        self.pacing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn min_interval(&self) -> Duration {
        self.pacing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .interval
    }

    pub fn mode(&self) -> Option<TradingMode> {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of permits handed out so far
    pub fn permits_issued(&self) -> u64 {
        self.permits.load(Ordering::SeqCst)
    }
}
