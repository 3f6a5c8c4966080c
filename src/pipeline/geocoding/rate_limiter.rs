use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Process-wide limiter for external geocoding calls. One shared instance is
/// injected into every call path; `acquire` suspends until the next request
/// slot is available, so the provider sees at most one request per
/// configured interval no matter how many workers are issuing calls.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    min_interval: Duration,
    // The earliest instant the next request may be issued. Reserving a slot
    // mutates this under the lock, which is what makes the interval hold
    // across concurrent workers.
    next_slot: Mutex<Instant>,
    sem: Option<Arc<Semaphore>>,
}

/// Held for the duration of the guarded request; dropping it releases the
/// concurrency permit (interval slots are consumed, not released).
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, concurrency: Option<u32>) -> Self {
        let sem = concurrency.map(|c| Arc::new(Semaphore::new(c.max(1) as usize)));
        Self {
            inner: Arc::new(Inner {
                min_interval,
                next_slot: Mutex::new(Instant::now()),
                sem,
            }),
        }
    }

    /// Wait for the next request slot. The slot is reserved atomically under
    /// the lock, then the wait happens outside it so other callers can queue
    /// up behind later slots in the meantime.
    pub async fn acquire(&self) -> RatePermit {
        let permit = match &self.inner.sem {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore closed"),
            ),
            None => None,
        };

        let wait = {
            let mut next = self.inner.next_slot.lock().await;
            let now = Instant::now();
            let wait = next.saturating_duration_since(now);
            *next = now.max(*next) + self.inner.min_interval;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        RatePermit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_acquires_respect_interval() {
        let interval = Duration::from_millis(20);
        let limiter = RateLimiter::new(interval, None);
        let start = Instant::now();
        for _ in 0..4 {
            let _permit = limiter.acquire().await;
        }
        // 4 calls leave 3 full intervals between them
        assert!(start.elapsed() >= interval * 3);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_the_interval() {
        let interval = Duration::from_millis(15);
        let limiter = RateLimiter::new(interval, Some(4));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // Parallel workers still pay the global interval between slots
        assert!(start.elapsed() >= interval * 3);
    }

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5), None);
        let start = Instant::now();
        let _permit = limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
