//! Idle shutdown for auto-started servers
//!
//! A launched server has no owner that will ever stop it, so it stops
//! itself once no request has arrived for the configured TTL.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Middleware refreshing the activity stamp on every request
pub async fn track_activity(
    State(tracker): State<Arc<ActivityTracker>>,
    request: Request,
    next: Next,
) -> Response {
    tracker.touch();
    next.run(request).await
}

/// Resolves once nothing has touched `tracker` for `ttl`
pub async fn wait_until_idle(tracker: Arc<ActivityTracker>, ttl: Duration) {
    let interval = (ttl / 10).clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL);
    loop {
        tokio::time::sleep(interval).await;
        let idle = tracker.idle_for();
        if idle >= ttl {
            info!("No requests for {:?}, shutting down", idle);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_until_idle_resolves_after_ttl() {
        let tracker = Arc::new(ActivityTracker::new());
        let started = Instant::now();
        tokio::time::timeout(
            Duration::from_secs(5),
            wait_until_idle(tracker, Duration::from_millis(200)),
        )
        .await
        .expect("idle wait should finish");
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_touch_postpones_idle() {
        let tracker = Arc::new(ActivityTracker::new());
        let waiter = tokio::spawn(wait_until_idle(tracker.clone(), Duration::from_millis(400)));

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tracker.touch();
        }
        assert!(!waiter.is_finished());

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("idle wait should finish once touches stop")
            .unwrap();
    }
}
