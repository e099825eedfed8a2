use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window request limiter keyed by client identifier.
///
/// Only accepted requests are recorded, so a client that keeps hammering the
/// endpoint while blocked does not extend its own window.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check and record a request from `client_id` at the current instant.
    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    /// Check and record a request from `client_id` at `now`.
    pub fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let timestamps = clients.entry(client_id.to_string()).or_default();

        purge_expired(timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            tracing::info!(client = client_id, "Rate limit exceeded ({} in {:?})", timestamps.len(), self.window);
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Drop clients whose windows have fully expired. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, timestamps| {
            purge_expired(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Remove timestamps older than `now - window`. Timestamps are in arrival order.
fn purge_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(5, Duration::from_secs(60))
    }

    #[test]
    fn test_five_allowed_sixth_rejected() {
        let rl = limiter();
        let t0 = Instant::now();
        for i in 0..5 {
            assert!(rl.allow_at("1.2.3.4", t0 + Duration::from_millis(i * 100)));
        }
        assert!(!rl.allow_at("1.2.3.4", t0 + Duration::from_millis(900)));
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let rl = limiter();
        let t0 = Instant::now();
        for i in 0..5 {
            assert!(rl.allow_at("c", t0 + Duration::from_millis(i * 100)));
        }
        assert!(!rl.allow_at("c", t0 + Duration::from_secs(30)));
        assert!(rl.allow_at("c", t0 + Duration::from_millis(60_050)));
    }

    #[test]
    fn test_rejected_attempts_not_recorded() {
        let rl = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(rl.allow_at("c", t0));
        assert!(rl.allow_at("c", t0 + Duration::from_secs(1)));
        for s in 2..10 {
            assert!(!rl.allow_at("c", t0 + Duration::from_secs(s)));
        }
        // Only the first accepted call has aged out here; a recorded rejection would block this.
        assert!(rl.allow_at("c", t0 + Duration::from_millis(10_500)));
    }

    #[test]
    fn test_clients_are_independent() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(rl.allow_at("a", t0));
        }
        assert!(!rl.allow_at("a", t0));
        assert!(rl.allow_at("b", t0));
    }

    #[test]
    fn test_sweep_removes_idle_clients_only() {
        let rl = limiter();
        let t0 = Instant::now();
        rl.allow_at("idle", t0);
        rl.allow_at("active", t0 + Duration::from_secs(50));
        assert_eq!(rl.tracked_clients(), 2);

        let removed = rl.sweep_at(t0 + Duration::from_secs(61));
        assert_eq!(removed, 1);
        assert_eq!(rl.tracked_clients(), 1);
        assert!(rl.allow_at("active", t0 + Duration::from_secs(62)));
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let rl = RateLimiter::new(0, Duration::from_secs(60));
        assert!(!rl.allow("anyone"));
    }
}
