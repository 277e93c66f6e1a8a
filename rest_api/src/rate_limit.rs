// rest_api/src/rate_limit.rs
// Per-client token buckets keyed by peer IP, plus the task that forgets idle clients.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct LimiterSettings {
    pub enabled: bool,
    /// Sustained requests per second.
    pub rps: f64,
    pub burst: u32,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: f64::from(burst),
            updated: now,
        }
    }

    fn try_take(&mut self, rps: f64, burst: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(f64::from(burst));
        self.updated = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Shared limiter state. Clones share the same client table.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    settings: Arc<LimiterSettings>,
    clients: Arc<Mutex<HashMap<IpAddr, Client>>>,
}

impl RateLimiter {
    pub fn new(settings: LimiterSettings) -> Self {
        RateLimiter {
            settings: Arc::new(settings),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub async fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now()).await
    }

    pub async fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let LimiterSettings { rps, burst, .. } = *self.settings;
        let mut clients = self.clients.lock().await;
        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: TokenBucket::full(burst, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.try_take(rps, burst, now)
    }

    /// Drops clients not seen for longer than the idle timeout. Returns how many went.
    pub async fn sweep(&self, now: Instant) -> usize {
        let idle = self.settings.idle_timeout;
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= idle);
        before - clients.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Spawns the periodic sweep. It runs until the returned handle is stopped.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let limiter = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.settings.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep(Instant::now()).await;
                        if evicted > 0 {
                            debug!("rate limiter evicted {} idle client(s)", evicted);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        SweeperHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// Rejects a client that has used up its bucket. The table lock is released
/// before the request goes further down the stack.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !limiter.enabled() {
        return Ok(next.run(req).await);
    }

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or_else(|| ApiError::Internal("peer address unavailable for rate limiting".to_string()))?;

    if !limiter.allow(ip).await {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn settings() -> LimiterSettings {
        LimiterSettings {
            enabled: true,
            rps: 2.0,
            burst: 4,
            idle_timeout: Duration::from_secs(180),
            sweep_interval: Duration::from_secs(60),
        }
    }

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[tokio::test]
    async fn should_allow_burst_then_refill() {
        let limiter = RateLimiter::new(settings());
        let t0 = Instant::now();
        for _ in 0..4 {
            assert!(limiter.allow_at(A, t0).await);
        }
        assert!(!limiter.allow_at(A, t0).await);
        assert!(limiter.allow_at(B, t0).await);

        assert!(limiter.allow_at(A, t0 + Duration::from_millis(500)).await);
        assert!(!limiter.allow_at(A, t0 + Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn should_sweep_only_idle_clients() {
        let limiter = RateLimiter::new(settings());
        let t0 = Instant::now();
        limiter.allow_at(A, t0).await;
        limiter.allow_at(B, t0 + Duration::from_secs(120)).await;

        assert_eq!(limiter.sweep(t0 + Duration::from_secs(181)).await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_evict_from_background_sweeper() {
        let limiter = RateLimiter::new(settings());
        limiter.allow(A).await;
        let sweeper = limiter.start_sweeper();

        tokio::time::sleep(Duration::from_secs(241)).await;
        assert_eq!(limiter.tracked_clients().await, 0);

        sweeper.stop().await;
    }
}
