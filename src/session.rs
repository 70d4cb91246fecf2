// src/session.rs

use lazy_static::lazy_static;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::{MAX_BURST_REQUESTS, REQUESTS_PER_SECOND};

lazy_static! {
    static ref SHARED_SESSION: FeedSession = FeedSession::new();
}

/// Process-wide HTTP client shared by every feed request, behind one rate limiter.
pub struct FeedSession {
    client: Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl FeedSession {
    fn new() -> Self {
        FeedSession {
            client: Client::new(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(REQUESTS_PER_SECOND, MAX_BURST_REQUESTS))),
        }
    }

    pub async fn send_request(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Response, reqwest::Error> {
        let session = &*SHARED_SESSION;

        session.rate_limiter.lock().await.acquire().await;

        let mut request = session.client.get(url).timeout(timeout);
        if let Some(key) = api_key {
            request = request.query(&[("apiKey", key)]);
        }
        request.send().await
    }
}

/// Token bucket: `burst` requests at once, refilled at `requests_per_second`.
pub struct RateLimiter {
    tokens: u32,
    burst: u32,
    last_refill_time: Instant,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        RateLimiter {
            tokens: burst,
            burst,
            last_refill_time: Instant::now(),
            refill_interval: Duration::from_secs(1) / requests_per_second.max(1),
        }
    }

    pub fn available(&self) -> u32 {
        self.tokens
    }

    pub async fn acquire(&mut self) {
        while self.tokens == 0 {
            let now = Instant::now();
            let elapsed = now - self.last_refill_time;

            if elapsed >= self.refill_interval {
                let refill_count = (elapsed.as_secs_f32() / self.refill_interval.as_secs_f32()) as u32;
                self.tokens = std::cmp::min(self.tokens + refill_count, self.burst);
                self.last_refill_time = now;
            } else {
                sleep(self.refill_interval - elapsed).await;
            }
        }

        self.tokens -= 1;
    }
}
