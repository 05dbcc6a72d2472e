//! Token-bucket rate limiting for webhook and outbound-call traffic.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// 429 response for the plain-JSON API surface
pub struct RateLimitExceeded;

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please slow down.",
        )
            .into_response()
    }
}

/// Simple token bucket checked in-handler.
///
/// Each call class carries its own bucket so a burst of inbound webhooks
/// cannot starve outbound call placement, and vice versa.
pub struct TokenBucket {
    tokens: Arc<tokio::sync::Mutex<f64>>,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Arc<tokio::sync::Mutex<std::time::Instant>>,
}

impl TokenBucket {
    /// `refill_rate` is tokens per second
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: Arc::new(tokio::sync::Mutex::new(max_tokens)),
            max_tokens,
            refill_rate,
            last_refill: Arc::new(tokio::sync::Mutex::new(std::time::Instant::now())),
        }
    }

    /// Try to consume a token, returns true if successful
    pub async fn try_consume(&self) -> bool {
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;

        let now = std::time::Instant::now();
        let elapsed = now.duration_since(*last_refill).as_secs_f64();
        *tokens = (*tokens + elapsed * self.refill_rate).min(self.max_tokens);
        *last_refill = now;

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        *self.tokens.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_bucket_consumption() {
        let bucket = TokenBucket::new(5.0, 1.0);

        for _ in 0..5 {
            assert!(bucket.try_consume().await);
        }
        assert!(!bucket.try_consume().await);
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let bucket = TokenBucket::new(2.0, 10.0);

        assert!(bucket.try_consume().await);
        assert!(bucket.try_consume().await);
        assert!(!bucket.try_consume().await);

        // 200ms at 10 tokens/sec is enough for one more
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(bucket.try_consume().await);
    }

    #[tokio::test]
    async fn test_token_bucket_available() {
        let bucket = TokenBucket::new(10.0, 1.0);
        assert_eq!(bucket.available_tokens().await, 10.0);

        bucket.try_consume().await;
        assert_eq!(bucket.available_tokens().await, 9.0);
    }
}
