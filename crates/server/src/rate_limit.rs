//! Token bucket rate limiter for inbound WebSocket messages

use std::time::Instant;

use voice_journal_config::RateLimitConfig;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: f32,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let tokens = Self::capacity(&config);
        Self {
            config,
            tokens,
            last_refill: Instant::now(),
        }
    }

    fn capacity(config: &RateLimitConfig) -> f32 {
        (config.messages_per_second as f32 * config.burst_multiplier).max(1.0)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        if elapsed > 0.0 {
            let refill = elapsed * self.config.messages_per_second as f32;
            self.tokens = (self.tokens + refill).min(Self::capacity(&self.config));
            self.last_refill = now;
        }
    }

    /// Consume one token if available
    pub fn check_message(&mut self) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(RateLimitError::MessageRateExceeded)
        }
    }

    /// Remaining tokens, for diagnostics
    pub fn remaining(&self) -> f32 {
        self.tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Message rate limit exceeded")]
    MessageRateExceeded,
}
