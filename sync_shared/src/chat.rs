//! Chat types.
//!
//! Messages are immutable once received and ordered by receipt, not by any
//! causal clock. The rate limiter runs client-side, before a message ever
//! reaches the channel, so one chatty consumer cannot flood the transport.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Maximum message length in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// Rate limit: messages per window.
pub const RATE_LIMIT_MESSAGES: u32 = 5;
/// Rate limit: window duration.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// A received chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: PlayerId,
    pub sender_name: String,
    pub body: String,
    /// Receipt time in session-clock milliseconds.
    pub timestamp_ms: f64,
}

impl ChatMessage {
    pub fn is_valid_length(&self) -> bool {
        self.body.len() <= MAX_MESSAGE_LENGTH
    }
}

/// Sliding-window rate limiter for outbound chat.
///
/// Admission and recording are one operation: `allow` prunes send times
/// that have aged out of the window, then either records the new send or
/// refuses it.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    sends: VecDeque<Instant>,
    max_in_window: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_in_window: u32, window: Duration) -> Self {
        Self {
            sends: VecDeque::with_capacity(max_in_window as usize),
            max_in_window,
            window,
        }
    }

    /// Admits or refuses a send at this instant, recording it if admitted.
    pub fn allow(&mut self) -> bool {
        self.prune(Instant::now());
        if self.sends.len() as u32 >= self.max_in_window {
            return false;
        }
        self.sends.push_back(Instant::now());
        true
    }

    /// Sends still admissible in the current window.
    pub fn remaining(&mut self) -> u32 {
        self.prune(Instant::now());
        self.max_in_window - self.sends.len() as u32
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.sends.front() {
            if now.duration_since(oldest) < self.window {
                break;
            }
            self.sends.pop_front();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_MESSAGES, RATE_LIMIT_WINDOW)
    }
}
