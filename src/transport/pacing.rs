//! Send pacing.
//!
//! Two gates sit between a lane queue and the wire: the Nagle delay, which
//! holds small messages briefly so they can be coalesced, and a token bucket
//! that caps the send rate. The bucket may go into deficit by one message so
//! a message larger than the bucket can still go out.

use std::time::{Duration, Instant};

use crate::core::constants::SEND_BURST_WINDOW;

/// Action the pacer recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerAction {
    /// Send now.
    SendNow,
    /// Wait until the given instant.
    WaitUntil(Instant),
    /// Nothing queued.
    Idle,
}

/// Nagle timer plus token-bucket rate limiter for one connection.
#[derive(Debug, Clone)]
pub struct SendPacer {
    /// Bytes per second.
    rate: u32,
    /// Available send credit in bytes; negative while in deficit.
    tokens: f64,
    last_refill: Instant,
    nagle: Duration,
    /// When queued data stops waiting for more to coalesce with.
    nagle_deadline: Option<Instant>,
    flush_requested: bool,
}

impl SendPacer {
    /// Create a pacer with a full bucket.
    pub fn new(rate: u32, nagle: Duration, now: Instant) -> Self {
        let rate = rate.max(1);
        Self {
            rate,
            tokens: Self::capacity_for(rate),
            last_refill: now,
            nagle,
            nagle_deadline: None,
            flush_requested: false,
        }
    }

    fn capacity_for(rate: u32) -> f64 {
        f64::from(rate) * SEND_BURST_WINDOW.as_secs_f64()
    }

    /// Current rate in bytes per second.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Change the rate. Banked credit is clipped to the new capacity.
    pub fn set_rate(&mut self, rate: u32) {
        self.rate = rate.max(1);
        self.tokens = self.tokens.min(Self::capacity_for(self.rate));
    }

    /// Change the Nagle delay.
    pub fn set_nagle(&mut self, nagle: Duration) {
        self.nagle = nagle;
    }

    /// Note that data was queued. Starts the Nagle timer if it is not running.
    pub fn on_queued(&mut self, now: Instant) {
        if self.nagle_deadline.is_none() {
            self.nagle_deadline = Some(now + self.nagle);
        }
    }

    /// Stop waiting for coalescing; everything queued may go now.
    pub fn request_flush(&mut self) {
        self.flush_requested = true;
    }

    /// Note that the queue drained completely.
    pub fn on_drained(&mut self) {
        self.nagle_deadline = None;
        self.flush_requested = false;
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = self.last_refill.max(now);
        let earned = elapsed.as_secs_f64() * f64::from(self.rate);
        self.tokens = (self.tokens + earned).min(Self::capacity_for(self.rate));
    }

    /// Whether the rate limiter has credit right now.
    pub fn has_credit(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens > 0.0
    }

    /// Charge `bytes` against the bucket.
    pub fn on_sent(&mut self, bytes: usize, now: Instant) {
        self.refill(now);
        self.tokens -= bytes as f64;
    }

    /// What to do about queued data.
    pub fn poll(&mut self, now: Instant, has_data: bool) -> PacerAction {
        if !has_data {
            return PacerAction::Idle;
        }

        if !self.flush_requested {
            if let Some(deadline) = self.nagle_deadline {
                if now < deadline {
                    return PacerAction::WaitUntil(deadline);
                }
            }
        }

        if self.has_credit(now) {
            PacerAction::SendNow
        } else {
            let deficit = -self.tokens + 1.0;
            let wait = Duration::from_secs_f64(deficit / f64::from(self.rate));
            PacerAction::WaitUntil(now + wait)
        }
    }
}
