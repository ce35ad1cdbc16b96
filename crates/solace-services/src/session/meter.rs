//! Session meters
//!
//! Consumption tracking while a session is live. Calls meter wall-clock
//! seconds from the instant the listener is confirmed present; chats meter
//! outbound messages, with the free-trial character cap enforced before a
//! message is handed to the transport.

use solace_core::{AppError, AppResult};
use tokio::time::{Duration, Instant};

/// Wall-clock meter for a session
///
/// The clock starts at most once, on the first `start` call (the remote
/// party confirmed present), and drives both billable elapsed time and the
/// hard session ceiling.
#[derive(Debug)]
pub struct SessionClock {
    connected_at: Option<Instant>,
    cap: Duration,
}

impl SessionClock {
    /// Create a clock with the given hard ceiling
    pub fn new(cap_secs: u32) -> Self {
        Self {
            connected_at: None,
            cap: Duration::from_secs(u64::from(cap_secs)),
        }
    }

    /// Start the clock; later calls are ignored
    pub fn start(&mut self, now: Instant) {
        if self.connected_at.is_none() {
            self.connected_at = Some(now);
        }
    }

    /// Whether billing has started
    pub fn started(&self) -> bool {
        self.connected_at.is_some()
    }

    /// Billable elapsed seconds, capped at the ceiling
    ///
    /// Nothing accrues after disconnection is detected because the caller
    /// samples `now` at the moment the end trigger fires.
    pub fn consumed_secs(&self, now: Instant) -> i64 {
        match self.connected_at {
            Some(started) => {
                let elapsed = now.saturating_duration_since(started).min(self.cap);
                elapsed.as_secs() as i64
            }
            None => 0,
        }
    }

    /// Instant at which the hard ceiling forces termination
    pub fn deadline(&self) -> Option<Instant> {
        self.connected_at.map(|t| t + self.cap)
    }
}

/// Outbound message meter for a chat session
#[derive(Debug)]
pub struct MessageMeter {
    sent: u32,
    char_limit: Option<usize>,
}

impl MessageMeter {
    /// Create a meter; `char_limit` applies per message on free trials
    pub fn new(char_limit: Option<usize>) -> Self {
        Self { sent: 0, char_limit }
    }

    /// Validate a message before its pre-flight deduction
    pub fn validate(&self, text: &str) -> AppResult<()> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput("empty message".to_string()));
        }
        if let Some(limit) = self.char_limit {
            if text.chars().count() > limit {
                return Err(AppError::Validation(format!(
                    "message exceeds the {} character limit",
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Record a message actually handed to the transport
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Messages sent so far
    pub fn consumed(&self) -> u32 {
        self.sent
    }
}
