//! Session state machine
//!
//! Explicit states and named events for the session lifecycle, so the
//! termination logic is auditable and testable without a live transport.
//! Billing starts only on `RemoteJoined`; settlement is triggered exactly
//! once on the transition into `Terminating`, and `Ended` absorbs every
//! further event.

use std::fmt;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, transport not yet joined
    Idle,
    /// In the room, waiting for the listener; billing must not start here
    AwaitingRemote,
    /// Listener present; consumption is accruing
    Connected,
    /// Termination triggered; settlement in flight
    Terminating,
    /// Fully closed; settlement was attempted exactly once
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingRemote => write!(f, "awaiting_remote"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Terminating => write!(f, "terminating"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Named events driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Local transport join confirmed
    TransportJoined,
    /// The listener is present in the room
    RemoteJoined,
    /// The listener left the room
    RemoteLeft,
    /// The funding source ran out (live balance watch or pre-flight failure)
    BalanceExhausted,
    /// The user ended the session
    UserEndRequested,
    /// The transport dropped unexpectedly
    NetworkError,
    /// The hard session duration ceiling was reached
    CapReached,
    /// Settlement attempt finished (success or absorbed failure)
    SettlementComplete,
}

/// Side effect the orchestrator must perform on a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do
    None,
    /// Start the billing clock (listener confirmed present)
    StartBilling,
    /// Stop the transport and attempt settlement with accrued consumption
    Settle,
}

/// Apply an event to a state
///
/// Total over all (state, event) pairs; unexpected events are absorbed
/// without effect rather than panicking, because the transport may emit
/// duplicates or stale events around termination.
pub fn transition(state: SessionState, event: SessionEvent) -> (SessionState, Effect) {
    use Effect::*;
    use SessionEvent::*;
    use SessionState::*;

    match (state, event) {
        (Idle, TransportJoined) => (AwaitingRemote, None),

        (AwaitingRemote, RemoteJoined) => (Connected, StartBilling),
        // Ending before the listener joined: nothing accrued, but the
        // settlement path still runs (it settles zero).
        (AwaitingRemote, RemoteLeft | UserEndRequested | NetworkError | BalanceExhausted) => {
            (Terminating, Settle)
        }

        (Connected, RemoteLeft | UserEndRequested | NetworkError | BalanceExhausted | CapReached) => {
            (Terminating, Settle)
        }
        // Duplicate join notifications are harmless.
        (Connected, RemoteJoined) => (Connected, None),

        (Terminating, SettlementComplete) => (Ended, None),
        // Settlement is already in flight; nothing may trigger it twice.
        (Terminating, _) => (Terminating, None),

        // Ended absorbs everything.
        (Ended, _) => (Ended, None),

        // Anything else is a stale or out-of-order event.
        (s, _) => (s, None),
    }
}

/// Why a session ended, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The listener left
    RemoteLeft,
    /// The user ended the session
    UserEnded,
    /// The funding source was exhausted
    BalanceExhausted,
    /// The hard duration ceiling was hit
    CapReached,
    /// The transport dropped
    ConnectionLost,
}
