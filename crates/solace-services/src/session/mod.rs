//! Session metering and orchestration
//!
//! The client-side half of the reconciliation engine: an explicit state
//! machine over named transport events, consumption meters, and the
//! orchestrator that proposes consumption to the settlement service exactly
//! once per session.

pub mod meter;
pub mod orchestrator;
pub mod state;
pub mod transport;

pub use meter::{MessageMeter, SessionClock};
pub use orchestrator::{CallOutcome, ChatOutcome, SessionOrchestrator, UserCommand};
pub use state::{transition, Effect, EndReason, SessionEvent, SessionState};
pub use transport::{RealtimeTransport, TransportEvent};
