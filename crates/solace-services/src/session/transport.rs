//! Realtime transport seam
//!
//! The audio/text transport is an opaque external collaborator. The engine
//! depends on it only for room lifecycle events and in-room message
//! delivery; the session correlation id handed to it is the funding
//! decision's room id.

use async_trait::async_trait;
use solace_core::AppResult;
use tokio::sync::mpsc;

/// Events the transport reports for a joined room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The remote party (listener) is present; billing may start
    RemoteJoined,
    /// The remote party left; the session ends
    RemoteLeft,
    /// An in-room text message arrived
    MessageReceived {
        /// Sender's transport user id
        from: String,
        /// Message body
        text: String,
    },
    /// The connection dropped unexpectedly
    ConnectionLost,
}

/// Opaque realtime transport collaborator
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Join a room; the returned receiver yields room events until the
    /// room is left or the connection drops (channel close counts as
    /// `ConnectionLost`)
    async fn join(
        &self,
        room_id: &str,
        room_token: &str,
    ) -> AppResult<mpsc::Receiver<TransportEvent>>;

    /// Deliver an in-room text message
    async fn send_message(&self, room_id: &str, text: &str) -> AppResult<()>;

    /// Leave a room; idempotent
    async fn leave(&self, room_id: &str) -> AppResult<()>;
}
