//! TCP connection tracking
//!
//! A session owns two trackers, one per endpoint. Each segment is
//! classified into a sent-flavor event for the talker and a recv-flavor
//! event for the listener; the handler for each tracker's current state
//! runs its event method, and the shared default action applies the
//! transition table. Anomalies become telemetry events and action flags,
//! never errors.

pub mod events;
pub mod segment;
pub mod session;
pub mod state;
pub mod tracker;

pub use events::{TcpEvent, TcpEventLogger};
pub use segment::{TcpFlags, TcpSegmentDescriptor};
pub use session::{TcpSession, TrackerSide};
pub use state::TcpStateMachine;
pub use tracker::{TcpState, TcpStreamEvent, TcpStreamTracker};

/// Segment direction relative to the connection initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiator to responder.
    ToServer,
    /// Responder to initiator.
    ToClient,
}
