//! Stream telemetry
//!
//! The state machine reports anomalies as named events; the logger
//! collects them per session for the embedder's alert sink, deduplicating
//! repeats.

use tracing::debug;

/// Anomalies the TCP state machine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpEvent {
    SynOnEst,
    DataOnClosed,
    DataAfterReset,
    DataAfterRstRcvd,
    BadRst,
    WindowSlam,
    RepeatedSyn,
}

/// Per-session event collector.
#[derive(Debug, Default)]
pub struct TcpEventLogger {
    events: Vec<TcpEvent>,
}

impl TcpEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tcp_event(&mut self, event: TcpEvent) {
        if !self.events.contains(&event) {
            debug!(?event, "tcp event");
            self.events.push(event);
        }
    }

    pub fn has(&self, event: TcpEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn events(&self) -> &[TcpEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
