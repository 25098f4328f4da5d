//! TCP session coordinator
//!
//! Owns the two trackers of a bidirectional flow, drives segments through
//! the state machine, and carries the shared services the state handlers
//! lean on: telemetry, session flags, packet-action flags, and cleanup.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::events::{TcpEvent, TcpEventLogger};
use super::segment::TcpSegmentDescriptor;
use super::state::TcpStateMachine;
use super::tracker::{TcpState, TcpStreamEvent, TcpStreamTracker};
use super::Direction;
use crate::config::StreamConfig;
use crate::flow::{Flow, SSNFLAG_ESTABLISHED, SSNFLAG_RESET, STREAM_STATE_CLOSED,
    STREAM_STATE_ESTABLISHED, STREAM_STATE_SYN};

// Packet-action flags handlers raise for the coordinator.
pub const ACTION_NOTHING: u32 = 0x0000;
pub const ACTION_RST: u32 = 0x0001;
pub const ACTION_DROP: u32 = 0x0002;
pub const ACTION_LWSSN_CLOSED: u32 = 0x0004;

/// Bare acks advertising a window at or below this right after the
/// handshake get flagged as a window slam.
const SLAM_WINDOW_MAX: u16 = 4;

/// Which of a session's two trackers an event acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerSide {
    Client,
    Server,
}

impl TrackerSide {
    /// (talker, listener) for a segment heading `direction`.
    pub fn from_direction(direction: Direction) -> (Self, Self) {
        match direction {
            Direction::ToServer => (TrackerSide::Client, TrackerSide::Server),
            Direction::ToClient => (TrackerSide::Server, TrackerSide::Client),
        }
    }
}

/// One bidirectional TCP flow under tracking.
pub struct TcpSession {
    pub client: TcpStreamTracker,
    pub server: TcpStreamTracker,
    pub flow: Flow,
    pub tel: TcpEventLogger,
    config: Arc<StreamConfig>,
    machine: Arc<TcpStateMachine>,
    pkt_action: u32,
    perf_base_state: TcpState,
}

impl TcpSession {
    pub fn new(flow: Flow, config: Arc<StreamConfig>, machine: Arc<TcpStateMachine>) -> Self {
        Self {
            client: TcpStreamTracker::new(true),
            server: TcpStreamTracker::new(false),
            flow,
            tel: TcpEventLogger::new(),
            config,
            machine,
            pkt_action: ACTION_NOTHING,
            perf_base_state: TcpState::Closed,
        }
    }

    /// Run one classified segment through the state machine.
    ///
    /// Returns false when the segment was dropped before dispatch, either
    /// by the pre-action or because the flow's idle deadline had passed.
    pub fn process_segment(&mut self, tsd: &mut TcpSegmentDescriptor) -> bool {
        self.pkt_action = ACTION_NOTHING;

        if self.flow.expired(tsd.timestamp) {
            debug!("flow expired; cleaning up session");
            self.cleanup_session(tsd);
            return false;
        }

        self.flow.mark_seen(tsd.direction);
        if tsd.flags.syn {
            self.flow.session_state |= STREAM_STATE_SYN;
        }

        let machine = Arc::clone(&self.machine);
        machine.eval(self, tsd)
    }

    pub fn tracker(&self, side: TrackerSide) -> &TcpStreamTracker {
        match side {
            TrackerSide::Client => &self.client,
            TrackerSide::Server => &self.server,
        }
    }

    pub fn tracker_mut(&mut self, side: TrackerSide) -> &mut TcpStreamTracker {
        match side {
            TrackerSide::Client => &mut self.client,
            TrackerSide::Server => &mut self.server,
        }
    }

    /// State of the tracker that produced a segment heading `direction`.
    pub fn talker_state(&self, direction: Direction) -> TcpState {
        let (talker, _) = TrackerSide::from_direction(direction);
        self.tracker(talker).state
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.config.session_timeout)
    }

    /// Action flags raised while processing the current segment.
    pub fn pkt_action(&self) -> u32 {
        self.pkt_action
    }

    pub(crate) fn set_pkt_action_flag(&mut self, flag: u32) {
        self.pkt_action |= flag;
    }

    /// Coarse connection state reported to performance counters.
    pub fn perf_base_state(&self) -> TcpState {
        self.perf_base_state
    }

    pub(crate) fn update_perf_base_state(&mut self, state: TcpState) {
        self.perf_base_state = state;
    }

    pub(crate) fn mark_established(&mut self) {
        self.flow.session_flags |= SSNFLAG_ESTABLISHED;
        self.flow.session_state |= STREAM_STATE_ESTABLISHED;
        self.update_perf_base_state(TcpState::Established);
    }

    pub(crate) fn mark_packet_for_drop(&mut self, tsd: &mut TcpSegmentDescriptor) {
        tsd.mark_for_drop();
        self.set_pkt_action_flag(ACTION_DROP);
    }

    pub(crate) fn update_session_on_rst(&mut self, _tsd: &TcpSegmentDescriptor) {
        self.flow.session_flags |= SSNFLAG_RESET;
    }

    /// A SYN whose sequence disagrees with the talker's original initial
    /// sequence is worth telling the embedder about.
    pub(crate) fn check_for_repeated_syn(&mut self, tsd: &TcpSegmentDescriptor, side: TrackerSide) {
        let trk = self.tracker(side);
        if trk.iss != 0 && tsd.seq != trk.iss {
            self.tel.set_tcp_event(TcpEvent::RepeatedSyn);
        }
    }

    /// Pre-dispatch gate: with strict handshake enforcement on, data on a
    /// flow that never established is dropped outright.
    pub(crate) fn validate_packet_established_session(
        &mut self,
        tsd: &mut TcpSegmentDescriptor,
    ) -> bool {
        if self.config.require_three_way_handshake
            && self.flow.session_flags & SSNFLAG_ESTABLISHED == 0
            && tsd.dsize > 0
            && !tsd.flags.syn
        {
            self.mark_packet_for_drop(tsd);
            return false;
        }
        true
    }

    /// Keep the talker's newest timestamp option value for PAWS checks.
    pub(crate) fn update_paws_timestamps(&mut self, tsd: &TcpSegmentDescriptor) {
        let (talker, _) = TrackerSide::from_direction(tsd.direction);
        if let Some(ts_val) = tsd.ts_val {
            let trk = self.tracker_mut(talker);
            if ts_val >= trk.ts_last {
                trk.ts_last = ts_val;
            }
        }
    }

    /// Flag a handshake-completing ack that slams the advertised window
    /// shut.
    pub(crate) fn check_for_window_slam(&mut self, tsd: &TcpSegmentDescriptor) {
        let (_, listener) = TrackerSide::from_direction(tsd.direction);
        let flags = tsd.flags;
        let trk = self.tracker(listener);

        if flags.ack
            && !flags.syn
            && !flags.rst
            && !flags.fin
            && tsd.dsize == 0
            && tsd.win <= SLAM_WINDOW_MAX
            && trk.state == TcpState::Established
            && trk.tcp_event == Some(TcpStreamEvent::AckRecv)
        {
            self.tel.set_tcp_event(TcpEvent::WindowSlam);
        }
    }

    /// Tear the session down, exactly once per flow.
    pub(crate) fn cleanup_session(&mut self, _tsd: &TcpSegmentDescriptor) {
        if self.flow.session_state & STREAM_STATE_CLOSED == 0 {
            self.flow.session_state |= STREAM_STATE_CLOSED;
            self.set_pkt_action_flag(ACTION_LWSSN_CLOSED);
            self.update_perf_base_state(TcpState::Closed);
            debug!("session closed");
        }
    }

    /// The flow saw a validated reset at some point.
    pub fn was_reset(&self) -> bool {
        self.flow.session_flags & SSNFLAG_RESET != 0
    }
}
