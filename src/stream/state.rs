//! TCP state machine
//!
//! One handler per canonical state. Every handler exposes the thirteen
//! event methods; the defaults do the shared tracker bookkeeping and end
//! in [`default_state_action`], where the transition table is applied.
//! States override only where they diverge.

use super::segment::TcpSegmentDescriptor;
use super::session::{TcpSession, TrackerSide, ACTION_RST};
use super::tracker::{classify_event, TcpState, TcpStreamEvent, TCP_STATE_COUNT};
use super::TcpEvent;

/// The (state, event) transition table.
///
/// `None` means the event does not move this state. Kept as a pure
/// function so the transition graph is testable in isolation from the
/// handlers' side effects.
pub fn transition(state: TcpState, event: TcpStreamEvent) -> Option<TcpState> {
    use TcpState as S;
    use TcpStreamEvent as E;

    Some(match (state, event) {
        (S::Listen | S::Closed, E::SynSent) => S::SynSent,
        (S::Listen | S::Closed, E::SynRecv) => S::SynRecv,
        (S::Listen | S::Closed | S::SynRecv, E::SynAckSent) => S::SynRecv,
        (S::SynSent, E::SynAckRecv) => S::Established,
        (S::SynSent, E::AckSent) => S::Established,
        (S::SynRecv, E::AckRecv) => S::Established,
        (S::SynRecv, E::DataSegRecv) => S::Established,
        (S::SynRecv | S::Established, E::FinSent) => S::FinWait1,
        (S::SynRecv | S::Established, E::FinRecv) => S::CloseWait,
        (S::FinWait1, E::AckRecv) => S::FinWait2,
        (S::FinWait1, E::FinRecv) => S::Closing,
        (S::FinWait2, E::FinRecv) => S::TimeWait,
        (S::CloseWait, E::FinSent) => S::LastAck,
        (S::Closing, E::AckRecv) => S::TimeWait,
        (S::LastAck, E::AckRecv) => S::Closed,
        (_, E::RstSent) => S::Closed,
        (s, E::RstRecv) if s != S::Closed => S::Closed,
        _ => return None,
    })
}

/// Shared tail of every event method: apply the transition table to the
/// acting tracker.
fn default_state_action(
    ssn: &mut TcpSession,
    _tsd: &TcpSegmentDescriptor,
    side: TrackerSide,
    event: TcpStreamEvent,
) -> bool {
    let trk = ssn.tracker_mut(side);
    if let Some(next) = transition(trk.state, event) {
        trk.state = next;
    }
    true
}

/// Handler for one canonical TCP state.
///
/// Event methods receive the session, the segment, and which tracker the
/// event was classified for. They record telemetry and mutate tracker
/// bookkeeping; they never fail.
pub trait TcpStateHandler: Send + Sync {
    fn state(&self) -> TcpState;

    fn syn_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynSent)
    }

    fn syn_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynRecv)
    }

    fn syn_ack_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynAckSent)
    }

    fn syn_ack_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynAckRecv)
    }

    fn ack_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_sent(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::AckSent)
    }

    fn ack_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::AckRecv)
    }

    fn data_seg_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_sent(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::DataSegSent)
    }

    fn data_seg_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::DataSegRecv)
    }

    fn fin_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_sent(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::FinSent)
    }

    fn fin_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::FinRecv)
    }

    fn rst_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).set_rst_pkt_sent();
        default_state_action(ssn, tsd, side, TcpStreamEvent::RstSent)
    }

    fn rst_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        if ssn.tracker_mut(side).update_on_rst_recv(tsd) {
            ssn.update_session_on_rst(tsd);
            ssn.update_perf_base_state(TcpState::Closing);
            ssn.set_pkt_action_flag(ACTION_RST);
            default_state_action(ssn, tsd, side, TcpStreamEvent::RstRecv)
        } else {
            ssn.tel.set_tcp_event(TcpEvent::BadRst);
            true
        }
    }

    /// Runs before dispatch; returning false drops the segment without a
    /// state transition.
    fn do_pre_sm_packet_actions(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor) -> bool {
        ssn.validate_packet_established_session(tsd)
    }

    /// Runs after both trackers were evaluated, against the listener's
    /// final state.
    fn do_post_sm_packet_actions(
        &self,
        ssn: &mut TcpSession,
        tsd: &mut TcpSegmentDescriptor,
        _side: TrackerSide,
    ) -> bool {
        ssn.update_paws_timestamps(tsd);
        ssn.check_for_window_slam(tsd);
        true
    }
}

struct ListenState;

impl TcpStateHandler for ListenState {
    fn state(&self) -> TcpState {
        TcpState::Listen
    }

    fn syn_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        let trk = ssn.tracker_mut(side);
        if trk.iss == 0 {
            trk.init_on_syn_sent(tsd);
        }
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynSent)
    }

    fn syn_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        let trk = ssn.tracker_mut(side);
        if trk.rcv_nxt == 0 {
            trk.init_on_syn_recv(tsd);
        }
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynRecv)
    }
}

struct SynSentState;

impl TcpStateHandler for SynSentState {
    fn state(&self) -> TcpState {
        TcpState::SynSent
    }

    fn syn_ack_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).init_on_synack_recv(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynAckRecv)
    }
}

struct SynRecvState;

impl TcpStateHandler for SynRecvState {
    fn state(&self) -> TcpState {
        TcpState::SynRecv
    }

    fn syn_ack_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).init_on_synack_sent(tsd);
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynAckSent)
    }

    fn ack_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        ssn.mark_established();
        default_state_action(ssn, tsd, side, TcpStreamEvent::AckRecv)
    }

    fn data_seg_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        ssn.mark_established();
        default_state_action(ssn, tsd, side, TcpStreamEvent::DataSegRecv)
    }
}

struct EstablishedState;

impl TcpStateHandler for EstablishedState {
    fn state(&self) -> TcpState {
        TcpState::Established
    }

    fn syn_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tel.set_tcp_event(TcpEvent::SynOnEst);
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynSent)
    }
}

struct FinWait1State;

impl TcpStateHandler for FinWait1State {
    fn state(&self) -> TcpState {
        TcpState::FinWait1
    }
}

struct FinWait2State;

impl TcpStateHandler for FinWait2State {
    fn state(&self) -> TcpState {
        TcpState::FinWait2
    }

    fn data_seg_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);
        ssn.tel.set_tcp_event(TcpEvent::DataOnClosed);
        default_state_action(ssn, tsd, side, TcpStreamEvent::DataSegRecv)
    }
}

struct CloseWaitState;

impl TcpStateHandler for CloseWaitState {
    fn state(&self) -> TcpState {
        TcpState::CloseWait
    }
}

struct ClosingState;

impl TcpStateHandler for ClosingState {
    fn state(&self) -> TcpState {
        TcpState::Closing
    }
}

struct LastAckState;

impl TcpStateHandler for LastAckState {
    fn state(&self) -> TcpState {
        TcpState::LastAck
    }
}

struct TimeWaitState;

impl TcpStateHandler for TimeWaitState {
    fn state(&self) -> TcpState {
        TcpState::TimeWait
    }
}

struct ClosedState;

impl TcpStateHandler for ClosedState {
    fn state(&self) -> TcpState {
        TcpState::Closed
    }

    fn syn_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.check_for_repeated_syn(tsd, side);
        let trk = ssn.tracker_mut(side);
        if trk.iss == 0 {
            trk.init_on_syn_sent(tsd);
        }
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynSent)
    }

    fn syn_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        let timeout = ssn.session_timeout();
        ssn.flow.set_expire(tsd.timestamp, timeout);
        let trk = ssn.tracker_mut(side);
        if trk.rcv_nxt == 0 {
            trk.init_on_syn_recv(tsd);
        }
        default_state_action(ssn, tsd, side, TcpStreamEvent::SynRecv)
    }

    fn data_seg_sent(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_sent(tsd);

        // data when we are no longer accepting any
        if ssn.flow.session_flags & crate::flow::SSNFLAG_RESET != 0 {
            if ssn.tracker(side).is_rst_pkt_sent() {
                ssn.tel.set_tcp_event(TcpEvent::DataAfterReset);
            } else {
                ssn.tel.set_tcp_event(TcpEvent::DataAfterRstRcvd);
            }
        } else {
            ssn.tel.set_tcp_event(TcpEvent::DataOnClosed);
        }
        ssn.mark_packet_for_drop(tsd);

        default_state_action(ssn, tsd, side, TcpStreamEvent::DataSegSent)
    }

    fn fin_recv(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor, side: TrackerSide) -> bool {
        ssn.tracker_mut(side).update_tracker_ack_recv(tsd);

        if ssn.tracker(side).is_rst_pkt_sent() {
            ssn.tel.set_tcp_event(TcpEvent::DataAfterReset);
        } else {
            ssn.tel.set_tcp_event(TcpEvent::DataAfterRstRcvd);
        }

        default_state_action(ssn, tsd, side, TcpStreamEvent::FinRecv)
    }

    fn do_post_sm_packet_actions(
        &self,
        ssn: &mut TcpSession,
        tsd: &mut TcpSegmentDescriptor,
        side: TrackerSide,
    ) -> bool {
        ssn.update_paws_timestamps(tsd);
        ssn.check_for_window_slam(tsd);

        if ssn.tracker(side).tcp_event != Some(TcpStreamEvent::FinRecv) {
            let talker_state = ssn.talker_state(tsd.direction);

            if talker_state == TcpState::TimeWait || !ssn.flow.two_way_traffic() {
                // the last ACK belongs to the session; tear it down once
                // processing completes
                ssn.cleanup_session(tsd);
            }
        }

        true
    }
}

/// Dispatch table of the eleven state handlers.
pub struct TcpStateMachine {
    handlers: [Box<dyn TcpStateHandler>; TCP_STATE_COUNT],
}

impl TcpStateMachine {
    pub fn new() -> Self {
        Self {
            handlers: [
                Box::new(ListenState),
                Box::new(SynSentState),
                Box::new(SynRecvState),
                Box::new(EstablishedState),
                Box::new(FinWait1State),
                Box::new(FinWait2State),
                Box::new(CloseWaitState),
                Box::new(ClosingState),
                Box::new(LastAckState),
                Box::new(TimeWaitState),
                Box::new(ClosedState),
            ],
        }
    }

    fn handler(&self, state: TcpState) -> &dyn TcpStateHandler {
        self.handlers[state as usize].as_ref()
    }

    /// Run one segment through the machine: sent-flavor evaluation on the
    /// talker, recv-flavor on the listener, with the pre action gating
    /// dispatch and the post action running against the listener's final
    /// state.
    pub fn eval(&self, ssn: &mut TcpSession, tsd: &mut TcpSegmentDescriptor) -> bool {
        let (talker, listener) = TrackerSide::from_direction(tsd.direction);

        let talker_event = classify_event(tsd, true);
        ssn.tracker_mut(talker).tcp_event = Some(talker_event);

        let handler = self.handler(ssn.tracker(talker).state);
        if !handler.do_pre_sm_packet_actions(ssn, tsd) {
            return false;
        }
        dispatch(handler, talker_event, ssn, tsd, talker);

        let listener_event = classify_event(tsd, false);
        ssn.tracker_mut(listener).tcp_event = Some(listener_event);

        let handler = self.handler(ssn.tracker(listener).state);
        dispatch(handler, listener_event, ssn, tsd, listener);

        let handler = self.handler(ssn.tracker(listener).state);
        handler.do_post_sm_packet_actions(ssn, tsd, listener);

        true
    }
}

impl Default for TcpStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch(
    handler: &dyn TcpStateHandler,
    event: TcpStreamEvent,
    ssn: &mut TcpSession,
    tsd: &mut TcpSegmentDescriptor,
    side: TrackerSide,
) -> bool {
    use TcpStreamEvent::*;

    match event {
        SynSent => handler.syn_sent(ssn, tsd, side),
        SynRecv => handler.syn_recv(ssn, tsd, side),
        SynAckSent => handler.syn_ack_sent(ssn, tsd, side),
        SynAckRecv => handler.syn_ack_recv(ssn, tsd, side),
        AckSent => handler.ack_sent(ssn, tsd, side),
        AckRecv => handler.ack_recv(ssn, tsd, side),
        DataSegSent => handler.data_seg_sent(ssn, tsd, side),
        DataSegRecv => handler.data_seg_recv(ssn, tsd, side),
        FinSent => handler.fin_sent(ssn, tsd, side),
        FinRecv => handler.fin_recv(ssn, tsd, side),
        RstSent => handler.rst_sent(ssn, tsd, side),
        RstRecv => handler.rst_recv(ssn, tsd, side),
    }
}
