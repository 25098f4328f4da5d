//! Per-endpoint TCP tracker
//!
//! One tracker per half-flow. It holds the canonical connection state and
//! the sequence/ack/window bookkeeping for its endpoint; the state
//! handlers drive it through the update methods below.

use super::segment::TcpSegmentDescriptor;

/// Canonical TCP connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TcpState {
    Listen = 0,
    SynSent = 1,
    SynRecv = 2,
    Established = 3,
    FinWait1 = 4,
    FinWait2 = 5,
    CloseWait = 6,
    Closing = 7,
    LastAck = 8,
    TimeWait = 9,
    Closed = 10,
}

/// Number of states, for handler tables.
pub const TCP_STATE_COUNT: usize = 11;

/// Events driving the state machine, one per tracker evaluation.
///
/// The talker sees the sent flavor of a segment it produced; the listener
/// sees the recv flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpStreamEvent {
    SynSent,
    SynRecv,
    SynAckSent,
    SynAckRecv,
    AckSent,
    AckRecv,
    DataSegSent,
    DataSegRecv,
    FinSent,
    FinRecv,
    RstSent,
    RstRecv,
}

/// Derive the event for one tracker evaluation from the segment's flag
/// combination. `talker` selects the sent flavor.
pub fn classify_event(tsd: &TcpSegmentDescriptor, talker: bool) -> TcpStreamEvent {
    use TcpStreamEvent::*;

    let flags = tsd.flags;
    if flags.syn && !flags.ack {
        if talker {
            SynSent
        } else {
            SynRecv
        }
    } else if flags.syn && flags.ack {
        if talker {
            SynAckSent
        } else {
            SynAckRecv
        }
    } else if flags.rst {
        if talker {
            RstSent
        } else {
            RstRecv
        }
    } else if flags.fin {
        if talker {
            FinSent
        } else {
            FinRecv
        }
    } else if tsd.dsize > 0 {
        if talker {
            DataSegSent
        } else {
            DataSegRecv
        }
    } else if talker {
        AckSent
    } else {
        AckRecv
    }
}

/// One endpoint's view of the connection.
#[derive(Debug)]
pub struct TcpStreamTracker {
    pub state: TcpState,
    /// Event classified for this tracker on the segment being processed.
    pub tcp_event: Option<TcpStreamEvent>,
    /// Initial sequence number this endpoint sent.
    pub iss: u32,
    /// Initial sequence number this endpoint received.
    pub irs: u32,
    /// Oldest unacknowledged sequence of this endpoint's data.
    pub snd_una: u32,
    /// Next sequence this endpoint will send.
    pub snd_nxt: u32,
    /// Peer's advertised receive window.
    pub snd_wnd: u16,
    /// Next sequence expected from the peer.
    pub rcv_nxt: u32,
    /// Window this endpoint last advertised.
    pub rcv_wnd: u16,
    /// Most recent timestamp option value seen from this endpoint.
    pub ts_last: u32,
    rst_pkt_sent: bool,
    client: bool,
}

impl TcpStreamTracker {
    pub fn new(client: bool) -> Self {
        Self {
            state: TcpState::Closed,
            tcp_event: None,
            iss: 0,
            irs: 0,
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: 0,
            rcv_nxt: 0,
            rcv_wnd: 0,
            ts_last: 0,
            rst_pkt_sent: false,
            client,
        }
    }

    pub fn is_client(&self) -> bool {
        self.client
    }

    pub fn is_rst_pkt_sent(&self) -> bool {
        self.rst_pkt_sent
    }

    pub(crate) fn set_rst_pkt_sent(&mut self) {
        self.rst_pkt_sent = true;
    }

    /// Seed send-side bookkeeping from this endpoint's SYN.
    pub fn init_on_syn_sent(&mut self, tsd: &TcpSegmentDescriptor) {
        self.iss = tsd.seq;
        self.snd_una = tsd.seq;
        self.snd_nxt = tsd.seq.wrapping_add(1);
        self.rcv_wnd = tsd.win;
    }

    /// Seed receive-side bookkeeping from the peer's SYN.
    pub fn init_on_syn_recv(&mut self, tsd: &TcpSegmentDescriptor) {
        self.irs = tsd.seq;
        self.rcv_nxt = tsd.seq.wrapping_add(1);
        self.snd_wnd = tsd.win;
    }

    /// Seed both sides from this endpoint's SYN-ACK.
    pub fn init_on_synack_sent(&mut self, tsd: &TcpSegmentDescriptor) {
        self.iss = tsd.seq;
        self.snd_una = tsd.seq;
        self.snd_nxt = tsd.seq.wrapping_add(1);
        self.rcv_nxt = tsd.ack;
        self.rcv_wnd = tsd.win;
    }

    /// Seed both sides from the peer's SYN-ACK.
    pub fn init_on_synack_recv(&mut self, tsd: &TcpSegmentDescriptor) {
        self.irs = tsd.seq;
        self.rcv_nxt = tsd.seq.wrapping_add(1);
        self.snd_una = tsd.ack;
        self.snd_wnd = tsd.win;
    }

    /// Advance bookkeeping for a segment this endpoint sent.
    pub fn update_tracker_ack_sent(&mut self, tsd: &TcpSegmentDescriptor) {
        let end_seq = tsd.end_seq();
        if seq_gt(end_seq, self.snd_nxt) {
            self.snd_nxt = end_seq;
        }
        if tsd.flags.ack && seq_gt(tsd.ack, self.rcv_nxt) {
            self.rcv_nxt = tsd.ack;
        }
        self.rcv_wnd = tsd.win;
    }

    /// Advance bookkeeping for a segment this endpoint received.
    pub fn update_tracker_ack_recv(&mut self, tsd: &TcpSegmentDescriptor) {
        if tsd.flags.ack && seq_gt(tsd.ack, self.snd_una) {
            self.snd_una = tsd.ack;
        }
        self.snd_wnd = tsd.win;
    }

    /// Validate a received RST against this endpoint's receive window.
    ///
    /// Accepts anything before a baseline exists; afterwards the reset's
    /// sequence must fall inside `[rcv_nxt, rcv_nxt + rcv_wnd)`.
    pub fn update_on_rst_recv(&mut self, tsd: &TcpSegmentDescriptor) -> bool {
        if self.rcv_nxt == 0 {
            return true;
        }
        let wnd = if self.rcv_wnd == 0 {
            1
        } else {
            self.rcv_wnd as u32
        };
        seq_geq(tsd.seq, self.rcv_nxt) && seq_lt(tsd.seq, self.rcv_nxt.wrapping_add(wnd))
    }
}

/// `a` strictly after `b` in sequence space.
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff > 0 && diff < (1 << 31)
}

/// `a` strictly before `b` in sequence space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    seq_gt(b, a)
}

/// `a` at or after `b` in sequence space.
#[inline]
pub fn seq_geq(a: u32, b: u32) -> bool {
    a == b || seq_gt(a, b)
}
