//! TCP segment descriptor
//!
//! The classified view of one segment the state machine consumes: header
//! fields, direction, capture time, and the action flags handlers set for
//! the coordinator to act on after dispatch.

use std::time::Duration;

use super::Direction;

/// TCP header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
            ece: flags & 0x40 != 0,
            cwr: flags & 0x80 != 0,
        }
    }

    pub fn to_u8(self) -> u8 {
        let mut flags = 0u8;
        if self.fin {
            flags |= 0x01;
        }
        if self.syn {
            flags |= 0x02;
        }
        if self.rst {
            flags |= 0x04;
        }
        if self.psh {
            flags |= 0x08;
        }
        if self.ack {
            flags |= 0x10;
        }
        if self.urg {
            flags |= 0x20;
        }
        if self.ece {
            flags |= 0x40;
        }
        if self.cwr {
            flags |= 0x80;
        }
        flags
    }

    pub fn is_syn_only(self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(self) -> bool {
        self.syn && self.ack
    }
}

/// One classified TCP segment.
#[derive(Debug, Clone)]
pub struct TcpSegmentDescriptor {
    pub direction: Direction,
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub win: u16,
    /// Payload bytes carried by the segment.
    pub dsize: u16,
    /// TCP timestamp option value, when present.
    pub ts_val: Option<u32>,
    /// Capture time, for flow expiry bookkeeping.
    pub timestamp: Duration,
    drop: bool,
}

impl TcpSegmentDescriptor {
    pub fn new(
        direction: Direction,
        flags: TcpFlags,
        seq: u32,
        ack: u32,
        win: u16,
        dsize: u16,
        timestamp: Duration,
    ) -> Self {
        Self {
            direction,
            flags,
            seq,
            ack,
            win,
            dsize,
            ts_val: None,
            timestamp,
            drop: false,
        }
    }

    pub fn with_timestamp_option(mut self, ts_val: u32) -> Self {
        self.ts_val = Some(ts_val);
        self
    }

    /// Sequence number just past this segment's payload.
    pub fn end_seq(&self) -> u32 {
        self.seq.wrapping_add(self.dsize as u32)
    }

    pub(crate) fn mark_for_drop(&mut self) {
        self.drop = true;
    }

    pub fn marked_for_drop(&self) -> bool {
        self.drop
    }
}
