//! Packet representation
//!
//! A packet owns its backing byte buffer; decoded layers are recorded as
//! offset/length spans into it, so they stay valid for exactly as long as
//! the packet lives and never alias another allocation.

pub mod context;

use crate::codec::{Layer, LAYER_MAX, PKT_MAX};

/// Capture metadata delivered with each frame by the capture driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureHeader {
    /// Capture timestamp, seconds and microseconds since the epoch.
    pub ts_sec: u64,
    pub ts_usec: u32,
    /// Bytes actually captured.
    pub caplen: u32,
    /// Original wire length.
    pub pktlen: u32,
    pub ingress_index: i32,
    pub egress_index: i32,
    pub ingress_group: i32,
    pub egress_group: i32,
    pub flags: u32,
    pub address_space_id: u32,
    pub opaque: u32,
}

/// Capture-header flag: hardware validated the TCP checksum. Must not
/// survive onto cloned packets.
pub const CAPTURE_FLAG_HW_TCP_CS_GOOD: u32 = 0x0001;

// Packet flags.
pub const PKT_PSEUDO: u32 = 0x0001;
pub const PKT_TRUST: u32 = 0x0002;
pub const PKT_MODIFIED: u32 = 0x0004;
pub const PKT_RESIZED: u32 = 0x0008;

// Decode flags.
pub const DECODE_UNSURE_ENCAP: u32 = 0x0001;

// Protocol presence bits, set by codecs as layers decode.
pub const PROTO_BIT_ETH: u32 = 0x0001;
pub const PROTO_BIT_IP: u32 = 0x0002;
pub const PROTO_BIT_IP6: u32 = 0x0004;
pub const PROTO_BIT_TCP: u32 = 0x0008;
pub const PROTO_BIT_UDP: u32 = 0x0010;
pub const PROTO_BIT_ICMP: u32 = 0x0020;

/// Why a packet was synthesized rather than captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoType {
    /// Reassembled IP datagram.
    Ip,
    /// Reassembled TCP stream segment.
    Tcp,
}

/// Conditions the decode pipeline records instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    TooManyLayers,
    MultipleEncapsulation,
    BadIpv6ExtensionOrder,
}

/// One captured or synthesized frame plus everything decoded from it.
pub struct Packet {
    /// Capture metadata; rewritten when the packet is cloned or resized.
    pub pkth: CaptureHeader,
    /// Decoded layers, outermost first.
    pub layers: Vec<Layer>,
    /// Offset of the payload (first byte past the last layer).
    pub data: usize,
    /// Payload length.
    pub dsize: u16,
    pub decode_flags: u32,
    pub packet_flags: u32,
    pub proto_bits: u32,
    pub pseudo_type: Option<PseudoType>,
    /// Policy the packet is inspected under; clones inherit it.
    pub user_policy_id: i32,
    /// Nested IP-in-IP count, maintained by IP codecs.
    pub encapsulations: u8,
    /// IPv6 extension headers seen, maintained by IP codecs.
    pub ip6_extension_count: u8,
    /// Payload budget left for a rebuilt packet.
    pub max_dsize: u32,
    /// Conditions recorded while decoding this packet.
    pub events: Vec<DecoderEvent>,
    buffer: Vec<u8>,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            pkth: CaptureHeader::default(),
            layers: Vec::with_capacity(LAYER_MAX),
            data: 0,
            dsize: 0,
            decode_flags: 0,
            packet_flags: 0,
            proto_bits: 0,
            pseudo_type: None,
            user_policy_id: 0,
            encapsulations: 0,
            ip6_extension_count: 0,
            max_dsize: 0,
            events: Vec::new(),
            buffer: Vec::new(),
        }
    }

    /// Packet preallocated for the encode path, with a full-size buffer it
    /// keeps for its lifetime.
    pub fn for_encoding() -> Self {
        let mut p = Self::new();
        p.buffer = vec![0; PKT_MAX];
        p
    }

    /// Clear all per-packet state so the allocation can be reused.
    pub fn reset(&mut self) {
        self.pkth = CaptureHeader::default();
        self.layers.clear();
        self.data = 0;
        self.dsize = 0;
        self.decode_flags = 0;
        self.packet_flags = 0;
        self.proto_bits = 0;
        self.pseudo_type = None;
        self.user_policy_id = 0;
        self.encapsulations = 0;
        self.ip6_extension_count = 0;
        self.max_dsize = 0;
        self.events.clear();
        self.buffer.clear();
    }

    /// Install the raw frame, truncating at the buffer cap.
    pub(crate) fn set_raw(&mut self, raw: &[u8]) {
        let take = raw.len().min(PKT_MAX);
        self.buffer.clear();
        self.buffer.extend_from_slice(&raw[..take]);
    }

    /// Copy the leading `len` bytes of another packet's buffer.
    pub(crate) fn copy_raw_from(&mut self, other: &Packet, len: usize) {
        self.buffer.clear();
        self.buffer.extend_from_slice(&other.buffer[..len]);
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Entire backing buffer.
    pub fn buf(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Raw bytes of one decoded layer's header.
    pub fn layer_bytes(&self, i: usize) -> &[u8] {
        let lyr = &self.layers[i];
        &self.buffer[lyr.start..lyr.start + lyr.length as usize]
    }

    pub fn layer_bytes_mut(&mut self, i: usize) -> &mut [u8] {
        let lyr = self.layers[i];
        &mut self.buffer[lyr.start..lyr.start + lyr.length as usize]
    }

    /// Payload past the last decoded layer.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.data..self.data + self.dsize as usize]
    }

    /// Index of the innermost IP layer, if any.
    pub fn inner_ip_layer(&self) -> Option<usize> {
        self.layers.iter().rposition(|l| is_ip_prot_id(l.prot_id))
    }

    /// Record a decode anomaly for downstream inspection.
    pub fn queue_event(&mut self, event: DecoderEvent) {
        self.events.push(event);
    }

    pub fn has_event(&self, event: DecoderEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn is_pseudo(&self) -> bool {
        self.packet_flags & PKT_PSEUDO != 0
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// Protocol ids that select an IP codec: the IPv4/IPv6 ethertypes and the
/// IP-in-IP protocol numbers.
fn is_ip_prot_id(id: u16) -> bool {
    matches!(id, 0x0800 | 0x86DD | 4 | 41)
}
