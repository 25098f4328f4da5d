//! Protocol codec framework
//!
//! A codec decodes one protocol layer's header, encodes it when a response
//! is synthesized, updates its length/checksum fields after modification,
//! and reformats it for cloned packets. Concrete codecs are supplied by
//! plugins; this crate only defines the contract and the registry that
//! dispatches to them.

pub mod registry;
pub mod stats;

use crate::packet::Packet;

/// Largest IP datagram the encoder will produce.
pub const IP_MAXPACKET: usize = 65535;

/// Headroom reserved in front of the IP datagram for link-layer headers.
pub const LINK_HEADROOM: usize = 512;

/// Backing-buffer capacity of a packet.
pub const PKT_MAX: usize = IP_MAXPACKET + LINK_HEADROOM;

/// Upper bound on decoded layers per packet.
pub const LAYER_MAX: usize = 32;

/// Sentinel protocol id meaning "decoding ended cleanly here".
///
/// Codecs for terminal protocols (UDP, TCP, ...) report it as their next
/// protocol; it never appears in the protocol-id map.
pub const FINISHED_DECODE: u16 = 0xFFFF;

/// IP protocol number for ESP, which gets special trust handling when an
/// unverifiable encapsulation fails to decode.
pub const IPPROTO_ID_ESP: u16 = 50;

/// One decoded header's span within a packet's backing buffer.
///
/// Offsets, not pointers: a layer is only meaningful together with the
/// packet that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Layer {
    /// Tag of the codec that claimed this layer.
    pub proto: u8,
    /// Protocol id that selected this layer's codec.
    pub prot_id: u16,
    /// Offset of the header start within the packet buffer.
    pub start: usize,
    /// Header length in bytes.
    pub length: u16,
}

/// Outcome of a successful `Codec::decode`.
#[derive(Debug, Clone, Copy)]
pub struct DecodeResult {
    /// Bytes consumed by this layer's header.
    pub lyr_len: u16,
    /// Protocol id of the next layer, or [`FINISHED_DECODE`].
    pub next_prot_id: u16,
}

/// Response kinds the encode pipeline can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeType {
    TcpFin,
    TcpRst,
    UnreachNet,
    UnreachHost,
    UnreachPort,
    UnreachFw,
}

// Encode flags. FWD keeps the original direction instead of reversing
// addresses; NET stops a format copy at the innermost IP layer.
pub const ENC_FLAG_FWD: u32 = 0x0001;
pub const ENC_FLAG_SEQ: u32 = 0x0002;
pub const ENC_FLAG_ID: u32 = 0x0004;
pub const ENC_FLAG_NET: u32 = 0x0008;
pub const ENC_FLAG_DEF: u32 = 0x0010;
pub const ENC_FLAG_RAW: u32 = 0x0020;

/// Per-response context handed to each codec's `encode`.
pub struct EncState<'a> {
    /// What is being synthesized.
    pub etype: EncodeType,
    /// `ENC_FLAG_*` bits.
    pub flags: u32,
    /// Index of the layer currently being encoded.
    pub layer: usize,
    /// The packet the response answers.
    pub p: &'a Packet,
    /// Payload bytes already placed at the tail of the buffer.
    pub payload_len: u16,
    /// Fresh IP id drawn from the thread's pool.
    pub ip_id: u16,
    /// Destination MAC override, if the thread has one installed.
    pub dst_mac: Option<[u8; 6]>,
}

impl EncState<'_> {
    pub fn forward(&self) -> bool {
        self.flags & ENC_FLAG_FWD != 0
    }
}

/// Back-to-front encode buffer.
///
/// `off` starts at the end of the scratch slice; each layer allocates its
/// header by decrementing `off`, so after the innermost layer writes first
/// the finished frame occupies `buf[off..]`.
pub struct EncBuffer<'a> {
    buf: &'a mut [u8],
    off: usize,
}

impl<'a> EncBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        let off = buf.len();
        Self { buf, off }
    }

    /// Reserve `n` bytes in front of everything written so far.
    pub fn alloc(&mut self, n: usize) -> Option<&mut [u8]> {
        if n > self.off {
            return None;
        }
        self.off -= n;
        Some(&mut self.buf[self.off..self.off + n])
    }

    /// Bytes written so far (this layer's header onward once `alloc` returns).
    pub fn len(&self) -> usize {
        self.buf.len() - self.off
    }

    pub fn is_empty(&self) -> bool {
        self.off == self.buf.len()
    }

    /// Everything written so far, outermost first.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.off..]
    }

    pub(crate) fn offset(&self) -> usize {
        self.off
    }

    /// Consume the buffer, returning the finished frame.
    pub(crate) fn into_data(self) -> &'a [u8] {
        let Self { buf, off } = self;
        &buf[off..]
    }
}

/// One protocol handler.
///
/// Implementations must be pure functions of their arguments: any mutable
/// codec state has to live per-thread (installed via the api's `tinit`
/// hook) or be immutable, because a single instance serves every worker.
pub trait Codec: Send + Sync {
    /// Stable display name, unique case-insensitively across the registry.
    fn name(&self) -> &'static str;

    /// Tag recorded in each layer this codec claims.
    fn proto_id(&self) -> u8;

    /// Protocol ids this codec wants routed to it.
    fn protocol_ids(&self, _ids: &mut Vec<u16>) {}

    /// Data link types this codec can serve as the entry-point decoder for.
    fn data_link_types(&self, _dlts: &mut Vec<i32>) {}

    /// Parse one header from `raw`. `None` refuses the layer.
    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult>;

    /// Write this layer's header for a synthesized response. `orig` is the
    /// corresponding header of the packet being answered.
    fn encode(&self, _enc: &mut EncState<'_>, _buf: &mut EncBuffer<'_>, _orig: &[u8]) -> bool {
        true
    }

    /// Fix up layer `layer` of `clone` after its raw bytes were copied from
    /// `orig`. Called outermost first so outer headers can account for the
    /// new inner payload.
    fn format(&self, _flags: u32, _orig: &Packet, _clone: &mut Packet, _layer: usize) {}

    /// Recompute length/checksum fields of layer `layer`. `len` carries the
    /// byte count of everything below this layer on entry and must include
    /// this layer's header on return.
    fn update(&self, _packet: &mut Packet, _layer: usize, len: &mut u32) {
        let _ = len;
    }
}

/// Constructor signature codecs register with.
pub type CodecCtor = fn() -> Box<dyn Codec>;

/// Destructor hook; runs before the instance is dropped.
pub type CodecDtor = fn(Box<dyn Codec>);

/// Factory and lifecycle descriptor for one codec.
///
/// Distinct from [`Codec`]: the api is the contract a plugin registers,
/// the codec is the live instance `ctor` produces.
#[derive(Clone, Copy)]
pub struct CodecApi {
    pub name: &'static str,
    pub version: &'static str,
    /// Process-scope init, runs once before construction.
    pub pinit: Option<fn()>,
    /// Process-scope teardown.
    pub pterm: Option<fn()>,
    /// Per-thread init.
    pub tinit: Option<fn()>,
    /// Per-thread teardown.
    pub tterm: Option<fn()>,
    pub ctor: Option<CodecCtor>,
    pub dtor: Option<CodecDtor>,
}

impl CodecApi {
    /// Descriptor with only the mandatory hooks set.
    pub fn new(name: &'static str, version: &'static str, ctor: CodecCtor, dtor: CodecDtor) -> Self {
        Self {
            name,
            version,
            pinit: None,
            pterm: None,
            tinit: None,
            tterm: None,
            ctor: Some(ctor),
            dtor: Some(dtor),
        }
    }
}
