//! Test support: minimal codecs and frame builders.
//!
//! The crate ships no concrete codecs, so the end-to-end scenarios bring
//! their own: just enough Ethernet/IPv4/IPv6/UDP/TCP/GRE to exercise the
//! decode, encode, and format pipelines.

#![allow(dead_code)]

use shrike::codec::registry::CodecRegistry;
use shrike::codec::{Codec, CodecApi, DecodeResult, EncBuffer, EncState, FINISHED_DECODE};
use shrike::packet::{
    CaptureHeader, Packet, DECODE_UNSURE_ENCAP, PROTO_BIT_ETH, PROTO_BIT_IP, PROTO_BIT_IP6,
    PROTO_BIT_TCP, PROTO_BIT_UDP,
};
use shrike::thread::ThreadCtx;

pub const DLT_EN10MB: i32 = 1;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

pub const PROTO_ETH: u8 = 1;
pub const PROTO_IP4: u8 = 2;
pub const PROTO_IP6: u8 = 3;
pub const PROTO_UDP: u8 = 4;
pub const PROTO_TCP: u8 = 5;
pub const PROTO_GRE: u8 = 6;

pub const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0xaa, 0xbb, 0x01];
pub const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0xaa, 0xbb, 0x02];

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

pub struct EthCodec;

impl Codec for EthCodec {
    fn name(&self) -> &'static str {
        "eth"
    }

    fn proto_id(&self) -> u8 {
        PROTO_ETH
    }

    fn data_link_types(&self, dlts: &mut Vec<i32>) {
        dlts.push(DLT_EN10MB);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 14 {
            return None;
        }
        packet.proto_bits |= PROTO_BIT_ETH;
        let ethertype = u16::from_be_bytes([raw[12], raw[13]]);
        Some(DecodeResult {
            lyr_len: 14,
            next_prot_id: ethertype,
        })
    }

    fn encode(&self, enc: &mut EncState<'_>, buf: &mut EncBuffer<'_>, orig: &[u8]) -> bool {
        let Some(hdr) = buf.alloc(14) else {
            return false;
        };
        if enc.forward() {
            hdr.copy_from_slice(&orig[..14]);
        } else {
            hdr[..6].copy_from_slice(&orig[6..12]);
            hdr[6..12].copy_from_slice(&orig[..6]);
            hdr[12..14].copy_from_slice(&orig[12..14]);
            if let Some(mac) = enc.dst_mac {
                hdr[..6].copy_from_slice(&mac);
            }
        }
        true
    }

    fn update(&self, _packet: &mut Packet, _layer: usize, len: &mut u32) {
        *len += 14;
    }
}

pub struct Ipv4Codec;

impl Codec for Ipv4Codec {
    fn name(&self) -> &'static str {
        "ipv4"
    }

    fn proto_id(&self) -> u8 {
        PROTO_IP4
    }

    fn protocol_ids(&self, ids: &mut Vec<u16>) {
        ids.push(ETHERTYPE_IPV4);
        ids.push(4);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 20 || raw[0] >> 4 != 4 {
            return None;
        }
        let ihl = ((raw[0] & 0x0F) as usize) * 4;
        if ihl < 20 || raw.len() < ihl {
            return None;
        }
        if packet.proto_bits & (PROTO_BIT_IP | PROTO_BIT_IP6) != 0 {
            packet.encapsulations += 1;
        }
        packet.proto_bits |= PROTO_BIT_IP;
        Some(DecodeResult {
            lyr_len: ihl as u16,
            next_prot_id: raw[9] as u16,
        })
    }

    fn encode(&self, enc: &mut EncState<'_>, buf: &mut EncBuffer<'_>, orig: &[u8]) -> bool {
        let total = (buf.len() + 20) as u16;
        let Some(hdr) = buf.alloc(20) else {
            return false;
        };
        hdr.fill(0);
        hdr[0] = 0x45;
        hdr[2..4].copy_from_slice(&total.to_be_bytes());
        hdr[4..6].copy_from_slice(&enc.ip_id.to_be_bytes());
        hdr[8] = 64;
        hdr[9] = orig[9];
        if enc.forward() {
            hdr[12..16].copy_from_slice(&orig[12..16]);
            hdr[16..20].copy_from_slice(&orig[16..20]);
        } else {
            hdr[12..16].copy_from_slice(&orig[16..20]);
            hdr[16..20].copy_from_slice(&orig[12..16]);
        }
        let cksum = ipv4_checksum(hdr);
        hdr[10..12].copy_from_slice(&cksum.to_be_bytes());
        true
    }

    fn update(&self, packet: &mut Packet, layer: usize, len: &mut u32) {
        let lyr_len = packet.layers[layer].length as u32;
        let total = (*len + lyr_len) as u16;
        let hdr = packet.layer_bytes_mut(layer);
        hdr[2..4].copy_from_slice(&total.to_be_bytes());
        hdr[10] = 0;
        hdr[11] = 0;
        let cksum = ipv4_checksum(hdr);
        hdr[10..12].copy_from_slice(&cksum.to_be_bytes());
        *len += lyr_len;
    }
}

pub struct Ipv6Codec;

impl Codec for Ipv6Codec {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn proto_id(&self) -> u8 {
        PROTO_IP6
    }

    fn protocol_ids(&self, ids: &mut Vec<u16>) {
        ids.push(ETHERTYPE_IPV6);
        ids.push(41);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 40 || raw[0] >> 4 != 6 {
            return None;
        }
        if packet.proto_bits & (PROTO_BIT_IP | PROTO_BIT_IP6) != 0 {
            packet.encapsulations += 1;
        }
        packet.proto_bits |= PROTO_BIT_IP6;
        Some(DecodeResult {
            lyr_len: 40,
            next_prot_id: raw[6] as u16,
        })
    }

    fn update(&self, packet: &mut Packet, layer: usize, len: &mut u32) {
        let payload = *len as u16;
        let hdr = packet.layer_bytes_mut(layer);
        hdr[4..6].copy_from_slice(&payload.to_be_bytes());
        *len += 40;
    }
}

pub struct UdpCodec;

impl Codec for UdpCodec {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn proto_id(&self) -> u8 {
        PROTO_UDP
    }

    fn protocol_ids(&self, ids: &mut Vec<u16>) {
        ids.push(17);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 8 {
            return None;
        }
        packet.proto_bits |= PROTO_BIT_UDP;
        Some(DecodeResult {
            lyr_len: 8,
            next_prot_id: FINISHED_DECODE,
        })
    }

    fn update(&self, packet: &mut Packet, layer: usize, len: &mut u32) {
        let total = (*len + 8) as u16;
        let hdr = packet.layer_bytes_mut(layer);
        hdr[4..6].copy_from_slice(&total.to_be_bytes());
        *len += 8;
    }
}

pub struct TcpCodec;

impl Codec for TcpCodec {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn proto_id(&self) -> u8 {
        PROTO_TCP
    }

    fn protocol_ids(&self, ids: &mut Vec<u16>) {
        ids.push(6);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 20 {
            return None;
        }
        let doff = ((raw[12] >> 4) as usize) * 4;
        if doff < 20 || raw.len() < doff {
            return None;
        }
        packet.proto_bits |= PROTO_BIT_TCP;
        Some(DecodeResult {
            lyr_len: doff as u16,
            next_prot_id: FINISHED_DECODE,
        })
    }

    fn encode(&self, enc: &mut EncState<'_>, buf: &mut EncBuffer<'_>, orig: &[u8]) -> bool {
        let Some(hdr) = buf.alloc(20) else {
            return false;
        };
        hdr.fill(0);
        // a response answers the sender, so the ports swap
        hdr[0..2].copy_from_slice(&orig[2..4]);
        hdr[2..4].copy_from_slice(&orig[0..2]);

        let orig_seq = u32::from_be_bytes([orig[4], orig[5], orig[6], orig[7]]);
        let orig_ack = u32::from_be_bytes([orig[8], orig[9], orig[10], orig[11]]);
        let orig_flags = orig[13];

        // RFC 793: seq from their ack, ack covers their segment
        if orig_flags & 0x10 != 0 {
            hdr[4..8].copy_from_slice(&orig_ack.to_be_bytes());
        }
        let syn_fin = (orig_flags & 0x01) + ((orig_flags >> 1) & 0x01);
        let ack = orig_seq
            .wrapping_add(enc.p.dsize as u32)
            .wrapping_add(syn_fin as u32);
        hdr[8..12].copy_from_slice(&ack.to_be_bytes());

        hdr[12] = 0x50;
        hdr[13] = 0x14; // RST|ACK
        true
    }

    fn update(&self, packet: &mut Packet, layer: usize, len: &mut u32) {
        *len += packet.layers[layer].length as u32;
    }
}

/// Tunnel codec standing in for the unverifiable-encapsulation path: it
/// flags the packet and hands off to whatever protocol its header names.
pub struct GreCodec;

impl Codec for GreCodec {
    fn name(&self) -> &'static str {
        "gre"
    }

    fn proto_id(&self) -> u8 {
        PROTO_GRE
    }

    fn protocol_ids(&self, ids: &mut Vec<u16>) {
        ids.push(47);
    }

    fn decode(&self, raw: &[u8], packet: &mut Packet) -> Option<DecodeResult> {
        if raw.len() < 4 {
            return None;
        }
        packet.decode_flags |= DECODE_UNSURE_ENCAP;
        Some(DecodeResult {
            lyr_len: 4,
            next_prot_id: u16::from_be_bytes([raw[2], raw[3]]),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry setup
// ---------------------------------------------------------------------------

fn drop_codec(cd: Box<dyn Codec>) {
    drop(cd);
}

pub fn eth_api() -> CodecApi {
    CodecApi::new("eth", "0.1", || Box::new(EthCodec), drop_codec)
}

pub fn ipv4_api() -> CodecApi {
    CodecApi::new("ipv4", "0.1", || Box::new(Ipv4Codec), drop_codec)
}

pub fn ipv6_api() -> CodecApi {
    CodecApi::new("ipv6", "0.1", || Box::new(Ipv6Codec), drop_codec)
}

pub fn udp_api() -> CodecApi {
    CodecApi::new("udp", "0.1", || Box::new(UdpCodec), drop_codec)
}

pub fn tcp_api() -> CodecApi {
    CodecApi::new("tcp", "0.1", || Box::new(TcpCodec), drop_codec)
}

pub fn gre_api() -> CodecApi {
    CodecApi::new("gre", "0.1", || Box::new(GreCodec), drop_codec)
}

// Registered codec indices (the default lands at 0).
pub const IDX_ETH: u8 = 0;
pub const IDX_IP4: u8 = 1;
pub const IDX_IP6: u8 = 2;
pub const IDX_UDP: u8 = 3;
pub const IDX_TCP: u8 = 4;
pub const IDX_GRE: u8 = 5;

/// Registry with the full test codec set, and a thread bound to Ethernet.
pub fn setup() -> (CodecRegistry, ThreadCtx) {
    let mut reg = CodecRegistry::new();
    reg.register(ipv4_api()).unwrap();
    reg.register(ipv6_api()).unwrap();
    reg.register(udp_api()).unwrap();
    reg.register(tcp_api()).unwrap();
    reg.register(gre_api()).unwrap();
    reg.instantiate_all(eth_api()).unwrap();

    let mut thread = ThreadCtx::new();
    reg.thread_init(DLT_EN10MB, &mut thread).unwrap();
    (reg, thread)
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

pub fn ipv4_checksum(hdr: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut i = 0;
    while i + 1 < hdr.len() {
        if i != 10 {
            sum += u32::from(u16::from_be_bytes([hdr[i], hdr[i + 1]]));
        }
        i += 2;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn eth_header(ethertype: u16) -> Vec<u8> {
    let mut hdr = Vec::with_capacity(14);
    hdr.extend_from_slice(&DST_MAC);
    hdr.extend_from_slice(&SRC_MAC);
    hdr.extend_from_slice(&ethertype.to_be_bytes());
    hdr
}

pub fn ipv4_header(proto: u8, payload_len: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; 20];
    hdr[0] = 0x45;
    let total = 20 + payload_len;
    hdr[2..4].copy_from_slice(&total.to_be_bytes());
    hdr[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
    hdr[8] = 64;
    hdr[9] = proto;
    hdr[12..16].copy_from_slice(&[10, 0, 0, 1]);
    hdr[16..20].copy_from_slice(&[10, 0, 0, 2]);
    let cksum = ipv4_checksum(&hdr);
    hdr[10..12].copy_from_slice(&cksum.to_be_bytes());
    hdr
}

pub fn ipv6_header(next_header: u8, payload_len: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; 40];
    hdr[0] = 0x60;
    hdr[4..6].copy_from_slice(&payload_len.to_be_bytes());
    hdr[6] = next_header;
    hdr[7] = 64;
    hdr[8..24].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    hdr[24..40].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
    hdr
}

pub fn udp_header(src_port: u16, dst_port: u16, payload_len: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; 8];
    hdr[0..2].copy_from_slice(&src_port.to_be_bytes());
    hdr[2..4].copy_from_slice(&dst_port.to_be_bytes());
    hdr[4..6].copy_from_slice(&(8 + payload_len).to_be_bytes());
    hdr
}

pub fn tcp_header(src_port: u16, dst_port: u16, flags: u8, seq: u32, ack: u32) -> Vec<u8> {
    let mut hdr = vec![0u8; 20];
    hdr[0..2].copy_from_slice(&src_port.to_be_bytes());
    hdr[2..4].copy_from_slice(&dst_port.to_be_bytes());
    hdr[4..8].copy_from_slice(&seq.to_be_bytes());
    hdr[8..12].copy_from_slice(&ack.to_be_bytes());
    hdr[12] = 0x50;
    hdr[13] = flags;
    hdr[14..16].copy_from_slice(&8192u16.to_be_bytes());
    hdr
}

/// 60-byte Ethernet/IPv4/UDP frame with an 18-byte payload.
pub fn build_udp_frame() -> Vec<u8> {
    let payload = b"telemetry-beacon!!";
    let mut frame = eth_header(ETHERTYPE_IPV4);
    frame.extend_from_slice(&ipv4_header(17, 8 + payload.len() as u16));
    frame.extend_from_slice(&udp_header(53124, 53, payload.len() as u16));
    frame.extend_from_slice(payload);
    frame
}

/// Ethernet/IPv4/TCP frame carrying `payload`.
pub fn build_tcp_frame(flags: u8, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = eth_header(ETHERTYPE_IPV4);
    frame.extend_from_slice(&ipv4_header(6, 20 + payload.len() as u16));
    frame.extend_from_slice(&tcp_header(41000, 443, flags, seq, ack));
    frame.extend_from_slice(payload);
    frame
}

/// Ethernet frame nesting `n` IPv6 headers, innermost next-header 59.
pub fn build_nested_ipv6_frame(n: usize) -> Vec<u8> {
    let mut frame = eth_header(ETHERTYPE_IPV6);
    for i in 0..n {
        let next = if i + 1 == n { 59 } else { 41 };
        let payload_len = ((n - i - 1) * 40) as u16;
        frame.extend_from_slice(&ipv6_header(next, payload_len));
    }
    frame
}

pub fn capture_header(len: usize) -> CaptureHeader {
    CaptureHeader {
        ts_sec: 1_700_000_000,
        ts_usec: 250_000,
        caplen: len as u32,
        pktlen: len as u32,
        ..Default::default()
    }
}
