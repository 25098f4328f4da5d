//! Decode pipeline
//!
//! Iteratively peels protocol headers off a captured frame, consulting the
//! protocol-id map after each layer to find the next codec. Decoding never
//! fails in a signalling sense: every frame comes out classified, with
//! anomalies recorded as counters and queued events.

use tracing::debug;

use crate::codec::registry::CodecRegistry;
use crate::codec::stats::{DISCARDS, OTHER_CODECS, TOTAL};
use crate::codec::{Layer, FINISHED_DECODE, IPPROTO_ID_ESP, LAYER_MAX};
use crate::config::DecoderConfig;
use crate::packet::{
    CaptureHeader, DecoderEvent, Packet, DECODE_UNSURE_ENCAP, PKT_TRUST,
};
use crate::thread::ThreadCtx;

// IPv6 extension header protocol numbers, in the order RFC 8200 recommends
// they appear.
const IPPROTO_ID_HOPOPTS: u16 = 0;
const IPPROTO_ID_DSTOPTS: u16 = 60;
const IPPROTO_ID_ROUTING: u16 = 43;
const IPPROTO_ID_FRAGMENT: u16 = 44;
const IPPROTO_ID_AUTH: u16 = 51;

/// Decode `raw` into `packet`.
///
/// On return the packet's layer stack, payload span, flags, and queued
/// events describe the frame; the thread's counters reflect each codec
/// that claimed a layer.
pub fn decode(
    registry: &CodecRegistry,
    thread: &mut ThreadCtx,
    config: &DecoderConfig,
    packet: &mut Packet,
    pkth: CaptureHeader,
    raw: &[u8],
) {
    packet.reset();
    packet.pkth = pkth;
    packet.set_raw(raw);

    let caplen = (pkth.caplen as usize).min(packet.buf().len());
    let mut cursor = 0usize;
    let mut remaining = caplen;
    let mut mapped = thread.grinder();
    let mut prev_prot_id = FINISHED_DECODE;
    let mut capped = false;

    thread.stats.peg(TOTAL);

    loop {
        let Some(codec) = registry.codec(mapped) else {
            break;
        };

        let bytes = &raw[cursor..cursor + remaining];
        let Some(result) = codec.decode(bytes, packet) else {
            break;
        };

        // a codec may never claim more than it was given
        if result.lyr_len as usize > remaining {
            break;
        }

        debug!(
            codec = codec.name(),
            prot_id = prev_prot_id,
            offset = cursor,
            lyr_len = result.lyr_len,
            "decoded layer"
        );

        if packet.num_layers() == LAYER_MAX {
            packet.queue_event(DecoderEvent::TooManyLayers);
            capped = true;
            break;
        }

        packet.layers.push(Layer {
            proto: codec.proto_id(),
            prot_id: prev_prot_id,
            start: cursor,
            length: result.lyr_len,
        });
        thread.stats.peg_codec(mapped);

        cursor += result.lyr_len as usize;
        remaining -= result.lyr_len as usize;
        prev_prot_id = result.next_prot_id;

        if prev_prot_id == FINISHED_DECODE {
            break;
        }

        // an unmapped id has no codec to consult; treat it as a refusal
        mapped = registry.map(prev_prot_id);
        if mapped == 0 {
            break;
        }
    }

    // a codec refused somewhere short of a clean finish
    if prev_prot_id != FINISHED_DECODE && !capped {
        if packet.decode_flags & DECODE_UNSURE_ENCAP == 0 {
            if registry.map(prev_prot_id) != 0 {
                thread.stats.peg(DISCARDS);
            } else {
                thread.stats.peg(OTHER_CODECS);
            }
        } else if prev_prot_id == IPPROTO_ID_ESP {
            // encrypted remainder under an unverifiable tunnel; pass it
            // through rather than flagging a decode failure
            packet.packet_flags |= PKT_TRUST;
        }
    }

    if let Some(max) = config.max_encapsulations {
        if packet.encapsulations > max {
            packet.queue_event(DecoderEvent::MultipleEncapsulation);
        }
    }

    if packet.ip6_extension_count > 0 {
        check_ip6_extension_order(packet);
    }

    packet.data = cursor;
    packet.dsize = remaining as u16;
}

/// Verify IPv6 extension headers were seen in their canonical order.
///
/// Ranks each extension layer and queues an event on any inversion. A
/// destination-options header is allowed both before a routing header and
/// in final position, which the rank spacing accounts for.
fn check_ip6_extension_order(packet: &mut Packet) {
    let ranked: Vec<(u16, u8)> = packet
        .layers
        .iter()
        .filter_map(|lyr| ip6_extension_rank(lyr.prot_id).map(|rank| (lyr.prot_id, rank)))
        .collect();

    let mut last_rank = 0u8;
    let mut bad = false;

    for (i, &(prot_id, rank)) in ranked.iter().enumerate() {
        if rank < last_rank {
            let final_dstopts = prot_id == IPPROTO_ID_DSTOPTS && i == ranked.len() - 1;
            if !final_dstopts {
                bad = true;
                break;
            }
        } else {
            last_rank = rank;
        }
    }

    if bad {
        packet.queue_event(DecoderEvent::BadIpv6ExtensionOrder);
    }
}

fn ip6_extension_rank(prot_id: u16) -> Option<u8> {
    match prot_id {
        IPPROTO_ID_HOPOPTS => Some(1),
        IPPROTO_ID_DSTOPTS => Some(2),
        IPPROTO_ID_ROUTING => Some(3),
        IPPROTO_ID_FRAGMENT => Some(4),
        IPPROTO_ID_AUTH => Some(5),
        IPPROTO_ID_ESP => Some(6),
        _ => None,
    }
}
