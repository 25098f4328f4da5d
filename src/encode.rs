//! Encode pipeline
//!
//! The reverse of decoding: walk an existing layer stack to synthesize a
//! response frame, clone a packet for re-inspection, or propagate length
//! and checksum fixups after a modification.
//!
//! Responses are assembled in two explicit passes over the decoded layers:
//! the payload lands at the tail of the thread's scratch buffer first,
//! then each codec writes its header in front of everything inner to it,
//! innermost layer first. No codec re-enters another.

use tracing::debug;

use crate::codec::registry::CodecRegistry;
use crate::codec::{
    EncBuffer, EncState, EncodeType, ENC_FLAG_NET, LINK_HEADROOM,
};
use crate::error::FormatError;
use crate::packet::{
    CaptureHeader, Packet, PseudoType, CAPTURE_FLAG_HW_TCP_CS_GOOD, PKT_MODIFIED, PKT_PSEUDO,
    PKT_RESIZED,
};
use crate::thread::ThreadCtx;

/// Synthesize a response to `p` (a TCP reset, an ICMP unreachable, ...).
///
/// Returns the finished frame, borrowed from the thread's scratch buffer,
/// or `None` when any codec declines to encode its layer. If the thread
/// has an encode-target packet installed, that packet is answered instead
/// of `p`.
pub fn encode_response<'t>(
    registry: &CodecRegistry,
    thread: &'t mut ThreadCtx,
    etype: EncodeType,
    flags: u32,
    p: &Packet,
    payload: Option<&[u8]>,
) -> Option<&'t [u8]> {
    let ip_id = thread.next_ip_id();
    let dst_mac = thread.dst_mac();
    let grinder = thread.grinder();

    let (scratch, override_pkt) = thread.encode_parts();
    let p = match override_pkt {
        Some(override_pkt) => override_pkt,
        None => p,
    };
    if p.num_layers() == 0 {
        return None;
    }

    let mut buf = EncBuffer::new(scratch);

    let mut enc = EncState {
        etype,
        flags,
        layer: 0,
        p,
        payload_len: 0,
        ip_id,
        dst_mac,
    };

    if let Some(payload) = payload {
        let dst = buf.alloc(payload.len())?;
        dst.copy_from_slice(payload);
        enc.payload_len = payload.len() as u16;
    }

    for i in (0..p.num_layers()).rev() {
        enc.layer = i;
        let mapped = if i == 0 {
            grinder
        } else {
            registry.map(p.layers[i].prot_id)
        };
        let codec = registry.codec(mapped)?;
        if !codec.encode(&mut enc, &mut buf, p.layer_bytes(i)) {
            debug!(codec = codec.name(), layer = i, "encode aborted");
            return None;
        }
    }

    Some(buf.into_data())
}

/// Clone `p` into `c` so the clone can re-enter inspection as a
/// pseudo-packet, taking capture metadata from `phdr`.
///
/// Raw bytes are copied up through the innermost decoded layer (or the
/// innermost IP layer when `ENC_FLAG_NET` is set), then each codec's
/// `format` runs outermost first so outer headers account for the new
/// inner payload.
pub fn encode_format_with_daq_info(
    registry: &CodecRegistry,
    thread: &mut ThreadCtx,
    flags: u32,
    p: &Packet,
    c: &mut Packet,
    pseudo_type: PseudoType,
    phdr: &CaptureHeader,
    opaque: u32,
) -> Result<(), FormatError> {
    if p.num_layers() == 0 {
        return Err(FormatError::NoLayers);
    }

    c.reset();

    let num_layers = if flags & ENC_FLAG_NET != 0 {
        p.inner_ip_layer().ok_or(FormatError::NoLayers)? + 1
    } else {
        p.num_layers()
    };

    let last = &p.layers[num_layers - 1];
    let len = last.start + last.length as usize;
    if len > LINK_HEADROOM {
        return Err(FormatError::HeadroomExceeded(len));
    }

    c.copy_raw_from(p, len);
    c.layers.extend_from_slice(&p.layers[..num_layers]);

    // outer to inner, so each IP header sees a finished outer context
    for i in 0..num_layers {
        let mapped = if i == 0 {
            thread.grinder()
        } else {
            registry.map(p.layers[i].prot_id)
        };
        if let Some(codec) = registry.codec(mapped) {
            codec.format(flags, p, c, i);
        }
    }

    c.data = len;
    c.dsize = 0;
    c.max_dsize = (crate::codec::IP_MAXPACKET - len) as u32;
    c.proto_bits = p.proto_bits;
    c.packet_flags |= PKT_PSEUDO;
    c.pseudo_type = Some(pseudo_type);
    c.user_policy_id = p.user_policy_id;

    c.pkth = CaptureHeader {
        ts_sec: p.pkth.ts_sec,
        ts_usec: p.pkth.ts_usec,
        caplen: len as u32,
        pktlen: len as u32,
        ingress_index: phdr.ingress_index,
        egress_index: phdr.egress_index,
        ingress_group: phdr.ingress_group,
        egress_group: phdr.egress_group,
        flags: phdr.flags & !CAPTURE_FLAG_HW_TCP_CS_GOOD,
        address_space_id: phdr.address_space_id,
        opaque,
    };

    thread.count_rebuilt_packet();
    Ok(())
}

/// [`encode_format_with_daq_info`] using the source packet's own capture
/// header and opaque value.
pub fn encode_format(
    registry: &CodecRegistry,
    thread: &mut ThreadCtx,
    flags: u32,
    p: &Packet,
    c: &mut Packet,
    pseudo_type: PseudoType,
) -> Result<(), FormatError> {
    let phdr = p.pkth;
    let opaque = p.pkth.opaque;
    encode_format_with_daq_info(registry, thread, flags, p, c, pseudo_type, &phdr, opaque)
}

/// Propagate length and checksum fields after a packet was modified.
///
/// Walks the layers innermost first with a running length accumulator so
/// each header is recomputed from a known inner total. Unless the packet
/// was modified without resizing, the capture header lengths are
/// overwritten with the recomputed total.
pub fn encode_update(registry: &CodecRegistry, thread: &ThreadCtx, p: &mut Packet) {
    let mut len: u32 = p.dsize as u32;

    for i in (0..p.num_layers()).rev() {
        let mapped = if i == 0 {
            thread.grinder()
        } else {
            registry.map(p.layers[i].prot_id)
        };
        if let Some(codec) = registry.codec(mapped) {
            codec.update(p, i, &mut len);
        }
    }

    if p.packet_flags & PKT_MODIFIED == 0 || p.packet_flags & PKT_RESIZED != 0 {
        p.pkth.caplen = len;
        p.pkth.pktlen = len;
    }
}
