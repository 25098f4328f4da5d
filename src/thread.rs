//! Per-worker state
//!
//! Everything a worker touches on the hot path lives here, owned
//! exclusively by that worker: no locks, no sharing. The registry fills in
//! the grinder binding and reseeds the IP-id pool at thread init.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::stats::CodecStats;
use crate::codec::PKT_MAX;
use crate::packet::Packet;

/// IP ids preallocated per thread and refilled from the PRNG at init.
pub const IP_ID_COUNT: usize = 8192;

/// One worker thread's private state.
pub struct ThreadCtx {
    /// Entry-point codec index bound by `CodecRegistry::thread_init`.
    pub(crate) grinder: u8,
    pub stats: CodecStats,
    rng: StdRng,
    ip_id_pool: Vec<u16>,
    ip_id_next: usize,
    scratch: Box<[u8]>,
    encode_pkt: Option<Box<Packet>>,
    dst_mac: Option<[u8; 6]>,
    rebuilt_packets: u64,
}

impl ThreadCtx {
    pub fn new() -> Self {
        Self {
            grinder: 0,
            stats: CodecStats::new(),
            rng: StdRng::from_entropy(),
            ip_id_pool: vec![0; IP_ID_COUNT],
            ip_id_next: 0,
            scratch: vec![0; PKT_MAX].into_boxed_slice(),
            encode_pkt: None,
            dst_mac: None,
            rebuilt_packets: 0,
        }
    }

    /// Index of the entry-point codec for this thread's capture source.
    pub fn grinder(&self) -> u8 {
        self.grinder
    }

    /// Refill the IP-id pool from the thread's PRNG.
    pub(crate) fn reseed_ip_ids(&mut self) {
        self.rng.fill(&mut self.ip_id_pool[..]);
        self.ip_id_next = 0;
    }

    /// Next id from the pool, wrapping around when exhausted.
    pub fn next_ip_id(&mut self) -> u16 {
        let id = self.ip_id_pool[self.ip_id_next % IP_ID_COUNT];
        self.ip_id_next = self.ip_id_next.wrapping_add(1);
        id
    }

    /// Redirect `encode_response` to answer this packet instead of the one
    /// passed in. Cleared with [`clear_encode_packet`](Self::clear_encode_packet).
    pub fn set_encode_packet(&mut self, p: Box<Packet>) {
        self.encode_pkt = Some(p);
    }

    pub fn clear_encode_packet(&mut self) -> Option<Box<Packet>> {
        self.encode_pkt.take()
    }

    /// Split borrow for the encode path: the scratch buffer to write into
    /// and the optional packet override to answer.
    pub(crate) fn encode_parts(&mut self) -> (&mut [u8], Option<&Packet>) {
        (&mut self.scratch[..], self.encode_pkt.as_deref())
    }

    /// Destination MAC override consulted by link-layer codecs.
    pub fn set_dst_mac(&mut self, mac: [u8; 6]) {
        self.dst_mac = Some(mac);
    }

    pub fn dst_mac(&self) -> Option<[u8; 6]> {
        self.dst_mac
    }

    pub(crate) fn count_rebuilt_packet(&mut self) {
        self.rebuilt_packets += 1;
    }

    /// Packets cloned for re-inspection on this thread.
    pub fn rebuilt_packet_count(&self) -> u64 {
        self.rebuilt_packets
    }
}

impl Default for ThreadCtx {
    fn default() -> Self {
        Self::new()
    }
}
