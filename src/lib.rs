//! Packet decode/encode core and TCP connection tracking for a network
//! intrusion-detection sensor.
//!
//! Three subsystems cooperate here:
//!
//! - a registry of pluggable protocol codecs and the iterative decode
//!   pipeline that turns a captured frame into a typed layer stack
//!   ([`codec`], [`decode`]);
//! - the reverse walk that synthesizes response packets and clones packets
//!   for re-inspection ([`encode`]);
//! - a per-flow TCP state machine driven by classified segment events
//!   ([`stream`]).
//!
//! Capture drivers, the flow table, reassembly, and detection are external
//! collaborators; this crate defines only the contracts it shares with
//! them. The registry is built once at startup and shared read-only across
//! worker threads; everything per-packet lives in a [`thread::ThreadCtx`]
//! each worker owns exclusively.

pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod flow;
pub mod packet;
pub mod stream;
pub mod thread;

pub use codec::registry::CodecRegistry;
pub use codec::{Codec, CodecApi, DecodeResult, EncodeType, Layer};
pub use config::{DecoderConfig, SensorConfig, StreamConfig};
pub use decode::decode;
pub use encode::{encode_format, encode_format_with_daq_info, encode_response, encode_update};
pub use error::{FormatError, RegistryError};
pub use flow::Flow;
pub use packet::{CaptureHeader, Packet};
pub use stream::{TcpSession, TcpStateMachine};
pub use thread::ThreadCtx;
