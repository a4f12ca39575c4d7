//! Stratum V2 client (spec §4.7): Noise_NX transport security, SV2 binary
//! framing, and the per-channel job state machine.

pub mod authority;
pub mod client;
pub mod ellswift;
pub mod framing;
pub mod messages;
pub mod noise;

pub use client::{JobAnnouncement, JobTracker, StratumV2Client, V2Error, V2FailoverTracker};
pub use framing::{encode_frame_header, parse_frame_header, FrameHeader, FramingError};
pub use noise::{Initiator, NoiseError, TransportKeys};
