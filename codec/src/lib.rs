//! Ghost snapshot capture, delta encoding and client-side reconstruction.
//!
//! This crate ties bitstream, wire and schema together. A [`CodecRegistry`]
//! compiles a validated schema into per-field operations; the server side
//! captures [`SnapshotData`] and writes snapshot packets against acked
//! baselines, the client side applies them into per-ghost history and samples
//! it for rendering.
//!
//! # Features
//!
//! - Change masks per field, with unchanged fields costing one bit
//! - Delta packing against an acked baseline, or against a linear prediction
//!   from two baselines
//! - Fixed-capacity, tick-indexed history with borrowed read-only views
//! - Self-delimiting slices, so one bad slice never poisons a packet
//! - 64-tick ack windows with resync requests
//! - Interpolation and extrapolation with per-field smoothing modes
//!
//! # Design Principles
//!
//! - **Correctness first** - Invariants are checked and tested; bad input is an error.
//! - **Caller-provided buffers** - Packets are written into fixed slices and never grow.
//! - **Deterministic** - Same inputs produce same bytes.
//! - **Kind dispatch once** - Field kinds are resolved to operation tables when
//!   the registry is built, not per value.

mod accessor;
mod ack;
mod change_mask;
mod client;
mod diagnostics;
mod error;
mod field_ops;
mod history;
mod limits;
mod packet;
mod predictor;
mod registry;
mod smoothing;
mod snapshot;
mod tick;
mod types;
mod value;

pub use accessor::{ComponentAccessor, GhostLookup, MemoryComponents, TickClock};
pub use ack::{
    decode_ack_packet, encode_ack_packet, max_ack_packet_len, AckPacket, AckState, ACK_WINDOW,
};
pub use change_mask::{compute_change_mask, ChangeMask, MAX_MASK_WORDS};
pub use client::{ApplyReport, ClientConfig, ClientGhost, ReplicationClient};
#[cfg(debug_assertions)]
pub use diagnostics::PredictionErrorTracker;
pub use diagnostics::{DiagnosticsSink, NullDiagnostics, ReplicationEvent, TracingDiagnostics};
pub use error::{CodecError, CodecResult, LimitKind, MismatchReason};
pub use field_ops::{ops_for, FieldOps, FieldRead, FieldWrite};
pub use history::{HistoryView, SnapshotHistory, DEFAULT_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY};
pub use limits::CodecLimits;
pub use packet::{
    decode_despawn_body, decode_snapshot_packet, encode_despawn_body, encode_snapshot_packet,
    GhostSectionReader, GhostSectionWriter, SliceHeader, SliceKind, SnapshotPacket,
    MAX_SLICE_BITS, SECTION_OVERHEAD,
};
pub use predictor::DeltaPredictor;
pub use registry::{CodecRegistry, FieldDescriptor, GhostTypeCodec};
pub use smoothing::{sample_fields, Bracket};
pub use snapshot::{
    capture, read_ghost_fields, restore, snapshot_from_values, write_ghost_fields, Baseline,
    SnapshotData,
};
pub use tick::Tick;
pub use types::{EntityId, GhostId};
pub use value::FieldValue;
pub use wire::Limits as WireLimits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = Tick::new(0);
        let _ = EntityId::new(0);
        let _ = WireLimits::default();
        let _ = CodecLimits::default();
        let _ = ClientConfig::default();
        let _: CodecResult<()> = Ok(());
    }

    #[test]
    fn limits_reexported() {
        let limits = WireLimits::default();
        assert!(limits.max_packet_bytes > 0);
    }
}
