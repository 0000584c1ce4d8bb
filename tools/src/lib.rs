//! Introspection and simulation tools for ghostsync.
//!
//! - [`inspect_packet`] decodes a snapshot or ack packet into a report of its
//!   header, sections and per-slice headers. With a schema it also decodes
//!   the field values of full slices.
//! - [`run_simulation`] drives a server and a client over a seeded lossy link
//!   and reports bandwidth, loss and resync counts.
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the codec is doing.
//! - **Reproducible runs** - A simulation with the same seed and config produces the same report.

mod inspect;
mod simulate;

pub use inspect::{
    format_report, inspect_packet, AckReport, FieldReport, GhostReport, InspectReport, PacketKind,
    SectionReport, SliceReport,
};
pub use simulate::{run_simulation, unit_schema, SimulationConfig, SimulationReport};
