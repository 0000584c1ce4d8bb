//! Server side of ghost replication: decide what each connection gets.
//!
//! A [`ReplicationServer`] captures every ghost once per tick into a shared
//! authoritative history, then builds one snapshot packet per connection
//! within a byte budget. Each build picks the relevant ghosts, ranks them by
//! accumulated importance and packs slices greedily, deltaing each one
//! against the newest snapshot the client acknowledged.
//!
//! # Design Principles
//!
//! - **Deferred, never dropped** - A ghost that does not fit keeps its
//!   accumulated priority and is retried next tick.
//! - **Acked baselines only** - A delta is only ever written against a tick
//!   the client confirmed receiving.
//! - **Connections are independent** - Builds share captured state read-only
//!   and may run in parallel.

mod config;
mod connection;
mod error;
mod importance;
mod relevancy;
mod server;

pub use config::ReplicationConfig;
pub use connection::{Connection, ConnectionId};
pub use error::{ReplicationError, ReplicationResult};
pub use importance::{pack_greedy, rank, Candidate, DistanceImportance, Packing};
pub use relevancy::{RelevancyMode, RelevancySet};
pub use server::ReplicationServer;
