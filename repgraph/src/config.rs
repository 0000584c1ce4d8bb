use codec::{CodecLimits, DEFAULT_HISTORY_CAPACITY};

use crate::importance::DistanceImportance;

/// Replication server configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReplicationConfig {
    /// Maximum entities tracked globally (hard safety cap).
    pub max_entities: usize,
    /// Authoritative and per-connection sent history, in entries per ghost.
    pub history_capacity: usize,
    /// Distance scaling of importance; `None` ranks by importance alone.
    pub distance_importance: Option<DistanceImportance>,
    pub limits: CodecLimits,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub wire_limits: wire::Limits,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_entities: 1_000_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            distance_importance: Some(DistanceImportance::default()),
            limits: CodecLimits::default(),
            wire_limits: wire::Limits::default(),
        }
    }
}

impl ReplicationConfig {
    /// Small caps suitable for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_entities: 64,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            distance_importance: None,
            limits: CodecLimits::for_testing(),
            wire_limits: wire::Limits::for_testing(),
        }
    }
}
