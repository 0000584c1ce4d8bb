//! Replication events for telemetry.
//!
//! Stream errors are never swallowed: every skipped or deferred ghost is
//! reported to a [`DiagnosticsSink`] in addition to being logged.

use crate::{CodecError, GhostId, Tick};

/// Something worth reporting about a snapshot build or apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// A ghost could not be written and was left out of the packet.
    EncodeFailed { ghost: GhostId, error: CodecError },
    /// A relevant ghost did not fit in the budget and will be retried.
    Deferred { ghost: GhostId, tick: Tick },
    /// A received slice could not be decoded and was skipped.
    DecodeMismatch { error: CodecError },
    /// The client asked for a full snapshot of a ghost.
    ResyncRequested { ghost: GhostId },
    /// A ghost was removed from a peer.
    Despawned { ghost: GhostId },
    /// A snapshot packet was finished.
    SnapshotBuilt {
        tick: Tick,
        bytes: usize,
        sent: usize,
        deferred: usize,
    },
}

/// Receives replication events.
pub trait DiagnosticsSink {
    fn record(&mut self, event: ReplicationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl DiagnosticsSink for NullDiagnostics {
    fn record(&mut self, _event: ReplicationEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&mut self, event: ReplicationEvent) {
        match event {
            ReplicationEvent::EncodeFailed { ghost, error } => {
                tracing::warn!(%ghost, %error, "ghost encode failed");
            }
            ReplicationEvent::Deferred { ghost, tick } => {
                tracing::debug!(%ghost, %tick, "ghost deferred");
            }
            ReplicationEvent::DecodeMismatch { error } => {
                tracing::warn!(%error, "slice skipped");
            }
            ReplicationEvent::ResyncRequested { ghost } => {
                tracing::info!(%ghost, "full resync requested");
            }
            ReplicationEvent::Despawned { ghost } => {
                tracing::debug!(%ghost, "ghost despawned");
            }
            ReplicationEvent::SnapshotBuilt {
                tick,
                bytes,
                sent,
                deferred,
            } => {
                tracing::debug!(%tick, bytes, sent, deferred, "snapshot built");
            }
        }
    }
}

impl DiagnosticsSink for Vec<ReplicationEvent> {
    fn record(&mut self, event: ReplicationEvent) {
        self.push(event);
    }
}

impl<S: DiagnosticsSink + ?Sized> DiagnosticsSink for &mut S {
    fn record(&mut self, event: ReplicationEvent) {
        (**self).record(event);
    }
}

/// Largest absolute deviation seen per field between predicted and
/// authoritative values. Debug builds only.
#[cfg(debug_assertions)]
#[derive(Debug, Default, Clone)]
pub struct PredictionErrorTracker {
    errors: std::collections::BTreeMap<(schema::GhostTypeId, String), f64>,
}

#[cfg(debug_assertions)]
impl PredictionErrorTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares every field of `predicted` against `authoritative`.
    pub fn record(
        &mut self,
        codec: &crate::GhostTypeCodec,
        predicted: &crate::SnapshotData,
        authoritative: &crate::SnapshotData,
    ) {
        for field in codec.fields() {
            let Some(deviation) = field_deviation(&predicted.value(field), &authoritative.value(field))
            else {
                continue;
            };
            let entry = self
                .errors
                .entry((codec.id, field.name.clone()))
                .or_insert(0.0);
            if deviation > *entry {
                *entry = deviation;
            }
        }
    }

    /// Largest deviation recorded for a field.
    #[must_use]
    pub fn max_error(&self, ghost_type: schema::GhostTypeId, field: &str) -> Option<f64> {
        self.errors.get(&(ghost_type, field.to_owned())).copied()
    }

    /// Every field with a recorded deviation, in type and name order.
    pub fn iter(&self) -> impl Iterator<Item = (schema::GhostTypeId, &str, f64)> {
        self.errors
            .iter()
            .map(|((ghost_type, name), error)| (*ghost_type, name.as_str(), *error))
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

#[cfg(debug_assertions)]
fn field_deviation(a: &crate::FieldValue, b: &crate::FieldValue) -> Option<f64> {
    use crate::FieldValue;
    match (a, b) {
        (FieldValue::Int(a), FieldValue::Int(b)) => Some((f64::from(*a) - f64::from(*b)).abs()),
        (FieldValue::UInt(a), FieldValue::UInt(b)) => Some((f64::from(*a) - f64::from(*b)).abs()),
        (FieldValue::Long(a), FieldValue::Long(b)) => Some((*a as f64 - *b as f64).abs()),
        (FieldValue::ULong(a), FieldValue::ULong(b)) => Some((*a as f64 - *b as f64).abs()),
        (FieldValue::Double(a), FieldValue::Double(b)) => Some((a - b).abs()),
        (FieldValue::Float(a), FieldValue::Float(b)) => Some(f64::from((a - b).abs())),
        (FieldValue::Vector2(a), FieldValue::Vector2(b)) => {
            Some(f64::from((*a - *b).abs().max_element()))
        }
        (FieldValue::Vector3(a), FieldValue::Vector3(b)) => {
            Some(f64::from((*a - *b).abs().max_element()))
        }
        (FieldValue::Quaternion(a), FieldValue::Quaternion(b)) => {
            Some(f64::from(a.angle_between(*b)))
        }
        _ => None,
    }
}
