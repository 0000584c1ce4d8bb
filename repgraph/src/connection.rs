//! What the server knows about one client.

use std::collections::BTreeMap;
use std::sync::Arc;

use codec::{
    AckPacket, AckState, CodecResult, EntityId, GhostId, SnapshotData, SnapshotHistory, Tick,
    ACK_WINDOW,
};
use glam::Vec3;

use crate::relevancy::{RelevancyMode, RelevancySet};

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection {}", self.0)
    }
}

/// A ghost as replicated to one connection.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionGhost {
    pub(crate) ghost: GhostId,
    /// Snapshots sent, shared with the server's authoritative history.
    pub(crate) sent: SnapshotHistory<Arc<SnapshotData>>,
    /// Importance accumulated while not sent.
    pub(crate) priority: u64,
    /// Tick of the newest full slice sent.
    pub(crate) last_full: Tick,
}

impl ConnectionGhost {
    pub(crate) fn new(ghost: GhostId, capacity: usize) -> CodecResult<Self> {
        Ok(Self {
            ghost,
            sent: SnapshotHistory::new(capacity)?,
            priority: 0,
            last_full: Tick::INVALID,
        })
    }

    /// Newest sent snapshot the client acknowledged, and the acknowledged one
    /// before it for prediction.
    pub(crate) fn baselines(
        &self,
        ack: &AckState,
        tick: Tick,
    ) -> (Option<(Tick, &SnapshotData)>, Option<(Tick, &SnapshotData)>) {
        let last = ack.last_received();
        if !last.is_valid() {
            return (None, None);
        }
        let mut acked = (0..ACK_WINDOW)
            .map(|back| last.subtract(back))
            .filter(|t| tick.is_newer_than(*t) && ack.is_acked(*t))
            .filter_map(|t| self.sent.get(t).map(|data| (t, data.as_ref())));
        let baseline = acked.next();
        let older = baseline.and_then(|_| acked.next());
        (baseline, older)
    }
}

/// A despawn the client has not yet acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingDespawn {
    pub(crate) ghost: GhostId,
    /// Tick of the first packet that carried it.
    pub(crate) first_sent: Tick,
}

/// Server-side state of one client.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    pub(crate) relevancy: RelevancySet,
    pub(crate) view: Option<Vec3>,
    pub(crate) ghosts: BTreeMap<EntityId, ConnectionGhost>,
    pub(crate) ack: AckState,
    pub(crate) despawns: Vec<PendingDespawn>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, mode: RelevancyMode) -> Self {
        Self {
            id,
            relevancy: RelevancySet::new(mode),
            view: None,
            ghosts: BTreeMap::new(),
            ack: AckState::new(),
            despawns: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub const fn relevancy(&self) -> &RelevancySet {
        &self.relevancy
    }

    /// Position distance importance is measured from.
    #[must_use]
    pub const fn view(&self) -> Option<Vec3> {
        self.view
    }

    #[must_use]
    pub const fn ack_state(&self) -> &AckState {
        &self.ack
    }

    /// Ghosts currently replicated to this connection.
    pub fn ghosts(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.ghosts.values().map(|g| g.ghost)
    }

    /// Accumulated priority of a replicated ghost.
    #[must_use]
    pub fn priority(&self, entity: EntityId) -> Option<u64> {
        self.ghosts.get(&entity).map(|g| g.priority)
    }

    /// Despawns waiting for acknowledgement.
    pub fn pending_despawns(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.despawns.iter().map(|d| d.ghost)
    }

    /// Stops replicating `entity` and queues its despawn.
    pub(crate) fn forget(&mut self, entity: EntityId) {
        if let Some(ghost) = self.ghosts.remove(&entity) {
            self.queue_despawn(ghost.ghost);
        }
    }

    pub(crate) fn queue_despawn(&mut self, ghost: GhostId) {
        if !self.despawns.iter().any(|d| d.ghost == ghost) {
            tracing::debug!(connection = %self.id, %ghost, "despawn queued");
            self.despawns.push(PendingDespawn {
                ghost,
                first_sent: Tick::INVALID,
            });
        }
    }

    /// Folds a received ack into this connection.
    ///
    /// Despawns carried by an acknowledged packet are dropped. Ghosts the
    /// client asked to resync lose their sent history, so their next slice is
    /// full, unless a full slice newer than the ack is already in flight.
    pub(crate) fn apply_ack(&mut self, packet: &AckPacket) -> usize {
        self.ack.merge(&packet.ack);
        let last = self.ack.last_received();
        if last.is_valid() {
            self.despawns
                .retain(|d| !d.first_sent.is_valid() || d.first_sent.is_newer_than(last));
        }

        let mut resynced = 0;
        for entity in &packet.resync {
            let Some(ghost) = self.ghosts.get_mut(entity) else {
                continue;
            };
            if ghost.last_full.is_valid() && ghost.last_full.is_newer_than(packet.ack.last_received())
            {
                continue;
            }
            tracing::info!(connection = %self.id, ghost = %ghost.ghost, "full resync");
            ghost.sent.clear();
            resynced += 1;
        }
        resynced
    }
}
