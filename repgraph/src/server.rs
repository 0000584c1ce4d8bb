//! The authoritative side of replication.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use codec::{
    capture, decode_ack_packet, encode_snapshot_packet, CodecError, CodecRegistry, CodecResult,
    ComponentAccessor, DiagnosticsSink, EntityId, GhostId, GhostSectionWriter, HistoryView,
    LimitKind, NullDiagnostics, ReplicationEvent, SnapshotData, SnapshotHistory, Tick, TickClock,
};
use glam::Vec3;
use rayon::prelude::*;
use schema::GhostTypeId;

use crate::config::ReplicationConfig;
use crate::connection::{Connection, ConnectionGhost, ConnectionId};
use crate::error::{ReplicationError, ReplicationResult};
use crate::importance::{pack_greedy, rank, Candidate, Packing};
use crate::relevancy::{RelevancyMode, RelevancySet};

#[derive(Debug, Clone)]
struct ServerEntity {
    ghost: GhostId,
    ghost_type: GhostTypeId,
    importance: u32,
    position: Option<Vec3>,
    /// Captured snapshots, shared with every connection that sends them.
    history: SnapshotHistory<Arc<SnapshotData>>,
}

/// Captures ghosts each tick and builds per-connection snapshot packets.
///
/// Call [`capture`](Self::capture) once per tick, then build packets for
/// every connection. Builds only read the captured state, so all connections
/// can be built in parallel with [`build_all`](Self::build_all).
#[derive(Debug)]
pub struct ReplicationServer {
    registry: Arc<CodecRegistry>,
    config: ReplicationConfig,
    entities: BTreeMap<EntityId, ServerEntity>,
    connections: BTreeMap<ConnectionId, Connection>,
    tick: Tick,
}

impl ReplicationServer {
    pub fn new(registry: Arc<CodecRegistry>, config: ReplicationConfig) -> CodecResult<Self> {
        SnapshotHistory::<()>::new(config.history_capacity)?;
        Ok(Self {
            registry,
            config,
            entities: BTreeMap::new(),
            connections: BTreeMap::new(),
            tick: Tick::INVALID,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Tick of the newest capture.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Starts replicating `entity` as a ghost of `ghost_type`.
    pub fn spawn(
        &mut self,
        entity: EntityId,
        ghost_type: GhostTypeId,
        spawn_tick: Tick,
    ) -> CodecResult<GhostId> {
        spawn_tick.require("spawn")?;
        let importance = self.registry.ghost_type(ghost_type)?.importance;
        if self.entities.contains_key(&entity) {
            return Err(CodecError::EntityAlreadyExists { entity });
        }
        if self.entities.len() >= self.config.max_entities {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::Entities,
                limit: self.config.max_entities,
                actual: self.entities.len() + 1,
            });
        }
        let ghost = GhostId::new(entity, spawn_tick);
        self.entities.insert(
            entity,
            ServerEntity {
                ghost,
                ghost_type,
                importance,
                position: None,
                history: SnapshotHistory::new(self.config.history_capacity)?,
            },
        );
        tracing::debug!(%ghost, %ghost_type, "ghost spawned");
        Ok(ghost)
    }

    /// Stops replicating `entity`; every connection that knew it gets a despawn.
    pub fn despawn(&mut self, entity: EntityId) -> CodecResult<GhostId> {
        let removed = self
            .entities
            .remove(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        for connection in self.connections.values_mut() {
            connection.forget(entity);
        }
        tracing::debug!(ghost = %removed.ghost, "ghost despawned");
        Ok(removed.ghost)
    }

    #[must_use]
    pub fn ghost(&self, entity: EntityId) -> Option<GhostId> {
        self.entities.get(&entity).map(|e| e.ghost)
    }

    pub fn ghosts(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.entities.values().map(|e| e.ghost)
    }

    /// Overrides the ghost type's base importance for one entity.
    pub fn set_importance(&mut self, entity: EntityId, importance: u32) -> CodecResult<()> {
        self.entity_mut(entity)?.importance = importance;
        Ok(())
    }

    /// Sets the position distance importance is measured to.
    pub fn set_position(&mut self, entity: EntityId, position: Vec3) -> CodecResult<()> {
        self.entity_mut(entity)?.position = Some(position);
        Ok(())
    }

    fn entity_mut(&mut self, entity: EntityId) -> CodecResult<&mut ServerEntity> {
        self.entities
            .get_mut(&entity)
            .ok_or(CodecError::UnknownEntity { entity })
    }

    pub fn add_connection(
        &mut self,
        connection: ConnectionId,
        mode: RelevancyMode,
    ) -> ReplicationResult<()> {
        match self.connections.entry(connection) {
            Entry::Occupied(_) => Err(ReplicationError::ConnectionExists { connection }),
            Entry::Vacant(slot) => {
                slot.insert(Connection::new(connection, mode));
                tracing::info!(%connection, ?mode, "connection added");
                Ok(())
            }
        }
    }

    /// Drops a connection and everything sent to it.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> ReplicationResult<()> {
        self.connections
            .remove(&connection)
            .map(|_| tracing::info!(%connection, "connection removed"))
            .ok_or(ReplicationError::UnknownConnection { connection })
    }

    #[must_use]
    pub fn connection(&self, connection: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Relevancy set of a connection, for game logic to edit between ticks.
    pub fn relevancy_mut(
        &mut self,
        connection: ConnectionId,
    ) -> ReplicationResult<&mut RelevancySet> {
        self.connection_mut(connection).map(|c| &mut c.relevancy)
    }

    /// Sets the position a connection views the world from.
    pub fn set_view(&mut self, connection: ConnectionId, view: Vec3) -> ReplicationResult<()> {
        self.connection_mut(connection)?.view = Some(view);
        Ok(())
    }

    fn connection_mut(&mut self, connection: ConnectionId) -> ReplicationResult<&mut Connection> {
        self.connections
            .get_mut(&connection)
            .ok_or(ReplicationError::UnknownConnection { connection })
    }

    /// Captures every ghost at `tick` through `accessor`.
    ///
    /// A value of the wrong kind is a configuration bug and fails the whole
    /// capture.
    pub fn capture(&mut self, tick: Tick, accessor: &impl ComponentAccessor) -> CodecResult<()> {
        tick.require("capture")?;
        for (entity, state) in &mut self.entities {
            let codec = self.registry.ghost_type(state.ghost_type)?;
            let data = capture(codec, *entity, accessor)?;
            state.history.store(tick, Arc::new(data))?;
        }
        self.tick = tick;
        Ok(())
    }

    /// Captures at the clock's current tick.
    pub fn capture_now(
        &mut self,
        clock: &impl TickClock,
        accessor: &impl ComponentAccessor,
    ) -> CodecResult<()> {
        self.capture(clock.current_server_tick(), accessor)
    }

    /// Captured history of a ghost.
    #[must_use]
    pub fn authoritative_history(
        &self,
        entity: EntityId,
    ) -> Option<HistoryView<'_, Arc<SnapshotData>>> {
        self.entities.get(&entity).map(|e| e.history.view())
    }

    /// Captured snapshot of a ghost near `tick`, for lag-compensated queries.
    #[must_use]
    pub fn fetch_authoritative(
        &self,
        entity: EntityId,
        tick: Tick,
        lookback: u32,
    ) -> Option<(Tick, &SnapshotData)> {
        let (tick, data) = self.entities.get(&entity)?.history.fetch(tick, lookback)?;
        Some((tick, data.as_ref()))
    }

    /// Builds the snapshot packet for the newest capture, at most
    /// `budget_bytes` long.
    pub fn build_snapshot_bytes(
        &mut self,
        connection: ConnectionId,
        budget_bytes: usize,
    ) -> ReplicationResult<Vec<u8>> {
        self.build_snapshot_bytes_with(connection, budget_bytes, &mut NullDiagnostics)
    }

    pub fn build_snapshot_bytes_with(
        &mut self,
        connection: ConnectionId,
        budget_bytes: usize,
        sink: &mut impl DiagnosticsSink,
    ) -> ReplicationResult<Vec<u8>> {
        let builder = Builder {
            registry: &self.registry,
            config: &self.config,
            entities: &self.entities,
            tick: self.tick,
        };
        let state = self
            .connections
            .get_mut(&connection)
            .ok_or(ReplicationError::UnknownConnection { connection })?;
        Ok(builder.build(state, budget_bytes, sink)?)
    }

    /// Builds packets for every connection in parallel.
    pub fn build_all(&mut self, budget_bytes: usize) -> Vec<(ConnectionId, ReplicationResult<Vec<u8>>)> {
        self.build_all_with(budget_bytes, &mut NullDiagnostics)
    }

    /// Builds packets for every connection in parallel, then forwards each
    /// connection's events to `sink` in connection order.
    pub fn build_all_with(
        &mut self,
        budget_bytes: usize,
        sink: &mut impl DiagnosticsSink,
    ) -> Vec<(ConnectionId, ReplicationResult<Vec<u8>>)> {
        let builder = Builder {
            registry: &self.registry,
            config: &self.config,
            entities: &self.entities,
            tick: self.tick,
        };
        let built: Vec<_> = self
            .connections
            .par_iter_mut()
            .map(|(id, state)| {
                let mut events = Vec::new();
                let result = builder
                    .build(state, budget_bytes, &mut events)
                    .map_err(ReplicationError::from);
                (*id, result, events)
            })
            .collect();

        built
            .into_iter()
            .map(|(id, result, events)| {
                for event in events {
                    sink.record(event);
                }
                (id, result)
            })
            .collect()
    }

    /// Applies an ack packet from a connection, returning how many ghosts
    /// were reset for a full resync.
    pub fn receive_ack_bytes(
        &mut self,
        connection: ConnectionId,
        bytes: &[u8],
    ) -> ReplicationResult<usize> {
        let packet = decode_ack_packet(
            &self.registry,
            bytes,
            &self.config.wire_limits,
            &self.config.limits,
        )?;
        let state = self.connection_mut(connection)?;
        Ok(state.apply_ack(&packet))
    }
}

/// Read-only state shared by every connection's build.
#[derive(Clone, Copy)]
struct Builder<'a> {
    registry: &'a CodecRegistry,
    config: &'a ReplicationConfig,
    entities: &'a BTreeMap<EntityId, ServerEntity>,
    tick: Tick,
}

impl Builder<'_> {
    fn build(
        &self,
        connection: &mut Connection,
        budget_bytes: usize,
        sink: &mut impl DiagnosticsSink,
    ) -> CodecResult<Vec<u8>> {
        let tick = self.tick;
        tick.require("snapshot build")?;

        let stale: Vec<EntityId> = connection
            .ghosts
            .iter()
            .filter(|(entity, ghost)| {
                !connection.relevancy.is_relevant(**entity)
                    || self
                        .entities
                        .get(entity)
                        .map_or(true, |state| state.ghost != ghost.ghost)
            })
            .map(|(entity, _)| *entity)
            .collect();
        for entity in stale {
            connection.forget(entity);
        }

        let candidates = self.candidates(connection)?;
        let despawns: Vec<GhostId> = connection
            .despawns
            .iter()
            .take(self.config.limits.max_despawns_per_packet)
            .map(|d| d.ghost)
            .collect();

        let mut buf = vec![0u8; budget_bytes];
        let mut packing = Packing::default();
        let mut placed = Vec::new();
        let ack = connection.ack;
        let ghosts = &connection.ghosts;
        let len = encode_snapshot_packet(
            self.registry,
            tick,
            &despawns,
            &self.config.limits,
            &mut buf,
            |section| {
                packing = pack_greedy(&candidates, |candidate| {
                    self.place(section, ghosts, &ack, candidate, &mut placed, &mut *sink)
                });
                Ok(())
            },
        )?;
        buf.truncate(len);

        // Only a finished packet counts as sent.
        for (entity, full) in placed {
            let (Some(ghost), Some(state)) =
                (connection.ghosts.get_mut(&entity), self.entities.get(&entity))
            else {
                continue;
            };
            if let Some(current) = state.history.get(tick) {
                ghost.sent.store(tick, Arc::clone(current))?;
            }
            ghost.priority = 0;
            if full {
                ghost.last_full = tick;
            }
        }

        for despawn in connection.despawns.iter_mut().take(despawns.len()) {
            if !despawn.first_sent.is_valid() {
                despawn.first_sent = tick;
            }
        }

        tracing::debug!(
            connection = %connection.id(),
            %tick,
            bytes = len,
            sent = packing.sent.len(),
            deferred = packing.deferred.len(),
            despawns = despawns.len(),
            "snapshot built"
        );
        sink.record(ReplicationEvent::SnapshotBuilt {
            tick,
            bytes: len,
            sent: packing.sent.len(),
            deferred: packing.deferred.len(),
        });
        Ok(buf)
    }

    /// Relevant ghosts captured this tick, ranked. Each one's accumulated
    /// priority grows by its importance.
    fn candidates(&self, connection: &mut Connection) -> CodecResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for (entity, state) in self.entities {
            if !connection.relevancy.is_relevant(*entity) || state.history.get(self.tick).is_none()
            {
                continue;
            }
            let importance = match (self.config.distance_importance, state.position, connection.view)
            {
                (Some(scale), Some(position), Some(view)) => {
                    scale.scale(state.importance, position, view)
                }
                _ => state.importance,
            };
            if !connection.ghosts.contains_key(entity) {
                // A despawn that never went out would race the new full slice.
                connection
                    .despawns
                    .retain(|d| d.ghost != state.ghost || d.first_sent.is_valid());
            }
            let ghost = match connection.ghosts.entry(*entity) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    slot.insert(ConnectionGhost::new(state.ghost, self.config.history_capacity)?)
                }
            };
            ghost.priority = ghost.priority.saturating_add(u64::from(importance));
            candidates.push(Candidate {
                entity: *entity,
                priority: ghost.priority,
            });
        }
        rank(&mut candidates);
        Ok(candidates)
    }

    /// Writes one ghost's slice. Returns `false` if it was left out.
    ///
    /// Written ghosts are pushed to `placed` with whether the slice was full;
    /// the caller commits them once the packet is complete.
    fn place(
        &self,
        section: &mut GhostSectionWriter<'_, '_>,
        ghosts: &BTreeMap<EntityId, ConnectionGhost>,
        ack: &codec::AckState,
        candidate: &Candidate,
        placed: &mut Vec<(EntityId, bool)>,
        sink: &mut impl DiagnosticsSink,
    ) -> bool {
        let (Some(state), Some(ghost)) = (
            self.entities.get(&candidate.entity),
            ghosts.get(&candidate.entity),
        ) else {
            return false;
        };
        let Some(current) = state.history.get(self.tick) else {
            return false;
        };

        let (baseline, older) = ghost.baselines(ack, self.tick);
        let full = baseline.is_none();
        match section.write_slice(ghost.ghost, current, baseline, older) {
            Ok(_) => {
                placed.push((candidate.entity, full));
                true
            }
            Err(error)
                if error.is_stream_overflow()
                    || matches!(
                        error,
                        CodecError::LimitsExceeded {
                            kind: LimitKind::GhostsPerPacket,
                            ..
                        }
                    ) =>
            {
                tracing::debug!(ghost = %ghost.ghost, priority = ghost.priority, "ghost deferred");
                sink.record(ReplicationEvent::Deferred {
                    ghost: ghost.ghost,
                    tick: self.tick,
                });
                false
            }
            Err(error) => {
                tracing::warn!(ghost = %ghost.ghost, %error, "ghost left out of snapshot");
                sink.record(ReplicationEvent::EncodeFailed {
                    ghost: ghost.ghost,
                    error,
                });
                false
            }
        }
    }
}
