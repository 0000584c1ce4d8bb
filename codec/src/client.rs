//! Client side of a replication link: apply snapshots, ack them, sample ghosts.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::accessor::{ComponentAccessor, GhostLookup};
use crate::ack::{encode_ack_packet, max_ack_packet_len, AckState};
use crate::diagnostics::{DiagnosticsSink, NullDiagnostics, ReplicationEvent};
use crate::error::{CodecError, CodecResult, MismatchReason};
use crate::history::{HistoryView, SnapshotHistory, DEFAULT_HISTORY_CAPACITY};
use crate::limits::CodecLimits;
use crate::packet::{decode_snapshot_packet, GhostSectionReader, SliceHeader, SliceKind};
use crate::registry::CodecRegistry;
use crate::smoothing::{sample_fields, Bracket};
use crate::snapshot::{resolve_reference, SnapshotData};
use crate::{EntityId, FieldValue, GhostId, Tick};

/// Client tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Entries kept per ghost. Power of two, at most 64.
    pub history_capacity: usize,
    /// How far past the newest entry extrapolation may reach.
    pub max_extrapolation_ticks: u32,
    /// Consecutive decode mismatches on one entity before a full resync is requested.
    pub mismatches_before_resync: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub wire_limits: wire::Limits,
    pub limits: CodecLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_extrapolation_ticks: 4,
            mismatches_before_resync: 2,
            wire_limits: wire::Limits::default(),
            limits: CodecLimits::default(),
        }
    }
}

/// A ghost known to the client.
#[derive(Debug, Clone)]
pub struct ClientGhost {
    pub id: GhostId,
    pub ghost_type: schema::GhostTypeId,
    history: SnapshotHistory<SnapshotData>,
}

impl ClientGhost {
    /// Received snapshots of this ghost.
    #[must_use]
    pub fn history(&self) -> HistoryView<'_, SnapshotData> {
        self.history.view()
    }
}

/// What one snapshot packet changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub tick: Tick,
    pub applied: usize,
    pub despawned: usize,
    pub mismatched: usize,
}

/// A decoded slice waiting for the rest of its packet.
#[derive(Debug)]
struct StagedSlice {
    entity: EntityId,
    /// Incarnation and type established by a full slice.
    spawn: Option<(GhostId, schema::GhostTypeId)>,
    data: SnapshotData,
}

/// Receives snapshot packets from one server.
#[derive(Debug)]
pub struct ReplicationClient {
    registry: Arc<CodecRegistry>,
    config: ClientConfig,
    ghosts: HashMap<EntityId, ClientGhost>,
    ack: AckState,
    mismatches: HashMap<EntityId, u32>,
    pending_resync: BTreeSet<EntityId>,
}

impl ReplicationClient {
    pub fn new(registry: Arc<CodecRegistry>, config: ClientConfig) -> CodecResult<Self> {
        // Reject a bad capacity up front rather than on the first spawn.
        SnapshotHistory::<()>::new(config.history_capacity)?;
        Ok(Self {
            registry,
            config,
            ghosts: HashMap::new(),
            ack: AckState::new(),
            mismatches: HashMap::new(),
            pending_resync: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn ack_state(&self) -> &AckState {
        &self.ack
    }

    /// Newest tick received so far.
    #[must_use]
    pub const fn last_received(&self) -> Tick {
        self.ack.last_received()
    }

    #[must_use]
    pub fn ghost(&self, entity: EntityId) -> Option<&ClientGhost> {
        self.ghosts.get(&entity)
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &ClientGhost> {
        self.ghosts.values()
    }

    /// Entities waiting for a full slice.
    pub fn pending_resync(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.pending_resync.iter().copied()
    }

    /// Received history of a ghost.
    #[must_use]
    pub fn history(&self, entity: EntityId) -> Option<HistoryView<'_, SnapshotData>> {
        self.ghosts.get(&entity).map(ClientGhost::history)
    }

    /// The snapshot received for `entity` at exactly `tick`.
    #[must_use]
    pub fn snapshot_at(&self, entity: EntityId, tick: Tick) -> Option<&SnapshotData> {
        self.ghosts.get(&entity)?.history.get(tick)
    }

    /// Applies a snapshot packet, returning its tick.
    pub fn apply_snapshot_bytes(&mut self, bytes: &[u8]) -> CodecResult<Tick> {
        self.apply_snapshot_bytes_with(bytes, &mut NullDiagnostics)
            .map(|report| report.tick)
    }

    /// Applies a snapshot packet, reporting skipped slices to `sink`.
    ///
    /// The whole packet is decoded before anything is committed. A slice that
    /// does not match the client's history is skipped and the rest of the
    /// packet still applies. Any other error rejects the packet untouched and
    /// its tick is not acknowledged.
    ///
    /// A packet with skipped slices is still acknowledged: acks carry no
    /// per-ghost detail, so the server may later delta a skipped ghost against
    /// this tick. That slice mismatches too and counts toward the resync
    /// request that recovers the ghost.
    pub fn apply_snapshot_bytes_with(
        &mut self,
        bytes: &[u8],
        sink: &mut impl DiagnosticsSink,
    ) -> CodecResult<ApplyReport> {
        let registry = Arc::clone(&self.registry);
        let packet = decode_snapshot_packet(
            &registry,
            bytes,
            &self.config.wire_limits,
            &self.config.limits,
        )?;
        let tick = packet.tick;
        tick.require("snapshot tick")?;

        let mut despawned: Vec<GhostId> = Vec::new();
        for ghost in &packet.despawns {
            let known = self.ghosts.get(&ghost.entity).is_some_and(|g| g.id == *ghost);
            if known && !despawned.contains(ghost) {
                despawned.push(*ghost);
            }
        }
        let gone: HashSet<EntityId> = despawned.iter().map(|ghost| ghost.entity).collect();

        let mut staged = Vec::new();
        let mut skipped = Vec::new();
        let mut section = packet.ghosts;
        while let Some(header) = section.next_header(registry.model())? {
            match self.decode_slice(&registry, &mut section, &header, tick, &gone) {
                Ok(slice) => staged.push(slice),
                Err(error) if error.is_decode_mismatch() => skipped.push((header.entity, error)),
                Err(error) => return Err(error),
            }
        }
        section.finish()?;

        let mut report = ApplyReport {
            tick,
            ..ApplyReport::default()
        };
        for ghost in despawned {
            self.ghosts.remove(&ghost.entity);
            self.mismatches.remove(&ghost.entity);
            self.pending_resync.remove(&ghost.entity);
            sink.record(ReplicationEvent::Despawned { ghost });
            report.despawned += 1;
        }
        for slice in staged {
            let entity = slice.entity;
            self.commit_slice(tick, slice)?;
            self.mismatches.remove(&entity);
            report.applied += 1;
        }
        for (entity, error) in skipped {
            report.mismatched += 1;
            self.note_mismatch(entity, error, sink);
        }

        self.ack.record(tick);
        tracing::debug!(
            %tick,
            applied = report.applied,
            despawned = report.despawned,
            mismatched = report.mismatched,
            "snapshot applied"
        );
        Ok(report)
    }

    /// Decodes one slice against the current history without changing it.
    /// Ghosts in `gone` are despawned by the same packet.
    fn decode_slice(
        &self,
        registry: &CodecRegistry,
        section: &mut GhostSectionReader<'_>,
        header: &SliceHeader,
        tick: Tick,
        gone: &HashSet<EntityId>,
    ) -> CodecResult<StagedSlice> {
        let entity = header.entity;
        let mismatch = |reason| CodecError::DecodeMismatch { entity, reason };
        let existing = self.ghosts.get(&entity).filter(|_| !gone.contains(&entity));
        match header.kind {
            SliceKind::Full {
                spawn_tick,
                ghost_type,
            } => {
                let codec = registry.ghost_type(ghost_type)?;
                if let Some(existing) = existing {
                    if existing.id.spawn_tick.is_newer_than(spawn_tick) {
                        section.skip_body()?;
                        return Err(mismatch(MismatchReason::SpawnTickMismatch {
                            expected: existing.id.spawn_tick,
                            found: spawn_tick,
                        }));
                    }
                }
                let data = section.read_body(header, codec, tick, None, None, registry.model())?;
                Ok(StagedSlice {
                    entity,
                    spawn: Some((GhostId::new(entity, spawn_tick), ghost_type)),
                    data,
                })
            }
            SliceKind::Delta { .. } => {
                let Some(ghost) = existing else {
                    section.skip_body()?;
                    return Err(mismatch(MismatchReason::UnknownGhost));
                };
                let codec = registry.ghost_type(ghost.ghost_type)?;
                let base_tick = header.baseline_tick(tick).unwrap_or(Tick::INVALID);
                let Some(base) = ghost.history.get(base_tick) else {
                    section.skip_body()?;
                    return Err(mismatch(MismatchReason::MissingBaseline { tick: base_tick }));
                };
                let older = match header.predict_tick(tick) {
                    Some(older_tick) => match ghost.history.get(older_tick) {
                        Some(older) => Some((older_tick, older)),
                        None => {
                            section.skip_body()?;
                            return Err(mismatch(MismatchReason::MissingPredictionBaseline {
                                tick: older_tick,
                            }));
                        }
                    },
                    None => None,
                };
                let data = section.read_body(
                    header,
                    codec,
                    tick,
                    Some((base_tick, base)),
                    older,
                    registry.model(),
                )?;
                Ok(StagedSlice {
                    entity,
                    spawn: None,
                    data,
                })
            }
        }
    }

    fn commit_slice(&mut self, tick: Tick, slice: StagedSlice) -> CodecResult<()> {
        let entity = slice.entity;
        if let Some((id, ghost_type)) = slice.spawn {
            let known = self
                .ghosts
                .get(&entity)
                .is_some_and(|g| g.id == id && g.ghost_type == ghost_type);
            if !known {
                tracing::debug!(ghost = %id, %ghost_type, "ghost spawned");
                self.ghosts.insert(
                    entity,
                    ClientGhost {
                        id,
                        ghost_type,
                        history: SnapshotHistory::new(self.config.history_capacity)?,
                    },
                );
            }
            self.pending_resync.remove(&entity);
        }
        let ghost = self
            .ghosts
            .get_mut(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        ghost.history.store(tick, slice.data)
    }

    fn note_mismatch(
        &mut self,
        entity: EntityId,
        error: CodecError,
        sink: &mut impl DiagnosticsSink,
    ) {
        tracing::warn!(%entity, %error, "slice skipped");
        sink.record(ReplicationEvent::DecodeMismatch { error });
        let count = self.mismatches.entry(entity).or_insert(0);
        *count += 1;
        if *count >= self.config.mismatches_before_resync && self.pending_resync.insert(entity) {
            let ghost = self
                .ghosts
                .get(&entity)
                .map_or(GhostId::new(entity, Tick::INVALID), |g| g.id);
            tracing::info!(%entity, "requesting full resync");
            sink.record(ReplicationEvent::ResyncRequested { ghost });
        }
    }

    /// Builds the ack packet for everything received so far.
    ///
    /// Resync requests stay pending until a full slice for the entity arrives,
    /// so they repeat in every ack until then.
    pub fn build_ack_bytes(&self) -> CodecResult<Vec<u8>> {
        let resync: Vec<EntityId> = self
            .pending_resync
            .iter()
            .copied()
            .take(self.config.limits.max_resync_requests)
            .collect();
        let mut out = vec![0u8; max_ack_packet_len(resync.len())];
        let len =
            encode_ack_packet(&self.registry, &self.ack, &resync, &self.config.limits, &mut out)?;
        out.truncate(len);
        Ok(out)
    }

    /// Samples a ghost's fields at `render_tick + fraction` using each
    /// field's smoothing mode.
    ///
    /// Entity references to ghosts this client does not know come back as `None`.
    pub fn sample(
        &self,
        entity: EntityId,
        render_tick: Tick,
        fraction: f32,
    ) -> CodecResult<Vec<FieldValue>> {
        render_tick.require("render tick")?;
        let ghost = self
            .ghosts
            .get(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        let codec = self.registry.ghost_type(ghost.ghost_type)?;
        let bracket = Bracket::find(ghost.history.view(), render_tick)
            .ok_or(CodecError::UnknownEntity { entity })?;
        Ok(sample_fields(
            codec,
            &bracket,
            render_tick,
            fraction,
            self.config.max_extrapolation_ticks,
        )
        .into_iter()
        .map(|value| resolve_reference(value, self))
        .collect())
    }

    /// Writes the newest received state of every ghost through `accessor`.
    pub fn apply_latest(&self, accessor: &mut impl ComponentAccessor) -> CodecResult<()> {
        for (entity, ghost) in &self.ghosts {
            let Some((_, data)) = ghost.history.latest() else {
                continue;
            };
            crate::snapshot::restore(&self.registry, *entity, data, accessor, self)?;
        }
        Ok(())
    }

    /// Writes every ghost sampled at `render_tick + fraction` through `accessor`.
    pub fn apply_interpolated(
        &self,
        accessor: &mut impl ComponentAccessor,
        render_tick: Tick,
        fraction: f32,
    ) -> CodecResult<()> {
        for (entity, ghost) in &self.ghosts {
            let codec = self.registry.ghost_type(ghost.ghost_type)?;
            let values = self.sample(*entity, render_tick, fraction)?;
            for (field, value) in codec.fields().iter().zip(values) {
                accessor.set_value(*entity, field, value);
            }
        }
        Ok(())
    }
}

impl GhostLookup for ReplicationClient {
    fn contains(&self, ghost: GhostId) -> bool {
        self.ghosts.get(&ghost.entity).is_some_and(|g| g.id == ghost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode_snapshot_packet;
    use crate::snapshot_from_values;
    use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema};
    use wire::HEADER_SIZE;

    const BALL: GhostTypeId = GhostTypeId::new(1);

    fn registry() -> Arc<CodecRegistry> {
        let schema = Schema::new(vec![GhostTypeDef::new(BALL, "ball")
            .field(FieldDef::new("score", FieldKind::Int))
            .field(FieldDef::new("owner", FieldKind::Entity))])
        .unwrap();
        Arc::new(CodecRegistry::new(&schema).unwrap())
    }

    fn ball(registry: &CodecRegistry, score: i32, owner: Option<GhostId>) -> SnapshotData {
        let codec = registry.ghost_type(BALL).unwrap();
        snapshot_from_values(codec, &[FieldValue::Int(score), FieldValue::Entity(owner)]).unwrap()
    }

    fn ghost(id: u32) -> GhostId {
        GhostId::new(EntityId::new(id), Tick::new(1))
    }

    fn packet(
        registry: &CodecRegistry,
        tick: u32,
        despawns: &[GhostId],
        slices: &[(GhostId, &SnapshotData, Option<(u32, &SnapshotData)>)],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        let len = encode_snapshot_packet(
            registry,
            Tick::new(tick),
            despawns,
            &CodecLimits::default(),
            &mut buf,
            |section| {
                for (id, data, baseline) in slices {
                    let baseline = baseline.map(|(t, d)| (Tick::new(t), d));
                    section.write_slice(*id, data, baseline, None)?;
                }
                Ok(())
            },
        )
        .unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn full_then_delta_then_despawn() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let first = ball(&registry, 1, None);
        let second = ball(&registry, 5, None);

        let bytes = packet(&registry, 10, &[], &[(ghost(7), &first, None)]);
        assert_eq!(client.apply_snapshot_bytes(&bytes).unwrap(), Tick::new(10));
        let bytes = packet(&registry, 12, &[], &[(ghost(7), &second, Some((10, &first)))]);
        client.apply_snapshot_bytes(&bytes).unwrap();
        assert_eq!(
            client.snapshot_at(EntityId::new(7), Tick::new(12)).map(SnapshotData::words),
            Some(second.words())
        );
        assert_eq!(client.history(EntityId::new(7)).unwrap().iter().count(), 2);

        let mut events = Vec::new();
        let bytes = packet(&registry, 13, &[GhostId::new(EntityId::new(7), Tick::new(2))], &[]);
        let report = client.apply_snapshot_bytes_with(&bytes, &mut events).unwrap();
        assert_eq!(report.despawned, 0);
        let bytes = packet(&registry, 14, &[ghost(7)], &[]);
        let report = client.apply_snapshot_bytes_with(&bytes, &mut events).unwrap();
        assert_eq!(report.despawned, 1);
        assert!(client.ghost(EntityId::new(7)).is_none());
        assert_eq!(events, vec![ReplicationEvent::Despawned { ghost: ghost(7) }]);
        assert!(client.ack_state().is_acked(Tick::new(13)));
    }

    #[test]
    fn missing_baseline_skips_slice_and_requests_resync() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let a = ball(&registry, 1, None);
        let b = ball(&registry, 2, None);
        let bytes = packet(&registry, 10, &[], &[(ghost(1), &a, None), (ghost(2), &a, None)]);
        client.apply_snapshot_bytes(&bytes).unwrap();

        let mut events = Vec::new();
        for tick in [12, 13] {
            let bytes = packet(
                &registry,
                tick,
                &[],
                &[(ghost(1), &b, Some((11, &a))), (ghost(2), &b, Some((10, &a)))],
            );
            let report = client.apply_snapshot_bytes_with(&bytes, &mut events).unwrap();
            assert_eq!(report.applied, 1);
            assert_eq!(report.mismatched, 1);
        }
        assert_eq!(
            client.snapshot_at(EntityId::new(2), Tick::new(13)).map(SnapshotData::words),
            Some(b.words())
        );
        assert_eq!(client.pending_resync().collect::<Vec<_>>(), vec![EntityId::new(1)]);
        assert!(events.contains(&ReplicationEvent::ResyncRequested { ghost: ghost(1) }));

        let ack = crate::ack::decode_ack_packet(
            &registry,
            &client.build_ack_bytes().unwrap(),
            &wire::Limits::default(),
            &CodecLimits::default(),
        )
        .unwrap();
        assert_eq!(ack.resync, vec![EntityId::new(1)]);
        assert_eq!(ack.ack.last_received(), Tick::new(13));

        let bytes = packet(&registry, 14, &[], &[(ghost(1), &b, None)]);
        client.apply_snapshot_bytes(&bytes).unwrap();
        assert_eq!(client.pending_resync().count(), 0);
    }

    #[test]
    fn unknown_ghost_delta_is_mismatch() {
        let registry = registry();
        let config = ClientConfig {
            mismatches_before_resync: 1,
            ..ClientConfig::default()
        };
        let mut client = ReplicationClient::new(Arc::clone(&registry), config).unwrap();
        let a = ball(&registry, 1, None);
        let bytes = packet(&registry, 10, &[], &[(ghost(4), &a, Some((9, &a)))]);
        let report = client
            .apply_snapshot_bytes_with(&bytes, &mut NullDiagnostics)
            .unwrap();
        assert_eq!(report.mismatched, 1);
        assert_eq!(client.pending_resync().collect::<Vec<_>>(), vec![EntityId::new(4)]);
    }

    #[test]
    fn stale_incarnation_is_rejected() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let a = ball(&registry, 1, None);
        let newer = GhostId::new(EntityId::new(3), Tick::new(20));
        let older = GhostId::new(EntityId::new(3), Tick::new(5));
        client
            .apply_snapshot_bytes(&packet(&registry, 21, &[], &[(newer, &a, None)]))
            .unwrap();
        let report = client
            .apply_snapshot_bytes_with(&packet(&registry, 22, &[], &[(older, &a, None)]), &mut NullDiagnostics)
            .unwrap();
        assert_eq!(report.mismatched, 1);
        assert_eq!(client.ghost(EntityId::new(3)).unwrap().id, newer);
    }

    #[test]
    fn references_resolve_against_known_ghosts() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let pointing = ball(&registry, 0, Some(ghost(2)));
        let target = ball(&registry, 0, None);
        client
            .apply_snapshot_bytes(&packet(&registry, 10, &[], &[(ghost(1), &pointing, None)]))
            .unwrap();
        let values = client.sample(EntityId::new(1), Tick::new(10), 0.0).unwrap();
        assert_eq!(values[1], FieldValue::Entity(None));

        client
            .apply_snapshot_bytes(&packet(&registry, 11, &[], &[(ghost(2), &target, None)]))
            .unwrap();
        let values = client.sample(EntityId::new(1), Tick::new(11), 0.0).unwrap();
        assert_eq!(values[1], FieldValue::Entity(Some(ghost(2))));

        let mut world = crate::MemoryComponents::new();
        client.apply_latest(&mut world).unwrap();
        assert_eq!(world.get(EntityId::new(1), "owner"), Some(&FieldValue::Entity(Some(ghost(2)))));
        client
            .apply_interpolated(&mut world, Tick::new(11), 0.5)
            .unwrap();
        assert_eq!(world.get(EntityId::new(2), "score"), Some(&FieldValue::Int(0)));
    }

    #[test]
    fn corrupt_packet_is_not_acked() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let a = ball(&registry, 1, None);
        let mut bytes = packet(&registry, 10, &[], &[(ghost(1), &a, None)]);
        bytes.truncate(bytes.len() - 1);
        assert!(client.apply_snapshot_bytes(&bytes).is_err());
        assert!(!client.last_received().is_valid());
    }

    #[test]
    fn corrupt_slice_rejects_the_whole_packet() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let a = ball(&registry, 1, None);
        let b = ball(&registry, 2, None);
        client
            .apply_snapshot_bytes(&packet(&registry, 10, &[], &[(ghost(9), &a, None)]))
            .unwrap();

        let mut bytes = packet(
            &registry,
            11,
            &[ghost(9)],
            &[(ghost(1), &a, None), (ghost(2), &b, None)],
        );
        // Overwrite the second slice's ghost type with one the schema lacks.
        let despawn_len = usize::from(bytes[HEADER_SIZE + 1]);
        let body = HEADER_SIZE + 2 + despawn_len + 2;
        let (first_body, second_type_bit) = {
            let mut section = GhostSectionReader::new(&bytes[body..], &CodecLimits::default())
                .unwrap();
            let first = section.next_header(registry.model()).unwrap().unwrap();
            let first_body = usize::from(first.body_bits);
            (first_body, 16 + (2 + 32 + 32 + 16 + 16) + first_body + 2 + 32 + 32)
        };
        assert!(first_body > 0);
        for i in 0..16 {
            let bit = second_type_bit + i;
            bytes[body + bit / 8] |= 0x80 >> (bit % 8);
        }

        let mut events = Vec::new();
        let err = client
            .apply_snapshot_bytes_with(&bytes, &mut events)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownGhostType {
                ghost_type: GhostTypeId::new(u16::MAX)
            }
        );
        assert!(events.is_empty());
        assert!(client.ghost(EntityId::new(9)).is_some());
        assert!(client.ghost(EntityId::new(1)).is_none());
        assert!(!client.ack_state().is_acked(Tick::new(11)));
        assert_eq!(client.last_received(), Tick::new(10));

        let bytes = packet(
            &registry,
            11,
            &[ghost(9)],
            &[(ghost(1), &a, None), (ghost(2), &b, None)],
        );
        client.apply_snapshot_bytes(&bytes).unwrap();
        assert!(client.ghost(EntityId::new(9)).is_none());
        assert_eq!(
            client.snapshot_at(EntityId::new(2), Tick::new(11)).map(SnapshotData::words),
            Some(b.words())
        );
    }

    #[test]
    fn skipped_slice_still_acks_and_later_resyncs() {
        let registry = registry();
        let mut client = ReplicationClient::new(Arc::clone(&registry), ClientConfig::default())
            .unwrap();
        let a = ball(&registry, 1, None);
        let b = ball(&registry, 2, None);
        client
            .apply_snapshot_bytes(&packet(&registry, 10, &[], &[(ghost(1), &a, None)]))
            .unwrap();

        let bytes = packet(&registry, 12, &[], &[(ghost(1), &b, Some((11, &a)))]);
        let report = client
            .apply_snapshot_bytes_with(&bytes, &mut NullDiagnostics)
            .unwrap();
        assert_eq!(report.mismatched, 1);
        assert!(client.ack_state().is_acked(Tick::new(12)));
        assert!(client.snapshot_at(EntityId::new(1), Tick::new(12)).is_none());
        assert_eq!(client.pending_resync().count(), 0);

        // The server picks the acked tick as baseline; that slice mismatches too.
        let bytes = packet(&registry, 13, &[], &[(ghost(1), &b, Some((12, &b)))]);
        let report = client
            .apply_snapshot_bytes_with(&bytes, &mut NullDiagnostics)
            .unwrap();
        assert_eq!(report.mismatched, 1);
        assert_eq!(client.pending_resync().collect::<Vec<_>>(), vec![EntityId::new(1)]);
    }

    #[test]
    fn rejects_bad_history_capacity() {
        let config = ClientConfig {
            history_capacity: 10,
            ..ClientConfig::default()
        };
        assert!(matches!(
            ReplicationClient::new(registry(), config),
            Err(CodecError::InvalidHistoryCapacity { .. })
        ));
    }
}
