//! Server and client over a seeded lossy link.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use codec::{
    ClientConfig, CodecRegistry, ComponentAccessor, EntityId, FieldDescriptor, FieldValue,
    GhostId, ReplicationClient, ReplicationEvent, Tick,
};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use repgraph::{ConnectionId, RelevancyMode, ReplicationConfig, ReplicationServer};
use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema, SchemaResult, Smoothing};
use serde::{Deserialize, Serialize};

const UNIT: GhostTypeId = GhostTypeId::new(1);
const LINK: ConnectionId = ConnectionId(1);

/// Simulation parameters, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub ticks: u32,
    pub entities: u32,
    /// Probability that a snapshot packet is dropped.
    pub snapshot_loss: f64,
    /// Probability that an ack packet is dropped.
    pub ack_loss: f64,
    pub seed: u64,
    pub budget_bytes: usize,
    /// Every this many ticks one entity is despawned and respawned; 0 disables.
    pub respawn_every: u32,
    pub server: ReplicationConfig,
    pub client: ClientConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ticks: 300,
            entities: 32,
            snapshot_loss: 0.1,
            ack_loss: 0.1,
            seed: 1,
            budget_bytes: 1200,
            respawn_every: 50,
            server: ReplicationConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// What happened on the link.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub ticks: u32,
    pub packets_sent: u32,
    pub packets_lost: u32,
    pub acks_lost: u32,
    pub bytes_sent: u64,
    pub max_packet_bytes: usize,
    pub mean_packet_bytes: f64,
    pub slices_sent: usize,
    pub deferred: usize,
    pub encode_failures: usize,
    pub mismatches: usize,
    pub resync_requests: usize,
    /// Ghosts the server reset to a full slice after a resync request.
    pub resyncs: usize,
    pub despawns: usize,
    /// Ghosts whose newest client snapshot equals the server's at that tick.
    pub in_sync: usize,
    pub entities: usize,
}

/// The schema every simulated entity uses.
pub fn unit_schema() -> SchemaResult<Schema> {
    Schema::new(vec![GhostTypeDef::new(UNIT, "unit")
        .importance(4)
        .field(
            FieldDef::new("pos", FieldKind::Vector3)
                .quantized(100)
                .smoothing(Smoothing::InterpolateAndExtrapolate)
                .max_smoothing_distance(25.0),
        )
        .field(FieldDef::new("vel", FieldKind::Vector3).local())
        .field(FieldDef::new("hp", FieldKind::Int))
        .field(FieldDef::new("target", FieldKind::Entity))])
}

#[derive(Debug, Clone)]
struct Unit {
    ghost: GhostId,
    pos: Vec3,
    vel: Vec3,
    hp: i32,
    target: Option<GhostId>,
}

/// Authoritative world state, read by the server through [`ComponentAccessor`].
#[derive(Debug)]
struct World {
    units: Vec<Unit>,
}

impl World {
    fn new(count: u32, rng: &mut StdRng) -> Self {
        let units = (0..count)
            .map(|i| Unit {
                ghost: GhostId::new(EntityId::new(i), Tick::new(1)),
                pos: random_vec(rng, 100.0),
                vel: random_vec(rng, 1.0),
                hp: 100,
                target: None,
            })
            .collect();
        Self { units }
    }

    fn step(&mut self, rng: &mut StdRng) {
        let count = self.units.len();
        for i in 0..count {
            if rng.gen_bool(0.05) {
                self.units[i].vel = random_vec(rng, 1.0);
            }
            if rng.gen_bool(0.02) {
                let other = rng.gen_range(0..count);
                let target = (other != i).then(|| self.units[other].ghost);
                self.units[i].target = target;
            }
            let unit = &mut self.units[i];
            unit.pos += unit.vel;
            if rng.gen_bool(0.05) {
                unit.hp -= rng.gen_range(1..20);
                if unit.hp <= 0 {
                    unit.hp = 100;
                }
            }
        }
    }

    fn respawn(&mut self, index: usize, tick: Tick, rng: &mut StdRng) -> GhostId {
        let old = self.units[index].ghost;
        let ghost = GhostId::new(old.entity, tick);
        self.units[index] = Unit {
            ghost,
            pos: random_vec(rng, 100.0),
            vel: random_vec(rng, 1.0),
            hp: 100,
            target: None,
        };
        for unit in &mut self.units {
            if unit.target == Some(old) {
                unit.target = None;
            }
        }
        ghost
    }

    fn unit(&self, entity: EntityId) -> Option<&Unit> {
        self.units.get(entity.raw() as usize)
    }
}

impl ComponentAccessor for World {
    fn get_value(&self, entity: EntityId, field: &FieldDescriptor) -> Option<FieldValue> {
        let unit = self.unit(entity)?;
        match field.name.as_str() {
            "pos" => Some(FieldValue::Vector3(unit.pos)),
            "vel" => Some(FieldValue::Vector3(unit.vel)),
            "hp" => Some(FieldValue::Int(unit.hp)),
            "target" => Some(FieldValue::Entity(unit.target)),
            _ => None,
        }
    }

    fn set_value(&mut self, entity: EntityId, field: &FieldDescriptor, value: FieldValue) {
        let Some(unit) = self.units.get_mut(entity.raw() as usize) else {
            return;
        };
        match (field.name.as_str(), value) {
            ("pos", FieldValue::Vector3(v)) => unit.pos = v,
            ("vel", FieldValue::Vector3(v)) => unit.vel = v,
            ("hp", FieldValue::Int(v)) => unit.hp = v,
            ("target", FieldValue::Entity(v)) => unit.target = v,
            _ => {}
        }
    }
}

fn random_vec(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        0.0,
        rng.gen_range(-extent..extent),
    )
}

/// Runs one connection for `config.ticks` ticks.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationReport> {
    ensure!(
        (0.0..=1.0).contains(&config.snapshot_loss) && (0.0..=1.0).contains(&config.ack_loss),
        "loss probabilities must lie in [0, 1]"
    );
    ensure!(config.entities > 0, "at least one entity is required");

    let schema = unit_schema().context("build unit schema")?;
    let registry = Arc::new(CodecRegistry::new(&schema).context("build codec registry")?);
    let mut server = ReplicationServer::new(Arc::clone(&registry), config.server.clone())
        .context("create server")?;
    let mut client =
        ReplicationClient::new(registry, config.client.clone()).context("create client")?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut world = World::new(config.entities, &mut rng);

    for unit in &world.units {
        server.spawn(unit.ghost.entity, UNIT, unit.ghost.spawn_tick)?;
    }
    server.add_connection(LINK, RelevancyMode::AllExcept)?;
    server.set_view(LINK, Vec3::ZERO)?;

    let mut report = SimulationReport {
        ticks: config.ticks,
        entities: world.units.len(),
        ..SimulationReport::default()
    };
    let mut events = Vec::new();
    for raw in 1..=config.ticks {
        let tick = Tick::new(raw);
        world.step(&mut rng);
        if config.respawn_every > 0 && raw % config.respawn_every == 0 {
            let index = (raw / config.respawn_every) as usize % world.units.len();
            let entity = world.units[index].ghost.entity;
            server.despawn(entity)?;
            let ghost = world.respawn(index, tick, &mut rng);
            server.spawn(entity, UNIT, ghost.spawn_tick)?;
            tracing::debug!(%ghost, "respawned");
        }
        for unit in &world.units {
            server.set_position(unit.ghost.entity, unit.pos)?;
        }
        server.capture(tick, &world)?;

        let packet = server.build_snapshot_bytes_with(LINK, config.budget_bytes, &mut events)?;
        report.packets_sent += 1;
        report.bytes_sent += packet.len() as u64;
        report.max_packet_bytes = report.max_packet_bytes.max(packet.len());
        if rng.gen_bool(config.snapshot_loss) {
            report.packets_lost += 1;
            continue;
        }
        client
            .apply_snapshot_bytes_with(&packet, &mut events)
            .with_context(|| format!("apply snapshot {tick}"))?;
        let ack = client.build_ack_bytes()?;
        if rng.gen_bool(config.ack_loss) {
            report.acks_lost += 1;
            continue;
        }
        report.resyncs += server.receive_ack_bytes(LINK, &ack)?;
    }

    for event in &events {
        match event {
            ReplicationEvent::SnapshotBuilt { sent, .. } => report.slices_sent += sent,
            ReplicationEvent::Deferred { .. } => report.deferred += 1,
            ReplicationEvent::EncodeFailed { .. } => report.encode_failures += 1,
            ReplicationEvent::DecodeMismatch { .. } => report.mismatches += 1,
            ReplicationEvent::ResyncRequested { .. } => report.resync_requests += 1,
            ReplicationEvent::Despawned { .. } => report.despawns += 1,
        }
    }
    if report.packets_sent > 0 {
        report.mean_packet_bytes = report.bytes_sent as f64 / f64::from(report.packets_sent);
    }
    report.in_sync = server
        .ghosts()
        .filter(|ghost| {
            let Some(client_ghost) = client.ghost(ghost.entity) else {
                return false;
            };
            let Some((tick, data)) = client_ghost.history().latest() else {
                return false;
            };
            client_ghost.id == *ghost
                && server
                    .fetch_authoritative(ghost.entity, tick, 0)
                    .is_some_and(|(at, expected)| at == tick && expected.words() == data.words())
        })
        .count();

    tracing::info!(
        sent = report.packets_sent,
        lost = report.packets_lost,
        bytes = report.bytes_sent,
        resyncs = report.resyncs,
        in_sync = report.in_sync,
        "simulation finished"
    );
    Ok(report)
}
