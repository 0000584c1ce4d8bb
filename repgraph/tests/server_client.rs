use std::sync::Arc;

use codec::{
    ClientConfig, CodecRegistry, EntityId, FieldValue, MemoryComponents, ReplicationClient,
    ReplicationEvent, Tick,
};
use glam::Vec3;
use repgraph::{
    ConnectionId, DistanceImportance, RelevancyMode, ReplicationConfig, ReplicationServer,
};
use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema, Smoothing};

const UNIT: GhostTypeId = GhostTypeId::new(1);

fn registry() -> Arc<CodecRegistry> {
    let schema = Schema::new(vec![GhostTypeDef::new(UNIT, "unit")
        .importance(4)
        .field(
            FieldDef::new("pos", FieldKind::Vector3)
                .quantized(100)
                .smoothing(Smoothing::Interpolate),
        )
        .field(FieldDef::new("hp", FieldKind::Int))
        .field(FieldDef::new("target", FieldKind::Entity))])
    .unwrap();
    Arc::new(CodecRegistry::new(&schema).unwrap())
}

fn unit_world(count: u32, tick: u32) -> MemoryComponents {
    let mut world = MemoryComponents::new();
    for id in 0..count {
        let entity = EntityId::new(id);
        world.insert_entity(entity);
        world.set(
            entity,
            "pos",
            FieldValue::Vector3(Vec3::new(id as f32 * 10.0 + tick as f32 * 0.25, 0.0, 0.0)),
        );
        world.set(entity, "hp", FieldValue::Int(100 - (tick % 7) as i32));
        world.set(entity, "target", FieldValue::Entity(None));
    }
    world
}

fn setup(count: u32) -> (ReplicationServer, ReplicationClient) {
    let registry = registry();
    let mut server =
        ReplicationServer::new(Arc::clone(&registry), ReplicationConfig::default()).unwrap();
    for id in 0..count {
        server.spawn(EntityId::new(id), UNIT, Tick::new(1)).unwrap();
    }
    server
        .add_connection(ConnectionId(1), RelevancyMode::AllExcept)
        .unwrap();
    let client = ReplicationClient::new(registry, ClientConfig::default()).unwrap();
    (server, client)
}

#[test]
fn lossy_link_converges() {
    let (mut server, mut client) = setup(8);
    let unit = server.registry().ghost_type(UNIT).unwrap().clone();

    for tick in 1..=60u32 {
        let world = unit_world(8, tick);
        server.capture(Tick::new(tick), &world).unwrap();
        let bytes = server.build_snapshot_bytes(ConnectionId(1), 1200).unwrap();
        // Every fourth packet and every fifth ack are lost.
        if tick % 4 == 0 {
            continue;
        }
        let mut events = Vec::new();
        let report = client.apply_snapshot_bytes_with(&bytes, &mut events).unwrap();
        assert_eq!(report.mismatched, 0, "tick {tick}: {events:?}");
        if tick % 5 != 0 {
            let ack = client.build_ack_bytes().unwrap();
            server.receive_ack_bytes(ConnectionId(1), &ack).unwrap();
        }
    }

    let last = unit_world(8, 59);
    for id in 0..8 {
        let entity = EntityId::new(id);
        let snapshot = client.snapshot_at(entity, Tick::new(59)).unwrap();
        let expected = codec::snapshot_from_values(
            &unit,
            &[
                last.get(entity, "pos").unwrap().clone(),
                last.get(entity, "hp").unwrap().clone(),
                FieldValue::Entity(None),
            ],
        )
        .unwrap();
        assert_eq!(snapshot.words(), expected.words());
    }
}

#[test]
fn budget_defers_and_eventually_sends_everyone() {
    let (mut server, mut client) = setup(12);
    let mut events = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for tick in 1..=6u32 {
        server.capture(Tick::new(tick), &unit_world(12, tick)).unwrap();
        let bytes = server
            .build_snapshot_bytes_with(ConnectionId(1), 160, &mut events)
            .unwrap();
        assert!(bytes.len() <= 160);
        client.apply_snapshot_bytes(&bytes).unwrap();
        seen.extend(client.ghosts().map(|g| g.id.entity));
    }
    assert_eq!(seen.len(), 12);
    assert!(events
        .iter()
        .any(|e| matches!(e, ReplicationEvent::Deferred { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ReplicationEvent::SnapshotBuilt { deferred, .. } if *deferred > 0
    )));
}

#[test]
fn despawn_reaches_client_and_is_retired_by_ack() {
    let (mut server, mut client) = setup(2);
    server.capture(Tick::new(1), &unit_world(2, 1)).unwrap();
    client
        .apply_snapshot_bytes(&server.build_snapshot_bytes(ConnectionId(1), 512).unwrap())
        .unwrap();
    assert!(client.ghost(EntityId::new(1)).is_some());

    let ghost = server.despawn(EntityId::new(1)).unwrap();
    server.capture(Tick::new(2), &unit_world(2, 2)).unwrap();
    let bytes = server.build_snapshot_bytes(ConnectionId(1), 512).unwrap();
    let mut events = Vec::new();
    client.apply_snapshot_bytes_with(&bytes, &mut events).unwrap();
    assert!(client.ghost(EntityId::new(1)).is_none());
    assert!(events.contains(&ReplicationEvent::Despawned { ghost }));

    let connection = server.connection(ConnectionId(1)).unwrap();
    assert_eq!(connection.pending_despawns().count(), 1);
    server
        .receive_ack_bytes(ConnectionId(1), &client.build_ack_bytes().unwrap())
        .unwrap();
    let connection = server.connection(ConnectionId(1)).unwrap();
    assert_eq!(connection.pending_despawns().count(), 0);
}

#[test]
fn only_listed_mode_and_distance_ranking() {
    let registry = registry();
    let config = ReplicationConfig {
        distance_importance: Some(DistanceImportance {
            tile_size: 10.0,
            max_tiles: 8,
        }),
        ..ReplicationConfig::default()
    };
    let mut server = ReplicationServer::new(Arc::clone(&registry), config).unwrap();
    for id in 0..3 {
        server.spawn(EntityId::new(id), UNIT, Tick::new(1)).unwrap();
        server
            .set_position(EntityId::new(id), Vec3::new(id as f32 * 10.0, 0.0, 0.0))
            .unwrap();
    }
    let id = ConnectionId(3);
    server.add_connection(id, RelevancyMode::OnlyListed).unwrap();
    server.set_view(id, Vec3::new(20.0, 0.0, 0.0)).unwrap();
    server.relevancy_mut(id).unwrap().insert(EntityId::new(0));
    server.relevancy_mut(id).unwrap().insert(EntityId::new(2));

    server.capture(Tick::new(1), &unit_world(3, 1)).unwrap();
    let mut client = ReplicationClient::new(registry, ClientConfig::default()).unwrap();
    client
        .apply_snapshot_bytes(&server.build_snapshot_bytes(id, 512).unwrap())
        .unwrap();
    let mut known: Vec<u32> = client.ghosts().map(|g| g.id.entity.raw()).collect();
    known.sort_unstable();
    assert_eq!(known, vec![0, 2]);

    // Nothing fits; entity 2 sits on the view and outranks entity 0 two tiles away.
    server.capture(Tick::new(2), &unit_world(3, 2)).unwrap();
    server.build_snapshot_bytes(id, 40).unwrap();
    let connection = server.connection(id).unwrap();
    assert_eq!(connection.priority(EntityId::new(2)), Some(4));
    assert_eq!(connection.priority(EntityId::new(0)), Some(1));
}

#[test]
fn resync_request_forces_full_slice() {
    let (mut server, mut client) = setup(1);
    for tick in 1..=3u32 {
        server.capture(Tick::new(tick), &unit_world(1, tick)).unwrap();
        let bytes = server.build_snapshot_bytes(ConnectionId(1), 512).unwrap();
        client.apply_snapshot_bytes(&bytes).unwrap();
        server
            .receive_ack_bytes(ConnectionId(1), &client.build_ack_bytes().unwrap())
            .unwrap();
    }

    // A client that lost its state asks for everything again.
    let config = ClientConfig {
        mismatches_before_resync: 1,
        ..ClientConfig::default()
    };
    let mut fresh = ReplicationClient::new(registry(), config).unwrap();
    server.capture(Tick::new(4), &unit_world(1, 4)).unwrap();
    let bytes = server.build_snapshot_bytes(ConnectionId(1), 512).unwrap();
    fresh.apply_snapshot_bytes(&bytes).unwrap();
    assert_eq!(fresh.pending_resync().count(), 1);

    let resynced = server
        .receive_ack_bytes(ConnectionId(1), &fresh.build_ack_bytes().unwrap())
        .unwrap();
    assert_eq!(resynced, 1);
    server.capture(Tick::new(5), &unit_world(1, 5)).unwrap();
    fresh
        .apply_snapshot_bytes(&server.build_snapshot_bytes(ConnectionId(1), 512).unwrap())
        .unwrap();
    assert!(fresh.snapshot_at(EntityId::new(0), Tick::new(5)).is_some());
    assert_eq!(fresh.pending_resync().count(), 0);
}

#[test]
fn parallel_build_matches_sequential() {
    let registry = registry();
    let mut a = ReplicationServer::new(Arc::clone(&registry), ReplicationConfig::default()).unwrap();
    let mut b = ReplicationServer::new(Arc::clone(&registry), ReplicationConfig::default()).unwrap();
    for server in [&mut a, &mut b] {
        for id in 0..16 {
            server.spawn(EntityId::new(id), UNIT, Tick::new(1)).unwrap();
        }
        for conn in 0..4 {
            server
                .add_connection(ConnectionId(conn), RelevancyMode::AllExcept)
                .unwrap();
        }
        server.relevancy_mut(ConnectionId(2)).unwrap().insert(EntityId::new(5));
        server.capture(Tick::new(1), &unit_world(16, 1)).unwrap();
    }

    let parallel = a.build_all(400);
    assert_eq!(parallel.len(), 4);
    for (id, bytes) in parallel {
        let sequential = b.build_snapshot_bytes(id, 400).unwrap();
        assert_eq!(bytes.unwrap(), sequential);
    }
}
