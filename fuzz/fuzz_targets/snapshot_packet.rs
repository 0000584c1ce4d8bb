#![no_main]

use std::sync::Arc;

use codec::{ClientConfig, CodecLimits, CodecRegistry, ReplicationClient};
use libfuzzer_sys::fuzz_target;
use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema, StringCapacity};

fn registry() -> Arc<CodecRegistry> {
    let schema = Schema::new(vec![
        GhostTypeDef::new(GhostTypeId::new(1), "unit")
            .field(FieldDef::new("pos", FieldKind::Vector3).quantized(100))
            .field(FieldDef::new("hp", FieldKind::Int))
            .field(FieldDef::new("target", FieldKind::Entity)),
        GhostTypeDef::new(GhostTypeId::new(2), "sign")
            .field(FieldDef::new("text", FieldKind::FixedString(StringCapacity::Bytes32)))
            .field(FieldDef::new("big", FieldKind::ULong))
            .field(FieldDef::new("angle", FieldKind::Float)),
    ])
    .unwrap();
    Arc::new(CodecRegistry::new(&schema).unwrap())
}

fuzz_target!(|data: &[u8]| {
    let registry = registry();
    let config = ClientConfig {
        limits: CodecLimits::for_testing(),
        wire_limits: wire::Limits::for_testing(),
        ..ClientConfig::default()
    };
    let mut client = ReplicationClient::new(registry, config).unwrap();

    // Stamp the registry's schema hash so frames get past the header check.
    let hash = client.registry().schema_hash().to_le_bytes();
    let mut idx = 0usize;
    while idx < data.len() && idx < 4096 {
        let len = (data[idx] as usize % 200).saturating_add(1);
        idx += 1;
        let end = (idx + len).min(data.len());
        let mut frame = data[idx..end].to_vec();
        idx = end;
        if frame.len() >= 16 {
            frame[8..16].copy_from_slice(&hash);
        }
        let _ = client.apply_snapshot_bytes(&frame);
        let _ = client.build_ack_bytes();
    }
});
