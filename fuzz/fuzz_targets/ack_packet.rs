#![no_main]

use codec::{decode_ack_packet, CodecLimits, CodecRegistry};
use libfuzzer_sys::fuzz_target;
use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema};

fuzz_target!(|data: &[u8]| {
    let schema = Schema::new(vec![GhostTypeDef::new(GhostTypeId::new(1), "unit")
        .field(FieldDef::new("hp", FieldKind::Int))])
    .unwrap();
    let registry = CodecRegistry::new(&schema).unwrap();
    let _ = decode_ack_packet(
        &registry,
        data,
        &wire::Limits::for_testing(),
        &CodecLimits::for_testing(),
    );
});
