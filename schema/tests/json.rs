#![cfg(feature = "serde")]

use schema::{schema_hash, FieldKind, Quantization, Schema, Smoothing, StringCapacity};

const PLAYER_SCHEMA: &str = r#"{
    "ghost_types": [
        {
            "id": 1,
            "name": "player",
            "importance": 10,
            "fields": [
                { "name": "pos", "kind": "Vector3", "quantization": { "Factor": 100 }, "smoothing": "Interpolate" },
                { "name": "hp", "kind": "Int" },
                { "name": "tag", "kind": { "FixedString": "Bytes32" } },
                { "name": "scratch", "kind": "Float", "replicated": false }
            ]
        },
        {
            "id": 2,
            "name": "inventory",
            "kind": "Buffer",
            "fields": [
                { "name": "item", "kind": "UInt" }
            ]
        }
    ]
}"#;

#[test]
fn schema_loads_from_json() {
    let schema: Schema = serde_json::from_str(PLAYER_SCHEMA).unwrap();
    schema.validate().unwrap();

    let player = &schema.ghost_types[0];
    assert_eq!(player.importance, 10);
    assert_eq!(player.fields[0].quantization, Quantization::Factor(100));
    assert_eq!(player.fields[0].smoothing, Smoothing::Interpolate);
    assert_eq!(player.fields[1].smoothing, Smoothing::Clamp);
    assert_eq!(
        player.fields[2].kind,
        FieldKind::FixedString(StringCapacity::Bytes32)
    );
    assert!(player.fields[1].replicated);
    assert!(!player.fields[3].replicated);
    assert_eq!(schema.ghost_types[1].importance, 1);
}

#[test]
fn json_roundtrip_preserves_hash() {
    let schema: Schema = serde_json::from_str(PLAYER_SCHEMA).unwrap();
    let text = serde_json::to_string(&schema).unwrap();
    let again: Schema = serde_json::from_str(&text).unwrap();
    assert_eq!(schema_hash(&schema), schema_hash(&again));
}
