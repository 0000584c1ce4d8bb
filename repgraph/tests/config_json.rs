#![cfg(feature = "serde")]

use repgraph::ReplicationConfig;

#[test]
fn config_loads_with_defaults() {
    let config: ReplicationConfig =
        serde_json::from_str(r#"{ "history_capacity": 32, "distance_importance": null }"#).unwrap();
    assert_eq!(config.history_capacity, 32);
    assert!(config.distance_importance.is_none());
    assert_eq!(config.max_entities, ReplicationConfig::default().max_entities);
}
