pub mod cassandra;

pub use cassandra::{
    Cassandra, CassandraSpec, CassandraStatus, ClusterCondition, ClusterPhase, ConditionStatus,
    ConditionType, EnvOverride,
};

/// Conditions are a map keyed by `type`, so server-side apply merges them per entry.
pub fn conditions_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": { "format": "date-time", "type": "string" },
                "lastUpdateTime": { "format": "date-time", "type": "string" },
                "message": { "type": "string" },
                "reason": { "type": "string" },
                "status": { "type": "string", "enum": ["True", "False", "Unknown"] },
                "type": { "type": "string", "enum": ["Available", "Scaling"] }
            },
            "required": [
                "lastTransitionTime",
                "lastUpdateTime",
                "status",
                "type"
            ],
        },
    }))
    .expect("conditions schema is valid json")
}
