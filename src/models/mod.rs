pub mod catalog;
pub mod query;
pub mod slice;
pub mod topology;

/// A loosely typed record as returned by the orchestrator's listing endpoints
pub type Record = serde_json::Map<String, serde_json::Value>;
