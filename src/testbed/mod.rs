pub mod client;
pub mod types;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::slice::{SliceRecord, SliceSelector, SliceSubmission};
use crate::models::Record;

pub use client::OrchestratorClient;

/// Typed error for "resource not found" so callers can downcast instead of
/// matching on message text.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Topology resource collections the testbed publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Sites,
    Hosts,
    FacilityPorts,
    Links,
}

impl ResourceKind {
    pub const ALL: &'static [ResourceKind] = &[
        ResourceKind::Sites,
        ResourceKind::Hosts,
        ResourceKind::FacilityPorts,
        ResourceKind::Links,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Sites => "sites",
            ResourceKind::Hosts => "hosts",
            ResourceKind::FacilityPorts => "facility_ports",
            ResourceKind::Links => "links",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == kind || k.as_str().replace('_', "-") == kind)
    }
}

/// Slice listing arguments understood by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct SliceQuery {
    pub as_self: bool,
    pub exclude_states: Vec<String>,
    pub limit: usize,
}

/// Everything the tool server needs from the provisioning backend.
///
/// `token` is the caller's bearer token; background work passes `None` and
/// relies on whatever the backend allows anonymously.
#[async_trait]
pub trait Testbed: Send + Sync {
    async fn list_resources(
        &self,
        token: Option<&str>,
        kind: ResourceKind,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Submit a new slice without waiting for it to become ready; returns its id
    async fn create_slice(&self, token: Option<&str>, submission: &SliceSubmission) -> Result<String>;

    async fn get_slice(
        &self,
        token: Option<&str>,
        selector: &SliceSelector,
    ) -> Result<Option<SliceRecord>>;

    async fn modify_slice(
        &self,
        token: Option<&str>,
        slice_id: &str,
        submission: &SliceSubmission,
    ) -> Result<()>;

    async fn accept_modify(&self, token: Option<&str>, slice_id: &str) -> Result<Value>;

    async fn renew_slice(&self, token: Option<&str>, slice_id: &str, lease_end_time: &str) -> Result<()>;

    async fn delete_slice(&self, token: Option<&str>, slice_id: &str) -> Result<()>;

    async fn list_slices(&self, token: Option<&str>, query: &SliceQuery) -> Result<Vec<Record>>;
}
