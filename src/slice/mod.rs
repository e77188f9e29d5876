pub mod compiler;
pub mod error;
pub mod graph;
pub mod interface;
pub mod network_type;
pub mod site;

pub use compiler::{CompileOptions, CompiledSlice};
pub use error::TopologyError;
pub use graph::SliceGraph;

use crate::models::query::MAX_LIMIT;
use crate::models::slice::{
    BuildSliceRequest, ModifySliceRequest, SliceIdentifiers, SliceSubmission, SubmissionResult,
};
use crate::testbed::{ResourceKind, Testbed};
use site::SiteCapacity;

/// Compile a topology and submit it as a new slice. Returns as soon as the
/// orchestrator accepts the request; it never waits for the slice to be ready.
pub async fn build_slice(
    testbed: &dyn Testbed,
    token: Option<&str>,
    request: BuildSliceRequest,
    options: CompileOptions,
) -> Result<SubmissionResult, TopologyError> {
    request.validate()?;

    let sites = if compiler::needs_site_selection(&request.topology.nodes) {
        tracing::info!("Pre-fetching available sites for auto-selection");
        fetch_site_pool(testbed, token).await?
    } else {
        Vec::new()
    };

    let topology = request.topology.clone();
    let compiled = run_pass(move || {
        let mut rng = rand::thread_rng();
        compiler::compile_topology(&topology, &sites, options, &mut rng)
    })
    .await?;

    let submission = SliceSubmission {
        name: request.name.clone(),
        graph: compiled.graph,
        ssh_keys: request.ssh_keys.clone(),
        lease_in_hours: request.lease_in_hours(),
        lease_start_time: request.lease_start_time.clone(),
        lease_end_time: request.lease_end_time.clone(),
    };

    tracing::info!("Submitting slice {}", request.name);
    let slice_id = testbed
        .create_slice(token, &submission)
        .await
        .map_err(TopologyError::Upstream)?;
    tracing::info!("Slice {} submitted with ID: {}", request.name, slice_id);

    Ok(SubmissionResult {
        status: SubmissionResult::SUBMITTED.to_string(),
        identifiers: SliceIdentifiers {
            name: request.name,
            id: slice_id,
        },
        added: compiled.added,
        removed: None,
    })
}

/// Apply removals and additions to an existing slice and submit the result
pub async fn modify_slice(
    testbed: &dyn Testbed,
    token: Option<&str>,
    request: ModifySliceRequest,
    options: CompileOptions,
) -> Result<SubmissionResult, TopologyError> {
    request.validate()?;
    let selector = request.selector()?;

    let existing = testbed
        .get_slice(token, &selector)
        .await
        .map_err(TopologyError::Upstream)?
        .ok_or_else(|| TopologyError::unknown_reference(format!("slice not found: {}", selector)))?;
    tracing::info!("Modifying slice: {} ({})", existing.name, existing.id);

    let sites = if compiler::needs_site_selection(&request.add_nodes) {
        tracing::info!("Pre-fetching available sites for auto-selection");
        fetch_site_pool(testbed, token).await?
    } else {
        Vec::new()
    };

    let graph = existing.graph;
    let compiled = run_pass(move || {
        let mut rng = rand::thread_rng();
        compiler::apply_modifications(graph, &request, &sites, options, &mut rng)
    })
    .await?;

    let submission = SliceSubmission {
        name: existing.name.clone(),
        graph: compiled.graph,
        ssh_keys: Vec::new(),
        lease_in_hours: None,
        lease_start_time: None,
        lease_end_time: None,
    };

    tracing::info!("Submitting slice modifications for {}", existing.name);
    testbed
        .modify_slice(token, &existing.id, &submission)
        .await
        .map_err(TopologyError::Upstream)?;

    Ok(SubmissionResult {
        status: SubmissionResult::SUBMITTED.to_string(),
        identifiers: SliceIdentifiers {
            name: existing.name,
            id: existing.id,
        },
        added: compiled.added,
        removed: Some(compiled.removed),
    })
}

async fn fetch_site_pool(
    testbed: &dyn Testbed,
    token: Option<&str>,
) -> Result<Vec<SiteCapacity>, TopologyError> {
    let records = testbed
        .list_resources(token, ResourceKind::Sites, MAX_LIMIT)
        .await
        .map_err(TopologyError::Upstream)?;
    Ok(records.iter().filter_map(SiteCapacity::from_record).collect())
}

/// Compile passes are synchronous; keep them off the async workers
async fn run_pass<F>(pass: F) -> Result<CompiledSlice, TopologyError>
where
    F: FnOnce() -> Result<CompiledSlice, TopologyError> + Send + 'static,
{
    tokio::task::spawn_blocking(pass)
        .await
        .map_err(|e| TopologyError::Internal(format!("compile task failed: {}", e)))?
}
