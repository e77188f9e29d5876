use serde::{Deserialize, Serialize};

use super::query::QueryParams;
use super::topology::{
    FacilityPortSpec, NetworkSpec, NodeSpec, PortMirrorSpec, SwitchSpec, TopologySpec,
};
use crate::slice::{SliceGraph, TopologyError};
use crate::utils::lenient_list;

/// Canonical slice state values reported by the orchestrator
pub mod slice_state {
    pub const NASCENT: &str = "Nascent";
    pub const CONFIGURING: &str = "Configuring";
    pub const STABLE_OK: &str = "StableOK";
    pub const STABLE_ERROR: &str = "StableError";
    pub const MODIFY_OK: &str = "ModifyOK";
    pub const MODIFY_ERROR: &str = "ModifyError";
    pub const CLOSING: &str = "Closing";
    pub const DEAD: &str = "Dead";

    pub const ALL: &[&str] = &[
        NASCENT,
        CONFIGURING,
        STABLE_OK,
        STABLE_ERROR,
        MODIFY_OK,
        MODIFY_ERROR,
        CLOSING,
        DEAD,
    ];

    /// States hidden from listings unless the caller asks for them
    pub const HIDDEN_BY_DEFAULT: &[&str] = &[CLOSING, DEAD];

    pub fn is_valid(state: &str) -> bool {
        ALL.contains(&state)
    }
}

/// Arguments of `fabric_build_slice`
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSliceRequest {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub ssh_keys: Vec<String>,
    #[serde(flatten)]
    pub topology: TopologySpec,
    /// Lease length in days
    #[serde(default)]
    pub lifetime: Option<u32>,
    #[serde(default)]
    pub lease_start_time: Option<String>,
    #[serde(default)]
    pub lease_end_time: Option<String>,
}

impl BuildSliceRequest {
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.name.trim().is_empty() {
            return Err(TopologyError::invalid("slice name must not be empty"));
        }
        if self.lifetime == Some(0) {
            return Err(TopologyError::invalid("lifetime must be at least 1 day"));
        }
        self.topology.validate()
    }

    pub fn lease_in_hours(&self) -> Option<u32> {
        self.lifetime.map(|days| days.saturating_mul(24))
    }
}

/// Identifies a slice by name or id; id wins when both are given
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SliceSelector {
    Id(String),
    Name(String),
}

impl SliceSelector {
    pub fn from_parts(
        slice_name: Option<&str>,
        slice_id: Option<&str>,
    ) -> Result<Self, TopologyError> {
        let pick = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        match (pick(slice_id), pick(slice_name)) {
            (Some(id), _) => Ok(SliceSelector::Id(id)),
            (None, Some(name)) => Ok(SliceSelector::Name(name)),
            (None, None) => Err(TopologyError::invalid(
                "either slice_name or slice_id must be provided",
            )),
        }
    }
}

impl std::fmt::Display for SliceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceSelector::Id(id) => write!(f, "id={}", id),
            SliceSelector::Name(name) => write!(f, "name={}", name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddComponentSpec {
    pub node: String,
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveComponentSpec {
    pub node: String,
    #[serde(alias = "component")]
    pub name: String,
}

/// Arguments of `fabric_modify_slice`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifySliceRequest {
    #[serde(default)]
    pub slice_name: Option<String>,
    #[serde(default)]
    pub slice_id: Option<String>,

    #[serde(default)]
    pub add_nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub add_components: Vec<AddComponentSpec>,
    #[serde(default)]
    pub add_switches: Vec<SwitchSpec>,
    #[serde(default)]
    pub add_facility_ports: Vec<FacilityPortSpec>,
    #[serde(default)]
    pub add_networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub add_port_mirrors: Vec<PortMirrorSpec>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub remove_port_mirrors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub remove_networks: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub remove_facility_ports: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub remove_switches: Vec<String>,
    #[serde(default)]
    pub remove_components: Vec<RemoveComponentSpec>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub remove_nodes: Vec<String>,
}

impl ModifySliceRequest {
    pub fn selector(&self) -> Result<SliceSelector, TopologyError> {
        SliceSelector::from_parts(self.slice_name.as_deref(), self.slice_id.as_deref())
    }

    pub fn has_changes(&self) -> bool {
        !(self.add_nodes.is_empty()
            && self.add_components.is_empty()
            && self.add_switches.is_empty()
            && self.add_facility_ports.is_empty()
            && self.add_networks.is_empty()
            && self.add_port_mirrors.is_empty()
            && self.remove_port_mirrors.is_empty()
            && self.remove_networks.is_empty()
            && self.remove_facility_ports.is_empty()
            && self.remove_switches.is_empty()
            && self.remove_components.is_empty()
            && self.remove_nodes.is_empty())
    }

    /// The additions viewed as a topology fragment
    pub fn additions(&self) -> TopologySpec {
        TopologySpec {
            nodes: self.add_nodes.clone(),
            switches: self.add_switches.clone(),
            facility_ports: self.add_facility_ports.clone(),
            networks: self.add_networks.clone(),
            port_mirrors: self.add_port_mirrors.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        self.selector()?;
        if !self.has_changes() {
            return Err(TopologyError::invalid(
                "modify request contains no additions or removals",
            ));
        }
        let additions = self.additions();
        super::topology::unique_names("node", additions.nodes.iter().map(|n| n.name.as_str()))?;
        super::topology::unique_names("network", additions.networks.iter().map(|n| n.name.as_str()))?;
        for node in &additions.nodes {
            node.validate()?;
        }
        for net in &additions.networks {
            net.validate()?;
        }
        Ok(())
    }
}

/// Names touched by a build or modify, grouped by resource kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub nodes: Vec<String>,
    pub components: Vec<ComponentChange>,
    pub switches: Vec<String>,
    pub facility_ports: Vec<String>,
    pub networks: Vec<String>,
    pub port_mirrors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentChange {
    pub node: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceIdentifiers {
    pub name: String,
    pub id: String,
}

/// Result of a build or modify
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub status: String,
    pub identifiers: SliceIdentifiers,
    pub added: ChangeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<ChangeSet>,
}

impl SubmissionResult {
    pub const SUBMITTED: &'static str = "submitted";
}

/// Payload handed to the orchestrator when creating or modifying a slice
#[derive(Debug, Clone, Serialize)]
pub struct SliceSubmission {
    pub name: String,
    pub graph: SliceGraph,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_in_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_end_time: Option<String>,
}

/// Slice as returned by the orchestrator's slice lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub lease_start_time: Option<String>,
    #[serde(default)]
    pub lease_end_time: Option<String>,
    #[serde(default)]
    pub graph: SliceGraph,
}

fn default_true() -> bool {
    true
}

/// Arguments of `fabric_query_slices`
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySlicesRequest {
    #[serde(default = "default_true")]
    pub as_self: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub slice_state: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub exclude_slice_state: Vec<String>,
    #[serde(flatten)]
    pub query: QueryParams,
}

impl QuerySlicesRequest {
    /// States to drop from the listing. Explicit excludes win, an include list
    /// excludes everything else, and otherwise closing/dead slices are hidden.
    pub fn excluded_states(&self) -> Vec<String> {
        if !self.exclude_slice_state.is_empty() {
            return self.exclude_slice_state.clone();
        }
        if !self.slice_state.is_empty() {
            return slice_state::ALL
                .iter()
                .filter(|s| !self.slice_state.iter().any(|inc| inc == *s))
                .map(|s| s.to_string())
                .collect();
        }
        slice_state::HIDDEN_BY_DEFAULT
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Arguments of `fabric_get_slice`
#[derive(Debug, Clone, Deserialize)]
pub struct GetSliceRequest {
    #[serde(default)]
    pub slice_name: Option<String>,
    #[serde(default)]
    pub slice_id: Option<String>,
}

/// Arguments of `fabric_renew_slice`
#[derive(Debug, Clone, Deserialize)]
pub struct RenewSliceRequest {
    pub slice_id: String,
    pub lease_end_time: String,
}

/// Arguments shared by `fabric_delete_slice` and `fabric_accept_modify`
#[derive(Debug, Clone, Deserialize)]
pub struct SliceIdRequest {
    pub slice_id: String,
}
