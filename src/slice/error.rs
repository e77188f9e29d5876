use thiserror::Error;

use crate::models::catalog::{ComponentModel, NetworkType};

/// Errors raised while validating or compiling a slice topology.
///
/// Every message names the offending value and, for catalog errors, the list
/// of accepted values so a caller can correct the next request on its own.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("unknown component model '{model}'. Valid models: {valid}")]
    UnknownComponentModel { model: String, valid: String },

    #[error("unknown network type '{requested}'. Valid types: {valid}")]
    UnknownNetworkType { requested: String, valid: String },

    #[error("invalid NIC model '{model}' for {context}. Valid models: {valid}")]
    InvalidNicModel {
        model: String,
        context: String,
        valid: String,
    },

    #[error("port {port} not available on {owner} (has {available} ports)")]
    PortOutOfRange {
        owner: String,
        port: usize,
        available: usize,
    },

    #[error("no sites available with sufficient resources: cores>={cores}, ram>={ram}GB, disk>={disk}GB")]
    NoFeasibleSite { cores: u32, ram: u32, disk: u32 },

    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TopologyError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidTopology(msg.into())
    }

    pub fn unknown_reference(msg: impl Into<String>) -> Self {
        Self::UnknownReference(msg.into())
    }

    pub fn unknown_component_model(model: &str) -> Self {
        Self::UnknownComponentModel {
            model: model.to_string(),
            valid: ComponentModel::catalog(),
        }
    }

    pub fn unknown_network_type(requested: &str) -> Self {
        Self::UnknownNetworkType {
            requested: requested.to_string(),
            valid: format!("{}, L2", NetworkType::catalog()),
        }
    }

    pub fn invalid_nic_model(model: &str, context: impl Into<String>) -> Self {
        Self::InvalidNicModel {
            model: model.to_string(),
            context: context.into(),
            valid: ComponentModel::nic_catalog(),
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTopology(_) => "InvalidTopology",
            Self::UnknownReference(_) => "UnknownReference",
            Self::UnknownComponentModel { .. } => "UnknownComponentModel",
            Self::UnknownNetworkType { .. } => "UnknownNetworkType",
            Self::InvalidNicModel { .. } => "InvalidNicModel",
            Self::PortOutOfRange { .. } => "PortOutOfRange",
            Self::NoFeasibleSite { .. } => "NoFeasibleSite",
            Self::Upstream(_) => "UpstreamFailure",
            Self::Internal(_) => "Internal",
        }
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidTopology(err.to_string())
    }
}
