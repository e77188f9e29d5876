use std::collections::BTreeSet;

use super::TopologyError;
use crate::models::catalog::{ComponentModel, NetworkType};

/// Resolve the concrete network type from what the caller asked for, the
/// distinct sites the endpoints live on, and optional explicit route hops.
pub fn resolve_network_type(
    requested: Option<&str>,
    sites: &BTreeSet<String>,
    ero: Option<&[String]>,
) -> Result<NetworkType, TopologyError> {
    let multi_site = sites.len() > 1;

    if ero.map(|hops| !hops.is_empty()).unwrap_or(false) {
        if sites.len() != 2 {
            return Err(TopologyError::invalid(format!(
                "ERO requires a multi-site (2-site) network, endpoints span {} site(s)",
                sites.len()
            )));
        }
        return Ok(NetworkType::L2PTP);
    }

    let requested = match requested.map(str::trim).filter(|r| !r.is_empty()) {
        None => {
            return Ok(if multi_site {
                NetworkType::FABNetv4
            } else {
                NetworkType::L2Bridge
            })
        }
        Some(r) => r,
    };

    if requested.eq_ignore_ascii_case("L2") {
        return Ok(if multi_site {
            NetworkType::L2STS
        } else {
            NetworkType::L2Bridge
        });
    }

    match NetworkType::parse(requested) {
        Some(NetworkType::L2Bridge) if multi_site => Err(TopologyError::invalid(format!(
            "L2Bridge is single-site only, endpoints span sites {}",
            join_sites(sites)
        ))),
        Some(NetworkType::L2PTP) if !multi_site => Err(TopologyError::invalid(
            "L2PTP requires endpoints on two different sites",
        )),
        Some(NetworkType::L2PTP) => {
            tracing::warn!(
                sites = %join_sites(sites),
                "L2PTP without ERO is not supported, using L2STS instead"
            );
            Ok(NetworkType::L2STS)
        }
        Some(kind) => Ok(kind),
        None => Err(TopologyError::unknown_network_type(requested)),
    }
}

/// NIC model to create for endpoints of a network when the caller gave none.
/// L2PTP needs a SmartNIC sized by bandwidth; everything else is basic.
pub fn select_nic_model(kind: NetworkType, bandwidth: Option<u32>) -> ComponentModel {
    if kind != NetworkType::L2PTP {
        return ComponentModel::NicBasic;
    }
    match bandwidth.unwrap_or(0) {
        bw if bw >= 400 => ComponentModel::NicConnectX7_400,
        bw if bw >= 100 => ComponentModel::NicConnectX6,
        bw if bw >= 25 => ComponentModel::NicConnectX5,
        _ => ComponentModel::DEFAULT_SMARTNIC,
    }
}

/// Explicit override (validated against the NIC catalog) or automatic choice
pub fn resolve_nic_model(
    network: &str,
    explicit: Option<&str>,
    kind: NetworkType,
    bandwidth: Option<u32>,
) -> Result<ComponentModel, TopologyError> {
    match explicit.map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) => ComponentModel::parse_nic(model, format!("network {}", network).as_str()),
        None => Ok(select_nic_model(kind, bandwidth)),
    }
}

fn join_sites(sites: &BTreeSet<String>) -> String {
    sites.iter().cloned().collect::<Vec<_>>().join(", ")
}
