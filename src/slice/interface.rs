use std::collections::HashMap;

use super::graph::{ComponentRef, InterfaceRef, SliceGraph};
use super::TopologyError;
use crate::models::catalog::ComponentModel;
use crate::models::topology::InterfaceSpec;

/// NICs created or adopted during one compile pass, keyed by (node, nic name).
/// Guarantees a named NIC resolves to the same component for the whole pass.
#[derive(Debug, Default)]
pub struct NicArena {
    nics: HashMap<(String, String), ComponentRef>,
}

impl NicArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &str, nic: &str) -> Option<&ComponentRef> {
        self.nics.get(&(node.to_string(), nic.to_string()))
    }

    pub fn register(&mut self, nic: ComponentRef) {
        self.nics.insert((nic.node.clone(), nic.name.clone()), nic);
    }

    pub fn len(&self) -> usize {
        self.nics.len()
    }
}

/// Site an endpoint lives on. Unknown references fail here, before any
/// interface is created for the network.
pub fn endpoint_site(
    graph: &SliceGraph,
    spec: &InterfaceSpec,
    network: &str,
) -> Result<String, TopologyError> {
    let site = match spec {
        InterfaceSpec::Switch { switch, .. } => graph.switch(switch).map(|s| s.site.clone()).ok_or_else(|| {
            TopologyError::unknown_reference(format!(
                "network {} references unknown switch: {}",
                network, switch
            ))
        })?,
        InterfaceSpec::FacilityPort { facility_port } => graph
            .facility_port(facility_port)
            .map(|f| f.site.clone())
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!(
                    "network {} references unknown facility port: {}",
                    network, facility_port
                ))
            })?,
        InterfaceSpec::NodeNic { node, .. } | InterfaceSpec::NodeComponent { node, .. } => graph
            .node_site(node)
            .map(String::from)
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!(
                    "network {} references unknown node: {}",
                    network, node
                ))
            })?,
    };
    Ok(site)
}

/// Turn an endpoint spec into a concrete interface, creating or reusing NICs.
pub fn resolve_interface(
    graph: &mut SliceGraph,
    arena: &mut NicArena,
    spec: &InterfaceSpec,
    network: &str,
    default_nic_model: ComponentModel,
) -> Result<InterfaceRef, TopologyError> {
    match spec {
        InterfaceSpec::Switch { switch, port } => {
            let iface = graph.switch_interface(switch, *port)?;
            tracing::debug!(%switch, port, %network, "using switch port");
            Ok(iface)
        }
        InterfaceSpec::FacilityPort { facility_port } => {
            let iface = graph.facility_port_interface(facility_port)?;
            tracing::debug!(%facility_port, %network, "using facility port interface");
            Ok(iface)
        }
        InterfaceSpec::NodeComponent {
            node,
            component,
            port,
            vlan,
            sub_name,
            ..
        } => {
            ensure_node(graph, node, network)?;
            let comp = graph
                .get_component(node, component)
                .ok_or_else(|| {
                    TopologyError::unknown_reference(format!(
                        "component '{}' not found on node {}; declare it in the node's components",
                        component, node
                    ))
                })?;
            let iface = graph.component_interface(&comp, *port)?;
            with_vlan(graph, iface, node, component, *port, vlan.as_deref(), sub_name.as_deref())
        }
        InterfaceSpec::NodeNic {
            node,
            nic,
            port,
            nic_model,
            vlan,
            sub_name,
            ..
        } => {
            ensure_node(graph, node, network)?;
            let model = match nic_model.as_deref() {
                Some(m) => ComponentModel::parse_nic(m, &format!("interface on node {}", node))?,
                None => default_nic_model,
            };
            let comp = match nic {
                Some(name) => named_nic(graph, arena, node, name, model)?,
                None => {
                    let name = format!("{}-{}-nic", node, network);
                    tracing::info!(nic = %name, model = %model, %node, "creating auto-named NIC");
                    let comp = graph.add_component(node, &name, model)?;
                    arena.register(comp.clone());
                    comp
                }
            };
            let iface = graph.component_interface(&comp, *port)?;
            let owner = comp.name.clone();
            with_vlan(graph, iface, node, &owner, *port, vlan.as_deref(), sub_name.as_deref())
        }
    }
}

fn ensure_node(graph: &SliceGraph, node: &str, network: &str) -> Result<(), TopologyError> {
    if graph.node(node).is_none() {
        return Err(TopologyError::unknown_reference(format!(
            "network {} references unknown node: {}",
            network, node
        )));
    }
    Ok(())
}

/// Arena first, then a component already on the node, then a fresh NIC
fn named_nic(
    graph: &mut SliceGraph,
    arena: &mut NicArena,
    node: &str,
    name: &str,
    model: ComponentModel,
) -> Result<ComponentRef, TopologyError> {
    if let Some(existing) = arena.get(node, name) {
        tracing::debug!(nic = %name, %node, "reusing NIC from this pass");
        return Ok(existing.clone());
    }
    let comp = match graph.get_component(node, name) {
        Some(existing) => {
            tracing::debug!(nic = %name, %node, "adopting existing NIC");
            existing
        }
        None => {
            tracing::info!(nic = %name, model = %model, %node, "creating NIC");
            graph.add_component(node, name, model)?
        }
    };
    arena.register(comp.clone());
    Ok(comp)
}

fn with_vlan(
    graph: &mut SliceGraph,
    iface: InterfaceRef,
    node: &str,
    owner: &str,
    port: usize,
    vlan: Option<&str>,
    sub_name: Option<&str>,
) -> Result<InterfaceRef, TopologyError> {
    let vlan = match vlan.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => return Ok(iface),
    };
    let name = sub_name
        .map(String::from)
        .unwrap_or_else(|| format!("{}-p{}-vlan{}", owner, port, vlan));
    tracing::info!(sub_interface = %name, vlan, %owner, port, "creating sub-interface");
    graph.add_sub_interface(&iface, node, &name, vlan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::graph::Node;
    use serde_json::json;

    fn spec(v: serde_json::Value) -> InterfaceSpec {
        serde_json::from_value(v).unwrap()
    }

    fn graph() -> SliceGraph {
        let mut graph = SliceGraph::default();
        graph.add_node(Node::new("n1", "STAR")).unwrap();
        graph.add_node(Node::new("n2", "UTAH")).unwrap();
        graph.add_switch("sw1", "STAR").unwrap();
        graph.add_facility_port("fp1", "WASH", "3100").unwrap();
        graph
    }

    #[test]
    fn test_named_nic_resolves_to_same_component() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let p0 = spec(json!({"node": "n1", "nic": "nic1", "port": 0}));
        let p1 = spec(json!({"node": "n1", "nic": "nic1", "port": 1}));

        let a = resolve_interface(&mut graph, &mut arena, &p0, "net1", ComponentModel::NicConnectX6).unwrap();
        let b = resolve_interface(&mut graph, &mut arena, &p1, "net2", ComponentModel::NicConnectX6).unwrap();
        assert_eq!(a.name, "n1-nic1-p1");
        assert_eq!(b.name, "n1-nic1-p2");
        assert_eq!(graph.node("n1").unwrap().components.len(), 1);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_auto_named_nic_is_fresh_per_network() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let shorthand = InterfaceSpec::node("n1");
        let a = resolve_interface(&mut graph, &mut arena, &shorthand, "net1", ComponentModel::NicBasic).unwrap();
        let b = resolve_interface(&mut graph, &mut arena, &shorthand, "net2", ComponentModel::NicBasic).unwrap();
        assert_eq!(a.name, "n1-n1-net1-nic-p1");
        assert_eq!(b.name, "n1-n1-net2-nic-p1");
        assert!(graph.get_component("n1", "n1-net1-nic").is_some());
    }

    #[test]
    fn test_port_out_of_range_on_basic_nic() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let s = spec(json!({"node": "n1", "nic": "nic1", "port": 1}));
        let err = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicBasic).unwrap_err();
        assert_eq!(err.kind(), "PortOutOfRange");
        assert!(err.to_string().contains("NIC nic1 (has 1 ports)"));
    }

    #[test]
    fn test_component_endpoint_requires_declared_component() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let s = spec(json!({"node": "n1", "component": "fpga1", "port": 1}));
        let err = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicBasic).unwrap_err();
        assert_eq!(err.kind(), "UnknownReference");

        graph.add_component("n1", "fpga1", ComponentModel::FpgaXilinxU280).unwrap();
        let iface = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicBasic).unwrap();
        assert_eq!(iface.name, "n1-fpga1-p2");
    }

    #[test]
    fn test_vlan_creates_sub_interface() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let s = spec(json!({"node": "n1", "nic": "nic1", "vlan": 200}));
        let iface = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicConnectX5).unwrap();
        assert_eq!(iface.name, "n1-nic1-p0-vlan200");

        let s = spec(json!({"node": "n1", "nic": "nic1", "port": 1, "vlan": "300", "sub_name": "uplink"}));
        let iface = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicConnectX5).unwrap();
        assert_eq!(iface.name, "n1-uplink");
    }

    #[test]
    fn test_interface_nic_model_override_is_validated() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let s = spec(json!({"node": "n1", "nic": "nic1", "model": "GPU_A40"}));
        let err = resolve_interface(&mut graph, &mut arena, &s, "net1", ComponentModel::NicBasic).unwrap_err();
        assert_eq!(err.kind(), "InvalidNicModel");
    }

    #[test]
    fn test_switch_and_facility_port_dispatch() {
        let mut graph = graph();
        let mut arena = NicArena::new();
        let sw = spec(json!({"switch": "sw1", "port": 4}));
        assert_eq!(
            resolve_interface(&mut graph, &mut arena, &sw, "net1", ComponentModel::NicBasic).unwrap().name,
            "sw1-p5"
        );
        let fp = spec(json!({"facility_port": "fp1"}));
        assert_eq!(endpoint_site(&graph, &fp, "net1").unwrap(), "WASH");
        let missing = spec(json!({"switch": "sw9"}));
        assert_eq!(endpoint_site(&graph, &missing, "net1").unwrap_err().kind(), "UnknownReference");
    }
}
