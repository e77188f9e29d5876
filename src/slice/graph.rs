use serde::{Deserialize, Serialize};
use std::fmt;

use super::TopologyError;
use crate::models::catalog::{ComponentModel, FabnetKind, MirrorDirection, NetworkType};
use crate::models::topology::InterfaceMode;

/// Dataplane ports exposed by a P4 switch
pub const SWITCH_PORT_COUNT: usize = 32;

/// Concrete resource graph of a slice.
///
/// A compile pass mutates a draft of this graph; the orchestrator receives it
/// on submit and returns it on lookup. Interface names are unique across the
/// whole graph so network services can reference them by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub switches: Vec<Switch>,
    #[serde(default)]
    pub facility_ports: Vec<FacilityPort>,
    #[serde(default)]
    pub networks: Vec<NetworkService>,
    #[serde(default)]
    pub port_mirrors: Vec<PortMirror>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub site: String,
    pub cores: u32,
    pub ram: u32,
    pub disk: u32,
    pub image: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Node {
    pub fn new(name: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site: site.into(),
            cores: crate::models::topology::DEFAULT_CORES,
            ram: crate::models::topology::DEFAULT_RAM_GB,
            disk: crate::models::topology::DEFAULT_DISK_GB,
            image: crate::models::topology::DEFAULT_IMAGE.to_string(),
            components: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, cores: u32, ram: u32, disk: u32) -> Self {
        self.cores = cores;
        self.ram = ram;
        self.disk = disk;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub model: ComponentModel,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<InterfaceMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_interfaces: Vec<Interface>,
}

impl Interface {
    fn named(name: String) -> Self {
        Self {
            name,
            vlan: None,
            mode: None,
            sub_interfaces: Vec::new(),
        }
    }

    fn ports(prefix: &str, count: usize) -> Vec<Self> {
        (1..=count)
            .map(|i| Self::named(format!("{}-p{}", prefix, i)))
            .collect()
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Interface> {
        if self.name == name {
            return Some(self);
        }
        self.sub_interfaces.iter_mut().find(|s| s.name == name)
    }

    fn contains(&self, name: &str) -> bool {
        self.name == name || self.sub_interfaces.iter().any(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub name: String,
    pub site: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityPort {
    pub name: String,
    pub site: String,
    pub vlan: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: NetworkType,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_hops: Vec<String>,
    /// Gbps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMirror {
    pub name: String,
    pub mirror_interface_name: String,
    pub receive_interface: String,
    #[serde(default)]
    pub mirror_direction: MirrorDirection,
}

/// Handle to a component placed on a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    pub node: String,
    pub name: String,
    pub model: ComponentModel,
}

impl ComponentRef {
    fn owner_label(&self) -> String {
        let kind = if self.model.is_nic() { "NIC" } else { "component" };
        format!("{} {}", kind, self.name)
    }
}

/// Handle to a concrete interface anywhere in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceRef {
    pub name: String,
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl SliceGraph {
    // --- Nodes and components ---

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node, TopologyError> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| TopologyError::unknown_reference(format!("unknown node: {}", name)))
    }

    pub fn node_site(&self, name: &str) -> Option<&str> {
        self.node(name).map(|n| n.site.as_str())
    }

    /// Sites of all nodes, in node order
    pub fn node_sites(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.site.clone()).collect()
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), TopologyError> {
        if self.node(&node.name).is_some() || self.switch(&node.name).is_some() {
            return Err(TopologyError::invalid(format!(
                "node '{}' already exists in slice",
                node.name
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_component(
        &mut self,
        node: &str,
        name: &str,
        model: ComponentModel,
    ) -> Result<ComponentRef, TopologyError> {
        if self.node_mut(node)?.component(name).is_some() {
            return Err(TopologyError::invalid(format!(
                "component '{}' already exists on node {}",
                name, node
            )));
        }
        // Hyphenated node and component names can produce the same port names
        let interfaces = Interface::ports(&format!("{}-{}", node, name), model.port_count());
        if let Some(clash) = interfaces.iter().find(|i| self.contains_interface(&i.name)) {
            return Err(TopologyError::invalid(format!(
                "component '{}' on node {} would create interface '{}', which already exists; \
                 rename the node or component",
                name, node, clash.name
            )));
        }
        self.node_mut(node)?.components.push(Component {
            name: name.to_string(),
            model,
            interfaces,
        });
        Ok(ComponentRef {
            node: node.to_string(),
            name: name.to_string(),
            model,
        })
    }

    pub fn get_component(&self, node: &str, name: &str) -> Option<ComponentRef> {
        self.node(node)?.component(name).map(|c| ComponentRef {
            node: node.to_string(),
            name: c.name.clone(),
            model: c.model,
        })
    }

    /// Interface `port` (zero-based) of a component
    pub fn component_interface(
        &self,
        component: &ComponentRef,
        port: usize,
    ) -> Result<InterfaceRef, TopologyError> {
        let comp = self
            .node(&component.node)
            .and_then(|n| n.component(&component.name))
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!(
                    "component '{}' not found on node {}",
                    component.name, component.node
                ))
            })?;
        comp.interfaces
            .get(port)
            .map(|iface| InterfaceRef { name: iface.name.clone() })
            .ok_or_else(|| TopologyError::PortOutOfRange {
                owner: component.owner_label(),
                port,
                available: comp.interfaces.len(),
            })
    }

    /// Create a VLAN-tagged child of a component interface
    pub fn add_sub_interface(
        &mut self,
        parent: &InterfaceRef,
        node: &str,
        sub_name: &str,
        vlan: &str,
    ) -> Result<InterfaceRef, TopologyError> {
        let name = format!("{}-{}", node, sub_name);
        if self.contains_interface(&name) {
            return Err(TopologyError::invalid(format!(
                "sub-interface '{}' already exists on node {}",
                sub_name, node
            )));
        }
        let iface = self
            .node_mut(node)?
            .components
            .iter_mut()
            .flat_map(|c| c.interfaces.iter_mut())
            .find(|i| i.name == parent.name)
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!(
                    "interface {} not found on node {}",
                    parent, node
                ))
            })?;
        iface.sub_interfaces.push(Interface {
            vlan: Some(vlan.to_string()),
            ..Interface::named(name.clone())
        });
        Ok(InterfaceRef { name })
    }

    pub fn set_interface_mode(
        &mut self,
        iface: &InterfaceRef,
        mode: InterfaceMode,
    ) -> Result<(), TopologyError> {
        let target = self
            .interfaces_mut()
            .find_map(|i| i.find_mut(&iface.name))
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!("unknown interface: {}", iface))
            })?;
        target.mode = Some(mode);
        Ok(())
    }

    /// Attach a node to its site's shared fabnet service through a basic NIC
    pub fn add_fabnet(&mut self, node: &str, kind: FabnetKind) -> Result<String, TopologyError> {
        let site = self
            .node_site(node)
            .ok_or_else(|| TopologyError::unknown_reference(format!("unknown node: {}", node)))?
            .to_string();
        let net_name = format!("FABNET_{}_{}", kind.as_str(), site);
        let nic = self.add_component(node, &format!("{}_nic", net_name), ComponentModel::NicBasic)?;
        let iface = self.component_interface(&nic, 0)?;

        match self.networks.iter_mut().find(|n| n.name == net_name) {
            Some(existing) => existing.interfaces.push(iface.name),
            None => self.networks.push(NetworkService {
                name: net_name.clone(),
                service_type: kind.service_type(),
                interfaces: vec![iface.name],
                subnet: None,
                route_hops: Vec::new(),
                bandwidth: None,
            }),
        }
        Ok(net_name)
    }

    // --- Switches and facility ports ---

    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.name == name)
    }

    pub fn facility_port(&self, name: &str) -> Option<&FacilityPort> {
        self.facility_ports.iter().find(|f| f.name == name)
    }

    pub fn add_switch(&mut self, name: &str, site: &str) -> Result<(), TopologyError> {
        if self.switch(name).is_some() || self.node(name).is_some() {
            return Err(TopologyError::invalid(format!("switch '{}' already exists in slice", name)));
        }
        self.switches.push(Switch {
            name: name.to_string(),
            site: site.to_string(),
            interfaces: Interface::ports(name, SWITCH_PORT_COUNT),
        });
        Ok(())
    }

    pub fn add_facility_port(&mut self, name: &str, site: &str, vlan: &str) -> Result<(), TopologyError> {
        if self.facility_port(name).is_some() {
            return Err(TopologyError::invalid(format!(
                "facility port '{}' already exists in slice",
                name
            )));
        }
        self.facility_ports.push(FacilityPort {
            name: name.to_string(),
            site: site.to_string(),
            vlan: vlan.to_string(),
            interfaces: Interface::ports(name, 1),
        });
        Ok(())
    }

    pub fn switch_interface(&self, name: &str, port: usize) -> Result<InterfaceRef, TopologyError> {
        let switch = self
            .switch(name)
            .ok_or_else(|| TopologyError::unknown_reference(format!("unknown switch: {}", name)))?;
        switch
            .interfaces
            .get(port)
            .map(|iface| InterfaceRef { name: iface.name.clone() })
            .ok_or_else(|| TopologyError::PortOutOfRange {
                owner: format!("switch {}", name),
                port,
                available: switch.interfaces.len(),
            })
    }

    pub fn facility_port_interface(&self, name: &str) -> Result<InterfaceRef, TopologyError> {
        self.facility_port(name)
            .and_then(|fp| fp.interfaces.first())
            .map(|iface| InterfaceRef { name: iface.name.clone() })
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!("unknown facility port: {}", name))
            })
    }

    // --- Network services ---

    pub fn network(&self, name: &str) -> Option<&NetworkService> {
        self.networks.iter().find(|n| n.name == name)
    }

    fn network_mut(&mut self, name: &str) -> Result<&mut NetworkService, TopologyError> {
        self.networks
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| TopologyError::unknown_reference(format!("unknown network: {}", name)))
    }

    fn push_network(
        &mut self,
        name: &str,
        service_type: NetworkType,
        interfaces: &[InterfaceRef],
        subnet: Option<String>,
    ) -> Result<(), TopologyError> {
        if self.network(name).is_some() || self.port_mirror(name).is_some() {
            return Err(TopologyError::invalid(format!("network '{}' already exists in slice", name)));
        }
        self.networks.push(NetworkService {
            name: name.to_string(),
            service_type,
            interfaces: interfaces.iter().map(|i| i.name.clone()).collect(),
            subnet,
            route_hops: Vec::new(),
            bandwidth: None,
        });
        Ok(())
    }

    pub fn add_l2network(
        &mut self,
        name: &str,
        service_type: NetworkType,
        interfaces: &[InterfaceRef],
        subnet: Option<String>,
    ) -> Result<(), TopologyError> {
        if service_type.is_l3() {
            return Err(TopologyError::invalid(format!(
                "network '{}': {} is not a layer-2 service",
                name, service_type
            )));
        }
        self.push_network(name, service_type, interfaces, subnet)
    }

    pub fn add_l3network(
        &mut self,
        name: &str,
        service_type: NetworkType,
        interfaces: &[InterfaceRef],
    ) -> Result<(), TopologyError> {
        let service_type = service_type.l3_service_type().ok_or_else(|| {
            TopologyError::invalid(format!(
                "network '{}': {} is not a layer-3 service",
                name, service_type
            ))
        })?;
        self.push_network(name, service_type, interfaces, None)
    }

    pub fn set_route_hops(&mut self, network: &str, hops: &[String]) -> Result<(), TopologyError> {
        self.network_mut(network)?.route_hops = hops.to_vec();
        Ok(())
    }

    pub fn set_bandwidth(&mut self, network: &str, gbps: u32) -> Result<(), TopologyError> {
        self.network_mut(network)?.bandwidth = Some(gbps);
        Ok(())
    }

    pub fn port_mirror(&self, name: &str) -> Option<&PortMirror> {
        self.port_mirrors.iter().find(|p| p.name == name)
    }

    pub fn add_port_mirror(
        &mut self,
        name: &str,
        mirror_interface_name: &str,
        receive: &InterfaceRef,
        direction: MirrorDirection,
    ) -> Result<(), TopologyError> {
        if self.port_mirror(name).is_some() || self.network(name).is_some() {
            return Err(TopologyError::invalid(format!(
                "port mirror '{}' already exists in slice",
                name
            )));
        }
        self.port_mirrors.push(PortMirror {
            name: name.to_string(),
            mirror_interface_name: mirror_interface_name.to_string(),
            receive_interface: receive.name.clone(),
            mirror_direction: direction,
        });
        Ok(())
    }

    // --- Removals ---

    pub fn remove_port_mirror(&mut self, name: &str) -> Result<(), TopologyError> {
        let before = self.port_mirrors.len();
        self.port_mirrors.retain(|p| p.name != name);
        if self.port_mirrors.len() == before {
            return Err(TopologyError::unknown_reference(format!("port mirror not found: {}", name)));
        }
        Ok(())
    }

    pub fn remove_network(&mut self, name: &str) -> Result<(), TopologyError> {
        let before = self.networks.len();
        self.networks.retain(|n| n.name != name);
        if self.networks.len() == before {
            return Err(TopologyError::unknown_reference(format!("network not found: {}", name)));
        }
        Ok(())
    }

    pub fn remove_facility_port(&mut self, name: &str) -> Result<(), TopologyError> {
        let idx = self
            .facility_ports
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!("facility port not found: {}", name))
            })?;
        let removed = self.facility_ports.remove(idx);
        self.detach_interfaces(&removed.interfaces);
        Ok(())
    }

    pub fn remove_switch(&mut self, name: &str) -> Result<(), TopologyError> {
        let idx = self
            .switches
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TopologyError::unknown_reference(format!("switch not found: {}", name)))?;
        let removed = self.switches.remove(idx);
        self.detach_interfaces(&removed.interfaces);
        Ok(())
    }

    pub fn remove_component(&mut self, node: &str, name: &str) -> Result<(), TopologyError> {
        let target = self.node_mut(node)?;
        let idx = target
            .components
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| {
                TopologyError::unknown_reference(format!(
                    "component not found: {} on node {}",
                    name, node
                ))
            })?;
        let removed = target.components.remove(idx);
        self.detach_interfaces(&removed.interfaces);
        Ok(())
    }

    pub fn remove_node(&mut self, name: &str) -> Result<(), TopologyError> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| TopologyError::unknown_reference(format!("node not found: {}", name)))?;
        let removed = self.nodes.remove(idx);
        let interfaces: Vec<Interface> = removed
            .components
            .into_iter()
            .flat_map(|c| c.interfaces)
            .collect();
        self.detach_interfaces(&interfaces);
        Ok(())
    }

    /// Drop references to interfaces that no longer exist. Port mirrors lose
    /// their receive side entirely, so they go too.
    fn detach_interfaces(&mut self, removed: &[Interface]) {
        let gone = |name: &str| removed.iter().any(|i| i.contains(name));
        for net in &mut self.networks {
            net.interfaces.retain(|i| !gone(i));
        }
        self.port_mirrors.retain(|p| !gone(&p.receive_interface));
    }

    // --- Lookup helpers ---

    fn interfaces_mut(&mut self) -> impl Iterator<Item = &mut Interface> {
        let node_ifaces = self
            .nodes
            .iter_mut()
            .flat_map(|n| n.components.iter_mut())
            .flat_map(|c| c.interfaces.iter_mut());
        let switch_ifaces = self.switches.iter_mut().flat_map(|s| s.interfaces.iter_mut());
        let fp_ifaces = self
            .facility_ports
            .iter_mut()
            .flat_map(|f| f.interfaces.iter_mut());
        node_ifaces.chain(switch_ifaces).chain(fp_ifaces)
    }

    fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        let node_ifaces = self
            .nodes
            .iter()
            .flat_map(|n| n.components.iter())
            .flat_map(|c| c.interfaces.iter());
        let switch_ifaces = self.switches.iter().flat_map(|s| s.interfaces.iter());
        let fp_ifaces = self.facility_ports.iter().flat_map(|f| f.interfaces.iter());
        node_ifaces.chain(switch_ifaces).chain(fp_ifaces)
    }

    fn contains_interface(&self, name: &str) -> bool {
        self.interfaces().any(|i| i.contains(name))
    }

    /// Find an interface's mode by name, searching sub-interfaces too
    pub fn interface_mode(&self, name: &str) -> Option<InterfaceMode> {
        self.interfaces()
            .flat_map(|i| std::iter::once(i).chain(i.sub_interfaces.iter()))
            .find(|i| i.name == name)
            .and_then(|i| i.mode)
    }
}
