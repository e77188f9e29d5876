use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use super::catalog::FabnetKind;
use crate::slice::TopologyError;

pub const DEFAULT_CORES: u32 = 2;
pub const DEFAULT_RAM_GB: u32 = 8;
pub const DEFAULT_DISK_GB: u32 = 10;
pub const DEFAULT_IMAGE: &str = "default_rocky_8";

fn default_cores() -> u32 {
    DEFAULT_CORES
}

fn default_ram() -> u32 {
    DEFAULT_RAM_GB
}

fn default_disk() -> u32 {
    DEFAULT_DISK_GB
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

/// Declarative description of a slice's resources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologySpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub switches: Vec<SwitchSpec>,
    #[serde(default)]
    pub facility_ports: Vec<FacilityPortSpec>,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub port_mirrors: Vec<PortMirrorSpec>,
}

impl TopologySpec {
    /// Structural checks that do not need the slice graph: unique names and
    /// positive capacities. Reference checks happen during compilation.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes.is_empty() && self.switches.is_empty() && self.facility_ports.is_empty() {
            return Err(TopologyError::invalid(
                "topology must declare at least one node, switch or facility port",
            ));
        }

        unique_names("node", self.nodes.iter().map(|n| n.name.as_str()))?;
        unique_names("switch", self.switches.iter().map(|s| s.name.as_str()))?;
        unique_names("facility port", self.facility_ports.iter().map(|f| f.name.as_str()))?;
        unique_names("network", self.networks.iter().map(|n| n.name.as_str()))?;
        unique_names("port mirror", self.port_mirrors.iter().map(|p| p.name.as_str()))?;

        for node in &self.nodes {
            node.validate()?;
        }
        for net in &self.networks {
            net.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn unique_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), TopologyError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(TopologyError::invalid(format!("{} name must not be empty", kind)));
        }
        if !seen.insert(name) {
            return Err(TopologyError::invalid(format!("duplicate {} name '{}'", kind, name)));
        }
    }
    Ok(())
}

/// A virtual machine to place on a site
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default = "default_cores")]
    pub cores: u32,
    #[serde(default = "default_ram")]
    pub ram: u32,
    #[serde(default = "default_disk")]
    pub disk: u32,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub fabnet: Option<FabnetSpec>,
}

impl NodeSpec {
    /// Site the caller pinned the node to; a blank site means auto-select
    pub fn pinned_site(&self) -> Option<&str> {
        self.site.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        for (field, value) in [("cores", self.cores), ("ram", self.ram), ("disk", self.disk)] {
            if value < 1 {
                return Err(TopologyError::invalid(format!(
                    "node '{}': {} must be at least 1",
                    self.name, field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSpec {
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-node fabnet request: `true`, `"IPv4"`, `"IPv6"` or `{"type": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FabnetSpec {
    Enabled(bool),
    Kind(String),
    Detailed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
}

impl FabnetSpec {
    pub fn resolve(&self, node: &str) -> Result<Option<FabnetKind>, TopologyError> {
        let requested = match self {
            FabnetSpec::Enabled(false) => return Ok(None),
            FabnetSpec::Enabled(true) => return Ok(Some(FabnetKind::IPv4)),
            FabnetSpec::Kind(kind) => kind.as_str(),
            FabnetSpec::Detailed { kind } => kind.as_deref().unwrap_or("IPv4"),
        };
        FabnetKind::parse(requested).map(Some).ok_or_else(|| {
            TopologyError::invalid(format!(
                "node '{}': unsupported fabnet type '{}' (expected IPv4 or IPv6)",
                node, requested
            ))
        })
    }
}

/// Interface addressing mode applied in local mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    #[default]
    Auto,
    Config,
    Manual,
}

/// One network endpoint. Exactly one of `switch`, `facility_port` or `node`
/// selects the variant; `component` narrows a node endpoint to an existing
/// component instead of a NIC.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawInterfaceSpec")]
pub enum InterfaceSpec {
    NodeNic {
        node: String,
        nic: Option<String>,
        port: usize,
        nic_model: Option<String>,
        vlan: Option<String>,
        sub_name: Option<String>,
        mode: Option<InterfaceMode>,
    },
    NodeComponent {
        node: String,
        component: String,
        port: usize,
        vlan: Option<String>,
        sub_name: Option<String>,
        mode: Option<InterfaceMode>,
    },
    Switch {
        switch: String,
        port: usize,
    },
    FacilityPort {
        facility_port: String,
    },
}

impl InterfaceSpec {
    /// Shorthand endpoint for a node listed under a network's `nodes`
    pub fn node(name: impl Into<String>) -> Self {
        InterfaceSpec::NodeNic {
            node: name.into(),
            nic: None,
            port: 0,
            nic_model: None,
            vlan: None,
            sub_name: None,
            mode: None,
        }
    }

    pub fn mode(&self) -> InterfaceMode {
        match self {
            InterfaceSpec::NodeNic { mode, .. } | InterfaceSpec::NodeComponent { mode, .. } => {
                mode.unwrap_or_default()
            }
            _ => InterfaceMode::Auto,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInterfaceSpec {
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default, alias = "nic_name")]
    nic: Option<String>,
    #[serde(default)]
    port: Option<usize>,
    #[serde(default, alias = "model")]
    nic_model: Option<String>,
    #[serde(default, deserialize_with = "string_or_int")]
    vlan: Option<String>,
    #[serde(default)]
    sub_name: Option<String>,
    #[serde(default)]
    mode: Option<InterfaceMode>,
    #[serde(default)]
    switch: Option<String>,
    #[serde(default)]
    facility_port: Option<String>,
}

impl TryFrom<RawInterfaceSpec> for InterfaceSpec {
    type Error = TopologyError;

    fn try_from(raw: RawInterfaceSpec) -> Result<Self, Self::Error> {
        let port = raw.port.unwrap_or(0);
        match (raw.switch, raw.facility_port, raw.node) {
            (Some(switch), None, None) => Ok(InterfaceSpec::Switch { switch, port }),
            (None, Some(facility_port), None) => Ok(InterfaceSpec::FacilityPort { facility_port }),
            (None, None, Some(node)) => match raw.component {
                Some(component) => Ok(InterfaceSpec::NodeComponent {
                    node,
                    component,
                    port,
                    vlan: raw.vlan,
                    sub_name: raw.sub_name,
                    mode: raw.mode,
                }),
                None => Ok(InterfaceSpec::NodeNic {
                    node,
                    nic: raw.nic,
                    port,
                    nic_model: raw.nic_model,
                    vlan: raw.vlan,
                    sub_name: raw.sub_name,
                    mode: raw.mode,
                }),
            },
            (None, None, None) => Err(TopologyError::invalid(
                "interface must have one of 'node', 'switch' or 'facility_port'",
            )),
            _ => Err(TopologyError::invalid(
                "interface must have exactly one of 'node', 'switch' or 'facility_port'",
            )),
        }
    }
}

/// A network service connecting two or more endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub bandwidth: Option<u32>,
    #[serde(default, alias = "nic_model")]
    pub nic: Option<String>,
    #[serde(default)]
    pub ero: Option<Vec<String>>,
    #[serde(default)]
    pub subnet: Option<String>,
}

impl NetworkSpec {
    /// Explicit interfaces win; otherwise each listed node gets an auto NIC
    pub fn endpoints(&self) -> Vec<InterfaceSpec> {
        if !self.interfaces.is_empty() {
            return self.interfaces.clone();
        }
        self.nodes.iter().map(InterfaceSpec::node).collect()
    }

    pub fn ero_hops(&self) -> Option<&[String]> {
        self.ero.as_deref().filter(|hops| !hops.is_empty())
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        let count = if self.interfaces.is_empty() {
            self.nodes.len()
        } else {
            self.interfaces.len()
        };
        if count < 2 {
            return Err(TopologyError::invalid(format!(
                "network '{}' must connect at least 2 nodes/interfaces",
                self.name
            )));
        }
        if self.bandwidth == Some(0) {
            return Err(TopologyError::invalid(format!(
                "network '{}': bandwidth must be at least 1 Gbps",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchSpec {
    pub name: String,
    pub site: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacilityPortSpec {
    pub name: String,
    pub site: String,
    #[serde(deserialize_with = "required_string_or_int")]
    pub vlan: String,
}

/// Mirrors traffic of a named interface onto a receive interface
#[derive(Debug, Clone, Deserialize)]
pub struct PortMirrorSpec {
    pub name: String,
    pub mirror_interface_name: String,
    pub receive_interface: InterfaceSpec,
    #[serde(default)]
    pub mirror_direction: super::catalog::MirrorDirection,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    Str(String),
    Int(i64),
}

impl From<StringOrInt> for String {
    fn from(v: StringOrInt) -> Self {
        match v {
            StringOrInt::Str(s) => s,
            StringOrInt::Int(i) => i.to_string(),
        }
    }
}

fn string_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrInt>::deserialize(d)?.map(String::from))
}

fn required_string_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(StringOrInt::deserialize(d)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_defaults() {
        let node: NodeSpec = serde_json::from_value(json!({"name": "n1"})).unwrap();
        assert_eq!(node.cores, 2);
        assert_eq!(node.ram, 8);
        assert_eq!(node.disk, 10);
        assert_eq!(node.image, "default_rocky_8");
        assert!(node.pinned_site().is_none());

        let node: NodeSpec = serde_json::from_value(json!({"name": "n1", "site": " "})).unwrap();
        assert!(node.pinned_site().is_none());
    }

    #[test]
    fn test_interface_variants() {
        let spec: InterfaceSpec =
            serde_json::from_value(json!({"node": "n1", "nic_name": "nic1", "port": 1, "model": "NIC_ConnectX_5"}))
                .unwrap();
        assert_eq!(
            spec,
            InterfaceSpec::NodeNic {
                node: "n1".into(),
                nic: Some("nic1".into()),
                port: 1,
                nic_model: Some("NIC_ConnectX_5".into()),
                vlan: None,
                sub_name: None,
                mode: None,
            }
        );

        let spec: InterfaceSpec =
            serde_json::from_value(json!({"node": "n1", "component": "fpga1", "vlan": 100})).unwrap();
        match spec {
            InterfaceSpec::NodeComponent { component, vlan, port, .. } => {
                assert_eq!(component, "fpga1");
                assert_eq!(vlan.as_deref(), Some("100"));
                assert_eq!(port, 0);
            }
            other => panic!("unexpected variant {:?}", other),
        }

        let spec: InterfaceSpec = serde_json::from_value(json!({"switch": "sw1", "port": 3})).unwrap();
        assert_eq!(spec, InterfaceSpec::Switch { switch: "sw1".into(), port: 3 });
    }

    #[test]
    fn test_interface_discriminant_must_be_unique() {
        let err = serde_json::from_value::<InterfaceSpec>(json!({"node": "n1", "switch": "sw1"}))
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));

        let err = serde_json::from_value::<InterfaceSpec>(json!({"port": 1})).unwrap_err();
        assert!(err.to_string().contains("one of"));
    }

    #[test]
    fn test_network_endpoints_shorthand() {
        let net: NetworkSpec =
            serde_json::from_value(json!({"name": "net1", "nodes": ["a", "b"], "nic_model": "NIC_Basic"}))
                .unwrap();
        assert_eq!(net.nic.as_deref(), Some("NIC_Basic"));
        let endpoints = net.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1], InterfaceSpec::node("b"));
    }

    #[test]
    fn test_network_requires_two_endpoints() {
        let net: NetworkSpec = serde_json::from_value(json!({"name": "net1", "nodes": ["a"]})).unwrap();
        let err = net.validate().unwrap_err();
        assert_eq!(err.kind(), "InvalidTopology");
    }

    #[test]
    fn test_fabnet_forms() {
        let spec: FabnetSpec = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(spec.resolve("n1").unwrap(), Some(FabnetKind::IPv4));
        let spec: FabnetSpec = serde_json::from_value(json!("IPv6")).unwrap();
        assert_eq!(spec.resolve("n1").unwrap(), Some(FabnetKind::IPv6));
        let spec: FabnetSpec = serde_json::from_value(json!({"type": "IPv6"})).unwrap();
        assert_eq!(spec.resolve("n1").unwrap(), Some(FabnetKind::IPv6));
        let spec: FabnetSpec = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(spec.resolve("n1").unwrap(), None);
        let spec: FabnetSpec = serde_json::from_value(json!("IPX")).unwrap();
        assert!(spec.resolve("n1").is_err());
    }

    #[test]
    fn test_topology_validation() {
        let topo: TopologySpec = serde_json::from_value(json!({
            "nodes": [{"name": "n1"}, {"name": "n1"}]
        }))
        .unwrap();
        assert!(topo.validate().unwrap_err().to_string().contains("duplicate node"));

        let topo = TopologySpec::default();
        assert!(topo.validate().is_err());

        let topo: TopologySpec = serde_json::from_value(json!({
            "facility_ports": [{"name": "fp1", "site": "STAR", "vlan": 3100}]
        }))
        .unwrap();
        assert!(topo.validate().is_ok());
        assert_eq!(topo.facility_ports[0].vlan, "3100");
    }

    #[test]
    fn test_port_mirror_defaults() {
        let pm: PortMirrorSpec = serde_json::from_value(json!({
            "name": "pm1",
            "mirror_interface_name": "port+star-p4:1",
            "receive_interface": {"node": "n1"}
        }))
        .unwrap();
        assert_eq!(pm.mirror_direction, super::super::catalog::MirrorDirection::Both);
    }
}
