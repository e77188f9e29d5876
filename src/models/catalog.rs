use serde::{Deserialize, Serialize};
use std::fmt;

use crate::slice::TopologyError;

/// Component models that can be attached to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentModel {
    #[serde(rename = "GPU_TeslaT4")]
    GpuTeslaT4,
    #[serde(rename = "GPU_RTX6000")]
    GpuRtx6000,
    #[serde(rename = "GPU_A40")]
    GpuA40,
    #[serde(rename = "GPU_A30")]
    GpuA30,
    #[serde(rename = "NIC_Basic")]
    NicBasic,
    #[serde(rename = "NIC_ConnectX_5")]
    NicConnectX5,
    #[serde(rename = "NIC_ConnectX_6")]
    NicConnectX6,
    #[serde(rename = "NIC_ConnectX_7_100")]
    NicConnectX7_100,
    #[serde(rename = "NIC_ConnectX_7_400")]
    NicConnectX7_400,
    #[serde(rename = "NVME_P4510")]
    NvmeP4510,
    #[serde(rename = "FPGA_Xilinx_U280")]
    FpgaXilinxU280,
    #[serde(rename = "FPGA_Xilinx_SN1022")]
    FpgaXilinxSn1022,
}

impl ComponentModel {
    pub const ALL: &'static [ComponentModel] = &[
        Self::GpuTeslaT4,
        Self::GpuRtx6000,
        Self::GpuA40,
        Self::GpuA30,
        Self::NicBasic,
        Self::NicConnectX5,
        Self::NicConnectX6,
        Self::NicConnectX7_100,
        Self::NicConnectX7_400,
        Self::NvmeP4510,
        Self::FpgaXilinxU280,
        Self::FpgaXilinxSn1022,
    ];

    /// Dedicated NIC used for L2PTP and port mirrors when nothing else is asked for
    pub const DEFAULT_SMARTNIC: ComponentModel = Self::NicConnectX6;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GpuTeslaT4 => "GPU_TeslaT4",
            Self::GpuRtx6000 => "GPU_RTX6000",
            Self::GpuA40 => "GPU_A40",
            Self::GpuA30 => "GPU_A30",
            Self::NicBasic => "NIC_Basic",
            Self::NicConnectX5 => "NIC_ConnectX_5",
            Self::NicConnectX6 => "NIC_ConnectX_6",
            Self::NicConnectX7_100 => "NIC_ConnectX_7_100",
            Self::NicConnectX7_400 => "NIC_ConnectX_7_400",
            Self::NvmeP4510 => "NVME_P4510",
            Self::FpgaXilinxU280 => "FPGA_Xilinx_U280",
            Self::FpgaXilinxSn1022 => "FPGA_Xilinx_SN1022",
        }
    }

    /// Parse a catalog model name, failing with the full catalog on a miss
    pub fn parse(model: &str) -> Result<Self, TopologyError> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == model)
            .ok_or_else(|| TopologyError::unknown_component_model(model))
    }

    /// Parse a model that must be a NIC
    pub fn parse_nic(model: &str, context: &str) -> Result<Self, TopologyError> {
        match Self::ALL.iter().copied().find(|m| m.as_str() == model) {
            Some(m) if m.is_nic() => Ok(m),
            _ => Err(TopologyError::invalid_nic_model(model, context)),
        }
    }

    pub fn is_nic(&self) -> bool {
        matches!(
            self,
            Self::NicBasic
                | Self::NicConnectX5
                | Self::NicConnectX6
                | Self::NicConnectX7_100
                | Self::NicConnectX7_400
        )
    }

    /// Number of dataplane ports the component exposes
    pub fn port_count(&self) -> usize {
        match self {
            Self::NicBasic => 1,
            Self::NicConnectX5
            | Self::NicConnectX6
            | Self::NicConnectX7_100
            | Self::NicConnectX7_400 => 2,
            Self::FpgaXilinxU280 | Self::FpgaXilinxSn1022 => 2,
            Self::GpuTeslaT4 | Self::GpuRtx6000 | Self::GpuA40 | Self::GpuA30 | Self::NvmeP4510 => 0,
        }
    }

    pub fn catalog() -> String {
        join(Self::ALL.iter().map(|m| m.as_str()))
    }

    pub fn nic_catalog() -> String {
        join(Self::ALL.iter().filter(|m| m.is_nic()).map(|m| m.as_str()))
    }
}

impl fmt::Display for ComponentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete network service types understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    L2Bridge,
    L2STS,
    L2PTP,
    FABNetv4,
    FABNetv6,
    FABNetv4Ext,
    FABNetv6Ext,
    IPv4,
    IPv6,
    IPv4Ext,
    IPv6Ext,
}

impl NetworkType {
    pub const ALL: &'static [NetworkType] = &[
        Self::L2PTP,
        Self::L2STS,
        Self::L2Bridge,
        Self::FABNetv4,
        Self::FABNetv6,
        Self::IPv4,
        Self::IPv6,
        Self::FABNetv4Ext,
        Self::FABNetv6Ext,
        Self::IPv4Ext,
        Self::IPv6Ext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2Bridge => "L2Bridge",
            Self::L2STS => "L2STS",
            Self::L2PTP => "L2PTP",
            Self::FABNetv4 => "FABNetv4",
            Self::FABNetv6 => "FABNetv6",
            Self::FABNetv4Ext => "FABNetv4Ext",
            Self::FABNetv6Ext => "FABNetv6Ext",
            Self::IPv4 => "IPv4",
            Self::IPv6 => "IPv6",
            Self::IPv4Ext => "IPv4Ext",
            Self::IPv6Ext => "IPv6Ext",
        }
    }

    /// Case-insensitive lookup in the catalog
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    pub fn is_l3(&self) -> bool {
        !matches!(self, Self::L2Bridge | Self::L2STS | Self::L2PTP)
    }

    /// Site-scoped L3 services that must be instantiated once per site
    pub fn is_fabnet(&self) -> bool {
        matches!(
            self,
            Self::FABNetv4 | Self::FABNetv6 | Self::FABNetv4Ext | Self::FABNetv6Ext
        )
    }

    /// Service type passed to the backend's L3 call
    pub fn l3_service_type(&self) -> Option<NetworkType> {
        match self {
            Self::FABNetv4 | Self::IPv4 => Some(Self::IPv4),
            Self::FABNetv6 | Self::IPv6 => Some(Self::IPv6),
            Self::FABNetv4Ext | Self::IPv4Ext => Some(Self::IPv4Ext),
            Self::FABNetv6Ext | Self::IPv6Ext => Some(Self::IPv6Ext),
            Self::L2Bridge | Self::L2STS | Self::L2PTP => None,
        }
    }

    pub fn catalog() -> String {
        join(Self::ALL.iter().map(|t| t.as_str()))
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirrored traffic direction for port mirror services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorDirection {
    #[serde(alias = "port")]
    Rx,
    Tx,
    #[default]
    Both,
}

/// Address family of a per-node fabnet attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FabnetKind {
    IPv4,
    IPv6,
}

impl FabnetKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ipv4" | "fabnetv4" | "v4" => Some(Self::IPv4),
            "ipv6" | "fabnetv6" | "v6" => Some(Self::IPv6),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IPv4 => "IPv4",
            Self::IPv6 => "IPv6",
        }
    }

    pub fn service_type(&self) -> NetworkType {
        match self {
            Self::IPv4 => NetworkType::IPv4,
            Self::IPv6 => NetworkType::IPv6,
        }
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_catalog_lookup() {
        assert_eq!(ComponentModel::parse("GPU_A40").unwrap(), ComponentModel::GpuA40);
        assert_eq!(ComponentModel::NicConnectX7_400.as_str(), "NIC_ConnectX_7_400");
        assert!(ComponentModel::parse("gpu_a40").is_err());

        let err = ComponentModel::parse("GPU_Unknown").unwrap_err();
        assert_eq!(err.kind(), "UnknownComponentModel");
        let msg = err.to_string();
        assert!(msg.contains("GPU_Unknown"));
        assert!(msg.contains("GPU_TeslaT4"));
        assert!(msg.contains("FPGA_Xilinx_SN1022"));
    }

    #[test]
    fn test_nic_parse_rejects_non_nic() {
        assert_eq!(
            ComponentModel::parse_nic("NIC_ConnectX_5", "network n1").unwrap(),
            ComponentModel::NicConnectX5
        );
        let err = ComponentModel::parse_nic("GPU_A30", "network n1").unwrap_err();
        assert_eq!(err.kind(), "InvalidNicModel");
        assert!(err.to_string().contains("NIC_Basic"));
        assert!(!err.to_string().contains("GPU_TeslaT4"));
    }

    #[test]
    fn test_port_counts() {
        assert_eq!(ComponentModel::NicBasic.port_count(), 1);
        assert_eq!(ComponentModel::NicConnectX6.port_count(), 2);
        assert_eq!(ComponentModel::FpgaXilinxU280.port_count(), 2);
        assert_eq!(ComponentModel::GpuRtx6000.port_count(), 0);
    }

    #[test]
    fn test_network_type_parse_and_mapping() {
        assert_eq!(NetworkType::parse("fabnetv4"), Some(NetworkType::FABNetv4));
        assert_eq!(NetworkType::parse("L2STS"), Some(NetworkType::L2STS));
        assert_eq!(NetworkType::parse("L2"), None);
        assert_eq!(NetworkType::FABNetv6Ext.l3_service_type(), Some(NetworkType::IPv6Ext));
        assert_eq!(NetworkType::IPv4.l3_service_type(), Some(NetworkType::IPv4));
        assert_eq!(NetworkType::L2Bridge.l3_service_type(), None);
        assert!(NetworkType::FABNetv4.is_fabnet());
        assert!(!NetworkType::IPv4.is_fabnet());
        assert!(NetworkType::IPv4.is_l3());
    }

    #[test]
    fn test_mirror_direction_aliases() {
        let d: MirrorDirection = serde_json::from_str("\"port\"").unwrap();
        assert_eq!(d, MirrorDirection::Rx);
        let d: MirrorDirection = serde_json::from_str("\"both\"").unwrap();
        assert_eq!(d, MirrorDirection::Both);
    }
}
