use rand::Rng;
use std::collections::BTreeSet;

use super::graph::{InterfaceRef, Node, SliceGraph};
use super::interface::{endpoint_site, resolve_interface, NicArena};
use super::network_type::{resolve_network_type, resolve_nic_model};
use super::site::{select_site, ResourceRequest, SiteCapacity};
use super::TopologyError;
use crate::models::catalog::{ComponentModel, NetworkType};
use crate::models::slice::{AddComponentSpec, ChangeSet, ComponentChange, ModifySliceRequest};
use crate::models::topology::{
    FacilityPortSpec, InterfaceSpec, NetworkSpec, NodeSpec, PortMirrorSpec, SwitchSpec,
    TopologySpec,
};
use crate::utils::Ipv4Subnet;

/// Knobs that differ between deployments
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Stamp an addressing mode on every node interface (local mode only)
    pub assign_interface_modes: bool,
}

/// Output of a compile pass, ready for submission
#[derive(Debug, Clone)]
pub struct CompiledSlice {
    pub graph: SliceGraph,
    pub added: ChangeSet,
    pub removed: ChangeSet,
}

/// True when any node will need a site picked for it
pub fn needs_site_selection(nodes: &[NodeSpec]) -> bool {
    nodes.iter().any(|n| n.pinned_site().is_none())
}

/// Compile a fresh topology into a slice graph
pub fn compile_topology<R: Rng + ?Sized>(
    topology: &TopologySpec,
    sites: &[SiteCapacity],
    options: CompileOptions,
    rng: &mut R,
) -> Result<CompiledSlice, TopologyError> {
    let mut pass = SlicePass::new(SliceGraph::default(), sites, options, rng);
    pass.add_nodes(&topology.nodes)?;
    pass.add_switches(&topology.switches)?;
    pass.add_facility_ports(&topology.facility_ports)?;
    pass.add_networks(&topology.networks)?;
    pass.add_port_mirrors(&topology.port_mirrors)?;
    Ok(pass.finish())
}

/// Apply removals and then additions to an existing slice graph
pub fn apply_modifications<R: Rng + ?Sized>(
    graph: SliceGraph,
    request: &ModifySliceRequest,
    sites: &[SiteCapacity],
    options: CompileOptions,
    rng: &mut R,
) -> Result<CompiledSlice, TopologyError> {
    let mut pass = SlicePass::new(graph, sites, options, rng);
    pass.remove(request);
    pass.add_nodes(&request.add_nodes)?;
    pass.add_components(&request.add_components)?;
    pass.add_switches(&request.add_switches)?;
    pass.add_facility_ports(&request.add_facility_ports)?;
    pass.add_networks(&request.add_networks)?;
    pass.add_port_mirrors(&request.add_port_mirrors)?;
    Ok(pass.finish())
}

/// One compile invocation. Owns the draft graph, the NIC arena and the
/// used-site list; nothing here is shared across passes.
struct SlicePass<'a, R: Rng + ?Sized> {
    graph: SliceGraph,
    arena: NicArena,
    sites: &'a [SiteCapacity],
    used_sites: Vec<String>,
    options: CompileOptions,
    rng: &'a mut R,
    added: ChangeSet,
    removed: ChangeSet,
}

impl<'a, R: Rng + ?Sized> SlicePass<'a, R> {
    fn new(
        graph: SliceGraph,
        sites: &'a [SiteCapacity],
        options: CompileOptions,
        rng: &'a mut R,
    ) -> Self {
        let used_sites = graph.node_sites();
        Self {
            graph,
            arena: NicArena::new(),
            sites,
            used_sites,
            options,
            rng,
            added: ChangeSet::default(),
            removed: ChangeSet::default(),
        }
    }

    fn finish(self) -> CompiledSlice {
        CompiledSlice {
            graph: self.graph,
            added: self.added,
            removed: self.removed,
        }
    }

    // --- Removals (best-effort) ---

    fn remove(&mut self, request: &ModifySliceRequest) {
        for name in &request.remove_port_mirrors {
            match self.graph.remove_port_mirror(name) {
                Ok(()) => self.removed.port_mirrors.push(name.clone()),
                Err(e) => tracing::warn!("Failed to remove port mirror {}: {}", name, e),
            }
        }
        for name in &request.remove_networks {
            match self.graph.remove_network(name) {
                Ok(()) => self.removed.networks.push(name.clone()),
                Err(e) => tracing::warn!("Failed to remove network {}: {}", name, e),
            }
        }
        for name in &request.remove_facility_ports {
            match self.graph.remove_facility_port(name) {
                Ok(()) => self.removed.facility_ports.push(name.clone()),
                Err(e) => tracing::warn!("Failed to remove facility port {}: {}", name, e),
            }
        }
        for name in &request.remove_switches {
            match self.graph.remove_switch(name) {
                Ok(()) => self.removed.switches.push(name.clone()),
                Err(e) => tracing::warn!("Failed to remove switch {}: {}", name, e),
            }
        }
        for comp in &request.remove_components {
            match self.graph.remove_component(&comp.node, &comp.name) {
                Ok(()) => self.removed.components.push(ComponentChange {
                    node: comp.node.clone(),
                    component: comp.name.clone(),
                    model: None,
                }),
                Err(e) => tracing::warn!(
                    "Failed to remove component {} from {}: {}",
                    comp.name,
                    comp.node,
                    e
                ),
            }
        }
        for name in &request.remove_nodes {
            match self.graph.remove_node(name) {
                Ok(()) => self.removed.nodes.push(name.clone()),
                Err(e) => tracing::warn!("Failed to remove node {}: {}", name, e),
            }
        }
    }

    // --- Additions (abort on first error) ---

    fn add_nodes(&mut self, nodes: &[NodeSpec]) -> Result<(), TopologyError> {
        for spec in nodes {
            let site = match spec.pinned_site() {
                Some(site) => site.to_string(),
                None => {
                    let req = ResourceRequest {
                        cores: spec.cores,
                        ram: spec.ram,
                        disk: spec.disk,
                    };
                    let site = select_site(self.sites, &req, &self.used_sites, &mut *self.rng)?;
                    tracing::info!("Auto-selected site '{}' for node {}", site, spec.name);
                    site
                }
            };

            tracing::info!(
                "Adding node {} at site {} (cores={}, ram={}, disk={})",
                spec.name,
                site,
                spec.cores,
                spec.ram,
                spec.disk
            );
            self.graph.add_node(
                Node::new(&spec.name, &site)
                    .with_capacity(spec.cores, spec.ram, spec.disk)
                    .with_image(&spec.image),
            )?;
            self.used_sites.push(site);
            self.added.nodes.push(spec.name.clone());

            for (i, comp) in spec.components.iter().enumerate() {
                let model = ComponentModel::parse(&comp.model)?;
                let name = comp
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}-{}-{}", spec.name, model, i));
                self.attach_component(&spec.name, &name, model)?;
            }

            if let Some(fabnet) = &spec.fabnet {
                if let Some(kind) = fabnet.resolve(&spec.name)? {
                    let net = self.graph.add_fabnet(&spec.name, kind)?;
                    tracing::info!("Attached node {} to {}", spec.name, net);
                }
            }
        }
        Ok(())
    }

    fn add_components(&mut self, components: &[AddComponentSpec]) -> Result<(), TopologyError> {
        for spec in components {
            if self.graph.node(&spec.node).is_none() {
                return Err(TopologyError::unknown_reference(format!(
                    "node '{}' not found in slice",
                    spec.node
                )));
            }
            let model = ComponentModel::parse(&spec.model)?;
            let name = spec
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-new", spec.node, model));
            self.attach_component(&spec.node, &name, model)?;
        }
        Ok(())
    }

    fn attach_component(
        &mut self,
        node: &str,
        name: &str,
        model: ComponentModel,
    ) -> Result<(), TopologyError> {
        tracing::info!("Adding component {} ({}) to node {}", name, model, node);
        self.graph.add_component(node, name, model)?;
        self.added.components.push(ComponentChange {
            node: node.to_string(),
            component: name.to_string(),
            model: Some(model.as_str().to_string()),
        });
        Ok(())
    }

    fn add_switches(&mut self, switches: &[SwitchSpec]) -> Result<(), TopologyError> {
        for spec in switches {
            tracing::info!("Adding P4 switch {} at site {}", spec.name, spec.site);
            self.graph.add_switch(&spec.name, &spec.site)?;
            self.added.switches.push(spec.name.clone());
        }
        Ok(())
    }

    fn add_facility_ports(&mut self, ports: &[FacilityPortSpec]) -> Result<(), TopologyError> {
        for spec in ports {
            tracing::info!(
                "Adding facility port {} at site {} (VLAN {})",
                spec.name,
                spec.site,
                spec.vlan
            );
            self.graph.add_facility_port(&spec.name, &spec.site, &spec.vlan)?;
            self.added.facility_ports.push(spec.name.clone());
        }
        Ok(())
    }

    fn add_networks(&mut self, networks: &[NetworkSpec]) -> Result<(), TopologyError> {
        for spec in networks {
            self.add_network(spec)?;
        }
        Ok(())
    }

    fn add_network(&mut self, spec: &NetworkSpec) -> Result<(), TopologyError> {
        let endpoints = spec.endpoints();
        if endpoints.len() < 2 {
            return Err(TopologyError::invalid(format!(
                "network '{}' must connect at least 2 nodes/interfaces",
                spec.name
            )));
        }

        let mut placed: Vec<(String, &InterfaceSpec)> = Vec::with_capacity(endpoints.len());
        for ep in &endpoints {
            placed.push((endpoint_site(&self.graph, ep, &spec.name)?, ep));
        }
        let sites: BTreeSet<String> = placed.iter().map(|(site, _)| site.clone()).collect();

        let kind = resolve_network_type(spec.kind.as_deref(), &sites, spec.ero_hops())?;
        let nic_model = resolve_nic_model(&spec.name, spec.nic.as_deref(), kind, spec.bandwidth)?;
        tracing::info!(
            "Adding network {} (requested={}, resolved={}, nic={})",
            spec.name,
            spec.kind.as_deref().unwrap_or("auto"),
            kind,
            nic_model
        );

        if kind.is_fabnet() && sites.len() > 1 {
            return self.add_per_site_networks(spec, kind, nic_model, &placed);
        }

        let mut interfaces = Vec::with_capacity(placed.len());
        for (_, ep) in &placed {
            interfaces.push(self.resolve(ep, &spec.name, nic_model)?);
        }

        if kind.is_l3() {
            if spec.subnet.is_some() {
                tracing::warn!("Ignoring subnet on layer-3 network {}", spec.name);
            }
            self.graph.add_l3network(&spec.name, kind, &interfaces)?;
        } else {
            let subnet = match spec.subnet.as_deref() {
                Some(raw) => Some(
                    Ipv4Subnet::parse(raw)
                        .ok_or_else(|| {
                            TopologyError::invalid(format!(
                                "network '{}': invalid IPv4 subnet '{}'",
                                spec.name, raw
                            ))
                        })?
                        .to_string(),
                ),
                None => None,
            };
            self.graph.add_l2network(&spec.name, kind, &interfaces, subnet)?;

            if kind == NetworkType::L2PTP {
                if let Some(hops) = spec.ero_hops() {
                    tracing::info!("Setting ERO route hops for network {}: {:?}", spec.name, hops);
                    self.graph.set_route_hops(&spec.name, hops)?;
                }
                if let Some(bw) = spec.bandwidth {
                    tracing::info!("Setting bandwidth to {} Gbps for network {}", bw, spec.name);
                    self.graph.set_bandwidth(&spec.name, bw)?;
                }
            }
        }
        self.added.networks.push(spec.name.clone());
        Ok(())
    }

    /// Site-scoped L3 services cannot span sites: split the endpoints by site
    /// (first-seen order) and create `{name}-{site}` for each group.
    fn add_per_site_networks(
        &mut self,
        spec: &NetworkSpec,
        kind: NetworkType,
        nic_model: ComponentModel,
        placed: &[(String, &InterfaceSpec)],
    ) -> Result<(), TopologyError> {
        let mut groups: Vec<(&str, Vec<&InterfaceSpec>)> = Vec::new();
        for (site, ep) in placed {
            match groups.iter_mut().find(|(s, _)| *s == site.as_str()) {
                Some((_, eps)) => eps.push(*ep),
                None => groups.push((site.as_str(), vec![*ep])),
            }
        }

        for (site, eps) in groups {
            let site_name = format!("{}-{}", spec.name, site);
            let mut interfaces = Vec::with_capacity(eps.len());
            for ep in eps {
                interfaces.push(self.resolve(ep, &spec.name, nic_model)?);
            }
            tracing::info!("Creating per-site {} network {} at site {}", kind, site_name, site);
            self.graph.add_l3network(&site_name, kind, &interfaces)?;
            self.added.networks.push(site_name);
        }
        Ok(())
    }

    fn add_port_mirrors(&mut self, mirrors: &[PortMirrorSpec]) -> Result<(), TopologyError> {
        for spec in mirrors {
            tracing::info!(
                "Adding port mirror {}: mirror={}, direction={:?}",
                spec.name,
                spec.mirror_interface_name,
                spec.mirror_direction
            );
            let receive = self.resolve(
                &spec.receive_interface,
                &spec.name,
                ComponentModel::DEFAULT_SMARTNIC,
            )?;
            self.graph.add_port_mirror(
                &spec.name,
                &spec.mirror_interface_name,
                &receive,
                spec.mirror_direction,
            )?;
            self.added.port_mirrors.push(spec.name.clone());
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        spec: &InterfaceSpec,
        network: &str,
        default_nic_model: ComponentModel,
    ) -> Result<InterfaceRef, TopologyError> {
        let iface = resolve_interface(&mut self.graph, &mut self.arena, spec, network, default_nic_model)?;
        let on_node = matches!(
            spec,
            InterfaceSpec::NodeNic { .. } | InterfaceSpec::NodeComponent { .. }
        );
        if self.options.assign_interface_modes && on_node {
            self.graph.set_interface_mode(&iface, spec.mode())?;
        }
        Ok(iface)
    }
}
