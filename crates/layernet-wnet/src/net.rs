use std::collections::BTreeMap;

use layernet_core::types::*;
use layernet_core::units::{Km, KmPerSec, Millisecs};
use layernet_core::{CapacityCheck, Network, NetworkError};

use crate::catalog::{self, UserService, VnfType, USER_SERVICES_KEY, VNF_TYPES_KEY};
use crate::views::*;
use crate::{check_name, WNetError, IP_LAYER, WDM_LAYER};

/// A read-only domain view of a network.
#[derive(Debug, Clone, Copy)]
pub struct WNet<'a> {
    network: &'a Network,
}

/// A domain view of a network that can also change it.
#[derive(Debug)]
pub struct WNetMut<'a> {
    network: &'a mut Network,
}

/// Parameters of a new node.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct WNodeSpec {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub position: Point,
    #[builder(default)]
    pub population: f64,
    #[builder(default)]
    pub cpus: f64,
    #[builder(default)]
    pub ram_gb: f64,
    #[builder(default)]
    pub hd_gb: f64,
    #[builder(default)]
    pub is_core: bool,
    #[builder(default, setter(into))]
    pub node_type: String,
}

fn layer_id(network: &Network, name: &'static str) -> Result<LayerId, WNetError> {
    network
        .layer_by_name(name)
        .map(|l| l.id())
        .ok_or(WNetError::MissingLayer(name))
}

fn layer_of<'n>(network: &'n Network, name: &'static str) -> impl Iterator<Item = &'n Layer> {
    network.layer_by_name(name).into_iter()
}

impl<'a> WNet<'a> {
    /// Wraps a network that has a WDM and an IP layer.
    pub fn new(network: &'a Network) -> Result<Self, WNetError> {
        layer_id(network, WDM_LAYER)?;
        layer_id(network, IP_LAYER)?;
        Ok(Self { network })
    }

    pub fn network(&self) -> &'a Network {
        self.network
    }

    pub fn wdm_layer(&self) -> Result<LayerId, WNetError> {
        layer_id(self.network, WDM_LAYER)
    }

    pub fn ip_layer(&self) -> Result<LayerId, WNetError> {
        layer_id(self.network, IP_LAYER)
    }

    pub fn nodes(&self) -> impl Iterator<Item = WNode<'a>> + 'a {
        let network = self.network;
        network.nodes().map(move |n| WNode::new(network, n))
    }

    pub fn node(&self, id: NodeId) -> Result<WNode<'a>, WNetError> {
        let node = self.network.node(id).ok_or_else(|| unknown(id))?;
        Ok(WNode::new(self.network, node))
    }

    pub fn node_by_name(&self, name: &str) -> Option<WNode<'a>> {
        let node = self.network.node_by_name(name)?;
        Some(WNode::new(self.network, node))
    }

    pub fn fibers(&self) -> impl Iterator<Item = WFiber<'a>> + 'a {
        let network = self.network;
        self.links_in(WDM_LAYER).map(move |l| WFiber::new(network, l))
    }

    pub fn fiber(&self, id: LinkId) -> Result<WFiber<'a>, WNetError> {
        let link = self.link_in(id, WDM_LAYER, "fiber")?;
        Ok(WFiber::new(self.network, link))
    }

    pub fn ip_links(&self) -> impl Iterator<Item = WIpLink<'a>> + 'a {
        let network = self.network;
        self.links_in(IP_LAYER).map(move |l| WIpLink::new(network, l))
    }

    pub fn ip_link(&self, id: LinkId) -> Result<WIpLink<'a>, WNetError> {
        let link = self.link_in(id, IP_LAYER, "IP link")?;
        Ok(WIpLink::new(self.network, link))
    }

    pub fn lightpath_requests(&self) -> impl Iterator<Item = WLightpathRequest<'a>> + 'a {
        let network = self.network;
        self.demands_in(WDM_LAYER)
            .map(move |d| WLightpathRequest::new(network, d))
    }

    pub fn lightpath_request(&self, id: DemandId) -> Result<WLightpathRequest<'a>, WNetError> {
        let demand = self.demand_in(id, WDM_LAYER, "lightpath request")?;
        Ok(WLightpathRequest::new(self.network, demand))
    }

    pub fn lightpaths(&self) -> impl Iterator<Item = WLightpath<'a>> + 'a {
        let network = self.network;
        self.routes_in(WDM_LAYER).map(move |r| WLightpath::new(network, r))
    }

    pub fn lightpath(&self, id: RouteId) -> Result<WLightpath<'a>, WNetError> {
        let route = self.route_in(id, WDM_LAYER, "lightpath")?;
        Ok(WLightpath::new(self.network, route))
    }

    pub fn service_chain_requests(&self) -> impl Iterator<Item = WServiceChainRequest<'a>> + 'a {
        let network = self.network;
        self.demands_in(IP_LAYER)
            .map(move |d| WServiceChainRequest::new(network, d))
    }

    pub fn service_chain_request(
        &self,
        id: DemandId,
    ) -> Result<WServiceChainRequest<'a>, WNetError> {
        let demand = self.demand_in(id, IP_LAYER, "service chain request")?;
        Ok(WServiceChainRequest::new(self.network, demand))
    }

    pub fn service_chains(&self) -> impl Iterator<Item = WServiceChain<'a>> + 'a {
        let network = self.network;
        self.routes_in(IP_LAYER)
            .map(move |r| WServiceChain::new(network, r))
    }

    pub fn service_chain(&self, id: RouteId) -> Result<WServiceChain<'a>, WNetError> {
        let route = self.route_in(id, IP_LAYER, "service chain")?;
        Ok(WServiceChain::new(self.network, route))
    }

    pub fn vnf_instances(&self) -> impl Iterator<Item = WVnfInstance<'a>> + 'a {
        let network = self.network;
        network
            .resources()
            .filter(|r| !is_base_type(r.resource_type()))
            .map(move |r| WVnfInstance::new(network, r))
    }

    pub fn vnf_instance(&self, id: ResourceId) -> Result<WVnfInstance<'a>, WNetError> {
        let resource = self.network.resource(id).ok_or_else(|| unknown(id))?;
        if is_base_type(resource.resource_type()) {
            return Err(wrong_kind(id, "VNF instance"));
        }
        Ok(WVnfInstance::new(self.network, resource))
    }

    pub fn vnf_instance_by_name(&self, name: &str) -> Option<WVnfInstance<'a>> {
        self.vnf_instances().find(|v| v.name() == name)
    }

    pub fn vnf_types(&self) -> Result<BTreeMap<String, VnfType>, WNetError> {
        catalog::load(self.network, VNF_TYPES_KEY)
    }

    pub fn vnf_type(&self, name: &str) -> Result<VnfType, WNetError> {
        self.vnf_types()?
            .remove(name)
            .ok_or_else(|| WNetError::UnknownVnfType(name.to_owned()))
    }

    pub fn user_services(&self) -> Result<BTreeMap<String, UserService>, WNetError> {
        catalog::load(self.network, USER_SERVICES_KEY)
    }

    pub fn user_service(&self, name: &str) -> Result<UserService, WNetError> {
        self.user_services()?
            .remove(name)
            .ok_or_else(|| WNetError::UnknownUserService(name.to_owned()))
    }

    fn links_in(&self, layer: &'static str) -> impl Iterator<Item = &'a Link> + 'a {
        let network = self.network;
        layer_of(network, layer)
            .flat_map(|l| l.links().iter())
            .filter_map(move |l| network.link(*l))
    }

    fn demands_in(&self, layer: &'static str) -> impl Iterator<Item = &'a Demand> + 'a {
        let network = self.network;
        layer_of(network, layer)
            .flat_map(|l| l.demands().iter())
            .filter_map(move |d| network.demand(*d))
    }

    fn routes_in(&self, layer: &'static str) -> impl Iterator<Item = &'a Route> + 'a {
        let network = self.network;
        layer_of(network, layer)
            .flat_map(|l| l.routes().iter())
            .filter_map(move |r| network.route(*r))
    }

    fn link_in(
        &self,
        id: LinkId,
        layer: &'static str,
        kind: &'static str,
    ) -> Result<&'a Link, WNetError> {
        let link = self.network.link(id).ok_or_else(|| unknown(id))?;
        if !in_layer(self.network, link.layer(), layer) {
            return Err(wrong_kind(id, kind));
        }
        Ok(link)
    }

    fn demand_in(
        &self,
        id: DemandId,
        layer: &'static str,
        kind: &'static str,
    ) -> Result<&'a Demand, WNetError> {
        let demand = self.network.demand(id).ok_or_else(|| unknown(id))?;
        if !in_layer(self.network, demand.layer(), layer) {
            return Err(wrong_kind(id, kind));
        }
        Ok(demand)
    }

    fn route_in(
        &self,
        id: RouteId,
        layer: &'static str,
        kind: &'static str,
    ) -> Result<&'a Route, WNetError> {
        let route = self.network.route(id).ok_or_else(|| unknown(id))?;
        if !in_layer(self.network, route.layer(), layer) {
            return Err(wrong_kind(id, kind));
        }
        Ok(route)
    }
}

fn unknown(id: impl Into<ElementId>) -> WNetError {
    WNetError::Network(NetworkError::UnknownElement(id.into()))
}

fn wrong_kind(id: impl Into<ElementId>, expected: &'static str) -> WNetError {
    WNetError::WrongKind {
        element: id.into(),
        expected,
    }
}

impl<'a> WNetMut<'a> {
    /// Turns an empty network into a WDM layer below an IP layer.
    pub fn initialize(network: &'a mut Network) -> Result<Self, WNetError> {
        if network.nr_layers() != 1 || network.nr_nodes() != 0 {
            return Err(WNetError::NotEmpty);
        }
        let wdm = network.default_layer();
        network.set_name(wdm, WDM_LAYER)?;
        network.set_layer_description(wdm, "optical layer")?;
        network.set_link_capacity_units(wdm, "slots")?;
        network.set_demand_traffic_units(wdm, "Gbps")?;
        let ip = network.add_layer(IP_LAYER, "packet layer");
        network.set_link_capacity_units(ip, "Gbps")?;
        network.set_demand_traffic_units(ip, "Gbps")?;
        log::debug!("initialized WDM layer {wdm} and IP layer {ip}");
        Ok(Self { network })
    }

    /// Wraps a network that has a WDM and an IP layer.
    pub fn new(network: &'a mut Network) -> Result<Self, WNetError> {
        WNet::new(network)?;
        Ok(Self { network })
    }

    pub fn view(&self) -> WNet<'_> {
        WNet {
            network: &*self.network,
        }
    }

    pub fn network(&mut self) -> &mut Network {
        self.network
    }

    fn check_unique<'n>(
        name: &str,
        mut existing: impl Iterator<Item = &'n str>,
    ) -> Result<(), WNetError> {
        check_name(name)?;
        if existing.any(|n| n == name) {
            return Err(WNetError::DuplicateName(name.to_owned()));
        }
        Ok(())
    }

    /// Adds a node with its CPU, RAM and HD resources.
    pub fn add_node(&mut self, spec: WNodeSpec) -> Result<NodeId, WNetError> {
        Self::check_unique(&spec.name, self.network.nodes().map(|n| n.name()))?;
        let id = self.network.add_node(spec.name.as_str(), spec.position);
        self.network.set_node_population(id, spec.population)?;
        if spec.is_core {
            self.network.add_tag(id, CORE_TAG)?;
        }
        if !spec.node_type.is_empty() {
            self.network.set_attribute(id, NODE_TYPE_KEY, &spec.node_type)?;
        }
        for (ty, capacity, unit) in [
            (CPU, spec.cpus, "cores"),
            (RAM, spec.ram_gb, "GB"),
            (HD, spec.hd_gb, "GB"),
        ] {
            self.network.add_resource(
                id,
                ty,
                format!("{}-{ty}", spec.name),
                capacity,
                unit,
                BTreeMap::new(),
                Millisecs::ZERO,
            )?;
        }
        Ok(id)
    }

    pub fn set_node_core(&mut self, id: NodeId, is_core: bool) -> Result<(), WNetError> {
        self.view().node(id)?;
        if is_core {
            self.network.add_tag(id, CORE_TAG)?;
        } else {
            self.network.remove_tag(id, CORE_TAG)?;
        }
        Ok(())
    }

    pub fn set_node_type(&mut self, id: NodeId, node_type: &str) -> Result<(), WNetError> {
        self.view().node(id)?;
        self.network.set_attribute(id, NODE_TYPE_KEY, node_type)?;
        Ok(())
    }

    /// Sets the CPU, RAM and HD capacity of a node. Instances above the new capacity leave it
    /// oversubscribed.
    pub fn set_node_base_capacities(
        &mut self,
        id: NodeId,
        cpus: f64,
        ram_gb: f64,
        hd_gb: f64,
    ) -> Result<(), WNetError> {
        let node = self.view().node(id)?;
        let bases = [node.cpu(), node.ram(), node.hd()].map(|r| r.map(|r| r.id()));
        for (base, capacity) in bases.into_iter().zip([cpus, ram_gb, hd_gb]) {
            if let Some(base) = base {
                self.network.set_resource_capacity(
                    base,
                    capacity,
                    BTreeMap::new(),
                    CapacityCheck::AllowOversubscription,
                )?;
            }
        }
        Ok(())
    }

    /// Removes a node with everything attached to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), WNetError> {
        self.view().node(id)?;
        self.network.remove_node(id)?;
        Ok(())
    }

    /// Adds a fiber from `a` to `b`, and one from `b` to `a` if `bidirectional`.
    pub fn add_fiber(
        &mut self,
        a: NodeId,
        b: NodeId,
        length: Km,
        slots: f64,
        bidirectional: bool,
    ) -> Result<(LinkId, Option<LinkId>), WNetError> {
        let wdm = self.view().wdm_layer()?;
        if bidirectional {
            let (ab, ba) =
                self.network
                    .add_link_bidirectional(wdm, a, b, slots, length, KmPerSec::FIBER)?;
            Ok((ab, Some(ba)))
        } else {
            let ab = self.network.add_link(wdm, a, b, slots, length, KmPerSec::FIBER)?;
            Ok((ab, None))
        }
    }

    /// Removes a fiber. Lightpaths over it are removed too.
    pub fn remove_fiber(&mut self, id: LinkId) -> Result<(), WNetError> {
        self.view().fiber(id)?;
        self.network.remove_link(id)?;
        Ok(())
    }

    pub fn set_fiber_failure_state(&mut self, id: LinkId, up: bool) -> Result<(), WNetError> {
        self.view().fiber(id)?;
        self.network.set_link_failure_state(id, up)?;
        Ok(())
    }

    /// Adds a request for a lightpath from `a` to `b`.
    pub fn add_lightpath_request(
        &mut self,
        a: NodeId,
        b: NodeId,
        line_rate_gbps: f64,
        protected: bool,
    ) -> Result<DemandId, WNetError> {
        let wdm = self.view().wdm_layer()?;
        let id = self.network.add_demand(wdm, a, b, line_rate_gbps)?;
        self.network.set_attribute(id, LINE_RATE_KEY, line_rate_gbps)?;
        self.network.set_attribute(id, PROTECTED_KEY, protected)?;
        Ok(id)
    }

    pub fn remove_lightpath_request(&mut self, id: DemandId) -> Result<(), WNetError> {
        self.view().lightpath_request(id)?;
        self.network.remove_demand(id)?;
        Ok(())
    }

    /// Adds a lightpath over `fibers` carrying the line rate of its request and occupying
    /// `slots` optical slots in every fiber.
    pub fn add_lightpath(
        &mut self,
        request: DemandId,
        fibers: &[LinkId],
        slots: f64,
    ) -> Result<RouteId, WNetError> {
        let rate = self.view().lightpath_request(request)?.line_rate_gbps();
        let id = self.network.add_route(request, rate, slots, fibers)?;
        Ok(id)
    }

    /// Adds a lightpath that reserves `slots` in every fiber and takes over the traffic of
    /// `primary` while `primary` is down.
    pub fn add_backup_lightpath(
        &mut self,
        primary: RouteId,
        fibers: &[LinkId],
        slots: f64,
    ) -> Result<RouteId, WNetError> {
        let request = self.view().lightpath(primary)?.element().demand();
        let backup = self.network.add_route(request, 0.0, slots, fibers)?;
        if let Err(e) = self.network.add_backup_route(primary, backup) {
            self.network.remove_route(backup)?;
            return Err(e.into());
        }
        Ok(backup)
    }

    pub fn remove_lightpath(&mut self, id: RouteId) -> Result<(), WNetError> {
        self.view().lightpath(id)?;
        self.network.remove_route(id)?;
        Ok(())
    }

    /// Adds an IP link of the given nominal rate, used while no lightpath request carries it.
    pub fn add_ip_link(
        &mut self,
        a: NodeId,
        b: NodeId,
        nominal_rate_gbps: f64,
        bidirectional: bool,
    ) -> Result<(LinkId, Option<LinkId>), WNetError> {
        let ip = self.view().ip_layer()?;
        if bidirectional {
            let (ab, ba) = self.network.add_link_bidirectional(
                ip,
                a,
                b,
                nominal_rate_gbps,
                Km::ZERO,
                KmPerSec::FIBER,
            )?;
            Ok((ab, Some(ba)))
        } else {
            let ab =
                self.network
                    .add_link(ip, a, b, nominal_rate_gbps, Km::ZERO, KmPerSec::FIBER)?;
            Ok((ab, None))
        }
    }

    /// Makes the lightpath request carry the IP link: the link's capacity becomes the traffic
    /// carried by the request's lightpaths.
    pub fn couple_ip_link(&mut self, ip_link: LinkId, request: DemandId) -> Result<(), WNetError> {
        self.view().ip_link(ip_link)?;
        self.view().lightpath_request(request)?;
        self.network.couple_demand_to_link(request, ip_link)?;
        Ok(())
    }

    /// Adds an IP link between the end nodes of a lightpath request, carried by it.
    pub fn add_ip_link_over(&mut self, request: DemandId) -> Result<LinkId, WNetError> {
        self.view().lightpath_request(request)?;
        let ip = self.view().ip_layer()?;
        Ok(self.network.couple_demand_to_new_link(request, ip)?)
    }

    pub fn decouple_ip_link(&mut self, ip_link: LinkId) -> Result<(), WNetError> {
        self.view().ip_link(ip_link)?;
        self.network.decouple_link(ip_link)?;
        Ok(())
    }

    pub fn remove_ip_link(&mut self, id: LinkId) -> Result<(), WNetError> {
        self.view().ip_link(id)?;
        self.network.remove_link(id)?;
        Ok(())
    }

    /// Adds a VNF type to the catalog, replacing any type of the same name. Existing instances
    /// keep their resources.
    pub fn add_or_update_vnf_type(&mut self, vnf_type: VnfType) -> Result<(), WNetError> {
        vnf_type.validate()?;
        let mut types = self.view().vnf_types()?;
        types.insert(vnf_type.name.clone(), vnf_type);
        catalog::store(self.network, VNF_TYPES_KEY, &types)
    }

    /// Removes a VNF type that neither instances nor user services use.
    pub fn remove_vnf_type(&mut self, name: &str) -> Result<(), WNetError> {
        let view = self.view();
        let mut types = view.vnf_types()?;
        if types.remove(name).is_none() {
            return Err(WNetError::UnknownVnfType(name.to_owned()));
        }
        let in_services = view.user_services()?.values().any(|s| {
            s.upstream_vnf_types
                .iter()
                .chain(&s.downstream_vnf_types)
                .any(|t| t == name)
        });
        if in_services || view.vnf_instances().any(|v| v.vnf_type() == name) {
            return Err(WNetError::VnfTypeInUse(name.to_owned()));
        }
        catalog::store(self.network, VNF_TYPES_KEY, &types)
    }

    /// Adds an instance of a catalog VNF type at `host`, taking the type's CPU, RAM and HD from
    /// the host.
    pub fn add_vnf_instance(
        &mut self,
        host: NodeId,
        name: &str,
        vnf_type: &str,
    ) -> Result<ResourceId, WNetError> {
        let view = self.view();
        Self::check_unique(name, view.vnf_instances().map(|v| v.name()))?;
        let ty = view.vnf_type(vnf_type)?;
        let node = view.node(host)?;
        if !ty.may_be_hosted_at(node.name()) {
            return Err(WNetError::HostNotAllowed {
                vnf_type: ty.name,
                node: host,
            });
        }
        let bases = [
            (node.cpu(), ty.cpu),
            (node.ram(), ty.ram_gb),
            (node.hd(), ty.hd_gb),
        ]
        .into_iter()
        .filter_map(|(base, amount)| Some((base?.id(), amount)))
        .collect();
        let id = self.network.add_resource(
            host,
            ty.name.as_str(),
            name,
            ty.max_input_traffic_gbps,
            "Gbps",
            bases,
            Millisecs::new(ty.processing_time_ms),
        )?;
        log::debug!("added {} instance {name} at node {host}", ty.name);
        Ok(id)
    }

    /// Removes a VNF instance and the service chains through it.
    pub fn remove_vnf_instance(&mut self, id: ResourceId) -> Result<(), WNetError> {
        self.view().vnf_instance(id)?;
        self.network.remove_resource(id)?;
        Ok(())
    }

    /// Adds a user service to the catalog, replacing any service of the same name. Its VNF types
    /// must be in the catalog.
    pub fn add_or_update_user_service(&mut self, service: UserService) -> Result<(), WNetError> {
        let view = self.view();
        service.validate(&view.vnf_types()?)?;
        let mut services = view.user_services()?;
        services.insert(service.name.clone(), service);
        catalog::store(self.network, USER_SERVICES_KEY, &services)
    }

    pub fn remove_user_service(&mut self, name: &str) -> Result<(), WNetError> {
        let mut services = self.view().user_services()?;
        if services.remove(name).is_none() {
            return Err(WNetError::UnknownUserService(name.to_owned()));
        }
        catalog::store(self.network, USER_SERVICES_KEY, &services)
    }

    /// Adds a request for the upstream or downstream traffic of a user service, which must
    /// traverse the service's VNF types for that direction.
    pub fn add_service_chain_request(
        &mut self,
        ingress: NodeId,
        egress: NodeId,
        user_service: &str,
        upstream: bool,
        offered_traffic_gbps: f64,
    ) -> Result<DemandId, WNetError> {
        let view = self.view();
        let ip = view.ip_layer()?;
        let service = view.user_service(user_service)?;
        if service.ending_in_core_node {
            let core_end = if upstream { egress } else { ingress };
            if !view.node(core_end)?.is_core() {
                return Err(WNetError::NotCoreNode {
                    service: service.name,
                    node: core_end,
                });
            }
        }
        let (types, factors) = service.chain(upstream);
        let id = self
            .network
            .add_demand(ip, ingress, egress, offered_traffic_gbps)?;
        self.network.set_demand_service_chain(id, types, factors)?;
        let max_latency = service.max_latency_ms(upstream).map(Millisecs::new);
        self.network.set_demand_max_latency(id, max_latency)?;
        self.network.set_attribute(id, USER_SERVICE_KEY, &service.name)?;
        self.network.set_attribute(id, UPSTREAM_KEY, upstream)?;
        Ok(id)
    }

    /// Adds the upstream request from `access` to `core` and the downstream request back, with
    /// the downstream traffic scaled by the service's downstream factor.
    pub fn add_user_service_requests(
        &mut self,
        access: NodeId,
        core: NodeId,
        user_service: &str,
        upstream_traffic_gbps: f64,
    ) -> Result<(DemandId, DemandId), WNetError> {
        let factor = self.view().user_service(user_service)?.downstream_traffic_factor;
        let up = self.add_service_chain_request(
            access,
            core,
            user_service,
            true,
            upstream_traffic_gbps,
        )?;
        let down = self.add_service_chain_request(
            core,
            access,
            user_service,
            false,
            upstream_traffic_gbps * factor,
        )?;
        Ok((up, down))
    }

    pub fn remove_service_chain_request(&mut self, id: DemandId) -> Result<(), WNetError> {
        self.view().service_chain_request(id)?;
        self.network.remove_demand(id)?;
        Ok(())
    }

    /// Adds a service chain over IP links and VNF instances, injecting `injected_traffic_gbps`
    /// at the ingress. Each element carries the traffic entering it.
    pub fn add_service_chain(
        &mut self,
        request: DemandId,
        path: Vec<PathElement>,
        injected_traffic_gbps: f64,
    ) -> Result<RouteId, WNetError> {
        let view = self.view();
        view.service_chain_request(request)?;
        for elem in &path {
            match *elem {
                PathElement::Link(l) => {
                    view.ip_link(l)?;
                }
                PathElement::Resource(r) => {
                    view.vnf_instance(r)?;
                }
            }
        }
        let id = self
            .network
            .add_service_chain_injecting(request, injected_traffic_gbps, path)?;
        Ok(id)
    }

    pub fn remove_service_chain(&mut self, id: RouteId) -> Result<(), WNetError> {
        self.view().service_chain(id)?;
        self.network.remove_route(id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    struct Metro {
        nodes: [NodeId; 3],
        request: DemandId,
        lightpath: RouteId,
        ip_link: LinkId,
        fibers: Vec<LinkId>,
    }

    // Access node a, transit b and core node c, with a 100G lightpath from a to c over b.
    fn metro(network: &mut Network) -> anyhow::Result<Metro> {
        let mut wnet = WNetMut::initialize(network)?;
        let spec = |name: &str, core| {
            WNodeSpec::builder()
                .name(name)
                .cpus(16.0)
                .ram_gb(64.0)
                .hd_gb(1000.0)
                .is_core(core)
                .build()
        };
        let nodes = [
            wnet.add_node(spec("a", false))?,
            wnet.add_node(spec("b", false))?,
            wnet.add_node(spec("c", true))?,
        ];
        let mut fibers = Vec::new();
        for (i, j) in [(0, 1), (1, 2)] {
            let (ab, ba) = wnet.add_fiber(nodes[i], nodes[j], Km::new(80.0), 320.0, true)?;
            fibers.push(ab);
            fibers.extend(ba);
        }
        let request = wnet.add_lightpath_request(nodes[0], nodes[2], 100.0, false)?;
        let lightpath = wnet.add_lightpath(request, &[fibers[0], fibers[2]], 4.0)?;
        let ip_link = wnet.add_ip_link_over(request)?;
        Ok(Metro {
            nodes,
            request,
            lightpath,
            ip_link,
            fibers,
        })
    }

    fn with_firewall(wnet: &mut WNetMut<'_>, ids: &Metro) -> anyhow::Result<ResourceId> {
        let fw = VnfType::builder()
            .name("FW")
            .max_input_traffic_gbps(40.0)
            .cpu(4.0)
            .ram_gb(8.0)
            .processing_time_ms(0.5)
            .build();
        wnet.add_or_update_vnf_type(fw)?;
        let service = UserService::builder()
            .name("internet")
            .upstream_vnf_types(vec!["FW".into()])
            .downstream_traffic_factor(4.0)
            .upstream_max_latency_ms(5.0)
            .ending_in_core_node(true)
            .build();
        wnet.add_or_update_user_service(service)?;
        Ok(wnet.add_vnf_instance(ids.nodes[2], "fw-c", "FW")?)
    }

    #[test]
    fn initialize_builds_two_layers() -> anyhow::Result<()> {
        let mut network = Network::new();
        let ids = metro(&mut network)?;
        let wnet = WNet::new(&network)?;
        assert_eq!(network.layers_top_down(), vec![wnet.ip_layer()?, wnet.wdm_layer()?]);
        assert_eq!(wnet.nodes().count(), 3);
        assert_eq!(wnet.fibers().count(), 4);
        assert_eq!(wnet.ip_links().count(), 1);
        let node = wnet.node(ids.nodes[2])?;
        assert!(node.is_core());
        assert_eq!(node.base_capacities(), [16.0, 64.0, 1000.0]);
        assert_eq!(node.incoming_fibers().count(), 1);
        assert_eq!(node.incoming_ip_links().count(), 1);
        assert!(matches!(WNetMut::initialize(&mut network), Err(WNetError::NotEmpty)));
        assert!(matches!(
            WNet::new(&Network::new()),
            Err(WNetError::MissingLayer(WDM_LAYER))
        ));
        Ok(())
    }

    #[test]
    fn lightpaths_carry_ip_links() -> anyhow::Result<()> {
        let mut network = Network::new();
        let ids = metro(&mut network)?;
        let wnet = WNet::new(&network)?;
        let ip_link = wnet.ip_link(ids.ip_link)?;
        assert_eq!(ip_link.capacity_gbps(), 100.0);
        let request = ip_link.coupled_lightpath_request().context("not coupled")?;
        assert_eq!(request.id(), ids.request);
        let lightpath = wnet.lightpath(ids.lightpath)?;
        assert_eq!(lightpath.fibers().count(), 2);
        assert_eq!(lightpath.length(), Km::new(160.0));
        let fiber = wnet.fiber(ids.fibers[0])?;
        assert_eq!(fiber.occupied_slots(), 4.0);
        assert_eq!(fiber.traversing_lightpaths().count(), 1);

        // Views only accept elements of their own kind.
        assert!(matches!(
            wnet.fiber(ids.ip_link),
            Err(WNetError::WrongKind { expected: "fiber", .. })
        ));
        assert!(wnet.lightpath_request(ids.request).is_ok());
        assert!(wnet.service_chain_request(ids.request).is_err());
        Ok(())
    }

    #[test]
    fn fiber_cut_and_backup_lightpath() -> anyhow::Result<()> {
        let mut network = Network::new();
        let ids = metro(&mut network)?;
        let mut wnet = WNetMut::new(&mut network)?;
        // A direct fiber a-c for the backup.
        let (ac, _) = wnet.add_fiber(ids.nodes[0], ids.nodes[2], Km::new(150.0), 320.0, false)?;
        let backup = wnet.add_backup_lightpath(ids.lightpath, &[ac], 4.0)?;
        wnet.set_fiber_failure_state(ids.fibers[0], false)?;
        let view = wnet.view();
        assert!(!view.lightpath(ids.lightpath)?.is_up());
        assert!(view.lightpath(backup)?.is_backup());
        assert_eq!(view.ip_link(ids.ip_link)?.capacity_gbps(), 100.0);

        // A lightpath cannot back up a lightpath of another request.
        let other = wnet.add_lightpath_request(ids.nodes[0], ids.nodes[2], 10.0, true)?;
        let lone = wnet.add_lightpath(other, &[ac], 1.0)?;
        let before = wnet.view().lightpaths().count();
        assert!(wnet.add_backup_lightpath(lone, &[ids.fibers[0], ids.fibers[2]], 1.0).is_ok());
        assert!(wnet.add_backup_lightpath(backup, &[ac], 1.0).is_err());
        assert_eq!(wnet.view().lightpaths().count(), before + 1);
        Ok(())
    }

    #[test]
    fn vnf_instances_take_node_resources() -> anyhow::Result<()> {
        let mut network = Network::new();
        let ids = metro(&mut network)?;
        let mut wnet = WNetMut::new(&mut network)?;
        let fw = with_firewall(&mut wnet, &ids)?;
        let view = wnet.view();
        let instance = view.vnf_instance(fw)?;
        assert_eq!(instance.vnf_type(), "FW");
        assert_eq!(instance.base_occupation(), [4.0, 8.0, 0.0]);
        let host = instance.host().context("missing host")?;
        assert_eq!(host.occupied_base_capacities(), [4.0, 8.0, 0.0]);
        assert_eq!(host.vnf_instances().count(), 1);
        insta::assert_yaml_snapshot!(view.vnf_types()?, @r###"
        ---
        FW:
          name: FW
          max_input_traffic_gbps: 40.0
          cpu: 4.0
          ram_gb: 8.0
          hd_gb: 0.0
          processing_time_ms: 0.5
          allowed_nodes: ~
          description: ""
        "###);

        assert!(matches!(
            wnet.add_vnf_instance(ids.nodes[2], "fw-c", "FW"),
            Err(WNetError::DuplicateName(_))
        ));
        assert!(matches!(
            wnet.add_vnf_instance(ids.nodes[2], "fw c", "FW"),
            Err(WNetError::InvalidName(_))
        ));
        assert!(matches!(
            wnet.add_vnf_instance(ids.nodes[2], "nat-c", "NAT"),
            Err(WNetError::UnknownVnfType(_))
        ));
        assert!(matches!(wnet.remove_vnf_type("FW"), Err(WNetError::VnfTypeInUse(_))));
        Ok(())
    }

    #[test]
    fn service_chains_traverse_instances() -> anyhow::Result<()> {
        let mut network = Network::new();
        let ids = metro(&mut network)?;
        let mut wnet = WNetMut::new(&mut network)?;
        let fw = with_firewall(&mut wnet, &ids)?;
        assert!(matches!(
            wnet.add_service_chain_request(ids.nodes[0], ids.nodes[1], "internet", true, 1.0),
            Err(WNetError::NotCoreNode { .. })
        ));
        let (up, down) = wnet.add_user_service_requests(ids.nodes[0], ids.nodes[2], "internet", 2.5)?;
        let path = vec![PathElement::Link(ids.ip_link), PathElement::Resource(fw)];
        let chain = wnet.add_service_chain(up, path, 2.5)?;

        let view = wnet.view();
        let request = view.service_chain_request(up)?;
        assert_eq!(request.vnf_types(), &["FW".to_owned()]);
        assert_eq!(request.user_service(), Some("internet"));
        assert!(request.is_upstream());
        assert_eq!(request.max_latency(), Some(Millisecs::new(5.0)));
        assert_eq!(request.carried_traffic_gbps(), 2.5);
        let downstream = view.service_chain_request(down)?;
        assert!(!downstream.is_upstream());
        assert_eq!(downstream.offered_traffic_gbps(), 10.0);
        assert!(downstream.vnf_types().is_empty());

        let chain = view.service_chain(chain)?;
        assert_eq!(chain.vnf_instances().count(), 1);
        assert_eq!(
            chain.ip_links().map(|l| l.id()).collect::<Vec<_>>(),
            vec![ids.ip_link]
        );
        // IP links over lightpaths have no length of their own.
        assert_eq!(chain.latency(), Millisecs::new(0.5));
        assert_eq!(view.vnf_instance(fw)?.occupied_capacity_gbps(), 2.5);
        assert_eq!(view.ip_link(ids.ip_link)?.carried_traffic_gbps(), 2.5);

        wnet.remove_vnf_instance(fw)?;
        assert_eq!(wnet.view().service_chains().count(), 0);
        Ok(())
    }
}
