//! Read-only views of the domain elements. A view borrows the network and the element it wraps;
//! it is created on every access and holds nothing else.

use layernet_core::types::*;
use layernet_core::units::{Km, Millisecs};
use layernet_core::Network;

use crate::{IP_LAYER, WDM_LAYER};

pub(crate) const CORE_TAG: &str = "core";
pub(crate) const NODE_TYPE_KEY: &str = "node_type";
pub(crate) const LINE_RATE_KEY: &str = "line_rate_gbps";
pub(crate) const PROTECTED_KEY: &str = "protected";
pub(crate) const USER_SERVICE_KEY: &str = "user_service";
pub(crate) const UPSTREAM_KEY: &str = "upstream";

pub(crate) const CPU: &str = "CPU";
pub(crate) const RAM: &str = "RAM";
pub(crate) const HD: &str = "HD";

pub(crate) fn is_base_type(resource_type: &str) -> bool {
    [CPU, RAM, HD].contains(&resource_type)
}

pub(crate) fn in_layer(network: &Network, layer: LayerId, name: &str) -> bool {
    network.layer(layer).map_or(false, |l| l.name() == name)
}

macro_rules! view {
    ($(#[$doc: meta])* $name: ident, $elem: ty, $field: ident, $id: ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name<'a> {
            network: &'a Network,
            $field: &'a $elem,
        }

        impl<'a> $name<'a> {
            pub(crate) fn new(network: &'a Network, $field: &'a $elem) -> Self {
                Self { network, $field }
            }

            pub fn id(&self) -> $id {
                self.$field.id()
            }

            pub fn name(&self) -> &'a str {
                self.$field.name()
            }

            /// The wrapped element.
            pub fn element(&self) -> &'a $elem {
                self.$field
            }
        }

        impl PartialEq for $name<'_> {
            fn eq(&self, other: &Self) -> bool {
                self.id() == other.id()
            }
        }
    };
}

view!(
    /// A node with its CPU, RAM and HD resources.
    WNode, Node, node, NodeId
);
view!(
    /// A fiber: a link of the WDM layer whose capacity is its number of optical slots.
    WFiber, Link, link, LinkId
);
view!(
    /// A request for a lightpath of a given line rate: a demand of the WDM layer.
    WLightpathRequest, Demand, demand, DemandId
);
view!(
    /// A lightpath realizing a lightpath request: a route of the WDM layer.
    WLightpath, Route, route, RouteId
);
view!(
    /// A link of the IP layer, possibly carried by a lightpath request.
    WIpLink, Link, link, LinkId
);
view!(
    /// An instance of a VNF type, based on the CPU, RAM and HD of its host.
    WVnfInstance, Resource, resource, ResourceId
);
view!(
    /// Traffic of a user service that must traverse a sequence of VNF types: a demand of the
    /// IP layer.
    WServiceChainRequest, Demand, demand, DemandId
);
view!(
    /// A service chain realizing a request: a route of the IP layer over IP links and VNF
    /// instances.
    WServiceChain, Route, route, RouteId
);

fn node_view(network: &Network, id: NodeId) -> Option<WNode<'_>> {
    network.node(id).map(|n| WNode::new(network, n))
}

impl<'a> WNode<'a> {
    pub fn position(&self) -> Point {
        self.node.position()
    }

    pub fn population(&self) -> f64 {
        self.node.population()
    }

    pub fn is_core(&self) -> bool {
        self.node.has_tag(CORE_TAG)
    }

    pub fn node_type(&self) -> &'a str {
        self.node.attributes().get(NODE_TYPE_KEY).unwrap_or_default()
    }

    pub fn is_up(&self) -> bool {
        self.node.is_up()
    }

    fn base(&self, resource_type: &str) -> Option<&'a Resource> {
        self.network.resources_at(self.node.id(), resource_type).next()
    }

    pub fn cpu(&self) -> Option<&'a Resource> {
        self.base(CPU)
    }

    pub fn ram(&self) -> Option<&'a Resource> {
        self.base(RAM)
    }

    pub fn hd(&self) -> Option<&'a Resource> {
        self.base(HD)
    }

    /// Total CPU, RAM and HD capacity.
    pub fn base_capacities(&self) -> [f64; 3] {
        [self.cpu(), self.ram(), self.hd()].map(|r| r.map_or(0.0, |r| r.capacity()))
    }

    /// CPU, RAM and HD capacity taken by VNF instances.
    pub fn occupied_base_capacities(&self) -> [f64; 3] {
        [self.cpu(), self.ram(), self.hd()].map(|r| r.map_or(0.0, |r| r.occupied_capacity()))
    }

    pub fn outgoing_fibers(&self) -> impl Iterator<Item = WFiber<'a>> + 'a {
        let network = self.network;
        self.links_of(self.node.outgoing_links(), WDM_LAYER)
            .map(move |l| WFiber::new(network, l))
    }

    pub fn incoming_fibers(&self) -> impl Iterator<Item = WFiber<'a>> + 'a {
        let network = self.network;
        self.links_of(self.node.incoming_links(), WDM_LAYER)
            .map(move |l| WFiber::new(network, l))
    }

    pub fn outgoing_ip_links(&self) -> impl Iterator<Item = WIpLink<'a>> + 'a {
        let network = self.network;
        self.links_of(self.node.outgoing_links(), IP_LAYER)
            .map(move |l| WIpLink::new(network, l))
    }

    pub fn incoming_ip_links(&self) -> impl Iterator<Item = WIpLink<'a>> + 'a {
        let network = self.network;
        self.links_of(self.node.incoming_links(), IP_LAYER)
            .map(move |l| WIpLink::new(network, l))
    }

    fn links_of(
        &self,
        links: &'a std::collections::BTreeSet<LinkId>,
        layer: &'static str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        let network = self.network;
        links
            .iter()
            .filter_map(move |l| network.link(*l))
            .filter(move |l| in_layer(network, l.layer(), layer))
    }

    pub fn vnf_instances(&self) -> impl Iterator<Item = WVnfInstance<'a>> + 'a {
        let network = self.network;
        self.node
            .resources()
            .iter()
            .filter_map(move |r| network.resource(*r))
            .filter(|r| !is_base_type(r.resource_type()))
            .map(move |r| WVnfInstance::new(network, r))
    }
}

impl<'a> WFiber<'a> {
    pub fn a(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.link.origin())
    }

    pub fn b(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.link.destination())
    }

    pub fn length(&self) -> Km {
        self.link.length()
    }

    pub fn propagation_delay(&self) -> Millisecs {
        self.link.propagation_delay()
    }

    pub fn number_of_slots(&self) -> f64 {
        self.link.capacity()
    }

    pub fn occupied_slots(&self) -> f64 {
        self.link.occupied_capacity()
    }

    pub fn is_up(&self) -> bool {
        self.link.is_up()
    }

    pub fn bidirectional_pair(&self) -> Option<WFiber<'a>> {
        let pair = self.network.link(self.link.bidirectional_pair()?)?;
        Some(WFiber::new(self.network, pair))
    }

    pub fn traversing_lightpaths(&self) -> impl Iterator<Item = WLightpath<'a>> + 'a {
        let network = self.network;
        self.link
            .traversing_routes()
            .filter_map(move |r| network.route(r))
            .map(move |r| WLightpath::new(network, r))
    }
}

impl<'a> WLightpathRequest<'a> {
    pub fn a(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.demand.ingress())
    }

    pub fn b(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.demand.egress())
    }

    pub fn line_rate_gbps(&self) -> f64 {
        self.demand.attributes().get_f64(LINE_RATE_KEY).unwrap_or(0.0)
    }

    /// Whether the request asks for a backup lightpath.
    pub fn is_protected(&self) -> bool {
        self.demand.attributes().get(PROTECTED_KEY) == Some("true")
    }

    pub fn is_up(&self) -> bool {
        self.demand.carried_traffic() > 0.0
    }

    pub fn lightpaths(&self) -> impl Iterator<Item = WLightpath<'a>> + 'a {
        let network = self.network;
        self.demand
            .routes()
            .iter()
            .filter_map(move |r| network.route(*r))
            .map(move |r| WLightpath::new(network, r))
    }

    pub fn coupled_ip_link(&self) -> Option<WIpLink<'a>> {
        let link = self.network.link(self.demand.coupled_upper_link()?)?;
        Some(WIpLink::new(self.network, link))
    }
}

impl<'a> WLightpath<'a> {
    pub fn request(&self) -> Option<WLightpathRequest<'a>> {
        let demand = self.network.demand(self.route.demand())?;
        Some(WLightpathRequest::new(self.network, demand))
    }

    pub fn fibers(&self) -> impl Iterator<Item = WFiber<'a>> + 'a {
        let network = self.network;
        self.route
            .seq_links()
            .filter_map(move |l| network.link(l))
            .map(move |l| WFiber::new(network, l))
    }

    pub fn occupied_slots(&self) -> f64 {
        self.route.occupied_capacity().first().copied().unwrap_or(0.0)
    }

    pub fn line_rate_gbps(&self) -> f64 {
        self.request().map_or(0.0, |r| r.line_rate_gbps())
    }

    pub fn is_up(&self) -> bool {
        !self.route.is_down()
    }

    pub fn is_backup(&self) -> bool {
        self.route.is_backup_route()
    }

    pub fn backups(&self) -> impl Iterator<Item = WLightpath<'a>> + 'a {
        let network = self.network;
        self.route
            .backup_routes()
            .iter()
            .filter_map(move |r| network.route(*r))
            .map(move |r| WLightpath::new(network, r))
    }

    pub fn length(&self) -> Km {
        self.route.seq_links().filter_map(|l| self.network.link(l)).map(|l| l.length()).sum()
    }

    pub fn propagation_delay(&self) -> Millisecs {
        self.network.path_delay(self.route.path())
    }
}

impl<'a> WIpLink<'a> {
    pub fn a(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.link.origin())
    }

    pub fn b(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.link.destination())
    }

    /// The capacity: the rate of the carrying lightpaths if coupled, the nominal rate otherwise.
    pub fn capacity_gbps(&self) -> f64 {
        self.link.capacity()
    }

    pub fn carried_traffic_gbps(&self) -> f64 {
        self.link.carried_traffic()
    }

    pub fn utilization(&self) -> f64 {
        self.link.utilization()
    }

    pub fn is_up(&self) -> bool {
        self.link.is_up()
    }

    pub fn bidirectional_pair(&self) -> Option<WIpLink<'a>> {
        let pair = self.network.link(self.link.bidirectional_pair()?)?;
        Some(WIpLink::new(self.network, pair))
    }

    pub fn coupled_lightpath_request(&self) -> Option<WLightpathRequest<'a>> {
        let demand = self.network.demand(self.link.coupled_lower_demand()?)?;
        Some(WLightpathRequest::new(self.network, demand))
    }

    pub fn traversing_service_chains(&self) -> impl Iterator<Item = WServiceChain<'a>> + 'a {
        let network = self.network;
        self.link
            .traversing_routes()
            .filter_map(move |r| network.route(r))
            .map(move |r| WServiceChain::new(network, r))
    }
}

impl<'a> WVnfInstance<'a> {
    pub fn host(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.resource.host())
    }

    pub fn vnf_type(&self) -> &'a str {
        self.resource.resource_type()
    }

    pub fn capacity_gbps(&self) -> f64 {
        self.resource.capacity()
    }

    pub fn occupied_capacity_gbps(&self) -> f64 {
        self.resource.occupied_capacity()
    }

    pub fn processing_time(&self) -> Millisecs {
        self.resource.processing_time()
    }

    /// CPU, RAM and HD this instance takes from its host.
    pub fn base_occupation(&self) -> [f64; 3] {
        let host = self.host();
        let taken = |base: Option<&Resource>| {
            base.map_or(0.0, |b| self.resource.capacity_occupied_in_base_resource(b.id()))
        };
        [
            taken(host.and_then(|h| h.cpu())),
            taken(host.and_then(|h| h.ram())),
            taken(host.and_then(|h| h.hd())),
        ]
    }

    pub fn traversing_service_chains(&self) -> impl Iterator<Item = WServiceChain<'a>> + 'a {
        let network = self.network;
        self.resource
            .traversing_routes()
            .iter()
            .filter_map(move |r| network.route(*r))
            .map(move |r| WServiceChain::new(network, r))
    }
}

impl<'a> WServiceChainRequest<'a> {
    pub fn ingress(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.demand.ingress())
    }

    pub fn egress(&self) -> Option<WNode<'a>> {
        node_view(self.network, self.demand.egress())
    }

    pub fn user_service(&self) -> Option<&'a str> {
        self.demand.attributes().get(USER_SERVICE_KEY)
    }

    pub fn is_upstream(&self) -> bool {
        self.demand.attributes().get(UPSTREAM_KEY) != Some("false")
    }

    pub fn vnf_types(&self) -> &'a [String] {
        self.demand.service_chain()
    }

    pub fn offered_traffic_gbps(&self) -> f64 {
        self.demand.offered_traffic()
    }

    pub fn carried_traffic_gbps(&self) -> f64 {
        self.demand.carried_traffic()
    }

    pub fn max_latency(&self) -> Option<Millisecs> {
        self.demand.max_latency()
    }

    pub fn service_chains(&self) -> impl Iterator<Item = WServiceChain<'a>> + 'a {
        let network = self.network;
        self.demand
            .routes()
            .iter()
            .filter_map(move |r| network.route(*r))
            .map(move |r| WServiceChain::new(network, r))
    }
}

impl<'a> WServiceChain<'a> {
    pub fn request(&self) -> Option<WServiceChainRequest<'a>> {
        let demand = self.network.demand(self.route.demand())?;
        Some(WServiceChainRequest::new(self.network, demand))
    }

    pub fn path(&self) -> &'a [PathElement] {
        self.route.path()
    }

    pub fn ip_links(&self) -> impl Iterator<Item = WIpLink<'a>> + 'a {
        let network = self.network;
        self.route
            .seq_links()
            .filter_map(move |l| network.link(l))
            .map(move |l| WIpLink::new(network, l))
    }

    pub fn vnf_instances(&self) -> impl Iterator<Item = WVnfInstance<'a>> + 'a {
        let network = self.network;
        self.route
            .seq_resources()
            .filter_map(move |r| network.resource(r))
            .map(move |r| WVnfInstance::new(network, r))
    }

    /// Traffic entering the chain at the ingress.
    pub fn injected_traffic_gbps(&self) -> f64 {
        self.route.carried_traffic_if_not_failing()
    }

    pub fn is_up(&self) -> bool {
        !self.route.is_down()
    }

    pub fn latency(&self) -> Millisecs {
        self.network.path_delay(self.route.path())
    }
}
