use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::units::{Km, KmPerSec, Millisecs};

/// Relative tolerance used when comparing traffic and capacity values.
pub const PRECISION_FACTOR: f64 = 1e-6;

identifier!(NodeId, u64);
identifier!(LinkId, u64);
identifier!(DemandId, u64);
identifier!(RouteId, u64);
identifier!(MulticastDemandId, u64);
identifier!(MulticastTreeId, u64);
identifier!(ResourceId, u64);
identifier!(SrgId, u64);
identifier!(LayerId, u64);

/// A reference to any element of a [`Network`](crate::Network).
///
/// Every element kind draws its ID from the same counter, so the inner values are unique across
/// variants as well.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ElementId {
    Node(NodeId),
    Link(LinkId),
    Demand(DemandId),
    Route(RouteId),
    MulticastDemand(MulticastDemandId),
    MulticastTree(MulticastTreeId),
    Resource(ResourceId),
    Srg(SrgId),
    Layer(LayerId),
}

element_kind!(Node, NodeId, as_node, is_node);
element_kind!(Link, LinkId, as_link, is_link);
element_kind!(Demand, DemandId, as_demand, is_demand);
element_kind!(Route, RouteId, as_route, is_route);
element_kind!(MulticastDemand, MulticastDemandId, as_multicast_demand, is_multicast_demand);
element_kind!(MulticastTree, MulticastTreeId, as_multicast_tree, is_multicast_tree);
element_kind!(Resource, ResourceId, as_resource, is_resource);
element_kind!(Srg, SrgId, as_srg, is_srg);
element_kind!(Layer, LayerId, as_layer, is_layer);

impl ElementId {
    /// The network-wide unique value behind this ID.
    pub fn inner(self) -> u64 {
        match self {
            ElementId::Node(id) => id.inner(),
            ElementId::Link(id) => id.inner(),
            ElementId::Demand(id) => id.inner(),
            ElementId::Route(id) => id.inner(),
            ElementId::MulticastDemand(id) => id.inner(),
            ElementId::MulticastTree(id) => id.inner(),
            ElementId::Resource(id) => id.inner(),
            ElementId::Srg(id) => id.inner(),
            ElementId::Layer(id) => id.inner(),
        }
    }

    fn kind(self) -> &'static str {
        match self {
            ElementId::Node(_) => "node",
            ElementId::Link(_) => "link",
            ElementId::Demand(_) => "demand",
            ElementId::Route(_) => "route",
            ElementId::MulticastDemand(_) => "multicast demand",
            ElementId::MulticastTree(_) => "multicast tree",
            ElementId::Resource(_) => "resource",
            ElementId::Srg(_) => "SRG",
            ElementId::Layer(_) => "layer",
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.inner())
    }
}

/// User-defined key/value data attached to an element.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Attributes {
    inner: BTreeMap<String, String>,
}

impl Attributes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    /// Returns the value under `key` parsed as a number, if present and well formed.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Sets an attribute, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.inner.insert(key.into(), value.to_string())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    delegate::delegate! {
        to self.inner {
            pub fn len(&self) -> usize;

            pub fn is_empty(&self) -> bool;

            pub fn contains_key(&self, key: &str) -> bool;

            pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, String>;
        }
    }
}

/// The name, attributes and tags every element carries.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Meta {
    pub(crate) name: String,
    pub(crate) attributes: Attributes,
    pub(crate) tags: BTreeSet<String>,
}

impl Meta {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

// Every element exposes its metadata the same way.
macro_rules! meta_accessors {
    ($name: ty) => {
        impl $name {
            pub fn name(&self) -> &str {
                &self.meta.name
            }

            pub fn attributes(&self) -> &Attributes {
                &self.meta.attributes
            }

            pub fn tags(&self) -> &BTreeSet<String> {
                &self.meta.tags
            }

            pub fn has_tag(&self, tag: &str) -> bool {
                self.meta.tags.contains(tag)
            }
        }
    };
}

/// A position in the plane, used for nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How demands of a layer are routed.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum RoutingType {
    /// Every demand is carried by explicit [`Route`]s.
    #[default]
    SourceRouting,
    /// Every node splits the traffic of a demand among its outgoing links.
    HopByHopRouting,
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingType::SourceRouting => write!(f, "source routing"),
            RoutingType::HopByHopRouting => write!(f, "hop-by-hop routing"),
        }
    }
}

/// One hop of a route: either a link or a resource traversed at the current node.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PathElement {
    Link(LinkId),
    Resource(ResourceId),
}

impl PathElement {
    pub fn as_link(self) -> Option<LinkId> {
        match self {
            PathElement::Link(id) => Some(id),
            PathElement::Resource(_) => None,
        }
    }

    pub fn as_resource(self) -> Option<ResourceId> {
        match self {
            PathElement::Resource(id) => Some(id),
            PathElement::Link(_) => None,
        }
    }
}

impl From<LinkId> for PathElement {
    fn from(id: LinkId) -> Self {
        PathElement::Link(id)
    }
}

impl From<ResourceId> for PathElement {
    fn from(id: ResourceId) -> Self {
        PathElement::Resource(id)
    }
}

impl From<PathElement> for ElementId {
    fn from(elem: PathElement) -> Self {
        match elem {
            PathElement::Link(id) => ElementId::Link(id),
            PathElement::Resource(id) => ElementId::Resource(id),
        }
    }
}

/// Converts a sequence of links into a path without resources.
pub fn link_path(links: &[LinkId]) -> Vec<PathElement> {
    links.iter().copied().map(PathElement::Link).collect()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) meta: Meta,
    pub(crate) position: Point,
    pub(crate) population: f64,
    pub(crate) site: Option<String>,
    pub(crate) failed: bool,
    pub(crate) down_by_srgs: BTreeSet<SrgId>,
    pub(crate) srgs: BTreeSet<SrgId>,
    pub(crate) resources: BTreeSet<ResourceId>,
    pub(crate) out_links: BTreeSet<LinkId>,
    pub(crate) in_links: BTreeSet<LinkId>,
}

meta_accessors!(Node);

impl Node {
    pub(crate) fn new(id: NodeId, name: impl Into<String>, position: Point) -> Self {
        Self {
            id,
            meta: Meta::named(name),
            position,
            population: 0.0,
            site: None,
            failed: false,
            down_by_srgs: BTreeSet::new(),
            srgs: BTreeSet::new(),
            resources: BTreeSet::new(),
            out_links: BTreeSet::new(),
            in_links: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// A node is up unless it was failed explicitly or belongs to a failed SRG.
    pub fn is_up(&self) -> bool {
        !self.failed && self.down_by_srgs.is_empty()
    }

    pub fn is_down(&self) -> bool {
        !self.is_up()
    }

    pub fn srgs(&self) -> &BTreeSet<SrgId> {
        &self.srgs
    }

    pub fn resources(&self) -> &BTreeSet<ResourceId> {
        &self.resources
    }

    /// Outgoing links of every layer.
    pub fn outgoing_links(&self) -> &BTreeSet<LinkId> {
        &self.out_links
    }

    /// Incoming links of every layer.
    pub fn incoming_links(&self) -> &BTreeSet<LinkId> {
        &self.in_links
    }
}

/// A unidirectional link between two nodes of one layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub(crate) id: LinkId,
    pub(crate) meta: Meta,
    pub(crate) layer: LayerId,
    pub(crate) origin: NodeId,
    pub(crate) destination: NodeId,
    pub(crate) capacity: f64,
    pub(crate) length: Km,
    pub(crate) propagation_speed: KmPerSec,
    pub(crate) failed: bool,
    pub(crate) down_by_srgs: BTreeSet<SrgId>,
    pub(crate) srgs: BTreeSet<SrgId>,
    pub(crate) coupled_lower_demand: Option<DemandId>,
    pub(crate) coupled_lower_multicast_demand: Option<MulticastDemandId>,
    pub(crate) bidirectional_pair: Option<LinkId>,
    /// Routes traversing the link, with the number of times they do.
    pub(crate) traversing_routes: BTreeMap<RouteId, usize>,
    pub(crate) traversing_trees: BTreeSet<MulticastTreeId>,
    pub(crate) cache_up: bool,
    pub(crate) cache_capacity: f64,
    pub(crate) cache_carried_traffic: f64,
    pub(crate) cache_occupied_capacity: f64,
}

meta_accessors!(Link);

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.origin, self.destination)
    }

    /// The capacity of the link. For a link coupled to a lower-layer demand, this is the traffic
    /// currently carried by that demand.
    pub fn capacity(&self) -> f64 {
        self.cache_capacity
    }

    pub fn length(&self) -> Km {
        self.length
    }

    pub fn propagation_speed(&self) -> KmPerSec {
        self.propagation_speed
    }

    pub fn propagation_delay(&self) -> Millisecs {
        self.length.propagation_delay(self.propagation_speed)
    }

    /// A link is up if it is not failed (explicitly or by an SRG) and both endpoints are up.
    pub fn is_up(&self) -> bool {
        self.cache_up
    }

    pub fn is_down(&self) -> bool {
        !self.cache_up
    }

    pub fn carried_traffic(&self) -> f64 {
        self.cache_carried_traffic
    }

    pub fn occupied_capacity(&self) -> f64 {
        self.cache_occupied_capacity
    }

    pub fn utilization(&self) -> f64 {
        if self.cache_capacity == 0.0 {
            if self.cache_occupied_capacity > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            self.cache_occupied_capacity / self.cache_capacity
        }
    }

    pub fn is_oversubscribed(&self) -> bool {
        exceeds(self.cache_occupied_capacity, self.cache_capacity)
    }

    pub fn srgs(&self) -> &BTreeSet<SrgId> {
        &self.srgs
    }

    pub fn coupled_lower_demand(&self) -> Option<DemandId> {
        self.coupled_lower_demand
    }

    pub fn coupled_lower_multicast_demand(&self) -> Option<MulticastDemandId> {
        self.coupled_lower_multicast_demand
    }

    pub fn is_coupled(&self) -> bool {
        self.coupled_lower_demand.is_some() || self.coupled_lower_multicast_demand.is_some()
    }

    pub fn bidirectional_pair(&self) -> Option<LinkId> {
        self.bidirectional_pair
    }

    pub fn traversing_routes(&self) -> impl Iterator<Item = RouteId> + '_ {
        self.traversing_routes.keys().copied()
    }

    pub fn traversing_trees(&self) -> &BTreeSet<MulticastTreeId> {
        &self.traversing_trees
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Demand {
    pub(crate) id: DemandId,
    pub(crate) meta: Meta,
    pub(crate) layer: LayerId,
    pub(crate) ingress: NodeId,
    pub(crate) egress: NodeId,
    pub(crate) offered_traffic: f64,
    pub(crate) service_chain: Vec<String>,
    pub(crate) expansion_factors: Vec<f64>,
    pub(crate) max_latency: Option<Millisecs>,
    pub(crate) coupled_upper_link: Option<LinkId>,
    pub(crate) bidirectional_pair: Option<DemandId>,
    pub(crate) routes: BTreeSet<RouteId>,
    pub(crate) cache_offered_traffic: f64,
    pub(crate) cache_carried_traffic: f64,
}

meta_accessors!(Demand);

impl Demand {
    pub fn id(&self) -> DemandId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn ingress(&self) -> NodeId {
        self.ingress
    }

    pub fn egress(&self) -> NodeId {
        self.egress
    }

    /// The offered traffic. For a demand coupled to an upper-layer link, this is the traffic
    /// carried by that link.
    pub fn offered_traffic(&self) -> f64 {
        self.cache_offered_traffic
    }

    pub fn carried_traffic(&self) -> f64 {
        self.cache_carried_traffic
    }

    pub fn blocked_traffic(&self) -> f64 {
        (self.cache_offered_traffic - self.cache_carried_traffic).max(0.0)
    }

    pub fn is_blocking(&self) -> bool {
        exceeds(self.cache_offered_traffic, self.cache_carried_traffic)
    }

    /// The resource types every route of this demand must traverse, in order.
    pub fn service_chain(&self) -> &[String] {
        &self.service_chain
    }

    pub fn is_service_chain(&self) -> bool {
        !self.service_chain.is_empty()
    }

    /// Factor by which the traffic grows (or shrinks) after each resource of the service chain.
    pub fn expansion_factors(&self) -> &[f64] {
        &self.expansion_factors
    }

    pub fn max_latency(&self) -> Option<Millisecs> {
        self.max_latency
    }

    pub fn coupled_upper_link(&self) -> Option<LinkId> {
        self.coupled_upper_link
    }

    pub fn is_coupled(&self) -> bool {
        self.coupled_upper_link.is_some()
    }

    pub fn bidirectional_pair(&self) -> Option<DemandId> {
        self.bidirectional_pair
    }

    pub fn routes(&self) -> &BTreeSet<RouteId> {
        &self.routes
    }
}

/// The configuration a route was created with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RouteState {
    pub path: Vec<PathElement>,
    pub carried_traffic: f64,
    pub occupation: Vec<f64>,
}

/// Which path currently carries the traffic of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ActivePath {
    /// The route's own path is up.
    Own,
    /// The own path is down and the traffic rides on this backup route.
    Backup(RouteId),
    /// Neither the own path nor any backup is up.
    Down,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Route {
    pub(crate) id: RouteId,
    pub(crate) meta: Meta,
    pub(crate) layer: LayerId,
    pub(crate) demand: DemandId,
    pub(crate) path: Vec<PathElement>,
    pub(crate) carried_traffic: f64,
    pub(crate) occupation: Vec<f64>,
    pub(crate) initial: RouteState,
    pub(crate) backups: Vec<RouteId>,
    pub(crate) primary: Option<RouteId>,
    pub(crate) cache_own_path_up: bool,
    pub(crate) cache_active: ActivePath,
    pub(crate) cache_carried_traffic: f64,
    pub(crate) cache_occupation: Vec<f64>,
}

meta_accessors!(Route);

impl Route {
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn demand(&self) -> DemandId {
        self.demand
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    pub fn seq_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.path.iter().filter_map(|e| e.as_link())
    }

    pub fn seq_resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.path.iter().filter_map(|e| e.as_resource())
    }

    pub fn number_of_hops(&self) -> usize {
        self.seq_links().count()
    }

    /// The traffic the route carries in the current failure state.
    pub fn carried_traffic(&self) -> f64 {
        self.cache_carried_traffic
    }

    /// The configured traffic, carried when nothing on the path has failed.
    pub fn carried_traffic_if_not_failing(&self) -> f64 {
        self.carried_traffic
    }

    /// Per path element capacity occupied in the current failure state.
    pub fn occupied_capacity(&self) -> &[f64] {
        &self.cache_occupation
    }

    /// Per path element capacity occupied when nothing on the path has failed.
    pub fn occupied_capacity_if_not_failing(&self) -> &[f64] {
        &self.occupation
    }

    /// Capacity occupied in `elem` in the current failure state, summed over all its occurrences.
    pub fn occupied_capacity_in(&self, elem: PathElement) -> f64 {
        self.path
            .iter()
            .zip(&self.cache_occupation)
            .filter(|(e, _)| **e == elem)
            .map(|(_, occ)| occ)
            .sum()
    }

    pub fn initial_state(&self) -> &RouteState {
        &self.initial
    }

    pub fn backup_routes(&self) -> &[RouteId] {
        &self.backups
    }

    pub fn has_backup_routes(&self) -> bool {
        !self.backups.is_empty()
    }

    /// The route this one is a backup of.
    pub fn primary_route(&self) -> Option<RouteId> {
        self.primary
    }

    pub fn is_backup_route(&self) -> bool {
        self.primary.is_some()
    }

    /// Whether every link, resource and node on the route's own path is up.
    pub fn is_own_path_up(&self) -> bool {
        self.cache_own_path_up
    }

    pub fn active_path(&self) -> ActivePath {
        self.cache_active
    }

    pub fn is_down(&self) -> bool {
        matches!(self.cache_active, ActivePath::Down)
    }

    pub fn traverses(&self, elem: PathElement) -> bool {
        self.path.contains(&elem)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MulticastDemand {
    pub(crate) id: MulticastDemandId,
    pub(crate) meta: Meta,
    pub(crate) layer: LayerId,
    pub(crate) ingress: NodeId,
    pub(crate) egresses: BTreeSet<NodeId>,
    pub(crate) offered_traffic: f64,
    pub(crate) coupled_upper_links: BTreeMap<NodeId, LinkId>,
    pub(crate) trees: BTreeSet<MulticastTreeId>,
    pub(crate) cache_offered_traffic: f64,
    pub(crate) cache_carried_traffic: f64,
}

meta_accessors!(MulticastDemand);

impl MulticastDemand {
    pub fn id(&self) -> MulticastDemandId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn ingress(&self) -> NodeId {
        self.ingress
    }

    pub fn egresses(&self) -> &BTreeSet<NodeId> {
        &self.egresses
    }

    pub fn offered_traffic(&self) -> f64 {
        self.cache_offered_traffic
    }

    pub fn carried_traffic(&self) -> f64 {
        self.cache_carried_traffic
    }

    pub fn blocked_traffic(&self) -> f64 {
        (self.cache_offered_traffic - self.cache_carried_traffic).max(0.0)
    }

    /// Upper-layer links coupled to this demand, keyed by the egress node they end at.
    pub fn coupled_upper_links(&self) -> &BTreeMap<NodeId, LinkId> {
        &self.coupled_upper_links
    }

    pub fn is_coupled(&self) -> bool {
        !self.coupled_upper_links.is_empty()
    }

    pub fn trees(&self) -> &BTreeSet<MulticastTreeId> {
        &self.trees
    }
}

/// The configuration a multicast tree was created with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeState {
    pub links: BTreeSet<LinkId>,
    pub carried_traffic: f64,
    pub occupied_capacity: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MulticastTree {
    pub(crate) id: MulticastTreeId,
    pub(crate) meta: Meta,
    pub(crate) layer: LayerId,
    pub(crate) demand: MulticastDemandId,
    pub(crate) links: BTreeSet<LinkId>,
    pub(crate) carried_traffic: f64,
    pub(crate) occupied_capacity: f64,
    pub(crate) initial: TreeState,
    pub(crate) cache_up: bool,
    pub(crate) cache_carried_traffic: f64,
    pub(crate) cache_occupied_capacity: f64,
}

meta_accessors!(MulticastTree);

impl MulticastTree {
    pub fn id(&self) -> MulticastTreeId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn demand(&self) -> MulticastDemandId {
        self.demand
    }

    pub fn links(&self) -> &BTreeSet<LinkId> {
        &self.links
    }

    pub fn carried_traffic(&self) -> f64 {
        self.cache_carried_traffic
    }

    pub fn carried_traffic_if_not_failing(&self) -> f64 {
        self.carried_traffic
    }

    /// Capacity occupied in each of the tree's links in the current failure state.
    pub fn occupied_capacity(&self) -> f64 {
        self.cache_occupied_capacity
    }

    pub fn occupied_capacity_if_not_failing(&self) -> f64 {
        self.occupied_capacity
    }

    pub fn initial_state(&self) -> &TreeState {
        &self.initial
    }

    pub fn is_up(&self) -> bool {
        self.cache_up
    }

    pub fn is_down(&self) -> bool {
        !self.cache_up
    }
}

/// A resource hosted on a node, such as a CPU pool or a VNF instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) meta: Meta,
    pub(crate) host: NodeId,
    pub(crate) resource_type: String,
    pub(crate) capacity: f64,
    pub(crate) capacity_unit: String,
    pub(crate) processing_time: Millisecs,
    /// Resources this one occupies capacity in, with the amount occupied.
    pub(crate) base_resources: BTreeMap<ResourceId, f64>,
    /// Resources occupying capacity in this one, with the amount occupied.
    pub(crate) upper_resources: BTreeMap<ResourceId, f64>,
    pub(crate) traversing_routes: BTreeSet<RouteId>,
    pub(crate) cache_occupied_by_routes: f64,
}

meta_accessors!(Resource);

impl Resource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn capacity_unit(&self) -> &str {
        &self.capacity_unit
    }

    pub fn processing_time(&self) -> Millisecs {
        self.processing_time
    }

    pub fn base_resources(&self) -> &BTreeMap<ResourceId, f64> {
        &self.base_resources
    }

    pub fn upper_resources(&self) -> &BTreeMap<ResourceId, f64> {
        &self.upper_resources
    }

    pub fn traversing_routes(&self) -> &BTreeSet<RouteId> {
        &self.traversing_routes
    }

    /// Capacity this resource occupies in `base`.
    pub fn capacity_occupied_in_base_resource(&self, base: ResourceId) -> f64 {
        self.base_resources.get(&base).copied().unwrap_or(0.0)
    }

    /// Capacity `upper` occupies in this resource.
    pub fn capacity_occupied_by_upper_resource(&self, upper: ResourceId) -> f64 {
        self.upper_resources.get(&upper).copied().unwrap_or(0.0)
    }

    pub fn occupied_capacity_by_upper_resources(&self) -> f64 {
        self.upper_resources.values().sum()
    }

    /// Capacity occupied by the routes currently traversing the resource.
    pub fn occupied_capacity_by_routes(&self) -> f64 {
        self.cache_occupied_by_routes
    }

    pub fn occupied_capacity(&self) -> f64 {
        self.cache_occupied_by_routes + self.occupied_capacity_by_upper_resources()
    }

    pub fn is_oversubscribed(&self) -> bool {
        exceeds(self.occupied_capacity(), self.capacity)
    }
}

/// A shared risk group: nodes and links that fail together.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Srg {
    pub(crate) id: SrgId,
    pub(crate) meta: Meta,
    pub(crate) nodes: BTreeSet<NodeId>,
    pub(crate) links: BTreeSet<LinkId>,
    pub(crate) mttf_hours: f64,
    pub(crate) mttr_hours: f64,
    pub(crate) failed: bool,
}

meta_accessors!(Srg);

impl Srg {
    pub fn id(&self) -> SrgId {
        self.id
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn links(&self) -> &BTreeSet<LinkId> {
        &self.links
    }

    pub fn mean_time_to_fail_hours(&self) -> f64 {
        self.mttf_hours
    }

    pub fn mean_time_to_repair_hours(&self) -> f64 {
        self.mttr_hours
    }

    /// Fraction of time the group is expected to be up.
    pub fn availability(&self) -> f64 {
        let total = self.mttf_hours + self.mttr_hours;
        if total == 0.0 {
            1.0
        } else {
            self.mttf_hours / total
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// A namespace of links, demands and routing state stacked with other layers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) meta: Meta,
    pub(crate) description: String,
    pub(crate) routing_type: RoutingType,
    pub(crate) link_capacity_units: String,
    pub(crate) demand_traffic_units: String,
    pub(crate) links: BTreeSet<LinkId>,
    pub(crate) demands: BTreeSet<DemandId>,
    pub(crate) multicast_demands: BTreeSet<MulticastDemandId>,
    pub(crate) routes: BTreeSet<RouteId>,
    pub(crate) trees: BTreeSet<MulticastTreeId>,
    /// Hop-by-hop forwarding rules: demand → link → fraction of the traffic at the link origin.
    pub(crate) forwarding_rules: BTreeMap<DemandId, BTreeMap<LinkId, f64>>,
    pub(crate) cache_hop_by_hop_flows: BTreeMap<DemandId, BTreeMap<LinkId, f64>>,
}

meta_accessors!(Layer);

impl Layer {
    pub(crate) fn new(id: LayerId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            meta: Meta::named(name),
            description: description.into(),
            routing_type: RoutingType::SourceRouting,
            link_capacity_units: String::new(),
            demand_traffic_units: String::new(),
            links: BTreeSet::new(),
            demands: BTreeSet::new(),
            multicast_demands: BTreeSet::new(),
            routes: BTreeSet::new(),
            trees: BTreeSet::new(),
            forwarding_rules: BTreeMap::new(),
            cache_hop_by_hop_flows: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn routing_type(&self) -> RoutingType {
        self.routing_type
    }

    pub fn link_capacity_units(&self) -> &str {
        &self.link_capacity_units
    }

    pub fn demand_traffic_units(&self) -> &str {
        &self.demand_traffic_units
    }

    pub fn links(&self) -> &BTreeSet<LinkId> {
        &self.links
    }

    pub fn demands(&self) -> &BTreeSet<DemandId> {
        &self.demands
    }

    pub fn multicast_demands(&self) -> &BTreeSet<MulticastDemandId> {
        &self.multicast_demands
    }

    pub fn routes(&self) -> &BTreeSet<RouteId> {
        &self.routes
    }

    pub fn multicast_trees(&self) -> &BTreeSet<MulticastTreeId> {
        &self.trees
    }

    /// The forwarding rules of one demand, empty in a source-routed layer.
    pub fn forwarding_rules_of(&self, demand: DemandId) -> Option<&BTreeMap<LinkId, f64>> {
        self.forwarding_rules.get(&demand)
    }
}

/// Whether `value` is larger than `bound` beyond rounding noise.
pub(crate) fn exceeds(value: f64, bound: f64) -> bool {
    value > bound + PRECISION_FACTOR * bound.abs().max(1.0)
}
