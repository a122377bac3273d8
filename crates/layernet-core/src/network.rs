mod consistency;
mod demands;
mod failures;
mod multicast;
mod resources;
mod routing;
mod state;
pub(crate) mod topology;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

pub use resources::CapacityCheck;
pub use types::*;

use crate::units::Millisecs;

// Generates the lookup methods shared by every element kind.
macro_rules! element_store {
    ($field: ident, $id: ty, $elem: ty, $get: ident, $all: ident, $nr: ident, $req: ident, $req_mut: ident) => {
        impl Network {
            pub fn $get(&self, id: $id) -> Option<&$elem> {
                self.$field.get(&id)
            }

            pub fn $all(&self) -> impl Iterator<Item = &$elem> {
                self.$field.values()
            }

            pub fn $nr(&self) -> usize {
                self.$field.len()
            }

            pub(crate) fn $req(&self, id: $id) -> Result<&$elem, NetworkError> {
                self.$field
                    .get(&id)
                    .ok_or(NetworkError::UnknownElement(id.into()))
            }

            #[allow(unused)]
            pub(crate) fn $req_mut(&mut self, id: $id) -> Result<&mut $elem, NetworkError> {
                self.$field
                    .get_mut(&id)
                    .ok_or(NetworkError::UnknownElement(id.into()))
            }
        }
    };
}

element_store!(layers, LayerId, Layer, layer, layers, nr_layers, req_layer, req_layer_mut);
element_store!(nodes, NodeId, Node, node, nodes, nr_nodes, req_node, req_node_mut);
element_store!(links, LinkId, Link, link, links, nr_links, req_link, req_link_mut);
element_store!(demands, DemandId, Demand, demand, demands, nr_demands, req_demand, req_demand_mut);
element_store!(routes, RouteId, Route, route, routes, nr_routes, req_route, req_route_mut);
element_store!(
    multicast_demands,
    MulticastDemandId,
    MulticastDemand,
    multicast_demand,
    multicast_demands,
    nr_multicast_demands,
    req_multicast_demand,
    req_multicast_demand_mut
);
element_store!(
    trees,
    MulticastTreeId,
    MulticastTree,
    multicast_tree,
    multicast_trees,
    nr_multicast_trees,
    req_tree,
    req_tree_mut
);
element_store!(
    resources,
    ResourceId,
    Resource,
    resource,
    resources,
    nr_resources,
    req_resource,
    req_resource_mut
);
element_store!(srgs, SrgId, Srg, srg, srgs, nr_srgs, req_srg, req_srg_mut);

/// A multi-layer network design: topology layers, the demands offered to them, the routes and
/// trees carrying those demands, the resources they traverse and the risk groups they share.
///
/// Every mutating method validates its arguments, applies the change and brings all derived
/// state (carried traffic, occupied capacity, coupled values, failure effects) up to date before
/// returning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Network {
    pub(crate) meta: Meta,
    pub(crate) description: String,
    pub(crate) next_id: u64,
    pub(crate) layers: BTreeMap<LayerId, Layer>,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    pub(crate) demands: BTreeMap<DemandId, Demand>,
    pub(crate) routes: BTreeMap<RouteId, Route>,
    pub(crate) multicast_demands: BTreeMap<MulticastDemandId, MulticastDemand>,
    pub(crate) trees: BTreeMap<MulticastTreeId, MulticastTree>,
    pub(crate) resources: BTreeMap<ResourceId, Resource>,
    pub(crate) srgs: BTreeMap<SrgId, Srg>,
    #[serde(skip)]
    pub(crate) snapshot: Option<Box<Network>>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Creates an empty network with a single source-routed layer.
    pub fn new() -> Self {
        let mut network = Self {
            meta: Meta::default(),
            description: String::new(),
            next_id: 0,
            layers: BTreeMap::new(),
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            demands: BTreeMap::new(),
            routes: BTreeMap::new(),
            multicast_demands: BTreeMap::new(),
            trees: BTreeMap::new(),
            resources: BTreeMap::new(),
            srgs: BTreeMap::new(),
            snapshot: None,
        };
        let id = LayerId::new(network.next_id());
        network.layers.insert(id, Layer::new(id, "Layer 0", ""));
        network
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn set_network_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Attributes of the network as a whole.
    pub fn attributes(&self) -> &Attributes {
        &self.meta.attributes
    }

    pub fn set_network_attribute(&mut self, key: impl Into<String>, value: impl ToString) {
        self.meta.attributes.set(key, value);
    }

    pub fn remove_network_attribute(&mut self, key: &str) -> Option<String> {
        self.meta.attributes.remove(key)
    }

    /// The layer with the lowest ID, which always exists.
    pub fn default_layer(&self) -> LayerId {
        // There is always at least one layer.
        self.layers.keys().next().copied().unwrap_or_default()
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.values().find(|l| l.name() == name)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name() == name)
    }

    /// Whether an element with this ID exists.
    pub fn contains(&self, id: ElementId) -> bool {
        self.meta_of(id).is_some()
    }

    fn meta_of(&self, id: ElementId) -> Option<&Meta> {
        match id {
            ElementId::Node(id) => self.nodes.get(&id).map(|e| &e.meta),
            ElementId::Link(id) => self.links.get(&id).map(|e| &e.meta),
            ElementId::Demand(id) => self.demands.get(&id).map(|e| &e.meta),
            ElementId::Route(id) => self.routes.get(&id).map(|e| &e.meta),
            ElementId::MulticastDemand(id) => self.multicast_demands.get(&id).map(|e| &e.meta),
            ElementId::MulticastTree(id) => self.trees.get(&id).map(|e| &e.meta),
            ElementId::Resource(id) => self.resources.get(&id).map(|e| &e.meta),
            ElementId::Srg(id) => self.srgs.get(&id).map(|e| &e.meta),
            ElementId::Layer(id) => self.layers.get(&id).map(|e| &e.meta),
        }
    }

    fn meta_of_mut(&mut self, id: ElementId) -> Result<&mut Meta, NetworkError> {
        let meta = match id {
            ElementId::Node(id) => self.nodes.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Link(id) => self.links.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Demand(id) => self.demands.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Route(id) => self.routes.get_mut(&id).map(|e| &mut e.meta),
            ElementId::MulticastDemand(id) => {
                self.multicast_demands.get_mut(&id).map(|e| &mut e.meta)
            }
            ElementId::MulticastTree(id) => self.trees.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Resource(id) => self.resources.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Srg(id) => self.srgs.get_mut(&id).map(|e| &mut e.meta),
            ElementId::Layer(id) => self.layers.get_mut(&id).map(|e| &mut e.meta),
        };
        meta.ok_or(NetworkError::UnknownElement(id))
    }

    /// The name of any element.
    pub fn name_of(&self, id: impl Into<ElementId>) -> Option<&str> {
        self.meta_of(id.into()).map(|m| m.name.as_str())
    }

    pub fn attributes_of(&self, id: impl Into<ElementId>) -> Option<&Attributes> {
        self.meta_of(id.into()).map(|m| &m.attributes)
    }

    pub fn tags_of(&self, id: impl Into<ElementId>) -> Option<&BTreeSet<String>> {
        self.meta_of(id.into()).map(|m| &m.tags)
    }

    pub fn set_name(
        &mut self,
        id: impl Into<ElementId>,
        name: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.meta_of_mut(id.into())?.name = name.into();
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        id: impl Into<ElementId>,
        key: impl Into<String>,
        value: impl ToString,
    ) -> Result<(), NetworkError> {
        self.meta_of_mut(id.into())?.attributes.set(key, value);
        Ok(())
    }

    pub fn remove_attribute(
        &mut self,
        id: impl Into<ElementId>,
        key: &str,
    ) -> Result<Option<String>, NetworkError> {
        Ok(self.meta_of_mut(id.into())?.attributes.remove(key))
    }

    /// Adds a tag, returning whether it was not present before.
    pub fn add_tag(
        &mut self,
        id: impl Into<ElementId>,
        tag: impl Into<String>,
    ) -> Result<bool, NetworkError> {
        Ok(self.meta_of_mut(id.into())?.tags.insert(tag.into()))
    }

    pub fn remove_tag(&mut self, id: impl Into<ElementId>, tag: &str) -> Result<bool, NetworkError> {
        Ok(self.meta_of_mut(id.into())?.tags.remove(tag))
    }

    /// Every element carrying `tag`.
    pub fn tagged(&self, tag: &str) -> Vec<ElementId> {
        fn collect<'a, K, E>(
            acc: &mut Vec<ElementId>,
            map: &'a BTreeMap<K, E>,
            tag: &str,
            meta: impl Fn(&'a E) -> &'a Meta,
        ) where
            K: Copy + Into<ElementId>,
        {
            acc.extend(
                map.iter()
                    .filter(|(_, e)| meta(*e).tags.contains(tag))
                    .map(|(&k, _)| k.into()),
            );
        }
        let mut acc = Vec::new();
        collect(&mut acc, &self.layers, tag, |e| &e.meta);
        collect(&mut acc, &self.nodes, tag, |e| &e.meta);
        collect(&mut acc, &self.links, tag, |e| &e.meta);
        collect(&mut acc, &self.demands, tag, |e| &e.meta);
        collect(&mut acc, &self.routes, tag, |e| &e.meta);
        collect(&mut acc, &self.multicast_demands, tag, |e| &e.meta);
        collect(&mut acc, &self.trees, tag, |e| &e.meta);
        collect(&mut acc, &self.resources, tag, |e| &e.meta);
        collect(&mut acc, &self.srgs, tag, |e| &e.meta);
        acc
    }

    /// Removes any element, cascading to everything that depends on it.
    pub fn remove(&mut self, id: impl Into<ElementId>) -> Result<(), NetworkError> {
        match id.into() {
            ElementId::Node(id) => self.remove_node(id),
            ElementId::Link(id) => self.remove_link(id),
            ElementId::Demand(id) => self.remove_demand(id),
            ElementId::Route(id) => self.remove_route(id),
            ElementId::MulticastDemand(id) => self.remove_multicast_demand(id),
            ElementId::MulticastTree(id) => self.remove_multicast_tree(id),
            ElementId::Resource(id) => self.remove_resource(id),
            ElementId::Srg(id) => self.remove_srg(id),
            ElementId::Layer(id) => self.remove_layer(id),
        }
    }

    /// An independent deep copy with identical IDs. Any open transaction is not carried over.
    pub fn copy(&self) -> Network {
        let mut copy = self.clone();
        copy.snapshot = None;
        copy
    }

    /// Overwrites this network with the contents of `other`.
    pub fn assign_from(&mut self, other: &Network) {
        let snapshot = self.snapshot.take();
        *self = other.copy();
        self.snapshot = snapshot;
    }

    /// Whether `other` holds exactly the same elements, relations and state.
    pub fn is_deep_copy(&self, other: &Network) -> bool {
        self.meta == other.meta
            && self.description == other.description
            && self.next_id == other.next_id
            && self.layers == other.layers
            && self.nodes == other.nodes
            && self.links == other.links
            && self.demands == other.demands
            && self.routes == other.routes
            && self.multicast_demands == other.multicast_demands
            && self.trees == other.trees
            && self.resources == other.resources
            && self.srgs == other.srgs
    }

    /// Saves the current state so it can be restored with [`rollback`](Self::rollback).
    pub fn begin_transaction(&mut self) -> Result<(), NetworkError> {
        if self.snapshot.is_some() {
            return Err(NetworkError::TransactionInProgress);
        }
        self.snapshot = Some(Box::new(self.copy()));
        log::trace!("began transaction");
        Ok(())
    }

    /// Discards the state saved by [`begin_transaction`](Self::begin_transaction).
    pub fn commit(&mut self) -> Result<(), NetworkError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or(NetworkError::NoTransaction)
    }

    /// Restores the state saved by [`begin_transaction`](Self::begin_transaction).
    pub fn rollback(&mut self) -> Result<(), NetworkError> {
        let snapshot = self.snapshot.take().ok_or(NetworkError::NoTransaction)?;
        *self = *snapshot;
        log::debug!("rolled back transaction");
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Runs `f` inside a transaction: the changes it makes are kept if it succeeds and undone if
    /// it fails.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Network) -> Result<T, E>,
        E: From<NetworkError>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(val) => {
                self.commit()?;
                Ok(val)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    /// The propagation delay plus processing time along a path.
    pub fn path_delay(&self, path: &[PathElement]) -> Millisecs {
        path.iter()
            .map(|e| match *e {
                PathElement::Link(id) => self
                    .links
                    .get(&id)
                    .map(|l| l.propagation_delay())
                    .unwrap_or_default(),
                PathElement::Resource(id) => self
                    .resources
                    .get(&id)
                    .map(|r| r.processing_time)
                    .unwrap_or_default(),
            })
            .sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("{0} does not exist")]
    UnknownElement(ElementId),

    #[error("{element} belongs to layer {found}, expected layer {expected}")]
    WrongLayer {
        element: ElementId,
        expected: LayerId,
        found: LayerId,
    },

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },

    #[error("Invalid name {0:?}")]
    InvalidName(String),

    #[error("Origin and destination are the same node {0}")]
    SameEndpoints(NodeId),

    #[error("Malformed path for demand {demand}: {reason}")]
    MalformedPath { demand: DemandId, reason: String },

    #[error("Path for demand {demand} does not match its service chain")]
    ServiceChainMismatch { demand: DemandId },

    #[error("Path for demand {demand} revisits node {node} at the same service chain stage")]
    PathLoop { demand: DemandId, node: NodeId },

    #[error("Expected {expected} occupation values, got {found}")]
    OccupationLength { expected: usize, found: usize },

    #[error("Layer {layer} does not use {expected}")]
    RoutingTypeMismatch {
        layer: LayerId,
        expected: RoutingType,
    },

    #[error("Service chain demand {0} cannot be routed hop by hop")]
    ServiceChainHopByHop(DemandId),

    #[error("Route {backup} cannot back up route {primary}: {reason}")]
    InvalidBackup {
        primary: RouteId,
        backup: RouteId,
        reason: &'static str,
    },

    #[error("Route {backup} is not a backup of route {primary}")]
    NotABackup { primary: RouteId, backup: RouteId },

    #[error("Route {backup} currently carries the traffic of route {primary}")]
    BackupInUse { primary: RouteId, backup: RouteId },

    #[error("{0} is already coupled")]
    AlreadyCoupled(ElementId),

    #[error("Cannot couple elements of the same layer {0}")]
    CouplingSameLayer(LayerId),

    #[error("Endpoints of {demand} and {link} do not match")]
    CouplingEndpointMismatch { demand: ElementId, link: ElementId },

    #[error("Coupling layer {upper} over layer {lower} creates a cycle")]
    CouplingCycle { upper: LayerId, lower: LayerId },

    #[error("{0} is coupled and its value follows the other layer")]
    CoupledValue(ElementId),

    #[error("Base resource {base} is not hosted on node {host}")]
    BaseOnOtherNode { base: ResourceId, host: NodeId },

    #[error("Resource {resource} cannot be based on {base} without creating a cycle")]
    ResourceCycle {
        resource: ResourceId,
        base: ResourceId,
    },

    #[error("Resource {0} would be oversubscribed")]
    Oversubscribed(ResourceId),

    #[error("Invalid forwarding rule for demand {demand} over link {link}: {reason}")]
    InvalidForwardingRule {
        demand: DemandId,
        link: LinkId,
        reason: &'static str,
    },

    #[error("Forwarding rules of demand {demand} at node {node} sum to more than 1")]
    FractionSumExceeded { demand: DemandId, node: NodeId },

    #[error("Flow of demand {demand} circulates on a cycle no loopless route can carry")]
    CirculatingFlow { demand: DemandId },

    #[error("Invalid multicast tree for demand {demand}: {reason}")]
    InvalidTree {
        demand: MulticastDemandId,
        reason: &'static str,
    },

    #[error("Invalid egress nodes for multicast demand: {0}")]
    InvalidEgresses(&'static str),

    #[error("The last layer cannot be removed")]
    LastLayer,

    #[error("A transaction is already in progress")]
    TransactionInProgress,

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Inconsistent caches: {0}")]
    Inconsistent(String),
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    #[test]
    fn ids_are_unique_across_kinds() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle().context("failed to build triangle")?;
        let mut all = BTreeSet::new();
        all.insert(ids.layer.inner());
        for id in ids.nodes.iter().map(|n| n.inner()) {
            assert!(all.insert(id));
        }
        for id in network.links().map(|l| l.id().inner()) {
            assert!(all.insert(id));
        }
        for id in network.demands().map(|d| d.id().inner()) {
            assert!(all.insert(id));
        }
        Ok(())
    }

    #[test]
    fn generic_remove_dispatches() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let link = ids.link(0, 1);
        network.remove(link)?;
        assert!(!network.contains(link.into()));
        assert!(network.node(ids.nodes[0]).is_some());
        network.remove(ids.nodes[0])?;
        assert_eq!(network.nr_nodes(), 2);
        // Only the links between the two remaining nodes survive.
        assert_eq!(network.nr_links(), 2);
        assert!(network
            .demands()
            .all(|d| d.ingress() != ids.nodes[0] && d.egress() != ids.nodes[0]));
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn meta_on_any_element() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let link = ids.link(1, 2);
        network.set_attribute(link, "color", "red")?;
        network.add_tag(link, "core")?;
        network.set_name(link, "l12")?;
        assert_eq!(network.attributes_of(link).and_then(|a| a.get("color")), Some("red"));
        assert_eq!(network.name_of(link), Some("l12"));
        assert_eq!(network.tagged("core"), vec![ElementId::Link(link)]);
        assert!(matches!(
            network.set_name(LinkId::new(999), "x"),
            Err(NetworkError::UnknownElement(_))
        ));
        Ok(())
    }

    #[test]
    fn copy_is_deep() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle()?;
        let mut copy = network.copy();
        assert!(copy.is_deep_copy(&network));
        copy.set_link_capacity(ids.link(0, 1), 5.0)?;
        assert!(!copy.is_deep_copy(&network));
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.capacity()), Some(100.0));
        Ok(())
    }

    #[test]
    fn assign_from_overwrites() -> anyhow::Result<()> {
        let (network, _) = testing::triangle()?;
        let mut other = Network::new();
        other.assign_from(&network);
        assert!(other.is_deep_copy(&network));
        Ok(())
    }

    #[test]
    fn rollback_restores_state() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let before = network.copy();
        network.begin_transaction()?;
        network.remove_node(ids.nodes[2])?;
        assert!(matches!(
            network.begin_transaction(),
            Err(NetworkError::TransactionInProgress)
        ));
        network.rollback()?;
        assert!(network.is_deep_copy(&before));
        assert!(matches!(network.commit(), Err(NetworkError::NoTransaction)));
        Ok(())
    }

    #[test]
    fn failed_transaction_rolls_back() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let before = network.copy();
        let res: Result<(), NetworkError> = network.transaction(|net| {
            net.remove_link(ids.link(0, 1))?;
            net.set_link_capacity(ids.link(0, 1), 1.0)
        });
        assert!(res.is_err());
        assert!(network.is_deep_copy(&before));
        assert!(!network.in_transaction());

        network.transaction(|net| net.set_link_capacity(ids.link(0, 2), 7.0))?;
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.capacity()), Some(7.0));
        Ok(())
    }
}
