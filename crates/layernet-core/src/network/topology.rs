//! Layers, nodes, links and the coupling of layers.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::units::{Km, KmPerSec};

impl Network {
    /// Adds a new source-routed layer.
    pub fn add_layer(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> LayerId {
        let id = LayerId::new(self.next_id());
        self.layers.insert(id, Layer::new(id, name, description));
        id
    }

    /// Removes a layer and everything in it. Couplings to other layers are undone.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<(), NetworkError> {
        let layer = self.req_layer(id)?;
        if self.layers.len() == 1 {
            return Err(NetworkError::LastLayer);
        }
        let demands = layer.demands.iter().copied().collect::<Vec<_>>();
        let mcds = layer.multicast_demands.iter().copied().collect::<Vec<_>>();
        let links = layer.links.iter().copied().collect::<Vec<_>>();
        for demand in demands {
            self.detach_demand(demand);
        }
        for mcd in mcds {
            self.detach_multicast_demand(mcd);
        }
        for link in links {
            self.detach_link(link);
        }
        self.layers.remove(&id);
        log::debug!("removed layer {id}");
        self.refresh();
        Ok(())
    }

    pub fn set_layer_description(
        &mut self,
        id: LayerId,
        description: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.req_layer_mut(id)?.description = description.into();
        Ok(())
    }

    pub fn set_link_capacity_units(
        &mut self,
        id: LayerId,
        units: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.req_layer_mut(id)?.link_capacity_units = units.into();
        Ok(())
    }

    pub fn set_demand_traffic_units(
        &mut self,
        id: LayerId,
        units: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.req_layer_mut(id)?.demand_traffic_units = units.into();
        Ok(())
    }

    pub fn add_node(&mut self, name: impl Into<String>, position: Point) -> NodeId {
        let id = NodeId::new(self.next_id());
        self.nodes.insert(id, Node::new(id, name, position));
        id
    }

    pub fn set_node_position(&mut self, id: NodeId, position: Point) -> Result<(), NetworkError> {
        self.req_node_mut(id)?.position = position;
        Ok(())
    }

    pub fn set_node_population(&mut self, id: NodeId, population: f64) -> Result<(), NetworkError> {
        check_non_negative("population", population)?;
        self.req_node_mut(id)?.population = population;
        Ok(())
    }

    pub fn set_node_site(&mut self, id: NodeId, site: Option<String>) -> Result<(), NetworkError> {
        self.req_node_mut(id)?.site = site;
        Ok(())
    }

    /// Removes a node together with its links, hosted resources, the demands it terminates and
    /// its SRG memberships.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), NetworkError> {
        let node = self.req_node(id)?;
        let resources = node.resources.iter().copied().collect::<Vec<_>>();
        let links = node
            .out_links
            .iter()
            .chain(node.in_links.iter())
            .copied()
            .collect::<BTreeSet<_>>();
        let srgs = node.srgs.clone();
        for resource in resources {
            if self.resources.contains_key(&resource) {
                self.detach_resource(resource);
            }
        }
        for link in links {
            self.detach_link(link);
        }
        let demands = self
            .demands
            .values()
            .filter(|d| d.ingress == id || d.egress == id)
            .map(|d| d.id)
            .collect::<Vec<_>>();
        for demand in demands {
            self.detach_demand(demand);
        }
        let mcds = self
            .multicast_demands
            .values()
            .filter(|d| d.ingress == id || d.egresses.contains(&id))
            .map(|d| d.id)
            .collect::<Vec<_>>();
        for mcd in mcds {
            self.detach_multicast_demand(mcd);
        }
        for srg in srgs {
            if let Some(srg) = self.srgs.get_mut(&srg) {
                srg.nodes.remove(&id);
            }
        }
        self.nodes.remove(&id);
        log::debug!("removed node {id}");
        self.refresh();
        Ok(())
    }

    /// Adds a unidirectional link in `layer`.
    pub fn add_link(
        &mut self,
        layer: LayerId,
        origin: NodeId,
        destination: NodeId,
        capacity: f64,
        length: Km,
        propagation_speed: KmPerSec,
    ) -> Result<LinkId, NetworkError> {
        self.req_layer(layer)?;
        self.req_node(origin)?;
        self.req_node(destination)?;
        if origin == destination {
            return Err(NetworkError::SameEndpoints(origin));
        }
        check_non_negative("link capacity", capacity)?;
        check_non_negative("link length", length.into_f64())?;
        check_positive("propagation speed", propagation_speed.into_f64())?;
        let id = LinkId::new(self.next_id());
        let link = Link {
            id,
            meta: Meta::default(),
            layer,
            origin,
            destination,
            capacity,
            length,
            propagation_speed,
            failed: false,
            down_by_srgs: BTreeSet::new(),
            srgs: BTreeSet::new(),
            coupled_lower_demand: None,
            coupled_lower_multicast_demand: None,
            bidirectional_pair: None,
            traversing_routes: BTreeMap::new(),
            traversing_trees: BTreeSet::new(),
            cache_up: true,
            cache_capacity: capacity,
            cache_carried_traffic: 0.0,
            cache_occupied_capacity: 0.0,
        };
        self.links.insert(id, link);
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.links.insert(id);
        }
        if let Some(node) = self.nodes.get_mut(&origin) {
            node.out_links.insert(id);
        }
        if let Some(node) = self.nodes.get_mut(&destination) {
            node.in_links.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    /// Adds a pair of opposite links with the same parameters, each recorded as the other's pair.
    pub fn add_link_bidirectional(
        &mut self,
        layer: LayerId,
        a: NodeId,
        b: NodeId,
        capacity: f64,
        length: Km,
        propagation_speed: KmPerSec,
    ) -> Result<(LinkId, LinkId), NetworkError> {
        let ab = self.add_link(layer, a, b, capacity, length, propagation_speed)?;
        let ba = self.add_link(layer, b, a, capacity, length, propagation_speed)?;
        self.links.entry(ab).and_modify(|l| l.bidirectional_pair = Some(ba));
        self.links.entry(ba).and_modify(|l| l.bidirectional_pair = Some(ab));
        Ok((ab, ba))
    }

    /// Sets the capacity of an uncoupled link.
    pub fn set_link_capacity(&mut self, id: LinkId, capacity: f64) -> Result<(), NetworkError> {
        check_non_negative("link capacity", capacity)?;
        let link = self.req_link_mut(id)?;
        if link.is_coupled() {
            return Err(NetworkError::CoupledValue(id.into()));
        }
        link.capacity = capacity;
        self.refresh();
        Ok(())
    }

    pub fn set_link_length(&mut self, id: LinkId, length: Km) -> Result<(), NetworkError> {
        check_non_negative("link length", length.into_f64())?;
        self.req_link_mut(id)?.length = length;
        Ok(())
    }

    pub fn set_link_propagation_speed(
        &mut self,
        id: LinkId,
        speed: KmPerSec,
    ) -> Result<(), NetworkError> {
        check_positive("propagation speed", speed.into_f64())?;
        self.req_link_mut(id)?.propagation_speed = speed;
        Ok(())
    }

    /// Removes a link together with the routes and trees traversing it.
    pub fn remove_link(&mut self, id: LinkId) -> Result<(), NetworkError> {
        self.req_link(id)?;
        self.detach_link(id);
        log::debug!("removed link {id}");
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_link(&mut self, id: LinkId) {
        let Some(link) = self.links.get(&id) else {
            return;
        };
        let routes = link.traversing_routes.keys().copied().collect::<Vec<_>>();
        let trees = link.traversing_trees.iter().copied().collect::<Vec<_>>();
        for route in routes {
            self.detach_route(route);
        }
        for tree in trees {
            self.detach_tree(tree);
        }
        self.decouple_link_unchecked(id);
        let Some(link) = self.links.remove(&id) else {
            return;
        };
        if let Some(layer) = self.layers.get_mut(&link.layer) {
            layer.links.remove(&id);
            for rules in layer.forwarding_rules.values_mut() {
                rules.remove(&id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&link.origin) {
            node.out_links.remove(&id);
        }
        if let Some(node) = self.nodes.get_mut(&link.destination) {
            node.in_links.remove(&id);
        }
        for srg in &link.srgs {
            if let Some(srg) = self.srgs.get_mut(srg) {
                srg.links.remove(&id);
            }
        }
        if let Some(pair) = link.bidirectional_pair.and_then(|p| self.links.get_mut(&p)) {
            pair.bidirectional_pair = None;
        }
    }

    /// Links of `layer` going from `a` to `b`.
    pub fn links_between(
        &self,
        layer: LayerId,
        a: NodeId,
        b: NodeId,
    ) -> impl Iterator<Item = &Link> + '_ {
        self.nodes
            .get(&a)
            .into_iter()
            .flat_map(|n| n.out_links.iter())
            .filter_map(|l| self.links.get(l))
            .filter(move |l| l.layer == layer && l.destination == b)
    }

    pub fn outgoing_links_in(
        &self,
        node: NodeId,
        layer: LayerId,
    ) -> impl Iterator<Item = &Link> + '_ {
        self.nodes
            .get(&node)
            .into_iter()
            .flat_map(|n| n.out_links.iter())
            .filter_map(|l| self.links.get(l))
            .filter(move |l| l.layer == layer)
    }

    pub fn incoming_links_in(
        &self,
        node: NodeId,
        layer: LayerId,
    ) -> impl Iterator<Item = &Link> + '_ {
        self.nodes
            .get(&node)
            .into_iter()
            .flat_map(|n| n.in_links.iter())
            .filter_map(|l| self.links.get(l))
            .filter(move |l| l.layer == layer)
    }

    pub fn links_in(&self, layer: LayerId) -> impl Iterator<Item = &Link> + '_ {
        self.layers
            .get(&layer)
            .into_iter()
            .flat_map(|l| l.links.iter())
            .filter_map(|l| self.links.get(l))
    }

    /// Carried traffic of every link of `layer` in the current failure state.
    pub fn vector_link_carried_traffic(&self, layer: LayerId) -> BTreeMap<LinkId, f64> {
        self.links_in(layer)
            .map(|l| (l.id, l.cache_carried_traffic))
            .collect()
    }

    pub fn vector_link_capacity(&self, layer: LayerId) -> BTreeMap<LinkId, f64> {
        self.links_in(layer)
            .map(|l| (l.id, l.cache_capacity))
            .collect()
    }

    pub fn vector_link_occupied_capacity(&self, layer: LayerId) -> BTreeMap<LinkId, f64> {
        self.links_in(layer)
            .map(|l| (l.id, l.cache_occupied_capacity))
            .collect()
    }

    /// Couples a lower-layer demand to an upper-layer link with the same endpoints. From then on
    /// the demand is offered the link's carried traffic and the link's capacity is the demand's
    /// carried traffic.
    pub fn couple_demand_to_link(
        &mut self,
        demand: DemandId,
        link: LinkId,
    ) -> Result<(), NetworkError> {
        let d = self.req_demand(demand)?;
        let l = self.req_link(link)?;
        if d.is_coupled() {
            return Err(NetworkError::AlreadyCoupled(demand.into()));
        }
        if l.is_coupled() {
            return Err(NetworkError::AlreadyCoupled(link.into()));
        }
        if d.layer == l.layer {
            return Err(NetworkError::CouplingSameLayer(d.layer));
        }
        if (d.ingress, d.egress) != (l.origin, l.destination) {
            return Err(NetworkError::CouplingEndpointMismatch {
                demand: demand.into(),
                link: link.into(),
            });
        }
        self.check_coupling_acyclic(l.layer, d.layer)?;
        if let Some(d) = self.demands.get_mut(&demand) {
            d.coupled_upper_link = Some(link);
        }
        if let Some(l) = self.links.get_mut(&link) {
            l.coupled_lower_demand = Some(demand);
        }
        log::debug!("coupled demand {demand} to link {link}");
        self.refresh();
        Ok(())
    }

    /// Creates a link in `upper_layer` between the endpoints of `demand` and couples them.
    pub fn couple_demand_to_new_link(
        &mut self,
        demand: DemandId,
        upper_layer: LayerId,
    ) -> Result<LinkId, NetworkError> {
        let d = self.req_demand(demand)?;
        if d.is_coupled() {
            return Err(NetworkError::AlreadyCoupled(demand.into()));
        }
        if d.layer == upper_layer {
            return Err(NetworkError::CouplingSameLayer(upper_layer));
        }
        self.check_coupling_acyclic(upper_layer, d.layer)?;
        let (ingress, egress) = (d.ingress, d.egress);
        let link = self.add_link(
            upper_layer,
            ingress,
            egress,
            0.0,
            Km::ZERO,
            KmPerSec::FIBER,
        )?;
        self.couple_demand_to_link(demand, link)?;
        Ok(link)
    }

    /// Undoes the coupling of a demand, if any.
    pub fn decouple_demand(&mut self, demand: DemandId) -> Result<(), NetworkError> {
        let link = self.req_demand(demand)?.coupled_upper_link;
        if let Some(link) = link {
            self.decouple_link_unchecked(link);
            self.refresh();
        }
        Ok(())
    }

    /// Undoes the coupling of a link, if any.
    pub fn decouple_link(&mut self, link: LinkId) -> Result<(), NetworkError> {
        self.req_link(link)?;
        self.decouple_link_unchecked(link);
        self.refresh();
        Ok(())
    }

    pub(crate) fn decouple_link_unchecked(&mut self, id: LinkId) {
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        let demand = link.coupled_lower_demand.take();
        let mcd = link.coupled_lower_multicast_demand;
        if let Some(d) = demand.and_then(|d| self.demands.get_mut(&d)) {
            d.coupled_upper_link = None;
        }
        if let Some(mcd) = mcd {
            self.decouple_multicast_demand_unchecked(mcd);
        }
    }

    /// Couples a lower-layer multicast demand to one upper-layer link per egress node, each
    /// going from the demand's ingress to that egress.
    pub fn couple_multicast_demand_to_links(
        &mut self,
        demand: MulticastDemandId,
        links: &BTreeSet<LinkId>,
    ) -> Result<(), NetworkError> {
        let d = self.req_multicast_demand(demand)?;
        if d.is_coupled() {
            return Err(NetworkError::AlreadyCoupled(demand.into()));
        }
        let mut by_egress = BTreeMap::new();
        let mut upper = None;
        for &id in links {
            let l = self.req_link(id)?;
            if l.is_coupled() {
                return Err(NetworkError::AlreadyCoupled(id.into()));
            }
            if l.layer == d.layer {
                return Err(NetworkError::CouplingSameLayer(d.layer));
            }
            let mismatch = NetworkError::CouplingEndpointMismatch {
                demand: demand.into(),
                link: id.into(),
            };
            if l.origin != d.ingress || !d.egresses.contains(&l.destination) {
                return Err(mismatch);
            }
            if *upper.get_or_insert(l.layer) != l.layer {
                return Err(mismatch);
            }
            if by_egress.insert(l.destination, id).is_some() {
                return Err(mismatch);
            }
        }
        if by_egress.len() != d.egresses.len() {
            return Err(NetworkError::InvalidEgresses(
                "every egress node needs exactly one coupled link",
            ));
        }
        // `by_egress` is non-empty because egress sets are.
        let upper = upper.unwrap_or(d.layer);
        self.check_coupling_acyclic(upper, d.layer)?;
        for &id in links {
            if let Some(l) = self.links.get_mut(&id) {
                l.coupled_lower_multicast_demand = Some(demand);
            }
        }
        if let Some(d) = self.multicast_demands.get_mut(&demand) {
            d.coupled_upper_links = by_egress;
        }
        self.refresh();
        Ok(())
    }

    pub fn decouple_multicast_demand(
        &mut self,
        demand: MulticastDemandId,
    ) -> Result<(), NetworkError> {
        self.req_multicast_demand(demand)?;
        self.decouple_multicast_demand_unchecked(demand);
        self.refresh();
        Ok(())
    }

    pub(crate) fn decouple_multicast_demand_unchecked(&mut self, id: MulticastDemandId) {
        let Some(d) = self.multicast_demands.get_mut(&id) else {
            return;
        };
        let links = std::mem::take(&mut d.coupled_upper_links);
        for link in links.values() {
            if let Some(l) = self.links.get_mut(link) {
                l.coupled_lower_multicast_demand = None;
            }
        }
    }

    /// Layers with links coupled to demands of `layer`.
    pub fn upper_layers_of(&self, layer: LayerId) -> BTreeSet<LayerId> {
        self.coupling_edges()
            .filter(|&(_, lower)| lower == layer)
            .map(|(upper, _)| upper)
            .collect()
    }

    /// Layers whose demands are coupled to links of `layer`.
    pub fn lower_layers_of(&self, layer: LayerId) -> BTreeSet<LayerId> {
        self.coupling_edges()
            .filter(|&(upper, _)| upper == layer)
            .map(|(_, lower)| lower)
            .collect()
    }

    // (upper layer, lower layer) for every coupled link.
    fn coupling_edges(&self) -> impl Iterator<Item = (LayerId, LayerId)> + '_ {
        self.links.values().filter_map(|l| {
            let lower = l
                .coupled_lower_demand
                .and_then(|d| self.demands.get(&d))
                .map(|d| d.layer)
                .or_else(|| {
                    l.coupled_lower_multicast_demand
                        .and_then(|d| self.multicast_demands.get(&d))
                        .map(|d| d.layer)
                })?;
            Some((l.layer, lower))
        })
    }

    pub(crate) fn layer_coupling_graph(
        &self,
        extra: Option<(LayerId, LayerId)>,
    ) -> (DiGraph<LayerId, ()>, BTreeMap<LayerId, NodeIndex>) {
        let mut g = DiGraph::new();
        let idx = self
            .layers
            .keys()
            .map(|&id| (id, g.add_node(id)))
            .collect::<BTreeMap<_, _>>();
        let edges = self.coupling_edges().chain(extra).collect::<BTreeSet<_>>();
        for (upper, lower) in edges {
            if let (Some(&a), Some(&b)) = (idx.get(&upper), idx.get(&lower)) {
                g.update_edge(a, b, ());
            }
        }
        (g, idx)
    }

    fn check_coupling_acyclic(&self, upper: LayerId, lower: LayerId) -> Result<(), NetworkError> {
        let (g, _) = self.layer_coupling_graph(Some((upper, lower)));
        if petgraph::algo::is_cyclic_directed(&g) {
            return Err(NetworkError::CouplingCycle { upper, lower });
        }
        Ok(())
    }

    /// All layers, every layer listed before the layers below it.
    pub fn layers_top_down(&self) -> Vec<LayerId> {
        let (g, _) = self.layer_coupling_graph(None);
        match petgraph::algo::toposort(&g, None) {
            Ok(order) => order.into_iter().map(|i| g[i]).collect(),
            Err(_) => {
                log::warn!("layer coupling graph has a cycle");
                self.layers.keys().copied().collect()
            }
        }
    }
}

pub(crate) fn check_non_negative(what: &'static str, value: f64) -> Result<(), NetworkError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(NetworkError::InvalidValue { what, value })
    }
}

pub(crate) fn check_positive(what: &'static str, value: f64) -> Result<(), NetworkError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(NetworkError::InvalidValue { what, value })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    #[test]
    fn add_link_validates_endpoints() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let res = network.add_link(
            ids.layer,
            ids.nodes[0],
            ids.nodes[0],
            1.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        );
        assert!(matches!(res, Err(NetworkError::SameEndpoints(_))));
        let res = network.add_link(
            ids.layer,
            ids.nodes[0],
            NodeId::new(1000),
            1.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        );
        assert!(matches!(res, Err(NetworkError::UnknownElement(_))));
        let res = network.add_link(
            ids.layer,
            ids.nodes[0],
            ids.nodes[1],
            -1.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        );
        assert!(matches!(res, Err(NetworkError::InvalidValue { .. })));
        Ok(())
    }

    #[test]
    fn bidirectional_links_are_paired() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle()?;
        let ab = ids.link(0, 1);
        let ba = ids.link(1, 0);
        assert_eq!(network.link(ab).and_then(|l| l.bidirectional_pair()), Some(ba));
        assert_eq!(network.link(ba).and_then(|l| l.bidirectional_pair()), Some(ab));
        Ok(())
    }

    #[test]
    fn coupling_follows_both_layers() -> anyhow::Result<()> {
        let (mut network, lower) = testing::triangle_routed()?;
        let upper = network.add_layer("upper", "");
        let demand = lower.demand(0, 1);
        let link = network
            .couple_demand_to_new_link(demand, upper)
            .context("failed to couple")?;
        // The lower demand carries 1 unit, so the upper link has capacity 1.
        assert_eq!(network.link(link).map(|l| l.capacity()), Some(1.0));
        let upper_demand = network.add_demand(upper, lower.nodes[0], lower.nodes[1], 0.5)?;
        network.add_route(upper_demand, 0.5, 0.5, &[link])?;
        assert_eq!(network.demand(demand).map(|d| d.offered_traffic()), Some(0.5));
        assert!(matches!(
            network.set_link_capacity(link, 3.0),
            Err(NetworkError::CoupledValue(_))
        ));
        assert!(matches!(
            network.set_demand_offered_traffic(demand, 3.0),
            Err(NetworkError::CoupledValue(_))
        ));
        assert_eq!(network.layers_top_down(), vec![upper, lower.layer]);
        assert_eq!(network.lower_layers_of(upper), [lower.layer].into_iter().collect());
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn coupling_rejects_misuse() -> anyhow::Result<()> {
        let (mut network, lower) = testing::triangle()?;
        let upper = network.add_layer("upper", "");
        let demand = lower.demand(0, 1);
        let (ab, _) = network.add_link_bidirectional(
            upper,
            lower.nodes[0],
            lower.nodes[1],
            0.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        )?;
        let ac = network.add_link(
            upper,
            lower.nodes[0],
            lower.nodes[2],
            0.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        )?;
        assert!(matches!(
            network.couple_demand_to_link(demand, lower.link(0, 1)),
            Err(NetworkError::CouplingSameLayer(_))
        ));
        assert!(matches!(
            network.couple_demand_to_link(demand, ac),
            Err(NetworkError::CouplingEndpointMismatch { .. })
        ));
        network.couple_demand_to_link(demand, ab)?;
        assert!(matches!(
            network.couple_demand_to_link(demand, ab),
            Err(NetworkError::AlreadyCoupled(_))
        ));
        // An upper demand coupled to a lower link would close a cycle.
        let upper_demand = network.add_demand(upper, lower.nodes[0], lower.nodes[2], 1.0)?;
        assert!(matches!(
            network.couple_demand_to_link(upper_demand, lower.link(0, 2)),
            Err(NetworkError::CouplingCycle { .. })
        ));
        Ok(())
    }

    #[test]
    fn decoupling_is_symmetric_and_idempotent() -> anyhow::Result<()> {
        let (mut network, lower) = testing::triangle()?;
        let upper = network.add_layer("upper", "");
        let demand = lower.demand(0, 1);
        let link = network.couple_demand_to_new_link(demand, upper)?;
        network.decouple_link(link)?;
        assert!(!network.link(link).context("missing link")?.is_coupled());
        assert!(!network.demand(demand).context("missing demand")?.is_coupled());
        network.decouple_demand(demand)?;
        network.decouple_link(link)?;
        network.couple_demand_to_link(demand, link)?;
        network.remove_link(link)?;
        assert!(!network.demand(demand).context("missing demand")?.is_coupled());
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn last_layer_cannot_be_removed() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let other = network.add_layer("other", "");
        network.remove_layer(ids.layer)?;
        assert_eq!(network.nr_links(), 0);
        assert_eq!(network.nr_demands(), 0);
        assert!(matches!(
            network.remove_layer(other),
            Err(NetworkError::LastLayer)
        ));
        network.check_caches_consistency()?;
        Ok(())
    }
}
