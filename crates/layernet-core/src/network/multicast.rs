//! Multicast demands and the trees carrying them.

use std::collections::{BTreeMap, BTreeSet};

use crate::network::topology::check_non_negative;
use crate::network::types::*;
use crate::network::{Network, NetworkError};

impl Network {
    pub fn add_multicast_demand(
        &mut self,
        layer: LayerId,
        ingress: NodeId,
        egresses: BTreeSet<NodeId>,
        offered_traffic: f64,
    ) -> Result<MulticastDemandId, NetworkError> {
        self.req_layer(layer)?;
        self.req_node(ingress)?;
        if egresses.is_empty() {
            return Err(NetworkError::InvalidEgresses("no egress nodes"));
        }
        if egresses.contains(&ingress) {
            return Err(NetworkError::InvalidEgresses("the ingress node is an egress node"));
        }
        for &egress in &egresses {
            self.req_node(egress)?;
        }
        check_non_negative("offered traffic", offered_traffic)?;
        let id = MulticastDemandId::new(self.next_id());
        let demand = MulticastDemand {
            id,
            meta: Meta::default(),
            layer,
            ingress,
            egresses,
            offered_traffic,
            coupled_upper_links: BTreeMap::new(),
            trees: BTreeSet::new(),
            cache_offered_traffic: offered_traffic,
            cache_carried_traffic: 0.0,
        };
        self.multicast_demands.insert(id, demand);
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.multicast_demands.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    pub fn set_multicast_demand_offered_traffic(
        &mut self,
        id: MulticastDemandId,
        offered_traffic: f64,
    ) -> Result<(), NetworkError> {
        check_non_negative("offered traffic", offered_traffic)?;
        let demand = self.req_multicast_demand_mut(id)?;
        if demand.is_coupled() {
            return Err(NetworkError::CoupledValue(id.into()));
        }
        demand.offered_traffic = offered_traffic;
        self.refresh();
        Ok(())
    }

    pub fn remove_multicast_demand(&mut self, id: MulticastDemandId) -> Result<(), NetworkError> {
        self.req_multicast_demand(id)?;
        self.detach_multicast_demand(id);
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_multicast_demand(&mut self, id: MulticastDemandId) {
        let Some(demand) = self.multicast_demands.get(&id) else {
            return;
        };
        let trees = demand.trees.iter().copied().collect::<Vec<_>>();
        for tree in trees {
            self.detach_tree(tree);
        }
        self.decouple_multicast_demand_unchecked(id);
        if let Some(demand) = self.multicast_demands.remove(&id) {
            if let Some(layer) = self.layers.get_mut(&demand.layer) {
                layer.multicast_demands.remove(&id);
            }
        }
    }

    /// Adds a tree over `links`, which must form an arborescence rooted at the demand's ingress
    /// reaching every egress node and only ending at egress nodes.
    pub fn add_multicast_tree(
        &mut self,
        demand: MulticastDemandId,
        carried_traffic: f64,
        occupied_capacity: f64,
        links: BTreeSet<LinkId>,
    ) -> Result<MulticastTreeId, NetworkError> {
        let d = self.req_multicast_demand(demand)?;
        let layer = d.layer;
        self.validate_tree(d, &links)?;
        check_non_negative("carried traffic", carried_traffic)?;
        check_non_negative("occupied capacity", occupied_capacity)?;
        let id = MulticastTreeId::new(self.next_id());
        let initial = TreeState {
            links: links.clone(),
            carried_traffic,
            occupied_capacity,
        };
        for link in &links {
            if let Some(l) = self.links.get_mut(link) {
                l.traversing_trees.insert(id);
            }
        }
        let tree = MulticastTree {
            id,
            meta: Meta::default(),
            layer,
            demand,
            links,
            carried_traffic,
            occupied_capacity,
            initial,
            cache_up: true,
            cache_carried_traffic: 0.0,
            cache_occupied_capacity: 0.0,
        };
        self.trees.insert(id, tree);
        if let Some(d) = self.multicast_demands.get_mut(&demand) {
            d.trees.insert(id);
        }
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.trees.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    pub fn set_multicast_tree_links(
        &mut self,
        id: MulticastTreeId,
        links: BTreeSet<LinkId>,
    ) -> Result<(), NetworkError> {
        let tree = self.req_tree(id)?;
        let demand = self.req_multicast_demand(tree.demand)?;
        self.validate_tree(demand, &links)?;
        let old = tree.links.clone();
        for link in &old {
            if let Some(l) = self.links.get_mut(link) {
                l.traversing_trees.remove(&id);
            }
        }
        for link in &links {
            if let Some(l) = self.links.get_mut(link) {
                l.traversing_trees.insert(id);
            }
        }
        if let Some(tree) = self.trees.get_mut(&id) {
            tree.links = links;
        }
        self.refresh();
        Ok(())
    }

    pub fn set_multicast_tree_carried_traffic(
        &mut self,
        id: MulticastTreeId,
        carried_traffic: f64,
        occupied_capacity: f64,
    ) -> Result<(), NetworkError> {
        check_non_negative("carried traffic", carried_traffic)?;
        check_non_negative("occupied capacity", occupied_capacity)?;
        let tree = self.req_tree_mut(id)?;
        tree.carried_traffic = carried_traffic;
        tree.occupied_capacity = occupied_capacity;
        self.refresh();
        Ok(())
    }

    pub fn revert_multicast_tree_to_initial_state(
        &mut self,
        id: MulticastTreeId,
    ) -> Result<(), NetworkError> {
        let TreeState {
            links,
            carried_traffic,
            occupied_capacity,
        } = self.req_tree(id)?.initial.clone();
        self.set_multicast_tree_links(id, links)?;
        self.set_multicast_tree_carried_traffic(id, carried_traffic, occupied_capacity)
    }

    pub fn remove_multicast_tree(&mut self, id: MulticastTreeId) -> Result<(), NetworkError> {
        self.req_tree(id)?;
        self.detach_tree(id);
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_tree(&mut self, id: MulticastTreeId) {
        let Some(tree) = self.trees.remove(&id) else {
            return;
        };
        for link in &tree.links {
            if let Some(l) = self.links.get_mut(link) {
                l.traversing_trees.remove(&id);
            }
        }
        if let Some(d) = self.multicast_demands.get_mut(&tree.demand) {
            d.trees.remove(&id);
        }
        if let Some(layer) = self.layers.get_mut(&tree.layer) {
            layer.trees.remove(&id);
        }
    }

    /// The links of a tree from its root to `egress`.
    pub fn tree_path_to(
        &self,
        id: MulticastTreeId,
        egress: NodeId,
    ) -> Result<Vec<LinkId>, NetworkError> {
        let tree = self.req_tree(id)?;
        let demand = self.req_multicast_demand(tree.demand)?;
        let parents = self.tree_parents(&tree.links)?;
        let mut path = Vec::new();
        let mut cur = egress;
        while cur != demand.ingress {
            let link = parents.get(&cur).ok_or(NetworkError::InvalidTree {
                demand: demand.id,
                reason: "node not reached by the tree",
            })?;
            path.push(*link);
            cur = self.req_link(*link)?.origin;
        }
        path.reverse();
        Ok(path)
    }

    // Maps every node of a link set to the single link entering it.
    fn tree_parents(&self, links: &BTreeSet<LinkId>) -> Result<BTreeMap<NodeId, LinkId>, NetworkError> {
        let mut parents = BTreeMap::new();
        for &id in links {
            let link = self.req_link(id)?;
            if parents.insert(link.destination, id).is_some() {
                return Err(NetworkError::Inconsistent(format!(
                    "node {} is entered twice",
                    link.destination
                )));
            }
        }
        Ok(parents)
    }

    pub(crate) fn validate_tree(
        &self,
        demand: &MulticastDemand,
        links: &BTreeSet<LinkId>,
    ) -> Result<(), NetworkError> {
        let invalid = |reason| NetworkError::InvalidTree {
            demand: demand.id,
            reason,
        };
        if links.is_empty() {
            return Err(invalid("no links"));
        }
        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut entered = BTreeSet::new();
        for &id in links {
            let link = self.req_link(id)?;
            if link.layer != demand.layer {
                return Err(NetworkError::WrongLayer {
                    element: id.into(),
                    expected: demand.layer,
                    found: link.layer,
                });
            }
            if link.destination == demand.ingress || !entered.insert(link.destination) {
                return Err(invalid("a node is entered by more than one link"));
            }
            children
                .entry(link.origin)
                .or_default()
                .push(link.destination);
        }
        let mut reached = BTreeSet::from([demand.ingress]);
        let mut stack = vec![demand.ingress];
        while let Some(n) = stack.pop() {
            for &child in children.get(&n).into_iter().flatten() {
                if reached.insert(child) {
                    stack.push(child);
                }
            }
        }
        if reached.len() != entered.len() + 1 {
            return Err(invalid("some links are not reachable from the ingress node"));
        }
        if !demand.egresses.is_subset(&reached) {
            return Err(invalid("some egress node is not reached"));
        }
        let leaves_are_egresses = reached
            .iter()
            .filter(|n| !children.contains_key(*n))
            .all(|n| demand.egresses.contains(n));
        if !leaves_are_egresses {
            return Err(invalid("a leaf is not an egress node"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;
    use crate::units::{Km, KmPerSec};

    use super::*;

    #[test]
    fn tree_must_be_arborescence() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let egresses = [ids.nodes[1], ids.nodes[2]].into_iter().collect();
        let mcd = network.add_multicast_demand(ids.layer, ids.nodes[0], egresses, 1.0)?;
        let bad = [ids.link(0, 1), ids.link(2, 1), ids.link(0, 2)].into_iter().collect();
        assert!(matches!(
            network.add_multicast_tree(mcd, 1.0, 1.0, bad),
            Err(NetworkError::InvalidTree { .. })
        ));
        let partial = [ids.link(0, 1)].into_iter().collect();
        assert!(matches!(
            network.add_multicast_tree(mcd, 1.0, 1.0, partial),
            Err(NetworkError::InvalidTree { .. })
        ));
        let chain = [ids.link(0, 1), ids.link(1, 2)].into_iter().collect();
        let tree = network.add_multicast_tree(mcd, 1.0, 1.0, chain)?;
        assert_eq!(
            network.tree_path_to(tree, ids.nodes[2])?,
            vec![ids.link(0, 1), ids.link(1, 2)]
        );
        let demand = network.multicast_demand(mcd).context("missing demand")?;
        assert_eq!(demand.carried_traffic(), 1.0);
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn egresses_are_validated() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let res = network.add_multicast_demand(ids.layer, ids.nodes[0], BTreeSet::new(), 1.0);
        assert!(matches!(res, Err(NetworkError::InvalidEgresses(_))));
        let with_ingress = [ids.nodes[0], ids.nodes[1]].into_iter().collect();
        let res = network.add_multicast_demand(ids.layer, ids.nodes[0], with_ingress, 1.0);
        assert!(matches!(res, Err(NetworkError::InvalidEgresses(_))));
        Ok(())
    }

    #[test]
    fn tree_follows_failures() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let egresses = [ids.nodes[1], ids.nodes[2]].into_iter().collect();
        let mcd = network.add_multicast_demand(ids.layer, ids.nodes[0], egresses, 1.0)?;
        let links = [ids.link(0, 1), ids.link(0, 2)].into_iter().collect();
        let tree = network.add_multicast_tree(mcd, 1.0, 2.0, links)?;
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.occupied_capacity()), Some(2.0));
        network.set_link_failure_state(ids.link(0, 2), false)?;
        let t = network.multicast_tree(tree).context("missing tree")?;
        assert!(t.is_down());
        assert_eq!(t.carried_traffic(), 0.0);
        assert_eq!(t.carried_traffic_if_not_failing(), 1.0);
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.carried_traffic()), Some(0.0));
        network.set_link_failure_state(ids.link(0, 2), true)?;
        assert_eq!(
            network.multicast_tree(tree).map(|t| t.carried_traffic()),
            Some(1.0)
        );
        Ok(())
    }

    #[test]
    fn multicast_coupling() -> anyhow::Result<()> {
        let (mut network, lower) = testing::triangle()?;
        let egresses = [lower.nodes[1], lower.nodes[2]].into_iter().collect();
        let mcd = network.add_multicast_demand(lower.layer, lower.nodes[0], egresses, 0.0)?;
        let tree_links = [lower.link(0, 1), lower.link(0, 2)].into_iter().collect();
        network.add_multicast_tree(mcd, 4.0, 4.0, tree_links)?;
        let upper = network.add_layer("upper", "");
        let mut coupled = BTreeSet::new();
        for i in [1, 2] {
            coupled.insert(network.add_link(
                upper,
                lower.nodes[0],
                lower.nodes[i],
                0.0,
                Km::new(1.0),
                KmPerSec::FIBER,
            )?);
        }
        network.couple_multicast_demand_to_links(mcd, &coupled)?;
        for link in &coupled {
            assert_eq!(network.link(*link).map(|l| l.capacity()), Some(4.0));
        }
        let first = *coupled.first().context("no links")?;
        network.remove_link(first)?;
        let demand = network.multicast_demand(mcd).context("missing demand")?;
        assert!(!demand.is_coupled());
        assert!(coupled
            .iter()
            .filter_map(|l| network.link(*l))
            .all(|l| !l.is_coupled()));
        network.check_caches_consistency()?;
        Ok(())
    }
}
