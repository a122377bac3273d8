//! Cross-checks of the redundant relations and caches kept by a [`Network`].

use std::collections::{BTreeMap, BTreeSet};

use crate::network::types::*;
use crate::network::{Network, NetworkError};

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<(), NetworkError> {
    if cond {
        Ok(())
    } else {
        Err(NetworkError::Inconsistent(msg()))
    }
}

impl Network {
    /// Verifies that every index, back-reference and cached value agrees with the configured
    /// state, returning the first disagreement found.
    pub fn check_caches_consistency(&self) -> Result<(), NetworkError> {
        ensure(!self.layers.is_empty(), || "no layers".into())?;
        self.check_layer_membership()?;
        self.check_topology_indices()?;
        self.check_route_relations()?;
        self.check_tree_relations()?;
        self.check_resource_relations()?;
        self.check_coupling()?;
        self.check_cached_values()
    }

    fn check_layer_membership(&self) -> Result<(), NetworkError> {
        let mut links = BTreeMap::<LayerId, BTreeSet<LinkId>>::new();
        for l in self.links.values() {
            links.entry(l.layer).or_default().insert(l.id);
        }
        let mut demands = BTreeMap::<LayerId, BTreeSet<DemandId>>::new();
        for d in self.demands.values() {
            demands.entry(d.layer).or_default().insert(d.id);
        }
        let mut mcds = BTreeMap::<LayerId, BTreeSet<MulticastDemandId>>::new();
        for d in self.multicast_demands.values() {
            mcds.entry(d.layer).or_default().insert(d.id);
        }
        let mut routes = BTreeMap::<LayerId, BTreeSet<RouteId>>::new();
        for r in self.routes.values() {
            routes.entry(r.layer).or_default().insert(r.id);
        }
        let mut trees = BTreeMap::<LayerId, BTreeSet<MulticastTreeId>>::new();
        for t in self.trees.values() {
            trees.entry(t.layer).or_default().insert(t.id);
        }
        for layer in self.layers.values() {
            let id = layer.id;
            ensure(layer.links == links.remove(&id).unwrap_or_default(), || {
                format!("links of layer {id}")
            })?;
            ensure(layer.demands == demands.remove(&id).unwrap_or_default(), || {
                format!("demands of layer {id}")
            })?;
            ensure(
                layer.multicast_demands == mcds.remove(&id).unwrap_or_default(),
                || format!("multicast demands of layer {id}"),
            )?;
            ensure(layer.routes == routes.remove(&id).unwrap_or_default(), || {
                format!("routes of layer {id}")
            })?;
            ensure(layer.trees == trees.remove(&id).unwrap_or_default(), || {
                format!("trees of layer {id}")
            })?;
            if layer.routing_type == RoutingType::SourceRouting {
                ensure(layer.forwarding_rules.is_empty(), || {
                    format!("source-routed layer {id} has forwarding rules")
                })?;
            } else {
                ensure(layer.routes.is_empty(), || {
                    format!("hop-by-hop layer {id} has routes")
                })?;
            }
            for d in layer.forwarding_rules.keys() {
                ensure(layer.demands.contains(d), || {
                    format!("rules of demand {d} are kept in layer {id}")
                })?;
            }
        }
        // Anything left refers to a layer that does not exist.
        ensure(
            links.is_empty()
                && demands.is_empty()
                && mcds.is_empty()
                && routes.is_empty()
                && trees.is_empty(),
            || "elements in unknown layers".into(),
        )
    }

    fn check_topology_indices(&self) -> Result<(), NetworkError> {
        let mut out = BTreeMap::<NodeId, BTreeSet<LinkId>>::new();
        let mut inc = BTreeMap::<NodeId, BTreeSet<LinkId>>::new();
        for l in self.links.values() {
            ensure(
                self.nodes.contains_key(&l.origin) && self.nodes.contains_key(&l.destination),
                || format!("link {} has unknown end nodes", l.id),
            )?;
            out.entry(l.origin).or_default().insert(l.id);
            inc.entry(l.destination).or_default().insert(l.id);
            if let Some(pair) = l.bidirectional_pair {
                let back = self.links.get(&pair).and_then(|p| p.bidirectional_pair);
                ensure(back == Some(l.id), || format!("pair of link {} is one-sided", l.id))?;
            }
            for s in &l.srgs {
                ensure(
                    self.srgs.get(s).map_or(false, |s| s.links.contains(&l.id)),
                    || format!("link {} and SRG {s} disagree", l.id),
                )?;
            }
        }
        for n in self.nodes.values() {
            ensure(n.out_links == out.remove(&n.id).unwrap_or_default(), || {
                format!("outgoing links of node {}", n.id)
            })?;
            ensure(n.in_links == inc.remove(&n.id).unwrap_or_default(), || {
                format!("incoming links of node {}", n.id)
            })?;
            for s in &n.srgs {
                ensure(
                    self.srgs.get(s).map_or(false, |s| s.nodes.contains(&n.id)),
                    || format!("node {} and SRG {s} disagree", n.id),
                )?;
            }
        }
        for s in self.srgs.values() {
            for n in &s.nodes {
                ensure(
                    self.nodes.get(n).map_or(false, |n| n.srgs.contains(&s.id)),
                    || format!("SRG {} and node {n} disagree", s.id),
                )?;
            }
            for l in &s.links {
                ensure(
                    self.links.get(l).map_or(false, |l| l.srgs.contains(&s.id)),
                    || format!("SRG {} and link {l} disagree", s.id),
                )?;
            }
        }
        for d in self.demands.values() {
            if let Some(pair) = d.bidirectional_pair {
                let back = self.demands.get(&pair).and_then(|p| p.bidirectional_pair);
                ensure(back == Some(d.id), || {
                    format!("pair of demand {} is one-sided", d.id)
                })?;
            }
        }
        Ok(())
    }

    fn check_route_relations(&self) -> Result<(), NetworkError> {
        let mut by_demand = BTreeMap::<DemandId, BTreeSet<RouteId>>::new();
        let mut on_links = BTreeMap::<LinkId, BTreeMap<RouteId, usize>>::new();
        let mut on_resources = BTreeMap::<ResourceId, BTreeSet<RouteId>>::new();
        for r in self.routes.values() {
            let demand = self
                .demands
                .get(&r.demand)
                .ok_or_else(|| NetworkError::Inconsistent(format!("route {} has no demand", r.id)))?;
            self.validate_path(demand, &r.path)?;
            ensure(r.occupation.len() == r.path.len(), || {
                format!("occupation of route {}", r.id)
            })?;
            by_demand.entry(r.demand).or_default().insert(r.id);
            for elem in &r.path {
                match *elem {
                    PathElement::Link(l) => {
                        *on_links.entry(l).or_default().entry(r.id).or_default() += 1;
                    }
                    PathElement::Resource(res) => {
                        on_resources.entry(res).or_default().insert(r.id);
                    }
                }
            }
            for b in &r.backups {
                let backup = self.routes.get(b);
                ensure(backup.and_then(|b| b.primary) == Some(r.id), || {
                    format!("backup {b} of route {} does not point back", r.id)
                })?;
                ensure(backup.map_or(false, |b| b.demand == r.demand), || {
                    format!("backup {b} of route {} serves another demand", r.id)
                })?;
            }
            if let Some(p) = r.primary {
                ensure(
                    self.routes.get(&p).map_or(false, |p| p.backups.contains(&r.id)),
                    || format!("primary {p} of route {} does not list it", r.id),
                )?;
                ensure(r.backups.is_empty(), || {
                    format!("backup route {} has backups", r.id)
                })?;
            }
        }
        for d in self.demands.values() {
            ensure(d.routes == by_demand.remove(&d.id).unwrap_or_default(), || {
                format!("routes of demand {}", d.id)
            })?;
        }
        for l in self.links.values() {
            ensure(
                l.traversing_routes == on_links.remove(&l.id).unwrap_or_default(),
                || format!("routes traversing link {}", l.id),
            )?;
        }
        for res in self.resources.values() {
            ensure(
                res.traversing_routes == on_resources.remove(&res.id).unwrap_or_default(),
                || format!("routes traversing resource {}", res.id),
            )?;
        }
        ensure(on_links.is_empty() && on_resources.is_empty(), || {
            "routes traverse unknown elements".into()
        })
    }

    fn check_tree_relations(&self) -> Result<(), NetworkError> {
        let mut by_demand = BTreeMap::<MulticastDemandId, BTreeSet<MulticastTreeId>>::new();
        let mut on_links = BTreeMap::<LinkId, BTreeSet<MulticastTreeId>>::new();
        for t in self.trees.values() {
            let demand = self.multicast_demands.get(&t.demand).ok_or_else(|| {
                NetworkError::Inconsistent(format!("tree {} has no demand", t.id))
            })?;
            self.validate_tree(demand, &t.links)?;
            by_demand.entry(t.demand).or_default().insert(t.id);
            for &l in &t.links {
                on_links.entry(l).or_default().insert(t.id);
            }
        }
        for d in self.multicast_demands.values() {
            ensure(d.trees == by_demand.remove(&d.id).unwrap_or_default(), || {
                format!("trees of multicast demand {}", d.id)
            })?;
        }
        for l in self.links.values() {
            ensure(
                l.traversing_trees == on_links.remove(&l.id).unwrap_or_default(),
                || format!("trees traversing link {}", l.id),
            )?;
        }
        Ok(())
    }

    fn check_resource_relations(&self) -> Result<(), NetworkError> {
        let mut hosted = BTreeMap::<NodeId, BTreeSet<ResourceId>>::new();
        for r in self.resources.values() {
            hosted.entry(r.host).or_default().insert(r.id);
            for (b, &amount) in &r.base_resources {
                let base = self.resources.get(b);
                ensure(
                    base.and_then(|b| b.upper_resources.get(&r.id)) == Some(&amount),
                    || format!("base {b} of resource {} disagrees", r.id),
                )?;
                ensure(base.map_or(false, |b| b.host == r.host), || {
                    format!("base {b} of resource {} is on another node", r.id)
                })?;
            }
            for (u, &amount) in &r.upper_resources {
                ensure(
                    self.resources
                        .get(u)
                        .and_then(|u| u.base_resources.get(&r.id))
                        == Some(&amount),
                    || format!("upper {u} of resource {} disagrees", r.id),
                )?;
            }
        }
        for n in self.nodes.values() {
            ensure(n.resources == hosted.remove(&n.id).unwrap_or_default(), || {
                format!("resources of node {}", n.id)
            })?;
        }
        ensure(hosted.is_empty(), || "resources on unknown nodes".into())
    }

    fn check_coupling(&self) -> Result<(), NetworkError> {
        for d in self.demands.values() {
            if let Some(l) = d.coupled_upper_link {
                ensure(
                    self.links.get(&l).and_then(|l| l.coupled_lower_demand) == Some(d.id),
                    || format!("coupling of demand {} is one-sided", d.id),
                )?;
            }
        }
        for d in self.multicast_demands.values() {
            for l in d.coupled_upper_links.values() {
                ensure(
                    self.links
                        .get(l)
                        .and_then(|l| l.coupled_lower_multicast_demand)
                        == Some(d.id),
                    || format!("coupling of multicast demand {} is one-sided", d.id),
                )?;
            }
        }
        for l in self.links.values() {
            if let Some(d) = l.coupled_lower_demand {
                ensure(
                    self.demands.get(&d).and_then(|d| d.coupled_upper_link) == Some(l.id),
                    || format!("coupling of link {} is one-sided", l.id),
                )?;
            }
            if let Some(d) = l.coupled_lower_multicast_demand {
                ensure(
                    self.multicast_demands
                        .get(&d)
                        .map_or(false, |d| d.coupled_upper_links.values().any(|&u| u == l.id)),
                    || format!("multicast coupling of link {} is one-sided", l.id),
                )?;
            }
        }
        let (g, _) = self.layer_coupling_graph(None);
        ensure(!petgraph::algo::is_cyclic_directed(&g), || {
            "layer coupling has a cycle".into()
        })
    }

    // A fresh refresh of a copy must reproduce every cached value.
    fn check_cached_values(&self) -> Result<(), NetworkError> {
        let mut fresh = self.copy();
        fresh.refresh();
        for (id, l) in &self.links {
            ensure(fresh.links.get(id) == Some(l), || format!("cached state of link {id}"))?;
        }
        for (id, n) in &self.nodes {
            ensure(fresh.nodes.get(id) == Some(n), || format!("cached state of node {id}"))?;
        }
        for (id, d) in &self.demands {
            ensure(fresh.demands.get(id) == Some(d), || {
                format!("cached state of demand {id}")
            })?;
        }
        for (id, r) in &self.routes {
            ensure(fresh.routes.get(id) == Some(r), || format!("cached state of route {id}"))?;
        }
        for (id, d) in &self.multicast_demands {
            ensure(fresh.multicast_demands.get(id) == Some(d), || {
                format!("cached state of multicast demand {id}")
            })?;
        }
        for (id, t) in &self.trees {
            ensure(fresh.trees.get(id) == Some(t), || format!("cached state of tree {id}"))?;
        }
        for (id, r) in &self.resources {
            ensure(fresh.resources.get(id) == Some(r), || {
                format!("cached state of resource {id}")
            })?;
        }
        for (id, l) in &self.layers {
            ensure(fresh.layers.get(id) == Some(l), || format!("cached state of layer {id}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing;

    use super::*;

    #[test]
    fn fixtures_are_consistent() -> anyhow::Result<()> {
        testing::triangle()?.0.check_caches_consistency()?;
        testing::triangle_routed()?.0.check_caches_consistency()?;
        testing::service_chain_net()?.0.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn detects_broken_index() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle_routed()?;
        if let Some(link) = network.links.get_mut(&ids.link(0, 1)) {
            link.traversing_routes.clear();
        }
        assert!(matches!(
            network.check_caches_consistency(),
            Err(NetworkError::Inconsistent(_))
        ));
        Ok(())
    }

    #[test]
    fn detects_stale_cache() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle_routed()?;
        if let Some(link) = network.links.get_mut(&ids.link(0, 1)) {
            link.cache_carried_traffic = 42.0;
        }
        let err = network.check_caches_consistency().err();
        assert!(
            matches!(&err, Some(NetworkError::Inconsistent(msg)) if msg.contains("link")),
            "{err:?}"
        );
        Ok(())
    }
}
