//! Recomputes the derived state of a network after a change.
//!
//! Configured values (a route's carried traffic and occupation, a link's own capacity, a demand's
//! own offered traffic) are never touched here. Everything prefixed `cache_` is a function of
//! them, of the failure state and of the coupling between layers.

use std::collections::{BTreeMap, BTreeSet};

use crate::network::demands::traffic_along;
use crate::network::types::*;
use crate::network::Network;

impl Network {
    pub(crate) fn refresh(&mut self) {
        self.refresh_failure_state();
        // Upper layers first: a lower demand is offered what the upper link carries.
        for layer in self.layers_top_down() {
            self.refresh_layer(layer);
        }
        self.refresh_coupled_capacities();
        self.refresh_resources();
    }

    fn refresh_failure_state(&mut self) {
        let failed = self
            .srgs
            .values()
            .filter(|s| s.failed)
            .map(|s| s.id)
            .collect::<BTreeSet<_>>();
        for node in self.nodes.values_mut() {
            node.down_by_srgs = node.srgs.intersection(&failed).copied().collect();
        }
        for link in self.links.values_mut() {
            link.down_by_srgs = link.srgs.intersection(&failed).copied().collect();
            let ends_up = [link.origin, link.destination]
                .iter()
                .all(|n| self.nodes.get(n).map_or(false, |n| n.is_up()));
            link.cache_up = !link.failed && link.down_by_srgs.is_empty() && ends_up;
        }
    }

    /// Whether every link of the path and the host of every resource on it are up.
    pub(crate) fn is_path_up(&self, path: &[PathElement]) -> bool {
        path.iter().all(|elem| match *elem {
            PathElement::Link(l) => self.links.get(&l).map_or(false, |l| l.cache_up),
            PathElement::Resource(r) => self
                .resources
                .get(&r)
                .and_then(|r| self.nodes.get(&r.host))
                .map_or(false, |n| n.is_up()),
        })
    }

    fn refresh_layer(&mut self, id: LayerId) {
        let Some(layer) = self.layers.get(&id) else {
            return;
        };
        let routing_type = layer.routing_type;
        let demand_ids = layer.demands.iter().copied().collect::<Vec<_>>();
        let mcd_ids = layer.multicast_demands.iter().copied().collect::<Vec<_>>();
        let route_ids = layer.routes.iter().copied().collect::<Vec<_>>();
        let tree_ids = layer.trees.iter().copied().collect::<Vec<_>>();
        let mut carried = layer
            .links
            .iter()
            .map(|&l| (l, 0.0))
            .collect::<BTreeMap<LinkId, f64>>();
        let mut occupied = carried.clone();

        // Offered traffic, which coupled demands take from the layer above.
        for d in &demand_ids {
            if let Some(demand) = self.demands.get_mut(d) {
                demand.cache_offered_traffic = match demand.coupled_upper_link {
                    Some(l) => self.links.get(&l).map_or(0.0, |l| l.cache_carried_traffic),
                    None => demand.offered_traffic,
                };
            }
        }
        for d in &mcd_ids {
            if let Some(demand) = self.multicast_demands.get_mut(d) {
                demand.cache_offered_traffic = if demand.coupled_upper_links.is_empty() {
                    demand.offered_traffic
                } else {
                    demand
                        .coupled_upper_links
                        .values()
                        .filter_map(|l| self.links.get(l))
                        .map(|l| l.cache_carried_traffic)
                        .fold(0.0, f64::max)
                };
            }
        }

        // Routes: which path is active, and what they carry and occupy on it.
        let own_up = route_ids
            .iter()
            .filter_map(|r| self.routes.get(r))
            .map(|r| (r.id, self.is_path_up(&r.path)))
            .collect::<BTreeMap<_, _>>();
        let is_own_up = |r: &RouteId| own_up.get(r).copied().unwrap_or(false);
        for r in &route_ids {
            let Some(route) = self.routes.get_mut(r) else {
                continue;
            };
            let up = is_own_up(r);
            route.cache_own_path_up = up;
            route.cache_active = if up {
                ActivePath::Own
            } else if route.primary.is_some() {
                ActivePath::Down
            } else {
                route
                    .backups
                    .iter()
                    .find(|b| is_own_up(*b))
                    .map_or(ActivePath::Down, |&b| ActivePath::Backup(b))
            };
            route.cache_carried_traffic = match route.cache_active {
                ActivePath::Down => 0.0,
                _ => route.carried_traffic,
            };
            route.cache_occupation = if up {
                route.occupation.clone()
            } else {
                vec![0.0; route.path.len()]
            };
        }
        for r in &route_ids {
            let Some(route) = self.routes.get(r) else {
                continue;
            };
            let factors = self
                .demands
                .get(&route.demand)
                .map(|d| d.expansion_factors.as_slice())
                .unwrap_or_default();
            // A primary rerouted to a backup sends its traffic along the backup's path, while
            // the backup keeps the capacity it reserved on its own.
            let path = match route.cache_active {
                ActivePath::Own => &route.path,
                ActivePath::Backup(b) => match self.routes.get(&b) {
                    Some(b) => &b.path,
                    None => continue,
                },
                ActivePath::Down => continue,
            };
            let traffic = traffic_along(path, route.cache_carried_traffic, factors);
            for (elem, t) in path.iter().zip(traffic) {
                if let PathElement::Link(l) = elem {
                    *carried.entry(*l).or_default() += t;
                }
            }
            for (elem, occ) in route.path.iter().zip(&route.cache_occupation) {
                if let PathElement::Link(l) = elem {
                    *occupied.entry(*l).or_default() += occ;
                }
            }
        }

        // Multicast trees.
        for t in &tree_ids {
            let up = self.trees.get(t).map_or(false, |t| {
                t.links
                    .iter()
                    .all(|l| self.links.get(l).map_or(false, |l| l.cache_up))
            });
            let Some(tree) = self.trees.get_mut(t) else {
                continue;
            };
            tree.cache_up = up;
            tree.cache_carried_traffic = if up { tree.carried_traffic } else { 0.0 };
            tree.cache_occupied_capacity = if up { tree.occupied_capacity } else { 0.0 };
            for l in &tree.links {
                *carried.entry(*l).or_default() += tree.cache_carried_traffic;
                *occupied.entry(*l).or_default() += tree.cache_occupied_capacity;
            }
        }

        // Demands.
        let mut demand_carried = BTreeMap::new();
        match routing_type {
            RoutingType::SourceRouting => {
                for d in &demand_ids {
                    let total = self.demands.get(d).map_or(0.0, |d| {
                        d.routes
                            .iter()
                            .filter_map(|r| self.routes.get(r))
                            .map(|r| r.cache_carried_traffic)
                            .sum()
                    });
                    demand_carried.insert(*d, total);
                }
            }
            RoutingType::HopByHopRouting => {
                let mut all_flows = BTreeMap::new();
                for d in &demand_ids {
                    let Some(demand) = self.demands.get(d) else {
                        continue;
                    };
                    let rules = self
                        .layers
                        .get(&id)
                        .and_then(|l| l.forwarding_rules.get(d));
                    let empty = BTreeMap::new();
                    let (flows, at_egress) = self.hop_by_hop_flows(
                        demand,
                        rules.unwrap_or(&empty),
                        demand.cache_offered_traffic,
                        true,
                    );
                    for (l, f) in &flows {
                        *carried.entry(*l).or_default() += f;
                        *occupied.entry(*l).or_default() += f;
                    }
                    demand_carried.insert(*d, at_egress);
                    all_flows.insert(*d, flows);
                }
                if let Some(layer) = self.layers.get_mut(&id) {
                    layer.cache_hop_by_hop_flows = all_flows;
                }
            }
        }
        for (d, total) in demand_carried {
            if let Some(demand) = self.demands.get_mut(&d) {
                demand.cache_carried_traffic = total;
            }
        }
        for d in &mcd_ids {
            let total = self.multicast_demands.get(d).map_or(0.0, |d| {
                d.trees
                    .iter()
                    .filter_map(|t| self.trees.get(t))
                    .map(|t| t.cache_carried_traffic)
                    .sum()
            });
            if let Some(demand) = self.multicast_demands.get_mut(d) {
                demand.cache_carried_traffic = total;
            }
        }

        // Links.
        for (l, c) in carried {
            if let Some(link) = self.links.get_mut(&l) {
                link.cache_carried_traffic = c;
                link.cache_occupied_capacity = occupied.get(&l).copied().unwrap_or(0.0);
            }
        }
    }

    fn refresh_coupled_capacities(&mut self) {
        for link in self.links.values_mut() {
            link.cache_capacity = if let Some(d) = link.coupled_lower_demand {
                self.demands.get(&d).map_or(0.0, |d| d.cache_carried_traffic)
            } else if let Some(d) = link.coupled_lower_multicast_demand {
                self.multicast_demands
                    .get(&d)
                    .map_or(0.0, |d| d.cache_carried_traffic)
            } else {
                link.capacity
            };
        }
    }

    fn refresh_resources(&mut self) {
        let mut occupied = BTreeMap::<ResourceId, f64>::new();
        for route in self.routes.values() {
            for (elem, occ) in route.path.iter().zip(&route.cache_occupation) {
                if let PathElement::Resource(r) = elem {
                    *occupied.entry(*r).or_default() += occ;
                }
            }
        }
        for resource in self.resources.values_mut() {
            resource.cache_occupied_by_routes = occupied.get(&resource.id).copied().unwrap_or(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    #[test]
    fn backup_takes_over_when_primary_fails() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let demand = ids.demand(0, 1);
        let primary = network.add_route(demand, 3.0, 3.0, &[ids.link(0, 1)])?;
        let backup = network.add_route(demand, 0.0, 3.0, &[ids.link(0, 2), ids.link(2, 1)])?;
        network.add_backup_route(primary, backup)?;
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.carried_traffic()), Some(0.0));
        // The backup reserves its capacity even while idle.
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.occupied_capacity()), Some(3.0));

        network.set_link_failure_state(ids.link(0, 1), false)?;
        let p = network.route(primary).context("missing route")?;
        assert_eq!(p.active_path(), ActivePath::Backup(backup));
        assert_eq!(p.carried_traffic(), 3.0);
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.carried_traffic()), Some(3.0));
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.carried_traffic()), Some(0.0));
        assert_eq!(network.demand(demand).map(|d| d.carried_traffic()), Some(3.0));
        assert!(matches!(
            network.remove_backup_route(primary, backup),
            Err(crate::NetworkError::BackupInUse { .. })
        ));

        network.set_link_failure_state(ids.link(0, 2), false)?;
        let p = network.route(primary).context("missing route")?;
        assert_eq!(p.active_path(), ActivePath::Down);
        assert_eq!(p.carried_traffic(), 0.0);
        assert_eq!(network.demand(demand).map(|d| d.carried_traffic()), Some(0.0));
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn route_carries_iff_active_path_up() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle_routed()?;
        for node in ids.nodes {
            network.set_node_failure_state(node, false)?;
            for route in network.routes() {
                let up = network.is_path_up(route.path());
                assert_eq!(route.is_own_path_up(), up);
                let expected = if up {
                    route.carried_traffic_if_not_failing()
                } else {
                    0.0
                };
                assert_eq!(route.carried_traffic(), expected);
            }
            network.set_node_failure_state(node, true)?;
        }
        Ok(())
    }

    #[test]
    fn resource_occupation_sums_current_routes() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        network.set_link_failure_state(ids.link(0, 1), false)?;
        for resource in network.resources() {
            let by_routes = resource
                .traversing_routes()
                .iter()
                .filter_map(|r| network.route(*r))
                .map(|r| r.occupied_capacity_in(PathElement::Resource(resource.id())))
                .sum::<f64>();
            assert_eq!(resource.occupied_capacity_by_routes(), by_routes);
            assert_eq!(
                resource.occupied_capacity(),
                by_routes + resource.occupied_capacity_by_upper_resources()
            );
        }
        let fw = network.resource(ids.firewall).context("missing firewall")?;
        assert_eq!(fw.occupied_capacity_by_routes(), 0.0);
        Ok(())
    }

    #[test]
    fn expansion_factors_scale_link_traffic() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        network.set_demand_service_chain(ids.fw_demand, vec!["FW".into()], vec![2.0])?;
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.carried_traffic()), Some(2.0));
        // The firewall doubles the traffic it forwards to the second link.
        assert_eq!(network.link(ids.link(1, 2)).map(|l| l.carried_traffic()), Some(3.0));
        network.set_route_path_and_initially_injected_traffic(
            ids.via_firewall,
            vec![
                PathElement::Link(ids.link(0, 1)),
                PathElement::Resource(ids.firewall),
                PathElement::Link(ids.link(1, 2)),
            ],
            1.5,
        )?;
        let route = network.route(ids.via_firewall).context("missing route")?;
        assert_eq!(route.occupied_capacity_if_not_failing(), &[1.5, 1.5, 3.0]);
        Ok(())
    }
}
