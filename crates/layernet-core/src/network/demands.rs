//! Unicast demands, the routes realizing them and backup relations between routes.

use std::collections::{BTreeMap, BTreeSet};

use crate::network::topology::check_non_negative;
use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::units::{Km, Millisecs};

impl Network {
    pub fn add_demand(
        &mut self,
        layer: LayerId,
        ingress: NodeId,
        egress: NodeId,
        offered_traffic: f64,
    ) -> Result<DemandId, NetworkError> {
        self.req_layer(layer)?;
        self.req_node(ingress)?;
        self.req_node(egress)?;
        if ingress == egress {
            return Err(NetworkError::SameEndpoints(ingress));
        }
        check_non_negative("offered traffic", offered_traffic)?;
        let id = DemandId::new(self.next_id());
        let demand = Demand {
            id,
            meta: Meta::default(),
            layer,
            ingress,
            egress,
            offered_traffic,
            service_chain: Vec::new(),
            expansion_factors: Vec::new(),
            max_latency: None,
            coupled_upper_link: None,
            bidirectional_pair: None,
            routes: BTreeSet::new(),
            cache_offered_traffic: offered_traffic,
            cache_carried_traffic: 0.0,
        };
        self.demands.insert(id, demand);
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.demands.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    /// Adds two opposite demands, each recorded as the other's pair.
    pub fn add_demand_bidirectional(
        &mut self,
        layer: LayerId,
        a: NodeId,
        b: NodeId,
        offered_traffic: f64,
    ) -> Result<(DemandId, DemandId), NetworkError> {
        let ab = self.add_demand(layer, a, b, offered_traffic)?;
        let ba = self.add_demand(layer, b, a, offered_traffic)?;
        self.demands
            .entry(ab)
            .and_modify(|d| d.bidirectional_pair = Some(ba));
        self.demands
            .entry(ba)
            .and_modify(|d| d.bidirectional_pair = Some(ab));
        Ok((ab, ba))
    }

    pub fn set_demand_offered_traffic(
        &mut self,
        id: DemandId,
        offered_traffic: f64,
    ) -> Result<(), NetworkError> {
        check_non_negative("offered traffic", offered_traffic)?;
        let demand = self.req_demand_mut(id)?;
        if demand.is_coupled() {
            return Err(NetworkError::CoupledValue(id.into()));
        }
        demand.offered_traffic = offered_traffic;
        self.refresh();
        Ok(())
    }

    /// Sets the resource types every route of the demand must traverse, with the factor the
    /// traffic is multiplied by after each of them. Existing routes must already follow the new
    /// chain.
    pub fn set_demand_service_chain(
        &mut self,
        id: DemandId,
        resource_types: Vec<String>,
        expansion_factors: Vec<f64>,
    ) -> Result<(), NetworkError> {
        let demand = self.req_demand(id)?;
        if expansion_factors.len() != resource_types.len() {
            return Err(NetworkError::InvalidValue {
                what: "number of expansion factors",
                value: expansion_factors.len() as f64,
            });
        }
        for &factor in &expansion_factors {
            check_non_negative("expansion factor", factor)?;
        }
        if !resource_types.is_empty()
            && self.req_layer(demand.layer)?.routing_type == RoutingType::HopByHopRouting
        {
            return Err(NetworkError::ServiceChainHopByHop(id));
        }
        let mut candidate = demand.clone();
        candidate.service_chain = resource_types;
        candidate.expansion_factors = expansion_factors;
        for route in &demand.routes {
            let route = self.req_route(*route)?;
            self.validate_path(&candidate, &route.path)?;
        }
        self.demands.insert(id, candidate);
        self.refresh();
        Ok(())
    }

    pub fn set_demand_max_latency(
        &mut self,
        id: DemandId,
        max_latency: Option<Millisecs>,
    ) -> Result<(), NetworkError> {
        if let Some(latency) = max_latency {
            check_non_negative("maximum latency", latency.into_f64())?;
        }
        self.req_demand_mut(id)?.max_latency = max_latency;
        Ok(())
    }

    /// Removes a demand with its routes and forwarding rules.
    pub fn remove_demand(&mut self, id: DemandId) -> Result<(), NetworkError> {
        self.req_demand(id)?;
        self.detach_demand(id);
        log::debug!("removed demand {id}");
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_demand(&mut self, id: DemandId) {
        let Some(demand) = self.demands.get(&id) else {
            return;
        };
        let routes = demand.routes.iter().copied().collect::<Vec<_>>();
        let upper = demand.coupled_upper_link;
        for route in routes {
            self.detach_route(route);
        }
        if let Some(link) = upper {
            self.decouple_link_unchecked(link);
        }
        let Some(demand) = self.demands.remove(&id) else {
            return;
        };
        if let Some(layer) = self.layers.get_mut(&demand.layer) {
            layer.demands.remove(&id);
            layer.forwarding_rules.remove(&id);
            layer.cache_hop_by_hop_flows.remove(&id);
        }
        if let Some(pair) = demand
            .bidirectional_pair
            .and_then(|p| self.demands.get_mut(&p))
        {
            pair.bidirectional_pair = None;
        }
    }

    pub fn demands_in(&self, layer: LayerId) -> impl Iterator<Item = &Demand> + '_ {
        self.layers
            .get(&layer)
            .into_iter()
            .flat_map(|l| l.demands.iter())
            .filter_map(|d| self.demands.get(d))
    }

    /// The largest end-to-end delay over the routes currently carrying traffic of the demand.
    pub fn worst_case_delay(&self, id: DemandId) -> Result<Millisecs, NetworkError> {
        let demand = self.req_demand(id)?;
        let worst = demand
            .routes
            .iter()
            .filter_map(|r| self.routes.get(r))
            .filter_map(|r| match r.cache_active {
                ActivePath::Own => Some(self.path_delay(&r.path)),
                ActivePath::Backup(b) => self.routes.get(&b).map(|b| self.path_delay(&b.path)),
                ActivePath::Down => None,
            })
            .fold(Millisecs::ZERO, |acc, d| if d > acc { d } else { acc });
        Ok(worst)
    }

    /// Whether some route carrying the demand exceeds the demand's maximum latency.
    pub fn is_latency_violated(&self, id: DemandId) -> Result<bool, NetworkError> {
        let max = self.req_demand(id)?.max_latency;
        Ok(match max {
            Some(max) => self.worst_case_delay(id)? > max,
            None => false,
        })
    }

    /// Adds a route over `links` occupying `occupied_link_capacity` in each of them.
    pub fn add_route(
        &mut self,
        demand: DemandId,
        carried_traffic: f64,
        occupied_link_capacity: f64,
        links: &[LinkId],
    ) -> Result<RouteId, NetworkError> {
        let path = link_path(links);
        let occupation = vec![occupied_link_capacity; path.len()];
        self.add_service_chain(demand, carried_traffic, occupation, path)
    }

    /// Adds a route whose path may traverse resources, with the capacity it occupies in every
    /// element of the path.
    pub fn add_service_chain(
        &mut self,
        demand: DemandId,
        carried_traffic: f64,
        occupation: Vec<f64>,
        path: Vec<PathElement>,
    ) -> Result<RouteId, NetworkError> {
        let d = self.req_demand(demand)?;
        let layer = d.layer;
        self.require_routing_type(layer, RoutingType::SourceRouting)?;
        self.validate_path(d, &path)?;
        check_non_negative("carried traffic", carried_traffic)?;
        check_occupation(&path, &occupation)?;
        let id = RouteId::new(self.next_id());
        let state = RouteState {
            path: path.clone(),
            carried_traffic,
            occupation: occupation.clone(),
        };
        let route = Route {
            id,
            meta: Meta::default(),
            layer,
            demand,
            path,
            carried_traffic,
            occupation,
            initial: state,
            backups: Vec::new(),
            primary: None,
            cache_own_path_up: true,
            cache_active: ActivePath::Own,
            cache_carried_traffic: 0.0,
            cache_occupation: Vec::new(),
        };
        self.attach_route_path(id, &route.path);
        self.routes.insert(id, route);
        if let Some(d) = self.demands.get_mut(&demand) {
            d.routes.insert(id);
        }
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.routes.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    /// Adds a route carrying `injected` units of traffic at the ingress. The capacity it
    /// occupies in every element is the traffic entering it.
    pub fn add_service_chain_injecting(
        &mut self,
        demand: DemandId,
        injected: f64,
        path: Vec<PathElement>,
    ) -> Result<RouteId, NetworkError> {
        let d = self.req_demand(demand)?;
        let occupation = traffic_along(&path, injected, &d.expansion_factors);
        self.add_service_chain(demand, injected, occupation, path)
    }

    pub fn set_route_path(
        &mut self,
        id: RouteId,
        path: Vec<PathElement>,
        occupation: Vec<f64>,
    ) -> Result<(), NetworkError> {
        let carried = self.req_route(id)?.carried_traffic;
        self.set_route_path_and_carried_traffic(id, path, carried, occupation)
    }

    pub fn set_route_path_and_carried_traffic(
        &mut self,
        id: RouteId,
        path: Vec<PathElement>,
        carried_traffic: f64,
        occupation: Vec<f64>,
    ) -> Result<(), NetworkError> {
        let route = self.req_route(id)?;
        let demand = self.req_demand(route.demand)?;
        self.validate_path(demand, &path)?;
        check_non_negative("carried traffic", carried_traffic)?;
        check_occupation(&path, &occupation)?;
        let old = route.path.clone();
        self.detach_route_path(id, &old);
        self.attach_route_path(id, &path);
        if let Some(route) = self.routes.get_mut(&id) {
            route.path = path;
            route.carried_traffic = carried_traffic;
            route.occupation = occupation;
        }
        self.refresh();
        Ok(())
    }

    /// Sets the path of a route carrying `injected` units of traffic at the ingress. The
    /// capacity occupied in every element is the traffic entering it, which grows or shrinks
    /// after each resource by the demand's expansion factors.
    pub fn set_route_path_and_initially_injected_traffic(
        &mut self,
        id: RouteId,
        path: Vec<PathElement>,
        injected: f64,
    ) -> Result<(), NetworkError> {
        let route = self.req_route(id)?;
        let demand = self.req_demand(route.demand)?;
        let occupation = traffic_along(&path, injected, &demand.expansion_factors);
        self.set_route_path_and_carried_traffic(id, path, injected, occupation)
    }

    pub fn set_route_carried_traffic(
        &mut self,
        id: RouteId,
        carried_traffic: f64,
        occupation: Vec<f64>,
    ) -> Result<(), NetworkError> {
        let path = self.req_route(id)?.path.clone();
        check_non_negative("carried traffic", carried_traffic)?;
        check_occupation(&path, &occupation)?;
        if let Some(route) = self.routes.get_mut(&id) {
            route.carried_traffic = carried_traffic;
            route.occupation = occupation;
        }
        self.refresh();
        Ok(())
    }

    /// Restores the path, carried traffic and occupation the route was created with.
    pub fn revert_route_to_initial_state(&mut self, id: RouteId) -> Result<(), NetworkError> {
        let RouteState {
            path,
            carried_traffic,
            occupation,
        } = self.req_route(id)?.initial.clone();
        self.set_route_path_and_carried_traffic(id, path, carried_traffic, occupation)
    }

    /// Removes a route. Backups of a removed primary become ordinary routes.
    pub fn remove_route(&mut self, id: RouteId) -> Result<(), NetworkError> {
        self.req_route(id)?;
        self.detach_route(id);
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_route(&mut self, id: RouteId) {
        let Some(route) = self.routes.remove(&id) else {
            return;
        };
        self.detach_route_path(id, &route.path);
        if let Some(d) = self.demands.get_mut(&route.demand) {
            d.routes.remove(&id);
        }
        if let Some(layer) = self.layers.get_mut(&route.layer) {
            layer.routes.remove(&id);
        }
        if let Some(primary) = route.primary.and_then(|p| self.routes.get_mut(&p)) {
            primary.backups.retain(|&b| b != id);
        }
        for backup in &route.backups {
            if let Some(backup) = self.routes.get_mut(backup) {
                backup.primary = None;
            }
        }
    }

    pub(crate) fn attach_route_path(&mut self, id: RouteId, path: &[PathElement]) {
        for elem in path {
            match *elem {
                PathElement::Link(l) => {
                    if let Some(link) = self.links.get_mut(&l) {
                        *link.traversing_routes.entry(id).or_default() += 1;
                    }
                }
                PathElement::Resource(r) => {
                    if let Some(res) = self.resources.get_mut(&r) {
                        res.traversing_routes.insert(id);
                    }
                }
            }
        }
    }

    pub(crate) fn detach_route_path(&mut self, id: RouteId, path: &[PathElement]) {
        for elem in path {
            match *elem {
                PathElement::Link(l) => {
                    if let Some(link) = self.links.get_mut(&l) {
                        link.traversing_routes.remove(&id);
                    }
                }
                PathElement::Resource(r) => {
                    if let Some(res) = self.resources.get_mut(&r) {
                        res.traversing_routes.remove(&id);
                    }
                }
            }
        }
    }

    /// Registers `backup` as a backup of `primary`. Both must realize the same demand, the
    /// primary cannot itself be a backup and the backup cannot have backups of its own.
    pub fn add_backup_route(
        &mut self,
        primary: RouteId,
        backup: RouteId,
    ) -> Result<(), NetworkError> {
        let p = self.req_route(primary)?;
        let b = self.req_route(backup)?;
        let invalid = |reason| NetworkError::InvalidBackup {
            primary,
            backup,
            reason,
        };
        if primary == backup {
            return Err(invalid("a route cannot back up itself"));
        }
        if p.demand != b.demand {
            return Err(invalid("routes realize different demands"));
        }
        if p.is_backup_route() {
            return Err(invalid("the primary is itself a backup"));
        }
        if b.has_backup_routes() {
            return Err(invalid("the backup has backups of its own"));
        }
        if b.is_backup_route() {
            return Err(invalid("the backup already backs up a route"));
        }
        if let Some(p) = self.routes.get_mut(&primary) {
            p.backups.push(backup);
        }
        if let Some(b) = self.routes.get_mut(&backup) {
            b.primary = Some(primary);
        }
        self.refresh();
        Ok(())
    }

    /// Undoes [`add_backup_route`](Self::add_backup_route). Fails while the backup carries the
    /// primary's traffic.
    pub fn remove_backup_route(
        &mut self,
        primary: RouteId,
        backup: RouteId,
    ) -> Result<(), NetworkError> {
        let p = self.req_route(primary)?;
        self.req_route(backup)?;
        if !p.backups.contains(&backup) {
            return Err(NetworkError::NotABackup { primary, backup });
        }
        if p.cache_active == ActivePath::Backup(backup) {
            return Err(NetworkError::BackupInUse { primary, backup });
        }
        if let Some(p) = self.routes.get_mut(&primary) {
            p.backups.retain(|&b| b != backup);
        }
        if let Some(b) = self.routes.get_mut(&backup) {
            b.primary = None;
        }
        self.refresh();
        Ok(())
    }

    /// The nodes a route visits, starting at the demand's ingress.
    pub fn route_seq_nodes(&self, id: RouteId) -> Result<Vec<NodeId>, NetworkError> {
        let route = self.req_route(id)?;
        let demand = self.req_demand(route.demand)?;
        let mut nodes = vec![demand.ingress];
        for link in route.seq_links() {
            nodes.push(self.req_link(link)?.destination);
        }
        Ok(nodes)
    }

    pub fn route_length(&self, id: RouteId) -> Result<Km, NetworkError> {
        let route = self.req_route(id)?;
        route
            .seq_links()
            .map(|l| self.req_link(l).map(|l| l.length))
            .sum()
    }

    /// Propagation delay of the route's links plus the processing time of its resources.
    pub fn route_delay(&self, id: RouteId) -> Result<Millisecs, NetworkError> {
        Ok(self.path_delay(&self.req_route(id)?.path))
    }

    /// Whether the route visits some node more than once.
    pub fn route_has_loops(&self, id: RouteId) -> Result<bool, NetworkError> {
        let nodes = self.route_seq_nodes(id)?;
        let unique = nodes.iter().collect::<BTreeSet<_>>();
        Ok(unique.len() != nodes.len())
    }

    /// Routes currently carrying traffic over `elem`, either on their own path or as an active
    /// backup of another route.
    pub fn routes_carrying_over(&self, elem: PathElement) -> BTreeMap<RouteId, f64> {
        let routes = match elem {
            PathElement::Link(l) => self
                .links
                .get(&l)
                .map(|l| l.traversing_routes.keys().copied().collect::<Vec<_>>()),
            PathElement::Resource(r) => self
                .resources
                .get(&r)
                .map(|r| r.traversing_routes.iter().copied().collect()),
        };
        routes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| self.routes.get(&r))
            .filter(|r| r.cache_carried_traffic > 0.0)
            .map(|r| (r.id, r.cache_carried_traffic))
            .collect()
    }

    pub(crate) fn require_routing_type(
        &self,
        layer: LayerId,
        expected: RoutingType,
    ) -> Result<(), NetworkError> {
        if self.req_layer(layer)?.routing_type != expected {
            return Err(NetworkError::RoutingTypeMismatch { layer, expected });
        }
        Ok(())
    }

    /// Checks that `path` takes the traffic of `demand` from its ingress to its egress through
    /// its service chain without revisiting a (node, chain stage) state.
    pub(crate) fn validate_path(
        &self,
        demand: &Demand,
        path: &[PathElement],
    ) -> Result<(), NetworkError> {
        let malformed = |reason: String| NetworkError::MalformedPath {
            demand: demand.id,
            reason,
        };
        let mut cur = demand.ingress;
        let mut stage = 0;
        let mut visited = BTreeSet::from([(cur, stage)]);
        for elem in path {
            match *elem {
                PathElement::Link(id) => {
                    let link = self.req_link(id)?;
                    if link.layer != demand.layer {
                        return Err(NetworkError::WrongLayer {
                            element: id.into(),
                            expected: demand.layer,
                            found: link.layer,
                        });
                    }
                    if link.origin != cur {
                        return Err(malformed(format!("link {id} does not start at node {cur}")));
                    }
                    cur = link.destination;
                }
                PathElement::Resource(id) => {
                    let resource = self.req_resource(id)?;
                    if resource.host != cur {
                        return Err(malformed(format!("resource {id} is not at node {cur}")));
                    }
                    match demand.service_chain.get(stage) {
                        Some(ty) if *ty == resource.resource_type => stage += 1,
                        _ => return Err(NetworkError::ServiceChainMismatch { demand: demand.id }),
                    }
                }
            }
            if !visited.insert((cur, stage)) {
                return Err(NetworkError::PathLoop {
                    demand: demand.id,
                    node: cur,
                });
            }
        }
        if stage != demand.service_chain.len() {
            return Err(NetworkError::ServiceChainMismatch { demand: demand.id });
        }
        if cur != demand.egress {
            return Err(malformed(format!("path ends at node {cur}")));
        }
        Ok(())
    }
}

fn check_occupation(path: &[PathElement], occupation: &[f64]) -> Result<(), NetworkError> {
    if path.len() != occupation.len() {
        return Err(NetworkError::OccupationLength {
            expected: path.len(),
            found: occupation.len(),
        });
    }
    for &occ in occupation {
        check_non_negative("occupied capacity", occ)?;
    }
    Ok(())
}

/// The traffic entering each element of `path` when `injected` units enter at the ingress.
pub(crate) fn traffic_along(path: &[PathElement], injected: f64, factors: &[f64]) -> Vec<f64> {
    let mut traffic = injected;
    let mut stage = 0;
    path.iter()
        .map(|elem| {
            let here = traffic;
            if elem.as_resource().is_some() {
                traffic *= factors.get(stage).copied().unwrap_or(1.0);
                stage += 1;
            }
            here
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;
    use crate::units::KmPerSec;

    use super::*;

    #[test]
    fn path_must_join_endpoints() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let demand = ids.demand(0, 1);
        let res = network.add_route(demand, 1.0, 1.0, &[ids.link(0, 2)]);
        assert!(matches!(res, Err(NetworkError::MalformedPath { .. })));
        let res = network.add_route(demand, 1.0, 1.0, &[ids.link(2, 1)]);
        assert!(matches!(res, Err(NetworkError::MalformedPath { .. })));
        let res = network.add_route(demand, 1.0, 1.0, &[]);
        assert!(matches!(res, Err(NetworkError::MalformedPath { .. })));
        network.add_route(demand, 1.0, 1.0, &[ids.link(0, 2), ids.link(2, 1)])?;
        Ok(())
    }

    #[test]
    fn path_rejects_cycles() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let demand = ids.demand(0, 1);
        let path = [ids.link(0, 2), ids.link(2, 0), ids.link(0, 1)];
        let res = network.add_route(demand, 1.0, 1.0, &path);
        assert!(matches!(res, Err(NetworkError::PathLoop { .. })));
        Ok(())
    }

    #[test]
    fn path_rejects_links_of_other_layers() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let other = network.add_layer("other", "");
        let link = network.add_link(
            other,
            ids.nodes[0],
            ids.nodes[1],
            1.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        )?;
        let res = network.add_route(ids.demand(0, 1), 1.0, 1.0, &[link]);
        assert!(matches!(res, Err(NetworkError::WrongLayer { .. })));
        Ok(())
    }

    #[test]
    fn occupation_length_must_match() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let res = network.add_service_chain(
            ids.demand(0, 1),
            1.0,
            vec![1.0, 1.0],
            link_path(&[ids.link(0, 1)]),
        );
        assert!(matches!(
            res,
            Err(NetworkError::OccupationLength {
                expected: 1,
                found: 2
            })
        ));
        Ok(())
    }

    #[test]
    fn route_queries() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let route = network.add_route(
            ids.demand(0, 1),
            1.0,
            1.0,
            &[ids.link(0, 2), ids.link(2, 1)],
        )?;
        assert_eq!(
            network.route_seq_nodes(route)?,
            vec![ids.nodes[0], ids.nodes[2], ids.nodes[1]]
        );
        assert_eq!(network.route_length(route)?, Km::new(2.0));
        assert!(!network.route_has_loops(route)?);
        assert_eq!(network.route(route).context("missing route")?.number_of_hops(), 2);
        Ok(())
    }

    #[test]
    fn carried_traffic_updates_links_and_demand() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle_routed()?;
        let link = network.link(ids.link(0, 1)).context("missing link")?;
        assert_eq!(link.carried_traffic(), 1.0);
        assert_eq!(link.occupied_capacity(), 1.0);
        let demand = network.demand(ids.demand(0, 1)).context("missing demand")?;
        assert_eq!(demand.carried_traffic(), 1.0);
        assert!(!demand.is_blocking());
        Ok(())
    }

    #[test]
    fn revert_restores_initial_path() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle_routed()?;
        let route = *network
            .demand(ids.demand(0, 1))
            .context("missing demand")?
            .routes()
            .first()
            .context("missing route")?;
        network.set_route_path_and_carried_traffic(
            route,
            link_path(&[ids.link(0, 2), ids.link(2, 1)]),
            2.0,
            vec![2.0, 2.0],
        )?;
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.carried_traffic()), Some(0.0));
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.carried_traffic()), Some(3.0));
        network.revert_route_to_initial_state(route)?;
        assert_eq!(network.link(ids.link(0, 1)).map(|l| l.carried_traffic()), Some(1.0));
        assert_eq!(network.link(ids.link(0, 2)).map(|l| l.carried_traffic()), Some(1.0));
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn backup_relation_rules() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let demand = ids.demand(0, 1);
        let primary = network.add_route(demand, 1.0, 1.0, &[ids.link(0, 1)])?;
        let backup = network.add_route(demand, 0.0, 1.0, &[ids.link(0, 2), ids.link(2, 1)])?;
        let other = network.add_route(ids.demand(0, 2), 1.0, 1.0, &[ids.link(0, 2)])?;
        assert!(matches!(
            network.add_backup_route(primary, other),
            Err(NetworkError::InvalidBackup { .. })
        ));
        assert!(matches!(
            network.add_backup_route(primary, primary),
            Err(NetworkError::InvalidBackup { .. })
        ));
        network.add_backup_route(primary, backup)?;
        assert_eq!(
            network.route(primary).context("missing route")?.backup_routes(),
            &[backup]
        );
        assert_eq!(
            network.route(backup).context("missing route")?.primary_route(),
            Some(primary)
        );
        // No backups of backups, and a backup cannot be a primary.
        assert!(network.add_backup_route(backup, primary).is_err());
        network.remove_backup_route(primary, backup)?;
        assert!(matches!(
            network.remove_backup_route(primary, backup),
            Err(NetworkError::NotABackup { .. })
        ));
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn removing_primary_frees_backups() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let demand = ids.demand(0, 1);
        let primary = network.add_route(demand, 1.0, 1.0, &[ids.link(0, 1)])?;
        let backup = network.add_route(demand, 0.0, 1.0, &[ids.link(0, 2), ids.link(2, 1)])?;
        network.add_backup_route(primary, backup)?;
        network.remove_route(primary)?;
        assert!(!network.route(backup).context("missing route")?.is_backup_route());
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn latency_violation() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle_routed()?;
        let demand = ids.demand(0, 1);
        // 1 km of fiber takes 0.005 ms.
        network.set_demand_max_latency(demand, Some(Millisecs::new(0.001)))?;
        assert!(network.is_latency_violated(demand)?);
        network.set_demand_max_latency(demand, Some(Millisecs::new(1.0)))?;
        assert!(!network.is_latency_violated(demand)?);
        Ok(())
    }

    #[test]
    fn injected_traffic_follows_expansion() {
        let path = [
            PathElement::Link(LinkId::new(1)),
            PathElement::Resource(ResourceId::new(2)),
            PathElement::Link(LinkId::new(3)),
            PathElement::Resource(ResourceId::new(4)),
            PathElement::Link(LinkId::new(5)),
        ];
        let traffic = traffic_along(&path, 10.0, &[0.5, 3.0]);
        assert_eq!(traffic, vec![10.0, 10.0, 5.0, 5.0, 15.0]);
    }

    #[test]
    fn injected_chain_occupies_expanded_traffic() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        network.remove_route(ids.via_firewall)?;
        network.set_demand_service_chain(ids.fw_demand, vec!["FW".into()], vec![2.0])?;
        let path = vec![
            PathElement::Link(ids.link(0, 1)),
            PathElement::Resource(ids.firewall),
            PathElement::Link(ids.link(1, 2)),
        ];
        let route = network.add_service_chain_injecting(ids.fw_demand, 1.5, path)?;
        let route = network.route(route).context("missing route")?;
        assert_eq!(route.occupied_capacity(), &[1.5, 1.5, 3.0]);
        let last = network.link(ids.link(1, 2)).context("missing link")?;
        assert_eq!(last.carried_traffic(), 3.0);
        Ok(())
    }
}
