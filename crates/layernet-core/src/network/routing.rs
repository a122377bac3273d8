//! Routing types, hop-by-hop forwarding rules and the conversion between both routing models.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use ordered_float::OrderedFloat;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::network::types::*;
use crate::network::{Network, NetworkError};

/// Fractions summed at a node may exceed 1 by this much.
const FRACTION_TOLERANCE: f64 = 1e-9;

impl Network {
    /// Switches a layer between source routing and hop-by-hop routing. The traffic each link
    /// carries when nothing fails is preserved.
    ///
    /// Going hop by hop, every demand gets, for each link, the fraction of the traffic entering
    /// the link's origin that leaves on it, and its routes are removed. Going back, each
    /// demand's link flows are decomposed into loopless paths, widest bottleneck first, with one
    /// route per path. Flow circulating on a cycle is merged into two of those paths. When that
    /// is not possible the conversion fails and nothing changes.
    pub fn set_routing_type(
        &mut self,
        layer: LayerId,
        routing_type: RoutingType,
    ) -> Result<(), NetworkError> {
        let current = self.req_layer(layer)?.routing_type;
        if current == routing_type {
            return Ok(());
        }
        match routing_type {
            RoutingType::HopByHopRouting => self.convert_to_hop_by_hop(layer)?,
            RoutingType::SourceRouting => self.convert_to_source_routing(layer)?,
        }
        log::debug!("layer {layer} now uses {routing_type}");
        self.refresh();
        Ok(())
    }

    fn convert_to_hop_by_hop(&mut self, layer: LayerId) -> Result<(), NetworkError> {
        let demands = self.demands_in(layer).collect::<Vec<_>>();
        if let Some(d) = demands.iter().find(|d| d.is_service_chain()) {
            return Err(NetworkError::ServiceChainHopByHop(d.id));
        }
        let rules = demands
            .iter()
            .map(|d| (d.id, self.source_routing_fractions(d)))
            .filter(|(_, rules)| !rules.is_empty())
            .collect::<BTreeMap<_, _>>();
        let routes = self.req_layer(layer)?.routes.iter().copied().collect::<Vec<_>>();
        for route in routes {
            self.detach_route(route);
        }
        let l = self.req_layer_mut(layer)?;
        l.forwarding_rules = rules;
        l.routing_type = RoutingType::HopByHopRouting;
        Ok(())
    }

    fn convert_to_source_routing(&mut self, layer: LayerId) -> Result<(), NetworkError> {
        let l = self.req_layer(layer)?;
        let empty = BTreeMap::new();
        let mut paths = Vec::new();
        for demand in self.demands_in(layer) {
            let rules = l.forwarding_rules.get(&demand.id).unwrap_or(&empty);
            let (flows, _) =
                self.hop_by_hop_flows(demand, rules, demand.cache_offered_traffic, false);
            for (links, traffic) in self.decompose_flows(demand, flows)? {
                paths.push((demand.id, links, traffic));
            }
        }
        let l = self.req_layer_mut(layer)?;
        l.forwarding_rules.clear();
        l.cache_hop_by_hop_flows.clear();
        l.routing_type = RoutingType::SourceRouting;
        for (demand, links, traffic) in paths {
            self.add_route(demand, traffic, traffic, &links)?;
        }
        Ok(())
    }

    // Fractions reproducing the link flows of a demand's routes when nothing fails.
    fn source_routing_fractions(&self, demand: &Demand) -> BTreeMap<LinkId, f64> {
        let mut flows = BTreeMap::<LinkId, f64>::new();
        for route in demand.routes.iter().filter_map(|r| self.routes.get(r)) {
            for link in route.seq_links() {
                *flows.entry(link).or_default() += route.carried_traffic;
            }
        }
        flows.retain(|_, f| *f > 0.0);
        let mut entering = BTreeMap::<NodeId, f64>::new();
        let mut leaving_ingress = 0.0;
        for (l, &f) in &flows {
            if let Some(link) = self.links.get(l) {
                *entering.entry(link.destination).or_default() += f;
                if link.origin == demand.ingress {
                    leaving_ingress += f;
                }
            }
        }
        entering.insert(
            demand.ingress,
            f64::max(demand.cache_offered_traffic, leaving_ingress),
        );
        flows
            .into_iter()
            .filter_map(|(l, f)| {
                let origin = self.links.get(&l)?.origin;
                let total = entering.get(&origin).copied().unwrap_or(0.0);
                (total > 0.0).then(|| (l, (f / total).min(1.0)))
            })
            .collect()
    }

    // Splits link flows into loopless ingress-egress paths, largest bottleneck first. Flow left
    // on a cycle is rerouted over two paths through different nodes u and w of the cycle: one
    // turns at u along the cycle to w, the other at w along the rest of the cycle back to u.
    fn decompose_flows(
        &self,
        demand: &Demand,
        mut flows: BTreeMap<LinkId, f64>,
    ) -> Result<Vec<(Vec<LinkId>, f64)>, NetworkError> {
        let eps = 1e-9 * demand.cache_offered_traffic.max(1.0);
        let mut paths = Vec::new();
        while let Some((links, bottleneck)) = self.widest_path(demand, &flows, eps) {
            for l in &links {
                if let Some(f) = flows.get_mut(l) {
                    *f -= bottleneck;
                }
            }
            paths.push((links, bottleneck));
        }
        while let Some((cycle, amount)) = self.residual_cycle(&flows, eps) {
            for l in &cycle {
                if let Some(f) = flows.get_mut(l) {
                    *f -= amount;
                }
            }
            let mut left = amount;
            while left > eps {
                let Some((i, j, p, q)) = self.cross_over(demand, &paths, &cycle, eps) else {
                    return Err(NetworkError::CirculatingFlow { demand: demand.id });
                };
                let x = left.min(paths[i].1).min(paths[j].1);
                paths[i].1 -= x;
                paths[j].1 -= x;
                paths.push((p, x));
                paths.push((q, x));
                left -= x;
            }
            paths.retain(|(_, traffic)| *traffic > eps);
        }
        Ok(paths)
    }

    // A cycle of links with flow above `eps`, and the smallest flow on it.
    fn residual_cycle(
        &self,
        flows: &BTreeMap<LinkId, f64>,
        eps: f64,
    ) -> Option<(Vec<LinkId>, f64)> {
        let mut g = DiGraph::<NodeId, LinkId>::new();
        let mut idx = FxHashMap::default();
        for (&l, &f) in flows {
            if f <= eps {
                continue;
            }
            let link = self.links.get(&l)?;
            let a = *idx
                .entry(link.origin)
                .or_insert_with(|| g.add_node(link.origin));
            let b = *idx
                .entry(link.destination)
                .or_insert_with(|| g.add_node(link.destination));
            g.add_edge(a, b, l);
        }
        let component = petgraph::algo::tarjan_scc(&g)
            .into_iter()
            .find(|c| c.len() > 1)?;
        let inside = component.iter().copied().collect::<BTreeSet<_>>();
        // Every node of the component has a successor in it, so the walk closes a cycle.
        let mut position = FxHashMap::default();
        let mut walk = Vec::new();
        let mut cur = component[0];
        while !position.contains_key(&cur) {
            position.insert(cur, walk.len());
            let e = g.edges(cur).find(|e| inside.contains(&e.target()))?;
            walk.push(*e.weight());
            cur = e.target();
        }
        let cycle = walk.split_off(*position.get(&cur)?);
        let amount = cycle
            .iter()
            .map(|l| flows.get(l).copied().unwrap_or(0.0))
            .fold(f64::INFINITY, f64::min);
        Some((cycle, amount))
    }

    // Two paths crossed over `cycle`, both loopless, and the indices of the paths they replace.
    fn cross_over(
        &self,
        demand: &Demand,
        paths: &[(Vec<LinkId>, f64)],
        cycle: &[LinkId],
        eps: f64,
    ) -> Option<(usize, usize, Vec<LinkId>, Vec<LinkId>)> {
        let cycle_nodes = cycle
            .iter()
            .map(|l| self.links.get(l).map(|l| l.origin))
            .collect::<Option<Vec<_>>>()?;
        let n = cycle.len();
        // Cycle links from position `from` up to, not including, position `to`.
        let arc = |from: usize, to: usize| {
            let len = (to + n - from) % n;
            (0..len).map(|k| cycle[(from + k) % n]).collect::<Vec<_>>()
        };
        let nodes_of = paths
            .iter()
            .map(|(links, _)| self.nodes_along(demand.ingress, links))
            .collect::<Option<Vec<_>>>()?;
        for (i, (pi, ti)) in paths.iter().enumerate() {
            for (j, (pj, tj)) in paths.iter().enumerate() {
                if i == j || *ti <= eps || *tj <= eps {
                    continue;
                }
                for (ku, u) in cycle_nodes.iter().enumerate() {
                    let Some(at_u) = nodes_of[i].iter().position(|n| n == u) else {
                        continue;
                    };
                    for (kw, w) in cycle_nodes.iter().enumerate() {
                        if kw == ku {
                            continue;
                        }
                        let Some(at_w) = nodes_of[j].iter().position(|n| n == w) else {
                            continue;
                        };
                        let p = [&pi[..at_u], arc(ku, kw).as_slice(), &pj[at_w..]].concat();
                        let q = [&pj[..at_w], arc(kw, ku).as_slice(), &pi[at_u..]].concat();
                        let ingress = demand.ingress;
                        if self.is_loopless(ingress, &p) && self.is_loopless(ingress, &q) {
                            return Some((i, j, p, q));
                        }
                    }
                }
            }
        }
        None
    }

    fn nodes_along(&self, start: NodeId, links: &[LinkId]) -> Option<Vec<NodeId>> {
        let mut nodes = vec![start];
        for l in links {
            nodes.push(self.links.get(l)?.destination);
        }
        Some(nodes)
    }

    fn is_loopless(&self, start: NodeId, links: &[LinkId]) -> bool {
        self.nodes_along(start, links).map_or(false, |nodes| {
            let distinct = nodes.iter().collect::<BTreeSet<_>>();
            distinct.len() == nodes.len()
        })
    }

    fn widest_path(
        &self,
        demand: &Demand,
        flows: &BTreeMap<LinkId, f64>,
        eps: f64,
    ) -> Option<(Vec<LinkId>, f64)> {
        let mut out = BTreeMap::<NodeId, Vec<(LinkId, NodeId, f64)>>::new();
        for (&l, &f) in flows {
            if f > eps {
                let link = self.links.get(&l)?;
                out.entry(link.origin)
                    .or_default()
                    .push((l, link.destination, f));
            }
        }
        let mut best = BTreeMap::from([(demand.ingress, f64::INFINITY)]);
        let mut pred = BTreeMap::<NodeId, LinkId>::new();
        let mut done = BTreeSet::new();
        let mut heap = BinaryHeap::from([(OrderedFloat(f64::INFINITY), demand.ingress)]);
        while let Some((OrderedFloat(width), node)) = heap.pop() {
            if !done.insert(node) {
                continue;
            }
            if node == demand.egress {
                break;
            }
            for &(l, next, f) in out.get(&node).into_iter().flatten() {
                let w = width.min(f);
                if !done.contains(&next) && best.get(&next).map_or(true, |&b| w > b) {
                    best.insert(next, w);
                    pred.insert(next, l);
                    heap.push((OrderedFloat(w), next));
                }
            }
        }
        let width = *best.get(&demand.egress)?;
        let mut links = Vec::new();
        let mut cur = demand.egress;
        while cur != demand.ingress {
            let l = *pred.get(&cur)?;
            links.push(l);
            cur = self.links.get(&l)?.origin;
        }
        links.reverse();
        Some((links, width))
    }

    /// Propagates `offered` units of traffic from the demand's ingress through forwarding rules.
    /// Returns the flow over every rule link and the traffic reaching the egress. With
    /// `respect_failures`, traffic sent over a down link is lost. Traffic sent into a cycle of
    /// rules it can never leave is lost too: it is counted on the link that enters the cycle
    /// and nowhere after.
    pub(crate) fn hop_by_hop_flows(
        &self,
        demand: &Demand,
        rules: &BTreeMap<LinkId, f64>,
        offered: f64,
        respect_failures: bool,
    ) -> (BTreeMap<LinkId, f64>, f64) {
        let mut g = DiGraph::<NodeId, (LinkId, f64)>::new();
        let mut idx = FxHashMap::default();
        for (&l, &fraction) in rules {
            let Some(link) = self.links.get(&l) else {
                continue;
            };
            if fraction <= 0.0 {
                continue;
            }
            let a = *idx
                .entry(link.origin)
                .or_insert_with(|| g.add_node(link.origin));
            let b = *idx
                .entry(link.destination)
                .or_insert_with(|| g.add_node(link.destination));
            let usable = !respect_failures || link.cache_up;
            g.add_edge(a, b, (l, if usable { fraction } else { 0.0 }));
        }
        let Some(&src) = idx.get(&demand.ingress) else {
            return (BTreeMap::new(), 0.0);
        };
        let mut base = vec![0.0; g.node_count()];
        base[src.index()] = offered;
        let inflow = match petgraph::algo::toposort(&g, None) {
            Ok(order) => {
                let mut inflow = base;
                for n in order {
                    let x = inflow[n.index()];
                    for e in g.edges(n) {
                        inflow[e.target().index()] += x * e.weight().1;
                    }
                }
                inflow
            }
            Err(_) => cyclic_inflow(&g, &base).unwrap_or_else(|| {
                log::warn!("flows of demand {} have no unique solution", demand.id);
                base.clone()
            }),
        };
        let flows = g
            .edge_references()
            .map(|e| {
                let (l, fraction) = *e.weight();
                (l, inflow[e.source().index()] * fraction)
            })
            .collect();
        let at_egress = idx
            .get(&demand.egress)
            .map_or(0.0, |i| inflow[i.index()]);
        (flows, at_egress)
    }

    /// Sets the fraction of the demand's traffic at the link's origin that leaves on the link.
    /// A fraction of 0 removes the rule.
    pub fn set_forwarding_rule(
        &mut self,
        demand: DemandId,
        link: LinkId,
        fraction: f64,
    ) -> Result<(), NetworkError> {
        let d = self.req_demand(demand)?;
        self.require_routing_type(d.layer, RoutingType::HopByHopRouting)?;
        let mut rules = self
            .req_layer(d.layer)?
            .forwarding_rules
            .get(&demand)
            .cloned()
            .unwrap_or_default();
        rules.remove(&link);
        self.validate_rule(d, &rules, link, fraction)?;
        if fraction > 0.0 {
            rules.insert(link, fraction);
        }
        self.check_fraction_sums(d, &rules)?;
        self.check_rules_reachable(d, &rules)?;
        let layer = d.layer;
        self.req_layer_mut(layer)?
            .forwarding_rules
            .insert(demand, rules);
        self.refresh();
        Ok(())
    }

    /// Replaces all forwarding rules of a demand.
    pub fn set_forwarding_rules(
        &mut self,
        demand: DemandId,
        rules: BTreeMap<LinkId, f64>,
    ) -> Result<(), NetworkError> {
        let d = self.req_demand(demand)?;
        self.require_routing_type(d.layer, RoutingType::HopByHopRouting)?;
        let mut valid = BTreeMap::new();
        for (&link, &fraction) in &rules {
            self.validate_rule(d, &valid, link, fraction)?;
            if fraction > 0.0 {
                valid.insert(link, fraction);
            }
        }
        self.check_fraction_sums(d, &valid)?;
        self.check_rules_reachable(d, &valid)?;
        let layer = d.layer;
        self.req_layer_mut(layer)?
            .forwarding_rules
            .insert(demand, valid);
        self.refresh();
        Ok(())
    }

    pub fn remove_forwarding_rules(&mut self, demand: DemandId) -> Result<(), NetworkError> {
        let layer = self.req_demand(demand)?.layer;
        self.req_layer_mut(layer)?.forwarding_rules.remove(&demand);
        self.refresh();
        Ok(())
    }

    fn validate_rule(
        &self,
        demand: &Demand,
        rules: &BTreeMap<LinkId, f64>,
        link: LinkId,
        fraction: f64,
    ) -> Result<(), NetworkError> {
        let invalid = |reason| NetworkError::InvalidForwardingRule {
            demand: demand.id,
            link,
            reason,
        };
        let l = self.req_link(link)?;
        if l.layer != demand.layer {
            return Err(NetworkError::WrongLayer {
                element: link.into(),
                expected: demand.layer,
                found: l.layer,
            });
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid("the fraction is not in [0, 1]"));
        }
        if fraction > 0.0 && l.origin == demand.egress {
            return Err(invalid("the link leaves the egress node"));
        }
        if rules.contains_key(&link) {
            return Err(invalid("duplicate rule"));
        }
        Ok(())
    }

    fn check_fraction_sums(
        &self,
        demand: &Demand,
        rules: &BTreeMap<LinkId, f64>,
    ) -> Result<(), NetworkError> {
        let mut sums = BTreeMap::<NodeId, f64>::new();
        for (l, &fraction) in rules {
            let origin = self.req_link(*l)?.origin;
            *sums.entry(origin).or_default() += fraction;
        }
        match sums.into_iter().find(|&(_, s)| s > 1.0 + FRACTION_TOLERANCE) {
            Some((node, _)) => Err(NetworkError::FractionSumExceeded {
                demand: demand.id,
                node,
            }),
            None => Ok(()),
        }
    }

    // Every rule must start at a node the demand's traffic reaches.
    fn check_rules_reachable(
        &self,
        demand: &Demand,
        rules: &BTreeMap<LinkId, f64>,
    ) -> Result<(), NetworkError> {
        let reached = self.reached_by_rules(demand, rules);
        for &link in rules.keys() {
            if !reached.contains(&self.req_link(link)?.origin) {
                return Err(NetworkError::InvalidForwardingRule {
                    demand: demand.id,
                    link,
                    reason: "the link starts at a node the demand's traffic does not reach",
                });
            }
        }
        Ok(())
    }

    // Nodes the demand's traffic reaches from its ingress through positive rules.
    fn reached_by_rules(&self, demand: &Demand, rules: &BTreeMap<LinkId, f64>) -> BTreeSet<NodeId> {
        let mut out = BTreeMap::<NodeId, Vec<NodeId>>::new();
        for (l, &fraction) in rules {
            if let Some(link) = self.links.get(l).filter(|_| fraction > 0.0) {
                out.entry(link.origin).or_default().push(link.destination);
            }
        }
        let mut reached = BTreeSet::from([demand.ingress]);
        let mut stack = vec![demand.ingress];
        while let Some(n) = stack.pop() {
            for &next in out.get(&n).into_iter().flatten() {
                if reached.insert(next) {
                    stack.push(next);
                }
            }
        }
        reached
    }

    /// Current flow of a hop-by-hop routed demand over each link.
    pub fn hop_by_hop_link_flows(&self, demand: DemandId) -> Result<BTreeMap<LinkId, f64>, NetworkError> {
        let d = self.req_demand(demand)?;
        Ok(self
            .req_layer(d.layer)?
            .cache_hop_by_hop_flows
            .get(&demand)
            .cloned()
            .unwrap_or_default())
    }

    /// For every demand of the layer and every link, the fraction of the demand's traffic at the
    /// link's origin that leaves on it. Source-routed layers derive it from their routes.
    pub fn matrix_demand_based_forwarding_rules(
        &self,
        layer: LayerId,
    ) -> Result<BTreeMap<(DemandId, LinkId), f64>, NetworkError> {
        let l = self.req_layer(layer)?;
        let mut matrix = BTreeMap::new();
        for demand in self.demands_in(layer) {
            let rules = match l.routing_type {
                RoutingType::HopByHopRouting => l
                    .forwarding_rules
                    .get(&demand.id)
                    .cloned()
                    .unwrap_or_default(),
                RoutingType::SourceRouting => self.source_routing_fractions(demand),
            };
            matrix.extend(rules.into_iter().map(|(link, f)| ((demand.id, link), f)));
        }
        Ok(matrix)
    }

    /// Whether some route of the layer visits a node twice or, in a hop-by-hop layer, the
    /// forwarding rules of some demand form a cycle.
    pub fn has_unicast_routing_loops(&self, layer: LayerId) -> Result<bool, NetworkError> {
        let l = self.req_layer(layer)?;
        match l.routing_type {
            RoutingType::SourceRouting => {
                for &route in &l.routes {
                    if self.route_has_loops(route)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RoutingType::HopByHopRouting => {
                for rules in l.forwarding_rules.values() {
                    let mut g = DiGraph::<NodeId, ()>::new();
                    let mut idx = FxHashMap::default();
                    for (l, &fraction) in rules {
                        let Some(link) = self.links.get(l).filter(|_| fraction > 0.0) else {
                            continue;
                        };
                        let a = *idx
                            .entry(link.origin)
                            .or_insert_with(|| g.add_node(link.origin));
                        let b = *idx
                            .entry(link.destination)
                            .or_insert_with(|| g.add_node(link.destination));
                        g.add_edge(a, b, ());
                    }
                    if petgraph::algo::is_cyclic_directed(&g) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

// Inflow of every node when the rules form cycles: x = base + F^T x, where traffic entering a
// closed set of nodes (one from which no traffic ever leaves or stops) is dropped.
fn cyclic_inflow(g: &DiGraph<NodeId, (LinkId, f64)>, base: &[f64]) -> Option<Vec<f64>> {
    let n = g.node_count();
    let trapped = trapped_nodes(g);
    // Rows of [I - F^T | base].
    let mut a = vec![vec![0.0; n + 1]; n];
    for (i, row) in a.iter_mut().enumerate() {
        row[i] = 1.0;
        row[n] = base[i];
    }
    for e in g.edge_references() {
        let (to, from) = (e.target().index(), e.source().index());
        if !trapped[to] {
            a[to][from] -= e.weight().1;
        }
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        let pivot_row = a[col].clone();
        for (r, row) in a.iter_mut().enumerate() {
            if r == col || row[col] == 0.0 {
                continue;
            }
            let factor = row[col] / pivot_row[col];
            for (x, p) in row.iter_mut().zip(&pivot_row).skip(col) {
                *x -= factor * p;
            }
        }
    }
    Some(a.iter().enumerate().map(|(i, row)| row[n] / row[i]).collect())
}

// Nodes whose traffic circulates forever: every node they reach forwards all of it.
fn trapped_nodes(g: &DiGraph<NodeId, (LinkId, f64)>) -> Vec<bool> {
    let mut out_sum = vec![0.0; g.node_count()];
    for e in g.edge_references() {
        out_sum[e.source().index()] += e.weight().1;
    }
    let mut leaks = out_sum
        .iter()
        .map(|&s| s < 1.0 - FRACTION_TOLERANCE)
        .collect::<Vec<_>>();
    let mut stack = g
        .node_indices()
        .filter(|n| leaks[n.index()])
        .collect::<Vec<_>>();
    while let Some(n) = stack.pop() {
        for e in g.edges_directed(n, petgraph::Direction::Incoming) {
            let from = e.source();
            if e.weight().1 > 0.0 && !leaks[from.index()] {
                leaks[from.index()] = true;
                stack.push(from);
            }
        }
    }
    leaks.into_iter().map(|l| !l).collect()
}
