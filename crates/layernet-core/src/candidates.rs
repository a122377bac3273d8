//! Constrained candidate paths, 1+1 path pairs, service chains and multicast trees.
//!
//! Every search is a pure function of a `&Network`. The work for different node pairs or
//! demands is spread over the rayon pool.

mod ksp;
mod multicast;

use std::collections::{BTreeMap, BTreeSet};

use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::opts::{CandidatePathOpts, ServiceChainOpts};
use crate::units::{Km, Millisecs};
use crate::utils;

use ksp::{State, StateGraph};

pub use multicast::CandidateTree;

/// A candidate path with the figures its bounds were checked against.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CandidatePath {
    pub path: Vec<PathElement>,
    pub cost: f64,
    pub length: Km,
    pub hops: usize,
    pub delay: Millisecs,
}

impl CandidatePath {
    pub fn links(&self) -> Vec<LinkId> {
        self.path.iter().filter_map(|e| e.as_link()).collect()
    }

    pub fn resources(&self) -> Vec<ResourceId> {
        self.path.iter().filter_map(|e| e.as_resource()).collect()
    }
}

/// How disjoint the two paths of a 1+1 pair must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disjointness {
    /// No common link.
    LinkDisjoint,
    /// No common link and no common node other than the end nodes.
    LinkAndNodeDisjoint,
    /// Link and node disjoint, and no SRG holds elements of both paths.
    SrgDisjoint,
}

impl Network {
    /// Up to `opts.k` loopless paths for each node pair, by ascending cost.
    pub fn candidate_paths_per_node_pair(
        &self,
        layer: LayerId,
        opts: &CandidatePathOpts,
        pairs: &[(NodeId, NodeId)],
    ) -> Result<BTreeMap<(NodeId, NodeId), Vec<CandidatePath>>, NetworkError> {
        for &(a, b) in pairs {
            self.req_node(a)?;
            self.req_node(b)?;
        }
        let graph = self.state_graph(layer, &[], opts, &ServiceChainOpts::default())?;
        let found = utils::par_chunks(pairs, |chunk| {
            chunk
                .iter()
                .map(|&(a, b)| {
                    let paths = if a == b {
                        Vec::new()
                    } else {
                        self.k_best(&graph, (a, 0), (b, 0), opts)
                    };
                    ((a, b), paths)
                })
                .collect()
        });
        Ok(found.collect())
    }

    /// Up to `opts.k` loopless paths of links for each demand of the layer, by ascending cost.
    /// Service chains are ignored here, see
    /// [`candidate_service_chains_per_demand`](Self::candidate_service_chains_per_demand).
    pub fn candidate_paths_per_demand(
        &self,
        layer: LayerId,
        opts: &CandidatePathOpts,
    ) -> Result<BTreeMap<DemandId, Vec<CandidatePath>>, NetworkError> {
        let graph = self.state_graph(layer, &[], opts, &ServiceChainOpts::default())?;
        let demands = self.demands_in(layer).collect::<Vec<_>>();
        let found = utils::par_chunks(&demands, |chunk| {
            chunk
                .iter()
                .map(|d| (d.id, self.k_best(&graph, (d.ingress, 0), (d.egress, 0), opts)))
                .collect()
        });
        Ok(found.collect())
    }

    /// Up to `opts.k` candidate paths for each demand of the layer that traverse, in order, one
    /// resource of each type of the demand's service chain.
    pub fn candidate_service_chains_per_demand(
        &self,
        layer: LayerId,
        opts: &CandidatePathOpts,
        chain_opts: &ServiceChainOpts,
    ) -> Result<BTreeMap<DemandId, Vec<CandidatePath>>, NetworkError> {
        for &cost in chain_opts.resource_costs.values() {
            if cost.is_nan() || cost < 0.0 {
                return Err(NetworkError::InvalidValue {
                    what: "resource cost",
                    value: cost,
                });
            }
        }
        let mut graphs = BTreeMap::<&[String], StateGraph>::new();
        for d in self.demands_in(layer) {
            if !graphs.contains_key(d.service_chain.as_slice()) {
                let graph = self.state_graph(layer, &d.service_chain, opts, chain_opts)?;
                graphs.insert(d.service_chain.as_slice(), graph);
            }
        }
        let demands = self.demands_in(layer).collect::<Vec<_>>();
        let found = utils::par_chunks(&demands, |chunk| {
            chunk
                .iter()
                .map(|d| {
                    let stages = d.service_chain.len();
                    let paths = graphs
                        .get(d.service_chain.as_slice())
                        .map(|g| self.k_best(g, (d.ingress, 0), (d.egress, stages), opts))
                        .unwrap_or_default();
                    (d.id, paths)
                })
                .collect()
        });
        Ok(found.collect())
    }

    /// Every pair of candidates of the same key that satisfies `disjointness`, the first path
    /// of each pair being the cheaper one. Keys without such a pair map to an empty list.
    pub fn candidate_11_path_pairs<K: Ord + Clone>(
        &self,
        candidates: &BTreeMap<K, Vec<CandidatePath>>,
        disjointness: Disjointness,
    ) -> BTreeMap<K, Vec<(CandidatePath, CandidatePath)>> {
        candidates
            .iter()
            .map(|(key, paths)| {
                let mut pairs = Vec::new();
                for (i, p) in paths.iter().enumerate() {
                    for q in &paths[i + 1..] {
                        if self.are_disjoint(p, q, disjointness) {
                            pairs.push((p.clone(), q.clone()));
                        }
                    }
                }
                (key.clone(), pairs)
            })
            .collect()
    }

    fn are_disjoint(&self, p: &CandidatePath, q: &CandidatePath, level: Disjointness) -> bool {
        let p_links = p.links().into_iter().collect::<BTreeSet<_>>();
        if q.links().iter().any(|l| p_links.contains(l)) {
            return false;
        }
        if level == Disjointness::LinkDisjoint {
            return true;
        }
        let p_nodes = self.inner_nodes(&p.links());
        let q_nodes = self.inner_nodes(&q.links());
        if !p_nodes.is_disjoint(&q_nodes) {
            return false;
        }
        if level == Disjointness::LinkAndNodeDisjoint {
            return true;
        }
        self.srgs_along(&p.links(), &p_nodes)
            .is_disjoint(&self.srgs_along(&q.links(), &q_nodes))
    }

    // Nodes a path of links visits, end nodes excluded.
    fn inner_nodes(&self, links: &[LinkId]) -> BTreeSet<NodeId> {
        let n = links.len();
        links
            .iter()
            .take(n.saturating_sub(1))
            .filter_map(|l| self.links.get(l))
            .map(|l| l.destination)
            .collect()
    }

    fn srgs_along(&self, links: &[LinkId], nodes: &BTreeSet<NodeId>) -> BTreeSet<SrgId> {
        let via_links = links
            .iter()
            .filter_map(|l| self.links.get(l))
            .flat_map(|l| l.srgs.iter().copied());
        let via_nodes = nodes
            .iter()
            .filter_map(|n| self.nodes.get(n))
            .flat_map(|n| n.srgs.iter().copied());
        via_links.chain(via_nodes).collect()
    }

    // Stage `s` states are connected by the layer's links; a resource of type `chain[s]`
    // moves from stage `s` to `s + 1` on its host.
    pub(crate) fn state_graph(
        &self,
        layer: LayerId,
        chain: &[String],
        opts: &CandidatePathOpts,
        chain_opts: &ServiceChainOpts,
    ) -> Result<StateGraph, NetworkError> {
        self.req_layer(layer)?;
        for &cost in opts.link_costs.values() {
            if cost.is_nan() || cost < 0.0 {
                return Err(NetworkError::InvalidValue {
                    what: "link cost",
                    value: cost,
                });
            }
        }
        let mut graph = StateGraph::new();
        let usable_links = self
            .links_in(layer)
            .filter(|l| !opts.skip_down_links || l.cache_up)
            .collect::<Vec<_>>();
        for stage in 0..=chain.len() {
            for l in &usable_links {
                graph.add_arc(
                    (l.origin, stage),
                    (l.destination, stage),
                    PathElement::Link(l.id),
                    opts.link_cost(l.id),
                );
            }
        }
        for (stage, ty) in chain.iter().enumerate() {
            for r in self.resources_of_type(ty) {
                let host_up = self.nodes.get(&r.host).map_or(false, |n| n.is_up());
                if (opts.skip_down_links && !host_up) || !chain_opts.may_host(ty, r.host) {
                    continue;
                }
                graph.add_arc(
                    (r.host, stage),
                    (r.host, stage + 1),
                    PathElement::Resource(r.id),
                    chain_opts.resource_cost(r.id),
                );
            }
        }
        Ok(graph)
    }

    // Walks the paths by ascending cost and keeps the admissible ones.
    pub(crate) fn k_best(
        &self,
        graph: &StateGraph,
        source: State,
        target: State,
        opts: &CandidatePathOpts,
    ) -> Vec<CandidatePath> {
        let mut found = Vec::new();
        if opts.k == 0 {
            return found;
        }
        let mut bound = opts.max_route_cost;
        for (arcs, cost) in graph.paths(source, target) {
            if bound.map_or(false, |b| exceeds(cost, b)) {
                break;
            }
            let candidate = self.candidate_path(graph, &arcs, cost);
            if !self.is_admissible(&candidate, opts) {
                continue;
            }
            if found.is_empty() {
                if let Some(relative) = opts.relative_cost_bound(cost) {
                    bound = Some(bound.map_or(relative, |b| b.min(relative)));
                }
            }
            found.push(candidate);
            if found.len() == opts.k {
                break;
            }
        }
        found
    }

    fn candidate_path(&self, graph: &StateGraph, arcs: &[usize], cost: f64) -> CandidatePath {
        let path = arcs.iter().map(|&a| graph.arc(a).elem).collect::<Vec<_>>();
        let links = path
            .iter()
            .filter_map(|e| e.as_link())
            .filter_map(|l| self.links.get(&l))
            .collect::<Vec<_>>();
        CandidatePath {
            cost,
            length: links.iter().map(|l| l.length).sum(),
            hops: links.len(),
            delay: self.path_delay(&path),
            path,
        }
    }

    fn is_admissible(&self, candidate: &CandidatePath, opts: &CandidatePathOpts) -> bool {
        let too_long = opts
            .max_length
            .map_or(false, |m| exceeds(candidate.length.into_f64(), m.into_f64()));
        let too_many_hops = opts.max_hops.map_or(false, |m| candidate.hops > m);
        let too_slow = opts
            .max_propagation_delay
            .map_or(false, |m| exceeds(candidate.delay.into_f64(), m.into_f64()));
        !(too_long || too_many_hops || too_slow)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    fn node_names(network: &Network, path: &CandidatePath) -> String {
        let links = path.links();
        let first = links
            .first()
            .and_then(|l| network.link(*l))
            .map(|l| l.origin());
        first
            .into_iter()
            .chain(links.iter().filter_map(|l| network.link(*l)).map(|l| l.destination()))
            .filter_map(|n| network.node(n))
            .map(|n| n.name().to_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn triangle_k_shortest() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle()?;
        let opts = CandidatePathOpts::builder().k(1).build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        assert_eq!(paths.len(), 6);
        for (i, j) in testing::PAIRS {
            let found = paths.get(&ids.demand(i, j)).context("missing demand")?;
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].links(), vec![ids.link(i, j)]);
        }

        let opts = CandidatePathOpts::builder().k(2).build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        let names = paths
            .iter()
            .map(|(d, found)| {
                let d = network.demand(*d).context("missing demand")?;
                let ingress = network.node(d.ingress()).context("missing node")?;
                let egress = network.node(d.egress()).context("missing node")?;
                let key = format!("{}-{}", ingress.name(), egress.name());
                let found = found.iter().map(|p| node_names(&network, p)).collect::<Vec<_>>();
                Ok((key, found))
            })
            .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
        insta::assert_yaml_snapshot!(names, @r###"
        ---
        a-b:
          - a b
          - a c b
        a-c:
          - a c
          - a b c
        b-a:
          - b a
          - b c a
        b-c:
          - b c
          - b a c
        c-a:
          - c a
          - c b a
        c-b:
          - c b
          - c a b
        "###);
        Ok(())
    }

    #[test]
    fn triangle_bounds() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle()?;
        let opts = CandidatePathOpts::builder()
            .k(3)
            .max_length(Km::new(0.5))
            .build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        assert!(paths.values().all(|p| p.is_empty()));

        let opts = CandidatePathOpts::builder()
            .k(3)
            .max_route_cost_factor_vs_shortest(1.0)
            .build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        for (i, j) in testing::PAIRS {
            let found = paths.get(&ids.demand(i, j)).context("missing demand")?;
            let links = found.iter().map(|p| p.links()).collect::<Vec<_>>();
            assert_eq!(links, vec![vec![ids.link(i, j)]]);
        }

        let opts = CandidatePathOpts::builder().k(3).max_hops(1).build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        assert!(paths.values().all(|p| p.len() == 1));
        Ok(())
    }

    #[test]
    fn costs_rank_paths() -> anyhow::Result<()> {
        let (network, ids) = testing::triangle()?;
        let opts = CandidatePathOpts::builder()
            .k(2)
            .link_costs([(ids.link(0, 1), 5.0)].into_iter().collect())
            .build();
        let pair = (ids.nodes[0], ids.nodes[1]);
        let paths = network.candidate_paths_per_node_pair(ids.layer, &opts, &[pair])?;
        let found = paths.get(&pair).context("missing pair")?;
        assert_eq!(found[0].links(), vec![ids.link(0, 2), ids.link(2, 1)]);
        assert_eq!(found[0].cost, 2.0);
        assert_eq!(found[1].cost, 5.0);
        let bad = CandidatePathOpts::builder()
            .link_costs([(ids.link(0, 1), -1.0)].into_iter().collect())
            .build();
        assert!(matches!(
            network.candidate_paths_per_node_pair(ids.layer, &bad, &[pair]),
            Err(NetworkError::InvalidValue { .. })
        ));
        Ok(())
    }

    #[test]
    fn down_links_can_be_skipped() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        network.set_link_failure_state(ids.link(0, 1), false)?;
        let opts = CandidatePathOpts::builder().k(2).skip_down_links(true).build();
        let pair = (ids.nodes[0], ids.nodes[1]);
        let paths = network.candidate_paths_per_node_pair(ids.layer, &opts, &[pair])?;
        assert_eq!(
            paths.get(&pair).map(|p| p.iter().map(|p| p.links()).collect::<Vec<_>>()),
            Some(vec![vec![ids.link(0, 2), ids.link(2, 1)]])
        );
        Ok(())
    }

    #[test]
    fn disjoint_pairs() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let opts = CandidatePathOpts::builder().k(2).build();
        let paths = network.candidate_paths_per_demand(ids.layer, &opts)?;
        let d = ids.demand(0, 1);
        for level in [Disjointness::LinkDisjoint, Disjointness::LinkAndNodeDisjoint] {
            let pairs = network.candidate_11_path_pairs(&paths, level);
            assert_eq!(pairs.get(&d).map(|p| p.len()), Some(1));
        }
        let srg = network.add_srg(1000.0, 10.0)?;
        network.add_link_to_srg(srg, ids.link(0, 1))?;
        network.add_link_to_srg(srg, ids.link(2, 1))?;
        let pairs = network.candidate_11_path_pairs(&paths, Disjointness::SrgDisjoint);
        assert_eq!(pairs.get(&d).map(|p| p.len()), Some(0));
        // Other demands are unaffected.
        assert_eq!(pairs.get(&ids.demand(1, 0)).map(|p| p.len()), Some(1));
        Ok(())
    }

    #[test]
    fn service_chain_candidates() -> anyhow::Result<()> {
        let (network, ids) = testing::service_chain_net()?;
        let opts = CandidatePathOpts::builder().k(3).build();
        let chain_opts = ServiceChainOpts::default();
        let chains = network.candidate_service_chains_per_demand(ids.layer, &opts, &chain_opts)?;
        let found = chains.get(&ids.fw_demand).context("missing demand")?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resources(), vec![ids.firewall]);
        assert_eq!(found[0].links(), vec![ids.link(0, 1), ids.link(1, 2)]);
        assert_eq!(found[0].hops, 2);
        // Propagation over 2 km plus the firewall's processing time.
        assert!((found[0].delay.into_f64() - 0.11).abs() < 1e-12);

        let only_first = [ids.nodes[0]].into_iter().collect();
        let chain_opts = ServiceChainOpts::builder()
            .allowed_hosts([("FW".to_owned(), only_first)].into_iter().collect())
            .build();
        let chains = network.candidate_service_chains_per_demand(ids.layer, &opts, &chain_opts)?;
        assert_eq!(chains.get(&ids.fw_demand).map(|c| c.len()), Some(0));
        Ok(())
    }
}
