use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::opts::{MulticastTreeOpts, ServiceChainOpts};
use crate::utils;

use super::ksp::StateGraph;

/// A candidate multicast tree and its cost.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CandidateTree {
    pub links: BTreeSet<LinkId>,
    pub cost: f64,
}

impl Network {
    /// Up to `opts.k` distinct trees for each multicast demand of the layer, cheapest first.
    ///
    /// Trees are unions of one candidate path per egress node. A union is kept if it is a valid
    /// tree for the demand and no node has more outgoing tree links than the copy capability.
    pub fn candidate_multicast_trees_per_demand(
        &self,
        layer: LayerId,
        opts: &MulticastTreeOpts,
    ) -> Result<BTreeMap<MulticastDemandId, Vec<CandidateTree>>, NetworkError> {
        let branch_opts = opts.branch_opts();
        let graph = self.state_graph(layer, &[], &branch_opts, &ServiceChainOpts::default())?;
        let demands = self
            .layer(layer)
            .into_iter()
            .flat_map(|l| l.multicast_demands.iter())
            .filter_map(|d| self.multicast_demands.get(d))
            .collect::<Vec<_>>();
        let found = utils::par_chunks(&demands, |chunk| {
            chunk
                .iter()
                .map(|d| (d.id, self.candidate_trees(&graph, d, opts)))
                .collect()
        });
        Ok(found.collect())
    }

    fn candidate_trees(
        &self,
        graph: &StateGraph,
        demand: &MulticastDemand,
        opts: &MulticastTreeOpts,
    ) -> Vec<CandidateTree> {
        let branch_opts = opts.branch_opts();
        let mut branches = Vec::new();
        for &egress in &demand.egresses {
            let paths = self.k_best(graph, (demand.ingress, 0), (egress, 0), &branch_opts);
            if paths.is_empty() {
                log::debug!("multicast demand {} cannot reach {egress}", demand.id);
                return Vec::new();
            }
            branches.push(paths.into_iter().map(|p| p.links()).collect::<Vec<_>>());
        }
        let unions = branches
            .iter()
            .map(|paths| paths.iter())
            .multi_cartesian_product()
            .map(|combo| combo.into_iter().flatten().copied().collect::<BTreeSet<_>>())
            .collect::<BTreeSet<_>>();
        let mut trees = unions
            .into_iter()
            .filter(|links| self.validate_tree(demand, links).is_ok())
            .filter(|links| {
                opts.max_copy_capability
                    .map_or(true, |cap| self.max_fan_out(links) <= cap)
            })
            .map(|links| CandidateTree {
                cost: links.iter().map(|&l| opts.link_costs.get(&l).copied().unwrap_or(1.0)).sum(),
                links,
            })
            .filter(|t| opts.max_tree_cost.map_or(true, |m| !exceeds(t.cost, m)))
            .collect::<Vec<_>>();
        trees.sort_by(|a, b| a.cost.total_cmp(&b.cost).then_with(|| a.links.cmp(&b.links)));
        if let (Some(best), Some(factor)) = (trees.first(), opts.max_tree_cost_factor_vs_best) {
            let bound = best.cost * factor;
            trees.retain(|t| !exceeds(t.cost, bound));
        }
        trees.truncate(opts.k);
        trees
    }

    // Largest number of links leaving one node.
    fn max_fan_out(&self, links: &BTreeSet<LinkId>) -> usize {
        links
            .iter()
            .filter_map(|l| self.links.get(l))
            .counts_by(|l| l.origin)
            .into_values()
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    #[test]
    fn triangle_trees_and_copy_capability() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let egresses = [ids.nodes[1], ids.nodes[2]].into_iter().collect();
        let mcd = network.add_multicast_demand(ids.layer, ids.nodes[0], egresses, 1.0)?;

        let opts = MulticastTreeOpts::builder().k(10).build();
        let trees = network.candidate_multicast_trees_per_demand(ids.layer, &opts)?;
        let found = trees.get(&mcd).context("missing demand")?;
        assert_eq!(found.len(), 3);
        let star = [ids.link(0, 1), ids.link(0, 2)].into_iter().collect::<BTreeSet<_>>();
        assert_eq!(found[0].links, star);
        assert_eq!(found[0].cost, 2.0);

        let opts = MulticastTreeOpts::builder().k(10).max_copy_capability(1).build();
        let trees = network.candidate_multicast_trees_per_demand(ids.layer, &opts)?;
        let found = trees.get(&mcd).context("missing demand")?;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|t| t.links != star));
        Ok(())
    }

    #[test]
    fn tree_bounds() -> anyhow::Result<()> {
        let (mut network, ids) = testing::triangle()?;
        let egresses = [ids.nodes[1], ids.nodes[2]].into_iter().collect();
        let mcd = network.add_multicast_demand(ids.layer, ids.nodes[0], egresses, 1.0)?;

        let opts = MulticastTreeOpts::builder().max_hops_per_egress(1).build();
        let trees = network.candidate_multicast_trees_per_demand(ids.layer, &opts)?;
        assert_eq!(trees.get(&mcd).map(|t| t.len()), Some(1));

        let opts = MulticastTreeOpts::builder()
            .link_costs([(ids.link(0, 2), 3.0)].into_iter().collect())
            .max_tree_cost_factor_vs_best(1.0)
            .build();
        let trees = network.candidate_multicast_trees_per_demand(ids.layer, &opts)?;
        let found = trees.get(&mcd).context("missing demand")?;
        // The chain through node 1 costs 2, both trees using the expensive link cost 4.
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].links,
            [ids.link(0, 1), ids.link(1, 2)].into_iter().collect()
        );
        Ok(())
    }
}
