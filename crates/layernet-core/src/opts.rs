//! Options for the candidate path, service chain and multicast tree searches.

use std::collections::{BTreeMap, BTreeSet};

use crate::network::types::{LinkId, NodeId, ResourceId};
use crate::units::{Km, Millisecs};

/// Bounds and costs for K-shortest candidate paths.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct CandidatePathOpts {
    /// Maximum number of paths per node pair or demand.
    #[builder(default = 3)]
    pub k: usize,
    #[builder(default, setter(strip_option))]
    pub max_length: Option<Km>,
    #[builder(default, setter(strip_option))]
    pub max_hops: Option<usize>,
    /// Bound on propagation delay plus the processing time of traversed resources.
    #[builder(default, setter(strip_option))]
    pub max_propagation_delay: Option<Millisecs>,
    #[builder(default, setter(strip_option))]
    pub max_route_cost: Option<f64>,
    /// Together with the offset, admits only paths costing at most
    /// `factor * cheapest + offset`, where `cheapest` is the cheapest admissible path of the
    /// same pair. When only one of the two is set the other defaults to 1 and 0.
    #[builder(default, setter(strip_option))]
    pub max_route_cost_factor_vs_shortest: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub max_route_cost_offset_vs_shortest: Option<f64>,
    /// Per-link costs. Links not listed cost 1.
    #[builder(default)]
    pub link_costs: BTreeMap<LinkId, f64>,
    #[builder(default = false)]
    pub skip_down_links: bool,
}

impl Default for CandidatePathOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CandidatePathOpts {
    pub(crate) fn link_cost(&self, link: LinkId) -> f64 {
        self.link_costs.get(&link).copied().unwrap_or(1.0)
    }

    // Cost bound relative to the cheapest admissible path, if any.
    pub(crate) fn relative_cost_bound(&self, cheapest: f64) -> Option<f64> {
        match (
            self.max_route_cost_factor_vs_shortest,
            self.max_route_cost_offset_vs_shortest,
        ) {
            (None, None) => None,
            (factor, offset) => Some(factor.unwrap_or(1.0) * cheapest + offset.unwrap_or(0.0)),
        }
    }
}

/// Extra inputs for service chain candidates.
#[derive(Debug, Clone, Default, typed_builder::TypedBuilder)]
pub struct ServiceChainOpts {
    /// Cost of traversing a resource. Resources not listed cost nothing.
    #[builder(default)]
    pub resource_costs: BTreeMap<ResourceId, f64>,
    /// Nodes allowed to host each resource type. Types not listed may be used anywhere.
    #[builder(default)]
    pub allowed_hosts: BTreeMap<String, BTreeSet<NodeId>>,
}

impl ServiceChainOpts {
    pub(crate) fn resource_cost(&self, resource: ResourceId) -> f64 {
        self.resource_costs.get(&resource).copied().unwrap_or(0.0)
    }

    pub(crate) fn may_host(&self, resource_type: &str, node: NodeId) -> bool {
        self.allowed_hosts
            .get(resource_type)
            .map_or(true, |nodes| nodes.contains(&node))
    }
}

/// Bounds for multicast tree candidates.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct MulticastTreeOpts {
    /// Maximum number of trees per multicast demand.
    #[builder(default = 3)]
    pub k: usize,
    /// Paths considered towards each egress node.
    #[builder(default = 3)]
    pub paths_per_egress: usize,
    /// Maximum number of tree links leaving any node.
    #[builder(default, setter(strip_option))]
    pub max_copy_capability: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub max_length_per_egress: Option<Km>,
    #[builder(default, setter(strip_option))]
    pub max_hops_per_egress: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub max_delay_per_egress: Option<Millisecs>,
    #[builder(default, setter(strip_option))]
    pub max_tree_cost: Option<f64>,
    /// Admits only trees costing at most this factor times the cheapest tree.
    #[builder(default, setter(strip_option))]
    pub max_tree_cost_factor_vs_best: Option<f64>,
    /// Per-link costs. Links not listed cost 1.
    #[builder(default)]
    pub link_costs: BTreeMap<LinkId, f64>,
    #[builder(default = false)]
    pub skip_down_links: bool,
}

impl Default for MulticastTreeOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MulticastTreeOpts {
    // Path search options for the per-egress branches.
    pub(crate) fn branch_opts(&self) -> CandidatePathOpts {
        CandidatePathOpts {
            k: self.paths_per_egress,
            max_length: self.max_length_per_egress,
            max_hops: self.max_hops_per_egress,
            max_propagation_delay: self.max_delay_per_egress,
            max_route_cost: None,
            max_route_cost_factor_vs_shortest: None,
            max_route_cost_offset_vs_shortest: None,
            link_costs: self.link_costs.clone(),
            skip_down_links: self.skip_down_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_bound_defaults() {
        let opts = CandidatePathOpts::default();
        assert_eq!(opts.relative_cost_bound(2.0), None);
        let opts = CandidatePathOpts::builder()
            .max_route_cost_factor_vs_shortest(1.5)
            .build();
        assert_eq!(opts.relative_cost_bound(2.0), Some(3.0));
        let opts = CandidatePathOpts::builder()
            .max_route_cost_offset_vs_shortest(1.0)
            .build();
        assert_eq!(opts.relative_cost_bound(2.0), Some(3.0));
    }
}
