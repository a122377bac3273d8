//! Plain-text reports over a loaded network.

use std::fmt;

use layernet_core::types::{Demand, LayerId, NodeId, PathElement, RoutingType};
use layernet_core::{CandidatePath, CandidatePathOpts, Network};

/// Traffic and capacity figures of one layer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerSummary {
    pub(crate) name: String,
    pub(crate) routing_type: RoutingType,
    pub(crate) links: usize,
    pub(crate) links_down: usize,
    pub(crate) oversubscribed_links: usize,
    pub(crate) max_utilization: f64,
    pub(crate) demands: usize,
    pub(crate) blocking_demands: usize,
    pub(crate) offered_traffic: f64,
    pub(crate) carried_traffic: f64,
}

impl LayerSummary {
    pub(crate) fn of(network: &Network, layer: LayerId) -> Option<Self> {
        let l = network.layer(layer)?;
        let links = network.links_in(layer).collect::<Vec<_>>();
        let demands = network.demands_in(layer).collect::<Vec<_>>();
        Some(Self {
            name: l.name().to_owned(),
            routing_type: l.routing_type(),
            links: links.len(),
            links_down: links.iter().filter(|l| l.is_down()).count(),
            oversubscribed_links: links.iter().filter(|l| l.is_oversubscribed()).count(),
            max_utilization: links.iter().map(|l| l.utilization()).fold(0.0, f64::max),
            demands: demands.len(),
            blocking_demands: demands.iter().filter(|d| d.is_blocking()).count(),
            offered_traffic: demands.iter().map(|d| d.offered_traffic()).sum(),
            carried_traffic: demands.iter().map(|d| d.carried_traffic()).sum(),
        })
    }
}

impl fmt::Display for LayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layer {} ({})", self.name, self.routing_type)?;
        writeln!(
            f,
            "  links: {} ({} down, {} oversubscribed), max utilization {:.3}",
            self.links, self.links_down, self.oversubscribed_links, self.max_utilization
        )?;
        write!(
            f,
            "  demands: {} ({} blocking), offered {}, carried {}",
            self.demands, self.blocking_demands, self.offered_traffic, self.carried_traffic
        )
    }
}

/// Oversubscribed links and resources, and demands that are not fully carried.
pub(crate) fn problems(network: &Network, layers: &[LayerId]) -> Vec<String> {
    let mut found = Vec::new();
    for &layer in layers {
        for link in network.links_in(layer).filter(|l| l.is_oversubscribed()) {
            found.push(format!(
                "link {} is oversubscribed: {} occupied of {}",
                link.id(),
                link.occupied_capacity(),
                link.capacity()
            ));
        }
        for demand in network.demands_in(layer).filter(|d| d.is_blocking()) {
            found.push(format!(
                "demand {} blocks {} of {}",
                demand.id(),
                demand.blocked_traffic(),
                demand.offered_traffic()
            ));
        }
    }
    for resource in network.resources().filter(|r| r.is_oversubscribed()) {
        found.push(format!(
            "resource {} is oversubscribed: {} occupied of {}",
            resource.name(),
            resource.occupied_capacity(),
            resource.capacity()
        ));
    }
    found
}

/// The `k` best candidate paths of every demand of the layer.
pub(crate) fn candidates(network: &Network, layer: LayerId, k: usize) -> anyhow::Result<String> {
    let opts = CandidatePathOpts::builder().k(k).build();
    let found = network.candidate_paths_per_demand(layer, &opts)?;
    let mut out = String::new();
    for (id, paths) in found {
        let Some(demand) = network.demand(id) else {
            continue;
        };
        out.push_str(&format!("demand {} {}\n", id, endpoints(network, demand)));
        if paths.is_empty() {
            out.push_str("  no path\n");
        }
        for path in &paths {
            out.push_str(&format!("  {}\n", describe(network, path)));
        }
    }
    Ok(out)
}

fn endpoints(network: &Network, demand: &Demand) -> String {
    let name = |n: NodeId| network.name_of(n).unwrap_or("?").to_owned();
    format!("{} -> {}", name(demand.ingress()), name(demand.egress()))
}

fn describe(network: &Network, path: &CandidatePath) -> String {
    let mut nodes = Vec::new();
    for elem in &path.path {
        if let PathElement::Link(id) = elem {
            if let Some(link) = network.link(*id) {
                if nodes.is_empty() {
                    nodes.push(network.name_of(link.origin()).unwrap_or("?"));
                }
                nodes.push(network.name_of(link.destination()).unwrap_or("?"));
            }
        }
    }
    format!(
        "{} (cost {}, {}, {} hops, {})",
        nodes.join(" "),
        path.cost,
        path.length,
        path.hops,
        path.delay
    )
}
