use std::collections::BTreeMap;

use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::units::{Km, KmPerSec, Millisecs};

/// Ordered node pairs of the triangle.
pub(crate) const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)];

#[derive(Debug, Clone)]
pub(crate) struct TriangleIds {
    pub(crate) layer: LayerId,
    pub(crate) nodes: [NodeId; 3],
    links: BTreeMap<(usize, usize), LinkId>,
    demands: BTreeMap<(usize, usize), DemandId>,
}

impl TriangleIds {
    pub(crate) fn link(&self, i: usize, j: usize) -> LinkId {
        self.links[&(i, j)]
    }

    pub(crate) fn demand(&self, i: usize, j: usize) -> DemandId {
        self.demands[&(i, j)]
    }
}

/// Three nodes fully meshed by bidirectional 1 km links of capacity 100, with an unrouted
/// demand of 1 unit between every ordered pair.
pub(crate) fn triangle() -> Result<(Network, TriangleIds), NetworkError> {
    let mut network = Network::new();
    let layer = network.default_layer();
    let nodes = [
        network.add_node("a", Point::new(0.0, 0.0)),
        network.add_node("b", Point::new(1.0, 0.0)),
        network.add_node("c", Point::new(0.5, 1.0)),
    ];
    let mut links = BTreeMap::new();
    for (i, j) in [(0, 1), (0, 2), (1, 2)] {
        let (ab, ba) = network.add_link_bidirectional(
            layer,
            nodes[i],
            nodes[j],
            100.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        )?;
        links.insert((i, j), ab);
        links.insert((j, i), ba);
    }
    let mut demands = BTreeMap::new();
    for (i, j) in PAIRS {
        demands.insert((i, j), network.add_demand(layer, nodes[i], nodes[j], 1.0)?);
    }
    let ids = TriangleIds {
        layer,
        nodes,
        links,
        demands,
    };
    Ok((network, ids))
}

/// The triangle with every demand carried over its direct link.
pub(crate) fn triangle_routed() -> Result<(Network, TriangleIds), NetworkError> {
    let (mut network, ids) = triangle()?;
    for (i, j) in PAIRS {
        network.add_route(ids.demand(i, j), 1.0, 1.0, &[ids.link(i, j)])?;
    }
    Ok((network, ids))
}

#[derive(Debug, Clone)]
pub(crate) struct ChainIds {
    pub(crate) layer: LayerId,
    pub(crate) nodes: [NodeId; 3],
    links: BTreeMap<(usize, usize), LinkId>,
    pub(crate) cpu: ResourceId,
    pub(crate) firewall: ResourceId,
    pub(crate) nat: ResourceId,
    pub(crate) fw_demand: DemandId,
    pub(crate) via_firewall: RouteId,
    pub(crate) via_nat: RouteId,
}

impl ChainIds {
    pub(crate) fn link(&self, i: usize, j: usize) -> LinkId {
        self.links[&(i, j)]
    }
}

/// A line `0 - 1 - 2` where node 1 hosts a CPU of 8 cores and two functions on top of it, a
/// firewall and a NAT, each taking 2 cores. Two demands from 0 to 2 traverse one function each
/// with 1 unit of traffic.
pub(crate) fn service_chain_net() -> Result<(Network, ChainIds), NetworkError> {
    let mut network = Network::new();
    let layer = network.default_layer();
    let nodes = [
        network.add_node("a", Point::new(0.0, 0.0)),
        network.add_node("b", Point::new(1.0, 0.0)),
        network.add_node("c", Point::new(2.0, 0.0)),
    ];
    let mut links = BTreeMap::new();
    for (i, j) in [(0, 1), (1, 2)] {
        let (ab, ba) = network.add_link_bidirectional(
            layer,
            nodes[i],
            nodes[j],
            100.0,
            Km::new(1.0),
            KmPerSec::FIBER,
        )?;
        links.insert((i, j), ab);
        links.insert((j, i), ba);
    }
    let cpu = network.add_resource(
        nodes[1],
        "CPU",
        "cpu",
        8.0,
        "cores",
        BTreeMap::new(),
        Millisecs::ZERO,
    )?;
    let vnf = |network: &mut Network, ty: &str| {
        network.add_resource(
            nodes[1],
            ty,
            ty.to_lowercase(),
            5.0,
            "Gbps",
            [(cpu, 2.0)].into_iter().collect(),
            Millisecs::new(0.1),
        )
    };
    let firewall = vnf(&mut network, "FW")?;
    let nat = vnf(&mut network, "NAT")?;
    let routed = |network: &mut Network, ty: &str, resource| {
        let demand = network.add_demand(layer, nodes[0], nodes[2], 1.0)?;
        network.set_demand_service_chain(demand, vec![ty.to_owned()], vec![1.0])?;
        let path = vec![
            PathElement::Link(links[&(0, 1)]),
            PathElement::Resource(resource),
            PathElement::Link(links[&(1, 2)]),
        ];
        let route = network.add_service_chain(demand, 1.0, vec![1.0; 3], path)?;
        Ok::<_, NetworkError>((demand, route))
    };
    let (fw_demand, via_firewall) = routed(&mut network, "FW", firewall)?;
    let (_, via_nat) = routed(&mut network, "NAT", nat)?;
    let ids = ChainIds {
        layer,
        nodes,
        links,
        cpu,
        firewall,
        nat,
        fw_demand,
        via_firewall,
        via_nat,
    };
    Ok((network, ids))
}
