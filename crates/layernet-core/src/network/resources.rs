//! Resources hosted on nodes and the base/upper hierarchy between them.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::DiGraph;

use crate::network::topology::check_non_negative;
use crate::network::types::*;
use crate::network::{Network, NetworkError};
use crate::units::Millisecs;

/// Whether a capacity change may leave resources oversubscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityCheck {
    /// Reject the change if the resource or one of its bases would be oversubscribed.
    Strict,
    AllowOversubscription,
}

impl Network {
    /// Adds a resource on `host` that occupies the given amounts of capacity in its base
    /// resources, which must be hosted on the same node.
    #[allow(clippy::too_many_arguments)]
    pub fn add_resource(
        &mut self,
        host: NodeId,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        capacity: f64,
        capacity_unit: impl Into<String>,
        base_occupation: BTreeMap<ResourceId, f64>,
        processing_time: Millisecs,
    ) -> Result<ResourceId, NetworkError> {
        self.req_node(host)?;
        check_non_negative("resource capacity", capacity)?;
        check_non_negative("processing time", processing_time.into_f64())?;
        self.validate_bases(None, host, &base_occupation)?;
        let id = ResourceId::new(self.next_id());
        for (base, &amount) in &base_occupation {
            if let Some(base) = self.resources.get_mut(base) {
                base.upper_resources.insert(id, amount);
            }
        }
        let resource = Resource {
            id,
            meta: Meta::named(name),
            host,
            resource_type: resource_type.into(),
            capacity,
            capacity_unit: capacity_unit.into(),
            processing_time,
            base_resources: base_occupation,
            upper_resources: BTreeMap::new(),
            traversing_routes: BTreeSet::new(),
            cache_occupied_by_routes: 0.0,
        };
        self.resources.insert(id, resource);
        if let Some(node) = self.nodes.get_mut(&host) {
            node.resources.insert(id);
        }
        self.refresh();
        Ok(id)
    }

    /// Updates the capacity of a resource and the capacity it occupies in its bases in one step.
    pub fn set_resource_capacity(
        &mut self,
        id: ResourceId,
        capacity: f64,
        base_occupation: BTreeMap<ResourceId, f64>,
        check: CapacityCheck,
    ) -> Result<(), NetworkError> {
        let resource = self.req_resource(id)?;
        check_non_negative("resource capacity", capacity)?;
        self.validate_bases(Some(id), resource.host, &base_occupation)?;
        if check == CapacityCheck::Strict {
            if exceeds(resource.occupied_capacity(), capacity) {
                return Err(NetworkError::Oversubscribed(id));
            }
            for (&base, &amount) in &base_occupation {
                let b = self.req_resource(base)?;
                let occupied = b.occupied_capacity() - b.capacity_occupied_by_upper_resource(id)
                    + amount;
                if exceeds(occupied, b.capacity) {
                    return Err(NetworkError::Oversubscribed(base));
                }
            }
        }
        let old = resource.base_resources.keys().copied().collect::<Vec<_>>();
        for base in old {
            if let Some(base) = self.resources.get_mut(&base) {
                base.upper_resources.remove(&id);
            }
        }
        for (base, &amount) in &base_occupation {
            if let Some(base) = self.resources.get_mut(base) {
                base.upper_resources.insert(id, amount);
            }
        }
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.capacity = capacity;
            resource.base_resources = base_occupation;
        }
        self.refresh();
        Ok(())
    }

    pub fn set_resource_processing_time(
        &mut self,
        id: ResourceId,
        processing_time: Millisecs,
    ) -> Result<(), NetworkError> {
        check_non_negative("processing time", processing_time.into_f64())?;
        self.req_resource_mut(id)?.processing_time = processing_time;
        Ok(())
    }

    /// Removes a resource, every resource based on it (transitively) and every route
    /// traversing one of the removed resources.
    pub fn remove_resource(&mut self, id: ResourceId) -> Result<(), NetworkError> {
        self.req_resource(id)?;
        self.detach_resource(id);
        self.refresh();
        Ok(())
    }

    pub(crate) fn detach_resource(&mut self, id: ResourceId) {
        let doomed = self.resource_closure_upwards(id);
        let routes = doomed
            .iter()
            .filter_map(|r| self.resources.get(r))
            .flat_map(|r| r.traversing_routes.iter().copied())
            .collect::<BTreeSet<_>>();
        for route in routes {
            self.detach_route(route);
        }
        for r in &doomed {
            let Some(resource) = self.resources.remove(r) else {
                continue;
            };
            for base in resource.base_resources.keys() {
                if let Some(base) = self.resources.get_mut(base) {
                    base.upper_resources.remove(r);
                }
            }
            if let Some(node) = self.nodes.get_mut(&resource.host) {
                node.resources.remove(r);
            }
        }
        log::debug!("removed {} resources based on {id}", doomed.len());
    }

    // `id` and every resource above it.
    fn resource_closure_upwards(&self, id: ResourceId) -> BTreeSet<ResourceId> {
        let mut closure = BTreeSet::from([id]);
        let mut stack = vec![id];
        while let Some(r) = stack.pop() {
            let uppers = self.resources.get(&r).into_iter().flat_map(|r| r.upper_resources.keys());
            for &upper in uppers {
                if closure.insert(upper) {
                    stack.push(upper);
                }
            }
        }
        closure
    }

    /// Resources of type `resource_type` hosted on `node`.
    pub fn resources_at(
        &self,
        node: NodeId,
        resource_type: &str,
    ) -> impl Iterator<Item = &Resource> + '_ {
        let resource_type = resource_type.to_owned();
        self.nodes
            .get(&node)
            .into_iter()
            .flat_map(|n| n.resources.iter())
            .filter_map(|r| self.resources.get(r))
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn resources_of_type(&self, resource_type: &str) -> impl Iterator<Item = &Resource> + '_ {
        let resource_type = resource_type.to_owned();
        self.resources
            .values()
            .filter(move |r| r.resource_type == resource_type)
    }

    fn validate_bases(
        &self,
        resource: Option<ResourceId>,
        host: NodeId,
        bases: &BTreeMap<ResourceId, f64>,
    ) -> Result<(), NetworkError> {
        for (&base, &amount) in bases {
            let b = self.req_resource(base)?;
            if b.host != host {
                return Err(NetworkError::BaseOnOtherNode { base, host });
            }
            check_non_negative("base resource occupation", amount)?;
        }
        let Some(resource) = resource else {
            // A new resource has nothing above it yet.
            return Ok(());
        };
        if bases.contains_key(&resource) {
            return Err(NetworkError::ResourceCycle { resource, base: resource });
        }
        // Edges go from a resource to its bases.
        let mut g = DiGraph::<ResourceId, ()>::new();
        let idx = self
            .resources
            .keys()
            .map(|&r| (r, g.add_node(r)))
            .collect::<BTreeMap<_, _>>();
        for r in self.resources.values().filter(|r| r.id != resource) {
            for base in r.base_resources.keys() {
                if let (Some(&a), Some(&b)) = (idx.get(&r.id), idx.get(base)) {
                    g.add_edge(a, b, ());
                }
            }
        }
        for &base in bases.keys() {
            if let (Some(&a), Some(&b)) = (idx.get(&resource), idx.get(&base)) {
                g.add_edge(a, b, ());
                if petgraph::algo::is_cyclic_directed(&g) {
                    return Err(NetworkError::ResourceCycle { resource, base });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use crate::testing;

    use super::*;

    #[test]
    fn occupation_flows_through_hierarchy() -> anyhow::Result<()> {
        let (network, ids) = testing::service_chain_net()?;
        let cpu = network.resource(ids.cpu).context("missing cpu")?;
        // Two VNFs each take 2 units of CPU.
        assert_eq!(cpu.occupied_capacity_by_upper_resources(), 4.0);
        assert_eq!(cpu.capacity_occupied_by_upper_resource(ids.firewall), 2.0);
        let fw = network.resource(ids.firewall).context("missing firewall")?;
        assert_eq!(fw.capacity_occupied_in_base_resource(ids.cpu), 2.0);
        assert_eq!(fw.occupied_capacity(), 1.0);
        assert!(!cpu.is_oversubscribed());
        Ok(())
    }

    #[test]
    fn strict_capacity_rejects_oversubscription() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        let res = network.set_resource_capacity(
            ids.firewall,
            0.5,
            [(ids.cpu, 2.0)].into_iter().collect(),
            CapacityCheck::Strict,
        );
        assert!(matches!(res, Err(NetworkError::Oversubscribed(r)) if r == ids.firewall));
        let res = network.set_resource_capacity(
            ids.firewall,
            10.0,
            [(ids.cpu, 9.0)].into_iter().collect(),
            CapacityCheck::Strict,
        );
        assert!(matches!(res, Err(NetworkError::Oversubscribed(r)) if r == ids.cpu));
        network.set_resource_capacity(
            ids.firewall,
            0.5,
            [(ids.cpu, 9.0)].into_iter().collect(),
            CapacityCheck::AllowOversubscription,
        )?;
        let fw = network.resource(ids.firewall).context("missing firewall")?;
        assert!(fw.is_oversubscribed());
        assert!(network.resource(ids.cpu).context("missing cpu")?.is_oversubscribed());
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn bases_must_share_host_and_stay_acyclic() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        let elsewhere = network.add_resource(
            ids.nodes[0],
            "CPU",
            "cpu0",
            10.0,
            "cores",
            BTreeMap::new(),
            Millisecs::ZERO,
        )?;
        let res = network.add_resource(
            ids.nodes[1],
            "NAT",
            "nat",
            1.0,
            "",
            [(elsewhere, 1.0)].into_iter().collect(),
            Millisecs::ZERO,
        );
        assert!(matches!(res, Err(NetworkError::BaseOnOtherNode { .. })));
        let res = network.set_resource_capacity(
            ids.cpu,
            10.0,
            [(ids.firewall, 1.0)].into_iter().collect(),
            CapacityCheck::AllowOversubscription,
        );
        assert!(matches!(res, Err(NetworkError::ResourceCycle { .. })));
        Ok(())
    }

    #[test]
    fn removing_base_cascades_to_routes() -> anyhow::Result<()> {
        let (mut network, ids) = testing::service_chain_net()?;
        assert_eq!(network.nr_routes(), 2);
        network.remove_resource(ids.firewall)?;
        // The route through the firewall is gone, the one through the NAT survives.
        assert!(network.route(ids.via_firewall).is_none());
        assert!(network.route(ids.via_nat).is_some());
        assert!(network.resource(ids.nat).is_some());
        network.remove_resource(ids.cpu)?;
        assert_eq!(network.nr_routes(), 0);
        assert_eq!(network.nr_resources(), 0);
        network.check_caches_consistency()?;
        Ok(())
    }
}
