//! Node and link failures and shared risk groups.

use std::collections::BTreeSet;

use crate::network::topology::check_non_negative;
use crate::network::types::*;
use crate::network::{Network, NetworkError};

impl Network {
    pub fn add_srg(&mut self, mttf_hours: f64, mttr_hours: f64) -> Result<SrgId, NetworkError> {
        check_non_negative("mean time to fail", mttf_hours)?;
        check_non_negative("mean time to repair", mttr_hours)?;
        let id = SrgId::new(self.next_id());
        let srg = Srg {
            id,
            meta: Meta::default(),
            nodes: BTreeSet::new(),
            links: BTreeSet::new(),
            mttf_hours,
            mttr_hours,
            failed: false,
        };
        self.srgs.insert(id, srg);
        Ok(id)
    }

    pub fn set_srg_mean_times(
        &mut self,
        id: SrgId,
        mttf_hours: f64,
        mttr_hours: f64,
    ) -> Result<(), NetworkError> {
        check_non_negative("mean time to fail", mttf_hours)?;
        check_non_negative("mean time to repair", mttr_hours)?;
        let srg = self.req_srg_mut(id)?;
        srg.mttf_hours = mttf_hours;
        srg.mttr_hours = mttr_hours;
        Ok(())
    }

    pub fn add_node_to_srg(&mut self, srg: SrgId, node: NodeId) -> Result<(), NetworkError> {
        self.req_node(node)?;
        self.req_srg_mut(srg)?.nodes.insert(node);
        if let Some(node) = self.nodes.get_mut(&node) {
            node.srgs.insert(srg);
        }
        self.refresh();
        Ok(())
    }

    pub fn add_link_to_srg(&mut self, srg: SrgId, link: LinkId) -> Result<(), NetworkError> {
        self.req_link(link)?;
        self.req_srg_mut(srg)?.links.insert(link);
        if let Some(link) = self.links.get_mut(&link) {
            link.srgs.insert(srg);
        }
        self.refresh();
        Ok(())
    }

    pub fn remove_node_from_srg(&mut self, srg: SrgId, node: NodeId) -> Result<(), NetworkError> {
        self.req_node(node)?;
        self.req_srg_mut(srg)?.nodes.remove(&node);
        if let Some(node) = self.nodes.get_mut(&node) {
            node.srgs.remove(&srg);
        }
        self.refresh();
        Ok(())
    }

    pub fn remove_link_from_srg(&mut self, srg: SrgId, link: LinkId) -> Result<(), NetworkError> {
        self.req_link(link)?;
        self.req_srg_mut(srg)?.links.remove(&link);
        if let Some(link) = self.links.get_mut(&link) {
            link.srgs.remove(&srg);
        }
        self.refresh();
        Ok(())
    }

    /// Removes an SRG. Elements it held down come back up unless something else keeps them down.
    pub fn remove_srg(&mut self, id: SrgId) -> Result<(), NetworkError> {
        self.req_srg(id)?;
        if let Some(srg) = self.srgs.remove(&id) {
            for node in &srg.nodes {
                if let Some(node) = self.nodes.get_mut(node) {
                    node.srgs.remove(&id);
                }
            }
            for link in &srg.links {
                if let Some(link) = self.links.get_mut(link) {
                    link.srgs.remove(&id);
                }
            }
        }
        self.refresh();
        Ok(())
    }

    /// Sets the explicit failure state of a node.
    pub fn set_node_failure_state(&mut self, id: NodeId, up: bool) -> Result<(), NetworkError> {
        self.req_node_mut(id)?.failed = !up;
        log::trace!("node {id} is {}", if up { "up" } else { "down" });
        self.refresh();
        Ok(())
    }

    /// Sets the explicit failure state of a link.
    pub fn set_link_failure_state(&mut self, id: LinkId, up: bool) -> Result<(), NetworkError> {
        self.req_link_mut(id)?.failed = !up;
        log::trace!("link {id} is {}", if up { "up" } else { "down" });
        self.refresh();
        Ok(())
    }

    /// Fails or repairs every node and link of an SRG. Repairing leaves down the elements that
    /// another failed SRG or their own failure flag keeps down.
    pub fn set_srg_failure_state(&mut self, id: SrgId, up: bool) -> Result<(), NetworkError> {
        let srg = self.req_srg_mut(id)?;
        if srg.failed == !up {
            return Ok(());
        }
        srg.failed = !up;
        log::debug!("SRG {id} is {}", if up { "repaired" } else { "failed" });
        self.refresh();
        Ok(())
    }

    /// Applies several failure state changes at once.
    pub fn set_failure_state(
        &mut self,
        nodes_up: &[NodeId],
        nodes_down: &[NodeId],
        links_up: &[LinkId],
        links_down: &[LinkId],
    ) -> Result<(), NetworkError> {
        for &id in nodes_up.iter().chain(nodes_down) {
            self.req_node(id)?;
        }
        for &id in links_up.iter().chain(links_down) {
            self.req_link(id)?;
        }
        for (ids, failed) in [(nodes_up, false), (nodes_down, true)] {
            for id in ids {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.failed = failed;
                }
            }
        }
        for (ids, failed) in [(links_up, false), (links_down, true)] {
            for id in ids {
                if let Some(link) = self.links.get_mut(id) {
                    link.failed = failed;
                }
            }
        }
        self.refresh();
        Ok(())
    }

    /// Repairs every node, link and SRG.
    pub fn set_all_up(&mut self) {
        for node in self.nodes.values_mut() {
            node.failed = false;
        }
        for link in self.links.values_mut() {
            link.failed = false;
        }
        for srg in self.srgs.values_mut() {
            srg.failed = false;
        }
        self.refresh();
    }

    pub fn nodes_down(&self) -> BTreeSet<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.is_down())
            .map(|n| n.id)
            .collect()
    }

    pub fn links_down(&self, layer: LayerId) -> BTreeSet<LinkId> {
        self.links_in(layer)
            .filter(|l| l.is_down())
            .map(|l| l.id)
            .collect()
    }

    pub fn srgs_of_node(&self, id: NodeId) -> Result<&BTreeSet<SrgId>, NetworkError> {
        Ok(&self.req_node(id)?.srgs)
    }

    /// SRGs holding the link itself. Those of its end nodes are not included.
    pub fn srgs_of_link(&self, id: LinkId) -> Result<&BTreeSet<SrgId>, NetworkError> {
        Ok(&self.req_link(id)?.srgs)
    }

    /// SRGs holding any of `links` or their end nodes.
    pub fn srgs_of_links(&self, links: &[LinkId]) -> BTreeSet<SrgId> {
        let mut srgs = BTreeSet::new();
        for link in links.iter().filter_map(|l| self.links.get(l)) {
            srgs.extend(link.srgs.iter().copied());
            for node in [link.origin, link.destination] {
                if let Some(node) = self.nodes.get(&node) {
                    srgs.extend(node.srgs.iter().copied());
                }
            }
        }
        srgs
    }
}
