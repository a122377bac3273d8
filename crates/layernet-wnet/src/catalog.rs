//! VNF types and user services. Both catalogs live in the network attributes as JSON, keyed by
//! name, so they travel with the network when it is saved.

use std::collections::{BTreeMap, BTreeSet};

use layernet_core::Network;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::WNetError;

pub(crate) const VNF_TYPES_KEY: &str = "wnet.vnf_types";
pub(crate) const USER_SERVICES_KEY: &str = "wnet.user_services";

/// A kind of virtual network function and the node resources each instance takes.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct VnfType {
    #[builder(setter(into))]
    pub name: String,
    /// Capacity of an instance, in Gbps of input traffic.
    pub max_input_traffic_gbps: f64,
    #[builder(default)]
    pub cpu: f64,
    #[builder(default)]
    pub ram_gb: f64,
    #[builder(default)]
    pub hd_gb: f64,
    #[builder(default)]
    pub processing_time_ms: f64,
    /// Names of the nodes that may host instances. Any node if absent.
    #[builder(default, setter(strip_option))]
    pub allowed_nodes: Option<BTreeSet<String>>,
    #[builder(default, setter(into))]
    pub description: String,
}

impl VnfType {
    pub fn may_be_hosted_at(&self, node_name: &str) -> bool {
        self.allowed_nodes
            .as_ref()
            .map_or(true, |nodes| nodes.contains(node_name))
    }

    pub(crate) fn validate(&self) -> Result<(), WNetError> {
        crate::check_name(&self.name)?;
        let values = [
            ("maximum input traffic", self.max_input_traffic_gbps),
            ("CPU", self.cpu),
            ("RAM", self.ram_gb),
            ("HD", self.hd_gb),
            ("processing time", self.processing_time_ms),
        ];
        match values.iter().find(|(_, v)| v.is_nan() || *v < 0.0) {
            Some((what, _)) => Err(WNetError::InvalidCatalogEntry {
                name: self.name.clone(),
                reason: format!("negative {what}"),
            }),
            None => Ok(()),
        }
    }
}

/// A service offered to users: the VNFs its upstream and downstream traffic must traverse.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct UserService {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub upstream_vnf_types: Vec<String>,
    #[builder(default)]
    pub downstream_vnf_types: Vec<String>,
    /// One factor per upstream VNF. All 1 if empty.
    #[builder(default)]
    pub upstream_expansion_factors: Vec<f64>,
    /// One factor per downstream VNF. All 1 if empty.
    #[builder(default)]
    pub downstream_expansion_factors: Vec<f64>,
    #[builder(default, setter(strip_option))]
    pub upstream_max_latency_ms: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub downstream_max_latency_ms: Option<f64>,
    /// Downstream traffic relative to the upstream traffic.
    #[builder(default = 1.0)]
    pub downstream_traffic_factor: f64,
    /// Upstream traffic ends, and downstream traffic starts, in a core node.
    #[builder(default)]
    pub ending_in_core_node: bool,
    #[builder(default, setter(into))]
    pub description: String,
}

impl UserService {
    /// The VNF types and expansion factors of one direction.
    pub fn chain(&self, upstream: bool) -> (Vec<String>, Vec<f64>) {
        let (types, factors) = if upstream {
            (&self.upstream_vnf_types, &self.upstream_expansion_factors)
        } else {
            (&self.downstream_vnf_types, &self.downstream_expansion_factors)
        };
        let factors = if factors.is_empty() {
            vec![1.0; types.len()]
        } else {
            factors.clone()
        };
        (types.clone(), factors)
    }

    pub fn max_latency_ms(&self, upstream: bool) -> Option<f64> {
        if upstream {
            self.upstream_max_latency_ms
        } else {
            self.downstream_max_latency_ms
        }
    }

    pub(crate) fn validate(&self, vnf_types: &BTreeMap<String, VnfType>) -> Result<(), WNetError> {
        crate::check_name(&self.name)?;
        let invalid = |reason: String| WNetError::InvalidCatalogEntry {
            name: self.name.clone(),
            reason,
        };
        for upstream in [true, false] {
            let (types, factors) = self.chain(upstream);
            if types.len() != factors.len() {
                return Err(invalid(format!(
                    "{} VNF types but {} expansion factors",
                    types.len(),
                    factors.len()
                )));
            }
            if let Some(ty) = types.iter().find(|t| !vnf_types.contains_key(*t)) {
                return Err(WNetError::UnknownVnfType(ty.clone()));
            }
        }
        if self.downstream_traffic_factor.is_nan() || self.downstream_traffic_factor < 0.0 {
            return Err(invalid("negative downstream traffic factor".into()));
        }
        Ok(())
    }
}

pub(crate) fn load<T: DeserializeOwned>(
    network: &Network,
    key: &str,
) -> Result<BTreeMap<String, T>, WNetError> {
    match network.attributes().get(key) {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(BTreeMap::new()),
    }
}

pub(crate) fn store<T: Serialize>(
    network: &mut Network,
    key: &str,
    entries: &BTreeMap<String, T>,
) -> Result<(), WNetError> {
    let json = serde_json::to_string(entries)?;
    network.set_network_attribute(key, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_round_trips_through_attributes() -> anyhow::Result<()> {
        let mut network = Network::new();
        let fw = VnfType::builder()
            .name("FW")
            .max_input_traffic_gbps(10.0)
            .cpu(2.0)
            .allowed_nodes(["madrid".to_owned()].into_iter().collect())
            .build();
        let entries = [(fw.name.clone(), fw.clone())].into_iter().collect();
        store(&mut network, VNF_TYPES_KEY, &entries)?;
        let read: BTreeMap<String, VnfType> = load(&network, VNF_TYPES_KEY)?;
        assert_eq!(read, entries);
        assert!(fw.may_be_hosted_at("madrid"));
        assert!(!fw.may_be_hosted_at("paris"));
        Ok(())
    }

    #[test]
    fn user_service_chains() {
        let fw = VnfType::builder().name("FW").max_input_traffic_gbps(1.0).build();
        let vnf_types = [("FW".to_owned(), fw)].into_iter().collect();
        let service = UserService::builder()
            .name("video")
            .upstream_vnf_types(vec!["FW".into()])
            .downstream_vnf_types(vec!["FW".into(), "FW".into()])
            .downstream_expansion_factors(vec![1.0, 2.0])
            .build();
        assert!(service.validate(&vnf_types).is_ok());
        assert_eq!(service.chain(true), (vec!["FW".to_owned()], vec![1.0]));
        assert_eq!(service.chain(false).1, vec![1.0, 2.0]);

        let unknown = UserService::builder()
            .name("web")
            .upstream_vnf_types(vec!["NAT".into()])
            .build();
        assert!(matches!(
            unknown.validate(&vnf_types),
            Err(WNetError::UnknownVnfType(t)) if t == "NAT"
        ));
        let mismatched = UserService::builder()
            .name("web")
            .upstream_vnf_types(vec!["FW".into()])
            .upstream_expansion_factors(vec![1.0, 1.0])
            .build();
        assert!(matches!(
            mismatched.validate(&vnf_types),
            Err(WNetError::InvalidCatalogEntry { .. })
        ));
    }
}
