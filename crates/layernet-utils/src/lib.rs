//! Utilities for saving and loading LayerNet designs.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use layernet_core::types::{LayerId, LinkId, NodeId, Point, RoutingType};
use layernet_core::units::{Km, KmPerSec};
use layernet_core::{Network, NetworkError};

/// Writes a complete snapshot of a [`Network`] as JSON or MessagePack, chosen by the file
/// extension.
pub fn save_network(path: impl AsRef<Path>, network: &Network) -> Result<(), Error> {
    let path = path.as_ref();
    match extension(path) {
        Some("json") => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, network)?;
            writer.flush()?;
        }
        Some("msgpack") => {
            let mut writer = BufWriter::new(File::create(path)?);
            rmp_serde::encode::write_named(&mut writer, network)?;
            writer.flush()?;
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    }
    log::debug!("saved network to {}", path.display());
    Ok(())
}

/// Reads a [`Network`] from a JSON or MessagePack snapshot, or builds one from a
/// [`NetworkSpec`] in Dhall format. The derived state of the result is checked before it is
/// returned.
pub fn read_network(path: impl AsRef<Path>) -> Result<Network, Error> {
    let path = path.as_ref();
    let network: Network = match extension(path) {
        Some("json") => {
            let reader = BufReader::new(File::open(path)?);
            serde_json::from_reader(reader)?
        }
        Some("msgpack") => {
            let reader = BufReader::new(File::open(path)?);
            rmp_serde::decode::from_read(reader)?
        }
        Some("dhall") => read_network_spec(path)?.build()?,
        _ => return Err(Error::UnknownFileType(path.into())),
    };
    network.check_caches_consistency()?;
    log::debug!(
        "read network with {} layers and {} nodes from {}",
        network.nr_layers(),
        network.nr_nodes(),
        path.display()
    );
    Ok(network)
}

/// Reads a [`NetworkSpec`] from a file in JSON or Dhall format.
pub fn read_network_spec(path: impl AsRef<Path>) -> Result<NetworkSpec, Error> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let spec: NetworkSpec = match extension(path) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.into())),
    };
    Ok(spec)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// A declarative description of a network. Elements refer to each other by name.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct NetworkSpec {
    /// Network name.
    #[serde(default)]
    pub name: String,
    /// Layers. The first one takes the place of the default layer. Without any, everything
    /// goes to the default layer.
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    /// Nodes.
    pub nodes: Vec<NodeSpec>,
    /// Links.
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    /// Unicast demands.
    #[serde(default)]
    pub demands: Vec<DemandSpec>,
    /// Routes of the demands in source-routed layers.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

/// A layer.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LayerSpec {
    /// Unique layer name.
    pub name: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Whether the layer is switched to hop-by-hop routing once its routes are in place.
    #[serde(default)]
    pub hop_by_hop: bool,
}

/// A node.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeSpec {
    /// Unique node name.
    pub name: String,
    /// Position.
    #[serde(default)]
    pub x: f64,
    /// Position.
    #[serde(default)]
    pub y: f64,
    /// Population.
    #[serde(default)]
    pub population: f64,
}

/// A link, or a pair of opposite links.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LinkSpec {
    /// Layer name; the first layer if absent.
    #[serde(default)]
    pub layer: Option<String>,
    /// Origin node name.
    pub origin: String,
    /// Destination node name.
    pub destination: String,
    /// Capacity.
    pub capacity: f64,
    /// Length in km.
    #[serde(default)]
    pub length_km: f64,
    /// Whether to add the opposite link too.
    #[serde(default)]
    pub bidirectional: bool,
}

/// A demand, or a pair of opposite demands.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct DemandSpec {
    /// Unique demand name. The opposite demand of a bidirectional pair gets the suffix `-rev`.
    pub name: String,
    /// Layer name; the first layer if absent.
    #[serde(default)]
    pub layer: Option<String>,
    /// Ingress node name.
    pub ingress: String,
    /// Egress node name.
    pub egress: String,
    /// Offered traffic.
    pub offered_traffic: f64,
    /// Whether to add the opposite demand too.
    #[serde(default)]
    pub bidirectional: bool,
}

/// A route over the links joining consecutive nodes, in the layer of its demand.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct RouteSpec {
    /// Demand name.
    pub demand: String,
    /// Carried traffic, which is also the capacity occupied in each link.
    pub carried_traffic: f64,
    /// Node names from ingress to egress.
    pub nodes: Vec<String>,
}

impl NetworkSpec {
    /// Builds the network this specification describes.
    pub fn build(&self) -> Result<Network, Error> {
        let mut network = Network::new();
        network.set_network_name(self.name.as_str());

        let mut layers = BTreeMap::new();
        let first = network.default_layer();
        for (i, spec) in self.layers.iter().enumerate() {
            let id = if i == 0 {
                network.set_name(first, spec.name.as_str())?;
                network.set_layer_description(first, spec.description.as_str())?;
                first
            } else {
                network.add_layer(spec.name.as_str(), spec.description.as_str())
            };
            if layers.insert(spec.name.as_str(), id).is_some() {
                return Err(Error::DuplicateName(spec.name.clone()));
            }
        }
        let layer_of = |name: &Option<String>| -> Result<LayerId, Error> {
            match name {
                Some(name) => layers
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| Error::UnknownName(name.clone())),
                None => Ok(first),
            }
        };

        let mut nodes = BTreeMap::new();
        for spec in &self.nodes {
            let id = network.add_node(spec.name.as_str(), Point::new(spec.x, spec.y));
            network.set_node_population(id, spec.population)?;
            if nodes.insert(spec.name.as_str(), id).is_some() {
                return Err(Error::DuplicateName(spec.name.clone()));
            }
        }
        let node_of = |name: &str| -> Result<NodeId, Error> {
            nodes
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownName(name.to_owned()))
        };

        for spec in &self.links {
            let layer = layer_of(&spec.layer)?;
            let (a, b) = (node_of(&spec.origin)?, node_of(&spec.destination)?);
            let length = Km::new(spec.length_km);
            if spec.bidirectional {
                network.add_link_bidirectional(layer, a, b, spec.capacity, length, KmPerSec::FIBER)?;
            } else {
                network.add_link(layer, a, b, spec.capacity, length, KmPerSec::FIBER)?;
            }
        }

        let mut demands = BTreeMap::new();
        for spec in &self.demands {
            let layer = layer_of(&spec.layer)?;
            let (a, b) = (node_of(&spec.ingress)?, node_of(&spec.egress)?);
            let mut named = Vec::new();
            if spec.bidirectional {
                let (ab, ba) = network.add_demand_bidirectional(layer, a, b, spec.offered_traffic)?;
                named.push((spec.name.clone(), ab, layer));
                named.push((format!("{}-rev", spec.name), ba, layer));
            } else {
                let ab = network.add_demand(layer, a, b, spec.offered_traffic)?;
                named.push((spec.name.clone(), ab, layer));
            }
            for (name, id, layer) in named {
                network.set_name(id, name.as_str())?;
                if demands.insert(name.clone(), (id, layer)).is_some() {
                    return Err(Error::DuplicateName(name));
                }
            }
        }

        for spec in &self.routes {
            let &(demand, layer) = demands
                .get(&spec.demand)
                .ok_or_else(|| Error::UnknownName(spec.demand.clone()))?;
            let links = spec
                .nodes
                .windows(2)
                .map(|pair| {
                    let (a, b) = (node_of(&pair[0])?, node_of(&pair[1])?);
                    network
                        .links_between(layer, a, b)
                        .next()
                        .map(|l| l.id())
                        .ok_or_else(|| Error::NoLink(pair[0].clone(), pair[1].clone()))
                })
                .collect::<Result<Vec<LinkId>, Error>>()?;
            network.add_route(demand, spec.carried_traffic, spec.carried_traffic, &links)?;
        }

        for spec in self.layers.iter().filter(|l| l.hop_by_hop) {
            let layer = layers[spec.name.as_str()];
            network.set_routing_type(layer, RoutingType::HopByHopRouting)?;
        }
        Ok(network)
    }
}

/// Error kinds for specifications and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Error deserializing MsgPack.
    #[error("MsgPack decoding error")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Error serializing MsgPack.
    #[error("MsgPack encoding error")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// The network was rejected or is inconsistent.
    #[error("invalid network")]
    Network(#[from] NetworkError),

    /// A specification refers to a name it does not define.
    #[error("unknown name: {0}")]
    UnknownName(String),

    /// A specification defines a name twice.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// A route specification steps between nodes with no link in the demand's layer.
    #[error("no link from {0} to {1}")]
    NoLink(String, String),
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    fn spec() -> NetworkSpec {
        let node = |name: &str, x: f64| NodeSpec {
            name: name.into(),
            x,
            y: 0.0,
            population: 10.0,
        };
        let link = |a: &str, b: &str| LinkSpec {
            layer: None,
            origin: a.into(),
            destination: b.into(),
            capacity: 10.0,
            length_km: 100.0,
            bidirectional: true,
        };
        NetworkSpec {
            name: "line".into(),
            layers: vec![
                LayerSpec {
                    name: "IP".into(),
                    ..Default::default()
                },
                LayerSpec {
                    name: "MPLS".into(),
                    hop_by_hop: true,
                    ..Default::default()
                },
            ],
            nodes: vec![node("a", 0.0), node("b", 1.0), node("c", 2.0)],
            links: vec![
                link("a", "b"),
                link("b", "c"),
                LinkSpec {
                    layer: Some("MPLS".into()),
                    ..link("a", "c")
                },
            ],
            demands: vec![
                DemandSpec {
                    name: "ac".into(),
                    layer: None,
                    ingress: "a".into(),
                    egress: "c".into(),
                    offered_traffic: 3.0,
                    bidirectional: true,
                },
                DemandSpec {
                    name: "mpls".into(),
                    layer: Some("MPLS".into()),
                    ingress: "a".into(),
                    egress: "c".into(),
                    offered_traffic: 1.0,
                    bidirectional: false,
                },
            ],
            routes: vec![
                RouteSpec {
                    demand: "ac".into(),
                    carried_traffic: 3.0,
                    nodes: vec!["a".into(), "b".into(), "c".into()],
                },
                RouteSpec {
                    demand: "mpls".into(),
                    carried_traffic: 1.0,
                    nodes: vec!["a".into(), "c".into()],
                },
            ],
        }
    }

    #[test]
    fn spec_builds_layers_and_routes() -> anyhow::Result<()> {
        let network = spec().build()?;
        let ip = network.layer_by_name("IP").context("missing IP layer")?;
        let mpls = network.layer_by_name("MPLS").context("missing MPLS layer")?;
        assert_eq!(ip.id(), network.default_layer());
        assert_eq!(ip.links().len(), 4);
        assert_eq!(ip.demands().len(), 2);
        assert_eq!(ip.routes().len(), 1);
        assert_eq!(mpls.routing_type(), RoutingType::HopByHopRouting);
        assert!(mpls.routes().is_empty());
        let b = network.node_by_name("b").context("missing node")?;
        let carried = network
            .links_in(ip.id())
            .filter(|l| l.origin() == b.id())
            .map(|l| l.carried_traffic())
            .sum::<f64>();
        assert_eq!(carried, 3.0);
        network.check_caches_consistency()?;
        Ok(())
    }

    #[test]
    fn spec_names_must_resolve() {
        let mut bad = spec();
        bad.routes[0].nodes = vec!["a".into(), "c".into()];
        assert!(matches!(bad.build(), Err(Error::NoLink(..))));
        let mut bad = spec();
        bad.links[0].destination = "z".into();
        assert!(matches!(bad.build(), Err(Error::UnknownName(name)) if name == "z"));
        let mut bad = spec();
        bad.nodes[1].name = "a".into();
        assert!(matches!(bad.build(), Err(Error::DuplicateName(_))));
    }

    #[test]
    fn snapshots_round_trip() -> anyhow::Result<()> {
        let mut network = spec().build()?;
        let b = network.node_by_name("b").context("missing node")?.id();
        network.set_attribute(b, "role", "core")?;
        network.add_tag(b, "pop")?;
        network.set_node_failure_state(b, false)?;
        let dir = tempfile::tempdir()?;
        for file in ["net.json", "net.msgpack"] {
            let path = dir.path().join(file);
            save_network(&path, &network).with_context(|| format!("saving {file}"))?;
            let read = read_network(&path).with_context(|| format!("reading {file}"))?;
            assert!(read.is_deep_copy(&network), "{file} differs");
            assert!(network.is_deep_copy(&read), "{file} differs");
        }
        Ok(())
    }

    #[test]
    fn dhall_spec_is_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("net.dhall");
        std::fs::write(
            &path,
            r#"
            { name = "pair"
            , nodes =
                [ { name = "x", x = 0.0, y = 0.0 }
                , { name = "y", x = 3.0, y = 4.0 }
                ]
            , links =
                [ { origin = "x", destination = "y", capacity = 40.0, length_km = 5.0, bidirectional = True } ]
            , demands =
                [ { name = "xy", ingress = "x", egress = "y", offered_traffic = 2.5 } ]
            , routes =
                [ { demand = "xy", carried_traffic = 2.5, nodes = [ "x", "y" ] } ]
            }
            "#,
        )?;
        let network = read_network(&path)?;
        assert_eq!(network.name(), "pair");
        assert_eq!(network.nr_links(), 2);
        let demand = network.demands().next().context("missing demand")?;
        assert_eq!(demand.name(), "xy");
        assert_eq!(demand.carried_traffic(), 2.5);
        Ok(())
    }

    #[test]
    fn unknown_extensions_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("net.yaml");
        assert!(matches!(
            save_network(&path, &Network::new()),
            Err(Error::UnknownFileType(_))
        ));
        assert!(matches!(read_network(&path), Err(Error::UnknownFileType(_))));
        Ok(())
    }
}
