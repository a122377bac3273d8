//! A domain view of a two-layer IP over WDM network with virtualized network functions.
//!
//! [`WNet`] and [`WNetMut`] wrap a borrowed [`Network`](layernet_core::Network) whose "WDM"
//! layer holds fibers (links), lightpath requests (demands) and lightpaths (routes), and whose
//! "IP" layer holds IP links, service chain requests and service chains. Every node has CPU, RAM
//! and HD resources, on which VNF instances are based. The VNF type and user service catalogs
//! are kept in the network attributes.

#![warn(unreachable_pub, missing_debug_implementations)]

mod catalog;
mod net;
mod views;

pub use catalog::{UserService, VnfType};
pub use net::{WNet, WNetMut, WNodeSpec};
pub use views::{
    WFiber, WIpLink, WLightpath, WLightpathRequest, WNode, WServiceChain, WServiceChainRequest,
    WVnfInstance,
};

use layernet_core::types::{ElementId, NodeId};
use layernet_core::NetworkError;

/// Name of the optical layer.
pub const WDM_LAYER: &str = "WDM";
/// Name of the packet layer.
pub const IP_LAYER: &str = "IP";

/// Characters that names cannot contain, since they separate names in lists.
pub const RESERVED_CHARACTERS: [char; 4] = [' ', ',', ';', ':'];

pub(crate) fn check_name(name: &str) -> Result<(), WNetError> {
    if name.is_empty() || name.contains(RESERVED_CHARACTERS) {
        return Err(WNetError::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum WNetError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("the network has no {0} layer")]
    MissingLayer(&'static str),

    #[error("only an empty network can be initialized")]
    NotEmpty,

    #[error("invalid name {0:?}: names are non-empty and free of spaces, commas, semicolons and colons")]
    InvalidName(String),

    #[error("name {0:?} is already in use")]
    DuplicateName(String),

    #[error("{element} is not a {expected}")]
    WrongKind {
        element: ElementId,
        expected: &'static str,
    },

    #[error("unknown VNF type {0:?}")]
    UnknownVnfType(String),

    #[error("unknown user service {0:?}")]
    UnknownUserService(String),

    #[error("invalid catalog entry {name:?}: {reason}")]
    InvalidCatalogEntry { name: String, reason: String },

    #[error("VNF type {vnf_type:?} cannot be hosted at node {node}")]
    HostNotAllowed { vnf_type: String, node: NodeId },

    #[error("user service {service:?} needs a core node at {node}")]
    NotCoreNode { service: String, node: NodeId },

    #[error("VNF type {0:?} still has instances")]
    VnfTypeInUse(String),

    #[error("corrupt catalog")]
    Catalog(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_reject_separators() {
        assert!(check_name("madrid-1").is_ok());
        for bad in ["", "new york", "a,b", "a;b", "a:b"] {
            assert!(matches!(check_name(bad), Err(WNetError::InvalidName(_))), "{bad:?}");
        }
    }
}
