#![warn(unreachable_pub, missing_debug_implementations)]

//! The core LayerNet library. A [`Network`] holds a multi-layer network design and keeps its
//! derived state (carried traffic, occupied capacity, coupled values, failure effects) up to
//! date after every change. The [`candidates`] module searches constrained candidate paths,
//! service chains and multicast trees over it.

#[macro_use]
mod ident;

pub mod candidates;
mod network;
pub mod opts;
pub mod units;

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use candidates::{CandidatePath, CandidateTree, Disjointness};
pub use network::types;
pub use network::{CapacityCheck, Network, NetworkError};
pub use opts::{CandidatePathOpts, MulticastTreeOpts, ServiceChainOpts};
