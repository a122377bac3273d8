//! `LayerNet` is a library for modelling multi-layer network designs: topology layers of nodes
//! and links, the demands offered to them and the routes, trees and service chains that carry
//! them. Every change to a [`Network`](core::Network) brings its carried traffic, occupied
//! capacity, coupled values between layers and failure effects up to date before returning.
//! Designs can be saved and loaded with [`utils`], and viewed as IP over WDM networks with
//! virtualized network functions through [`wnet`].

#![warn(unreachable_pub, missing_docs)]

pub mod core;
pub mod utils;
pub mod wnet;
