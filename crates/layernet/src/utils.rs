//! Saving and loading networks, and building them from declarative specs.

pub use layernet_utils::*;
