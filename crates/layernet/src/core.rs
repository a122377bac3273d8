//! Core LayerNet data structures and routines. The entry point is [`Network`], and candidate
//! path searches are configured with [`CandidatePathOpts`].

pub use layernet_core::*;
