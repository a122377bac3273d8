//! The IP over WDM network view.

pub use layernet_wnet::*;
