//! HTTP gateway surface.
//!
//! - [`gateway`]: proxy fallback route plus cache control endpoints

pub mod gateway;
