//! Offline response-cache controller.
//!
//! This module contains the core cache machinery:
//! - [`entry`]: request identity and on-disk entry framing
//! - [`store`]: per-generation persistent key→response store
//! - [`lifecycle`]: generation install/activate state machine and the
//!   active-store handle
//! - [`classify`]: ordered first-match-wins route classification
//! - [`dispatch`]: per-class caching strategies

pub mod classify;
pub mod dispatch;
pub mod entry;
pub mod lifecycle;
pub mod store;
