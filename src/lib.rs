//! shell-cache: offline response-cache gateway for an installable web app.
//!
//! Sits in front of an opaque origin server and serves every request
//! according to its route class:
//!   excluded → pass-through, shell assets → stale-while-revalidate,
//!   allow-listed third-party hosts → cache-first,
//!   everything else → network-first with cache fallback.
//!
//! Cached responses live in versioned generation stores that are installed
//! all-or-nothing and swapped atomically on activation.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod server;
