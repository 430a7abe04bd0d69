//! # Mitm-Relay API
//!
//! Status and control endpoint: last relayed buffers, traffic logging
//! switch and session statistics.

pub mod handlers;
pub mod pages;
pub mod router;

pub use router::create_router;
