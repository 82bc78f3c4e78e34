//! # Ports Module
//!
//! Hexagonal architecture ports for stream ingestion.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
