//! # Integration Tests
//!
//! Full passes over an in-memory bucket written by simulated nodes.

pub mod faults;
pub mod flows;
