//! # Stream Mirror Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Simulated network: nodes, publisher, runner wiring
//! └── integration/      # End-to-end ingestion passes
//!     ├── flows.rs      # Happy paths across passes, kinds and encodings
//!     └── faults.rs     # Bad copies, halts, bypass, sidecars, port failures
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p stream-tests
//! cargo test -p stream-tests integration::faults::
//!
//! # Benchmarks
//! cargo bench -p stream-tests
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
