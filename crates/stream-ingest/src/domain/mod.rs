//! # Domain Module
//!
//! Core domain types for stream ingestion.

pub mod entities;
pub mod errors;
pub mod filename;
pub mod invariants;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use filename::*;
pub use invariants::*;
pub use value_objects::*;
