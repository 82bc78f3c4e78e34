//! # Adapters Module
//!
//! In-memory implementations of the outbound ports, a JSON file state
//! store, and a simulated node publisher.

pub mod file_state;
pub mod memory;
pub mod publisher;

pub use file_state::JsonFileStateStore;
pub use memory::{CollectingSink, MemoryObjectStore, MemoryStateStore, StaticNodeRegistry};
pub use publisher::{PublishedFile, SimulatedNode, StreamPublisher};
