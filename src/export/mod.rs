//! Model persistence
//!
//! Trained pipelines are saved in one or both formats:
//! - Binary (bincode envelope with a checksum)
//! - JSON (portable, human-readable)

mod store;

pub use store::{ModelMetadata, ModelStore, SerializationFormat};
