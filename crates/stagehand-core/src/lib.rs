//! Core domain types for the Stagehand stage scheduler.
//!
//! This crate contains:
//! - Stage and build identifiers
//! - Stage descriptors, capability filters and assignments
//! - Store traits consumed by the scheduler and the transport
//! - An in-memory store for tests and single-process setups

pub mod error;
pub mod id;
pub mod memory;
pub mod stage;
pub mod store;

pub use error::{Error, Result};
pub use id::{BuildId, StageId};
pub use memory::MemoryStageStore;
pub use stage::{
    CapabilityFilter, DEFAULT_KIND, DEFAULT_TYPE, StageAssignment, StageDescriptor, StageStatus,
};
pub use store::{NewStage, StageFilter, StageRepo, StageStore};
