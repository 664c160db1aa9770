//! Repository implementations.

pub mod stage;

pub use stage::{PgStageStore, StageRecord};
