//! Stage scheduling for Stagehand.
//!
//! Runners long-poll for work by describing what they can execute; the
//! [`Queue`] keeps them in an in-memory registry and a single loop matches
//! them against eligible stages read from a [`stagehand_core::StageStore`].
//! Producers only ever nudge the loop, they never hand it stages directly.

pub mod matcher;
pub mod queue;
pub mod scheduler;

pub use matcher::matches;
pub use queue::{Queue, QueueStats};
pub use scheduler::{QueueScheduler, Scheduler};
