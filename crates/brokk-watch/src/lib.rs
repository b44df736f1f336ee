//! File Watch & Change-Propagation Core.
//!
//! A project-wide filesystem watcher ([`service`]) that batches raw
//! changes into [`service::EventBatch`]es with pause/resume and listener
//! isolation, a [`classifier`] that separates git-metadata churn from
//! tracked-file edits, and the glob matcher ([`patterns`]) the watcher's
//! include/ignore pattern lists are checked against.

pub mod classifier;
pub mod patterns;
pub mod service;

pub use classifier::*;
pub use patterns::*;
pub use service::*;
