//! Shared, I/O-free logic for Atlas.
//!
//! This crate holds everything that can be exercised without a runtime or a
//! network socket: the data model, the chunker, the embedding codec, the
//! filter IR and its translators, the storage-backend capability traits,
//! the hybrid-search fusion rule, the pressure classifier, and the typed
//! error surface. Concrete backends, the scheduler, the adaptive-
//! concurrency stage, and anything else that touches tokio/sqlx/network
//! live in the `atlas` app crate.

pub mod backend;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod model;
pub mod pressure;
pub mod search;
