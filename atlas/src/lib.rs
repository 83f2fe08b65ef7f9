//! # Atlas
//!
//! A local knowledge-ingestion and semantic-search daemon core: watches
//! sources, chunks and embeds content, and serves hybrid search over a
//! multi-tier storage coordinator.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐      ┌───────────┐
//! │ Watcher  │──▶│  Debounce  │──▶│  Chunk+Embed │──────▶ Coordinator│
//! │ (notify) │   │ per path   │   │  (adaptive)  │      └─────┬─────┘
//! └──────────┘   └────────────┘   └──────────────┘            │
//!                                                  ┌───────────┼───────────┬────────────┐
//!                                                  ▼           ▼           ▼            ▼
//!                                              Vector     Metadata      Cache       FullText
//!                                              (Qdrant)   (Postgres)   (Redis)      (HTTP)
//! ```
//!
//! Pluggable storage tiers are capability traits defined in `atlas_core`;
//! this crate wires a concrete backend per tier, a content-address tracker
//! ([`tracker`]) to decide what needs reingesting, an adaptive-concurrency
//! embedding stage ([`adaptive`]), and a [`search::SearchEngine`] over the
//! result.

pub mod adaptive;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod orchestrator;
pub mod pressure;
pub mod scheduler;
pub mod search;
pub mod tracker;

pub use atlas_core::{backend as core_backend, chunk, error, filter, model, pressure as core_pressure, search as core_search};
