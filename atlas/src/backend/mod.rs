//! Concrete storage-tier implementations and their test doubles.

pub mod analytics;
pub mod fulltext;
pub mod memory;
pub mod postgres;
pub mod qdrant;
pub mod redis;
