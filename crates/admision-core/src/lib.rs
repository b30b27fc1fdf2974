//! admision-core: Domain model, scoring and export engine.
//!
//! This crate defines the area layouts, the per-attempt and per-student
//! score computations (including nivelación), and the engine that pulls
//! attempts from a grading source over a bounded worker pool.

pub mod engine;
pub mod error;
pub mod model;
pub mod report;
pub mod results;
pub mod scoring;
pub mod summary;
pub mod traits;
pub mod window;
