//! Outbound adapters implementing the domain ports.
//!
//! - **memory**: process-local document store for development and tests
//! - **persistence**: PostgreSQL document store using Diesel
//! - **pipeline**: aggregation evaluator shared by both stores
//! - **templates**: MiniJinja page renderer

pub mod memory;
pub mod persistence;
pub mod pipeline;
pub mod templates;
