//! CalendIO backend library modules.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;

pub use domain::TraceId;
