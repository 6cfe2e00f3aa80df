//! Request middleware.
//!
//! Purpose: attach a trace identifier and request span to every request.

pub mod trace;

pub use trace::Trace;
