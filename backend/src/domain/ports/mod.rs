//! Domain ports for the hexagonal boundary.
//!
//! The domain depends on these traits; adapters under `outbound` implement
//! them and inbound adapters receive them through the application state.

mod macros;
pub(crate) use macros::define_port_error;

mod document_store;
mod template_renderer;

#[cfg(test)]
pub use document_store::MockDocumentStore;
pub use document_store::{DocumentStore, DocumentStoreError, IndexSpec, UpdateOutcome};
#[cfg(test)]
pub use template_renderer::MockTemplateRenderer;
pub use template_renderer::{TemplateError, TemplateRenderer};
