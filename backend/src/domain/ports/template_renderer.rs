//! Driven port for server-side page rendering.

use serde_json::Value;

use super::define_port_error;

define_port_error! {
    /// Failures raised while rendering a page.
    pub enum TemplateError {
        /// No template is registered under the requested name.
        NotFound { name: String } => "template not found: {name}",
        /// The template failed to compile or evaluate.
        Render { name: String, message: String } => "failed to render {name}: {message}",
    }
}

/// Renders a named template against a JSON context.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Render `name` with `context` into an HTML string.
    fn render(&self, name: &str, context: &Value) -> Result<String, TemplateError>;
}
