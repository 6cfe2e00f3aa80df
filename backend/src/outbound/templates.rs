//! MiniJinja adapter for the template renderer port.
//!
//! Page contexts arrive as JSON. Two keys are turned into callables before
//! rendering: `reverse_url` (a route name to path map) becomes
//! `reverse_url(name)`, and `static` (the asset prefix) becomes
//! `static(path)`.

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{Environment, Error as JinjaError, ErrorKind, Value as JinjaValue, path_loader};
use serde_json::Value;
use tracing::{debug, error};

use crate::domain::ports::{TemplateError, TemplateRenderer};

const REVERSE_URL: &str = "reverse_url";
const STATIC: &str = "static";

/// [`TemplateRenderer`] backed by a MiniJinja environment.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Load templates lazily from `directory`.
    pub fn from_directory(directory: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(directory.as_ref()));
        debug!(directory = %directory.as_ref().display(), "template loader configured");
        Self { env }
    }

    /// Renderer over in-memory template sources.
    pub fn from_sources<I, N, S>(sources: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut env = Environment::new();
        for (name, source) in sources {
            let name = name.into();
            env.add_template_owned(name.clone(), source.into())
                .map_err(|err| TemplateError::render(name, err.to_string()))?;
        }
        Ok(Self { env })
    }
}

fn reverse_url_function(routes: BTreeMap<String, String>) -> JinjaValue {
    JinjaValue::from_function(move |name: &str| -> Result<JinjaValue, JinjaError> {
        routes
            .get(name)
            .map(|path| JinjaValue::from_safe_string(path.clone()))
            .ok_or_else(|| {
                JinjaError::new(ErrorKind::InvalidOperation, format!("no route named {name}"))
            })
    })
}

fn static_function(prefix: String) -> JinjaValue {
    JinjaValue::from_function(move |path: &str| -> JinjaValue {
        JinjaValue::from_safe_string(format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    })
}

/// Split the callable keys out of `context`.
fn prepare(context: &Value) -> JinjaValue {
    let mut data = context.as_object().cloned().unwrap_or_default();
    let routes: BTreeMap<String, String> = match data.remove(REVERSE_URL) {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(name, path)| path.as_str().map(|path| (name, path.to_owned())))
            .collect(),
        _ => BTreeMap::new(),
    };
    let prefix = match data.remove(STATIC) {
        Some(Value::String(prefix)) => prefix,
        _ => "/static/".to_owned(),
    };
    let mut values: BTreeMap<String, JinjaValue> = data
        .iter()
        .map(|(key, value)| (key.clone(), JinjaValue::from_serialize(value)))
        .collect();
    values.insert(REVERSE_URL.to_owned(), reverse_url_function(routes));
    values.insert(STATIC.to_owned(), static_function(prefix));
    JinjaValue::from(values)
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, name: &str, context: &Value) -> Result<String, TemplateError> {
        let template = self.env.get_template(name).map_err(|err| match err.kind() {
            ErrorKind::TemplateNotFound => TemplateError::not_found(name),
            _ => TemplateError::render(name, err.to_string()),
        })?;
        template.render(prepare(context)).map_err(|err| {
            error!(template = name, error = %err, "template rendering failed");
            TemplateError::render(name, err.to_string())
        })
    }
}
