//! Shared HTTP adapter state.
//!
//! Built once at startup and handed to handlers through `web::Data`, so
//! handlers depend on the account workflows and the renderer port only.

use std::sync::Arc;

use crate::domain::AccountService;
use crate::domain::ports::TemplateRenderer;

/// Page-level settings that end up in every template context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSettings {
    /// URL prefix for static assets.
    pub static_url: String,
    /// Whether `POST` forms must carry the session's `_xsrf` token.
    pub xsrf_cookies: bool,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            static_url: "/static/".to_owned(),
            xsrf_cookies: true,
        }
    }
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Signup, login and profile workflows.
    pub accounts: AccountService,
    /// Page renderer.
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Context settings shared by every page.
    pub pages: PageSettings,
}

impl HttpState {
    /// State with default page settings.
    pub fn new(accounts: AccountService, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            accounts,
            renderer,
            pages: PageSettings::default(),
        }
    }

    /// Replace the page settings.
    #[must_use]
    pub fn with_pages(mut self, pages: PageSettings) -> Self {
        self.pages = pages;
        self
    }
}
