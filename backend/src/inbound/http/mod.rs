//! HTTP inbound adapter: server-rendered pages behind session guards.

pub mod account;
pub mod error;
pub mod events;
pub mod guards;
pub mod health;
pub mod home;
pub mod identity;
pub mod render;
pub mod routes;
pub mod session;
pub mod session_config;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod xsrf;

pub use error::ApiResult;
pub use guards::{AnonymousOnly, Guard, GuardDecision, RequireAuthenticated, guarded};
pub use identity::RequestIdentity;
pub use session::SessionContext;
pub use state::{HttpState, PageSettings};
