//! Domain primitives, the persistence model layer and account workflows.
//!
//! Public surface:
//! - Error (alias to `error::Error`): error payload shared with the HTTP adapter.
//! - ErrorCode (alias to `error::ErrorCode`): stable error identifier.
//! - TraceId: per-request correlation identifier.
//! - User / Principal: registered accounts and the session principal.
//! - AccountService: signup, login and profile workflows.
//! - SessionRegistry / SessionId: server-side session records.

pub mod accounts;
pub mod credentials;
pub mod document;
pub mod error;
pub mod forms;
pub mod model;
pub mod ports;
pub mod sessions;
pub mod trace_id;
pub mod user;

pub use self::accounts::AccountService;
pub use self::sessions::{SessionId, SessionRegistry};
pub use self::error::{Error, ErrorCode, ErrorValidationError, TRACE_ID_HEADER};
pub use self::trace_id::TraceId;
pub use self::user::{Principal, User, UserView};

/// Convenient handler result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use calendio::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
