//! Server construction and middleware wiring.

mod config;

pub use config::ServerConfig;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tracing::info;

use calendio::inbound::http::health::HealthState;
use calendio::inbound::http::session_config::SessionSettings;
use calendio::inbound::http::routes;
use calendio::inbound::http::state::HttpState;
use calendio::middleware::Trace;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    session: SessionSettings,
    session_ttl_days: i64,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        session,
        session_ttl_days,
    } = deps;

    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(session.middleware(session_ttl_days))
        .wrap(Trace)
        .configure(routes::configure)
}

/// Bind the listener and start serving.
///
/// Readiness flips once the socket is bound.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig {
        http_state,
        session,
        session_ttl_days,
        bind_addr,
    } = config;
    let deps = AppDependencies {
        health_state: health_state.clone(),
        http_state: web::Data::new(http_state),
        session,
        session_ttl_days,
    };

    let server = HttpServer::new(move || build_app(deps.clone()))
        .bind(bind_addr)?
        .run();

    health_state.mark_ready();
    info!(%bind_addr, "listening");
    Ok(server)
}
