// rest_api/src/lib.rs

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn_with_state, map_response};
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Duration;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use clinic_models::Role;
use clinic_security::{AccountService, AuthorizationGate, TokenService};
use clinic_storage::{Database, PatientStore};

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;

use crate::config::{ApiConfig, CorsConfig};
use crate::middleware::{handle_panic, method_not_allowed_envelope, require_roles, RoleGuard};
use crate::rate_limit::{rate_limit, RateLimiter};

const RECEPTIONIST: &[Role] = &[Role::Receptionist];
const STAFF: &[Role] = &[Role::Receptionist, Role::Doctor];

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub patients: Arc<dyn PatientStore>,
    pub gate: AuthorizationGate,
    pub environment: String,
}

impl AppState {
    pub fn new(db: &Database, config: &ApiConfig) -> Self {
        let tokens = TokenService::new(db.tokens.clone(), Duration::hours(config.auth.token_ttl_hours));
        AppState {
            accounts: AccountService::new(db.accounts.clone(), tokens.clone(), config.auth.password_cost),
            patients: db.patients.clone(),
            gate: AuthorizationGate::new(tokens),
            environment: config.server.env.clone(),
        }
    }
}

/// Routes, each protected group behind its role guard.
pub fn routes(state: AppState) -> Router {
    let receptionist = from_fn_with_state(RoleGuard::new(state.gate.clone(), RECEPTIONIST), require_roles);
    let staff = from_fn_with_state(RoleGuard::new(state.gate.clone(), STAFF), require_roles);

    Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/v1/register", post(handlers::register))
        .route("/v1/tokens/authentication", post(handlers::login))
        .route(
            "/v1/accounts/me",
            get(handlers::show_account)
                .patch(handlers::update_account)
                .route_layer(staff.clone()),
        )
        .route(
            "/v1/patients",
            post(handlers::create_patient)
                .route_layer(receptionist.clone())
                .merge(get(handlers::list_patients).route_layer(staff.clone())),
        )
        .route(
            "/v1/patients/:id",
            get(handlers::show_patient)
                .put(handlers::update_patient)
                .route_layer(staff)
                .merge(delete(handlers::delete_patient).route_layer(receptionist)),
        )
        .fallback(handlers::not_found)
        .with_state(state)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) if origin != "*" => Some(value),
            _ => {
                warn!("ignoring invalid trusted origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Wraps a router in the boundary stack, innermost first: 405 bodies, rate
/// limiting, CORS, request tracing, panic recovery.
pub fn with_boundary(router: Router, limiter: RateLimiter, cors: &CorsConfig) -> Router {
    router
        .layer(map_response(method_not_allowed_envelope))
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

pub fn app(state: AppState, limiter: RateLimiter, cors: &CorsConfig) -> Router {
    with_boundary(routes(state), limiter, cors)
}

/// Opens storage, serves until `shutdown` resolves, then stops the sweeper and
/// flushes the database.
pub async fn start_server<F>(config: ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let db = Database::open(&config.storage.to_storage_config())
        .with_context(|| format!("Failed to open database at {}", config.storage.path.display()))?;

    let state = AppState::new(&db, &config);
    let limiter = RateLimiter::new(config.limiter.settings());
    let sweeper = limiter.enabled().then(|| limiter.start_sweeper());
    let router = app(state, limiter, &config.cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;
    info!("Clinic API ({}) listening on {}", config.server.env, addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Clinic API server failed")?;

    info!("Clinic API shutting down");
    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }
    db.flush().await.context("Failed to flush database")?;
    info!("Clinic API stopped");
    Ok(())
}
