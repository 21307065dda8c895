//! HTTP surface: router, middleware layers, and server wiring.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub(crate) mod handlers;

pub use handlers::{AuthConfig, AuthState};

use handlers::{account, auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::registration::initiate,
        auth::registration::verify,
        auth::registration::complete,
        auth::session::login,
        auth::session::refresh,
        auth::session::request_password_reset,
        auth::session::confirm_password_reset,
        auth::apple::apple_login,
        account::get_account,
        account::update_account,
        account::delete_account,
        account::restore,
    ),
    components(schemas(
        auth::types::InitiateRegistrationRequest,
        auth::types::InitiateRegistrationResponse,
        auth::types::VerifyEmailRequest,
        auth::types::VerifyEmailResponse,
        auth::types::MemberCredentials,
        auth::types::CompleteRegistrationRequest,
        auth::types::CompleteRegistrationResponse,
        auth::types::LoginRequest,
        auth::types::TokenPairResponse,
        auth::types::RefreshRequest,
        auth::types::AppleLoginRequest,
        auth::types::PasswordResetRequest,
        auth::types::PasswordResetConfirmRequest,
        auth::types::MessageResponse,
        auth::types::AccountResponse,
        auth::types::AccountUpdateRequest,
    )),
    tags(
        (name = "auth", description = "Registration, login, and token endpoints"),
        (name = "account", description = "Account profile and lifecycle"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: &str, auth_state: Arc<AuthState>) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(health::health))
        .route(
            "/api/v1/auth/register/initiate",
            post(auth::registration::initiate),
        )
        .route(
            "/api/v1/auth/register/verify",
            post(auth::registration::verify),
        )
        .route(
            "/api/v1/auth/register/complete",
            post(auth::registration::complete),
        )
        .route("/api/v1/auth/login", post(auth::session::login))
        .route("/api/v1/auth/refresh", post(auth::session::refresh))
        .route("/api/v1/auth/apple", post(auth::apple::apple_login))
        .route(
            "/api/v1/auth/password-reset/request",
            post(auth::session::request_password_reset),
        )
        .route(
            "/api/v1/auth/password-reset/confirm",
            post(auth::session::confirm_password_reset),
        )
        .route(
            "/api/v1/account",
            get(account::get_account)
                .patch(account::update_account)
                .delete(account::delete_account),
        )
        .route("/api/v1/account/restore", post(account::restore))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state.clone()))
                .layer(Extension(pool.clone())),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
