pub(crate) mod account;
pub(crate) mod auth;
pub(crate) mod health;

pub use auth::{AuthConfig, AuthState};

use axum::response::IntoResponse;

// Root responds with the service name so load balancers get a cheap 200.
pub(crate) async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
