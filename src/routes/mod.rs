use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware::{self as axum_middleware},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{password, CredentialVerifier, Identity};
use crate::config::Config;
use crate::db::{Database, NewIdentity};
use crate::error::{ApiError, Result};
use crate::middleware;
use crate::models::user::{is_valid_username, RegisterUserRequest, TokenResponse, UserResponse};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Database>,
    pub verifier: Arc<CredentialVerifier>,
    pub config: Arc<Config>,
}

/// Index and health routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index", get(index_handler))
        .route("/health", get(health_handler))
}

/// User registration and lookup (no authentication required)
pub fn user_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(register_user_handler))
        .route("/api/users/", post(register_user_handler))
        .route("/api/users/:username", get(get_user_handler))
        .route("/api/users/:username/", get(get_user_handler))
        .with_state(state)
}

/// Routes that require an authenticated identity
pub fn protected_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/resource", get(resource_handler))
        .route("/api/resource/", get(resource_handler))
        .route("/api/token", get(token_handler))
        .route("/api/token/", get(token_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// Run a store or hashing call on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
}

/// GET / - Greeting
async fn index_handler() -> &'static str {
    "Hello World!"
}

/// GET /health - Detailed health check
///
/// Returns status, timestamp and version. No authentication (for load balancers).
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// POST /api/users - Register a new identity
///
/// Requires `username` and `password`; `email` and `name` are optional.
/// Responds 201 with the username and a Location header for the new user.
async fn register_user_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<Response> {
    let username = request
        .username
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::ValidationError("username is required".to_string()))?;
    let plain_password = request
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::ValidationError("password is required".to_string()))?;

    if !is_valid_username(&username) {
        return Err(ApiError::ValidationError(
            "username must be 1-15 characters of letters, digits, '_', '.' or '-'".to_string(),
        ));
    }

    let store = state.store.clone();
    let lookup = username.clone();
    if run_blocking(move || Ok(store.find_by_username(&lookup)?))
        .await?
        .is_some()
    {
        tracing::info!("User {} exists in the database", username);
        return Err(ApiError::ValidationError(format!(
            "User {} already exists",
            username
        )));
    }

    let store = state.store.clone();
    let (email, name) = (request.email, request.name);
    // The insert is still authoritative if two registrations race past the check above
    let identity = run_blocking(move || {
        let password_hash = password::hash_password(&plain_password)?;
        Ok(store.store_new_identity(NewIdentity {
            username,
            password_hash,
            email,
            name,
        })?)
    })
    .await?;

    let location = format!("/api/users/{}", identity.username);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "username": identity.username })),
    )
        .into_response())
}

/// GET /api/users/:username - Look up a single user
///
/// An unknown username yields `{"user": null}`.
async fn get_user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>> {
    let store = state.store.clone();
    let user = run_blocking(move || Ok(store.find_by_username(&username)?))
        .await?
        .map(UserResponse::from);
    Ok(Json(json!({ "user": user })))
}

/// GET /api/resource - Greet the authenticated identity
async fn resource_handler(Extension(identity): Extension<Identity>) -> Json<Value> {
    Json(json!({ "data": format!("Hello, {}!", identity.username) }))
}

/// GET /api/token - Issue a session token for the authenticated identity
async fn token_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<TokenResponse>> {
    let ttl = state.config.token_ttl;
    let token = state.verifier.signer().issue(&identity.username, ttl)?;
    tracing::info!("Issued session token for {} (ttl {}s)", identity.username, ttl);

    Ok(Json(TokenResponse {
        token,
        duration: ttl,
    }))
}
