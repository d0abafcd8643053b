// Authentication, CORS, and request tracing middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{HttpMakeClassifier, TraceLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Credential string (username or session token) and password as sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredentials {
    pub credential: String,
    pub password: String,
}

/// Pull credentials out of the Authorization header
///
/// - `Basic base64(credential:password)`: credential is a username or a token
/// - `Bearer <token>`: a token with an empty password
pub fn extract_credentials(headers: &HeaderMap) -> Option<PresentedCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, rest) = value.split_once(' ')?;
    let rest = rest.trim();

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = STANDARD.decode(rest).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (credential, password) = decoded.split_once(':')?;
        return Some(PresentedCredentials {
            credential: credential.to_string(),
            password: password.to_string(),
        });
    }

    if scheme.eq_ignore_ascii_case("bearer") && !rest.is_empty() {
        return Some(PresentedCredentials {
            credential: rest.to_string(),
            password: String::new(),
        });
    }

    None
}

/// Authentication middleware
///
/// Verifies the caller by session token or username/password and binds the
/// resulting `Identity` to the request extensions. Any failure is a 401 that
/// does not say which check failed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(presented) = extract_credentials(request.headers()) {
        let verifier = state.verifier.clone();
        // Password hashing is CPU-heavy, keep it off the async workers
        let verified = tokio::task::spawn_blocking(move || {
            verifier.verify(&presented.credential, &presented.password)
        })
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

        if let Some(identity) = verified {
            request.extensions_mut().insert(identity);
            return Ok(next.run(request).await);
        }
    }

    let path = request.uri().path();
    let method = request.method();
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    tracing::warn!(
        "[{}] Access attempt with invalid or missing credentials: {} {}",
        request_id,
        method,
        path
    );
    Err(ApiError::AuthError("Unauthorized access".to_string()))
}

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
/// Handles OPTIONS preflight requests automatically.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Per-request tracing spans and status logging
pub fn trace_layer() -> TraceLayer<HttpMakeClassifier> {
    TraceLayer::new_for_http()
}
