//! Session layer: registration, login and the bearer-token middleware.
//!
//! The token is an HS256 JWT carrying a subject-only claim (the user id).
//! Passwords are bcrypt-hashed at rest and never leave this module.

use crate::api::models::{CredentialsRequest, ErrorResponse, RegisterResponse, TokenResponse};
use crate::api::AppState;
use crate::error::{EngineError, EngineResult};
use crate::model::UserId;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    exp: i64,
}

/// Signing and verification keys derived from the configured secret.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a session token for a user.
    pub fn issue(&self, user: UserId) -> EngineResult<String> {
        let claims = Claims {
            sub: user.0,
            exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify a token and extract the user it was issued to.
    pub fn verify(&self, token: &str) -> EngineResult<UserId> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(UserId(data.claims.sub))
    }
}

/// `POST /api/v1/register`
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    let hash = match bcrypt::hash(&request.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(err) => {
            warn!(error = %err, "password hashing failed");
            return internal_error();
        }
    };
    match state.scheduler.store().create_user(&request.login, &hash) {
        Ok(user) => (StatusCode::OK, Json(RegisterResponse { id: user.0 })).into_response(),
        Err(EngineError::LoginTaken(login)) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("login {login} is already taken"),
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "registration failed");
            internal_error()
        }
    }
}

/// `POST /api/v1/login`
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    let lookup = match state.scheduler.store().user_by_login(&request.login) {
        Ok(lookup) => lookup,
        Err(err) => {
            warn!(error = %err, "login lookup failed");
            return internal_error();
        }
    };
    let Some((user, hash)) = lookup else {
        return invalid_credentials();
    };
    if !bcrypt::verify(&request.password, &hash).unwrap_or(false) {
        return invalid_credentials();
    }
    match state.keys.issue(user) {
        Ok(token) => (StatusCode::OK, Json(TokenResponse { token })).into_response(),
        Err(err) => {
            warn!(error = %err, "token issuance failed");
            internal_error()
        }
    }
}

/// Middleware: extract the bearer token, verify it and inject the `UserId`
/// as a request extension. 401 otherwise.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return unauthorized();
    };
    match state.keys.verify(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(_) => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
        }),
    )
        .into_response()
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: "invalid credentials".to_string(),
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}
