//! Shared-secret authentication for every route
//!
//! Browsers cannot attach headers to a WebSocket handshake, so the token is
//! accepted either as `Authorization: Bearer <token>` or as a `token` query
//! parameter.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

pub async fn auth_middleware(
    State(expected): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = bearer_token(&request)
        .transpose()?
        .or_else(|| query_token(&request))
        .ok_or(AuthError::MissingToken)?;

    if presented != expected {
        debug!(path = %request.uri().path(), "rejected request with invalid token");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<Result<String, AuthError>> {
    let header = request.headers().get(AUTHORIZATION)?;
    let parsed = header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
        .ok_or(AuthError::InvalidFormat);
    Some(parsed)
}

fn query_token(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        pair.strip_prefix("token=")
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingToken,
    #[error("invalid Authorization format (expected: Bearer <token>)")]
    InvalidFormat,
    #[error("invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        };
        (status, self.to_string()).into_response()
    }
}
