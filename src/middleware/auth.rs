use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{TokenError, TokenService};
use crate::database::models::{TokenScope, User};
use crate::error::ApiError;

/// Who is making the request. Set by [`authenticate`] on every request.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| ApiError::InvalidCredentials)?;
    if value.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Ok(Some(token)),
        _ => Err(ApiError::InvalidCredentials),
    }
}

async fn identify(tokens: &TokenService, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let Some(plaintext) = bearer_token(headers)? else {
        return Ok(Identity::Anonymous);
    };

    match tokens.validate(TokenScope::Authentication, plaintext).await {
        Ok(user) => Ok(Identity::Authenticated(user)),
        Err(TokenError::Malformed(_)) | Err(TokenError::NotFound) => {
            tracing::warn!("rejected authentication token");
            Err(ApiError::InvalidAuthenticationToken)
        }
        Err(TokenError::Database(e)) => Err(e.into()),
    }
}

/// Resolves the bearer token into an [`Identity`]. A missing header is
/// anonymous; a malformed, unknown or expired token is rejected here.
pub async fn authenticate(State(tokens): State<TokenService>, mut request: Request, next: Next) -> Response {
    let mut response = match identify(&tokens, request.headers()).await {
        Ok(identity) => {
            if let Identity::Authenticated(user) = &identity {
                tracing::debug!(user_id = %user.id, "authenticated request");
            }
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// The caller's identity, anonymous when the authentication layer is absent.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or(Identity::Anonymous))
    }
}

/// Extractor for handlers that need a signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Identity::from_request_parts(parts, state).await? {
            Identity::Authenticated(user) => Ok(CurrentUser(user)),
            Identity::Anonymous => Err(ApiError::AuthenticationRequired),
        }
    }
}
