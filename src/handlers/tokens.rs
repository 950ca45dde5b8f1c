use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::authentication_ttl;
use crate::database::models::{validate_email, validate_password_plaintext, TokenScope};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::handlers::extract::JsonBody;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::server::AppState;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /v1/tokens/authentication
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<Credentials>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(v.into());
    }

    let user = match state.repos.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => {
            tracing::warn!("login attempt for unknown email");
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    let password = user.password.clone();
    let matched = tokio::task::spawn_blocking(move || password.matches(&input.password))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("password check task failed: {}", e)))??;

    if !matched {
        tracing::warn!(user_id = %user.id, "login attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(user.id, authentication_ttl(), TokenScope::Authentication)
        .await?;

    Ok(ApiResponse::created(json!({ "authentication_token": token })))
}

/// DELETE /v1/tokens/authentication
pub async fn delete_authentication_tokens(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Value> {
    state.tokens.revoke_all(TokenScope::Authentication, user.id).await?;
    Ok(ApiResponse::success(json!({ "message": "authentication tokens revoked" })))
}
