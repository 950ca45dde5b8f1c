use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{activation_ttl, validate_token_plaintext, TokenError};
use crate::database::models::{
    validate_email, validate_name, validate_password_plaintext, validate_user, Password, TokenScope, User,
    MOVIES_READ,
};
use crate::error::ApiError;
use crate::handlers::extract::JsonBody;
use crate::mailer::Template;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::server::AppState;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateUser {
    #[serde(default)]
    pub token: String,
}

/// bcrypt off the async executor.
pub(crate) async fn hash_password(plaintext: String) -> Result<Password, ApiError> {
    tokio::task::spawn_blocking(move || Password::hash(&plaintext))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("password hashing task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// POST /v1/users
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterUser>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_name(&mut v, &input.name);
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(v.into());
    }

    let password = hash_password(input.password).await?;
    let user = User::new(input.name, input.email, password);

    let mut v = Validator::new();
    validate_user(&mut v, &user)?;
    if !v.valid() {
        return Err(v.into());
    }

    let user = state.repos.users.insert(user).await?;
    state.repos.permissions.add_for_user(user.id, &[MOVIES_READ]).await?;

    let token = state.tokens.issue(user.id, activation_ttl(), TokenScope::Activation).await?;
    tracing::info!(user_id = %user.id, "registered user");

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let template = Template::UserWelcome {
        user_id: user.id,
        activation_token: token.plaintext,
    };
    state.spawn_background("welcome-mail", async move {
        if let Err(e) = mailer.send(&recipient, template).await {
            tracing::error!(error = %e, "failed to send welcome mail");
        }
    });

    Ok(ApiResponse::accepted(json!({ "user": user })))
}

/// PUT /v1/users/activated
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateUser>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(v.into());
    }

    let mut user = match state.tokens.validate(TokenScope::Activation, &input.token).await {
        Ok(user) => user,
        Err(TokenError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("token", "invalid or expired activation token");
            return Err(v.into());
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    let user = state.repos.users.update(user).await?;

    state.tokens.revoke_all(TokenScope::Activation, user.id).await?;
    tracing::info!(user_id = %user.id, "activated user");

    Ok(ApiResponse::success(json!({ "user": user })))
}

/// GET /v1/users/me
pub async fn show_current_user(CurrentUser(user): CurrentUser) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({ "user": user })))
}
