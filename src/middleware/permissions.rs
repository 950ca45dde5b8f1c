//! Per-route authorization. Each stage composes the one before it:
//! authenticated, then activated, then holding a permission code.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::database::models::User;
use crate::database::PermissionRepository;
use crate::error::ApiError;
use crate::middleware::auth::Identity;

fn identity(request: &Request) -> &Identity {
    request.extensions().get::<Identity>().unwrap_or(&Identity::Anonymous)
}

pub fn authenticated_user(identity: &Identity) -> Result<&User, ApiError> {
    identity.user().ok_or(ApiError::AuthenticationRequired)
}

pub fn activated_user(identity: &Identity) -> Result<&User, ApiError> {
    let user = authenticated_user(identity)?;
    if !user.activated {
        return Err(ApiError::InactiveAccount);
    }
    Ok(user)
}

pub async fn require_authenticated_user(request: Request, next: Next) -> Result<Response, ApiError> {
    authenticated_user(identity(&request))?;
    Ok(next.run(request).await)
}

pub async fn require_activated_user(request: Request, next: Next) -> Result<Response, ApiError> {
    activated_user(identity(&request))?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the store to consult and the code the
/// route needs.
#[derive(Clone)]
pub struct PermissionGate {
    pub permissions: Arc<dyn PermissionRepository>,
    pub code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn PermissionRepository>, code: &'static str) -> Self {
        Self { permissions, code }
    }

    /// Looks the user's permissions up on every call; grants are never cached.
    pub async fn check(&self, identity: &Identity) -> Result<(), ApiError> {
        let user = activated_user(identity)?;
        let permissions = self.permissions.get_all_for_user(user.id).await?;
        if !permissions.include(self.code) {
            tracing::warn!(user_id = %user.id, code = self.code, "permission denied");
            return Err(ApiError::NotPermitted);
        }
        Ok(())
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = identity(&request).clone();
    gate.check(&identity).await?;
    Ok(next.run(request).await)
}
