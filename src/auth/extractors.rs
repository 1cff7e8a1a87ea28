use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use time::OffsetDateTime;
use tracing::warn;

use super::{repo_types::User, services::INACTIVE_ACCOUNT};
use crate::{error::AppError, state::AppState};

const INVALID_CREDENTIALS: &str = "Could not validate credentials";

/// The authenticated, active user behind the request's bearer token.
///
/// This is the only place authentication is decided: protected handlers take
/// `CurrentUser` as an argument and never look at the token themselves.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated("Not authenticated".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthenticated("Invalid auth scheme".into()))?;

        let claims = state
            .jwt
            .verify(token, OffsetDateTime::now_utc())
            .map_err(|e| {
                warn!(error = %e, "bearer token rejected");
                AppError::Unauthenticated(INVALID_CREDENTIALS.into())
            })?;

        let Some(user) = state.users.find_by_email(&claims.sub).await? else {
            warn!(sub = %claims.sub, "token subject not found");
            return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
        };
        // the email may have been released and registered by someone else
        if user.id != claims.uid {
            warn!(
                sub = %claims.sub,
                uid = claims.uid,
                user_id = user.id,
                "token subject reassigned"
            );
            return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
        }

        if !user.is_active {
            warn!(user_id = user.id, "token for inactive account");
            return Err(AppError::Unauthenticated(INACTIVE_ACCOUNT.into()));
        }

        Ok(CurrentUser(user))
    }
}
