use axum::{extract::FromRequestParts, http::header};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::{principals, sessions},
    error::AppError,
    models::Role,
    state::AppState,
};

/// The resolved caller: a live session bound to a principal row. Role comes
/// from the principal row on every request, so an invite-driven role upgrade
/// is visible without re-issuing the token.
#[derive(Debug, Clone, Copy)]
pub struct AuthPrincipal {
    pub id: Uuid,
    pub role: Role,
    pub session_id: Uuid,
}

impl AuthPrincipal {
    pub fn is_staff(&self) -> bool {
        matches!(
            self.role,
            Role::Superadmin | Role::RestaurantOwner | Role::Employee
        )
    }
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthenticated)?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthenticated)?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthenticated)?
            .trim();

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.session_signing_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthenticated)?;

        let session_id =
            Uuid::parse_str(&decoded.claims.sid).map_err(|_| AppError::Unauthenticated)?;

        let session = sessions::Entity::find_by_id(session_id)
            .one(&state.orm)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        if session.revoked || session.expires_at.with_timezone(&Utc) < Utc::now() {
            return Err(AppError::Unauthenticated);
        }

        let principal = principals::Entity::find_by_id(session.principal_id)
            .one(&state.orm)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let role = Role::parse(&principal.role)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown role in principal row")))?;

        Ok(AuthPrincipal {
            id: principal.id,
            role,
            session_id,
        })
    }
}
