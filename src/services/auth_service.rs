use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::auth::{Claims, SessionRequest, SessionResponse},
    entity::{principals, sessions},
    error::{AppError, AppResult},
    identity,
    models::{Principal, Role},
    response::ApiResponse,
    state::AppState,
};

/// Exchange a signed identity envelope for an access token. Creates a
/// Customer principal on first contact.
pub async fn bootstrap_session(
    state: &AppState,
    payload: SessionRequest,
) -> AppResult<ApiResponse<SessionResponse>> {
    let envelope = identity::validate_envelope(
        &payload.init_data,
        &state.config.session_signing_secret,
        Utc::now(),
    )?;

    let existing = principals::Entity::find()
        .filter(principals::Column::ExternalIdentityId.eq(envelope.external_user_id.clone()))
        .one(&state.orm)
        .await?;

    let principal = match existing {
        Some(model) => model,
        None => {
            principals::ActiveModel {
                id: Set(Uuid::new_v4()),
                role: Set(Role::Customer.as_str().to_string()),
                external_identity_id: Set(envelope.external_user_id.clone()),
                display_name: Set(envelope.display_name.clone()),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    let session_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::days(state.config.access_token_ttl_days);
    sessions::ActiveModel {
        id: Set(session_id),
        principal_id: Set(principal.id),
        expires_at: Set(expires_at.into()),
        revoked: Set(false),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let claims = Claims {
        sub: principal.id.to_string(),
        sid: session_id.to_string(),
        exp: expires_at.timestamp() as usize,
    };
    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.session_signing_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    if let Err(err) = log_audit(
        state,
        Some(principal.id),
        "session_bootstrap",
        Some("sessions"),
        Some(serde_json::json!({ "session_id": session_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::ok(
        "Session created",
        SessionResponse {
            access_token,
            principal: principal_from_entity(principal)?,
        },
    ))
}

/// Startup invariant: at least one Superadmin principal must exist.
pub async fn ensure_superadmin(conn: &DatabaseConnection) -> AppResult<()> {
    let count = principals::Entity::find()
        .filter(principals::Column::Role.eq(Role::Superadmin.as_str()))
        .count(conn)
        .await?;

    if count == 0 {
        let id = Uuid::new_v4();
        principals::ActiveModel {
            id: Set(id),
            role: Set(Role::Superadmin.as_str().to_string()),
            external_identity_id: Set(format!("bootstrap-{id}")),
            display_name: Set(Some("Bootstrap superadmin".to_string())),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;
        tracing::info!(principal_id = %id, "seeded bootstrap superadmin");
    }

    Ok(())
}

pub fn principal_from_entity(model: principals::Model) -> AppResult<Principal> {
    let role = Role::parse(&model.role)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown role in principal row")))?;
    Ok(Principal {
        id: model.id,
        role,
        external_identity_id: model.external_identity_id,
        display_name: model.display_name,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
