use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{info, instrument};

use crate::auth::password::hash_password_blocking;
use crate::error::AppResult;
use crate::models::{NewUserRequest, User};
use crate::state::AppState;
use crate::store::UserStore;
use crate::validation::{validate_password, validate_username};

/// List all users.
#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.store.list_users().await?))
}

/// Create a user. Without a password the user can only authenticate by IP.
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    validate_username(&payload.username)?;

    let password_hash = match payload.password {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password_blocking(password).await?)
        }
        None => None,
    };

    let user = state
        .store
        .create_user(&payload.username, password_hash.as_deref(), payload.is_active)
        .await?;

    info!(user_id = user.id, username = %user.username, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}
