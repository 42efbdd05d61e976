//! Admin CRUD for whitelist entries.
//!
//! Changes take effect on the next request: the gate and the IP backend
//! read the store live.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{WhitelistEntry, WhitelistEntryInput};
use crate::state::AppState;
use crate::store::WhitelistStore;
use crate::validation::{normalize_entry_username, validate_ip_address};

/// Validated form of [`WhitelistEntryInput`].
struct ValidEntry {
    ip_address: String,
    is_active: bool,
    username: Option<String>,
}

fn validate_entry(input: WhitelistEntryInput) -> AppResult<ValidEntry> {
    Ok(ValidEntry {
        ip_address: validate_ip_address(&input.ip_address)?,
        is_active: input.is_active,
        username: normalize_entry_username(input.username)?,
    })
}

fn entry_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Whitelist entry {id} not found"))
}

#[instrument(skip(state))]
pub async fn list_entries(State(state): State<AppState>) -> AppResult<Json<Vec<WhitelistEntry>>> {
    Ok(Json(state.store.list_entries().await?))
}

#[instrument(skip(state))]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<WhitelistEntry>> {
    state
        .store
        .get_entry(id)
        .await?
        .map(Json)
        .ok_or_else(|| entry_not_found(id))
}

/// Create an entry. A duplicate IP is a 409.
#[instrument(skip(state))]
pub async fn create_entry(
    State(state): State<AppState>,
    Json(payload): Json<WhitelistEntryInput>,
) -> AppResult<(StatusCode, Json<WhitelistEntry>)> {
    let entry = validate_entry(payload)?;
    let created = state
        .store
        .create_entry(&entry.ip_address, entry.is_active, entry.username.as_deref())
        .await?;

    info!(entry = %created, id = created.id, "Whitelist entry created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replace an entry.
#[instrument(skip(state))]
pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<WhitelistEntryInput>,
) -> AppResult<Json<WhitelistEntry>> {
    let entry = validate_entry(payload)?;
    let updated = state
        .store
        .update_entry(
            id,
            &entry.ip_address,
            entry.is_active,
            entry.username.as_deref(),
        )
        .await?
        .ok_or_else(|| entry_not_found(id))?;

    info!(entry = %updated, id, "Whitelist entry updated");
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if state.store.delete_entry(id).await? {
        info!(id, "Whitelist entry deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(entry_not_found(id))
    }
}
