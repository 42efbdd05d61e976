use axum::Json;
use axum::extract::{Path, State};
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::models::{SettingResponse, SettingsReloadResponse};
use crate::state::AppState;

/// Read one resolved `AUTH_IP_WHITELIST` option.
#[instrument(skip(state))]
pub async fn get_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<SettingResponse>> {
    let value = state
        .settings
        .current()
        .await
        .option(&name)
        .map_err(|e| match e {
            AppError::ConfigError(msg) => AppError::NotFound(msg),
            other => other,
        })?;

    Ok(Json(SettingResponse { name, value }))
}

/// Re-read the settings block. A failed reload leaves the old settings in place.
#[instrument(skip(state))]
pub async fn reload_settings(
    State(state): State<AppState>,
) -> AppResult<Json<SettingsReloadResponse>> {
    let settings = state.settings.reload().await?;

    Ok(Json(SettingsReloadResponse {
        reloaded: true,
        allowed_whitelisted_hosts: settings.allowed_whitelisted_hosts().to_vec(),
    }))
}
