//! HTTP handler for bulk CSV import

use axum::{
    extract::{Multipart, State},
    Json,
};

use shared::import::ImportReport;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::BulkImportService;
use crate::AppState;

/// Largest accepted CSV upload
pub const MAX_IMPORT_BYTES: usize = 5 * 1024 * 1024;

/// Import products from a CSV sent as the multipart field `file`
pub async fn import_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<ImportReport>> {
    current_user.0.require_admin()?;

    let mut data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart request: {}", e)))?
    {
        if field.name() == Some("file") {
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?
                    .to_vec(),
            );
            break;
        }
    }

    let data = data.ok_or_else(|| AppError::validation("file", "No 'file' field found"))?;
    if data.is_empty() {
        return Err(AppError::validation("file", "Empty file provided"));
    }
    if data.len() > MAX_IMPORT_BYTES {
        return Err(AppError::validation("file", "File exceeds the 5 MB import limit"));
    }

    let service = BulkImportService::new(state.db, &state.config.inventory);
    let report = service.import_csv(current_user.0.user_id, &data).await?;
    Ok(Json(report))
}
