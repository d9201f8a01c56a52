use log::{error, info};
use rocket::State;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::guards::AuthGuard;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse};

fn extension_from_filename(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        _ => None,
    }
}

/// Image extension from the declared content type, falling back to the client's file name.
fn image_extension(file: &TempFile<'_>) -> Option<&'static str> {
    match file.content_type() {
        Some(ct) if ct.is_jpeg() => return Some("jpg"),
        Some(ct) if ct.is_png() => return Some("png"),
        _ => {}
    }
    file.raw_name()
        .map(|raw| raw.dangerous_unsafe_unsanitized_raw().as_str())
        .and_then(extension_from_filename)
}

async fn read_bytes(file: &TempFile<'_>) -> std::io::Result<Vec<u8>> {
    let reader = file.open().await?;
    tokio::pin!(reader);
    let mut bytes = Vec::with_capacity(file.len() as usize);
    reader.read_to_end(&mut bytes).await?;
    Ok(bytes)
}

#[post("/upload/image", data = "<file>")]
pub async fn upload_image(
    state: &State<AppState>,
    _auth: AuthGuard,
    file: TempFile<'_>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let extension = image_extension(&file)
        .ok_or_else(|| ApiError::validation("Only JPEG and PNG images are allowed"))?;

    if file.len() == 0 {
        return Err(ApiError::validation("Empty file"));
    }
    if file.len() > state.config.max_upload_bytes {
        return Err(ApiError::validation(format!(
            "Image exceeds {} bytes",
            state.config.max_upload_bytes
        )));
    }

    let bytes = read_bytes(&file)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to read upload: {}", e)))?;

    let url = state.blobs.put(bytes, extension).await.map_err(|e| {
        error!("Image upload failed: {}", e);
        ApiError::dependency("Image storage is unavailable")
    })?;
    info!("Stored image {}", url);

    Ok(Json(ApiResponse::success_with_message(
        "Image uploaded successfully",
        json!({ "url": url }),
    )))
}
