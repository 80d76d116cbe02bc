// handlers/protected/upload.rs - POST /upload (multipart, field "file")

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::post,
    Router,
};
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::auth::TokenService;
use crate::config::UploadConfig;
use crate::error::ApiError;
use crate::middleware::require_auth;

const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub directory: PathBuf,
    pub max_file_size: usize,
    /// Must match both the lower-cased extension and the mime type
    pub whitelist: Option<Regex>,
}

impl UploadOptions {
    pub fn from_config(config: &UploadConfig) -> Result<Self, regex::Error> {
        let whitelist = config.allowed_types.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            directory: config.directory.clone(),
            max_file_size: config.max_file_size,
            whitelist,
        })
    }

    fn accepts(&self, file_name: &str, content_type: &str) -> bool {
        let Some(whitelist) = &self.whitelist else {
            return true;
        };
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();

        whitelist.is_match(&extension) && whitelist.is_match(content_type)
    }
}

pub fn routes(options: UploadOptions, tokens: TokenService) -> Router {
    let body_limit = options.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/upload", post(upload))
        .with_state(Arc::new(options))
        .route_layer(from_fn_with_state(tokens, require_auth))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// POST /upload - Store one file under the upload directory
///
/// Answers 200 `{ "message": "File uploaded successfully", "fileName": ... }`.
pub async fn upload(
    State(options): State<Arc<UploadOptions>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !options.accepts(&original, &content_type) {
            return Err(ApiError::bad_request("Upload Error: That filetype is not supported"));
        }

        tokio::fs::create_dir_all(&options.directory)
            .await
            .map_err(|e| ApiError::internal(format!("Cannot create upload directory: {}", e)))?;

        let file_name = stored_file_name(&original);
        let path = options.directory.join(&file_name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ApiError::internal(format!("Cannot create {}: {}", path.display(), e)))?;

        let mut written = 0usize;
        let result = async {
            while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
                written += chunk.len();
                if written > options.max_file_size {
                    return Err(ApiError::bad_request("Upload Error: File too large"));
                }
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ApiError::internal(format!("Cannot write {}: {}", path.display(), e)))?;
            }
            file.flush()
                .await
                .map_err(|e| ApiError::internal(format!("Cannot write {}: {}", path.display(), e)))
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        tracing::info!("Uploaded {} ({} bytes)", file_name, written);
        return Ok(Json(json!({
            "message": "File uploaded successfully",
            "fileName": file_name,
        })));
    }

    Err(ApiError::bad_request("Unable to upload file"))
}

fn upload_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::bad_request("Upload Error: File too large")
    } else {
        ApiError::bad_request(format!("Upload Error: {}", err.body_text()))
    }
}

/// `<unix millis>-<original name>`, with the name reduced to a safe basename.
fn stored_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let mut safe: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if safe.trim_matches('.').is_empty() {
        safe = "upload".to_string();
    }
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), safe)
}
