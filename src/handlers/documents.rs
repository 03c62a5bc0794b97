//! Document upload handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::UploadedDocument;
use crate::services::LoanService;

/// Multipart field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// A file read from a multipart body
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Read the `file` field of a multipart body, plus any text fields
pub async fn read_upload(
    multipart: &mut Multipart,
) -> Result<(Option<UploadedFile>, Vec<(String, String)>), ApiError> {
    let mut file = None;
    let mut fields = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            let filename = field.file_name().unwrap_or("document").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?.to_vec();
            file = Some(UploadedFile {
                filename,
                content_type,
                bytes,
            });
        } else {
            fields.push((name, field.text().await?));
        }
    }

    Ok((file, fields))
}

/// POST /api/loans/:id/documents
pub async fn upload_document(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedDocument>), ApiError> {
    let (file, _) = read_upload(&mut multipart).await?;
    let file = file.ok_or_else(|| {
        ApiError::BadRequest(format!("Multipart field '{}' is required", FILE_FIELD))
    })?;

    let document = service
        .upload_document(loan_id, &file.filename, &file.bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/loans/:id/documents
pub async fn list_documents(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<Vec<UploadedDocument>>, ApiError> {
    Ok(Json(service.list_documents(loan_id).await?))
}
