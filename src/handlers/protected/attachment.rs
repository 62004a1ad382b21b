use axum::{
    extract::{multipart::MultipartError, Multipart, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::attachment::{Attachment, LinkInput};
use crate::error::ApiError;
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::attachment::{AttachmentService, UploadedFile};
use crate::storage::storage;

#[derive(Debug, Default, Deserialize)]
pub struct AttachmentQuery {
    pub expense_id: Option<Uuid>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the maximum size")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// POST /api/v1/attachments - multipart with a `file` part and optional `expense_id`
pub async fn upload(Extension(principal): Extension<Principal>, mut multipart: Multipart) -> ApiResult<Attachment> {
    principal.require(Permission::AttachmentWrite)?;

    let mut file = None;
    let mut expense_id = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile { file_name, content_type, bytes: bytes.to_vec() });
            }
            Some("expense_id") => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    let id = Uuid::parse_str(text.trim())
                        .map_err(|_| ApiError::field_error("expense_id", "Must be a UUID"))?;
                    expense_id = Some(id);
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::field_error("file", "A file part is required"))?;
    let attachment = AttachmentService::upload(&principal, storage(), file, expense_id).await?;
    Ok(ApiResponse::created(attachment))
}

/// GET /api/v1/attachments?expense_id= - by expense, or the caller's unlinked uploads
pub async fn list(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<AttachmentQuery>,
) -> ApiResult<Vec<Attachment>> {
    principal.require(Permission::AttachmentRead)?;
    Ok(ApiResponse::success(AttachmentService::list(&principal, query.expense_id).await?))
}

pub async fn get(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Attachment> {
    principal.require(Permission::AttachmentRead)?;
    Ok(ApiResponse::success(AttachmentService::get(&principal, id).await?))
}

/// GET /api/v1/attachments/:id/content
pub async fn download(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    principal.require(Permission::AttachmentRead)?;
    let (attachment, bytes) = AttachmentService::download(&principal, storage(), id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, attachment.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", attachment.file_name.replace('"', "")),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// PUT /api/v1/attachments/:id/link
pub async fn link(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<LinkInput>,
) -> ApiResult<Attachment> {
    principal.require(Permission::AttachmentWrite)?;
    Ok(ApiResponse::success(AttachmentService::link(&principal, id, input.expense_id).await?))
}

pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::AttachmentWrite)?;
    AttachmentService::delete(&principal, storage(), id).await?;
    Ok(ApiResponse::no_content())
}
