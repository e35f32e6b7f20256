use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
};
use tracing::{Span, instrument};

use crate::{
    AppState,
    api::models::upload::{
        GameUploadResponse, PreviewUploadResponse, UploadErrorResponse, UploadForm, UploadRequest, UploadResponse, UploadType,
        parse_relative_paths,
    },
    errors::{Error, Result},
    relay::{GameUpload, InputFile},
};

pub const MISSING_REMOTE_CONFIG: &str =
    "Remote store is not configured. Set FTP_HOST, FTP_USER and FTP_PASSWORD (the same details your FTP client uses).";
pub const MISSING_GAME_FIELDS: &str = "The category and gameName fields are required";
pub const NO_FILES: &str = "No files were sent";

/// Maximum number of `previewImage` parts per request.
const MAX_PREVIEW_IMAGES: usize = 1;

fn multipart_error(e: impl std::fmt::Display) -> Error {
    Error::bad_request(format!("Failed to parse multipart data: {e}"))
}

async fn read_file(field: Field<'_>) -> Result<InputFile> {
    let name = field.file_name().unwrap_or_default().to_string();
    let content = field.bytes().await.map_err(multipart_error)?;
    Ok(InputFile { name, content })
}

/// Read the whole multipart body. Files are held in memory until the relay has written them.
///
/// Unknown fields are skipped. More than `max_files` game files or more than one preview image
/// is rejected before anything is sent anywhere.
pub async fn read_upload_request(mut multipart: Multipart, max_files: usize) -> Result<UploadRequest> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "files" => {
                if request.files.len() == max_files {
                    return Err(Error::bad_request(format!("Too many files: at most {max_files} per request")));
                }
                request.files.push(read_file(field).await?);
            }
            "previewImage" => {
                if request.preview_image.is_some() {
                    return Err(Error::bad_request(format!(
                        "Too many preview images: at most {MAX_PREVIEW_IMAGES} per request"
                    )));
                }
                request.preview_image = Some(read_file(field).await?);
            }
            "uploadType" => request.upload_type = UploadType::parse(&field.text().await.map_err(multipart_error)?),
            "category" => request.category = field.text().await.map_err(multipart_error)?,
            "gameName" => request.game_name = field.text().await.map_err(multipart_error)?,
            "relativePaths" => request.relative_paths = parse_relative_paths(&field.text().await.map_err(multipart_error)?),
            "key" => request.key = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    Ok(request)
}

/// Upload game files or a preview image
///
/// Game uploads land in `<games base>/<category>/<gameName>` or, in flat mode, at each file's
/// `relativePaths` entry below the games base. A preview upload (`uploadType=previewImage` with
/// a `previewImage` part) lands in the preview images directory.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "upload",
    summary = "Upload files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "All files written", body = UploadResponse),
        (status = 400, description = "Missing fields, no files, too many files or unreadable body", body = UploadErrorResponse),
        (status = 500, description = "Remote store not configured or the transfer failed", body = UploadErrorResponse),
    )
)]
#[instrument(skip_all, fields(key = tracing::field::Empty, upload_type = tracing::field::Empty))]
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Json<UploadResponse>> {
    let request = read_upload_request(multipart, state.config.upload.max_files).await?;

    let span = Span::current();
    span.record("upload_type", tracing::field::debug(request.upload_type));
    if let Some(key) = &request.key {
        span.record("key", key.as_str());
    }

    let remote = &state.config.remote;
    if !remote.is_configured() {
        return Err(Error::Configuration {
            message: MISSING_REMOTE_CONFIG.to_string(),
        });
    }

    if let Some(preview) = request.preview() {
        let outcome = state
            .relay
            .upload_preview(preview)
            .await
            .map_err(|e| Error::from_transfer(e, remote))?;
        return Ok(Json(UploadResponse::Preview(PreviewUploadResponse {
            ok: true,
            filename: outcome.filename,
            path: outcome.path,
        })));
    }

    if request.category.is_empty() || request.game_name.is_empty() {
        return Err(Error::bad_request(MISSING_GAME_FIELDS));
    }
    if request.files.is_empty() {
        return Err(Error::bad_request(NO_FILES));
    }

    let upload = GameUpload {
        category: request.category,
        game_name: request.game_name,
        files: request.files,
        relative_paths: request.relative_paths,
    };
    let outcome = state
        .relay
        .upload_game(&upload)
        .await
        .map_err(|e| Error::from_transfer(e, remote))?;

    Ok(Json(UploadResponse::Game(GameUploadResponse {
        ok: true,
        uploaded: outcome.uploaded,
        path: outcome.path,
    })))
}
