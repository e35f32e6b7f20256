use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::relay::InputFile;

/// Which of the two upload modes a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadType {
    #[default]
    Game,
    PreviewImage,
}

impl UploadType {
    /// `previewImage` selects preview mode; anything else, including absent, is a game upload.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "previewImage" => UploadType::PreviewImage,
            _ => UploadType::Game,
        }
    }
}

/// A fully read `/upload` request.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub upload_type: UploadType,
    pub category: String,
    pub game_name: String,
    /// Opaque client value, only recorded in the request span
    pub key: Option<String>,
    pub relative_paths: Option<Vec<Option<String>>>,
    pub files: Vec<InputFile>,
    pub preview_image: Option<InputFile>,
}

impl UploadRequest {
    /// The preview file, if this request is a preview upload. A `previewImage` request without
    /// an attached image is handled as a game upload.
    pub fn preview(&self) -> Option<&InputFile> {
        match self.upload_type {
            UploadType::PreviewImage => self.preview_image.as_ref(),
            UploadType::Game => None,
        }
    }
}

/// Parse the `relativePaths` field: a JSON array of strings aligned with `files`.
///
/// Anything that is not a JSON array means no relative paths at all. Entries that are not
/// strings count as absent for their position.
pub fn parse_relative_paths(raw: &str) -> Option<Vec<Option<String>>> {
    match serde_json::from_str::<serde_json::Value>(raw).ok()? {
        serde_json::Value::Array(entries) => Some(
            entries
                .into_iter()
                .map(|entry| match entry {
                    serde_json::Value::String(path) => Some(path),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Multipart form accepted by `POST /upload` (documentation only).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct UploadForm {
    /// `game` (default) or `previewImage`
    pub upload_type: Option<String>,
    /// Required for game uploads
    pub category: Option<String>,
    /// Required for game uploads
    pub game_name: Option<String>,
    /// Game files, at most `upload.max_files`
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
    /// Single preview image, used when `uploadType=previewImage`
    #[schema(value_type = Option<String>, format = Binary)]
    pub preview_image: Option<Vec<u8>>,
    /// JSON array of relative paths aligned with `files`, used in flat mode
    pub relative_paths: Option<String>,
    /// Opaque client identifier
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GameUploadResponse {
    pub ok: bool,
    pub uploaded: usize,
    /// Directory the files were placed in
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreviewUploadResponse {
    pub ok: bool,
    pub filename: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum UploadResponse {
    Game(GameUploadResponse),
    Preview(PreviewUploadResponse),
}

/// Error body for `/upload`. `rawError` is only present for remote transfer failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadErrorResponse {
    pub error: String,
    #[serde(rename = "rawError", skip_serializing_if = "Option::is_none")]
    pub raw_error: Option<String>,
}
