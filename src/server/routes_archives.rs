//! Archive routes: create, poll status, download.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use darkroom_common::{ArchiveFilter, ArchiveId, ProjectId};

use super::{error_response, AppContext};

/// Create archive-related routes.
pub fn archive_routes() -> Router<AppContext> {
    Router::new()
        .route("/projects/:project_id/archives", post(create_archive))
        .route("/archives/:archive_id", get(archive_status))
        .route("/archives/:archive_id/download", get(download_archive))
}

/// Body of an archive creation request.
#[derive(Debug, Deserialize)]
pub struct CreateArchiveRequest {
    /// Which assets to bundle. Defaults to everything.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Archive time-to-live in hours; server default when omitted.
    #[serde(default)]
    pub ttl_hours: Option<u64>,
}

fn default_filter() -> String {
    "everything".to_string()
}

/// Create a pending archive and kick off its build.
///
/// The build never blocks this request; the caller polls the returned
/// record's status.
async fn create_archive(
    State(ctx): State<AppContext>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateArchiveRequest>,
) -> Response {
    let Ok(project_id) = project_id.parse::<ProjectId>() else {
        return bad_request("Invalid project ID");
    };
    let Ok(filter) = request.filter.parse::<ArchiveFilter>() else {
        return bad_request("Invalid archive filter");
    };

    match ctx
        .archives
        .create_archive(project_id, filter, request.ttl_hours)
    {
        Ok(archive) => (StatusCode::ACCEPTED, Json(archive)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Report an archive's current record.
async fn archive_status(
    State(ctx): State<AppContext>,
    Path(archive_id): Path<String>,
) -> Response {
    let Ok(archive_id) = archive_id.parse::<ArchiveId>() else {
        return bad_request("Invalid archive ID");
    };

    match ctx.archives.status(archive_id) {
        Ok(archive) => Json(archive).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Download a completed, unexpired archive as a plain stream.
///
/// Archives are never chunked. Past expiry the response is 410, not 404,
/// even when the blob still exists.
async fn download_archive(
    State(ctx): State<AppContext>,
    Path(archive_id): Path<String>,
) -> Response {
    let Ok(archive_id) = archive_id.parse::<ArchiveId>() else {
        return bad_request("Invalid archive ID");
    };

    let (archive, stream) = match ctx.archives.open_download(archive_id).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e).into_response(),
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.zip\"", archive.id),
        );

    if let Some(size) = archive.size_bytes {
        response = response.header(header::CONTENT_LENGTH, size.to_string());
    }

    response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
