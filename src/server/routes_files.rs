//! Stored file routes: store, stat, range-aware streaming, delete.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use darkroom_common::{AssetKind, ByteRange, FileId, ProjectId};
use darkroom_db::queries::files;

use super::{error_response, AppContext};
use crate::streaming::plan_download;

/// Create file-related routes.
pub fn file_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/projects/:project_id/files/:file_id",
            put(store_file),
        )
        .route(
            "/files/:file_id",
            get(stream_file).delete(delete_file),
        )
        .route("/files/:file_id/stats", get(file_stats))
}

// ============================================================================
// Request types
// ============================================================================

/// Query parameters accompanying a store request.
#[derive(Debug, Deserialize)]
pub struct StoreQuery {
    /// Original filename; its suffix decides the stored extension.
    pub filename: String,

    /// Asset kind (original, rendition, sidecar). Defaults to original.
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Declared MIME type of the payload.
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_kind() -> String {
    "original".to_string()
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

// ============================================================================
// Handlers
// ============================================================================

/// Store a file's body under its allocated path and record it.
///
/// The body streams to disk without being buffered whole. Idempotent:
/// re-storing the same file overwrites blob and record in place.
async fn store_file(
    State(ctx): State<AppContext>,
    Path((project_id, file_id)): Path<(String, String)>,
    Query(query): Query<StoreQuery>,
    body: Body,
) -> Response {
    let project_id = match project_id.parse::<ProjectId>() {
        Ok(id) => id,
        Err(_) => return bad_request("Invalid project ID"),
    };
    let file_id = match file_id.parse::<FileId>() {
        Ok(id) => id,
        Err(_) => return bad_request("Invalid file ID"),
    };
    let kind = match query.kind.parse::<AssetKind>() {
        Ok(kind) => kind,
        Err(_) => return bad_request("Invalid asset kind"),
    };

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);

    let (relative_path, size) = match ctx
        .storage
        .store_file_from_reader(file_id, &mut reader, &query.filename)
        .await
    {
        Ok(pair) => pair,
        Err(e) => return error_response(&e).into_response(),
    };

    let conn = match darkroom_db::pool::get_conn(&ctx.db) {
        Ok(conn) => conn,
        Err(e) => return error_response(&e).into_response(),
    };

    let record = match files::upsert_file(
        &conn,
        file_id,
        project_id,
        &query.filename,
        kind,
        &query.mime_type,
        size as i64,
        &relative_path,
    ) {
        Ok(record) => record,
        Err(e) => return error_response(&e).into_response(),
    };
    drop(conn);

    let notifier = ctx.notifier.clone();
    let payload = serde_json::json!({
        "fileId": file_id,
        "projectId": project_id,
        "path": relative_path,
        "sizeBytes": record.size_bytes,
    });
    tokio::spawn(async move {
        notifier.notify("file.stored", payload).await;
    });

    (StatusCode::CREATED, Json(record)).into_response()
}

/// Report a stored blob's size and existence.
///
/// Never fails: a missing record or blob reports `{size: 0, exists: false}`.
async fn file_stats(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
) -> Response {
    let Ok(file_id) = file_id.parse::<FileId>() else {
        return bad_request("Invalid file ID");
    };

    let record = darkroom_db::pool::get_conn(&ctx.db)
        .ok()
        .and_then(|conn| files::get_file(&conn, file_id).ok());

    let stats = match record {
        Some(record) => ctx.storage.file_stats(&record.storage_path).await,
        None => crate::storage::FileStats {
            size: 0,
            exists: false,
        },
    };

    Json(serde_json::json!({
        "size": stats.size,
        "exists": stats.exists,
    }))
    .into_response()
}

/// Serve a stored file with byte-range support.
///
/// Large files stream through the chunk index; small files directly from
/// disk. Both produce the identical logical byte sequence.
async fn stream_file(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Ok(file_id) = file_id.parse::<FileId>() else {
        return bad_request("Invalid file ID");
    };

    let record = {
        let conn = match darkroom_db::pool::get_conn(&ctx.db) {
            Ok(conn) => conn,
            Err(e) => return error_response(&e).into_response(),
        };
        match files::get_file(&conn, file_id) {
            Ok(record) => record,
            Err(e) => return error_response(&e).into_response(),
        }
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok());

    let plan = match plan_download(&ctx.storage, &record, range_header).await {
        Ok(plan) => plan,
        Err(e) => return error_response(&e).into_response(),
    };

    let body = if plan.chunked && plan.total_size > 0 {
        let range = plan
            .range
            .unwrap_or(ByteRange::new(0, plan.total_size - 1));
        Body::from_stream(ctx.storage.create_chunked_read_stream(file_id, range))
    } else {
        match ctx
            .storage
            .create_read_stream(&record.storage_path, plan.range)
            .await
        {
            Ok(stream) => Body::from_stream(stream),
            Err(e) => return error_response(&e).into_response(),
        }
    };

    let mut response = Response::builder()
        .status(if plan.is_partial() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        })
        .header(header::CONTENT_TYPE, &record.mime_type)
        .header(header::CONTENT_LENGTH, plan.content_length.to_string())
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(content_range) = &plan.content_range {
        response = response.header(header::CONTENT_RANGE, content_range);
    }

    response
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Delete a stored file: blob, chunk rows, and catalog record.
///
/// Always succeeds observably; deleting an already-missing file is fine.
async fn delete_file(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
) -> Response {
    let Ok(file_id) = file_id.parse::<FileId>() else {
        return bad_request("Invalid file ID");
    };

    let record = {
        let conn = match darkroom_db::pool::get_conn(&ctx.db) {
            Ok(conn) => conn,
            Err(e) => return error_response(&e).into_response(),
        };
        files::get_file(&conn, file_id).ok()
    };

    if let Some(record) = &record {
        if let Err(e) = ctx.storage.delete_file(&record.storage_path).await {
            return error_response(&e).into_response();
        }
    }

    if let Err(e) = ctx.storage.delete_chunks(file_id) {
        return error_response(&e).into_response();
    }

    {
        let conn = match darkroom_db::pool::get_conn(&ctx.db) {
            Ok(conn) => conn,
            Err(e) => return error_response(&e).into_response(),
        };
        if let Err(e) = files::delete_file(&conn, file_id) {
            return error_response(&e).into_response();
        }
    }

    if record.is_some() {
        let notifier = ctx.notifier.clone();
        let payload = serde_json::json!({ "fileId": file_id });
        tokio::spawn(async move {
            notifier.notify("file.deleted", payload).await;
        });
    }

    StatusCode::NO_CONTENT.into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
