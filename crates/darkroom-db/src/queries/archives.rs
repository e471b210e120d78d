//! Archive record queries.
//!
//! Lifecycle rows for bulk zip exports: created pending, marked completed
//! or failed by the builder task, and swept after expiry by the cleanup
//! task.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use darkroom_common::{ArchiveFilter, ArchiveId, Error, ProjectId, Result};

use crate::models::{Archive, ArchiveStatus};

const COLUMNS: &str =
    "id, project_id, filter, status, size_bytes, storage_path, error_message, expires_at, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Archive> {
    Ok(Archive {
        id: ArchiveId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        project_id: ProjectId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        filter: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(ArchiveFilter::Everything),
        status: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(ArchiveStatus::Pending),
        size_bytes: row.get(4)?,
        storage_path: row.get(5)?,
        error_message: row.get(6)?,
        expires_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Create a new pending archive record.
pub fn create_archive(
    conn: &Connection,
    id: ArchiveId,
    project_id: ProjectId,
    filter: ArchiveFilter,
    expires_at: DateTime<Utc>,
) -> Result<Archive> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO archives (id, project_id, filter, status, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            project_id.to_string(),
            filter.to_string(),
            ArchiveStatus::Pending.to_string(),
            expires_at.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Archive {
        id,
        project_id,
        filter,
        status: ArchiveStatus::Pending,
        size_bytes: None,
        storage_path: None,
        error_message: None,
        expires_at,
        created_at: now,
    })
}

/// Get an archive record by ID.
pub fn get_archive(conn: &Connection, id: ArchiveId) -> Result<Archive> {
    conn.query_row(
        &format!("SELECT {} FROM archives WHERE id = ?", COLUMNS),
        [id.to_string()],
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("archive {}", id)),
        _ => Error::database(e.to_string()),
    })
}

/// Mark an archive completed, recording its final blob path and size.
pub fn mark_completed(
    conn: &Connection,
    id: ArchiveId,
    storage_path: &str,
    size_bytes: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE archives SET status = ?, storage_path = ?, size_bytes = ? WHERE id = ?",
        params![
            ArchiveStatus::Completed.to_string(),
            storage_path,
            size_bytes,
            id.to_string(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Mark an archive failed with an error message.
pub fn mark_failed(conn: &Connection, id: ArchiveId, error_message: &str) -> Result<()> {
    conn.execute(
        "UPDATE archives SET status = ?, error_message = ? WHERE id = ?",
        params![
            ArchiveStatus::Failed.to_string(),
            error_message,
            id.to_string(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// List archive records whose expiry has passed, so the cleanup task can
/// remove their blobs before deleting the rows.
pub fn list_expired(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Archive>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM archives WHERE expires_at < ?",
            COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let archives = stmt
        .query_map([now.to_rfc3339()], map_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(archives)
}

/// Delete an archive record. Missing rows are not an error.
pub fn delete_archive(conn: &Connection, id: ArchiveId) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM archives WHERE id = ?", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}
