//! Stored file catalog queries.
//!
//! CRUD for the `files` table plus project-scoped enumeration used by the
//! archive builder.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use darkroom_common::{ArchiveFilter, AssetKind, Error, FileId, ProjectId, Result};

use crate::models::StoredFile;

fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredFile> {
    Ok(StoredFile {
        id: FileId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        project_id: ProjectId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        original_name: row.get(2)?,
        kind: row.get::<_, String>(3)?.parse().unwrap_or(AssetKind::Original),
        mime_type: row.get(4)?,
        size_bytes: row.get(5)?,
        storage_path: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const COLUMNS: &str =
    "id, project_id, original_name, kind, mime_type, size_bytes, storage_path, created_at";

/// Create a stored file catalog entry.
#[allow(clippy::too_many_arguments)]
pub fn create_file(
    conn: &Connection,
    id: FileId,
    project_id: ProjectId,
    original_name: &str,
    kind: AssetKind,
    mime_type: &str,
    size_bytes: i64,
    storage_path: &str,
) -> Result<StoredFile> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO files (id, project_id, original_name, kind, mime_type, size_bytes, storage_path, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            project_id.to_string(),
            original_name,
            kind.to_string(),
            mime_type,
            size_bytes,
            storage_path,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(StoredFile {
        id,
        project_id,
        original_name: original_name.to_string(),
        kind,
        mime_type: mime_type.to_string(),
        size_bytes,
        storage_path: storage_path.to_string(),
        created_at: now,
    })
}

/// Create or replace a stored file catalog entry in one statement.
///
/// A re-stored file keeps its original `created_at`; every other column
/// takes the new values. Single-statement, so a failure can never leave
/// the catalog without a row for an on-disk blob.
#[allow(clippy::too_many_arguments)]
pub fn upsert_file(
    conn: &Connection,
    id: FileId,
    project_id: ProjectId,
    original_name: &str,
    kind: AssetKind,
    mime_type: &str,
    size_bytes: i64,
    storage_path: &str,
) -> Result<StoredFile> {
    conn.execute(
        "INSERT INTO files (id, project_id, original_name, kind, mime_type, size_bytes, storage_path, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             project_id = excluded.project_id,
             original_name = excluded.original_name,
             kind = excluded.kind,
             mime_type = excluded.mime_type,
             size_bytes = excluded.size_bytes,
             storage_path = excluded.storage_path",
        params![
            id.to_string(),
            project_id.to_string(),
            original_name,
            kind.to_string(),
            mime_type,
            size_bytes,
            storage_path,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_file(conn, id)
}

/// Get a stored file by ID.
pub fn get_file(conn: &Connection, id: FileId) -> Result<StoredFile> {
    conn.query_row(
        &format!("SELECT {} FROM files WHERE id = ?", COLUMNS),
        [id.to_string()],
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("file {}", id)),
        _ => Error::database(e.to_string()),
    })
}

/// List a project's stored files matching an archive filter, oldest first.
pub fn list_project_files(
    conn: &Connection,
    project_id: ProjectId,
    filter: ArchiveFilter,
) -> Result<Vec<StoredFile>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM files WHERE project_id = ? ORDER BY created_at ASC, id ASC",
            COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let files = stmt
        .query_map([project_id.to_string()], map_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(files
        .into_iter()
        .filter(|f| filter.includes(f.kind))
        .collect())
}

/// Delete a stored file row. Missing rows are not an error.
pub fn delete_file(conn: &Connection, id: FileId) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM files WHERE id = ?", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}
