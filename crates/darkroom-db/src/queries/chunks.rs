//! Chunk index queries.
//!
//! Stores and retrieves the persisted byte windows of large files. Chunk
//! rows are a derived cache: unique per (file_id, chunk_idx), contiguous
//! when present, and expiring independently of the file itself.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use darkroom_common::{Error, FileId, Result};

/// Insert a contiguous batch of chunk payloads inside one transaction.
///
/// `first_idx` is the chunk index of `payloads[0]`; subsequent payloads
/// take consecutive indices. Returns `Ok(true)` when the batch landed and
/// `Ok(false)` when a unique-constraint violation aborted it, meaning a
/// concurrent materialization of the same file won the race. Any other
/// failure is a database error.
pub fn insert_batch(
    conn: &Connection,
    file_id: FileId,
    first_idx: u32,
    payloads: &[Vec<u8>],
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    for (offset, payload) in payloads.iter().enumerate() {
        let result = tx.execute(
            "INSERT INTO chunks (file_id, chunk_idx, payload, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                file_id.to_string(),
                first_idx + offset as u32,
                payload,
                expires_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Lost the materialization race; the winner's rows stand.
                tx.rollback().map_err(|e| Error::database(e.to_string()))?;
                return Ok(false);
            }
            Err(e) => {
                return Err(Error::database(e.to_string()));
            }
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(true)
}

/// Point lookup of a single chunk payload.
pub fn get_chunk(conn: &Connection, file_id: FileId, chunk_idx: u32) -> Result<Option<Vec<u8>>> {
    match conn.query_row(
        "SELECT payload FROM chunks WHERE file_id = ?1 AND chunk_idx = ?2",
        params![file_id.to_string(), chunk_idx],
        |row| row.get::<_, Vec<u8>>(0),
    ) {
        Ok(payload) => Ok(Some(payload)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Number of chunk rows currently persisted for a file.
pub fn count_for_file(conn: &Connection, file_id: FileId) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM chunks WHERE file_id = ?1",
        params![file_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete all chunk rows for a file. Missing rows are not an error.
pub fn delete_for_file(conn: &Connection, file_id: FileId) -> Result<usize> {
    conn.execute(
        "DELETE FROM chunks WHERE file_id = ?1",
        params![file_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete chunk rows whose expiry has passed. Returns the removed count;
/// zero removed is not an error.
pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "DELETE FROM chunks WHERE expires_at < ?1",
        params![now.to_rfc3339()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{init_memory_pool, PooledConnection};
    use chrono::Duration;

    fn setup_test_db() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        pool.get().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let conn = setup_test_db();
        let file_id = FileId::new();
        let expires = Utc::now() + Duration::hours(24);

        let inserted = insert_batch(
            &conn,
            file_id,
            0,
            &[vec![1, 2, 3], vec![4, 5], vec![6]],
            expires,
        )
        .unwrap();
        assert!(inserted);

        assert_eq!(get_chunk(&conn, file_id, 0).unwrap().unwrap(), vec![1, 2, 3]);
        assert_eq!(get_chunk(&conn, file_id, 1).unwrap().unwrap(), vec![4, 5]);
        assert_eq!(get_chunk(&conn, file_id, 2).unwrap().unwrap(), vec![6]);
        assert_eq!(count_for_file(&conn, file_id).unwrap(), 3);
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_test_db();
        assert!(get_chunk(&conn, FileId::new(), 0).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_batch_loses_race() {
        let conn = setup_test_db();
        let file_id = FileId::new();
        let expires = Utc::now() + Duration::hours(24);

        assert!(insert_batch(&conn, file_id, 0, &[vec![1], vec![2]], expires).unwrap());

        // Same indices again: the batch must be rejected whole, leaving the
        // winner's payloads untouched.
        let inserted = insert_batch(&conn, file_id, 0, &[vec![9], vec![9]], expires).unwrap();
        assert!(!inserted);
        assert_eq!(get_chunk(&conn, file_id, 0).unwrap().unwrap(), vec![1]);
        assert_eq!(count_for_file(&conn, file_id).unwrap(), 2);
    }

    #[test]
    fn test_delete_for_file() {
        let conn = setup_test_db();
        let file_id = FileId::new();
        let expires = Utc::now() + Duration::hours(1);

        insert_batch(&conn, file_id, 0, &[vec![1], vec![2]], expires).unwrap();
        assert_eq!(delete_for_file(&conn, file_id).unwrap(), 2);
        assert_eq!(count_for_file(&conn, file_id).unwrap(), 0);

        // Deleting again removes nothing and does not fail
        assert_eq!(delete_for_file(&conn, file_id).unwrap(), 0);
    }

    #[test]
    fn test_delete_expired_spares_live_rows() {
        let conn = setup_test_db();
        let now = Utc::now();
        let stale = FileId::new();
        let live = FileId::new();

        insert_batch(&conn, stale, 0, &[vec![1]], now - Duration::hours(1)).unwrap();
        insert_batch(&conn, live, 0, &[vec![42, 43]], now + Duration::hours(1)).unwrap();

        assert_eq!(delete_expired(&conn, now).unwrap(), 1);
        assert!(get_chunk(&conn, stale, 0).unwrap().is_none());
        // Future-expiring rows remain bit-for-bit retrievable
        assert_eq!(get_chunk(&conn, live, 0).unwrap().unwrap(), vec![42, 43]);

        // Idempotent: nothing left to remove
        assert_eq!(delete_expired(&conn, now).unwrap(), 0);
    }
}
