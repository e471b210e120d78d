//! Storage engine integration tests, including the large-file chunking
//! scenario end to end.

mod common;

use common::TestHarness;
use darkroom_common::{ByteRange, FileId};
use futures::StreamExt;

async fn collect<S, B, E>(mut stream: S) -> Vec<u8>
where
    S: futures::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Debug,
{
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.extend_from_slice(item.unwrap().as_ref());
    }
    out
}

#[tokio::test]
async fn store_then_stream_roundtrip() {
    let harness = TestHarness::new();
    let storage = &harness.ctx.storage;
    let file_id = FileId::new();

    let bytes: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
    let path = storage
        .store_file(file_id, &bytes, "session_042.nef")
        .await
        .unwrap();

    let stream = storage.create_read_stream(&path, None).await.unwrap();
    assert_eq!(collect(stream).await, bytes);
}

#[tokio::test]
async fn large_image_chunking_scenario() {
    // 30 MiB of a repeated byte as large_image.jpg: must chunk at the
    // default 25 MiB threshold into ceil(30 MiB / 255 KiB) rows, and both
    // read paths must reproduce the bytes unchanged.
    let harness = TestHarness::new();
    let storage = &harness.ctx.storage;
    let file_id = FileId::new();

    let size: usize = 30 * 1024 * 1024;
    let bytes = vec![b'x'; size];
    let path = storage
        .store_file(file_id, &bytes, "large_image.jpg")
        .await
        .unwrap();

    let stats = storage.file_stats(&path).await;
    assert!(stats.exists);
    assert_eq!(stats.size, size as u64);

    assert!(storage.should_use_chunking(size as u64));

    let chunk_size: usize = 255 * 1024;
    let expected_chunks = size.div_ceil(chunk_size) as u32;
    let count = storage.create_chunks_for_file(file_id, &path).await.unwrap();
    assert_eq!(count, expected_chunks);

    // Second materialization call reports the same count without rebuilding
    let again = storage.create_chunks_for_file(file_id, &path).await.unwrap();
    assert_eq!(again, expected_chunks);

    let chunked =
        storage.create_chunked_read_stream(file_id, ByteRange::new(0, size as u64 - 1));
    futures::pin_mut!(chunked);
    let reassembled = collect(chunked).await;
    assert_eq!(reassembled.len(), size);
    assert_eq!(reassembled, bytes);

    // Last chunk carries the remainder
    let last = storage.get_chunk(file_id, expected_chunks - 1).unwrap();
    assert_eq!(last.len(), size % chunk_size);
}

#[tokio::test]
async fn chunk_concatenation_equals_original() {
    let mut config = darkroom::config::Config::default();
    config.storage.large_file_threshold = 1024;
    config.storage.chunk_size = 300;
    let harness = TestHarness::with_config(config);
    let storage = &harness.ctx.storage;
    let file_id = FileId::new();

    let bytes: Vec<u8> = (0..2000u32).map(|i| (i * 13 % 256) as u8).collect();
    let path = storage.store_file(file_id, &bytes, "burst.arw").await.unwrap();
    let count = storage.create_chunks_for_file(file_id, &path).await.unwrap();
    assert_eq!(count, 2000u32.div_ceil(300));

    let mut concatenated = Vec::new();
    for idx in 0..count {
        concatenated.extend(storage.get_chunk(file_id, idx).unwrap());
    }
    assert_eq!(concatenated, bytes);
}

#[tokio::test]
async fn delete_is_idempotent_for_never_stored_files() {
    let harness = TestHarness::new();
    let storage = &harness.ctx.storage;
    let ghost = FileId::new();

    storage.delete_file("2026/01/never-here.jpg").await.unwrap();
    storage.delete_chunks(ghost).unwrap();

    // And again, after the no-op
    storage.delete_file("2026/01/never-here.jpg").await.unwrap();
    storage.delete_chunks(ghost).unwrap();
}

#[tokio::test]
async fn cleanup_spares_future_chunks() {
    use chrono::{Duration, Utc};
    use darkroom_db::queries::chunks;

    let harness = TestHarness::new();
    let storage = &harness.ctx.storage;
    let now = Utc::now();

    let stale = FileId::new();
    let live = FileId::new();
    {
        let conn = harness.conn();
        chunks::insert_batch(&conn, stale, 0, &[vec![1, 2]], now - Duration::hours(2)).unwrap();
        chunks::insert_batch(&conn, live, 0, &[vec![3, 4]], now + Duration::hours(2)).unwrap();
    }

    assert_eq!(storage.cleanup_expired_chunks().unwrap(), 1);
    assert!(storage.get_chunk(stale, 0).is_err());
    assert_eq!(storage.get_chunk(live, 0).unwrap(), vec![3, 4]);

    // Idempotent second sweep
    assert_eq!(storage.cleanup_expired_chunks().unwrap(), 0);
}
