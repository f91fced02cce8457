//! Crash-consistency tests: torn commits, corrupted footers, stale headers,
//! trailing garbage, and deep verification.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use mnemo_core::{CreateOptions, PutOptions, Store, StoreError};
use tempfile::TempDir;

fn small_options() -> CreateOptions {
    CreateOptions {
        wal_size: 64 * 1024,
        auto_commit_threshold_pct: None,
    }
}

fn truncate_file(path: &std::path::Path, len: u64) {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("open store file");
    file.set_len(len).expect("truncate");
    file.sync_all().expect("sync");
}

/// Crash between TOC write and footer write: the file ends at the new TOC
/// and the previous (zero-frame) footer must win on reopen.
#[test]
#[cfg(not(target_os = "windows"))]
fn torn_commit_falls_back_to_previous_footer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("torn.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"doomed frame", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    // Chop the footer (the trailing 64 bytes) off the committed tail.
    let len = std::fs::metadata(&path).unwrap().len();
    truncate_file(&path, len - mnemo_core::FOOTER_SIZE as u64);

    let mut store = Store::open(&path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.frame_count, 0, "must recover the zero-frame footer");
    assert_eq!(stats.generation, 0);
    store.close().unwrap();
}

/// A footer truncated mid-record must not be accepted either.
#[test]
#[cfg(not(target_os = "windows"))]
fn mid_footer_truncation_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("midfoot.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"doomed frame", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    let len = std::fs::metadata(&path).unwrap().len();
    truncate_file(&path, len - 16);

    let store = Store::open(&path).unwrap();
    assert_eq!(store.stats().unwrap().generation, 0);
}

/// Corrupting the newest footer keeps the WAL intact, so the interrupted
/// mutation replays as pending and the next commit lands it.
#[test]
#[cfg(not(target_os = "windows"))]
fn corrupted_footer_recovers_pending_mutations_from_wal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt-footer.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"hello world", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    // Corrupt the footer's TOC hash, as a torn footer write would.
    {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let len = file.metadata().unwrap().len();
        file.seek(SeekFrom::Start(len - 40)).unwrap();
        file.write_all(&[0xFFu8; 16]).unwrap();
        file.sync_all().unwrap();
    }

    let mut store = Store::open(&path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.frame_count, 0, "newest footer is gone");
    assert_eq!(stats.pending_frames, 1, "the put survives in the wal");
    assert_eq!(
        store.frame_content_including_pending(0).unwrap(),
        b"hello world"
    );

    store.commit().unwrap();
    assert_eq!(store.stats().unwrap().frame_count, 1);
    assert_eq!(store.frame_content(0).unwrap(), b"hello world");
    store.close().unwrap();
}

/// Crash between footer write and header rewrite: the stale header names the
/// older footer, but the scan must select the newer one.
#[test]
#[cfg(not(target_os = "windows"))]
fn stale_header_yields_to_newer_footer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stale-header.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"first", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    // Save the generation-1 header region.
    let mut old_headers = vec![0u8; 8192];
    {
        let mut file = OpenOptions::new().read(true).open(&path).unwrap();
        file.read_exact(&mut old_headers).unwrap();
    }

    {
        let mut store = Store::open(&path).unwrap();
        store.put(b"second", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    // Roll the header region back, as if the crash hit before the swap.
    {
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&old_headers).unwrap();
        file.sync_all().unwrap();
    }

    let mut store = Store::open(&path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.generation, 2, "scan must find the newer footer");
    assert_eq!(stats.frame_count, 2);
    assert_eq!(store.frame_content(1).unwrap(), b"second");
    store.close().unwrap();
}

/// Dropping the handle without close leaves the put in the WAL; reopen
/// replays it as pending even though the header snapshot is stale.
#[test]
fn dropped_handle_replays_wal_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dropped.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"unflushed", PutOptions::default()).unwrap();
        drop(store);
    }

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.stats().unwrap().frame_count, 0);
    assert_eq!(store.stats().unwrap().pending_frames, 1);
    assert_eq!(
        store.frame_content_including_pending(0).unwrap(),
        b"unflushed"
    );
    store.commit().unwrap();
    assert_eq!(store.stats().unwrap().frame_count, 1);
    store.close().unwrap();
}

/// The replay snapshot written by a clean commit lets the next open skip the
/// WAL scan entirely.
#[test]
fn clean_reopen_hits_replay_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"content", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.wal_stats().unwrap().replay_snapshot_hit_count, 1);
    assert_eq!(store.stats().unwrap().frame_count, 1);
}

/// Trailing garbage past the footer: accepted without repair, truncated
/// with repair.
#[test]
#[cfg(not(target_os = "windows"))]
fn trailing_garbage_honours_repair_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.mv2s");

    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(b"content", PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }
    let clean_len = std::fs::metadata(&path).unwrap().len();

    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 100]).unwrap();
        file.sync_all().unwrap();
    }

    // Without repair the garbage is tolerated and left in place.
    {
        let mut store = Store::open(&path).unwrap();
        assert_eq!(store.stats().unwrap().frame_count, 1);
        store.close().unwrap();
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len + 100);

    // With repair the file is trimmed back to the recoverable tail.
    {
        let mut store = Store::open_with_options(
            &path,
            mnemo_core::OpenOptions {
                repair: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(store.stats().unwrap().frame_count, 1);
        store.close().unwrap();
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);
}

/// Deep verification recomputes stored checksums and fails on a flipped
/// payload byte.
#[test]
#[cfg(not(target_os = "windows"))]
fn deep_verify_detects_payload_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bitrot.mv2s");

    let body = b"unique-payload-marker-0123456789";
    {
        let mut store = Store::create_with_options(&path, small_options()).unwrap();
        store.put(body, PutOptions::default()).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    Store::verify(&path, true).expect("healthy file verifies");

    // Locate the payload bytes and flip one.
    let bytes = std::fs::read(&path).unwrap();
    let pos = bytes
        .windows(body.len())
        .position(|window| window == body)
        .expect("payload bytes present verbatim");
    {
        let mut file = OpenOptions::new().write(true).read(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(pos as u64)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        byte[0] ^= 0x01;
        file.seek(SeekFrom::Start(pos as u64)).unwrap();
        file.write_all(&byte).unwrap();
        file.sync_all().unwrap();
    }

    Store::verify(&path, false).expect("shallow verify does not hash payloads");
    let err = Store::verify(&path, true).expect_err("deep verify must fail");
    assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
}
