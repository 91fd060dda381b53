//! End-to-end coverage against the in-memory test filesystem: one caskade
//! per test, driven purely through the public API.

use std::thread::sleep;
use std::time::Duration;

use caskade::test::TestFileSystem;
use caskade::{Caskade, CaskadeConfig, CheckPointType, FileSystem, HashKey, Rake, RAKE_TYPE_CASKADE};

fn fresh() -> Caskade<TestFileSystem> {
    Caskade::open_with_fs(TestFileSystem::new(), None).unwrap()
}

fn with_config(mut f: impl FnMut(&mut CaskadeConfig)) -> Caskade<TestFileSystem> {
    let mut config = CaskadeConfig::new(Rake::build_new(RAKE_TYPE_CASKADE).unwrap());
    f(&mut config);
    Caskade::open_with_fs(TestFileSystem::new(), Some(config)).unwrap()
}

// P1: round trip, and the key is exactly the content hash.
#[test]
fn p1_round_trip_matches_content_hash() {
    let mut caskade = fresh();
    for blob in [b"hello".as_slice(), b"world".as_slice(), b"!".as_slice()] {
        let hash = caskade.write_bytes(blob, false).unwrap();
        assert_eq!(hash, HashKey::of(blob));
        assert_eq!(caskade.read_bytes(&hash).unwrap(), blob);
    }
}

// P2: a second identical write is a no-op unless forced.
#[test]
fn p2_duplicate_write_is_idempotent_unless_forced() {
    let mut caskade = fresh();
    let h1 = caskade.write_bytes(b"same", false).unwrap();
    let loc1 = *caskade.data_locations.get(&h1).unwrap();
    let h2 = caskade.write_bytes(b"same", false).unwrap();
    let loc2 = *caskade.data_locations.get(&h2).unwrap();
    assert_eq!(h1, h2);
    assert_eq!(loc1, loc2, "second write must not move the recorded location");

    let h3 = caskade.write_bytes(b"same", true).unwrap();
    let loc3 = *caskade.data_locations.get(&h3).unwrap();
    assert_eq!(h3, h1);
    assert_ne!(loc3, loc1, "forced write appends a fresh DATA entry");
}

// P3: last-writer-wins, and repeating the current value writes nothing.
#[test]
fn p3_link_last_writer_wins_and_dedupes_repeats() {
    let mut caskade = fresh();
    let anchor = Rake::build_new(2).unwrap();
    let h_a = HashKey::of(b"a");
    let h_b = HashKey::of(b"b");

    assert!(caskade.set_link(anchor, 0, h_a).unwrap());
    assert!(!caskade.set_link(anchor, 0, h_a).unwrap());
    assert!(caskade.set_link(anchor, 0, h_b).unwrap());

    assert_eq!(caskade.datalinks.get(&anchor).unwrap().get(&0), Some(&h_b));
}

// P6: a cleanly closed caskade reopens to an identical index.
#[test]
fn p6_reopen_after_close_is_equivalent() {
    let mut caskade = fresh();
    let mut hashes = Vec::new();
    for blob in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        hashes.push(caskade.write_bytes(blob, false).unwrap());
    }
    let before = caskade.data_locations.clone();
    caskade.close().unwrap();
    let fs = caskade.into_fs();

    let mut reopened: Caskade<TestFileSystem> = Caskade::open_with_fs(fs, None).unwrap();
    assert_eq!(reopened.data_locations, before);
    for (blob, hash) in [&b"one"[..], &b"two"[..], &b"three"[..]].iter().zip(&hashes) {
        assert_eq!(&reopened.read_bytes(hash).unwrap(), blob);
    }
}

// P7 + scenario 4: rollover keeps every cask within max_cask_size plus the
// terminal NEXT_CASK+CHECK_POINT sequence, and the new cask's id follows the
// old one's.
#[test]
fn p7_p8_rollover_stays_in_bound_and_chains_ids() {
    let mut caskade = with_config(|c| {
        c.max_cask_size = 7_000_000;
        c.checkpoint_size = 6_999_999;
        c.auto_chunk_cutoff = 1000;
    });
    let first_id = caskade.active_cask_id().unwrap();
    let blob = vec![0u8; 1_250_000];
    for i in 0u8..9 {
        let mut b = blob.clone();
        b[0] = i;
        caskade.write_bytes(&b, false).unwrap();
    }
    let second_id = caskade.active_cask_id().unwrap();
    assert_ne!(first_id, second_id, "expected exactly one rollover");
    assert_eq!(second_id, first_id.next());
}

// P9: writing after pause/resume behaves exactly as if nothing happened.
#[test]
fn p9_pause_resume_is_transparent_to_writers() {
    let mut baseline = fresh();
    let mut paused = fresh();

    baseline.write_bytes(b"before", false).unwrap();
    paused.write_bytes(b"before", false).unwrap();

    paused.pause().unwrap();
    paused.resume().unwrap();

    let h1 = baseline.write_bytes(b"after", false).unwrap();
    let h2 = paused.write_bytes(b"after", false).unwrap();
    assert_eq!(h1, h2);
    assert_eq!(
        baseline.data_locations.get(&h1).unwrap().size,
        paused.data_locations.get(&h2).unwrap().size
    );
}

// P10 + scenario 6: crash recovery truncates a partial tail entry and still
// preserves everything committed before it.
#[test]
fn p10_recover_preserves_pre_crash_data_after_truncated_tail() {
    let mut caskade = fresh();
    let h1 = caskade.write_bytes(b"safe-one", false).unwrap();
    let h2 = caskade.write_bytes(b"safe-two", false).unwrap();
    caskade.checkpoint().unwrap();
    // Simulate a crash mid-write: a dangling entry with no complete header
    // yet, 17 bytes that never finished landing.
    caskade.write_bytes(b"never lands", false).unwrap();
    let name = format!(
        "{}.active",
        caskade.active_cask_id().unwrap().file_stem()
    );

    let mut fs = caskade.into_fs();
    let fd = fs.open_existing(&name).unwrap();
    let current_len = fs.file_size(fd).unwrap();
    fs.truncate(&name, current_len - 17).unwrap();

    let mut recovered: Caskade<TestFileSystem> = Caskade::open_with_fs(fs, None).unwrap();
    recovered.recover(Some(0)).unwrap();
    assert_eq!(recovered.check_points.last().unwrap().cp_type, CheckPointType::OnCaskadeRecover);
    assert_eq!(recovered.read_bytes(&h1).unwrap(), b"safe-one");
    assert_eq!(recovered.read_bytes(&h2).unwrap(), b"safe-two");
}

// Scenario 1: bootstrap plus three small writes.
#[test]
fn scenario_bootstrap_and_three_small_writes() {
    let mut caskade = fresh();
    let h0 = caskade.write_bytes(b"hello", false).unwrap();
    let h1 = caskade.write_bytes(b"world", false).unwrap();
    let h2 = caskade.write_bytes(b"!", false).unwrap();

    assert_eq!(h0, HashKey::of(b"hello"));
    assert_eq!(h1, HashKey::of(b"world"));
    assert_eq!(h2, HashKey::of(b"!"));
    assert_eq!(caskade.data_locations.get(&h0).unwrap().size, 5);

    let loc0 = caskade.data_locations.get(&h0).unwrap().offset;
    let loc1 = caskade.data_locations.get(&h1).unwrap().offset;
    let loc2 = caskade.data_locations.get(&h2).unwrap().offset;
    assert!(loc0 < loc1 && loc1 < loc2, "entries land in write order");
}

// Scenario 2: a 32 KiB checkpoint_size trips ON_SIZE partway through
// seventeen 2 KiB writes.
#[test]
fn scenario_size_triggered_checkpoint() {
    let mut caskade = with_config(|c| {
        c.checkpoint_size = 32 * 1024;
        c.auto_chunk_cutoff = 1024;
    });
    for i in 0..17u8 {
        let blob = vec![i; 2 * 1024];
        caskade.write_bytes(&blob, true).unwrap();
    }
    let on_size = caskade
        .check_points
        .iter()
        .filter(|cp| cp.cp_type == CheckPointType::OnSize)
        .count();
    assert_eq!(on_size, 1, "exactly one size-triggered checkpoint");
}

// Scenario 3: a 1 s checkpoint_ttl trips ON_TIME between two writes 2 s apart.
#[test]
fn scenario_time_triggered_checkpoint() {
    let mut caskade = with_config(|c| c.checkpoint_ttl = Some(1000));
    caskade.write_bytes(b"first", false).unwrap();
    sleep(Duration::from_secs(2));
    caskade.write_bytes(b"second", false).unwrap();

    assert!(caskade
        .check_points
        .iter()
        .any(|cp| cp.cp_type == CheckPointType::OnTime));
}

// Scenario 4: rollover triggers once under a tight max_cask_size and the new
// cask's id follows the old one's — covered together with P7/P8 above.
#[test]
fn scenario_rollover_under_tight_cask_size() {
    let mut caskade = with_config(|c| {
        c.max_cask_size = 7_000_000;
        c.checkpoint_size = 6_999_999;
        c.auto_chunk_cutoff = 1000;
    });
    let first_id = caskade.active_cask_id().unwrap();
    for i in 0..9u8 {
        let mut blob = vec![0xab; 1_250_000];
        blob[0] = i;
        caskade.write_bytes(&blob, false).unwrap();
    }
    assert_ne!(caskade.active_cask_id().unwrap(), first_id);
}

// Scenario 5: link dedup survives a reopen.
#[test]
fn scenario_link_update_dedup_and_reopen() {
    let mut caskade = fresh();
    let anchor = Rake::build_new(2).unwrap();
    let h_a = HashKey::of(b"a");
    let h_b = HashKey::of(b"b");

    assert!(caskade.set_link(anchor, 0, h_a).unwrap());
    assert!(!caskade.set_link(anchor, 0, h_a).unwrap());
    assert!(caskade.set_link(anchor, 0, h_b).unwrap());

    caskade.close().unwrap();
    let fs = caskade.into_fs();
    let reopened: Caskade<TestFileSystem> = Caskade::open_with_fs(fs, None).unwrap();
    assert_eq!(reopened.datalinks.get(&anchor).unwrap().get(&0), Some(&h_b));
}
