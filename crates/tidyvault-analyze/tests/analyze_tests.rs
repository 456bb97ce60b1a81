use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tidyvault_analyze::{
    AnalyzeError, DiskAnalyzer, DuplicateConfig, DuplicateDetector, FileCategory, InlineExecutor,
    PoolExecutor,
};
use tidyvault_core::{ScanOptions, Snapshot};
use tidyvault_scan::{FileScanner, ScanConfig};
use tidyvault_store::SnapshotStore;
use tokio_util::sync::CancellationToken;

fn scan(store: &Arc<SnapshotStore>, root: &Path) -> Snapshot {
    FileScanner::new(Arc::clone(store))
        .scan(&ScanConfig::new([root]), &CancellationToken::new())
        .unwrap()
        .snapshot
}

fn detector(store: &Arc<SnapshotStore>, config: DuplicateConfig) -> DuplicateDetector {
    DuplicateDetector::new(Arc::clone(store), Arc::new(PoolExecutor::new(2).unwrap()), config)
}

// ==================== Duplicate detection ====================

#[test]
fn test_two_identical_files_form_one_cluster() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.bin"), b"0123456789").unwrap();
    fs::write(temp.path().join("b.bin"), b"0123456789").unwrap();
    fs::write(temp.path().join("c.bin"), b"01234567890123456789").unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    assert_eq!(cluster.member_count(), 2);
    assert_eq!(cluster.size_bytes, 10);
    assert_eq!(cluster.waste_bytes, 10);
    assert_eq!(cluster.representative_path, temp.path().canonicalize().unwrap().join("a.bin"));
    assert_eq!(report.files_considered, 2);
    assert_eq!(report.total_waste_bytes, 10);
}

#[test]
fn test_partial_hash_collision_is_separated() {
    let temp = TempDir::new().unwrap();
    let mut content = vec![7u8; 64];
    fs::write(temp.path().join("first"), &content).unwrap();
    content[32] = 8;
    fs::write(temp.path().join("second"), &content).unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    // With an 8 byte window only the differing middle escapes the partial hash
    let config = DuplicateConfig::builder().partial_window(8u64).build().unwrap();
    let report = detector(&store, config)
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.full_hash_candidates, 2);
    assert!(report.clusters.is_empty());
}

#[test]
fn test_cluster_members_share_size_and_hash() {
    let temp = TempDir::new().unwrap();
    for dir in ["x", "y", "z"] {
        fs::create_dir(temp.path().join(dir)).unwrap();
        fs::write(temp.path().join(dir).join("photo.jpg"), vec![1u8; 300]).unwrap();
        fs::write(temp.path().join(dir).join("notes.txt"), b"same notes").unwrap();
    }
    fs::write(temp.path().join("other.jpg"), vec![2u8; 300]).unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());
    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.clusters.len(), 2);
    // Larger waste first
    assert_eq!(report.clusters[0].waste_bytes, 600);
    assert_eq!(report.clusters[1].waste_bytes, 20);

    let mut seen = std::collections::HashSet::new();
    for cluster in &report.clusters {
        assert!(cluster.members.len() >= 2);
        for member in &cluster.members {
            assert_eq!(member.size_bytes, cluster.size_bytes);
            assert!(seen.insert(member.path.clone()), "file in two clusters");
        }
    }
}

#[test]
fn test_detection_is_deterministic_across_executors() {
    let temp = TempDir::new().unwrap();
    for i in 0..6 {
        fs::write(temp.path().join(format!("copy{i}")), b"identical payload").unwrap();
    }

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    let pooled = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();
    let inline = DuplicateDetector::new(Arc::clone(&store), Arc::new(InlineExecutor), DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(pooled.clusters, inline.clusters);
    assert!(pooled.clusters[0].representative_path.ends_with("copy0"));
}

#[test]
fn test_vanished_and_changed_files_are_dropped() {
    let temp = TempDir::new().unwrap();
    for name in ["a", "b", "c", "d"] {
        fs::write(temp.path().join(name), b"twelve bytes").unwrap();
    }

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    fs::remove_file(temp.path().join("c")).unwrap();
    fs::write(temp.path().join("d"), b"twelve bytes and more").unwrap();

    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.dropped_files, 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].member_count(), 2);
}

#[test]
fn test_same_size_rewrite_is_dropped() {
    let temp = TempDir::new().unwrap();
    for name in ["a", "b", "c"] {
        fs::write(temp.path().join(name), b"same length!").unwrap();
    }

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    // Rewritten in place with the same size but a different mtime
    let file = fs::File::options().write(true).open(temp.path().join("c")).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();

    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.dropped_files, 1);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].member_count(), 2);
}

#[cfg(unix)]
#[test]
fn test_hard_links_are_not_duplicates() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.bin"), b"linked payload").unwrap();
    fs::hard_link(temp.path().join("a.bin"), temp.path().join("b.bin")).unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());
    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    // Two names, one inode: nothing to reclaim
    assert!(!report.has_duplicates());
    assert_eq!(report.hard_links, 1);
    assert_eq!(report.total_waste_bytes, 0);

    // A real copy next to the links forms a cluster with the first link only
    fs::write(temp.path().join("c.bin"), b"linked payload").unwrap();
    let snapshot = scan(&store, temp.path());
    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    let root = temp.path().canonicalize().unwrap();
    assert_eq!(report.clusters.len(), 1);
    let paths: Vec<_> = report.clusters[0].members.iter().map(|m| m.path.clone()).collect();
    assert_eq!(paths, vec![root.join("a.bin"), root.join("c.bin")]);
    assert_eq!(report.total_waste_bytes, 14);
}

#[test]
fn test_empty_files_are_never_duplicates() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("empty1"), b"").unwrap();
    fs::write(temp.path().join("empty2"), b"").unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());
    let report = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &CancellationToken::new())
        .unwrap();

    assert!(!report.has_duplicates());
    assert_eq!(report.files_considered, 0);
}

#[test]
fn test_detection_requires_finalized_snapshot() {
    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let id = store
        .create_snapshot(&[std::path::PathBuf::from("/data")], ScanOptions::default())
        .unwrap();

    let err = detector(&store, DuplicateConfig::default())
        .detect(id, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::SnapshotNotFinalized(_)));
}

#[test]
fn test_cancelled_detection() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a"), b"same").unwrap();
    fs::write(temp.path().join("b"), b"same").unwrap();

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = detector(&store, DuplicateConfig::default())
        .detect(snapshot.id, &cancel)
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::Cancelled));
}

// ==================== Disk usage ====================

fn usage_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("media/raw")).unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("media/clip.mp4"), vec![0u8; 5000]).unwrap();
    fs::write(root.join("media/raw/shot.jpg"), vec![0u8; 3000]).unwrap();
    fs::write(root.join("docs/report.pdf"), vec![0u8; 700]).unwrap();
    fs::write(root.join("docs/notes.txt"), vec![0u8; 300]).unwrap();
    fs::write(root.join("Makefile"), vec![0u8; 10]).unwrap();
    temp
}

#[test]
fn test_folder_rollup_includes_subdirectories() {
    let temp = usage_tree();
    let root = temp.path().canonicalize().unwrap();
    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());

    let folders = DiskAnalyzer::new(Arc::clone(&store))
        .folder_rollup(snapshot.id, 10)
        .unwrap();

    assert_eq!(folders[0].path, root);
    assert_eq!(folders[0].bytes, 9010);
    assert_eq!(folders[0].file_count, 5);
    let media = folders.iter().find(|f| f.path == root.join("media")).unwrap();
    assert_eq!(media.bytes, 8000);
    // Nothing above the root is reported
    assert!(folders.iter().all(|f| f.path.starts_with(&root)));
}

#[test]
fn test_categories_and_extensions() {
    let temp = usage_tree();
    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let snapshot = scan(&store, temp.path());
    let analyzer = DiskAnalyzer::new(Arc::clone(&store));

    let categories = analyzer.category_distribution(snapshot.id).unwrap();
    assert_eq!(categories.len(), 7);
    let bytes = |c: FileCategory| categories.iter().find(|u| u.category == c).unwrap().total_bytes;
    assert_eq!(bytes(FileCategory::Video), 5000);
    assert_eq!(bytes(FileCategory::Image), 3000);
    assert_eq!(bytes(FileCategory::Document), 1000);
    assert_eq!(bytes(FileCategory::Other), 10);
    assert_eq!(bytes(FileCategory::Audio), 0);

    let top = analyzer.extension_frequency(snapshot.id, 2).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].extension.as_deref(), Some("mp4"));

    let largest = analyzer.largest_files(snapshot.id, 1).unwrap();
    assert!(largest[0].path.ends_with("media/clip.mp4"));

    let histogram = analyzer.size_histogram(snapshot.id).unwrap();
    assert_eq!(histogram.iter().map(|b| b.file_count).sum::<u64>(), 5);
    let curve = analyzer.pareto_curve(snapshot.id, 5).unwrap();
    assert!((curve.last().unwrap().bytes_pct - 100.0).abs() < 1e-9);
}

#[test]
fn test_growth_between_scans() {
    let temp = usage_tree();
    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let base = scan(&store, temp.path());

    fs::write(temp.path().join("docs/new.txt"), vec![0u8; 50]).unwrap();
    fs::remove_file(temp.path().join("Makefile")).unwrap();
    let current = scan(&store, temp.path());

    let delta = DiskAnalyzer::new(Arc::clone(&store))
        .growth(base.id, current.id)
        .unwrap();
    assert_eq!((delta.added_files, delta.added_bytes), (1, 50));
    assert_eq!((delta.removed_files, delta.removed_bytes), (1, 10));
    assert_eq!(delta.net_bytes, 40);
}

#[test]
fn test_growth_requires_same_roots() {
    let first = usage_tree();
    let second = usage_tree();
    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    let a = scan(&store, first.path());
    let b = scan(&store, second.path());

    let err = DiskAnalyzer::new(Arc::clone(&store)).growth(a.id, b.id).unwrap_err();
    assert!(matches!(err, AnalyzeError::RootsMismatch { .. }));
}
