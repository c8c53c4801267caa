// backup_engine_tests.rs - BackupEngine の統合テスト

mod common;

use common::{list_encrypted_archives, TestEnv};
use scrat_backup::core::{BackupEngine, BackupKind, BackupPhase, BackupStatus, LogFilter, LogLevel};
use scrat_backup::error::BackupError;
use scrat_backup::storage::{LocalStorage, StorageBackend, TransferProgress};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

// =============================================================================
// Test 1: フルバックアップ - 2ファイル
// =============================================================================

#[test]
fn test_full_backup_two_files() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"hello");
    env.write_source_file("b.txt", b"world");

    let result = env.run_full_backup(&env.backup_config());

    assert_eq!(result.kind, BackupKind::Full);
    assert_eq!(result.files_total, 2);
    assert_eq!(result.size_original, 10);
    assert!(result.errors.is_empty());

    // レコードはCompletedでsaltを持つ
    let record = env.store.get_backup(result.record_id).unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Completed);
    assert_eq!(record.files_total, 2);
    assert!(record.completed_at.is_some());
    assert_eq!(record.salt.as_ref().map(|s| s.len()), Some(32));

    // 保存先にはちょうど1つの暗号化アーカイブ
    let backup_dir = env.destination.join(&result.backup_id);
    let archives = list_encrypted_archives(&backup_dir);
    assert_eq!(archives, vec!["data.tar.xz.enc".to_string()]);

    // 平文アーカイブは残らない
    assert!(!backup_dir.join("data.tar.xz").exists());

    // ファイルマニフェストは相対パスと実際のアーカイブ名を持つ
    let files = env.store.get_backup_files(result.record_id).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].relative_path, "a.txt");
    assert_eq!(files[1].relative_path, "b.txt");
    for file in &files {
        assert_eq!(file.archive_name, "data.tar.xz.enc");
        assert!(!file.is_deleted);
    }
}

// =============================================================================
// Test 2: 空のソース - files_total=0 のCompletedバックアップ
// =============================================================================

#[test]
fn test_empty_source_completes_with_zero_files() {
    let env = TestEnv::new();
    let result = env.run_full_backup(&env.backup_config());

    assert_eq!(result.files_total, 0);
    assert_eq!(result.size_compressed, 0);

    let record = env.store.get_backup(result.record_id).unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Completed);
    assert_eq!(record.files_total, 0);

    // アーカイブは作成されない
    assert!(!env.destination.join(&result.backup_id).exists());
}

// =============================================================================
// Test 3: ベースなしの増分 - 前提条件エラー（レコードは作成されない）
// =============================================================================

#[test]
fn test_incremental_without_base_is_precondition_error() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");

    let config = env.backup_config();
    let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
    let mut engine = BackupEngine::new(&env.store, storage, config).unwrap();

    let result = engine.create_incremental_backup();
    assert!(matches!(result, Err(BackupError::Precondition { .. })));

    // BackupRecordは一切作成されていない
    assert!(env.store.get_all_backups(None, 100).unwrap().is_empty());
}

// =============================================================================
// Test 4: 増分バックアップ - 変更と削除
// =============================================================================

#[test]
fn test_incremental_with_modify_and_delete() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"hello");
    env.write_source_file("b.txt", b"world");

    let config = env.backup_config();
    let full = env.run_full_backup(&config);

    // a.txtを変更（サイズ変更で確実に検出）、b.txtを削除
    env.write_source_file("a.txt", b"HELLO!");
    fs::remove_file(env.source.join("b.txt")).unwrap();

    let incr = env.run_incremental_backup(&config);

    assert_eq!(incr.kind, BackupKind::Incremental);
    assert_eq!(incr.files_total, 1);

    let record = env.store.get_backup(incr.record_id).unwrap().unwrap();
    assert_eq!(record.base_backup_id, Some(full.record_id));
    assert_eq!(record.status, BackupStatus::Completed);

    // 増分は独立したsaltを持つ
    let full_record = env.store.get_backup(full.record_id).unwrap().unwrap();
    assert_ne!(record.salt, full_record.salt);

    // a.txtの新レコード + b.txtのトゥームストーン
    let files = env.store.get_backup_files(incr.record_id).unwrap();
    assert_eq!(files.len(), 2);

    let a = files.iter().find(|f| f.relative_path == "a.txt").unwrap();
    assert!(!a.is_deleted);
    assert_eq!(a.file_size, 6);

    let b = files.iter().find(|f| f.relative_path == "b.txt").unwrap();
    assert!(b.is_deleted);
    assert_eq!(b.file_size, 0);
    assert!(b.archive_name.is_empty());
    assert!(b.archive_path.is_empty());
}

// =============================================================================
// Test 5: 変更なしの増分 - スキップではなく空のCompletedバックアップ
// =============================================================================

#[test]
fn test_incremental_with_no_changes_completes_empty() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"stable");

    let config = env.backup_config();
    env.run_full_backup(&config);
    let incr = env.run_incremental_backup(&config);

    assert_eq!(incr.files_total, 0);

    let record = env.store.get_backup(incr.record_id).unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Completed);
    assert_eq!(record.files_total, 0);

    // アーカイブディレクトリは作成されない
    assert!(!env.destination.join(&incr.backup_id).exists());
}

// =============================================================================
// Test 5.5: 増分チェーン - ベースが増分でも削除はチェーン全体の状態に対して検出
// =============================================================================

#[test]
fn test_chained_incremental_detects_deletion_from_chain_state() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"alpha");
    env.write_source_file("b.txt", b"beta");

    let config = env.backup_config();
    env.run_full_backup(&config);

    // I1: c.txtのみ追加（a, bは未変更のためI1のマニフェストには含まれない）
    env.write_source_file("c.txt", b"gamma");
    let incr1 = env.run_incremental_backup(&config);
    assert_eq!(incr1.files_total, 1);

    // I2: フルバックアップ由来のa.txtを削除。ベースはI1だが、
    // 削除はチェーンを畳み込んだ有効状態に対して検出される
    fs::remove_file(env.source.join("a.txt")).unwrap();
    let incr2 = env.run_incremental_backup(&config);

    assert_eq!(incr2.files_total, 0);
    let files = env.store.get_backup_files(incr2.record_id).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "a.txt");
    assert!(files[0].is_deleted);

    // 未変更のb.txt, c.txtが再取り込みされないこと
    let record = env.store.get_backup(incr2.record_id).unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Completed);
}

// =============================================================================
// Test 6: ローテーション - 4回目のバックアップで最古が削除される
// =============================================================================

#[test]
fn test_rotation_keeps_newest_three() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"content");

    let config = env.backup_config();
    let mut results = Vec::new();
    for _ in 0..4 {
        results.push(env.run_full_backup(&config));
    }

    let completed = env
        .store
        .get_all_backups(Some(BackupStatus::Completed), 100)
        .unwrap();
    assert_eq!(completed.len(), 3);

    // 最古のバックアップはメタデータからも保存先からも消える
    let oldest = &results[0];
    assert!(env.store.get_backup(oldest.record_id).unwrap().is_none());
    assert!(!env.destination.join(&oldest.backup_id).exists());

    // 新しい3つは残る
    for result in &results[1..] {
        assert!(env.store.get_backup(result.record_id).unwrap().is_some());
        assert!(env.destination.join(&result.backup_id).exists());
    }
}

// =============================================================================
// Test 7: ローテーション - 生存する増分のベースは削除されない
// =============================================================================

#[test]
fn test_rotation_skips_base_of_surviving_incremental() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"v1");

    let mut config = env.backup_config();
    config.max_versions = 1;

    let full = env.run_full_backup(&config);

    env.write_source_file("a.txt", b"v2+");
    let incr = env.run_incremental_backup(&config);

    // max_versions=1だが、フルは増分のベースのため生き残る
    let completed = env
        .store
        .get_all_backups(Some(BackupStatus::Completed), 100)
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert!(env.store.get_backup(full.record_id).unwrap().is_some());
    assert!(env.store.get_backup(incr.record_id).unwrap().is_some());
}

// =============================================================================
// Test 8: 分割アーカイブ - ファイルごとに実際のアーカイブ名を記録
// =============================================================================

#[test]
fn test_split_archives_record_exact_archive_per_file() {
    let env = TestEnv::new();
    // 400KiB×3（合計1200KiB）を1MiBで分割 → 2アーカイブ
    for i in 0..3 {
        env.write_source_file(&format!("file{i}.bin"), &vec![i as u8; 400 * 1024]);
    }

    let mut config = env.backup_config();
    config.split_size = 1024 * 1024; // 1MiB → 分割が発生する

    let result = env.run_full_backup(&config);
    assert_eq!(result.files_total, 3);

    let backup_dir = env.destination.join(&result.backup_id);
    let archives = list_encrypted_archives(&backup_dir);
    assert_eq!(archives.len(), 2);
    assert!(archives.contains(&"data.tar.001.xz.enc".to_string()));
    assert!(archives.contains(&"data.tar.002.xz.enc".to_string()));

    // 各ファイルレコードは自分を含むアーカイブを指す
    let files = env.store.get_backup_files(result.record_id).unwrap();
    let used: std::collections::HashSet<String> =
        files.iter().map(|f| f.archive_name.clone()).collect();
    assert_eq!(used.len(), 2);
    for file in &files {
        assert!(archives.contains(&file.archive_name));
    }
}

// =============================================================================
// Test 9: 書き込み失敗 - レコードがFailedになりERRORログが残る
// =============================================================================

/// ディレクトリ作成が失敗するストレージ（書き込みパスの失敗セマンティクス検証用）
struct FailingStorage {
    inner: LocalStorage,
}

impl StorageBackend for FailingStorage {
    fn connect(&mut self) -> scrat_backup::Result<()> {
        self.inner.connect()
    }
    fn disconnect(&mut self) {
        self.inner.disconnect();
    }
    fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        progress: Option<TransferProgress<'_>>,
    ) -> scrat_backup::Result<()> {
        self.inner.upload_file(local, remote, progress)
    }
    fn download_file(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<TransferProgress<'_>>,
    ) -> scrat_backup::Result<()> {
        self.inner.download_file(remote, local, progress)
    }
    fn list_files(&self, remote_dir: &str) -> scrat_backup::Result<Vec<String>> {
        self.inner.list_files(remote_dir)
    }
    fn create_directory(&self, _remote: &str) -> scrat_backup::Result<()> {
        Err(BackupError::Storage {
            message: "保存先が利用できません".to_string(),
        })
    }
    fn delete_file(&self, remote: &str) -> scrat_backup::Result<()> {
        self.inner.delete_file(remote)
    }
    fn delete_directory(&self, remote: &str, recursive: bool) -> scrat_backup::Result<()> {
        self.inner.delete_directory(remote, recursive)
    }
    fn exists(&self, remote: &str) -> bool {
        self.inner.exists(remote)
    }
    fn available_space(&self) -> i64 {
        self.inner.available_space()
    }
    fn test_connection(&self) -> bool {
        self.inner.test_connection()
    }
}

#[test]
fn test_storage_failure_marks_backup_failed() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");

    let config = env.backup_config();
    let storage = Box::new(FailingStorage {
        inner: LocalStorage::new(config.destination_path.clone()),
    });
    let mut engine = BackupEngine::new(&env.store, storage, config).unwrap();

    let result = engine.create_full_backup();
    assert!(result.is_err());

    // レコードはFailedになり、エラーメッセージが残る
    let backups = env.store.get_all_backups(None, 10).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].status, BackupStatus::Failed);
    assert!(backups[0].error_message.is_some());
    assert!(backups[0].completed_at.is_some());

    // バックアップIDに紐づくERRORログが存在する
    let errors = env
        .store
        .get_logs(&LogFilter {
            level: Some(LogLevel::Error),
            backup_id: Some(backups[0].id),
            ..LogFilter::default()
        })
        .unwrap();
    assert_eq!(errors.len(), 1);
}

// =============================================================================
// Test 10: 進捗フェーズが順序どおりに通知される
// =============================================================================

#[test]
fn test_progress_phases_in_order() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"phase test data");

    let phases: Rc<RefCell<Vec<BackupPhase>>> = Rc::new(RefCell::new(Vec::new()));
    let observed = Rc::clone(&phases);

    let config = env.backup_config();
    let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
    let mut engine = BackupEngine::new(&env.store, storage, config)
        .unwrap()
        .with_progress_callback(move |p| {
            let mut seen = observed.borrow_mut();
            if seen.last() != Some(&p.phase) {
                seen.push(p.phase);
            }
        });
    engine.create_full_backup().unwrap();

    let seen = phases.borrow();
    assert_eq!(
        *seen,
        vec![
            BackupPhase::Scanning,
            BackupPhase::Compressing,
            BackupPhase::Encrypting,
            BackupPhase::SavingMetadata,
            BackupPhase::Done,
        ]
    );
}

// =============================================================================
// Test 11: スキャンエラーは致命的にならず結果に蓄積される
// =============================================================================

#[cfg(unix)]
#[test]
fn test_scan_errors_are_not_fatal() {
    use std::os::unix::fs::symlink;

    let env = TestEnv::new();
    env.write_source_file("good.txt", b"readable");
    // 壊れたシンボリックリンクは読み取りエラーになるがスキャンは継続する
    symlink(
        env.source.join("nonexistent-target"),
        env.source.join("broken-link"),
    )
    .unwrap();

    let result = env.run_full_backup(&env.backup_config());
    assert_eq!(result.files_total, 1);
    assert!(!result.errors.is_empty());

    let record = env.store.get_backup(result.record_id).unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Completed);
}
