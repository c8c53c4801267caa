// restore_engine_tests.rs - RestoreEngine の統合テスト

mod common;

use common::{TestEnv, TEST_PASSPHRASE};
use scrat_backup::core::{RestoreConfig, RestoreEngine, RestoreResult};
use scrat_backup::crypto::Encryptor;
use scrat_backup::error::BackupError;
use scrat_backup::storage::LocalStorage;
use std::fs;
use std::path::PathBuf;

fn restore_config(env: &TestEnv) -> RestoreConfig {
    RestoreConfig::new(env.restore_dest.clone(), TEST_PASSPHRASE.to_string())
}

fn run_restore(env: &TestEnv, config: RestoreConfig, backup_id: i64) -> RestoreResult {
    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, config);
    engine.restore_full_backup(backup_id).unwrap()
}

/// カスタムリストアの配置先（復元先/ソースルート名/相対パス）
fn restored_path(env: &TestEnv, relative: &str) -> PathBuf {
    env.restore_dest.join("source").join(relative)
}

// =============================================================================
// Test 1: フルリストア - バイト単位のラウンドトリップ
// =============================================================================

#[test]
fn test_full_restore_roundtrip() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"hello");
    env.write_source_file("sub/b.txt", b"world");

    let backup = env.run_full_backup(&env.backup_config());
    let result = run_restore(&env, restore_config(&env), backup.record_id);

    assert_eq!(result.files_restored, 2);
    assert_eq!(
        fs::read(restored_path(&env, "a.txt")).unwrap(),
        b"hello"
    );
    assert_eq!(
        fs::read(restored_path(&env, "sub/b.txt")).unwrap(),
        b"world"
    );

    // 一時ディレクトリは破棄されている
    assert!(!env.restore_dest.join(".scrat-restore-tmp").exists());
}

// =============================================================================
// Test 2: 誤ったパスフレーズ - 暗号文に触れる前に専用エラー
// =============================================================================

#[test]
fn test_wrong_passphrase_fails_before_touching_ciphertext() {
    let env = TestEnv::new();
    env.write_source_file("secret.txt", b"sensitive");

    let backup = env.run_full_backup(&env.backup_config());

    let config = RestoreConfig::new(env.restore_dest.clone(), "Wrong-Passphrase-2".to_string());
    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, config);

    let result = engine.restore_full_backup(backup.record_id);
    match result {
        Err(e) => assert!(e.is_crypto()),
        Ok(_) => panic!("誤ったパスフレーズで成功してはならない"),
    }

    // 復元先には何も書き込まれない
    assert!(!env.restore_dest.exists());
}

// =============================================================================
// Test 3: 既存ファイルの上書き制御
// =============================================================================

#[test]
fn test_overwrite_existing_flag() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"original");

    let backup = env.run_full_backup(&env.backup_config());

    // 1回目のリストア
    let result = run_restore(&env, restore_config(&env), backup.record_id);
    assert_eq!(result.files_restored, 1);

    // 復元済みファイルを書き換える
    fs::write(restored_path(&env, "a.txt"), b"locally modified").unwrap();

    // overwrite=false: スキップされ、処理済みにはカウントされる
    let result = run_restore(&env, restore_config(&env), backup.record_id);
    assert_eq!(result.files_restored, 0);
    assert_eq!(result.files_processed, 1);
    assert_eq!(
        fs::read(restored_path(&env, "a.txt")).unwrap(),
        b"locally modified"
    );

    // overwrite=true: 置き換えられる
    let mut config = restore_config(&env);
    config.overwrite_existing = true;
    let result = run_restore(&env, config, backup.record_id);
    assert_eq!(result.files_restored, 1);
    assert_eq!(fs::read(restored_path(&env, "a.txt")).unwrap(), b"original");
}

// =============================================================================
// Test 4: 元の場所への復元
// =============================================================================

#[test]
fn test_restore_to_original_location() {
    let env = TestEnv::new();
    let original = env.write_source_file("docs/report.txt", b"important");

    let backup = env.run_full_backup(&env.backup_config());

    // 元ファイルを失った状況を再現
    fs::remove_file(&original).unwrap();
    assert!(!original.exists());

    let mut config = restore_config(&env);
    config.restore_to_original = true;
    let result = run_restore(&env, config, backup.record_id);

    assert_eq!(result.files_restored, 1);
    assert_eq!(fs::read(&original).unwrap(), b"important");
}

// =============================================================================
// Test 5: 増分のリストアは増分に含まれるファイルのみを配置
// =============================================================================

#[test]
fn test_incremental_restore_places_only_changed_files() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"hello");
    env.write_source_file("b.txt", b"world");

    let config = env.backup_config();
    env.run_full_backup(&config);

    env.write_source_file("a.txt", b"HELLO!");
    fs::remove_file(env.source.join("b.txt")).unwrap();
    let incr = env.run_incremental_backup(&config);

    let result = run_restore(&env, restore_config(&env), incr.record_id);

    assert_eq!(result.files_restored, 1);
    assert_eq!(fs::read(restored_path(&env, "a.txt")).unwrap(), b"HELLO!");
    // b.txtはトゥームストーンのため配置されない
    assert!(!restored_path(&env, "b.txt").exists());
}

// =============================================================================
// Test 6: ポイントインタイムリストア
// =============================================================================

#[test]
fn test_point_in_time_restore() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"alpha");
    env.write_source_file("b.txt", b"beta");

    let config = env.backup_config();
    env.run_full_backup(&config);

    // I1: c.txtを追加
    env.write_source_file("c.txt", b"gamma");
    let incr1 = env.run_incremental_backup(&config);

    // I2: a.txtを削除（トゥームストーンのみの増分）
    fs::remove_file(env.source.join("a.txt")).unwrap();
    let incr2 = env.run_incremental_backup(&config);

    let t1 = env
        .store
        .get_backup(incr1.record_id)
        .unwrap()
        .unwrap()
        .timestamp;
    let t2 = env
        .store
        .get_backup(incr2.record_id)
        .unwrap()
        .unwrap()
        .timestamp;

    // T1 <= t < T2 → {a, b, c}
    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_to_point_in_time(t1).unwrap();

    assert_eq!(result.files_restored, 3);
    assert_eq!(fs::read(restored_path(&env, "a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(restored_path(&env, "b.txt")).unwrap(), b"beta");
    assert_eq!(fs::read(restored_path(&env, "c.txt")).unwrap(), b"gamma");

    // t >= T2 → {b, c}
    let restore_dest2 = env.temp.path().join("restored2");
    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(
        &env.store,
        storage,
        RestoreConfig::new(restore_dest2.clone(), TEST_PASSPHRASE.to_string()),
    );
    let result = engine.restore_to_point_in_time(t2).unwrap();

    assert_eq!(result.files_restored, 2);
    assert!(!restore_dest2.join("source/a.txt").exists());
    assert_eq!(
        fs::read(restore_dest2.join("source/b.txt")).unwrap(),
        b"beta"
    );
    assert_eq!(
        fs::read(restore_dest2.join("source/c.txt")).unwrap(),
        b"gamma"
    );
}

// =============================================================================
// Test 7: フルバックアップ以前の時刻指定は前提条件エラー
// =============================================================================

#[test]
fn test_point_in_time_before_any_full_is_error() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");
    let backup = env.run_full_backup(&env.backup_config());

    let before = env
        .store
        .get_backup(backup.record_id)
        .unwrap()
        .unwrap()
        .timestamp
        - chrono::Duration::hours(1);

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_to_point_in_time(before);
    assert!(matches!(result, Err(BackupError::Precondition { .. })));
}

// =============================================================================
// Test 8: パターンによる部分リストア
// =============================================================================

#[test]
fn test_partial_restore_by_pattern() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"root file");
    env.write_source_file("docs/b.txt", b"doc file");

    let backup = env.run_full_backup(&env.backup_config());

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine
        .restore_specific_files(backup.record_id, &["docs/*".to_string()])
        .unwrap();

    assert_eq!(result.files_restored, 1);
    assert_eq!(
        fs::read(restored_path(&env, "docs/b.txt")).unwrap(),
        b"doc file"
    );
    assert!(!restored_path(&env, "a.txt").exists());
}

#[test]
fn test_partial_restore_no_match_is_empty_success() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");
    let backup = env.run_full_backup(&env.backup_config());

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine
        .restore_specific_files(backup.record_id, &["*.pdf".to_string()])
        .unwrap();

    assert_eq!(result.files_restored, 0);
    assert!(!env.restore_dest.exists());
}

// =============================================================================
// Test 9: レガシーコンテナ（nonce || ciphertext）の復元
// =============================================================================

#[test]
fn test_legacy_container_restores_identically() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"legacy roundtrip");

    let backup = env.run_full_backup(&env.backup_config());
    let record = env.store.get_backup(backup.record_id).unwrap().unwrap();
    let encryptor =
        Encryptor::with_salt(TEST_PASSPHRASE, record.salt.as_deref().unwrap()).unwrap();

    // チャンク形式のアーカイブを復号し、レガシー形式で書き直す
    let enc_path = env
        .destination
        .join(&backup.backup_id)
        .join("data.tar.xz.enc");
    let archive_path = env.temp.path().join("data.tar.xz");
    encryptor.decrypt_file(&enc_path, &archive_path).unwrap();

    let archive_bytes = fs::read(&archive_path).unwrap();
    let (ciphertext, nonce) = encryptor.encrypt_bytes(&archive_bytes, None).unwrap();
    let mut legacy = nonce.to_vec();
    legacy.extend_from_slice(&ciphertext);
    fs::write(&enc_path, &legacy).unwrap();

    // レガシー形式でも同一の内容が復元される
    let result = run_restore(&env, restore_config(&env), backup.record_id);
    assert_eq!(result.files_restored, 1);
    assert_eq!(
        fs::read(restored_path(&env, "a.txt")).unwrap(),
        b"legacy roundtrip"
    );
}

// =============================================================================
// Test 10: saltのないレコード（旧バージョン）は復元不能
// =============================================================================

#[test]
fn test_missing_salt_is_not_restorable() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");
    let backup = env.run_full_backup(&env.backup_config());

    // 旧バージョンで作成されたレコードを再現（saltをNULL化）
    let conn = rusqlite::Connection::open(env.temp.path().join("metadata.db")).unwrap();
    conn.execute(
        "UPDATE backups SET salt = NULL WHERE id = ?1",
        rusqlite::params![backup.record_id],
    )
    .unwrap();

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_full_backup(backup.record_id);
    assert!(matches!(result, Err(BackupError::NotRestorable { .. })));
}

// =============================================================================
// Test 11: Completedでないバックアップは復元できない
// =============================================================================

#[test]
fn test_running_backup_is_not_restorable() {
    let env = TestEnv::new();
    let record_id = env
        .store
        .create_backup_record(
            scrat_backup::core::BackupKind::Full,
            scrat_backup::storage::DestinationKind::Usb,
            &env.destination.to_string_lossy(),
            "cafebabe",
            &[0u8; 32],
            None,
        )
        .unwrap();

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_full_backup(record_id);
    assert!(matches!(result, Err(BackupError::Precondition { .. })));
}

// =============================================================================
// Test 12: アーカイブが消失したバックアップは復元不能
// =============================================================================

#[test]
fn test_missing_archives_not_restorable() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"data");
    let backup = env.run_full_backup(&env.backup_config());

    fs::remove_dir_all(env.destination.join(&backup.backup_id)).unwrap();

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_full_backup(backup.record_id);
    assert!(matches!(result, Err(BackupError::NotRestorable { .. })));
}

// =============================================================================
// Test 13: 空のバックアップのリストアは配置なしで成功
// =============================================================================

#[test]
fn test_restore_empty_backup_succeeds() {
    let env = TestEnv::new();
    let backup = env.run_full_backup(&env.backup_config());
    assert_eq!(backup.files_total, 0);

    let result = run_restore(&env, restore_config(&env), backup.record_id);
    assert_eq!(result.files_restored, 0);
    assert_eq!(result.files_processed, 0);
}

// =============================================================================
// Test 14: 破損したアーカイブはリストア全体を中断する
// =============================================================================

#[test]
fn test_tampered_archive_aborts_restore() {
    let env = TestEnv::new();
    env.write_source_file("a.txt", b"will be tampered");
    let backup = env.run_full_backup(&env.backup_config());

    // 暗号化アーカイブの末尾バイトを改ざん
    let enc_path = env
        .destination
        .join(&backup.backup_id)
        .join("data.tar.xz.enc");
    let mut bytes = fs::read(&enc_path).unwrap();
    let index = bytes.len() - 10;
    bytes[index] ^= 0xFF;
    fs::write(&enc_path, &bytes).unwrap();

    let storage = Box::new(LocalStorage::new(env.destination.clone()));
    let mut engine = RestoreEngine::new(&env.store, storage, restore_config(&env));
    let result = engine.restore_full_backup(backup.record_id);

    match result {
        Err(e) => assert!(e.is_crypto()),
        Ok(_) => panic!("改ざんされたアーカイブで成功してはならない"),
    }

    // ファイルは配置されず、一時ディレクトリも残らない
    assert!(!restored_path(&env, "a.txt").exists());
    assert!(!env.restore_dest.join(".scrat-restore-tmp").exists());
}
