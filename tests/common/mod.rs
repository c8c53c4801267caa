// 統合テスト共通ヘルパー
#![allow(dead_code)]

use scrat_backup::core::{BackupConfig, BackupEngine, BackupResult, MetadataStore};
use scrat_backup::storage::LocalStorage;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// テスト用の作業環境（ソース・保存先・復元先・メタデータストア）
pub struct TestEnv {
    pub temp: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub restore_dest: PathBuf,
    pub store: MetadataStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let destination = temp.path().join("destination");
        let restore_dest = temp.path().join("restored");
        fs::create_dir_all(&source).unwrap();

        let store = MetadataStore::open(&temp.path().join("metadata.db")).unwrap();

        Self {
            temp,
            source,
            destination,
            restore_dest,
            store,
        }
    }

    /// ソース配下にファイルを書き込む
    pub fn write_source_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.source.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// デフォルトのバックアップ設定（高速化のため圧縮レベル1）
    pub fn backup_config(&self) -> BackupConfig {
        let mut config = BackupConfig::new(
            vec![self.source.clone()],
            self.destination.clone(),
            TEST_PASSPHRASE.to_string(),
        );
        config.compression_level = 1;
        config
    }

    /// フルバックアップを実行
    pub fn run_full_backup(&self, config: &BackupConfig) -> BackupResult {
        let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
        let mut engine = BackupEngine::new(&self.store, storage, config.clone()).unwrap();
        engine.create_full_backup().unwrap()
    }

    /// 増分バックアップを実行
    pub fn run_incremental_backup(&self, config: &BackupConfig) -> BackupResult {
        let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
        let mut engine = BackupEngine::new(&self.store, storage, config.clone()).unwrap();
        engine.create_incremental_backup().unwrap()
    }
}

pub const TEST_PASSPHRASE: &str = "Test-Passphrase-1";

/// ディレクトリ直下の`.enc`ファイル名一覧を取得
pub fn list_encrypted_archives(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".enc"))
        .collect();
    names.sort();
    names
}
