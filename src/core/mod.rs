//! # コアモジュール
//!
//! バックアップエンジンの中核機能を提供します。
//!
//! # モジュール構成
//!
//! - **[`scanner`]**: ソースツリーの走査と変更検出
//! - **[`metadata`]**: SQLiteバックアップカタログ
//! - **[`backup`]**: フル・増分バックアップの書き込みパス
//! - **[`restore`]**: フル・ポイントインタイム・パターンリストア
//!
//! # 使用例
//!
//! ```no_run
//! use scrat_backup::core::backup::{BackupConfig, BackupEngine};
//! use scrat_backup::core::metadata::MetadataStore;
//! use scrat_backup::storage::LocalStorage;
//! use std::path::{Path, PathBuf};
//!
//! let store = MetadataStore::open(Path::new("metadata.db")).unwrap();
//! let config = BackupConfig::new(
//!     vec![PathBuf::from("/home/user/documents")],
//!     PathBuf::from("/mnt/backup"),
//!     "Correct-Horse-Battery-1".to_string(),
//! );
//! let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
//! let mut engine = BackupEngine::new(&store, storage, config).unwrap();
//! let result = engine.create_full_backup().unwrap();
//! println!("完了: {}", result.backup_id);
//! ```

pub mod backup;
pub mod metadata;
pub mod restore;
pub mod scanner;

pub use backup::{
    BackupConfig, BackupEngine, BackupPhase, BackupProgress, BackupResult, DEFAULT_MAX_VERSIONS,
};
pub use metadata::{
    parse_backup_id_string, BackupKind, BackupRecord, BackupStatus, FileRecord, FileSearchHit,
    LogFilter, LogLevel, LogRecord, MetadataStore, NewFileRecord, StoreStatistics, SCHEMA_VERSION,
};
pub use restore::{RestoreConfig, RestoreEngine, RestorePhase, RestoreProgress, RestoreResult};
pub use scanner::{ExcludeFilter, FileInfo, ScanResult, Scanner};
