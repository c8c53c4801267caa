//! # scrat-backup: 暗号化・圧縮・バージョン管理付きバックアップエンジン
//!
//! `scrat-backup`は、ユーザーファイルの復元可能・改ざん検知可能・容量制限付きの
//! 履歴を保証するバックアップエンジンです。4つのサブシステムが協調して動作します:
//!
//! 1. **変更検出スキャナー** ([`core::scanner`]) — （サイズ, 更新時刻）による差分検出
//! 2. **分割対応圧縮エンジン** ([`compression`]) — LZMA2アーカイブとビンパッキング
//! 3. **認証付きストリーミング暗号化** ([`crypto`]) — AES-256-GCMチャンクコンテナ
//! 4. **メタデータストア** ([`core::metadata`]) — リストアが再構築できる内容の
//!    単一の信頼できる情報源

// Clippy pedantic lints - 一部は開発効率とのトレードオフで許可
#![allow(clippy::missing_errors_doc)] // Errorドキュメントは型シグネチャで明確
#![allow(clippy::missing_panics_doc)] // Panicケースは意図的に制限
#![allow(clippy::too_many_lines)] // 複雑なロジックは分割よりも凝集性を優先
#![allow(clippy::must_use_candidate)] // 必要な箇所のみ#[must_use]を付与
#![allow(clippy::cast_precision_loss)] // 進捗統計での精度低下は許容
#![allow(clippy::needless_pass_by_value)] // APIの一貫性と使いやすさを優先
#![allow(clippy::module_name_repetitions)] // 明示的な命名を優先
#![allow(clippy::cast_possible_truncation)] // 実行環境での妥当性は検証済み
#![allow(clippy::cast_sign_loss)] // 圧縮レベル等の値域は保証済み
#![allow(clippy::if_not_else)] // 自然な条件分岐の流れを優先
#![allow(clippy::single_match_else)] // 将来のパターン追加を想定
#![allow(clippy::match_same_arms)] // コードの明示性と将来の拡張性を優先
#![allow(clippy::doc_markdown)] // 技術用語のbackticksは必要に応じて
#![allow(clippy::map_unwrap_or)] // 可読性を優先
#![allow(missing_docs)] // 公開API以外のドキュメントは段階的に充実
//!
//! ## 使用例
//!
//! ### フルバックアップ
//!
//! ```rust,no_run
//! use scrat_backup::{BackupConfig, BackupEngine, MetadataStore};
//! use scrat_backup::storage::LocalStorage;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> scrat_backup::Result<()> {
//! let store = MetadataStore::open(Path::new("/var/lib/scrat-backup/metadata.db"))?;
//!
//! let config = BackupConfig::new(
//!     vec![PathBuf::from("/home/user/documents")],
//!     PathBuf::from("/mnt/backup"),
//!     "Correct-Horse-Battery-1".to_string(),
//! );
//!
//! let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
//! let mut engine = BackupEngine::new(&store, storage, config)?;
//!
//! let result = engine.create_full_backup()?;
//! println!(
//!     "✅ バックアップ完了: {} ({}ファイル, {}バイト)",
//!     result.backup_id, result.files_total, result.size_compressed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ### リストア
//!
//! ```rust,no_run
//! use scrat_backup::{MetadataStore, RestoreConfig, RestoreEngine};
//! use scrat_backup::storage::LocalStorage;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> scrat_backup::Result<()> {
//! let store = MetadataStore::open(Path::new("/var/lib/scrat-backup/metadata.db"))?;
//! let config = RestoreConfig::new(
//!     PathBuf::from("/home/user/restored"),
//!     "Correct-Horse-Battery-1".to_string(),
//! );
//! let storage = Box::new(LocalStorage::new(PathBuf::from("/mnt/backup")));
//!
//! let mut engine = RestoreEngine::new(&store, storage, config);
//! let result = engine.restore_full_backup(1)?;
//! println!("復元: {}ファイル", result.files_restored);
//! # Ok(())
//! # }
//! ```
//!
//! ## エラーハンドリング
//!
//! すべての公開操作は[`Result`]を返し、[`BackupError`]が§エラー分類
//! （設定・前提条件・I/O・暗号・スキーマ・復元不能）を表現します。
//! ファイル単位のスキャンエラーは致命的にならず、結果の`errors`に
//! 蓄積されます。それ以外の致命的エラーはバックアップレコードを
//! Failedにした上で呼び出し元へ伝播します。

// モジュール宣言
pub mod compression;
pub mod core;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod ui;

// 主要な型を再エクスポート
pub use compression::{ArchiveEntry, ArchiveInfo, ArchivePart, Compressor};
pub use core::{
    parse_backup_id_string, BackupConfig, BackupEngine, BackupKind, BackupPhase, BackupProgress,
    BackupRecord, BackupResult, BackupStatus, FileInfo, FileRecord, LogFilter, LogLevel,
    LogRecord, MetadataStore, RestoreConfig, RestoreEngine, RestorePhase, RestoreProgress,
    RestoreResult, ScanResult, Scanner,
};
pub use crypto::{generate_passphrase, validate_passphrase, Encryptor, KeyDerivation, MasterKey};
pub use error::{BackupError, Result};
pub use storage::{DestinationKind, LocalStorage, StorageBackend};

// バージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
