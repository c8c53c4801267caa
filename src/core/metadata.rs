//! # メタデータストア
//!
//! SQLiteによるバックアップカタログを提供します。リストアが再構築できる
//! 内容の単一の信頼できる情報源（single source of truth）です。
//!
//! # 機能
//!
//! - バックアップレコード・ファイルマニフェスト・監査ログの永続化
//! - スキーマバージョン管理と前方マイグレーション
//! - 外部キー制約によるカスケード削除（ファイル）と参照のNULL化（ログ）
//!
//! # 並行性
//!
//! 書き込みはプロセス内で単一のエンジンから直列に行われます。
//! 読み取りは並行して構いません。各操作のトランザクション的な
//! 原子性はストア側が保証します。

use crate::error::{BackupError, Result};
use crate::storage::DestinationKind;
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::fmt;
use std::path::Path;

/// 現在のスキーマバージョン（Version 2: saltカラム追加）
pub const SCHEMA_VERSION: i64 = 2;

/// バックアップ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Full,
    Incremental,
}

impl BackupKind {
    /// データベース内の文字列表現
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }

    /// バックアップIDストリング内の短縮形（`full` / `incr`）
    #[must_use]
    pub fn id_label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incr",
        }
    }

    /// 文字列から変換
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            _ => Err(BackupError::Migration {
                message: format!("不明なバックアップ種別: {s}"),
            }),
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for BackupKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for BackupKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// バックアップステータス（終端ステータスは閉じたバリアントで表現）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Running,
    Completed,
    Failed,
    Partial,
}

impl BackupStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            _ => Err(BackupError::Migration {
                message: format!("不明なバックアップステータス: {s}"),
            }),
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for BackupStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for BackupStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(BackupError::Migration {
                message: format!("不明なログレベル: {s}"),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for LogLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for LogLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// バックアップレコード（1回のバックアップ試行に対応）
#[derive(Debug, Clone)]
pub struct BackupRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: BackupKind,
    /// 増分バックアップのベース（弱参照: ベース削除時はNULLになる）
    pub base_backup_id: Option<i64>,
    pub destination_kind: DestinationKind,
    pub destination_path: String,
    pub status: BackupStatus,
    pub files_total: i64,
    pub files_processed: i64,
    pub size_original: i64,
    pub size_compressed: i64,
    /// 導出鍵のSHA-256（hex）。パスフレーズ不一致の早期検出用
    pub key_hash: String,
    /// 鍵再導出用のsalt。現行スキーマで作成されたレコードでは非NULL
    pub salt: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl BackupRecord {
    /// バックアップIDストリング（`YYYYMMDD_HHMMSS_{full|incr}`）を導出
    ///
    /// 保存先ディレクトリ名として使用されます。タイムスタンプと種別から
    /// 導出されるもので、別途保存はされません。
    #[must_use]
    pub fn backup_id_string(&self) -> String {
        format!(
            "{}_{}",
            self.timestamp.format("%Y%m%d_%H%M%S"),
            self.kind.id_label()
        )
    }
}

/// バックアップIDストリングを（タイムスタンプ, 種別）にパース
///
/// [`BackupRecord::backup_id_string`]と正確にラウンドトリップします。
pub fn parse_backup_id_string(s: &str) -> Result<(DateTime<Utc>, BackupKind)> {
    let err = || BackupError::Migration {
        message: format!("不正なバックアップIDストリング: {s}"),
    };

    let (stamp, label) = s.rsplit_once('_').ok_or_else(err)?;
    let kind = match label {
        "full" => BackupKind::Full,
        "incr" => BackupKind::Incremental,
        _ => return Err(err()),
    };

    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").map_err(|_| err())?;
    Ok((naive.and_utc(), kind))
}

/// ファイルレコード（1バックアップに取り込まれた1ファイルに対応）
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub backup_id: i64,
    /// ファイルの絶対ソースパス
    pub source_path: String,
    /// ソースルートからの相対パス（非削除行について1バックアップ内で一意）
    pub relative_path: String,
    pub file_size: i64,
    pub modified: DateTime<Utc>,
    /// このファイルを格納する暗号化アーカイブのファイル名
    pub archive_name: String,
    /// 保存先レイアウト上のアーカイブディレクトリ
    pub archive_path: String,
    /// 増分バックアップのトゥームストーン（size=0・アーカイブ欄は空）
    pub is_deleted: bool,
    pub checksum: Option<String>,
}

/// ファイルレコードの新規挿入用パラメータ
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub backup_id: i64,
    pub source_path: String,
    pub relative_path: String,
    pub file_size: i64,
    pub modified: DateTime<Utc>,
    pub archive_name: String,
    pub archive_path: String,
    pub is_deleted: bool,
    pub checksum: Option<String>,
}

/// ログレコード（追記専用の監査証跡）
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// バックアップ削除時はNULLになる（ログはバックアップより長生きする）
    pub backup_id: Option<i64>,
    pub details: Option<String>,
}

/// ログ取得フィルター
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub backup_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search_term: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// ファイル検索結果（バックアップ情報付き）
#[derive(Debug, Clone)]
pub struct FileSearchHit {
    pub file: FileRecord,
    pub backup_timestamp: DateTime<Utc>,
    pub backup_kind: BackupKind,
    pub backup_status: BackupStatus,
}

/// ストア統計情報
#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    pub total_backups: i64,
    pub completed_backups: i64,
    pub total_size_original: i64,
    pub total_size_compressed: i64,
    pub total_files: i64,
}

/// メタデータストア
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::core::metadata::MetadataStore;
/// use std::path::Path;
///
/// let store = MetadataStore::open(Path::new("/var/lib/scrat-backup/metadata.db")).unwrap();
/// let backups = store.get_all_backups(None, 10).unwrap();
/// for backup in &backups {
///     println!("{} [{}]", backup.backup_id_string(), backup.status);
/// }
/// ```
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// データベースを開く（必要ならスキーマ作成とマイグレーションを実行）
    ///
    /// # エラー
    ///
    /// * データベースが開けない・マイグレーションできない場合。
    ///   このエラーはプロセス全体に対して致命的で、以降の処理は行えません。
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// メモリ内データベースを開く（テスト用）
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self { conn };
        store.initialize_schema()?;
        store.run_migrations()?;

        log::info!("メタデータストアを初期化しました");
        Ok(store)
    }

    /// 基本スキーマ（Version 1相当）を作成
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS backups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME NOT NULL,
                type TEXT NOT NULL CHECK(type IN ('full', 'incremental')),
                base_backup_id INTEGER,
                destination_type TEXT NOT NULL
                    CHECK(destination_type IN ('usb', 'smb', 'sftp', 'webdav', 'rclone')),
                destination_path TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK(status IN ('running', 'completed', 'failed', 'partial')),
                files_total INTEGER DEFAULT 0,
                files_processed INTEGER DEFAULT 0,
                size_original INTEGER DEFAULT 0,
                size_compressed INTEGER DEFAULT 0,
                encryption_key_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME,
                error_message TEXT,
                FOREIGN KEY (base_backup_id) REFERENCES backups(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS backup_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backup_id INTEGER NOT NULL,
                source_path TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                modified_timestamp DATETIME NOT NULL,
                archive_name TEXT NOT NULL,
                archive_path TEXT NOT NULL,
                is_deleted BOOLEAN DEFAULT 0,
                checksum TEXT,
                FOREIGN KEY (backup_id) REFERENCES backups(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                level TEXT NOT NULL
                    CHECK(level IN ('DEBUG', 'INFO', 'WARNING', 'ERROR', 'CRITICAL')),
                message TEXT NOT NULL,
                backup_id INTEGER,
                details TEXT,
                FOREIGN KEY (backup_id) REFERENCES backups(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_backup_files_backup_id
                ON backup_files(backup_id);
            CREATE INDEX IF NOT EXISTS idx_backup_files_source_path
                ON backup_files(source_path);
            CREATE INDEX IF NOT EXISTS idx_backups_timestamp
                ON backups(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_backups_status
                ON backups(status);
            CREATE INDEX IF NOT EXISTS idx_logs_timestamp
                ON logs(timestamp DESC);

            CREATE TABLE IF NOT EXISTS schema_info (
                version INTEGER PRIMARY KEY,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            INSERT OR IGNORE INTO schema_info (version) VALUES (1);",
        )?;

        Ok(())
    }

    /// 必要なスキーママイグレーションを実行
    ///
    /// マイグレーションはカラムの有無をイントロスペクションで確認するため、
    /// バージョン管理導入以前のデータベースに対しても冪等です。
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version()?;
        log::info!("現在のスキーマバージョン: {current_version}");

        // Version 1 → 2: backupsテーブルにsaltカラムを追加
        let has_salt_column = self.has_column("backups", "salt")?;

        if current_version < 2 || !has_salt_column {
            log::info!(
                "Version 2へのマイグレーションを実行（current={current_version}, has_salt={has_salt_column}）"
            );

            let tx = self.conn.unchecked_transaction()?;
            if !has_salt_column {
                tx.execute("ALTER TABLE backups ADD COLUMN salt BLOB", [])?;
                log::info!("saltカラムを追加しました");
            }
            // カラムが既に存在する場合もバージョンは必ず更新する
            tx.execute(
                "INSERT OR REPLACE INTO schema_info (version, applied_at) VALUES (?1, ?2)",
                params![2i64, Utc::now()],
            )?;
            tx.commit()?;
            log::info!("Version 2へのマイグレーション完了");
        }

        Ok(())
    }

    /// 適用済みスキーマバージョンを取得
    pub fn schema_version(&self) -> Result<i64> {
        let version: Option<i64> =
            self.conn
                .query_row("SELECT MAX(version) FROM schema_info", [], |row| row.get(0))?;
        Ok(version.unwrap_or(0))
    }

    /// テーブルに指定カラムが存在するかを確認
    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in columns {
            if name? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ==================== バックアップレコード ====================

    /// 新しいバックアップレコードを作成（status=Running）
    ///
    /// タイムスタンプは秒精度に切り詰められ、バックアップIDストリング
    /// （＝保存先ディレクトリ名）が一意になるよう必要に応じて繰り上げます。
    ///
    /// # 戻り値
    ///
    /// 作成されたレコードのID
    pub fn create_backup_record(
        &self,
        kind: BackupKind,
        destination_kind: DestinationKind,
        destination_path: &str,
        key_hash: &str,
        salt: &[u8],
        base_backup_id: Option<i64>,
    ) -> Result<i64> {
        let mut timestamp = truncate_to_seconds(Utc::now());
        loop {
            let collisions: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM backups WHERE timestamp = ?1",
                params![timestamp],
                |row| row.get(0),
            )?;
            if collisions == 0 {
                break;
            }
            timestamp = timestamp + Duration::seconds(1);
        }

        self.conn.execute(
            "INSERT INTO backups (
                timestamp, type, base_backup_id, destination_type,
                destination_path, status, encryption_key_hash, salt, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                timestamp,
                kind,
                base_backup_id,
                destination_kind.as_str(),
                destination_path,
                BackupStatus::Running,
                key_hash,
                salt,
                Utc::now(),
            ],
        )?;

        let backup_id = self.conn.last_insert_rowid();
        log::info!("バックアップレコード作成: ID={backup_id}, 種別={kind}");
        Ok(backup_id)
    }

    /// バックアップの進捗カウンターを更新
    pub fn update_backup_progress(
        &self,
        backup_id: i64,
        files_processed: i64,
        size_original: i64,
        size_compressed: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE backups
             SET files_processed = ?1, size_original = ?2, size_compressed = ?3
             WHERE id = ?4",
            params![files_processed, size_original, size_compressed, backup_id],
        )?;
        Ok(())
    }

    /// バックアップを完了としてマーク
    pub fn mark_completed(&self, backup_id: i64, files_total: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE backups
             SET status = ?1, files_total = ?2, completed_at = ?3
             WHERE id = ?4",
            params![BackupStatus::Completed, files_total, Utc::now(), backup_id],
        )?;
        log::info!("バックアップ完了: ID={backup_id}, ファイル数={files_total}");
        Ok(())
    }

    /// バックアップを失敗としてマーク
    pub fn mark_failed(&self, backup_id: i64, error_message: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE backups
             SET status = ?1, error_message = ?2, completed_at = ?3
             WHERE id = ?4",
            params![BackupStatus::Failed, error_message, Utc::now(), backup_id],
        )?;
        log::error!("バックアップ失敗: ID={backup_id}, エラー={error_message}");
        Ok(())
    }

    /// バックアップレコードを取得
    pub fn get_backup(&self, backup_id: i64) -> Result<Option<BackupRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, timestamp, type, base_backup_id, destination_type,
                        destination_path, status, files_total, files_processed,
                        size_original, size_compressed, encryption_key_hash, salt,
                        created_at, completed_at, error_message
                 FROM backups WHERE id = ?1",
                params![backup_id],
                row_to_backup,
            )
            .optional()?;
        Ok(record)
    }

    /// バックアップ一覧を取得（タイムスタンプ降順）
    ///
    /// # 引数
    ///
    /// * `status` - ステータスでの絞り込み（`None`なら全件）
    /// * `limit` - 最大取得件数
    pub fn get_all_backups(
        &self,
        status: Option<BackupStatus>,
        limit: i64,
    ) -> Result<Vec<BackupRecord>> {
        let mut query = String::from(
            "SELECT id, timestamp, type, base_backup_id, destination_type,
                    destination_path, status, files_total, files_processed,
                    size_original, size_compressed, encryption_key_hash, salt,
                    created_at, completed_at, error_message
             FROM backups WHERE 1=1",
        );
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = status {
            query.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        query.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        params.push(Box::new(limit));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(params.iter().map(|p| p.as_ref())), row_to_backup)?;

        let mut backups = Vec::new();
        for row in rows {
            backups.push(row?);
        }
        Ok(backups)
    }

    /// バックアップとその配下のファイルレコードを削除
    ///
    /// backup_filesへはCASCADE、logsの参照はNULL化されます（外部キー制約）。
    /// 保存先のアーカイブ実体の削除はエンジンの責務です。
    pub fn delete_backup(&self, backup_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM backups WHERE id = ?1", params![backup_id])?;
        if deleted > 0 {
            log::info!("バックアップ削除: ID={backup_id}");
        }
        Ok(deleted > 0)
    }

    // ==================== ファイルレコード ====================

    /// ファイルレコードを追加
    ///
    /// トゥームストーン（`is_deleted=true`）も許容されます。
    pub fn add_file_to_backup(&self, record: &NewFileRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO backup_files (
                backup_id, source_path, relative_path, file_size,
                modified_timestamp, archive_name, archive_path, is_deleted, checksum
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.backup_id,
                record.source_path,
                record.relative_path,
                record.file_size,
                record.modified,
                record.archive_name,
                record.archive_path,
                record.is_deleted,
                record.checksum,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// バックアップの全ファイルレコードを取得（相対パス順）
    pub fn get_backup_files(&self, backup_id: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, backup_id, source_path, relative_path, file_size,
                    modified_timestamp, archive_name, archive_path, is_deleted, checksum
             FROM backup_files
             WHERE backup_id = ?1
             ORDER BY relative_path",
        )?;
        let rows = stmt.query_map(params![backup_id], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// 全バックアップを横断してファイルを検索（SQL LIKE、完了バックアップのみ）
    pub fn search_files(&self, pattern: &str, limit: i64) -> Result<Vec<FileSearchHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT bf.id, bf.backup_id, bf.source_path, bf.relative_path, bf.file_size,
                    bf.modified_timestamp, bf.archive_name, bf.archive_path,
                    bf.is_deleted, bf.checksum,
                    b.timestamp, b.type, b.status
             FROM backup_files bf
             JOIN backups b ON bf.backup_id = b.id
             WHERE bf.source_path LIKE ?1 AND b.status = 'completed'
             ORDER BY b.timestamp DESC
             LIMIT ?2",
        )?;

        let like_pattern = format!("%{pattern}%");
        let rows = stmt.query_map(params![like_pattern, limit], |row| {
            Ok(FileSearchHit {
                file: row_to_file(row)?,
                backup_timestamp: row.get(10)?,
                backup_kind: row.get(11)?,
                backup_status: row.get(12)?,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    // ==================== ログ ====================

    /// ログエントリを追加
    pub fn add_log(
        &self,
        level: LogLevel,
        message: &str,
        backup_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO logs (timestamp, level, message, backup_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Utc::now(), level, message, backup_id, details],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// ログエントリを取得（タイムスタンプ降順）
    pub fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogRecord>> {
        let (condition, mut params) = build_log_conditions(filter);

        let query = format!(
            "SELECT id, timestamp, level, message, backup_id, details
             FROM logs WHERE 1=1{condition}
             ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );
        params.push(Box::new(filter.limit.unwrap_or(1000)));
        params.push(Box::new(filter.offset.unwrap_or(0)));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(params.iter().map(|p| p.as_ref())), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                message: row.get(3)?,
                backup_id: row.get(4)?,
                details: row.get(5)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }

    /// フィルターに一致するログ件数を取得（ページネーション用）
    pub fn get_log_count(&self, filter: &LogFilter) -> Result<i64> {
        let (condition, params) = build_log_conditions(filter);
        let query = format!("SELECT COUNT(*) FROM logs WHERE 1=1{condition}");

        let mut stmt = self.conn.prepare(&query)?;
        let count = stmt.query_row(
            params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// ログエントリを削除
    ///
    /// # 引数
    ///
    /// * `older_than_days` - 指定日数より古いログのみ削除（`None`なら全件）
    ///
    /// # 戻り値
    ///
    /// 削除した件数
    pub fn clear_logs(&self, older_than_days: Option<i64>) -> Result<usize> {
        let deleted = match older_than_days {
            Some(days) => {
                let cutoff = Utc::now() - Duration::days(days);
                self.conn
                    .execute("DELETE FROM logs WHERE timestamp < ?1", params![cutoff])?
            }
            None => self.conn.execute("DELETE FROM logs", [])?,
        };

        log::info!("ログ削除: {deleted}件");
        Ok(deleted)
    }

    // ==================== 統計 ====================

    /// ストア統計情報を取得
    pub fn get_statistics(&self) -> Result<StoreStatistics> {
        let total_backups =
            self.conn
                .query_row("SELECT COUNT(*) FROM backups", [], |row| row.get(0))?;
        let completed_backups = self.conn.query_row(
            "SELECT COUNT(*) FROM backups WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let total_size_original: Option<i64> = self.conn.query_row(
            "SELECT SUM(size_original) FROM backups WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let total_size_compressed: Option<i64> = self.conn.query_row(
            "SELECT SUM(size_compressed) FROM backups WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let total_files =
            self.conn
                .query_row("SELECT COUNT(*) FROM backup_files", [], |row| row.get(0))?;

        Ok(StoreStatistics {
            total_backups,
            completed_backups,
            total_size_original: total_size_original.unwrap_or(0),
            total_size_compressed: total_size_compressed.unwrap_or(0),
            total_files,
        })
    }
}

/// タイムスタンプを秒精度に切り詰める
///
/// バックアップIDストリングは秒精度のため、保存するタイムスタンプも
/// 同じ精度に揃えることで正確なラウンドトリップを保証します。
fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

fn row_to_backup(row: &Row<'_>) -> rusqlite::Result<BackupRecord> {
    let destination_kind: String = row.get(4)?;
    Ok(BackupRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        kind: row.get(2)?,
        base_backup_id: row.get(3)?,
        destination_kind: DestinationKind::parse(&destination_kind)
            .map_err(|e| FromSqlError::Other(Box::new(e)))?,
        destination_path: row.get(5)?,
        status: row.get(6)?,
        files_total: row.get(7)?,
        files_processed: row.get(8)?,
        size_original: row.get(9)?,
        size_compressed: row.get(10)?,
        key_hash: row.get(11)?,
        salt: row.get(12)?,
        created_at: row.get(13)?,
        completed_at: row.get(14)?,
        error_message: row.get(15)?,
    })
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        backup_id: row.get(1)?,
        source_path: row.get(2)?,
        relative_path: row.get(3)?,
        file_size: row.get(4)?,
        modified: row.get(5)?,
        archive_name: row.get(6)?,
        archive_path: row.get(7)?,
        is_deleted: row.get(8)?,
        checksum: row.get(9)?,
    })
}

fn build_log_conditions(filter: &LogFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut condition = String::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(level) = filter.level {
        condition.push_str(" AND level = ?");
        params.push(Box::new(level.as_str().to_string()));
    }
    if let Some(backup_id) = filter.backup_id {
        condition.push_str(" AND backup_id = ?");
        params.push(Box::new(backup_id));
    }
    if let Some(start) = filter.start_date {
        condition.push_str(" AND timestamp >= ?");
        params.push(Box::new(start));
    }
    if let Some(end) = filter.end_date {
        condition.push_str(" AND timestamp <= ?");
        params.push(Box::new(end));
    }
    if let Some(term) = &filter.search_term {
        condition.push_str(" AND (message LIKE ? OR details LIKE ?)");
        let pattern = format!("%{term}%");
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    (condition, params)
}
