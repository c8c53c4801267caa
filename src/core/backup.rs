//! # バックアップエンジン
//!
//! フルバックアップと増分バックアップの書き込みパスを統括します。
//!
//! # フェーズ
//!
//! `Scanning → Compressing → Encrypting → SavingMetadata → Done`
//! （`Uploading`は非ローカルバックエンド用に予約）
//!
//! フェーズは厳密に逐次実行されます。スキャンが完全に終わってから圧縮が
//! 始まり（アーカイブのファイルリストはスキャン終了時点で確定）、
//! アーカイブNの圧縮完了後にNの暗号化が行われ、Nの平文削除後にN+1へ
//! 進みます。各フェーズのメタデータ書き込みは、そのフェーズの成果物が
//! ディスク上に存在した後に行われます。ローテーションは完了マークの後に
//! 実行されます。

use crate::compression::{
    ArchiveEntry, Compressor, DEFAULT_COMPRESSION_LEVEL, DEFAULT_SPLIT_SIZE, MIN_SPLIT_SIZE,
};
use crate::core::metadata::{BackupKind, BackupStatus, LogLevel, MetadataStore, NewFileRecord};
use crate::core::scanner::{FileInfo, Scanner};
use crate::crypto::Encryptor;
use crate::error::{BackupError, Result};
use crate::storage::{DestinationKind, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// デフォルトの保持バージョン数
pub const DEFAULT_MAX_VERSIONS: usize = 3;

/// ローテーション時に一覧するバックアップ数の上限
const ROTATION_SCAN_LIMIT: i64 = 10_000;

/// バックアップ設定
///
/// # フィールド
///
/// * `sources` - バックアップ対象のソースルート（絶対パス）
/// * `destination_path` - 保存先のルートパス
/// * `destination_kind` - 保存先の種別
/// * `password` - 暗号化パスフレーズ
/// * `compression_level` - 圧縮レベル（0〜9、デフォルト5）
/// * `split_size` - アーカイブ分割サイズ（バイト、最低1MiB）
/// * `exclude_patterns` - 除外パターン集合（`None`ならデフォルト）
/// * `max_versions` - 保持するバックアップ数（デフォルト3）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub sources: Vec<PathBuf>,
    pub destination_path: PathBuf,
    pub destination_kind: DestinationKind,
    pub password: String,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default = "default_split_size")]
    pub split_size: u64,
    #[serde(default)]
    pub exclude_patterns: Option<HashSet<String>>,
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_split_size() -> u64 {
    DEFAULT_SPLIT_SIZE
}

fn default_max_versions() -> usize {
    DEFAULT_MAX_VERSIONS
}

impl BackupConfig {
    /// デフォルト値で設定を作成
    #[must_use]
    pub fn new(sources: Vec<PathBuf>, destination_path: PathBuf, password: String) -> Self {
        Self {
            sources,
            destination_path,
            destination_kind: DestinationKind::Usb,
            password,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            split_size: DEFAULT_SPLIT_SIZE,
            exclude_patterns: None,
            max_versions: DEFAULT_MAX_VERSIONS,
        }
    }

    /// 設定を検証
    ///
    /// 処理開始前に呼び出され、違反があればBackupRecordを作成せずに
    /// エラーを返します。
    ///
    /// # エラー
    ///
    /// * 対象が未指定・パスフレーズが空・圧縮レベルや分割サイズが範囲外の場合
    ///   (`BackupError::Config`)
    /// * ソースルートが存在しない場合 (`BackupError::SourceNotFound`)
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(BackupError::config("バックアップ対象が指定されていません"));
        }
        for source in &self.sources {
            if !source.is_dir() {
                return Err(BackupError::SourceNotFound {
                    path: source.clone(),
                });
            }
        }
        if self.password.is_empty() {
            return Err(BackupError::config("パスフレーズが指定されていません"));
        }
        if self.compression_level > 9 {
            return Err(BackupError::config(format!(
                "圧縮レベルは0〜9で指定してください（指定値: {}）",
                self.compression_level
            )));
        }
        if self.split_size < MIN_SPLIT_SIZE {
            return Err(BackupError::config(format!(
                "分割サイズは最低{MIN_SPLIT_SIZE}バイト必要です（指定値: {}）",
                self.split_size
            )));
        }
        if self.max_versions == 0 {
            return Err(BackupError::config(
                "保持バージョン数は1以上で指定してください",
            ));
        }

        // 保存先の書き込み可能性を確認
        fs::create_dir_all(&self.destination_path).map_err(|e| {
            BackupError::config(format!(
                "保存先に書き込めません: {} ({e})",
                self.destination_path.display()
            ))
        })?;

        Ok(())
    }
}

/// バックアップのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Scanning,
    Compressing,
    Encrypting,
    /// 非ローカルバックエンド用（予約）
    Uploading,
    SavingMetadata,
    Done,
}

impl BackupPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Compressing => "compressing",
            Self::Encrypting => "encrypting",
            Self::Uploading => "uploading",
            Self::SavingMetadata => "saving_metadata",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 進捗スナップショット
///
/// オブザーバーには**不変のコピー**が渡されます。`errors`も複製される
/// ため、コールバック後の変更がスナップショットに波及することは
/// ありません（GUIコンシューマーに対する正当性要件）。
#[derive(Debug, Clone)]
pub struct BackupProgress {
    pub backup_id: String,
    pub phase: BackupPhase,
    pub files_total: usize,
    pub files_processed: usize,
    pub bytes_total: u64,
    pub bytes_processed: u64,
    pub current_file: Option<String>,
    pub errors: Vec<String>,
}

impl BackupProgress {
    fn new(backup_id: String) -> Self {
        Self {
            backup_id,
            phase: BackupPhase::Scanning,
            files_total: 0,
            files_processed: 0,
            bytes_total: 0,
            bytes_processed: 0,
            current_file: None,
            errors: Vec::new(),
        }
    }

    /// 進捗率（パーセント）を計算
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_processed as f64 / self.bytes_total as f64) * 100.0
    }
}

/// バックアップ実行結果
///
/// # フィールド
///
/// * `backup_id` - バックアップIDストリング（保存先ディレクトリ名）
/// * `record_id` - メタデータストア上のレコードID
/// * `kind` - フル or 増分
/// * `files_total` - 取り込んだファイル数
/// * `size_original` / `size_compressed` - 元サイズと暗号化アーカイブの合計サイズ
/// * `duration_seconds` - 所要時間
/// * `errors` - スキャン中に蓄積された非致命的エラー
#[derive(Debug)]
pub struct BackupResult {
    pub backup_id: String,
    pub record_id: i64,
    pub kind: BackupKind,
    pub files_total: usize,
    pub size_original: u64,
    pub size_compressed: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
}

/// バックアップエンジン
///
/// Scanner → Compressor → Encryptor → StorageBackend を駆動し、
/// フェーズ境界ごとにMetadataStoreを更新します。
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::core::backup::{BackupConfig, BackupEngine};
/// use scrat_backup::core::metadata::MetadataStore;
/// use scrat_backup::storage::LocalStorage;
/// use std::path::{Path, PathBuf};
///
/// let store = MetadataStore::open(Path::new("/var/lib/scrat-backup/metadata.db")).unwrap();
/// let config = BackupConfig::new(
///     vec![PathBuf::from("/home/user/documents")],
///     PathBuf::from("/mnt/backup"),
///     "Correct-Horse-Battery-1".to_string(),
/// );
/// let storage = Box::new(LocalStorage::new(config.destination_path.clone()));
/// let mut engine = BackupEngine::new(&store, storage, config).unwrap();
/// let result = engine.create_full_backup().unwrap();
/// println!("完了: {} ({}ファイル)", result.backup_id, result.files_total);
/// ```
pub struct BackupEngine<'a> {
    metadata: &'a MetadataStore,
    storage: Box<dyn StorageBackend + 'a>,
    config: BackupConfig,
    scanner: Scanner,
    compressor: Compressor,
    progress_callback: Option<Box<dyn Fn(BackupProgress) + 'a>>,
}

impl<'a> BackupEngine<'a> {
    /// 新しいBackupEngineを作成
    ///
    /// 設定の検証はここで行われ、違反があればBackupRecordを作成する前に
    /// エラーを返します。
    pub fn new(
        metadata: &'a MetadataStore,
        storage: Box<dyn StorageBackend + 'a>,
        config: BackupConfig,
    ) -> Result<Self> {
        config.validate()?;

        let compressor = Compressor::new(config.compression_level, config.split_size)?;
        let scanner = Scanner::new(config.exclude_patterns.clone());

        Ok(Self {
            metadata,
            storage,
            config,
            scanner,
            compressor,
            progress_callback: None,
        })
    }

    /// 進捗オブザーバーを設定
    ///
    /// コールバックには進捗の不変コピーが渡されます。
    #[must_use]
    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(BackupProgress) + 'a,
    ) -> Self {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// フルバックアップを作成
    ///
    /// スキャナーは前回スナップショットなしで実行され、見つかった全ファイルが
    /// 取り込まれます。対象が空の場合も`files_total=0`のCompletedバックアップ
    /// として成功します（空のバックアップも有効なチェックポイント）。
    pub fn create_full_backup(&mut self) -> Result<BackupResult> {
        self.storage.connect()?;

        let encryptor = Encryptor::new(&self.config.password)?;
        let record_id = self.create_record(BackupKind::Full, &encryptor, None)?;
        self.run_guarded(record_id, BackupKind::Full, &encryptor, None)
    }

    /// 増分バックアップを作成
    ///
    /// # エラー
    ///
    /// * Completedなバックアップが1つも存在しない場合
    ///   (`BackupError::Precondition`) — BackupRecordは作成されません
    pub fn create_incremental_backup(&mut self) -> Result<BackupResult> {
        self.storage.connect()?;

        // 前提条件: Completedなベースが必要（レコード作成前に確認する）
        let base = self
            .metadata
            .get_all_backups(Some(BackupStatus::Completed), 1)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BackupError::precondition(
                    "Completedなバックアップが存在しません。先にフルバックアップを作成してください",
                )
            })?;

        log::info!(
            "ベースバックアップ: ID={} ({})",
            base.id,
            base.backup_id_string()
        );

        // 増分ごとに新しいsaltを導出する（各増分は単独で復号可能）
        let encryptor = Encryptor::new(&self.config.password)?;
        let record_id = self.create_record(BackupKind::Incremental, &encryptor, Some(base.id))?;
        self.run_guarded(record_id, BackupKind::Incremental, &encryptor, Some(base.id))
    }

    fn create_record(
        &self,
        kind: BackupKind,
        encryptor: &Encryptor,
        base_id: Option<i64>,
    ) -> Result<i64> {
        let record_id = self.metadata.create_backup_record(
            kind,
            self.config.destination_kind,
            &self.config.destination_path.to_string_lossy(),
            &encryptor.key_hash(),
            encryptor.salt(),
            base_id,
        )?;

        self.metadata.add_log(
            LogLevel::Info,
            &format!("{kind}バックアップ開始"),
            Some(record_id),
            Some(&format!(
                "対象: {}件, 保存先: {}",
                self.config.sources.len(),
                self.config.destination_path.display()
            )),
        )?;

        Ok(record_id)
    }

    /// 書き込みパスを実行し、失敗時のメタデータ処理を行う
    ///
    /// レコード作成後のあらゆるエラーについて、(a) バックアップIDに紐づく
    /// ERRORログを残し、(b) レコードをFailedにし、(c) エラーを呼び出し元へ
    /// 再送出します。ディスク上の部分的なアーカイブは調査のため残されます。
    fn run_guarded(
        &self,
        record_id: i64,
        kind: BackupKind,
        encryptor: &Encryptor,
        base_id: Option<i64>,
    ) -> Result<BackupResult> {
        match self.run_backup(record_id, kind, encryptor, base_id) {
            Ok(result) => Ok(result),
            Err(e) => {
                let _ = self.metadata.add_log(
                    LogLevel::Error,
                    &format!("{kind}バックアップ失敗"),
                    Some(record_id),
                    Some(&e.to_string()),
                );
                let _ = self.metadata.mark_failed(record_id, &e.to_string());
                Err(e)
            }
        }
    }

    fn run_backup(
        &self,
        record_id: i64,
        kind: BackupKind,
        encryptor: &Encryptor,
        base_id: Option<i64>,
    ) -> Result<BackupResult> {
        let started = Instant::now();

        let record = self
            .metadata
            .get_backup(record_id)?
            .ok_or(BackupError::BackupNotFound { id: record_id })?;
        let backup_id = record.backup_id_string();

        let mut progress = BackupProgress::new(backup_id.clone());
        self.report_progress(&progress);

        // 1. 全ソースをスキャン（増分ならベースのスナップショットと比較）
        let mut files_to_backup: Vec<FileInfo> = Vec::new();
        let mut total_size = 0u64;

        for source in &self.config.sources {
            log::info!("スキャン: {}", source.display());
            progress.current_file = Some(source.display().to_string());
            self.report_progress(&progress);

            let previous = match base_id {
                Some(base) => Some(self.load_previous_snapshot(base, source)?),
                None => None,
            };
            let scan = self.scanner.scan_directory(source, previous.as_ref())?;

            progress.errors.extend(scan.errors.iter().cloned());

            match kind {
                BackupKind::Full => {
                    total_size += scan.total_size;
                    files_to_backup.extend(scan.new_files);
                }
                BackupKind::Incremental => {
                    let changed = scan.files_to_backup();
                    total_size += changed.iter().map(|f| f.size).sum::<u64>();
                    files_to_backup.extend(changed);

                    // 削除されたファイルは新しいバックアップにトゥームストーンとして記録
                    for deleted in &scan.deleted_files {
                        self.metadata.add_file_to_backup(&NewFileRecord {
                            backup_id: record_id,
                            source_path: deleted.path.to_string_lossy().into_owned(),
                            relative_path: deleted.relative_path.to_string_lossy().into_owned(),
                            file_size: 0,
                            modified: deleted.modified,
                            archive_name: String::new(),
                            archive_path: String::new(),
                            is_deleted: true,
                            checksum: None,
                        })?;
                    }
                }
            }
        }

        progress.files_total = files_to_backup.len();
        progress.bytes_total = total_size;
        progress.current_file = None;
        self.report_progress(&progress);

        self.metadata
            .update_backup_progress(record_id, 0, total_size as i64, 0)?;

        // 取り込むファイルがなければ空のCompletedバックアップとして成功
        if files_to_backup.is_empty() {
            log::info!("取り込むファイルなし、空のバックアップとして完了");
            self.metadata.mark_completed(record_id, 0)?;
            if kind == BackupKind::Incremental {
                self.rotate_old_backups()?;
            }

            progress.phase = BackupPhase::Done;
            self.report_progress(&progress);

            return Ok(BackupResult {
                backup_id,
                record_id,
                kind,
                files_total: 0,
                size_original: 0,
                size_compressed: 0,
                duration_seconds: started.elapsed().as_secs_f64(),
                errors: progress.errors,
            });
        }

        // 2. 保存先にバックアップディレクトリを作成
        self.storage.create_directory(&backup_id)?;
        let backup_dir = self.config.destination_path.join(&backup_id);

        // 3. 圧縮（分割はCompressorが判断）
        progress.phase = BackupPhase::Compressing;
        self.report_progress(&progress);

        let entries: Vec<ArchiveEntry> = files_to_backup
            .iter()
            .map(|f| ArchiveEntry {
                source: f.path.clone(),
                name: f.relative_path.clone(),
            })
            .collect();

        let parts = self
            .compressor
            .compress_entries(&entries, &backup_dir.join("data.tar.xz"))?;

        for part in &parts {
            progress.files_processed += part.entries.len();
            progress.current_file = part
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            self.report_progress(&progress);
        }
        log::info!("圧縮完了: {}アーカイブ", parts.len());

        // 4. アーカイブごとに暗号化し、平文アーカイブを削除
        progress.phase = BackupPhase::Encrypting;
        self.report_progress(&progress);

        let mut size_compressed = 0u64;
        let mut encrypted_parts: Vec<(String, Vec<ArchiveEntry>)> = Vec::new();

        for part in parts {
            let encrypted_path = append_extension(&part.path, "enc");
            let encrypted_name = encrypted_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            progress.current_file = Some(encrypted_name.clone());
            self.report_progress(&progress);

            let plaintext_bytes = encryptor.encrypt_file(&part.path, &encrypted_path)?;
            fs::remove_file(&part.path)?;

            size_compressed += fs::metadata(&encrypted_path)?.len();
            progress.bytes_processed += plaintext_bytes;
            self.report_progress(&progress);

            encrypted_parts.push((encrypted_name, part.entries));
        }

        // 5. ファイルマニフェストを保存（ファイル→アーカイブの厳密な対応を記録）
        progress.phase = BackupPhase::SavingMetadata;
        self.report_progress(&progress);

        let info_by_relative: HashMap<String, &FileInfo> = files_to_backup
            .iter()
            .map(|f| (f.relative_path.to_string_lossy().into_owned(), f))
            .collect();

        let archive_path = backup_dir.to_string_lossy().into_owned();
        for (encrypted_name, entries) in &encrypted_parts {
            for entry in entries {
                let relative = entry.name.to_string_lossy().into_owned();
                let Some(info) = info_by_relative.get(&relative) else {
                    continue;
                };
                self.metadata.add_file_to_backup(&NewFileRecord {
                    backup_id: record_id,
                    source_path: info.path.to_string_lossy().into_owned(),
                    relative_path: relative,
                    file_size: info.size as i64,
                    modified: info.modified,
                    archive_name: encrypted_name.clone(),
                    archive_path: archive_path.clone(),
                    is_deleted: false,
                    checksum: None,
                })?;
            }
        }

        let files_total = files_to_backup.len();
        self.metadata.update_backup_progress(
            record_id,
            files_total as i64,
            total_size as i64,
            size_compressed as i64,
        )?;
        self.metadata.mark_completed(record_id, files_total as i64)?;

        let duration_seconds = started.elapsed().as_secs_f64();
        self.metadata.add_log(
            LogLevel::Info,
            &format!("{kind}バックアップ完了"),
            Some(record_id),
            Some(&format!(
                "ファイル: {files_total}, 元: {total_size}バイト, 圧縮後: {size_compressed}バイト, 所要: {duration_seconds:.1}秒"
            )),
        )?;

        // 6. ローテーション（完了マークの後）
        self.rotate_old_backups()?;

        progress.phase = BackupPhase::Done;
        progress.files_processed = files_total;
        progress.current_file = None;
        self.report_progress(&progress);

        log::info!(
            "{kind}バックアップ完了: {files_total}ファイル, {total_size} → {size_compressed}バイト, {duration_seconds:.1}秒"
        );

        Ok(BackupResult {
            backup_id,
            record_id,
            kind,
            files_total,
            size_original: total_size,
            size_compressed,
            duration_seconds,
            errors: progress.errors,
        })
    }

    /// ベースバックアップ時点の有効なスナップショットを構築
    ///
    /// ベースが増分の場合、その増分は変更ファイルしか持たないため、
    /// フルバックアップまでチェーンを遡り、マニフェストを時系列に
    /// 畳み込んだ状態（upsert＋トゥームストーンによる削除）を前回
    /// スナップショットとして使用します。
    fn load_previous_snapshot(
        &self,
        base_id: i64,
        source: &Path,
    ) -> Result<HashMap<String, FileInfo>> {
        let source_prefix = source.to_string_lossy().into_owned();
        let mut snapshot = HashMap::new();

        for backup_id in self.resolve_base_chain(base_id)? {
            for record in self.metadata.get_backup_files(backup_id)? {
                if !record.source_path.starts_with(&source_prefix) {
                    continue;
                }
                if record.is_deleted {
                    snapshot.remove(&record.relative_path);
                } else {
                    snapshot.insert(
                        record.relative_path.clone(),
                        FileInfo {
                            path: PathBuf::from(&record.source_path),
                            relative_path: PathBuf::from(&record.relative_path),
                            size: record.file_size.max(0) as u64,
                            modified: record.modified,
                        },
                    );
                }
            }
        }

        Ok(snapshot)
    }

    /// ベースのチェーンを解決（フル→増分1→…→ベースの時系列順）
    ///
    /// ベース参照が欠落している場合（孤児化した増分）はチェーンが
    /// 途切れた位置から始まります。
    fn resolve_base_chain(&self, base_id: i64) -> Result<Vec<i64>> {
        let mut chain = Vec::new();
        let mut current = Some(base_id);

        while let Some(id) = current {
            let Some(record) = self.metadata.get_backup(id)? else {
                break;
            };
            chain.push(id);
            if record.kind == BackupKind::Full {
                break;
            }
            current = record.base_backup_id;
            if chain.len() as i64 > ROTATION_SCAN_LIMIT {
                break;
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// 古いバックアップのローテーション
    ///
    /// Completedなバックアップが`max_versions`を超える場合、古い順に
    /// メタデータと保存先ディレクトリツリーの両方を削除します。
    /// 生存するバックアップのベースになっているものは削除せずスキップします
    /// （依存する増分が先にローテーションされた後の実行で回収されます）。
    fn rotate_old_backups(&self) -> Result<()> {
        let all = self.metadata.get_all_backups(None, ROTATION_SCAN_LIMIT)?;
        let completed: Vec<_> = all
            .iter()
            .filter(|b| b.status == BackupStatus::Completed)
            .cloned()
            .collect();

        if completed.len() <= self.config.max_versions {
            log::debug!(
                "ローテーション不要: {} / {}バージョン",
                completed.len(),
                self.config.max_versions
            );
            return Ok(());
        }

        let mut oldest_first = completed.clone();
        oldest_first.sort_by_key(|b| (b.timestamp, b.id));
        let excess = completed.len() - self.config.max_versions;

        let mut deleted_ids: HashSet<i64> = HashSet::new();
        for candidate in oldest_first.iter().take(excess) {
            // 生存するバックアップのベースは削除しない
            let is_live_base = all.iter().any(|b| {
                b.base_backup_id == Some(candidate.id) && !deleted_ids.contains(&b.id)
            });
            if is_live_base {
                log::info!(
                    "ローテーション: {}は増分のベースのためスキップ",
                    candidate.backup_id_string()
                );
                continue;
            }

            let dir = candidate.backup_id_string();
            if self.storage.exists(&dir) {
                if let Err(e) = self.storage.delete_directory(&dir, true) {
                    log::warn!("保存先ディレクトリの削除に失敗: {dir} ({e})");
                }
            }

            self.metadata.delete_backup(candidate.id)?;
            self.metadata.add_log(
                LogLevel::Info,
                &format!("ローテーションにより削除: {dir}"),
                None,
                None,
            )?;
            deleted_ids.insert(candidate.id);
        }

        if !deleted_ids.is_empty() {
            log::info!("ローテーション完了: {}件削除", deleted_ids.len());
        }
        Ok(())
    }

    /// 進捗スナップショットのコピーをオブザーバーへ渡す
    fn report_progress(&self, progress: &BackupProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(progress.clone());
        }
        log::debug!(
            "進捗: {} {}/{}ファイル ({:.1}%)",
            progress.phase,
            progress.files_processed,
            progress.files_total,
            progress.progress_percentage()
        );
    }
}

/// 既存の拡張子の後ろに拡張子を追加（`data.tar.xz` → `data.tar.xz.enc`）
fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".");
    os_string.push(extension);
    PathBuf::from(os_string)
}
