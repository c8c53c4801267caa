//! # リストアエンジン
//!
//! バックアップからの復元を統括します。
//!
//! # 機能
//!
//! - **フルリストア**: 指定バックアップIDの時点の状態を再構築
//! - **ポイントインタイムリストア**: 指定時刻に有効だった状態を、
//!   フルバックアップ＋増分チェーンの畳み込みで再構築
//! - **パターンリストア**: globパターンに一致するファイルのみを、
//!   該当アーカイブだけを取得して復元
//!
//! # フェーズ
//!
//! `Preparing → Downloading → Decrypting → Extracting → Restoring → Done`
//!
//! 暗号エラー・展開エラーはリストア全体を中断します。配置済みのファイルは
//! ロールバックされませんが、ログに記録されます。一時ディレクトリは
//! 成否にかかわらず破棄されます。

use crate::compression::Compressor;
use crate::core::metadata::{
    BackupKind, BackupRecord, BackupStatus, FileRecord, LogLevel, MetadataStore,
};
use crate::crypto::Encryptor;
use crate::error::{BackupError, Result};
use crate::storage::StorageBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// リストア用の一時ディレクトリ名（復元先の直下に作成）
const RESTORE_TEMP_DIR: &str = ".scrat-restore-tmp";

/// バックアップ一覧取得時の上限
const BACKUP_SCAN_LIMIT: i64 = 10_000;

/// リストア設定
///
/// # フィールド
///
/// * `destination_path` - 復元先のルートパス
/// * `password` - 復号パスフレーズ
/// * `restore_to_original` - 元の場所へ復元するか
/// * `overwrite_existing` - 既存ファイルを上書きするか
/// * `restore_permissions` - パーミッションを復元するか
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    pub destination_path: PathBuf,
    pub password: String,
    #[serde(default)]
    pub restore_to_original: bool,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default = "default_restore_permissions")]
    pub restore_permissions: bool,
}

fn default_restore_permissions() -> bool {
    true
}

impl RestoreConfig {
    /// デフォルト値で設定を作成
    #[must_use]
    pub fn new(destination_path: PathBuf, password: String) -> Self {
        Self {
            destination_path,
            password,
            restore_to_original: false,
            overwrite_existing: false,
            restore_permissions: true,
        }
    }
}

/// リストアのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Preparing,
    Downloading,
    Decrypting,
    Extracting,
    Restoring,
    Done,
}

impl RestorePhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Downloading => "downloading",
            Self::Decrypting => "decrypting",
            Self::Extracting => "extracting",
            Self::Restoring => "restoring",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// リストアの進捗スナップショット（オブザーバーには不変コピーが渡される）
#[derive(Debug, Clone)]
pub struct RestoreProgress {
    pub phase: RestorePhase,
    pub files_total: usize,
    pub files_processed: usize,
    pub bytes_total: u64,
    pub bytes_processed: u64,
    pub current_file: Option<String>,
    pub errors: Vec<String>,
}

impl RestoreProgress {
    fn new() -> Self {
        Self {
            phase: RestorePhase::Preparing,
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
        if self.files_total == 0 {
            return 0.0;
        }
        (self.files_processed as f64 / self.files_total as f64) * 100.0
    }
}

/// リストア実行結果
#[derive(Debug)]
pub struct RestoreResult {
    /// 実際に配置したファイル数
    pub files_restored: usize,
    /// 処理したファイル数（スキップ含む）
    pub files_processed: usize,
    pub bytes_restored: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
}

/// ステージング対象のバックアップ1件（レコード・鍵・取得するアーカイブ）
struct RestoreStage {
    record: BackupRecord,
    encryptor: Encryptor,
    /// `Some`の場合、このアーカイブ名のみ取得する（パターンリストア用）
    archive_filter: Option<HashSet<String>>,
}

/// リストアエンジン
///
/// MetadataStoreを参照してアーカイブ集合を解決し、
/// StorageBackend → Encryptor → Compressor の順に駆動して
/// ファイルを復元先に配置します。
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::core::metadata::MetadataStore;
/// use scrat_backup::core::restore::{RestoreConfig, RestoreEngine};
/// use scrat_backup::storage::LocalStorage;
/// use std::path::{Path, PathBuf};
///
/// let store = MetadataStore::open(Path::new("/var/lib/scrat-backup/metadata.db")).unwrap();
/// let config = RestoreConfig::new(PathBuf::from("/home/user/restored"), "pw".to_string());
/// let storage = Box::new(LocalStorage::new(PathBuf::from("/mnt/backup")));
/// let mut engine = RestoreEngine::new(&store, storage, config);
/// let result = engine.restore_full_backup(1).unwrap();
/// println!("{}ファイル復元", result.files_restored);
/// ```
pub struct RestoreEngine<'a> {
    metadata: &'a MetadataStore,
    storage: Box<dyn StorageBackend + 'a>,
    config: RestoreConfig,
    compressor: Compressor,
    progress_callback: Option<Box<dyn Fn(RestoreProgress) + 'a>>,
}

impl<'a> RestoreEngine<'a> {
    /// 新しいRestoreEngineを作成
    #[must_use]
    pub fn new(
        metadata: &'a MetadataStore,
        storage: Box<dyn StorageBackend + 'a>,
        config: RestoreConfig,
    ) -> Self {
        Self {
            metadata,
            storage,
            config,
            compressor: Compressor::default(),
            progress_callback: None,
        }
    }

    /// 進捗オブザーバーを設定
    #[must_use]
    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(RestoreProgress) + 'a,
    ) -> Self {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// 指定バックアップIDの時点の状態を復元
    ///
    /// # エラー
    ///
    /// * バックアップが存在しない場合 (`BackupError::BackupNotFound`)
    /// * ステータスがCompletedでない場合 (`BackupError::Precondition`)
    /// * saltが保存されていない場合 (`BackupError::NotRestorable`)
    /// * パスフレーズが一致しない場合 (`BackupError::Crypto`) —
    ///   key hashの比較により、暗号文に触れる前に検出されます
    pub fn restore_full_backup(&mut self, backup_id: i64) -> Result<RestoreResult> {
        self.storage.connect()?;

        let record = self.fetch_restorable(backup_id)?;
        let encryptor = self.build_encryptor(&record)?;

        log::info!("リストア開始: バックアップ{backup_id}");

        let records: Vec<FileRecord> = self
            .metadata
            .get_backup_files(backup_id)?
            .into_iter()
            .filter(|f| !f.is_deleted)
            .collect();

        let stages = vec![RestoreStage {
            record,
            encryptor,
            archive_filter: None,
        }];
        self.execute(stages, records, backup_id)
    }

    /// 指定時刻に有効だった状態を復元（ポイントインタイム）
    ///
    /// 時刻`target`以前で最新のフルバックアップFを特定し、Fに（推移的に）
    /// 連なる増分のうちタイムスタンプが`(F, target]`のものを昇順に適用した
    /// ファイル状態を配置します。
    ///
    /// # エラー
    ///
    /// * `target`以前のフルバックアップが存在しない場合
    ///   (`BackupError::Precondition`)
    pub fn restore_to_point_in_time(&mut self, target: DateTime<Utc>) -> Result<RestoreResult> {
        self.storage.connect()?;

        let completed: Vec<BackupRecord> = self
            .metadata
            .get_all_backups(Some(BackupStatus::Completed), BACKUP_SCAN_LIMIT)?
            .into_iter()
            .filter(|b| b.timestamp <= target)
            .collect();

        let base = completed
            .iter()
            .filter(|b| b.kind == BackupKind::Full)
            .max_by_key(|b| (b.timestamp, b.id))
            .cloned()
            .ok_or_else(|| {
                BackupError::precondition(format!(
                    "{target}以前のフルバックアップが見つかりません"
                ))
            })?;

        log::info!(
            "ポイントインタイムリストア: ベース={} 対象時刻={target}",
            base.backup_id_string()
        );

        let by_id: HashMap<i64, &BackupRecord> = completed.iter().map(|b| (b.id, b)).collect();
        let mut incrementals: Vec<BackupRecord> = completed
            .iter()
            .filter(|b| {
                b.kind == BackupKind::Incremental
                    && b.timestamp > base.timestamp
                    && b.timestamp <= target
                    && chains_to_base(b, base.id, &by_id)
            })
            .cloned()
            .collect();
        incrementals.sort_by_key(|b| (b.timestamp, b.id));

        log::info!("フル1件 + 増分{}件を適用", incrementals.len());

        // ファイル状態の畳み込み: ベースから始め、増分ごとに
        // 非削除レコードをupsert、トゥームストーンで削除
        let mut state: HashMap<String, FileRecord> = HashMap::new();
        for file in self.metadata.get_backup_files(base.id)? {
            if !file.is_deleted {
                state.insert(file.relative_path.clone(), file);
            }
        }
        for incremental in &incrementals {
            for file in self.metadata.get_backup_files(incremental.id)? {
                if file.is_deleted {
                    state.remove(&file.relative_path);
                } else {
                    state.insert(file.relative_path.clone(), file);
                }
            }
        }

        // 最終状態に寄与しているバックアップのみステージングする
        let contributing: HashSet<i64> = state.values().map(|f| f.backup_id).collect();

        let base_id = base.id;
        let mut stages = Vec::new();
        for record in std::iter::once(base).chain(incrementals) {
            if !contributing.contains(&record.id) {
                continue;
            }
            // 各バックアップは独自のsaltを持つため、鍵はバックアップごとに再導出する
            let encryptor = self.build_encryptor(&record)?;
            stages.push(RestoreStage {
                record,
                encryptor,
                archive_filter: None,
            });
        }

        let mut records: Vec<FileRecord> = state.into_values().collect();
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        self.execute(stages, records, base_id)
    }

    /// globパターンに一致するファイルのみを復元（部分リストア）
    ///
    /// 一致したファイルを含むアーカイブだけが取得・復号・展開されます。
    ///
    /// # エラー
    ///
    /// * パターンが不正な場合 (`BackupError::Config`)
    pub fn restore_specific_files(
        &mut self,
        backup_id: i64,
        file_patterns: &[String],
    ) -> Result<RestoreResult> {
        self.storage.connect()?;

        let patterns: Vec<glob::Pattern> = file_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| BackupError::config(format!("不正なパターン: {p} ({e})")))
            })
            .collect::<Result<_>>()?;

        let record = self.fetch_restorable(backup_id)?;
        let encryptor = self.build_encryptor(&record)?;

        let matching: Vec<FileRecord> = self
            .metadata
            .get_backup_files(backup_id)?
            .into_iter()
            .filter(|f| !f.is_deleted)
            .filter(|f| patterns.iter().any(|p| p.matches(&f.relative_path)))
            .collect();

        log::info!("パターンに一致: {}ファイル", matching.len());

        if matching.is_empty() {
            return Ok(RestoreResult {
                files_restored: 0,
                files_processed: 0,
                bytes_restored: 0,
                duration_seconds: 0.0,
                errors: Vec::new(),
            });
        }

        let archive_filter: HashSet<String> = matching
            .iter()
            .map(|f| f.archive_name.clone())
            .filter(|name| !name.is_empty())
            .collect();

        let stages = vec![RestoreStage {
            record,
            encryptor,
            archive_filter: Some(archive_filter),
        }];
        self.execute(stages, matching, backup_id)
    }

    // ==================== 内部処理 ====================

    /// バックアップを取得し、復元可能であることを確認
    fn fetch_restorable(&self, backup_id: i64) -> Result<BackupRecord> {
        let record = self
            .metadata
            .get_backup(backup_id)?
            .ok_or(BackupError::BackupNotFound { id: backup_id })?;

        if record.status != BackupStatus::Completed {
            return Err(BackupError::precondition(format!(
                "バックアップ{backup_id}のステータスは{}です。Completedのバックアップのみ復元できます",
                record.status
            )));
        }

        Ok(record)
    }

    /// 保存されたsaltから鍵を再導出し、key hashで照合
    fn build_encryptor(&self, record: &BackupRecord) -> Result<Encryptor> {
        let salt = record.salt.as_deref().ok_or_else(|| BackupError::NotRestorable {
            message: format!(
                "バックアップ{}にsaltが保存されていません。古いバージョンで作成されたバックアップは復元できません",
                record.id
            ),
        })?;

        let encryptor = Encryptor::with_salt(&self.config.password, salt)?;

        // 暗号文に触れる前にパスフレーズ不一致を検出する
        if encryptor.key_hash() != record.key_hash {
            return Err(BackupError::crypto(
                "パスフレーズが一致しません（鍵ハッシュの照合に失敗）",
            ));
        }

        Ok(encryptor)
    }

    /// 一時ディレクトリの生成・パイプライン実行・後始末とログ記録
    fn execute(
        &self,
        stages: Vec<RestoreStage>,
        records: Vec<FileRecord>,
        log_backup_id: i64,
    ) -> Result<RestoreResult> {
        self.metadata.add_log(
            LogLevel::Info,
            "リストア開始",
            Some(log_backup_id),
            Some(&format!("復元先: {}", self.config.destination_path.display())),
        )?;

        let temp_dir = self.config.destination_path.join(RESTORE_TEMP_DIR);
        fs::create_dir_all(&temp_dir)?;

        let outcome = self.run_pipeline(&stages, &records, &temp_dir);

        // 一時ディレクトリは成否にかかわらず破棄する
        if let Err(e) = fs::remove_dir_all(&temp_dir) {
            log::warn!("一時ディレクトリの削除に失敗: {e}");
        }

        match outcome {
            Ok(result) => {
                self.metadata.add_log(
                    LogLevel::Info,
                    "リストア完了",
                    Some(log_backup_id),
                    Some(&format!(
                        "ファイル: {}, バイト: {}, 所要: {:.1}秒",
                        result.files_restored, result.bytes_restored, result.duration_seconds
                    )),
                )?;
                Ok(result)
            }
            Err(e) => {
                let _ = self.metadata.add_log(
                    LogLevel::Error,
                    "リストア失敗",
                    Some(log_backup_id),
                    Some(&e.to_string()),
                );
                Err(e)
            }
        }
    }

    fn run_pipeline(
        &self,
        stages: &[RestoreStage],
        records: &[FileRecord],
        temp_dir: &Path,
    ) -> Result<RestoreResult> {
        let started = Instant::now();

        let mut progress = RestoreProgress::new();
        progress.files_total = records.len();
        progress.bytes_total = records.iter().map(|f| f.file_size.max(0) as u64).sum();
        self.report_progress(&progress);

        // 空のバックアップ（アーカイブなし）は配置なしで成功
        if records.is_empty() {
            progress.phase = RestorePhase::Done;
            self.report_progress(&progress);
            return Ok(RestoreResult {
                files_restored: 0,
                files_processed: 0,
                bytes_restored: 0,
                duration_seconds: started.elapsed().as_secs_f64(),
                errors: progress.errors,
            });
        }

        // 1. アーカイブを取得（バックアップごとのサブディレクトリへ）
        progress.phase = RestorePhase::Downloading;
        self.report_progress(&progress);

        // (ステージングディレクトリ, 暗号化アーカイブ名リスト) をステージ順に保持
        let mut staged: Vec<(PathBuf, Vec<String>)> = Vec::new();
        for stage in stages {
            let dir_name = stage.record.backup_id_string();
            if !self.storage.exists(&dir_name) {
                return Err(BackupError::NotRestorable {
                    message: format!("バックアップディレクトリが見つかりません: {dir_name}"),
                });
            }

            let mut names: Vec<String> = self
                .storage
                .list_files(&dir_name)?
                .into_iter()
                .filter(|name| name.ends_with(".enc"))
                .collect();
            if let Some(filter) = &stage.archive_filter {
                names.retain(|name| filter.contains(name));
            }
            if names.is_empty() {
                return Err(BackupError::NotRestorable {
                    message: format!("暗号化アーカイブが見つかりません: {dir_name}"),
                });
            }

            let stage_dir = temp_dir.join(&dir_name);
            fs::create_dir_all(&stage_dir)?;
            for name in &names {
                progress.current_file = Some(name.clone());
                self.report_progress(&progress);
                self.storage
                    .download_file(&format!("{dir_name}/{name}"), &stage_dir.join(name), None)?;
            }
            staged.push((stage_dir, names));
        }

        // 2. 復号（チャンク形式・レガシー形式はEncryptorが判別）
        progress.phase = RestorePhase::Decrypting;
        self.report_progress(&progress);

        let mut decrypted: Vec<Vec<PathBuf>> = Vec::new();
        for (stage, (stage_dir, names)) in stages.iter().zip(&staged) {
            let mut archives = Vec::new();
            for name in names {
                let encrypted_path = stage_dir.join(name);
                let archive_path = stage_dir.join(name.trim_end_matches(".enc"));

                progress.current_file = Some(name.clone());
                self.report_progress(&progress);

                stage.encryptor.decrypt_file(&encrypted_path, &archive_path)?;
                archives.push(archive_path);
            }
            decrypted.push(archives);
        }

        // 3. 展開（ステージは時系列順のため、新しい内容が勝つ）
        progress.phase = RestorePhase::Extracting;
        self.report_progress(&progress);

        let extract_dir = temp_dir.join("extracted");
        for archives in &decrypted {
            self.compressor.extract_split_archives(archives, &extract_dir)?;
        }

        // 4. ファイルを配置
        progress.phase = RestorePhase::Restoring;
        self.report_progress(&progress);

        let mut files_restored = 0usize;
        let mut bytes_restored = 0u64;

        for record in records {
            progress.current_file = Some(record.relative_path.clone());

            let staged_file = extract_dir.join(&record.relative_path);
            if !staged_file.exists() {
                let message = format!(
                    "展開されたファイルが見つかりません: {}",
                    record.relative_path
                );
                log::warn!("{message}");
                progress.errors.push(message);
                self.report_progress(&progress);
                continue;
            }
            if !staged_file.is_file() {
                log::warn!("ディレクトリをスキップ: {}", staged_file.display());
                continue;
            }

            let dest = self.destination_for(record);

            if dest.exists() {
                if dest.is_dir() {
                    // 同名ディレクトリはファイルで置き換える
                    log::warn!(
                        "復元先にディレクトリが存在するため置き換えます: {}",
                        dest.display()
                    );
                    fs::remove_dir_all(&dest)?;
                } else if !self.config.overwrite_existing {
                    log::info!("スキップ（既存）: {}", dest.display());
                    progress.files_processed += 1;
                    self.report_progress(&progress);
                    continue;
                }
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            match fs::copy(&staged_file, &dest) {
                Ok(copied) => {
                    self.apply_permissions(&staged_file, &dest);
                    files_restored += 1;
                    bytes_restored += copied;
                    log::debug!("復元: {} → {}", record.relative_path, dest.display());
                }
                Err(e) => {
                    let message =
                        format!("配置に失敗: {} ({e})", record.relative_path);
                    log::error!("{message}");
                    progress.errors.push(message);
                }
            }

            progress.files_processed += 1;
            progress.bytes_processed += record.file_size.max(0) as u64;
            self.report_progress(&progress);
        }

        progress.phase = RestorePhase::Done;
        progress.current_file = None;
        self.report_progress(&progress);

        let duration_seconds = started.elapsed().as_secs_f64();
        log::info!(
            "リストア完了: {files_restored}ファイル, {bytes_restored}バイト, {duration_seconds:.1}秒"
        );

        Ok(RestoreResult {
            files_restored,
            files_processed: progress.files_processed,
            bytes_restored,
            duration_seconds,
            errors: progress.errors,
        })
    }

    /// レコードの配置先パスを決定
    fn destination_for(&self, record: &FileRecord) -> PathBuf {
        let relative = Path::new(&record.relative_path);

        if self.config.restore_to_original && !record.source_path.is_empty() {
            // source_pathはファイル自身の絶対パス（ルート/相対パス）
            return PathBuf::from(&record.source_path);
        }

        match source_root(&record.source_path, relative) {
            Some(root) => match root.file_name() {
                Some(root_name) => self.config.destination_path.join(root_name).join(relative),
                None => self.config.destination_path.join(relative),
            },
            None => self.config.destination_path.join(relative),
        }
    }

    /// パーミッションの適用
    ///
    /// `restore_permissions=false`の場合、アーカイブ由来のモードビットを
    /// 引き継がずデフォルトに揃えます。
    fn apply_permissions(&self, staged: &Path, dest: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if self.config.restore_permissions {
                if let Ok(meta) = fs::metadata(staged) {
                    let _ = fs::set_permissions(dest, meta.permissions());
                }
            } else {
                let _ = fs::set_permissions(dest, fs::Permissions::from_mode(0o644));
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (staged, dest);
        }
    }

    /// 進捗スナップショットのコピーをオブザーバーへ渡す
    fn report_progress(&self, progress: &RestoreProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(progress.clone());
        }
        log::debug!(
            "進捗: {} {}/{}ファイル",
            progress.phase,
            progress.files_processed,
            progress.files_total
        );
    }
}

/// 増分がベースに（推移的に）連なっているかを判定
fn chains_to_base(
    record: &BackupRecord,
    base_id: i64,
    by_id: &HashMap<i64, &BackupRecord>,
) -> bool {
    let mut current = record.base_backup_id;
    // ベース参照の欠落（孤児）やループはチェーン外とみなす
    let mut hops = 0;
    while let Some(id) = current {
        if id == base_id {
            return true;
        }
        hops += 1;
        if hops > by_id.len() {
            return false;
        }
        current = by_id.get(&id).and_then(|r| r.base_backup_id);
    }
    false
}

/// ファイルの絶対パスと相対パスからソースルートを逆算
///
/// `source_path`が`relative`で終わっていない場合は`None`を返します。
fn source_root(source_path: &str, relative: &Path) -> Option<PathBuf> {
    if source_path.is_empty() {
        return None;
    }
    let source = Path::new(source_path);
    if !source.ends_with(relative) {
        return None;
    }

    let mut root = source;
    for _ in relative.components() {
        root = root.parent()?;
    }
    if root.as_os_str().is_empty() {
        None
    } else {
        Some(root.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_root_derivation() {
        assert_eq!(
            source_root("/home/user/docs/sub/a.txt", Path::new("sub/a.txt")),
            Some(PathBuf::from("/home/user/docs"))
        );
        assert_eq!(
            source_root("/S/a.txt", Path::new("a.txt")),
            Some(PathBuf::from("/S"))
        );
        // 相対パスと一致しない場合はNone
        assert_eq!(source_root("/S/b.txt", Path::new("a.txt")), None);
        assert_eq!(source_root("", Path::new("a.txt")), None);
    }

    #[test]
    fn test_restore_progress_percentage() {
        let mut progress = RestoreProgress::new();
        assert_eq!(progress.progress_percentage(), 0.0);

        progress.files_total = 4;
        progress.files_processed = 1;
        assert!((progress.progress_percentage() - 25.0).abs() < f64::EPSILON);
    }
}
