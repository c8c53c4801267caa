//! # ファイルスキャナー
//!
//! ソースディレクトリを走査し、前回スナップショットとの差分
//! （新規・変更・削除・未変更）を検出します。
//!
//! # 変更検出
//!
//! 変更検出は（サイズ, 最終更新時刻）の比較で行います。更新時刻の比較には
//! 1秒の許容誤差があり、ファイルシステムのタイムスタンプ粒度の違いを
//! 吸収します。コンテンツハッシュは記録用であり、変更検出には使用しません。

use crate::error::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// シンボリックリンク循環対策の走査深度上限
const MAX_SCAN_DEPTH: usize = 64;

/// 1ファイルの情報
///
/// # フィールド
///
/// * `path` - ファイルの絶対パス
/// * `relative_path` - ソースルートからの相対パス
/// * `size` - ファイルサイズ（バイト）
/// * `modified` - 最終更新時刻
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// スキャン結果
///
/// `new_files` / `modified_files` / `unchanged_files` / `deleted_files` は
/// 互いに素な集合です。スキャン中のファイル単位のエラーは `errors` に
/// 蓄積され、スキャン自体は継続します。
#[derive(Debug, Default)]
pub struct ScanResult {
    pub new_files: Vec<FileInfo>,
    pub modified_files: Vec<FileInfo>,
    pub unchanged_files: Vec<FileInfo>,
    pub deleted_files: Vec<FileInfo>,
    pub errors: Vec<String>,
    /// スキャンしたファイルの合計サイズ（バイト）
    pub total_size: u64,
}

impl ScanResult {
    /// スキャンしたファイルの総数（削除済みを除く）
    #[must_use]
    pub fn total_files(&self) -> usize {
        self.new_files.len() + self.modified_files.len() + self.unchanged_files.len()
    }

    /// バックアップが必要なファイル（新規 ∪ 変更）
    #[must_use]
    pub fn files_to_backup(&self) -> Vec<FileInfo> {
        let mut files = self.new_files.clone();
        files.extend(self.modified_files.iter().cloned());
        files
    }
}

/// 除外パターンフィルター
///
/// 各パターンはエントリの**ベース名**に対してマッチングされます:
/// - 完全一致（`Thumbs.db`）
/// - `*SUFFIX` → ベース名がSUFFIXで終わる
/// - `PREFIX*` → ベース名がPREFIXで始まる
///
/// ディレクトリがマッチした場合、その配下は走査されません。
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    patterns: HashSet<String>,
}

impl ExcludeFilter {
    /// パターン集合からフィルターを作成
    #[must_use]
    pub fn new(patterns: HashSet<String>) -> Self {
        Self { patterns }
    }

    /// デフォルトの除外パターン集合
    ///
    /// システムファイル・一時ファイル・ロックファイルを除外します。
    #[must_use]
    pub fn default_patterns() -> HashSet<String> {
        [
            // システムファイル
            "Thumbs.db",
            "desktop.ini",
            "$RECYCLE.BIN",
            "System Volume Information",
            // 一時ファイル
            "*.tmp",
            "*.temp",
            "~$*",
            // ロックファイル
            "*.lock",
            ".~lock.*",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }

    /// ベース名が除外パターンにマッチするかを判定
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        for pattern in &self.patterns {
            if pattern == name {
                return true;
            }
            if let Some(suffix) = pattern.strip_prefix('*') {
                if !suffix.contains('*') && name.ends_with(suffix) {
                    return true;
                }
            }
            if let Some(prefix) = pattern.strip_suffix('*') {
                if !prefix.contains('*') && name.starts_with(prefix) {
                    return true;
                }
            }
        }
        false
    }
}

impl Default for ExcludeFilter {
    fn default() -> Self {
        Self::new(Self::default_patterns())
    }
}

/// ファイルスキャナー
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::core::scanner::Scanner;
/// use std::path::Path;
///
/// let scanner = Scanner::new(None);
/// let result = scanner.scan_directory(Path::new("/home/user/documents"), None).unwrap();
/// println!(
///     "{}ファイル（新規{}、エラー{}）",
///     result.total_files(),
///     result.new_files.len(),
///     result.errors.len()
/// );
/// ```
pub struct Scanner {
    filter: ExcludeFilter,
}

impl Scanner {
    /// 新しいScannerを作成
    ///
    /// # 引数
    ///
    /// * `exclude_patterns` - 除外パターン集合（`None`ならデフォルトを使用）
    #[must_use]
    pub fn new(exclude_patterns: Option<HashSet<String>>) -> Self {
        Self {
            filter: ExcludeFilter::new(
                exclude_patterns.unwrap_or_else(ExcludeFilter::default_patterns),
            ),
        }
    }

    /// 除外パターンを追加
    pub fn add_exclude_pattern(&mut self, pattern: impl Into<String>) {
        self.filter.patterns.insert(pattern.into());
    }

    /// 除外パターンを削除
    pub fn remove_exclude_pattern(&mut self, pattern: &str) {
        self.filter.patterns.remove(pattern);
    }

    /// 現在の除外パターン集合を取得
    #[must_use]
    pub fn exclude_patterns(&self) -> &HashSet<String> {
        &self.filter.patterns
    }

    /// ディレクトリを走査して差分を検出
    ///
    /// # 引数
    ///
    /// * `source_path` - 走査するソースルート
    /// * `previous_files` - 前回バックアップのスナップショット
    ///   （相対パス文字列 → [`FileInfo`]）。`None`なら全ファイルが新規
    ///
    /// # エラー
    ///
    /// * ソースルートが存在しない、またはディレクトリでない場合
    ///   (`BackupError::SourceNotFound`)
    ///
    /// ファイル単位のI/Oエラーは結果の`errors`に記録され、致命的ではありません。
    pub fn scan_directory(
        &self,
        source_path: &Path,
        previous_files: Option<&HashMap<String, FileInfo>>,
    ) -> Result<ScanResult> {
        if !source_path.is_dir() {
            return Err(BackupError::SourceNotFound {
                path: source_path.to_path_buf(),
            });
        }

        log::info!("スキャン開始: {}", source_path.display());

        let empty = HashMap::new();
        let previous_files = previous_files.unwrap_or(&empty);

        let mut result = ScanResult::default();
        let mut scanned_paths: HashSet<String> = HashSet::new();

        let walker = WalkDir::new(source_path)
            .follow_links(true)
            .max_depth(MAX_SCAN_DEPTH)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !self.filter.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let message = format!("読み取りエラー: {e}");
                    log::warn!("{message}");
                    result.errors.push(message);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    let message = format!("読み取りエラー: {} ({e})", entry.path().display());
                    log::warn!("{message}");
                    result.errors.push(message);
                    continue;
                }
            };

            let relative_path = match entry.path().strip_prefix(source_path) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            let relative_str = relative_path.to_string_lossy().into_owned();

            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            let file_info = FileInfo {
                path: entry.path().to_path_buf(),
                relative_path,
                size: metadata.len(),
                modified,
            };

            result.total_size += file_info.size;
            scanned_paths.insert(relative_str.clone());

            match previous_files.get(&relative_str) {
                Some(previous) => {
                    // タイムスタンプ（±1秒許容）またはサイズが異なれば変更扱い
                    let drift = (file_info.modified - previous.modified)
                        .num_milliseconds()
                        .abs();
                    if drift > 1000 || file_info.size != previous.size {
                        result.modified_files.push(file_info);
                    } else {
                        result.unchanged_files.push(file_info);
                    }
                }
                None => result.new_files.push(file_info),
            }
        }

        // 前回存在したが今回観測されなかったファイル → 削除扱い
        for (relative_str, previous) in previous_files {
            if !scanned_paths.contains(relative_str) {
                result.deleted_files.push(FileInfo {
                    path: source_path.join(&previous.relative_path),
                    relative_path: previous.relative_path.clone(),
                    size: previous.size,
                    modified: previous.modified,
                });
            }
        }

        log::info!(
            "スキャン完了: {}ファイル（新規{}、変更{}、削除{}、エラー{}）",
            result.total_files(),
            result.new_files.len(),
            result.modified_files.len(),
            result.deleted_files.len(),
            result.errors.len()
        );

        Ok(result)
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(None)
    }
}
