//! # アーカイブ圧縮エンジン
//!
//! LZMA2（xz）圧縮のtarコンテナと分割アーカイブを提供します。
//!
//! # 機能
//!
//! - **tar.xzアーカイブの作成**: ストリーミング圧縮・決定的なエントリ順序
//! - **分割アーカイブ**: 設定サイズを超える入力をFirst-Fit-Decreasingで分割
//! - **展開**: ディレクトリエントリの除外・パストラバーサルの拒否
//!
//! ファイル→アーカイブの対応は[`ArchivePart::entries`]として呼び出し側に
//! 返されるため、部分リストア時は必要なアーカイブだけを取得できます。

use crate::error::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// デフォルトの圧縮レベル（速度と圧縮率のバランス）
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;
/// デフォルトの分割サイズ（128MiB）
pub const DEFAULT_SPLIT_SIZE: u64 = 128 * 1024 * 1024;
/// 分割サイズの下限（1MiB）
pub const MIN_SPLIT_SIZE: u64 = 1024 * 1024;

/// アーカイブ内の1エントリ（圧縮元ファイルとアーカイブ内パス）
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// 圧縮元ファイルの絶対パス
    pub source: PathBuf,
    /// アーカイブ内の相対パス
    pub name: PathBuf,
}

/// 作成されたアーカイブ1つ分の情報
#[derive(Debug, Clone)]
pub struct ArchivePart {
    /// アーカイブファイルのパス
    pub path: PathBuf,
    /// このアーカイブに格納されたエントリ
    pub entries: Vec<ArchiveEntry>,
}

/// アーカイブの統計情報
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// アーカイブファイルのサイズ（バイト）
    pub size: u64,
    /// 格納されているファイル数
    pub files: usize,
    /// 展開後の合計サイズ（バイト）
    pub uncompressed_size: u64,
}

impl ArchiveInfo {
    /// 圧縮率を計算（0.0〜1.0、高いほど圧縮効果が大きい）
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.uncompressed_size == 0 {
            return 0.0;
        }
        1.0 - (self.size as f64) / (self.uncompressed_size as f64)
    }
}

/// アーカイブ圧縮エンジン
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::compression::Compressor;
/// use std::path::{Path, PathBuf};
///
/// let compressor = Compressor::new(5, 128 * 1024 * 1024).unwrap();
/// let files = vec![PathBuf::from("/data/a.txt"), PathBuf::from("/data/b.txt")];
/// let parts = compressor
///     .compress_files(&files, Path::new("/backup/data.tar.xz"), Some(Path::new("/data")))
///     .unwrap();
/// for part in &parts {
///     println!("{}: {}ファイル", part.path.display(), part.entries.len());
/// }
/// ```
pub struct Compressor {
    compression_level: u32,
    split_size: u64,
}

impl Compressor {
    /// 新しいCompressorを作成
    ///
    /// # 引数
    ///
    /// * `compression_level` - 圧縮レベル（0〜9）
    /// * `split_size` - アーカイブ1つあたりの最大入力サイズ（最低1MiB）
    ///
    /// # エラー
    ///
    /// * 圧縮レベルが範囲外の場合 (`BackupError::Config`)
    /// * 分割サイズが1MiB未満の場合 (`BackupError::Config`)
    pub fn new(compression_level: u32, split_size: u64) -> Result<Self> {
        if compression_level > 9 {
            return Err(BackupError::config(format!(
                "圧縮レベルは0〜9で指定してください（指定値: {compression_level}）"
            )));
        }
        if split_size < MIN_SPLIT_SIZE {
            return Err(BackupError::config(format!(
                "分割サイズは最低{MIN_SPLIT_SIZE}バイト必要です（指定値: {split_size}）"
            )));
        }

        Ok(Self {
            compression_level,
            split_size,
        })
    }

    /// ファイルリストを1つ以上のアーカイブに圧縮
    ///
    /// `base_dir`が指定された場合、各エントリは`base_dir`からの相対パスで
    /// 格納されます。指定されない場合（または`base_dir`配下にない場合）は
    /// ファイル名のみで格納されます。
    ///
    /// # エラー
    ///
    /// * `files`が空の場合 (`BackupError::Compression`)
    /// * アーカイブの書き込みに失敗した場合
    ///
    /// 存在しない入力ファイルは警告ログの上スキップされます（致命的ではない）。
    pub fn compress_files(
        &self,
        files: &[PathBuf],
        output_base: &Path,
        base_dir: Option<&Path>,
    ) -> Result<Vec<ArchivePart>> {
        let entries: Vec<ArchiveEntry> = files
            .iter()
            .map(|file| {
                let name = match base_dir.and_then(|base| file.strip_prefix(base).ok()) {
                    Some(relative) => relative.to_path_buf(),
                    None => PathBuf::from(file.file_name().unwrap_or(file.as_os_str())),
                };
                ArchiveEntry {
                    source: file.clone(),
                    name,
                }
            })
            .collect();

        self.compress_entries(&entries, output_base)
    }

    /// アーカイブ内パスを明示したエントリリストを圧縮
    ///
    /// 複数のソースルートを1つのバックアップにまとめる場合、各ファイルの
    /// アーカイブ内パスはルートごとの相対パスになるため、こちらを使用します。
    pub fn compress_entries(
        &self,
        entries: &[ArchiveEntry],
        output_base: &Path,
    ) -> Result<Vec<ArchivePart>> {
        if entries.is_empty() {
            return Err(BackupError::Compression {
                message: "圧縮対象のファイルが指定されていません".to_string(),
            });
        }

        // 存在しない入力はここで除外（致命的ではない）
        let mut sized: Vec<(ArchiveEntry, u64)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match fs::metadata(&entry.source) {
                Ok(meta) => sized.push((entry.clone(), meta.len())),
                Err(e) => {
                    log::warn!(
                        "ファイルが見つからないためスキップ: {} ({e})",
                        entry.source.display()
                    );
                }
            }
        }

        let total_size: u64 = sized.iter().map(|(_, size)| size).sum();

        if total_size > self.split_size {
            log::info!(
                "合計サイズ{}MiBが分割サイズを超過、マルチボリュームアーカイブを作成",
                total_size / 1024 / 1024
            );
            self.compress_split(sized, output_base)
        } else {
            let entries: Vec<ArchiveEntry> = sized.into_iter().map(|(e, _)| e).collect();
            Ok(vec![self.compress_single(&entries, output_base)?])
        }
    }

    /// 単一アーカイブを作成
    fn compress_single(&self, entries: &[ArchiveEntry], output_path: &Path) -> Result<ArchivePart> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(output_path)?;
        let encoder = XzEncoder::new(BufWriter::new(file), self.compression_level);
        let mut builder = Builder::new(encoder);

        let mut archived = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.source.exists() {
                log::warn!(
                    "ファイルが見つからないためスキップ: {}",
                    entry.source.display()
                );
                continue;
            }
            builder
                .append_path_with_name(&entry.source, &entry.name)
                .map_err(|e| BackupError::Compression {
                    message: format!(
                        "アーカイブへの追加に失敗: {} ({e})",
                        entry.source.display()
                    ),
                })?;
            archived.push(entry.clone());
            log::debug!("追加: {}", entry.name.display());
        }

        let encoder = builder.into_inner().map_err(|e| BackupError::Compression {
            message: format!("アーカイブの確定に失敗: {e}"),
        })?;
        let mut writer = encoder.finish().map_err(|e| BackupError::Compression {
            message: format!("xzエンコーダの終了に失敗: {e}"),
        })?;
        writer.flush()?;

        let archive_size = fs::metadata(output_path)?.len();
        log::info!(
            "アーカイブ作成: {} ({}MiB, {}ファイル)",
            output_path.display(),
            archive_size / 1024 / 1024,
            archived.len()
        );

        Ok(ArchivePart {
            path: output_path.to_path_buf(),
            entries: archived,
        })
    }

    /// 分割アーカイブを作成（First-Fit-Decreasing）
    fn compress_split(
        &self,
        mut sized: Vec<(ArchiveEntry, u64)>,
        output_base: &Path,
    ) -> Result<Vec<ArchivePart>> {
        // サイズ降順にソート
        sized.sort_by(|a, b| b.1.cmp(&a.1));

        let mut parts = Vec::new();
        let mut current_chunk: Vec<ArchiveEntry> = Vec::new();
        let mut current_size = 0u64;
        let mut chunk_index = 1usize;

        for (entry, file_size) in sized {
            // 1ファイルだけで分割サイズを超える場合は専用アーカイブにする
            // （ファイル内部では分割しない）
            if file_size > self.split_size {
                if !current_chunk.is_empty() {
                    let path = Self::split_path(output_base, chunk_index);
                    parts.push(self.compress_single(&current_chunk, &path)?);
                    chunk_index += 1;
                    current_chunk.clear();
                    current_size = 0;
                }

                log::warn!(
                    "{}は分割サイズを超過（{}MiB）、専用アーカイブを作成",
                    entry.name.display(),
                    file_size / 1024 / 1024
                );
                let path = Self::split_path(output_base, chunk_index);
                parts.push(self.compress_single(std::slice::from_ref(&entry), &path)?);
                chunk_index += 1;
                continue;
            }

            // 現在のチャンクに収まらなければフラッシュ
            if current_size + file_size > self.split_size && !current_chunk.is_empty() {
                let path = Self::split_path(output_base, chunk_index);
                parts.push(self.compress_single(&current_chunk, &path)?);
                chunk_index += 1;
                current_chunk.clear();
                current_size = 0;
            }

            current_chunk.push(entry);
            current_size += file_size;
        }

        if !current_chunk.is_empty() {
            let path = Self::split_path(output_base, chunk_index);
            parts.push(self.compress_single(&current_chunk, &path)?);
        }

        Ok(parts)
    }

    /// 分割アーカイブのパスを生成（`{stem}.{NNN}{suffix}`、1始まり）
    fn split_path(base_path: &Path, index: usize) -> PathBuf {
        let stem = base_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = base_path.parent().unwrap_or_else(|| Path::new(""));

        let split_name = match base_path.extension() {
            Some(ext) => format!("{stem}.{index:03}.{}", ext.to_string_lossy()),
            None => format!("{stem}.{index:03}"),
        };
        parent.join(split_name)
    }

    /// アーカイブを展開
    ///
    /// ディレクトリエントリは作成されますが戻り値には含まれません。
    /// `..`を含むエントリパスはディレクトリトラバーサルとして拒否されます。
    ///
    /// # 戻り値
    ///
    /// 展開された通常ファイルの絶対パスのリスト
    ///
    /// # エラー
    ///
    /// * アーカイブが存在しない場合 (`BackupError::Io`)
    /// * アーカイブが破損している場合 (`BackupError::Compression`)
    /// * トラバーサルを検出した場合 (`BackupError::PathTraversalDetected`)
    pub fn extract_archive(&self, archive_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;

        let file = File::open(archive_path)?;
        let decoder = XzDecoder::new(BufReader::new(file));
        let mut archive = Archive::new(decoder);
        archive.set_preserve_permissions(true);

        let mut extracted_files = Vec::new();
        let entries = archive.entries().map_err(|e| BackupError::Compression {
            message: format!("アーカイブを開けません: {} ({e})", archive_path.display()),
        })?;

        for entry in entries {
            let mut entry = entry.map_err(|e| BackupError::Compression {
                message: format!("アーカイブが破損しています: {} ({e})", archive_path.display()),
            })?;

            let entry_path = entry
                .path()
                .map_err(|e| BackupError::Compression {
                    message: format!("エントリパスの読み取りに失敗: {e}"),
                })?
                .into_owned();

            if entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(BackupError::PathTraversalDetected { path: entry_path });
            }

            let is_file = entry.header().entry_type().is_file();
            let unpacked = entry.unpack_in(output_dir)?;
            if !unpacked {
                return Err(BackupError::PathTraversalDetected { path: entry_path });
            }

            if is_file {
                extracted_files.push(output_dir.join(&entry_path));
                log::debug!("展開: {}", entry_path.display());
            }
        }

        log::info!(
            "展開完了: {} ({}ファイル)",
            archive_path.display(),
            extracted_files.len()
        );
        Ok(extracted_files)
    }

    /// 複数の分割アーカイブを順番に展開
    pub fn extract_split_archives(
        &self,
        archive_paths: &[PathBuf],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut all_extracted = Vec::new();
        for archive_path in archive_paths {
            all_extracted.extend(self.extract_archive(archive_path, output_dir)?);
        }
        Ok(all_extracted)
    }

    /// アーカイブの統計情報を取得
    pub fn archive_info(&self, archive_path: &Path) -> Result<ArchiveInfo> {
        let size = fs::metadata(archive_path)?.len();

        let file = File::open(archive_path)?;
        let decoder = XzDecoder::new(BufReader::new(file));
        let mut archive = Archive::new(decoder);

        let mut files = 0usize;
        let mut uncompressed_size = 0u64;
        for entry in archive.entries().map_err(|e| BackupError::Compression {
            message: format!("アーカイブを開けません: {e}"),
        })? {
            let entry = entry.map_err(|e| BackupError::Compression {
                message: format!("アーカイブが破損しています: {e}"),
            })?;
            if entry.header().entry_type().is_file() {
                files += 1;
                uncompressed_size += entry.header().size().unwrap_or(0);
            }
        }

        Ok(ArchiveInfo {
            path: archive_path.to_path_buf(),
            size,
            files,
            uncompressed_size,
        })
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            split_size: DEFAULT_SPLIT_SIZE,
        }
    }
}
