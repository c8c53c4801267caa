//! # ローカルストレージバックエンド
//!
//! ローカルファイルシステム（内蔵ディスク・USBドライブ・マウント済み
//! ネットワークドライブ）への保存を提供します。

use super::{StorageBackend, TransferProgress};
use crate::error::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/// 転送時のバッファサイズ（256KiB）
const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// ローカルファイルシステムのストレージバックエンド
///
/// リモートパス（`/`区切り）はベースディレクトリからの相対パスとして
/// 解決されます。`..`を含むパスは拒否されます。
pub struct LocalStorage {
    base_path: PathBuf,
    connected: bool,
}

impl LocalStorage {
    /// 新しいLocalStorageを作成
    ///
    /// # 引数
    ///
    /// * `base_path` - 保存先のルートディレクトリ
    #[must_use]
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            connected: false,
        }
    }

    /// リモートパスをローカルパスに解決
    fn resolve(&self, remote_path: &str) -> Result<PathBuf> {
        let relative = Path::new(remote_path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(BackupError::PathTraversalDetected {
                path: relative.to_path_buf(),
            });
        }
        Ok(self.base_path.join(relative))
    }

    /// 進捗報告付きのバッファリングコピー
    fn copy_with_progress(
        source: &Path,
        dest: &Path,
        progress: Option<TransferProgress<'_>>,
    ) -> Result<u64> {
        let total = fs::metadata(source)?.len();
        let mut reader = BufReader::new(File::open(source)?);
        let mut writer = BufWriter::new(File::create(dest)?);

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut transferred = 0u64;
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read])?;
            transferred += bytes_read as u64;
            if let Some(callback) = progress {
                callback(transferred, total);
            }
        }
        writer.flush()?;
        Ok(transferred)
    }
}

impl StorageBackend for LocalStorage {
    fn connect(&mut self) -> Result<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path)?;
        }
        if !self.base_path.is_dir() {
            return Err(BackupError::Storage {
                message: format!(
                    "保存先がディレクトリではありません: {}",
                    self.base_path.display()
                ),
            });
        }
        self.connected = true;
        log::info!("ローカルストレージに接続: {}", self.base_path.display());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        log::debug!("ローカルストレージから切断");
    }

    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: Option<TransferProgress<'_>>,
    ) -> Result<()> {
        let dest = self.resolve(remote_path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::copy_with_progress(local_path, &dest, progress)?;
        Ok(())
    }

    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<TransferProgress<'_>>,
    ) -> Result<()> {
        let source = self.resolve(remote_path)?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::copy_with_progress(&source, local_path, progress)?;
        Ok(())
    }

    fn list_files(&self, remote_dir: &str) -> Result<Vec<String>> {
        let dir = self.resolve(remote_dir)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_directory(&self, remote_path: &str) -> Result<()> {
        let dir = self.resolve(remote_path)?;
        fs::create_dir_all(&dir)?;
        Ok(())
    }

    fn delete_file(&self, remote_path: &str) -> Result<()> {
        let path = self.resolve(remote_path)?;
        fs::remove_file(&path)?;
        Ok(())
    }

    fn delete_directory(&self, remote_path: &str, recursive: bool) -> Result<()> {
        let dir = self.resolve(remote_path)?;
        if recursive {
            fs::remove_dir_all(&dir)?;
        } else {
            fs::remove_dir(&dir)?;
        }
        Ok(())
    }

    fn exists(&self, remote_path: &str) -> bool {
        self.resolve(remote_path)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    fn available_space(&self) -> i64 {
        match fs4::available_space(&self.base_path) {
            Ok(space) => space as i64,
            Err(e) => {
                log::warn!("空き容量の取得に失敗: {e}");
                -1
            }
        }
    }

    fn test_connection(&self) -> bool {
        self.base_path.is_dir()
    }
}
