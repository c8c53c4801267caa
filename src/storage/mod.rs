//! # ストレージバックエンド
//!
//! バックアップ保存先の抽象インターフェースを提供します。
//!
//! エンジンは具体的なバックエンドを検査せず、`/`区切りの相対パスと
//! このトレイト契約のみに依存します。ローカル（USB）バックエンドは
//! [`local::LocalStorage`]として実装されています。SMB/SFTP/WebDAV/rclone
//! などのリモートトランスポートは外部コンポーネントであり、この
//! インターフェースを実装する形で接続されます。

pub mod local;

use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use local::LocalStorage;

/// 転送進捗コールバック（転送済みバイト数, 合計バイト数）
pub type TransferProgress<'a> = &'a dyn Fn(u64, u64);

/// 保存先の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// ローカル・USBドライブ
    Usb,
    /// SMB/CIFS共有
    Smb,
    /// SFTPサーバー
    Sftp,
    /// WebDAVサーバー
    Webdav,
    /// rclone経由のクラウドストレージ
    Rclone,
}

impl DestinationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Smb => "smb",
            Self::Sftp => "sftp",
            Self::Webdav => "webdav",
            Self::Rclone => "rclone",
        }
    }

    /// 文字列から変換
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "usb" | "local" => Ok(Self::Usb),
            "smb" => Ok(Self::Smb),
            "sftp" => Ok(Self::Sftp),
            "webdav" => Ok(Self::Webdav),
            "rclone" => Ok(Self::Rclone),
            _ => Err(BackupError::config(format!("不明な保存先種別: {s}"))),
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ストレージバックエンドの共通インターフェース
///
/// リモートパスの区切り文字は`/`です。`upload_file`は必要な親ディレクトリを
/// 作成しなければなりません。
pub trait StorageBackend {
    /// ストレージへ接続
    fn connect(&mut self) -> Result<()>;

    /// ストレージから切断
    ///
    /// エラー時も含め、利用終了時には必ず呼び出します。
    fn disconnect(&mut self);

    /// ファイルをストレージへアップロード
    ///
    /// # 引数
    ///
    /// * `local_path` - ローカルのファイルパス
    /// * `remote_path` - ストレージ上のパス（`/`区切り）
    /// * `progress` - 任意の進捗コールバック
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: Option<TransferProgress<'_>>,
    ) -> Result<()>;

    /// ファイルをストレージからダウンロード
    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<TransferProgress<'_>>,
    ) -> Result<()>;

    /// ディレクトリ内のファイル名一覧を取得（パスを除いた名前のみ）
    fn list_files(&self, remote_dir: &str) -> Result<Vec<String>>;

    /// ディレクトリを作成（親ディレクトリも含む）
    fn create_directory(&self, remote_path: &str) -> Result<()>;

    /// ファイルを削除
    fn delete_file(&self, remote_path: &str) -> Result<()>;

    /// ディレクトリを削除
    fn delete_directory(&self, remote_path: &str, recursive: bool) -> Result<()>;

    /// ファイル・ディレクトリの存在確認
    fn exists(&self, remote_path: &str) -> bool;

    /// 利用可能な空き容量（バイト）を取得。不明な場合は-1
    fn available_space(&self) -> i64;

    /// 接続テスト
    fn test_connection(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_kind_parse() {
        assert_eq!(DestinationKind::parse("usb").unwrap(), DestinationKind::Usb);
        assert_eq!(
            DestinationKind::parse("local").unwrap(),
            DestinationKind::Usb
        );
        assert_eq!(
            DestinationKind::parse("WEBDAV").unwrap(),
            DestinationKind::Webdav
        );
        assert!(DestinationKind::parse("ftp").is_err());
    }

    #[test]
    fn test_destination_kind_roundtrip() {
        for kind in [
            DestinationKind::Usb,
            DestinationKind::Smb,
            DestinationKind::Sftp,
            DestinationKind::Webdav,
            DestinationKind::Rclone,
        ] {
            assert_eq!(DestinationKind::parse(kind.as_str()).unwrap(), kind);
        }
    }
}
