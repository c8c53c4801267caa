use std::path::PathBuf;
use thiserror::Error;

/// scrat-backup用のカスタムエラー型
///
/// バックアップ・リストア操作で発生する可能性のあるエラーを型安全に表現します。
/// thiserrorを使用して、エラーメッセージの生成とエラー変換を自動化しています。
///
/// エラーは発生フェーズで分類されます:
/// - 設定エラー（`Config`）: 処理開始前に検出され、BackupRecordは作成されない
/// - 前提条件エラー（`Precondition`）: 同じく処理開始前に検出される
/// - 致命的I/Oエラー（`Io` / `Storage` / `Compression`）: 実行中のバックアップをFailedにする
/// - 暗号エラー（`Crypto`）: 認証タグ検証失敗・パスフレーズ不一致。リストア全体が失敗する
/// - スキーマエラー（`Schema` / `Migration`）: メタデータストアが開けない。全処理を中断
/// - 復元不能エラー（`NotRestorable`）: 対象バックアップのみ復元できない
#[derive(Error, Debug)]
pub enum BackupError {
    /// 設定の検証エラー（バックアップ開始前）
    #[error("設定エラー: {message}")]
    Config { message: String },

    /// 前提条件エラー（例: Completedなベースがない増分バックアップ）
    #[error("前提条件エラー: {message}")]
    Precondition { message: String },

    /// バックアップ対象が存在しない場合
    #[error("バックアップ対象が存在しません: {path}")]
    SourceNotFound { path: PathBuf },

    /// 指定されたバックアップが存在しない場合
    #[error("バックアップが見つかりません: ID={id}")]
    BackupNotFound { id: i64 },

    /// I/Oエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// ストレージバックエンドのエラー
    #[error("ストレージエラー: {message}")]
    Storage { message: String },

    /// 圧縮・展開エラー
    #[error("圧縮エラー: {message}")]
    Compression { message: String },

    /// 暗号化・復号化エラー（認証失敗・パスフレーズ不一致を含む）
    #[error("暗号化エラー: {message}")]
    Crypto { message: String },

    /// ディレクトリトラバーサルを検出した場合（アーカイブ展開時）
    #[error("不正なパス（ディレクトリトラバーサル検出）: {path}")]
    PathTraversalDetected { path: PathBuf },

    /// メタデータストアのエラー
    #[error("メタデータストアエラー: {0}")]
    Schema(#[from] rusqlite::Error),

    /// スキーマ・マイグレーションのエラー
    #[error("マイグレーションエラー: {message}")]
    Migration { message: String },

    /// 復元不能なバックアップ（salt欠落・アーカイブ欠落）
    #[error("復元できないバックアップ: {message}")]
    NotRestorable { message: String },

    /// その他のエラー（anyhowからの変換用）
    #[error("エラー: {0}")]
    Other(#[from] anyhow::Error),
}

/// `BackupError`用の`Result`型エイリアス
pub type Result<T> = std::result::Result<T, BackupError>;

impl BackupError {
    /// 設定エラーを生成するヘルパー
    pub fn config(message: impl Into<String>) -> Self {
        BackupError::Config {
            message: message.into(),
        }
    }

    /// 前提条件エラーを生成するヘルパー
    pub fn precondition(message: impl Into<String>) -> Self {
        BackupError::Precondition {
            message: message.into(),
        }
    }

    /// 暗号エラーを生成するヘルパー
    pub fn crypto(message: impl Into<String>) -> Self {
        BackupError::Crypto {
            message: message.into(),
        }
    }

    /// エラーが回復可能かどうかを判定
    ///
    /// # 戻り値
    ///
    /// * `true` - リトライで回復可能な一時的エラー
    /// * `false` - 回復不可能な恒久的エラー
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackupError::Io(_) | BackupError::Storage { .. })
    }

    /// エラーが暗号関連（認証失敗・パスフレーズ不一致）かどうかを判定
    ///
    /// 暗号エラーは該当リストアに対して常に致命的で、一般的なI/Oエラーとは
    /// 区別して扱います。
    #[must_use]
    pub fn is_crypto(&self) -> bool {
        matches!(self, BackupError::Crypto { .. })
    }

    /// 処理開始前に検出されるエラー（BackupRecordを作成しない）かどうかを判定
    #[must_use]
    pub fn is_rejected_before_work(&self) -> bool {
        matches!(
            self,
            BackupError::Config { .. }
                | BackupError::Precondition { .. }
                | BackupError::SourceNotFound { .. }
        )
    }

    /// ユーザーフレンドリーなエラーメッセージを生成
    ///
    /// # 戻り値
    ///
    /// エラーの詳細と推奨される対処法を含むメッセージ
    #[must_use]
    pub fn user_friendly_message(&self) -> String {
        match self {
            BackupError::Config { message } => {
                format!(
                    "設定に問題があります: {message}\n\
                     対処法: バックアップ設定（対象・圧縮レベル・分割サイズ）を確認してください。"
                )
            }
            BackupError::Precondition { message } => {
                format!(
                    "実行できません: {message}\n\
                     対処法: 先にフルバックアップを作成してください。"
                )
            }
            BackupError::SourceNotFound { path } => {
                format!(
                    "バックアップ対象が存在しません: {}\n\
                     対処法: パスが正しいか、ディレクトリが存在するか確認してください。",
                    path.display()
                )
            }
            BackupError::Crypto { message } => {
                format!(
                    "暗号化エラー: {message}\n\
                     対処法: パスフレーズが正しいか確認してください。\
                     データが改ざんされている可能性もあります。"
                )
            }
            BackupError::NotRestorable { message } => {
                format!(
                    "このバックアップは復元できません: {message}\n\
                     対処法: 別のバックアップからの復元を検討してください。"
                )
            }
            _ => self.to_string(),
        }
    }
}
