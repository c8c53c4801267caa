//! # AES-256-GCM 暗号化エンジン
//!
//! 認証付き暗号化と自己記述型チャンクコンテナ（`SCRAT001`）を提供します。
//!
//! # ファイルコンテナ形式
//!
//! ```text
//! magic:      8バイト = ASCII "SCRAT001"
//! chunk_size: 4バイト ビッグエンディアン u32（チャンクあたりの平文バイト数）
//! 繰り返し（終端まで）:
//!     ct_len:     4バイト ビッグエンディアン u32（0なら終端）
//!     nonce:      12バイト
//!     ciphertext: ct_lenバイト（GCM認証タグを含む）
//! ```
//!
//! 各チャンクは独立したAEAD操作で、毎回新しいランダムnonceを使用します。
//! 先頭8バイトがmagicでないファイルはレガシー形式
//! （`nonce(12) || ciphertext`の単一AEADブロブ）として復号されます。
//! 新規の書き込みは常にチャンク形式です。

use super::key_management::{KeyDerivation, MasterKey, SALT_SIZE};
use crate::error::{BackupError, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// コンテナのマジックナンバー
pub const MAGIC: &[u8; 8] = b"SCRAT001";
/// nonceのサイズ（バイト、GCM標準の96ビット）
pub const NONCE_SIZE: usize = 12;
/// GCM認証タグのサイズ（バイト）
pub const TAG_SIZE: usize = 16;
/// 書き込み時のデフォルトチャンクサイズ（64MiB）
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// AES-256-GCM 暗号化エンジン
///
/// 1つの（パスフレーズ, salt）ペアに束縛されます。saltは初回利用時
/// （新規バックアップ）に生成され、BackupRecordに永続化されるため、
/// リストア側は同じパスフレーズから同一の鍵を再構築できます。
pub struct Encryptor {
    key: MasterKey,
    salt: [u8; SALT_SIZE],
    chunk_size: u32,
}

impl Encryptor {
    /// 新しいsaltでEncryptorを作成（新規バックアップ用）
    pub fn new(passphrase: &str) -> Result<Self> {
        let salt = KeyDerivation::generate_salt();
        Self::with_salt(passphrase, &salt)
    }

    /// 既存のsaltでEncryptorを作成（リストア用）
    ///
    /// # エラー
    ///
    /// * saltの長さが32バイトでない場合 (`BackupError::Crypto`)
    pub fn with_salt(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let key = KeyDerivation::default().derive_key(passphrase, salt)?;
        let mut salt_bytes = [0u8; SALT_SIZE];
        salt_bytes.copy_from_slice(salt);
        Ok(Self {
            key,
            salt: salt_bytes,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// 書き込みチャンクサイズを変更（テスト・チューニング用）
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// このインスタンスのsaltを取得
    #[must_use]
    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    /// 導出鍵のSHA-256ハッシュ（hex文字列）を取得
    ///
    /// BackupRecordに保存され、リストア時のパスフレーズ不一致を
    /// 暗号文に触れる前に検出するために使用されます。
    #[must_use]
    pub fn key_hash(&self) -> String {
        self.key.hash_hex()
    }

    /// ランダムなnonceを生成
    fn generate_nonce() -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);
        nonce
    }

    /// バイト列を暗号化
    ///
    /// # 引数
    ///
    /// * `plaintext` - 暗号化するデータ
    /// * `nonce` - 使用するnonce（`None`なら新規生成）
    ///
    /// # 戻り値
    ///
    /// （認証タグを含む暗号文, 使用したnonce）のタプル
    ///
    /// # エラー
    ///
    /// * 指定されたnonceの長さが12バイトでない場合 (`BackupError::Crypto`)
    /// - AES-256-GCM暗号化処理が失敗した場合 (`BackupError::Crypto`)
    #[allow(deprecated)]
    pub fn encrypt_bytes(
        &self,
        plaintext: &[u8],
        nonce: Option<&[u8]>,
    ) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
        let nonce_bytes = match nonce {
            Some(n) => {
                if n.len() != NONCE_SIZE {
                    return Err(BackupError::crypto(format!(
                        "nonceは{NONCE_SIZE}バイトである必要があります（実際: {}バイト）",
                        n.len()
                    )));
                }
                let mut bytes = [0u8; NONCE_SIZE];
                bytes.copy_from_slice(n);
                bytes
            }
            None => Self::generate_nonce(),
        };

        let key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(key);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| BackupError::crypto(format!("暗号化に失敗: {e}")))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// バイト列を復号化
    ///
    /// # エラー
    ///
    /// * nonceの長さが12バイトでない場合 (`BackupError::Crypto`)
    /// * 認証タグの検証に失敗した場合 (`BackupError::Crypto`)
    ///   - データが改ざんされている可能性
    ///   - 不正なパスフレーズが使用された場合
    #[allow(deprecated)]
    pub fn decrypt_bytes(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(BackupError::crypto(format!(
                "nonceは{NONCE_SIZE}バイトである必要があります（実際: {}バイト）",
                nonce.len()
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(key);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| BackupError::crypto(format!("復号化に失敗（認証エラー）: {e}")))
    }

    /// ストリームをチャンク形式で暗号化
    ///
    /// 入力をチャンク単位で読み取り・暗号化するため、数GB級のアーカイブでも
    /// メモリ使用量はチャンクサイズで抑えられます。チャンクサイズはヘッダーに
    /// 書き込まれるため、読み手への帯域外の伝達は不要です。
    ///
    /// # 戻り値
    ///
    /// 暗号化した平文の総バイト数
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        writer.write_all(MAGIC)?;
        writer.write_all(&self.chunk_size.to_be_bytes())?;

        let mut total = 0u64;
        let mut buffer = vec![0u8; self.chunk_size as usize];

        loop {
            let bytes_read = read_chunk(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            total += bytes_read as u64;

            let (ciphertext, nonce) = self.encrypt_bytes(&buffer[..bytes_read], None)?;
            writer.write_all(&(ciphertext.len() as u32).to_be_bytes())?;
            writer.write_all(&nonce)?;
            writer.write_all(&ciphertext)?;
        }

        // 終端マーカー（ct_len == 0）
        writer.write_all(&[0u8; 4])?;
        writer.flush()?;
        Ok(total)
    }

    /// ストリームを復号化（チャンク形式・レガシー形式の両対応）
    ///
    /// # エラー
    ///
    /// * コンテナが途中で切れている場合 (`BackupError::Crypto`)
    /// * チャンクの認証タグ検証に失敗した場合 (`BackupError::Crypto`)
    ///
    /// いずれの場合もコンテナ全体を復元不能として扱う必要があります。
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut header = [0u8; 8];
        let header_len = read_chunk(&mut reader, &mut header)?;

        if header_len == 8 && &header == MAGIC {
            self.decrypt_chunked(reader, writer)
        } else {
            // レガシー形式: 読み出した分も含めて nonce || ciphertext
            let mut blob = header[..header_len].to_vec();
            reader.read_to_end(&mut blob)?;
            if blob.len() < NONCE_SIZE + TAG_SIZE {
                return Err(BackupError::crypto(format!(
                    "暗号化データが短すぎます（{}バイト、最低{}バイト必要）",
                    blob.len(),
                    NONCE_SIZE + TAG_SIZE
                )));
            }
            let plaintext = self.decrypt_bytes(&blob[NONCE_SIZE..], &blob[..NONCE_SIZE])?;
            writer.write_all(&plaintext)?;
            Ok(plaintext.len() as u64)
        }
    }

    fn decrypt_chunked<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut chunk_size_bytes = [0u8; 4];
        reader
            .read_exact(&mut chunk_size_bytes)
            .map_err(|_| BackupError::crypto("コンテナヘッダーが不完全です".to_string()))?;
        let chunk_size = u32::from_be_bytes(chunk_size_bytes);

        let mut total = 0u64;
        loop {
            let mut len_bytes = [0u8; 4];
            reader
                .read_exact(&mut len_bytes)
                .map_err(|_| BackupError::crypto("終端マーカー前にEOFを検出".to_string()))?;
            let ct_len = u32::from_be_bytes(len_bytes);
            if ct_len == 0 {
                break;
            }
            // 正常なコンテナではチャンクの暗号文が平文チャンク＋タグを超えることはない
            if ct_len > chunk_size.saturating_add(TAG_SIZE as u32) {
                return Err(BackupError::crypto(format!(
                    "破損したチャンク長を検出: {ct_len}バイト"
                )));
            }

            let mut nonce = [0u8; NONCE_SIZE];
            reader
                .read_exact(&mut nonce)
                .map_err(|_| BackupError::crypto("チャンクnonceの読み取りに失敗".to_string()))?;

            let mut ciphertext = vec![0u8; ct_len as usize];
            reader
                .read_exact(&mut ciphertext)
                .map_err(|_| BackupError::crypto("チャンク本体の読み取りに失敗".to_string()))?;

            let plaintext = self.decrypt_bytes(&ciphertext, &nonce)?;
            writer.write_all(&plaintext)?;
            total += plaintext.len() as u64;
        }

        Ok(total)
    }

    /// ファイルをチャンク形式で暗号化
    ///
    /// # エラー
    ///
    /// * 入力ファイルが存在しない場合 (`BackupError::Io`)
    /// * 暗号化・書き込みに失敗した場合
    pub fn encrypt_file(&self, input_path: &Path, output_path: &Path) -> Result<u64> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let reader = BufReader::new(File::open(input_path)?);
        let writer = BufWriter::new(File::create(output_path)?);
        let total = self.encrypt_stream(reader, writer)?;

        log::debug!(
            "暗号化完了: {} ({total}バイト)",
            output_path.display()
        );
        Ok(total)
    }

    /// ファイルを復号化（チャンク形式・レガシー形式の両対応）
    ///
    /// 復号は一時ファイルに書き込み、成功時のみ出力パスへリネームします。
    /// 認証エラー時に部分的な平文が残ることはありません。
    ///
    /// # エラー
    ///
    /// * 入力ファイルが存在しない場合 (`BackupError::Io`)
    /// * 認証タグの検証に失敗した場合 (`BackupError::Crypto`)
    pub fn decrypt_file(&self, input_path: &Path, output_path: &Path) -> Result<u64> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let part_path = output_path.with_extension("part");
        let reader = BufReader::new(File::open(input_path)?);
        let writer = BufWriter::new(File::create(&part_path)?);

        match self.decrypt_stream(reader, writer) {
            Ok(total) => {
                fs::rename(&part_path, output_path)?;
                log::debug!(
                    "復号化完了: {} ({total}バイト)",
                    output_path.display()
                );
                Ok(total)
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(e)
            }
        }
    }
}

/// バッファが満杯になるかEOFに達するまで読み込む
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
