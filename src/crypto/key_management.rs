//! # キー管理システム
//!
//! パスフレーズからの安全な鍵導出とマスターキー管理を提供します。
//!
//! 鍵導出は PBKDF2-HMAC-SHA256（100,000回反復、32バイト出力）で行います。
//! saltはバックアップごとに新規生成され、BackupRecordに永続化されるため、
//! リストア時に同じパスフレーズ＋saltから同一の鍵を再導出できます。

use crate::error::{BackupError, Result};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// saltのサイズ（バイト）
pub const SALT_SIZE: usize = 32;
/// 導出される鍵のサイズ（バイト）
pub const KEY_SIZE: usize = 32;
/// PBKDF2の反復回数
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// マスターキー（32バイト）
///
/// Drop時に鍵素材をゼロクリアします。
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// バイト配列からマスターキーを作成
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { key: bytes }
    }

    /// キーのバイト配列を取得
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// 鍵のSHA-256ハッシュ（hex文字列）を取得
    ///
    /// パスフレーズ不一致を暗号文に触れる前に検出するため、
    /// BackupRecordに保存されます。
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(Sha256::digest(self.key))
    }
}

/// キー導出エンジン
///
/// 1つの（パスフレーズ, salt）ペアから決定的に32バイト鍵を導出します。
pub struct KeyDerivation {
    iterations: u32,
}

impl KeyDerivation {
    /// 反復回数を指定してキー導出エンジンを作成（テスト用途）
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// パスフレーズとsaltからマスターキーを導出
    ///
    /// # エラー
    ///
    /// * saltの長さが32バイトでない場合 (`BackupError::Crypto`)
    pub fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<MasterKey> {
        if salt.len() != SALT_SIZE {
            return Err(BackupError::crypto(format!(
                "saltは{SALT_SIZE}バイトである必要があります（実際: {}バイト）",
                salt.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut key);
        Ok(MasterKey::from_bytes(key))
    }

    /// ランダムなsalt（32バイト）を生成
    #[must_use]
    pub fn generate_salt() -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);
        salt
    }
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_deterministic() {
        let kd = KeyDerivation::with_iterations(1000);
        let salt = KeyDerivation::generate_salt();

        let key1 = kd.derive_key("test_passphrase_123", &salt).unwrap();
        let key2 = kd.derive_key("test_passphrase_123", &salt).unwrap();

        // 同じパスフレーズ・saltからは同じキーが生成される
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        // 異なるsaltからは異なるキーが生成される
        let salt2 = KeyDerivation::generate_salt();
        let key3 = kd.derive_key("test_passphrase_123", &salt2).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());
    }

    #[test]
    fn test_key_derivation_rejects_short_salt() {
        let kd = KeyDerivation::default();
        let result = kd.derive_key("passphrase", &[0u8; 16]);
        assert!(result.is_err());
    }

    #[test]
    fn test_salt_uniqueness() {
        let salt1 = KeyDerivation::generate_salt();
        let salt2 = KeyDerivation::generate_salt();
        assert_ne!(salt1, salt2);
        assert_eq!(salt1.len(), SALT_SIZE);
    }

    #[test]
    fn test_key_hash_hex() {
        let key = MasterKey::from_bytes([7u8; 32]);
        let hash = key.hash_hex();

        // SHA-256のhexは64文字
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        // 同一鍵からは同一ハッシュ
        assert_eq!(hash, MasterKey::from_bytes([7u8; 32]).hash_hex());
    }
}
