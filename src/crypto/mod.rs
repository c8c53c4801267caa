//! # 暗号化モジュール
//!
//! AES-256-GCM認証付き暗号化とPBKDF2鍵導出を提供します。
//!
//! # モジュール構成
//!
//! - **[`encryption`]**: チャンクコンテナ（`SCRAT001`）の暗号化・復号化
//! - **[`key_management`]**: パスフレーズからの鍵導出・saltの生成
//! - **[`password_policy`]**: パスフレーズ強度の検証（勧告的）

pub mod encryption;
pub mod key_management;
pub mod password_policy;

pub use encryption::{Encryptor, DEFAULT_CHUNK_SIZE, MAGIC, NONCE_SIZE, TAG_SIZE};
pub use key_management::{KeyDerivation, MasterKey, KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};
pub use password_policy::{generate_passphrase, validate_passphrase, MIN_PASSPHRASE_LENGTH};
