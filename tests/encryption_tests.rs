// encryption_tests.rs - Encryptor コンテナ形式の統合テスト

use scrat_backup::crypto::{Encryptor, MAGIC, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

fn encryptor(passphrase: &str) -> Encryptor {
    Encryptor::with_salt(passphrase, &[7u8; SALT_SIZE]).unwrap()
}

// =============================================================================
// Test 1: チャンクサイズはヘッダーに永続化され、再エンコードでラウンドトリップする
// =============================================================================

#[test]
fn test_chunk_size_persisted_in_header_roundtrips() {
    let enc = encryptor("pw").with_chunk_size(1234);
    let original: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

    let mut container = Vec::new();
    enc.encrypt_stream(Cursor::new(&original), &mut container)
        .unwrap();

    // ヘッダーのチャンクサイズ = 書き込み時の設定
    assert_eq!(&container[..8], MAGIC);
    let header_chunk_size = u32::from_be_bytes(container[8..12].try_into().unwrap());
    assert_eq!(header_chunk_size, 1234);

    // 読み手は帯域外の情報なしで復号できる
    let reader = encryptor("pw");
    let mut decrypted = Vec::new();
    reader
        .decrypt_stream(Cursor::new(&container), &mut decrypted)
        .unwrap();
    assert_eq!(decrypted, original);

    // 復号結果を別のチャンクサイズで再エンコードしても内容は不変
    let re_encoder = encryptor("pw").with_chunk_size(4096);
    let mut re_encoded = Vec::new();
    re_encoder
        .encrypt_stream(Cursor::new(&decrypted), &mut re_encoded)
        .unwrap();
    assert_eq!(
        u32::from_be_bytes(re_encoded[8..12].try_into().unwrap()),
        4096
    );

    let mut final_bytes = Vec::new();
    reader
        .decrypt_stream(Cursor::new(&re_encoded), &mut final_bytes)
        .unwrap();
    assert_eq!(final_bytes, original);
}

// =============================================================================
// Test 2: 各チャンクは独立したnonceを持つ
// =============================================================================

#[test]
fn test_each_chunk_has_fresh_nonce() {
    let enc = encryptor("pw").with_chunk_size(16);
    let data = [0u8; 48]; // 16バイトチャンク×3

    let mut container = Vec::new();
    enc.encrypt_stream(Cursor::new(&data), &mut container).unwrap();

    // ヘッダーをスキップしてチャンクのnonceを収集
    let mut nonces = Vec::new();
    let mut offset = 12;
    loop {
        let ct_len =
            u32::from_be_bytes(container[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if ct_len == 0 {
            break;
        }
        nonces.push(container[offset..offset + NONCE_SIZE].to_vec());
        offset += NONCE_SIZE + ct_len;
    }

    assert_eq!(nonces.len(), 3);
    assert_ne!(nonces[0], nonces[1]);
    assert_ne!(nonces[1], nonces[2]);
    assert_ne!(nonces[0], nonces[2]);
}

// =============================================================================
// Test 3: 同一（パスフレーズ, salt）から導出される鍵は同一
// =============================================================================

#[test]
fn test_same_passphrase_and_salt_yield_same_key() {
    let enc1 = Encryptor::new("Stable-Passphrase-9").unwrap();
    let salt = *enc1.salt();

    let enc2 = Encryptor::with_salt("Stable-Passphrase-9", &salt).unwrap();
    assert_eq!(enc1.key_hash(), enc2.key_hash());

    // 別saltでは異なる鍵
    let enc3 = Encryptor::new("Stable-Passphrase-9").unwrap();
    assert_ne!(enc1.key_hash(), enc3.key_hash());
}

// =============================================================================
// Test 4: 大きなファイルの複数チャンク暗号化・復号（ファイルAPI）
// =============================================================================

#[test]
fn test_multi_chunk_file_roundtrip() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("large.bin");
    let container = temp.path().join("large.bin.enc");
    let output = temp.path().join("restored.bin");

    // 64KiBチャンクで5チャンク強になるデータ
    let data: Vec<u8> = (0..350_000u32).map(|i| (i % 256) as u8).collect();
    fs::write(&input, &data).unwrap();

    let enc = encryptor("pw").with_chunk_size(64 * 1024);
    let written = enc.encrypt_file(&input, &container).unwrap();
    assert_eq!(written, data.len() as u64);

    // コンテナは チャンクごとの (len + nonce + tag) とヘッダー分だけ大きい
    let container_size = fs::metadata(&container).unwrap().len();
    let chunks = data.len().div_ceil(64 * 1024) as u64;
    let expected = 12 + data.len() as u64 + chunks * (4 + NONCE_SIZE as u64 + TAG_SIZE as u64) + 4;
    assert_eq!(container_size, expected);

    enc.decrypt_file(&container, &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), data);
}

// =============================================================================
// Test 5: レガシーコンテナのファイルAPI復号
// =============================================================================

#[test]
fn test_legacy_file_decodes() {
    let temp = TempDir::new().unwrap();
    let enc = encryptor("pw");

    let plaintext = b"single blob legacy container";
    let (ciphertext, nonce) = enc.encrypt_bytes(plaintext, None).unwrap();

    let legacy_path = temp.path().join("legacy.enc");
    let mut blob = nonce.to_vec();
    blob.extend_from_slice(&ciphertext);
    fs::write(&legacy_path, &blob).unwrap();

    let output = temp.path().join("out.bin");
    enc.decrypt_file(&legacy_path, &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), plaintext.as_slice());
}

// =============================================================================
// Test 6: 短すぎるレガシーコンテナは拒否される
// =============================================================================

#[test]
fn test_undersized_legacy_container_rejected() {
    let enc = encryptor("pw");
    let mut output = Vec::new();
    // nonce(12) + tag(16) 未満
    let result = enc.decrypt_stream(Cursor::new(&[0u8; 20]), &mut output);
    assert!(result.is_err());
}
