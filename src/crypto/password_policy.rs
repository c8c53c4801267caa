// src/crypto/password_policy.rs
// Advisory passphrase validation: hard minimums plus non-enforcing warnings.

use crate::error::{BackupError, Result};
use rand::Rng;

/// Minimum passphrase length
pub const MIN_PASSPHRASE_LENGTH: usize = 12;

/// Character set used for generated passphrases
const PASSPHRASE_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";

/// Validate passphrase strength.
///
/// Hard requirements (rejection): at least 12 characters, containing
/// uppercase, lowercase and digits. Missing special characters only
/// produce a warning, never a rejection.
///
/// # Errors
///
/// Returns `BackupError::Config` when a hard requirement is violated.
/// On success returns the list of advisory warnings (possibly empty).
pub fn validate_passphrase(passphrase: &str) -> Result<Vec<String>> {
    if passphrase.chars().count() < MIN_PASSPHRASE_LENGTH {
        return Err(BackupError::config(format!(
            "パスフレーズは最低{MIN_PASSPHRASE_LENGTH}文字必要です"
        )));
    }

    let has_upper = passphrase.chars().any(|c| c.is_uppercase());
    let has_lower = passphrase.chars().any(|c| c.is_lowercase());
    let has_digit = passphrase.chars().any(|c| c.is_ascii_digit());
    let has_special = passphrase.chars().any(|c| !c.is_alphanumeric());

    if !(has_upper && has_lower && has_digit) {
        return Err(BackupError::config(
            "パスフレーズには大文字・小文字・数字を含めてください",
        ));
    }

    let mut warnings = Vec::new();
    if !has_special {
        warnings.push("パスフレーズに記号が含まれていません（推奨）".to_string());
    }

    Ok(warnings)
}

/// Generate a random passphrase satisfying the policy.
#[must_use]
pub fn generate_passphrase(length: usize) -> String {
    let length = length.max(MIN_PASSPHRASE_LENGTH);
    let mut rng = rand::rng();

    loop {
        let candidate: String = (0..length)
            .map(|_| {
                let idx = rng.random_range(0..PASSPHRASE_CHARSET.len());
                PASSPHRASE_CHARSET[idx] as char
            })
            .collect();

        // Reroll until the hard requirements hold (a few iterations at most)
        if validate_passphrase(&candidate).is_ok() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_rejected() {
        assert!(validate_passphrase("Ab1!").is_err());
    }

    #[test]
    fn test_missing_character_classes_rejected() {
        // no uppercase
        assert!(validate_passphrase("lowercase12345").is_err());
        // no digit
        assert!(validate_passphrase("NoDigitsHereAtAll").is_err());
    }

    #[test]
    fn test_missing_special_is_warning_only() {
        let warnings = validate_passphrase("Abcdefgh12345").unwrap();
        assert_eq!(warnings.len(), 1);

        let warnings = validate_passphrase("Abcdefgh1234!").unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_generated_passphrase_passes_policy() {
        for _ in 0..10 {
            let passphrase = generate_passphrase(20);
            assert_eq!(passphrase.chars().count(), 20);
            assert!(validate_passphrase(&passphrase).is_ok());
        }
    }
}
