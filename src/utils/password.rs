use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::errors::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "admin123", "welcome1", "letmein1",
    "abc12345", "football", "baseball", "sunshine", "princess", "passw0rd",
];

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::InternalServerError("Hashing error".to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            log::error!("Stored password hash is malformed: {}", err);
            false
        }
    }
}

/// Password rules applied on registration and password change. Returns every
/// violated rule so the client sees them all at once.
pub fn password_problems(password: &str, username: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }
    let username = username.to_lowercase();
    if username.len() >= 3 && (lowered.contains(&username) || username.contains(&lowered)) {
        problems.push("The password is too similar to the username.".to_string());
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn strong_password_passes() {
        assert!(password_problems("Tr1cky-Zebra", "nurse.joy").is_empty());
    }

    #[test]
    fn weak_passwords_report_each_rule() {
        let problems = password_problems("1234567", "bob");
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("too short"));
        assert!(problems[1].contains("entirely numeric"));

        assert_eq!(password_problems("Password", "bob"), vec!["This password is too common."]);
        assert_eq!(
            password_problems("drhouse2024", "drhouse"),
            vec!["The password is too similar to the username."]
        );
    }
}
