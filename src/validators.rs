/// Input validators for registration and login
///
/// Features:
/// 1. DoS protection: input length limits
/// 2. Email, username and full name format checks
/// 3. Password strength rules for new passwords
///
/// Every validator returns the normalized value on success.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::MAX_PASSWORD_BYTES;
use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_EMAIL_LOCAL_PART: usize = 64;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 30;
const MAX_FULL_NAME_LENGTH: usize = 200;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_IDENTIFIER_LENGTH: usize = 255;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "12345678", "123456789", "1234567890", "qwerty", "abc123", "password123",
    "admin123", "letmein", "welcome", "monkey", "1234567", "sunshine", "princess", "dragon",
    "passw0rd", "master", "hello", "freedom", "whatever", "qazwsx", "trustno1", "jordan23",
    "harley", "shadow", "superman", "michael", "football", "password1!", "passw0rd!",
    "p@ssw0rd", "p@ssword1", "welcome1!", "qwerty123!", "admin123!", "letmein1!",
];

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$"
    ).unwrap();

    // Alphanumeric ends, underscores and hyphens inside
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$").unwrap();
}

/// Validates an email address and returns it trimmed and lowercased
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) || has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a username: 3-30 characters, letters, digits, `_` and `-`,
/// starting and ending with a letter or digit
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if trimmed.len() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username".to_string(), MIN_USERNAME_LENGTH));
    }

    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username".to_string(), MAX_USERNAME_LENGTH));
    }

    if !USERNAME_REGEX.is_match(trimmed) || trimmed.contains("__") || trimmed.contains("--") {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates an optional full name. Empty is allowed.
pub fn is_valid_full_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.len() > MAX_FULL_NAME_LENGTH {
        return Err(ValidationError::TooLong("full_name".to_string(), MAX_FULL_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("full_name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Login identifier (email or username): only presence and length are checked,
/// so a malformed identifier fails the same way as an unknown one.
pub fn is_valid_identifier(identifier: &str) -> Result<String, ValidationError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("identifier".to_string()));
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong("identifier".to_string(), MAX_IDENTIFIER_LENGTH));
    }

    Ok(trimmed.to_string())
}

/// Password strength requirements for new passwords:
/// - 8 characters up to 72 bytes, the most bcrypt reads
/// - at least one uppercase, one lowercase, one digit and one special character
/// - not a well-known weak password
pub fn is_strong_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }

    // bcrypt ignores everything past 72 bytes
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES));
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !has_upper {
        return Err(weak("must contain at least one uppercase letter"));
    }
    if !has_lower {
        return Err(weak("must contain at least one lowercase letter"));
    }
    if !has_digit {
        return Err(weak("must contain at least one digit"));
    }
    if !has_special {
        return Err(weak("must contain at least one special character"));
    }

    if COMMON_PASSWORDS
        .iter()
        .any(|common| common.eq_ignore_ascii_case(password))
    {
        return Err(weak("is too common"));
    }

    Ok(())
}

fn weak(reason: &str) -> ValidationError {
    ValidationError::WeakPassword(reason.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if email.matches('@').count() != 1 || email.contains('\0') || email.contains("..") {
        return true;
    }

    match email.split_once('@') {
        Some((local, _)) => {
            local.len() > MAX_EMAIL_LOCAL_PART || local.starts_with('.') || local.ends_with('.')
        }
        None => true,
    }
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    // Excessive special characters
    let special_char_count = name
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '\'')
        })
        .count();

    special_char_count > 5
}
