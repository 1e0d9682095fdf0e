//! Account field rules used by sign-up and the operator CLI.

use crate::domain::error::DomainError;

pub const USERNAME_MAX_CHARS: usize = 150;
pub const NAME_MAX_CHARS: usize = 150;
pub const EMAIL_MAX_CHARS: usize = 254;
pub const PASSWORD_MIN_CHARS: usize = 8;

pub fn validate_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username", "This field is required."));
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(DomainError::validation(
            "username",
            format!("Ensure this value has at most {USERNAME_MAX_CHARS} characters."),
        ));
    }
    let allowed = username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'));
    if !allowed {
        return Err(DomainError::validation(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(username.to_string())
}

pub fn validate_name(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(DomainError::validation(
            field,
            format!("Ensure this value has at most {NAME_MAX_CHARS} characters."),
        ));
    }
    Ok(name.to_string())
}

/// A deliberately loose address check: one `@`, a non-empty local part and a
/// dotted domain without whitespace.
pub fn validate_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(DomainError::validation("email", "This field is required."));
    }

    let invalid = || DomainError::validation("email", "Enter a valid email address.");
    if email.chars().count() > EMAIL_MAX_CHARS || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = !domain.contains('@')
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok {
        return Err(invalid());
    }

    Ok(email.to_string())
}

/// Check the two password entries of a sign-up form.
pub fn validate_new_password(password1: &str, password2: &str) -> Result<(), DomainError> {
    if password1.is_empty() {
        return Err(DomainError::validation("password1", "This field is required."));
    }
    if password1 != password2 {
        return Err(DomainError::validation(
            "password2",
            "The two password fields didn't match.",
        ));
    }
    if password1.chars().count() < PASSWORD_MIN_CHARS {
        return Err(DomainError::validation(
            "password2",
            format!(
                "This password is too short. It must contain at least {PASSWORD_MIN_CHARS} characters."
            ),
        ));
    }
    if password1.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(DomainError::validation(
            "password2",
            "This password is entirely numeric.",
        ));
    }
    Ok(())
}
