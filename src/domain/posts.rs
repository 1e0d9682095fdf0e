//! Post and comment text rules.

use crate::domain::error::DomainError;

pub const POST_TEXT_MAX_CHARS: usize = 200;
pub const GROUP_TITLE_MAX_CHARS: usize = 200;
pub const PREVIEW_CHARS: usize = 15;

/// First [`PREVIEW_CHARS`] characters of `text`, counted in chars rather than bytes.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Trim and check post text: required, at most [`POST_TEXT_MAX_CHARS`] characters.
pub fn validate_post_text(raw: &str) -> Result<String, DomainError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(DomainError::validation("text", "This field is required."));
    }

    let length = text.chars().count();
    if length > POST_TEXT_MAX_CHARS {
        return Err(DomainError::validation(
            "text",
            format!(
                "Ensure this value has at most {POST_TEXT_MAX_CHARS} characters (it has {length})."
            ),
        ));
    }

    Ok(text.to_string())
}

pub fn validate_comment_text(raw: &str) -> Result<String, DomainError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(DomainError::validation("text", "This field is required."));
    }
    Ok(text.to_string())
}

pub fn validate_group_title(raw: &str) -> Result<String, DomainError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title", "This field is required."));
    }
    if title.chars().count() > GROUP_TITLE_MAX_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("Ensure this value has at most {GROUP_TITLE_MAX_CHARS} characters."),
        ));
    }
    Ok(title.to_string())
}
