//! E.164 phone number validation and canonicalization.

use promptpipe_core::PromptPipeError;

/// Validate a raw recipient and return its canonical E.164 form.
///
/// Accepts separators (spaces, dashes, dots, parentheses) around the
/// digits; requires a leading `+` and 8 to 15 digits.
pub fn validate_and_canonicalize(raw: &str) -> Result<String, PromptPipeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PromptPipeError::Validation("empty recipient".into()));
    }

    let mut digits = String::new();
    let mut saw_plus = false;
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '+' if i == 0 => saw_plus = true,
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(PromptPipeError::Validation(format!(
                    "invalid character {c:?} in recipient"
                )))
            }
        }
    }

    if !saw_plus {
        return Err(PromptPipeError::Validation(
            "recipient must start with '+' and a country code".into(),
        ));
    }
    if digits.len() < 8 || digits.len() > 15 {
        return Err(PromptPipeError::Validation(format!(
            "recipient must have 8-15 digits, got {}",
            digits.len()
        )));
    }
    if digits.starts_with('0') {
        return Err(PromptPipeError::Validation(
            "country code cannot start with 0".into(),
        ));
    }

    Ok(format!("+{digits}"))
}
