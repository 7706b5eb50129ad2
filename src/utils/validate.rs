use crate::utils::errorhandler::AppError;

pub fn min_len(field: &str, value: &str, min: usize, message: &str) -> Result<(), AppError> {
    if value.trim().chars().count() < min {
        return Err(AppError::invalid_field(field, message));
    }
    Ok(())
}

/// Loose shape check: one `@`, non-empty local part, dotted domain.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

pub fn email(field: &str, value: &str) -> Result<(), AppError> {
    if !is_email(value) {
        return Err(AppError::invalid_field(field, "Invalid email address"));
    }
    Ok(())
}

/// Empty strings become `None`; anything else must be a valid address.
pub fn optional_email(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            email(field, &v)?;
            Ok(Some(v.to_lowercase()))
        }
    }
}

pub fn positive_cents(field: &str, value: Option<i64>) -> Result<(), AppError> {
    match value {
        Some(v) if v <= 0 => Err(AppError::invalid_field(field, "Amount must be positive")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_email("jane@example.com"));
        assert!(is_email("j.doe+quotes@mail.example.com.au"));
        assert!(!is_email("jane"));
        assert!(!is_email("jane@localhost"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("jane@@example.com"));
        assert!(!is_email("jane doe@example.com"));
        assert!(!is_email("jane@example..com"));
    }

    #[test]
    fn empty_optional_email_is_none() {
        assert_eq!(optional_email("email", Some("  ".into())).unwrap(), None);
        assert_eq!(
            optional_email("email", Some("Jane@Example.com".into())).unwrap(),
            Some("jane@example.com".into())
        );
        assert!(optional_email("email", Some("nope".into())).is_err());
    }

    #[test]
    fn min_len_counts_trimmed_chars() {
        assert!(min_len("title", "  ab ", 3, "Title is required").is_err());
        assert!(min_len("title", "abc", 3, "Title is required").is_ok());
    }
}
