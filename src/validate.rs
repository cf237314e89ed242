use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ThinkoraError};

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("static email regex")
    })
}

fn invalid(msg: &str) -> ThinkoraError {
    ThinkoraError::Validation(msg.to_string())
}

pub fn email(value: &str) -> Result<()> {
    if email_re().is_match(value.trim()) {
        Ok(())
    } else {
        Err(invalid("Invalid email address"))
    }
}

pub fn password(value: &str) -> Result<()> {
    if value.chars().count() < 8 {
        return Err(invalid("Password must be at least 8 character long"));
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("Password must contain at least one uppercase letter"));
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid("Password must contain at least one lowercase letter"));
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain at least one number"));
    }
    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("Password must contain at least one special character"));
    }
    Ok(())
}

pub fn username(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid("Username must be at least 2 character long"));
    }
    Ok(())
}

pub fn sign_in(email_value: &str, password_value: &str) -> Result<()> {
    email(email_value)?;
    password(password_value)
}

pub fn sign_up(username_value: &str, email_value: &str, password_value: &str) -> Result<()> {
    username(username_value)?;
    sign_in(email_value, password_value)
}

/// Trimmed prompt, rejected when blank.
pub fn prompt(value: &str) -> Result<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(invalid("Prompt must not be empty"))
    } else {
        Ok(trimmed)
    }
}
