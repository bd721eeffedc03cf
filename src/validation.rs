//! Credential form rules, checked before anything reaches the backend

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FieldErrors;

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("static email pattern"));

fn check_email(email: &str, errors: &mut FieldErrors) {
    if email.trim().is_empty() {
        errors.insert("email".to_string(), "Email is required".to_string());
    } else if !EMAIL_SHAPE.is_match(email) {
        errors.insert("email".to_string(), "Email is invalid".to_string());
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_email(email, &mut errors);
    if password.is_empty() {
        errors.insert("password".to_string(), "Password is required".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_signup(email: &str, password: &str, name: &str, min_password_length: usize) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if name.trim().is_empty() {
        errors.insert("name".to_string(), "Name is required".to_string());
    }
    check_email(email, &mut errors);
    if password.is_empty() {
        errors.insert("password".to_string(), "Password is required".to_string());
    } else if password.chars().count() < min_password_length {
        errors.insert(
            "password".to_string(),
            format!("Password must be at least {} characters", min_password_length),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_both_fields() {
        let errors = validate_login("", "").unwrap_err();
        assert_eq!(errors["email"], "Email is required");
        assert_eq!(errors["password"], "Password is required");
        assert!(validate_login("a@b.co", "x").is_ok());
    }

    #[test]
    fn signup_checks_shape_and_length() {
        let errors = validate_signup("not-an-email", "12345", "", 6).unwrap_err();
        assert_eq!(errors["name"], "Name is required");
        assert_eq!(errors["email"], "Email is invalid");
        assert_eq!(errors["password"], "Password must be at least 6 characters");

        assert!(validate_signup("new@x.com", "pw123456", "New User", 6).is_ok());
    }
}
