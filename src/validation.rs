//! Input validation for the auth forms.
//!
//! Each validator either returns normalized input or the full set of field
//! errors, keyed by the same field names the client submitted.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{FieldErrors, SignInRequest, SignUpRequest};

const NAME_MAX_CHARS: usize = 100;
const PASSWORD_MIN_CHARS: usize = 6;
const TOKEN_MAX_CHARS: usize = 256;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEmailInput {
    pub email: String,
    pub token: String,
}

/// Normalize an email for lookup and uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic shape check on an already-normalized email.
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

pub fn validate_sign_up(request: &SignUpRequest) -> Result<SignUpInput, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name_len = request.name.chars().count();
    if name_len == 0 {
        push(&mut errors, "name", "Name is required");
    } else if name_len > NAME_MAX_CHARS {
        push(&mut errors, "name", "Name is too long");
    }

    let email = check_email(&request.email, &mut errors);

    if request.password.chars().count() < PASSWORD_MIN_CHARS {
        push(
            &mut errors,
            "password",
            "Password must be at least 6 characters",
        );
    }
    if request.confirm_password.is_empty() {
        push(
            &mut errors,
            "confirmPassword",
            "Please confirm your password",
        );
    }

    // The equality check only runs once every field is individually valid.
    if errors.is_empty() && request.password != request.confirm_password {
        push(&mut errors, "confirmPassword", "Passwords do not match");
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(SignUpInput {
        name: request.name.clone(),
        email,
        password: request.password.clone(),
    })
}

pub fn validate_sign_in(request: &SignInRequest) -> Result<SignInInput, FieldErrors> {
    let mut errors = FieldErrors::new();
    let email = check_email(&request.email, &mut errors);
    if request.password.is_empty() {
        push(&mut errors, "password", "Password is required");
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(SignInInput {
        email,
        password: request.password.clone(),
    })
}

pub fn validate_verify_email(email: &str, token: &str) -> Result<VerifyEmailInput, FieldErrors> {
    let mut errors = FieldErrors::new();
    let email = check_email(email, &mut errors);

    let token_len = token.chars().count();
    if token_len == 0 {
        push(&mut errors, "token", "Token is required");
    } else if token_len > TOKEN_MAX_CHARS {
        push(&mut errors, "token", "Token is too long");
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(VerifyEmailInput {
        email,
        token: token.to_string(),
    })
}

fn check_email(raw: &str, errors: &mut FieldErrors) -> String {
    let email = normalize_email(raw);
    if email.is_empty() {
        push(errors, "email", "Email is required");
    } else if !valid_email(&email) {
        push(errors, "email", "Invalid email");
    }
    email
}

fn push(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up(name: &str, email: &str, password: &str, confirm: &str) -> SignUpRequest {
        SignUpRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
        assert!(!valid_email("no-at-sign.example.com"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@example.com"));
    }

    #[test]
    fn sign_up_accepts_and_normalizes() {
        let input = validate_sign_up(&sign_up("Ada", " Ada@Example.com", "secret1", "secret1"))
            .expect("valid input");
        assert_eq!(input.email, "ada@example.com");
        assert_eq!(input.name, "Ada");
    }

    #[test]
    fn sign_up_reports_every_field() {
        let errors = validate_sign_up(&sign_up("", "", "123", "")).unwrap_err();
        assert_eq!(errors["name"], vec!["Name is required"]);
        assert_eq!(errors["email"], vec!["Email is required"]);
        assert_eq!(errors["password"], vec!["Password must be at least 6 characters"]);
        assert_eq!(errors["confirmPassword"], vec!["Please confirm your password"]);
    }

    #[test]
    fn sign_up_rejects_long_name_and_bad_email() {
        let long_name = "x".repeat(101);
        let errors =
            validate_sign_up(&sign_up(&long_name, "nope", "secret1", "secret1")).unwrap_err();
        assert_eq!(errors["name"], vec!["Name is too long"]);
        assert_eq!(errors["email"], vec!["Invalid email"]);
        assert!(!errors.contains_key("confirmPassword"));
    }

    #[test]
    fn sign_up_mismatch_is_reported_on_confirm_field() {
        let errors =
            validate_sign_up(&sign_up("Ada", "ada@example.com", "secret1", "secret2")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["confirmPassword"], vec!["Passwords do not match"]);
    }

    #[test]
    fn sign_in_requires_password() {
        let errors = validate_sign_in(&SignInRequest {
            email: "ada@example.com".to_string(),
            password: String::new(),
        })
        .unwrap_err();
        assert_eq!(errors["password"], vec!["Password is required"]);
        assert!(!errors.contains_key("email"));
    }

    #[test]
    fn verify_email_bounds_token() {
        assert!(validate_verify_email("ada@example.com", "abc").is_ok());
        let missing = validate_verify_email("ada@example.com", "").unwrap_err();
        assert_eq!(missing["token"], vec!["Token is required"]);
        let long = validate_verify_email("ada@example.com", &"t".repeat(257)).unwrap_err();
        assert_eq!(long["token"], vec!["Token is too long"]);
    }
}
