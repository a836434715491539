//! Client-side validation, run before any request is issued.

use once_cell::sync::Lazy;
use regex::Regex;
use ride_api::{ChangePasswordRequest, LoginRequest, SignupRequest};

use crate::error::{ClientError, ClientResult};

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static OTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]{3,30}$").unwrap());

fn required<'a>(value: &'a str, label: &str) -> ClientResult<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ClientError::validation(format!("{label} is required")));
    }
    Ok(v)
}

fn password_pair(password: &str, confirm: &str) -> ClientResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(ClientError::validation("Passwords do not match"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> ClientResult<&str> {
    let email = required(email, "Email")?;
    if !EMAIL_RE.is_match(email) {
        return Err(ClientError::validation("Enter a valid email address"));
    }
    Ok(email)
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> ClientResult<LoginRequest> {
        let username = required(&self.username, "Username")?;
        // passwords are sent as typed
        if self.password.is_empty() {
            return Err(ClientError::validation("Password is required"));
        }
        Ok(LoginRequest {
            username: username.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn validate(&self) -> ClientResult<SignupRequest> {
        let username = required(&self.username, "Username")?;
        if !USERNAME_RE.is_match(username) {
            return Err(ClientError::validation(
                "Username must be 3-30 letters, digits, '_' or '.'",
            ));
        }
        let fullname = required(&self.fullname, "Full name")?;
        let email = validate_email(&self.email)?;
        password_pair(&self.password, &self.confirm_password)?;
        Ok(SignupRequest {
            username: username.to_string(),
            fullname: fullname.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordForm {
    pub fn validate(&self) -> ClientResult<ChangePasswordRequest> {
        if self.old_password.is_empty() {
            return Err(ClientError::validation("Current password is required"));
        }
        password_pair(&self.new_password, &self.confirm_password)?;
        if self.new_password == self.old_password {
            return Err(ClientError::validation(
                "New password must differ from the current one",
            ));
        }
        Ok(ChangePasswordRequest {
            old_password: self.old_password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}

pub fn validate_otp(code: &str) -> ClientResult<&str> {
    let code = code.trim();
    if !OTP_RE.is_match(code) {
        return Err(ClientError::validation("Enter the 6-digit code"));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_both_fields() {
        let err = LoginForm::default().validate().unwrap_err();
        assert_eq!(err.to_string(), "Username is required");
        let err = LoginForm {
            username: "  ana ".into(),
            password: String::new(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Password is required");
        let req = LoginForm {
            username: "  ana ".into(),
            password: "pw".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(req.username, "ana");
    }

    #[test]
    fn signup_checks_length_and_match() {
        let mut form = SignupForm {
            username: "ana_l".into(),
            fullname: "Ana Lima".into(),
            email: "ana@campus.edu".into(),
            password: "short".into(),
            confirm_password: "short".into(),
        };
        assert!(form.validate().unwrap_err().to_string().contains("at least 8"));
        form.password = "longenough".into();
        form.confirm_password = "longenougH".into();
        assert_eq!(form.validate().unwrap_err().to_string(), "Passwords do not match");
        form.confirm_password = "longenough".into();
        assert!(form.validate().is_ok());
        form.email = "ana@campus".into();
        assert!(form.validate().is_err());
    }

    #[test]
    fn change_password_rejects_reuse() {
        let form = ChangePasswordForm {
            old_password: "password1".into(),
            new_password: "password1".into(),
            confirm_password: "password1".into(),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn otp_is_six_digits() {
        assert!(validate_otp("123456").is_ok());
        assert!(validate_otp(" 123456 ").is_ok());
        assert!(validate_otp("12345").is_err());
        assert!(validate_otp("12a456").is_err());
    }
}
