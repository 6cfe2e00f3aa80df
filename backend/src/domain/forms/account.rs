//! Signup, login and profile forms.

use serde_json::Value;

use super::field::FieldSpec;
use super::form::{Form, FormSpec, ModelFormSpec};
use super::validators::{email, input_required, name, phone};
use crate::domain::document::Document;
use crate::domain::user::User;

/// Error code for a password confirmation that differs from the password.
pub const PASSWORD_MISMATCH: &str = "password_mismatch";
/// Error code for an email already bound to another account.
pub const EMAIL_OCCUPIED: &str = "email_occupied";
/// Error code for any failed login.
pub const EMAIL_OR_PASSWORD_ERROR: &str = "email_or_password_error";

/// New account form.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationForm;

impl FormSpec for RegistrationForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("name", "Name", &[name]),
        FieldSpec::text("email", "Email", &[input_required, email]),
        FieldSpec::password("password", "Password", &[input_required]),
        FieldSpec::password(
            "password_confirmation",
            "Password confirmation",
            &[input_required],
        ),
    ];
    const TEXT_ERRORS: &'static [(&'static str, &'static str)] = &[
        (PASSWORD_MISMATCH, "Password mismatch."),
        (EMAIL_OCCUPIED, "Already taken."),
    ];

    fn cross_validate(form: &Form<Self>) -> Vec<(&'static str, &'static str)> {
        if form.value("password_confirmation") == form.value("password") {
            Vec::new()
        } else {
            vec![("password_confirmation", PASSWORD_MISMATCH)]
        }
    }
}

impl ModelFormSpec for RegistrationForm {
    type Model = User;

    fn populate(form: &Form<Self>) -> User {
        User::new(form.value("email").trim(), form.value("name").trim())
    }
}

/// Credentials form.
#[derive(Debug, Clone, Copy)]
pub struct LoginForm;

impl FormSpec for LoginForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("email", "Email", &[input_required, email]),
        FieldSpec::password("password", "Password", &[input_required]),
    ];
    const TEXT_ERRORS: &'static [(&'static str, &'static str)] = &[(
        EMAIL_OR_PASSWORD_ERROR,
        "The username or password you entered is incorrect.",
    )];
}

/// Profile editing form.
#[derive(Debug, Clone, Copy)]
pub struct ProfileForm;

impl FormSpec for ProfileForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("name", "Name", &[name]),
        FieldSpec::text("email", "Email", &[input_required, email]),
        FieldSpec::text("phone", "Phone", &[phone]),
        FieldSpec::text("photo", "Photo", &[]),
        FieldSpec::date("birth_date", "Birth date", &[]),
    ];
    const TEXT_ERRORS: &'static [(&'static str, &'static str)] = &[(EMAIL_OCCUPIED, "Already taken.")];
}

impl ModelFormSpec for ProfileForm {
    type Model = User;

    fn populate(form: &Form<Self>) -> User {
        let mut user = User::new(form.value("email").trim(), form.value("name").trim());
        user.phone = non_blank(form.value("phone"));
        user.photo = non_blank(form.value("photo"));
        user.birth_date = form.date("birth_date");
        user
    }
}

impl ProfileForm {
    /// Partial document for a merge update; blank optionals become `null`.
    pub fn patch(user: &User) -> Document {
        let optional = |value: &Option<String>| value.clone().map_or(Value::Null, Value::String);
        let mut patch = Document::new();
        patch.insert("name".to_owned(), Value::String(user.name.clone()));
        patch.insert("email".to_owned(), Value::String(user.email.clone()));
        patch.insert("phone".to_owned(), optional(&user.phone));
        patch.insert("photo".to_owned(), optional(&user.photo));
        patch.insert(
            "birth_date".to_owned(),
            user.birth_date
                .map_or(Value::Null, |date| Value::String(date.format("%Y-%m-%d").to_string())),
        );
        patch
    }

    /// Form input prefilled from a stored account.
    pub fn initial(user: &User) -> super::FormInput {
        let mut pairs = vec![
            ("name", user.name.clone()),
            ("email", user.email.clone()),
        ];
        if let Some(phone) = &user.phone {
            pairs.push(("phone", phone.clone()));
        }
        if let Some(photo) = &user.photo {
            pairs.push(("photo", photo.clone()));
        }
        if let Some(date) = user.birth_date {
            pairs.push(("birth_date", date.format("%Y-%m-%d").to_string()));
        }
        super::FormInput::from_pairs(pairs)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
