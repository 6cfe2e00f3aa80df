//! Registered accounts and the session principal that refers to them.
//!
//! A [`User`] is stored in the `accounts` collection with a unique index on
//! `email`. The email doubles as the [`Principal`] kept in the session, so a
//! principal lookup is always `{"email": principal}`.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::credentials::{self, PasswordDigest};
use super::document::{Document, ObjectId};
use super::model::{Model, SchemaError};
use super::ports::IndexSpec;

/// Maximum number of characters in a display name.
pub const NAME_MAX_LEN: usize = 50;

const FIELDS: &[&str] = &[
    "_id",
    "name",
    "email",
    "phone",
    "city_id",
    "photo",
    "birth_date",
    "password_hash",
    "password_salt",
    "created_at",
];

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

/// Identifier of the authenticated user held in the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a raw principal read from the session.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Query locating the account this principal refers to.
    pub fn account_query(&self) -> Document {
        let mut query = Document::new();
        query.insert("email".to_owned(), Value::String(self.0.clone()));
        query
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered account.
///
/// ## Invariants
/// - `email` is required, well formed and unique across accounts.
/// - `password_hash` and `password_salt` change only together through
///   [`User::set_password`] and never leave persistence.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    /// Display name, possibly empty.
    #[serde(default)]
    pub name: String,
    /// Login email and session principal.
    #[serde(default)]
    pub email: String,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Home city reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_id: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    password_hash: String,
    #[serde(default)]
    password_salt: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl User {
    /// Unsaved account with the given email and display name.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            phone: None,
            city_id: None,
            photo: None,
            birth_date: None,
            password_hash: String::new(),
            password_salt: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Creation timestamp, fixed when the account was first built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Principal stored in the session for this account.
    pub fn principal(&self) -> Principal {
        Principal::new(self.email.clone())
    }

    /// Salt and hash `password`, replacing both stored credential fields.
    pub fn set_password(&mut self, password: &str) {
        let PasswordDigest { salt, hash } = credentials::set_password(password);
        self.password_salt = salt;
        self.password_hash = hash;
    }

    /// Whether `password` matches the stored credentials.
    pub fn check_password(&self, password: &str) -> bool {
        if self.password_hash.is_empty() || self.password_salt.is_empty() {
            return false;
        }
        credentials::check_password(password, &self.password_hash, &self.password_salt)
    }

    /// Public projection safe to hand to templates and JSON responses.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.map(|id| id.to_string()),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            city_id: self.city_id.clone(),
            photo: self.photo.clone(),
            birth_date: self.birth_date,
            created_at: self.created_at,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.id) {
            (name, _) if !name.is_empty() => write!(f, "{name} ({})", self.email),
            (_, Some(id)) => write!(f, "{id} ({})", self.email),
            _ => write!(f, "({})", self.email),
        }
    }
}

impl Model for User {
    const COLLECTION: &'static str = "accounts";
    const NAME: &'static str = "User";

    fn fields() -> &'static [&'static str] {
        FIELDS
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::unique("email")]
    }

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut errors = std::collections::BTreeMap::new();
        if self.name.chars().count() > NAME_MAX_LEN {
            errors.insert("name".to_owned(), vec!["String value is too long.".to_owned()]);
        }
        if self.email.is_empty() {
            errors.insert("email".to_owned(), vec!["This field is required.".to_owned()]);
        } else if !email_regex().is_match(&self.email) {
            errors.insert(
                "email".to_owned(),
                vec!["Not a well-formed email address.".to_owned()],
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Fields(errors))
        }
    }
}

/// Account fields exposed outside persistence; credentials are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    /// Store identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Home city reference.
    pub city_id: Option<String>,
    /// Avatar URL.
    pub photo: Option<String>,
    /// Date of birth.
    pub birth_date: Option<NaiveDate>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{make_model, to_document};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn set_password_writes_salt_and_hash_together() {
        let mut user = User::new("a@x.com", "A");
        assert!(!user.check_password(""));

        user.set_password("secret");

        assert_eq!(user.password_salt.len(), 32);
        assert_eq!(user.password_hash.len(), 128);
        assert!(user.check_password("secret"));
        assert!(!user.check_password("wrong"));
    }

    #[rstest]
    #[case("a@x.com", "A", true)]
    #[case("", "A", false)]
    #[case("not-an-email", "A", false)]
    #[case("a@x.com", "", true)]
    fn schema_validation(#[case] email: &str, #[case] name: &str, #[case] valid: bool) {
        assert_eq!(User::new(email, name).validate().is_ok(), valid);
    }

    #[rstest]
    fn overlong_names_fail_schema_validation() {
        let user = User::new("a@x.com", "x".repeat(NAME_MAX_LEN + 1));
        let Err(SchemaError::Fields(errors)) = user.validate() else {
            panic!("expected field errors");
        };
        assert_eq!(
            errors.get("name"),
            Some(&vec!["String value is too long.".to_owned()])
        );
    }

    #[rstest]
    fn view_never_carries_credentials() {
        let mut user = User::new("a@x.com", "A");
        user.set_password("secret");
        let view = serde_json::to_value(user.view()).expect("serialise view");
        let object = view.as_object().expect("object");
        assert!(!object.contains_key("password_hash"));
        assert!(!object.contains_key("password_salt"));
        assert_eq!(object.get("email"), Some(&json!("a@x.com")));
    }

    #[rstest]
    fn debug_output_hides_credentials() {
        let mut user = User::new("a@x.com", "A");
        user.set_password("secret");
        let rendered = format!("{user:?}");
        assert!(!rendered.contains(&user.password_hash));
    }

    #[rstest]
    fn stored_documents_round_trip_without_unset_optionals() {
        let user = User::new("a@x.com", "A");
        let document = to_document(&user).expect("encode");
        assert!(!document.contains_key("_id"));
        assert!(!document.contains_key("phone"));

        let restored: User = make_model(document, "find_one").expect("decode");
        assert_eq!(restored, user);
    }

    #[rstest]
    fn principal_queries_by_email() {
        let principal = User::new("a@x.com", "").principal();
        assert_eq!(
            serde_json::Value::Object(principal.account_query()),
            json!({"email": "a@x.com"})
        );
    }
}
