//! Account workflows behind the signup, login and profile pages.
//!
//! Each workflow takes a bound form, validates it, talks to the `accounts`
//! collection and reports user-facing failures back onto the form. Only
//! unexpected faults surface as [`Error`].

use std::sync::Arc;

use tracing::{debug, info};

use super::Error;
use super::forms::{
    EMAIL_OCCUPIED, EMAIL_OR_PASSWORD_ERROR, Form, LoginForm, ModelForm, ProfileForm,
    RegistrationForm,
};
use super::model::Collection;
use super::ports::DocumentStore;
use super::sessions::SessionRegistry;
use super::user::{Principal, User};

/// Signup, login and profile operations over the `accounts` collection.
#[derive(Clone)]
pub struct AccountService {
    users: Collection<User>,
    sessions: SessionRegistry,
}

impl AccountService {
    /// Service backed by `store`, which also holds the session records.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(store.clone()),
            sessions: SessionRegistry::new(store),
        }
    }

    /// Expire session records after `days`.
    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.sessions = self.sessions.with_ttl_days(days);
        self
    }

    /// Server-side sessions of signed-in accounts.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Create the unique email and session id indexes.
    pub async fn ensure_indexes(&self) -> Result<(), Error> {
        self.users.ensure_indexes().await?;
        self.sessions.ensure_indexes().await
    }

    /// Account the session principal refers to, if it still exists.
    pub async fn find_by_principal(&self, principal: &Principal) -> Result<Option<User>, Error> {
        Ok(self.users.find_one(principal.account_query()).await?)
    }

    /// Validate a signup and insert the new account.
    ///
    /// Returns `None` when the form carries errors, including an email that
    /// is already registered.
    pub async fn register(&self, form: &mut ModelForm<RegistrationForm>) -> Result<Option<User>, Error> {
        if !form.validate() {
            return Ok(None);
        }
        let Some(mut user) = form.take_object() else {
            return Ok(None);
        };
        user.set_password(form.form().value("password"));
        match self.users.insert(&mut user).await {
            Ok(id) => {
                info!(%id, "account registered");
                Ok(Some(user))
            }
            Err(err) if err.is_duplicate_key() => {
                debug!("signup rejected: email already registered");
                form.set_field_error("email", EMAIL_OCCUPIED);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Check submitted credentials.
    ///
    /// Every rejected login, malformed forms included, carries the same
    /// whole-form error.
    pub async fn authenticate(&self, form: &mut Form<LoginForm>) -> Result<Option<User>, Error> {
        if !form.validate() {
            debug!("login rejected: invalid form");
            form.set_nonfield_error(EMAIL_OR_PASSWORD_ERROR);
            return Ok(None);
        }
        let principal = Principal::new(form.value("email").trim());
        let found = self.users.find_one(principal.account_query()).await?;
        match found {
            Some(user) if user.check_password(form.value("password")) => Ok(Some(user)),
            _ => {
                debug!("login rejected");
                form.set_nonfield_error(EMAIL_OR_PASSWORD_ERROR);
                Ok(None)
            }
        }
    }

    /// Merge the edited profile fields into `current`'s stored document.
    ///
    /// Returns the updated account, or `None` when the form carries errors.
    /// Fields the form does not edit, such as credentials, keep their stored
    /// values.
    pub async fn update_profile(
        &self,
        current: &User,
        form: &mut ModelForm<ProfileForm>,
    ) -> Result<Option<User>, Error> {
        if !form.validate() {
            return Ok(None);
        }
        let Some(edited) = form.get_object() else {
            return Ok(None);
        };
        let patch = ProfileForm::patch(edited);
        let mut updated = current.clone();
        match self.users.update(&mut updated, Some(patch)).await {
            Ok(id) => {
                info!(%id, "profile updated");
                Ok(Some(updated))
            }
            Err(err) if err.is_duplicate_key() => {
                form.set_field_error("email", EMAIL_OCCUPIED);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::document::{Document, ObjectId};
    use crate::domain::forms::FormInput;
    use crate::domain::model::{Model, to_document};
    use crate::domain::ports::{DocumentStoreError, MockDocumentStore, UpdateOutcome};
    use rstest::rstest;
    use serde_json::{Value, json};

    fn service(store: MockDocumentStore) -> AccountService {
        AccountService::new(Arc::new(store))
    }

    fn signup_form(email: &str) -> ModelForm<RegistrationForm> {
        ModelForm::bind(&FormInput::from_pairs([
            ("name", "Ada"),
            ("email", email),
            ("password", "pw"),
            ("password_confirmation", "pw"),
        ]))
    }

    fn login_form(email: &str, password: &str) -> Form<LoginForm> {
        Form::bind(&FormInput::from_pairs([("email", email), ("password", password)]))
    }

    fn stored_user(email: &str, password: &str) -> Document {
        let mut user = User::new(email, "Ada");
        user.set_password(password);
        let mut document = to_document(&user).expect("encode user");
        document.insert("_id".to_owned(), json!(ObjectId::generate().to_string()));
        document
    }

    #[rstest]
    #[tokio::test]
    async fn register_hashes_and_inserts() {
        let mut store = MockDocumentStore::new();
        store
            .expect_insert()
            .withf(|collection, document| {
                collection == "accounts"
                    && document.get("email") == Some(&json!("ada@example.com"))
                    && document
                        .get("password_hash")
                        .and_then(Value::as_str)
                        .is_some_and(|hash| hash.len() == 128)
            })
            .times(1)
            .return_once(|_, _| Ok(ObjectId::generate()));
        let mut form = signup_form("ada@example.com");

        let user = service(store)
            .register(&mut form)
            .await
            .expect("register")
            .expect("account created");

        assert!(user.check_password("pw"));
        assert!(form.errors().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn register_reports_taken_email_on_the_form() {
        let mut store = MockDocumentStore::new();
        store
            .expect_insert()
            .return_once(|_, _| Err(DocumentStoreError::duplicate_key("accounts", "email")));
        let mut form = signup_form("ada@example.com");

        let outcome = service(store).register(&mut form).await.expect("register");

        assert!(outcome.is_none());
        assert_eq!(form.errors().fields["email"], vec!["Already taken.".to_owned()]);
    }

    #[rstest]
    #[tokio::test]
    async fn register_skips_storage_for_invalid_forms() {
        let mut store = MockDocumentStore::new();
        store.expect_insert().never();
        let mut form = signup_form("not-an-email");

        let outcome = service(store).register(&mut form).await.expect("register");
        assert!(outcome.is_none());
    }

    #[rstest]
    #[case("ada@example.com", "wrong", true)]
    #[case("nobody@example.com", "pw", false)]
    #[tokio::test]
    async fn authenticate_rejects_bad_credentials_generically(
        #[case] email: &'static str,
        #[case] password: &'static str,
        #[case] account_exists: bool,
    ) {
        let mut store = MockDocumentStore::new();
        store.expect_find_one().return_once(move |_, _| {
            Ok(account_exists.then(|| stored_user("ada@example.com", "pw")))
        });
        let mut form = login_form(email, password);

        let outcome = service(store).authenticate(&mut form).await.expect("authenticate");

        assert!(outcome.is_none());
        assert_eq!(
            form.errors().whole_form,
            vec!["The username or password you entered is incorrect.".to_owned()]
        );
    }

    #[rstest]
    #[case("not-an-email", "pw")]
    #[case("ada@example.com", "")]
    #[tokio::test]
    async fn authenticate_reports_malformed_logins_generically(
        #[case] email: &'static str,
        #[case] password: &'static str,
    ) {
        let mut store = MockDocumentStore::new();
        store.expect_find_one().never();
        let mut form = login_form(email, password);

        let outcome = service(store).authenticate(&mut form).await.expect("authenticate");

        assert!(outcome.is_none());
        assert_eq!(
            form.errors().whole_form,
            vec!["The username or password you entered is incorrect.".to_owned()]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn authenticate_accepts_matching_credentials() {
        let mut store = MockDocumentStore::new();
        store
            .expect_find_one()
            .withf(|_, query| query.get("email") == Some(&json!("ada@example.com")))
            .return_once(|_, _| Ok(Some(stored_user("ada@example.com", "pw"))));
        let mut form = login_form("ada@example.com", "pw");

        let user = service(store)
            .authenticate(&mut form)
            .await
            .expect("authenticate")
            .expect("logged in");
        assert_eq!(user.email, "ada@example.com");
    }

    #[rstest]
    #[tokio::test]
    async fn update_profile_merges_without_touching_credentials() {
        let mut current = User::new("ada@example.com", "Ada");
        current.set_password("pw");
        current.set_id(ObjectId::generate());
        let mut store = MockDocumentStore::new();
        store
            .expect_update()
            .withf(|_, _, patch, upsert| {
                !*upsert
                    && patch.get("name") == Some(&json!("Ada L."))
                    && !patch.contains_key("password_hash")
            })
            .times(1)
            .return_once(|_, _, _, _| {
                Ok(UpdateOutcome {
                    matched: 1,
                    upserted: None,
                })
            });
        let mut form = ModelForm::bind(&FormInput::from_pairs([
            ("name", "Ada L."),
            ("email", "ada@example.com"),
        ]));

        let updated = service(store)
            .update_profile(&current, &mut form)
            .await
            .expect("update")
            .expect("profile saved");

        assert_eq!(updated.name, "Ada L.");
        assert!(updated.check_password("pw"));
    }

    #[rstest]
    #[tokio::test]
    async fn store_outages_surface_as_service_unavailable() {
        let mut store = MockDocumentStore::new();
        store
            .expect_find_one()
            .return_once(|_, _| Err(DocumentStoreError::connection("refused")));
        let mut form = login_form("ada@example.com", "pw");

        let err = service(store)
            .authenticate(&mut form)
            .await
            .expect_err("outage");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }
}
