//! Request forms: typed fields, validator chains and the bridge that
//! reconciles field errors with model schema errors.

mod account;
pub mod field;
mod form;
mod input;
pub mod validators;

pub use account::{
    EMAIL_OCCUPIED, EMAIL_OR_PASSWORD_ERROR, LoginForm, PASSWORD_MISMATCH, ProfileForm,
    RegistrationForm,
};
pub use field::{BoundField, Check, FieldKind, FieldSpec, Validator};
pub use form::{Form, FormErrors, FormSpec, ModelForm, ModelFormSpec, UNKNOWN_ERROR};
pub use input::FormInput;
