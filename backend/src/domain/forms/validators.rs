//! Single-field validators shared by the account forms.

use std::sync::OnceLock;

use regex::Regex;

use super::field::{BoundField, Check};
use crate::domain::user::NAME_MAX_LEN;

/// Message recorded by [`input_required`].
pub const REQUIRED: &str = "This field is required.";
/// Message recorded by [`email`].
pub const INVALID_EMAIL: &str = "Invalid email address.";
/// Message recorded by [`name`] for overlong names.
pub const NAME_TOO_LONG: &str = "Name must be at most 50 characters.";
/// Message recorded by [`name`] for names with control characters.
pub const NAME_INVALID: &str = "Name contains invalid characters.";
/// Message recorded by [`phone`].
pub const INVALID_PHONE: &str = "Invalid phone number.";

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static PHONE_RE: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(pattern).unwrap_or_else(|error| panic!("validator regex {pattern} failed: {error}"))
    })
}

/// Halts the chain when the argument is missing or blank.
pub fn input_required(field: &BoundField) -> Check {
    match field.raw() {
        Some(value) if !value.trim().is_empty() => Check::Valid,
        _ => Check::Stop(REQUIRED.to_owned()),
    }
}

/// Loose `local@domain` shape check.
pub fn email(field: &BoundField) -> Check {
    if compiled(&EMAIL_RE, r"^.+@([^.@][^@]+)$").is_match(field.text()) {
        Check::Valid
    } else {
        Check::Invalid(INVALID_EMAIL.to_owned())
    }
}

/// Optional display name: bounded length, printable characters only.
pub fn name(field: &BoundField) -> Check {
    let value = field.text();
    if value.chars().count() > NAME_MAX_LEN {
        Check::Invalid(NAME_TOO_LONG.to_owned())
    } else if value.chars().any(char::is_control) {
        Check::Invalid(NAME_INVALID.to_owned())
    } else {
        Check::Valid
    }
}

/// Optional phone number made of digits, spaces, dashes and parentheses.
pub fn phone(field: &BoundField) -> Check {
    let value = field.text().trim();
    if value.is_empty() || compiled(&PHONE_RE, r"^\+?[0-9 ()\-]{5,20}$").is_match(value) {
        Check::Valid
    } else {
        Check::Invalid(INVALID_PHONE.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forms::field::FieldSpec;
    use crate::domain::forms::input::FormInput;
    use rstest::rstest;

    static FIELD: FieldSpec = FieldSpec::text("value", "Value", &[]);

    fn bound(value: Option<&str>) -> BoundField {
        let input = match value {
            Some(value) => FormInput::from_pairs([("value", value)]),
            None => FormInput::new(),
        };
        BoundField::bind(&FIELD, &input)
    }

    #[rstest]
    #[case(None, Check::Stop(REQUIRED.to_owned()))]
    #[case(Some(""), Check::Stop(REQUIRED.to_owned()))]
    #[case(Some("   "), Check::Stop(REQUIRED.to_owned()))]
    #[case(Some("x"), Check::Valid)]
    fn required_stops_on_blank_input(#[case] value: Option<&str>, #[case] expected: Check) {
        assert_eq!(input_required(&bound(value)), expected);
    }

    #[rstest]
    #[case("a@x.com", true)]
    #[case("a@x", false)]
    #[case("a@.com", false)]
    #[case("@x.com", false)]
    #[case("no-at-sign", false)]
    fn email_shape(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(email(&bound(Some(value))) == Check::Valid, valid);
    }

    #[rstest]
    fn name_rules() {
        assert_eq!(name(&bound(Some(""))), Check::Valid);
        assert_eq!(name(&bound(Some("Ada Lovelace"))), Check::Valid);
        assert_eq!(
            name(&bound(Some("x".repeat(NAME_MAX_LEN + 1).as_str()))),
            Check::Invalid(NAME_TOO_LONG.to_owned())
        );
        assert_eq!(
            name(&bound(Some("tab\there"))),
            Check::Invalid(NAME_INVALID.to_owned())
        );
    }

    #[rstest]
    #[case("", true)]
    #[case("+44 (20) 7946-0958", true)]
    #[case("1234", false)]
    #[case("call me", false)]
    fn phone_rules(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(phone(&bound(Some(value))) == Check::Valid, valid);
    }
}
