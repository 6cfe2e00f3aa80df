//! Static field descriptors and their bound values.

use chrono::NaiveDate;
use serde::Serialize;

use super::input::FormInput;

/// Input format accepted by date fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Message recorded when a date field cannot be parsed.
pub const INVALID_DATE: &str = "Not a valid date value.";

/// How a field's raw value is converted and echoed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text, echoed back verbatim.
    Text,
    /// Secret text, never echoed back.
    Password,
    /// ISO calendar date; blank means absent.
    Date,
}

/// Outcome of running one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The value passes.
    Valid,
    /// Record the message and keep running the chain.
    Invalid(String),
    /// Record the message and skip the rest of this field's chain.
    Stop(String),
}

/// Single-field validation rule.
pub type Validator = fn(&BoundField) -> Check;

/// Declaration of one form field.
#[derive(Debug)]
pub struct FieldSpec {
    /// Argument name, also the key used for errors.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Conversion applied to the raw value.
    pub kind: FieldKind,
    /// Validators run in order.
    pub validators: &'static [Validator],
}

impl FieldSpec {
    /// Text field with the given validator chain.
    pub const fn text(name: &'static str, label: &'static str, validators: &'static [Validator]) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            validators,
        }
    }

    /// Password field with the given validator chain.
    pub const fn password(
        name: &'static str,
        label: &'static str,
        validators: &'static [Validator],
    ) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Password,
            validators,
        }
    }

    /// Date field with the given validator chain.
    pub const fn date(name: &'static str, label: &'static str, validators: &'static [Validator]) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Date,
            validators,
        }
    }
}

/// A field's converted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldData {
    /// Text and password fields.
    Text(String),
    /// Date fields; `None` when blank or unparsable.
    Date(Option<NaiveDate>),
}

/// A field bound to request input, with its accumulated errors.
#[derive(Debug, Clone)]
pub struct BoundField {
    pub(super) spec: &'static FieldSpec,
    pub(super) raw: Option<String>,
    pub(super) data: FieldData,
    pub(super) errors: Vec<String>,
}

impl BoundField {
    pub(super) fn unbound(spec: &'static FieldSpec) -> Self {
        let data = match spec.kind {
            FieldKind::Date => FieldData::Date(None),
            FieldKind::Text | FieldKind::Password => FieldData::Text(String::new()),
        };
        Self {
            spec,
            raw: None,
            data,
            errors: Vec::new(),
        }
    }

    pub(super) fn bind(spec: &'static FieldSpec, input: &FormInput) -> Self {
        let raw = input.first(spec.name).map(str::to_owned);
        let mut errors = Vec::new();
        let data = match spec.kind {
            FieldKind::Text | FieldKind::Password => FieldData::Text(raw.clone().unwrap_or_default()),
            FieldKind::Date => match raw.as_deref().map(str::trim) {
                None | Some("") => FieldData::Date(None),
                Some(value) => match NaiveDate::parse_from_str(value, DATE_FORMAT) {
                    Ok(date) => FieldData::Date(Some(date)),
                    Err(_) => {
                        errors.push(INVALID_DATE.to_owned());
                        FieldData::Date(None)
                    }
                },
            },
        };
        Self {
            spec,
            raw,
            data,
            errors,
        }
    }

    /// Field name.
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Field label.
    pub fn label(&self) -> &'static str {
        self.spec.label
    }

    /// Field kind.
    pub fn kind(&self) -> FieldKind {
        self.spec.kind
    }

    /// First submitted value, if the argument was present at all.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Text value; empty for dates and missing arguments.
    pub fn text(&self) -> &str {
        match &self.data {
            FieldData::Text(value) => value.as_str(),
            FieldData::Date(_) => "",
        }
    }

    /// Parsed date for date fields.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.data {
            FieldData::Date(date) => date,
            FieldData::Text(_) => None,
        }
    }

    /// Messages recorded against this field.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Value to echo back when re-rendering; secrets are blanked.
    pub fn display_value(&self) -> String {
        match (&self.data, self.spec.kind) {
            (_, FieldKind::Password) => String::new(),
            (FieldData::Date(Some(date)), _) => date.format(DATE_FORMAT).to_string(),
            (FieldData::Date(None), _) => self.raw.clone().unwrap_or_default(),
            (FieldData::Text(value), _) => value.clone(),
        }
    }

    pub(super) fn run_validators(&mut self) {
        let mut found = Vec::new();
        for validator in self.spec.validators {
            match validator(self) {
                Check::Valid => {}
                Check::Invalid(message) => found.push(message),
                Check::Stop(message) => {
                    found.push(message);
                    break;
                }
            }
        }
        self.errors.extend(found);
    }
}
