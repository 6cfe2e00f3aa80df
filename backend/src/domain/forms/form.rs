//! Form binding, validation and the bridge to model schema validation.

use std::any::type_name;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::field::{BoundField, FieldKind, FieldSpec};
use super::input::FormInput;
use crate::domain::model::{Model, SchemaError};

/// Whole-form message used when schema validation fails in a way the form
/// cannot attribute to one of its fields.
pub const UNKNOWN_ERROR: &str = "Unknown error.";

/// Static description of a form: its fields, cross-field checks and the
/// error codes it can translate into messages.
pub trait FormSpec: Sized + 'static {
    /// Declared fields in rendering order.
    const FIELDS: &'static [FieldSpec];

    /// Code to message table used by [`Form::set_field_error`] and
    /// [`Form::set_nonfield_error`].
    const TEXT_ERRORS: &'static [(&'static str, &'static str)] = &[];

    /// Checks spanning several fields, run after every single-field chain.
    /// Each entry names the field to blame and an error code.
    fn cross_validate(_form: &Form<Self>) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }
}

/// Accumulated form errors, serialised as `{field: [..], whole_form: [..]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    /// Messages per field; fields without errors are absent.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Vec<String>>,
    /// Messages not tied to one field.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub whole_form: Vec<String>,
}

impl FormErrors {
    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.whole_form.is_empty()
    }
}

/// A form of shape `S` bound to one request's input.
pub struct Form<S> {
    fields: Vec<BoundField>,
    whole_form: Vec<String>,
    _spec: PhantomData<fn() -> S>,
}

impl<S> Clone for Form<S> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            whole_form: self.whole_form.clone(),
            _spec: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for Form<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Form")
            .field("form", &type_name::<S>())
            .field("fields", &self.fields)
            .field("whole_form", &self.whole_form)
            .finish()
    }
}

impl<S: FormSpec> Form<S> {
    /// Unbound form, as rendered on a first `GET`.
    pub fn empty() -> Self {
        Self {
            fields: S::FIELDS.iter().map(BoundField::unbound).collect(),
            whole_form: Vec::new(),
            _spec: PhantomData,
        }
    }

    /// Bind `input`, converting each value and recording conversion errors.
    pub fn bind(input: &FormInput) -> Self {
        Self {
            fields: S::FIELDS
                .iter()
                .map(|spec| BoundField::bind(spec, input))
                .collect(),
            whole_form: Vec::new(),
            _spec: PhantomData,
        }
    }

    /// Run every field's validator chain, then the cross-field checks.
    ///
    /// Returns whether no field carries an error.
    pub fn validate(&mut self) -> bool {
        for field in &mut self.fields {
            field.run_validators();
        }
        for (field, code) in S::cross_validate(self) {
            self.set_field_error(field, code);
        }
        self.fields.iter().all(|field| field.errors.is_empty())
    }

    /// Bound field named `name`.
    pub fn field(&self, name: &str) -> Option<&BoundField> {
        self.fields.iter().find(|field| field.name() == name)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut BoundField> {
        self.fields.iter_mut().find(|field| field.name() == name)
    }

    /// Text value of `name`, empty when absent.
    pub fn value(&self, name: &str) -> &str {
        self.field(name).map_or("", BoundField::text)
    }

    /// Parsed date value of `name`.
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.field(name).and_then(BoundField::date)
    }

    /// Message for `code`, falling back to the code itself.
    pub fn message_for(code: &str) -> String {
        S::TEXT_ERRORS
            .iter()
            .find(|(known, _)| *known == code)
            .map_or(code, |(_, message)| *message)
            .to_owned()
    }

    /// Attach the message for `code` to `field`.
    ///
    /// Unknown fields are reported on the whole form instead.
    pub fn set_field_error(&mut self, field: &str, code: &str) {
        let message = Self::message_for(code);
        match self.field_mut(field) {
            Some(bound) => bound.errors.push(message),
            None => {
                warn!(form = type_name::<S>(), field, "error for undeclared field");
                self.whole_form.push(message);
            }
        }
    }

    /// Attach the message for `code` to the whole form.
    pub fn set_nonfield_error(&mut self, code: &str) {
        self.whole_form.push(Self::message_for(code));
    }

    /// Snapshot of every recorded error.
    pub fn errors(&self) -> FormErrors {
        FormErrors {
            fields: self
                .fields
                .iter()
                .filter(|field| !field.errors.is_empty())
                .map(|field| (field.name().to_owned(), field.errors.clone()))
                .collect(),
            whole_form: self.whole_form.clone(),
        }
    }

    /// Whether no error of any kind is recorded.
    pub fn is_valid(&self) -> bool {
        self.whole_form.is_empty() && self.fields.iter().all(|field| field.errors.is_empty())
    }

    fn attach_schema_errors(&mut self, error: SchemaError) {
        match error {
            SchemaError::Fields(fields) => {
                for (name, messages) in fields {
                    match self.field_mut(&name) {
                        Some(bound) if bound.errors.is_empty() => bound.errors.extend(messages),
                        Some(_) => {}
                        None => self.unknown_schema_error(&format!("{name}: {}", messages.join(" "))),
                    }
                }
            }
            SchemaError::Model(message) => self.unknown_schema_error(&message),
        }
    }

    fn unknown_schema_error(&mut self, detail: &str) {
        warn!(form = type_name::<S>(), error = detail, "unknown validation error");
        if !self.whole_form.iter().any(|message| message == UNKNOWN_ERROR) {
            self.whole_form.push(UNKNOWN_ERROR.to_owned());
        }
    }
}

#[derive(Serialize)]
struct FieldView<'a> {
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    value: String,
    errors: &'a [String],
}

#[derive(Serialize)]
struct FormView<'a> {
    fields: BTreeMap<&'static str, FieldView<'a>>,
    errors: FormErrors,
}

impl<S: FormSpec> Serialize for Form<S> {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                (
                    field.name(),
                    FieldView {
                        name: field.name(),
                        label: field.label(),
                        kind: field.kind(),
                        value: field.display_value(),
                        errors: field.errors(),
                    },
                )
            })
            .collect();
        FormView {
            fields,
            errors: self.errors(),
        }
        .serialize(serializer)
    }
}

/// A form whose values populate a [`Model`] entity.
pub trait ModelFormSpec: FormSpec {
    /// Entity built from the bound values.
    type Model: Model;

    /// Build the transient entity checked by schema validation.
    fn populate(form: &Form<Self>) -> Self::Model;
}

/// A [`Form`] bridged to its model's schema validation.
pub struct ModelForm<S: ModelFormSpec> {
    form: Form<S>,
    object: Option<S::Model>,
}

impl<S: ModelFormSpec> std::fmt::Debug for ModelForm<S>
where
    S::Model: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelForm")
            .field("form", &self.form)
            .field("object", &self.object)
            .finish()
    }
}

impl<S: ModelFormSpec> ModelForm<S> {
    /// Unbound form.
    pub fn empty() -> Self {
        Self {
            form: Form::empty(),
            object: None,
        }
    }

    /// Bind `input` without validating it.
    pub fn bind(input: &FormInput) -> Self {
        Self {
            form: Form::bind(input),
            object: None,
        }
    }

    /// Run field validation, then the model's schema validation.
    ///
    /// Schema errors only land on fields that have no error yet; errors the
    /// form cannot place become [`UNKNOWN_ERROR`]. The entity is exposed by
    /// [`ModelForm::get_object`] only when both phases pass.
    pub fn validate(&mut self) -> bool {
        self.object = None;
        let fields_valid = self.form.validate();
        let candidate = S::populate(&self.form);
        match candidate.validate() {
            Ok(()) if fields_valid => {
                self.object = Some(candidate);
                true
            }
            Ok(()) => false,
            Err(error) => {
                self.form.attach_schema_errors(error);
                false
            }
        }
    }

    /// Entity built by the last successful [`ModelForm::validate`].
    pub fn get_object(&self) -> Option<&S::Model> {
        self.object.as_ref()
    }

    /// Move the validated entity out of the form.
    pub fn take_object(&mut self) -> Option<S::Model> {
        self.object.take()
    }

    /// The underlying field form.
    pub fn form(&self) -> &Form<S> {
        &self.form
    }

    /// Mutable access for injecting storage-derived errors.
    pub fn form_mut(&mut self) -> &mut Form<S> {
        &mut self.form
    }

    /// See [`Form::set_field_error`].
    pub fn set_field_error(&mut self, field: &str, code: &str) {
        self.form.set_field_error(field, code);
    }

    /// See [`Form::set_nonfield_error`].
    pub fn set_nonfield_error(&mut self, code: &str) {
        self.form.set_nonfield_error(code);
    }

    /// See [`Form::errors`].
    pub fn errors(&self) -> FormErrors {
        self.form.errors()
    }
}

impl<S: ModelFormSpec> Serialize for ModelForm<S> {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.form.serialize(serializer)
    }
}
