//! In-process evaluation of aggregation pipelines.
//!
//! Both document store adapters share this evaluator; the PostgreSQL adapter
//! pushes a leading `$match` into SQL and evaluates the remaining stages here.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::domain::document::{Document, ID_FIELD, matches};
use crate::domain::ports::DocumentStoreError;

/// Split off a leading `$match` stage, returning its query and the rest.
pub fn split_leading_match(pipeline: &[Document]) -> (Document, &[Document]) {
    match pipeline.split_first() {
        Some((first, rest)) => match stage(first) {
            Ok(("$match", Value::Object(query))) => (query.clone(), rest),
            _ => (Document::new(), pipeline),
        },
        None => (Document::new(), pipeline),
    }
}

/// Apply every stage of `pipeline` to `documents` in order.
pub fn evaluate(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> Result<Vec<Document>, DocumentStoreError> {
    for spec in pipeline {
        let (operator, argument) = stage(spec)?;
        documents = match operator {
            "$match" => {
                let query = expect_object(operator, argument)?;
                documents.retain(|document| matches(document, query));
                documents
            }
            "$project" => project(documents, expect_object(operator, argument)?)?,
            "$sort" => sort(documents, expect_object(operator, argument)?)?,
            "$skip" => documents
                .into_iter()
                .skip(expect_count(operator, argument)?)
                .collect(),
            "$limit" => {
                documents.truncate(expect_count(operator, argument)?);
                documents
            }
            "$count" => count(&documents, argument)?,
            "$group" => group(&documents, expect_object(operator, argument)?)?,
            other => {
                return Err(DocumentStoreError::query(format!(
                    "unsupported pipeline stage {other}"
                )));
            }
        };
    }
    Ok(documents)
}

fn stage(spec: &Document) -> Result<(&str, &Value), DocumentStoreError> {
    let mut entries = spec.iter();
    match (entries.next(), entries.next()) {
        (Some((operator, argument)), None) => Ok((operator.as_str(), argument)),
        _ => Err(DocumentStoreError::query(
            "pipeline stages must have exactly one operator",
        )),
    }
}

fn expect_object<'a>(operator: &str, argument: &'a Value) -> Result<&'a Document, DocumentStoreError> {
    argument
        .as_object()
        .ok_or_else(|| DocumentStoreError::query(format!("{operator} expects an object")))
}

fn expect_count(operator: &str, argument: &Value) -> Result<usize, DocumentStoreError> {
    argument
        .as_u64()
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| DocumentStoreError::query(format!("{operator} expects a non-negative integer")))
}

fn flag(operator: &str, value: &Value) -> Result<bool, DocumentStoreError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|value| value != 0.0)),
        _ => Err(DocumentStoreError::query(format!(
            "{operator} values must be booleans or numbers"
        ))),
    }
}

fn project(documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DocumentStoreError> {
    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (field, value) in spec {
        let keep = flag("$project", value)?;
        match (field.as_str(), keep) {
            (ID_FIELD, keep) => include_id = keep,
            (_, true) => included.push(field.as_str()),
            (_, false) => excluded.push(field.as_str()),
        }
    }
    if !included.is_empty() && !excluded.is_empty() {
        return Err(DocumentStoreError::query(
            "$project cannot mix inclusion and exclusion",
        ));
    }
    Ok(documents
        .into_iter()
        .map(|mut document| {
            if !included.is_empty() {
                document.retain(|field, _| {
                    included.contains(&field.as_str()) || (field == ID_FIELD && include_id)
                });
            } else {
                for field in &excluded {
                    document.remove(*field);
                }
                if !include_id {
                    document.remove(ID_FIELD);
                }
            }
            document
        })
        .collect())
}

fn sort(mut documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DocumentStoreError> {
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => return Err(DocumentStoreError::query("$sort directions must be 1 or -1")),
        };
        keys.push((field.as_str(), descending));
    }
    documents.sort_by(|left, right| {
        keys.iter()
            .map(|(field, descending)| {
                let ordering = compare(
                    left.get(*field).unwrap_or(&Value::Null),
                    right.get(*field).unwrap_or(&Value::Null),
                );
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    Ok(documents)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

fn count(documents: &[Document], argument: &Value) -> Result<Vec<Document>, DocumentStoreError> {
    let field = argument
        .as_str()
        .filter(|field| !field.is_empty() && !field.starts_with('$'))
        .ok_or_else(|| DocumentStoreError::query("$count expects a field name"))?;
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let mut output = Document::new();
    output.insert(field.to_owned(), Value::from(documents.len()));
    Ok(vec![output])
}

/// Value of a `$field` reference, or the literal itself.
fn resolve<'a>(document: &'a Document, expression: &'a Value) -> &'a Value {
    match expression.as_str().and_then(|raw| raw.strip_prefix('$')) {
        Some(field) => document.get(field).unwrap_or(&Value::Null),
        None => expression,
    }
}

#[derive(Default)]
struct Sum {
    integer: i64,
    float: f64,
    is_float: bool,
}

impl Sum {
    fn add(&mut self, value: &Value) {
        let Value::Number(number) = value else {
            return;
        };
        match number.as_i64() {
            Some(int) if !self.is_float => self.integer = self.integer.saturating_add(int),
            _ => {
                if !self.is_float {
                    self.is_float = true;
                    self.float = self.integer as f64;
                }
                self.float += number.as_f64().unwrap_or_default();
            }
        }
    }

    fn into_value(self) -> Value {
        if self.is_float {
            Number::from_f64(self.float).map_or(Value::Null, Value::Number)
        } else {
            Value::from(self.integer)
        }
    }
}

fn group(documents: &[Document], spec: &Document) -> Result<Vec<Document>, DocumentStoreError> {
    let key_expression = spec
        .get(ID_FIELD)
        .ok_or_else(|| DocumentStoreError::query("$group requires an _id expression"))?;
    let mut accumulators = Vec::new();
    for (output, accumulator) in spec.iter().filter(|(field, _)| *field != ID_FIELD) {
        let expression = accumulator
            .as_object()
            .and_then(|object| object.get("$sum"))
            .filter(|_| accumulator.as_object().is_some_and(|object| object.len() == 1))
            .ok_or_else(|| {
                DocumentStoreError::query(format!("$group field {output} must use $sum"))
            })?;
        accumulators.push((output.as_str(), expression));
    }

    let mut groups: Vec<(Value, Vec<Sum>)> = Vec::new();
    for document in documents {
        let key = resolve(document, key_expression);
        let position = match groups.iter().position(|(existing, _)| existing == key) {
            Some(position) => position,
            None => {
                groups.push((
                    key.clone(),
                    accumulators.iter().map(|_| Sum::default()).collect(),
                ));
                groups.len() - 1
            }
        };
        if let Some((_, sums)) = groups.get_mut(position) {
            for (sum, (_, expression)) in sums.iter_mut().zip(&accumulators) {
                sum.add(resolve(document, expression));
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, sums)| {
            let mut output = Document::new();
            output.insert(ID_FIELD.to_owned(), key);
            for (sum, (field, _)) in sums.into_iter().zip(&accumulators) {
                output.insert((*field).to_owned(), sum.into_value());
            }
            output
        })
        .collect())
}
