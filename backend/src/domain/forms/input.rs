//! Raw request arguments bound to forms.

use std::collections::BTreeMap;

/// Multi-valued request arguments keyed by field name.
///
/// Repeated keys keep every value in arrival order; forms read the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInput(BTreeMap<String, Vec<String>>);

impl FormInput {
    /// Empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `(name, value)` pairs, preserving repeated names.
    ///
    /// # Examples
    /// ```
    /// use calendio::domain::forms::FormInput;
    ///
    /// let input = FormInput::from_pairs([("email", "a@x.com"), ("tag", "a"), ("tag", "b")]);
    /// assert_eq!(input.first("email"), Some("a@x.com"));
    /// assert_eq!(input.all("tag").len(), 2);
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in pairs {
            values.entry(name.into()).or_default().push(value.into());
        }
        Self(values)
    }

    /// First value submitted for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value submitted for `name`.
    pub fn all(&self, name: &str) -> &[String] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether nothing was submitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
