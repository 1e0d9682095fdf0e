//! Field-keyed validation messages shared by the HTML forms.

use std::collections::BTreeMap;

use crate::domain::error::DomainError;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD: &str = "__all__";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    /// Record a domain validation failure under its field; other domain
    /// errors land in the non-field bucket.
    pub fn add_domain(&mut self, error: DomainError) {
        match error {
            DomainError::Validation { field, message } => self.add(field, message),
            other => self.add(NON_FIELD, other.to_string()),
        }
    }

    /// Run `check`, keeping its value or recording its failure.
    pub fn check<T>(&mut self, result: Result<T, DomainError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.add_domain(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn for_field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn non_field(&self) -> &[String] {
        self.for_field(NON_FIELD)
    }

    /// Flattened `field: message` pairs for log lines.
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |message| format!("{field}: {message}"))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_messages_per_field() {
        let mut errors = FormErrors::new();
        assert!(errors.is_empty());

        let value = errors.check(Err::<String, _>(DomainError::validation("text", "required")));
        assert!(value.is_none());
        errors.add("text", "second");
        errors.add_domain(DomainError::invariant("broken"));

        assert_eq!(errors.for_field("text"), ["required", "second"]);
        assert_eq!(errors.non_field().len(), 1);
        assert!(errors.for_field("group").is_empty());
        assert!(errors.summary().starts_with("__all__"));
    }
}
