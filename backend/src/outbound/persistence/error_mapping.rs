//! Diesel error mapping for the document store adapter.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::document::ID_FIELD;
use crate::domain::ports::DocumentStoreError;

/// Name of the partial unique index enforcing `field` within `collection`.
pub(super) fn unique_index_name(collection: &str, field: &str) -> String {
    format!("uniq_{collection}_{field}")
}

/// Map a Diesel failure raised while operating on `collection`.
///
/// Unique violations name the offending field when the constraint is one of
/// ours: the primary key maps to `_id`, partial indexes to their field.
pub(super) fn map_diesel_error(error: DieselError, collection: &str) -> DocumentStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), collection, "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            collection,
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            let prefix = unique_index_name(collection, "");
            let field = match info.constraint_name() {
                Some("documents_pkey") => ID_FIELD.to_owned(),
                Some(name) => name.strip_prefix(prefix.as_str()).unwrap_or(name).to_owned(),
                None => "unknown".to_owned(),
            };
            DocumentStoreError::duplicate_key(collection, field)
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            DocumentStoreError::connection("database connection error")
        }
        DieselError::QueryBuilderError(_) => DocumentStoreError::query("database query error"),
        DieselError::SerializationError(err) | DieselError::DeserializationError(err) => {
            DocumentStoreError::query(format!("document conversion failed: {err}"))
        }
        _ => DocumentStoreError::query("database error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct Violation(Option<&'static str>);

    impl diesel::result::DatabaseErrorInformation for Violation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            Some("documents")
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            self.0
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn violation(constraint: Option<&'static str>) -> DieselError {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, Box::new(Violation(constraint)))
    }

    #[rstest]
    #[case(Some("uniq_accounts_email"), "email")]
    #[case(Some("documents_pkey"), "_id")]
    #[case(None, "unknown")]
    fn unique_violations_name_the_field(#[case] constraint: Option<&'static str>, #[case] field: &str) {
        let error = map_diesel_error(violation(constraint), "accounts");

        assert_eq!(error, DocumentStoreError::duplicate_key("accounts", field));
    }

    #[rstest]
    fn closed_connections_are_connection_errors() {
        let error = map_diesel_error(
            DieselError::DatabaseError(
                DatabaseErrorKind::ClosedConnection,
                Box::new("server closed the connection".to_owned()),
            ),
            "accounts",
        );
        assert!(matches!(error, DocumentStoreError::Connection { .. }));
    }

    #[rstest]
    fn other_failures_are_query_errors() {
        let error = map_diesel_error(DieselError::NotFound, "accounts");
        assert!(matches!(error, DocumentStoreError::Query { .. }));
    }
}
