//! Fixed introspection statements for the catalog tools
//!
//! Statements are schema-qualified only when a database argument is
//! supplied; identifiers are always backtick-quoted.

/// Quote a MySQL identifier, doubling any embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Statement listing all visible databases
pub fn list_databases_statement() -> &'static str {
    "SHOW DATABASES"
}

/// Statement listing tables, in the given database or the current one
pub fn list_tables_statement(database: Option<&str>) -> String {
    match database {
        Some(db) => format!("SHOW TABLES FROM {}", quote_identifier(db)),
        None => "SHOW TABLES".to_string(),
    }
}

/// Statement describing a table's columns
pub fn describe_table_statement(table: &str, database: Option<&str>) -> String {
    match database {
        Some(db) => format!(
            "DESCRIBE {}.{}",
            quote_identifier(db),
            quote_identifier(table)
        ),
        None => format!("DESCRIBE {}", quote_identifier(table)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_identifier_plain() {
        assert_eq!(quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_quote_identifier_doubles_backticks() {
        assert_eq!(quote_identifier("od`d"), "`od``d`");
        assert_eq!(quote_identifier("`"), "````");
    }

    #[test]
    fn test_list_tables_qualified_and_unqualified() {
        assert_eq!(
            list_tables_statement(Some("orders")),
            "SHOW TABLES FROM `orders`"
        );
        assert_eq!(list_tables_statement(None), "SHOW TABLES");
    }

    #[test]
    fn test_describe_table_qualified_and_unqualified() {
        assert_eq!(
            describe_table_statement("users", Some("orders")),
            "DESCRIBE `orders`.`users`"
        );
        assert_eq!(describe_table_statement("users", None), "DESCRIBE `users`");
    }

    proptest! {
        // A quoted identifier must never let its content terminate the
        // backtick quoting, whatever the input looks like.
        #[test]
        fn test_quoting_neutralizes_embedded_backticks(name in ".{0,40}") {
            let quoted = quote_identifier(&name);

            prop_assert!(quoted.starts_with('`'));
            prop_assert!(quoted.ends_with('`'));

            let inner = &quoted[1..quoted.len() - 1];
            prop_assert!(!inner.replace("``", "").contains('`'));
        }

        #[test]
        fn test_statements_embed_quoted_database(db in "[a-zA-Z0-9_`]{1,20}") {
            let statement = list_tables_statement(Some(&db));
            prop_assert!(statement.starts_with("SHOW TABLES FROM `"));
            prop_assert!(statement.ends_with('`'));
        }
    }
}
