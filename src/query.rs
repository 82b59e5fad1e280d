//! Query execution and result serialization

use crate::{Result, ServerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlColumn, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::types::chrono;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Instant;
use tracing::{debug, info};

/// A single SQL statement with optional positional parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// SQL statement with `?` placeholders
    pub sql: String,
    /// Positional parameter values, bound in order
    pub params: Option<Vec<Value>>,
}

impl QueryRequest {
    /// Extract a query request from a tool argument bag
    pub fn from_args(args: &Value) -> Result<Self> {
        let sql = args
            .get("sql")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServerError::invalid_params("Missing required parameter: sql"))?
            .to_string();

        let params = match args.get("params") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items.clone()),
            Some(_) => {
                return Err(ServerError::invalid_params(
                    "Parameter 'params' must be an array",
                ));
            }
        };

        Ok(Self { sql, params })
    }
}

/// Result of executing a statement
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// Rows from a row-returning statement, keyed by column name
    Rows(Vec<Map<String, Value>>),
    /// Summary of a data-modifying statement
    Write {
        affected_rows: u64,
        last_insert_id: u64,
    },
}

impl QueryOutcome {
    /// Serialize the outcome as pretty-printed JSON text
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ServerError::serialization_error(e, "query result"))
    }
}

/// Execute a statement against the pool through sqlx's bind path
///
/// Parameter values are bound positionally and never concatenated into the
/// SQL text.
pub async fn execute(pool: &MySqlPool, request: &QueryRequest) -> Result<QueryOutcome> {
    let sql = request.sql.trim();
    if sql.is_empty() {
        return Err(ServerError::invalid_params("SQL statement cannot be empty"));
    }

    let params = request.params.as_deref().unwrap_or(&[]);

    info!("Executing SQL statement: {}", sql);
    debug!("Statement parameters: {:?}", params);
    let started = Instant::now();

    let outcome = if returns_rows(sql) {
        let rows = bind_parameters(sqlx::query(sql), params)
            .fetch_all(pool)
            .await
            .map_err(|e| ServerError::query_failed(sql, e))?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            objects.push(row_to_object(row)?);
        }
        QueryOutcome::Rows(objects)
    } else {
        let result = bind_parameters(sqlx::query(sql), params)
            .execute(pool)
            .await
            .map_err(|e| ServerError::query_failed(sql, e))?;

        QueryOutcome::Write {
            affected_rows: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        }
    };

    info!("Statement completed in {}ms", started.elapsed().as_millis());
    Ok(outcome)
}

/// Run a fixed introspection statement for the catalog tools
///
/// Unlike [`execute`], failures here are server-side errors rather than
/// bad caller input.
pub async fn fetch_introspection(
    pool: &MySqlPool,
    operation: &str,
    sql: &str,
) -> Result<QueryOutcome> {
    debug!("Running introspection statement for {}: {}", operation, sql);

    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ServerError::introspection_failed(operation, e))?;

    let mut objects = Vec::with_capacity(rows.len());
    for row in &rows {
        objects.push(row_to_object(row)?);
    }
    Ok(QueryOutcome::Rows(objects))
}

/// Check whether a statement produces a result set
pub fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();

    matches!(
        keyword.as_str(),
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH"
    )
}

/// Bind positional JSON parameter values onto a query
fn bind_parameters<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(u) = n.as_u64() {
                    query.bind(u)
                } else {
                    query.bind(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => query.bind(s.clone()),
            // Arrays and objects travel as their JSON text
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Convert a result row to a JSON object keyed by column name
fn row_to_object(row: &MySqlRow) -> Result<Map<String, Value>> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column).map_err(|e| {
            ServerError::internal(format!(
                "Failed to decode column '{}': {}",
                column.name(),
                e
            ))
        })?;
        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}

/// Decode a single column value into JSON based on its MySQL type name
fn column_value(
    row: &MySqlRow,
    index: usize,
    column: &MySqlColumn,
) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match column.type_info().name() {
        "TINYINT" => Value::from(row.try_get::<i8, _>(index)?),
        "SMALLINT" => Value::from(row.try_get::<i16, _>(index)?),
        "MEDIUMINT" | "INT" => Value::from(row.try_get::<i32, _>(index)?),
        "BIGINT" => Value::from(row.try_get::<i64, _>(index)?),

        "TINYINT UNSIGNED" => Value::from(row.try_get::<u8, _>(index)?),
        "SMALLINT UNSIGNED" => Value::from(row.try_get::<u16, _>(index)?),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => Value::from(row.try_get::<u32, _>(index)?),
        "BIGINT UNSIGNED" => {
            let val: u64 = row.try_get(index)?;
            // JSON numbers cap at i64 range; larger values travel as strings
            if val > i64::MAX as u64 {
                Value::String(val.to_string())
            } else {
                Value::from(val)
            }
        }

        "FLOAT" => json_number(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => json_number(row.try_get::<f64, _>(index)?),

        // Kept as strings to preserve precision
        "DECIMAL" | "NUMERIC" => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => json_number(row.try_get::<f64, _>(index)?),
        },

        "BOOLEAN" | "BOOL" => Value::Bool(row.try_get(index)?),

        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
        | "SET" => Value::String(row.try_get(index)?),

        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            use base64::{engine::general_purpose, Engine as _};
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::String(general_purpose::STANDARD.encode(bytes))
        }

        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "DATETIME" | "TIMESTAMP" => {
            Value::String(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string())
        }

        "JSON" => row.try_get::<Value, _>(index)?,
        "UUID" => Value::String(row.try_get::<sqlx::types::Uuid, _>(index)?.to_string()),

        other => {
            debug!("Unhandled MySQL type '{}', decoding as string", other);
            match row.try_get::<String, _>(index) {
                Ok(text) => Value::String(text),
                Err(_) => Value::Null,
            }
        }
    };

    Ok(value)
}

fn json_number(val: f64) -> Value {
    serde_json::Number::from_f64(val)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(val.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_returns_rows_classification() {
        assert!(returns_rows("SELECT * FROM users"));
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("SHOW TABLES"));
        assert!(returns_rows("DESCRIBE `users`"));
        assert!(returns_rows("desc users"));
        assert!(returns_rows("EXPLAIN SELECT 1"));
        assert!(returns_rows("WITH t AS (SELECT 1) SELECT * FROM t"));

        assert!(!returns_rows("INSERT INTO users VALUES (1)"));
        assert!(!returns_rows("UPDATE users SET name = ?"));
        assert!(!returns_rows("DELETE FROM users"));
        assert!(!returns_rows("CREATE TABLE t (id INT)"));
        assert!(!returns_rows(""));
    }

    #[test]
    fn test_from_args_requires_sql() {
        let result = QueryRequest::from_args(&json!({ "params": [] }));
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));

        let result = QueryRequest::from_args(&json!({ "sql": 42 }));
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));
    }

    #[test]
    fn test_from_args_keeps_sql_and_params_verbatim() {
        let request = QueryRequest::from_args(&json!({
            "sql": "SELECT * FROM t WHERE id = ?",
            "params": ["5; DROP TABLE t"]
        }))
        .unwrap();

        // The statement text never absorbs parameter values
        assert_eq!(request.sql, "SELECT * FROM t WHERE id = ?");
        assert_eq!(request.params, Some(vec![json!("5; DROP TABLE t")]));
    }

    #[test]
    fn test_from_args_rejects_non_array_params() {
        let result = QueryRequest::from_args(&json!({
            "sql": "SELECT 1",
            "params": "oops"
        }));
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));
    }

    #[test]
    fn test_from_args_accepts_null_params() {
        let request = QueryRequest::from_args(&json!({
            "sql": "SELECT 1",
            "params": null
        }))
        .unwrap();
        assert!(request.params.is_none());
    }

    #[test]
    fn test_rows_outcome_serializes_as_array() {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        row.insert("name".to_string(), json!("alice"));

        let text = QueryOutcome::Rows(vec![row]).to_text().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed[0]["id"], json!(1));
        assert_eq!(parsed[0]["name"], json!("alice"));
    }

    #[test]
    fn test_write_outcome_serializes_summary() {
        let text = QueryOutcome::Write {
            affected_rows: 3,
            last_insert_id: 42,
        }
        .to_text()
        .unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["affected_rows"], json!(3));
        assert_eq!(parsed["last_insert_id"], json!(42));
    }

    proptest! {
        #[test]
        fn test_returns_rows_ignores_case_and_whitespace(
            spaces in "[ \t\n]{0,5}",
            keyword in "(?i:select|show|describe|explain)",
            rest in "[a-z0-9 *]{0,30}"
        ) {
            let sql = format!("{}{} {}", spaces, keyword, rest);
            prop_assert!(returns_rows(&sql));
        }

        #[test]
        fn test_request_roundtrip(
            sql in "[a-zA-Z0-9 =?*]{1,60}",
            params in prop::collection::vec(
                prop_oneof![
                    Just(Value::Null),
                    any::<bool>().prop_map(Value::Bool),
                    any::<i64>().prop_map(|n| Value::Number(n.into())),
                    "[a-zA-Z0-9;'\" -]{0,20}".prop_map(Value::String),
                ],
                0..5
            )
        ) {
            let request = QueryRequest { sql: sql.clone(), params: Some(params.clone()) };
            let serialized = serde_json::to_value(&request).unwrap();
            let parsed = QueryRequest::from_args(&serialized).unwrap();

            prop_assert_eq!(parsed.sql, sql);
            prop_assert_eq!(parsed.params, Some(params));
        }
    }
}
