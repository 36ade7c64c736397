//! SQL text and value helpers shared by the store operations.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use super::error::{VmError, VmResult};
use super::types::{ACCEPTED_COLUMN_TYPES, QueryFilter};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

static WORKSPACE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

const DEFAULT_KEYWORDS: [&str; 3] = ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"];

pub fn validate_identifier(kind: &str, name: &str) -> VmResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(VmError::InvalidSchema(format!(
            "invalid {kind} name {name:?}: must match ^[A-Za-z_][A-Za-z0-9_]*$"
        )))
    }
}

pub fn validate_workspace_id(workspace_id: &str) -> VmResult<()> {
    if WORKSPACE_ID.is_match(workspace_id) {
        Ok(())
    } else {
        Err(VmError::InvalidWorkspaceId(workspace_id.to_string()))
    }
}

/// Double-quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps an accepted column type onto its SQLite storage type.
pub fn storage_type(column: &str, column_type: &str) -> VmResult<&'static str> {
    let upper = column_type.trim().to_ascii_uppercase();
    if !ACCEPTED_COLUMN_TYPES.contains(&upper.as_str()) {
        return Err(VmError::InvalidSchema(format!(
            "unknown type {column_type:?} for column {column:?} (accepted: {})",
            ACCEPTED_COLUMN_TYPES.join(", ")
        )));
    }
    Ok(match upper.as_str() {
        "TEXT" | "DATETIME" => "TEXT",
        "INTEGER" | "BOOLEAN" => "INTEGER",
        "REAL" => "REAL",
        _ => "BLOB",
    })
}

/// Renders a JSON default as a SQL literal.
pub fn default_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let upper = s.trim().to_ascii_uppercase();
            if DEFAULT_KEYWORDS.contains(&upper.as_str()) {
                upper
            } else {
                format!("'{}'", s.replace('\'', "''"))
            }
        }
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Converts a JSON parameter into a bindable SQLite value.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Decodes a column value. BLOBs come back as lossy UTF-8.
pub fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Builds a WHERE clause (without the keyword) and its bound arguments.
pub fn where_clause(filters: &[QueryFilter], combinator: Option<&str>) -> VmResult<(String, Vec<SqlValue>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let joiner = match combinator {
        Some(c) if c.eq_ignore_ascii_case("or") => " OR ",
        _ => " AND ",
    };

    let mut clauses = Vec::with_capacity(filters.len());
    let mut args = Vec::new();
    for filter in filters {
        validate_identifier("column", &filter.column)?;
        let column = quote_ident(&filter.column);
        let op = filter.operator.trim().to_ascii_uppercase();
        match op.as_str() {
            "=" | "!=" | ">" | ">=" | "<" | "<=" | "LIKE" | "NOT LIKE" => {
                clauses.push(format!("{column} {op} ?"));
                args.push(SqlValue::Text(filter.value.clone()));
            }
            "IS NULL" | "IS NOT NULL" => clauses.push(format!("{column} {op}")),
            "IN" => {
                let parts: Vec<&str> = filter.value.split(',').map(str::trim).collect();
                let marks = vec!["?"; parts.len()].join(",");
                clauses.push(format!("{column} IN ({marks})"));
                args.extend(parts.into_iter().map(|p| SqlValue::Text(p.to_string())));
            }
            other => {
                return Err(VmError::InvalidRequest(format!(
                    "unsupported filter operator {other:?}"
                )));
            }
        }
    }
    Ok((clauses.join(joiner), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("table", "tasks_2").is_ok());
        assert!(validate_identifier("table", "_private").is_ok());
        assert!(validate_identifier("table", "2fast").is_err());
        assert!(validate_identifier("table", "drop table;").is_err());
    }

    #[test]
    fn test_storage_type_mapping() {
        assert_eq!(storage_type("c", "boolean").unwrap(), "INTEGER");
        assert_eq!(storage_type("c", "DateTime").unwrap(), "TEXT");
        assert_eq!(storage_type("c", "real").unwrap(), "REAL");
        assert!(storage_type("c", "VARCHAR(20)").is_err());
    }

    #[test]
    fn test_default_literal() {
        assert_eq!(default_literal(&json!("it's")), "'it''s'");
        assert_eq!(default_literal(&json!("current_timestamp")), "CURRENT_TIMESTAMP");
        assert_eq!(default_literal(&json!(false)), "0");
        assert_eq!(default_literal(&json!(3.5)), "3.5");
    }

    #[test]
    fn test_where_clause_in_and_or() {
        let filters = vec![
            QueryFilter {
                column: "status".into(),
                operator: "in".into(),
                value: "open, closed".into(),
            },
            QueryFilter {
                column: "owner".into(),
                operator: "IS NULL".into(),
                value: String::new(),
            },
        ];
        let (clause, args) = where_clause(&filters, Some("or")).unwrap();
        assert_eq!(clause, "\"status\" IN (?,?) OR \"owner\" IS NULL");
        assert_eq!(args.len(), 2);
    }
}
