//! Per-workspace SQLite databases.
//!
//! `VmStore` owns exactly one connection per workspace, opened lazily at
//! `<root>/<workspace_id>.sqlite` and cached until `close_db`/`close`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{VmError, VmResult};
use super::sql::{
    default_literal, from_sql_value, quote_ident, quote_list, storage_type, to_sql_value,
    validate_identifier, validate_workspace_id, where_clause,
};
use super::types::{
    AlterTableRequest, ColumnDef, ColumnInfo, CreateTableRequest, DatabaseStats, ExecResult,
    ForeignKeyInfo, IndexInfo, MAX_RESULT_ROWS, QueryParams, QueryResult, Row, RowsPage,
    TableInfo, TableSchema,
};

/// Shared handle to one workspace database.
pub type DbHandle = Arc<Mutex<Connection>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct VmStore {
    root: PathBuf,
    dbs: Mutex<HashMap<String, DbHandle>>,
}

impl VmStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dbs: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self, workspace_id: &str) -> PathBuf {
        self.root.join(format!("{workspace_id}.sqlite"))
    }

    pub fn exists(&self, workspace_id: &str) -> bool {
        validate_workspace_id(workspace_id).is_ok() && self.db_path(workspace_id).exists()
    }

    // ============================================================================
    // Connection lifecycle
    // ============================================================================

    /// Returns the cached connection for a workspace, opening it on first access.
    pub fn get_db(&self, workspace_id: &str) -> VmResult<DbHandle> {
        validate_workspace_id(workspace_id)?;
        let mut dbs = lock(&self.dbs);
        if let Some(db) = dbs.get(workspace_id) {
            return Ok(Arc::clone(db));
        }

        std::fs::create_dir_all(&self.root)?;
        let path = self.db_path(workspace_id);
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        info!(workspace_id, path = %path.display(), "[VmStore] Opened workspace database");

        let db = Arc::new(Mutex::new(conn));
        dbs.insert(workspace_id.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Drops the cached connection; the file stays on disk.
    pub fn close_db(&self, workspace_id: &str) {
        if lock(&self.dbs).remove(workspace_id).is_some() {
            debug!(workspace_id, "[VmStore] Closed workspace database");
        }
    }

    /// Closes every cached connection.
    pub fn close(&self) {
        let drained: Vec<String> = lock(&self.dbs).drain().map(|(id, _)| id).collect();
        debug!(count = drained.len(), "[VmStore] Closed all workspace databases");
    }

    /// Closes the connection and removes the database file with its WAL/SHM companions.
    pub fn delete(&self, workspace_id: &str) -> VmResult<()> {
        validate_workspace_id(workspace_id)?;
        self.close_db(workspace_id);
        let base = self.db_path(workspace_id);
        for suffix in ["", "-wal", "-shm"] {
            let path = PathBuf::from(format!("{}{suffix}", base.display()));
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(workspace_id, "[VmStore] Purged workspace database");
        Ok(())
    }

    fn with_conn<T>(
        &self,
        workspace_id: &str,
        f: impl FnOnce(&mut Connection) -> VmResult<T>,
    ) -> VmResult<T> {
        let db = self.get_db(workspace_id)?;
        let mut conn = lock(&db);
        f(&mut conn)
    }

    // ============================================================================
    // DDL
    // ============================================================================

    /// Creates a table. Re-creating an existing table is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` for a bad identifier, no columns, a duplicate column, an
    /// unknown type, or a primary key naming a missing column.
    pub fn create_table(&self, workspace_id: &str, req: &CreateTableRequest) -> VmResult<()> {
        validate_identifier("table", &req.name)?;
        if req.columns.is_empty() {
            return Err(VmError::InvalidSchema(format!(
                "table {:?} needs at least one column",
                req.name
            )));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(req.columns.len());
        let mut storage = Vec::with_capacity(req.columns.len());
        for col in &req.columns {
            validate_identifier("column", &col.name)?;
            if seen.iter().any(|s| s.eq_ignore_ascii_case(&col.name)) {
                return Err(VmError::InvalidSchema(format!(
                    "duplicate column {:?} in table {:?}",
                    col.name, req.name
                )));
            }
            seen.push(&col.name);
            storage.push(storage_type(&col.name, &col.column_type)?);
        }

        let primary_key = req.primary_key_columns();
        for pk in &primary_key {
            if !req.columns.iter().any(|c| &c.name == pk) {
                return Err(VmError::InvalidSchema(format!(
                    "primary key column {pk:?} is not defined"
                )));
            }
        }

        let single_integer_pk = match primary_key.as_slice() {
            [only] => req
                .columns
                .iter()
                .position(|c| &c.name == only)
                .filter(|&i| storage[i] == "INTEGER"),
            _ => None,
        };

        let mut defs: Vec<String> = req
            .columns
            .iter()
            .zip(&storage)
            .enumerate()
            .map(|(i, (col, ty))| {
                if Some(i) == single_integer_pk {
                    format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&col.name))
                } else {
                    column_definition(col, ty)
                }
            })
            .collect();
        if !primary_key.is_empty() && single_integer_pk.is_none() {
            defs.push(format!("PRIMARY KEY ({})", quote_list(&primary_key)));
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote_ident(&req.name),
            defs.join(",\n  ")
        );

        self.with_conn(workspace_id, |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&ddl)?;
            for idx in &req.indexes {
                if idx.columns.is_empty() {
                    continue;
                }
                for c in &idx.columns {
                    validate_identifier("column", c)?;
                }
                let name = idx
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("idx_{}_{}", req.name, idx.columns.join("_")));
                let unique = if idx.unique { "UNIQUE " } else { "" };
                tx.execute_batch(&format!(
                    "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({})",
                    quote_ident(&name),
                    quote_ident(&req.name),
                    quote_list(&idx.columns)
                ))?;
            }
            tx.commit()?;
            Ok(())
        })?;
        info!(workspace_id, table = %req.name, "[VmStore] Created table");
        Ok(())
    }

    /// Applies add, rename, drop (in that order) inside one transaction.
    pub fn alter_table(
        &self,
        workspace_id: &str,
        table: &str,
        req: &AlterTableRequest,
    ) -> VmResult<()> {
        validate_identifier("table", table)?;
        if req.is_empty() {
            return Err(VmError::InvalidRequest(format!(
                "no changes requested for table {table:?}"
            )));
        }
        let table_sql = quote_ident(table);

        self.with_conn(workspace_id, |conn| {
            let tx = conn.transaction()?;
            if table_columns(&tx, table)?.is_empty() {
                return Err(VmError::InvalidRequest(format!("no such table: {table}")));
            }
            for col in &req.add_columns {
                validate_identifier("column", &col.name)?;
                let ty = storage_type(&col.name, &col.column_type)?;
                tx.execute_batch(&format!(
                    "ALTER TABLE {table_sql} ADD COLUMN {}",
                    column_definition(col, ty)
                ))?;
            }
            for rename in &req.alter_columns {
                validate_identifier("column", &rename.new_name)?;
                if rename.name == rename.new_name {
                    continue;
                }
                let existing = table_columns(&tx, table)?;
                if existing.iter().any(|c| c.eq_ignore_ascii_case(&rename.new_name)) {
                    return Err(VmError::ColumnExists {
                        table: table.to_string(),
                        column: rename.new_name.clone(),
                    });
                }
                tx.execute_batch(&format!(
                    "ALTER TABLE {table_sql} RENAME COLUMN {} TO {}",
                    quote_ident(&rename.name),
                    quote_ident(&rename.new_name)
                ))?;
            }
            for column in &req.drop_columns {
                tx.execute_batch(&format!(
                    "ALTER TABLE {table_sql} DROP COLUMN {}",
                    quote_ident(column)
                ))?;
            }
            tx.commit()?;
            Ok(())
        })?;
        info!(workspace_id, table, "[VmStore] Altered table");
        Ok(())
    }

    pub fn drop_table(&self, workspace_id: &str, table: &str) -> VmResult<()> {
        validate_identifier("table", table)?;
        self.with_conn(workspace_id, |conn| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
            Ok(())
        })?;
        warn!(workspace_id, table, "[VmStore] Dropped table");
        Ok(())
    }

    // ============================================================================
    // Introspection
    // ============================================================================

    pub fn list_tables(&self, workspace_id: &str) -> VmResult<Vec<TableInfo>> {
        self.with_conn(workspace_id, |conn| list_tables(conn))
    }

    pub fn table_names(&self, workspace_id: &str) -> VmResult<Vec<String>> {
        Ok(self
            .list_tables(workspace_id)?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    pub fn get_table_schema(&self, workspace_id: &str, table: &str) -> VmResult<TableSchema> {
        self.with_conn(workspace_id, |conn| {
            let mut columns = Vec::new();
            let mut primary_key = Vec::new();
            {
                let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let name: String = row.get(1)?;
                    let pk: i64 = row.get(5)?;
                    if pk > 0 {
                        primary_key.push(name.clone());
                    }
                    columns.push(ColumnInfo {
                        name,
                        column_type: row.get(2)?,
                        nullable: row.get::<_, i64>(3)? == 0,
                        default_value: row.get(4)?,
                        primary_key: pk > 0,
                        unique: false,
                    });
                }
            }
            if columns.is_empty() {
                return Err(VmError::InvalidRequest(format!("no such table: {table}")));
            }

            let mut foreign_keys = Vec::new();
            {
                let mut stmt =
                    conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    foreign_keys.push(ForeignKeyInfo {
                        table: row.get(2)?,
                        from: row.get(3)?,
                        to: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        on_update: row.get(5)?,
                        on_delete: row.get(6)?,
                    });
                }
            }

            let mut indexes = Vec::new();
            {
                let mut entries: Vec<(String, bool, String)> = Vec::new();
                let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", quote_ident(table)))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    entries.push((row.get(1)?, row.get::<_, i64>(2)? == 1, row.get(3)?));
                }
                drop(rows);
                for (name, unique, origin) in entries {
                    let mut info = conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&name)))?;
                    let cols = info
                        .query_map([], |row| row.get::<_, String>(2))?
                        .collect::<Result<Vec<_>, _>>()?;
                    indexes.push(IndexInfo {
                        name,
                        unique,
                        primary: origin == "pk",
                        columns: cols,
                    });
                }
            }
            for col in columns.iter_mut() {
                col.unique = indexes
                    .iter()
                    .any(|i| i.unique && i.columns.len() == 1 && i.columns[0] == col.name);
            }

            let ddl: Option<String> = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .ok()
                .flatten();

            Ok(TableSchema {
                name: table.to_string(),
                columns,
                primary_key,
                foreign_keys,
                indexes,
                ddl: ddl.unwrap_or_default(),
            })
        })
    }

    pub fn get_stats(&self, workspace_id: &str) -> VmResult<DatabaseStats> {
        let (tables, index_count, journal_mode) = self.with_conn(workspace_id, |conn| {
            let tables = list_tables(conn)?;
            let index_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index'",
                [],
                |row| row.get(0),
            )?;
            let journal_mode: String =
                conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
            Ok((tables, index_count, journal_mode))
        })?;
        let file_size_kb = std::fs::metadata(self.db_path(workspace_id))
            .map(|m| m.len() / 1024)
            .unwrap_or(0);
        Ok(DatabaseStats {
            table_count: tables.len(),
            total_rows: tables.iter().map(|t| t.row_count).sum(),
            index_count,
            file_size_kb,
            journal_mode,
        })
    }

    // ============================================================================
    // DML
    // ============================================================================

    /// Runs arbitrary SQL with positional parameters.
    ///
    /// Statements that produce columns are read (at most `MAX_RESULT_ROWS` rows,
    /// `truncated` set when more matched); everything else reports affected rows.
    pub fn execute_sql(
        &self,
        workspace_id: &str,
        sql: &str,
        params: &[Value],
    ) -> VmResult<QueryResult> {
        let start = Instant::now();
        let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let mut result = self.with_conn(workspace_id, |conn| {
            let mut stmt = conn.prepare(sql)?;
            if stmt.column_count() == 0 {
                let affected = stmt.execute(params_from_iter(bound.iter()))?;
                return Ok(QueryResult {
                    affected_rows: affected as u64,
                    ..Default::default()
                });
            }
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(bound.iter()))?;
            let mut out = Vec::new();
            let mut truncated = false;
            while let Some(row) = rows.next()? {
                if out.len() == MAX_RESULT_ROWS {
                    truncated = true;
                    break;
                }
                out.push(decode_row(row, &columns)?);
            }
            Ok(QueryResult {
                total_count: out.len() as u64,
                columns,
                rows: out,
                truncated,
                ..Default::default()
            })
        })?;
        result.duration_ms = start.elapsed().as_millis() as u64;
        debug!(workspace_id, duration_ms = result.duration_ms, "[VmStore] Executed SQL");
        Ok(result)
    }

    /// Inserts one row. Unknown columns are rejected by SQLite verbatim.
    pub fn insert_row(&self, workspace_id: &str, table: &str, data: &Row) -> VmResult<ExecResult> {
        if data.is_empty() {
            return Err(VmError::InvalidRequest(
                "insert requires at least one column".to_string(),
            ));
        }
        let columns: Vec<String> = data.keys().cloned().collect();
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            quote_ident(table),
            quote_list(&columns)
        );
        let values: Vec<SqlValue> = data.values().map(to_sql_value).collect();
        self.with_conn(workspace_id, |conn| {
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecResult {
                last_insert_id: conn.last_insert_rowid(),
                affected_rows: affected as u64,
            })
        })
    }

    /// Updates rows matching every `filter` column by equality.
    pub fn update_rows(
        &self,
        workspace_id: &str,
        table: &str,
        data: &Row,
        filter: &Row,
    ) -> VmResult<ExecResult> {
        if data.is_empty() {
            return Err(VmError::InvalidRequest(
                "update requires at least one column".to_string(),
            ));
        }
        if filter.is_empty() {
            return Err(VmError::InvalidRequest(
                "update requires a WHERE clause".to_string(),
            ));
        }
        let set = data
            .keys()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let cond = equality_clause(filter);
        let sql = format!("UPDATE {} SET {set} WHERE {cond}", quote_ident(table));
        let values: Vec<SqlValue> = data
            .values()
            .chain(filter.values())
            .map(to_sql_value)
            .collect();
        self.with_conn(workspace_id, |conn| {
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecResult {
                last_insert_id: 0,
                affected_rows: affected as u64,
            })
        })
    }

    /// Deletes rows matching every `filter` column by equality.
    pub fn delete_where(&self, workspace_id: &str, table: &str, filter: &Row) -> VmResult<ExecResult> {
        if filter.is_empty() {
            return Err(VmError::InvalidRequest(
                "delete requires a WHERE clause".to_string(),
            ));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(table),
            equality_clause(filter)
        );
        let values: Vec<SqlValue> = filter.values().map(to_sql_value).collect();
        self.with_conn(workspace_id, |conn| {
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecResult {
                last_insert_id: 0,
                affected_rows: affected as u64,
            })
        })
    }

    /// Deletes rows by primary key (falls back to `id` when the table declares none).
    pub fn delete_rows(&self, workspace_id: &str, table: &str, ids: &[Value]) -> VmResult<ExecResult> {
        if ids.is_empty() {
            return Err(VmError::InvalidRequest(
                "delete requires at least one id".to_string(),
            ));
        }
        let values: Vec<SqlValue> = ids.iter().map(to_sql_value).collect();
        self.with_conn(workspace_id, |conn| {
            let key = primary_key_column(conn, table)?;
            let marks = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({marks})",
                quote_ident(table),
                quote_ident(&key)
            );
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(ExecResult {
                last_insert_id: 0,
                affected_rows: affected as u64,
            })
        })
    }

    /// Returns the single primary key column of a table (or `id`).
    pub fn primary_key(&self, workspace_id: &str, table: &str) -> VmResult<String> {
        self.with_conn(workspace_id, |conn| primary_key_column(conn, table))
    }

    /// Paginated, filtered, ordered read of one table.
    pub fn query_rows(
        &self,
        workspace_id: &str,
        table: &str,
        params: &QueryParams,
    ) -> VmResult<RowsPage> {
        validate_identifier("table", table)?;
        let page = params.page.max(1);
        let page_size = match params.page_size {
            0 => 50,
            n => n.min(MAX_RESULT_ROWS),
        };
        let (cond, args) = where_clause(&params.filters, params.filter_combinator.as_deref())?;
        let where_sql = if cond.is_empty() {
            String::new()
        } else {
            format!(" WHERE {cond}")
        };
        let order_sql = match &params.order_by {
            Some(column) => {
                validate_identifier("column", column)?;
                let dir = match params.order_dir.as_deref() {
                    Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
                    _ => "ASC",
                };
                format!(" ORDER BY {} {dir}", quote_ident(column))
            }
            None => String::new(),
        };
        let table_sql = quote_ident(table);
        let offset = (page - 1) * page_size;

        self.with_conn(workspace_id, |conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {table_sql}{where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM {table_sql}{where_sql}{order_sql} LIMIT {page_size} OFFSET {offset}"
            ))?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(args.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(decode_row(row, &columns)?);
            }
            Ok(RowsPage {
                columns,
                rows: out,
                total: total.max(0) as u64,
                page,
                page_size,
            })
        })
    }
}

fn column_definition(col: &ColumnDef, storage: &str) -> String {
    let mut def = format!("{} {storage}", quote_ident(&col.name));
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default_literal(default));
    }
    if col.unique {
        def.push_str(" UNIQUE");
    }
    def
}

fn equality_clause(filter: &Row) -> String {
    filter
        .keys()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn decode_row(row: &rusqlite::Row<'_>, columns: &[String]) -> VmResult<Row> {
    let mut map = Row::new();
    for (i, name) in columns.iter().enumerate() {
        map.insert(name.clone(), from_sql_value(row.get_ref(i)?));
    }
    Ok(map)
}

fn table_columns(conn: &Connection, table: &str) -> VmResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn primary_key_column(conn: &Connection, table: &str) -> VmResult<String> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let mut keys: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(5)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|(pk, _)| *pk > 0)
        .collect();
    keys.sort();
    Ok(keys
        .into_iter()
        .next()
        .map(|(_, name)| name)
        .unwrap_or_else(|| "id".to_string()))
}

fn list_tables(conn: &Connection) -> VmResult<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let row_count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), [], |row| {
                row.get(0)
            })
            .unwrap_or(0);
        let column_count = table_columns(conn, &name)?.len();
        tables.push(TableInfo {
            name,
            row_count,
            column_count,
        });
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::types::{ColumnRename, IndexDef, QueryFilter};
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, VmStore) {
        let dir = TempDir::new().unwrap();
        let store = VmStore::new(dir.path().join("vm"));
        (dir, store)
    }

    fn tasks_table() -> CreateTableRequest {
        CreateTableRequest {
            name: "tasks".to_string(),
            columns: vec![
                ColumnDef::new("id", "INTEGER").primary(),
                ColumnDef::new("title", "TEXT").not_null(),
                ColumnDef::new("done", "BOOLEAN"),
            ],
            primary_key: vec![],
            indexes: vec![],
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_db_creates_file_and_reuses_handle() {
        let (_dir, store) = store();
        let a = store.get_db("ws-1").unwrap();
        let b = store.get_db("ws-1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.exists("ws-1"));
        assert!(store.db_path("ws-1").ends_with("ws-1.sqlite"));
    }

    #[test]
    fn test_rejects_path_like_workspace_ids() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get_db("../escape"),
            Err(VmError::InvalidWorkspaceId(_))
        ));
    }

    #[test]
    fn test_delete_purges_files() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        store.delete("ws").unwrap();
        assert!(!store.exists("ws"));
        // reopening starts empty
        assert!(store.list_tables("ws").unwrap().is_empty());
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        store.create_table("ws", &tasks_table()).unwrap();
        let tables = store.list_tables("ws").unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "tasks");
        assert_eq!(tables[0].column_count, 3);
    }

    #[test]
    fn test_create_table_validation() {
        let (_dir, store) = store();
        let mut bad = tasks_table();
        bad.name = "1tasks".into();
        assert!(matches!(store.create_table("ws", &bad), Err(VmError::InvalidSchema(_))));

        let mut bad = tasks_table();
        bad.columns.push(ColumnDef::new("title", "TEXT"));
        assert!(matches!(store.create_table("ws", &bad), Err(VmError::InvalidSchema(_))));

        let mut bad = tasks_table();
        bad.columns[1].column_type = "VARCHAR".into();
        assert!(matches!(store.create_table("ws", &bad), Err(VmError::InvalidSchema(_))));

        let mut bad = tasks_table();
        bad.primary_key = vec!["missing".into()];
        assert!(matches!(store.create_table("ws", &bad), Err(VmError::InvalidSchema(_))));

        let mut bad = tasks_table();
        bad.columns.clear();
        assert!(matches!(store.create_table("ws", &bad), Err(VmError::InvalidSchema(_))));
    }

    #[test]
    fn test_integer_primary_key_autoincrements() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        let first = store
            .insert_row("ws", "tasks", &row(json!({"title": "a", "done": false})))
            .unwrap();
        let second = store
            .insert_row("ws", "tasks", &row(json!({"title": "b", "done": true})))
            .unwrap();
        assert_eq!(first.last_insert_id, 1);
        assert_eq!(second.last_insert_id, 2);
        let schema = store.get_table_schema("ws", "tasks").unwrap();
        assert_eq!(schema.primary_key, vec!["id".to_string()]);
        assert!(schema.ddl.contains("AUTOINCREMENT"));
    }

    #[test]
    fn test_composite_primary_key_and_indexes() {
        let (_dir, store) = store();
        store
            .create_table(
                "ws",
                &CreateTableRequest {
                    name: "memberships".into(),
                    columns: vec![
                        ColumnDef::new("team_id", "INTEGER").not_null(),
                        ColumnDef::new("user_id", "INTEGER").not_null(),
                        ColumnDef::new("email", "TEXT"),
                    ],
                    primary_key: vec!["team_id".into(), "user_id".into()],
                    indexes: vec![IndexDef {
                        name: None,
                        columns: vec!["email".into()],
                        unique: true,
                    }],
                },
            )
            .unwrap();
        let schema = store.get_table_schema("ws", "memberships").unwrap();
        assert_eq!(schema.primary_key.len(), 2);
        assert!(schema.ddl.contains("PRIMARY KEY"));
        let email = schema.columns.iter().find(|c| c.name == "email").unwrap();
        assert!(email.unique);
        assert!(store.get_stats("ws").unwrap().index_count >= 1);
    }

    #[test]
    fn test_alter_table_applies_in_order() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        store
            .alter_table(
                "ws",
                "tasks",
                &AlterTableRequest {
                    add_columns: vec![ColumnDef::new("due", "DATETIME")],
                    alter_columns: vec![ColumnRename {
                        name: "due".into(),
                        new_name: "due_at".into(),
                    }],
                    drop_columns: vec!["done".into()],
                },
            )
            .unwrap();
        let schema = store.get_table_schema("ws", "tasks").unwrap();
        let names: Vec<_> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "due_at"]);
    }

    #[test]
    fn test_alter_table_rolls_back_on_conflict() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        let err = store
            .alter_table(
                "ws",
                "tasks",
                &AlterTableRequest {
                    add_columns: vec![ColumnDef::new("notes", "TEXT")],
                    alter_columns: vec![ColumnRename {
                        name: "notes".into(),
                        new_name: "title".into(),
                    }],
                    drop_columns: vec![],
                },
            )
            .unwrap_err();
        assert!(matches!(err, VmError::ColumnExists { .. }));
        let schema = store.get_table_schema("ws", "tasks").unwrap();
        assert!(!schema.columns.iter().any(|c| c.name == "notes"));
    }

    #[test]
    fn test_execute_sql_select_and_write() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        let write = store
            .execute_sql("ws", "INSERT INTO tasks (title) VALUES (?1), (?2)", &[json!("a"), json!("b")])
            .unwrap();
        assert_eq!(write.affected_rows, 2);
        assert!(write.columns.is_empty());

        let read = store
            .execute_sql("ws", "SELECT id, title, done FROM tasks ORDER BY id", &[])
            .unwrap();
        assert_eq!(read.columns, vec!["id", "title", "done"]);
        assert_eq!(read.rows.len(), 2);
        assert_eq!(read.rows[0]["title"], json!("a"));
        assert_eq!(read.rows[0]["done"], Value::Null);
        assert!(!read.truncated);
    }

    #[test]
    fn test_execute_sql_caps_rows() {
        let (_dir, store) = store();
        let read = store
            .execute_sql(
                "ws",
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1500) SELECT x FROM n",
                &[],
            )
            .unwrap();
        assert_eq!(read.rows.len(), MAX_RESULT_ROWS);
        assert!(read.truncated);
    }

    #[test]
    fn test_sql_errors_are_verbatim() {
        let (_dir, store) = store();
        let err = store.execute_sql("ws", "SELECT * FROM nope", &[]).unwrap_err();
        assert!(err.to_string().contains("no such table: nope"));
    }

    #[test]
    fn test_update_and_delete_rows() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        for title in ["a", "b", "c"] {
            store.insert_row("ws", "tasks", &row(json!({"title": title}))).unwrap();
        }
        let updated = store
            .update_rows("ws", "tasks", &row(json!({"done": true})), &row(json!({"id": 2})))
            .unwrap();
        assert_eq!(updated.affected_rows, 1);
        assert!(store.update_rows("ws", "tasks", &row(json!({"done": 1})), &Row::new()).is_err());

        let deleted = store.delete_rows("ws", "tasks", &[json!(1), json!(3)]).unwrap();
        assert_eq!(deleted.affected_rows, 2);
        assert!(store.delete_rows("ws", "tasks", &[]).is_err());
        assert_eq!(store.list_tables("ws").unwrap()[0].row_count, 1);
    }

    #[test]
    fn test_query_rows_paginates_and_filters() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        for i in 0..7 {
            store
                .insert_row("ws", "tasks", &row(json!({"title": format!("t{i}"), "done": i % 2})))
                .unwrap();
        }
        let page = store
            .query_rows(
                "ws",
                "tasks",
                &QueryParams {
                    page: 2,
                    page_size: 2,
                    order_by: Some("id".into()),
                    order_dir: Some("desc".into()),
                    filters: vec![QueryFilter {
                        column: "done".into(),
                        operator: "=".into(),
                        value: "0".into(),
                    }],
                    filter_combinator: None,
                },
            )
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["title"], json!("t2"));
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = store();
        store.create_table("ws", &tasks_table()).unwrap();
        store.insert_row("ws", "tasks", &row(json!({"title": "a"}))).unwrap();
        let stats = store.get_stats("ws").unwrap();
        assert_eq!(stats.table_count, 1);
        assert_eq!(stats.total_rows, 1);
        assert_eq!(stats.journal_mode.to_lowercase(), "wal");
    }
}
