//! Per-workspace runtime: SQLite databases and JavaScript VMs.
//!
//! - `VmStore` owns one SQLite handle per workspace under `<data_root>/vm/`.
//! - `VmInstance` hosts a workspace's deployed logic in QuickJS with a `db` bridge.
//! - `VmPool` caches instances by `(workspace_id, code_hash)`.

mod error;
mod instance;
mod loader;
mod pool;
mod sql;
mod store;
mod types;

pub use error::{VmError, VmResult};
pub use instance::{Route, VmInstance, VmRequest, VmResponse, match_route};
pub use loader::{LoadedCode, StoreCodeLoader, VmCodeLoader, code_hash};
pub use pool::{PoolStats, VmPool};
pub use sql::{validate_identifier, validate_workspace_id};
pub use store::{DbHandle, VmStore};
pub use types::{
    ACCEPTED_COLUMN_TYPES, AlterTableRequest, ColumnDef, ColumnInfo, ColumnRename,
    CreateTableRequest, DatabaseStats, ExecResult, ForeignKeyInfo, IndexDef, IndexInfo,
    MAX_RESULT_ROWS, QueryFilter, QueryParams, QueryResult, Row, RowsPage, TableInfo, TableSchema,
};
