//! A compiled workspace script hosted in an embedded QuickJS runtime.
//!
//! The script sees a small CommonJS-like surface (`exports`, `module.exports`),
//! a `console` forwarded to tracing, and a `db` object bridged to the
//! workspace's SQLite database through `VmStore`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use appforge_core::config::VmConfig;
use chrono::{DateTime, Utc};
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Runtime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::error::{VmError, VmResult};
use super::store::VmStore;
use super::types::Row;

const PRELUDE: &str = r#"
var exports = {};
var module = { exports: exports };

function __fmt(args) {
  var parts = [];
  for (var i = 0; i < args.length; i++) {
    var a = args[i];
    parts.push(typeof a === "string" ? a : JSON.stringify(a));
  }
  return parts.join(" ");
}

var console = {
  log: function () { __host_log("info", __fmt(arguments)); },
  info: function () { __host_log("info", __fmt(arguments)); },
  debug: function () { __host_log("debug", __fmt(arguments)); },
  warn: function () { __host_log("warn", __fmt(arguments)); },
  error: function () { __host_log("error", __fmt(arguments)); }
};

function __host(op, args) {
  var reply = JSON.parse(__host_call(op, JSON.stringify(args)));
  if (reply.error !== undefined) { throw new Error(reply.error); }
  return reply.ok;
}

var db = {
  query: function (sql, params) { return __host("query", [sql, params || []]); },
  queryOne: function (sql, params) {
    var rows = __host("query", [sql, params || []]);
    return rows.length > 0 ? rows[0] : null;
  },
  exec: function (sql, params) { return __host("exec", [sql, params || []]); },
  insert: function (table, data) { return __host("insert", [table, data]); },
  update: function (table, data, where) { return __host("update", [table, data, where]); },
  delete: function (table, where) { return __host("delete", [table, where]); },
  tables: function () { return __host("tables", []); }
};

function __routes() {
  if (module.exports && module.exports.routes) { return module.exports.routes; }
  if (exports && exports.routes) { return exports.routes; }
  return {};
}

function __routeKeys() {
  return JSON.stringify(Object.keys(__routes()));
}

function __dispatch(key, reqJson) {
  var handler = __routes()[key];
  if (typeof handler !== "function") {
    return JSON.stringify({ status: 404, body: { error: "route not found" } });
  }
  var result = handler(JSON.parse(reqJson));
  if (result && typeof result.then === "function") {
    throw new Error("async route handlers are not supported");
  }
  if (result !== null && typeof result === "object" && typeof result.status === "number"
      && Object.prototype.hasOwnProperty.call(result, "body")) {
    return JSON.stringify({ status: result.status, body: result.body === undefined ? null : result.body });
  }
  return JSON.stringify({ status: 200, body: result === undefined ? null : result });
}
"#;

/// An HTTP-like request routed into the workspace script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl VmRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmResponse {
    pub status: u16,
    pub body: Value,
}

impl VmResponse {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// One entry of `exports.routes`, keyed `"METHOD /path/:param"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub key: String,
    pub method: String,
    segments: Vec<Segment>,
}

impl Route {
    pub fn parse(key: &str) -> Option<Self> {
        let (method, path) = key.trim().split_once(char::is_whitespace)?;
        let path = path.trim();
        if !path.starts_with('/') {
            return None;
        }
        let segments = split_path(path)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Static(s.to_string()),
            })
            .collect();
        Some(Self {
            key: key.to_string(),
            method: method.to_ascii_uppercase(),
            segments,
        })
    }

    /// Returns the captured params and the number of static segments matched.
    fn matches(&self, method: &str, path: &[&str]) -> Option<(BTreeMap<String, String>, usize)> {
        if !self.method.eq_ignore_ascii_case(method) || self.segments.len() != path.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        let mut statics = 0;
        for (segment, part) in self.segments.iter().zip(path) {
            match segment {
                Segment::Static(s) if s.as_str() == *part => statics += 1,
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some((params, statics))
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Picks the best matching route; static segments win over params.
pub fn match_route<'a>(
    routes: &'a [Route],
    method: &str,
    path: &str,
) -> Option<(&'a Route, BTreeMap<String, String>)> {
    let parts: Vec<&str> = split_path(path).collect();
    routes
        .iter()
        .filter_map(|r| r.matches(method, &parts).map(|(p, score)| (r, p, score)))
        .max_by_key(|(_, _, score)| *score)
        .map(|(r, p, _)| (r, p))
}

struct JsRuntime {
    // Dropped after the context.
    context: Context,
    _runtime: Runtime,
}

/// A compiled workspace script.
///
/// `handle` serialises calls through an internal mutex, so an instance may be
/// shared freely between tasks.
pub struct VmInstance {
    id: String,
    workspace_id: String,
    code_hash: String,
    routes: Vec<Route>,
    created_at: DateTime<Utc>,
    exec_timeout_ms: u64,
    epoch: Instant,
    deadline: Arc<AtomicU64>,
    js: Mutex<JsRuntime>,
}

impl std::fmt::Debug for VmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmInstance")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("code_hash", &self.code_hash)
            .field("routes", &self.route_keys())
            .finish()
    }
}

impl VmInstance {
    /// Compiles `code` into a fresh runtime wired to the workspace database.
    ///
    /// Empty code yields an instance with no routes.
    ///
    /// # Errors
    ///
    /// `Script` when the code fails to compile or throws at top level,
    /// `ScriptTimeout` when top-level evaluation exceeds the execution budget.
    pub fn build(
        store: Arc<VmStore>,
        workspace_id: &str,
        code: &str,
        code_hash: &str,
        config: &VmConfig,
    ) -> VmResult<Self> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(config.memory_limit_bytes);
        runtime.set_max_stack_size(1024 * 1024);

        let epoch = Instant::now();
        let deadline = Arc::new(AtomicU64::new(u64::MAX));
        let watched = Arc::clone(&deadline);
        runtime.set_interrupt_handler(Some(Box::new(move || {
            epoch.elapsed().as_millis() as u64 > watched.load(Ordering::Relaxed)
        })));

        let context = Context::full(&runtime)?;
        let ws = workspace_id.to_string();
        let timeout = config.exec_timeout_ms;

        let route_keys: Vec<String> = context.with(|ctx| -> VmResult<Vec<String>> {
            install_host(&ctx, Arc::clone(&store), ws.clone())?;
            eval_script(&ctx, PRELUDE)?;
            if !code.trim().is_empty() {
                let limit = elapsed_ms(epoch) + timeout;
                deadline.store(limit, Ordering::Relaxed);
                let evaluated = eval_script(&ctx, code);
                deadline.store(u64::MAX, Ordering::Relaxed);
                let expired = elapsed_ms(epoch) >= limit;
                evaluated.map_err(|e| timeout_or(e, expired, timeout))?;
            }
            let keys: String = ctx
                .eval::<String, _>("__routeKeys()")
                .catch(&ctx)
                .map_err(caught)?;
            serde_json::from_str(&keys).map_err(|e| VmError::Script(e.to_string()))
        })?;

        let routes: Vec<Route> = route_keys
            .iter()
            .filter_map(|key| {
                let route = Route::parse(key);
                if route.is_none() {
                    warn!(workspace_id, key = %key, "[VmInstance] Ignoring malformed route key");
                }
                route
            })
            .collect();

        let instance = Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            code_hash: code_hash.to_string(),
            routes,
            created_at: Utc::now(),
            exec_timeout_ms: timeout,
            epoch,
            deadline,
            js: Mutex::new(JsRuntime {
                context,
                _runtime: runtime,
            }),
        };
        info!(
            workspace_id,
            instance_id = %instance.id,
            routes = instance.routes.len(),
            "[VmInstance] Built VM"
        );
        Ok(instance)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn code_hash(&self) -> &str {
        &self.code_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn route_keys(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.key.as_str()).collect()
    }

    /// Routes a request into the script. Never fails: errors become 4xx/5xx responses.
    pub fn handle(&self, request: &VmRequest) -> VmResponse {
        let Some((route, params)) = match_route(&self.routes, &request.method, &request.path)
        else {
            return VmResponse::error(
                404,
                format!("no route for {} {}", request.method.to_ascii_uppercase(), request.path),
            );
        };

        let payload = json!({
            "method": request.method.to_ascii_uppercase(),
            "path": request.path,
            "params": params,
            "query": request.query,
            "headers": request.headers,
            "body": request.body,
        })
        .to_string();

        match self.dispatch(&route.key, &payload) {
            Ok(response) => response,
            Err(e) => {
                error!(
                    workspace_id = %self.workspace_id,
                    route = %route.key,
                    error = %e,
                    "[VmInstance] Route handler failed"
                );
                VmResponse::error(500, e.to_string())
            }
        }
    }

    fn dispatch(&self, key: &str, payload: &str) -> VmResult<VmResponse> {
        let js = self.js.lock().unwrap_or_else(PoisonError::into_inner);
        let limit = elapsed_ms(self.epoch) + self.exec_timeout_ms;
        self.deadline.store(limit, Ordering::Relaxed);
        let raw = js.context.with(|ctx| -> VmResult<String> {
            let dispatch: Function = ctx.globals().get("__dispatch")?;
            dispatch
                .call::<_, String>((key.to_string(), payload.to_string()))
                .catch(&ctx)
                .map_err(caught)
        });
        self.deadline.store(u64::MAX, Ordering::Relaxed);
        let expired = elapsed_ms(self.epoch) >= limit;
        let raw = raw.map_err(|e| timeout_or(e, expired, self.exec_timeout_ms))?;
        debug!(workspace_id = %self.workspace_id, key, "[VmInstance] Dispatched route");

        let reply: Value = serde_json::from_str(&raw).map_err(|e| VmError::Script(e.to_string()))?;
        let status = reply
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);
        Ok(VmResponse {
            status,
            body: reply.get("body").cloned().unwrap_or(Value::Null),
        })
    }
}

fn elapsed_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// Reclassifies an interrupted script as a timeout once the budget is spent.
fn timeout_or(err: VmError, expired: bool, budget_ms: u64) -> VmError {
    match err {
        VmError::Script(msg) if expired || msg.contains("interrupted") => {
            debug!(error = %msg, "[VmInstance] Script interrupted");
            VmError::ScriptTimeout(budget_ms)
        }
        other => other,
    }
}

fn caught(err: CaughtError<'_>) -> VmError {
    VmError::Script(err.to_string())
}

fn eval_script(ctx: &Ctx<'_>, source: &str) -> VmResult<()> {
    ctx.eval::<(), _>(source).catch(ctx).map_err(caught)
}

fn install_host(ctx: &Ctx<'_>, store: Arc<VmStore>, workspace_id: String) -> VmResult<()> {
    let globals = ctx.globals();

    let ws = workspace_id.clone();
    let host_call = Function::new(ctx.clone(), move |op: String, args: String| -> String {
        match host_call(&store, &ws, &op, &args) {
            Ok(value) => json!({ "ok": value }).to_string(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        }
    })?;
    globals.set("__host_call", host_call)?;

    let host_log = Function::new(ctx.clone(), move |level: String, message: String| {
        match level.as_str() {
            "error" => error!(target: "appforge::vm", workspace_id = %workspace_id, "{message}"),
            "warn" => warn!(target: "appforge::vm", workspace_id = %workspace_id, "{message}"),
            "debug" => debug!(target: "appforge::vm", workspace_id = %workspace_id, "{message}"),
            _ => info!(target: "appforge::vm", workspace_id = %workspace_id, "{message}"),
        }
    })?;
    globals.set("__host_log", host_log)?;
    Ok(())
}

fn arg_str(args: &[Value], index: usize, name: &str) -> VmResult<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VmError::InvalidRequest(format!("{name} must be a string")))
}

fn arg_object(args: &[Value], index: usize, name: &str) -> VmResult<Row> {
    args.get(index)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| VmError::InvalidRequest(format!("{name} must be an object")))
}

fn arg_params(args: &[Value], index: usize) -> Vec<Value> {
    match args.get(index) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

/// Executes one `db.*` call on behalf of the script.
fn host_call(store: &VmStore, workspace_id: &str, op: &str, args: &str) -> VmResult<Value> {
    let args: Vec<Value> =
        serde_json::from_str(args).map_err(|e| VmError::InvalidRequest(e.to_string()))?;
    let value = match op {
        "query" => {
            let sql = arg_str(&args, 0, "sql")?;
            let result = store.execute_sql(workspace_id, &sql, &arg_params(&args, 1))?;
            Value::Array(result.rows.into_iter().map(Value::Object).collect())
        }
        "exec" => {
            let sql = arg_str(&args, 0, "sql")?;
            let result = store.execute_sql(workspace_id, &sql, &arg_params(&args, 1))?;
            json!({ "affected_rows": result.affected_rows })
        }
        "insert" => {
            let table = arg_str(&args, 0, "table")?;
            let result = store.insert_row(workspace_id, &table, &arg_object(&args, 1, "data")?)?;
            json!({
                "id": result.last_insert_id,
                "last_insert_id": result.last_insert_id,
                "affected_rows": result.affected_rows,
            })
        }
        "update" => {
            let table = arg_str(&args, 0, "table")?;
            let result = store.update_rows(
                workspace_id,
                &table,
                &arg_object(&args, 1, "data")?,
                &arg_object(&args, 2, "where")?,
            )?;
            json!({ "affected_rows": result.affected_rows })
        }
        "delete" => {
            let table = arg_str(&args, 0, "table")?;
            let result =
                store.delete_where(workspace_id, &table, &arg_object(&args, 1, "where")?)?;
            json!({ "affected_rows": result.affected_rows })
        }
        "tables" => json!(store.table_names(workspace_id)?),
        other => {
            return Err(VmError::InvalidRequest(format!("unknown db operation {other:?}")));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::types::{ColumnDef, CreateTableRequest};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<VmStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VmStore::new(dir.path()));
        (dir, store)
    }

    fn config() -> VmConfig {
        VmConfig {
            exec_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_route_matching_prefers_static_segments() {
        let routes: Vec<Route> = ["GET /items/:id", "GET /items/new", "POST /items/:id"]
            .iter()
            .filter_map(|k| Route::parse(k))
            .collect();
        let (route, params) = match_route(&routes, "get", "/items/new").unwrap();
        assert_eq!(route.key, "GET /items/new");
        assert!(params.is_empty());

        let (route, params) = match_route(&routes, "GET", "/items/42/").unwrap();
        assert_eq!(route.key, "GET /items/:id");
        assert_eq!(params["id"], "42");

        assert!(match_route(&routes, "DELETE", "/items/42").is_none());
        assert!(Route::parse("no-path").is_none());
    }

    #[test]
    fn test_empty_code_has_no_routes() {
        let (_dir, store) = setup();
        let vm = VmInstance::build(store, "ws", "", "", &config()).unwrap();
        assert!(vm.route_keys().is_empty());
        assert_eq!(vm.handle(&VmRequest::new("GET", "/")).status, 404);
    }

    #[test]
    fn test_crud_routes_through_db_binding() {
        let (_dir, store) = setup();
        store
            .create_table(
                "ws",
                &CreateTableRequest {
                    name: "tasks".into(),
                    columns: vec![
                        ColumnDef::new("id", "INTEGER").primary(),
                        ColumnDef::new("title", "TEXT").not_null(),
                        ColumnDef::new("done", "INTEGER"),
                    ],
                    primary_key: vec![],
                    indexes: vec![],
                },
            )
            .unwrap();
        let code = r#"
            exports.routes = {
              "GET /tasks": function (ctx) { return db.query("SELECT * FROM tasks ORDER BY id"); },
              "POST /tasks": function (ctx) {
                var r = db.insert("tasks", { title: ctx.body.title, done: 0 });
                return { status: 201, body: r };
              },
              "GET /tasks/:id": function (ctx) {
                return db.queryOne("SELECT * FROM tasks WHERE id = ?", [ctx.params.id]);
              },
              "PUT /tasks/:id": function (ctx) {
                return db.update("tasks", { done: ctx.body.done }, { id: ctx.params.id });
              },
              "DELETE /tasks/:id": function (ctx) { return db.delete("tasks", { id: ctx.params.id }); }
            };
        "#;
        let vm = VmInstance::build(Arc::clone(&store), "ws", code, "h1", &config()).unwrap();
        assert_eq!(vm.route_keys().len(), 5);

        let created = vm.handle(&VmRequest::new("POST", "/tasks").with_body(json!({"title": "Buy milk"})));
        assert_eq!(created.status, 201);
        assert_eq!(created.body["id"], json!(1));

        let one = vm.handle(&VmRequest::new("GET", "/tasks/1"));
        assert_eq!(one.status, 200);
        assert_eq!(one.body["title"], json!("Buy milk"));

        let updated = vm.handle(&VmRequest::new("PUT", "/tasks/1").with_body(json!({"done": 1})));
        assert_eq!(updated.body["affected_rows"], json!(1));

        let deleted = vm.handle(&VmRequest::new("DELETE", "/tasks/1"));
        assert_eq!(deleted.body["affected_rows"], json!(1));

        let all = vm.handle(&VmRequest::new("GET", "/tasks"));
        assert_eq!(all.body, json!([]));
    }

    #[test]
    fn test_thrown_error_is_500() {
        let (_dir, store) = setup();
        let code = r#"exports.routes = { "GET /boom": function () { throw new Error("kaput"); } };"#;
        let vm = VmInstance::build(store, "ws", code, "h", &config()).unwrap();
        let response = vm.handle(&VmRequest::new("GET", "/boom"));
        assert_eq!(response.status, 500);
        assert!(response.body["error"].as_str().unwrap().contains("kaput"));
    }

    #[test]
    fn test_sql_error_surfaces_to_script() {
        let (_dir, store) = setup();
        let code = r#"exports.routes = { "GET /bad": function () { return db.query("SELECT * FROM missing"); } };"#;
        let vm = VmInstance::build(store, "ws", code, "h", &config()).unwrap();
        let response = vm.handle(&VmRequest::new("GET", "/bad"));
        assert_eq!(response.status, 500);
        assert!(response.body["error"].as_str().unwrap().contains("no such table"));
    }

    #[test]
    fn test_syntax_error_fails_build() {
        let (_dir, store) = setup();
        let err = VmInstance::build(store, "ws", "function( { broken", "h", &config()).unwrap_err();
        assert!(matches!(err, VmError::Script(_)));
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let (_dir, store) = setup();
        let code = r#"exports.routes = {
            "GET /loop": function () { while (true) {} },
            "GET /ok": function () { return { ok: true }; }
        };"#;
        let vm = VmInstance::build(store, "ws", code, "h", &config()).unwrap();
        let looping = vm.handle(&VmRequest::new("GET", "/loop"));
        assert_eq!(looping.status, 500);
        assert!(looping.body["error"].as_str().unwrap().contains("timed out"));
        // the instance stays usable afterwards
        assert_eq!(vm.handle(&VmRequest::new("GET", "/ok")).body, json!({"ok": true}));
    }

    #[test]
    fn test_query_and_headers_reach_handler() {
        let (_dir, store) = setup();
        let code = r#"module.exports = { routes: {
            "GET /echo": function (ctx) { return { q: ctx.query.search, ct: ctx.headers["content-type"] }; }
        } };"#;
        let vm = VmInstance::build(store, "ws", code, "h", &config()).unwrap();
        let mut request = VmRequest::new("GET", "/echo");
        request.query.insert("search".into(), "hello".into());
        request.headers.insert("content-type".into(), "application/json".into());
        let response = vm.handle(&request);
        assert_eq!(response.body, json!({"q": "hello", "ct": "application/json"}));
    }
}
