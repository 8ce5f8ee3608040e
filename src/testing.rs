//! In-memory stand-ins for the vault used across unit tests.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::platform::types::*;
use crate::platform::{ApiTransport, QueryService, RoleResolver};
use crate::query::{Field, Literal, Predicate, Query, Row};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub params: Params,
}

type Handler = dyn Fn(HttpMethod, &str, &Params) -> CallResult<Value> + Send + Sync;

/// Transport that answers every call with a closure and records what it saw.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(HttpMethod, &str, &Params) -> CallResult<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn call(&self, method: HttpMethod, path: &str, params: &Params) -> CallResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            params: params.clone(),
        });
        (self.handler)(method, path, params)
    }
}

/// Record store that evaluates [`Query`] predicates against inserted rows.
#[derive(Default)]
pub struct InMemoryQueryService {
    tables: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
}

impl InMemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: &str, row: Value) {
        let Value::Object(map) = row else {
            panic!("rows must be JSON objects");
        };
        self.tables
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push(map);
    }

    /// Set `field` on every row of `target` whose `key` equals `key_value`.
    pub fn set_field(&self, target: &str, key: &str, key_value: &str, field: &str, value: Value) -> usize {
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(target) else {
            return 0;
        };
        let mut updated = 0;
        for row in rows.iter_mut().filter(|r| r.get(key).and_then(Value::as_str) == Some(key_value)) {
            row.insert(field.to_string(), value.clone());
            updated += 1;
        }
        updated
    }
}

fn compare(value: Option<&Value>, literal: &Literal) -> Option<Ordering> {
    let value = value?;
    match literal {
        Literal::Str(s) => value.as_str().map(|v| v.cmp(s.as_str())),
        Literal::Date(d) => value
            .as_str()
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
            .map(|v| v.cmp(d)),
        Literal::Bool(b) => value.as_bool().map(|v| v.cmp(b)),
    }
}

fn field_value<'a>(row: &'a Map<String, Value>, f: &Field) -> Option<&'a Value> {
    row.get(f.name())
}

fn row_matches(row: &Map<String, Value>, predicate: &Predicate) -> bool {
    let get = |f: &Field| field_value(row, f);
    match predicate {
        Predicate::Eq(f, v) => compare(get(f), v) == Some(Ordering::Equal),
        Predicate::Ne(f, v) => compare(get(f), v) != Some(Ordering::Equal),
        Predicate::Le(f, v) => matches!(compare(get(f), v), Some(Ordering::Less | Ordering::Equal)),
        Predicate::Between(f, lo, hi) => {
            matches!(compare(get(f), lo), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare(get(f), hi), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::Contains(f, values) => values
            .iter()
            .any(|v| compare(get(f), v) == Some(Ordering::Equal)),
        Predicate::SteadyState(f) => get(f).and_then(Value::as_str) == Some("steady"),
    }
}

#[async_trait]
impl QueryService for InMemoryQueryService {
    async fn query(&self, query: &Query) -> CallResult<Vec<Row>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(&query.target).map(Vec::as_slice).unwrap_or_default();

        Ok(rows
            .iter()
            .filter(|row| query.filters.iter().all(|p| row_matches(row, p)))
            .map(|row| {
                Row::from(
                    query
                        .fields
                        .iter()
                        .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
                        .collect::<Map<_, _>>(),
                )
            })
            .collect())
    }
}

#[derive(Default)]
struct VaultState {
    actions: HashMap<String, Vec<(String, String)>>,
    workflows: Vec<(String, String)>,
    fail_listing: bool,
    fail_flags: bool,
    failing_cancels: HashSet<String>,
    panicking_cancels: HashSet<String>,
    cancelled: Vec<String>,
    flagged: HashSet<String>,
    calls: Vec<RecordedCall>,
}

/// Routes REST calls the way the vault would for the endpoints the job uses.
///
/// Flag updates are written through to the shared [`InMemoryQueryService`] so
/// a later discovery run sees them.
pub struct FakeVault {
    queries: Arc<InMemoryQueryService>,
    state: Mutex<VaultState>,
}

impl FakeVault {
    pub fn new(queries: Arc<InMemoryQueryService>) -> Self {
        Self {
            queries,
            state: Mutex::new(VaultState::default()),
        }
    }

    pub fn add_action(&self, version: &str, label: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .actions
            .entry(version.to_string())
            .or_default()
            .push((label.to_string(), name.to_string()));
    }

    pub fn add_active_workflow(&self, document_id: &str, task_id: &str) {
        self.state
            .lock()
            .unwrap()
            .workflows
            .push((document_id.to_string(), task_id.to_string()));
    }

    pub fn fail_workflow_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn fail_flag_updates(&self) {
        self.state.lock().unwrap().fail_flags = true;
    }

    pub fn fail_cancel_for(&self, task_id: &str) {
        self.state.lock().unwrap().failing_cancels.insert(task_id.to_string());
    }

    pub fn panic_on_cancel(&self, task_id: &str) {
        self.state.lock().unwrap().panicking_cancels.insert(task_id.to_string());
    }

    pub fn cancelled_tasks(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn flagged(&self, version: &str) -> bool {
        self.state.lock().unwrap().flagged.contains(version)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn route(&self, method: HttpMethod, rest: &str, params: &Params) -> CallResult<Value> {
        let mut state = self.state.lock().unwrap();
        let ok = json!({"responseStatus": "SUCCESS"});

        match method {
            HttpMethod::Get if rest.ends_with("/lifecycle_actions") => {
                let key = version_key(rest.trim_end_matches("/lifecycle_actions"));
                let actions: Vec<Value> = state
                    .actions
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .map(|(label, name)| json!({"label__v": label, "name__v": name}))
                    .collect();
                Ok(json!({"responseStatus": "SUCCESS", "lifecycle_actions__v": actions}))
            }
            HttpMethod::Put if rest.contains("/lifecycle_actions/") => Ok(ok),
            HttpMethod::Post if rest == "object/workflow/actions/canceltasks" => {
                let ids = params
                    .iter()
                    .find(|(k, _)| k == "task_ids")
                    .map(|(_, v)| v.split(',').map(str::to_string).collect::<Vec<_>>())
                    .unwrap_or_default();
                if ids.iter().any(|id| state.panicking_cancels.contains(id)) {
                    drop(state);
                    panic!("cancel handler panicked");
                }
                if let Some(id) = ids.iter().find(|id| state.failing_cancels.contains(*id)) {
                    return Err(CallError::operation_failed(format!("Cancel failed for task {id}")));
                }
                state.cancelled.extend(ids);
                Ok(json!({"responseStatus": "SUCCESS", "data": {"job_id": 1}}))
            }
            HttpMethod::Post if rest == "query" => {
                if state.fail_listing {
                    return Err(CallError::operation_failed("Workflow query failed"));
                }
                let data: Vec<Value> = state
                    .workflows
                    .iter()
                    .map(|(doc, task)| json!({"workflow_document_id__v": doc, "task_id__v": task}))
                    .collect();
                Ok(json!({"responseStatus": "SUCCESS", "data": data}))
            }
            HttpMethod::Put if rest.starts_with("objects/documents/") => {
                if state.fail_flags {
                    return Err(CallError::new(
                        ErrorKind::Other("INSUFFICIENT_ACCESS".into()),
                        "Cannot update document fields",
                    ));
                }
                let key = version_key(rest);
                for (field, value) in params {
                    self.queries
                        .set_field("documents", "version_id", &key, field, Value::Bool(value == "true"));
                }
                state.flagged.insert(key);
                Ok(ok)
            }
            _ => Err(CallError::new(
                ErrorKind::Other("NOT_FOUND".into()),
                format!("No route for {method} {rest}"),
            )),
        }
    }
}

/// `objects/documents/7/versions/1/0` to `7_1_0`.
fn version_key(path: &str) -> String {
    let parts: Vec<&str> = path.trim_start_matches("objects/documents/").split('/').collect();
    match parts.as_slice() {
        [id, "versions", major, minor, ..] => format!("{id}_{major}_{minor}"),
        _ => path.to_string(),
    }
}

#[async_trait]
impl ApiTransport for FakeVault {
    async fn call(&self, method: HttpMethod, path: &str, params: &Params) -> CallResult<Value> {
        self.state.lock().unwrap().calls.push(RecordedCall {
            method,
            path: path.to_string(),
            params: params.clone(),
        });
        // "/api/v21.3/rest" -> "rest"
        let rest = path.splitn(4, '/').nth(3).unwrap_or_default();
        self.route(method, rest, params)
    }
}

/// Fixed role assignments keyed by version id and role.
#[derive(Default)]
pub struct StaticRoles {
    users: HashMap<(String, String), Vec<String>>,
    failing: bool,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, version: &str, role: &str, users: &[&str]) -> Self {
        self.users.insert(
            (version.to_string(), role.to_string()),
            users.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl RoleResolver for StaticRoles {
    async fn users_in_role(&self, version: &DocumentVersionId, role: &str) -> CallResult<Vec<String>> {
        if self.failing {
            return Err(CallError::new(
                ErrorKind::Other("INSUFFICIENT_ACCESS".into()),
                format!("Cannot read roles on {version}"),
            ));
        }
        Ok(self
            .users
            .get(&(version.to_string(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory sink for `tracing_subscriber::fmt` output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Run `f` with a plain-text fmt subscriber writing into this buffer.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
