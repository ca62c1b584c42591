//! In-memory engine
//!
//! A BTreeMap-based engine with the same request and transaction semantics as
//! IndexedDB: requests queue inside a transaction, run when control returns to the
//! executor, and commit all-or-nothing. Useful for:
//! - Unit testing the store handle without a browser
//! - Native processes that don't need persistence
//!
//! It also carries a few hooks for tests: open and upgrade counters, an injected open
//! failure, keys whose puts fail, and switching off key-only cursors.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::ops::Bound::{Excluded, Unbounded};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use thiserror::Error;

use crate::engine::{
    AccessMode, Connection, Cursor, CursorHandler, Engine, StorageArea, Transaction,
    UpgradeHandler, ValueRequest,
};
use crate::{Key, Value};

/// Errors raised by the in-memory engine. Names mirror the DOMException names an
/// IndexedDB engine reports for the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Key is not a valid key (NaN number or date)
    #[error("DataError: invalid key {0}")]
    Data(String),

    /// Write request in a read-only transaction
    #[error("ReadOnlyError: transaction is read-only")]
    ReadOnly,

    /// Storage area does not exist
    #[error("NotFoundError: no storage area named '{0}'")]
    NotFound(String),

    /// Database is stored at a higher version than requested
    #[error("VersionError: requested version {requested} is less than stored version {stored}")]
    Version { requested: u32, stored: u32 },

    /// A request violated a constraint
    #[error("ConstraintError: {0}")]
    Constraint(String),

    /// Operation issued outside the state that allows it
    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    /// Transaction was aborted
    #[error("AbortError: transaction was aborted")]
    Aborted,

    /// Injected open failure
    #[error("open failed: {0}")]
    Open(String),
}

type Entries = BTreeMap<Key, Value>;

#[derive(Debug, Default)]
struct Database {
    version: u32,
    areas: HashMap<String, Entries>,
}

#[derive(Debug, Default)]
struct EngineState {
    databases: HashMap<String, Rc<RefCell<Database>>>,
    opens: usize,
    upgrades: usize,
    open_failure: Option<MemoryError>,
    failing_puts: Vec<Key>,
}

/// In-memory transactional engine.
///
/// Clones share the same databases, so a test can keep one clone for inspection while a
/// store handle owns another.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    state: Rc<RefCell<EngineState>>,
    key_cursor: bool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Create an engine with no databases.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(EngineState::default())),
            key_cursor: true,
        }
    }

    /// Report key-only cursors as unsupported, forcing callers onto full cursors.
    pub fn without_key_cursor(mut self) -> Self {
        self.key_cursor = false;
        self
    }

    /// Make every subsequent open fail with `error`.
    pub fn fail_open_with(&self, error: MemoryError) {
        self.state.borrow_mut().open_failure = Some(error);
    }

    /// Let opens succeed again after [`fail_open_with`](Self::fail_open_with).
    pub fn clear_open_failure(&self) {
        self.state.borrow_mut().open_failure = None;
    }

    /// Make puts to `key` fail with a constraint error when their transaction runs.
    pub fn fail_puts_to(&self, key: impl Into<Key>) {
        self.state.borrow_mut().failing_puts.push(key.into());
    }

    /// Number of times `open` has been called.
    pub fn open_count(&self) -> usize {
        self.state.borrow().opens
    }

    /// Number of upgrades that ran to completion.
    pub fn upgrade_count(&self) -> usize {
        self.state.borrow().upgrades
    }

    /// Stored version of a database, if it exists.
    pub fn version(&self, database: &str) -> Option<u32> {
        self.state
            .borrow()
            .databases
            .get(database)
            .map(|db| db.borrow().version)
    }

    /// Committed entries of a storage area, in key order.
    pub fn entries(&self, database: &str, area: &str) -> Option<Vec<(Key, Value)>> {
        let state = self.state.borrow();
        let db = state.databases.get(database)?.borrow();
        db.areas
            .get(area)
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Engine for MemoryEngine {
    type Error = MemoryError;
    type Connection = MemoryConnection;

    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler<MemoryConnection>,
    ) -> LocalBoxFuture<'static, Result<MemoryConnection, MemoryError>> {
        let state = self.state.clone();
        let key_cursor = self.key_cursor;
        let name = name.to_string();
        state.borrow_mut().opens += 1;

        Box::pin(async move {
            YieldNow::default().await;

            let failure = state.borrow().open_failure.clone();
            if let Some(err) = failure {
                return Err(err);
            }

            let db = state
                .borrow_mut()
                .databases
                .entry(name.clone())
                .or_default()
                .clone();

            let stored = db.borrow().version;
            if stored > version {
                return Err(MemoryError::Version {
                    requested: version,
                    stored,
                });
            }

            if stored < version {
                tracing::debug!(database = %name, from = stored, to = version, "upgrading database");
                let backup = db.borrow().areas.clone();
                let upgrading = MemoryConnection {
                    db: db.clone(),
                    state: state.clone(),
                    key_cursor,
                    upgrading: true,
                };
                if let Err(err) = upgrade(&upgrading) {
                    tracing::warn!(database = %name, error = %err, "upgrade failed, rolling back");
                    db.borrow_mut().areas = backup;
                    return Err(err);
                }
                db.borrow_mut().version = version;
                state.borrow_mut().upgrades += 1;
            }

            Ok(MemoryConnection {
                db,
                state,
                key_cursor,
                upgrading: false,
            })
        })
    }
}

/// Open in-memory database.
#[derive(Debug)]
pub struct MemoryConnection {
    db: Rc<RefCell<Database>>,
    state: Rc<RefCell<EngineState>>,
    key_cursor: bool,
    upgrading: bool,
}

impl Connection for MemoryConnection {
    type Error = MemoryError;
    type Transaction = MemoryTransaction;

    fn has_area(&self, name: &str) -> bool {
        self.db.borrow().areas.contains_key(name)
    }

    fn create_area(&self, name: &str) -> Result<(), MemoryError> {
        if !self.upgrading {
            return Err(MemoryError::InvalidState(
                "storage areas can only be created during an upgrade".into(),
            ));
        }
        let mut db = self.db.borrow_mut();
        if db.areas.contains_key(name) {
            return Err(MemoryError::Constraint(format!(
                "storage area '{}' already exists",
                name
            )));
        }
        db.areas.insert(name.to_string(), Entries::new());
        Ok(())
    }

    fn transaction(&self, area: &str, mode: AccessMode) -> Result<MemoryTransaction, MemoryError> {
        if !self.has_area(area) {
            return Err(MemoryError::NotFound(area.to_string()));
        }
        Ok(MemoryTransaction {
            db: self.db.clone(),
            state: self.state.clone(),
            area: area.to_string(),
            pending: Rc::new(RefCell::new(Pending {
                mode,
                queue: VecDeque::new(),
                aborted: false,
                finished: false,
            })),
        })
    }

    fn supports_key_cursor(&self) -> bool {
        self.key_cursor
    }
}

enum Op {
    Get {
        key: Key,
        slot: Rc<RefCell<Option<Value>>>,
    },
    Put {
        key: Key,
        value: Value,
    },
    Delete {
        key: Key,
    },
    Clear,
    Cursor {
        handler: CursorHandler,
        after: Option<Key>,
        with_values: bool,
    },
}

struct Pending {
    mode: AccessMode,
    queue: VecDeque<Op>,
    aborted: bool,
    finished: bool,
}

/// Transaction over one in-memory storage area.
pub struct MemoryTransaction {
    db: Rc<RefCell<Database>>,
    state: Rc<RefCell<EngineState>>,
    area: String,
    pending: Rc<RefCell<Pending>>,
}

impl Transaction for MemoryTransaction {
    type Error = MemoryError;
    type Area = MemoryArea;

    fn area(&self) -> Result<MemoryArea, MemoryError> {
        Ok(MemoryArea {
            pending: self.pending.clone(),
        })
    }

    fn abort(&self) {
        let mut pending = self.pending.borrow_mut();
        if !pending.finished {
            pending.aborted = true;
            pending.queue.clear();
        }
    }

    fn finish(self) -> LocalBoxFuture<'static, Result<(), MemoryError>> {
        Box::pin(async move {
            YieldNow::default().await;

            let result = self.run();
            let mut pending = self.pending.borrow_mut();
            pending.finished = true;
            pending.queue.clear();
            result
        })
    }
}

impl MemoryTransaction {
    /// Execute queued requests against a working copy, committing it on success.
    fn run(&self) -> Result<(), MemoryError> {
        if self.pending.borrow().aborted {
            return Err(MemoryError::Aborted);
        }

        let mut entries = self
            .db
            .borrow()
            .areas
            .get(&self.area)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(self.area.clone()))?;

        loop {
            let op = self.pending.borrow_mut().queue.pop_front();
            let Some(op) = op else { break };

            match op {
                Op::Get { key, slot } => {
                    *slot.borrow_mut() = entries.get(&key).cloned();
                }
                Op::Put { key, value } => {
                    if self.state.borrow().failing_puts.contains(&key) {
                        tracing::warn!(area = %self.area, key = %key, "put rejected, aborting transaction");
                        return Err(MemoryError::Constraint(format!("put to {} rejected", key)));
                    }
                    entries.insert(key, value);
                }
                Op::Delete { key } => {
                    entries.remove(&key);
                }
                Op::Clear => entries.clear(),
                Op::Cursor {
                    mut handler,
                    after,
                    with_values,
                } => {
                    let next = match &after {
                        Some(prev) => entries.range((Excluded(prev.clone()), Unbounded)).next(),
                        None => entries.iter().next(),
                    }
                    .map(|(k, v)| (k.clone(), v.clone()));

                    match next {
                        Some((key, value)) => {
                            let cursor = MemoryCursor {
                                key: key.clone(),
                                value: with_values.then_some(value),
                                advanced: Cell::new(false),
                                pending: self.pending.clone(),
                            };
                            handler(Some(&cursor));
                            if cursor.advanced.get() {
                                self.pending.borrow_mut().queue.push_back(Op::Cursor {
                                    handler,
                                    after: Some(key),
                                    with_values,
                                });
                            }
                        }
                        None => handler(None),
                    }
                }
            }

            if self.pending.borrow().aborted {
                return Err(MemoryError::Aborted);
            }
        }

        if self.pending.borrow().mode.is_writable() {
            self.db.borrow_mut().areas.insert(self.area.clone(), entries);
        }
        Ok(())
    }
}

/// Request interface of an in-memory storage area.
pub struct MemoryArea {
    pending: Rc<RefCell<Pending>>,
}

impl MemoryArea {
    fn issue(&self, op: Op, writes: bool) -> Result<(), MemoryError> {
        let mut pending = self.pending.borrow_mut();
        if pending.finished || pending.aborted {
            return Err(MemoryError::InvalidState("transaction is not active".into()));
        }
        if writes && !pending.mode.is_writable() {
            return Err(MemoryError::ReadOnly);
        }
        pending.queue.push_back(op);
        Ok(())
    }
}

fn check_key(key: &Key) -> Result<(), MemoryError> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(MemoryError::Data(key.to_string()))
    }
}

impl StorageArea for MemoryArea {
    type Error = MemoryError;
    type Get = MemoryGet;

    fn get(&self, key: &Key) -> Result<MemoryGet, MemoryError> {
        check_key(key)?;
        let slot = Rc::new(RefCell::new(None));
        self.issue(
            Op::Get {
                key: key.clone(),
                slot: slot.clone(),
            },
            false,
        )?;
        Ok(MemoryGet(slot))
    }

    fn put(&self, key: &Key, value: &Value) -> Result<(), MemoryError> {
        check_key(key)?;
        self.issue(
            Op::Put {
                key: key.clone(),
                value: value.clone(),
            },
            true,
        )
    }

    fn delete(&self, key: &Key) -> Result<(), MemoryError> {
        check_key(key)?;
        self.issue(Op::Delete { key: key.clone() }, true)
    }

    fn clear(&self) -> Result<(), MemoryError> {
        self.issue(Op::Clear, true)
    }

    fn open_key_cursor(&self, handler: CursorHandler) -> Result<(), MemoryError> {
        self.issue(
            Op::Cursor {
                handler,
                after: None,
                with_values: false,
            },
            false,
        )
    }

    fn open_cursor(&self, handler: CursorHandler) -> Result<(), MemoryError> {
        self.issue(
            Op::Cursor {
                handler,
                after: None,
                with_values: true,
            },
            false,
        )
    }
}

/// Result slot of an in-memory get request.
pub struct MemoryGet(Rc<RefCell<Option<Value>>>);

impl ValueRequest for MemoryGet {
    type Error = MemoryError;

    fn result(&self) -> Result<Option<Value>, MemoryError> {
        Ok(self.0.borrow().clone())
    }
}

struct MemoryCursor {
    key: Key,
    value: Option<Value>,
    advanced: Cell<bool>,
    pending: Rc<RefCell<Pending>>,
}

impl Cursor for MemoryCursor {
    fn key(&self) -> Key {
        self.key.clone()
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }

    fn advance(&self) {
        if self.advanced.replace(true) {
            // Advancing twice from one position aborts, as in IndexedDB.
            let mut pending = self.pending.borrow_mut();
            pending.aborted = true;
            pending.queue.clear();
        }
    }
}

/// Yields to the executor once, standing in for the event-loop turn between issuing
/// a request and its callback.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create_area(name: &'static str) -> UpgradeHandler<MemoryConnection> {
        Box::new(move |conn: &MemoryConnection| conn.create_area(name))
    }

    fn no_upgrade() -> UpgradeHandler<MemoryConnection> {
        Box::new(|_: &MemoryConnection| -> Result<(), MemoryError> { Ok(()) })
    }

    #[test]
    fn test_open_runs_upgrade_once() {
        let engine = MemoryEngine::new();

        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();
        assert!(conn.has_area("items"));
        assert_eq!(engine.version("db"), Some(1));

        // Already at version 1, so the second upgrade never runs.
        let conn = block_on(engine.open("db", 1, create_area("other"))).unwrap();
        assert!(!conn.has_area("other"));
        assert_eq!(engine.upgrade_count(), 1);
        assert_eq!(engine.open_count(), 2);
    }

    #[test]
    fn test_open_lower_version_fails() {
        let engine = MemoryEngine::new();
        block_on(engine.open("db", 2, no_upgrade())).unwrap();

        let err = block_on(engine.open("db", 1, no_upgrade())).unwrap_err();
        assert_eq!(
            err,
            MemoryError::Version {
                requested: 1,
                stored: 2
            }
        );
    }

    #[test]
    fn test_failed_upgrade_rolls_back() {
        let engine = MemoryEngine::new();
        let upgrade: UpgradeHandler<MemoryConnection> = Box::new(|conn: &MemoryConnection| {
            conn.create_area("items")?;
            Err(MemoryError::Constraint("boom".into()))
        });

        assert!(block_on(engine.open("db", 1, upgrade)).is_err());
        assert_eq!(engine.version("db"), Some(0));
        assert_eq!(engine.entries("db", "items"), None);
    }

    #[test]
    fn test_create_area_outside_upgrade() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, no_upgrade())).unwrap();
        assert!(matches!(
            conn.create_area("late"),
            Err(MemoryError::InvalidState(_))
        ));
    }

    #[test]
    fn test_transaction_on_missing_area() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, no_upgrade())).unwrap();
        assert!(matches!(
            conn.transaction("nope", AccessMode::ReadOnly),
            Err(MemoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_requests_run_on_finish() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();

        let tx = conn.transaction("items", AccessMode::ReadWrite).unwrap();
        let area = tx.area().unwrap();
        area.put(&Key::from("a"), &json!(1)).unwrap();
        let get = area.get(&Key::from("a")).unwrap();

        // Nothing has run yet.
        assert_eq!(get.result().unwrap(), None);
        assert_eq!(engine.entries("db", "items"), Some(vec![]));

        block_on(tx.finish()).unwrap();
        assert_eq!(get.result().unwrap(), Some(json!(1)));
        assert_eq!(
            engine.entries("db", "items"),
            Some(vec![(Key::from("a"), json!(1))])
        );
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();
        let tx = conn.transaction("items", AccessMode::ReadOnly).unwrap();
        let area = tx.area().unwrap();

        assert_eq!(area.put(&Key::from("a"), &json!(1)), Err(MemoryError::ReadOnly));
        assert_eq!(area.delete(&Key::from("a")), Err(MemoryError::ReadOnly));
        assert_eq!(area.clear(), Err(MemoryError::ReadOnly));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();
        let tx = conn.transaction("items", AccessMode::ReadWrite).unwrap();
        let area = tx.area().unwrap();

        assert!(matches!(
            area.put(&Key::from(f64::NAN), &json!(1)),
            Err(MemoryError::Data(_))
        ));
    }

    #[test]
    fn test_abort_discards_writes() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();
        let tx = conn.transaction("items", AccessMode::ReadWrite).unwrap();
        tx.area().unwrap().put(&Key::from("a"), &json!(1)).unwrap();
        tx.abort();

        assert_eq!(block_on(tx.finish()), Err(MemoryError::Aborted));
        assert_eq!(engine.entries("db", "items"), Some(vec![]));
    }

    #[test]
    fn test_cursor_stops_without_advance() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db", 1, create_area("items"))).unwrap();
        let tx = conn.transaction("items", AccessMode::ReadWrite).unwrap();
        let area = tx.area().unwrap();
        for k in ["x", "y", "z"] {
            area.put(&Key::from(k), &json!(k)).unwrap();
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        area.open_cursor(Box::new(move |step: Option<&dyn Cursor>| {
            if let Some(cursor) = step {
                sink.borrow_mut().push((cursor.key(), cursor.value()));
            }
        }))
        .unwrap();
        block_on(tx.finish()).unwrap();

        assert_eq!(*seen.borrow(), vec![(Key::from("x"), Some(json!("x")))]);
    }
}
