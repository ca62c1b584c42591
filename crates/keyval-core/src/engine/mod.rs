//! Engine abstraction
//!
//! These traits describe the transactional object store a [`StoreHandle`] sits on top of.
//! They follow the IndexedDB request model:
//!
//! - **Engine**: opens a database at a version, running an upgrade callback when the
//!   stored version is lower than the one requested
//! - **Connection**: an open database; hands out transactions
//! - **Transaction**: scoped to one storage area and one [`AccessMode`]; settles exactly
//!   once, on completion or on abort/error
//! - **StorageArea**: issues requests inside a transaction. Requests only queue work;
//!   their results are readable after the transaction completes.
//!
//! Implementations exist for:
//!
//! - **Memory**: [`MemoryEngine`](memory::MemoryEngine), for testing and native use
//! - **IndexedDB**: browser storage via web-sys (separate crate, WASM only)
//!
//! Everything here is single-threaded: futures are `!Send` and shared state lives in
//! `Rc`/`RefCell`, matching the browser's event loop.
//!
//! [`StoreHandle`]: crate::StoreHandle

pub mod memory;

use futures::future::LocalBoxFuture;

use crate::{Key, Value};

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// One-time setup run by the engine while opening a database whose stored version is
/// lower than the requested one.
pub type UpgradeHandler<C> =
    Box<dyn FnOnce(&C) -> Result<(), <C as Connection>::Error>>;

/// Receives each cursor step. `None` means the cursor has run past the last entry and
/// will not call again.
pub type CursorHandler = Box<dyn FnMut(Option<&dyn Cursor>)>;

/// A transactional key-value engine.
pub trait Engine: 'static {
    type Error: std::error::Error + Clone + 'static;
    type Connection: Connection<Error = Self::Error>;

    /// Open (or create) the named database at `version`.
    ///
    /// `upgrade` runs before the open completes if the database did not exist or was
    /// stored at a lower version. If it fails, the open fails and the version is not
    /// bumped.
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler<Self::Connection>,
    ) -> LocalBoxFuture<'static, Result<Self::Connection, Self::Error>>;
}

/// An open database.
pub trait Connection: 'static {
    type Error: std::error::Error + Clone + 'static;
    type Transaction: Transaction<Error = Self::Error>;

    /// Whether a storage area with this name exists.
    fn has_area(&self, name: &str) -> bool;

    /// Create a storage area. Only valid during an upgrade.
    fn create_area(&self, name: &str) -> Result<(), Self::Error>;

    /// Begin a transaction scoped to a single storage area.
    fn transaction(&self, area: &str, mode: AccessMode) -> Result<Self::Transaction, Self::Error>;

    /// Whether storage areas can open key-only cursors. Probed once per connection.
    fn supports_key_cursor(&self) -> bool;
}

/// A transaction over one storage area.
pub trait Transaction {
    type Error: std::error::Error + Clone + 'static;
    type Area: StorageArea<Error = Self::Error>;

    /// The storage area this transaction is scoped to.
    fn area(&self) -> Result<Self::Area, Self::Error>;

    /// Abort the transaction. Nothing it issued is committed.
    fn abort(&self);

    /// Resolve once the transaction completes; reject with its error if it aborts
    /// or errors.
    fn finish(self) -> LocalBoxFuture<'static, Result<(), Self::Error>>;
}

/// Request interface of a storage area inside a transaction.
///
/// Every method only issues the request. A request that later fails aborts the
/// enclosing transaction.
pub trait StorageArea {
    type Error: std::error::Error + Clone + 'static;
    type Get: ValueRequest<Error = Self::Error>;

    fn get(&self, key: &Key) -> Result<Self::Get, Self::Error>;

    /// Store `value` under `key`, replacing any existing entry.
    fn put(&self, key: &Key, value: &Value) -> Result<(), Self::Error>;

    /// Remove the entry under `key`. Absent keys are not an error.
    fn delete(&self, key: &Key) -> Result<(), Self::Error>;

    /// Remove every entry.
    fn clear(&self) -> Result<(), Self::Error>;

    /// Walk keys in ascending order without loading values.
    fn open_key_cursor(&self, handler: CursorHandler) -> Result<(), Self::Error>;

    /// Walk entries in ascending key order, values included.
    fn open_cursor(&self, handler: CursorHandler) -> Result<(), Self::Error>;
}

/// A get request whose result is read after its transaction completes.
pub trait ValueRequest {
    type Error;

    /// `None` when the key was absent.
    fn result(&self) -> Result<Option<Value>, Self::Error>;
}

/// The current position of a cursor.
pub trait Cursor {
    fn key(&self) -> Key;

    /// `None` for key-only cursors.
    fn value(&self) -> Option<Value>;

    /// Move to the next entry. The handler is called again once the engine gets there.
    /// A failure to advance aborts the enclosing transaction.
    fn advance(&self);
}
