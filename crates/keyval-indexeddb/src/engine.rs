//! IndexedDB implementation of the keyval engine traits.

use futures::future::LocalBoxFuture;
use keyval_core::engine::{UpgradeHandler, ValueRequest};
use keyval_core::{
    AccessMode, Connection, Cursor, CursorHandler, Engine, Key, StorageArea, Transaction, Value,
};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{IdbCursor, IdbCursorWithValue, IdbDatabase, IdbObjectStore, IdbRequest, IdbTransactionMode};

use crate::convert::{js_to_key, js_to_value, key_to_js, value_to_js};
use crate::error::{DomError, IndexedDbError, Result};
use crate::idb;

fn request_failed(e: JsValue) -> IndexedDbError {
    IndexedDbError::Request(DomError::from_js(&e))
}

/// The browser's IndexedDB, reached through the global `indexedDB` factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdbEngine;

impl IdbEngine {
    pub fn new() -> Self {
        Self
    }

    /// Delete the database (for testing/cleanup).
    pub async fn delete_database(db_name: &str) -> Result<()> {
        idb::delete_database(db_name).await
    }
}

impl Engine for IdbEngine {
    type Error = IndexedDbError;
    type Connection = IdbConnection;

    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler<IdbConnection>,
    ) -> LocalBoxFuture<'static, Result<IdbConnection>> {
        let name = name.to_string();
        Box::pin(async move {
            let db = idb::open_database(&name, version, move |db: &IdbDatabase| {
                upgrade(&IdbConnection { db: db.clone() })
            })
            .await?;
            tracing::debug!(database = %name, version, "IndexedDB open");
            Ok(IdbConnection { db })
        })
    }
}

/// Open IndexedDB database.
#[derive(Debug, Clone)]
pub struct IdbConnection {
    db: IdbDatabase,
}

impl Connection for IdbConnection {
    type Error = IndexedDbError;
    type Transaction = IdbTransaction;

    fn has_area(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn create_area(&self, name: &str) -> Result<()> {
        self.db
            .create_object_store(name)
            .map(|_| ())
            .map_err(|e| IndexedDbError::Open(DomError::from_js(&e)))
    }

    fn transaction(&self, area: &str, mode: AccessMode) -> Result<IdbTransaction> {
        let mode = match mode {
            AccessMode::ReadOnly => IdbTransactionMode::Readonly,
            AccessMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let (tx, store) = idb::begin_transaction(&self.db, area, mode)?;
        Ok(IdbTransaction { tx, store })
    }

    fn supports_key_cursor(&self) -> bool {
        idb::key_cursor_supported()
    }
}

/// Transaction over one object store.
pub struct IdbTransaction {
    tx: web_sys::IdbTransaction,
    store: IdbObjectStore,
}

impl Transaction for IdbTransaction {
    type Error = IndexedDbError;
    type Area = IdbArea;

    fn area(&self) -> Result<IdbArea> {
        Ok(IdbArea {
            store: self.store.clone(),
            tx: self.tx.clone(),
        })
    }

    fn abort(&self) {
        idb::abort_transaction(&self.tx);
    }

    fn finish(self) -> LocalBoxFuture<'static, Result<()>> {
        // Listeners go on now, before control returns to the event loop.
        let done = wasm_bindgen_futures::JsFuture::from(idb::transaction_to_promise(&self.tx));
        Box::pin(async move {
            done.await
                .map(|_| ())
                .map_err(|e| IndexedDbError::Transaction(DomError::from_js(&e)))
        })
    }
}

/// Request interface of an object store inside a transaction.
pub struct IdbArea {
    store: IdbObjectStore,
    tx: web_sys::IdbTransaction,
}

impl IdbArea {
    /// Put a JS value under `key` as-is. The browser structured-clones it, so Dates,
    /// typed arrays, Maps and `undefined` are stored without going through JSON.
    pub fn put_js(&self, key: &Key, value: &JsValue) -> Result<()> {
        self.store
            .put_with_key(value, &key_to_js(key))
            .map(|_| ())
            .map_err(request_failed)
    }
}

impl StorageArea for IdbArea {
    type Error = IndexedDbError;
    type Get = IdbGet;

    fn get(&self, key: &Key) -> Result<IdbGet> {
        self.store
            .get(&key_to_js(key))
            .map(IdbGet)
            .map_err(request_failed)
    }

    fn put(&self, key: &Key, value: &Value) -> Result<()> {
        let value = value_to_js(value)?;
        self.store
            .put_with_key(&value, &key_to_js(key))
            .map(|_| ())
            .map_err(request_failed)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.store
            .delete(&key_to_js(key))
            .map(|_| ())
            .map_err(request_failed)
    }

    fn clear(&self) -> Result<()> {
        self.store.clear().map(|_| ()).map_err(request_failed)
    }

    fn open_key_cursor(&self, handler: CursorHandler) -> Result<()> {
        let req = self.store.open_key_cursor().map_err(request_failed)?;
        idb::drive_cursor(&req, &self.tx, handler);
        Ok(())
    }

    fn open_cursor(&self, handler: CursorHandler) -> Result<()> {
        let req = self.store.open_cursor().map_err(request_failed)?;
        idb::drive_cursor(&req, &self.tx, handler);
        Ok(())
    }
}

/// A get request; its result is read once the transaction completes.
pub struct IdbGet(IdbRequest);

impl ValueRequest for IdbGet {
    type Error = IndexedDbError;

    fn result(&self) -> Result<Option<Value>> {
        let result = self.0.result().map_err(request_failed)?;
        if result.is_undefined() {
            return Ok(None);
        }
        js_to_value(&result).map(Some)
    }
}

impl IdbGet {
    /// The stored JS value as the browser cloned it back, `undefined` when absent.
    pub fn result_js(&self) -> Result<JsValue> {
        self.0.result().map_err(request_failed)
    }
}

/// One position of an IndexedDB cursor, handed to a cursor handler.
pub struct IdbCursorStep {
    cursor: IdbCursor,
    key: Key,
    tx: web_sys::IdbTransaction,
}

impl IdbCursorStep {
    pub(crate) fn new(result: JsValue, tx: web_sys::IdbTransaction) -> Result<Self> {
        let cursor = result
            .dyn_into::<IdbCursor>()
            .map_err(|_| IndexedDbError::Request(DomError::new("TypeError", "result is not IdbCursor")))?;
        let key = js_to_key(&cursor.key().map_err(request_failed)?)?;
        Ok(Self { cursor, key, tx })
    }
}

impl Cursor for IdbCursorStep {
    fn key(&self) -> Key {
        self.key.clone()
    }

    fn value(&self) -> Option<Value> {
        let cursor = self.cursor.dyn_ref::<IdbCursorWithValue>()?;
        let value = cursor.value().ok()?;
        js_to_value(&value).ok()
    }

    fn advance(&self) {
        if let Err(e) = self.cursor.continue_() {
            tracing::error!("cursor continue failed, aborting: {:?}", e);
            idb::abort_transaction(&self.tx);
        }
    }
}
