//! IndexedDB store handles and the process-wide default store.
//!
//! Every operation is available as a method on an [`IdbStore`] for callers that manage
//! their own handle, and as a free function here that runs against the default store.

use std::cell::OnceCell;
use std::rc::Rc;

use keyval_core::{AccessMode, Key, StorageArea, StoreConfig, StoreHandle, Value};
use wasm_bindgen::JsValue;

use crate::engine::IdbEngine;
use crate::error::Result;

/// Store handle backed by the browser's IndexedDB.
pub type IdbStore = StoreHandle<IdbEngine>;

// WASM is single-threaded; a thread-local holder is the process-wide default.
thread_local! {
    static DEFAULT_STORE: OnceCell<Rc<IdbStore>> = const { OnceCell::new() };
}

/// Store handle on the given database and object store.
pub fn open_store(database_name: &str, store_name: &str) -> IdbStore {
    StoreHandle::with_config(IdbEngine::new(), StoreConfig::new(database_name, store_name))
}

/// The default store ("default_database" / "default_store"), created on first use and
/// kept for the rest of the page's lifetime.
pub fn default_store() -> Rc<IdbStore> {
    DEFAULT_STORE.with(|cell| {
        cell.get_or_init(|| {
            tracing::debug!("creating default store");
            Rc::new(StoreHandle::new(IdbEngine::new()))
        })
        .clone()
    })
}

/// Value stored under `key` in the default store.
pub async fn get(key: impl Into<Key>) -> Result<Option<Value>> {
    default_store().get(key).await
}

/// Store `value` under `key` in the default store.
pub async fn set(key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
    default_store().set(key, value).await
}

/// Remove `key` from the default store.
pub async fn del(key: impl Into<Key>) -> Result<()> {
    default_store().delete(key).await
}

/// Remove every entry from the default store.
pub async fn clear() -> Result<()> {
    default_store().clear().await
}

/// All keys of the default store in ascending order.
pub async fn keys() -> Result<Vec<Key>> {
    default_store().keys().await
}

// ============================================================================
// Raw JS values
// ============================================================================

/// JS value stored under `key` in `store`, or `undefined` if there is none.
///
/// Unlike [`StoreHandle::get`] the value is not mapped onto the JSON model: whatever
/// the browser structured-clones out of the object store is returned unchanged.
pub async fn get_js(store: &IdbStore, key: &Key) -> Result<JsValue> {
    let mut request = None;
    store
        .with_area(AccessMode::ReadOnly, |area| {
            request = Some(area.get(key)?);
            Ok(())
        })
        .await?;

    match request {
        Some(request) => request.result_js(),
        None => Ok(JsValue::UNDEFINED),
    }
}

/// Store a JS value under `key` in `store` exactly as the browser clones it.
pub async fn set_js(store: &IdbStore, key: &Key, value: &JsValue) -> Result<()> {
    store
        .with_area(AccessMode::ReadWrite, |area| area.put_js(key, value))
        .await
}
