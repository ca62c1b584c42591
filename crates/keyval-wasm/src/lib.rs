//! Browser WASM bindings for the keyval store
//!
//! Exposes the IndexedDB-backed store to JavaScript through wasm-bindgen:
//!
//! - a `Store` class for an explicit (database, object store) pair
//! - `get`, `set`, `del`, `clear` and `keys` functions bound to the default store
//!
//! Every operation returns a Promise. Rejections are JS `Error`s whose `name` is the
//! DOM exception name IndexedDB reported (`ConstraintError`, `VersionError`, ...).
//! Values are stored as the browser structured-clones them, so Dates, typed arrays,
//! Maps and Sets come back as they went in; a missing key resolves to `undefined`.

use std::rc::Rc;

use js_sys::{Array, Promise};
use keyval_indexeddb::convert::{js_to_key, key_to_js};
use keyval_indexeddb::store::{get_js, set_js};
use keyval_indexeddb::{default_store, open_store, IdbStore};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

#[wasm_bindgen(start)]
pub fn start() {
    // Route Rust panics to console.error instead of "RuntimeError: unreachable"
    console_error_panic_hook::set_once();
}

/// Store handle on one database and object store.
#[wasm_bindgen(js_name = Store)]
pub struct WasmStore {
    inner: Rc<IdbStore>,
}

#[wasm_bindgen(js_class = Store)]
impl WasmStore {
    /// `new Store(dbName?, storeName?)`; omitted names use the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(db_name: Option<String>, store_name: Option<String>) -> WasmStore {
        let defaults = keyval_core::StoreConfig::default();
        let db_name = db_name.unwrap_or(defaults.database_name);
        let store_name = store_name.unwrap_or(defaults.area_name);
        WasmStore {
            inner: Rc::new(open_store(&db_name, &store_name)),
        }
    }

    #[wasm_bindgen(getter = dbName)]
    pub fn db_name(&self) -> String {
        self.inner.config().database_name.clone()
    }

    #[wasm_bindgen(getter = storeName)]
    pub fn store_name(&self) -> String {
        self.inner.config().area_name.clone()
    }

    pub fn get(&self, key: JsValue) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move { get_in(&store, key).await })
    }

    pub fn set(&self, key: JsValue, value: JsValue) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move { set_in(&store, key, value).await })
    }

    pub fn del(&self, key: JsValue) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move { del_in(&store, key).await })
    }

    pub fn clear(&self) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move { clear_in(&store).await })
    }

    pub fn keys(&self) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move { keys_in(&store).await })
    }
}

// ============================================================================
// Default store
// ============================================================================

/// Value under `key` in the default store, or `undefined`.
#[wasm_bindgen]
pub async fn get(key: JsValue) -> Result<JsValue, JsValue> {
    get_in(&default_store(), key).await
}

/// Store `value` under `key` in the default store.
#[wasm_bindgen]
pub async fn set(key: JsValue, value: JsValue) -> Result<JsValue, JsValue> {
    set_in(&default_store(), key, value).await
}

/// Remove `key` from the default store.
#[wasm_bindgen]
pub async fn del(key: JsValue) -> Result<JsValue, JsValue> {
    del_in(&default_store(), key).await
}

/// Remove every entry from the default store.
#[wasm_bindgen]
pub async fn clear() -> Result<JsValue, JsValue> {
    clear_in(&default_store()).await
}

/// All keys of the default store, ascending.
#[wasm_bindgen]
pub async fn keys() -> Result<JsValue, JsValue> {
    keys_in(&default_store()).await
}

// ============================================================================
// Shared operation bodies
// ============================================================================

async fn get_in(store: &IdbStore, key: JsValue) -> Result<JsValue, JsValue> {
    let key = js_to_key(&key)?;
    Ok(get_js(store, &key).await?)
}

async fn set_in(store: &IdbStore, key: JsValue, value: JsValue) -> Result<JsValue, JsValue> {
    let key = js_to_key(&key)?;
    set_js(store, &key, &value).await?;
    Ok(JsValue::UNDEFINED)
}

async fn del_in(store: &IdbStore, key: JsValue) -> Result<JsValue, JsValue> {
    let key = js_to_key(&key)?;
    store.delete(key).await?;
    Ok(JsValue::UNDEFINED)
}

async fn clear_in(store: &IdbStore) -> Result<JsValue, JsValue> {
    store.clear().await?;
    Ok(JsValue::UNDEFINED)
}

async fn keys_in(store: &IdbStore) -> Result<JsValue, JsValue> {
    let keys = store.keys().await?;
    tracing::trace!(count = keys.len(), "listed keys");
    Ok(keys.iter().map(key_to_js).collect::<Array>().into())
}
