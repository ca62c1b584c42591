//! Browser tests for the IndexedDB engine
//!
//! Run with `wasm-pack test --headless --firefox crates/keyval-indexeddb`.

use std::cell::Cell;
use std::rc::Rc;

use js_sys::{Date, Map, Uint8Array};
use keyval_core::{AccessMode, Cursor, Engine, Key, StorageArea};
use keyval_indexeddb::store::{get_js, set_js};
use keyval_indexeddb::{
    default_store, open_store, store, IdbConnection, IdbEngine, IdbStore, IndexedDbError,
};
use serde_json::json;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

/// Each test gets its own database so runs don't see each other's entries.
async fn fresh_store(name: &str) -> IdbStore {
    IdbEngine::delete_database(name).await.unwrap();
    open_store(name, "entries")
}

#[wasm_bindgen_test]
async fn test_set_and_get() {
    let store = fresh_store("keyval-test-set-get").await;
    let value = json!({"subjects": ["ALICE"], "count": 2, "ok": true});

    store.set("a", value.clone()).await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), Some(value));
}

#[wasm_bindgen_test]
async fn test_get_nonexistent() {
    let store = fresh_store("keyval-test-missing").await;
    assert_eq!(store.get("missing").await.unwrap(), None);
}

#[wasm_bindgen_test]
async fn test_delete_and_clear() {
    let store = fresh_store("keyval-test-delete").await;

    store.set("a", 1).await.unwrap();
    store.set("b", 2).await.unwrap();
    store.delete("a").await.unwrap();
    store.delete("never-set").await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), None);

    store.clear().await.unwrap();
    assert!(store.keys().await.unwrap().is_empty());
}

#[wasm_bindgen_test]
async fn test_keys_in_key_order() {
    let store = fresh_store("keyval-test-keys").await;

    for key in ["b", "a", "c"] {
        store.set(key, key).await.unwrap();
    }
    store.set(7, "number").await.unwrap();
    store.set(Key::array([1, 2]), "array").await.unwrap();

    assert_eq!(
        store.keys().await.unwrap(),
        vec![
            Key::from(7),
            Key::from("a"),
            Key::from("b"),
            Key::from("c"),
            Key::array([1, 2]),
        ]
    );
}

#[wasm_bindgen_test]
async fn test_concurrent_first_use() {
    let store = fresh_store("keyval-test-concurrent").await;

    let (a, b, c) = futures::join!(store.set("x", 1), store.set("y", 2), store.set("z", 3));
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(
        store.keys().await.unwrap(),
        vec![Key::from("x"), Key::from("y"), Key::from("z")]
    );
}

#[wasm_bindgen_test]
async fn test_failed_transaction_keeps_nothing() {
    let store = fresh_store("keyval-test-abort").await;

    let result = store
        .with_area(AccessMode::ReadWrite, |area| {
            area.put(&Key::from("good"), &json!(1))?;
            // NaN is not a valid key; the request throws a DataError.
            area.put(&Key::from(f64::NAN), &json!(2))
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.name(), "DataError");
    assert_eq!(store.get("good").await.unwrap(), None);
}

#[wasm_bindgen_test]
async fn test_default_store_is_shared() {
    IdbEngine::delete_database("default_database").await.unwrap();

    store::set("shared", "yes").await.unwrap();
    assert!(std::rc::Rc::ptr_eq(&default_store(), &default_store()));
    assert_eq!(
        default_store().get("shared").await.unwrap(),
        Some(json!("yes"))
    );

    store::del("shared").await.unwrap();
    assert_eq!(store::get("shared").await.unwrap(), None);
    assert!(store::keys().await.unwrap().is_empty());
    store::clear().await.unwrap();
}

#[wasm_bindgen_test]
async fn test_js_values_keep_their_type() {
    let store = fresh_store("keyval-test-js-values").await;

    let date = Date::new(&JsValue::from_f64(0.0));
    set_js(&store, &Key::from("date"), &date.into()).await.unwrap();
    let back = get_js(&store, &Key::from("date")).await.unwrap();
    assert_eq!(back.dyn_into::<Date>().unwrap().get_time(), 0.0);

    let bytes = Uint8Array::from(&[1u8, 2, 3][..]);
    set_js(&store, &Key::from("bytes"), &bytes.into()).await.unwrap();
    let back = get_js(&store, &Key::from("bytes")).await.unwrap();
    assert_eq!(back.dyn_into::<Uint8Array>().unwrap().to_vec(), vec![1, 2, 3]);

    let map = Map::new();
    map.set(&"a".into(), &JsValue::from_f64(1.0));
    set_js(&store, &Key::from("map"), &map.into()).await.unwrap();
    let back = get_js(&store, &Key::from("map")).await.unwrap();
    let back = back.dyn_into::<Map>().unwrap();
    assert_eq!(back.get(&"a".into()).as_f64(), Some(1.0));

    let infinity = JsValue::from_f64(f64::INFINITY);
    set_js(&store, &Key::from("inf"), &infinity).await.unwrap();
    let back = get_js(&store, &Key::from("inf")).await.unwrap();
    assert_eq!(back.as_f64(), Some(f64::INFINITY));
}

#[wasm_bindgen_test]
async fn test_js_undefined_is_stored() {
    let store = fresh_store("keyval-test-js-undefined").await;

    set_js(&store, &Key::from("u"), &JsValue::UNDEFINED).await.unwrap();
    assert!(get_js(&store, &Key::from("u")).await.unwrap().is_undefined());
    assert_eq!(store.keys().await.unwrap(), vec![Key::from("u")]);
    assert!(get_js(&store, &Key::from("missing")).await.unwrap().is_undefined());
}

#[wasm_bindgen_test]
async fn test_failed_upgrade_reports_its_own_error() {
    let name = "keyval-test-upgrade";
    IdbEngine::delete_database(name).await.unwrap();

    let failure = IndexedDbError::InvalidKey("schema rejected".into());
    let expected = failure.clone();
    let result = IdbEngine
        .open(
            name,
            1,
            Box::new(move |_: &IdbConnection| -> Result<(), IndexedDbError> { Err(failure) }),
        )
        .await;
    assert_eq!(result.err(), Some(expected));

    // The aborted upgrade left nothing behind; a fresh handle sets the database up.
    let store = open_store(name, "entries");
    store.set("a", 1).await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
}

#[wasm_bindgen_test]
async fn test_stopped_cursor_releases_handler() {
    let store = fresh_store("keyval-test-cursor-stop").await;
    for key in ["a", "b", "c"] {
        store.set(key, key).await.unwrap();
    }

    let seen = Rc::new(Cell::new(0));
    let seen_in_handler = seen.clone();
    store
        .with_area(AccessMode::ReadOnly, move |area| {
            area.open_cursor(Box::new(move |step: Option<&dyn Cursor>| {
                // Take the first position and stop without advancing.
                if step.is_some() {
                    seen_in_handler.set(seen_in_handler.get() + 1);
                }
            }))
        })
        .await
        .unwrap();

    assert_eq!(seen.get(), 1);
    assert_eq!(Rc::strong_count(&seen), 1);
}
