//! Browser tests for key and value conversion across the JS boundary

use js_sys::{ArrayBuffer, DataView, Date, Object, Uint16Array, Uint8Array};
use keyval_core::Key;
use keyval_indexeddb::convert::{js_to_key, js_to_value, key_to_js, value_to_js};
use keyval_indexeddb::IndexedDbError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_date_key_round_trip() {
    let key = Key::date(1_704_067_200_000.0);
    let js = key_to_js(&key);
    assert_eq!(js.dyn_ref::<Date>().map(Date::get_time), Some(1_704_067_200_000.0));
    assert_eq!(js_to_key(&js).unwrap(), key);
}

#[wasm_bindgen_test]
fn test_binary_key_round_trip() {
    let key = Key::Binary(vec![0, 1, 255]);
    let js = key_to_js(&key);
    assert!(js.is_instance_of::<ArrayBuffer>());
    assert_eq!(js_to_key(&js).unwrap(), key);
}

#[wasm_bindgen_test]
fn test_array_key_round_trip() {
    let key = Key::array([Key::from(1), Key::from("a"), Key::Binary(vec![7])]);
    assert_eq!(js_to_key(&key_to_js(&key)).unwrap(), key);
}

#[wasm_bindgen_test]
fn test_typed_array_views_are_binary_keys() {
    let words = Uint16Array::from(&[1u16, 0x0102][..]);
    assert_eq!(
        js_to_key(&words.into()).unwrap(),
        Key::Binary(vec![1, 0, 2, 1])
    );

    let bytes = Uint8Array::from(&[9u8, 1, 2, 3, 9][..]);
    let middle = bytes.subarray(1, 4);
    assert_eq!(js_to_key(&middle.into()).unwrap(), Key::Binary(vec![1, 2, 3]));
}

#[wasm_bindgen_test]
fn test_data_view_is_binary_key() {
    let buffer = Uint8Array::from(&[9u8, 4, 5, 9][..]).buffer();
    let view = DataView::new(&buffer, 1, 2);
    assert_eq!(js_to_key(&view.into()).unwrap(), Key::Binary(vec![4, 5]));
}

#[wasm_bindgen_test]
fn test_non_key_values_rejected() {
    for value in [Object::new().into(), JsValue::TRUE, JsValue::NULL] {
        let err = js_to_key(&value).unwrap_err();
        assert!(matches!(err, IndexedDbError::InvalidKey(_)));
        assert_eq!(err.name(), "DataError");
    }
}

#[wasm_bindgen_test]
fn test_json_value_round_trip() {
    let value = json!({"list": [1, "two", null], "flag": false});
    let js = value_to_js(&value).unwrap();
    assert!(js.is_object());
    assert_eq!(js_to_value(&js).unwrap(), value);
}
