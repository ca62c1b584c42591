//! Key and value conversion across the JS boundary
//!
//! Keys map onto the IndexedDB key kinds directly. `Value`s from the Rust API cross as
//! JSON: serialized with serde_json and parsed into plain JS structures, which the
//! browser then structured-clones into the store. JS callers that hold a `JsValue`
//! bypass this through [`store::get_js`](crate::store::get_js) and
//! [`store::set_js`](crate::store::set_js).

use js_sys::{Array, ArrayBuffer, Date, Reflect, Uint8Array};
use keyval_core::{Key, Value};
use wasm_bindgen::{JsCast, JsValue};

use crate::error::{DomError, IndexedDbError, Result};

/// Convert a key to the JS value IndexedDB expects.
pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::Date(ms) => Date::new(&JsValue::from_f64(*ms)).into(),
        Key::String(s) => JsValue::from_str(s),
        Key::Binary(bytes) => Uint8Array::from(bytes.as_slice()).buffer().into(),
        Key::Array(items) => items.iter().map(key_to_js).collect::<Array>().into(),
    }
}

/// Convert a JS key (as returned by a cursor, or passed in from JS) back to a `Key`.
pub fn js_to_key(val: &JsValue) -> Result<Key> {
    if let Some(n) = val.as_f64() {
        return Ok(Key::Number(n));
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::String(s));
    }
    if let Some(date) = val.dyn_ref::<Date>() {
        return Ok(Key::Date(date.get_time()));
    }
    if Array::is_array(val) {
        return Array::from(val)
            .iter()
            .map(|item| js_to_key(&item))
            .collect::<Result<Vec<_>>>()
            .map(Key::Array);
    }
    if let Some(buffer) = val.dyn_ref::<ArrayBuffer>() {
        return Ok(Key::Binary(Uint8Array::new(buffer).to_vec()));
    }
    if ArrayBuffer::is_view(val) {
        return view_bytes(val).map(Key::Binary);
    }
    Err(IndexedDbError::InvalidKey(format!("{:?}", val)))
}

/// Bytes covered by an `ArrayBufferView` (any typed array or a `DataView`).
fn view_bytes(view: &JsValue) -> Result<Vec<u8>> {
    let field = |name: &str| {
        Reflect::get(view, &JsValue::from_str(name))
            .map_err(|_| IndexedDbError::InvalidKey(format!("view without {}", name)))
    };
    let buffer = field("buffer")?
        .dyn_into::<ArrayBuffer>()
        .map_err(|_| IndexedDbError::InvalidKey("view over a shared buffer".into()))?;
    let offset = field("byteOffset")?.as_f64().unwrap_or(0.0) as u32;
    let length = field("byteLength")?.as_f64().unwrap_or(0.0) as u32;
    Ok(Uint8Array::new_with_byte_offset_and_length(&buffer, offset, length).to_vec())
}

/// Convert a value to a plain JS structure for storage.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let json = serde_json::to_string(value)?;
    js_sys::JSON::parse(&json).map_err(|e| IndexedDbError::Json(DomError::from_js(&e).to_string()))
}

/// Convert a stored JS structure back to a value.
pub fn js_to_value(val: &JsValue) -> Result<Value> {
    let json = js_sys::JSON::stringify(val)
        .map_err(|e| IndexedDbError::Json(DomError::from_js(&e).to_string()))?
        .as_string()
        .ok_or_else(|| IndexedDbError::Json("value has no JSON representation".into()))?;
    Ok(serde_json::from_str(&json)?)
}
