//! Error types for the IndexedDB engine

use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::DomException;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// A DOM failure as the browser reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomError {
    /// Exception name, e.g. `ConstraintError` or `VersionError`
    pub name: String,
    pub message: String,
}

impl DomError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn from_exception(exception: &DomException) -> Self {
        Self::new(exception.name(), exception.message())
    }

    /// Read name and message off whatever the browser threw or rejected with.
    pub fn from_js(val: &JsValue) -> Self {
        if let Some(exception) = val.dyn_ref::<DomException>() {
            return Self::from_exception(exception);
        }
        if let Some(error) = val.dyn_ref::<js_sys::Error>() {
            return Self::new(String::from(error.name()), String::from(error.message()));
        }
        let message = val
            .as_string()
            .or_else(|| {
                js_sys::JSON::stringify(val)
                    .ok()
                    .and_then(|s| s.as_string())
            })
            .unwrap_or_else(|| format!("{:?}", val));
        Self::new("Error", message)
    }
}

impl std::fmt::Display for DomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Errors that can occur during IndexedDB storage operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open/upgrade error
    #[error("IndexedDB open error: {0}")]
    Open(DomError),

    /// Transaction aborted or errored
    #[error("IndexedDB transaction error: {0}")]
    Transaction(DomError),

    /// Request could not be issued or its result read
    #[error("IndexedDB request error: {0}")]
    Request(DomError),

    /// JS value is not a valid key
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Value could not cross the JSON boundary
    #[error("JSON error: {0}")]
    Json(String),
}

impl IndexedDbError {
    /// The DOM exception name for browser failures, or a fixed name for local ones.
    pub fn name(&self) -> &str {
        match self {
            IndexedDbError::NotAvailable(_) => "NotSupportedError",
            IndexedDbError::Open(e) | IndexedDbError::Transaction(e) | IndexedDbError::Request(e) => {
                &e.name
            }
            IndexedDbError::InvalidKey(_) => "DataError",
            IndexedDbError::Json(_) => "DataCloneError",
        }
    }
}

impl From<serde_json::Error> for IndexedDbError {
    fn from(err: serde_json::Error) -> Self {
        IndexedDbError::Json(err.to_string())
    }
}

/// Surface as a JS `Error` carrying the DOM exception name.
impl From<IndexedDbError> for JsValue {
    fn from(err: IndexedDbError) -> Self {
        let js_err = js_sys::Error::new(&err.to_string());
        js_err.set_name(err.name());
        js_err.into()
    }
}
