//! IndexedDB engine for keyval (browser WASM)
//!
//! Implements the `keyval-core` engine traits on top of the browser's IndexedDB via
//! web-sys, so a `StoreHandle<IdbEngine>` gets:
//!
//! - one lazily opened database per handle, created at version 1 with a single object
//!   store on first use
//! - one IndexedDB transaction per operation, settling when it completes or aborts
//! - key listing through `openKeyCursor`, falling back to `openCursor` where the
//!   browser lacks it
//!
//! # Schema
//!
//! Entries live in one object store with out-of-line keys (no keyPath). Values are
//! plain JS structures parsed from their JSON form.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyval_indexeddb::{open_store, store};
//!
//! // Default database and store
//! store::set("theme", "dark").await?;
//! assert_eq!(store::get("theme").await?, Some("dark".into()));
//!
//! // Explicit handle
//! let drafts = open_store("notes", "drafts");
//! drafts.set("draft-1", serde_json::json!({"title": "hello"})).await?;
//! let keys = drafts.keys().await?;
//! ```

pub mod convert;
pub mod engine;
pub mod error;
pub mod idb;
pub mod store;

pub use engine::{IdbConnection, IdbEngine};
pub use error::{DomError, IndexedDbError, Result};
pub use store::{default_store, open_store, IdbStore};
