//! keyval core
//!
//! A minimal key-value layer over a transactional object store. The heavy lifting
//! (durability, isolation, ordering) belongs to the engine; this crate only hides the
//! boilerplate around it:
//!
//! - lazily opening a single database and creating its storage area on first use
//! - wrapping every operation in a transaction whose completion settles one future
//! - listing keys by walking a cursor instead of a bulk key query
//!
//! Engines plug in through the traits in [`engine`]. The browser engine lives in
//! `keyval-indexeddb`; [`MemoryEngine`] reproduces the same semantics in memory for
//! tests and native use.
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use keyval_core::{Key, MemoryEngine, StoreHandle};
//! use serde_json::json;
//!
//! let store = StoreHandle::new(MemoryEngine::new());
//!
//! block_on(async {
//!     store.set("b", json!({"n": 2})).await.unwrap();
//!     store.set("a", json!([1, 2, 3])).await.unwrap();
//!
//!     assert_eq!(store.get("a").await.unwrap(), Some(json!([1, 2, 3])));
//!     assert_eq!(store.get("missing").await.unwrap(), None);
//!     assert_eq!(store.keys().await.unwrap(), vec![Key::from("a"), Key::from("b")]);
//! });
//! ```

pub mod config;
pub mod engine;
pub mod handle;
pub mod key;

pub use config::{StoreConfig, DB_VERSION, DEFAULT_AREA_NAME, DEFAULT_DATABASE_NAME};
pub use engine::memory::{MemoryEngine, MemoryError};
pub use engine::{AccessMode, Connection, Cursor, CursorHandler, Engine, StorageArea, Transaction};
pub use handle::StoreHandle;
pub use key::Key;

/// Values are opaque JSON documents; the engine stores whatever serializes.
pub type Value = serde_json::Value;
