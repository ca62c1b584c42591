//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`, and drives cursors through
//! their success callbacks.

use js_sys::Promise;
use keyval_core::CursorHandler;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    IdbDatabase, IdbFactory, IdbObjectStore, IdbOpenDbRequest, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::engine::IdbCursorStep;
use crate::error::{DomError, IndexedDbError, Result};

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;

/// Type alias for upgrade closure to reduce complexity
type UpgradeClosure = Rc<RefCell<Option<Closure<dyn FnMut(web_sys::IdbVersionChangeEvent)>>>>;

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Whether object stores in this environment have `openKeyCursor`.
pub fn key_cursor_supported() -> bool {
    let global = js_sys::global();
    js_sys::Reflect::get(&global, &"IDBObjectStore".into())
        .and_then(|ctor| js_sys::Reflect::get(&ctor, &"prototype".into()))
        .and_then(|proto| js_sys::Reflect::has(&proto, &"openKeyCursor".into()))
        .unwrap_or(false)
}

/// Error carried by a failed request, or a generic one if the browser gave none.
fn request_error(req: &IdbRequest) -> JsValue {
    match req.error() {
        Ok(Some(exception)) => exception.into(),
        _ => js_sys::Error::new("unknown IDB error").into(),
    }
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's result.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req_success = req.clone();
    let req_error = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Store closures in Rc<RefCell> to manage their lifetime without leaking
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let req_s = req_success.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req_error.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::UNDEFINED, &request_error(&req_e));
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req_success.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req_error.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        // Keep both closures alive until one fires
        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction's outcome into a JS Promise.
///
/// Resolves on `complete`. Rejects on `error` with the failing request's exception
/// (the event bubbles up from it), or on `abort` with the transaction's error, which is
/// null for an explicit abort.
pub fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_e = tx.clone();
        let reject_e = reject.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |event: web_sys::Event| {
            let err = event
                .target()
                .and_then(|t| t.dyn_into::<IdbRequest>().ok())
                .map(|req| request_error(&req))
                .or_else(|| tx_e.error().map(JsValue::from))
                .unwrap_or_else(|| js_sys::Error::new("transaction error").into());
            let _ = reject_e.call1(&JsValue::UNDEFINED, &err);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_a = tx.clone();
        let closures_for_abort = closures.clone();
        let on_abort = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let err = tx_a.error().map(JsValue::from).unwrap_or_else(|| {
                let err = js_sys::Error::new("transaction was aborted");
                err.set_name("AbortError");
                err.into()
            });
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            *closures_for_abort.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Open (or create) a database at `version`.
///
/// `upgrade` runs inside `upgradeneeded`, i.e. only when the database is new or stored
/// at a lower version. If it fails, the versionchange transaction is aborted and the
/// open rejects with the upgrade's error.
pub async fn open_database<F>(db_name: &str, version: u32, upgrade: F) -> Result<IdbDatabase>
where
    F: FnOnce(&IdbDatabase) -> Result<()> + 'static,
{
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(db_name, version)
        .map_err(|e| IndexedDbError::Open(DomError::from_js(&e)))?;

    // Store upgrade closure to manage its lifetime without leaking
    let upgrade_closure: UpgradeClosure = Rc::new(RefCell::new(None));
    let upgrade_closure_for_drop = upgrade_closure.clone();

    // Set when the upgrade fails, so the open reports that instead of the AbortError
    let upgrade_error: Rc<RefCell<Option<IndexedDbError>>> = Rc::new(RefCell::new(None));
    let upgrade_error_for_open = upgrade_error.clone();

    let mut upgrade = Some(upgrade);
    let req_u = open_req.clone();
    let on_upgrade = Closure::wrap(Box::new(move |_event: web_sys::IdbVersionChangeEvent| {
        let Some(upgrade) = upgrade.take() else {
            return;
        };
        let db = match req_u.result().and_then(|r| r.dyn_into::<IdbDatabase>()) {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("upgradeneeded without a database: {:?}", e);
                return;
            }
        };
        if let Err(err) = upgrade(&db) {
            tracing::error!(error = %err, "database upgrade failed, aborting");
            *upgrade_error.borrow_mut() = Some(err);
            if let Some(tx) = req_u.transaction() {
                abort_transaction(&tx);
            }
        }
    }) as Box<dyn FnMut(web_sys::IdbVersionChangeEvent)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));

    // Store closure to keep it alive during the open request
    *upgrade_closure.borrow_mut() = Some(on_upgrade);

    let open_promise = request_to_promise(open_req.unchecked_ref());
    let result = wasm_bindgen_futures::JsFuture::from(open_promise)
        .await
        .map_err(|e| IndexedDbError::Open(DomError::from_js(&e)));

    // Clean up upgrade closure now that open has settled
    *upgrade_closure_for_drop.borrow_mut() = None;

    let opened = match result {
        Ok(opened) => opened,
        Err(err) => {
            let upgrade_error = upgrade_error_for_open.borrow_mut().take();
            return Err(upgrade_error.unwrap_or(err));
        }
    };
    opened
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open(DomError::new("TypeError", "result is not IdbDatabase")))
}

/// Start a transaction scoped to one object store.
pub fn begin_transaction(
    db: &IdbDatabase,
    store_name: &str,
    mode: IdbTransactionMode,
) -> Result<(IdbTransaction, IdbObjectStore)> {
    let tx = db
        .transaction_with_str_and_mode(store_name, mode)
        .map_err(|e| IndexedDbError::Transaction(DomError::from_js(&e)))?;
    let store = tx
        .object_store(store_name)
        .map_err(|e| IndexedDbError::Request(DomError::from_js(&e)))?;
    Ok((tx, store))
}

/// Abort a transaction, ignoring the error if it already finished.
pub fn abort_transaction(tx: &IdbTransaction) {
    if let Err(e) = tx.abort() {
        tracing::debug!("abort on settled transaction: {:?}", e);
    }
}

/// Feed every success of a cursor request to `handler` until the cursor runs out.
///
/// The closures stay registered on the request across steps and are released once the
/// transaction completes or aborts, so a handler that stops without advancing does not
/// keep them (or itself) alive.
pub fn drive_cursor(req: &IdbRequest, tx: &IdbTransaction, mut handler: CursorHandler) {
    let closures: Rc<RefCell<Option<(EventClosure, EventClosure, EventClosure)>>> =
        Rc::new(RefCell::new(None));

    let req_s = req.clone();
    let tx_s = tx.clone();
    let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        let result = req_s.result().unwrap_or(JsValue::NULL);
        if result.is_null() || result.is_undefined() {
            handler(None);
            return;
        }

        match IdbCursorStep::new(result, tx_s.clone()) {
            Ok(step) => handler(Some(&step)),
            Err(err) => {
                tracing::error!(error = %err, "unreadable cursor position, aborting");
                abort_transaction(&tx_s);
            }
        }
    }) as Box<dyn FnMut(web_sys::Event)>);

    // The error also reaches the transaction, which rejects the operation.
    let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        tracing::debug!("cursor request failed");
    }) as Box<dyn FnMut(web_sys::Event)>);

    let closures_for_settled = closures.clone();
    let on_settled = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        *closures_for_settled.borrow_mut() = None;
    }) as Box<dyn FnMut(web_sys::Event)>);

    req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
    req.set_onerror(Some(on_error.as_ref().unchecked_ref()));
    for event in ["complete", "abort"] {
        if let Err(e) =
            tx.add_event_listener_with_callback(event, on_settled.as_ref().unchecked_ref())
        {
            tracing::warn!("cannot watch transaction {}: {:?}", event, e);
        }
    }

    *closures.borrow_mut() = Some((on_success, on_error, on_settled));
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(db_name)
        .map_err(|e| IndexedDbError::Open(DomError::from_js(&e)))?;
    let promise = request_to_promise(req.unchecked_ref());
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| IndexedDbError::Open(DomError::from_js(&e)))?;
    Ok(())
}
