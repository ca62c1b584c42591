//! Store handle: connection lifecycle, operation executor and the five operations.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};

use crate::config::{StoreConfig, DB_VERSION};
use crate::engine::{
    AccessMode, Connection, Cursor, CursorHandler, Engine, StorageArea, Transaction,
    UpgradeHandler, ValueRequest,
};
use crate::{Key, Value};

/// Storage area type reachable from an engine's connections.
pub type AreaOf<E> = <<<E as Engine>::Connection as Connection>::Transaction as Transaction>::Area;

/// A resolved connection together with the capabilities probed when it opened.
struct Ready<C> {
    connection: C,
    key_cursor: bool,
}

type PendingConnection<E> = Shared<
    LocalBoxFuture<'static, Result<Rc<Ready<<E as Engine>::Connection>>, <E as Engine>::Error>>,
>;

/// Handle on one (database, storage area) pair.
///
/// The connection is opened on first use and memoized as a shared future: every
/// operation, concurrent or later, awaits the same open, so the engine is asked to open
/// the database exactly once per handle. If that open fails, the failure is memoized
/// too and every operation on the handle rejects with it; construct a new handle to
/// retry.
///
/// Operations run in independent transactions. The engine orders read-write
/// transactions on the same area; callers that need strict sequencing await each
/// operation before starting the next.
pub struct StoreHandle<E: Engine> {
    engine: E,
    config: StoreConfig,
    connection: OnceCell<PendingConnection<E>>,
}

impl<E: Engine> StoreHandle<E> {
    /// Handle on the default database and storage area.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, StoreConfig::default())
    }

    pub fn with_config(engine: E, config: StoreConfig) -> Self {
        Self {
            engine,
            config,
            connection: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Wait for the connection to open, creating the storage area if this is the
    /// database's first use.
    pub async fn ready(&self) -> Result<(), E::Error> {
        self.connect().await.map(|_| ())
    }

    fn connect(&self) -> PendingConnection<E> {
        self.connection
            .get_or_init(|| {
                let database = self.config.database_name.clone();
                let area = self.config.area_name.clone();
                tracing::debug!(database = %database, area = %area, "opening database");

                let upgrade_area = area.clone();
                let upgrade: UpgradeHandler<E::Connection> =
                    Box::new(move |conn: &E::Connection| {
                        if conn.has_area(&upgrade_area) {
                            return Ok(());
                        }
                        tracing::debug!(area = %upgrade_area, "creating storage area");
                        conn.create_area(&upgrade_area)
                    });

                let open = self.engine.open(&database, DB_VERSION, upgrade);
                async move {
                    match open.await {
                        Ok(connection) => {
                            let key_cursor = connection.supports_key_cursor();
                            tracing::debug!(database = %database, key_cursor, "database open");
                            Ok(Rc::new(Ready {
                                connection,
                                key_cursor,
                            }))
                        }
                        Err(err) => {
                            tracing::error!(database = %database, error = %err, "failed to open database");
                            Err(err)
                        }
                    }
                }
                .boxed_local()
                .shared()
            })
            .clone()
    }

    /// Run `action` against the storage area inside a transaction with `mode`.
    ///
    /// The action must issue all its requests before returning; the transaction commits
    /// once control goes back to the engine with nothing left pending. Resolves when the
    /// transaction completes and rejects with the engine's error if it aborts. If the
    /// action itself fails, the transaction is aborted and that error is returned.
    pub async fn with_area<F>(&self, mode: AccessMode, action: F) -> Result<(), E::Error>
    where
        F: FnOnce(&AreaOf<E>) -> Result<(), E::Error>,
    {
        self.run(mode, |_, area| action(area)).await
    }

    async fn run<F>(&self, mode: AccessMode, action: F) -> Result<(), E::Error>
    where
        F: FnOnce(&Ready<E::Connection>, &AreaOf<E>) -> Result<(), E::Error>,
    {
        let ready = self.connect().await?;
        let area_name = &self.config.area_name;

        let tx = ready.connection.transaction(area_name, mode)?;
        let area = tx.area()?;
        tracing::trace!(area = %area_name, ?mode, "transaction started");

        if let Err(err) = action(&*ready, &area) {
            tracing::warn!(area = %area_name, error = %err, "action failed, aborting transaction");
            tx.abort();
            return Err(err);
        }

        match tx.finish().await {
            Ok(()) => {
                tracing::trace!(area = %area_name, ?mode, "transaction complete");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(area = %area_name, error = %err, "transaction aborted");
                Err(err)
            }
        }
    }

    /// Value stored under `key`, or `None` if there is none.
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>, E::Error> {
        let key = key.into();
        let mut request = None;
        self.with_area(AccessMode::ReadOnly, |area| {
            request = Some(area.get(&key)?);
            Ok(())
        })
        .await?;

        match request {
            Some(request) => request.result(),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub async fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), E::Error> {
        let key = key.into();
        let value = value.into();
        self.with_area(AccessMode::ReadWrite, |area| area.put(&key, &value))
            .await
    }

    /// Remove the entry under `key`. Removing an absent key succeeds.
    pub async fn delete(&self, key: impl Into<Key>) -> Result<(), E::Error> {
        let key = key.into();
        self.with_area(AccessMode::ReadWrite, |area| area.delete(&key))
            .await
    }

    /// Remove every entry in the storage area.
    pub async fn clear(&self) -> Result<(), E::Error> {
        self.with_area(AccessMode::ReadWrite, |area| area.clear())
            .await
    }

    /// All keys in ascending key order.
    ///
    /// Walks a cursor one step at a time rather than issuing a bulk key query. Uses a
    /// key-only cursor where the engine has one and a full cursor otherwise; values from
    /// the full cursor are dropped.
    pub async fn keys(&self) -> Result<Vec<Key>, E::Error> {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let sink = collected.clone();
        let handler: CursorHandler = Box::new(move |step: Option<&dyn Cursor>| {
            if let Some(cursor) = step {
                sink.borrow_mut().push(cursor.key());
                cursor.advance();
            }
        });

        self.run(AccessMode::ReadOnly, |ready, area| {
            if ready.key_cursor {
                area.open_key_cursor(handler)
            } else {
                area.open_cursor(handler)
            }
        })
        .await?;

        Ok(collected.take())
    }
}
