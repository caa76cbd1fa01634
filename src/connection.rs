//! Lazily established, shared bus connection.

use std::sync::{Arc, Mutex};

use crate::bus::{Connection, ConnectOptions, Connector};
use crate::error::Error;

/// Owns the client's single bus connection.
///
/// The first caller that finds no connection establishes one while holding
/// the lock; concurrent callers wait for it. Once established, the
/// connection is handed out as a shared `Arc` and used without locking.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    options: ConnectOptions,
    current: Mutex<Option<Arc<C::Connection>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, options: ConnectOptions) -> Self {
        Self {
            connector,
            options,
            current: Mutex::new(None),
        }
    }

    /// The shared connection, connecting first if needed.
    pub fn get(&self) -> Result<Arc<C::Connection>, Error> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::LockPoisoned("connect"))?;

        if let Some(conn) = current.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let conn = Arc::new(self.connector.connect(&self.options)?);
        tracing::debug!(url = %self.options.url, name = %self.options.name, "connected");
        *current = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Close and forget the connection. Safe to call repeatedly; the next
    /// [`get`](Self::get) reconnects.
    pub fn close(&self) -> Result<(), Error> {
        let taken = self
            .current
            .lock()
            .map_err(|_| Error::LockPoisoned("close"))?
            .take();

        if let Some(conn) = taken {
            conn.close();
            tracing::debug!(url = %self.options.url, "connection closed");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.current.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}
