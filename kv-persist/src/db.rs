use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::lock::{Mutex, MutexGuard};
use log::{debug, error, warn};

use crate::{
    config::{Config, DEFAULT_PAGE_SIZE},
    error::Error,
    store::{Backend, TikvStore, Transaction},
};

/// Observable lifecycle state of the shared session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    OpenNoTxn,
    OpenTxn,
}

struct Session<X> {
    id: u64,
    txn: Option<X>,
}

struct Inner<B: Backend> {
    backend: B,
    session: Mutex<Option<Session<B::Txn>>>,
    next_session: AtomicU64,
    page_size: u32,
}

/// Owns the one session and transaction shared by every [`crate::Dao`]
/// built on it.
///
/// Clones share the session. A `Db` belongs to one unit of work; run
/// independent units on independent `Db`s.
pub struct Db<B: Backend> {
    inner: Arc<Inner<B>>,
}

impl<B: Backend> Clone for Db<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Db<TikvStore> {
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let store = TikvStore::new(config.pd_endpoints).await?;
        Ok(Self::with_page_size(store, config.page_size))
    }
}

impl<B: Backend> Db<B> {
    pub fn new(backend: B) -> Self {
        Self::with_page_size(backend, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(backend: B, page_size: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
                page_size: page_size.max(1),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn page_size(&self) -> u32 {
        self.inner.page_size
    }

    /// Opens a session and begins a transaction when needed.
    ///
    /// The returned guard holds the session lock; every other operation on
    /// this `Db` waits until it is dropped.
    pub(crate) async fn active_session(&self) -> Result<ActiveSession<'_, B>, Error> {
        let mut guard = self.inner.session.lock().await;
        if guard.is_none() {
            let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
            debug!("session {} opened on {}", id, self.inner.backend.name());
            *guard = Some(Session { id, txn: None });
        }
        let Some(session) = guard.as_mut() else {
            return Err(Error::Transaction("session failed to open".to_string()));
        };
        if session.txn.is_none() {
            session.txn = Some(self.inner.backend.begin().await?);
            debug!("session {} began transaction", session.id);
        }
        Ok(ActiveSession { guard })
    }

    /// Commits the active transaction; does nothing without one.
    ///
    /// A failed commit closes the session.
    pub async fn commit(&self) -> Result<(), Error> {
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(());
        };
        let Some(mut txn) = session.txn.take() else {
            return Ok(());
        };
        let id = session.id;
        match txn.commit().await {
            Ok(()) => {
                debug!("session {} committed", id);
                Ok(())
            }
            Err(err) => {
                error!("session {} commit failed, closing: {}", id, err);
                *guard = None;
                Err(err)
            }
        }
    }

    /// Rolls back the active transaction; does nothing without one.
    pub async fn rollback(&self) -> Result<(), Error> {
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(());
        };
        let Some(mut txn) = session.txn.take() else {
            return Ok(());
        };
        let id = session.id;
        match txn.rollback().await {
            Ok(()) => {
                debug!("session {} rolled back", id);
                Ok(())
            }
            Err(err) => {
                error!("session {} rollback failed, closing: {}", id, err);
                *guard = None;
                Err(err)
            }
        }
    }

    /// Commits any active transaction, then releases the session.
    ///
    /// The session is released even when that commit fails.
    pub async fn close(&self) -> Result<(), Error> {
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.take() else {
            return Ok(());
        };
        let result = match session.txn {
            Some(mut txn) => txn.commit().await,
            None => Ok(()),
        };
        match &result {
            Ok(()) => debug!("session {} closed", session.id),
            Err(err) => error!("session {} closed, final commit failed: {}", session.id, err),
        }
        result
    }

    pub async fn state(&self) -> SessionState {
        state_of(self.inner.session.lock().await.as_ref())
    }

    pub async fn session_id(&self) -> Option<u64> {
        self.inner.session.lock().await.as_ref().map(|s| s.id)
    }
}

fn state_of<X>(session: Option<&Session<X>>) -> SessionState {
    match session {
        None => SessionState::Closed,
        Some(Session { txn: None, .. }) => SessionState::OpenNoTxn,
        Some(Session { txn: Some(_), .. }) => SessionState::OpenTxn,
    }
}

impl<B: Backend> fmt::Display for Db<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(backend: {})", self.inner.backend.name())?;
        match self.inner.session.try_lock() {
            Some(guard) => match guard.as_ref() {
                Some(session) => write!(
                    f,
                    "(session: {} {:?})",
                    session.id,
                    state_of(Some(session))
                ),
                None => write!(f, "(session: closed)"),
            },
            None => write!(f, "(session: in use)"),
        }
    }
}

/// Exclusive access to the live session while one operation runs.
pub(crate) struct ActiveSession<'a, B: Backend> {
    guard: MutexGuard<'a, Option<Session<B::Txn>>>,
}

impl<B: Backend> ActiveSession<'_, B> {
    pub(crate) fn txn(&mut self) -> Result<&mut B::Txn, Error> {
        self.guard
            .as_mut()
            .and_then(|s| s.txn.as_mut())
            .ok_or_else(|| Error::Transaction("session has no active transaction".to_string()))
    }

    /// Passes `result` through; on error the transaction is rolled back and
    /// the session closed before the error is returned.
    pub(crate) async fn settle<R>(mut self, op: &str, result: Result<R, Error>) -> Result<R, Error> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if let Some(session) = self.guard.take() {
            error!("{} failed in session {}, rolling back: {}", op, session.id, err);
            if let Some(mut txn) = session.txn {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("rollback of session {} failed: {}", session.id, rollback_err);
                }
            }
        }
        Err(err)
    }
}
