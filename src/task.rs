//! Background tasks
//!
//! Nothing in the crate runs work on its own threads. Long operations (flush,
//! push, pull) can be handed to a [`BackgroundTask`], which runs one job on a
//! named thread and streams its progress back over a channel. The caller
//! polls or waits; there is no cancellation.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, TryRecvError};
use parking_lot::Mutex;
use tracing::debug;

use crate::db::Database;
use crate::error::{LedgerError, Result};
use crate::sync::{PullMode, Remote, SyncOutcome, Synchronizer};

/// A database handle that background jobs can lock
pub type SharedDatabase = Arc<Mutex<Database>>;

/// A synchronizer handle that background jobs can lock
pub type SharedSynchronizer<R> = Arc<Mutex<Synchronizer<R>>>;

enum Event<T> {
    Progress(f64),
    Done(Result<T>),
}

/// One job running on its own thread
pub struct BackgroundTask<T> {
    name: String,
    events: Receiver<Event<T>>,
    handle: Option<JoinHandle<()>>,
    progress: f64,
    result: Option<Result<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Start `job` on a thread named `name`
    ///
    /// The job reports progress in `0.0..=1.0` through the callback it gets.
    pub fn spawn<F>(name: &str, job: F) -> Result<Self>
    where
        F: FnOnce(&mut dyn FnMut(f64)) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let progress_tx = tx.clone();
                let mut report = move |fraction: f64| {
                    let _ = progress_tx.send(Event::Progress(fraction));
                };
                let result = job(&mut report);
                let _ = tx.send(Event::Done(result));
            })?;

        debug!("Started background task '{}'", name);
        Ok(Self {
            name: name.to_string(),
            events: rx,
            handle: Some(handle),
            progress: 0.0,
            result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest reported progress, without blocking
    pub fn progress(&mut self) -> f64 {
        self.drain();
        self.progress
    }

    /// True once the job has produced its result or died
    pub fn is_finished(&mut self) -> bool {
        self.drain();
        self.result.is_some() || self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the job is done and return its result
    pub fn wait(mut self) -> Result<T> {
        while self.result.is_none() {
            match self.events.recv() {
                Ok(event) => self.apply(event),
                Err(_) => break,
            }
        }

        let joined = self.handle.take().map(JoinHandle::join);
        match (self.result.take(), joined) {
            (Some(result), _) => {
                debug!("Background task '{}' finished", self.name);
                result
            }
            (None, Some(Err(_))) => Err(LedgerError::Task(format!("'{}' panicked", self.name))),
            (None, _) => Err(LedgerError::Task(format!(
                "'{}' ended without a result",
                self.name
            ))),
        }
    }

    fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, event: Event<T>) {
        match event {
            Event::Progress(fraction) => self.progress = fraction.clamp(0.0, 1.0),
            Event::Done(result) => {
                self.progress = 1.0;
                self.result = Some(result);
            }
        }
    }
}

/// Flush the database on a background thread
pub fn flush_in_background(db: &SharedDatabase) -> Result<BackgroundTask<()>> {
    let db = Arc::clone(db);
    BackgroundTask::spawn("ledgerdb-flush", move |progress| {
        db.lock().flush()?;
        progress(1.0);
        Ok(())
    })
}

/// Flush pending changes, then push, on a background thread
///
/// The database stays locked until the push is done, so the uploaded files
/// match the manifest committed at its start.
pub fn push_in_background<R>(
    db: &SharedDatabase,
    sync: &SharedSynchronizer<R>,
    force: bool,
) -> Result<BackgroundTask<SyncOutcome>>
where
    R: Remote + Send + 'static,
{
    let db = Arc::clone(db);
    let sync = Arc::clone(sync);
    BackgroundTask::spawn("ledgerdb-push", move |progress| {
        let mut db = db.lock();
        flush_if_dirty(&mut db)?;
        sync.lock().push(force, progress)
    })
}

/// Flush pending changes, pull, then reload the database on a background
/// thread
///
/// The database stays locked for the whole transfer so nobody reads tables
/// that are being replaced. A clean database is not flushed: a fresh store
/// must stay empty to pull without a conflict.
pub fn pull_in_background<R>(
    db: &SharedDatabase,
    sync: &SharedSynchronizer<R>,
    mode: PullMode,
) -> Result<BackgroundTask<SyncOutcome>>
where
    R: Remote + Send + 'static,
{
    let db = Arc::clone(db);
    let sync = Arc::clone(sync);
    BackgroundTask::spawn("ledgerdb-pull", move |progress| {
        let mut db = db.lock();
        flush_if_dirty(&mut db)?;
        let outcome = sync.lock().pull(mode, progress)?;
        if matches!(outcome, SyncOutcome::Completed(_)) {
            db.reload()?;
        }
        Ok(outcome)
    })
}

fn flush_if_dirty(db: &mut Database) -> Result<()> {
    if db.is_dirty() {
        db.flush()?;
    }
    Ok(())
}
