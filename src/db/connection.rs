use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

/// How long a stats reader waits on the acquisition writer's lock before
/// SQLite reports `SQLITE_BUSY`.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const WORKER_THREAD_NAME: &str = "spineband-db";

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if let Err(err) = self.requests.send(Request::Close) {
            error!("posture store worker already gone at close: {err}");
        }
        if let Err(join_err) = handle.join() {
            error!("posture store worker panicked: {join_err:?}");
        }
    }
}

/// Handle to the posture record store.
///
/// The SQLite connection lives on a dedicated worker thread; every query is
/// shipped there as a closure and its result comes back over a oneshot
/// channel. Clones share the same worker. The worker is shut down and joined
/// when the last clone is dropped, so the store is opened once at startup and
/// closed by dropping every handle at shutdown.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path = db_path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                let mut conn = match open_store(&path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                while let Ok(Request::Run(job)) = request_rx.recv() {
                    job(&mut conn);
                }
                info!("posture store worker closed");
            })
            .context("failed to spawn posture store worker")?;

        ready_rx
            .recv()
            .context("posture store worker exited before opening the database")??;
        info!("posture store open at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                requests: request_tx,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; the work is done either way.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("posture store worker is closed"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("posture store worker dropped the request"))?
    }
}

/// Opens the file and tunes it for one writer (the acquisition loop) with
/// occasional readers (stats), then brings the schema up to date.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("WAL unavailable for {}: {err}", path.display());
    }
    // One reading per second; losing the last few on power loss is acceptable.
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous mode")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}
