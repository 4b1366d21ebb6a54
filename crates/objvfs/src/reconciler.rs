//! Background reconciliation of the on-disk cache.
//!
//! Every poll interval the reconciler walks the cache store once:
//!
//! 1. Entries that are locked (a download or upload is running) or pinned
//!    by an open handle are skipped.
//! 2. Dirty entries are written back. They only exist unpinned after a
//!    failed write-back on close or after a crash, so this is the retry
//!    path. Up to `write_back_attempts` uploads are tried per cycle.
//! 3. Clean entries are purged: in `full` mode once idle for longer than
//!    `cache_max_age`, in every other mode right away.
//!
//! A failure on one entry is logged and the cycle moves on.

use crate::handle;
use crate::vfs::VfsInner;
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one reconciliation cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Entries removed from disk.
    pub purged: usize,
    /// Dirty entries uploaded.
    pub written_back: usize,
    /// Dirty entries whose upload failed again.
    pub failed: usize,
    /// Entries skipped because they were busy or pinned.
    pub skipped: usize,
}

impl CycleReport {
    /// Returns true if the cycle changed nothing.
    pub fn is_idle(&self) -> bool {
        self.purged == 0 && self.written_back == 0 && self.failed == 0
    }
}

/// Runs one reconciliation pass over the cache store.
pub(crate) fn run_cycle(inner: &VfsInner) -> CycleReport {
    let mut report = CycleReport::default();
    let options = &inner.options;
    let attempts = options.write_back_attempts.max(1);

    for entry in inner.store.entries() {
        let Some(mut state) = entry.try_lock() else {
            report.skipped += 1;
            continue;
        };
        if state.is_detached() {
            continue;
        }
        if state.pins() > 0 {
            report.skipped += 1;
            continue;
        }

        if state.is_dirty() {
            let file_path = state.path().to_string();
            let mut committed = None;
            for attempt in 1..=attempts {
                match state.upload(inner.remote.as_ref(), &inner.stats) {
                    Ok(entry) => {
                        committed = Some(entry);
                        break;
                    }
                    Err(e) => {
                        warn!(path = %file_path, attempt, error = %e, "write-back retry failed");
                    }
                }
            }
            match committed {
                Some(entry) => {
                    info!(path = %file_path, "dirty cache entry written back");
                    handle::publish(inner, &file_path, entry);
                    report.written_back += 1;
                }
                None => {
                    inner.stats.record_write_back_failure();
                    error!(path = %file_path, attempts, "write-back still failing, keeping dirty copy");
                    report.failed += 1;
                    continue;
                }
            }
        }

        let expired = !options.cache_mode.retains_content()
            || state.idle_for() >= options.cache_max_age;
        if expired {
            inner.store.purge_locked(&entry, &mut state);
            report.purged += 1;
        }
    }
    report
}

/// Handle to the reconciler thread.
#[derive(Debug)]
pub(crate) struct Reconciler {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Reconciler {
    /// Starts the reconciler thread. It holds only a weak reference to the
    /// engine and exits on its own once the engine is gone.
    pub(crate) fn spawn(inner: Weak<VfsInner>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("objvfs-reconciler".to_string())
            .spawn(move || {
                info!(interval = ?interval, "reconciler started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(inner) = inner.upgrade() else { break };
                            let report = run_cycle(&inner);
                            if !report.is_idle() {
                                debug!(?report, "reconciliation cycle finished");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("reconciler stopped");
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stops the thread and waits for the current cycle to finish.
    pub(crate) fn stop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("reconciler thread panicked");
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.stop();
    }
}
