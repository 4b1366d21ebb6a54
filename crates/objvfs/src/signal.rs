//! `SIGHUP` as the directory cache flush trigger.
//!
//! The trigger only marks directory listings stale; it never touches the
//! on-disk file cache.

use signal_hook::consts::signal::SIGHUP;
use signal_hook::iterator::{Handle, Signals};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Listens for `SIGHUP` on a dedicated thread and runs a callback for each.
#[derive(Debug)]
pub struct FlushTrigger {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl FlushTrigger {
    /// Registers the signal and starts the listener thread.
    pub fn spawn<F>(on_flush: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let mut signals = Signals::new([SIGHUP])?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("objvfs-flush".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(signal, "flush signal received");
                    on_flush();
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stops listening.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("flush listener thread panicked");
        }
    }
}

impl Drop for FlushTrigger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
