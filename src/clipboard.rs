use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use arboard::Clipboard;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub const CLEAR_AFTER: Duration = Duration::from_secs(20);

/// A clipboard clear that runs after a delay, or earlier on request.
///
/// Dropping the handle clears immediately and waits for it, so a copied
/// secret never outlives the process that copied it.
pub struct ScheduledClear {
    wake: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ScheduledClear {
    pub(crate) fn spawn<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (wake, woken) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            match woken.recv_timeout(delay) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => debug!("clipboard cleared early"),
                Err(RecvTimeoutError::Timeout) => {}
            }
            action();
        });

        ScheduledClear {
            wake: Some(wake),
            worker: Some(worker),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Blocks until the delay has passed and the clear has run.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    /// Runs the clear now and waits for it.
    pub fn clear_now(mut self) -> Result<()> {
        self.signal();
        self.join()
    }

    fn signal(&mut self) {
        if let Some(wake) = self.wake.take() {
            // the worker may have finished already
            let _ = wake.send(());
        }
    }

    fn join(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow::anyhow!("clipboard clearing failed")),
            None => Ok(()),
        }
    }
}

impl Drop for ScheduledClear {
    fn drop(&mut self) {
        self.signal();
        if let Err(e) = self.join() {
            warn!(error = %e, "clipboard clear did not finish");
        }
    }
}

/// Copies `secret` to the system clipboard and schedules it to be cleared
/// after `delay`, unless something else has been copied in the meantime.
pub fn copy_with_timeout(secret: &str, delay: Duration) -> Result<ScheduledClear> {
    let mut clipboard = Clipboard::new().context("clipboard unavailable")?;
    clipboard
        .set_text(secret.to_owned())
        .context("failed to copy to clipboard")?;

    let copied = Zeroizing::new(secret.to_owned());
    Ok(ScheduledClear::spawn(delay, move || {
        clear_if_unchanged(&mut clipboard, &copied)
    }))
}

fn clear_if_unchanged(clipboard: &mut Clipboard, copied: &str) {
    match clipboard.get_text() {
        Ok(current) if current == copied => {
            if let Err(e) = clipboard.clear() {
                warn!(error = %e, "failed to clear clipboard");
            } else {
                debug!("clipboard cleared");
            }
        }
        Ok(_) => debug!("clipboard changed, not clearing"),
        Err(e) => warn!(error = %e, "failed to read clipboard"),
    }
}
