//! Ignoring SIGINT and SIGTERM while the transport runs.
//!
//! A Ctrl-C on the terminal reaches the transport as well, which then fails
//! on its own. Surviving the signal ourselves lets the fail hook and the
//! teardown run before we exit.
//!
//! Handlers are installed once per process and stay installed. Outside a
//! [`SignalWindow`] they emulate the default action, so the signals
//! terminate the process as usual.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use signal_hook::consts::{SIGINT, SIGTERM};

const TARGET: &str = "netbackup::backup::signals";

struct Handlers {
    /// Default action applies while set.
    terminate: Arc<AtomicBool>,
    /// Number of open windows.
    open: usize,
}

static HANDLERS: Mutex<Option<Handlers>> = Mutex::new(None);

/// Guard ignoring SIGINT and SIGTERM until dropped.
#[derive(Debug)]
#[must_use = "signals are only ignored while the window is alive"]
pub struct SignalWindow(());

impl SignalWindow {
    /// Starts ignoring SIGINT and SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers can't be installed.
    pub fn open() -> io::Result<Self> {
        let mut handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
        if handlers.is_none() {
            let terminate = Arc::new(AtomicBool::new(true));
            for signal in [SIGINT, SIGTERM] {
                signal_hook::flag::register_conditional_default(signal, Arc::clone(&terminate))?;
            }
            *handlers = Some(Handlers { terminate, open: 0 });
        }

        if let Some(handlers) = handlers.as_mut() {
            handlers.open += 1;
            handlers.terminate.store(false, Ordering::SeqCst);
        }
        log::debug!(target: TARGET, "Ignoring SIGINT and SIGTERM");
        Ok(Self(()))
    }
}

impl Drop for SignalWindow {
    fn drop(&mut self) {
        let mut handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handlers) = &mut *handlers {
            handlers.open = handlers.open.saturating_sub(1);
            if handlers.open == 0 {
                handlers.terminate.store(true, Ordering::SeqCst);
                log::debug!(target: TARGET, "Restored default SIGINT and SIGTERM handling");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminates() -> bool {
        HANDLERS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|h| h.terminate.load(Ordering::SeqCst))
    }

    #[test]
    fn signals_are_survived_inside_window() {
        let window = SignalWindow::open().expect("handlers should install");
        assert!(!terminates());

        signal_hook::low_level::raise(SIGTERM).expect("raise should work");
        signal_hook::low_level::raise(SIGINT).expect("raise should work");

        // Still alive.
        drop(window);
    }

    #[test]
    fn nested_windows_keep_ignoring_until_last_closes() {
        let outer = SignalWindow::open().expect("handlers should install");
        let inner = SignalWindow::open().expect("handlers should install");

        drop(inner);
        assert!(!terminates());

        drop(outer);
    }
}
