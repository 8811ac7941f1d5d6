//! Interrupt handling for batch runs.
//!
//! The first SIGINT/SIGTERM sets an abort flag; the batch controller checks
//! it between units, so the in-flight unit finishes or fails through its own
//! rollback path. A second signal exits immediately with the conventional
//! code for that signal.

use anyhow::Result;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub fn setup_interrupt_handlers(interrupted: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            if interrupted.swap(true, Ordering::SeqCst) {
                // Second signal: the operator wants out now.
                let code = match sig {
                    SIGTERM => 143,
                    _ => 130,
                };
                std::process::exit(code);
            }
            tracing::warn!("interrupt received, finishing the current unit before stopping");
        }
    });

    Ok(())
}
