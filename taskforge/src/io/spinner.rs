//! Terminal spinner shown while a blocking suggester call is in flight.

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Background spinner scoped to one blocking call.
///
/// `stop` (or drop) signals the thread and joins it, so the spinner never
/// outlives the call it decorates.
pub struct Spinner {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start spinning on stderr. Does nothing when `enabled` is false or stderr
    /// is not a terminal.
    pub fn start(enabled: bool) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let handle = if enabled && std::io::stderr().is_terminal() {
            let flag = Arc::clone(&done);
            Some(thread::spawn(move || spin_until(&flag)))
        } else {
            None
        };
        Self { done, handle }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal the spinner thread and wait for it to clear its frame.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _: thread::Result<()> = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

fn spin_until(done: &AtomicBool) {
    let mut stderr = std::io::stderr();
    let mut i = 0usize;
    while !done.load(Ordering::Relaxed) {
        let _ = write!(stderr, "\r{}", FRAMES[i % FRAMES.len()]);
        let _ = stderr.flush();
        thread::sleep(FRAME_INTERVAL);
        i += 1;
    }
    let _ = write!(stderr, "\r \r");
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_spinner_spawns_nothing() {
        let spinner = Spinner::start(false);
        assert!(!spinner.is_running());
        spinner.stop();
    }

    #[test]
    fn stop_ends_the_spin_loop() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let finished = Arc::new(AtomicBool::new(false));
        let finished_flag = Arc::clone(&finished);
        let spinner = Spinner {
            done,
            handle: Some(thread::spawn(move || {
                spin_until(&flag);
                finished_flag.store(true, Ordering::SeqCst);
            })),
        };
        assert!(spinner.is_running());
        thread::sleep(FRAME_INTERVAL);

        spinner.stop();
        assert!(finished.load(Ordering::SeqCst));
    }
}
